// ============================================================================
// PIXEL BUFFER — contiguous row-major byte storage, copy-on-write shared
// ============================================================================

use std::sync::Arc;

/// Owns exactly `width * height * bytes_per_pixel` bytes. Knows nothing about
/// the pixel format.
///
/// Storage sits behind an `Arc` so that [`PixelBuffer::share`] is a cheap
/// reference-count bump; the first mutable access on a shared buffer clones
/// it (`Arc::make_mut`), so two live images never observe each other's writes.
#[derive(Clone, Debug)]
pub struct PixelBuffer {
    data: Arc<Vec<u8>>,
}

impl PixelBuffer {
    /// Zero-filled buffer of `len` bytes.
    pub fn zeroed(len: usize) -> Self {
        Self {
            data: Arc::new(vec![0u8; len]),
        }
    }

    pub fn from_vec(data: Vec<u8>) -> Self {
        Self { data: Arc::new(data) }
    }

    /// Explicitly shared handle to the same storage.
    pub fn share(&self) -> Self {
        Self {
            data: Arc::clone(&self.data),
        }
    }

    /// Independent copy with its own storage.
    pub fn deep_copy(&self) -> Self {
        Self::from_vec(self.data.as_ref().clone())
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// True while another image holds the same storage.
    pub fn is_shared(&self) -> bool {
        Arc::strong_count(&self.data) > 1
    }

    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        self.data.as_slice()
    }

    /// Mutable access; clones the storage first if it is shared.
    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        Arc::make_mut(&mut self.data).as_mut_slice()
    }

    /// Zero every byte in place. Never reallocates unless shared.
    pub fn clear(&mut self) {
        if self.is_shared() {
            self.data = Arc::new(vec![0u8; self.data.len()]);
        } else {
            self.as_mut_slice().fill(0);
        }
    }

    pub fn into_vec(self) -> Vec<u8> {
        Arc::try_unwrap(self.data).unwrap_or_else(|shared| shared.as_ref().clone())
    }
}

impl PartialEq for PixelBuffer {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.data, &other.data) || self.data.as_slice() == other.data.as_slice()
    }
}

impl Eq for PixelBuffer {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn share_is_copy_on_write() {
        let mut a = PixelBuffer::from_vec(vec![1, 2, 3, 4]);
        let b = a.share();
        assert!(a.is_shared());
        a.as_mut_slice()[0] = 9;
        assert!(!a.is_shared());
        assert_eq!(a.as_slice(), &[9, 2, 3, 4]);
        assert_eq!(b.as_slice(), &[1, 2, 3, 4]);
    }

    #[test]
    fn clear_on_shared_buffer_leaves_sibling_intact() {
        let mut a = PixelBuffer::from_vec(vec![7; 8]);
        let b = a.share();
        a.clear();
        assert_eq!(a.as_slice(), &[0; 8]);
        assert_eq!(b.as_slice(), &[7; 8]);
    }

    #[test]
    fn deep_copy_is_disjoint() {
        let a = PixelBuffer::from_vec(vec![5; 4]);
        let b = a.deep_copy();
        assert!(!a.is_shared());
        assert_eq!(a, b);
    }
}
