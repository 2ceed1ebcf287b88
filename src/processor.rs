// ============================================================================
// TILED PROCESSOR — row-chunked parallel transforms over a HostImage
// ============================================================================
//
// Rows are split into contiguous chunks of `max(min_chunk_rows, H / workers)`,
// one task per chunk, all joined before returning. Each task gets a disjoint
// `&mut [u8]` view of its rows, so no two tasks can touch the same row.

use std::fmt::Display;
use std::ops::Range;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use crate::error::{ImageError, Result};
use crate::image::HostImage;
use crate::settings::EngineSettings;

pub const DEFAULT_MIN_CHUNK_ROWS: usize = 32;

/// Shared cancel flag; cloning hands out another handle to the same flag.
#[derive(Clone, Debug, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}

/// Split `0..height` into contiguous row ranges of
/// `max(min_rows, height / workers)` rows (the last one may be shorter).
pub fn plan_chunks(height: u32, workers: usize, min_rows: usize) -> Vec<Range<u32>> {
    let workers = workers.max(1) as u32;
    let min_rows = min_rows.max(1) as u32;
    let chunk = (height / workers).max(min_rows);
    (0..height)
        .step_by(chunk as usize)
        .map(|start| start..(start + chunk).min(height))
        .collect()
}

#[derive(Clone, Debug)]
enum ChunkOutcome {
    Done,
    Failed { row: u32, message: String },
    Cancelled,
    TimedOut,
}

#[derive(Clone, Copy)]
struct Guard<'a> {
    token: Option<&'a CancellationToken>,
    deadline: Option<Instant>,
}

impl Guard<'_> {
    fn check(&self) -> Option<ChunkOutcome> {
        if self.token.is_some_and(CancellationToken::is_cancelled) {
            return Some(ChunkOutcome::Cancelled);
        }
        if self.deadline.is_some_and(|d| Instant::now() >= d) {
            return Some(ChunkOutcome::TimedOut);
        }
        None
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panicked: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panicked: {s}")
    } else {
        "panicked".to_string()
    }
}

/// Run `f` over one chunk's rows, stopping at the first failure.
fn run_chunk<R, E, F>(rows: impl Iterator<Item = R>, first_row: u32, f: &F, guard: Guard<'_>) -> ChunkOutcome
where
    F: Fn(R, u32) -> std::result::Result<(), E> + ?Sized,
    E: Display,
{
    let mut current = first_row;
    let result = catch_unwind(AssertUnwindSafe(|| {
        for (i, row) in rows.enumerate() {
            if let Some(stop) = guard.check() {
                return stop;
            }
            current = first_row + i as u32;
            if let Err(e) = f(row, current) {
                return ChunkOutcome::Failed {
                    row: current,
                    message: e.to_string(),
                };
            }
        }
        ChunkOutcome::Done
    }));
    result.unwrap_or_else(|payload| ChunkOutcome::Failed {
        row: current,
        message: panic_message(payload.as_ref()),
    })
}

/// Row-parallel executor. [`TiledProcessor::global`] runs on rayon's
/// process-wide pool; [`TiledProcessor::with_threads`] owns a dedicated one.
pub struct TiledProcessor {
    pool: Option<Arc<rayon::ThreadPool>>,
    workers: usize,
    min_chunk_rows: usize,
    join_timeout: Option<Duration>,
}

impl TiledProcessor {
    /// Shared processor on the global rayon pool.
    pub fn global() -> &'static TiledProcessor {
        static GLOBAL: OnceLock<TiledProcessor> = OnceLock::new();
        GLOBAL.get_or_init(|| TiledProcessor {
            pool: None,
            workers: rayon::current_num_threads(),
            min_chunk_rows: DEFAULT_MIN_CHUNK_ROWS,
            join_timeout: None,
        })
    }

    /// Processor with its own pool of `threads` workers.
    pub fn with_threads(threads: usize) -> Result<Self> {
        let threads = threads.max(1);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("hostimage-rows-{i}"))
            .build()
            .map_err(|e| ImageError::Processing {
                row: 0,
                message: format!("failed to build worker pool: {e}"),
            })?;
        Ok(Self {
            pool: Some(Arc::new(pool)),
            workers: threads,
            min_chunk_rows: DEFAULT_MIN_CHUNK_ROWS,
            join_timeout: None,
        })
    }

    pub fn from_settings(settings: &EngineSettings) -> Result<Self> {
        Ok(Self::with_threads(settings.workers())?
            .with_min_chunk_rows(settings.min_chunk_rows)
            .with_join_timeout(settings.join_timeout()))
    }

    pub fn with_min_chunk_rows(mut self, rows: usize) -> Self {
        self.min_chunk_rows = rows.max(1);
        self
    }

    /// Cooperative deadline: chunks stop at the next row boundary once it
    /// passes, and the call reports [`ImageError::TimedOut`].
    pub fn with_join_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.join_timeout = timeout;
        self
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    pub fn min_chunk_rows(&self) -> usize {
        self.min_chunk_rows
    }

    pub fn plan(&self, height: u32) -> Vec<Range<u32>> {
        plan_chunks(height, self.workers, self.min_chunk_rows)
    }

    fn scope<'scope, OP>(&self, op: OP)
    where
        OP: FnOnce(&rayon::Scope<'scope>) + Send,
    {
        match &self.pool {
            Some(pool) => pool.scope(op),
            None => rayon::scope(op),
        }
    }

    fn guard<'a>(&self, token: Option<&'a CancellationToken>) -> Guard<'a> {
        Guard {
            token,
            deadline: self.join_timeout.map(|t| Instant::now() + t),
        }
    }

    // ---- mutating ------------------------------------------------------------

    /// Apply `f(row, y)` to every row. A panicking row surfaces as
    /// [`ImageError::Processing`] after all chunks have joined.
    pub fn for_each_row_mut<F>(&self, image: &mut HostImage, f: F) -> Result<()>
    where
        F: Fn(&mut [u8], u32) + Sync,
    {
        self.run_mut(image, None, &|row: &mut [u8], y| {
            f(row, y);
            Ok::<(), std::convert::Infallible>(())
        })
    }

    pub fn try_for_each_row_mut<E, F>(&self, image: &mut HostImage, f: F) -> Result<()>
    where
        F: Fn(&mut [u8], u32) -> std::result::Result<(), E> + Sync,
        E: Display,
    {
        self.run_mut(image, None, &f)
    }

    pub fn try_for_each_row_mut_with<E, F>(
        &self,
        image: &mut HostImage,
        token: &CancellationToken,
        f: F,
    ) -> Result<()>
    where
        F: Fn(&mut [u8], u32) -> std::result::Result<(), E> + Sync,
        E: Display,
    {
        self.run_mut(image, Some(token), &f)
    }

    fn run_mut<E, F>(&self, image: &mut HostImage, token: Option<&CancellationToken>, f: &F) -> Result<()>
    where
        F: Fn(&mut [u8], u32) -> std::result::Result<(), E> + Sync + ?Sized,
        E: Display,
    {
        let stride = image.row_stride();
        let chunks = self.plan(image.height());
        let guard = self.guard(token);
        let mut outcomes = vec![ChunkOutcome::Done; chunks.len()];

        let mut rest = image.raw_mut();
        let mut views = Vec::with_capacity(chunks.len());
        for range in &chunks {
            let (head, tail) = std::mem::take(&mut rest).split_at_mut(range.len() * stride);
            views.push((range.start, head));
            rest = tail;
        }

        self.scope(|s| {
            for ((first_row, rows), outcome) in views.into_iter().zip(outcomes.iter_mut()) {
                s.spawn(move |_| {
                    *outcome = run_chunk(rows.chunks_exact_mut(stride), first_row, f, guard);
                });
            }
        });

        // Rows may have been written even when a chunk failed.
        image.mark_modified();
        self.collect(outcomes)
    }

    // ---- read-only -----------------------------------------------------------

    /// Read-only counterpart; never bumps the image generation.
    pub fn for_each_row<F>(&self, image: &HostImage, f: F) -> Result<()>
    where
        F: Fn(&[u8], u32) + Sync,
    {
        self.run_ref(image, None, &|row: &[u8], y| {
            f(row, y);
            Ok::<(), std::convert::Infallible>(())
        })
    }

    pub fn try_for_each_row<E, F>(&self, image: &HostImage, f: F) -> Result<()>
    where
        F: Fn(&[u8], u32) -> std::result::Result<(), E> + Sync,
        E: Display,
    {
        self.run_ref(image, None, &f)
    }

    pub fn try_for_each_row_with<E, F>(&self, image: &HostImage, token: &CancellationToken, f: F) -> Result<()>
    where
        F: Fn(&[u8], u32) -> std::result::Result<(), E> + Sync,
        E: Display,
    {
        self.run_ref(image, Some(token), &f)
    }

    fn run_ref<E, F>(&self, image: &HostImage, token: Option<&CancellationToken>, f: &F) -> Result<()>
    where
        F: Fn(&[u8], u32) -> std::result::Result<(), E> + Sync + ?Sized,
        E: Display,
    {
        let stride = image.row_stride();
        let chunks = self.plan(image.height());
        let guard = self.guard(token);
        let mut outcomes = vec![ChunkOutcome::Done; chunks.len()];
        let data = image.pixels();

        self.scope(|s| {
            for (range, outcome) in chunks.iter().zip(outcomes.iter_mut()) {
                let rows = &data[range.start as usize * stride..range.end as usize * stride];
                let first_row = range.start;
                s.spawn(move |_| {
                    *outcome = run_chunk(rows.chunks_exact(stride), first_row, f, guard);
                });
            }
        });

        self.collect(outcomes)
    }

    /// Failures win over cancellation, cancellation over timeout; among
    /// failures the lowest row is reported.
    fn collect(&self, outcomes: Vec<ChunkOutcome>) -> Result<()> {
        let mut failure: Option<(u32, String)> = None;
        let mut cancelled = false;
        let mut timed_out = false;
        for outcome in outcomes {
            match outcome {
                ChunkOutcome::Done => {}
                ChunkOutcome::Failed { row, message } => {
                    if failure.as_ref().is_none_or(|(r, _)| row < *r) {
                        failure = Some((row, message));
                    }
                }
                ChunkOutcome::Cancelled => cancelled = true,
                ChunkOutcome::TimedOut => timed_out = true,
            }
        }
        if let Some((row, message)) = failure {
            crate::log_warn!("row processing failed at row {row}: {message}");
            return Err(ImageError::Processing { row, message });
        }
        if cancelled {
            return Err(ImageError::Cancelled);
        }
        if timed_out {
            let timeout = self.join_timeout.unwrap_or_default();
            crate::log_warn!("row processing exceeded {timeout:?}");
            return Err(ImageError::TimedOut(timeout));
        }
        Ok(())
    }
}
