// ============================================================================
// ENGINE SETTINGS — tunables persisted as plain key=value lines
// ============================================================================

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::convert::ConvertOptions;
use crate::error::Result;

/// Every knob the engine reads at runtime.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Row-processing workers; 0 means "available parallelism".
    pub worker_threads: usize,
    /// Lower bound on rows per processing chunk.
    pub min_chunk_rows: usize,
    /// Join timeout for row processing in milliseconds; 0 disables it.
    pub join_timeout_ms: u64,
    /// How long a texture upload may wait on the GPU fence.
    pub fence_timeout_ms: u64,
    /// Float32 pixels containing NaN convert to transparent black.
    pub nan_as_transparent: bool,
    /// `"high performance"` or `"low power"`.
    pub preferred_gpu: String,
    pub generate_mipmaps: bool,
    pub log_level: log::LevelFilter,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            worker_threads: 0,
            min_chunk_rows: 32,
            join_timeout_ms: 0,
            fence_timeout_ms: 5000,
            nan_as_transparent: false,
            preferred_gpu: "high performance".to_string(),
            generate_mipmaps: true,
            log_level: log::LevelFilter::Info,
        }
    }
}

impl EngineSettings {
    /// Parse `key=value` lines. Unknown keys and malformed values keep their
    /// defaults.
    pub fn parse(content: &str) -> Self {
        let mut s = Self::default();
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, val)) = line.split_once('=') else { continue };
            let val = val.trim();
            match key.trim() {
                "worker_threads" => {
                    s.worker_threads = val.parse().unwrap_or(s.worker_threads);
                }
                "min_chunk_rows" => {
                    s.min_chunk_rows = val.parse().unwrap_or(s.min_chunk_rows);
                }
                "join_timeout_ms" => {
                    s.join_timeout_ms = val.parse().unwrap_or(s.join_timeout_ms);
                }
                "fence_timeout_ms" => {
                    s.fence_timeout_ms = val.parse().unwrap_or(s.fence_timeout_ms);
                }
                "nan_as_transparent" => {
                    s.nan_as_transparent = val == "true";
                }
                "preferred_gpu" => {
                    s.preferred_gpu = val.to_string();
                }
                "generate_mipmaps" => {
                    s.generate_mipmaps = val != "false";
                }
                "log_level" => {
                    s.log_level = val.parse().unwrap_or(s.log_level);
                }
                other => {
                    log::debug!("ignoring unknown setting '{other}'");
                }
            }
        }
        s
    }

    pub fn to_config_string(&self) -> String {
        format!(
            "worker_threads={}\n\
             min_chunk_rows={}\n\
             join_timeout_ms={}\n\
             fence_timeout_ms={}\n\
             nan_as_transparent={}\n\
             preferred_gpu={}\n\
             generate_mipmaps={}\n\
             log_level={}\n",
            self.worker_threads,
            self.min_chunk_rows,
            self.join_timeout_ms,
            self.fence_timeout_ms,
            self.nan_as_transparent,
            self.preferred_gpu,
            self.generate_mipmaps,
            self.log_level.as_str().to_lowercase(),
        )
    }

    /// Load from disk. A missing file yields defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        match std::fs::read_to_string(path.as_ref()) {
            Ok(content) => Ok(Self::parse(&content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e.into()),
        }
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.to_config_string())?;
        Ok(())
    }

    /// Resolved worker count (never 0).
    pub fn workers(&self) -> usize {
        if self.worker_threads > 0 {
            self.worker_threads
        } else {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        }
    }

    pub fn join_timeout(&self) -> Option<Duration> {
        (self.join_timeout_ms > 0).then(|| Duration::from_millis(self.join_timeout_ms))
    }

    pub fn fence_timeout(&self) -> Duration {
        Duration::from_millis(self.fence_timeout_ms)
    }

    pub fn convert_options(&self) -> ConvertOptions {
        ConvertOptions::default().nan_as_transparent(self.nan_as_transparent)
    }
}
