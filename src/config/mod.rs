use serde::Serialize;
use std::env;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use utoipa::ToSchema;

/// Where the external extractor writes its artifacts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "kebab-case")]
pub enum OutputLayout {
    /// Every job writes into the output root. Artifacts cannot be attributed
    /// to the upload that produced them.
    Shared,
    /// Each job writes into `<output>/<job-id>/`.
    PerJob,
}

impl FromStr for OutputLayout {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "shared" => Ok(Self::Shared),
            "per-job" | "per_job" | "perjob" => Ok(Self::PerJob),
            other => Err(format!("unknown output layout '{}'", other)),
        }
    }
}

impl fmt::Display for OutputLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Shared => f.write_str("shared"),
            Self::PerJob => f.write_str("per-job"),
        }
    }
}

/// Runtime configuration for the relay
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Directory receiving uploaded images (default: "uploads")
    pub uploads_dir: PathBuf,

    /// Directory the extractor writes artifacts into (default: "output")
    pub output_dir: PathBuf,

    /// Program used to run the extractor (default: "venv/bin/python")
    pub extractor_program: String,

    /// Arguments placed before `<input> <output_dir>`
    pub extractor_args: Vec<String>,

    /// Maximum upload size in bytes (default: 50 MB)
    pub max_file_size: usize,

    /// Extractor processes allowed to run at once (default: 4)
    pub max_concurrent_jobs: usize,

    /// Per-job timeout in seconds, 0 disables it (default: 120)
    pub job_timeout_secs: u64,

    pub output_layout: OutputLayout,

    /// Age after which uploads and artifacts are swept, 0 keeps them forever (default: 0)
    pub retention_hours: u64,

    /// Interval between retention sweeps (default: 3600)
    pub retention_sweep_secs: u64,

    /// Listen port (default: 3001)
    pub port: u16,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            uploads_dir: PathBuf::from("uploads"),
            output_dir: PathBuf::from("output"),
            extractor_program: "venv/bin/python".to_string(),
            extractor_args: vec!["components/ImageProcessing/extract_shapes.py".to_string()],
            max_file_size: 50 * 1024 * 1024, // 50 MB
            max_concurrent_jobs: 4,
            job_timeout_secs: 120,
            output_layout: OutputLayout::Shared,
            retention_hours: 0,
            retention_sweep_secs: 3600,
            port: 3001,
        }
    }
}

impl RelayConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup, falling back to defaults
    /// for anything missing or unparsable.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let default = Self::default();

        Self {
            uploads_dir: lookup("UPLOADS_DIR")
                .map(PathBuf::from)
                .unwrap_or(default.uploads_dir),

            output_dir: lookup("OUTPUT_DIR")
                .map(PathBuf::from)
                .unwrap_or(default.output_dir),

            extractor_program: lookup("EXTRACTOR_PROGRAM").unwrap_or(default.extractor_program),

            extractor_args: lookup("EXTRACTOR_ARGS")
                .map(|v| v.split_whitespace().map(str::to_string).collect())
                .unwrap_or(default.extractor_args),

            max_file_size: lookup("MAX_FILE_SIZE")
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.max_file_size),

            max_concurrent_jobs: lookup("MAX_CONCURRENT_JOBS")
                .and_then(|v| v.parse().ok())
                .filter(|n: &usize| *n > 0)
                .unwrap_or(default.max_concurrent_jobs),

            job_timeout_secs: lookup("JOB_TIMEOUT_SECS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.job_timeout_secs),

            output_layout: lookup("OUTPUT_LAYOUT")
                .and_then(|v| match v.parse() {
                    Ok(layout) => Some(layout),
                    Err(e) => {
                        tracing::warn!("Ignoring OUTPUT_LAYOUT: {}", e);
                        None
                    }
                })
                .unwrap_or(default.output_layout),

            retention_hours: lookup("RETENTION_HOURS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.retention_hours),

            retention_sweep_secs: lookup("RETENTION_SWEEP_SECS")
                .and_then(|v| v.parse().ok())
                .filter(|n: &u64| *n > 0)
                .unwrap_or(default.retention_sweep_secs),

            port: lookup("PORT")
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.port),
        }
    }

    /// Create config for local development (per-job output, short timeout)
    pub fn development() -> Self {
        Self {
            output_layout: OutputLayout::PerJob,
            job_timeout_secs: 30,
            max_concurrent_jobs: 2,
            ..Self::default()
        }
    }

    pub fn job_timeout(&self) -> Option<Duration> {
        (self.job_timeout_secs > 0).then(|| Duration::from_secs(self.job_timeout_secs))
    }

    pub fn retention(&self) -> Option<Duration> {
        (self.retention_hours > 0)
            .then(|| Duration::from_secs(self.retention_hours.saturating_mul(3600)))
    }
}
