use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use thiserror::Error;
use tokio::process::Command;

use crate::config::RelayConfig;

/// Raw result of one extractor run, before it is classified by the pool.
#[derive(Debug, Clone)]
pub struct ProcessOutput {
    pub success: bool,
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

#[derive(Error, Debug)]
pub enum ProcessorError {
    #[error("Input file not found: {}", .0.display())]
    InputMissing(PathBuf),

    #[error("Failed to start extractor `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Processing pool is closed")]
    PoolClosed,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Trait for shape extraction backends
#[async_trait]
pub trait ShapeExtractor: Send + Sync {
    /// Run extraction for `input`, writing artifacts into `output_dir`.
    ///
    /// Dropping the returned future must stop the underlying work.
    async fn extract(&self, input: &Path, output_dir: &Path)
    -> Result<ProcessOutput, ProcessorError>;

    /// Check if the extractor can be started at all
    async fn health_check(&self) -> bool;
}

/// Runs an external program as `<program> <args...> <input> <output_dir>`.
///
/// Paths are passed as separate argv entries, never through a shell string.
#[derive(Debug, Clone)]
pub struct CommandExtractor {
    program: String,
    args: Vec<String>,
}

impl CommandExtractor {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    pub fn from_config(config: &RelayConfig) -> Self {
        Self::new(
            config.extractor_program.clone(),
            config.extractor_args.clone(),
        )
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    fn resolve_program(&self) -> Option<PathBuf> {
        let program = Path::new(&self.program);
        if program.components().count() > 1 {
            return program.is_file().then(|| program.to_path_buf());
        }

        let path_var = std::env::var_os("PATH")?;
        std::env::split_paths(&path_var)
            .map(|dir| dir.join(program))
            .find(|candidate| candidate.is_file())
    }
}

#[async_trait]
impl ShapeExtractor for CommandExtractor {
    async fn extract(
        &self,
        input: &Path,
        output_dir: &Path,
    ) -> Result<ProcessOutput, ProcessorError> {
        if !tokio::fs::try_exists(input).await.unwrap_or(false) {
            return Err(ProcessorError::InputMissing(input.to_path_buf()));
        }
        tokio::fs::create_dir_all(output_dir).await?;

        tracing::debug!(
            program = %self.program,
            input = %input.display(),
            output_dir = %output_dir.display(),
            "Spawning extractor"
        );

        let child = Command::new(&self.program)
            .args(&self.args)
            .arg(input)
            .arg(output_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ProcessorError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        let output = child.wait_with_output().await?;

        Ok(ProcessOutput {
            success: output.status.success(),
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    async fn health_check(&self) -> bool {
        let extractor = self.clone();
        tokio::task::spawn_blocking(move || extractor.resolve_program().is_some())
            .await
            .unwrap_or(false)
    }
}
