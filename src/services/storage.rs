use anyhow::{Context, Result};
use chrono::Utc;
use percent_encoding::{AsciiSet, CONTROLS, utf8_percent_encode};
use sha2::{Digest, Sha256};
use std::ffi::OsStr;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use crate::config::OutputLayout;
use crate::utils::hash::finalize_hex;
use crate::utils::validation::{safe_join, sanitize_filename};

/// URL prefix the output directory is mounted under.
pub const OUTPUT_MOUNT: &str = "/output";
/// URL prefix the uploads directory is mounted under.
pub const UPLOADS_MOUNT: &str = "/uploads";

// Characters escaped inside a single URL path segment
const SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

const MAX_NAME_ATTEMPTS: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StaticArea {
    Uploads,
    Output,
}

#[derive(Debug, Clone)]
pub struct StoredUpload {
    pub filename: String,
    pub path: PathBuf,
    pub size: u64,
    pub sha256: String,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub files_removed: usize,
    pub dirs_removed: usize,
}

/// Streams one upload to disk while hashing it.
///
/// Nothing is visible under the final name until the file is created, but the
/// file is written in place, so call [`UploadWriter::abort`] on failure to
/// remove the partial data.
pub struct UploadWriter {
    file: File,
    path: PathBuf,
    filename: String,
    hasher: Sha256,
    size: u64,
}

impl UploadWriter {
    /// Create `<dir>/<unix-millis>-<sanitized name>`, adding a short suffix if
    /// that name is already taken.
    pub async fn create(dir: &Path, original_name: &str) -> Result<Self> {
        let sanitized = sanitize_filename(original_name);
        let millis = Utc::now().timestamp_millis();

        for attempt in 0..MAX_NAME_ATTEMPTS {
            let filename = if attempt == 0 {
                format!("{}-{}", millis, sanitized)
            } else {
                format!("{}-{}", millis, with_suffix(&sanitized))
            };
            let path = dir.join(&filename);

            match OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await
            {
                Ok(file) => {
                    return Ok(Self {
                        file,
                        path,
                        filename,
                        hasher: Sha256::new(),
                        size: 0,
                    });
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    tracing::debug!("Upload name {} taken, retrying", filename);
                }
                Err(e) => {
                    return Err(e).with_context(|| format!("Failed to create {}", path.display()));
                }
            }
        }

        anyhow::bail!(
            "Could not find a free upload name for '{}' after {} attempts",
            sanitized,
            MAX_NAME_ATTEMPTS
        )
    }

    pub async fn write_chunk(&mut self, chunk: &[u8]) -> Result<()> {
        self.hasher.update(chunk);
        self.file.write_all(chunk).await?;
        self.size += chunk.len() as u64;
        Ok(())
    }

    pub async fn finish(mut self) -> Result<StoredUpload> {
        self.file.flush().await?;
        Ok(StoredUpload {
            filename: self.filename,
            path: self.path,
            size: self.size,
            sha256: finalize_hex(self.hasher),
        })
    }

    pub async fn abort(self) {
        drop(self.file);
        if let Err(e) = tokio::fs::remove_file(&self.path).await {
            tracing::warn!("Failed to remove partial upload {}: {}", self.path.display(), e);
        }
    }
}

fn with_suffix(name: &str) -> String {
    let suffix = &Uuid::new_v4().simple().to_string()[..8];
    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => format!("{}-{}.{}", stem, suffix, ext),
        _ => format!("{}-{}", name, suffix),
    }
}

fn mount_url(mount: &str, segments: &[&str]) -> String {
    let mut url = mount.to_string();
    for segment in segments {
        url.push('/');
        url.extend(utf8_percent_encode(segment, SEGMENT));
    }
    url
}

/// Build a relative URL under [`OUTPUT_MOUNT`] from path segments.
pub fn output_url(segments: &[&str]) -> String {
    mount_url(OUTPUT_MOUNT, segments)
}

/// Relative URL of a stored upload under [`UPLOADS_MOUNT`].
pub fn uploads_url(filename: &str) -> String {
    mount_url(UPLOADS_MOUNT, &[filename])
}

/// The entry name as a URL segment the static routes can resolve again.
/// Hidden, non-UTF-8 and backslash-bearing names are left out.
fn servable_name(name: &OsStr, dir: &Path) -> Option<String> {
    let Some(name) = name.to_str() else {
        tracing::warn!(
            "Skipping non UTF-8 entry {:?} in {}",
            name,
            dir.display()
        );
        return None;
    };
    if name.starts_with('.') {
        return None;
    }
    if name.contains('\\') {
        tracing::warn!("Skipping unservable entry {:?} in {}", name, dir.display());
        return None;
    }
    Some(name.to_string())
}

/// Names of the regular, non-hidden files directly inside `dir`, sorted.
pub async fn list_artifacts(dir: &Path) -> Result<Vec<String>> {
    let mut names = Vec::new();
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .with_context(|| format!("Failed to read {}", dir.display()))?;

    while let Some(entry) = entries.next_entry().await? {
        let Some(name) = servable_name(&entry.file_name(), dir) else {
            continue;
        };
        if entry.file_type().await?.is_file() {
            names.push(name);
        }
    }

    names.sort();
    Ok(names)
}

/// Local filesystem storage backing the uploads and output mounts.
#[derive(Debug, Clone)]
pub struct LocalStorage {
    uploads_dir: PathBuf,
    output_dir: PathBuf,
}

impl LocalStorage {
    pub fn new(uploads_dir: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            uploads_dir: uploads_dir.into(),
            output_dir: output_dir.into(),
        }
    }

    pub fn uploads_dir(&self) -> &Path {
        &self.uploads_dir
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub async fn ensure_dirs(&self) -> Result<()> {
        for dir in [&self.uploads_dir, &self.output_dir] {
            tokio::fs::create_dir_all(dir)
                .await
                .with_context(|| format!("Failed to create {}", dir.display()))?;
        }
        Ok(())
    }

    pub async fn create_upload(&self, original_name: &str) -> Result<UploadWriter> {
        UploadWriter::create(&self.uploads_dir, original_name).await
    }

    /// Directory a job's extractor should write into.
    pub async fn job_output_dir(&self, layout: OutputLayout, job_id: Uuid) -> Result<PathBuf> {
        let dir = match layout {
            OutputLayout::Shared => self.output_dir.clone(),
            OutputLayout::PerJob => self.output_dir.join(job_id.to_string()),
        };
        tokio::fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("Failed to create {}", dir.display()))?;
        Ok(dir)
    }

    /// URLs of the artifacts in a per-job output directory.
    pub async fn job_artifact_urls(&self, job_id: Uuid) -> Result<Vec<String>> {
        let job_dir = job_id.to_string();
        let names = list_artifacts(&self.output_dir.join(&job_dir)).await?;
        Ok(names
            .iter()
            .map(|name| output_url(&[job_dir.as_str(), name.as_str()]))
            .collect())
    }

    /// Every file under the output root as a relative URL, one directory
    /// level deep, sorted. Nothing ties an entry to the upload that produced it.
    pub async fn list_output_urls(&self) -> Result<Vec<String>> {
        let mut urls = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.output_dir)
            .await
            .with_context(|| format!("Failed to read {}", self.output_dir.display()))?;

        while let Some(entry) = entries.next_entry().await? {
            let Some(name) = servable_name(&entry.file_name(), &self.output_dir) else {
                continue;
            };
            let file_type = entry.file_type().await?;
            if file_type.is_file() {
                urls.push(output_url(&[name.as_str()]));
            } else if file_type.is_dir() {
                for child in list_artifacts(&entry.path()).await? {
                    urls.push(output_url(&[name.as_str(), child.as_str()]));
                }
            }
        }

        urls.sort();
        Ok(urls)
    }

    /// Map a static request path onto a file inside one of the mounts.
    pub fn resolve(&self, area: StaticArea, requested: &str) -> Option<PathBuf> {
        let root = match area {
            StaticArea::Uploads => &self.uploads_dir,
            StaticArea::Output => &self.output_dir,
        };
        safe_join(root, requested)
    }

    /// Delete uploads and artifacts last modified before `cutoff`, plus any
    /// job directories left empty.
    pub async fn sweep_older_than(&self, cutoff: SystemTime) -> Result<SweepReport> {
        let mut report = SweepReport::default();
        sweep_dir(&self.uploads_dir, cutoff, &mut report).await?;
        sweep_dir(&self.output_dir, cutoff, &mut report).await?;

        let mut entries = tokio::fs::read_dir(&self.output_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            let dir = entry.path();
            // Checked before sweeping, since removing files bumps the mtime.
            // A fresh directory may belong to a job that has not written yet.
            let recently_touched = entry
                .metadata()
                .await?
                .modified()
                .map(|modified| modified >= cutoff)
                .unwrap_or(true);
            sweep_dir(&dir, cutoff, &mut report).await?;
            if recently_touched {
                continue;
            }
            // Fails while the directory still holds files
            if tokio::fs::remove_dir(&dir).await.is_ok() {
                report.dirs_removed += 1;
            }
        }

        Ok(report)
    }
}

async fn sweep_dir(dir: &Path, cutoff: SystemTime, report: &mut SweepReport) -> Result<()> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let metadata = entry.metadata().await?;
        if !metadata.is_file() {
            continue;
        }
        let modified = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);
        if modified < cutoff {
            match tokio::fs::remove_file(entry.path()).await {
                Ok(()) => report.files_removed += 1,
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => {
                    tracing::warn!("Failed to remove {}: {}", entry.path().display(), e);
                }
            }
        }
    }
    Ok(())
}
