use crate::config::RelayConfig;
use crate::services::storage::LocalStorage;
use anyhow::Context;
use std::sync::Arc;
use tracing::info;

pub async fn setup_storage(config: &RelayConfig) -> anyhow::Result<Arc<LocalStorage>> {
    let staging = LocalStorage::new(&config.uploads_dir, &config.output_dir);
    staging.ensure_dirs().await?;

    // Returned paths are absolute, so resolve the directories once up front
    let uploads_dir = tokio::fs::canonicalize(&config.uploads_dir)
        .await
        .with_context(|| format!("Failed to resolve {}", config.uploads_dir.display()))?;
    let output_dir = tokio::fs::canonicalize(&config.output_dir)
        .await
        .with_context(|| format!("Failed to resolve {}", config.output_dir.display()))?;

    info!("📁 Uploads directory: {}", uploads_dir.display());
    info!("📁 Output directory: {} ({} layout)", output_dir.display(), config.output_layout);

    Ok(Arc::new(LocalStorage::new(uploads_dir, output_dir)))
}
