use crate::config::RelayConfig;
use crate::services::extractor::{CommandExtractor, ShapeExtractor};
use std::sync::Arc;
use tracing::info;

pub async fn setup_extractor(config: &RelayConfig) -> Arc<dyn ShapeExtractor> {
    let extractor = CommandExtractor::from_config(config);

    if extractor.health_check().await {
        info!(
            "🔧 Extractor ready: {} {}",
            extractor.program(),
            config.extractor_args.join(" ")
        );
    } else {
        tracing::warn!(
            "⚠️  Extractor program '{}' not found! Uploads will fail until it is installed.",
            extractor.program()
        );
    }

    Arc::new(extractor)
}
