use crate::config::AppConfig;
use crate::services::staging::{StagingArea, StorageError};
use std::sync::Arc;
use tracing::info;

pub async fn setup_staging(config: &AppConfig) -> Result<Arc<StagingArea>, StorageError> {
    let staging = StagingArea::new(&config.upload_folder).await?;
    info!("📂 Staging uploads in {}", staging.root().display());
    Ok(Arc::new(staging))
}
