use crate::config::ModelSettings;
use crate::infrastructure::StartupError;
use crate::services::staging::Stager;
use tracing::info;

pub async fn setup_staging(settings: &ModelSettings) -> Result<Stager, StartupError> {
    let stager = Stager::new(&settings.temp_image_storage_path);
    stager
        .ensure_dir()
        .await
        .map_err(|source| StartupError::StagingDirectory {
            path: settings.temp_image_storage_path.clone(),
            source,
        })?;

    info!("📂 Staging directory: {}", stager.dir().display());
    Ok(stager)
}
