use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::config;
use crate::error::{Result, SyncError};
use crate::policy::Policy;

/// The settings document, read and written as a whole. The allow/deny
/// lists live at the top level of the same JSON object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub concepts_library_url: String,
    pub embeddings_dir: PathBuf,
    pub embeddings_samples_dir: PathBuf,
    #[serde(flatten)]
    pub policy: Policy,
    pub download_images: bool,
    pub max_images: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            concepts_library_url: config::settings::DEFAULT_LIBRARY_URL.to_string(),
            embeddings_dir: PathBuf::from(config::settings::DEFAULT_EMBEDDINGS_DIR),
            embeddings_samples_dir: PathBuf::from(config::settings::DEFAULT_SAMPLES_DIR),
            policy: Policy::default(),
            download_images: false,
            max_images: config::settings::DEFAULT_MAX_IMAGES,
        }
    }
}

impl Settings {
    /// Local path of a repository's primary artifact.
    pub fn embedding_path(&self, stem: &str) -> PathBuf {
        self.embeddings_dir
            .join(format!("{stem}.{}", config::artifacts::EMBEDDING_LOCAL_EXT))
    }

    /// Local path of one preview image.
    pub fn image_path(&self, stem: &str, index: u32) -> PathBuf {
        self.embeddings_samples_dir
            .join(format!("{stem}.{index}.jpeg"))
    }
}

/// Load the settings document, creating it with defaults when absent.
/// A document that does not match the schema is a fatal error.
pub fn load(path: &Path) -> Result<Settings> {
    if !path.exists() {
        let settings = Settings::default();
        save(path, &settings)?;
        log::info!("Initialized settings document at {}", path.display());
        return Ok(settings);
    }

    let raw = fs::read_to_string(path).map_err(|e| SyncError::io(path, e))?;
    let mut settings: Settings =
        serde_json::from_str(&raw).map_err(|e| SyncError::Settings {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
    settings.policy.normalize();
    Ok(settings)
}

/// Write the whole document back, serializing full records even when the
/// input used bare id strings.
pub fn save(path: &Path, settings: &Settings) -> Result<()> {
    let json = serde_json::to_string_pretty(settings).map_err(|e| SyncError::Settings {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    fs::write(path, json).map_err(|e| SyncError::io(path, e))?;
    Ok(())
}

/// Create the artifact directories when missing. The samples directory is
/// only needed when image sync is on.
pub fn ensure_dirs(settings: &Settings) -> Result<()> {
    fs::create_dir_all(&settings.embeddings_dir)
        .map_err(|e| SyncError::io(&settings.embeddings_dir, e))?;
    if settings.download_images {
        fs::create_dir_all(&settings.embeddings_samples_dir)
            .map_err(|e| SyncError::io(&settings.embeddings_samples_dir, e))?;
    }
    Ok(())
}
