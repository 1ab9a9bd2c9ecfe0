use std::path::PathBuf;

use derive_new::new;
use snafu::{Location, ResultExt, Snafu};

use crate::model::LocationDescriptor;

pub type Result<T, E = StoreError> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
pub enum StoreError {
    /// could not write the saved location
    #[snafu(display("could not write the saved location to {}", path.display()))]
    Write {
        path: PathBuf,
        source: std::io::Error,
        #[snafu(implicit)]
        location: Location,
    },

    /// could not remove the saved location
    #[snafu(display("could not remove the saved location at {}", path.display()))]
    Remove {
        path: PathBuf,
        source: std::io::Error,
        #[snafu(implicit)]
        location: Location,
    },

    /// could not encode the location for saving
    Encode {
        source: serde_json::Error,
        #[snafu(implicit)]
        location: Location,
    },
}

/// The single saved-location slot: one JSON file holding the last descriptor
/// that resolved successfully. Read once at startup, rewritten on every
/// successful resolution.
#[derive(Debug, Clone, new)]
pub struct LocationStore {
    path: PathBuf,
}

impl LocationStore {
    pub fn default_path() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("vakit")
            .join("location.json")
    }

    /// A missing slot is simply empty; a corrupt one is discarded and
    /// cleared so it cannot wedge every subsequent startup.
    pub async fn load(&self) -> Option<LocationDescriptor> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return None,
            Err(err) => {
                tracing::warn!("could not read the saved location: {err}");
                return None;
            }
        };

        match serde_json::from_slice(&bytes) {
            Ok(descriptor) => Some(descriptor),
            Err(err) => {
                tracing::warn!("discarding corrupt saved location: {err}");
                if let Err(err) = self.clear().await {
                    tracing::warn!("{err}");
                }
                None
            }
        }
    }

    pub async fn save(&self, descriptor: &LocationDescriptor) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await.context(WriteSnafu {
                path: self.path.clone(),
            })?;
        }

        let json = serde_json::to_vec_pretty(descriptor).context(EncodeSnafu)?;
        tokio::fs::write(&self.path, json).await.context(WriteSnafu {
            path: self.path.clone(),
        })
    }

    pub async fn clear(&self) -> Result<()> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err).context(RemoveSnafu {
                path: self.path.clone(),
            }),
        }
    }
}
