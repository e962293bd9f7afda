//! Export delivery.
//!
//! Delivery is fire-and-forget: a failed delivery is logged and the survey
//! carries on.

use crate::core::export::Export;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;
use tracing::{error, info};

/// Errors that can occur while writing an export.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("IO error writing {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Refusing unsafe export filename: '{0}'")]
    UnsafeFilename(String),
}

/// Makes an export available to the end user.
pub trait FileDelivery {
    fn deliver(&self, export: &Export);
}

/// Writes exports as files into a directory.
#[derive(Debug, Clone)]
pub struct DirectoryDelivery {
    dir: PathBuf,
}

impl DirectoryDelivery {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write the export, returning where it went.
    pub fn write(&self, export: &Export) -> Result<PathBuf, DeliveryError> {
        // Filenames embed host-provided ids
        if export.filename.contains(&['/', '\\'][..]) || export.filename.starts_with('.') {
            return Err(DeliveryError::UnsafeFilename(export.filename.clone()));
        }

        let path = self.dir.join(&export.filename);
        let io_err = |source| DeliveryError::Io {
            path: path.clone(),
            source,
        };

        std::fs::create_dir_all(&self.dir).map_err(io_err)?;
        std::fs::write(&path, export.csv.as_bytes()).map_err(io_err)?;
        Ok(path)
    }
}

impl FileDelivery for DirectoryDelivery {
    fn deliver(&self, export: &Export) {
        match self.write(export) {
            Ok(path) => info!("Exported {} rows to {:?}", export.row_count, path),
            Err(e) => error!("Export delivery failed: {e}"),
        }
    }
}

/// Keeps delivered exports in memory.
#[derive(Debug, Default)]
pub struct CollectingDelivery {
    delivered: Mutex<Vec<Export>>,
}

impl CollectingDelivery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn take(&self) -> Vec<Export> {
        match self.delivered.lock() {
            Ok(mut delivered) => std::mem::take(&mut *delivered),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        }
    }
}

impl FileDelivery for CollectingDelivery {
    fn deliver(&self, export: &Export) {
        match self.delivered.lock() {
            Ok(mut delivered) => delivered.push(export.clone()),
            Err(poisoned) => poisoned.into_inner().push(export.clone()),
        }
    }
}
