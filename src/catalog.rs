//! Lookup of installed applications by bundle id.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::CatalogError;

/// Location of one installed application on the device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstalledApp {
    /// Data container; becomes the process working directory.
    #[serde(rename = "Container")]
    pub container: String,
    /// Bundle directory holding the executable.
    #[serde(rename = "Path")]
    pub path: String,
    #[serde(rename = "CFBundleExecutable")]
    pub executable: String,
}

impl InstalledApp {
    /// `argv[0]` for a launch: `<path>/<executable>`.
    #[must_use]
    pub fn executable_path(&self) -> String {
        format!("{}/{}", self.path, self.executable)
    }
}

/// Source of installed-application metadata.
pub trait AppCatalog: Send + Sync {
    fn lookup(&self, bundle_id: &str) -> Option<InstalledApp>;
}

impl AppCatalog for HashMap<String, InstalledApp> {
    fn lookup(&self, bundle_id: &str) -> Option<InstalledApp> {
        self.get(bundle_id).cloned()
    }
}

/// Catalog loaded from a JSON object keyed by bundle id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JsonAppCatalog {
    apps: HashMap<String, InstalledApp>,
}

impl JsonAppCatalog {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|source| CatalogError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let apps = serde_json::from_str(&raw).map_err(|source| CatalogError::Json {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self { apps })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.apps.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.apps.is_empty()
    }
}

impl AppCatalog for JsonAppCatalog {
    fn lookup(&self, bundle_id: &str) -> Option<InstalledApp> {
        self.apps.lookup(bundle_id)
    }
}
