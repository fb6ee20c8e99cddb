// ABOUTME: Resolves the running and newly installed PostgreSQL versions.
// ABOUTME: Reads the version manifest and the data directory's PG_VERSION file.

use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::types::{ParseVersionError, Version};

/// Manifest entry for the bundled default version.
pub const DEFAULT_ENTRY: &str = "postgresql";
/// Manifest entry for the installed-but-not-adopted version.
pub const NEW_ENTRY: &str = "postgresql_new";

#[derive(Debug, thiserror::Error)]
pub enum VersionError {
    #[error("cannot read version manifest {path}: {source}")]
    ManifestUnreadable {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("malformed version manifest {path}: {reason}")]
    ManifestMalformed { path: PathBuf, reason: String },

    #[error("version manifest has no '{0}' entry")]
    MissingEntry(String),

    #[error("manifest entry '{name}' has an invalid version: {source}")]
    InvalidEntry {
        name: String,
        source: ParseVersionError,
    },

    #[error("cannot read data directory version {path}: {source}")]
    DataVersionUnreadable {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("data directory version file {path} is invalid: {source}")]
    DataVersionInvalid {
        path: PathBuf,
        source: ParseVersionError,
    },
}

#[derive(Debug, Deserialize)]
struct SoftwareEntry {
    described_version: String,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ManifestDocument {
    Wrapped {
        software: HashMap<String, SoftwareEntry>,
    },
    Bare(HashMap<String, SoftwareEntry>),
}

/// Parsed software manifest.
#[derive(Debug)]
pub struct Manifest {
    software: HashMap<String, SoftwareEntry>,
}

impl Manifest {
    pub fn from_json(path: &Path, json: &str) -> Result<Self, VersionError> {
        let document: ManifestDocument =
            serde_json::from_str(json).map_err(|e| VersionError::ManifestMalformed {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;

        let software = match document {
            ManifestDocument::Wrapped { software } => software,
            ManifestDocument::Bare(software) => software,
        };

        Ok(Self { software })
    }

    /// Version recorded for a software entry, if present.
    pub fn version(&self, name: &str) -> Result<Option<Version>, VersionError> {
        self.software
            .get(name)
            .map(|entry| {
                Version::parse(&entry.described_version).map_err(|source| {
                    VersionError::InvalidEntry {
                        name: name.to_string(),
                        source,
                    }
                })
            })
            .transpose()
    }
}

/// Resolves versions for one installation.
#[derive(Debug, Clone)]
pub struct VersionResolver {
    manifest_path: PathBuf,
    data_dir: PathBuf,
}

impl VersionResolver {
    pub fn new(manifest_path: impl Into<PathBuf>, data_dir: impl Into<PathBuf>) -> Self {
        Self {
            manifest_path: manifest_path.into(),
            data_dir: data_dir.into(),
        }
    }

    pub fn manifest(&self) -> Result<Manifest, VersionError> {
        let json = std::fs::read_to_string(&self.manifest_path).map_err(|source| {
            VersionError::ManifestUnreadable {
                path: self.manifest_path.clone(),
                source,
            }
        })?;
        Manifest::from_json(&self.manifest_path, &json)
    }

    /// The bundled default version, which is what a revert returns to.
    pub fn default_version(&self) -> Result<Version, VersionError> {
        self.manifest()?
            .version(DEFAULT_ENTRY)?
            .ok_or_else(|| VersionError::MissingEntry(DEFAULT_ENTRY.to_string()))
    }

    /// The newly installed version, or `None` when nothing new is bundled.
    pub fn upgrade_version(&self) -> Result<Option<Version>, VersionError> {
        self.manifest()?.version(NEW_ENTRY)
    }

    /// The version the live data directory was initialized with.
    ///
    /// The major comes from `PG_VERSION`; the minor is taken from whichever
    /// manifest entry shares that major.
    pub fn current_version(&self) -> Result<Version, VersionError> {
        let major = self.data_dir_major()?;
        let manifest = self.manifest()?;

        for name in [DEFAULT_ENTRY, NEW_ENTRY] {
            if let Some(version) = manifest.version(name)?
                && version.major == major
            {
                return Ok(version);
            }
        }

        Ok(Version::from_major(major))
    }

    /// Major version stamped into the live data directory.
    pub fn data_dir_major(&self) -> Result<u32, VersionError> {
        read_data_dir_major(&self.data_dir)
    }
}

/// Read `PG_VERSION` from a data directory.
pub fn read_data_dir_major(data_dir: &Path) -> Result<u32, VersionError> {
    let path = data_dir.join("PG_VERSION");
    let content = std::fs::read_to_string(&path).map_err(|source| {
        VersionError::DataVersionUnreadable {
            path: path.clone(),
            source,
        }
    })?;

    Version::parse(&content)
        .map(|v| v.major)
        .map_err(|source| VersionError::DataVersionInvalid { path, source })
}
