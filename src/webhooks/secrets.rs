//! Per-hook shared secrets.
//!
//! The secret file is a JSON object mapping hook names to secrets:
//!
//! ```json
//! { "codenames": "…", "apps-wiki": "…", "jeeves": "…" }
//! ```
//!
//! The receiver reads it on every verification so rotations take effect
//! without a restart. Nothing is cached between requests.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Errors loading the secret file.
#[derive(Debug, Error)]
pub enum SecretsError {
    #[error("failed to read secrets file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("secrets file {path} is not a JSON object of strings: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// A snapshot of hook-name to shared-secret mappings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SecretStore {
    secrets: HashMap<String, String>,
}

impl SecretStore {
    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        SecretStore {
            secrets: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Parses a JSON object of `hook -> secret`.
    pub fn from_json(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        let secrets: HashMap<String, String> = serde_json::from_slice(bytes)?;
        Ok(SecretStore { secrets })
    }

    /// Returns the secret bytes for `hook`, if one is registered.
    pub fn get(&self, hook: &str) -> Option<&[u8]> {
        self.secrets.get(hook).map(String::as_bytes)
    }

    pub fn len(&self) -> usize {
        self.secrets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.secrets.is_empty()
    }
}

/// Somewhere secrets can be loaded from.
///
/// The receiver holds one of these and calls [`SecretSource::load`] once per
/// request.
pub trait SecretSource: Send + Sync {
    fn load(&self) -> Result<SecretStore, SecretsError>;
}

/// Secrets read from a JSON file on every load.
#[derive(Debug, Clone)]
pub struct SecretsFile {
    path: PathBuf,
}

impl SecretsFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        SecretsFile { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SecretSource for SecretsFile {
    fn load(&self) -> Result<SecretStore, SecretsError> {
        let bytes = std::fs::read(&self.path).map_err(|source| SecretsError::Read {
            path: self.path.clone(),
            source,
        })?;
        SecretStore::from_json(&bytes).map_err(|source| SecretsError::Parse {
            path: self.path.clone(),
            source,
        })
    }
}

/// A fixed store, mostly useful in tests.
impl SecretSource for SecretStore {
    fn load(&self) -> Result<SecretStore, SecretsError> {
        Ok(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn loads_json_object() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("secrets.json");
        std::fs::write(&path, r#"{"codenames": "abc", "jeeves": "def"}"#).unwrap();

        let store = SecretsFile::new(&path).load().unwrap();
        assert_eq!(store.len(), 2);
        assert_eq!(store.get("codenames"), Some(&b"abc"[..]));
        assert_eq!(store.get("missing"), None);
    }

    #[test]
    fn every_load_rereads_the_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("secrets.json");
        let source = SecretsFile::new(&path);

        std::fs::write(&path, r#"{"codenames": "old"}"#).unwrap();
        assert_eq!(source.load().unwrap().get("codenames"), Some(&b"old"[..]));

        std::fs::write(&path, r#"{"codenames": "rotated"}"#).unwrap();
        assert_eq!(
            source.load().unwrap().get("codenames"),
            Some(&b"rotated"[..])
        );
    }

    #[test]
    fn missing_file_is_read_error() {
        let dir = tempdir().unwrap();
        let source = SecretsFile::new(dir.path().join("nope.json"));
        assert!(matches!(source.load(), Err(SecretsError::Read { .. })));
    }

    #[test]
    fn non_string_values_are_parse_errors() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("secrets.json");
        std::fs::write(&path, r#"{"codenames": 42}"#).unwrap();
        assert!(matches!(
            SecretsFile::new(&path).load(),
            Err(SecretsError::Parse { .. })
        ));
    }
}
