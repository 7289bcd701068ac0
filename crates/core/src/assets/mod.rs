use std::{
    fmt,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use crate::{EffectError, Result};

/// Opaque reference to a recorded audio resource. The recording subsystem
/// owns the bytes; the effect engine only borrows the handle.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AssetHandle {
    path: PathBuf,
}

impl AssetHandle {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl fmt::Display for AssetHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path.display())
    }
}

/// Read-only view over wherever recordings are kept.
pub trait AssetStore {
    fn exists(&self, asset: &AssetHandle) -> bool;

    /// Resolves the handle to an absolute location, used when handing the
    /// recording to a sharing target.
    fn absolute_path(&self, asset: &AssetHandle) -> Result<PathBuf>;
}

/// Asset store backed by the local filesystem. Relative handles are resolved
/// against `root`.
#[derive(Debug, Clone)]
pub struct FileAssetStore {
    root: PathBuf,
}

impl FileAssetStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns a handle for a file named relative to the store root.
    pub fn handle(&self, name: impl AsRef<Path>) -> AssetHandle {
        AssetHandle::new(self.root.join(name))
    }

    fn resolve(&self, asset: &AssetHandle) -> PathBuf {
        if asset.path().is_absolute() {
            asset.path().to_path_buf()
        } else {
            self.root.join(asset.path())
        }
    }
}

impl AssetStore for FileAssetStore {
    fn exists(&self, asset: &AssetHandle) -> bool {
        self.resolve(asset).is_file()
    }

    fn absolute_path(&self, asset: &AssetHandle) -> Result<PathBuf> {
        if !self.exists(asset) {
            return Err(EffectError::AssetMissing(asset.clone()));
        }
        Ok(std::fs::canonicalize(self.resolve(asset))?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_existing_recordings() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("take.aac"), b"aac").unwrap();
        let store = FileAssetStore::new(dir.path());

        let relative = AssetHandle::new("take.aac");
        assert!(store.exists(&relative));
        assert!(store.exists(&store.handle("take.aac")));

        let path = store.absolute_path(&relative).unwrap();
        assert!(path.is_absolute());
        assert!(path.ends_with("take.aac"));
    }

    #[test]
    fn errors_on_missing_recordings() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileAssetStore::new(dir.path());
        let missing = AssetHandle::new("missing.aac");

        assert!(!store.exists(&missing));
        let err = store.absolute_path(&missing).unwrap_err();
        assert!(matches!(err, EffectError::AssetMissing(_)));
        assert!(format!("{err}").contains("missing.aac"));
    }

    #[test]
    fn directories_are_not_recordings() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();
        let store = FileAssetStore::new(dir.path());

        assert!(!store.exists(&AssetHandle::new("nested")));
    }
}
