//! Documents on the local filesystem, used in development.

use std::path::PathBuf;

use super::{DocumentError, check_key};

/// Documents stored under a root directory.
#[derive(Debug, Clone)]
pub struct LocalDocuments {
    root: PathBuf,
}

impl LocalDocuments {
    #[must_use]
    pub const fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// Resolve a key to a path, refusing anything that escapes the root.
    fn resolve(&self, key: &str) -> Result<PathBuf, DocumentError> {
        Ok(self.root.join(check_key(key)?))
    }

    pub(super) async fn write(&self, key: &str, bytes: &[u8]) -> Result<(), DocumentError> {
        let path = self.resolve(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, bytes).await?;
        Ok(())
    }

    pub(super) async fn read(&self, key: &str) -> Result<Vec<u8>, DocumentError> {
        let path = self.resolve(key)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(DocumentError::Missing),
            Err(e) => Err(DocumentError::Io(e)),
        }
    }

    pub(super) async fn remove(&self, key: &str) -> Result<(), DocumentError> {
        let path = self.resolve(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(DocumentError::Io(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_stays_under_root() {
        let store = LocalDocuments::new(PathBuf::from("/srv/uploads"));
        assert_eq!(
            store.resolve("7/abc.pdf").ok(),
            Some(PathBuf::from("/srv/uploads/7/abc.pdf"))
        );
        assert!(matches!(store.resolve("7/../../x"), Err(DocumentError::InvalidKey)));
    }
}
