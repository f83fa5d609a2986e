//! Compiled kernel artifacts held by the in-memory cache tier.

use std::path::{Path, PathBuf};

use crate::error::CompileError;

/// A compiled kernel binary loaded from the disk cache.
///
/// The bytes are the unmodified output of the external compiler; loading a
/// module onto a device from them is the GPU runtime's concern.
#[derive(Debug, Clone)]
pub struct CachedArtifact {
    bytes: Vec<u8>,
    path: PathBuf,
}

impl CachedArtifact {
    /// Reads an artifact file into memory.
    pub fn load(path: &Path) -> Result<Self, CompileError> {
        let bytes = std::fs::read(path).map_err(|e| CompileError::Io {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Ok(Self {
            bytes,
            path: path.to_path_buf(),
        })
    }

    /// The compiled binary.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// The cache file this artifact was loaded from.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_reads_file_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("0011223344556677.cubin");
        std::fs::write(&path, [0xde, 0xad, 0xbe, 0xef]).unwrap();

        let artifact = CachedArtifact::load(&path).unwrap();
        assert_eq!(artifact.bytes(), &[0xde, 0xad, 0xbe, 0xef]);
        assert_eq!(artifact.path(), path);
    }

    #[test]
    fn load_missing_file_errors() {
        let dir = tempfile::tempdir().unwrap();
        let err = CachedArtifact::load(&dir.path().join("absent.cubin")).unwrap_err();
        assert!(matches!(err, CompileError::Io { .. }));
    }
}
