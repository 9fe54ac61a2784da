//! Request-scoped artifact storage
//!
//! Outputs are staged in an [`ArtifactSink`] under a unique key while a
//! response is prepared. A [`StagedArtifact`] guard removes its object when
//! dropped, so nothing outlives the request that produced it.

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use rand::RngCore;
use tempfile::TempDir;
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Produces unique artifact keys
pub trait IdGenerator: Send + Sync {
    fn next_id(&self) -> String;
}

/// 128 random bits, hex encoded
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomIds;

impl IdGenerator for RandomIds {
    fn next_id(&self) -> String {
        let mut bytes = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut bytes);
        hex::encode(bytes)
    }
}

/// `000001`, `000002`, ...
#[derive(Debug, Default)]
pub struct SequentialIds {
    next: AtomicU64,
}

impl IdGenerator for SequentialIds {
    fn next_id(&self) -> String {
        let n = self.next.fetch_add(1, Ordering::Relaxed) + 1;
        format!("{n:06}")
    }
}

/// Keyed byte storage
pub trait ArtifactSink: Send + Sync {
    fn put(&self, key: &str, bytes: &[u8]) -> Result<()>;
    fn get(&self, key: &str) -> Result<Vec<u8>>;
    /// Removing a missing key is not an error.
    fn remove(&self, key: &str) -> Result<()>;
    fn contains(&self, key: &str) -> bool;
}

/// Files in a private temporary directory, deleted with the sink
#[derive(Debug)]
pub struct TempDirSink {
    dir: TempDir,
}

impl TempDirSink {
    /// Create the directory under the system temp dir, or under `parent`.
    pub fn new(parent: Option<&Path>) -> Result<Self> {
        let builder = {
            let mut builder = tempfile::Builder::new();
            builder.prefix("pdfmaster-");
            builder
        };
        let dir = match parent {
            Some(parent) => {
                fs::create_dir_all(parent)?;
                builder.tempdir_in(parent)?
            }
            None => builder.tempdir()?,
        };
        debug!(path = %dir.path().display(), "Artifact directory created");
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    fn file(&self, key: &str) -> Result<PathBuf> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
            && !key.starts_with('.');
        if !valid {
            return Err(Error::internal(format!("invalid artifact key '{key}'")));
        }
        Ok(self.dir.path().join(key))
    }
}

impl ArtifactSink for TempDirSink {
    fn put(&self, key: &str, bytes: &[u8]) -> Result<()> {
        fs::write(self.file(key)?, bytes)?;
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Vec<u8>> {
        Ok(fs::read(self.file(key)?)?)
    }

    fn remove(&self, key: &str) -> Result<()> {
        match fs::remove_file(self.file(key)?) {
            Err(e) if e.kind() != ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }

    fn contains(&self, key: &str) -> bool {
        self.file(key).map(|path| path.is_file()).unwrap_or(false)
    }
}

/// In-process storage
#[derive(Debug, Default)]
pub struct MemorySink {
    objects: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.lock().map(|objects| objects.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, Vec<u8>>>> {
        self.objects
            .lock()
            .map_err(|_| Error::internal("artifact store lock poisoned"))
    }
}

impl ArtifactSink for MemorySink {
    fn put(&self, key: &str, bytes: &[u8]) -> Result<()> {
        self.lock()?.insert(key.to_string(), bytes.to_vec());
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Vec<u8>> {
        self.lock()?
            .get(key)
            .cloned()
            .ok_or_else(|| Error::internal(format!("artifact '{key}' not found")))
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.lock()?.remove(key);
        Ok(())
    }

    fn contains(&self, key: &str) -> bool {
        self.lock()
            .map(|objects| objects.contains_key(key))
            .unwrap_or(false)
    }
}

/// Stages artifacts in a sink under generated keys
#[derive(Clone)]
pub struct ArtifactStore {
    sink: Arc<dyn ArtifactSink>,
    ids: Arc<dyn IdGenerator>,
}

impl fmt::Debug for ArtifactStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArtifactStore").finish_non_exhaustive()
    }
}

impl ArtifactStore {
    pub fn new(sink: Arc<dyn ArtifactSink>, ids: Arc<dyn IdGenerator>) -> Self {
        Self { sink, ids }
    }

    /// In-memory store with sequential keys.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemorySink::new()), Arc::new(SequentialIds::default()))
    }

    pub fn sink(&self) -> &Arc<dyn ArtifactSink> {
        &self.sink
    }

    /// Store `bytes` as `<prefix>_<id>.<ext>`.
    pub fn stage(&self, prefix: &str, ext: &str, bytes: &[u8]) -> Result<StagedArtifact> {
        let key = format!("{prefix}_{}.{ext}", self.ids.next_id());
        self.sink.put(&key, bytes)?;
        debug!(key = %key, bytes = bytes.len(), "Artifact staged");
        Ok(StagedArtifact {
            key,
            sink: Arc::clone(&self.sink),
        })
    }
}

/// A staged object; removed from its sink on drop
pub struct StagedArtifact {
    key: String,
    sink: Arc<dyn ArtifactSink>,
}

impl StagedArtifact {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn read(&self) -> Result<Vec<u8>> {
        self.sink.get(&self.key)
    }
}

impl fmt::Debug for StagedArtifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StagedArtifact")
            .field("key", &self.key)
            .finish()
    }
}

impl Drop for StagedArtifact {
    fn drop(&mut self) {
        match self.sink.remove(&self.key) {
            Ok(()) => debug!(key = %self.key, "Artifact removed"),
            Err(e) => warn!(key = %self.key, "Failed to remove artifact: {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_sequential_ids() {
        let ids = SequentialIds::default();
        assert_eq!(ids.next_id(), "000001");
        assert_eq!(ids.next_id(), "000002");
    }

    #[test]
    fn test_random_ids_are_hex_and_distinct() {
        let a = RandomIds.next_id();
        let b = RandomIds.next_id();
        assert_eq!(a.len(), 32);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }

    #[test]
    fn test_staged_artifact_removed_on_drop() {
        let sink = Arc::new(MemorySink::new());
        let store = ArtifactStore::new(sink.clone(), Arc::new(SequentialIds::default()));

        let staged = store.stage("merged", "pdf", b"%PDF-1.5").unwrap();
        assert_eq!(staged.key(), "merged_000001.pdf");
        assert!(sink.contains("merged_000001.pdf"));
        assert_eq!(staged.read().unwrap(), b"%PDF-1.5");

        drop(staged);
        assert!(sink.is_empty());
    }

    #[test]
    fn test_staged_artifact_removed_on_early_return() {
        fn fails_after_staging(store: &ArtifactStore) -> Result<()> {
            let _staged = store.stage("tmp", "bin", b"x")?;
            Err(Error::invalid_input("boom"))
        }

        let sink = Arc::new(MemorySink::new());
        let store = ArtifactStore::new(sink.clone(), Arc::new(SequentialIds::default()));
        assert!(fails_after_staging(&store).is_err());
        assert!(sink.is_empty());
    }

    #[test]
    fn test_temp_dir_sink() {
        let parent = tempfile::tempdir().unwrap();
        let sink = TempDirSink::new(Some(parent.path())).unwrap();
        assert!(sink.path().starts_with(parent.path()));

        sink.put("a.bin", b"abc").unwrap();
        assert!(sink.contains("a.bin"));
        assert_eq!(sink.get("a.bin").unwrap(), b"abc");
        sink.remove("a.bin").unwrap();
        sink.remove("a.bin").unwrap();
        assert!(!sink.contains("a.bin"));

        assert!(sink.put("../escape", b"x").is_err());
        assert!(sink.put("", b"x").is_err());
    }

    #[test]
    fn test_temp_dir_removed_with_sink() {
        let sink = TempDirSink::new(None).unwrap();
        let path = sink.path().to_path_buf();
        sink.put("k.txt", b"v").unwrap();
        drop(sink);
        assert!(!path.exists());
    }
}
