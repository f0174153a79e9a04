// src/store/memory.rs

use std::collections::HashMap;
use std::io::{Cursor, Read};
use std::sync::{Arc, Mutex, PoisonError};

use blake3::Hasher;
use tracing::debug;

use crate::errors::{PipelineError, Result};
use crate::store::{new_store_id, ArtifactHandle, ArtifactStore, HandleRegistry, Released};

/// Artifact store that keeps every blob in memory.
///
/// Behaves like [`super::LocalArtifactStore`] (same handle rules, same
/// errors) but never touches the filesystem.
#[derive(Debug)]
pub struct MemoryArtifactStore {
    registry: HandleRegistry,
    blobs: Mutex<HashMap<Arc<str>, Arc<[u8]>>>,
}

impl MemoryArtifactStore {
    pub fn new() -> Self {
        Self {
            registry: HandleRegistry::new(new_store_id()),
            blobs: Mutex::new(HashMap::new()),
        }
    }

    /// Number of distinct blobs held.
    pub fn blob_count(&self) -> usize {
        self.blobs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl Default for MemoryArtifactStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ArtifactStore for MemoryArtifactStore {
    fn put(&self, source: &mut dyn Read) -> Result<ArtifactHandle> {
        let mut content = Vec::new();
        source
            .read_to_end(&mut content)
            .map_err(|e| PipelineError::store_write("reading artifact source", e))?;

        let mut hasher = Hasher::new();
        hasher.update(&content);
        let digest: Arc<str> = Arc::from(hasher.finalize().to_hex().as_str());

        let mut blobs = self.blobs.lock().unwrap_or_else(PoisonError::into_inner);
        blobs
            .entry(digest.clone())
            .or_insert_with(|| Arc::from(content));
        let handle = self.registry.issue(&digest);
        debug!(handle = %handle, "artifact committed (memory)");
        Ok(handle)
    }

    fn get(&self, handle: &ArtifactHandle) -> Result<Box<dyn Read + Send>> {
        let digest = self.registry.resolve(handle)?;
        let blobs = self.blobs.lock().unwrap_or_else(PoisonError::into_inner);
        match blobs.get(&digest) {
            Some(bytes) => Ok(Box::new(Cursor::new(bytes.clone()))),
            None => Err(PipelineError::UnknownHandle(handle.clone())),
        }
    }

    fn delete(&self, handle: &ArtifactHandle) -> Result<()> {
        let mut blobs = self.blobs.lock().unwrap_or_else(PoisonError::into_inner);
        if let Released::Last(digest) = self.registry.release(handle) {
            blobs.remove(&digest);
        }
        Ok(())
    }

    fn contains(&self, handle: &ArtifactHandle) -> bool {
        self.registry.resolve(handle).is_ok()
    }
}
