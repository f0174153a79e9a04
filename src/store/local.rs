// src/store/local.rs

//! On-disk artifact store.
//!
//! Layout of one store instance:
//!
//! ```text
//! <base>/<store-id>/objects/<blake3 digest>   committed blobs
//! <base>/<store-id>/tmp/                      in-flight writes
//! ```
//!
//! Writes stream into a temporary file in `tmp/` while hashing, are synced,
//! and are then renamed into `objects/`. A rename is atomic on the same
//! filesystem, so a blob is either complete or absent.

use std::fs::{self, File};
use std::io::{ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use blake3::Hasher;
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::errors::{PipelineError, Result};
use crate::store::{
    ensure_parent_dir, new_store_id, ArtifactHandle, ArtifactStore, HandleRegistry, Released,
};

const OBJECTS_DIR: &str = "objects";
const TMP_DIR: &str = "tmp";

#[derive(Debug)]
pub struct LocalArtifactStore {
    root: PathBuf,
    registry: HandleRegistry,
    /// Serialises "check blob exists / commit / issue" against "release /
    /// remove blob" so a delete never removes a blob a concurrent put just
    /// decided to reuse.
    commit_lock: Mutex<()>,
}

impl LocalArtifactStore {
    /// Create a fresh store instance in its own directory under `base`.
    pub fn create_in(base: impl AsRef<Path>) -> Result<Self> {
        let store_id = new_store_id();
        let root = base.as_ref().join(&*store_id);

        for dir in [OBJECTS_DIR, TMP_DIR] {
            let path = root.join(dir);
            fs::create_dir_all(&path).map_err(|e| {
                PipelineError::store_write(format!("creating {}", path.display()), e)
            })?;
        }

        info!(store = %store_id, root = %root.display(), "opened local artifact store");

        Ok(Self {
            root,
            registry: HandleRegistry::new(store_id),
            commit_lock: Mutex::new(()),
        })
    }

    /// Directory holding this store instance.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Remove the whole store instance from disk. Reading through its handles
    /// fails afterwards.
    pub fn destroy(&self) -> Result<()> {
        info!(store = %self.registry.store_id(), root = %self.root.display(), "removing artifact store");
        match fs::remove_dir_all(&self.root) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn object_path(&self, digest: &str) -> PathBuf {
        self.root.join(OBJECTS_DIR).join(digest)
    }

    fn write_temp(&self, source: &mut dyn Read) -> Result<(NamedTempFile, String)> {
        let mut tmp = NamedTempFile::new_in(self.root.join(TMP_DIR))
            .map_err(|e| PipelineError::store_write("creating temporary blob", e))?;
        let mut hasher = Hasher::new();
        let mut buf = vec![0u8; 64 * 1024];

        loop {
            let n = source
                .read(&mut buf)
                .map_err(|e| PipelineError::store_write("reading artifact source", e))?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
            tmp.write_all(&buf[..n])
                .map_err(|e| PipelineError::store_write("writing temporary blob", e))?;
        }

        tmp.as_file()
            .sync_all()
            .map_err(|e| PipelineError::store_write("syncing temporary blob", e))?;

        Ok((tmp, hasher.finalize().to_hex().to_string()))
    }
}

impl ArtifactStore for LocalArtifactStore {
    fn put(&self, source: &mut dyn Read) -> Result<ArtifactHandle> {
        let (tmp, digest) = self.write_temp(source)?;
        let dest = self.object_path(&digest);

        let _guard = self.commit_lock.lock().unwrap_or_else(PoisonError::into_inner);
        if dest.exists() && self.registry.is_referenced(&digest) {
            debug!(digest = %digest, "blob already present; reusing");
            // Dropping `tmp` removes the duplicate.
        } else {
            tmp.persist(&dest).map_err(|e| {
                PipelineError::store_write(format!("committing blob {digest}"), e.error)
            })?;
        }

        let handle = self.registry.issue(&digest);
        debug!(handle = %handle, "artifact committed");
        Ok(handle)
    }

    fn get(&self, handle: &ArtifactHandle) -> Result<Box<dyn Read + Send>> {
        let digest = self.registry.resolve(handle)?;
        let file = File::open(self.object_path(&digest))?;
        Ok(Box::new(file))
    }

    fn delete(&self, handle: &ArtifactHandle) -> Result<()> {
        let _guard = self.commit_lock.lock().unwrap_or_else(PoisonError::into_inner);
        match self.registry.release(handle) {
            Released::Unknown => {
                warn!(handle = %handle, "delete of unknown handle; ignoring");
            }
            Released::Shared => {
                debug!(handle = %handle, "handle released; blob still referenced");
            }
            Released::Last(digest) => {
                // Readers holding an open file keep their data on unlink.
                match fs::remove_file(self.object_path(&digest)) {
                    Ok(()) => debug!(handle = %handle, "blob removed"),
                    Err(e) if e.kind() == ErrorKind::NotFound => {}
                    Err(e) => warn!(handle = %handle, error = %e, "failed to remove blob"),
                }
            }
        }
        Ok(())
    }

    fn contains(&self, handle: &ArtifactHandle) -> bool {
        self.registry.resolve(handle).is_ok()
    }

    fn materialize(&self, handle: &ArtifactHandle, dest: &Path) -> Result<PathBuf> {
        let digest = self.registry.resolve(handle)?;
        ensure_parent_dir(dest)?;
        fs::copy(self.object_path(&digest), dest)?;
        debug!(handle = %handle, dest = %dest.display(), "artifact materialised");
        Ok(dest.to_path_buf())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_content_shares_one_blob() {
        let base = tempfile::tempdir().unwrap();
        let store = LocalArtifactStore::create_in(base.path()).unwrap();

        let a = store.put_bytes(b"same").unwrap();
        let b = store.put_bytes(b"same").unwrap();
        assert_ne!(a, b);

        let blobs = fs::read_dir(store.root().join(OBJECTS_DIR)).unwrap().count();
        assert_eq!(blobs, 1);

        store.delete(&a).unwrap();
        assert_eq!(store.read_to_vec(&b).unwrap(), b"same");

        store.delete(&b).unwrap();
        let blobs = fs::read_dir(store.root().join(OBJECTS_DIR)).unwrap().count();
        assert_eq!(blobs, 0);
    }

    #[test]
    fn failed_source_read_commits_nothing() {
        struct Broken;
        impl Read for Broken {
            fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
                Err(std::io::Error::other("boom"))
            }
        }

        let base = tempfile::tempdir().unwrap();
        let store = LocalArtifactStore::create_in(base.path()).unwrap();

        let err = store.put(&mut Broken).unwrap_err();
        assert!(matches!(err, PipelineError::StoreWrite { .. }));

        let objects = fs::read_dir(store.root().join(OBJECTS_DIR)).unwrap().count();
        let tmp = fs::read_dir(store.root().join(TMP_DIR)).unwrap().count();
        assert_eq!(objects, 0);
        assert_eq!(tmp, 0);
    }
}
