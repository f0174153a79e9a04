// src/store/mod.rs

//! Content-addressed artifact store.
//!
//! Tasks never hand each other file paths. Every intermediate output is
//! written into an [`ArtifactStore`], which returns an opaque
//! [`ArtifactHandle`]; dependents receive the handle and ask the store to
//! read or materialise the content.
//!
//! - [`local`] is the on-disk store used for real runs.
//! - [`memory`] keeps blobs in memory (tests, dry experiments).
//!
//! Blobs are keyed by their BLAKE3 digest, so identical content is stored
//! once per store instance. Handles, however, are issued per `put`: each one
//! carries the issuing store's identity and a serial number, which keeps the
//! "one writer per handle" rule and makes handles from a different store
//! instance resolve to [`PipelineError::UnknownHandle`].

pub mod local;
pub mod memory;

use std::collections::HashMap;
use std::fmt;
use std::fs::{self, File};
use std::io::{self, Cursor, Read};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::errors::{PipelineError, Result};

pub use local::LocalArtifactStore;
pub use memory::MemoryArtifactStore;

/// Opaque reference to a blob held by an [`ArtifactStore`].
///
/// Handles are cheap to clone and immutable. They are only meaningful to the
/// store instance that issued them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ArtifactHandle {
    store: Arc<str>,
    serial: u64,
    digest: Arc<str>,
}

impl fmt::Display for ArtifactHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let short = self.digest.get(..12).unwrap_or(&self.digest);
        write!(f, "{}/{}/{}", self.store, self.serial, short)
    }
}

/// Storage contract shared by every artifact store implementation.
///
/// The trait is object safe; the scheduler and the tasks only ever see an
/// `Arc<dyn ArtifactStore>`.
pub trait ArtifactStore: Send + Sync + fmt::Debug {
    /// Store everything readable from `source` and return a new handle.
    ///
    /// Either the returned handle resolves to the complete content, or the
    /// call fails with [`PipelineError::StoreWrite`] and nothing is committed.
    fn put(&self, source: &mut dyn Read) -> Result<ArtifactHandle>;

    /// Open the content behind `handle` for reading.
    fn get(&self, handle: &ArtifactHandle) -> Result<Box<dyn Read + Send>>;

    /// Forget `handle`. Unknown handles are ignored; open readers and
    /// materialised copies are unaffected.
    fn delete(&self, handle: &ArtifactHandle) -> Result<()>;

    /// Whether `handle` currently resolves in this store.
    fn contains(&self, handle: &ArtifactHandle) -> bool;

    fn put_bytes(&self, bytes: &[u8]) -> Result<ArtifactHandle> {
        let mut cursor = Cursor::new(bytes);
        self.put(&mut cursor)
    }

    /// Store the content of a local file, e.g. one written by an external
    /// tool into a task's scratch directory.
    fn put_file(&self, path: &Path) -> Result<ArtifactHandle> {
        let mut file = File::open(path).map_err(|e| {
            PipelineError::store_write(format!("opening {}", path.display()), e)
        })?;
        self.put(&mut file)
    }

    fn read_to_vec(&self, handle: &ArtifactHandle) -> Result<Vec<u8>> {
        let mut reader = self.get(handle)?;
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf)?;
        Ok(buf)
    }

    /// Copy the content behind `handle` to `dest`, creating parent
    /// directories and overwriting any existing file.
    ///
    /// The copy does not depend on the store afterwards.
    fn materialize(&self, handle: &ArtifactHandle, dest: &Path) -> Result<PathBuf> {
        let mut reader = self.get(handle)?;
        ensure_parent_dir(dest)?;
        let mut file = File::create(dest)?;
        io::copy(&mut reader, &mut file)?;
        Ok(dest.to_path_buf())
    }
}

pub(crate) fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

pub(crate) fn new_store_id() -> Arc<str> {
    Arc::from(uuid::Uuid::new_v4().simple().to_string())
}

/// Bookkeeping for issued handles, shared by the store implementations.
///
/// Tracks which serials are live and how many live handles point at each
/// digest, so a blob can be dropped when its last handle is deleted.
#[derive(Debug)]
pub(crate) struct HandleRegistry {
    store_id: Arc<str>,
    state: Mutex<RegistryState>,
}

#[derive(Debug, Default)]
struct RegistryState {
    next_serial: u64,
    live: HashMap<u64, Arc<str>>,
    refs: HashMap<Arc<str>, usize>,
}

/// Result of releasing a handle.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Released {
    /// The handle was not live in this store.
    Unknown,
    /// Other handles still refer to the blob.
    Shared,
    /// That was the last handle; the blob with this digest may be removed.
    Last(Arc<str>),
}

impl HandleRegistry {
    pub(crate) fn new(store_id: Arc<str>) -> Self {
        Self {
            store_id,
            state: Mutex::new(RegistryState::default()),
        }
    }

    pub(crate) fn store_id(&self) -> &str {
        &self.store_id
    }

    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn is_referenced(&self, digest: &str) -> bool {
        self.lock().refs.contains_key(digest)
    }

    pub(crate) fn issue(&self, digest: &str) -> ArtifactHandle {
        let mut state = self.lock();
        let digest: Arc<str> = Arc::from(digest);
        let serial = state.next_serial;
        state.next_serial += 1;
        state.live.insert(serial, digest.clone());
        *state.refs.entry(digest.clone()).or_insert(0) += 1;

        ArtifactHandle {
            store: self.store_id.clone(),
            serial,
            digest,
        }
    }

    /// Digest for a live handle issued by this registry.
    pub(crate) fn resolve(&self, handle: &ArtifactHandle) -> Result<Arc<str>> {
        if *handle.store != *self.store_id {
            return Err(PipelineError::UnknownHandle(handle.clone()));
        }
        let state = self.lock();
        match state.live.get(&handle.serial) {
            Some(digest) if *digest == handle.digest => Ok(digest.clone()),
            _ => Err(PipelineError::UnknownHandle(handle.clone())),
        }
    }

    pub(crate) fn release(&self, handle: &ArtifactHandle) -> Released {
        if *handle.store != *self.store_id {
            return Released::Unknown;
        }
        let mut state = self.lock();
        match state.live.get(&handle.serial) {
            Some(digest) if *digest == handle.digest => {}
            _ => return Released::Unknown,
        }
        state.live.remove(&handle.serial);

        let digest = handle.digest.clone();
        let remaining = match state.refs.get_mut(&digest) {
            Some(count) => {
                *count -= 1;
                *count
            }
            None => 0,
        };
        if remaining == 0 {
            state.refs.remove(&digest);
            Released::Last(digest)
        } else {
            Released::Shared
        }
    }
}
