//! Shared-ownership lifecycle for file-backed spatial indexes.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use log::{debug, info, warn};
use parking_lot::Mutex;
use tessera_types::geo::Crs;

use crate::error::TesseraError;
use crate::index::rtree::{IndexElement, SpatialIndex};

/// Identifier of a logical owner holding a claim on a shared index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OwnerId(u64);

impl OwnerId {
    /// Creates an owner identifier from a caller-assigned value.
    pub fn new(raw: u64) -> OwnerId {
        OwnerId(raw)
    }

    /// Allocates a fresh process-unique owner identifier.
    pub fn next() -> OwnerId {
        static NEXT: AtomicU64 = AtomicU64::new(0);
        OwnerId(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "owner#{}", self.0)
    }
}

struct SlotState<E: IndexElement> {
    index: Option<Arc<SpatialIndex<E>>>,
    owners: HashSet<OwnerId>,
}

/// Per-path slot. Its mutex serializes get/close/reset for that path only;
/// readers of an already-open index never touch it.
struct Slot<E: IndexElement> {
    state: Mutex<SlotState<E>>,
}

impl<E: IndexElement> Default for Slot<E> {
    fn default() -> Self {
        Slot {
            state: Mutex::new(SlotState {
                index: None,
                owners: HashSet::new(),
            }),
        }
    }
}

/// Registry sharing one physical [`SpatialIndex`] per backing path between
/// any number of logical owners.
///
/// The registry is an explicit object: pass it (or an `Arc` of it) to
/// whoever needs index access instead of reaching for a global. Internally
/// it keeps a path-to-slot map behind a short-lived lock plus one mutex per
/// path, so lifecycle operations on different paths never contend and
/// long-running tile I/O happens entirely outside registry locks.
pub struct IndexRegistry<E: IndexElement> {
    slots: Mutex<HashMap<PathBuf, Arc<Slot<E>>, ahash::RandomState>>,
    default_crs: Crs,
}

impl<E: IndexElement> Default for IndexRegistry<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: IndexElement> IndexRegistry<E> {
    /// Creates a registry creating new indexes with a WGS 84 CRS.
    pub fn new() -> IndexRegistry<E> {
        Self::with_default_crs(Crs::EPSG4326)
    }

    /// Creates a registry creating new indexes with the given CRS.
    pub fn with_default_crs(default_crs: Crs) -> IndexRegistry<E> {
        IndexRegistry {
            slots: Mutex::new(HashMap::default()),
            default_crs,
        }
    }

    /// Opens (or creates) the index backed by `root` and registers `owner`.
    ///
    /// The on-disk pair is opened when present and created empty when
    /// absent. Registering an already-registered owner is a no-op; all
    /// owners share the same physical index.
    pub fn get(&self, root: &Path, owner: OwnerId) -> Result<Arc<SpatialIndex<E>>, TesseraError> {
        let slot = self.slot(root);
        let mut state = slot.state.lock();

        let index = match &state.index {
            Some(index) if !index.is_closed() => index.clone(),
            _ => {
                let opened = Arc::new(SpatialIndex::open_or_create(
                    root,
                    self.default_crs.clone(),
                )?);
                debug!("opened spatial index at {root:?}");
                state.index = Some(opened.clone());
                opened
            }
        };

        if !state.owners.insert(owner) {
            debug!("{owner} is already registered for index {root:?}");
        }
        Ok(index)
    }

    /// Releases `owner`'s claim on the index backed by `root`.
    ///
    /// The index is physically closed (flushed, handles released) only when
    /// the last owner goes; otherwise only the owner set shrinks. Closing
    /// with no registered owner, or from an unregistered owner, is tolerated
    /// and logged.
    pub fn close(&self, root: &Path, owner: OwnerId) -> Result<(), TesseraError> {
        let Some(slot) = self.existing_slot(root) else {
            warn!("no spatial index registered at {root:?}; nothing to close");
            return Ok(());
        };
        let mut state = slot.state.lock();

        if !state.owners.remove(&owner) {
            warn!("{owner} is not registered for index {root:?}; nothing to close");
        }

        if state.owners.is_empty() {
            if let Some(index) = state.index.take() {
                index.close()?;
                debug!("closed spatial index at {root:?}");
            }
        } else {
            info!(
                "spatial index at {root:?} is still in use by {} owners",
                state.owners.len()
            );
        }
        Ok(())
    }

    /// Discards the on-disk index at `root` and reopens it empty for
    /// `owner` - a forced full rebuild.
    ///
    /// Both artifacts are deleted as a pair. Other owners lose the physical
    /// index under their feet only if they raced a reset, which is logged.
    pub fn reset(&self, root: &Path, owner: OwnerId) -> Result<Arc<SpatialIndex<E>>, TesseraError> {
        let slot = self.slot(root);
        let mut state = slot.state.lock();

        state.owners.remove(&owner);
        if let Some(index) = state.index.take() {
            if !state.owners.is_empty() {
                warn!(
                    "resetting spatial index at {root:?} while still in use by {} owners",
                    state.owners.len()
                );
            }
            index.close()?;
        }

        SpatialIndex::<E>::delete_artifacts(root)?;
        let created = Arc::new(SpatialIndex::create(root, self.default_crs.clone())?);
        info!("reset spatial index at {root:?}");

        state.index = Some(created.clone());
        state.owners.insert(owner);
        Ok(created)
    }

    /// Returns true if an open index is registered for `root`.
    pub fn is_open(&self, root: &Path) -> bool {
        self.existing_slot(root)
            .and_then(|slot| slot.state.lock().index.clone())
            .is_some_and(|index| !index.is_closed())
    }

    /// Number of owners currently registered for `root`.
    pub fn owner_count(&self, root: &Path) -> usize {
        self.existing_slot(root)
            .map(|slot| slot.state.lock().owners.len())
            .unwrap_or(0)
    }

    fn slot(&self, root: &Path) -> Arc<Slot<E>> {
        self.slots
            .lock()
            .entry(root.to_path_buf())
            .or_default()
            .clone()
    }

    fn existing_slot(&self, root: &Path) -> Option<Arc<Slot<E>>> {
        self.slots.lock().get(root).cloned()
    }
}

impl<E: IndexElement> fmt::Debug for IndexRegistry<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IndexRegistry")
            .field("paths", &self.slots.lock().len())
            .finish()
    }
}
