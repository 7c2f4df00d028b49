//! Lazily rebuilt pyramid collections.

use std::collections::BTreeMap;
use std::sync::{Arc, Weak};

use log::{error, warn};
use parking_lot::{Condvar, Mutex};
use tessera_types::geo::{Crs, CrsCode, DiscreteAxis};

use crate::cancel::CancellationToken;
use crate::error::TesseraError;
use crate::mosaic::MosaicDefinition;
use crate::pyramid::Pyramid;
use crate::store::{PyramidRecord, PyramidStore};

/// Shared, immutable snapshot of a set's pyramids.
pub type PyramidModel = Arc<Vec<Arc<Pyramid>>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SetState {
    /// The in-memory model reflects the backing store.
    Fresh,
    /// The model must be rebuilt before the next read returns.
    Stale,
    /// A rebuild is running on some caller's thread; other readers wait.
    Rebuilding,
}

struct Inner {
    state: SetState,
    model: PyramidModel,
    /// Set when an external writer invalidates while a rebuild is in
    /// flight; the published model is then immediately stale again.
    invalidated_during_rebuild: bool,
}

/// The pyramids of one logical dataset, rebuilt on demand from a backing
/// store.
///
/// Reads of a fresh set are cheap snapshot clones. A stale set is rebuilt
/// synchronously by the first reader to arrive; readers arriving while the
/// rebuild runs block until the result is published instead of re-entering
/// the rebuild. External writers call [`PyramidSet::invalidate`] to force
/// the next read to rebuild.
pub struct PyramidSet {
    dataset: String,
    store: Arc<dyn PyramidStore>,
    /// Handed to rebuilt pyramids as their back-reference.
    weak_self: Weak<PyramidSet>,
    inner: Mutex<Inner>,
    rebuilt: Condvar,
}

impl PyramidSet {
    /// Creates a set for a dataset. The set starts stale; the first read
    /// triggers the initial build.
    pub fn new(dataset: impl Into<String>, store: Arc<dyn PyramidStore>) -> Arc<PyramidSet> {
        let dataset = dataset.into();
        Arc::new_cyclic(|weak: &Weak<PyramidSet>| PyramidSet {
            dataset,
            store,
            weak_self: weak.clone(),
            inner: Mutex::new(Inner {
                state: SetState::Stale,
                model: Arc::new(Vec::new()),
                invalidated_during_rebuild: false,
            }),
            rebuilt: Condvar::new(),
        })
    }

    /// The dataset this set belongs to.
    pub fn dataset(&self) -> &str {
        &self.dataset
    }

    /// Returns true if the next read will rebuild.
    pub fn is_stale(&self) -> bool {
        self.inner.lock().state != SetState::Fresh
    }

    /// Marks the in-memory model as no longer reflecting the backing store.
    pub fn invalidate(&self) {
        let mut inner = self.inner.lock();
        match inner.state {
            SetState::Rebuilding => inner.invalidated_during_rebuild = true,
            _ => inner.state = SetState::Stale,
        }
    }

    /// The pyramids of this dataset, rebuilding first if stale.
    pub fn pyramids(&self) -> Result<PyramidModel, TesseraError> {
        self.pyramids_with_cancel(&CancellationToken::new())
    }

    /// Like [`PyramidSet::pyramids`], with best-effort cancellation checked
    /// between per-pyramid iterations of the rebuild.
    pub fn pyramids_with_cancel(
        &self,
        cancel: &CancellationToken,
    ) -> Result<PyramidModel, TesseraError> {
        let mut inner = self.inner.lock();
        loop {
            match inner.state {
                SetState::Fresh => return Ok(inner.model.clone()),
                SetState::Rebuilding => self.rebuilt.wait(&mut inner),
                SetState::Stale => {
                    inner.state = SetState::Rebuilding;
                    inner.invalidated_during_rebuild = false;
                    drop(inner);

                    let outcome = self.rebuild(cancel);

                    let mut inner = self.inner.lock();
                    let result = match outcome {
                        Ok(pyramids) => {
                            inner.model = Arc::new(pyramids);
                            inner.state = if inner.invalidated_during_rebuild {
                                SetState::Stale
                            } else {
                                SetState::Fresh
                            };
                            Ok(inner.model.clone())
                        }
                        Err(TesseraError::Cancelled) => {
                            inner.state = SetState::Stale;
                            Err(TesseraError::Cancelled)
                        }
                        Err(err) => {
                            // Total failure: publish an empty model rather
                            // than a partial one, and stay stale so a later
                            // read retries.
                            error!(
                                "failed to rebuild pyramid set for dataset {}: {err}",
                                self.dataset
                            );
                            inner.model = Arc::new(Vec::new());
                            inner.state = SetState::Stale;
                            Ok(inner.model.clone())
                        }
                    };
                    self.rebuilt.notify_all();
                    return result;
                }
            }
        }
    }

    fn rebuild(&self, cancel: &CancellationToken) -> Result<Vec<Arc<Pyramid>>, TesseraError> {
        let records = self.store.pyramids(&self.dataset)?;
        let mut pyramids = Vec::with_capacity(records.len());
        for record in records {
            cancel.check()?;
            match self.build_pyramid(&record) {
                Ok(pyramid) => pyramids.push(pyramid),
                Err(err) => warn!(
                    "skipping pyramid {} of dataset {}: {err}",
                    record.id, self.dataset
                ),
            }
        }
        Ok(pyramids)
    }

    fn build_pyramid(&self, record: &PyramidRecord) -> Result<Arc<Pyramid>, TesseraError> {
        let code = CrsCode::parse(&record.crs_code)?;

        let mut by_axis: BTreeMap<usize, Vec<f64>> = BTreeMap::new();
        for row in self.store.axis_values(&self.dataset, &record.id)? {
            by_axis.entry(row.axis).or_default().push(row.value);
        }
        let axes: Vec<DiscreteAxis> = by_axis
            .into_iter()
            .map(|(index, values)| DiscreteAxis::new(format!("axis-{index}"), values))
            .collect();
        let crs = Crs::new(code).with_discrete_axes(axes);

        let definitions: Vec<MosaicDefinition> = self
            .store
            .mosaics(&self.dataset, &record.id)?
            .into_iter()
            .map(MosaicDefinition::from)
            .collect();

        Pyramid::with_set(record.id.clone(), crs, definitions, self.weak_self.clone())
    }
}

impl std::fmt::Debug for PyramidSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("PyramidSet")
            .field("dataset", &self.dataset)
            .field("state", &inner.state)
            .field("pyramids", &inner.model.len())
            .finish()
    }
}
