//! File-backed R-tree with an element mapper.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use log::debug;
use parking_lot::RwLock;
use rstar::{Envelope as _, PointDistance, RStarInsertionStrategy, RTree, RTreeObject, RTreeParams, AABB};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tessera_types::cartesian::Rect;
use tessera_types::geo::Crs;

use crate::error::TesseraError;

/// Identifier of an element inside a spatial index.
pub type ElementId = u64;

/// An element that can live in a [`SpatialIndex`]: an identifier plus an
/// envelope, serializable so the mapper can persist it.
pub trait IndexElement: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Identifier, unique within one index.
    fn id(&self) -> ElementId;

    /// Spatial envelope the element is indexed under.
    fn envelope(&self) -> Rect<f64>;
}

/// Fixed branching factor of the on-disk trees.
struct IndexTreeParams;

impl RTreeParams for IndexTreeParams {
    const MIN_SIZE: usize = 16;
    const MAX_SIZE: usize = 32;
    const REINSERTION_COUNT: usize = 8;
    type DefaultInsertionStrategy = RStarInsertionStrategy;
}

/// What the tree itself stores: the element identifier and its bounds. The
/// mapper resolves identifiers back into full elements.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct TreeEntry {
    id: ElementId,
    min: [f64; 2],
    max: [f64; 2],
}

impl TreeEntry {
    fn for_element<E: IndexElement>(element: &E) -> TreeEntry {
        let rect = element.envelope();
        TreeEntry {
            id: element.id(),
            min: [rect.x_min, rect.y_min],
            max: [rect.x_max, rect.y_max],
        }
    }
}

impl RTreeObject for TreeEntry {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_corners(self.min, self.max)
    }
}

impl PointDistance for TreeEntry {
    fn distance_2(&self, point: &[f64; 2]) -> f64 {
        self.envelope().distance_2(point)
    }

    fn contains_point(&self, point: &[f64; 2]) -> bool {
        self.envelope().contains_point(point)
    }
}

/// On-disk form of the mapper artifact.
#[derive(Serialize, Deserialize)]
#[serde(bound = "E: IndexElement")]
struct MapperFile<E> {
    crs: Crs,
    elements: Vec<E>,
}

struct IndexState<E> {
    tree: RTree<TreeEntry, IndexTreeParams>,
    elements: HashMap<ElementId, E, ahash::RandomState>,
    closed: bool,
}

/// An R-tree over keyed envelopes, persisted to two companion files.
///
/// The tree structure and the element mapper live in sibling artifacts
/// (`<root>.tree` and `<root>.map`) that are always created, flushed and
/// deleted as a pair. The index itself is freely shareable between readers;
/// lifecycle coordination across owners is the
/// [registry](crate::index::IndexRegistry)'s job.
pub struct SpatialIndex<E: IndexElement> {
    root: PathBuf,
    tree_path: PathBuf,
    mapper_path: PathBuf,
    crs: Crs,
    state: RwLock<IndexState<E>>,
}

impl<E: IndexElement> SpatialIndex<E> {
    /// The two artifact paths backing an index root.
    pub fn artifact_paths(root: &Path) -> (PathBuf, PathBuf) {
        (
            PathBuf::from(format!("{}.tree", root.display())),
            PathBuf::from(format!("{}.map", root.display())),
        )
    }

    /// Creates an empty index and immediately writes both artifacts.
    ///
    /// A failure to write a brand-new index is fatal and surfaced, unlike
    /// later read corruption which only fails the affected open attempt.
    pub fn create(root: &Path, crs: Crs) -> Result<SpatialIndex<E>, TesseraError> {
        if let Some(parent) = root.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let (tree_path, mapper_path) = Self::artifact_paths(root);
        let index = SpatialIndex {
            root: root.to_path_buf(),
            tree_path,
            mapper_path,
            crs,
            state: RwLock::new(IndexState {
                tree: RTree::new_with_params(),
                elements: HashMap::default(),
                closed: false,
            }),
        };
        index.write_artifacts(&index.state.read())?;
        Ok(index)
    }

    /// Opens an existing index from its two artifacts.
    pub fn open(root: &Path) -> Result<SpatialIndex<E>, TesseraError> {
        let (tree_path, mapper_path) = Self::artifact_paths(root);

        let tree_bytes = fs::read(&tree_path)?;
        let mapper_bytes = fs::read(&mapper_path)?;

        let entries: Vec<TreeEntry> = bincode::deserialize(&tree_bytes)
            .map_err(|err| TesseraError::Corrupt(format!("tree file {tree_path:?}: {err}")))?;
        let mapper: MapperFile<E> = bincode::deserialize(&mapper_bytes)
            .map_err(|err| TesseraError::Corrupt(format!("mapper file {mapper_path:?}: {err}")))?;

        let elements: HashMap<ElementId, E, ahash::RandomState> = mapper
            .elements
            .into_iter()
            .map(|element| (element.id(), element))
            .collect();
        for entry in &entries {
            if !elements.contains_key(&entry.id) {
                return Err(TesseraError::Corrupt(format!(
                    "tree entry {} has no mapper element at {root:?}",
                    entry.id
                )));
            }
        }

        Ok(SpatialIndex {
            root: root.to_path_buf(),
            tree_path,
            mapper_path,
            crs: mapper.crs,
            state: RwLock::new(IndexState {
                tree: RTree::bulk_load_with_params(entries),
                elements,
                closed: false,
            }),
        })
    }

    /// Opens the index when both artifacts exist, creates a fresh empty one
    /// when neither does.
    ///
    /// A lone artifact is corruption: the pair is only ever written and
    /// deleted together.
    pub fn open_or_create(root: &Path, crs: Crs) -> Result<SpatialIndex<E>, TesseraError> {
        let (tree_path, mapper_path) = Self::artifact_paths(root);
        match (tree_path.exists(), mapper_path.exists()) {
            (true, true) => Self::open(root),
            (false, false) => Self::create(root, crs),
            (true, false) => Err(TesseraError::Corrupt(format!(
                "tree file {tree_path:?} has no companion mapper"
            ))),
            (false, true) => Err(TesseraError::Corrupt(format!(
                "mapper file {mapper_path:?} has no companion tree"
            ))),
        }
    }

    /// Deletes both artifacts of an index root, if present. Never deletes
    /// one without the other.
    pub fn delete_artifacts(root: &Path) -> Result<(), TesseraError> {
        let (tree_path, mapper_path) = Self::artifact_paths(root);
        for path in [tree_path, mapper_path] {
            match fs::remove_file(&path) {
                Ok(()) => {}
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                Err(err) => return Err(err.into()),
            }
        }
        Ok(())
    }

    /// The root path this index is registered under.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The CRS the indexed envelopes are expressed in.
    pub fn crs(&self) -> &Crs {
        &self.crs
    }

    /// Adds an element, replacing any previous element with the same id.
    pub fn insert(&self, element: E) -> Result<(), TesseraError> {
        let mut state = self.state.write();
        self.ensure_open(&state)?;

        let entry = TreeEntry::for_element(&element);
        if let Some(previous) = state.elements.insert(element.id(), element) {
            state.tree.remove(&TreeEntry::for_element(&previous));
        }
        state.tree.insert(entry);
        Ok(())
    }

    /// Removes an element by id, returning it if it was present.
    pub fn remove(&self, id: ElementId) -> Result<Option<E>, TesseraError> {
        let mut state = self.state.write();
        self.ensure_open(&state)?;

        let Some(element) = state.elements.remove(&id) else {
            return Ok(None);
        };
        state.tree.remove(&TreeEntry::for_element(&element));
        Ok(Some(element))
    }

    /// All elements whose envelope intersects the query rectangle.
    pub fn query_intersecting(&self, query: &Rect<f64>) -> Result<Vec<E>, TesseraError> {
        let state = self.state.read();
        self.ensure_open(&state)?;

        let aabb = AABB::from_corners([query.x_min, query.y_min], [query.x_max, query.y_max]);
        Ok(state
            .tree
            .locate_in_envelope_intersecting(&aabb)
            .filter_map(|entry| state.elements.get(&entry.id).cloned())
            .collect())
    }

    /// All elements whose envelope contains the point.
    pub fn query_containing(&self, x: f64, y: f64) -> Result<Vec<E>, TesseraError> {
        let state = self.state.read();
        self.ensure_open(&state)?;

        Ok(state
            .tree
            .locate_all_at_point(&[x, y])
            .filter_map(|entry| state.elements.get(&entry.id).cloned())
            .collect())
    }

    /// Number of indexed elements.
    pub fn len(&self) -> usize {
        self.state.read().elements.len()
    }

    /// Returns true if no elements are indexed.
    pub fn is_empty(&self) -> bool {
        self.state.read().elements.is_empty()
    }

    /// Returns true once the index has been physically closed.
    pub fn is_closed(&self) -> bool {
        self.state.read().closed
    }

    /// Writes both artifacts.
    pub fn flush(&self) -> Result<(), TesseraError> {
        let state = self.state.read();
        self.ensure_open(&state)?;
        self.write_artifacts(&state)
    }

    /// Flushes and releases the index. Closing an already-closed index is
    /// tolerated and does nothing.
    pub fn close(&self) -> Result<(), TesseraError> {
        let mut state = self.state.write();
        if state.closed {
            debug!("spatial index at {:?} is already closed", self.root);
            return Ok(());
        }
        self.write_artifacts(&state)?;
        state.closed = true;
        state.elements = HashMap::default();
        state.tree = RTree::new_with_params();
        Ok(())
    }

    fn ensure_open(&self, state: &IndexState<E>) -> Result<(), TesseraError> {
        if state.closed {
            Err(TesseraError::IndexClosed(self.root.clone()))
        } else {
            Ok(())
        }
    }

    fn write_artifacts(&self, state: &IndexState<E>) -> Result<(), TesseraError> {
        let entries: Vec<TreeEntry> = state.tree.iter().cloned().collect();
        let tree_bytes = bincode::serialize(&entries)
            .map_err(|err| TesseraError::Corrupt(format!("encoding tree: {err}")))?;

        let mapper = MapperFile {
            crs: self.crs.clone(),
            elements: state.elements.values().cloned().collect::<Vec<E>>(),
        };
        let mapper_bytes = bincode::serialize(&mapper)
            .map_err(|err| TesseraError::Corrupt(format!("encoding mapper: {err}")))?;

        fs::write(&self.tree_path, tree_bytes)?;
        fs::write(&self.mapper_path, mapper_bytes)?;
        Ok(())
    }
}

impl<E: IndexElement> std::fmt::Debug for SpatialIndex<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.read();
        f.debug_struct("SpatialIndex")
            .field("root", &self.root)
            .field("elements", &state.elements.len())
            .field("closed", &state.closed)
            .finish()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use assert_matches::assert_matches;

    use super::*;

    /// Minimal indexed element used across the index tests.
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub(crate) struct Footprint {
        pub id: ElementId,
        pub bounds: (f64, f64, f64, f64),
    }

    impl Footprint {
        pub fn new(id: ElementId, bounds: (f64, f64, f64, f64)) -> Footprint {
            Footprint { id, bounds }
        }
    }

    impl IndexElement for Footprint {
        fn id(&self) -> ElementId {
            self.id
        }

        fn envelope(&self) -> Rect<f64> {
            Rect::new(self.bounds.0, self.bounds.1, self.bounds.2, self.bounds.3)
        }
    }

    fn root(dir: &tempfile::TempDir) -> PathBuf {
        dir.path().join("footprints")
    }

    #[test]
    fn create_writes_both_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let root = root(&dir);
        let _index: SpatialIndex<Footprint> = SpatialIndex::create(&root, Crs::EPSG4326).unwrap();

        let (tree_path, mapper_path) = SpatialIndex::<Footprint>::artifact_paths(&root);
        assert!(tree_path.exists());
        assert!(mapper_path.exists());
    }

    #[test]
    fn round_trips_elements_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let root = root(&dir);

        let index: SpatialIndex<Footprint> = SpatialIndex::create(&root, Crs::EPSG4326).unwrap();
        index.insert(Footprint::new(1, (0.0, 0.0, 10.0, 10.0))).unwrap();
        index.insert(Footprint::new(2, (20.0, 20.0, 30.0, 30.0))).unwrap();
        index.close().unwrap();

        let reopened: SpatialIndex<Footprint> = SpatialIndex::open(&root).unwrap();
        assert_eq!(reopened.len(), 2);

        let hits = reopened
            .query_intersecting(&Rect::new(5.0, 5.0, 25.0, 25.0))
            .unwrap();
        assert_eq!(hits.len(), 2);

        let hits = reopened.query_containing(25.0, 25.0).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, 2);
    }

    #[test]
    fn insert_replaces_same_id() {
        let dir = tempfile::tempdir().unwrap();
        let index: SpatialIndex<Footprint> =
            SpatialIndex::create(&root(&dir), Crs::EPSG4326).unwrap();

        index.insert(Footprint::new(7, (0.0, 0.0, 1.0, 1.0))).unwrap();
        index.insert(Footprint::new(7, (50.0, 50.0, 51.0, 51.0))).unwrap();
        assert_eq!(index.len(), 1);

        assert!(index.query_containing(0.5, 0.5).unwrap().is_empty());
        assert_eq!(index.query_containing(50.5, 50.5).unwrap().len(), 1);
    }

    #[test]
    fn remove_updates_tree_and_mapper() {
        let dir = tempfile::tempdir().unwrap();
        let index: SpatialIndex<Footprint> =
            SpatialIndex::create(&root(&dir), Crs::EPSG4326).unwrap();

        index.insert(Footprint::new(1, (0.0, 0.0, 10.0, 10.0))).unwrap();
        let removed = index.remove(1).unwrap();
        assert_eq!(removed.map(|e| e.id), Some(1));
        assert!(index.remove(1).unwrap().is_none());
        assert!(index.is_empty());
        assert!(index.query_containing(5.0, 5.0).unwrap().is_empty());
    }

    #[test]
    fn closed_index_rejects_operations_without_panicking() {
        let dir = tempfile::tempdir().unwrap();
        let index: SpatialIndex<Footprint> =
            SpatialIndex::create(&root(&dir), Crs::EPSG4326).unwrap();
        index.close().unwrap();
        // Double close is tolerated.
        index.close().unwrap();

        assert!(index.is_closed());
        assert_matches!(
            index.insert(Footprint::new(1, (0.0, 0.0, 1.0, 1.0))),
            Err(TesseraError::IndexClosed(_))
        );
        assert_matches!(
            index.query_containing(0.0, 0.0),
            Err(TesseraError::IndexClosed(_))
        );
    }

    #[test]
    fn lone_artifact_is_corruption() {
        let dir = tempfile::tempdir().unwrap();
        let root = root(&dir);
        let (tree_path, _) = SpatialIndex::<Footprint>::artifact_paths(&root);
        fs::write(&tree_path, b"orphan").unwrap();

        assert_matches!(
            SpatialIndex::<Footprint>::open_or_create(&root, Crs::EPSG4326),
            Err(TesseraError::Corrupt(_))
        );
    }

    #[test]
    fn corrupt_artifacts_fail_to_open() {
        let dir = tempfile::tempdir().unwrap();
        let root = root(&dir);
        let index: SpatialIndex<Footprint> = SpatialIndex::create(&root, Crs::EPSG4326).unwrap();
        index.close().unwrap();

        let (tree_path, _) = SpatialIndex::<Footprint>::artifact_paths(&root);
        fs::write(&tree_path, b"not a tree").unwrap();
        assert_matches!(
            SpatialIndex::<Footprint>::open(&root),
            Err(TesseraError::Corrupt(_))
        );
    }

    #[test]
    fn delete_artifacts_removes_the_pair() {
        let dir = tempfile::tempdir().unwrap();
        let root = root(&dir);
        let index: SpatialIndex<Footprint> = SpatialIndex::create(&root, Crs::EPSG4326).unwrap();
        index.close().unwrap();

        SpatialIndex::<Footprint>::delete_artifacts(&root).unwrap();
        let (tree_path, mapper_path) = SpatialIndex::<Footprint>::artifact_paths(&root);
        assert!(!tree_path.exists());
        assert!(!mapper_path.exists());

        // Deleting an absent pair is a no-op.
        SpatialIndex::<Footprint>::delete_artifacts(&root).unwrap();
    }
}
