//! An in-memory map widget. It draws nothing, but keeps track of every map,
//! control and marker so that the rest of the system can run (and be tested)
//! without a rendering surface.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use indexmap::IndexMap;
use model::Coordinates;

use crate::{
    options::MapOptions,
    widget::{MapWidget, MapWidgetFactory},
    Control, ControlPosition, MapError,
};

#[derive(Debug, Clone, PartialEq)]
pub struct MarkerState {
    pub coordinates: Coordinates,
    pub tooltip: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OperationCounts {
    pub added: usize,
    pub updated: usize,
    pub removed: usize,
}

#[derive(Debug)]
struct MapState {
    container: String,
    style_url: String,
    controls: Vec<(Control, ControlPosition)>,
    markers: IndexMap<u64, MarkerState>,
    next_marker: u64,
    operations: OperationCounts,
    removed: bool,
}

type SharedMap = Arc<Mutex<MapState>>;

fn lock(map: &SharedMap) -> MutexGuard<'_, MapState> {
    map.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Handle of a marker on a [`HeadlessMap`].
#[derive(Debug, PartialEq, Eq)]
pub struct HeadlessMarker {
    id: u64,
}

impl HeadlessMarker {
    pub fn id(&self) -> u64 {
        self.id
    }
}

#[derive(Debug)]
pub struct HeadlessMap {
    state: SharedMap,
}

impl MapWidget for HeadlessMap {
    type Marker = HeadlessMarker;

    fn add_control(&mut self, control: Control, position: ControlPosition) {
        lock(&self.state).controls.push((control, position));
    }

    fn add_marker(&mut self, coordinates: Coordinates, tooltip: &str) -> HeadlessMarker {
        let mut state = lock(&self.state);
        let id = state.next_marker;
        state.next_marker += 1;
        state.markers.insert(
            id,
            MarkerState {
                coordinates,
                tooltip: tooltip.to_owned(),
            },
        );
        state.operations.added += 1;
        log::debug!("[{}] + marker #{id} '{tooltip}'", state.container);
        HeadlessMarker { id }
    }

    fn update_marker(
        &mut self,
        marker: &mut HeadlessMarker,
        coordinates: Coordinates,
        tooltip: &str,
    ) {
        let mut state = lock(&self.state);
        if let Some(entry) = state.markers.get_mut(&marker.id) {
            entry.coordinates = coordinates;
            entry.tooltip = tooltip.to_owned();
        }
        state.operations.updated += 1;
    }

    fn remove_marker(&mut self, marker: HeadlessMarker) {
        let mut state = lock(&self.state);
        state.markers.shift_remove(&marker.id);
        state.operations.removed += 1;
        log::debug!("[{}] - marker #{}", state.container, marker.id);
    }

    fn remove(self) {
        let mut state = lock(&self.state);
        state.markers.clear();
        state.controls.clear();
        state.removed = true;
        log::debug!("[{}] map removed", state.container);
    }
}

/// Creates [`HeadlessMap`]s. Clones share the record of created maps.
#[derive(Debug, Clone, Default)]
pub struct HeadlessMapFactory {
    maps: Arc<Mutex<Vec<SharedMap>>>,
}

impl HeadlessMapFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn probe(&self) -> HeadlessProbe {
        HeadlessProbe {
            maps: self.maps.clone(),
        }
    }
}

impl MapWidgetFactory for HeadlessMapFactory {
    type Widget = HeadlessMap;

    fn create_map(
        &self,
        container: &str,
        options: &MapOptions,
    ) -> Result<HeadlessMap, MapError> {
        if container.is_empty() {
            return Err(MapError::Widget("no container to mount the map into".to_owned()));
        }
        let state = Arc::new(Mutex::new(MapState {
            container: container.to_owned(),
            style_url: options.style.style_url().to_owned(),
            controls: Vec::new(),
            markers: IndexMap::new(),
            next_marker: 0,
            operations: OperationCounts::default(),
            removed: false,
        }));
        self.maps
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(state.clone());
        Ok(HeadlessMap { state })
    }
}

/// Read-only view on the maps created by a [`HeadlessMapFactory`].
/// Maps are addressed by creation order.
#[derive(Debug, Clone)]
pub struct HeadlessProbe {
    maps: Arc<Mutex<Vec<SharedMap>>>,
}

impl HeadlessProbe {
    fn with_map<R>(&self, index: usize, f: impl FnOnce(&MapState) -> R) -> Option<R> {
        let maps = self.maps.lock().unwrap_or_else(PoisonError::into_inner);
        maps.get(index).map(|map| f(&*lock(map)))
    }

    pub fn maps_created(&self) -> usize {
        self.maps.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn live_maps(&self) -> usize {
        let maps = self.maps.lock().unwrap_or_else(PoisonError::into_inner);
        maps.iter().filter(|map| !lock(map).removed).count()
    }

    pub fn is_removed(&self, index: usize) -> Option<bool> {
        self.with_map(index, |map| map.removed)
    }

    pub fn container(&self, index: usize) -> Option<String> {
        self.with_map(index, |map| map.container.clone())
    }

    pub fn style_url(&self, index: usize) -> Option<String> {
        self.with_map(index, |map| map.style_url.clone())
    }

    pub fn controls(&self, index: usize) -> Vec<(Control, ControlPosition)> {
        self.with_map(index, |map| map.controls.clone())
            .unwrap_or_default()
    }

    pub fn marker_count(&self, index: usize) -> usize {
        self.with_map(index, |map| map.markers.len()).unwrap_or(0)
    }

    /// Markers in the order they were added, keyed by marker handle id.
    pub fn markers(&self, index: usize) -> Vec<(u64, MarkerState)> {
        self.with_map(index, |map| {
            map.markers
                .iter()
                .map(|(id, marker)| (*id, marker.clone()))
                .collect()
        })
        .unwrap_or_default()
    }

    pub fn operations(&self, index: usize) -> OperationCounts {
        self.with_map(index, |map| map.operations)
            .unwrap_or_default()
    }
}
