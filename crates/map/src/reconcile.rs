use std::{collections::HashSet, error, fmt};

use indexmap::IndexMap;
use itertools::Itertools;
use model::{Coordinates, Vehicle, VehiclePosition};
use utility::id::Id;

use crate::{session::MapSession, widget::MapWidget, SessionClosedError};

/// A marker currently attached to the map, together with what was last
/// applied to it.
#[derive(Debug)]
pub struct DisplayedMarker<M> {
    pub handle: M,
    pub coordinates: Coordinates,
    pub tooltip: String,
}

/// The markers on the map, keyed by vehicle id. Holds at most one marker per
/// vehicle.
#[derive(Debug)]
pub struct DisplayedMarkerSet<M> {
    markers: IndexMap<Id<Vehicle>, DisplayedMarker<M>>,
}

impl<M> Default for DisplayedMarkerSet<M> {
    fn default() -> Self {
        Self {
            markers: IndexMap::new(),
        }
    }
}

impl<M> DisplayedMarkerSet<M> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.markers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.markers.is_empty()
    }

    pub fn contains(&self, id: &Id<Vehicle>) -> bool {
        self.markers.contains_key(id)
    }

    pub fn get(&self, id: &Id<Vehicle>) -> Option<&DisplayedMarker<M>> {
        self.markers.get(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &Id<Vehicle>> {
        self.markers.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Id<Vehicle>, &DisplayedMarker<M>)> {
        self.markers.iter()
    }

    /// Forgets every marker. Used when the session ends and the markers went
    /// away together with the map.
    pub fn clear(&mut self) -> usize {
        let count = self.markers.len();
        self.markers.clear();
        count
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileSummary {
    pub added: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub removed: usize,
}

impl ReconcileSummary {
    /// True if the map was not touched at all.
    pub fn is_noop(&self) -> bool {
        self.added == 0 && self.updated == 0 && self.removed == 0
    }
}

#[derive(Debug)]
pub struct Reconciled<M> {
    pub markers: DisplayedMarkerSet<M>,
    pub summary: ReconcileSummary,
}

/// Returned instead of a result when the session is closed. Carries the
/// markers passed in, so the caller keeps the set it had.
#[derive(Debug)]
pub struct ReconcileError<M> {
    pub markers: DisplayedMarkerSet<M>,
    pub reason: SessionClosedError,
}

impl<M> fmt::Display for ReconcileError<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "markers were not reconciled ({} kept)", self.markers.len())
    }
}

impl<M: fmt::Debug> error::Error for ReconcileError<M> {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        Some(&self.reason)
    }
}

/// Makes the markers on the map match `next` with as few widget calls as
/// possible:
///
/// - markers of vehicles missing from `next` are removed,
/// - markers of known vehicles are moved in place (only if something changed),
/// - vehicles without a marker get a new one.
///
/// The returned set is the `previous` of the next call. A closed session is
/// detected before anything is touched, and `previous` is handed back in the
/// error.
pub fn reconcile<W: MapWidget>(
    session: &mut MapSession<W>,
    previous: DisplayedMarkerSet<W::Marker>,
    next: &[VehiclePosition],
) -> Result<Reconciled<W::Marker>, ReconcileError<W::Marker>> {
    let mut markers = previous.markers;
    match apply(session, &mut markers, next) {
        Ok(summary) => Ok(Reconciled {
            markers: DisplayedMarkerSet { markers },
            summary,
        }),
        Err(reason) => Err(ReconcileError {
            markers: DisplayedMarkerSet { markers },
            reason,
        }),
    }
}

fn apply<W: MapWidget>(
    session: &mut MapSession<W>,
    markers: &mut IndexMap<Id<Vehicle>, DisplayedMarker<W::Marker>>,
    next: &[VehiclePosition],
) -> Result<ReconcileSummary, SessionClosedError> {
    session.ensure_open()?;

    let mut summary = ReconcileSummary::default();
    let wanted = next
        .iter()
        .map(|position| &position.id)
        .collect::<HashSet<_>>();

    let gone = markers
        .keys()
        .filter(|id| !wanted.contains(id))
        .cloned()
        .collect::<Vec<_>>();
    if !gone.is_empty() {
        log::debug!("removing markers: {}", gone.iter().join(", "));
    }
    for id in gone {
        if let Some(marker) = markers.shift_remove(&id) {
            session.remove_marker(marker.handle)?;
            summary.removed += 1;
        }
    }

    for position in next {
        let tooltip = position.tooltip();
        match markers.get_mut(&position.id) {
            Some(displayed) => {
                if displayed.coordinates == position.coordinates && displayed.tooltip == tooltip {
                    summary.unchanged += 1;
                    continue;
                }
                session.update_marker(&mut displayed.handle, position.coordinates, &tooltip)?;
                log::trace!(
                    "moved marker {} by {:.0} m",
                    position.id,
                    displayed.coordinates.distance_km(&position.coordinates) * 1000.0
                );
                displayed.coordinates = position.coordinates;
                displayed.tooltip = tooltip;
                summary.updated += 1;
            }
            None => {
                let handle = session.add_marker(position.coordinates, &tooltip)?;
                markers.insert(
                    position.id.clone(),
                    DisplayedMarker {
                        handle,
                        coordinates: position.coordinates,
                        tooltip,
                    },
                );
                summary.added += 1;
            }
        }
    }

    Ok(summary)
}
