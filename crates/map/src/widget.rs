use model::Coordinates;

use crate::{options::MapOptions, Control, ControlPosition, MapError};

/// A live map as provided by the rendering widget. Markers are opaque handles
/// that are only meaningful to the map that created them.
pub trait MapWidget {
    type Marker;

    fn add_control(&mut self, control: Control, position: ControlPosition);

    fn add_marker(&mut self, coordinates: Coordinates, tooltip: &str) -> Self::Marker;

    /// Moves an existing marker and replaces its tooltip. The marker stays the
    /// same object on the map.
    fn update_marker(
        &mut self,
        marker: &mut Self::Marker,
        coordinates: Coordinates,
        tooltip: &str,
    );

    fn remove_marker(&mut self, marker: Self::Marker);

    /// Tears the map down, including tile layers, listeners and all markers.
    fn remove(self);
}

pub trait MapWidgetFactory {
    type Widget: MapWidget;

    fn create_map(
        &self,
        container: &str,
        options: &MapOptions,
    ) -> Result<Self::Widget, MapError>;
}
