use std::env;

use model::Coordinates;

pub const MAPLIBRE_DEMO_STYLE: &str = "https://demotiles.maplibre.org/style.json";
pub const MAPBOX_STREETS_STYLE: &str = "mapbox://styles/mapbox/streets-v11";

pub const ENV_STYLE_URL: &str = "MAP_STYLE_URL";
pub const ENV_MAPBOX_TOKEN: &str = "MAPBOX_ACCESS_TOKEN";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TileProvider {
    MapLibre { style_url: String },
    Mapbox { style_url: String, access_token: String },
}

impl TileProvider {
    pub fn style_url(&self) -> &str {
        match self {
            Self::MapLibre { style_url } | Self::Mapbox { style_url, .. } => style_url,
        }
    }
}

impl Default for TileProvider {
    fn default() -> Self {
        Self::MapLibre {
            style_url: MAPLIBRE_DEMO_STYLE.to_owned(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScaleUnit {
    Metric,
    Imperial,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    Navigation,
    Scale(ScaleUnit),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlPosition {
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MapOptions {
    pub style: TileProvider,
    pub center: Coordinates,
    pub zoom: f64,
    pub controls: Vec<(Control, ControlPosition)>,
}

impl Default for MapOptions {
    /// Helsinki city center with navigation and a metric scale bar.
    fn default() -> Self {
        Self {
            style: TileProvider::default(),
            center: Coordinates::new(24.94, 60.17),
            zoom: 12.0,
            controls: vec![
                (Control::Navigation, ControlPosition::TopRight),
                (Control::Scale(ScaleUnit::Metric), ControlPosition::BottomRight),
            ],
        }
    }
}

impl MapOptions {
    /// Picks the tile provider from `MAP_STYLE_URL` and `MAPBOX_ACCESS_TOKEN`.
    /// A token selects Mapbox, falling back to the streets style.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub(crate) fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&'static str) -> Option<String>,
    {
        let style_url = lookup(ENV_STYLE_URL).filter(|url| !url.is_empty());
        let token = lookup(ENV_MAPBOX_TOKEN).filter(|token| !token.is_empty());
        let style = match (style_url, token) {
            (style_url, Some(access_token)) => TileProvider::Mapbox {
                style_url: style_url.unwrap_or_else(|| MAPBOX_STREETS_STYLE.to_owned()),
                access_token,
            },
            (Some(style_url), None) => TileProvider::MapLibre { style_url },
            (None, None) => TileProvider::default(),
        };
        Self {
            style,
            ..Default::default()
        }
    }
}
