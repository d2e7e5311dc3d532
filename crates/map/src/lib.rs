pub mod headless;
pub mod options;
pub mod reconcile;
pub mod session;
pub mod widget;

pub use options::{Control, ControlPosition, MapOptions, TileProvider};
pub use reconcile::{
    reconcile, DisplayedMarker, DisplayedMarkerSet, ReconcileError, ReconcileSummary, Reconciled,
};
pub use session::{MapSession, MapSessionManager};
pub use widget::{MapWidget, MapWidgetFactory};

/// Returned by every operation on a map session that has been destroyed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("map session {session} is closed")]
pub struct SessionClosedError {
    pub session: u64,
}

#[derive(Debug, thiserror::Error)]
pub enum MapError {
    #[error(transparent)]
    SessionClosed(#[from] SessionClosedError),
    #[error("map widget failed: {0}")]
    Widget(String),
}
