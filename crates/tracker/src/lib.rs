use map::{MapError, SessionClosedError};

pub mod config;
pub mod scheduler;
pub mod view;

pub use config::{TrackerConfig, ViewConfig};
pub use scheduler::{PollStats, PollingScheduler, PositionSink, SchedulerError, SchedulerState};
pub use view::{VehicleMapView, ViewSnapshot};

#[derive(Debug, thiserror::Error)]
pub enum TrackerError {
    #[error(transparent)]
    Config(#[from] vehicle_api::ConfigError),
    #[error(transparent)]
    Map(#[from] MapError),
    #[error(transparent)]
    Scheduler(#[from] SchedulerError),
    #[error("the map presenter is no longer running")]
    PresenterGone,
}

impl From<SessionClosedError> for TrackerError {
    fn from(why: SessionClosedError) -> Self {
        Self::Map(MapError::SessionClosed(why))
    }
}
