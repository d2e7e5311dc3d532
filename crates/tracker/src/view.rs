use std::{mem, sync::Arc};

use async_trait::async_trait;
use map::{
    reconcile, DisplayedMarkerSet, MapOptions, MapSession, MapSessionManager, MapWidget,
    MapWidgetFactory, SessionClosedError,
};
use model::{Vehicle, VehiclePosition};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use utility::id::Id;
use vehicle_api::VehicleSource;

use crate::{
    config::ViewConfig,
    scheduler::{PollStats, PollingScheduler, PositionSink},
    TrackerError,
};

const MAILBOX_SIZE: usize = 32;

/// What is currently on the map.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewSnapshot {
    pub session: u64,
    pub vehicle_ids: Vec<Id<Vehicle>>,
    pub marker_count: usize,
    pub last_cycle: Option<u64>,
}

enum PresenterMessage {
    Apply {
        cycle: u64,
        positions: Vec<VehiclePosition>,
    },
    Snapshot {
        respond_to: oneshot::Sender<ViewSnapshot>,
    },
    Unmount {
        respond_to: oneshot::Sender<Result<(), SessionClosedError>>,
    },
}

type MarkerOf<F> = <<F as MapWidgetFactory>::Widget as MapWidget>::Marker;

/// Owns the map session and the displayed markers. All changes to the map
/// happen here, one message at a time.
struct Presenter<F: MapWidgetFactory> {
    manager: MapSessionManager<F>,
    session: MapSession<F::Widget>,
    markers: DisplayedMarkerSet<MarkerOf<F>>,
    liveness: CancellationToken,
    last_cycle: Option<u64>,
}

impl<F> Presenter<F>
where
    F: MapWidgetFactory + Send + 'static,
    F::Widget: Send + 'static,
    MarkerOf<F>: Send + 'static,
{
    fn spawn(self) -> PresenterRef {
        let (sender, mut receiver) = mpsc::channel(MAILBOX_SIZE);
        let mut presenter = self;
        tokio::spawn(async move {
            while let Some(message) = receiver.recv().await {
                if !presenter.handle(message) {
                    break;
                }
            }
            log::debug!("presenter of map session {} finished", presenter.session.id());
        });
        PresenterRef { sender }
    }

    /// Returns `false` once the presenter should stop.
    fn handle(&mut self, message: PresenterMessage) -> bool {
        match message {
            PresenterMessage::Apply { cycle, positions } => {
                self.apply(cycle, positions);
                true
            }
            PresenterMessage::Snapshot { respond_to } => {
                respond_to
                    .send(self.snapshot())
                    .unwrap_or_else(|_| log::error!("can not answer snapshot request!"));
                true
            }
            PresenterMessage::Unmount { respond_to } => {
                self.liveness.cancel();
                let cleared = self.markers.clear();
                let result = self.manager.destroy_session(&mut self.session);
                log::info!(
                    "unmounted map session {} ({cleared} markers released)",
                    self.session.id()
                );
                respond_to
                    .send(result)
                    .unwrap_or_else(|_| log::error!("can not answer unmount request!"));
                false
            }
        }
    }

    fn apply(&mut self, cycle: u64, positions: Vec<VehiclePosition>) {
        // results of fetches that finished after unmount must not reach the map
        if self.liveness.is_cancelled() {
            log::debug!("view is unmounting, ignoring poll cycle {cycle}");
            return;
        }
        if let Some(last) = self.last_cycle.filter(|last| *last > cycle) {
            log::debug!("applying poll cycle {cycle} after newer cycle {last}");
        }

        let previous = mem::take(&mut self.markers);
        match reconcile(&mut self.session, previous, &positions) {
            Ok(reconciled) => {
                self.markers = reconciled.markers;
                self.last_cycle = Some(cycle);
                let summary = reconciled.summary;
                log::debug!(
                    "cycle {cycle}: {} added, {} moved, {} unchanged, {} removed",
                    summary.added,
                    summary.updated,
                    summary.unchanged,
                    summary.removed
                );
            }
            Err(rejected) => {
                log::error!("could not apply poll cycle {cycle}: {}", rejected.reason);
                self.markers = rejected.markers;
            }
        }
    }

    fn snapshot(&self) -> ViewSnapshot {
        ViewSnapshot {
            session: self.session.id(),
            vehicle_ids: self.markers.ids().cloned().collect(),
            marker_count: self.markers.len(),
            last_cycle: self.last_cycle,
        }
    }
}

/// Mailbox of a running presenter.
#[derive(Clone)]
pub struct PresenterRef {
    sender: mpsc::Sender<PresenterMessage>,
}

impl PresenterRef {
    async fn snapshot(&self) -> Result<ViewSnapshot, TrackerError> {
        let (respond_to, response) = oneshot::channel();
        self.sender
            .send(PresenterMessage::Snapshot { respond_to })
            .await
            .map_err(|_| TrackerError::PresenterGone)?;
        response.await.map_err(|_| TrackerError::PresenterGone)
    }

    async fn unmount(&self) -> Result<(), TrackerError> {
        let (respond_to, response) = oneshot::channel();
        self.sender
            .send(PresenterMessage::Unmount { respond_to })
            .await
            .map_err(|_| TrackerError::PresenterGone)?;
        response
            .await
            .map_err(|_| TrackerError::PresenterGone)?
            .map_err(TrackerError::from)
    }
}

#[async_trait]
impl PositionSink for PresenterRef {
    async fn deliver(&self, cycle: u64, positions: Vec<VehiclePosition>) {
        let message = PresenterMessage::Apply { cycle, positions };
        if self.sender.send(message).await.is_err() {
            log::debug!("presenter is gone, dropping poll cycle {cycle}");
        }
    }
}

/// A mounted vehicle map: one map session, kept in sync with the backend by a
/// polling scheduler until [`VehicleMapView::unmount`] is called.
pub struct VehicleMapView<S: VehicleSource> {
    scheduler: PollingScheduler<S, PresenterRef>,
    presenter: PresenterRef,
    container: String,
}

impl<S: VehicleSource> VehicleMapView<S> {
    /// Creates the map session and starts polling. Must be called from within
    /// a tokio runtime.
    pub fn mount<F>(
        factory: F,
        source: S,
        options: &MapOptions,
        config: &ViewConfig,
    ) -> Result<Self, TrackerError>
    where
        F: MapWidgetFactory + Send + 'static,
        F::Widget: Send + 'static,
        MarkerOf<F>: Send + 'static,
    {
        let manager = MapSessionManager::new(factory, options.clone());
        let session = manager.create_session(&config.container)?;

        let liveness = CancellationToken::new();
        let presenter = Presenter {
            manager,
            session,
            markers: DisplayedMarkerSet::new(),
            liveness: liveness.clone(),
            last_cycle: None,
        }
        .spawn();

        let mut scheduler = PollingScheduler::with_liveness(
            Arc::new(source),
            Arc::new(presenter.clone()),
            config.poll_interval,
            liveness,
        );
        scheduler.start()?;

        log::info!("mounted vehicle map on '{}'", config.container);
        Ok(Self {
            scheduler,
            presenter,
            container: config.container.clone(),
        })
    }

    pub fn container(&self) -> &str {
        &self.container
    }

    pub fn stats(&self) -> PollStats {
        self.scheduler.stats()
    }

    pub async fn snapshot(&self) -> Result<ViewSnapshot, TrackerError> {
        self.presenter.snapshot().await
    }

    /// Stops polling, then releases all markers and destroys the map session.
    pub async fn unmount(mut self) -> Result<(), TrackerError> {
        self.scheduler.stop();
        self.presenter.unmount().await
    }
}
