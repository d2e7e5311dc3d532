use std::{
    fmt,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex, PoisonError,
    },
    time::Duration,
};

use async_trait::async_trait;
use chrono::{DateTime, Local};
use model::{partition_renderable, VehiclePosition};
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use vehicle_api::VehicleSource;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Polling,
    Stopped,
}

impl fmt::Display for SchedulerState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Polling => write!(f, "polling"),
            Self::Stopped => write!(f, "stopped"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchedulerError {
    #[error("can not {event} a scheduler that is {from}")]
    InvalidTransition {
        from: SchedulerState,
        event: &'static str,
    },
    #[error("poll interval must not be zero")]
    ZeroInterval,
}

/// Receives the filtered positions of every successful poll cycle.
#[async_trait]
pub trait PositionSink: Send + Sync + 'static {
    /// `cycle` numbers grow in the order cycles were started, deliveries happen
    /// in the order fetches completed.
    async fn deliver(&self, cycle: u64, positions: Vec<VehiclePosition>);
}

#[derive(Debug, Default)]
struct PollCounters {
    started: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
    discarded: AtomicU64,
    last_success: Mutex<Option<DateTime<Local>>>,
}

impl PollCounters {
    fn record_success(&self) {
        self.succeeded.fetch_add(1, Ordering::SeqCst);
        *self
            .last_success
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(Local::now());
    }

    fn snapshot(&self) -> PollStats {
        PollStats {
            started: self.started.load(Ordering::SeqCst),
            succeeded: self.succeeded.load(Ordering::SeqCst),
            failed: self.failed.load(Ordering::SeqCst),
            discarded: self.discarded.load(Ordering::SeqCst),
            last_success: *self
                .last_success
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollStats {
    pub started: u64,
    pub succeeded: u64,
    pub failed: u64,
    /// Successful fetches whose result arrived after the scheduler stopped.
    pub discarded: u64,
    pub last_success: Option<DateTime<Local>>,
}

struct CycleContext<S, K> {
    source: Arc<S>,
    sink: Arc<K>,
    liveness: CancellationToken,
    counters: Arc<PollCounters>,
}

impl<S, K> Clone for CycleContext<S, K> {
    fn clone(&self) -> Self {
        Self {
            source: self.source.clone(),
            sink: self.sink.clone(),
            liveness: self.liveness.clone(),
            counters: self.counters.clone(),
        }
    }
}

/// Fetch, filter and hand over. Never fails; a failed fetch only gets logged.
async fn run_cycle<S, K>(context: CycleContext<S, K>, cycle: u64)
where
    S: VehicleSource,
    K: PositionSink,
{
    context.counters.started.fetch_add(1, Ordering::SeqCst);

    let records = match context.source.fetch_vehicles().await {
        Ok(records) => records,
        Err(why) => {
            context.counters.failed.fetch_add(1, Ordering::SeqCst);
            log::warn!("poll cycle {cycle} failed: {why}");
            return;
        }
    };

    if context.liveness.is_cancelled() {
        context.counters.discarded.fetch_add(1, Ordering::SeqCst);
        log::debug!("dropping result of poll cycle {cycle}, scheduler was stopped");
        return;
    }

    let (positions, outcome) = partition_renderable(records);
    context.counters.record_success();
    log::info!(
        "[poll] cycle {cycle}: received {} vehicles ({} without position)",
        outcome.kept,
        outcome.dropped
    );
    context.sink.deliver(cycle, positions).await;
}

/// Triggers a poll cycle right away and then once per interval, until stopped.
///
/// Cycles run as independent tasks, so a slow fetch never delays the next
/// tick and overlapping cycles are not cancelled. Stopping cancels the
/// liveness token; cycles still in flight then drop their results instead of
/// delivering them. A stopped scheduler can not be restarted.
///
/// `start` has to be called from within a tokio runtime.
pub struct PollingScheduler<S, K>
where
    S: VehicleSource,
    K: PositionSink,
{
    source: Arc<S>,
    sink: Arc<K>,
    interval: Duration,
    state: SchedulerState,
    liveness: CancellationToken,
    counters: Arc<PollCounters>,
}

impl<S, K> PollingScheduler<S, K>
where
    S: VehicleSource,
    K: PositionSink,
{
    pub fn new(source: Arc<S>, sink: Arc<K>, interval: Duration) -> Self {
        Self::with_liveness(source, sink, interval, CancellationToken::new())
    }

    /// Uses `liveness` as the token that is cancelled on stop, so that the
    /// consumer of the results can hold it before the scheduler exists.
    pub fn with_liveness(
        source: Arc<S>,
        sink: Arc<K>,
        interval: Duration,
        liveness: CancellationToken,
    ) -> Self {
        Self {
            source,
            sink,
            interval,
            state: SchedulerState::Idle,
            liveness,
            counters: Arc::new(PollCounters::default()),
        }
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Cancelled once the scheduler stops. Whoever applies delivered results
    /// must check it right before doing so.
    pub fn liveness(&self) -> CancellationToken {
        self.liveness.clone()
    }

    pub fn stats(&self) -> PollStats {
        self.counters.snapshot()
    }

    pub fn start(&mut self) -> Result<(), SchedulerError> {
        if self.state != SchedulerState::Idle {
            return Err(SchedulerError::InvalidTransition {
                from: self.state,
                event: "start",
            });
        }
        if self.interval.is_zero() {
            return Err(SchedulerError::ZeroInterval);
        }
        self.state = SchedulerState::Polling;

        let context = CycleContext {
            source: self.source.clone(),
            sink: self.sink.clone(),
            liveness: self.liveness.clone(),
            counters: self.counters.clone(),
        };
        let interval = self.interval;
        let liveness = self.liveness.clone();

        tokio::spawn(async move {
            let mut ticker = time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut cycle = 0u64;
            loop {
                tokio::select! {
                    biased;
                    _ = liveness.cancelled() => break,
                    // the first tick completes immediately
                    _ = ticker.tick() => {
                        cycle += 1;
                        tokio::spawn(run_cycle(context.clone(), cycle));
                    }
                }
            }
            log::debug!("poll timer stopped after {cycle} cycles");
        });

        log::info!("started polling every {:?}", self.interval);
        Ok(())
    }

    /// Stops polling. Stopping twice is harmless.
    pub fn stop(&mut self) {
        if self.state == SchedulerState::Stopped {
            return;
        }
        self.liveness.cancel();
        if self.state == SchedulerState::Polling {
            log::info!("stopped polling");
        }
        self.state = SchedulerState::Stopped;
    }
}

impl<S, K> Drop for PollingScheduler<S, K>
where
    S: VehicleSource,
    K: PositionSink,
{
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use model::RawVehicleRecord;
    use tokio::{
        sync::{mpsc, Notify},
        time::Instant,
    };
    use vehicle_api::FetchError;

    use super::*;

    type Script = VecDeque<Result<Vec<RawVehicleRecord>, FetchError>>;

    fn record(id: &str, lat: Option<f64>) -> RawVehicleRecord {
        RawVehicleRecord {
            id: id.into(),
            label: Some(id.to_owned()),
            lat,
            lon: Some(24.9),
            speed: Some(10.0),
        }
    }

    fn decode_error() -> FetchError {
        FetchError::Decode(serde_json::from_str::<Vec<RawVehicleRecord>>("{").unwrap_err())
    }

    /// Answers with the scripted results, then with empty lists.
    #[derive(Default)]
    struct ScriptedSource {
        script: Mutex<Script>,
        delay: Option<Duration>,
        calls: AtomicU64,
    }

    impl ScriptedSource {
        fn new(script: Vec<Result<Vec<RawVehicleRecord>, FetchError>>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                ..Default::default()
            }
        }

        fn calls(&self) -> u64 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl VehicleSource for ScriptedSource {
        async fn fetch_vehicles(&self) -> Result<Vec<RawVehicleRecord>, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                time::sleep(delay).await;
            }
            let next = self.script.lock().unwrap().pop_front();
            next.unwrap_or_else(|| Ok(Vec::new()))
        }
    }

    /// Blocks every fetch until released.
    #[derive(Default)]
    struct GatedSource {
        started: Notify,
        release: Notify,
    }

    #[async_trait]
    impl VehicleSource for GatedSource {
        async fn fetch_vehicles(&self) -> Result<Vec<RawVehicleRecord>, FetchError> {
            self.started.notify_one();
            self.release.notified().await;
            Ok(vec![record("A", Some(60.1))])
        }
    }

    struct ChannelSink(mpsc::UnboundedSender<(u64, Vec<VehiclePosition>)>);

    #[async_trait]
    impl PositionSink for ChannelSink {
        async fn deliver(&self, cycle: u64, positions: Vec<VehiclePosition>) {
            let _ = self.0.send((cycle, positions));
        }
    }

    fn channel_sink() -> (
        Arc<ChannelSink>,
        mpsc::UnboundedReceiver<(u64, Vec<VehiclePosition>)>,
    ) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(ChannelSink(tx)), rx)
    }

    #[tokio::test(start_paused = true)]
    async fn first_cycle_runs_immediately() {
        let source = Arc::new(ScriptedSource::new(vec![Ok(vec![
            record("A", Some(60.1)),
            record("B", None),
        ])]));
        let (sink, mut deliveries) = channel_sink();
        let mut scheduler = PollingScheduler::new(source, sink, Duration::from_secs(1));
        let begin = Instant::now();

        scheduler.start().unwrap();
        let (cycle, positions) = deliveries.recv().await.unwrap();

        assert!(begin.elapsed() < Duration::from_secs(1));
        assert_eq!(cycle, 1);
        assert_eq!(positions.len(), 1);
        assert_eq!(positions[0].id, "A".into());
        assert_eq!(scheduler.state(), SchedulerState::Polling);
    }

    #[tokio::test(start_paused = true)]
    async fn polls_once_per_interval() {
        let source = Arc::new(ScriptedSource::default());
        let (sink, mut deliveries) = channel_sink();
        let mut scheduler = PollingScheduler::new(source, sink, Duration::from_secs(1));
        let begin = Instant::now();

        scheduler.start().unwrap();
        for expected in 1..=3 {
            let (cycle, _) = deliveries.recv().await.unwrap();
            assert_eq!(cycle, expected);
        }

        let elapsed = begin.elapsed();
        assert!(elapsed >= Duration::from_secs(2), "{elapsed:?}");
        assert!(elapsed < Duration::from_secs(3), "{elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn failed_cycle_does_not_stop_polling() {
        let source = Arc::new(ScriptedSource::new(vec![
            Err(decode_error()),
            Err(decode_error()),
            Ok(vec![record("A", Some(60.1))]),
        ]));
        let (sink, mut deliveries) = channel_sink();
        let mut scheduler = PollingScheduler::new(source.clone(), sink, Duration::from_secs(1));

        scheduler.start().unwrap();
        let (cycle, positions) = deliveries.recv().await.unwrap();

        assert_eq!(cycle, 3);
        assert_eq!(positions.len(), 1);
        let stats = scheduler.stats();
        assert_eq!(stats.failed, 2);
        assert_eq!(stats.succeeded, 1);
        assert!(stats.last_success.is_some());
        assert_eq!(source.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn result_arriving_after_stop_is_dropped() {
        let source = Arc::new(GatedSource::default());
        let (sink, mut deliveries) = channel_sink();
        let mut scheduler = PollingScheduler::new(source.clone(), sink, Duration::from_secs(1));

        scheduler.start().unwrap();
        source.started.notified().await;
        scheduler.stop();
        source.release.notify_one();
        time::sleep(Duration::from_secs(5)).await;

        assert!(deliveries.try_recv().is_err());
        let stats = scheduler.stats();
        assert_eq!(stats.started, 1);
        assert_eq!(stats.discarded, 1);
        assert_eq!(stats.succeeded, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn overlapping_cycles_are_not_cancelled() {
        let source = Arc::new(ScriptedSource {
            delay: Some(Duration::from_millis(1500)),
            ..Default::default()
        });
        let (sink, mut deliveries) = channel_sink();
        let mut scheduler = PollingScheduler::new(source.clone(), sink, Duration::from_secs(1));

        scheduler.start().unwrap();
        time::sleep(Duration::from_millis(3200)).await;

        // fetches started at 0s, 1s, 2s and 3s, finished at 1.5s and 2.5s
        assert_eq!(source.calls(), 4);
        let mut delivered = Vec::new();
        while let Ok((cycle, _)) = deliveries.try_recv() {
            delivered.push(cycle);
        }
        assert_eq!(delivered, vec![1, 2]);
    }

    #[tokio::test(start_paused = true)]
    async fn nothing_is_polled_after_stop() {
        let source = Arc::new(ScriptedSource::default());
        let (sink, mut deliveries) = channel_sink();
        let mut scheduler = PollingScheduler::new(source.clone(), sink, Duration::from_secs(1));

        scheduler.start().unwrap();
        deliveries.recv().await.unwrap();
        scheduler.stop();
        let calls = source.calls();
        time::sleep(Duration::from_secs(10)).await;

        assert_eq!(source.calls(), calls);
        assert_eq!(scheduler.state(), SchedulerState::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_the_scheduler_stops_polling() {
        let source = Arc::new(ScriptedSource::default());
        let (sink, mut deliveries) = channel_sink();
        let mut scheduler = PollingScheduler::new(source.clone(), sink, Duration::from_secs(1));

        scheduler.start().unwrap();
        deliveries.recv().await.unwrap();
        drop(scheduler);
        let calls = source.calls();
        time::sleep(Duration::from_secs(10)).await;

        assert_eq!(source.calls(), calls);
    }

    #[tokio::test]
    async fn transitions_follow_the_state_machine() {
        let source = Arc::new(ScriptedSource::default());
        let (sink, _deliveries) = channel_sink();
        let mut scheduler = PollingScheduler::new(source, sink, Duration::from_secs(1));
        assert_eq!(scheduler.state(), SchedulerState::Idle);

        scheduler.start().unwrap();
        assert_eq!(
            scheduler.start(),
            Err(SchedulerError::InvalidTransition {
                from: SchedulerState::Polling,
                event: "start"
            })
        );

        scheduler.stop();
        scheduler.stop();
        assert_eq!(scheduler.state(), SchedulerState::Stopped);
        assert!(scheduler.liveness().is_cancelled());
        assert!(matches!(
            scheduler.start(),
            Err(SchedulerError::InvalidTransition {
                from: SchedulerState::Stopped,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn idle_scheduler_can_be_stopped() {
        let (sink, _deliveries) = channel_sink();
        let mut scheduler =
            PollingScheduler::new(Arc::new(ScriptedSource::default()), sink, Duration::from_secs(1));

        scheduler.stop();

        assert_eq!(scheduler.state(), SchedulerState::Stopped);
        assert!(scheduler.start().is_err());
    }

    #[tokio::test]
    async fn zero_interval_is_rejected() {
        let (sink, _deliveries) = channel_sink();
        let mut scheduler =
            PollingScheduler::new(Arc::new(ScriptedSource::default()), sink, Duration::ZERO);

        assert_eq!(scheduler.start(), Err(SchedulerError::ZeroInterval));
        assert_eq!(scheduler.state(), SchedulerState::Idle);
    }
}
