use std::time::Duration;

use map::headless::HeadlessMapFactory;
use tracker::{TrackerConfig, VehicleMapView};
use vehicle_api::VehicleApiClient;

const REPORT_INTERVAL: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() {
    env_logger::init();

    // configuration
    let config = TrackerConfig::from_env().expect("invalid configuration in env.");
    let client =
        VehicleApiClient::new(&config.api).expect("could not create vehicle api client.");
    log::info!(
        "polling {} every {:?}",
        client.url(),
        config.view.poll_interval
    );

    // map
    let factory = HeadlessMapFactory::new();
    let probe = factory.probe();
    let view = VehicleMapView::mount(factory, client, &config.map, &config.view)
        .expect("could not mount the vehicle map.");

    // report until interrupted
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);
    let mut report = tokio::time::interval(REPORT_INTERVAL);
    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            _ = report.tick() => match view.snapshot().await {
                Ok(snapshot) => {
                    let stats = view.stats();
                    log::info!(
                        "{} vehicles on '{}' ({} markers), {} ok / {} failed polls, last success {}",
                        snapshot.vehicle_ids.len(),
                        view.container(),
                        probe.marker_count(0),
                        stats.succeeded,
                        stats.failed,
                        stats
                            .last_success
                            .map(|at| at.format("%H:%M:%S").to_string())
                            .unwrap_or_else(|| "never".to_owned()),
                    );
                }
                Err(why) => {
                    log::error!("{why}");
                    break;
                }
            },
        }
    }

    if let Err(why) = view.unmount().await {
        log::error!("could not unmount the vehicle map: {why}");
    }
}
