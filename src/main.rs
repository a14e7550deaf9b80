use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use log::info;
use rand::prelude::IndexedRandom;
use rand::Rng;

use signal_center::center::TRAFFIC_LIGHT_TRIGGER;
use signal_center::{Scenario, SignalCenter};

/// Demo driver: loads a scenario, runs the signal center, and stands in for
/// the enclosing simulation by supplying one tick per second and firing the
/// occasional collision trigger.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "scenarios/demo.json".to_string());
    let scenario = Scenario::load(Path::new(&path))?;
    let center = SignalCenter::setup(&scenario).await?;

    let driver = tokio::spawn(run_tick_driver(Arc::clone(&center)));

    tokio::signal::ctrl_c().await?;
    center.close();
    driver.abort();
    Ok(())
}

async fn run_tick_driver(center: Arc<SignalCenter>) {
    let names: Vec<String> = center
        .lights()
        .iter()
        .map(|light| light.name())
        .collect();
    let mut interval = tokio::time::interval(Duration::from_secs(1));
    let mut now = 0u64;
    loop {
        interval.tick().await;
        now += 1;
        center.tick(now);

        // a vehicle rolls over a trigger every few steps
        let mut rng = rand::rng();
        if rng.random_bool(0.2) {
            if let Some(name) = names.choose(&mut rng) {
                info!("trigger hit at {}", name);
                center.report_collision(name, TRAFFIC_LIGHT_TRIGGER);
            }
        }
    }
}
