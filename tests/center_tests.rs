use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

use signal_center::center::TRAFFIC_LIGHT_TRIGGER;
use signal_center::signals::light::TrafficLight;
use signal_center::signals::state::LightState;
use signal_center::{Mode, Scenario, SignalCenter};

async fn setup_center() -> Arc<SignalCenter> {
    let scenario = Scenario::load(Path::new("tests/data/e2e.json")).expect("scenario");
    SignalCenter::setup(&scenario).await.expect("setup")
}

/// Scheduler commands are processed asynchronously; poll until the light
/// reaches the expected state.
async fn wait_for_state(light: &Arc<TrafficLight>, state: LightState) {
    for _ in 0..400 {
        if light.state() == state {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("{} never reached {:?}", light.name(), state);
}

#[tokio::test]
async fn requires_red_rule_gates_green_requests() {
    let center = setup_center().await;
    let blocker = center.light_by_name("TrafficLight.08_01").unwrap();
    let requester = center.light_by_name("TrafficLight.08_05").unwrap();
    let free = center.light_by_name("TrafficLight.08_00").unwrap();

    // conflicting approach is green: the request must be dropped
    blocker.set_state(LightState::Green);
    center.report_collision("TrafficLight.08_05", TRAFFIC_LIGHT_TRIGGER);

    // a rule-free light on the same scheduler is granted afterwards, which
    // proves the denied request has been processed by then
    center.report_collision("TrafficLight.08_00", TRAFFIC_LIGHT_TRIGGER);
    wait_for_state(&free, LightState::Green).await;
    assert_ne!(requester.state(), LightState::Green);

    // once the conflicting approach is red the same request goes through
    blocker.set_state(LightState::Red);
    center.report_collision("TrafficLight.08_05", TRAFFIC_LIGHT_TRIGGER);
    wait_for_state(&requester, LightState::Green).await;

    center.close();
}

#[tokio::test]
async fn program_mode_runs_the_phase_cycle_from_the_rule_file() {
    let center = setup_center().await;
    center.set_mode(Mode::Program);

    let first = center.light_by_name("TrafficLight.08_00").unwrap();
    let fifth = center.light_by_name("TrafficLight.08_04").unwrap();

    // first phase (armed at step 0, 5 steps long) has expired by step 6:
    // the scheduler advances into the yellow phase
    center.tick(6);
    wait_for_state(&first, LightState::Yellow).await;
    assert_eq!(fifth.state(), LightState::Red);

    // two steps later the opposing approaches get green
    center.tick(8);
    wait_for_state(&fifth, LightState::Green).await;
    wait_for_state(&first, LightState::Red).await;

    center.close();
}

#[tokio::test]
async fn listener_feeds_explicit_instructions_into_the_center() {
    let center = setup_center().await;
    center.set_mode(Mode::External);
    let addr = center.listener_addr().expect("listener running");

    let mut stream = TcpStream::connect(addr).await.expect("connect");
    stream
        .write_all(
            b"<TrafficLightControl>\
                <TrafficLight.08_03><status>green</status></TrafficLight.08_03>\
              </TrafficLightControl>",
        )
        .await
        .expect("write");
    stream.flush().await.expect("flush");

    let light = center.light_by_name("TrafficLight.08_03").unwrap();
    wait_for_state(&light, LightState::Green).await;

    center.close();
}

#[tokio::test]
async fn positional_instructions_follow_the_gating_policy() {
    let center = setup_center().await;
    let xml = r#"<TrafficLightControl><tlsstate id="8" state="ggrrggrr"/></TrafficLightControl>"#;
    let light = center.light_by_name("TrafficLight.08_00").unwrap();

    // default policy binds the positional dialect to EXTERNAL mode
    center.evaluate_instruction_string(xml);
    assert_eq!(light.state(), LightState::Off);

    center.set_mode(Mode::External);
    center.evaluate_instruction_string(xml);
    assert_eq!(light.state(), LightState::Green);
    assert_eq!(
        center.light_by_name("TrafficLight.08_02").unwrap().state(),
        LightState::Red
    );

    center.close();
}

#[tokio::test]
async fn close_stops_the_schedulers() {
    let center = setup_center().await;
    center.set_mode(Mode::Program);
    center.close();
    tokio::time::sleep(Duration::from_millis(20)).await;

    // ticks after close must not change any light again
    center.tick(100);
    tokio::time::sleep(Duration::from_millis(50)).await;
    for light in center.lights() {
        assert_eq!(light.state(), LightState::Off);
    }
}
