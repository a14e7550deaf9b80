use std::sync::Arc;

use crate::center::Mode;
use crate::signals::light::TrafficLight;
use crate::signals::state::{LightDirection, LightState};

/// Notification emitted by a light whenever one of its visible properties
/// actually changes. Consumed by the center's notification pump, which feeds
/// the rendering refresh and the global state broadcast.
#[derive(Debug, Clone)]
pub enum SignalEvent {
    StateChanged {
        name: String,
        state: LightState,
        direction: LightDirection,
    },
    DirectionChanged {
        name: String,
        direction: LightDirection,
    },
}

/// Commands accepted by an intersection scheduler task. External callers
/// enqueue commands on the scheduler's channel instead of touching its state.
#[derive(Debug, Clone)]
pub enum SchedulerCommand {
    /// One simulation step. The tick carries the mode so schedulers never
    /// read shared mode state.
    Tick { now: u64, mode: Mode },
    /// Ask for green at the given light; dropped unless every prerequisite
    /// is currently red.
    RequestGreen { light: Arc<TrafficLight> },
    /// Cooperative shutdown, observed at the next command boundary.
    Stop,
}
