pub mod scheduler;

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use log::{debug, info, warn};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot, watch};

use crate::communication::messages::SignalEvent;
use crate::protocol::{self, Instruction};
use crate::rules::RuleStore;
use crate::scenario::{PositionalGating, Scenario};
use crate::signals::light::TrafficLight;
use crate::signals::phase::Phase;
use crate::signals::state::{LightDirection, LightState};

use self::scheduler::SchedulerHandle;

/// Trigger category that routes a collision report to the light schedulers;
/// every other category is ignored here.
pub const TRAFFIC_LIGHT_TRIGGER: &str = "TrafficLightTrigger";

/// Control strategy applied to all intersections at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Quiescent default; green is granted on collision triggers, gated by
    /// the requires-red rules.
    Trigger,
    /// Timed phase programs cycle on their own.
    Program,
    /// An external driver owns the lights via the instruction protocol.
    External,
    /// All lights blink yellow.
    Blinking,
    /// All lights dark.
    Off,
}

impl Mode {
    /// The successor in the fixed toggle cycle
    /// TRIGGER -> PROGRAM -> EXTERNAL -> BLINKING -> OFF -> TRIGGER.
    pub fn next(self) -> Mode {
        match self {
            Mode::Trigger => Mode::Program,
            Mode::Program => Mode::External,
            Mode::External => Mode::Blinking,
            Mode::Blinking => Mode::Off,
            Mode::Off => Mode::Trigger,
        }
    }
}

/// Origin of a state-change request, checked against the current mode by
/// the single authoritative gate in `SignalCenter::allows`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstructionSource {
    Trigger,
    Positional,
    Explicit,
}

/// Registry and mode dispatcher for all traffic lights of the network.
///
/// One explicitly constructed instance owns the canonical light list and
/// one scheduler task per intersection; every collaborator talks to the
/// lights through it. Simulation triggers, protocol messages, and the tick
/// driver may all call in concurrently.
pub struct SignalCenter {
    lights: Vec<Arc<TrafficLight>>,
    schedulers: Vec<SchedulerHandle>,
    mode: Mutex<Mode>,
    positional_gating: PositionalGating,
    states_rx: watch::Receiver<String>,
    listener_addr: Mutex<Option<SocketAddr>>,
    listener_stop: Mutex<Option<oneshot::Sender<()>>>,
}

impl SignalCenter {
    /// Initializes the whole subsystem from a scenario: loads the rule
    /// store, builds lights from scene objects and scenario declarations,
    /// attaches rules and position data, starts one scheduler per
    /// intersection, the notification pump and the instruction listener.
    pub async fn setup(scenario: &Scenario) -> anyhow::Result<Arc<SignalCenter>> {
        let rules = RuleStore::load(&scenario.rules_path());
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let mut lights: Vec<Arc<TrafficLight>> = Vec::new();
        let scene_lights = scenario
            .scene_objects
            .iter()
            .filter(|object_id| object_id.starts_with("TrafficLight"));
        for object_id in scene_lights.chain(scenario.traffic_lights.iter()) {
            match TrafficLight::from_object_id(object_id, events_tx.clone()) {
                Some(light) => lights.push(Arc::new(light)),
                None => warn!(
                    "object '{}' does not follow the light naming grammar, ignored",
                    object_id
                ),
            }
        }

        for light in &lights {
            let name = light.name();
            if let Some(required) = rules.requires_red(&name) {
                let resolved: Vec<Arc<TrafficLight>> = required
                    .iter()
                    .filter_map(|required_name| {
                        let found = lights
                            .iter()
                            .find(|candidate| candidate.name() == *required_name)
                            .cloned();
                        if found.is_none() {
                            warn!("rule for {} names unknown light {}", name, required_name);
                        }
                        found
                    })
                    .collect();
                light.set_prerequisites(resolved);
            }
            if let Some(position) = rules.position_for(&name) {
                light.set_position_data(position.clone());
            }
        }

        // one scheduler per distinct intersection, first-seen order
        let mut intersection_ids: Vec<String> = Vec::new();
        for light in &lights {
            let id = light.intersection_id();
            if !intersection_ids.iter().any(|existing| existing == id) {
                intersection_ids.push(id.to_string());
            }
        }
        let schedulers: Vec<SchedulerHandle> = intersection_ids
            .iter()
            .map(|intersection_id| {
                let members = lights
                    .iter()
                    .filter(|light| light.intersection_id() == intersection_id)
                    .cloned()
                    .collect();
                let phases: Vec<Phase> = rules
                    .phases_for(intersection_id)
                    .map(<[Phase]>::to_vec)
                    .unwrap_or_default();
                SchedulerHandle::spawn(intersection_id, members, phases)
            })
            .collect();
        info!(
            "signal center up: {} lights across {} intersections",
            lights.len(),
            schedulers.len()
        );

        let (states_tx, states_rx) = watch::channel(String::new());
        let center = Arc::new(SignalCenter {
            lights,
            schedulers,
            mode: Mutex::new(Mode::Trigger),
            positional_gating: scenario.positional_gating,
            states_rx,
            listener_addr: Mutex::new(None),
            listener_stop: Mutex::new(None),
        });

        let pump_lights = center.lights.clone();
        tokio::spawn(run_notification_pump(pump_lights, events_rx, states_tx));

        match TcpListener::bind(("0.0.0.0", scenario.listener_port)).await {
            Ok(listener) => {
                if let Ok(addr) = listener.local_addr() {
                    info!("instruction listener on {}", addr);
                    *center.listener_addr.lock().unwrap() = Some(addr);
                }
                let stop = protocol::listener::spawn(Arc::clone(&center), listener);
                *center.listener_stop.lock().unwrap() = Some(stop);
            }
            Err(err) => warn!(
                "instruction listener failed to bind port {}: {}",
                scenario.listener_port, err
            ),
        }

        Ok(center)
    }

    /// One simulation step for every intersection scheduler. The step
    /// counter is supplied by the embedding simulation.
    pub fn tick(&self, now: u64) {
        let mode = self.mode();
        for scheduler in &self.schedulers {
            scheduler.tick(now, mode);
        }
    }

    pub fn mode(&self) -> Mode {
        *self.mode.lock().unwrap()
    }

    /// Installs a new mode. Every light is forced off first so no stale lit
    /// signal from the previous mode survives the switch.
    pub fn set_mode(&self, new_mode: Mode) {
        let mut mode = self.mode.lock().unwrap();
        if *mode == new_mode {
            return;
        }
        self.set_state_all(LightState::Off);
        *mode = new_mode;
        info!("switched mode to {:?}", new_mode);
    }

    /// Advances through the fixed mode cycle.
    pub fn toggle_mode(&self) {
        let mut mode = self.mode.lock().unwrap();
        let next = mode.next();
        self.set_state_all(LightState::Off);
        *mode = next;
        info!("switched mode to {:?}", next);
    }

    /// The single authoritative mode gate. Both the trigger path and the
    /// protocol path decide through this function, nowhere else.
    pub fn allows(&self, source: InstructionSource) -> bool {
        let mode = self.mode();
        match source {
            InstructionSource::Trigger => mode == Mode::Trigger,
            InstructionSource::Explicit => mode == Mode::External,
            InstructionSource::Positional => match self.positional_gating {
                PositionalGating::Always => true,
                PositionalGating::ExternalOnly => mode == Mode::External,
            },
        }
    }

    /// Routes a collision report to the owning scheduler as a green
    /// request. Only the designated trigger category in TRIGGER mode gets
    /// through.
    pub fn report_collision(&self, light_name: &str, trigger_type: &str) {
        if trigger_type != TRAFFIC_LIGHT_TRIGGER || !self.allows(InstructionSource::Trigger) {
            return;
        }
        let Some(light) = self.light_by_name(light_name) else {
            debug!("collision reported for unknown light '{}'", light_name);
            return;
        };
        if let Some(scheduler) = self.scheduler_for(light.intersection_id()) {
            scheduler.request_green(light);
        }
    }

    /// Evaluates an instruction document from an external source. Malformed
    /// input is reported and discarded as a whole; valid instructions are
    /// applied subject to the mode gate.
    pub fn evaluate_instruction_string(&self, xml: &str) {
        debug!("instruction string: {}", xml);
        let instructions = match protocol::parse_instructions(xml) {
            Ok(instructions) => instructions,
            Err(err) => {
                warn!("discarding instruction: {}", err);
                return;
            }
        };
        for instruction in instructions {
            self.apply_instruction(instruction);
        }
    }

    fn apply_instruction(&self, instruction: Instruction) {
        match instruction {
            Instruction::Positional {
                intersection_id,
                states,
            } => {
                if !self.allows(InstructionSource::Positional) {
                    debug!(
                        "positional instruction for intersection {} ignored in mode {:?}",
                        intersection_id,
                        self.mode()
                    );
                    return;
                }
                for (index, state) in states.iter().enumerate() {
                    let name = format!("TrafficLight.{}_{:02}", intersection_id, index);
                    if let Some(light) = self.light_by_name(&name) {
                        light.set_state(*state);
                    }
                }
            }
            Instruction::Explicit { name, state } => {
                if !self.allows(InstructionSource::Explicit) {
                    debug!(
                        "instruction for {} ignored in mode {:?}",
                        name,
                        self.mode()
                    );
                    return;
                }
                match self.light_by_name(&name) {
                    Some(light) => light.set_state(state),
                    None => debug!("instruction names unknown light '{}'", name),
                }
            }
        }
    }

    /// Looks a light up by its direction-stripped name,
    /// e.g. `"TrafficLight.06_04"`.
    pub fn light_by_name(&self, name: &str) -> Option<Arc<TrafficLight>> {
        self.lights.iter().find(|light| light.name() == name).cloned()
    }

    /// Looks a light up by its full object identifier,
    /// e.g. `"TrafficLight.06_04.R"`.
    pub fn light_by_object_id(&self, object_id: &str) -> Option<Arc<TrafficLight>> {
        self.lights
            .iter()
            .find(|light| light.object_id() == object_id)
            .cloned()
    }

    /// Finds the first light whose position data matches the intersection,
    /// road and lane.
    pub fn light_by_location(
        &self,
        intersection_id: &str,
        road_id: &str,
        lane: u32,
    ) -> Option<Arc<TrafficLight>> {
        self.lights
            .iter()
            .find(|light| {
                light.intersection_id() == intersection_id
                    && light
                        .position_data()
                        .map_or(false, |position| {
                            position.road_id == road_id && position.lane == lane
                        })
            })
            .cloned()
    }

    pub fn lights(&self) -> &[Arc<TrafficLight>] {
        &self.lights
    }

    /// Concatenated state summary of every light, refreshed on each state
    /// change. External observers watch this channel.
    pub fn subscribe_states(&self) -> watch::Receiver<String> {
        self.states_rx.clone()
    }

    /// Address the instruction listener actually bound, if it is running.
    pub fn listener_addr(&self) -> Option<SocketAddr> {
        *self.listener_addr.lock().unwrap()
    }

    /// Best-effort shutdown: asks every scheduler and the listener to stop
    /// without blocking on them.
    pub fn close(&self) {
        for scheduler in &self.schedulers {
            scheduler.request_stop();
        }
        if let Some(stop) = self.listener_stop.lock().unwrap().take() {
            let _ = stop.send(());
        }
        info!("signal center closing");
    }

    fn scheduler_for(&self, intersection_id: &str) -> Option<&SchedulerHandle> {
        self.schedulers
            .iter()
            .find(|scheduler| scheduler.intersection_id() == intersection_id)
    }

    fn set_state_all(&self, state: LightState) {
        for light in &self.lights {
            light.set_state(state);
        }
    }
}

/// Builds the broadcast summary: one `state[_direction]` word per light in
/// registry order, direction omitted for dark lights.
pub(crate) fn global_states_string(lights: &[Arc<TrafficLight>]) -> String {
    let words: Vec<String> = lights
        .iter()
        .map(|light| {
            let state = light.state();
            let direction = if state == LightState::Off {
                LightDirection::None
            } else {
                light.direction()
            };
            format!("{}{}", state, direction.direction_suffix())
        })
        .collect();
    words.join(" ")
}

/// Consumes light notifications: logs the rendering refresh and republishes
/// the global state summary after every effective state change.
async fn run_notification_pump(
    lights: Vec<Arc<TrafficLight>>,
    mut events: mpsc::UnboundedReceiver<SignalEvent>,
    states_tx: watch::Sender<String>,
) {
    while let Some(event) = events.recv().await {
        match event {
            SignalEvent::StateChanged { name, state, .. } => {
                debug!("{} changed to {}", name, state);
                let _ = states_tx.send(global_states_string(&lights));
            }
            SignalEvent::DirectionChanged { name, direction } => {
                debug!("{} direction changed to {:?}", name, direction);
            }
        }
    }
}
