use std::sync::Arc;

use log::{debug, warn};
use tokio::sync::mpsc;

use crate::center::Mode;
use crate::communication::messages::SchedulerCommand;
use crate::signals::light::TrafficLight;
use crate::signals::phase::Phase;
use crate::signals::state::LightState;

/// Handle to a running intersection scheduler. All interaction goes through
/// the command channel; sends are best-effort and become no-ops once the
/// scheduler has stopped.
#[derive(Debug, Clone)]
pub struct SchedulerHandle {
    intersection_id: String,
    commands: mpsc::UnboundedSender<SchedulerCommand>,
}

impl SchedulerHandle {
    /// Spawns the scheduling task for one intersection and returns its
    /// handle. The first phase of the cycle is armed immediately.
    pub fn spawn(
        intersection_id: &str,
        lights: Vec<Arc<TrafficLight>>,
        phases: Vec<Phase>,
    ) -> SchedulerHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        let scheduler = IntersectionScheduler::new(intersection_id, lights, phases);
        tokio::spawn(scheduler.run(rx));
        SchedulerHandle {
            intersection_id: intersection_id.to_string(),
            commands: tx,
        }
    }

    pub fn intersection_id(&self) -> &str {
        &self.intersection_id
    }

    pub fn tick(&self, now: u64, mode: Mode) {
        let _ = self.commands.send(SchedulerCommand::Tick { now, mode });
    }

    pub fn request_green(&self, light: Arc<TrafficLight>) {
        let _ = self.commands.send(SchedulerCommand::RequestGreen { light });
    }

    pub fn request_stop(&self) {
        let _ = self.commands.send(SchedulerCommand::Stop);
    }
}

/// Scheduling state for one intersection: a cyclic phase program plus the
/// lights it drives. Runs as its own task; under TRIGGER mode it sits in a
/// quiescent default state and only serves green requests.
pub struct IntersectionScheduler {
    intersection_id: String,
    lights: Vec<Arc<TrafficLight>>,
    phases: Vec<Phase>,
    current: usize,
    blink_on: bool,
}

impl IntersectionScheduler {
    pub fn new(
        intersection_id: &str,
        lights: Vec<Arc<TrafficLight>>,
        mut phases: Vec<Phase>,
    ) -> IntersectionScheduler {
        if let Some(first) = phases.first_mut() {
            first.activate(0);
        }
        IntersectionScheduler {
            intersection_id: intersection_id.to_string(),
            lights,
            phases,
            current: 0,
            blink_on: false,
        }
    }

    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<SchedulerCommand>) {
        debug!(
            "scheduler for intersection {} started with {} lights, {} phases",
            self.intersection_id,
            self.lights.len(),
            self.phases.len()
        );
        while let Some(command) = commands.recv().await {
            match command {
                SchedulerCommand::Tick { now, mode } => self.on_tick(now, mode),
                SchedulerCommand::RequestGreen { light } => self.on_request_green(&light),
                SchedulerCommand::Stop => break,
            }
        }
        debug!("scheduler for intersection {} stopped", self.intersection_id);
    }

    pub fn on_tick(&mut self, now: u64, mode: Mode) {
        match mode {
            Mode::Program => self.advance_program(now),
            Mode::Blinking => self.blink(),
            // quiescent: trigger requests and external instructions drive
            // the lights, the clock does not
            Mode::Trigger | Mode::External | Mode::Off => {}
        }
    }

    /// Grants green iff every prerequisite of the light currently reports
    /// red. A denied request is dropped; the caller may re-trigger later.
    pub fn on_request_green(&mut self, light: &Arc<TrafficLight>) {
        if light.all_prerequisites_red() {
            light.set_state(LightState::Green);
        } else {
            debug!(
                "green denied for {}: prerequisite not red",
                light.name()
            );
        }
    }

    fn advance_program(&mut self, now: u64) {
        if self.phases.is_empty() {
            return;
        }
        if !self.phases[self.current].has_expired(now) {
            return;
        }
        self.current = (self.current + 1) % self.phases.len();
        self.apply_current_phase();
        self.phases[self.current].activate(now);
    }

    /// Applies the current phase to every owned light. A fixture whose
    /// state cannot be decoded degrades to OFF; the rest of the
    /// intersection keeps operating.
    fn apply_current_phase(&self) {
        let phase = &self.phases[self.current];
        for light in &self.lights {
            match phase.state_for(light) {
                Ok(state) => light.set_state(state),
                Err(err) => {
                    warn!(
                        "phase {} of intersection {}: {}, switching {} off",
                        phase.id(),
                        self.intersection_id,
                        err,
                        light.name()
                    );
                    light.set_state(LightState::Off);
                }
            }
        }
    }

    fn blink(&mut self) {
        self.blink_on = !self.blink_on;
        let state = if self.blink_on {
            LightState::Yellow
        } else {
            LightState::Off
        };
        for light in &self.lights {
            light.set_state(state);
        }
    }
}
