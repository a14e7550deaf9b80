use std::fmt;
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;

use crate::communication::messages::SignalEvent;
use crate::signals::state::{LightDirection, LightState};

/// Structured identity of a light fixture, parsed exactly once from its
/// object identifier. A valid identifier reads
/// `TrafficLight.<intersection>_<fixture>[.<direction>]`, e.g.
/// `TrafficLight.11_06.R`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LightKey {
    intersection: String,
    fixture: String,
}

impl LightKey {
    /// Parses an object identifier into its key and arrow direction.
    /// Returns `None` for identifiers outside the naming grammar; unknown
    /// direction codes fall back to `LightDirection::None`.
    pub fn parse(object_id: &str) -> Option<(LightKey, LightDirection)> {
        let mut segments = object_id.split('.');
        if segments.next()? != "TrafficLight" {
            return None;
        }
        let (intersection, fixture) = segments.next()?.split_once('_')?;
        if intersection.is_empty() || fixture.is_empty() {
            return None;
        }
        let direction = segments
            .next()
            .map(LightDirection::from_code)
            .unwrap_or(LightDirection::None);
        Some((
            LightKey {
                intersection: intersection.to_string(),
                fixture: fixture.to_string(),
            },
            direction,
        ))
    }

    pub fn new(intersection: &str, fixture: &str) -> LightKey {
        LightKey {
            intersection: intersection.to_string(),
            fixture: fixture.to_string(),
        }
    }

    /// Intersection the fixture belongs to, e.g. `"11"`.
    pub fn intersection(&self) -> &str {
        &self.intersection
    }

    /// Fixture id within the intersection, e.g. `"06"`.
    pub fn fixture(&self) -> &str {
        &self.fixture
    }

    /// Fixture id as a numeric position, used to index phase state strings.
    pub fn fixture_index(&self) -> Option<usize> {
        self.fixture.parse().ok()
    }
}

impl fmt::Display for LightKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TrafficLight.{}_{}", self.intersection, self.fixture)
    }
}

/// Placement of a fixture relative to the road network, loaded from the
/// rule file's position section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PositionData {
    pub road_id: String,
    pub crossing_type: i32,
    pub arrow_type: i32,
    pub lane: u32,
}

/// One physical traffic light head serving one approach at an intersection.
///
/// State and direction are individually lock-protected so the owning
/// scheduler can write while other tasks (prerequisite checks, rendering)
/// read concurrently. No consistency across fields is promised.
pub struct TrafficLight {
    object_id: String,
    key: LightKey,
    state: Mutex<LightState>,
    direction: Mutex<LightDirection>,
    prerequisites: Mutex<Vec<Arc<TrafficLight>>>,
    position: Mutex<Option<PositionData>>,
    events: mpsc::UnboundedSender<SignalEvent>,
}

impl TrafficLight {
    /// Builds a light from its object identifier, switched off. Returns
    /// `None` if the identifier does not follow the naming grammar.
    pub fn from_object_id(
        object_id: &str,
        events: mpsc::UnboundedSender<SignalEvent>,
    ) -> Option<TrafficLight> {
        let (key, direction) = LightKey::parse(object_id)?;
        Some(TrafficLight {
            object_id: object_id.to_string(),
            key,
            state: Mutex::new(LightState::Off),
            direction: Mutex::new(direction),
            prerequisites: Mutex::new(Vec::new()),
            position: Mutex::new(None),
            events,
        })
    }

    /// Full object identifier including the direction suffix,
    /// e.g. `"TrafficLight.11_06.R"`.
    pub fn object_id(&self) -> &str {
        &self.object_id
    }

    /// Direction-stripped name, e.g. `"TrafficLight.11_06"`.
    pub fn name(&self) -> String {
        self.key.to_string()
    }

    pub fn key(&self) -> &LightKey {
        &self.key
    }

    pub fn intersection_id(&self) -> &str {
        self.key.intersection()
    }

    pub fn state(&self) -> LightState {
        *self.state.lock().unwrap()
    }

    /// Switches the light to the given state. A no-op when the state is
    /// unchanged; otherwise observers are notified. Never fails: a missing
    /// observer simply drops the notification.
    pub fn set_state(&self, new_state: LightState) {
        {
            let mut state = self.state.lock().unwrap();
            if *state == new_state {
                return;
            }
            *state = new_state;
        }
        let _ = self.events.send(SignalEvent::StateChanged {
            name: self.name(),
            state: new_state,
            direction: self.direction(),
        });
    }

    pub fn direction(&self) -> LightDirection {
        *self.direction.lock().unwrap()
    }

    /// Same contract as `set_state`, but for the arrow direction.
    pub fn set_direction(&self, new_direction: LightDirection) {
        {
            let mut direction = self.direction.lock().unwrap();
            if *direction == new_direction {
                return;
            }
            *direction = new_direction;
        }
        let _ = self.events.send(SignalEvent::DirectionChanged {
            name: self.name(),
            direction: new_direction,
        });
    }

    /// Lights that must be red before this one may switch to green.
    /// Late-bound after the rule store has been loaded.
    pub fn set_prerequisites(&self, lights: Vec<Arc<TrafficLight>>) {
        *self.prerequisites.lock().unwrap() = lights;
    }

    pub fn prerequisites(&self) -> Vec<Arc<TrafficLight>> {
        self.prerequisites.lock().unwrap().clone()
    }

    /// True when every prerequisite currently reports red. Vacuously true
    /// for a light without prerequisites.
    pub fn all_prerequisites_red(&self) -> bool {
        self.prerequisites
            .lock()
            .unwrap()
            .iter()
            .all(|light| light.state() == LightState::Red)
    }

    pub fn set_position_data(&self, position: PositionData) {
        *self.position.lock().unwrap() = Some(position);
    }

    pub fn position_data(&self) -> Option<PositionData> {
        self.position.lock().unwrap().clone()
    }
}

impl fmt::Debug for TrafficLight {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrafficLight")
            .field("object_id", &self.object_id)
            .field("state", &self.state())
            .field("direction", &self.direction())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_light(object_id: &str) -> (Arc<TrafficLight>, mpsc::UnboundedReceiver<SignalEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let light = TrafficLight::from_object_id(object_id, tx).expect("valid identifier");
        (Arc::new(light), rx)
    }

    #[test]
    fn identifier_round_trip() {
        for (ii, ff) in [("08", "05"), ("11", "06"), ("00", "12")] {
            for (code, direction) in [
                ("L", LightDirection::Left),
                ("R", LightDirection::Right),
                ("U", LightDirection::Up),
            ] {
                let object_id = format!("TrafficLight.{}_{}.{}", ii, ff, code);
                let (key, parsed_direction) = LightKey::parse(&object_id).unwrap();
                assert_eq!(key.intersection(), ii);
                assert_eq!(key.fixture(), ff);
                assert_eq!(parsed_direction, direction);
                assert_eq!(key.to_string(), format!("TrafficLight.{}_{}", ii, ff));
            }
        }
    }

    #[test]
    fn name_strips_direction_suffix() {
        let (light, _rx) = make_light("TrafficLight.11_06.R");
        assert_eq!(light.object_id(), "TrafficLight.11_06.R");
        assert_eq!(light.name(), "TrafficLight.11_06");
        assert_eq!(light.intersection_id(), "11");
        assert_eq!(light.direction(), LightDirection::Right);
    }

    #[test]
    fn missing_direction_parses_as_none() {
        let (key, direction) = LightKey::parse("TrafficLight.08_01").unwrap();
        assert_eq!(direction, LightDirection::None);
        assert_eq!(key.fixture_index(), Some(1));
    }

    #[test]
    fn garbage_direction_code_defaults_to_none() {
        let (_, direction) = LightKey::parse("TrafficLight.08_01.Q").unwrap();
        assert_eq!(direction, LightDirection::None);
    }

    #[test]
    fn non_light_identifiers_are_rejected() {
        assert!(LightKey::parse("Terrain.01").is_none());
        assert!(LightKey::parse("TrafficLight").is_none());
        assert!(LightKey::parse("TrafficLight.0806").is_none());
        assert!(LightKey::parse("TrafficLight._06").is_none());
        assert!(LightKey::parse("TrafficLight.08_").is_none());
    }

    #[test]
    fn set_state_is_idempotent_and_notifies_on_change() {
        let (light, mut rx) = make_light("TrafficLight.08_00");
        assert_eq!(light.state(), LightState::Off);

        // unchanged value: no notification fires
        light.set_state(LightState::Off);
        assert!(rx.try_recv().is_err());

        light.set_state(LightState::Green);
        assert_eq!(light.state(), LightState::Green);
        match rx.try_recv() {
            Ok(SignalEvent::StateChanged { name, state, .. }) => {
                assert_eq!(name, "TrafficLight.08_00");
                assert_eq!(state, LightState::Green);
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn set_state_survives_a_dropped_observer() {
        let (light, rx) = make_light("TrafficLight.08_00");
        drop(rx);
        light.set_state(LightState::Red);
        assert_eq!(light.state(), LightState::Red);
    }

    #[test]
    fn prerequisite_check_requires_every_light_red() {
        let (light, _rx) = make_light("TrafficLight.08_05");
        let (first, _rx1) = make_light("TrafficLight.08_01");
        let (second, _rx2) = make_light("TrafficLight.08_02");
        light.set_prerequisites(vec![Arc::clone(&first), Arc::clone(&second)]);

        first.set_state(LightState::Red);
        second.set_state(LightState::Green);
        assert!(!light.all_prerequisites_red());

        second.set_state(LightState::Red);
        assert!(light.all_prerequisites_red());
    }

    #[test]
    fn empty_prerequisites_are_vacuously_red() {
        let (light, _rx) = make_light("TrafficLight.08_03");
        assert!(light.all_prerequisites_red());
    }
}
