use thiserror::Error;

use crate::signals::light::TrafficLight;
use crate::signals::state::{InvalidStateCharacter, LightState};

/// A timed, intersection-wide light configuration. The state string holds
/// one encoded character per fixture position; a phase must be activated
/// every time it becomes current so its expiration time is set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Phase {
    id: String,
    duration: u64,
    state_string: String,
    expiration_time: Option<u64>,
}

/// Failure to read a fixture's state out of a phase's state string.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PhaseDecodeError {
    #[error("fixture '{0}' has no position in the state string")]
    NoPosition(String),
    #[error(transparent)]
    InvalidCharacter(#[from] InvalidStateCharacter),
}

impl Phase {
    pub fn new(id: &str, duration: u64, state_string: &str) -> Phase {
        Phase {
            id: id.to_string(),
            duration,
            state_string: state_string.to_string(),
            expiration_time: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn duration(&self) -> u64 {
        self.duration
    }

    pub fn state_string(&self) -> &str {
        &self.state_string
    }

    /// Arms the phase: it expires `duration` steps after `now`.
    pub fn activate(&mut self, now: u64) {
        self.expiration_time = Some(now + self.duration);
    }

    /// Steps remaining until expiration, zero once expired. A phase that
    /// was never activated reports zero.
    pub fn time_to_expiration(&self, now: u64) -> u64 {
        self.expiration_time
            .map(|expiration| expiration.saturating_sub(now))
            .unwrap_or(0)
    }

    /// A never-activated phase counts as expired so the scheduler activates
    /// it on its next pass.
    pub fn has_expired(&self, now: u64) -> bool {
        match self.expiration_time {
            Some(expiration) => expiration <= now,
            None => true,
        }
    }

    /// Reads the given fixture's state from the state string. The fixture id
    /// is its numeric position, e.g. `TrafficLight.11_06` reads position 6.
    pub fn state_for(&self, light: &TrafficLight) -> Result<LightState, PhaseDecodeError> {
        let position = light
            .key()
            .fixture_index()
            .ok_or_else(|| PhaseDecodeError::NoPosition(light.name()))?;
        let character = self
            .state_string
            .chars()
            .nth(position)
            .ok_or_else(|| PhaseDecodeError::NoPosition(light.name()))?;
        Ok(LightState::from_state_char(character)?)
    }
}
