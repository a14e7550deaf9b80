use std::fmt;

use thiserror::Error;

/// Combination of illuminated lamps on a single traffic light head.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LightState {
    Red,
    Green,
    Yellow,
    YellowRed,
    Off,
    All,
}

/// Raised when a wire character does not map to any light state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid state character '{0}'")]
pub struct InvalidStateCharacter(pub char);

impl LightState {
    /// Decodes a SUMO-style state character. `'G'` and `'g'` both map to
    /// green; every character outside the table is an error.
    pub fn from_state_char(c: char) -> Result<LightState, InvalidStateCharacter> {
        match c {
            'G' | 'g' => Ok(LightState::Green),
            'y' => Ok(LightState::Yellow),
            'r' => Ok(LightState::Red),
            'x' => Ok(LightState::YellowRed),
            'o' => Ok(LightState::Off),
            'a' => Ok(LightState::All),
            other => Err(InvalidStateCharacter(other)),
        }
    }

    /// Canonical character for this state, the inverse of `from_state_char`
    /// up to the `'G'`/`'g'` aliasing.
    pub fn to_state_char(self) -> char {
        match self {
            LightState::Green => 'g',
            LightState::Yellow => 'y',
            LightState::Red => 'r',
            LightState::YellowRed => 'x',
            LightState::Off => 'o',
            LightState::All => 'a',
        }
    }

    /// Parses a case-insensitive state word as used by the explicit
    /// instruction dialect, e.g. `"green"` or `"YELLOWRED"`.
    pub fn from_status_word(word: &str) -> Option<LightState> {
        match word.to_ascii_lowercase().as_str() {
            "red" => Some(LightState::Red),
            "green" => Some(LightState::Green),
            "yellow" => Some(LightState::Yellow),
            "yellowred" => Some(LightState::YellowRed),
            "off" => Some(LightState::Off),
            "all" => Some(LightState::All),
            _ => None,
        }
    }

    /// State-specific suffix used when building display identifiers,
    /// e.g. `_red`.
    pub fn state_suffix(self) -> &'static str {
        match self {
            LightState::Red => "_red",
            LightState::Green => "_green",
            LightState::Yellow => "_yellow",
            LightState::YellowRed => "_yellowred",
            LightState::Off => "_off",
            LightState::All => "_all",
        }
    }
}

impl fmt::Display for LightState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // suffix without the leading underscore
        f.write_str(&self.state_suffix()[1..])
    }
}

/// Orientation of arrow-shaped lamps, if any.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LightDirection {
    Left,
    Right,
    Up,
    None,
}

impl LightDirection {
    /// Maps a direction code from an object identifier. Unknown codes fall
    /// back to `None` rather than failing.
    pub fn from_code(code: &str) -> LightDirection {
        match code {
            "L" => LightDirection::Left,
            "R" => LightDirection::Right,
            "U" => LightDirection::Up,
            _ => LightDirection::None,
        }
    }

    /// Direction-specific suffix for display identifiers; `None` contributes
    /// nothing.
    pub fn direction_suffix(self) -> &'static str {
        match self {
            LightDirection::Left => "_left",
            LightDirection::Right => "_right",
            LightDirection::Up => "_up",
            LightDirection::None => "",
        }
    }
}
