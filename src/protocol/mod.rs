pub mod listener;

use roxmltree::Document;
use thiserror::Error;

use crate::signals::state::{InvalidStateCharacter, LightState};

/// One decoded traffic light instruction. A document may carry several;
/// decoding is all-or-nothing so a malformed document never applies
/// partially.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Instruction {
    /// Positional dialect: the i-th state belongs to fixture i of the
    /// intersection.
    Positional {
        intersection_id: String,
        states: Vec<LightState>,
    },
    /// Explicit dialect: one named fixture and its target state.
    Explicit { name: String, state: LightState },
}

#[derive(Debug, Error)]
pub enum InstructionError {
    #[error("malformed instruction document: {0}")]
    Malformed(#[from] roxmltree::Error),
    #[error("no TrafficLightControl element found")]
    MissingRoot,
    #[error("tlsstate element lacks the '{0}' attribute")]
    MissingAttribute(&'static str),
    #[error("no status given for '{0}'")]
    MissingStatus(String),
    #[error(transparent)]
    InvalidState(#[from] InvalidStateCharacter),
    #[error("invalid status word '{0}'")]
    InvalidStatusWord(String),
}

/// Parses an instruction document. The two dialects are distinguished per
/// child element of `TrafficLightControl`: a `tlsstate` element is
/// positional, anything else is read as a fixture name with a `status`
/// child.
pub fn parse_instructions(xml: &str) -> Result<Vec<Instruction>, InstructionError> {
    let doc = Document::parse(xml)?;
    let root = doc
        .descendants()
        .find(|node| node.has_tag_name("TrafficLightControl"))
        .ok_or(InstructionError::MissingRoot)?;

    let mut instructions = Vec::new();
    for element in root.children().filter(|node| node.is_element()) {
        if element.has_tag_name("tlsstate") {
            let id = element
                .attribute("id")
                .ok_or(InstructionError::MissingAttribute("id"))?;
            let state_string = element
                .attribute("state")
                .ok_or(InstructionError::MissingAttribute("state"))?;
            let states = state_string
                .chars()
                .map(LightState::from_state_char)
                .collect::<Result<Vec<_>, _>>()?;
            instructions.push(Instruction::Positional {
                intersection_id: pad2(id),
                states,
            });
        } else {
            let name = element.tag_name().name().to_string();
            let status = element
                .children()
                .find(|node| node.has_tag_name("status"))
                .and_then(|node| node.text())
                .map(str::trim)
                .ok_or_else(|| InstructionError::MissingStatus(name.clone()))?;
            let state = LightState::from_status_word(status)
                .ok_or_else(|| InstructionError::InvalidStatusWord(status.to_string()))?;
            instructions.push(Instruction::Explicit { name, state });
        }
    }
    Ok(instructions)
}

/// Ids on the wire may be unpadded (`"8"`); the naming grammar uses a fixed
/// width of two (`"08"`).
pub fn pad2(id: &str) -> String {
    format!("{:0>2}", id)
}
