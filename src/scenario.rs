use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Deserialize;

use crate::rules;

/// Gating policy for the positional (SUMO-style) instruction dialect. The
/// explicit dialect is always bound to EXTERNAL mode; the positional one is
/// configurable because co-simulation setups drive lights in every mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PositionalGating {
    /// Apply positional instructions regardless of the current mode.
    Always,
    /// Apply positional instructions only in EXTERNAL mode, like the
    /// explicit dialect.
    #[default]
    ExternalOnly,
}

/// Scenario description loaded at startup: the scene objects the light
/// registry is filtered from, additional scenario-declared lights, and the
/// ingestion settings. The rule file is looked up next to the scenario file
/// as `<scenario-base>-tlr.xml`.
#[derive(Debug, Clone, Deserialize)]
pub struct Scenario {
    #[serde(skip)]
    path: PathBuf,
    /// Object identifiers supplied by the scene graph. Anything that does
    /// not carry the `TrafficLight` prefix is ignored.
    #[serde(default)]
    pub scene_objects: Vec<String>,
    /// Lights declared directly by the scenario, in addition to the scene.
    #[serde(default)]
    pub traffic_lights: Vec<String>,
    /// TCP port the instruction listener binds to; 0 picks an ephemeral
    /// port.
    #[serde(default = "default_listener_port")]
    pub listener_port: u16,
    #[serde(default)]
    pub positional_gating: PositionalGating,
}

fn default_listener_port() -> u16 {
    2001
}

impl Scenario {
    /// An empty scenario rooted at the given path, mostly useful for
    /// embedding and tests.
    pub fn new(path: impl Into<PathBuf>) -> Scenario {
        Scenario {
            path: path.into(),
            scene_objects: Vec::new(),
            traffic_lights: Vec::new(),
            listener_port: default_listener_port(),
            positional_gating: PositionalGating::default(),
        }
    }

    pub fn load(path: &Path) -> anyhow::Result<Scenario> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading scenario file '{}'", path.display()))?;
        let mut scenario: Scenario = serde_json::from_str(&text)
            .with_context(|| format!("parsing scenario file '{}'", path.display()))?;
        scenario.path = path.to_path_buf();
        Ok(scenario)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Path of the rule file belonging to this scenario.
    pub fn rules_path(&self) -> PathBuf {
        rules::rules_path_for(&self.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scenario_parses_with_defaults() {
        let text = r#"{ "scene_objects": ["TrafficLight.08_00", "Terrain.01"] }"#;
        let scenario: Scenario = serde_json::from_str(text).unwrap();
        assert_eq!(scenario.scene_objects.len(), 2);
        assert!(scenario.traffic_lights.is_empty());
        assert_eq!(scenario.listener_port, 2001);
        assert_eq!(scenario.positional_gating, PositionalGating::ExternalOnly);
    }

    #[test]
    fn gating_policy_is_configurable() {
        let text = r#"{ "positional_gating": "always" }"#;
        let scenario: Scenario = serde_json::from_str(text).unwrap();
        assert_eq!(scenario.positional_gating, PositionalGating::Always);
    }

    #[test]
    fn rules_path_sits_next_to_the_scenario() {
        let scenario = Scenario::new("/tasks/city_001.json");
        assert_eq!(
            scenario.rules_path(),
            PathBuf::from("/tasks/city_001-tlr.xml")
        );
    }
}
