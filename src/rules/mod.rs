use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, warn};
use roxmltree::{Document, Node};

use crate::signals::light::PositionData;
use crate::signals::phase::Phase;

/// Immutable rule data for the whole network, loaded once at setup and
/// read-only afterwards. Missing entries are valid: a light without rules
/// has no constraints and an intersection without phases runs no program.
#[derive(Debug, Default)]
pub struct RuleStore {
    /// light name -> names of lights that must be red before green is allowed
    requires_red: HashMap<String, Vec<String>>,
    /// intersection id -> ordered phase cycle
    phases: HashMap<String, Vec<Phase>>,
    /// light name -> placement on the road network
    positions: HashMap<String, PositionData>,
}

impl RuleStore {
    pub fn empty() -> RuleStore {
        RuleStore::default()
    }

    /// Loads the rule file. An absent or malformed file degrades to an
    /// empty store with a warning; the system keeps running without rules.
    pub fn load(path: &Path) -> RuleStore {
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(err) => {
                warn!("rule file '{}' not found: {}", path.display(), err);
                return RuleStore::empty();
            }
        };
        match Self::parse(&text) {
            Ok(store) => store,
            Err(err) => {
                warn!("rule file '{}' is malformed: {}", path.display(), err);
                RuleStore::empty()
            }
        }
    }

    /// Parses the three optional rule sections out of one document.
    pub fn parse(text: &str) -> Result<RuleStore, roxmltree::Error> {
        let doc = Document::parse(text)?;
        let mut store = RuleStore::empty();
        if let Some(section) = find_section(&doc, "TrafficLightRules") {
            store.requires_red = parse_requires_red(section);
        }
        if let Some(section) = find_section(&doc, "TrafficLightPhases") {
            store.phases = parse_phases(section);
        }
        if let Some(section) = find_section(&doc, "TrafficLightPosition") {
            store.positions = parse_positions(section);
        }
        debug!(
            "loaded {} rule entries, {} phase programs, {} positions",
            store.requires_red.len(),
            store.phases.len(),
            store.positions.len()
        );
        Ok(store)
    }

    /// Prerequisite light names for the given light, if any were declared.
    pub fn requires_red(&self, light_name: &str) -> Option<&[String]> {
        self.requires_red.get(light_name).map(Vec::as_slice)
    }

    /// Phase cycle for the given intersection in document order.
    pub fn phases_for(&self, intersection_id: &str) -> Option<&[Phase]> {
        self.phases.get(intersection_id).map(Vec::as_slice)
    }

    pub fn position_for(&self, light_name: &str) -> Option<&PositionData> {
        self.positions.get(light_name)
    }
}

/// The rule file lives next to the scenario file:
/// `citymodel_001.json` -> `citymodel_001-tlr.xml`.
pub fn rules_path_for(scenario_path: &Path) -> PathBuf {
    let stem = scenario_path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();
    scenario_path.with_file_name(format!("{}-tlr.xml", stem))
}

fn find_section<'a>(doc: &'a Document<'a>, tag: &str) -> Option<Node<'a, 'a>> {
    doc.descendants().find(|node| node.has_tag_name(tag))
}

fn intersections<'a>(section: Node<'a, 'a>) -> impl Iterator<Item = (String, Node<'a, 'a>)> {
    section
        .descendants()
        .filter(|node| node.has_tag_name("Intersection"))
        .filter_map(|node| {
            match node.attribute("ID") {
                Some(id) => Some((id.to_string(), node)),
                None => {
                    warn!("intersection element without ID attribute, skipped");
                    None
                }
            }
        })
}

// <Intersection ID="08"><TrafficLight ID="05"><RequiresRed>01</RequiresRed>...
fn parse_requires_red(section: Node<'_, '_>) -> HashMap<String, Vec<String>> {
    let mut rules = HashMap::new();
    for (intersection_id, intersection) in intersections(section) {
        for light in intersection
            .descendants()
            .filter(|node| node.has_tag_name("TrafficLight"))
        {
            let Some(light_id) = light.attribute("ID") else {
                warn!(
                    "traffic light without ID in rules of intersection {}, skipped",
                    intersection_id
                );
                continue;
            };
            let prerequisites: Vec<String> = light
                .descendants()
                .filter(|node| node.has_tag_name("RequiresRed"))
                .filter_map(|node| node.text())
                .map(|required_id| {
                    format!("TrafficLight.{}_{}", intersection_id, required_id.trim())
                })
                .collect();
            rules.insert(
                format!("TrafficLight.{}_{}", intersection_id, light_id),
                prerequisites,
            );
        }
    }
    rules
}

// <Intersection ID="08"><Phase ID="01" duration="31" state="GGggrrrrGGggrrrr"/>...
fn parse_phases(section: Node<'_, '_>) -> HashMap<String, Vec<Phase>> {
    let mut programs = HashMap::new();
    for (intersection_id, intersection) in intersections(section) {
        let mut phases = Vec::new();
        for phase in intersection
            .descendants()
            .filter(|node| node.has_tag_name("Phase"))
        {
            let id = phase.attribute("ID").unwrap_or_default();
            let state = phase.attribute("state").unwrap_or_default();
            let duration = phase
                .attribute("duration")
                .and_then(|value| value.parse::<u64>().ok());
            match duration {
                Some(duration) => phases.push(Phase::new(id, duration, state)),
                None => warn!(
                    "phase '{}' of intersection {} has no usable duration, skipped",
                    id, intersection_id
                ),
            }
        }
        programs.insert(intersection_id, phases);
    }
    programs
}

// <Intersection ID="08"><Road ID="00" type="4" arrow="9"><TrafficLight0 ID="02"/>...
fn parse_positions(section: Node<'_, '_>) -> HashMap<String, PositionData> {
    let mut positions = HashMap::new();
    for (intersection_id, intersection) in intersections(section) {
        for road in intersection
            .descendants()
            .filter(|node| node.has_tag_name("Road"))
        {
            let road_id = road.attribute("ID").unwrap_or_default();
            let crossing_type = road
                .attribute("type")
                .and_then(|value| value.parse().ok())
                .unwrap_or(0);
            let arrow_type = road
                .attribute("arrow")
                .and_then(|value| value.parse().ok())
                .unwrap_or(0);
            for lane in 0..=2u32 {
                let lane_tag = format!("TrafficLight{}", lane);
                for light in road
                    .descendants()
                    .filter(|node| node.has_tag_name(lane_tag.as_str()))
                {
                    let Some(light_id) = light.attribute("ID") else {
                        warn!(
                            "lane {} of road {} names no traffic light ID, skipped",
                            lane, road_id
                        );
                        continue;
                    };
                    positions.insert(
                        format!("TrafficLight.{}_{}", intersection_id, light_id),
                        PositionData {
                            road_id: road_id.to_string(),
                            crossing_type,
                            arrow_type,
                            lane,
                        },
                    );
                }
            }
        }
    }
    positions
}
