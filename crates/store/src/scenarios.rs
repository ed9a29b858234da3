//! Read-only scenario registry.
//!
//! Scenarios are authored externally and dropped as JSON files into
//! `<state>/scenarios/`. Loaded once at startup; lookups are by id with
//! an optional version pin (unversioned lookups take the newest version).

use std::collections::HashMap;
use std::path::Path;

use cq_domain::scenario::Scenario;
use cq_domain::error::Result;

pub struct ScenarioStore {
    /// (id, version) → scenario.
    scenarios: HashMap<(String, String), Scenario>,
}

impl ScenarioStore {
    /// Load every `*.json` scenario file under `dir`. A missing directory
    /// yields an empty registry; malformed files are skipped with a warning.
    pub fn load(dir: &Path) -> Result<Self> {
        let mut scenarios = HashMap::new();
        if dir.is_dir() {
            for entry in std::fs::read_dir(dir)? {
                let path = entry?.path();
                if path.extension().and_then(|e| e.to_str()) != Some("json") {
                    continue;
                }
                let raw = std::fs::read_to_string(&path)?;
                match serde_json::from_str::<Scenario>(&raw) {
                    Ok(scenario) => {
                        scenarios.insert(
                            (scenario.id.clone(), scenario.version.clone()),
                            scenario,
                        );
                    }
                    Err(e) => {
                        tracing::warn!(
                            path = %path.display(),
                            error = %e,
                            "skipping malformed scenario file"
                        );
                    }
                }
            }
        }
        tracing::info!(scenarios = scenarios.len(), path = %dir.display(), "scenario registry loaded");
        Ok(Self { scenarios })
    }

    pub fn empty() -> Self {
        Self {
            scenarios: HashMap::new(),
        }
    }

    /// Register a scenario in memory (tests, demos).
    pub fn insert(&mut self, scenario: Scenario) {
        self.scenarios
            .insert((scenario.id.clone(), scenario.version.clone()), scenario);
    }

    /// Look up by id. With `version = None` the newest version wins
    /// (lexicographic on the version string).
    pub fn get(&self, id: &str, version: Option<&str>) -> Option<&Scenario> {
        match version {
            Some(v) => self.scenarios.get(&(id.to_owned(), v.to_owned())),
            None => self
                .scenarios
                .iter()
                .filter(|((sid, _), _)| sid == id)
                .max_by(|((_, a), _), ((_, b), _)| a.cmp(b))
                .map(|(_, scenario)| scenario),
        }
    }

    pub fn len(&self) -> usize {
        self.scenarios.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scenarios.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cq_domain::scenario::{Principal, ScenarioAgent};

    fn scenario(id: &str, version: &str) -> Scenario {
        Scenario {
            id: id.into(),
            version: version.into(),
            metadata: serde_json::Value::Null,
            agents: vec![ScenarioAgent {
                agent_id: "patient".into(),
                principal: Principal {
                    name: "Pat".into(),
                    description: String::new(),
                },
                system_prompt: "You are Pat.".into(),
                situation: None,
                goals: vec![],
                tools: vec![],
                documents: vec![],
            }],
        }
    }

    #[test]
    fn load_from_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mri.json");
        std::fs::write(&path, serde_json::to_string(&scenario("mri", "1")).unwrap()).unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let store = ScenarioStore::load(dir.path()).unwrap();
        assert_eq!(store.len(), 1);
        assert!(store.get("mri", Some("1")).is_some());
        assert!(store.get("mri", Some("2")).is_none());
    }

    #[test]
    fn missing_directory_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = ScenarioStore::load(&dir.path().join("nope")).unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn unversioned_lookup_takes_newest() {
        let mut store = ScenarioStore::empty();
        store.insert(scenario("mri", "1"));
        store.insert(scenario("mri", "3"));
        store.insert(scenario("mri", "2"));
        assert_eq!(store.get("mri", None).unwrap().version, "3");
    }
}
