//! Scenario catalog: ordered groups of scenarios
//!
//! Order in the catalog is the order results are reported in. It carries no
//! meaning for execution; every scenario is independent.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use tracing::debug;

use crate::error::{E2eError, E2eResult};
use crate::probe::{Capability, GateVerdict};
use crate::scenario::Scenario;

/// Scenarios sharing a capability gate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScenarioGroup {
    pub name: String,
    #[serde(default)]
    pub requires: Vec<Capability>,
    /// Reported for every scenario of the group when the gate is closed.
    /// `{missing}` is replaced with the list of missing capabilities.
    #[serde(default)]
    pub gate_diagnostic: Option<String>,
    pub scenarios: Vec<Scenario>,
}

impl ScenarioGroup {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            requires: Vec::new(),
            gate_diagnostic: None,
            scenarios: Vec::new(),
        }
    }

    pub fn requires(mut self, capability: Capability) -> Self {
        self.requires.push(capability);
        self
    }

    pub fn gate_diagnostic(mut self, message: impl Into<String>) -> Self {
        self.gate_diagnostic = Some(message.into());
        self
    }

    pub fn scenario(mut self, scenario: Scenario) -> Self {
        self.scenarios.push(scenario);
        self
    }

    /// The shared diagnostic for a closed gate.
    pub fn closed_gate_diagnostic(&self, verdict: &GateVerdict) -> String {
        let missing = verdict.describe_missing();
        match &self.gate_diagnostic {
            Some(template) => template.replace("{missing}", &missing),
            None => format!(
                "Could not check \"{}\": the database is missing {}.",
                self.name, missing
            ),
        }
    }

    pub fn total_points(&self) -> u64 {
        self.scenarios.iter().map(|s| u64::from(s.points)).sum()
    }
}

/// Selects part of a catalog. Empty lists select everything.
#[derive(Debug, Clone, Default)]
pub struct CatalogFilter {
    pub groups: Vec<String>,
    pub names: Vec<String>,
    pub tags: Vec<String>,
}

impl CatalogFilter {
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty() && self.names.is_empty() && self.tags.is_empty()
    }

    fn admits(&self, group: &ScenarioGroup, scenario: &Scenario) -> bool {
        (self.groups.is_empty() || self.groups.iter().any(|g| *g == group.name))
            && (self.names.is_empty() || self.names.iter().any(|n| *n == scenario.name))
            && (self.tags.is_empty() || scenario.tags.iter().any(|t| self.tags.contains(t)))
    }
}

#[derive(Debug, Deserialize)]
struct CatalogDocument {
    groups: Vec<ScenarioGroup>,
}

/// An ordered, validated collection of scenario groups
#[derive(Debug, Clone, Default, Serialize)]
pub struct Catalog {
    groups: Vec<ScenarioGroup>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a group. Scenario weights must be positive and scenario names
    /// unique across the whole catalog.
    pub fn register(&mut self, group: ScenarioGroup) -> E2eResult<()> {
        if group.name.trim().is_empty() {
            return Err(E2eError::CatalogInvalid("group with an empty name".to_string()));
        }
        if self.groups.iter().any(|g| g.name == group.name) {
            return Err(E2eError::CatalogInvalid(format!(
                "group {:?} registered twice",
                group.name
            )));
        }

        let mut seen: HashSet<&str> = self
            .scenarios()
            .map(|(_, scenario)| scenario.name.as_str())
            .collect();
        for scenario in &group.scenarios {
            if scenario.points == 0 {
                return Err(E2eError::CatalogInvalid(format!(
                    "scenario {:?} in group {:?} has no points",
                    scenario.name, group.name
                )));
            }
            if !seen.insert(scenario.name.as_str()) {
                return Err(E2eError::CatalogInvalid(format!(
                    "scenario {:?} is defined more than once",
                    scenario.name
                )));
            }
        }

        debug!(
            "Registered group {} ({} scenarios, {} points)",
            group.name,
            group.scenarios.len(),
            group.total_points()
        );
        self.groups.push(group);
        Ok(())
    }

    /// Append every group of `other`, with the same validation.
    pub fn extend(&mut self, other: Catalog) -> E2eResult<()> {
        for group in other.groups {
            self.register(group)?;
        }
        Ok(())
    }

    /// Parse a catalog document: `groups: [...]`
    pub fn from_yaml(yaml: &str) -> E2eResult<Self> {
        let document: CatalogDocument = serde_yaml::from_str(yaml)?;
        let mut catalog = Self::new();
        for group in document.groups {
            catalog.register(group)?;
        }
        Ok(catalog)
    }

    pub fn from_file(path: &Path) -> E2eResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content).map_err(|e| match e {
            E2eError::CatalogInvalid(reason) => {
                E2eError::CatalogInvalid(format!("{}: {}", path.display(), reason))
            }
            other => other,
        })
    }

    /// Load every YAML file under `dir`, in file name order.
    pub fn load_dir(dir: &Path) -> E2eResult<Self> {
        let mut catalog = Self::new();

        for entry in walkdir::WalkDir::new(dir)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| {
                e.path()
                    .extension()
                    .map(|ext| ext == "yaml" || ext == "yml")
                    .unwrap_or(false)
            })
        {
            catalog.extend(Self::from_file(entry.path())?)?;
        }

        Ok(catalog)
    }

    /// A file or a directory of files
    pub fn load(path: &Path) -> E2eResult<Self> {
        if path.is_dir() {
            Self::load_dir(path)
        } else {
            Self::from_file(path)
        }
    }

    pub fn groups(&self) -> &[ScenarioGroup] {
        &self.groups
    }

    /// Every scenario with its group, in catalog order
    pub fn scenarios(&self) -> impl Iterator<Item = (&ScenarioGroup, &Scenario)> {
        self.groups
            .iter()
            .flat_map(|g| g.scenarios.iter().map(move |s| (g, s)))
    }

    pub fn scenario_count(&self) -> usize {
        self.groups.iter().map(|g| g.scenarios.len()).sum()
    }

    pub fn total_points(&self) -> u64 {
        self.groups.iter().map(ScenarioGroup::total_points).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.scenario_count() == 0
    }

    /// A sub-catalog with the admitted scenarios. Groups left empty are
    /// dropped; order is preserved.
    pub fn filter(&self, filter: &CatalogFilter) -> Self {
        if filter.is_empty() {
            return self.clone();
        }
        let groups = self
            .groups
            .iter()
            .filter_map(|group| {
                let scenarios: Vec<Scenario> = group
                    .scenarios
                    .iter()
                    .filter(|s| filter.admits(group, s))
                    .cloned()
                    .collect();
                if scenarios.is_empty() {
                    None
                } else {
                    Some(ScenarioGroup {
                        scenarios,
                        ..group.clone()
                    })
                }
            })
            .collect();
        Self { groups }
    }
}
