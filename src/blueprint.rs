//! Blueprints - Ordered Component Bindings

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;
use thiserror::Error;

use crate::components::{Component, ComponentId};
use crate::program::RenderProgram;
use crate::schema::DataSchema;

#[derive(Debug, Error, PartialEq)]
pub enum BlueprintError {
    #[error("Blueprint has no entries")]
    Empty,

    #[error("Duplicate position {0}")]
    DuplicatePosition(usize),

    #[error("Position {0} is out of range")]
    OutOfRange(usize),
}

/// Component definition captured at assembly time, so a stored blueprint
/// renders the same way after the registry moves on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentSnapshot {
    pub version: semver::Version,
    pub engine_min_version: String,
    pub data_schema: DataSchema,
    pub render_program: RenderProgram,
}

impl From<&Component> for ComponentSnapshot {
    fn from(component: &Component) -> Self {
        Self {
            version: component.version.clone(),
            engine_min_version: component.engine_min_version.clone(),
            data_schema: component.data_schema.clone(),
            render_program: component.render_program.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlideBlueprintEntry {
    pub position: usize,
    pub component_id: ComponentId,
    pub data: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<ComponentSnapshot>,
}

impl SlideBlueprintEntry {
    pub fn new(position: usize, component: &Component, data: Value) -> Self {
        Self {
            position,
            component_id: component.id.clone(),
            data,
            snapshot: Some(ComponentSnapshot::from(component)),
        }
    }
}

/// Ordered slide bindings. Entries are only ever appended or repositioned.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Blueprint {
    entries: Vec<SlideBlueprintEntry>,
}

impl Blueprint {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap entries produced elsewhere (a stored blueprint, a mapper).
    /// Positions are taken as given; see [`Blueprint::check`].
    pub fn from_entries(entries: Vec<SlideBlueprintEntry>) -> Self {
        Self { entries }
    }

    /// Append at the next dense position and return it.
    pub fn push(&mut self, component: &Component, data: Value) -> usize {
        let position = self.entries.len();
        self.entries.push(SlideBlueprintEntry::new(position, component, data));
        position
    }

    /// Move the entry at `from` to `to`, shifting the ones in between, and
    /// renumber positions densely.
    pub fn reposition(&mut self, from: usize, to: usize) -> Result<(), BlueprintError> {
        if from >= self.entries.len() {
            return Err(BlueprintError::OutOfRange(from));
        }
        if to >= self.entries.len() {
            return Err(BlueprintError::OutOfRange(to));
        }
        self.sort();
        let entry = self.entries.remove(from);
        self.entries.insert(to, entry);
        self.densify();
        Ok(())
    }

    pub fn entries(&self) -> &[SlideBlueprintEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn into_entries(self) -> Vec<SlideBlueprintEntry> {
        self.entries
    }

    /// Structural check: non-empty with unique positions.
    pub fn check(&self) -> Result<(), BlueprintError> {
        if self.entries.is_empty() {
            return Err(BlueprintError::Empty);
        }
        let mut seen = BTreeSet::new();
        for entry in &self.entries {
            if !seen.insert(entry.position) {
                return Err(BlueprintError::DuplicatePosition(entry.position));
            }
        }
        Ok(())
    }

    /// Whether positions are exactly `0..len` in order.
    pub fn is_dense(&self) -> bool {
        self.entries.iter().enumerate().all(|(i, e)| e.position == i)
    }

    pub(crate) fn sort(&mut self) {
        self.entries.sort_by_key(|e| e.position);
    }

    pub(crate) fn densify(&mut self) {
        for (i, entry) in self.entries.iter_mut().enumerate() {
            entry.position = i;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::{Category, Origin};
    use serde_json::json;

    fn component(id: &str) -> Component {
        Component {
            id: id.to_string(),
            name: id.to_string(),
            description: String::new(),
            version: semver::Version::new(1, 0, 0),
            engine_min_version: "1.0.0".to_string(),
            category: Category::Narrative,
            tags: Default::default(),
            data_schema: DataSchema::default(),
            render_program: RenderProgram::default(),
            use_cases: vec![],
            best_for: String::new(),
            is_public: true,
            origin: Origin::Core,
            popularity: 0,
            deprecated: false,
            superseded_by: None,
        }
    }

    #[test]
    fn push_assigns_dense_positions_and_snapshots() {
        let mut blueprint = Blueprint::new();
        assert_eq!(blueprint.push(&component("a"), json!({})), 0);
        assert_eq!(blueprint.push(&component("b"), json!({})), 1);
        assert!(blueprint.is_dense());
        assert!(blueprint.entries()[1].snapshot.is_some());
        assert_eq!(blueprint.check(), Ok(()));
    }

    #[test]
    fn reposition_shifts_and_renumbers() {
        let mut blueprint = Blueprint::new();
        for id in ["a", "b", "c"] {
            blueprint.push(&component(id), json!({}));
        }
        blueprint.reposition(2, 0).unwrap();
        let ids: Vec<_> = blueprint.entries().iter().map(|e| e.component_id.as_str()).collect();
        assert_eq!(ids, vec!["c", "a", "b"]);
        assert!(blueprint.is_dense());
        assert_eq!(blueprint.reposition(5, 0), Err(BlueprintError::OutOfRange(5)));
    }

    #[test]
    fn check_rejects_empty_and_duplicates() {
        assert_eq!(Blueprint::new().check(), Err(BlueprintError::Empty));
        let entry = SlideBlueprintEntry::new(3, &component("a"), json!({}));
        let blueprint = Blueprint::from_entries(vec![entry.clone(), entry]);
        assert_eq!(blueprint.check(), Err(BlueprintError::DuplicatePosition(3)));
    }
}
