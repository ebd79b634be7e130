//! Component System - Versioned Render Templates

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::fs;
use std::path::Path;

use crate::program::RenderProgram;
use crate::schema::DataSchema;

pub type ComponentId = String;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Component {
    pub id: ComponentId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub version: semver::Version,
    #[serde(default = "default_engine_min")]
    pub engine_min_version: String,
    pub category: Category,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    pub data_schema: DataSchema,
    pub render_program: RenderProgram,
    #[serde(default)]
    pub use_cases: Vec<String>,
    #[serde(default)]
    pub best_for: String,
    #[serde(default = "default_true")]
    pub is_public: bool,
    #[serde(default)]
    pub origin: Origin,
    #[serde(default)]
    pub popularity: u64,
    #[serde(default)]
    pub deprecated: bool,
    #[serde(default)]
    pub superseded_by: Option<ComponentId>,
}

fn default_true() -> bool { true }

fn default_engine_min() -> String { crate::MIN_COMPONENT_ENGINE.to_string() }

impl Component {
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }

    /// Key used to identify system components across reseeds.
    pub fn natural_key(&self) -> (String, Category) {
        (self.name.clone(), self.category)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum Category {
    Title,
    Data,
    Process,
    Framework,
    Comparison,
    Narrative,
    Closing,
    Visual,
    Table,
}

impl Category {
    pub const ALL: [Category; 9] = [
        Category::Title,
        Category::Data,
        Category::Process,
        Category::Framework,
        Category::Comparison,
        Category::Narrative,
        Category::Closing,
        Category::Visual,
        Category::Table,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Title => "TITLE",
            Category::Data => "DATA",
            Category::Process => "PROCESS",
            Category::Framework => "FRAMEWORK",
            Category::Comparison => "COMPARISON",
            Category::Narrative => "NARRATIVE",
            Category::Closing => "CLOSING",
            Category::Visual => "VISUAL",
            Category::Table => "TABLE",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|c| c.as_str().eq_ignore_ascii_case(value.trim()))
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a component came from. CORE entries belong to the seed library and
/// are replaced wholesale on reseed; USER entries are never touched by it.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum Origin {
    Core,
    #[default]
    User,
}

/// Load user-authored components from every `*.json` file in `dir`.
///
/// Unreadable or malformed files are skipped, the same way a template
/// directory tolerates stray files. A missing directory yields no components.
pub fn load_from_dir(dir: &Path) -> Result<Vec<Component>, std::io::Error> {
    let mut components = vec![];
    if !dir.exists() {
        return Ok(components);
    }

    let mut paths: Vec<_> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.extension().map_or(false, |e| e == "json"))
        .collect();
    paths.sort();

    for path in paths {
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "skipping unreadable component file");
                continue;
            }
        };
        match serde_json::from_str::<Component>(&content) {
            Ok(mut component) => {
                component.origin = Origin::User;
                components.push(component);
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "skipping malformed component file");
            }
        }
    }

    Ok(components)
}
