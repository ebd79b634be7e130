//! Parsed Content - Structured Input to Assembly

use serde::{Deserialize, Serialize};

use crate::components::Category;

/// Characters of raw input kept by the degraded parse.
pub const FALLBACK_EXCERPT_CHARS: usize = 500;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SectionType {
    Data,
    #[default]
    Narrative,
    Framework,
    Timeline,
    Comparison,
    Process,
}

impl SectionType {
    /// The component category a section of this type is matched against.
    pub fn category(&self) -> Category {
        match self {
            SectionType::Data => Category::Data,
            SectionType::Narrative => Category::Narrative,
            SectionType::Framework => Category::Framework,
            SectionType::Timeline => Category::Process,
            SectionType::Comparison => Category::Comparison,
            SectionType::Process => Category::Process,
        }
    }

    /// Tag a component should carry to be preferred for this section type.
    pub fn affinity_tag(&self) -> &'static str {
        match self {
            SectionType::Data => "metrics",
            SectionType::Narrative => "text",
            SectionType::Framework => "framework",
            SectionType::Timeline => "timeline",
            SectionType::Comparison => "comparison",
            SectionType::Process => "steps",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataPoint {
    pub label: String,
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub change: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
}

impl DataPoint {
    pub fn new(label: impl Into<String>, value: impl Into<String>) -> Self {
        Self { label: label.into(), value: value.into(), change: None, target: None }
    }

    /// Leading numeric magnitude of the value: `"$2.5M"` is `2.5`,
    /// `"-12%"` is `-12`.
    pub fn numeric_value(&self) -> Option<f64> {
        leading_number(&self.value)
    }

    /// Numeric part of `change`: `"+23%"` is `23`.
    pub fn change_value(&self) -> Option<f64> {
        self.change.as_deref().and_then(leading_number)
    }

    /// Sign of `change` as -1, 0 or 1.
    pub fn trend(&self) -> f64 {
        match self.change.as_deref().map(str::trim) {
            Some(c) if c.starts_with('-') => -1.0,
            Some(c) if !c.is_empty() => 1.0,
            _ => 0.0,
        }
    }
}

/// First number in `text`, ignoring currency signs and thousands separators.
pub fn leading_number(text: &str) -> Option<f64> {
    let cleaned: String = text
        .replace('−', "-")
        .chars()
        .skip_while(|c| !(c.is_ascii_digit() || *c == '-' || *c == '.'))
        .take_while(|c| c.is_ascii_digit() || *c == '-' || *c == '.' || *c == ',')
        .filter(|c| *c != ',')
        .collect();
    cleaned.parse().ok()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedSection {
    pub title: String,
    #[serde(rename = "type", default)]
    pub section_type: SectionType,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub data_points: Vec<DataPoint>,
    #[serde(default)]
    pub items: Vec<String>,
    #[serde(default = "default_priority", deserialize_with = "clamped_priority")]
    pub priority: u8,
}

fn default_priority() -> u8 { 3 }

fn clamped_priority<'de, D: serde::Deserializer<'de>>(d: D) -> Result<u8, D::Error> {
    let raw = f64::deserialize(d)?;
    Ok(if raw.is_finite() { raw.round().clamp(1.0, 5.0) as u8 } else { default_priority() })
}

impl ParsedSection {
    pub fn new(title: impl Into<String>, section_type: SectionType) -> Self {
        Self {
            title: title.into(),
            section_type,
            content: String::new(),
            data_points: vec![],
            items: vec![],
            priority: default_priority(),
        }
    }

    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority.clamp(1, 5);
        self
    }

    /// Sections at priority 4 and above survive slide-count trimming.
    pub fn is_protected(&self) -> bool {
        self.priority >= 4
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedContent {
    pub title: String,
    #[serde(default)]
    pub sections: Vec<ParsedSection>,
}

impl ParsedContent {
    /// Degraded parse used when the parser is unavailable.
    pub fn fallback(raw: &str) -> Self {
        let excerpt: String = raw.chars().take(FALLBACK_EXCERPT_CHARS).collect();
        let mut section = ParsedSection::new("Overview", SectionType::Narrative);
        section.content = excerpt;
        Self {
            title: "Presentation".to_string(),
            sections: vec![section],
        }
    }

    pub fn data_points(&self) -> impl Iterator<Item = &DataPoint> {
        self.sections.iter().flat_map(|s| s.data_points.iter())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Tone {
    #[default]
    Formal,
    Conversational,
    Technical,
    Executive,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Audience {
    CSuite,
    Team,
    Investors,
    Clients,
    #[default]
    General,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Style {
    #[default]
    DataDriven,
    Narrative,
    VisualHeavy,
    Minimal,
}

/// Caller preferences for a generation run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationParameters {
    #[serde(default)]
    pub tone: Tone,
    #[serde(default)]
    pub audience: Audience,
    #[serde(default)]
    pub style: Style,
    /// Target slide count. Absent means "as many as the content needs".
    #[serde(default)]
    pub slide_count: Option<usize>,
    #[serde(default)]
    pub focus: Vec<String>,
}
