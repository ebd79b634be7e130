//! Content Mapping - External Component Selection
//!
//! A mapper proposes `{position, componentId, data}` triples. The proposals
//! are advisory: the assembler re-validates and repairs every one of them.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::components::{Component, ComponentId};
use crate::content::{GenerationParameters, ParsedContent};
use crate::parser::{extract_json_object, CapabilityError};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MappedEntry {
    pub position: usize,
    pub component_id: ComponentId,
    #[serde(default)]
    pub data: Value,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MapperOutput {
    pub entries: Vec<MappedEntry>,
}

impl MapperOutput {
    /// Decode a model reply holding either `{"entries": [...]}` or a bare
    /// array of entries.
    pub fn from_reply(reply: &str) -> Result<Self, CapabilityError> {
        let trimmed = reply.trim();
        if let (Some(start), Some(end)) = (trimmed.find('['), trimmed.rfind(']')) {
            if trimmed.find('{').map_or(true, |brace| start < brace) && end > start {
                let entries: Vec<MappedEntry> = serde_json::from_str(&trimmed[start..=end])
                    .map_err(|e| CapabilityError::Malformed("mapper", e.to_string()))?;
                return Ok(Self { entries });
            }
        }
        let json = extract_json_object(trimmed)
            .ok_or_else(|| CapabilityError::Malformed("mapper", "no JSON in reply".to_string()))?;
        serde_json::from_str(json).map_err(|e| CapabilityError::Malformed("mapper", e.to_string()))
    }
}

#[async_trait]
pub trait ContentMapper: Send + Sync {
    fn name(&self) -> &'static str;

    async fn map(
        &self,
        content: &ParsedContent,
        components: &[Component],
        params: &GenerationParameters,
    ) -> Result<MapperOutput, CapabilityError>;
}

/// Used when no mapping service is configured; assembly goes straight to the
/// rule-based path.
#[derive(Debug, Clone, Default)]
pub struct DisabledMapper;

#[async_trait]
impl ContentMapper for DisabledMapper {
    fn name(&self) -> &'static str {
        "disabled"
    }

    async fn map(
        &self,
        _content: &ParsedContent,
        _components: &[Component],
        _params: &GenerationParameters,
    ) -> Result<MapperOutput, CapabilityError> {
        Err(CapabilityError::Unavailable("mapper"))
    }
}
