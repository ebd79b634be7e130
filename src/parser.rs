//! Content Parsing - Raw Text to Sections
//!
//! The production parser is an external, model-backed capability. The engine
//! only depends on the [`ContentParser`] trait and always has a way out:
//! [`ParsedContent::fallback`] when the parser fails, and
//! [`HeuristicParser`] when no external parser is configured.

use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use thiserror::Error;

use crate::content::{DataPoint, GenerationParameters, ParsedContent, ParsedSection, SectionType};

/// Failure of an external collaborator. Always recoverable.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CapabilityError {
    #[error("{0} is not available")]
    Unavailable(&'static str),

    #[error("{0} returned malformed output: {1}")]
    Malformed(&'static str, String),

    #[error("{0} failed: {1}")]
    Failed(&'static str, String),
}

#[async_trait]
pub trait ContentParser: Send + Sync {
    fn name(&self) -> &'static str;

    async fn parse(
        &self,
        raw: &str,
        params: &GenerationParameters,
    ) -> Result<ParsedContent, CapabilityError>;
}

/// Decode a model reply that should contain a `ParsedContent` JSON object,
/// tolerating prose or code fences around it.
pub fn content_from_reply(reply: &str) -> Result<ParsedContent, CapabilityError> {
    let json = extract_json_object(reply)
        .ok_or_else(|| CapabilityError::Malformed("parser", "no JSON object in reply".to_string()))?;
    let content: ParsedContent = serde_json::from_str(json)
        .map_err(|e| CapabilityError::Malformed("parser", e.to_string()))?;
    if content.sections.is_empty() {
        return Err(CapabilityError::Malformed("parser", "no sections".to_string()));
    }
    Ok(content)
}

pub(crate) fn extract_json_object(reply: &str) -> Option<&str> {
    let start = reply.find('{')?;
    let end = reply.rfind('}')?;
    (end > start).then(|| &reply[start..=end])
}

lazy_static! {
    static ref BULLET: Regex = Regex::new(r"^(?:[-*•]|\d+[.)])\s+(.+)$").unwrap();

    static ref HEADING: Regex = Regex::new(r"^#{1,6}\s+(.+)$").unwrap();

    /// `Revenue $2.5M (+23%)`, `Margin: 18%`, `Churn 3.1% (-0.4%)`
    static ref METRIC: Regex = Regex::new(
        r"^(?P<label>[^$€£\d(]+?)\s*[:=\-–]?\s*(?P<value>[$€£]\d[\d,.]*\s?(?:[KMBkmb]n?|bn)?|\d[\d,.]*(?:%|[KMB]\b|\s?(?:bn|mm)\b))(?:\s*\((?P<change>[+\-−]?\d[\d,.]*\s?%?)[^)]*\))?"
    )
    .unwrap();

    static ref TIMELINE_WORDS: Regex =
        Regex::new(r"(?i)\b(timeline|roadmap|milestones?|schedule|phases?)\b").unwrap();

    static ref PROCESS_WORDS: Regex =
        Regex::new(r"(?i)\b(process|steps|workflow|procedure|how to|approach)\b").unwrap();

    static ref COMPARISON_WORDS: Regex =
        Regex::new(r"(?i)\b(vs\.?|versus|compared?|comparison|before and after|pros and cons|trade-?offs?)\b").unwrap();

    static ref FRAMEWORK_WORDS: Regex =
        Regex::new(r"(?i)\b(swot|framework|pillars?|matrix|model|strategy)\b").unwrap();
}

/// Deterministic, local parser for plain text and light markdown.
///
/// - the first non-empty line is the title
/// - `#` headings and lines ending in `:` open a section
/// - `-`, `*`, `•` and `1.` lines are bullet items
/// - figures such as `Revenue $2.5M (+23%)` become data points
#[derive(Debug, Clone, Default)]
pub struct HeuristicParser;

impl HeuristicParser {
    pub fn new() -> Self {
        Self
    }

    pub fn parse_text(&self, raw: &str) -> Result<ParsedContent, CapabilityError> {
        let mut lines = raw.lines().map(str::trim).filter(|l| !l.is_empty());
        let title = lines
            .next()
            .map(|l| strip_heading(l).to_string())
            .ok_or_else(|| CapabilityError::Failed("heuristic parser", "input is empty".to_string()))?;

        let mut sections: Vec<SectionDraft> = vec![];
        for line in lines {
            if let Some(heading) = section_heading(line) {
                sections.push(SectionDraft::new(heading));
                continue;
            }
            if sections.is_empty() {
                sections.push(SectionDraft::new("Overview"));
            }
            let Some(current) = sections.last_mut() else { continue };
            match BULLET.captures(line) {
                Some(caps) => current.push_item(caps[1].trim()),
                None => current.push_text(line),
            }
        }

        if sections.is_empty() {
            let mut only = SectionDraft::new("Overview");
            only.push_text(&title);
            sections.push(only);
        }

        Ok(ParsedContent {
            title,
            sections: sections.into_iter().map(SectionDraft::finish).collect(),
        })
    }
}

#[async_trait]
impl ContentParser for HeuristicParser {
    fn name(&self) -> &'static str {
        "heuristic"
    }

    async fn parse(
        &self,
        raw: &str,
        _params: &GenerationParameters,
    ) -> Result<ParsedContent, CapabilityError> {
        self.parse_text(raw)
    }
}

fn strip_heading(line: &str) -> &str {
    HEADING
        .captures(line)
        .and_then(|c| c.get(1))
        .map_or(line, |m| m.as_str())
        .trim()
}

fn section_heading(line: &str) -> Option<&str> {
    if let Some(m) = HEADING.captures(line).and_then(|c| c.get(1)) {
        return Some(m.as_str().trim());
    }
    let heading = line.strip_suffix(':')?.trim();
    (!heading.is_empty() && !BULLET.is_match(line)).then_some(heading)
}

pub(crate) fn extract_metric(text: &str) -> Option<DataPoint> {
    let caps = METRIC.captures(text)?;
    let label = caps.name("label")?.as_str().trim().trim_end_matches([':', '-', '=']).trim();
    if label.is_empty() {
        return None;
    }
    let mut point = DataPoint::new(label, caps.name("value")?.as_str().trim());
    point.change = caps.name("change").map(|m| m.as_str().replace('−', "-").trim().to_string());
    Some(point)
}

struct SectionDraft {
    title: String,
    lines: Vec<String>,
    items: Vec<String>,
    data_points: Vec<DataPoint>,
}

impl SectionDraft {
    fn new(title: &str) -> Self {
        Self { title: title.to_string(), lines: vec![], items: vec![], data_points: vec![] }
    }

    fn push_item(&mut self, item: &str) {
        self.note_metric(item);
        self.lines.push(item.to_string());
        self.items.push(item.to_string());
    }

    fn push_text(&mut self, text: &str) {
        self.note_metric(text);
        self.lines.push(text.to_string());
    }

    fn note_metric(&mut self, text: &str) {
        if let Some(point) = extract_metric(text) {
            self.data_points.push(point);
        }
    }

    fn finish(self) -> ParsedSection {
        let section_type = infer_type(&self.title, self.data_points.len());
        let priority = if section_type == SectionType::Data { 4 } else { 3 };
        let mut section = ParsedSection::new(self.title, section_type).with_priority(priority);
        section.content = self.lines.join("\n");
        section.items = self.items;
        section.data_points = self.data_points;
        section
    }
}

fn infer_type(title: &str, data_points: usize) -> SectionType {
    if data_points >= 2 {
        SectionType::Data
    } else if TIMELINE_WORDS.is_match(title) {
        SectionType::Timeline
    } else if COMPARISON_WORDS.is_match(title) {
        SectionType::Comparison
    } else if PROCESS_WORDS.is_match(title) {
        SectionType::Process
    } else if FRAMEWORK_WORDS.is_match(title) {
        SectionType::Framework
    } else {
        SectionType::Narrative
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bullets_before_any_heading_land_in_overview() {
        let content = HeuristicParser::new()
            .parse_text("Q4 Results\n- Revenue $2.5M (+23%)\n- APAC expansion planned")
            .unwrap();
        assert_eq!(content.title, "Q4 Results");
        assert_eq!(content.sections.len(), 1);

        let overview = &content.sections[0];
        assert_eq!(overview.title, "Overview");
        assert_eq!(overview.section_type, SectionType::Narrative);
        assert_eq!(overview.items, vec!["Revenue $2.5M (+23%)", "APAC expansion planned"]);
        assert!(overview.content.contains("Revenue $2.5M (+23%)"));
        assert_eq!(overview.data_points.len(), 1);
    }

    #[test]
    fn extracts_label_value_and_change() {
        let point = extract_metric("Revenue $2.5M (+23%)").unwrap();
        assert_eq!(point.label, "Revenue");
        assert_eq!(point.value, "$2.5M");
        assert_eq!(point.change.as_deref(), Some("+23%"));

        let point = extract_metric("Gross margin: 41%").unwrap();
        assert_eq!(point.label, "Gross margin");
        assert_eq!(point.value, "41%");
        assert_eq!(point.change, None);

        assert!(extract_metric("APAC expansion planned").is_none());
        assert!(extract_metric("Q4 Results").is_none());
    }

    #[test]
    fn headings_open_typed_sections() {
        let raw = "# Annual Review\n\
                   ## Key Metrics\n- Revenue $10M (+12%)\n- Margin 18%\n\
                   Product Roadmap:\n- Q1 beta\n- Q3 launch\n\
                   ## Why it matters\nCustomers asked for it.";
        let content = HeuristicParser::new().parse_text(raw).unwrap();
        assert_eq!(content.title, "Annual Review");
        let types: Vec<_> = content.sections.iter().map(|s| (s.title.as_str(), s.section_type)).collect();
        assert_eq!(
            types,
            vec![
                ("Key Metrics", SectionType::Data),
                ("Product Roadmap", SectionType::Timeline),
                ("Why it matters", SectionType::Narrative),
            ]
        );
        assert_eq!(content.sections[0].priority, 4);
        assert_eq!(content.sections[2].content, "Customers asked for it.");
    }

    #[test]
    fn empty_input_is_a_capability_failure() {
        assert!(matches!(
            HeuristicParser::new().parse_text("  \n\n "),
            Err(CapabilityError::Failed(..))
        ));
    }

    #[test]
    fn reply_decoding_tolerates_fences() {
        let reply = "Here you go:\n```json\n{\"title\":\"Plan\",\"sections\":[{\"title\":\"Why\",\"type\":\"narrative\",\"content\":\"x\",\"priority\":3}]}\n```";
        let content = content_from_reply(reply).unwrap();
        assert_eq!(content.title, "Plan");
        assert!(content_from_reply("no json here").is_err());
        assert!(content_from_reply("{\"title\":\"Empty\",\"sections\":[]}").is_err());
    }
}
