//! Blueprint Assembly - Sections to Ordered Slides
//!
//! Two paths produce a blueprint:
//! - mapped: an external mapper proposed entries; they are re-validated,
//!   repaired, or replaced, never trusted
//! - rule-based: deterministic selection through a category table
//!
//! Every entry that leaves the assembler has passed strict validation
//! against the component it names, and carries a snapshot of it.

use serde::Serialize;
use serde_json::Value;
use std::cmp::Reverse;
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

use crate::binder::{bind, narrative_payload, BindSource};
use crate::blueprint::{Blueprint, SlideBlueprintEntry};
use crate::components::{Category, Component};
use crate::content::{GenerationParameters, ParsedContent, ParsedSection, SectionType, Style};
use crate::mapper::MapperOutput;
use crate::schema::SchemaValidator;

/// Slide-count tolerance around the caller's target, in percent.
pub const SLIDE_COUNT_TOLERANCE_PCT: usize = 20;

/// Longest run of one component before an alternative is preferred.
pub const MAX_CONSECUTIVE_REPEATS: usize = 2;

#[derive(Debug, Error, PartialEq)]
pub enum AssemblyError {
    #[error("No components available")]
    NoComponents,

    #[error("Content has no sections")]
    NoContent,

    #[error("No TITLE component tagged `cover` is available")]
    NoCover,

    #[error("No NARRATIVE component accepts a title and content payload")]
    NoNarrative,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AssemblyStrategy {
    Mapped,
    RuleBased,
}

impl fmt::Display for AssemblyStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AssemblyStrategy::Mapped => "mapped",
            AssemblyStrategy::RuleBased => "rule_based",
        })
    }
}

/// Soft-constraint breaches and degraded decisions. None of these stop a
/// build.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AssemblyWarning {
    ParserFallback { reason: String },
    MapperFallback { reason: String },
    SlideCountOutOfBand { target: usize, actual: usize },
    UnknownComponent { position: usize, component_id: String },
    RepairedEntry { position: usize, component_id: String, dropped: Vec<String> },
    ReplacedEntry { position: usize, component_id: String, reason: String },
    SectionFallback { section: String },
    CoverFallback,
    Repetition { component_id: String },
    NoClosing,
    RestoredSection { section: String },
}

impl fmt::Display for AssemblyWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssemblyWarning::ParserFallback { reason } => write!(f, "parser unavailable, used degraded parse: {}", reason),
            AssemblyWarning::MapperFallback { reason } => write!(f, "mapper output not used: {}", reason),
            AssemblyWarning::SlideCountOutOfBand { target, actual } => {
                write!(f, "{} slides is outside the tolerance of the target {}", actual, target)
            }
            AssemblyWarning::UnknownComponent { position, component_id } => {
                write!(f, "position {}: unknown or private component {}", position, component_id)
            }
            AssemblyWarning::RepairedEntry { position, component_id, dropped } => {
                write!(f, "position {}: dropped {} from {}", position, dropped.join(", "), component_id)
            }
            AssemblyWarning::ReplacedEntry { position, component_id, reason } => {
                write!(f, "position {}: replaced {} with narrative fallback ({})", position, component_id, reason)
            }
            AssemblyWarning::SectionFallback { section } => {
                write!(f, "section '{}' matched no component, used narrative fallback", section)
            }
            AssemblyWarning::CoverFallback => f.write_str("no cover component accepted the deck title"),
            AssemblyWarning::Repetition { component_id } => {
                write!(f, "{} used more than {} times in a row", component_id, MAX_CONSECUTIVE_REPEATS)
            }
            AssemblyWarning::NoClosing => f.write_str("no CLOSING component available"),
            AssemblyWarning::RestoredSection { section } => {
                write!(f, "mapping omitted protected section '{}', restored as narrative", section)
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct Assembly {
    pub blueprint: Blueprint,
    pub strategy: AssemblyStrategy,
    pub warnings: Vec<AssemblyWarning>,
}

/// Section type to component category.
#[derive(Debug, Clone)]
pub struct SelectionTable {
    routes: HashMap<SectionType, Category>,
}

impl SelectionTable {
    pub fn route(mut self, section_type: SectionType, category: Category) -> Self {
        self.routes.insert(section_type, category);
        self
    }

    pub fn category(&self, section_type: SectionType) -> Category {
        self.routes.get(&section_type).copied().unwrap_or_else(|| section_type.category())
    }
}

impl Default for SelectionTable {
    fn default() -> Self {
        let all = [
            SectionType::Data,
            SectionType::Narrative,
            SectionType::Framework,
            SectionType::Timeline,
            SectionType::Comparison,
            SectionType::Process,
        ];
        Self { routes: all.into_iter().map(|t| (t, t.category())).collect() }
    }
}

enum Conformed {
    Valid(Value),
    Repaired(Value, Vec<String>),
    Invalid(String),
}

struct Candidate<'a> {
    component: &'a Component,
    data: Value,
    bound: usize,
    affinity: bool,
}

fn rank(candidates: &mut [Candidate<'_>]) {
    candidates.sort_by(|a, b| {
        b.bound
            .cmp(&a.bound)
            .then(b.affinity.cmp(&a.affinity))
            .then(b.component.popularity.cmp(&a.component.popularity))
            .then(a.component.id.cmp(&b.component.id))
    });
}

/// Collects warnings and logs each one as it is raised.
#[derive(Default)]
struct Warnings(Vec<AssemblyWarning>);

impl Warnings {
    fn push(&mut self, warning: AssemblyWarning) {
        tracing::warn!(%warning, "assembly");
        self.0.push(warning);
    }
}

/// The components every assembly relies on.
struct Anchors<'a> {
    usable: Vec<&'a Component>,
    narrative: &'a Component,
}

pub struct BlueprintAssembler {
    table: SelectionTable,
    validator: SchemaValidator,
}

impl BlueprintAssembler {
    pub fn new() -> Self {
        Self::with_table(SelectionTable::default())
    }

    pub fn with_table(table: SelectionTable) -> Self {
        Self { table, validator: SchemaValidator::strict() }
    }

    pub fn assemble(
        &self,
        content: &ParsedContent,
        components: &[Component],
        params: &GenerationParameters,
        mapped: Option<&MapperOutput>,
    ) -> Result<Assembly, AssemblyError> {
        let anchors = self.anchors(content, components)?;
        let mut warnings = Warnings::default();

        if let Some(output) = mapped {
            match self.reconcile(output, content, params, &anchors) {
                Some((blueprint, mapped_warnings)) => {
                    warnings.0.extend(mapped_warnings.0);
                    return Ok(self.finish(blueprint, AssemblyStrategy::Mapped, warnings));
                }
                None => warnings.push(AssemblyWarning::MapperFallback {
                    reason: "no usable entries".to_string(),
                }),
            }
        }

        let blueprint = self.rule_based(content, params, &anchors, &mut warnings)?;
        Ok(self.finish(blueprint, AssemblyStrategy::RuleBased, warnings))
    }

    fn finish(&self, blueprint: Blueprint, strategy: AssemblyStrategy, warnings: Warnings) -> Assembly {
        tracing::info!(%strategy, slides = blueprint.len(), warnings = warnings.0.len(), "blueprint assembled");
        Assembly { blueprint, strategy, warnings: warnings.0 }
    }

    fn anchors<'a>(
        &self,
        content: &ParsedContent,
        components: &'a [Component],
    ) -> Result<Anchors<'a>, AssemblyError> {
        let usable: Vec<&Component> = components.iter().filter(|c| c.is_public).collect();
        if usable.is_empty() {
            return Err(AssemblyError::NoComponents);
        }
        if content.sections.is_empty() {
            return Err(AssemblyError::NoContent);
        }
        if !usable.iter().any(|c| is_cover(c)) {
            return Err(AssemblyError::NoCover);
        }

        let probe = narrative_payload("Title", "Content", &[]);
        let mut narratives: Vec<&Component> = usable
            .iter()
            .copied()
            .filter(|c| c.category == Category::Narrative)
            .filter(|c| self.validator.validate(&probe, &c.data_schema).valid)
            .collect();
        narratives.sort_by(|a, b| {
            b.has_tag("text")
                .cmp(&a.has_tag("text"))
                .then(b.popularity.cmp(&a.popularity))
                .then(a.id.cmp(&b.id))
        });
        let narrative = narratives.first().copied().ok_or(AssemblyError::NoNarrative)?;

        Ok(Anchors { usable, narrative })
    }

    /// Validate `data` against `component`, dropping optional fields whose
    /// shape is wrong.
    fn conform(&self, component: &Component, data: Value) -> Conformed {
        let schema = &component.data_schema;
        let report = self.validator.validate(&data, schema);
        if report.valid {
            return Conformed::Valid(data);
        }
        let dropped = report.fields_with_shape_violations();
        if !report.missing_fields.is_empty()
            || dropped.is_empty()
            || dropped.iter().any(|f| schema.is_required(f))
        {
            return Conformed::Invalid(report.summary());
        }

        let Value::Object(mut map) = data else {
            return Conformed::Invalid(report.summary());
        };
        for field in &dropped {
            map.remove(field);
        }
        let repaired = Value::Object(map);
        let report = self.validator.validate(&repaired, schema);
        if report.valid {
            Conformed::Repaired(repaired, dropped)
        } else {
            Conformed::Invalid(report.summary())
        }
    }

    /// Narrative payload that always validates against the fallback.
    fn fallback_payload(&self, anchors: &Anchors<'_>, title: &str, content: &str, items: &[String]) -> Value {
        let data = narrative_payload(title, content, items);
        match self.conform(anchors.narrative, data) {
            Conformed::Valid(data) | Conformed::Repaired(data, _) => data,
            Conformed::Invalid(_) => narrative_payload(title, content, &[]),
        }
    }

    fn candidates<'a>(&self, pool: &[&'a Component], source: &BindSource<'_>, affinity_tag: &str) -> Vec<Candidate<'a>> {
        let mut candidates: Vec<Candidate<'a>> = pool
            .iter()
            .filter_map(|component| {
                let binding = bind(source, &component.data_schema);
                let data = match self.conform(component, binding.data) {
                    Conformed::Valid(data) | Conformed::Repaired(data, _) => data,
                    Conformed::Invalid(_) => return None,
                };
                Some(Candidate {
                    component,
                    bound: filled(&data),
                    data,
                    affinity: component.has_tag(affinity_tag),
                })
            })
            .collect();
        rank(&mut candidates);
        candidates
    }

    fn rule_based(
        &self,
        content: &ParsedContent,
        params: &GenerationParameters,
        anchors: &Anchors<'_>,
        warnings: &mut Warnings,
    ) -> Result<Blueprint, AssemblyError> {
        let closing = self.closing(anchors);
        let sections = trim_sections(&content.sections, params.slide_count, closing.is_some());

        let mut slides: Vec<(&Component, Value)> = Vec::with_capacity(sections.len() + 2);
        slides.push(self.cover(content, params, anchors, warnings));

        for section in sections {
            let category = self.table.category(section.section_type);
            let pool: Vec<&Component> = anchors
                .usable
                .iter()
                .copied()
                .filter(|c| c.category == category && !c.deprecated)
                .collect();
            let source = BindSource::section(section);
            let candidates = self.candidates(&pool, &source, section.section_type.affinity_tag());

            let recent = run_length(&slides);
            let fallback = || {
                (
                    anchors.narrative,
                    self.fallback_payload(anchors, &section.title, &section.content, &section.items),
                )
            };
            let choice = match candidates.first() {
                None => {
                    warnings.push(AssemblyWarning::SectionFallback { section: section.title.clone() });
                    fallback()
                }
                Some(best) if recent.map_or(false, |(id, run)| id == best.component.id && run >= MAX_CONSECUTIVE_REPEATS) => {
                    match candidates.get(1) {
                        Some(next) => (next.component, next.data.clone()),
                        None if anchors.narrative.id != best.component.id => fallback(),
                        None => {
                            warnings.push(AssemblyWarning::Repetition { component_id: best.component.id.clone() });
                            (best.component, best.data.clone())
                        }
                    }
                }
                Some(best) => (best.component, best.data.clone()),
            };
            slides.push(choice);
        }

        match closing {
            Some(closing) => slides.push(closing),
            None => warnings.push(AssemblyWarning::NoClosing),
        }

        if let Some(target) = params.slide_count {
            check_slide_count(target, slides.len(), warnings);
        }

        let mut blueprint = Blueprint::new();
        for (component, data) in slides {
            blueprint.push(component, data);
        }
        Ok(blueprint)
    }

    fn cover<'a>(
        &self,
        content: &ParsedContent,
        params: &GenerationParameters,
        anchors: &Anchors<'a>,
        warnings: &mut Warnings,
    ) -> (&'a Component, Value) {
        let covers: Vec<&Component> = anchors.usable.iter().copied().filter(|c| is_cover(c)).collect();
        let source = BindSource::cover(content);

        let wants_stats = !source.data_points.is_empty() && params.style != Style::Minimal;
        if wants_stats {
            let stats: Vec<&Component> = covers.iter().copied().filter(|c| is_stats_cover(c)).collect();
            if let Some(best) = self.candidates(&stats, &source, "stats").into_iter().next() {
                return (best.component, best.data);
            }
        }

        let plain: Vec<&Component> = covers.iter().copied().filter(|c| !is_stats_cover(c)).collect();
        if let Some(best) = self.candidates(&plain, &source, "minimal").into_iter().next() {
            return (best.component, best.data);
        }

        warnings.push(AssemblyWarning::CoverFallback);
        (anchors.narrative, self.fallback_payload(anchors, &content.title, "", &[]))
    }

    fn closing<'a>(&self, anchors: &Anchors<'a>) -> Option<(&'a Component, Value)> {
        let pool: Vec<&Component> = anchors
            .usable
            .iter()
            .copied()
            .filter(|c| c.category == Category::Closing && !c.deprecated)
            .collect();
        self.candidates(&pool, &BindSource::closing(), "closing")
            .into_iter()
            .next()
            .map(|c| (c.component, c.data))
    }

    /// Re-validate mapper proposals. `None` when not a single proposed
    /// entry survives as proposed; the warnings then describe nothing and
    /// are discarded with the mapping.
    fn reconcile(
        &self,
        output: &MapperOutput,
        content: &ParsedContent,
        params: &GenerationParameters,
        anchors: &Anchors<'_>,
    ) -> Option<(Blueprint, Warnings)> {
        if output.entries.is_empty() {
            return None;
        }
        let mut local = Warnings::default();
        let warnings = &mut local;
        let mut proposed = output.entries.clone();
        proposed.sort_by_key(|e| e.position);

        let mut accepted = 0;
        let mut entries = Vec::with_capacity(proposed.len());
        for (position, entry) in proposed.into_iter().enumerate() {
            let found = anchors.usable.iter().copied().find(|c| c.id == entry.component_id);
            let section = position.checked_sub(1).and_then(|i| content.sections.get(i));
            let replace = |warnings: &mut Warnings, reason: String| {
                warnings.push(AssemblyWarning::ReplacedEntry {
                    position,
                    component_id: entry.component_id.clone(),
                    reason,
                });
                let title = entry.data.get("title").and_then(Value::as_str)
                    .or(section.map(|s| s.title.as_str()))
                    .unwrap_or(&content.title);
                let body = entry.data.get("content").and_then(Value::as_str)
                    .or(section.map(|s| s.content.as_str()))
                    .unwrap_or("");
                let items = section.map(|s| s.items.as_slice()).unwrap_or(&[]);
                SlideBlueprintEntry::new(position, anchors.narrative, self.fallback_payload(anchors, title, body, items))
            };

            let Some(component) = found else {
                warnings.push(AssemblyWarning::UnknownComponent {
                    position,
                    component_id: entry.component_id.clone(),
                });
                entries.push(replace(warnings, "component not available".to_string()));
                continue;
            };

            match self.conform(component, entry.data.clone()) {
                Conformed::Valid(data) => {
                    accepted += 1;
                    entries.push(SlideBlueprintEntry::new(position, component, data));
                }
                Conformed::Repaired(data, dropped) => {
                    accepted += 1;
                    warnings.push(AssemblyWarning::RepairedEntry {
                        position,
                        component_id: component.id.clone(),
                        dropped,
                    });
                    entries.push(SlideBlueprintEntry::new(position, component, data));
                }
                Conformed::Invalid(reason) => entries.push(replace(warnings, reason)),
            }
        }

        if accepted == 0 {
            return None;
        }

        let is_closing = |id: &str| anchors.usable.iter().any(|c| c.id == id && c.category == Category::Closing);
        for section in content.sections.iter().filter(|s| s.is_protected()) {
            if entries.iter().any(|e| mentions(&e.data, section)) {
                continue;
            }
            warnings.push(AssemblyWarning::RestoredSection { section: section.title.clone() });
            let at = entries
                .iter()
                .rposition(|e| is_closing(&e.component_id))
                .unwrap_or(entries.len());
            let data = self.fallback_payload(anchors, &section.title, &section.content, &section.items);
            entries.insert(at, SlideBlueprintEntry::new(at, anchors.narrative, data));
        }

        let mut blueprint = Blueprint::from_entries(entries);
        blueprint.densify();
        let ids: Vec<&str> = blueprint.entries().iter().map(|e| e.component_id.as_str()).collect();
        for window in ids.windows(MAX_CONSECUTIVE_REPEATS + 1) {
            if window.iter().all(|id| *id == window[0]) {
                warnings.push(AssemblyWarning::Repetition { component_id: window[0].to_string() });
                break;
            }
        }
        if !ids.iter().any(|id| is_closing(id)) {
            warnings.push(AssemblyWarning::NoClosing);
        }
        if let Some(target) = params.slide_count {
            check_slide_count(target, blueprint.len(), warnings);
        }
        Some((blueprint, local))
    }
}

impl Default for BlueprintAssembler {
    fn default() -> Self {
        Self::new()
    }
}

fn is_cover(component: &Component) -> bool {
    component.category == Category::Title && component.has_tag("cover")
}

fn is_stats_cover(component: &Component) -> bool {
    component.has_tag("metrics") || component.has_tag("stats")
}

/// Whether some string in `data` carries the section's title or body.
fn mentions(data: &Value, section: &ParsedSection) -> bool {
    let title = section.title.trim();
    let body = section.content.trim();
    if title.is_empty() && body.is_empty() {
        return true;
    }
    match data {
        Value::String(s) => (!title.is_empty() && s.trim() == title) || (!body.is_empty() && s.contains(body)),
        Value::Array(items) => items.iter().any(|v| mentions(v, section)),
        Value::Object(map) => map.values().any(|v| mentions(v, section)),
        _ => false,
    }
}

/// Number of non-empty leaf values in a payload.
fn filled(value: &Value) -> usize {
    match value {
        Value::Null => 0,
        Value::String(s) => usize::from(!s.trim().is_empty()),
        Value::Array(items) => items.iter().map(filled).sum(),
        Value::Object(map) => map.values().map(filled).sum(),
        _ => 1,
    }
}

/// Component id of the last slide and how many times in a row it appears.
fn run_length<'a>(slides: &[(&'a Component, Value)]) -> Option<(&'a str, usize)> {
    let last: &'a Component = slides.last()?.0;
    let run = slides.iter().rev().take_while(|(c, _)| c.id == last.id).count();
    Some((last.id.as_str(), run))
}

/// Upper slide bound for a target: ceil(1.2 * target).
pub fn slide_upper_bound(target: usize) -> usize {
    (target * (100 + SLIDE_COUNT_TOLERANCE_PCT)).div_ceil(100)
}

fn slide_lower_bound(target: usize) -> usize {
    target * (100 - SLIDE_COUNT_TOLERANCE_PCT) / 100
}

fn check_slide_count(target: usize, actual: usize, warnings: &mut Warnings) {
    if actual > slide_upper_bound(target) || actual < slide_lower_bound(target) {
        warnings.push(AssemblyWarning::SlideCountOutOfBand { target, actual });
    }
}

/// Drop low-priority sections until the deck fits the upper bound. At least
/// one section is always kept; protected sections are never dropped.
fn trim_sections(sections: &[ParsedSection], target: Option<usize>, has_closing: bool) -> Vec<&ParsedSection> {
    let mut kept: Vec<&ParsedSection> = sections.iter().collect();
    let Some(target) = target else {
        return kept;
    };
    let bound = slide_upper_bound(target);
    let framing = 1 + usize::from(has_closing);

    while kept.len() + framing > bound && kept.len() > 1 {
        let victim = kept
            .iter()
            .enumerate()
            .filter(|(_, s)| !s.is_protected())
            .max_by_key(|(i, s)| (Reverse(s.priority), *i))
            .map(|(i, _)| i);
        match victim {
            Some(i) => {
                let dropped = kept.remove(i);
                tracing::debug!(section = %dropped.title, priority = dropped.priority, "section trimmed");
            }
            None => break,
        }
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::DataPoint;
    use crate::library::core_components;
    use crate::mapper::MappedEntry;
    use serde_json::json;

    fn ids(assembly: &Assembly) -> Vec<String> {
        assembly.blueprint.entries().iter().map(|e| e.component_id.clone()).collect()
    }

    fn narrative(title: &str, priority: u8) -> ParsedSection {
        let mut section = ParsedSection::new(title, SectionType::Narrative).with_priority(priority);
        section.content = format!("{} body", title);
        section
    }

    fn deck(sections: Vec<ParsedSection>) -> ParsedContent {
        ParsedContent { title: "Deck".to_string(), sections }
    }

    #[test]
    fn plain_deck_gets_cover_sections_and_closing() {
        let components = core_components().unwrap();
        let assembly = BlueprintAssembler::new()
            .assemble(&deck(vec![narrative("Why", 3)]), &components, &GenerationParameters::default(), None)
            .unwrap();
        assert_eq!(assembly.strategy, AssemblyStrategy::RuleBased);
        assert_eq!(ids(&assembly), vec!["core.minimal-cover", "core.full-text-narrative", "core.thank-you"]);
        assert!(assembly.blueprint.is_dense());
        assert_eq!(assembly.blueprint.entries()[2].data, json!({ "message": "Thank You" }));
    }

    #[test]
    fn data_rich_decks_lead_with_stats() {
        let components = core_components().unwrap();
        let mut metrics = ParsedSection::new("Metrics", SectionType::Data).with_priority(4);
        let mut revenue = DataPoint::new("Revenue", "$2.5M");
        revenue.change = Some("+23%".into());
        metrics.data_points = vec![revenue, DataPoint::new("Margin", "18%")];
        let assembly = BlueprintAssembler::new()
            .assemble(&deck(vec![metrics]), &components, &GenerationParameters::default(), None)
            .unwrap();
        let ids = ids(&assembly);
        assert_eq!(ids[0], "core.stats-cover");
        assert_eq!(ids[1], "core.kpi-dashboard");
    }

    #[test]
    fn unmatched_sections_fall_back_to_narrative() {
        let components = core_components().unwrap();
        let framework = ParsedSection::new("Operating model", SectionType::Framework);
        let assembly = BlueprintAssembler::new()
            .assemble(&deck(vec![framework]), &components, &GenerationParameters::default(), None)
            .unwrap();
        assert_eq!(ids(&assembly)[1], "core.full-text-narrative");
        assert!(assembly
            .warnings
            .iter()
            .any(|w| matches!(w, AssemblyWarning::SectionFallback { section } if section == "Operating model")));
    }

    #[test]
    fn trimming_respects_priority_and_bound() {
        let components = core_components().unwrap();
        let sections = vec![
            narrative("A", 5),
            narrative("B", 2),
            narrative("C", 3),
            narrative("D", 2),
            narrative("E", 4),
            narrative("F", 1),
        ];
        let params = GenerationParameters { slide_count: Some(5), ..Default::default() };
        let assembly = BlueprintAssembler::new().assemble(&deck(sections), &components, &params, None).unwrap();

        // bound = 6: cover + 4 sections + closing
        assert_eq!(assembly.blueprint.len(), 6);
        let titles: Vec<_> = assembly.blueprint.entries()[1..5]
            .iter()
            .map(|e| e.data["title"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(titles, vec!["A", "B", "C", "E"]);
    }

    #[test]
    fn protected_sections_survive_even_out_of_band() {
        let components = core_components().unwrap();
        let sections = (0..6).map(|i| narrative(&format!("S{}", i), 5)).collect();
        let params = GenerationParameters { slide_count: Some(3), ..Default::default() };
        let assembly = BlueprintAssembler::new().assemble(&deck(sections), &components, &params, None).unwrap();
        assert_eq!(assembly.blueprint.len(), 8);
        assert!(assembly
            .warnings
            .iter()
            .any(|w| matches!(w, AssemblyWarning::SlideCountOutOfBand { target: 3, actual: 8 })));
    }

    #[test]
    fn third_repeat_prefers_another_valid_candidate() {
        let components = core_components().unwrap();
        let steps = |title: &str| {
            let mut s = ParsedSection::new(title, SectionType::Process);
            s.items = vec!["Plan".into(), "Build".into(), "Ship".into()];
            s
        };
        let assembly = BlueprintAssembler::new()
            .assemble(&deck(vec![steps("One"), steps("Two"), steps("Three")]), &components, &GenerationParameters::default(), None)
            .unwrap();
        let ids = ids(&assembly);
        assert_eq!(ids[1], ids[2]);
        assert_ne!(ids[2], ids[3]);
    }

    #[test]
    fn mapped_entries_are_revalidated_and_repaired() {
        let components = core_components().unwrap();
        let content = deck(vec![narrative("Why", 3)]);
        let output = MapperOutput {
            entries: vec![
                MappedEntry { position: 2, component_id: "core.thank-you".into(), data: json!({}) },
                MappedEntry { position: 0, component_id: "core.minimal-cover".into(), data: json!({ "title": "Deck", "subtitle": 7 }) },
                MappedEntry { position: 1, component_id: "ghost".into(), data: json!({ "title": "Why" }) },
            ],
        };
        let assembly = BlueprintAssembler::new()
            .assemble(&content, &components, &GenerationParameters::default(), Some(&output))
            .unwrap();
        assert_eq!(assembly.strategy, AssemblyStrategy::Mapped);
        assert_eq!(ids(&assembly), vec!["core.minimal-cover", "core.full-text-narrative", "core.thank-you"]);
        assert_eq!(assembly.blueprint.entries()[0].data, json!({ "title": "Deck" }));
        assert_eq!(assembly.blueprint.entries()[1].data["content"], "Why body");
        assert!(assembly.blueprint.is_dense());
        assert!(assembly.warnings.iter().any(|w| matches!(w, AssemblyWarning::RepairedEntry { .. })));
        assert!(assembly.warnings.iter().any(|w| matches!(w, AssemblyWarning::UnknownComponent { .. })));
    }

    #[test]
    fn wholly_unusable_mapping_falls_back_to_rules() {
        let components = core_components().unwrap();
        let output = MapperOutput {
            entries: vec![MappedEntry { position: 0, component_id: "ghost".into(), data: json!({}) }],
        };
        let assembly = BlueprintAssembler::new()
            .assemble(&deck(vec![narrative("Why", 3)]), &components, &GenerationParameters::default(), Some(&output))
            .unwrap();
        assert_eq!(assembly.strategy, AssemblyStrategy::RuleBased);
        assert!(assembly.warnings.iter().any(|w| matches!(w, AssemblyWarning::MapperFallback { .. })));
        // the discarded mapping's per-entry warnings do not describe this blueprint
        assert!(!assembly.warnings.iter().any(|w| matches!(
            w,
            AssemblyWarning::UnknownComponent { .. } | AssemblyWarning::ReplacedEntry { .. }
        )));
    }

    #[test]
    fn mapping_that_omits_a_protected_section_restores_it() {
        let components = core_components().unwrap();
        let content = deck(vec![narrative("Why", 3), narrative("Risks", 5)]);
        let output = MapperOutput {
            entries: vec![
                MappedEntry { position: 0, component_id: "core.minimal-cover".into(), data: json!({ "title": "Deck" }) },
                MappedEntry { position: 1, component_id: "core.thank-you".into(), data: json!({}) },
            ],
        };
        let assembly = BlueprintAssembler::new()
            .assemble(&content, &components, &GenerationParameters::default(), Some(&output))
            .unwrap();

        assert_eq!(assembly.strategy, AssemblyStrategy::Mapped);
        assert_eq!(ids(&assembly), vec!["core.minimal-cover", "core.full-text-narrative", "core.thank-you"]);
        assert_eq!(assembly.blueprint.entries()[1].data["title"], "Risks");
        assert_eq!(assembly.blueprint.entries()[1].data["content"], "Risks body");
        assert!(assembly.blueprint.is_dense());
        assert!(assembly
            .warnings
            .iter()
            .any(|w| matches!(w, AssemblyWarning::RestoredSection { section } if section == "Risks")));
        // priority 3 may be left out by the mapper
        assert!(!assembly
            .warnings
            .iter()
            .any(|w| matches!(w, AssemblyWarning::RestoredSection { section } if section == "Why")));
    }

    #[test]
    fn structural_preconditions() {
        let components = core_components().unwrap();
        let assembler = BlueprintAssembler::new();
        let params = GenerationParameters::default();
        assert_eq!(assembler.assemble(&deck(vec![]), &components, &params, None).unwrap_err(), AssemblyError::NoContent);
        assert_eq!(assembler.assemble(&deck(vec![narrative("x", 3)]), &[], &params, None).unwrap_err(), AssemblyError::NoComponents);

        let no_cover: Vec<Component> = components.iter().filter(|c| !is_cover(c)).cloned().collect();
        assert_eq!(assembler.assemble(&deck(vec![narrative("x", 3)]), &no_cover, &params, None).unwrap_err(), AssemblyError::NoCover);
    }
}
