//! Contract Invariant Tests
//!
//! These tests verify the non-negotiable guarantees.

use serde_json::{json, Value};

use deckforge_core::{
    blueprint::SlideBlueprintEntry,
    content::Style,
    draw::FAILURE_TEXT,
    hashing::canonical_json,
    library::{core_components, seed},
    Blueprint, BlueprintAssembler, Category, Component, ComponentFilter, ComponentRegistry, DataPoint,
    DocumentCompositor, DrawOp, Executor, GenerationParameters, ParsedContent, ParsedSection, RenderProgram,
    SchemaValidator, SectionType, Theme,
};

fn seeded() -> ComponentRegistry {
    let registry = ComponentRegistry::in_memory();
    seed(&registry).unwrap();
    registry
}

fn component(id: &str) -> Component {
    core_components().unwrap().into_iter().find(|c| c.id == id).unwrap()
}

fn entry(position: usize, id: &str, data: Value) -> SlideBlueprintEntry {
    SlideBlueprintEntry::new(position, &component(id), data)
}

fn compositor(registry: &ComponentRegistry) -> DocumentCompositor {
    DocumentCompositor::new(registry.clone(), Executor::default())
}

#[test]
fn invariant_invalid_payload_never_renders() {
    let registry = seeded();
    // kpis is required
    let blueprint = Blueprint::from_entries(vec![entry(0, "core.kpi-dashboard", json!({ "title": "KPIs" }))]);
    let document = compositor(&registry).compose(&blueprint, &Theme::default()).unwrap();

    let page = &document.pages[0];
    assert!(page.is_placeholder());
    assert_eq!(page.ops.len(), 1);
    assert!(matches!(&page.ops[0], DrawOp::Text(t) if t.text == FAILURE_TEXT));
}

#[cfg(feature = "test-hooks")]
#[test]
fn invariant_every_page_is_validated() {
    use deckforge_core::executor::{get_validation_call_count, reset_validation_call_count};

    let registry = seeded();
    let blueprint = Blueprint::from_entries(vec![
        entry(0, "core.minimal-cover", json!({ "title": "Deck" })),
        entry(1, "core.full-text-narrative", json!({ "title": "Why", "content": "Because" })),
        entry(2, "core.thank-you", json!({})),
    ]);
    reset_validation_call_count();
    compositor(&registry).parallel(false).compose(&blueprint, &Theme::default()).unwrap();
    assert!(get_validation_call_count() >= 3);
}

#[test]
fn invariant_pages_follow_positions() {
    let registry = seeded();
    let blueprint = Blueprint::from_entries(vec![
        entry(7, "core.thank-you", json!({})),
        entry(2, "core.full-text-narrative", json!({ "title": "B", "content": "b" })),
        entry(0, "core.minimal-cover", json!({ "title": "A" })),
    ]);
    let document = compositor(&registry).compose(&blueprint, &Theme::default()).unwrap();
    let positions: Vec<_> = document.pages.iter().map(|p| p.position).collect();
    assert_eq!(positions, vec![0, 2, 7]);
    assert_eq!(document.pages[2].component_id, "core.thank-you");
}

#[test]
fn invariant_rendering_is_deterministic() {
    let registry = seeded();
    let blueprint = Blueprint::from_entries(vec![
        entry(0, "core.stats-cover", json!({
            "title": "Q4",
            "stats": [{ "label": "Revenue", "value": "$2.5M" }, { "label": "Margin", "value": "18%" }]
        })),
        entry(1, "core.numbered-steps", json!({ "title": "Plan", "steps": ["One", "Two", "Three"] })),
    ]);
    let a = compositor(&registry).compose(&blueprint, &Theme::default()).unwrap();
    let b = compositor(&registry).parallel(false).compose(&blueprint, &Theme::default()).unwrap();

    assert_eq!(a.pages, b.pages);
    assert_eq!(a.manifest_hash, b.manifest_hash);
    assert_ne!(a.id, b.id);
    assert!(a.pages.iter().all(|p| !p.render_key.is_empty()));
}

#[test]
fn invariant_failures_are_isolated() {
    let registry = seeded();
    let mut future = entry(1, "core.full-text-narrative", json!({ "title": "Later", "content": "x" }));
    if let Some(snapshot) = future.snapshot.as_mut() {
        snapshot.engine_min_version = "99.0.0".to_string();
    }
    let blueprint = Blueprint::from_entries(vec![
        entry(0, "core.minimal-cover", json!({ "title": "Deck" })),
        future,
        entry(2, "core.thank-you", json!({})),
    ]);
    let document = compositor(&registry).compose(&blueprint, &Theme::default()).unwrap();
    let placeholders: Vec<_> = document.pages.iter().map(|p| p.is_placeholder()).collect();
    assert_eq!(placeholders, vec![false, true, false]);
}

#[test]
fn invariant_throwing_program_fails_only_its_page() {
    let registry = seeded();
    let mut broken = entry(1, "core.full-text-narrative", json!({ "title": "Why", "content": "Because" }));
    let throws: RenderProgram = serde_json::from_value(json!({
        "body": [{ "op": "shape", "shape": "rect", "x": 0, "y": 0, "h": 1, "w": { "div": [1, 0] } }]
    }))
    .unwrap();
    if let Some(snapshot) = broken.snapshot.as_mut() {
        snapshot.render_program = throws;
    }
    let blueprint = Blueprint::from_entries(vec![
        entry(0, "core.minimal-cover", json!({ "title": "Deck" })),
        broken,
        entry(2, "core.thank-you", json!({})),
    ]);
    let document = compositor(&registry).compose(&blueprint, &Theme::default()).unwrap();

    assert_eq!(document.page_count(), 3);
    assert_eq!(document.placeholder_count(), 1);
    assert!(document.pages[1].is_placeholder());
    assert!(matches!(&document.pages[1].ops[0], DrawOp::Text(t) if t.text == FAILURE_TEXT));
    assert!(!document.pages[0].is_placeholder() && !document.pages[2].is_placeholder());
}

fn bar_widths(items: Value) -> Vec<f64> {
    let registry = seeded();
    let blueprint = Blueprint::from_entries(vec![entry(0, "core.comparison-bars", json!({ "title": "Bars", "items": items }))]);
    let document = compositor(&registry).compose(&blueprint, &Theme::default()).unwrap();
    assert_eq!(document.placeholder_count(), 0);
    document.pages[0]
        .ops
        .iter()
        .filter_map(|op| match op {
            DrawOp::Shape(shape) => Some(shape.frame.w),
            _ => None,
        })
        .collect()
}

#[test]
fn invariant_single_bar_is_full_width() {
    assert_eq!(bar_widths(json!([{ "label": "Revenue", "value": 42 }])), vec![6.0]);
    assert_eq!(bar_widths(json!([{ "label": "A", "value": 10 }, { "label": "B", "value": 5 }])), vec![6.0, 3.0]);
    assert!(bar_widths(json!([])).is_empty());
}

#[test]
fn invariant_degenerate_collections_lay_out() {
    let registry = seeded();
    let blueprint = Blueprint::from_entries(vec![
        entry(0, "core.numbered-steps", json!({ "title": "Nothing yet", "steps": [] })),
        entry(1, "core.timeline-horizontal", json!({ "title": "One", "milestones": [{ "date": "Q1", "event": "Launch" }] })),
        entry(2, "core.comparison-bars", json!({ "title": "Flat", "items": [{ "label": "A", "value": 0 }, { "label": "B", "value": 0 }] })),
    ]);
    let document = compositor(&registry).compose(&blueprint, &Theme::default()).unwrap();
    assert_eq!(document.placeholder_count(), 0);
}

fn section(title: &str, section_type: SectionType) -> ParsedSection {
    let mut section = ParsedSection::new(title, section_type);
    section.content = format!("{} in detail", title);
    section.items = vec!["Pro: quick".into(), "Con: costly".into(), "Q1: pilot".into(), "Q2: rollout".into()];
    section.data_points = vec![DataPoint::new("Revenue", "$2.5M"), DataPoint::new("Users", "12000")];
    section
}

#[test]
fn invariant_rule_based_blueprints_are_complete() {
    let registry = seeded();
    let components = registry.available().unwrap();
    let validator = SchemaValidator::strict();

    for style in [Style::DataDriven, Style::Minimal] {
        let content = ParsedContent {
            title: "Annual Review".to_string(),
            sections: [
                SectionType::Data,
                SectionType::Narrative,
                SectionType::Framework,
                SectionType::Timeline,
                SectionType::Comparison,
                SectionType::Process,
            ]
            .into_iter()
            .map(|t| section(&format!("{:?}", t), t))
            .collect(),
        };
        let params = GenerationParameters { style, ..Default::default() };
        let assembly = BlueprintAssembler::new().assemble(&content, &components, &params, None).unwrap();
        let entries = assembly.blueprint.entries();

        assert!(assembly.blueprint.is_dense());
        assert_eq!(entries.len(), content.sections.len() + 2);
        let first = registry.get(&entries[0].component_id).unwrap();
        assert_eq!(first.category, Category::Title);
        assert!(first.has_tag("cover"));
        assert_eq!(registry.get(&entries[entries.len() - 1].component_id).unwrap().category, Category::Closing);

        for entry in entries {
            let snapshot = entry.snapshot.as_ref().unwrap();
            let report = validator.validate(&entry.data, &snapshot.data_schema);
            assert!(report.valid, "{} failed: {}", entry.component_id, report.summary());
        }
        for run in entries.windows(3) {
            let same = run.iter().all(|e| e.component_id == run[0].component_id);
            assert!(!same || run[0].component_id == "core.full-text-narrative");
        }
    }
}

#[test]
fn invariant_seed_is_idempotent() {
    let registry = ComponentRegistry::in_memory();
    let first = seed(&registry).unwrap();
    let before = canonical_json(&registry.list(&ComponentFilter::default())).unwrap();
    let second = seed(&registry).unwrap();
    let after = canonical_json(&registry.list(&ComponentFilter::default())).unwrap();

    assert_eq!(first.removed, 0);
    assert_eq!(second.removed, second.inserted);
    assert_eq!(before, after);
    assert_eq!(registry.available().unwrap().len(), 20);
}

#[test]
fn invariant_canonical_json_deterministic() {
    let a = canonical_json(&json!({ "b": 1, "a": { "d": [1, 2], "c": null } })).unwrap();
    let b = canonical_json(&json!({ "a": { "c": null, "d": [1, 2] }, "b": 1 })).unwrap();
    assert_eq!(a, b);
}
