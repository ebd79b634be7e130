//! Payload Binding - Sections to Component Data
//!
//! Binding is driven by the component's declared schema: every declared
//! property is offered a value from the section by field name and shape.
//! Nothing is invented; a field with no source is left out and the schema
//! validator decides whether the component is still usable.

use serde_json::{json, Map, Value};

use crate::content::{DataPoint, ParsedContent, ParsedSection};
use crate::schema::{DataSchema, SchemaType};

/// Closing message bound into CLOSING components.
pub const CLOSING_MESSAGE: &str = "Thank You";

/// The material a payload can be built from.
#[derive(Debug, Clone, Default)]
pub struct BindSource<'a> {
    pub title: &'a str,
    pub content: &'a str,
    pub items: &'a [String],
    pub data_points: Vec<&'a DataPoint>,
    pub message: Option<&'a str>,
}

impl<'a> BindSource<'a> {
    pub fn section(section: &'a ParsedSection) -> Self {
        Self {
            title: &section.title,
            content: &section.content,
            items: &section.items,
            data_points: section.data_points.iter().collect(),
            message: None,
        }
    }

    /// Cover material: the deck title plus every data point in the deck.
    pub fn cover(content: &'a ParsedContent) -> Self {
        Self {
            title: &content.title,
            content: "",
            items: &[],
            data_points: content.data_points().collect(),
            message: None,
        }
    }

    pub fn closing() -> Self {
        Self { message: Some(CLOSING_MESSAGE), ..Default::default() }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Binding {
    pub data: Value,
    /// Number of schema fields that received a value.
    pub bound_fields: usize,
}

pub fn bind(source: &BindSource<'_>, schema: &DataSchema) -> Binding {
    let mut data = Map::new();
    for (name, property) in &schema.properties {
        if let Some(value) = bind_field(name, property, source) {
            data.insert(name.clone(), value);
        }
    }
    Binding { bound_fields: data.len(), data: Value::Object(data) }
}

/// Generic narrative payload used when no better component fits.
pub fn narrative_payload(title: &str, content: &str, items: &[String]) -> Value {
    let mut data = Map::new();
    data.insert("title".to_string(), json!(non_empty(title).unwrap_or("Overview")));
    data.insert("content".to_string(), json!(content));
    if !items.is_empty() {
        data.insert("bullets".to_string(), json!(items));
    }
    Value::Object(data)
}

fn non_empty(text: &str) -> Option<&str> {
    let trimmed = text.trim();
    (!trimmed.is_empty()).then_some(trimmed)
}

fn text(value: &str) -> Option<Value> {
    non_empty(value).map(|t| json!(t))
}

fn bind_field(name: &str, property: &DataSchema, source: &BindSource<'_>) -> Option<Value> {
    let first = source.data_points.first();
    let value = match (name, property.kind) {
        ("title" | "sectionName" | "heading", _) => text(source.title),
        ("content" | "body" | "context" | "description", None | Some(SchemaType::String)) => {
            text(source.content)
        }
        ("message", _) => source.message.map(|m| json!(m)),
        ("value" | "number", None | Some(SchemaType::String)) => first.map(|dp| json!(dp.value)),
        ("label", None | Some(SchemaType::String)) => first.map(|dp| json!(dp.label)),
        ("comparison", _) => first.and_then(|dp| dp.change.as_ref()).map(|c| json!(c)),
        ("before" | "after", Some(SchemaType::Object)) => keyed_group(name, source.items),
        (_, Some(SchemaType::Array)) => array_field(name, property, source),
        _ => None,
    }?;
    fit_array(value, property)
}

/// Trim arrays to `maxItems`; drop empty ones.
fn fit_array(value: Value, property: &DataSchema) -> Option<Value> {
    match value {
        Value::Array(mut items) => {
            if let Some(max) = property.max_items {
                items.truncate(max);
            }
            (!items.is_empty()).then_some(Value::Array(items))
        }
        other => Some(other),
    }
}

const KEYED_LISTS: [&str; 6] = ["pros", "cons", "strengths", "weaknesses", "opportunities", "threats"];

fn array_field(name: &str, property: &DataSchema, source: &BindSource<'_>) -> Option<Value> {
    if KEYED_LISTS.contains(&name) {
        let items = keyed_items(name, source.items);
        return (!items.is_empty()).then(|| json!(items));
    }

    let item_schema = property.items.as_deref();
    match item_schema.and_then(|s| s.kind) {
        Some(SchemaType::Object) => item_schema.and_then(|s| records(s, source)),
        Some(SchemaType::String) | None => match name {
            "bullets" | "items" | "steps" | "points" => Some(json!(source.items)),
            _ => None,
        },
        _ => None,
    }
}

/// Build an array of records from whichever source matches the record shape.
fn records(item: &DataSchema, source: &BindSource<'_>) -> Option<Value> {
    let declares = |key: &str| item.properties.contains_key(key) || item.is_required(key);
    let requires_only = |allowed: &[&str]| item.required.iter().all(|r| allowed.contains(&r.as_str()));

    if declares("date") && declares("event") && requires_only(&["date", "event"]) {
        let milestones: Vec<Value> = source
            .items
            .iter()
            .filter_map(|i| split_label(i))
            .map(|(date, event)| json!({ "date": date, "event": event }))
            .collect();
        return Some(Value::Array(milestones));
    }

    if declares("value") && requires_only(&["label", "value", "trend", "change", "target"]) {
        let rows: Vec<Value> = source
            .data_points
            .iter()
            .filter_map(|dp| data_point_record(dp, item))
            .collect();
        return Some(Value::Array(rows));
    }

    if declares("label") && requires_only(&["label", "description"]) {
        let rows: Vec<Value> = source
            .items
            .iter()
            .map(|i| match split_label(i) {
                Some((label, description)) if declares("description") => {
                    json!({ "label": label, "description": description })
                }
                _ => json!({ "label": i }),
            })
            .collect();
        return Some(Value::Array(rows));
    }

    None
}

fn data_point_record(dp: &DataPoint, item: &DataSchema) -> Option<Value> {
    let mut row = Map::new();
    for (key, property) in &item.properties {
        let value = match (key.as_str(), property.kind) {
            ("label", _) => Some(json!(dp.label)),
            ("value", Some(SchemaType::Number | SchemaType::Integer)) => dp.numeric_value().map(|v| json!(v)),
            ("value", _) => Some(json!(dp.value)),
            ("trend", _) => dp.change_value().map(|v| json!(v)),
            ("change", _) => dp.change.as_ref().map(|c| json!(c)),
            ("target", _) => dp.target.as_ref().map(|t| json!(t)),
            _ => None,
        };
        if let Some(value) = value {
            row.insert(key.clone(), value);
        }
    }
    // A numeric field that cannot be read makes the whole row unusable.
    item.required.iter().all(|r| row.contains_key(r)).then_some(Value::Object(row))
}

/// `"Q3: launch"` or `"Q3 - launch"` as `("Q3", "launch")`.
fn split_label(item: &str) -> Option<(String, String)> {
    let (head, tail) = item.split_once(':').or_else(|| item.split_once(" - "))?;
    let (head, tail) = (head.trim(), tail.trim());
    (!head.is_empty() && !tail.is_empty()).then(|| (head.to_string(), tail.to_string()))
}

fn singular(word: &str) -> String {
    if let Some(stem) = word.strip_suffix("ies") {
        format!("{}y", stem)
    } else {
        word.trim_end_matches('s').to_string()
    }
}

/// Items written as `"Pro: fast setup"` for the field `pros`.
fn keyed_items(field: &str, items: &[String]) -> Vec<String> {
    let key = singular(field);
    items
        .iter()
        .filter_map(|i| split_label(i))
        .filter(|(label, _)| singular(&label.to_lowercase()) == key)
        .map(|(_, text)| text)
        .collect()
}

fn keyed_group(field: &str, items: &[String]) -> Option<Value> {
    let grouped = keyed_items(field, items);
    if grouped.is_empty() {
        return None;
    }
    let mut label = field.to_string();
    if let Some(first) = label.get_mut(0..1) {
        first.make_ascii_uppercase();
    }
    Some(json!({ "label": label, "items": grouped }))
}
