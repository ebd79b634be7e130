//! Draw Operations - Executor Output

use serde::{Deserialize, Serialize};
use std::fmt;

/// Fixed slide canvas, in canvas units (nominally inches).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Canvas {
    pub width: f64,
    pub height: f64,
}

impl Canvas {
    pub const SLIDE: Canvas = Canvas { width: 10.0, height: 7.5 };
}

impl Default for Canvas {
    fn default() -> Self {
        Self::SLIDE
    }
}

/// A 6-digit uppercase RGB hex color, without the leading `#`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Color(String);

impl Color {
    pub fn parse(value: &str) -> Option<Self> {
        let hex = value.trim().trim_start_matches('#');
        if hex.len() == 6 && hex.chars().all(|c| c.is_ascii_hexdigit()) {
            Some(Self(hex.to_ascii_uppercase()))
        } else {
            None
        }
    }

    /// For hex literals known to be valid at the call site.
    pub(crate) fn literal(hex: &'static str) -> Self {
        Self(hex.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Components in 0.0..=1.0.
    pub fn rgb(&self) -> (f64, f64, f64) {
        let channel = |i: usize| {
            u8::from_str_radix(&self.0[i..i + 2], 16).map_or(0.0, |v| f64::from(v) / 255.0)
        };
        (channel(0), channel(2), channel(4))
    }
}

impl TryFrom<String> for Color {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Color::parse(&value).ok_or_else(|| format!("invalid color: {}", value))
    }
}

impl From<Color> for String {
    fn from(color: Color) -> Self {
        color.0
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HAlign {
    #[default]
    Left,
    Center,
    Right,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VAlign {
    #[default]
    Top,
    Middle,
    Bottom,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShapeKind {
    Rect,
    RoundedRect,
    Ellipse,
    Line,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArrowHead {
    #[default]
    None,
    End,
    Both,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextBlock {
    pub frame: Frame,
    pub text: String,
    pub font_face: String,
    pub font_size: f64,
    pub bold: bool,
    pub italic: bool,
    pub color: Color,
    pub align: HAlign,
    pub valign: VAlign,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShapeOp {
    pub shape: ShapeKind,
    pub frame: Frame,
    pub fill: Option<Color>,
    pub stroke: Option<Color>,
    pub stroke_width: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectorOp {
    pub from: Point,
    pub to: Point,
    pub color: Color,
    pub width: f64,
    pub head: ArrowHead,
}

/// The only three things a render program can produce.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DrawOp {
    Text(TextBlock),
    Shape(ShapeOp),
    Connector(ConnectorOp),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PageStatus {
    Rendered,
    Placeholder { reason: String },
}

/// One rendered slide.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page {
    pub position: usize,
    pub component_id: String,
    pub background: Color,
    pub ops: Vec<DrawOp>,
    /// Where the theme logo is stamped, when the theme carries one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logo: Option<Frame>,
    pub status: PageStatus,
    /// Render key of `(program, data, theme)`; empty when the inputs could
    /// not be hashed.
    pub render_key: String,
}

impl Page {
    pub fn is_placeholder(&self) -> bool {
        matches!(self.status, PageStatus::Placeholder { .. })
    }
}

/// The render-failure marker: a single centered error notice.
pub fn failure_marker(font_face: &str) -> Vec<DrawOp> {
    vec![DrawOp::Text(TextBlock {
        frame: Frame { x: 1.0, y: 3.0, w: 8.0, h: 1.0 },
        text: FAILURE_TEXT.to_string(),
        font_face: font_face.to_string(),
        font_size: 24.0,
        bold: false,
        italic: false,
        color: Color::literal("CC0000"),
        align: HAlign::Center,
        valign: VAlign::Middle,
    })]
}

pub const FAILURE_TEXT: &str = "Error rendering slide";

/// Top-right corner placement for the brand logo.
pub const LOGO_FRAME: Frame = Frame { x: 8.6, y: 0.2, w: 1.2, h: 0.6 };

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn color_normalizes_hex() {
        assert_eq!(Color::parse("#0066cc").unwrap().as_str(), "0066CC");
        assert!(Color::parse("red").is_none());
        assert!(Color::parse("12345").is_none());
        let (r, g, b) = Color::parse("FF0000").unwrap().rgb();
        assert_eq!((r, g, b), (1.0, 0.0, 0.0));
    }

    #[test]
    fn color_deserialization_rejects_garbage() {
        assert!(serde_json::from_str::<Color>("\"00AA00\"").is_ok());
        assert!(serde_json::from_str::<Color>("\"not-a-color\"").is_err());
    }

    #[test]
    fn failure_marker_is_one_centered_block() {
        let ops = failure_marker("Arial");
        assert_eq!(ops.len(), 1);
        let DrawOp::Text(block) = &ops[0] else {
            panic!("marker must be text");
        };
        assert_eq!(block.text, FAILURE_TEXT);
        assert_eq!(block.align, HAlign::Center);
    }
}
