//! PDF Serialization
//!
//! Writes a composed [`Document`] with the base-14 fonts only, so the output
//! needs no font embedding. Slide units are inches from the top-left corner;
//! PDF user space is points from the bottom-left.

use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document as LoDocument, Object, ObjectId, Stream, StringFormat};
use thiserror::Error;

use crate::compositor::Document;
use crate::draw::{ArrowHead, Color, ConnectorOp, DrawOp, Frame, HAlign, Page, ShapeKind, ShapeOp, TextBlock, VAlign};

const PT_PER_INCH: f64 = 72.0;
const LINE_SPACING: f64 = 1.2;
/// Bezier control distance for quarter circles.
const KAPPA: f64 = 0.552_284_8;

#[derive(Debug, Error)]
pub enum PdfError {
    #[error("Logo could not be decoded: {0}")]
    Logo(String),

    #[error("Content stream encoding failed: {0}")]
    Encode(String),

    #[error("PDF write failed: {0}")]
    Write(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Family {
    Helvetica,
    Times,
    Courier,
}

impl Family {
    const ALL: [Family; 3] = [Family::Helvetica, Family::Times, Family::Courier];

    /// Map a theme face onto the closest base-14 family.
    fn of(face: &str) -> Self {
        let face = face.to_ascii_lowercase();
        if ["times", "georgia", "garamond", "serif", "cambria"].iter().any(|f| face.contains(f))
            && !face.contains("sans")
        {
            Family::Times
        } else if ["courier", "mono", "consolas"].iter().any(|f| face.contains(f)) {
            Family::Courier
        } else {
            Family::Helvetica
        }
    }

    fn base_font(self, bold: bool, italic: bool) -> &'static str {
        match (self, bold, italic) {
            (Family::Helvetica, false, false) => "Helvetica",
            (Family::Helvetica, true, false) => "Helvetica-Bold",
            (Family::Helvetica, false, true) => "Helvetica-Oblique",
            (Family::Helvetica, true, true) => "Helvetica-BoldOblique",
            (Family::Times, false, false) => "Times-Roman",
            (Family::Times, true, false) => "Times-Bold",
            (Family::Times, false, true) => "Times-Italic",
            (Family::Times, true, true) => "Times-BoldItalic",
            (Family::Courier, false, false) => "Courier",
            (Family::Courier, true, false) => "Courier-Bold",
            (Family::Courier, false, true) => "Courier-Oblique",
            (Family::Courier, true, true) => "Courier-BoldOblique",
        }
    }

    /// Average advance width as a fraction of the font size.
    fn average_width(self, bold: bool) -> f64 {
        match self {
            Family::Courier => 0.6,
            Family::Times => if bold { 0.5 } else { 0.45 },
            Family::Helvetica => if bold { 0.55 } else { 0.5 },
        }
    }

    fn resource_name(self, bold: bool, italic: bool) -> String {
        let family = Family::ALL.iter().position(|f| *f == self).unwrap_or(0);
        format!("F{}", family * 4 + usize::from(bold) * 2 + usize::from(italic) + 1)
    }
}

/// Encode text as WinAnsi. Characters outside the code page become `?`.
fn win_ansi(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| match c {
            ' '..='~' => c as u8,
            '€' => 0x80,
            '…' => 0x85,
            '‘' => 0x91,
            '’' => 0x92,
            '“' => 0x93,
            '”' => 0x94,
            '•' => 0x95,
            '–' => 0x96,
            '—' => 0x97,
            '™' => 0x99,
            '\u{a0}'..='\u{ff}' => c as u32 as u8,
            _ => b'?',
        })
        .collect()
}

struct Painter {
    height: f64,
    ops: Vec<Operation>,
}

impl Painter {
    fn new(height: f64) -> Self {
        Self { height, ops: Vec::new() }
    }

    fn op(&mut self, operator: &str, operands: Vec<Object>) {
        self.ops.push(Operation::new(operator, operands));
    }

    fn x(&self, inches: f64) -> f64 {
        inches * PT_PER_INCH
    }

    fn y(&self, inches: f64) -> f64 {
        self.height - inches * PT_PER_INCH
    }

    fn fill_color(&mut self, color: &Color) {
        let (r, g, b) = color.rgb();
        self.op("rg", vec![r.into(), g.into(), b.into()]);
    }

    fn stroke_color(&mut self, color: &Color) {
        let (r, g, b) = color.rgb();
        self.op("RG", vec![r.into(), g.into(), b.into()]);
    }

    fn move_to(&mut self, x: f64, y: f64) {
        self.op("m", vec![x.into(), y.into()]);
    }

    fn line_to(&mut self, x: f64, y: f64) {
        self.op("l", vec![x.into(), y.into()]);
    }

    fn curve_to(&mut self, c: [f64; 6]) {
        self.op("c", c.iter().map(|v| (*v).into()).collect());
    }

    fn background(&mut self, color: &Color, width: f64) {
        self.op("q", vec![]);
        self.fill_color(color);
        self.op("re", vec![0.0.into(), 0.0.into(), width.into(), self.height.into()]);
        self.op("f", vec![]);
        self.op("Q", vec![]);
    }

    fn draw(&mut self, op: &DrawOp) {
        self.op("q", vec![]);
        match op {
            DrawOp::Text(text) => self.text(text),
            DrawOp::Shape(shape) => self.shape(shape),
            DrawOp::Connector(connector) => self.connector(connector),
        }
        self.op("Q", vec![]);
    }

    fn shape(&mut self, shape: &ShapeOp) {
        let Frame { x, y, w, h } = shape.frame;
        let (left, top, width, height) = (self.x(x), self.y(y), w * PT_PER_INCH, h * PT_PER_INCH);
        let bottom = top - height;

        match shape.shape {
            ShapeKind::Rect => self.op("re", vec![left.into(), bottom.into(), width.into(), height.into()]),
            ShapeKind::RoundedRect => {
                let r = width.min(height) * 0.15;
                let k = r * KAPPA;
                let right = left + width;
                self.move_to(left + r, bottom);
                self.line_to(right - r, bottom);
                self.curve_to([right - r + k, bottom, right, bottom + r - k, right, bottom + r]);
                self.line_to(right, top - r);
                self.curve_to([right, top - r + k, right - r + k, top, right - r, top]);
                self.line_to(left + r, top);
                self.curve_to([left + r - k, top, left, top - r + k, left, top - r]);
                self.line_to(left, bottom + r);
                self.curve_to([left, bottom + r - k, left + r - k, bottom, left + r, bottom]);
                self.op("h", vec![]);
            }
            ShapeKind::Ellipse => {
                let (rx, ry) = (width / 2.0, height / 2.0);
                let (cx, cy) = (left + rx, bottom + ry);
                let (kx, ky) = (rx * KAPPA, ry * KAPPA);
                self.move_to(cx + rx, cy);
                self.curve_to([cx + rx, cy + ky, cx + kx, cy + ry, cx, cy + ry]);
                self.curve_to([cx - kx, cy + ry, cx - rx, cy + ky, cx - rx, cy]);
                self.curve_to([cx - rx, cy - ky, cx - kx, cy - ry, cx, cy - ry]);
                self.curve_to([cx + kx, cy - ry, cx + rx, cy - ky, cx + rx, cy]);
                self.op("h", vec![]);
            }
            ShapeKind::Line => {
                self.move_to(left, top);
                self.line_to(left + width, top - height);
            }
        }

        let is_line = shape.shape == ShapeKind::Line;
        let fill = shape.fill.as_ref().filter(|_| !is_line);
        let stroke = match (&shape.stroke, is_line) {
            (Some(stroke), _) => Some(stroke.clone()),
            (None, true) => shape.fill.clone(),
            (None, false) => None,
        };
        if let Some(fill) = fill {
            self.fill_color(fill);
        }
        if let Some(stroke) = &stroke {
            self.stroke_color(stroke);
            self.op("w", vec![shape.stroke_width.into()]);
        }
        let paint = match (fill.is_some(), stroke.is_some()) {
            (true, true) => "B",
            (true, false) => "f",
            (false, true) => "S",
            (false, false) => "n",
        };
        self.op(paint, vec![]);
    }

    fn connector(&mut self, connector: &ConnectorOp) {
        let (x1, y1) = (self.x(connector.from.x), self.y(connector.from.y));
        let (x2, y2) = (self.x(connector.to.x), self.y(connector.to.y));
        self.stroke_color(&connector.color);
        self.fill_color(&connector.color);
        self.op("w", vec![connector.width.into()]);
        self.move_to(x1, y1);
        self.line_to(x2, y2);
        self.op("S", vec![]);

        match connector.head {
            ArrowHead::None => {}
            ArrowHead::End => self.arrow_head((x1, y1), (x2, y2), connector.width),
            ArrowHead::Both => {
                self.arrow_head((x1, y1), (x2, y2), connector.width);
                self.arrow_head((x2, y2), (x1, y1), connector.width);
            }
        }
    }

    /// Filled triangle at `tip`, pointing away from `tail`.
    fn arrow_head(&mut self, tail: (f64, f64), tip: (f64, f64), width: f64) {
        let (dx, dy) = (tip.0 - tail.0, tip.1 - tail.1);
        let len = (dx * dx + dy * dy).sqrt();
        if len == 0.0 {
            return;
        }
        let (ux, uy) = (dx / len, dy / len);
        let size = (width * 4.0).max(6.0);
        let (bx, by) = (tip.0 - ux * size, tip.1 - uy * size);
        let (px, py) = (-uy * size * 0.5, ux * size * 0.5);
        self.move_to(tip.0, tip.1);
        self.line_to(bx + px, by + py);
        self.line_to(bx - px, by - py);
        self.op("h", vec![]);
        self.op("f", vec![]);
    }

    fn text(&mut self, block: &TextBlock) {
        let family = Family::of(&block.font_face);
        let size = block.font_size;
        let advance = family.average_width(block.bold) * size;
        let frame = block.frame;
        let width = frame.w * PT_PER_INCH;
        let lines = wrap(&block.text, width, advance);
        let leading = size * LINE_SPACING;
        let block_height = leading * lines.len() as f64;
        let frame_height = frame.h * PT_PER_INCH;

        let top = self.y(frame.y);
        let first_baseline = match block.valign {
            VAlign::Top => top - size,
            VAlign::Middle => top - (frame_height - block_height) / 2.0 - size,
            VAlign::Bottom => top - frame_height + block_height - size,
        };

        self.fill_color(&block.color);
        self.op("BT", vec![]);
        self.op("Tf", vec![Object::Name(family.resource_name(block.bold, block.italic).into_bytes()), size.into()]);
        for (i, line) in lines.iter().enumerate() {
            let line_width = line.chars().count() as f64 * advance;
            let left = self.x(frame.x);
            let x = match block.align {
                HAlign::Left => left,
                HAlign::Center => left + (width - line_width) / 2.0,
                HAlign::Right => left + width - line_width,
            };
            let y = first_baseline - leading * i as f64;
            self.op("Tm", vec![1.0.into(), 0.0.into(), 0.0.into(), 1.0.into(), x.into(), y.into()]);
            self.op("Tj", vec![Object::String(win_ansi(line), StringFormat::Literal)]);
        }
        self.op("ET", vec![]);
    }

    fn image(&mut self, name: &str, frame: Frame, aspect: f64) {
        let (mut w, mut h) = (frame.w * PT_PER_INCH, frame.h * PT_PER_INCH);
        if aspect > 0.0 {
            if w / h > aspect {
                w = h * aspect;
            } else {
                h = w / aspect;
            }
        }
        let left = self.x(frame.x) + (frame.w * PT_PER_INCH - w);
        let bottom = self.y(frame.y) - h;
        self.op("q", vec![]);
        self.op("cm", vec![w.into(), 0.0.into(), 0.0.into(), h.into(), left.into(), bottom.into()]);
        self.op("Do", vec![Object::Name(name.as_bytes().to_vec())]);
        self.op("Q", vec![]);
    }

    fn encode(self) -> Result<Vec<u8>, PdfError> {
        Content { operations: self.ops }.encode().map_err(|e| PdfError::Encode(e.to_string()))
    }
}

/// Greedy word wrap by estimated width. Explicit newlines always break.
fn wrap(text: &str, width: f64, advance: f64) -> Vec<String> {
    let max_chars = if advance > 0.0 { ((width / advance).floor() as usize).max(1) } else { usize::MAX };
    let mut lines = Vec::new();
    for paragraph in text.split('\n') {
        let mut line = String::new();
        for word in paragraph.split_whitespace() {
            let needed = if line.is_empty() { word.chars().count() } else { line.chars().count() + 1 + word.chars().count() };
            if needed > max_chars && !line.is_empty() {
                lines.push(std::mem::take(&mut line));
            }
            if !line.is_empty() {
                line.push(' ');
            }
            line.push_str(word);
        }
        lines.push(line);
    }
    lines
}

struct LogoImage {
    id: ObjectId,
    aspect: f64,
}

fn embed_logo(doc: &mut LoDocument, bytes: &[u8]) -> Result<LogoImage, PdfError> {
    let decoded = image::load_from_memory(bytes).map_err(|e| PdfError::Logo(e.to_string()))?;
    let rgba = decoded.to_rgba8();
    let (width, height) = rgba.dimensions();

    let mut rgb = Vec::with_capacity((width * height * 3) as usize);
    let mut alpha = Vec::with_capacity((width * height) as usize);
    for pixel in rgba.pixels() {
        rgb.extend_from_slice(&pixel.0[..3]);
        alpha.push(pixel.0[3]);
    }

    let mut image = dictionary! {
        "Type" => "XObject",
        "Subtype" => "Image",
        "Width" => width as i64,
        "Height" => height as i64,
        "ColorSpace" => "DeviceRGB",
        "BitsPerComponent" => 8,
    };
    if alpha.iter().any(|a| *a != u8::MAX) {
        let mask_id = doc.add_object(Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => width as i64,
                "Height" => height as i64,
                "ColorSpace" => "DeviceGray",
                "BitsPerComponent" => 8,
            },
            alpha,
        ));
        image.set("SMask", mask_id);
    }
    let id = doc.add_object(Stream::new(image, rgb));
    let aspect = if height == 0 { 0.0 } else { width as f64 / height as f64 };
    Ok(LogoImage { id, aspect })
}

fn render_page(page: &Page, width: f64, height: f64, logo: Option<&LogoImage>) -> Result<Vec<u8>, PdfError> {
    let mut painter = Painter::new(height);
    painter.background(&page.background, width);
    for op in &page.ops {
        painter.draw(op);
    }
    if let (Some(frame), Some(logo)) = (page.logo, logo) {
        painter.image("Logo", frame, logo.aspect);
    }
    painter.encode()
}

/// Serialize `document` to PDF bytes.
pub fn write_pdf(document: &Document) -> Result<Vec<u8>, PdfError> {
    let width = document.canvas.width * PT_PER_INCH;
    let height = document.canvas.height * PT_PER_INCH;

    let mut doc = LoDocument::with_version("1.5");
    let pages_id = doc.new_object_id();

    let mut fonts = lopdf::Dictionary::new();
    for family in Family::ALL {
        for (bold, italic) in [(false, false), (false, true), (true, false), (true, true)] {
            let font_id = doc.add_object(dictionary! {
                "Type" => "Font",
                "Subtype" => "Type1",
                "BaseFont" => family.base_font(bold, italic),
                "Encoding" => "WinAnsiEncoding",
            });
            fonts.set(family.resource_name(bold, italic), font_id);
        }
    }

    let wants_logo = document.pages.iter().any(|p| p.logo.is_some());
    let logo = match (&document.theme.logo, wants_logo) {
        (Some(logo), true) => {
            let bytes = logo.decode().map_err(|e| PdfError::Logo(e.to_string()))?;
            Some(embed_logo(&mut doc, &bytes)?)
        }
        _ => None,
    };

    let mut resources = dictionary! { "Font" => fonts };
    if let Some(logo) = &logo {
        resources.set("XObject", dictionary! { "Logo" => logo.id });
    }
    let resources_id = doc.add_object(resources);

    let mut kids = Vec::with_capacity(document.pages.len());
    for page in &document.pages {
        let content = render_page(page, width, height, logo.as_ref())?;
        let content_id = doc.add_object(Stream::new(dictionary! {}, content));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => resources_id,
            "MediaBox" => vec![0.0.into(), 0.0.into(), width.into(), height.into()],
        });
        kids.push(Object::Reference(page_id));
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
        }),
    );

    let meta = &document.metadata;
    let info_id = doc.add_object(dictionary! {
        "Title" => Object::string_literal(meta.title.as_str()),
        "Author" => Object::string_literal(meta.author.as_str()),
        "Producer" => Object::string_literal(meta.producer.as_str()),
        "Subject" => Object::string_literal(meta.subject.as_str()),
        "CreationDate" => Object::string_literal(meta.created_at.format("D:%Y%m%d%H%M%SZ").to_string()),
    });
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    doc.trailer.set("Info", info_id);
    doc.compress();

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).map_err(|e| PdfError::Write(e.to_string()))?;
    tracing::debug!(pages = document.pages.len(), bytes = bytes.len(), "pdf written");
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_faces_to_base_fonts() {
        assert_eq!(Family::of("Arial"), Family::Helvetica);
        assert_eq!(Family::of("Georgia"), Family::Times);
        assert_eq!(Family::of("Open Sans"), Family::Helvetica);
        assert_eq!(Family::of("JetBrains Mono"), Family::Courier);
        assert_eq!(Family::Times.base_font(true, true), "Times-BoldItalic");
        assert_eq!(Family::Helvetica.resource_name(false, false), "F1");
        assert_eq!(Family::Courier.resource_name(true, true), "F12");
    }

    #[test]
    fn encodes_win_ansi() {
        assert_eq!(win_ansi("A•“x”—é"), vec![b'A', 0x95, 0x93, b'x', 0x94, 0x97, 0xE9]);
        assert_eq!(win_ansi("→"), vec![b'?']);
    }

    #[test]
    fn wraps_on_width_and_newlines() {
        let lines = wrap("one two three\nfour", 50.0, 5.0);
        assert_eq!(lines, vec!["one two", "three", "four"]);
        assert_eq!(wrap("", 50.0, 5.0), vec![""]);
    }
}
