//! Render Programs - Declarative Draw-Instruction Lists
//!
//! A render program is data. It names exactly three inputs (`canvas`,
//! `data`, `theme`) and can only emit text, shapes and connectors. The
//! executor interprets it; nothing here can reach the host.
//!
//! Expressions are written as JSON literals or single-key call objects:
//!
//! ```json
//! { "op": "text", "text": { "var": "data.title" },
//!   "x": 0.5, "y": { "add": [1.5, { "mul": [{ "var": "i" }, 0.8] }] },
//!   "w": 9, "h": 1, "fontSize": 44, "bold": true, "face": "heading" }
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::draw::{ArrowHead, HAlign, ShapeKind, VAlign};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RenderProgram {
    #[serde(default)]
    pub body: Vec<Instruction>,
}

impl RenderProgram {
    pub fn new(body: Vec<Instruction>) -> Self {
        Self { body }
    }

    /// Top-level `data` keys the program reads through `var` paths.
    pub fn referenced_data_keys(&self) -> BTreeSet<String> {
        let mut keys = BTreeSet::new();
        for instruction in &self.body {
            instruction.visit_exprs(&mut |expr| expr.collect_data_keys(&mut keys));
        }
        keys
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Instruction {
    Let {
        name: String,
        value: Expr,
    },
    #[serde(rename_all = "camelCase")]
    Text {
        text: Expr,
        x: Expr,
        y: Expr,
        w: Expr,
        h: Expr,
        #[serde(default = "default_font_size")]
        font_size: Expr,
        #[serde(default)]
        bold: bool,
        #[serde(default)]
        italic: bool,
        #[serde(default)]
        face: FontRole,
        /// Defaults to `theme.colors.text`.
        #[serde(default)]
        color: Option<Expr>,
        #[serde(default)]
        align: HAlign,
        #[serde(default)]
        valign: VAlign,
    },
    #[serde(rename_all = "camelCase")]
    Shape {
        shape: ShapeKind,
        x: Expr,
        y: Expr,
        w: Expr,
        h: Expr,
        #[serde(default)]
        fill: Option<Expr>,
        #[serde(default)]
        stroke: Option<Expr>,
        #[serde(default)]
        stroke_width: Option<Expr>,
    },
    Connector {
        from: [Expr; 2],
        to: [Expr; 2],
        #[serde(default)]
        head: ArrowHead,
        /// Defaults to `theme.colors.text`.
        #[serde(default)]
        color: Option<Expr>,
        #[serde(default)]
        width: Option<Expr>,
    },
    If {
        cond: Expr,
        #[serde(default)]
        then: Vec<Instruction>,
        #[serde(default, rename = "else")]
        otherwise: Vec<Instruction>,
    },
    Each {
        over: Expr,
        #[serde(rename = "as")]
        binding: String,
        #[serde(default)]
        index: Option<String>,
        body: Vec<Instruction>,
    },
}

fn default_font_size() -> Expr { Expr::Num(14.0) }

impl Instruction {
    fn visit_exprs(&self, f: &mut dyn FnMut(&Expr)) {
        match self {
            Instruction::Let { value, .. } => f(value),
            Instruction::Text { text, x, y, w, h, font_size, color, .. } => {
                for e in [text, x, y, w, h, font_size] {
                    f(e);
                }
                if let Some(c) = color {
                    f(c);
                }
            }
            Instruction::Shape { x, y, w, h, fill, stroke, stroke_width, .. } => {
                for e in [x, y, w, h] {
                    f(e);
                }
                for e in [fill, stroke, stroke_width].into_iter().flatten() {
                    f(e);
                }
            }
            Instruction::Connector { from, to, color, width, .. } => {
                for e in from.iter().chain(to.iter()) {
                    f(e);
                }
                for e in [color, width].into_iter().flatten() {
                    f(e);
                }
            }
            Instruction::If { cond, then, otherwise } => {
                f(cond);
                for i in then.iter().chain(otherwise.iter()) {
                    i.visit_exprs(f);
                }
            }
            Instruction::Each { over, body, .. } => {
                f(over);
                for i in body {
                    i.visit_exprs(f);
                }
            }
        }
    }
}

/// Which theme font a text block uses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FontRole {
    Heading,
    #[default]
    Body,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Expr {
    Num(f64),
    Bool(bool),
    Str(String),
    Call(Box<Call>),
}

impl Expr {
    pub fn var(path: &str) -> Self {
        Expr::Call(Box::new(Call::Var(path.to_string())))
    }

    fn children(&self) -> Vec<&Expr> {
        let Expr::Call(call) = self else {
            return vec![];
        };
        match call.as_ref() {
            Call::Var(_) => vec![],
            Call::Add(a, b)
            | Call::Sub(a, b)
            | Call::Mul(a, b)
            | Call::Div(a, b)
            | Call::Mod(a, b)
            | Call::Eq(a, b)
            | Call::Ne(a, b)
            | Call::Lt(a, b)
            | Call::Le(a, b)
            | Call::Gt(a, b)
            | Call::Ge(a, b)
            | Call::Default(a, b)
            | Call::At(a, b)
            | Call::Take(a, b)
            | Call::Contains(a, b) => vec![a, b],
            Call::DivOr(a, b, c) | Call::Cond(a, b, c) => vec![a, b, c],
            Call::Neg(a)
            | Call::Abs(a)
            | Call::Floor(a)
            | Call::Ceil(a)
            | Call::Sqrt(a)
            | Call::Len(a)
            | Call::Not(a)
            | Call::Exists(a)
            | Call::Str(a)
            | Call::Get(a, _)
            | Call::MaxOf(a, _) => vec![a],
            Call::Min(xs) | Call::Max(xs) | Call::And(xs) | Call::Or(xs) | Call::Concat(xs) | Call::List(xs) => {
                xs.iter().collect()
            }
            Call::Join(sep, xs) => std::iter::once(sep).chain(xs.iter()).collect(),
        }
    }

    fn collect_data_keys(&self, keys: &mut BTreeSet<String>) {
        if let Expr::Call(call) = self {
            if let Call::Var(path) = call.as_ref() {
                let mut segments = path.split('.');
                if segments.next() == Some("data") {
                    if let Some(key) = segments.next() {
                        keys.insert(key.to_string());
                    }
                }
            }
        }
        for child in self.children() {
            child.collect_data_keys(keys);
        }
    }
}

impl From<f64> for Expr {
    fn from(n: f64) -> Self {
        Expr::Num(n)
    }
}

impl From<&str> for Expr {
    fn from(s: &str) -> Self {
        Expr::Str(s.to_string())
    }
}

/// Every operation a program may call. There is no escape hatch: a
/// capability that is not listed here does not exist.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Call {
    /// Dotted path rooted at a local binding, `canvas`, `data` or `theme`.
    Var(String),
    Add(Expr, Expr),
    Sub(Expr, Expr),
    Mul(Expr, Expr),
    Div(Expr, Expr),
    /// Division that yields the third operand when the divisor is zero.
    DivOr(Expr, Expr, Expr),
    Mod(Expr, Expr),
    Neg(Expr),
    Abs(Expr),
    Floor(Expr),
    Ceil(Expr),
    Sqrt(Expr),
    Min(Vec<Expr>),
    Max(Vec<Expr>),
    Len(Expr),
    At(Expr, Expr),
    Get(Expr, String),
    Take(Expr, Expr),
    /// Largest numeric value of `field` across an array of records.
    MaxOf(Expr, String),
    List(Vec<Expr>),
    Eq(Expr, Expr),
    Ne(Expr, Expr),
    Lt(Expr, Expr),
    Le(Expr, Expr),
    Gt(Expr, Expr),
    Ge(Expr, Expr),
    Not(Expr),
    /// True unless the operand is null or absent.
    Exists(Expr),
    And(Vec<Expr>),
    Or(Vec<Expr>),
    Cond(Expr, Expr, Expr),
    /// First operand unless it is null or absent.
    Default(Expr, Expr),
    Concat(Vec<Expr>),
    Str(Expr),
    Contains(Expr, Expr),
    /// Join the non-empty operands with a separator.
    Join(Expr, Vec<Expr>),
}
