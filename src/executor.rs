//! Template Executor - Sandboxed Render-Program Interpreter
//!
//! CRITICAL: render_page MUST validate the payload before executing. A
//! blueprint may be replayed against a registry that has since changed.
//!
//! The interpreter is pure: it reads `canvas`, `data` and `theme`, keeps its
//! own local bindings, and returns draw operations. Every run is bounded by
//! [`ExecutionLimits`].

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

use crate::draw::{
    failure_marker, Canvas, Color, ConnectorOp, DrawOp, Frame, Page, PageStatus, Point, ShapeOp,
    TextBlock,
};
use crate::hashing::compute_render_key;
use crate::program::{Call, Expr, FontRole, Instruction, RenderProgram};
use crate::schema::{DataSchema, SchemaValidator};
use crate::theme::Theme;
use crate::ENGINE_VERSION;

#[cfg(feature = "test-hooks")]
use std::sync::atomic::{AtomicU32, Ordering};

#[cfg(feature = "test-hooks")]
static VALIDATION_CALL_COUNT: AtomicU32 = AtomicU32::new(0);

#[cfg(feature = "test-hooks")]
pub fn get_validation_call_count() -> u32 {
    VALIDATION_CALL_COUNT.load(Ordering::SeqCst)
}

#[cfg(feature = "test-hooks")]
pub fn reset_validation_call_count() {
    VALIDATION_CALL_COUNT.store(0, Ordering::SeqCst);
}

const ROOTS: [&str; 3] = ["canvas", "data", "theme"];

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ExecutionError {
    #[error("Unknown variable: {0}")]
    UnknownVariable(String),

    #[error("Cannot bind reserved or malformed name: {0}")]
    InvalidBinding(String),

    #[error("Type error in {op}: expected {expected}, found {found}")]
    Type {
        op: &'static str,
        expected: &'static str,
        found: &'static str,
    },

    #[error("Division by zero")]
    DivisionByZero,

    #[error("Non-finite result in {0}")]
    NonFinite(&'static str),

    #[error("Invalid color: {0}")]
    InvalidColor(String),

    #[error("Negative {0} in frame")]
    NegativeExtent(&'static str),

    #[error("Step budget of {0} exceeded")]
    StepBudget(usize),

    #[error("Draw budget of {0} operations exceeded")]
    DrawBudget(usize),

    #[error("Loop over {0} items exceeds the limit of {1}")]
    LoopLimit(usize, usize),

    #[error("Nesting deeper than {0}")]
    TooDeep(usize),

    #[error("Value larger than {0} bytes")]
    ValueBudget(usize),

    #[error("Payload rejected: {0}")]
    InvalidPayload(String),

    #[error("Component requires engine >= {required}, current is {current}")]
    EngineVersionMismatch { required: String, current: String },

    #[error("Invalid engine version requirement: {0}")]
    InvalidVersion(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionLimits {
    pub max_steps: usize,
    pub max_draw_ops: usize,
    pub max_loop_items: usize,
    pub max_depth: usize,
    /// Upper bound on any string or list a program builds.
    pub max_value_bytes: usize,
}

impl Default for ExecutionLimits {
    fn default() -> Self {
        Self {
            max_steps: 20_000,
            max_draw_ops: 2_000,
            max_loop_items: 256,
            max_depth: 48,
            max_value_bytes: 1 << 20,
        }
    }
}

/// Everything needed to render one blueprint entry.
#[derive(Debug, Clone, Copy)]
pub struct PageSpec<'a> {
    pub position: usize,
    pub component_id: &'a str,
    pub program: &'a RenderProgram,
    pub schema: &'a DataSchema,
    pub engine_min_version: &'a str,
    pub data: &'a Value,
}

pub struct Executor {
    canvas: Canvas,
    limits: ExecutionLimits,
    validator: SchemaValidator,
}

impl Executor {
    pub fn new(limits: ExecutionLimits) -> Self {
        Self {
            canvas: Canvas::SLIDE,
            limits,
            validator: SchemaValidator::lenient(),
        }
    }

    pub fn canvas(&self) -> Canvas {
        self.canvas
    }

    pub fn limits(&self) -> ExecutionLimits {
        self.limits
    }

    /// Run a program and return its draw operations.
    pub fn execute(
        &self,
        program: &RenderProgram,
        data: &Value,
        theme: &Theme,
    ) -> Result<Vec<DrawOp>, ExecutionError> {
        let canvas = json!({ "width": self.canvas.width, "height": self.canvas.height });
        let theme_value = theme.to_program_value();
        let mut run = Run {
            limits: self.limits,
            theme,
            canvas: &canvas,
            data,
            theme_value: &theme_value,
            scopes: vec![Vec::new()],
            steps: 0,
            ops: Vec::new(),
        };
        run.block(&program.body, 0)?;
        Ok(run.ops)
    }

    /// Validate, execute and wrap one page. Never fails: any error becomes
    /// the render-failure marker.
    pub fn render_page(&self, spec: PageSpec<'_>, theme: &Theme) -> Page {
        let render_key = compute_render_key(spec.program, spec.data, theme, ENGINE_VERSION)
            .unwrap_or_default();

        let result = self
            .check_engine_version(spec.engine_min_version)
            .and_then(|_| self.check_payload(spec.data, spec.schema))
            .and_then(|_| self.execute(spec.program, spec.data, theme));

        match result {
            Ok(ops) => {
                tracing::debug!(position = spec.position, component = spec.component_id, %render_key, ops = ops.len(), "page rendered");
                Page {
                    position: spec.position,
                    component_id: spec.component_id.to_string(),
                    background: theme.colors.background.clone(),
                    ops,
                    logo: None,
                    status: PageStatus::Rendered,
                    render_key,
                }
            }
            Err(e) => {
                tracing::warn!(position = spec.position, component = spec.component_id, error = %e, "page render failed, substituting placeholder");
                Page {
                    position: spec.position,
                    component_id: spec.component_id.to_string(),
                    background: theme.colors.background.clone(),
                    ops: failure_marker(&theme.fonts.body),
                    logo: None,
                    status: PageStatus::Placeholder { reason: e.to_string() },
                    render_key,
                }
            }
        }
    }

    fn check_payload(&self, data: &Value, schema: &DataSchema) -> Result<(), ExecutionError> {
        #[cfg(feature = "test-hooks")]
        VALIDATION_CALL_COUNT.fetch_add(1, Ordering::SeqCst);

        let report = self.validator.validate(data, schema);
        if report.valid {
            Ok(())
        } else {
            Err(ExecutionError::InvalidPayload(report.summary()))
        }
    }

    fn check_engine_version(&self, required: &str) -> Result<(), ExecutionError> {
        let engine_ver = semver::Version::parse(ENGINE_VERSION)
            .map_err(|_| ExecutionError::InvalidVersion(ENGINE_VERSION.to_string()))?;
        let min_ver = semver::Version::parse(required)
            .map_err(|_| ExecutionError::InvalidVersion(required.to_string()))?;

        if engine_ver < min_ver {
            return Err(ExecutionError::EngineVersionMismatch {
                required: required.to_string(),
                current: ENGINE_VERSION.to_string(),
            });
        }

        Ok(())
    }
}

impl Default for Executor {
    fn default() -> Self {
        Self::new(ExecutionLimits::default())
    }
}

/// State of a single program run.
struct Run<'a> {
    limits: ExecutionLimits,
    theme: &'a Theme,
    canvas: &'a Value,
    data: &'a Value,
    theme_value: &'a Value,
    scopes: Vec<Vec<(String, Value)>>,
    steps: usize,
    ops: Vec<DrawOp>,
}

impl<'a> Run<'a> {
    fn tick(&mut self, depth: usize) -> Result<(), ExecutionError> {
        self.steps += 1;
        if self.steps > self.limits.max_steps {
            return Err(ExecutionError::StepBudget(self.limits.max_steps));
        }
        if depth > self.limits.max_depth {
            return Err(ExecutionError::TooDeep(self.limits.max_depth));
        }
        Ok(())
    }

    fn emit(&mut self, op: DrawOp) -> Result<(), ExecutionError> {
        if self.ops.len() >= self.limits.max_draw_ops {
            return Err(ExecutionError::DrawBudget(self.limits.max_draw_ops));
        }
        self.ops.push(op);
        Ok(())
    }

    fn fits(&self, size: usize) -> Result<(), ExecutionError> {
        if size > self.limits.max_value_bytes {
            return Err(ExecutionError::ValueBudget(self.limits.max_value_bytes));
        }
        Ok(())
    }

    fn bind(&mut self, name: &str, value: Value) -> Result<(), ExecutionError> {
        if name.is_empty() || name.contains('.') || ROOTS.contains(&name) {
            return Err(ExecutionError::InvalidBinding(name.to_string()));
        }
        let scope = self.scopes.last_mut().ok_or(ExecutionError::TooDeep(0))?;
        match scope.iter_mut().find(|(n, _)| n == name) {
            Some(slot) => slot.1 = value,
            None => scope.push((name.to_string(), value)),
        }
        Ok(())
    }

    fn scoped(&mut self, body: &[Instruction], depth: usize, bindings: Vec<(String, Value)>) -> Result<(), ExecutionError> {
        self.scopes.push(Vec::new());
        let result = self.bind_all(bindings).and_then(|_| self.block(body, depth));
        self.scopes.pop();
        result
    }

    fn bind_all(&mut self, bindings: Vec<(String, Value)>) -> Result<(), ExecutionError> {
        for (name, value) in bindings {
            self.bind(&name, value)?;
        }
        Ok(())
    }

    fn block(&mut self, body: &[Instruction], depth: usize) -> Result<(), ExecutionError> {
        for instruction in body {
            self.tick(depth)?;
            self.instruction(instruction, depth)?;
        }
        Ok(())
    }

    fn instruction(&mut self, instruction: &Instruction, depth: usize) -> Result<(), ExecutionError> {
        match instruction {
            Instruction::Let { name, value } => {
                let v = self.eval(value, depth + 1)?;
                self.bind(name, v)
            }
            Instruction::Text { text, x, y, w, h, font_size, bold, italic, face, color, align, valign } => {
                let text = text_of(&self.eval(text, depth + 1)?, "text")?;
                let frame = self.frame([x, y, w, h], depth)?;
                let font_size = self.number(font_size, depth, "fontSize")?;
                if font_size <= 0.0 {
                    return Err(ExecutionError::NegativeExtent("fontSize"));
                }
                let color = match color {
                    Some(c) => self.color(c, depth)?.unwrap_or_else(|| self.theme.colors.text.clone()),
                    None => self.theme.colors.text.clone(),
                };
                let font_face = match face {
                    FontRole::Heading => self.theme.fonts.heading.clone(),
                    FontRole::Body => self.theme.fonts.body.clone(),
                };
                self.emit(DrawOp::Text(TextBlock {
                    frame,
                    text,
                    font_face,
                    font_size,
                    bold: *bold,
                    italic: *italic,
                    color,
                    align: *align,
                    valign: *valign,
                }))
            }
            Instruction::Shape { shape, x, y, w, h, fill, stroke, stroke_width } => {
                let frame = self.frame([x, y, w, h], depth)?;
                let fill = match fill {
                    Some(c) => self.color(c, depth)?,
                    None => None,
                };
                let stroke = match stroke {
                    Some(c) => self.color(c, depth)?,
                    None => None,
                };
                let stroke_width = match stroke_width {
                    Some(e) => self.number(e, depth, "strokeWidth")?.max(0.0),
                    None => 1.0,
                };
                self.emit(DrawOp::Shape(ShapeOp { shape: *shape, frame, fill, stroke, stroke_width }))
            }
            Instruction::Connector { from, to, head, color, width } => {
                let from = Point {
                    x: self.number(&from[0], depth, "connector")?,
                    y: self.number(&from[1], depth, "connector")?,
                };
                let to = Point {
                    x: self.number(&to[0], depth, "connector")?,
                    y: self.number(&to[1], depth, "connector")?,
                };
                let color = match color {
                    Some(c) => self.color(c, depth)?.unwrap_or_else(|| self.theme.colors.text.clone()),
                    None => self.theme.colors.text.clone(),
                };
                let width = match width {
                    Some(e) => self.number(e, depth, "connector")?.max(0.0),
                    None => 1.5,
                };
                self.emit(DrawOp::Connector(ConnectorOp { from, to, color, width, head: *head }))
            }
            Instruction::If { cond, then, otherwise } => {
                let branch = if truthy(&self.eval(cond, depth + 1)?) { then } else { otherwise };
                self.scoped(branch, depth + 1, Vec::new())
            }
            Instruction::Each { over, binding, index, body } => {
                let items = match self.eval(over, depth + 1)? {
                    Value::Array(items) => items,
                    other => {
                        return Err(ExecutionError::Type { op: "each", expected: "array", found: type_name(&other) })
                    }
                };
                if items.len() > self.limits.max_loop_items {
                    return Err(ExecutionError::LoopLimit(items.len(), self.limits.max_loop_items));
                }
                for (i, item) in items.into_iter().enumerate() {
                    let mut bindings = vec![(binding.clone(), item)];
                    if let Some(index) = index {
                        bindings.push((index.clone(), json!(i)));
                    }
                    self.scoped(body, depth + 1, bindings)?;
                }
                Ok(())
            }
        }
    }

    fn frame(&mut self, parts: [&Expr; 4], depth: usize) -> Result<Frame, ExecutionError> {
        let [x, y, w, h] = parts;
        let frame = Frame {
            x: self.number(x, depth, "x")?,
            y: self.number(y, depth, "y")?,
            w: self.number(w, depth, "w")?,
            h: self.number(h, depth, "h")?,
        };
        if frame.w < 0.0 {
            return Err(ExecutionError::NegativeExtent("width"));
        }
        if frame.h < 0.0 {
            return Err(ExecutionError::NegativeExtent("height"));
        }
        Ok(frame)
    }

    fn number(&mut self, expr: &Expr, depth: usize, op: &'static str) -> Result<f64, ExecutionError> {
        let v = self.eval(expr, depth + 1)?;
        num(&v, op)
    }

    /// `null` means "no color"; anything else must be a hex string.
    fn color(&mut self, expr: &Expr, depth: usize) -> Result<Option<Color>, ExecutionError> {
        match self.eval(expr, depth + 1)? {
            Value::Null => Ok(None),
            Value::String(s) => Color::parse(&s).map(Some).ok_or(ExecutionError::InvalidColor(s)),
            other => Err(ExecutionError::Type { op: "color", expected: "string", found: type_name(&other) }),
        }
    }

    fn lookup(&self, path: &str) -> Result<Value, ExecutionError> {
        let mut segments = path.split('.');
        let head = segments.next().unwrap_or_default();

        let local = self
            .scopes
            .iter()
            .rev()
            .find_map(|scope| scope.iter().rev().find(|(n, _)| n == head).map(|(_, v)| v));
        let root = match (local, head) {
            (Some(v), _) => v,
            (None, "canvas") => self.canvas,
            (None, "data") => self.data,
            (None, "theme") => self.theme_value,
            (None, _) => return Err(ExecutionError::UnknownVariable(path.to_string())),
        };

        let mut current = root;
        for segment in segments {
            let next = match current {
                Value::Object(map) => map.get(segment),
                Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
                _ => None,
            };
            match next {
                Some(v) => current = v,
                None => return Ok(Value::Null),
            }
        }
        Ok(current.clone())
    }

    fn eval(&mut self, expr: &Expr, depth: usize) -> Result<Value, ExecutionError> {
        self.tick(depth)?;
        let call = match expr {
            Expr::Num(n) => return make_num(*n, "literal"),
            Expr::Bool(b) => return Ok(Value::Bool(*b)),
            Expr::Str(s) => return Ok(Value::String(s.clone())),
            Expr::Call(call) => call.as_ref(),
        };
        let d = depth + 1;

        match call {
            Call::Var(path) => self.lookup(path),
            Call::Add(a, b) => self.arith(a, b, d, "add", |x, y| Ok(x + y)),
            Call::Sub(a, b) => self.arith(a, b, d, "sub", |x, y| Ok(x - y)),
            Call::Mul(a, b) => self.arith(a, b, d, "mul", |x, y| Ok(x * y)),
            Call::Div(a, b) => self.arith(a, b, d, "div", |x, y| {
                if y == 0.0 { Err(ExecutionError::DivisionByZero) } else { Ok(x / y) }
            }),
            Call::Mod(a, b) => self.arith(a, b, d, "mod", |x, y| {
                if y == 0.0 { Err(ExecutionError::DivisionByZero) } else { Ok(x % y) }
            }),
            Call::DivOr(a, b, fallback) => {
                let x = self.number(a, d, "div_or")?;
                let y = self.number(b, d, "div_or")?;
                if y == 0.0 {
                    self.eval(fallback, d)
                } else {
                    make_num(x / y, "div_or")
                }
            }
            Call::Neg(a) => self.unary(a, d, "neg", |x| -x),
            Call::Abs(a) => self.unary(a, d, "abs", f64::abs),
            Call::Floor(a) => self.unary(a, d, "floor", f64::floor),
            Call::Ceil(a) => self.unary(a, d, "ceil", f64::ceil),
            Call::Sqrt(a) => self.unary(a, d, "sqrt", f64::sqrt),
            Call::Min(xs) => self.fold(xs, d, "min", f64::min),
            Call::Max(xs) => self.fold(xs, d, "max", f64::max),
            Call::Len(a) => {
                let n = match self.eval(a, d)? {
                    Value::Null => 0,
                    Value::Array(items) => items.len(),
                    Value::String(s) => s.chars().count(),
                    Value::Object(map) => map.len(),
                    other => return Err(ExecutionError::Type { op: "len", expected: "collection", found: type_name(&other) }),
                };
                Ok(json!(n))
            }
            Call::At(a, i) => {
                let items = self.eval(a, d)?;
                let index = self.number(i, d, "at")?;
                match items {
                    Value::Array(items) if index >= 0.0 && index.fract() == 0.0 => {
                        Ok(items.get(index as usize).cloned().unwrap_or(Value::Null))
                    }
                    Value::Array(_) | Value::Null => Ok(Value::Null),
                    other => Err(ExecutionError::Type { op: "at", expected: "array", found: type_name(&other) }),
                }
            }
            Call::Get(a, key) => match self.eval(a, d)? {
                Value::Object(map) => Ok(map.get(key).cloned().unwrap_or(Value::Null)),
                Value::Null => Ok(Value::Null),
                other => Err(ExecutionError::Type { op: "get", expected: "object", found: type_name(&other) }),
            },
            Call::Take(a, n) => {
                let items = self.eval(a, d)?;
                let n = self.number(n, d, "take")?.max(0.0) as usize;
                match items {
                    Value::Array(items) => Ok(Value::Array(items.into_iter().take(n).collect())),
                    Value::Null => Ok(Value::Array(Vec::new())),
                    other => Err(ExecutionError::Type { op: "take", expected: "array", found: type_name(&other) }),
                }
            }
            Call::MaxOf(a, field) => {
                let items = match self.eval(a, d)? {
                    Value::Array(items) => items,
                    other => return Err(ExecutionError::Type { op: "max_of", expected: "array", found: type_name(&other) }),
                };
                let mut best: Option<f64> = None;
                for item in &items {
                    let v = num(item.get(field).unwrap_or(&Value::Null), "max_of")?;
                    best = Some(best.map_or(v, |b| b.max(v)));
                }
                match best {
                    Some(v) => make_num(v, "max_of"),
                    None => Ok(Value::Null),
                }
            }
            Call::List(xs) => {
                let mut items = Vec::with_capacity(xs.len());
                let mut size = 0;
                for x in xs {
                    let item = self.eval(x, d)?;
                    size += value_size(&item, self.limits.max_value_bytes);
                    self.fits(size)?;
                    items.push(item);
                }
                Ok(Value::Array(items))
            }
            Call::Eq(a, b) => {
                let (x, y) = (self.eval(a, d)?, self.eval(b, d)?);
                Ok(Value::Bool(values_equal(&x, &y)))
            }
            Call::Ne(a, b) => {
                let (x, y) = (self.eval(a, d)?, self.eval(b, d)?);
                Ok(Value::Bool(!values_equal(&x, &y)))
            }
            Call::Lt(a, b) => self.compare(a, b, d, |o| o.is_lt()),
            Call::Le(a, b) => self.compare(a, b, d, |o| o.is_le()),
            Call::Gt(a, b) => self.compare(a, b, d, |o| o.is_gt()),
            Call::Ge(a, b) => self.compare(a, b, d, |o| o.is_ge()),
            Call::Not(a) => Ok(Value::Bool(!truthy(&self.eval(a, d)?))),
            Call::Exists(a) => Ok(Value::Bool(!self.eval(a, d)?.is_null())),
            Call::And(xs) => {
                for x in xs {
                    if !truthy(&self.eval(x, d)?) {
                        return Ok(Value::Bool(false));
                    }
                }
                Ok(Value::Bool(true))
            }
            Call::Or(xs) => {
                for x in xs {
                    if truthy(&self.eval(x, d)?) {
                        return Ok(Value::Bool(true));
                    }
                }
                Ok(Value::Bool(false))
            }
            Call::Cond(c, a, b) => {
                if truthy(&self.eval(c, d)?) {
                    self.eval(a, d)
                } else {
                    self.eval(b, d)
                }
            }
            Call::Default(a, b) => match self.eval(a, d)? {
                Value::Null => self.eval(b, d),
                v => Ok(v),
            },
            Call::Concat(xs) => {
                let mut out = String::new();
                for x in xs {
                    let part = text_of(&self.eval(x, d)?, "concat")?;
                    self.fits(out.len() + part.len())?;
                    out.push_str(&part);
                }
                Ok(Value::String(out))
            }
            Call::Str(a) => {
                let text = text_of(&self.eval(a, d)?, "str")?;
                self.fits(text.len())?;
                Ok(Value::String(text))
            }
            Call::Contains(hay, needle) => {
                let (hay, needle) = (self.eval(hay, d)?, self.eval(needle, d)?);
                let found = match (&hay, &needle) {
                    (Value::String(h), Value::String(n)) => h.contains(n.as_str()),
                    (Value::Array(items), n) => items.iter().any(|i| values_equal(i, n)),
                    (Value::Null, _) => false,
                    _ => return Err(ExecutionError::Type { op: "contains", expected: "string or array", found: type_name(&hay) }),
                };
                Ok(Value::Bool(found))
            }
            Call::Join(sep, xs) => {
                let sep = text_of(&self.eval(sep, d)?, "join")?;
                let mut parts = Vec::new();
                let mut size = 0;
                for x in xs {
                    match self.eval(x, d)? {
                        Value::Null => {}
                        v => {
                            let s = text_of(&v, "join")?;
                            if !s.is_empty() {
                                size += s.len() + sep.len();
                                self.fits(size)?;
                                parts.push(s);
                            }
                        }
                    }
                }
                Ok(Value::String(parts.join(&sep)))
            }
        }
    }

    fn arith(
        &mut self,
        a: &Expr,
        b: &Expr,
        depth: usize,
        op: &'static str,
        f: impl Fn(f64, f64) -> Result<f64, ExecutionError>,
    ) -> Result<Value, ExecutionError> {
        let x = self.number(a, depth, op)?;
        let y = self.number(b, depth, op)?;
        make_num(f(x, y)?, op)
    }

    fn unary(&mut self, a: &Expr, depth: usize, op: &'static str, f: impl Fn(f64) -> f64) -> Result<Value, ExecutionError> {
        let x = self.number(a, depth, op)?;
        make_num(f(x), op)
    }

    fn fold(&mut self, xs: &[Expr], depth: usize, op: &'static str, f: fn(f64, f64) -> f64) -> Result<Value, ExecutionError> {
        let mut acc: Option<f64> = None;
        for x in xs {
            let v = self.number(x, depth, op)?;
            acc = Some(acc.map_or(v, |a| f(a, v)));
        }
        match acc {
            Some(v) => make_num(v, op),
            None => Err(ExecutionError::Type { op, expected: "at least one number", found: "nothing" }),
        }
    }

    fn compare(
        &mut self,
        a: &Expr,
        b: &Expr,
        depth: usize,
        f: fn(std::cmp::Ordering) -> bool,
    ) -> Result<Value, ExecutionError> {
        let (x, y) = (self.eval(a, depth)?, self.eval(b, depth)?);
        let ordering = match (&x, &y) {
            (Value::String(l), Value::String(r)) => l.cmp(r),
            _ => {
                let (l, r) = (num(&x, "compare")?, num(&y, "compare")?);
                l.partial_cmp(&r).ok_or(ExecutionError::NonFinite("compare"))?
            }
        };
        Ok(Value::Bool(f(ordering)))
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn num(value: &Value, op: &'static str) -> Result<f64, ExecutionError> {
    value
        .as_f64()
        .ok_or(ExecutionError::Type { op, expected: "number", found: type_name(value) })
}

fn make_num(n: f64, op: &'static str) -> Result<Value, ExecutionError> {
    serde_json::Number::from_f64(n)
        .map(Value::Number)
        .ok_or(ExecutionError::NonFinite(op))
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map_or(false, |n| n != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

/// Approximate heap size of a value, saturating once `cap` is passed.
fn value_size(value: &Value, cap: usize) -> usize {
    match value {
        Value::Null | Value::Bool(_) | Value::Number(_) => 8,
        Value::String(s) => s.len(),
        Value::Array(items) => {
            let mut size = 8;
            for item in items {
                size += value_size(item, cap);
                if size > cap {
                    break;
                }
            }
            size
        }
        Value::Object(map) => {
            let mut size = 8;
            for (key, item) in map {
                size += key.len() + value_size(item, cap);
                if size > cap {
                    break;
                }
            }
            size
        }
    }
}

fn text_of(value: &Value, op: &'static str) -> Result<String, ExecutionError> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.as_f64().map(format_number).unwrap_or_else(|| n.to_string())),
        Value::Bool(b) => Ok(b.to_string()),
        other => Err(ExecutionError::Type { op, expected: "text", found: type_name(other) }),
    }
}
