//! DeckForge Core - Slide Deck Compiler
//!
//! # Ground Rules
//! 1. Components Are Contracts: a payload reaches a render program only
//!    after it passes the component's schema
//! 2. Programs Are Data: render programs are interpreted under hard budgets
//!    and can only emit text, shapes and connectors
//! 3. Failures Stay Local: a broken slide becomes a placeholder page
//! 4. Order Is Positional: pages follow blueprint positions, always
//! 5. Mappers Suggest, Engine Enforces

pub mod components;
pub mod schema;
pub mod program;
pub mod draw;
pub mod theme;
pub mod hashing;
pub mod executor;
pub mod registry;
pub mod library;
pub mod content;
pub mod parser;
pub mod mapper;
pub mod binder;
pub mod blueprint;
pub mod assembler;
pub mod compositor;
pub mod pdf;
pub mod sink;
pub mod config;
pub mod pipeline;

pub use components::{Category, Component, ComponentId, Origin};
pub use schema::{DataSchema, SchemaValidator, ValidationPolicy, ValidationReport, ViolationSeverity};
pub use program::{Call, Expr, Instruction, RenderProgram};
pub use draw::{Canvas, DrawOp, Page, PageStatus};
pub use theme::{BrandKit, Theme};
pub use hashing::{canonical_json, compute_manifest_hash, compute_render_key};
pub use executor::{ExecutionError, ExecutionLimits, Executor};
pub use registry::{ComponentFilter, ComponentRegistry, ComponentStore, MemoryStore, RegistryError};
pub use content::{DataPoint, GenerationParameters, ParsedContent, ParsedSection, SectionType};
pub use parser::{CapabilityError, ContentParser, HeuristicParser};
pub use mapper::{ContentMapper, DisabledMapper, MapperOutput};
pub use blueprint::{Blueprint, SlideBlueprintEntry};
pub use assembler::{Assembly, AssemblyError, AssemblyStrategy, AssemblyWarning, BlueprintAssembler};
pub use compositor::{CompositionError, Document, DocumentCompositor};
pub use sink::{ArtifactSink, FsSink, MemorySink};
pub use config::EngineConfig;
pub use pipeline::{BuildStatus, GenerationOutcome, GenerationPipeline, GenerationRequest, PipelineError};

pub const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");
/// Default `engineMinVersion` for components that do not declare one.
pub const MIN_COMPONENT_ENGINE: &str = "1.0.0";
