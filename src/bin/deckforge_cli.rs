//! DeckForge CLI
//!
//! Commands: components, validate, assemble, render, generate, seed
//! Outputs JSON to stdout, logs to stderr
//! Returns 2 on validation failure

use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use deckforge_core::{
    library, Blueprint, BlueprintAssembler, Category, ComponentFilter, ComponentRegistry, ContentParser,
    DocumentCompositor, EngineConfig, Executor, FsSink, GenerationParameters, GenerationPipeline,
    GenerationRequest, HeuristicParser, SchemaValidator, Theme,
};

#[derive(Parser)]
#[command(name = "deckforge-cli")]
#[command(about = "DeckForge CLI - Slide Deck Compiler")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Directory of additional USER component definitions
    #[arg(short, long)]
    components_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// List available components
    Components {
        /// Only this category (TITLE, DATA, ...)
        #[arg(long)]
        category: Option<String>,
    },

    /// Validate a payload against a component schema
    Validate {
        /// Component ID
        #[arg(short = 'i', long)]
        component: String,

        /// JSON payload
        #[arg(short, long)]
        payload: String,
    },

    /// Parse a text file and print the assembled blueprint
    Assemble {
        /// Source text file
        input: PathBuf,

        /// JSON GenerationParameters
        #[arg(long)]
        params: Option<String>,
    },

    /// Render a blueprint JSON file to PDF
    Render {
        /// Blueprint JSON file
        blueprint: PathBuf,

        /// Output PDF path
        #[arg(short, long)]
        out: PathBuf,

        /// Theme JSON file
        #[arg(long)]
        theme: Option<PathBuf>,
    },

    /// Run the full pipeline on a text file
    Generate {
        /// Source text file
        input: PathBuf,

        /// Directory the PDF is written to
        #[arg(short, long, default_value = "out")]
        out_dir: PathBuf,

        /// JSON GenerationParameters
        #[arg(long)]
        params: Option<String>,

        /// Theme JSON file
        #[arg(long)]
        theme: Option<PathBuf>,
    },

    /// Reseed the CORE library and report the counts
    Seed,
}

fn init_tracing() {
    let mut filter = EnvFilter::from_default_env();
    if let Ok(directive) = "deckforge=info".parse() {
        filter = filter.add_directive(directive);
    }
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn emit(value: &Value) {
    println!("{}", serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string()));
}

fn fail(message: impl std::fmt::Display) -> ExitCode {
    emit(&json!({ "success": false, "error": message.to_string() }));
    ExitCode::FAILURE
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, String> {
    let text = std::fs::read_to_string(path).map_err(|e| format!("{}: {}", path.display(), e))?;
    serde_json::from_str(&text).map_err(|e| format!("{}: {}", path.display(), e))
}

fn params_from(raw: Option<&str>) -> Result<GenerationParameters, String> {
    match raw {
        None => Ok(GenerationParameters::default()),
        Some(raw) => serde_json::from_str(raw).map_err(|e| format!("Invalid params: {}", e)),
    }
}

fn theme_from(path: Option<&Path>) -> Result<Theme, String> {
    path.map_or_else(|| Ok(Theme::default()), read_json)
}

fn open_registry(components_dir: Option<&Path>) -> Result<ComponentRegistry, String> {
    let registry = ComponentRegistry::in_memory();
    library::seed(&registry).map_err(|e| e.to_string())?;
    if let Some(dir) = components_dir {
        let loaded = registry.load_user_dir(dir).map_err(|e| e.to_string())?;
        tracing::info!(loaded, dir = %dir.display(), "user components loaded");
    }
    Ok(registry)
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    init_tracing();
    let cli = Cli::parse();

    let config = match EngineConfig::from_env() {
        Ok(c) => c,
        Err(e) => return fail(e),
    };
    let registry = match open_registry(cli.components_dir.as_deref()) {
        Ok(r) => r,
        Err(e) => return fail(format!("Failed to load components: {}", e)),
    };

    match cli.command {
        Commands::Components { category } => {
            let category = match category.as_deref().map(|c| Category::parse(c).ok_or(c)) {
                None => None,
                Some(Ok(c)) => Some(c),
                Some(Err(c)) => return fail(format!("Unknown category: {}", c)),
            };
            let components: Vec<_> = registry
                .list(&ComponentFilter { category, is_public: None })
                .iter()
                .map(|c| json!({
                    "id": c.id,
                    "name": c.name,
                    "category": c.category,
                    "version": c.version.to_string(),
                    "tags": c.tags,
                    "origin": c.origin,
                    "popularity": c.popularity,
                    "deprecated": c.deprecated,
                }))
                .collect();
            emit(&Value::Array(components));
            ExitCode::SUCCESS
        }

        Commands::Validate { component, payload } => {
            let payload: Value = match serde_json::from_str(&payload) {
                Ok(p) => p,
                Err(e) => return fail(format!("Invalid payload: {}", e)),
            };
            let component = match registry.get(&component) {
                Ok(c) => c,
                Err(e) => return fail(e),
            };
            let report = SchemaValidator::strict().validate(&payload, &component.data_schema);
            emit(&json!(report));
            if report.valid {
                ExitCode::SUCCESS
            } else {
                ExitCode::from(2)
            }
        }

        Commands::Assemble { input, params } => {
            let run = || -> Result<Value, String> {
                let raw = std::fs::read_to_string(&input).map_err(|e| format!("{}: {}", input.display(), e))?;
                let params = params_from(params.as_deref())?;
                let content = HeuristicParser::new().parse_text(&raw).map_err(|e| e.to_string())?;
                let components = registry.available().map_err(|e| e.to_string())?;
                let assembly = BlueprintAssembler::new()
                    .assemble(&content, &components, &params, None)
                    .map_err(|e| e.to_string())?;
                Ok(json!({
                    "content": content,
                    "strategy": assembly.strategy,
                    "warnings": assembly.warnings,
                    "blueprint": assembly.blueprint,
                }))
            };
            match run() {
                Ok(output) => {
                    emit(&output);
                    ExitCode::SUCCESS
                }
                Err(e) => fail(e),
            }
        }

        Commands::Render { blueprint, out, theme } => {
            let run = || -> Result<Value, String> {
                let blueprint: Blueprint = read_json(&blueprint)?;
                let theme = theme_from(theme.as_deref())?;
                let compositor = DocumentCompositor::new(registry.clone(), Executor::new(config.limits))
                    .parallel(config.parallel_render);
                let document = compositor.compose(&blueprint, &theme).map_err(|e| e.to_string())?;
                let bytes = document.to_pdf().map_err(|e| e.to_string())?;
                std::fs::write(&out, &bytes).map_err(|e| format!("{}: {}", out.display(), e))?;
                Ok(json!({
                    "success": true,
                    "path": out.display().to_string(),
                    "pages": document.page_count(),
                    "placeholders": document.placeholder_count(),
                    "manifestHash": document.manifest_hash,
                }))
            };
            match run() {
                Ok(output) => {
                    emit(&output);
                    ExitCode::SUCCESS
                }
                Err(e) => fail(e),
            }
        }

        Commands::Generate { input, out_dir, params, theme } => {
            let raw = match std::fs::read_to_string(&input) {
                Ok(r) => r,
                Err(e) => return fail(format!("{}: {}", input.display(), e)),
            };
            let (params, theme) = match (params_from(params.as_deref()), theme_from(theme.as_deref())) {
                (Ok(p), Ok(t)) => (p, t),
                (Err(e), _) | (_, Err(e)) => return fail(e),
            };
            let parser: Arc<dyn ContentParser> = Arc::new(HeuristicParser::new());
            let pipeline = GenerationPipeline::new(registry, config)
                .with_parser(parser)
                .with_sink(Arc::new(FsSink::new(out_dir)));
            let request = GenerationRequest::new(raw).with_params(params).with_theme(theme);
            match pipeline.generate(request).await {
                Ok(outcome) => {
                    emit(&json!({
                        "success": true,
                        "location": outcome.location,
                        "slideCount": outcome.slide_count,
                        "strategy": outcome.strategy,
                        "warnings": outcome.warnings,
                        "manifestHash": outcome.document.manifest_hash,
                    }));
                    ExitCode::SUCCESS
                }
                Err(e) => fail(e),
            }
        }

        Commands::Seed => match library::seed(&registry) {
            Ok(report) => {
                emit(&json!({ "success": true, "removed": report.removed, "inserted": report.inserted }));
                ExitCode::SUCCESS
            }
            Err(e) => fail(e),
        },
    }
}
