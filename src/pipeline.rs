//! Generation Pipeline - Single Entry Point
//!
//! raw text → parse → map → assemble → compose → PDF → sink
//!
//! External capabilities (parser, mapper, sink) are awaited under timeouts.
//! Parser and mapper failures degrade; structural failures abort the build.

use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::assembler::{AssemblyError, AssemblyStrategy, AssemblyWarning, BlueprintAssembler};
use crate::compositor::{CompositionError, Document, DocumentCompositor};
use crate::config::EngineConfig;
use crate::content::{GenerationParameters, ParsedContent};
use crate::executor::Executor;
use crate::mapper::{ContentMapper, DisabledMapper, MapperOutput};
use crate::parser::{CapabilityError, ContentParser, HeuristicParser};
use crate::pdf::PdfError;
use crate::registry::{ComponentRegistry, RegistryError};
use crate::sink::{ArtifactSink, MemorySink, SinkError, PDF_CONTENT_TYPE};
use crate::theme::Theme;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Assembly(#[from] AssemblyError),

    #[error(transparent)]
    Composition(#[from] CompositionError),

    #[error(transparent)]
    Pdf(#[from] PdfError),

    #[error("Artifact sink failed: {0}")]
    Sink(#[from] SinkError),

    #[error("Artifact sink timed out after {0:?}")]
    SinkTimeout(Duration),

    #[error("Generation was cancelled")]
    Cancelled,

    #[error("Render task failed: {0}")]
    Task(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildStatus {
    Draft,
    Generating,
    Ready,
    Error,
}

#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub request_id: String,
    pub raw: String,
    pub params: GenerationParameters,
    pub theme: Theme,
}

impl GenerationRequest {
    pub fn new(raw: impl Into<String>) -> Self {
        Self {
            request_id: Uuid::new_v4().to_string(),
            raw: raw.into(),
            params: GenerationParameters::default(),
            theme: Theme::default(),
        }
    }

    pub fn with_params(mut self, params: GenerationParameters) -> Self {
        self.params = params;
        self
    }

    pub fn with_theme(mut self, theme: Theme) -> Self {
        self.theme = theme;
        self
    }
}

#[derive(Debug, Clone)]
pub struct GenerationOutcome {
    pub document: Document,
    pub slide_count: usize,
    pub location: String,
    pub strategy: AssemblyStrategy,
    pub warnings: Vec<AssemblyWarning>,
}

pub fn status_channel() -> (watch::Sender<BuildStatus>, watch::Receiver<BuildStatus>) {
    watch::channel(BuildStatus::Draft)
}

enum Capability<T> {
    Ready(T),
    Degraded(String),
    Unavailable,
}

/// Await an external capability, honoring cancellation and a timeout.
async fn call<T>(
    name: &str,
    limit: Duration,
    cancel: &CancellationToken,
    work: impl Future<Output = Result<T, CapabilityError>>,
) -> Result<Capability<T>, PipelineError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(PipelineError::Cancelled),
        result = tokio::time::timeout(limit, work) => Ok(match result {
            Ok(Ok(value)) => Capability::Ready(value),
            Ok(Err(CapabilityError::Unavailable(_))) => Capability::Unavailable,
            Ok(Err(e)) => Capability::Degraded(e.to_string()),
            Err(_) => Capability::Degraded(format!("{} timed out after {:?}", name, limit)),
        }),
    }
}

pub struct GenerationPipeline {
    registry: ComponentRegistry,
    config: EngineConfig,
    parser: Arc<dyn ContentParser>,
    mapper: Arc<dyn ContentMapper>,
    sink: Arc<dyn ArtifactSink>,
    assembler: BlueprintAssembler,
}

impl GenerationPipeline {
    pub fn new(registry: ComponentRegistry, config: EngineConfig) -> Self {
        Self {
            registry,
            config,
            parser: Arc::new(HeuristicParser::new()),
            mapper: Arc::new(DisabledMapper),
            sink: Arc::new(MemorySink::new()),
            assembler: BlueprintAssembler::new(),
        }
    }

    pub fn with_parser(mut self, parser: Arc<dyn ContentParser>) -> Self {
        self.parser = parser;
        self
    }

    pub fn with_mapper(mut self, mapper: Arc<dyn ContentMapper>) -> Self {
        self.mapper = mapper;
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn ArtifactSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn registry(&self) -> &ComponentRegistry {
        &self.registry
    }

    pub async fn generate(&self, request: GenerationRequest) -> Result<GenerationOutcome, PipelineError> {
        let (status, _) = status_channel();
        self.generate_with(request, &CancellationToken::new(), &status).await
    }

    /// Run one build, publishing its status on `status`.
    pub async fn generate_with(
        &self,
        request: GenerationRequest,
        cancel: &CancellationToken,
        status: &watch::Sender<BuildStatus>,
    ) -> Result<GenerationOutcome, PipelineError> {
        status.send_replace(BuildStatus::Generating);
        let result = self.run(request, cancel).await;
        match &result {
            Ok(outcome) => {
                status.send_replace(BuildStatus::Ready);
                tracing::info!(slides = outcome.slide_count, location = %outcome.location, "generation ready");
            }
            Err(error) => {
                status.send_replace(BuildStatus::Error);
                tracing::warn!(%error, "generation failed");
            }
        }
        result
    }

    async fn run(&self, request: GenerationRequest, cancel: &CancellationToken) -> Result<GenerationOutcome, PipelineError> {
        let GenerationRequest { request_id, raw, params, theme } = request;
        let components = self.registry.available()?;
        let mut warnings = Vec::new();

        tracing::info!(request = %request_id, parser = self.parser.name(), "parsing content");
        let parsed = call("parser", self.config.parser_timeout, cancel, self.parser.parse(&raw, &params)).await?;
        let content = match parsed {
            Capability::Ready(content) if !content.sections.is_empty() => content,
            Capability::Ready(_) => degraded_parse(&raw, "parser returned no sections".to_string(), &mut warnings),
            Capability::Degraded(reason) => degraded_parse(&raw, reason, &mut warnings),
            Capability::Unavailable => degraded_parse(&raw, "parser unavailable".to_string(), &mut warnings),
        };

        tracing::info!(sections = content.sections.len(), mapper = self.mapper.name(), "mapping content");
        let mapped: Option<MapperOutput> =
            match call("mapper", self.config.mapper_timeout, cancel, self.mapper.map(&content, &components, &params)).await? {
                Capability::Ready(output) => Some(output),
                Capability::Degraded(reason) => {
                    tracing::warn!(%reason, "mapper failed, using rule-based assembly");
                    warnings.push(AssemblyWarning::MapperFallback { reason });
                    None
                }
                Capability::Unavailable => None,
            };

        let assembly = self.assembler.assemble(&content, &components, &params, mapped.as_ref())?;
        warnings.extend(assembly.warnings);

        if cancel.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }

        // Past this point the build runs to completion.
        let compositor = DocumentCompositor::new(self.registry.clone(), Executor::new(self.config.limits))
            .parallel(self.config.parallel_render);
        let blueprint = assembly.blueprint;
        let title = content.title.clone();
        let (document, bytes, blueprint) = tokio::task::spawn_blocking(move || {
            let document = compositor.compose_titled(&blueprint, &theme, &title)?;
            let bytes = document.to_pdf()?;
            Ok::<_, PipelineError>((document, bytes, blueprint))
        })
        .await
        .map_err(|e| PipelineError::Task(e.to_string()))??;

        let location = tokio::time::timeout(
            self.config.sink_timeout,
            self.sink.store(&request_id, &bytes, PDF_CONTENT_TYPE),
        )
        .await
        .map_err(|_| PipelineError::SinkTimeout(self.config.sink_timeout))??;

        // Only delivered decks count towards popularity.
        for entry in blueprint.entries() {
            if let Err(error) = self.registry.increment_popularity(&entry.component_id) {
                tracing::warn!(%error, component = %entry.component_id, "popularity not recorded");
            }
        }

        Ok(GenerationOutcome {
            slide_count: document.page_count(),
            document,
            location,
            strategy: assembly.strategy,
            warnings,
        })
    }
}

fn degraded_parse(raw: &str, reason: String, warnings: &mut Vec<AssemblyWarning>) -> ParsedContent {
    tracing::warn!(%reason, "parser failed, using raw-text fallback");
    warnings.push(AssemblyWarning::ParserFallback { reason });
    ParsedContent::fallback(raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::library::seed;

    fn pipeline() -> GenerationPipeline {
        let registry = ComponentRegistry::in_memory();
        seed(&registry).unwrap();
        GenerationPipeline::new(registry, EngineConfig::default())
    }

    #[tokio::test]
    async fn empty_registry_is_structural() {
        let pipeline = GenerationPipeline::new(ComponentRegistry::in_memory(), EngineConfig::default());
        let (status, rx) = status_channel();
        let err = pipeline
            .generate_with(GenerationRequest::new("Deck"), &CancellationToken::new(), &status)
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Registry(RegistryError::Empty)));
        assert_eq!(*rx.borrow(), BuildStatus::Error);
    }

    #[tokio::test]
    async fn cancelled_before_start() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let (status, _) = status_channel();
        let err = pipeline()
            .generate_with(GenerationRequest::new("Deck\nBody"), &cancel, &status)
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Cancelled));
    }

    #[tokio::test]
    async fn ready_status_and_popularity() {
        let pipeline = pipeline();
        let (status, rx) = status_channel();
        let outcome = pipeline
            .generate_with(GenerationRequest::new("Deck\nSome narrative text"), &CancellationToken::new(), &status)
            .await
            .unwrap();
        assert_eq!(*rx.borrow(), BuildStatus::Ready);
        assert_eq!(outcome.strategy, AssemblyStrategy::RuleBased);
        assert_eq!(outcome.slide_count, outcome.document.page_count());
        let cover = &outcome.document.pages[0].component_id;
        assert_eq!(pipeline.registry().get(cover).unwrap().popularity, 1);
    }

    struct RefusingSink;

    #[async_trait::async_trait]
    impl ArtifactSink for RefusingSink {
        async fn store(&self, _request_id: &str, _bytes: &[u8], _content_type: &str) -> Result<String, SinkError> {
            Err(SinkError::InvalidKey("refused".to_string()))
        }
    }

    #[tokio::test]
    async fn failed_delivery_leaves_popularity_alone() {
        let pipeline = pipeline().with_sink(Arc::new(RefusingSink));
        let err = pipeline.generate(GenerationRequest::new("Deck\nSome narrative text")).await.unwrap_err();
        assert!(matches!(err, PipelineError::Sink(_)));
        assert!(pipeline
            .registry()
            .list(&crate::registry::ComponentFilter::default())
            .iter()
            .all(|c| c.popularity == 0));
    }
}
