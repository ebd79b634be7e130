//! Document Composition
//!
//! Turns a blueprint into an ordered document. Structural problems abort
//! composition; anything that goes wrong inside a single page only turns
//! that page into a placeholder.

use chrono::{DateTime, Utc};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use uuid::Uuid;

use crate::blueprint::{Blueprint, BlueprintError, ComponentSnapshot, SlideBlueprintEntry};
use crate::components::ComponentId;
use crate::draw::{Canvas, Frame, Page, LOGO_FRAME};
use crate::executor::{Executor, PageSpec};
use crate::hashing::compute_manifest_hash;
use crate::pdf::{write_pdf, PdfError};
use crate::registry::ComponentRegistry;
use crate::theme::Theme;
use crate::ENGINE_VERSION;

pub const PRODUCER: &str = "DeckForge";
pub const SUBJECT: &str = "Generated Presentation";
pub const DEFAULT_TITLE: &str = "Presentation";

#[derive(Debug, Error)]
pub enum CompositionError {
    #[error(transparent)]
    Blueprint(#[from] BlueprintError),

    #[error("Component {component_id} at position {position} has no snapshot and is not registered")]
    Unresolved { position: usize, component_id: ComponentId },

    #[error("Manifest could not be hashed: {0}")]
    Manifest(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub title: String,
    pub author: String,
    pub producer: String,
    pub subject: String,
    pub created_at: DateTime<Utc>,
}

impl DocumentMetadata {
    pub fn new(title: &str) -> Self {
        Self {
            title: title.to_string(),
            author: PRODUCER.to_string(),
            producer: PRODUCER.to_string(),
            subject: SUBJECT.to_string(),
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: Uuid,
    pub metadata: DocumentMetadata,
    pub canvas: Canvas,
    pub theme: Theme,
    pub pages: Vec<Page>,
    /// Hash over the engine version, theme and every page's render key.
    pub manifest_hash: String,
}

impl Document {
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn placeholder_count(&self) -> usize {
        self.pages.iter().filter(|p| p.is_placeholder()).count()
    }

    pub fn to_pdf(&self) -> Result<Vec<u8>, PdfError> {
        write_pdf(self)
    }
}

pub struct DocumentCompositor {
    registry: ComponentRegistry,
    executor: Executor,
    parallel: bool,
}

impl DocumentCompositor {
    pub fn new(registry: ComponentRegistry, executor: Executor) -> Self {
        Self { registry, executor, parallel: true }
    }

    /// Render pages on the rayon pool (the default) or sequentially.
    pub fn parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn compose(&self, blueprint: &Blueprint, theme: &Theme) -> Result<Document, CompositionError> {
        self.compose_titled(blueprint, theme, DEFAULT_TITLE)
    }

    pub fn compose_titled(
        &self,
        blueprint: &Blueprint,
        theme: &Theme,
        title: &str,
    ) -> Result<Document, CompositionError> {
        blueprint.check()?;

        let mut entries: Vec<_> = blueprint.entries().iter().collect();
        entries.sort_by_key(|e| e.position);

        // Resolve everything up front so a missing component fails the
        // document before any page is rendered.
        let resolved = entries
            .into_iter()
            .map(|entry| {
                let snapshot = match &entry.snapshot {
                    Some(snapshot) => snapshot.clone(),
                    None => self
                        .registry
                        .get(&entry.component_id)
                        .map(|c| ComponentSnapshot::from(&c))
                        .map_err(|_| CompositionError::Unresolved {
                            position: entry.position,
                            component_id: entry.component_id.clone(),
                        })?,
                };
                Ok::<_, CompositionError>((entry, snapshot))
            })
            .collect::<Result<Vec<_>, CompositionError>>()?;

        let logo = self.logo_frame(theme);
        let render = |(entry, snapshot): &(&SlideBlueprintEntry, ComponentSnapshot)| {
            let mut page = self.executor.render_page(
                PageSpec {
                    position: entry.position,
                    component_id: &entry.component_id,
                    program: &snapshot.render_program,
                    schema: &snapshot.data_schema,
                    engine_min_version: &snapshot.engine_min_version,
                    data: &entry.data,
                },
                theme,
            );
            page.logo = logo;
            page
        };
        let pages: Vec<Page> = if self.parallel {
            resolved.par_iter().map(&render).collect()
        } else {
            resolved.iter().map(&render).collect()
        };

        let manifest = json!({
            "engine": ENGINE_VERSION,
            "theme": theme,
            "pages": pages
                .iter()
                .map(|p| json!({ "position": p.position, "componentId": p.component_id, "renderKey": p.render_key }))
                .collect::<Vec<_>>(),
        });
        let document = Document {
            id: Uuid::new_v4(),
            metadata: DocumentMetadata::new(title),
            canvas: self.executor.canvas(),
            theme: theme.clone(),
            manifest_hash: compute_manifest_hash(&manifest)?,
            pages,
        };

        let placeholders = document.placeholder_count();
        if placeholders > 0 {
            tracing::warn!(placeholders, pages = document.page_count(), "document composed with placeholder pages");
        }
        tracing::info!(id = %document.id, pages = document.page_count(), manifest = %document.manifest_hash, "document composed");
        Ok(document)
    }

    /// Logo placement when the theme logo is a decodable image.
    fn logo_frame(&self, theme: &Theme) -> Option<Frame> {
        let logo = theme.logo.as_ref()?;
        let usable = logo
            .decode()
            .map_err(|e| e.to_string())
            .and_then(|bytes| image::guess_format(&bytes).map(|_| ()).map_err(|e| e.to_string()));
        match usable {
            Ok(()) => Some(LOGO_FRAME),
            Err(error) => {
                tracing::warn!(%error, "theme logo ignored");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::draw::{DrawOp, FAILURE_TEXT};
    use crate::library::{core_components, seed};
    use crate::theme::Logo;
    use serde_json::json;

    fn compositor() -> (ComponentRegistry, DocumentCompositor) {
        let registry = ComponentRegistry::in_memory();
        seed(&registry).unwrap();
        let compositor = DocumentCompositor::new(registry.clone(), Executor::default());
        (registry, compositor)
    }

    fn entry(position: usize, id: &str, data: serde_json::Value) -> SlideBlueprintEntry {
        let component = core_components().unwrap().into_iter().find(|c| c.id == id).unwrap();
        SlideBlueprintEntry::new(position, &component, data)
    }

    #[test]
    fn pages_follow_positions_and_carry_background() {
        let (_, compositor) = compositor();
        let blueprint = Blueprint::from_entries(vec![
            entry(1, "core.thank-you", json!({ "message": "Thank You" })),
            entry(0, "core.minimal-cover", json!({ "title": "Deck" })),
        ]);
        let document = compositor.compose(&blueprint, &Theme::default()).unwrap();
        let ids: Vec<_> = document.pages.iter().map(|p| p.component_id.as_str()).collect();
        assert_eq!(ids, vec!["core.minimal-cover", "core.thank-you"]);
        assert!(document.pages.iter().all(|p| p.background.as_str() == "FFFFFF"));
        assert_eq!(document.metadata.subject, SUBJECT);
        assert_eq!(document.metadata.author, PRODUCER);
        assert_eq!(document.placeholder_count(), 0);
    }

    #[test]
    fn failing_page_is_isolated() {
        let (_, compositor) = compositor();
        let blueprint = Blueprint::from_entries(vec![
            entry(0, "core.minimal-cover", json!({ "title": "Deck" })),
            entry(1, "core.kpi-dashboard", json!({ "title": "KPIs" })),
            entry(2, "core.thank-you", json!({})),
        ]);
        let document = compositor.compose(&blueprint, &Theme::default()).unwrap();
        assert_eq!(document.page_count(), 3);
        assert!(document.pages[1].is_placeholder());
        assert!(matches!(&document.pages[1].ops[0], DrawOp::Text(t) if t.text == FAILURE_TEXT));
        assert!(!document.pages[0].is_placeholder());
        assert!(!document.pages[2].is_placeholder());
    }

    #[test]
    fn unresolvable_component_is_structural() {
        let (_, compositor) = compositor();
        let mut ghost = entry(0, "core.minimal-cover", json!({ "title": "x" }));
        ghost.component_id = "ghost".to_string();
        ghost.snapshot = None;
        let err = compositor.compose(&Blueprint::from_entries(vec![ghost]), &Theme::default()).unwrap_err();
        assert!(matches!(err, CompositionError::Unresolved { position: 0, .. }));

        let err = compositor.compose(&Blueprint::new(), &Theme::default()).unwrap_err();
        assert!(matches!(err, CompositionError::Blueprint(BlueprintError::Empty)));
    }

    #[test]
    fn snapshot_wins_over_registry() {
        let (_, compositor) = compositor();
        let mut stored = entry(0, "core.minimal-cover", json!({ "title": "x" }));
        if let Some(snapshot) = stored.snapshot.as_mut() {
            snapshot.render_program = Default::default();
        }
        let document = compositor.compose(&Blueprint::from_entries(vec![stored]), &Theme::default()).unwrap();
        assert!(document.pages[0].ops.is_empty());
    }

    #[test]
    fn sequential_and_parallel_agree() {
        let (registry, parallel) = compositor();
        let sequential = DocumentCompositor::new(registry, Executor::default()).parallel(false);
        let blueprint = Blueprint::from_entries(vec![
            entry(0, "core.minimal-cover", json!({ "title": "Deck" })),
            entry(1, "core.full-text-narrative", json!({ "title": "Why", "content": "Because" })),
        ]);
        let a = parallel.compose(&blueprint, &Theme::default()).unwrap();
        let b = sequential.compose(&blueprint, &Theme::default()).unwrap();
        assert_eq!(a.pages, b.pages);
        assert_eq!(a.manifest_hash, b.manifest_hash);
    }

    #[test]
    fn undecodable_logo_is_skipped() {
        let (_, compositor) = compositor();
        let theme = Theme { logo: Some(Logo { data_base64: "!!!".into() }), ..Theme::default() };
        let blueprint = Blueprint::from_entries(vec![entry(0, "core.minimal-cover", json!({ "title": "Deck" }))]);
        let document = compositor.compose(&blueprint, &theme).unwrap();
        assert_eq!(document.pages[0].logo, None);
        assert!(!document.to_pdf().unwrap().is_empty());
    }
}
