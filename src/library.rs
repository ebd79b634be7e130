//! Core Library - Embedded Seed Components
//!
//! The CORE set ships inside the binary so a fresh registry can always be
//! seeded. Reseeding replaces the whole CORE set in one transaction.

use thiserror::Error;

use crate::components::{Component, Origin};
use crate::registry::{ComponentRegistry, RegistryError, ReseedReport};

const SEED_FILES: [(&str, &str); 20] = [
    ("00-stats-cover.json", include_str!("../library/00-stats-cover.json")),
    ("01-minimal-cover.json", include_str!("../library/01-minimal-cover.json")),
    ("02-impact-cover.json", include_str!("../library/02-impact-cover.json")),
    ("03-section-divider.json", include_str!("../library/03-section-divider.json")),
    ("04-table-of-contents.json", include_str!("../library/04-table-of-contents.json")),
    ("05-kpi-dashboard.json", include_str!("../library/05-kpi-dashboard.json")),
    ("06-hero-metric.json", include_str!("../library/06-hero-metric.json")),
    ("07-comparison-bars.json", include_str!("../library/07-comparison-bars.json")),
    ("08-timeline-horizontal.json", include_str!("../library/08-timeline-horizontal.json")),
    ("09-process-flow.json", include_str!("../library/09-process-flow.json")),
    ("10-numbered-steps.json", include_str!("../library/10-numbered-steps.json")),
    ("11-swot-grid.json", include_str!("../library/11-swot-grid.json")),
    ("12-matrix-2x2.json", include_str!("../library/12-matrix-2x2.json")),
    ("13-three-pillars.json", include_str!("../library/13-three-pillars.json")),
    ("14-pyramid-3-level.json", include_str!("../library/14-pyramid-3-level.json")),
    ("15-before-after.json", include_str!("../library/15-before-after.json")),
    ("16-pros-cons.json", include_str!("../library/16-pros-cons.json")),
    ("17-full-text-narrative.json", include_str!("../library/17-full-text-narrative.json")),
    ("18-quote-pullout.json", include_str!("../library/18-quote-pullout.json")),
    ("19-thank-you.json", include_str!("../library/19-thank-you.json")),
];

#[derive(Debug, Error)]
pub enum LibraryError {
    #[error("Seed file {file} is invalid: {source}")]
    Parse {
        file: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("Component {id} requires `{field}` but its render program never reads it")]
    UnreadRequiredField { id: String, field: String },

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// Every field a component requires must be read by its render program.
pub fn check_contract(component: &Component) -> Result<(), LibraryError> {
    let read = component.render_program.referenced_data_keys();
    match component.data_schema.required.iter().find(|field| !read.contains(*field)) {
        Some(field) => Err(LibraryError::UnreadRequiredField {
            id: component.id.clone(),
            field: field.clone(),
        }),
        None => Ok(()),
    }
}

pub fn core_components() -> Result<Vec<Component>, LibraryError> {
    SEED_FILES
        .iter()
        .map(|&(file, json)| {
            let mut component: Component =
                serde_json::from_str(json).map_err(|source| LibraryError::Parse { file, source })?;
            component.origin = Origin::Core;
            check_contract(&component)?;
            Ok(component)
        })
        .collect()
}

/// Replace the registry's CORE set with the embedded library. Safe to run
/// repeatedly; USER components are left alone.
pub fn seed(registry: &ComponentRegistry) -> Result<ReseedReport, LibraryError> {
    let components = core_components()?;
    let report = registry.store().replace_core(components)?;
    tracing::info!(removed = report.removed, inserted = report.inserted, "core library seeded");
    Ok(report)
}
