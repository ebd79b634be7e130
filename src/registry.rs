//! Component Registry - Catalog Storage and Queries
//!
//! Components are immutable once stored; the only mutable attribute is the
//! popularity counter, which is an atomic shared by every reader.

use parking_lot::RwLock;
use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;

use crate::components::{load_from_dir, Category, Component, ComponentId, Origin};

#[derive(Debug, Error, PartialEq)]
pub enum RegistryError {
    #[error("Component not found: {0}")]
    NotFound(ComponentId),

    #[error("No components available. Run database seed first.")]
    Empty,

    #[error("Refusing to reseed with an empty component set")]
    EmptySeed,

    #[error("Duplicate component {0} in category {1}")]
    DuplicateKey(String, Category),

    #[error("Component id already in use: {0}")]
    DuplicateId(ComponentId),

    #[error("Seed component {0} must have CORE origin")]
    NotCore(ComponentId),

    #[error("Failed to load components: {0}")]
    Load(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReseedReport {
    pub removed: usize,
    pub inserted: usize,
}

/// Storage seam for the catalog. A relational backend implements the same
/// contract: `replace_core` is one transaction, `increment_popularity` is
/// one atomic update.
pub trait ComponentStore: Send + Sync {
    fn all(&self) -> Vec<Component>;

    fn get(&self, id: &str) -> Option<Component>;

    /// Remove every CORE component and insert `components`, all or nothing.
    fn replace_core(&self, components: Vec<Component>) -> Result<ReseedReport, RegistryError>;

    fn insert_user(&self, component: Component) -> Result<(), RegistryError>;

    /// Returns the new count.
    fn increment_popularity(&self, id: &str) -> Result<u64, RegistryError>;
}

struct Slot {
    component: Component,
    popularity: Arc<AtomicU64>,
}

impl Slot {
    fn new(component: Component) -> Self {
        let popularity = Arc::new(AtomicU64::new(component.popularity));
        Self { component, popularity }
    }

    fn snapshot(&self) -> Component {
        let mut component = self.component.clone();
        component.popularity = self.popularity.load(Ordering::Relaxed);
        component
    }
}

/// In-process store. The map is swapped under a write lock, so readers see
/// either the old catalog or the new one.
#[derive(Default)]
pub struct MemoryStore {
    slots: RwLock<HashMap<ComponentId, Slot>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn check_unique_keys(components: &[Component]) -> Result<(), RegistryError> {
    let mut keys = BTreeSet::new();
    let mut ids = BTreeSet::new();
    for component in components {
        if !ids.insert(component.id.as_str()) {
            return Err(RegistryError::DuplicateId(component.id.clone()));
        }
        if !keys.insert(component.natural_key()) {
            return Err(RegistryError::DuplicateKey(component.name.clone(), component.category));
        }
    }
    Ok(())
}

impl ComponentStore for MemoryStore {
    fn all(&self) -> Vec<Component> {
        self.slots.read().values().map(Slot::snapshot).collect()
    }

    fn get(&self, id: &str) -> Option<Component> {
        self.slots.read().get(id).map(Slot::snapshot)
    }

    fn replace_core(&self, components: Vec<Component>) -> Result<ReseedReport, RegistryError> {
        if components.is_empty() {
            return Err(RegistryError::EmptySeed);
        }
        if let Some(c) = components.iter().find(|c| c.origin != Origin::Core) {
            return Err(RegistryError::NotCore(c.id.clone()));
        }
        check_unique_keys(&components)?;

        let mut slots = self.slots.write();
        if let Some(clash) = components
            .iter()
            .find(|c| slots.get(&c.id).map_or(false, |s| s.component.origin == Origin::User))
        {
            return Err(RegistryError::DuplicateId(clash.id.clone()));
        }

        let removed = slots.values().filter(|s| s.component.origin == Origin::Core).count();
        let mut next: HashMap<ComponentId, Slot> = HashMap::with_capacity(slots.len() - removed + components.len());
        let previous = std::mem::take(&mut *slots);
        for (id, slot) in previous.iter().filter(|(_, s)| s.component.origin == Origin::User) {
            next.insert(id.clone(), Slot { component: slot.component.clone(), popularity: Arc::clone(&slot.popularity) });
        }

        let inserted = components.len();
        for component in components {
            // Counters survive a reseed of the same component.
            let slot = match previous.get(&component.id) {
                Some(old) => Slot { component, popularity: Arc::clone(&old.popularity) },
                None => Slot::new(component),
            };
            next.insert(slot.component.id.clone(), slot);
        }

        *slots = next;
        Ok(ReseedReport { removed, inserted })
    }

    fn insert_user(&self, mut component: Component) -> Result<(), RegistryError> {
        component.origin = Origin::User;
        let mut slots = self.slots.write();
        if slots.contains_key(&component.id) {
            return Err(RegistryError::DuplicateId(component.id));
        }
        let key = component.natural_key();
        if slots.values().any(|s| s.component.natural_key() == key) {
            return Err(RegistryError::DuplicateKey(component.name, component.category));
        }
        slots.insert(component.id.clone(), Slot::new(component));
        Ok(())
    }

    fn increment_popularity(&self, id: &str) -> Result<u64, RegistryError> {
        let slots = self.slots.read();
        let slot = slots.get(id).ok_or_else(|| RegistryError::NotFound(id.to_string()))?;
        Ok(slot.popularity.fetch_add(1, Ordering::Relaxed) + 1)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ComponentFilter {
    pub category: Option<Category>,
    pub is_public: Option<bool>,
}

impl ComponentFilter {
    fn matches(&self, component: &Component) -> bool {
        self.category.map_or(true, |c| component.category == c)
            && self.is_public.map_or(true, |p| component.is_public == p)
    }
}

/// Query facade over a [`ComponentStore`].
#[derive(Clone)]
pub struct ComponentRegistry {
    store: Arc<dyn ComponentStore>,
}

impl ComponentRegistry {
    pub fn new(store: Arc<dyn ComponentStore>) -> Self {
        Self { store }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }

    pub fn store(&self) -> &Arc<dyn ComponentStore> {
        &self.store
    }

    /// Ordered by category, then name, then id.
    pub fn list(&self, filter: &ComponentFilter) -> Vec<Component> {
        let mut components: Vec<Component> =
            self.store.all().into_iter().filter(|c| filter.matches(c)).collect();
        components.sort_by(|a, b| {
            (a.category, &a.name, &a.id).cmp(&(b.category, &b.name, &b.id))
        });
        components
    }

    pub fn get(&self, id: &str) -> Result<Component, RegistryError> {
        self.store.get(id).ok_or_else(|| RegistryError::NotFound(id.to_string()))
    }

    pub fn increment_popularity(&self, id: &str) -> Result<u64, RegistryError> {
        self.store.increment_popularity(id)
    }

    /// Public components generation may choose from. Never empty.
    pub fn available(&self) -> Result<Vec<Component>, RegistryError> {
        let components = self.list(&ComponentFilter { category: None, is_public: Some(true) });
        if components.is_empty() {
            return Err(RegistryError::Empty);
        }
        Ok(components)
    }

    /// Import USER components from a directory of JSON files.
    pub fn load_user_dir(&self, dir: &Path) -> Result<usize, RegistryError> {
        let components = load_from_dir(dir).map_err(|e| RegistryError::Load(e.to_string()))?;
        let mut loaded = 0;
        for component in components {
            match self.store.insert_user(component) {
                Ok(()) => loaded += 1,
                Err(e) => tracing::warn!(error = %e, "skipping user component"),
            }
        }
        Ok(loaded)
    }
}

impl Default for ComponentRegistry {
    fn default() -> Self {
        Self::in_memory()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::program::RenderProgram;
    use crate::schema::DataSchema;

    fn component(id: &str, name: &str, category: Category, origin: Origin) -> Component {
        Component {
            id: id.to_string(),
            name: name.to_string(),
            description: String::new(),
            version: semver::Version::new(1, 0, 0),
            engine_min_version: "1.0.0".to_string(),
            category,
            tags: Default::default(),
            data_schema: DataSchema::default(),
            render_program: RenderProgram::default(),
            use_cases: vec![],
            best_for: String::new(),
            is_public: true,
            origin,
            popularity: 0,
            deprecated: false,
            superseded_by: None,
        }
    }

    #[test]
    fn list_is_ordered_and_filtered() {
        let registry = ComponentRegistry::in_memory();
        registry
            .store()
            .replace_core(vec![
                component("c", "Zeta", Category::Narrative, Origin::Core),
                component("b", "Alpha", Category::Narrative, Origin::Core),
                component("a", "Cover", Category::Title, Origin::Core),
            ])
            .unwrap();
        let ids: Vec<_> = registry.list(&ComponentFilter::default()).into_iter().map(|c| c.id).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);

        let narrative = registry.list(&ComponentFilter { category: Some(Category::Narrative), is_public: None });
        assert_eq!(narrative.len(), 2);
    }

    #[test]
    fn available_is_never_empty() {
        let registry = ComponentRegistry::in_memory();
        assert_eq!(registry.available(), Err(RegistryError::Empty));

        let mut private = component("p", "Private", Category::Title, Origin::User);
        private.is_public = false;
        registry.store().insert_user(private).unwrap();
        assert_eq!(registry.available(), Err(RegistryError::Empty));
    }

    #[test]
    fn replace_core_is_all_or_nothing() {
        let registry = ComponentRegistry::in_memory();
        let store = registry.store();
        store.replace_core(vec![component("a", "Cover", Category::Title, Origin::Core)]).unwrap();
        store.insert_user(component("u", "Mine", Category::Data, Origin::User)).unwrap();

        assert_eq!(store.replace_core(vec![]), Err(RegistryError::EmptySeed));
        let dup = vec![
            component("x", "Same", Category::Data, Origin::Core),
            component("y", "Same", Category::Data, Origin::Core),
        ];
        assert!(matches!(store.replace_core(dup), Err(RegistryError::DuplicateKey(..))));
        assert!(registry.get("a").is_ok(), "failed reseed must leave catalog untouched");

        let report = store
            .replace_core(vec![component("b", "Other", Category::Title, Origin::Core)])
            .unwrap();
        assert_eq!(report, ReseedReport { removed: 1, inserted: 1 });
        assert!(registry.get("a").is_err());
        assert!(registry.get("u").is_ok());
    }

    #[test]
    fn popularity_increments_are_commutative_under_contention() {
        let registry = ComponentRegistry::in_memory();
        registry.store().replace_core(vec![component("a", "Cover", Category::Title, Origin::Core)]).unwrap();

        std::thread::scope(|scope| {
            for _ in 0..8 {
                let registry = registry.clone();
                scope.spawn(move || {
                    for _ in 0..250 {
                        registry.increment_popularity("a").unwrap();
                    }
                });
            }
        });
        assert_eq!(registry.get("a").unwrap().popularity, 2000);
        assert_eq!(registry.increment_popularity("missing"), Err(RegistryError::NotFound("missing".into())));
    }

    #[test]
    fn reseeding_same_set_keeps_counters() {
        let registry = ComponentRegistry::in_memory();
        let seed = vec![component("a", "Cover", Category::Title, Origin::Core)];
        registry.store().replace_core(seed.clone()).unwrap();
        registry.increment_popularity("a").unwrap();
        registry.store().replace_core(seed).unwrap();
        assert_eq!(registry.get("a").unwrap().popularity, 1);
        assert_eq!(registry.list(&ComponentFilter::default()).len(), 1);
    }
}
