//! The component contract and the registry that builds components by name.

use std::collections::BTreeMap;

use docweave_document::Document;
use docweave_shared::{ComponentConfig, ComponentDeclaration, DocweaveError, Result};

use crate::components::{
    CopyFromIndexComponent, ResolveLinksComponent, SaveComponent,
};
use crate::context::{BuildContext, TopicDiagnostics};

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// One transformation step applied to every topic.
///
/// `initialize` and `build_index` run once, in declared order, before any
/// topic. `apply` may run concurrently for different topics, so anything it
/// reads must be immutable or internally synchronized.
pub trait BuildComponent: Send + Sync {
    /// Parse configuration and set up state.
    fn initialize(&mut self, config: &ComponentConfig, context: &mut BuildContext) -> Result<()>;

    /// Build indexes or dictionaries and register them in `context`.
    fn build_index(&mut self, _context: &mut BuildContext) -> Result<()> {
        Ok(())
    }

    /// Transform `document`, the topic addressed by `key`.
    fn apply(
        &self,
        document: &mut Document,
        key: &str,
        diagnostics: &mut TopicDiagnostics,
    ) -> Result<()>;

    /// Drop held resources. Called once when the engine is disposed.
    fn dispose(&mut self) {}
}

/// A component with the name and configuration it was declared with.
pub struct PipelineStage {
    pub name: String,
    pub config: ComponentConfig,
    pub component: Box<dyn BuildComponent>,
}

impl PipelineStage {
    pub fn new(name: impl Into<String>, component: Box<dyn BuildComponent>) -> Self {
        Self {
            name: name.into(),
            config: ComponentConfig::default(),
            component,
        }
    }

    pub fn with_config(mut self, config: impl Into<ComponentConfig>) -> Self {
        self.config = config.into();
        self
    }
}

impl std::fmt::Debug for PipelineStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineStage")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

pub type ComponentFactory = Box<dyn Fn() -> Box<dyn BuildComponent> + Send + Sync>;

/// Maps declared type names to component constructors.
pub struct ComponentRegistry {
    factories: BTreeMap<String, ComponentFactory>,
}

impl ComponentRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self {
            factories: BTreeMap::new(),
        }
    }

    /// A registry with every built-in component.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register("copy_from_index", || Box::new(CopyFromIndexComponent::new()));
        registry.register("resolve_reference_links", || {
            Box::new(ResolveLinksComponent::reference())
        });
        registry.register("resolve_conceptual_links", || {
            Box::new(ResolveLinksComponent::conceptual())
        });
        registry.register("save", || Box::new(SaveComponent::new()));
        registry
    }

    /// Register (or replace) the constructor for `kind`.
    pub fn register<F>(&mut self, kind: impl Into<String>, factory: F)
    where
        F: Fn() -> Box<dyn BuildComponent> + Send + Sync + 'static,
    {
        self.factories.insert(kind.into(), Box::new(factory));
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.factories.contains_key(kind)
    }

    /// Registered type names, sorted.
    pub fn kinds(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }

    pub fn create(&self, kind: &str) -> Result<Box<dyn BuildComponent>> {
        let factory = self.factories.get(kind).ok_or_else(|| {
            let known: Vec<&str> = self.kinds().collect();
            DocweaveError::config(format!(
                "unknown component type '{kind}' (known: {})",
                known.join(", ")
            ))
        })?;
        Ok(factory())
    }

    /// Build the stage for one pipeline declaration.
    pub fn stage(&self, declaration: &ComponentDeclaration) -> Result<PipelineStage> {
        let component = self.create(&declaration.kind)?;
        Ok(PipelineStage::new(declaration.display_name(), component)
            .with_config(declaration.component_config()))
    }
}

impl Default for ComponentRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Noop;

    impl BuildComponent for Noop {
        fn initialize(&mut self, _: &ComponentConfig, _: &mut BuildContext) -> Result<()> {
            Ok(())
        }
        fn apply(&self, _: &mut Document, _: &str, _: &mut TopicDiagnostics) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn builtins_are_registered() {
        let registry = ComponentRegistry::with_builtins();
        let kinds: Vec<&str> = registry.kinds().collect();
        assert_eq!(
            kinds,
            vec![
                "copy_from_index",
                "resolve_conceptual_links",
                "resolve_reference_links",
                "save"
            ]
        );
    }

    #[test]
    fn unknown_type_is_a_config_error() {
        let registry = ComponentRegistry::with_builtins();
        let err = registry.create("transform_xsl").err().unwrap();
        assert!(matches!(err, DocweaveError::Config { .. }));
        assert!(err.to_string().contains("transform_xsl"));
    }

    #[test]
    fn stages_take_declared_name_and_config() {
        let mut registry = ComponentRegistry::new();
        registry.register("noop", || Box::new(Noop));

        let mut declaration = ComponentDeclaration::new("noop");
        declaration.name = Some("first noop".into());
        declaration
            .config
            .insert("answer".into(), toml::Value::Integer(42));

        let stage = registry.stage(&declaration).unwrap();
        assert_eq!(stage.name, "first noop");
        assert!(!stage.config.is_empty());

        let unnamed = registry.stage(&ComponentDeclaration::new("noop")).unwrap();
        assert_eq!(unnamed.name, "noop");
    }
}
