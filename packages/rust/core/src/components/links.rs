//! `resolve_reference_links` and `resolve_conceptual_links`: rewrite link
//! elements into anchors using a target dictionary.

use std::path::PathBuf;
use std::sync::Arc;

use serde::Deserialize;
use tracing::{debug, instrument};

use docweave_document::{Document, Element, ElementPath, Node};
use docweave_shared::{ComponentConfig, DocweaveError, LinkKind, Result, SourceFormat, SourceSpec};
use docweave_targets::{
    ContentMetadataProvider, DEFAULT_EXTENSION, FallbackStrategy, ReferenceLinkResolver,
    ReflectionProvider, StaticProvider, StaticTarget, TargetDictionary, TargetProvider,
};

use crate::component::BuildComponent;
use crate::context::{BuildContext, TopicDiagnostics};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct LinksConfig {
    /// Share the dictionary under this name, or reuse one built earlier.
    #[serde(default)]
    dictionary: Option<String>,
    #[serde(default)]
    targets: Vec<ProviderConfig>,
    #[serde(default)]
    fallbacks: Option<Vec<FallbackStrategy>>,
    #[serde(default)]
    element: Option<String>,
    #[serde(default)]
    attribute: Option<String>,
    #[serde(default)]
    preferred_kinds: Option<Vec<LinkKind>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ProviderConfig {
    Reflection {
        #[serde(default)]
        name: Option<String>,
        sources: Vec<PathBuf>,
        #[serde(default)]
        base_url: String,
        #[serde(default)]
        extension: Option<String>,
    },
    ContentMetadata {
        #[serde(default)]
        name: Option<String>,
        sources: Vec<PathBuf>,
        #[serde(default)]
        base_url: String,
        #[serde(default)]
        extension: Option<String>,
    },
    Static {
        #[serde(default)]
        name: Option<String>,
        entries: Vec<StaticTarget>,
    },
}

impl ProviderConfig {
    fn build(&self, index: usize, context: &BuildContext) -> Result<Box<dyn TargetProvider>> {
        let expand = |sources: &[PathBuf], format: SourceFormat| -> Result<Vec<PathBuf>> {
            let mut files = Vec::new();
            for path in sources {
                files.extend(SourceSpec::new(context.resolve_path(path), format).files()?);
            }
            Ok(files)
        };
        let provider: Box<dyn TargetProvider> = match self {
            Self::Reflection {
                name,
                sources,
                base_url,
                extension,
            } => Box::new(
                ReflectionProvider::new(
                    name.clone().unwrap_or_else(|| format!("reflection #{}", index + 1)),
                    expand(sources, SourceFormat::Reflection)?,
                )
                .with_base_url(base_url)
                .with_extension(extension.as_deref().unwrap_or(DEFAULT_EXTENSION)),
            ),
            Self::ContentMetadata {
                name,
                sources,
                base_url,
                extension,
            } => Box::new(
                ContentMetadataProvider::new(
                    name.clone()
                        .unwrap_or_else(|| format!("content metadata #{}", index + 1)),
                    expand(sources, SourceFormat::ContentMetadata)?,
                )
                .with_base_url(base_url)
                .with_extension(extension.as_deref().unwrap_or(DEFAULT_EXTENSION)),
            ),
            Self::Static { name, entries } => Box::new(StaticProvider::new(
                name.clone().unwrap_or_else(|| format!("static #{}", index + 1)),
                entries.clone(),
            )),
        };
        Ok(provider)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flavor {
    Reference,
    Conceptual,
}

impl Flavor {
    fn component(self) -> &'static str {
        match self {
            Self::Reference => "resolve_reference_links",
            Self::Conceptual => "resolve_conceptual_links",
        }
    }

    fn element(self) -> &'static str {
        match self {
            Self::Reference => "referenceLink",
            Self::Conceptual => "link",
        }
    }

    fn attribute(self) -> &'static str {
        match self {
            Self::Reference => "target",
            Self::Conceptual => "xlink:href",
        }
    }

    fn preferred_kinds(self) -> Vec<LinkKind> {
        match self {
            Self::Reference => vec![LinkKind::Type, LinkKind::Member, LinkKind::Namespace],
            Self::Conceptual => vec![LinkKind::ConceptualTopic],
        }
    }
}

/// Rewrites link elements into `<a href>` (resolved or external) or
/// `<span class="nolink">` (unresolved).
#[derive(Debug)]
pub struct ResolveLinksComponent {
    flavor: Flavor,
    config: Option<LinksConfig>,
    selector: Option<ElementPath>,
    attribute: String,
    preferred_kinds: Vec<LinkKind>,
    resolver: Option<ReferenceLinkResolver>,
}

impl ResolveLinksComponent {
    /// `referenceLink` elements with a `target` attribute.
    pub fn reference() -> Self {
        Self::with_flavor(Flavor::Reference)
    }

    /// `link` elements with an `xlink:href` attribute; anchors allowed.
    pub fn conceptual() -> Self {
        Self::with_flavor(Flavor::Conceptual)
    }

    fn with_flavor(flavor: Flavor) -> Self {
        Self {
            flavor,
            config: None,
            selector: None,
            attribute: flavor.attribute().to_string(),
            preferred_kinds: flavor.preferred_kinds(),
            resolver: None,
        }
    }

    fn render(
        &self,
        resolver: &ReferenceLinkResolver,
        link: &Element,
        diagnostics: &mut TopicDiagnostics,
    ) -> Element {
        let inner = link.has_content().then(|| link.text());
        let id = link
            .attr(&self.attribute)
            .map(str::trim)
            .filter(|id| !id.is_empty());
        let Some(id) = id else {
            diagnostics.warn(format!(
                "<{}> without a '{}' attribute",
                link.name, self.attribute
            ));
            return Element::new("span")
                .with_attr("class", "nolink")
                .with_text(inner.unwrap_or_default());
        };

        let rendered = resolver.resolve(id, &self.preferred_kinds);
        if !rendered.is_resolved() {
            diagnostics.miss(id, resolver.fallback_name(id));
        }
        rendered.to_element(inner.as_deref())
    }
}

impl BuildComponent for ResolveLinksComponent {
    fn initialize(&mut self, config: &ComponentConfig, _context: &mut BuildContext) -> Result<()> {
        let component = self.flavor.component();
        let config: LinksConfig = config.parse(component)?;

        if config.targets.is_empty() && config.dictionary.is_none() {
            return Err(DocweaveError::config(format!(
                "{component} needs [[targets]] or the name of a shared dictionary"
            )));
        }

        let element = config.element.as_deref().unwrap_or(self.flavor.element());
        self.selector = Some(ElementPath::parse(&format!("//{element}"))?);
        if let Some(attribute) = &config.attribute {
            self.attribute = attribute.clone();
        }
        if let Some(kinds) = &config.preferred_kinds {
            self.preferred_kinds = kinds.clone();
        }
        self.config = Some(config);
        Ok(())
    }

    #[instrument(skip_all, fields(component = self.flavor.component()))]
    fn build_index(&mut self, context: &mut BuildContext) -> Result<()> {
        let Some(config) = &self.config else {
            return Err(DocweaveError::InvalidState {
                expected: "initialized".into(),
                found: "uninitialized".into(),
            });
        };

        let dictionary = if config.targets.is_empty() {
            let name = config.dictionary.as_deref().unwrap_or_default();
            context.dictionary(name).ok_or_else(|| {
                DocweaveError::config(format!("no target dictionary named '{name}'"))
            })?
        } else {
            let providers = config
                .targets
                .iter()
                .enumerate()
                .map(|(i, provider)| provider.build(i, context))
                .collect::<Result<Vec<_>>>()?;
            let dictionary = Arc::new(TargetDictionary::build(&providers)?);
            if let Some(name) = &config.dictionary {
                context.register_dictionary(name, Arc::clone(&dictionary))?;
            }
            dictionary
        };

        let fallbacks = config
            .fallbacks
            .clone()
            .unwrap_or_else(|| vec![FallbackStrategy::PlainText]);
        debug!(targets = dictionary.len(), fallbacks = fallbacks.len(), "resolver ready");
        self.resolver = Some(ReferenceLinkResolver::new(dictionary, fallbacks)?);
        Ok(())
    }

    fn apply(
        &self,
        document: &mut Document,
        _key: &str,
        diagnostics: &mut TopicDiagnostics,
    ) -> Result<()> {
        let (Some(selector), Some(resolver)) = (&self.selector, &self.resolver) else {
            return Err(DocweaveError::InvalidState {
                expected: "ready".into(),
                found: "not built".into(),
            });
        };
        document.replace_matches(selector, |link| {
            Ok(Some(vec![Node::Element(self.render(resolver, link, diagnostics))]))
        })?;
        Ok(())
    }

    fn dispose(&mut self) {
        self.resolver = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(src: &str) -> ComponentConfig {
        ComponentConfig::new(toml::from_str(src).unwrap())
    }

    fn temp_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "docweave-links-test-{}",
            uuid::Uuid::now_v7()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    const STATIC_TARGETS: &str = r#"
        [[targets]]
        type = "static"
        entries = [
          { id = "T:Demo.Widget", url = "T_Demo_Widget.htm", display_text = "Widget" },
          { id = "welcome", url = "welcome.htm", display_text = "Welcome", kind = "conceptual_topic" },
        ]
    "#;

    fn ready(mut component: ResolveLinksComponent, src: &str) -> (ResolveLinksComponent, BuildContext) {
        let mut context = BuildContext::default();
        component.initialize(&config(src), &mut context).unwrap();
        component.build_index(&mut context).unwrap();
        (component, context)
    }

    #[test]
    fn reference_links_become_anchors_or_nolinks() {
        let (component, _ctx) = ready(ResolveLinksComponent::reference(), STATIC_TARGETS);
        let mut doc = Document::parse(
            r#"<document><p>See <referenceLink target="T:Demo.Widget" /> and <referenceLink target="T:Demo.Gone">the gone one</referenceLink>.</p></document>"#,
        )
        .unwrap();
        let mut diag = TopicDiagnostics::new("T:Demo");
        component.apply(&mut doc, "T:Demo", &mut diag).unwrap();

        assert_eq!(
            doc.to_xml_string(),
            r#"<document><p>See <a href="T_Demo_Widget.htm">Widget</a> and <span class="nolink">the gone one</span>.</p></document>"#
        );
        assert_eq!(diag.misses().len(), 1);
        assert_eq!(diag.misses()[0].id, "T:Demo.Gone");
        assert_eq!(diag.misses()[0].fallback, "plain_text");
    }

    #[test]
    fn unprefixed_reference_ids_use_preferred_kinds() {
        let (component, _ctx) = ready(ResolveLinksComponent::reference(), STATIC_TARGETS);
        let mut doc =
            Document::parse(r#"<document><referenceLink target="Demo.Widget" /></document>"#).unwrap();
        let mut diag = TopicDiagnostics::new("k");
        component.apply(&mut doc, "k", &mut diag).unwrap();
        assert!(doc.to_xml_string().contains("T_Demo_Widget.htm"));
        assert!(diag.misses().is_empty());
    }

    #[test]
    fn conceptual_links_support_anchors() {
        let (component, _ctx) = ready(ResolveLinksComponent::conceptual(), STATIC_TARGETS);
        let mut doc = Document::parse(
            r#"<document><link xlink:href="welcome#setup" /><link>no target</link></document>"#,
        )
        .unwrap();
        let mut diag = TopicDiagnostics::new("k");
        component.apply(&mut doc, "k", &mut diag).unwrap();

        assert_eq!(
            doc.to_xml_string(),
            r#"<document><a href="welcome.htm#setup">Welcome</a><span class="nolink">no target</span></document>"#
        );
        assert_eq!(diag.warnings().len(), 1);
    }

    #[test]
    fn external_fallback_is_recorded_as_a_miss() {
        let src = format!(
            r#"
            {STATIC_TARGETS}
            [[fallbacks]]
            type = "external"
            url_template = "https://learn.microsoft.com/dotnet/api/{{lower_name}}"
            "#
        );
        let (component, _ctx) = ready(ResolveLinksComponent::reference(), &src);
        let mut doc =
            Document::parse(r#"<document><referenceLink target="T:System.String" /></document>"#)
                .unwrap();
        let mut diag = TopicDiagnostics::new("k");
        component.apply(&mut doc, "k", &mut diag).unwrap();

        assert_eq!(
            doc.to_xml_string(),
            r#"<document><a href="https://learn.microsoft.com/dotnet/api/system.string">String</a></document>"#
        );
        assert_eq!(diag.misses()[0].fallback, "external");
    }

    #[test]
    fn dictionaries_are_shared_by_name() {
        let mut context = BuildContext::default();
        let mut first = ResolveLinksComponent::reference();
        let src = format!("dictionary = \"api\"\n{STATIC_TARGETS}");
        first.initialize(&config(&src), &mut context).unwrap();
        first.build_index(&mut context).unwrap();
        assert!(context.dictionary("api").is_some());

        let mut second = ResolveLinksComponent::conceptual();
        second
            .initialize(&config("dictionary = \"api\""), &mut context)
            .unwrap();
        second.build_index(&mut context).unwrap();

        let mut missing = ResolveLinksComponent::conceptual();
        missing
            .initialize(&config("dictionary = \"other\""), &mut context)
            .unwrap();
        assert!(missing.build_index(&mut context).is_err());
    }

    #[test]
    fn reflection_sources_resolve_against_base_dir() {
        let dir = temp_dir();
        std::fs::write(
            dir.join("reflection.xml"),
            r#"<reflection><apis><api id="T:Demo.Widget"><apidata name="Widget" group="type" /><file name="T_Demo_Widget" /></api></apis></reflection>"#,
        )
        .unwrap();
        let mut context = BuildContext::default().with_base_dir(&dir);
        let mut component = ResolveLinksComponent::reference();
        let src = r#"
            [[targets]]
            type = "reflection"
            sources = ["reflection.xml"]
            base_url = "../html/"
        "#;
        component.initialize(&config(src), &mut context).unwrap();
        component.build_index(&mut context).unwrap();

        let mut doc =
            Document::parse(r#"<document><referenceLink target="T:Demo.Widget" /></document>"#).unwrap();
        component
            .apply(&mut doc, "k", &mut TopicDiagnostics::new("k"))
            .unwrap();
        assert!(doc.to_xml_string().contains("../html/T_Demo_Widget.htm"));
    }

    #[test]
    fn needs_targets_or_dictionary() {
        let mut component = ResolveLinksComponent::reference();
        assert!(
            component
                .initialize(&config(""), &mut BuildContext::default())
                .is_err()
        );
    }
}
