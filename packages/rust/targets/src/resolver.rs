//! Reference link resolution: symbolic id in, renderable link out.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::trace;
use url::Url;

use docweave_document::Element;
use docweave_shared::{DocweaveError, LinkKind, Result, Target};

use crate::api_id::{ApiId, kind_prefixes};
use crate::dictionary::TargetDictionary;

/// What to do with an id the dictionary does not know.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FallbackStrategy {
    /// Link API ids to an external site. `{id}`, `{name}` (member path) and
    /// `{lower_name}` are substituted.
    External { url_template: String },
    /// Render the id as unlinked text.
    PlainText,
}

impl FallbackStrategy {
    pub fn name(&self) -> &'static str {
        match self {
            Self::External { .. } => "external",
            Self::PlainText => "plain_text",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    /// Found in the dictionary.
    Target,
    /// Rendered by the external fallback.
    External,
    /// Unlinked text.
    Unresolved,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenderableLink {
    pub display_text: String,
    pub url: Option<String>,
    pub kind: LinkKind,
    pub resolution: Resolution,
}

impl RenderableLink {
    pub fn is_resolved(&self) -> bool {
        self.resolution == Resolution::Target
    }

    /// `<a href="..">` when there is a URL, `<span class="nolink">` otherwise.
    /// `text` overrides the display text when it has content.
    pub fn to_element(&self, text: Option<&str>) -> Element {
        let text = text
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .unwrap_or(&self.display_text);
        match &self.url {
            Some(url) => Element::new("a").with_attr("href", url).with_text(text),
            None => Element::new("span").with_attr("class", "nolink").with_text(text),
        }
    }
}

/// Resolves ids against one dictionary, falling back through the configured
/// strategies. Resolution never fails.
#[derive(Debug, Clone)]
pub struct ReferenceLinkResolver {
    dictionary: Arc<TargetDictionary>,
    fallbacks: Vec<FallbackStrategy>,
}

impl ReferenceLinkResolver {
    /// Fails only when an external URL template cannot produce a valid URL.
    pub fn new(dictionary: Arc<TargetDictionary>, fallbacks: Vec<FallbackStrategy>) -> Result<Self> {
        for fallback in &fallbacks {
            if let FallbackStrategy::External { url_template } = fallback {
                let probe = expand_template(url_template, "T:Ns.Type", "Ns.Type");
                Url::parse(&probe).map_err(|e| {
                    DocweaveError::config(format!("invalid url_template '{url_template}': {e}"))
                })?;
            }
        }
        Ok(Self {
            dictionary,
            fallbacks,
        })
    }

    pub fn dictionary(&self) -> &TargetDictionary {
        &self.dictionary
    }

    /// An id nothing resolves is rendered verbatim as unlinked text.
    pub fn resolve(&self, raw_id: &str, preferred_kinds: &[LinkKind]) -> RenderableLink {
        let id = raw_id.trim();

        if let Some(target) = self.find(id, preferred_kinds) {
            return from_target(target, None);
        }
        if let Some((base, anchor)) = id.split_once('#') {
            if !base.is_empty() && !anchor.is_empty() {
                if let Some(target) = self.find(base, preferred_kinds) {
                    return from_target(target, Some(anchor));
                }
            }
        }

        let api = ApiId::parse(id);
        for fallback in &self.fallbacks {
            match fallback {
                FallbackStrategy::External { url_template } => {
                    let Some(api) = api.as_ref() else {
                        continue;
                    };
                    trace!(id, "resolved by external fallback");
                    return RenderableLink {
                        display_text: api.name(),
                        url: Some(expand_template(url_template, id, api.member_path())),
                        kind: api.kind(),
                        resolution: Resolution::External,
                    };
                }
                FallbackStrategy::PlainText => break,
            }
        }

        unresolved(raw_id, api.as_ref())
    }

    /// Name of the fallback that [`resolve`](Self::resolve) would use for an
    /// id not in the dictionary.
    pub fn fallback_name(&self, id: &str) -> &'static str {
        let is_api = ApiId::has_prefix(id);
        for fallback in &self.fallbacks {
            match fallback {
                FallbackStrategy::External { .. } if is_api => return "external",
                FallbackStrategy::External { .. } => continue,
                FallbackStrategy::PlainText => return "plain_text",
            }
        }
        "plain_text"
    }

    fn find(&self, id: &str, preferred_kinds: &[LinkKind]) -> Option<&Target> {
        if let Some(target) = self.dictionary.lookup(id) {
            return Some(target);
        }
        if ApiId::has_prefix(id) {
            return None;
        }
        preferred_kinds
            .iter()
            .flat_map(|kind| kind_prefixes(*kind))
            .find_map(|prefix| self.dictionary.lookup(&format!("{prefix}{id}")))
    }
}

fn from_target(target: &Target, anchor: Option<&str>) -> RenderableLink {
    let url = match anchor {
        Some(anchor) => target.clone().with_anchor(anchor).href(),
        None => target.href(),
    };
    RenderableLink {
        display_text: target.display_text.clone(),
        url,
        kind: target.link_kind,
        resolution: Resolution::Target,
    }
}

fn unresolved(raw_id: &str, api: Option<&ApiId>) -> RenderableLink {
    RenderableLink {
        display_text: raw_id.to_string(),
        url: None,
        kind: api.map_or(LinkKind::Other, ApiId::kind),
        resolution: Resolution::Unresolved,
    }
}

fn expand_template(template: &str, id: &str, name: &str) -> String {
    template
        .replace("{id}", id)
        .replace("{lower_name}", &name.to_lowercase())
        .replace("{name}", name)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dictionary() -> Arc<TargetDictionary> {
        Arc::new(TargetDictionary::from_targets([
            Target::new("N:Demo", "Demo", LinkKind::Namespace).with_url("N_Demo.htm"),
            Target::new("T:Demo.Widget", "Widget", LinkKind::Type).with_url("T_Demo_Widget.htm"),
            Target::new("M:Demo.Widget.Spin", "Spin", LinkKind::Member)
                .with_url("M_Demo_Widget_Spin.htm"),
            Target::new("welcome", "Welcome", LinkKind::ConceptualTopic).with_url("welcome.htm"),
        ]))
    }

    fn external() -> FallbackStrategy {
        FallbackStrategy::External {
            url_template: "https://learn.microsoft.com/dotnet/api/{lower_name}".into(),
        }
    }

    #[test]
    fn exact_id_resolves_to_target() {
        let resolver = ReferenceLinkResolver::new(dictionary(), vec![]).unwrap();
        let link = resolver.resolve("T:Demo.Widget", &[]);
        assert_eq!(link.display_text, "Widget");
        assert_eq!(link.url.as_deref(), Some("T_Demo_Widget.htm"));
        assert_eq!(link.kind, LinkKind::Type);
        assert!(link.is_resolved());
    }

    #[test]
    fn unprefixed_id_tries_preferred_kinds_in_order() {
        let resolver = ReferenceLinkResolver::new(dictionary(), vec![]).unwrap();
        let link = resolver.resolve("Demo.Widget.Spin", &[LinkKind::Type, LinkKind::Member]);
        assert_eq!(link.url.as_deref(), Some("M_Demo_Widget_Spin.htm"));

        let ns = resolver.resolve("Demo", &[LinkKind::Namespace, LinkKind::Type]);
        assert_eq!(ns.kind, LinkKind::Namespace);

        let none = resolver.resolve("Demo.Widget", &[LinkKind::Member]);
        assert!(!none.is_resolved());
    }

    #[test]
    fn anchors_are_carried_onto_the_url() {
        let resolver = ReferenceLinkResolver::new(dictionary(), vec![]).unwrap();
        let link = resolver.resolve("welcome#setup", &[LinkKind::ConceptualTopic]);
        assert_eq!(link.url.as_deref(), Some("welcome.htm#setup"));
        assert_eq!(link.display_text, "Welcome");
    }

    #[test]
    fn constructor_ids_are_not_split_as_anchors() {
        let dictionary = Arc::new(TargetDictionary::from_targets([Target::new(
            "M:Demo.Widget.#ctor",
            "Widget",
            LinkKind::Member,
        )
        .with_url("ctor.htm")]));
        let resolver = ReferenceLinkResolver::new(dictionary, vec![]).unwrap();
        let link = resolver.resolve("M:Demo.Widget.#ctor", &[]);
        assert_eq!(link.url.as_deref(), Some("ctor.htm"));
    }

    #[test]
    fn external_fallback_applies_to_api_ids_only() {
        let resolver =
            ReferenceLinkResolver::new(dictionary(), vec![external(), FallbackStrategy::PlainText])
                .unwrap();

        let link = resolver.resolve("T:System.String", &[]);
        assert_eq!(link.resolution, Resolution::External);
        assert_eq!(
            link.url.as_deref(),
            Some("https://learn.microsoft.com/dotnet/api/system.string")
        );
        assert_eq!(link.display_text, "String");
        assert_eq!(resolver.fallback_name("T:System.String"), "external");

        let plain = resolver.resolve("missing-topic", &[]);
        assert_eq!(plain.resolution, Resolution::Unresolved);
        assert_eq!(plain.url, None);
        assert_eq!(plain.display_text, "missing-topic");
        assert_eq!(resolver.fallback_name("missing-topic"), "plain_text");
    }

    #[test]
    fn plain_text_first_disables_later_fallbacks() {
        let resolver =
            ReferenceLinkResolver::new(dictionary(), vec![FallbackStrategy::PlainText, external()])
                .unwrap();
        let link = resolver.resolve("T:System.String", &[]);
        assert_eq!(link.resolution, Resolution::Unresolved);
        assert_eq!(link.display_text, "T:System.String");
        assert_eq!(link.kind, LinkKind::Type);
    }

    #[test]
    fn unresolved_api_ids_keep_the_raw_id_as_text() {
        let empty = Arc::new(TargetDictionary::from_targets(Vec::<Target>::new()));
        let resolver =
            ReferenceLinkResolver::new(empty, vec![FallbackStrategy::PlainText]).unwrap();

        for id in ["T:System.String", "M:Demo.Widget.#ctor", "P:Demo.Widget.Size(System.Int32)"] {
            let link = resolver.resolve(id, &[LinkKind::Member]);
            assert_eq!(link.resolution, Resolution::Unresolved);
            assert_eq!(link.display_text, id);
            assert!(link.url.is_none());
        }
        assert_eq!(
            resolver.resolve("M:Demo.Widget.#ctor", &[]).kind,
            LinkKind::Member
        );
    }

    #[test]
    fn resolve_never_fails() {
        let resolver = ReferenceLinkResolver::new(dictionary(), vec![]).unwrap();
        for id in ["", "#", "T:", "###", "  spaced  ", "M:Nope.Nope(", "a#"] {
            let link = resolver.resolve(id, &[LinkKind::Member]);
            assert_eq!(link.resolution, Resolution::Unresolved, "{id:?}");
            assert!(link.url.is_none());
        }
        assert_eq!(resolver.resolve("  spaced  ", &[]).display_text, "  spaced  ");
    }

    #[test]
    fn invalid_template_is_rejected() {
        let err = ReferenceLinkResolver::new(
            dictionary(),
            vec![FallbackStrategy::External {
                url_template: "not a url {id}".into(),
            }],
        )
        .unwrap_err();
        assert!(err.to_string().contains("url_template"));
    }

    #[test]
    fn renders_links_and_nolinks() {
        let resolver = ReferenceLinkResolver::new(dictionary(), vec![]).unwrap();

        let a = resolver.resolve("T:Demo.Widget", &[]).to_element(None);
        assert_eq!(a.to_xml_string(), r#"<a href="T_Demo_Widget.htm">Widget</a>"#);

        let custom = resolver
            .resolve("T:Demo.Widget", &[])
            .to_element(Some(" the widget "));
        assert_eq!(custom.text(), "the widget");

        let span = resolver.resolve("T:Demo.Gone", &[]).to_element(Some("  "));
        assert_eq!(span.to_xml_string(), r#"<span class="nolink">T:Demo.Gone</span>"#);
    }

    #[test]
    fn fallback_config_deserializes() {
        #[derive(Deserialize)]
        struct Wrapper {
            fallbacks: Vec<FallbackStrategy>,
        }
        let parsed: Wrapper = toml::from_str(
            r#"
            [[fallbacks]]
            type = "external"
            url_template = "https://example.com/{id}"

            [[fallbacks]]
            type = "plain_text"
            "#,
        )
        .unwrap();
        assert_eq!(parsed.fallbacks.len(), 2);
        assert_eq!(parsed.fallbacks[1], FallbackStrategy::PlainText);
    }
}
