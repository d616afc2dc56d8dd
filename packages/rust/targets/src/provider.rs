//! Target providers: each one reads a source and produces [`Target`]s.

use std::path::PathBuf;

use serde::Deserialize;
use tracing::{debug, instrument};
use url::Url;

use docweave_document::{Element, ElementPath, stream_elements};
use docweave_shared::{DocweaveError, LinkKind, Result, Target};

use crate::api_id::ApiId;

pub const DEFAULT_EXTENSION: &str = ".htm";

/// A source of targets. Providers are loaded in parallel, so they must be
/// shareable across threads.
pub trait TargetProvider: Send + Sync {
    /// Name used in logs and error messages.
    fn name(&self) -> &str;

    /// Read every target this provider knows about, in source order.
    fn load(&self) -> Result<Vec<Target>>;
}

/// Join `path` onto `base`. Absolute bases go through [`Url::join`]; relative
/// bases (`../html/`) are concatenated.
pub fn join_url(base: &str, path: &str) -> Result<String> {
    if base.is_empty() {
        return Ok(path.to_string());
    }
    match Url::parse(base) {
        Ok(url) => url
            .join(path)
            .map(|u| u.to_string())
            .map_err(|e| DocweaveError::targets(format!("cannot join '{path}' onto '{base}': {e}"))),
        Err(_) if base.ends_with('/') => Ok(format!("{base}{path}")),
        Err(_) => Ok(format!("{base}/{path}")),
    }
}

// ---------------------------------------------------------------------------
// Reflection data
// ---------------------------------------------------------------------------

/// Targets from `/reflection/apis/api` elements of reflection data files.
#[derive(Debug, Clone)]
pub struct ReflectionProvider {
    name: String,
    files: Vec<PathBuf>,
    base_url: String,
    extension: String,
}

impl ReflectionProvider {
    pub fn new(name: impl Into<String>, files: Vec<PathBuf>) -> Self {
        Self {
            name: name.into(),
            files,
            base_url: String::new(),
            extension: DEFAULT_EXTENSION.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = extension.into();
        self
    }

    fn target_for(&self, api: &Element) -> Result<Option<Target>> {
        let Some(id) = api.attr("id") else {
            return Ok(None);
        };
        let parsed = ApiId::parse(id);
        let apidata = api.find_child("apidata");

        let kind = match apidata.and_then(|d| d.attr("group")) {
            Some("namespace") => LinkKind::Namespace,
            Some("type") => LinkKind::Type,
            Some("member") => LinkKind::Member,
            Some("root") => LinkKind::Other,
            _ => parsed.as_ref().map_or(LinkKind::Other, ApiId::kind),
        };
        let display = apidata
            .and_then(|d| d.attr("name"))
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .or_else(|| parsed.as_ref().map(ApiId::name))
            .unwrap_or_else(|| id.to_string());

        let mut target = Target::new(id, display, kind);
        if let Some(file) = api.find_child("file").and_then(|f| f.attr("name")) {
            let page = format!("{file}{}", self.extension);
            target = target.with_url(join_url(&self.base_url, &page)?);
        }
        Ok(Some(target))
    }
}

impl TargetProvider for ReflectionProvider {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(skip_all, fields(provider = %self.name, files = self.files.len()))]
    fn load(&self) -> Result<Vec<Target>> {
        let rule = ElementPath::parse("/reflection/apis/api")?;
        let mut targets = Vec::new();
        for file in &self.files {
            stream_elements(file, &rule, |api| {
                if let Some(target) = self.target_for(&api)? {
                    targets.push(target);
                }
                Ok(())
            })?;
        }
        debug!(targets = targets.len(), "reflection targets loaded");
        Ok(targets)
    }
}

// ---------------------------------------------------------------------------
// Conceptual content metadata
// ---------------------------------------------------------------------------

/// Targets from `/metadata/topic` elements describing conceptual topics.
#[derive(Debug, Clone)]
pub struct ContentMetadataProvider {
    name: String,
    files: Vec<PathBuf>,
    base_url: String,
    extension: String,
}

impl ContentMetadataProvider {
    pub fn new(name: impl Into<String>, files: Vec<PathBuf>) -> Self {
        Self {
            name: name.into(),
            files,
            base_url: String::new(),
            extension: DEFAULT_EXTENSION.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = extension.into();
        self
    }
}

impl TargetProvider for ContentMetadataProvider {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(skip_all, fields(provider = %self.name, files = self.files.len()))]
    fn load(&self) -> Result<Vec<Target>> {
        let rule = ElementPath::parse("/metadata/topic")?;
        let mut targets = Vec::new();
        for file in &self.files {
            stream_elements(file, &rule, |topic| {
                let Some(id) = topic.attr("id") else {
                    return Ok(());
                };
                let display = ["linkText", "title"]
                    .iter()
                    .filter_map(|name| topic.find_child(name))
                    .map(|el| el.text().trim().to_string())
                    .find(|text| !text.is_empty())
                    .unwrap_or_else(|| id.to_string());
                let url = join_url(&self.base_url, &format!("{id}{}", self.extension))?;
                targets.push(Target::new(id, display, LinkKind::ConceptualTopic).with_url(url));
                Ok(())
            })?;
        }
        debug!(targets = targets.len(), "content metadata targets loaded");
        Ok(targets)
    }
}

// ---------------------------------------------------------------------------
// Static
// ---------------------------------------------------------------------------

/// One inline entry of a static provider.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StaticTarget {
    pub id: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub display_text: Option<String>,
    #[serde(default)]
    pub kind: Option<LinkKind>,
    #[serde(default)]
    pub anchor: Option<String>,
}

/// Targets declared inline in configuration.
#[derive(Debug, Clone)]
pub struct StaticProvider {
    name: String,
    entries: Vec<StaticTarget>,
}

impl StaticProvider {
    pub fn new(name: impl Into<String>, entries: Vec<StaticTarget>) -> Self {
        Self {
            name: name.into(),
            entries,
        }
    }
}

impl TargetProvider for StaticProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn load(&self) -> Result<Vec<Target>> {
        self.entries
            .iter()
            .map(|entry| {
                if entry.url.is_none() && entry.anchor.is_none() {
                    return Err(DocweaveError::targets(format!(
                        "static target '{}' needs a url or an anchor",
                        entry.id
                    )));
                }
                let parsed = ApiId::parse(&entry.id);
                let kind = entry
                    .kind
                    .or_else(|| parsed.as_ref().map(ApiId::kind))
                    .unwrap_or(LinkKind::Other);
                let display = entry
                    .display_text
                    .clone()
                    .or_else(|| parsed.as_ref().map(ApiId::name))
                    .unwrap_or_else(|| entry.id.clone());
                let mut target = Target::new(&entry.id, display, kind);
                target.url = entry.url.clone();
                target.fragment_anchor = entry.anchor.clone();
                Ok(target)
            })
            .collect()
    }
}
