//! `copy_from_index`: copy nodes from indexed documents into topics.
//!
//! ```toml
//! [[components]]
//! type = "copy_from_index"
//! [components.config.index]
//! name = "comments"
//! value = "/doc/members/member"
//! key = "name"
//! sources = [{ path = "comments" }]
//!
//! [[components.config.copy]]
//! target = "/document/comments"
//! source = "."
//! key = "{key}"
//! ```

use std::sync::{Arc, LazyLock};

use regex::Regex;
use serde::Deserialize;
use tracing::{info, instrument, warn};

use docweave_document::{Document, Element, ElementPath};
use docweave_index::{CacheOptions, IndexRule, IndexedFileCache};
use docweave_shared::{ComponentConfig, DocweaveError, Result, SourceSpec};

use crate::component::BuildComponent;
use crate::context::{BuildContext, TopicDiagnostics};

const COMPONENT: &str = "copy_from_index";

static ATTR_PLACEHOLDER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{@([^}]+)\}").expect("valid regex"));

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct CopyConfig {
    #[serde(default)]
    index: Option<IndexConfig>,
    #[serde(default)]
    copy: Vec<CopyCommandConfig>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct IndexConfig {
    name: String,
    value: String,
    key: String,
    #[serde(default)]
    cache_size: Option<usize>,
    #[serde(default)]
    max_bytes: Option<u64>,
    sources: Vec<SourceSpec>,
    #[serde(default = "default_allow_partial")]
    allow_partial: bool,
}

fn default_allow_partial() -> bool {
    true
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct CopyCommandConfig {
    /// Index to read from; defaults to the one this component builds.
    #[serde(default)]
    index: Option<String>,
    source: String,
    target: String,
    #[serde(default = "default_key_template")]
    key: String,
    #[serde(default)]
    missing: MissingPolicy,
}

fn default_key_template() -> String {
    "{key}".to_string()
}

/// What to do when the computed key is not in the index.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingPolicy {
    #[default]
    Warn,
    Ignore,
    Error,
}

#[derive(Debug)]
struct CopyCommand {
    index_name: String,
    source: ElementPath,
    target: ElementPath,
    key_template: String,
    missing: MissingPolicy,
    cache: Option<Arc<IndexedFileCache>>,
}

/// Copies nodes selected from a cached document into every matching target
/// element of the topic.
#[derive(Debug, Default)]
pub struct CopyFromIndexComponent {
    index: Option<IndexConfig>,
    commands: Vec<CopyCommand>,
}

impl CopyFromIndexComponent {
    pub fn new() -> Self {
        Self::default()
    }
}

impl BuildComponent for CopyFromIndexComponent {
    fn initialize(&mut self, config: &ComponentConfig, _context: &mut BuildContext) -> Result<()> {
        let config: CopyConfig = config.parse(COMPONENT)?;

        let own_index = config.index.as_ref().map(|index| index.name.clone());
        self.commands = config
            .copy
            .into_iter()
            .map(|command| {
                let index_name = command
                    .index
                    .or_else(|| own_index.clone())
                    .ok_or_else(|| {
                        DocweaveError::config(
                            "copy command has no index and the component builds none",
                        )
                    })?;
                Ok(CopyCommand {
                    index_name,
                    source: ElementPath::parse(&command.source)?,
                    target: ElementPath::parse(&command.target)?,
                    key_template: command.key,
                    missing: command.missing,
                    cache: None,
                })
            })
            .collect::<Result<_>>()?;

        if let Some(index) = &config.index {
            ElementPath::parse(&index.value)?;
            if index.sources.is_empty() {
                return Err(DocweaveError::config(format!(
                    "index '{}' has no sources",
                    index.name
                )));
            }
        }
        self.index = config.index;
        Ok(())
    }

    #[instrument(skip_all, fields(component = COMPONENT))]
    fn build_index(&mut self, context: &mut BuildContext) -> Result<()> {
        if let Some(index) = &self.index {
            let mut files = Vec::new();
            for source in &index.sources {
                let spec = SourceSpec::new(context.resolve_path(&source.path), source.format);
                files.extend(spec.files()?);
            }

            let rule = IndexRule::new(&index.value, index.key.clone())?;
            let mut options =
                CacheOptions::new(index.cache_size.unwrap_or(context.settings().default_cache_size));
            if let Some(max_bytes) = index.max_bytes {
                options = options.with_max_bytes(max_bytes);
            }

            let (cache, status) = IndexedFileCache::build(&index.name, &files, &rule, options);
            if !status.is_complete() {
                let failed: Vec<String> = status
                    .failed
                    .iter()
                    .map(|f| format!("{}: {}", f.path.display(), f.reason))
                    .collect();
                if !index.allow_partial {
                    return Err(DocweaveError::index(format!(
                        "index '{}' is incomplete: {}",
                        index.name,
                        failed.join("; ")
                    )));
                }
                warn!(index = %index.name, failed = failed.len(), "continuing with a partial index");
            }
            info!(
                index = %index.name,
                files = files.len(),
                documents = status.documents,
                "index ready"
            );
            context.register_cache(&index.name, Arc::new(cache))?;
        }

        for command in &mut self.commands {
            let cache = context.cache(&command.index_name).ok_or_else(|| {
                DocweaveError::config(format!("no index named '{}'", command.index_name))
            })?;
            command.cache = Some(cache);
        }
        Ok(())
    }

    fn apply(
        &self,
        document: &mut Document,
        key: &str,
        diagnostics: &mut TopicDiagnostics,
    ) -> Result<()> {
        for command in &self.commands {
            let Some(cache) = &command.cache else {
                return Err(DocweaveError::index(format!(
                    "index '{}' is not built",
                    command.index_name
                )));
            };
            document.for_each_match_mut(&command.target, |target| {
                let lookup = expand_key(&command.key_template, key, target);
                if !cache.contains(&lookup) {
                    return match command.missing {
                        MissingPolicy::Ignore => Ok(()),
                        MissingPolicy::Warn => {
                            diagnostics.warn(format!(
                                "no entry '{lookup}' in index '{}'",
                                command.index_name
                            ));
                            Ok(())
                        }
                        MissingPolicy::Error => Err(DocweaveError::DocumentNotFound { id: lookup }),
                    };
                }
                let cached = cache.get(&lookup)?;
                for node in cached.document().root.select(&command.source) {
                    target.push_element(node.clone());
                }
                Ok(())
            })?;
        }
        Ok(())
    }

    fn dispose(&mut self) {
        for command in &mut self.commands {
            command.cache = None;
        }
    }
}

/// Expand `{key}` to the topic key and `{@attr}` to attributes of `target`.
fn expand_key(template: &str, key: &str, target: &Element) -> String {
    let with_key = template.replace("{key}", key);
    ATTR_PLACEHOLDER_RE
        .replace_all(&with_key, |caps: &regex::Captures<'_>| {
            target.attr(&caps[1]).unwrap_or_default().to_string()
        })
        .into_owned()
}
