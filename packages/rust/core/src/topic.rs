//! Topics and the manifest that lists them.

use std::collections::HashSet;
use std::path::Path;

use tracing::{info, instrument, warn};

use docweave_document::{Document, ElementPath, stream_elements};
use docweave_shared::{DocweaveError, Result};

/// One document flowing through the pipeline, addressed by `key`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topic {
    pub key: String,
    pub document: Document,
}

impl Topic {
    pub fn new(key: impl Into<String>, document: Document) -> Self {
        Self {
            key: key.into(),
            document,
        }
    }

    /// Start a topic from a copy of `skeleton`.
    pub fn from_skeleton(key: impl Into<String>, skeleton: &Document) -> Self {
        Self::new(key, skeleton.clone())
    }
}

/// Read topic keys from a `<topics><topic id=".."/></topics>` manifest, in
/// file order. Repeated keys are dropped with a warning.
#[instrument(skip_all, fields(manifest = %path.display()))]
pub fn load_manifest(path: &Path) -> Result<Vec<String>> {
    let rule = ElementPath::parse("/topics/topic")?;
    let mut keys = Vec::new();
    let mut seen = HashSet::new();

    stream_elements(path, &rule, |topic| {
        let key = topic
            .attr("id")
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| {
                DocweaveError::validation(format!(
                    "{}: <topic> entry #{} has no id",
                    path.display(),
                    keys.len() + 1
                ))
            })?;
        if seen.insert(key.to_string()) {
            keys.push(key.to_string());
        } else {
            warn!(key, "topic listed more than once, ignoring repeat");
        }
        Ok(())
    })?;

    info!(topics = keys.len(), "manifest loaded");
    Ok(keys)
}

/// Load the manifest and create one topic per key from `skeleton`.
pub fn load_topics(manifest: &Path, skeleton: &Document) -> Result<Vec<Topic>> {
    Ok(load_manifest(manifest)?
        .into_iter()
        .map(|key| Topic::from_skeleton(key, skeleton))
        .collect())
}

/// The skeleton used when none is configured: an empty `<document />`.
pub fn default_skeleton() -> Document {
    Document::new(docweave_document::Element::new("document"))
}
