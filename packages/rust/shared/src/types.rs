//! Core domain types shared by the index, target and pipeline crates.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{DocweaveError, Result};

// ---------------------------------------------------------------------------
// RunId
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper identifying one pipeline run (time-sortable).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub Uuid);

impl RunId {
    /// Generate a new time-sortable run identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Targets
// ---------------------------------------------------------------------------

/// What kind of destination a [`Target`] points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkKind {
    Member,
    Type,
    Namespace,
    ConceptualTopic,
    Other,
}

impl LinkKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Member => "member",
            Self::Type => "type",
            Self::Namespace => "namespace",
            Self::ConceptualTopic => "conceptual_topic",
            Self::Other => "other",
        }
    }
}

impl std::fmt::Display for LinkKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One resolvable destination for a symbolic identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    /// Unique key within a dictionary (API member id, topic id, ...).
    pub id: String,
    /// Text shown for links to this target.
    pub display_text: String,
    /// Page URL, relative or absolute.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Anchor within the page, without the leading `#`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fragment_anchor: Option<String>,
    pub link_kind: LinkKind,
}

impl Target {
    pub fn new(id: impl Into<String>, display_text: impl Into<String>, kind: LinkKind) -> Self {
        Self {
            id: id.into(),
            display_text: display_text.into(),
            url: None,
            fragment_anchor: None,
            link_kind: kind,
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn with_anchor(mut self, anchor: impl Into<String>) -> Self {
        self.fragment_anchor = Some(anchor.into());
        self
    }

    /// The full link address: `url#anchor`, `#anchor`, or `url`.
    pub fn href(&self) -> Option<String> {
        match (&self.url, &self.fragment_anchor) {
            (Some(url), Some(anchor)) => Some(format!("{url}#{anchor}")),
            (None, Some(anchor)) => Some(format!("#{anchor}")),
            (Some(url), None) => Some(url.clone()),
            (None, None) => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Index entries and sources
// ---------------------------------------------------------------------------

/// Byte-range locator for one document inside a larger source file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub document_id: String,
    /// Position of the source file in the index's file table.
    pub source_file_id: usize,
    pub byte_offset: u64,
    pub byte_length: u64,
}

/// Format of a declared source file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceFormat {
    /// Generated reflection data (`/reflection/apis/api`).
    Reflection,
    /// Conceptual topic metadata (`/metadata/topic`).
    ContentMetadata,
    /// Any other XML file.
    #[default]
    Xml,
}

/// One `(path, format)` entry of a source manifest.
///
/// `path` may name a single file or a directory, in which case every `*.xml`
/// file directly inside it is used, in file-name order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceSpec {
    pub path: PathBuf,
    #[serde(default)]
    pub format: SourceFormat,
}

impl SourceSpec {
    pub fn new(path: impl Into<PathBuf>, format: SourceFormat) -> Self {
        Self {
            path: path.into(),
            format,
        }
    }

    /// Expand this entry into the concrete files it names.
    pub fn files(&self) -> Result<Vec<PathBuf>> {
        if !self.path.is_dir() {
            return Ok(vec![self.path.clone()]);
        }

        let entries =
            std::fs::read_dir(&self.path).map_err(|e| DocweaveError::io(&self.path, e))?;
        let mut files = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| DocweaveError::io(&self.path, e))?;
            let path = entry.path();
            if path.is_file() && has_xml_extension(&path) {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }
}

fn has_xml_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("xml"))
}

// ---------------------------------------------------------------------------
// Build report
// ---------------------------------------------------------------------------

/// A component's `apply` failed for one topic. The rest of the run continued.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicError {
    pub topic_key: String,
    pub component: String,
    pub message: String,
}

/// A link id that was not found in any target dictionary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolutionMiss {
    pub topic_key: String,
    pub component: String,
    pub id: String,
    /// Name of the fallback strategy that rendered the link.
    pub fallback: String,
}

/// A non-fatal warning raised while processing a topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildWarning {
    pub topic_key: String,
    pub component: String,
    pub message: String,
}

/// Aggregated outcome of a pipeline run, for the operator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildReport {
    pub run_id: RunId,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    pub topics_processed: usize,
    pub topics_failed: usize,
    #[serde(default)]
    pub topic_errors: Vec<TopicError>,
    #[serde(default)]
    pub resolution_misses: Vec<ResolutionMiss>,
    #[serde(default)]
    pub warnings: Vec<BuildWarning>,
}

impl BuildReport {
    pub fn new() -> Self {
        Self {
            run_id: RunId::new(),
            started_at: Utc::now(),
            finished_at: None,
            topics_processed: 0,
            topics_failed: 0,
            topic_errors: Vec::new(),
            resolution_misses: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub fn has_topic_errors(&self) -> bool {
        !self.topic_errors.is_empty()
    }

    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }
}

impl Default for BuildReport {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("docweave-types-test-{}", Uuid::now_v7()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn target_href_combinations() {
        let t = Target::new("T:A", "A", LinkKind::Type);
        assert_eq!(t.href(), None);

        let t = t.with_url("html/a.htm");
        assert_eq!(t.href().as_deref(), Some("html/a.htm"));

        let t = t.with_anchor("remarks");
        assert_eq!(t.href().as_deref(), Some("html/a.htm#remarks"));

        let anchor_only = Target::new("x", "x", LinkKind::Other).with_anchor("top");
        assert_eq!(anchor_only.href().as_deref(), Some("#top"));
    }

    #[test]
    fn link_kind_serializes_snake_case() {
        let json = serde_json::to_string(&LinkKind::ConceptualTopic).unwrap();
        assert_eq!(json, "\"conceptual_topic\"");
        let parsed: LinkKind = serde_json::from_str("\"namespace\"").unwrap();
        assert_eq!(parsed, LinkKind::Namespace);
    }

    #[test]
    fn source_spec_expands_directories() {
        let dir = temp_dir();
        std::fs::write(dir.join("b.xml"), "<b/>").unwrap();
        std::fs::write(dir.join("a.XML"), "<a/>").unwrap();
        std::fs::write(dir.join("notes.txt"), "skip").unwrap();

        let spec = SourceSpec::new(&dir, SourceFormat::Xml);
        let files = spec.files().unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["a.XML", "b.xml"]);

        let single = SourceSpec::new(dir.join("b.xml"), SourceFormat::Reflection);
        assert_eq!(single.files().unwrap(), vec![dir.join("b.xml")]);
    }

    #[test]
    fn source_spec_format_defaults_to_xml() {
        let spec: SourceSpec = toml::from_str("path = \"data/reflection.xml\"").unwrap();
        assert_eq!(spec.format, SourceFormat::Xml);
    }

    #[test]
    fn report_serialization() {
        let mut report = BuildReport::new();
        report.topics_processed = 2;
        report.topics_failed = 1;
        report.topic_errors.push(TopicError {
            topic_key: "T:X".into(),
            component: "resolve".into(),
            message: "boom".into(),
        });
        report.finish();

        let json = serde_json::to_string_pretty(&report).expect("serialize");
        let parsed: BuildReport = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(parsed.run_id, report.run_id);
        assert!(parsed.has_topic_errors());
        assert!(parsed.finished_at.is_some());
    }
}
