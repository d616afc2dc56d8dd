//! `save`: write each topic's document under the output directory.

use std::path::PathBuf;
use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;
use tracing::debug;

use docweave_document::Document;
use docweave_shared::{ComponentConfig, DocweaveError, Result};

use crate::component::BuildComponent;
use crate::context::{BuildContext, TopicDiagnostics};

const COMPONENT: &str = "save";
const XML_DECLARATION: &str = "<?xml version=\"1.0\" encoding=\"utf-8\"?>\n";

static UNSAFE_CHARS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"[<>:"/\\|?*\x00-\x1f]"#).expect("valid regex"));

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SaveConfig {
    /// Defaults to the engine's output directory.
    #[serde(default)]
    output_dir: Option<PathBuf>,
    #[serde(default = "default_path")]
    path: String,
    #[serde(default = "default_declaration")]
    xml_declaration: bool,
}

fn default_path() -> String {
    "{key}.xml".to_string()
}

fn default_declaration() -> bool {
    true
}

#[derive(Debug, Default)]
pub struct SaveComponent {
    output_dir: PathBuf,
    path_template: String,
    xml_declaration: bool,
}

impl SaveComponent {
    pub fn new() -> Self {
        Self::default()
    }

    /// Output path for `key`, relative to the output directory.
    pub fn relative_path(&self, key: &str) -> PathBuf {
        let safe_key = sanitize_file_name(key);
        PathBuf::from(self.path_template.replace("{key}", &safe_key))
    }
}

impl BuildComponent for SaveComponent {
    fn initialize(&mut self, config: &ComponentConfig, context: &mut BuildContext) -> Result<()> {
        let config: SaveConfig = config.parse(COMPONENT)?;
        if config.path.trim().is_empty() {
            return Err(DocweaveError::config("save path template is empty"));
        }
        self.output_dir = match &config.output_dir {
            Some(dir) => context.resolve_path(dir),
            None => context.output_dir(),
        };
        self.path_template = config.path;
        self.xml_declaration = config.xml_declaration;
        debug!(output_dir = %self.output_dir.display(), template = %self.path_template, "save configured");
        Ok(())
    }

    fn apply(
        &self,
        document: &mut Document,
        key: &str,
        _diagnostics: &mut TopicDiagnostics,
    ) -> Result<()> {
        let path = self.output_dir.join(self.relative_path(key));
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| DocweaveError::io(parent, e))?;
        }

        let mut xml = String::new();
        if self.xml_declaration {
            xml.push_str(XML_DECLARATION);
        }
        xml.push_str(&document.to_xml_string());
        std::fs::write(&path, xml).map_err(|e| DocweaveError::io(&path, e))?;
        debug!(path = %path.display(), "topic saved");
        Ok(())
    }
}

/// Replace characters that are not valid in file names with `_`.
pub fn sanitize_file_name(name: &str) -> String {
    UNSAFE_CHARS_RE.replace_all(name, "_").into_owned()
}
