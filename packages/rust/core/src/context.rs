//! State shared between the components of one engine.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, warn};

use docweave_index::IndexedFileCache;
use docweave_shared::{BuildWarning, DocweaveError, EngineSettings, ResolutionMiss, Result};
use docweave_targets::TargetDictionary;

/// Owned by a [`PipelineEngine`](crate::PipelineEngine) and handed to
/// components during `initialize` and `build_index`. Caches and dictionaries
/// registered here are shared by name and released when the engine is
/// disposed.
#[derive(Debug, Default)]
pub struct BuildContext {
    settings: EngineSettings,
    base_dir: PathBuf,
    output_dir: PathBuf,
    caches: HashMap<String, Arc<IndexedFileCache>>,
    dictionaries: HashMap<String, Arc<TargetDictionary>>,
}

impl BuildContext {
    pub fn new(settings: EngineSettings) -> Self {
        Self {
            settings,
            ..Self::default()
        }
    }

    /// Directory that relative paths in component configs are resolved against.
    pub fn with_base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.base_dir = dir.into();
        self
    }

    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn output_dir(&self) -> PathBuf {
        self.resolve_path(&self.output_dir)
    }

    pub fn resolve_path(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }

    pub fn register_cache(&mut self, name: &str, cache: Arc<IndexedFileCache>) -> Result<()> {
        if self.caches.contains_key(name) {
            return Err(DocweaveError::config(format!(
                "an index named '{name}' is already registered"
            )));
        }
        debug!(name, documents = cache.len(), "index cache registered");
        self.caches.insert(name.to_string(), cache);
        Ok(())
    }

    pub fn cache(&self, name: &str) -> Option<Arc<IndexedFileCache>> {
        self.caches.get(name).cloned()
    }

    pub fn register_dictionary(&mut self, name: &str, dictionary: Arc<TargetDictionary>) -> Result<()> {
        if self.dictionaries.contains_key(name) {
            return Err(DocweaveError::config(format!(
                "a target dictionary named '{name}' is already registered"
            )));
        }
        debug!(name, targets = dictionary.len(), "target dictionary registered");
        self.dictionaries.insert(name.to_string(), dictionary);
        Ok(())
    }

    pub fn dictionary(&self, name: &str) -> Option<Arc<TargetDictionary>> {
        self.dictionaries.get(name).cloned()
    }

    /// Release file handles and resident documents of every cache, then drop
    /// the context's references to caches and dictionaries.
    pub fn release(&mut self) {
        for (name, cache) in self.caches.drain() {
            cache.release();
            if Arc::strong_count(&cache) > 1 {
                debug!(name = %name, "index cache still referenced after release");
            }
        }
        self.dictionaries.clear();
    }
}

/// Resolution misses and warnings raised while one topic is processed.
#[derive(Debug, Default)]
pub struct TopicDiagnostics {
    topic_key: String,
    component: String,
    misses: Vec<ResolutionMiss>,
    warnings: Vec<BuildWarning>,
}

/// Position in a [`TopicDiagnostics`] to roll back to.
#[derive(Debug, Clone, Copy)]
pub(crate) struct DiagnosticsMark {
    misses: usize,
    warnings: usize,
}

impl TopicDiagnostics {
    pub fn new(topic_key: impl Into<String>) -> Self {
        Self {
            topic_key: topic_key.into(),
            ..Self::default()
        }
    }

    pub fn topic_key(&self) -> &str {
        &self.topic_key
    }

    /// Record an id that had to be rendered by `fallback`.
    pub fn miss(&mut self, id: impl Into<String>, fallback: impl Into<String>) {
        self.misses.push(ResolutionMiss {
            topic_key: self.topic_key.clone(),
            component: self.component.clone(),
            id: id.into(),
            fallback: fallback.into(),
        });
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        let message = message.into();
        warn!(topic = %self.topic_key, component = %self.component, "{message}");
        self.warnings.push(BuildWarning {
            topic_key: self.topic_key.clone(),
            component: self.component.clone(),
            message,
        });
    }

    pub fn misses(&self) -> &[ResolutionMiss] {
        &self.misses
    }

    pub fn warnings(&self) -> &[BuildWarning] {
        &self.warnings
    }

    pub(crate) fn set_component(&mut self, component: &str) {
        self.component.clear();
        self.component.push_str(component);
    }

    pub(crate) fn mark(&self) -> DiagnosticsMark {
        DiagnosticsMark {
            misses: self.misses.len(),
            warnings: self.warnings.len(),
        }
    }

    pub(crate) fn rollback(&mut self, mark: DiagnosticsMark) {
        self.misses.truncate(mark.misses);
        self.warnings.truncate(mark.warnings);
    }

    pub(crate) fn into_parts(self) -> (Vec<ResolutionMiss>, Vec<BuildWarning>) {
        (self.misses, self.warnings)
    }
}
