//! The pipeline engine: component lifecycle and per-topic execution.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

use rayon::prelude::*;
use tracing::{debug, debug_span, error, info, instrument};

use docweave_document::Document;
use docweave_shared::{
    BuildReport, BuildWarning, ComponentDeclaration, DocweaveError, PipelineConfig,
    ResolutionMiss, Result, TopicError,
};

use crate::component::{ComponentRegistry, PipelineStage};
use crate::context::{BuildContext, TopicDiagnostics};
use crate::progress::ProgressReporter;
use crate::topic::Topic;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Uninitialized,
    Initializing,
    Ready,
    Processing,
    Disposed,
}

impl std::fmt::Display for EngineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Uninitialized => "uninitialized",
            Self::Initializing => "initializing",
            Self::Ready => "ready",
            Self::Processing => "processing",
            Self::Disposed => "disposed",
        };
        f.write_str(name)
    }
}

/// A topic after the pipeline. `failed` topics hold the document as it was
/// when their failing component was reached.
#[derive(Debug, Clone)]
pub struct ProcessedTopic {
    pub key: String,
    pub document: Document,
    pub failed: bool,
}

/// Result of [`PipelineEngine::run`]. `topics` are in input order.
#[derive(Debug)]
pub struct BuildOutput {
    pub topics: Vec<ProcessedTopic>,
    pub report: BuildReport,
}

struct TopicOutcome {
    topic: ProcessedTopic,
    error: Option<TopicError>,
    misses: Vec<ResolutionMiss>,
    warnings: Vec<BuildWarning>,
}

/// Runs topics through an ordered list of components.
pub struct PipelineEngine {
    stages: Vec<PipelineStage>,
    context: BuildContext,
    state: EngineState,
}

impl PipelineEngine {
    pub fn new(stages: Vec<PipelineStage>, context: BuildContext) -> Self {
        Self {
            stages,
            context,
            state: EngineState::Uninitialized,
        }
    }

    /// Create every declared component through `registry`. Unknown types fail.
    pub fn from_declarations(
        registry: &ComponentRegistry,
        declarations: &[ComponentDeclaration],
        context: BuildContext,
    ) -> Result<Self> {
        let stages = declarations
            .iter()
            .map(|declaration| registry.stage(declaration))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::new(stages, context))
    }

    pub fn from_config(
        registry: &ComponentRegistry,
        config: &PipelineConfig,
        context: BuildContext,
    ) -> Result<Self> {
        config.validate()?;
        Self::from_declarations(registry, &config.components, context)
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn context(&self) -> &BuildContext {
        &self.context
    }

    pub fn stage_names(&self) -> impl Iterator<Item = &str> {
        self.stages.iter().map(|stage| stage.name.as_str())
    }

    /// Initialize every component, then let each build its indexes. Any
    /// failure releases everything and leaves the engine disposed.
    #[instrument(skip_all, fields(components = self.stages.len()))]
    pub fn initialize(&mut self) -> Result<()> {
        self.expect_state(EngineState::Uninitialized)?;
        self.state = EngineState::Initializing;
        let start = Instant::now();

        if let Err(e) = self.initialize_stages() {
            error!(error = %e, "pipeline initialization failed");
            self.dispose();
            return Err(e);
        }

        self.state = EngineState::Ready;
        info!(elapsed_ms = start.elapsed().as_millis() as u64, "pipeline ready");
        Ok(())
    }

    fn initialize_stages(&mut self) -> Result<()> {
        for stage in &mut self.stages {
            debug!(component = %stage.name, "initializing");
            stage
                .component
                .initialize(&stage.config, &mut self.context)
                .map_err(|e| component_error(&stage.name, e))?;
        }
        for stage in &mut self.stages {
            debug!(component = %stage.name, "building indexes");
            stage
                .component
                .build_index(&mut self.context)
                .map_err(|e| component_error(&stage.name, e))?;
        }
        Ok(())
    }

    /// Process `topics`. Failures inside a component are recorded in the
    /// report; only lifecycle misuse is an error.
    #[instrument(skip_all, fields(topics = topics.len()))]
    pub fn run(&mut self, topics: Vec<Topic>, progress: &dyn ProgressReporter) -> Result<BuildOutput> {
        self.expect_state(EngineState::Ready)?;
        self.state = EngineState::Processing;
        let start = Instant::now();
        let mut report = BuildReport::new();
        info!(run_id = %report.run_id, "processing topics");
        progress.phase("Processing topics");

        let total = topics.len();
        let completed = AtomicUsize::new(0);
        let engine = &*self;
        let process = |topic: Topic| {
            let outcome = engine.process_topic(topic);
            let current = completed.fetch_add(1, Ordering::Relaxed) + 1;
            progress.topic_done(&outcome.topic.key, current, total);
            outcome
        };

        let outcomes: Vec<TopicOutcome> = if self.context.settings().parallel {
            topics.into_par_iter().map(&process).collect()
        } else {
            topics.into_iter().map(&process).collect()
        };

        let mut processed = Vec::with_capacity(outcomes.len());
        for outcome in outcomes {
            report.topics_processed += 1;
            if let Some(error) = outcome.error {
                report.topics_failed += 1;
                report.topic_errors.push(error);
            }
            report.resolution_misses.extend(outcome.misses);
            report.warnings.extend(outcome.warnings);
            processed.push(outcome.topic);
        }
        report.finish();

        self.state = EngineState::Ready;
        info!(
            topics = report.topics_processed,
            failed = report.topics_failed,
            misses = report.resolution_misses.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "run complete"
        );
        progress.done(&report);

        Ok(BuildOutput {
            topics: processed,
            report,
        })
    }

    #[instrument(skip_all, fields(topic = %topic.key))]
    fn process_topic(&self, topic: Topic) -> TopicOutcome {
        let Topic { key, mut document } = topic;
        let rollback = self.context.settings().rollback_failed_components;
        let mut diagnostics = TopicDiagnostics::new(&key);
        let mut error = None;

        for stage in &self.stages {
            let _span = debug_span!("apply", component = %stage.name).entered();
            let snapshot = rollback.then(|| document.clone());
            let mark = diagnostics.mark();
            diagnostics.set_component(&stage.name);

            let outcome = catch_unwind(AssertUnwindSafe(|| {
                stage.component.apply(&mut document, &key, &mut diagnostics)
            }));
            let message = match outcome {
                Ok(Ok(())) => continue,
                Ok(Err(e)) => e.to_string(),
                Err(panic) => format!("panicked: {}", panic_message(panic.as_ref())),
            };

            error!(
                topic = %key,
                component = %stage.name,
                error = %message,
                "component failed, skipping the rest of the pipeline for this topic"
            );
            if let Some(snapshot) = snapshot {
                document = snapshot;
                diagnostics.rollback(mark);
            }
            error = Some(TopicError {
                topic_key: key.clone(),
                component: stage.name.clone(),
                message,
            });
            break;
        }

        let (misses, warnings) = diagnostics.into_parts();
        TopicOutcome {
            topic: ProcessedTopic {
                key,
                document,
                failed: error.is_some(),
            },
            error,
            misses,
            warnings,
        }
    }

    /// Dispose components and release shared caches. Safe to call more than once.
    pub fn dispose(&mut self) {
        if self.state == EngineState::Disposed {
            return;
        }
        for stage in &mut self.stages {
            stage.component.dispose();
        }
        self.context.release();
        self.state = EngineState::Disposed;
        debug!("pipeline disposed");
    }

    fn expect_state(&self, expected: EngineState) -> Result<()> {
        if self.state == expected {
            Ok(())
        } else {
            Err(DocweaveError::InvalidState {
                expected: expected.to_string(),
                found: self.state.to_string(),
            })
        }
    }
}

impl Drop for PipelineEngine {
    fn drop(&mut self) {
        self.dispose();
    }
}

fn component_error(component: &str, err: DocweaveError) -> DocweaveError {
    match err {
        DocweaveError::Component { .. } => err,
        other => DocweaveError::component(component, other.to_string()),
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
