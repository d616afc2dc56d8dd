//! Pipeline engine and built-in components for docweave.
//!
//! A pipeline is an ordered list of [`BuildComponent`]s created through a
//! [`ComponentRegistry`]. [`PipelineEngine`] initializes them, lets them build
//! their indexes into a shared [`BuildContext`], then runs every [`Topic`]
//! through them, isolating failures per topic in the [`BuildReport`](docweave_shared::BuildReport).

pub mod component;
pub mod components;
pub mod context;
pub mod engine;
pub mod progress;
pub mod topic;

pub use component::{BuildComponent, ComponentFactory, ComponentRegistry, PipelineStage};
pub use context::{BuildContext, TopicDiagnostics};
pub use engine::{BuildOutput, EngineState, PipelineEngine, ProcessedTopic};
pub use progress::{ProgressReporter, SilentProgress};
pub use topic::{Topic, default_skeleton, load_manifest, load_topics};
