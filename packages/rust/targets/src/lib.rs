//! Link targets for docweave.
//!
//! - [`TargetProvider`] implementations read targets from reflection data,
//!   conceptual content metadata, or inline configuration
//! - [`TargetDictionary`] merges providers into one immutable `id -> Target` map
//! - [`ReferenceLinkResolver`] turns ids into renderable links with fallbacks

mod api_id;
mod dictionary;
mod provider;
mod resolver;

pub use api_id::{ApiId, kind_prefixes};
pub use dictionary::{BuildStats, TargetDictionary};
pub use provider::{
    ContentMetadataProvider, DEFAULT_EXTENSION, ReflectionProvider, StaticProvider, StaticTarget,
    TargetProvider, join_url,
};
pub use resolver::{FallbackStrategy, ReferenceLinkResolver, RenderableLink, Resolution};
