//! The immutable `id -> Target` dictionary.

use std::collections::HashMap;

use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use docweave_shared::{DocweaveError, Result, Target};

use crate::provider::TargetProvider;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BuildStats {
    pub providers: usize,
    pub targets: usize,
    /// Ids replaced by a later provider.
    pub overrides: usize,
}

/// Read-only after build; share it behind an `Arc`.
#[derive(Debug, Clone, Default)]
pub struct TargetDictionary {
    targets: HashMap<String, Target>,
    stats: BuildStats,
}

impl TargetDictionary {
    /// Load every provider and merge them in order. Later providers override
    /// earlier ones. Any provider failure aborts the build.
    #[instrument(skip_all, fields(providers = providers.len()))]
    pub fn build(providers: &[Box<dyn TargetProvider>]) -> Result<Self> {
        let loaded: Vec<Vec<Target>> = providers
            .par_iter()
            .map(|provider| {
                provider.load().map_err(|e| {
                    DocweaveError::targets(format!("provider '{}': {e}", provider.name()))
                })
            })
            .collect::<Result<_>>()?;

        let mut dictionary = Self::default();
        dictionary.stats.providers = providers.len();
        for (provider, targets) in providers.iter().zip(loaded) {
            debug!(provider = provider.name(), targets = targets.len(), "merging provider");
            dictionary.merge(targets);
        }
        dictionary.stats.targets = dictionary.targets.len();

        if dictionary.stats.overrides > 0 {
            warn!(overrides = dictionary.stats.overrides, "target ids overridden by later providers");
        }
        info!(targets = dictionary.stats.targets, "target dictionary built");
        Ok(dictionary)
    }

    /// Build from already loaded targets, in order.
    pub fn from_targets(targets: impl IntoIterator<Item = Target>) -> Self {
        let mut dictionary = Self::default();
        dictionary.merge(targets);
        dictionary.stats.targets = dictionary.targets.len();
        dictionary
    }

    fn merge(&mut self, targets: impl IntoIterator<Item = Target>) {
        for target in targets {
            if let Some(previous) = self.targets.get(&target.id) {
                debug!(
                    id = %target.id,
                    previous = ?previous.url,
                    replacement = ?target.url,
                    "target overridden"
                );
                self.stats.overrides += 1;
            }
            self.targets.insert(target.id.clone(), target);
        }
    }

    pub fn lookup(&self, id: &str) -> Option<&Target> {
        self.targets.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.targets.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    pub fn stats(&self) -> BuildStats {
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{StaticProvider, StaticTarget};
    use docweave_shared::LinkKind;

    fn provider(name: &str, entries: &[(&str, &str)]) -> Box<dyn TargetProvider> {
        Box::new(StaticProvider::new(
            name,
            entries
                .iter()
                .map(|(id, url)| StaticTarget {
                    id: id.to_string(),
                    url: Some(url.to_string()),
                    display_text: None,
                    kind: None,
                    anchor: None,
                })
                .collect(),
        ))
    }

    struct Failing;

    impl TargetProvider for Failing {
        fn name(&self) -> &str {
            "failing"
        }
        fn load(&self) -> Result<Vec<Target>> {
            Err(DocweaveError::parse("truncated file"))
        }
    }

    #[test]
    fn later_provider_wins() {
        let providers = vec![
            provider("first", &[("A", "url1"), ("B", "url2")]),
            provider("second", &[("A", "url3")]),
        ];
        let dictionary = TargetDictionary::build(&providers).unwrap();

        assert_eq!(dictionary.lookup("A").unwrap().url.as_deref(), Some("url3"));
        assert_eq!(dictionary.lookup("B").unwrap().url.as_deref(), Some("url2"));
        assert_eq!(
            dictionary.stats(),
            BuildStats {
                providers: 2,
                targets: 2,
                overrides: 1,
            }
        );
    }

    #[test]
    fn order_is_declared_order_not_completion_order() {
        let providers: Vec<_> = (0..16)
            .map(|i| {
                let url = format!("url{i}");
                provider(&format!("p{i}"), &[("shared", url.as_str())])
            })
            .collect();
        let dictionary = TargetDictionary::build(&providers).unwrap();
        assert_eq!(dictionary.lookup("shared").unwrap().url.as_deref(), Some("url15"));
        assert_eq!(dictionary.stats().overrides, 15);
    }

    #[test]
    fn failing_provider_aborts_build() {
        let providers: Vec<Box<dyn TargetProvider>> =
            vec![provider("ok", &[("A", "url1")]), Box::new(Failing)];
        let err = TargetDictionary::build(&providers).unwrap_err();
        assert!(err.to_string().contains("failing"), "{err}");
    }

    #[test]
    fn lookup_misses_return_none() {
        let dictionary =
            TargetDictionary::from_targets([Target::new("T:A", "A", LinkKind::Type).with_url("a.htm")]);
        assert!(dictionary.lookup("T:B").is_none());
        assert!(dictionary.contains("T:A"));
        assert_eq!(dictionary.len(), 1);
    }
}
