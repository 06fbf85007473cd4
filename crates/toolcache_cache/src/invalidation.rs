//! Removal of entries made stale by a mutating call.
//!
//! For every tool that lists the mutator in its `invalidated_by` set:
//! category-scoped tools lose all their entries, exact-scoped tools lose the
//! entries addressing the mutated path. When that path cannot be compared
//! reliably (absent, or relative) the exact scope widens to the whole
//! category; removing too much costs a re-execution, removing too little
//! serves stale data.

use std::path::Path;

use serde_json::Value;
use tracing::{debug, warn};

use crate::entry::EntryMeta;
use crate::policy::{PolicyTable, Scope};
use crate::store::Store;

/// A completed, successful mutating call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidationEvent {
    /// The tool that just ran.
    pub mutator_tool: String,
    /// The normalized path it wrote, when its input names one.
    pub target_path: Option<String>,
}

impl InvalidationEvent {
    /// Creates an event for `mutator_tool` writing `target_path`.
    pub fn new(mutator_tool: impl Into<String>, target_path: Option<String>) -> Self {
        Self {
            mutator_tool: mutator_tool.into(),
            target_path,
        }
    }

    /// Builds the event for a call, extracting the target with the policy's
    /// per-tool extractor.
    pub fn from_call(policy: &PolicyTable, tool: &str, input: &Value) -> Self {
        Self::new(tool, policy.extract_path(tool, input))
    }
}

/// What to remove for one dependent tool.
#[derive(Debug)]
struct Target<'a> {
    tool: &'a str,
    path: Option<&'a str>,
}

impl Target<'_> {
    fn matches(&self, meta: &EntryMeta) -> bool {
        if meta.tool_name != self.tool {
            return false;
        }
        match (self.path, meta.resource_path.as_deref()) {
            (None, _) => true,
            (Some(target), Some(stored)) if is_anchored(stored) => stored == target,
            // Entries without a comparable path cannot be ruled out.
            (Some(_), _) => true,
        }
    }
}

/// Applies invalidation events to a store according to a policy table.
pub struct InvalidationEngine<'a> {
    policy: &'a PolicyTable,
    store: &'a dyn Store,
}

impl<'a> InvalidationEngine<'a> {
    /// Creates an engine over `store` governed by `policy`.
    pub fn new(policy: &'a PolicyTable, store: &'a dyn Store) -> Self {
        Self { policy, store }
    }

    /// Removes every entry the event may have made stale. Returns the number
    /// of entries removed.
    ///
    /// Must only be called after the mutator succeeded. Store failures are
    /// logged and reported as zero removals.
    pub fn invalidate(&self, event: &InvalidationEvent) -> usize {
        let anchored_target = event.target_path.as_deref().filter(|p| is_anchored(p));
        let targets: Vec<Target<'_>> = self
            .policy
            .dependents_of(&event.mutator_tool)
            .map(|(tool, rule)| match rule.scope {
                Scope::Category => Target { tool, path: None },
                Scope::Exact => {
                    if anchored_target.is_none() {
                        debug!(
                            mutator = %event.mutator_tool,
                            tool,
                            "target path unknown; invalidating whole category"
                        );
                    }
                    Target {
                        tool,
                        path: anchored_target,
                    }
                }
            })
            .collect();

        if targets.is_empty() {
            return 0;
        }

        match self
            .store
            .delete_where(&|meta| targets.iter().any(|t| t.matches(meta)))
        {
            Ok(removed) => {
                debug!(
                    mutator = %event.mutator_tool,
                    target = ?event.target_path,
                    removed,
                    "invalidated cache entries"
                );
                removed
            }
            Err(e) => {
                warn!(mutator = %event.mutator_tool, error = %e, "invalidation failed");
                0
            }
        }
    }
}

/// Returns `true` for absolute paths and URLs, the only forms that can be
/// compared by equality.
fn is_anchored(path: &str) -> bool {
    path.starts_with('/') || path.contains("://") || Path::new(path).is_absolute()
}
