//! Per-tool caching rules.
//!
//! The table is closed: tools it does not name are never cached and never
//! invalidate anything. It is assembled once through [`PolicyTableBuilder`]
//! (optionally adjusted by configuration) and is read-only afterwards.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use serde_json::Value;
use tracing::warn;

use crate::key::normalize_path;

/// Tools that write files and therefore invalidate read-like results.
pub const FILE_MUTATORS: &[&str] = &["Write", "Edit", "MultiEdit", "NotebookEdit"];

/// Tools with effects outside the model: never cached, never invalidating.
pub const SIDE_EFFECT_TOOLS: &[&str] = &[
    "Bash",
    "Task",
    "TodoWrite",
    "AskUserQuestion",
    "code_execution",
    "computer_use",
    "memory",
];

/// Granularity at which a mutation removes a tool's entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    /// Only entries whose resource path equals the mutated path.
    Exact,
    /// Every entry of the tool, whatever its path.
    Category,
}

/// Caching rule for one tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyRule {
    /// Whether results may be stored and replayed.
    pub cacheable: bool,
    /// Lifetime of stored results. Zero when not cacheable.
    pub ttl: Duration,
    /// Tools whose successful execution invalidates this tool's entries.
    pub invalidated_by: BTreeSet<String>,
    /// How much an invalidating call removes.
    pub scope: Scope,
}

impl PolicyRule {
    /// A rule for tools that are never cached.
    pub fn uncacheable() -> Self {
        Self {
            cacheable: false,
            ttl: Duration::ZERO,
            invalidated_by: BTreeSet::new(),
            scope: Scope::Exact,
        }
    }

    /// A cacheable rule with the given TTL, exact scope and no invalidators.
    pub fn cacheable(ttl: Duration) -> Self {
        Self {
            cacheable: true,
            ttl,
            ..Self::uncacheable()
        }
    }

    /// Sets the invalidation scope.
    pub fn with_scope(mut self, scope: Scope) -> Self {
        self.scope = scope;
        self
    }

    /// Adds tools whose successful execution invalidates this tool's entries.
    pub fn invalidated_by<I, S>(mut self, tools: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.invalidated_by.extend(tools.into_iter().map(Into::into));
        self
    }
}

impl Default for PolicyRule {
    fn default() -> Self {
        Self::uncacheable()
    }
}

/// Pulls the addressed resource out of a tool's input.
///
/// Holds an ordered list of input field names; the first one present with a
/// non-empty string value wins. The value is normalized the same way the key
/// deriver normalizes path fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathExtractor {
    fields: Vec<String>,
}

impl PathExtractor {
    /// Creates an extractor that checks `fields` in order.
    pub fn fields<'a>(fields: impl IntoIterator<Item = &'a str>) -> Self {
        Self {
            fields: fields.into_iter().map(str::to_string).collect(),
        }
    }

    /// Returns the normalized resource path, if the input names one.
    pub fn extract(&self, input: &Value) -> Option<String> {
        let object = input.as_object()?;
        self.fields
            .iter()
            .filter_map(|field| object.get(field).and_then(Value::as_str))
            .map(normalize_path)
            .find(|path| !path.is_empty())
    }
}

/// Immutable per-tool caching rules and resource extractors.
#[derive(Debug, Clone, Default)]
pub struct PolicyTable {
    rules: BTreeMap<String, PolicyRule>,
    extractors: BTreeMap<String, PathExtractor>,
    fallback: PolicyRule,
}

impl PolicyTable {
    /// Returns an empty builder.
    pub fn builder() -> PolicyTableBuilder {
        PolicyTableBuilder::default()
    }

    /// The built-in table for the common agent tools.
    pub fn standard() -> Self {
        PolicyTableBuilder::standard().build()
    }

    /// Returns the rule for `tool`, or the non-cacheable default for unknown tools.
    pub fn lookup(&self, tool: &str) -> &PolicyRule {
        self.rules.get(tool).unwrap_or(&self.fallback)
    }

    /// Returns `true` if a successful call to `tool` invalidates any entries.
    pub fn is_mutator(&self, tool: &str) -> bool {
        self.dependents_of(tool).next().is_some()
    }

    /// Iterates over the tools whose entries `mutator` invalidates.
    pub fn dependents_of<'a>(
        &'a self,
        mutator: &'a str,
    ) -> impl Iterator<Item = (&'a str, &'a PolicyRule)> + 'a {
        self.rules
            .iter()
            .filter(move |(_, rule)| rule.invalidated_by.contains(mutator))
            .map(|(tool, rule)| (tool.as_str(), rule))
    }

    /// Extracts the resource path `tool` addresses in `input`.
    pub fn extract_path(&self, tool: &str, input: &Value) -> Option<String> {
        self.extractors.get(tool)?.extract(input)
    }

    /// Iterates over every explicitly configured tool in name order.
    pub fn rules(&self) -> impl Iterator<Item = (&str, &PolicyRule)> {
        self.rules.iter().map(|(tool, rule)| (tool.as_str(), rule))
    }
}

/// Assembles a [`PolicyTable`].
#[derive(Debug, Clone, Default)]
pub struct PolicyTableBuilder {
    rules: BTreeMap<String, PolicyRule>,
    extractors: BTreeMap<String, PathExtractor>,
}

impl PolicyTableBuilder {
    /// A builder pre-populated with the built-in rules.
    ///
    /// File reads are cached per path and invalidated by writes to that
    /// path. Listings and searches are cached per call but dropped wholesale
    /// by any file write, since an edit anywhere may change their results.
    /// Network fetches and web searches are cached on TTL alone.
    pub fn standard() -> Self {
        let file_ttl = Duration::from_secs(5 * 60);
        let mut builder = Self::default()
            .rule(
                "Read",
                PolicyRule::cacheable(file_ttl).invalidated_by(FILE_MUTATORS.iter().copied()),
            )
            .extractor("Read", ["file_path", "path"])
            .rule(
                "Glob",
                PolicyRule::cacheable(file_ttl)
                    .with_scope(Scope::Category)
                    .invalidated_by(FILE_MUTATORS.iter().copied()),
            )
            .extractor("Glob", ["path"])
            .rule(
                "Grep",
                PolicyRule::cacheable(file_ttl)
                    .with_scope(Scope::Category)
                    .invalidated_by(FILE_MUTATORS.iter().copied()),
            )
            .extractor("Grep", ["path"])
            .rule("WebFetch", PolicyRule::cacheable(Duration::from_secs(15 * 60)))
            .extractor("WebFetch", ["url"])
            .rule(
                "WebSearch",
                PolicyRule::cacheable(Duration::from_secs(30 * 60)).with_scope(Scope::Category),
            );

        for mutator in ["Write", "Edit", "MultiEdit"] {
            builder = builder
                .rule(mutator, PolicyRule::uncacheable())
                .extractor(mutator, ["file_path", "path"]);
        }
        builder = builder
            .rule("NotebookEdit", PolicyRule::uncacheable())
            .extractor("NotebookEdit", ["notebook_path"]);
        for tool in SIDE_EFFECT_TOOLS {
            builder = builder.rule(*tool, PolicyRule::uncacheable());
        }
        builder
    }

    /// Sets the rule for `tool`, replacing any previous rule.
    pub fn rule(mut self, tool: impl Into<String>, rule: PolicyRule) -> Self {
        self.rules.insert(tool.into(), rule);
        self
    }

    /// Sets the resource path fields for `tool`.
    pub fn extractor<'a>(
        mut self,
        tool: impl Into<String>,
        fields: impl IntoIterator<Item = &'a str>,
    ) -> Self {
        self.extractors
            .insert(tool.into(), PathExtractor::fields(fields));
        self
    }

    /// Makes `tool` non-cacheable while keeping its role as an invalidator.
    pub fn disable(mut self, tool: &str) -> Self {
        let rule = self.rules.entry(tool.to_string()).or_default();
        rule.cacheable = false;
        rule.ttl = Duration::ZERO;
        self
    }

    /// Replaces the TTL of a cacheable tool.
    ///
    /// Overrides for unknown or non-cacheable tools are ignored with a
    /// warning; a TTL alone never makes a tool cacheable.
    pub fn ttl(mut self, tool: &str, ttl: Duration) -> Self {
        match self.rules.get_mut(tool) {
            Some(rule) if rule.cacheable && !ttl.is_zero() => rule.ttl = ttl,
            _ => warn!(tool, "ignoring TTL override for a tool that is not cacheable"),
        }
        self
    }

    /// Freezes the table.
    pub fn build(self) -> PolicyTable {
        PolicyTable {
            rules: self.rules,
            extractors: self.extractors,
            fallback: PolicyRule::uncacheable(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn unknown_tool_is_inert() {
        let table = PolicyTable::standard();
        let rule = table.lookup("SomethingNew");
        assert!(!rule.cacheable);
        assert!(rule.invalidated_by.is_empty());
        assert!(!table.is_mutator("SomethingNew"));
        assert_eq!(table.extract_path("SomethingNew", &json!({"path": "/x"})), None);
    }

    #[test]
    fn standard_read_like_tools() {
        let table = PolicyTable::standard();
        let read = table.lookup("Read");
        assert!(read.cacheable);
        assert_eq!(read.ttl, Duration::from_secs(300));
        assert_eq!(read.scope, Scope::Exact);
        assert!(read.invalidated_by.contains("NotebookEdit"));

        for tool in ["Glob", "Grep"] {
            let rule = table.lookup(tool);
            assert_eq!(rule.scope, Scope::Category);
            assert_eq!(rule.invalidated_by.len(), FILE_MUTATORS.len());
        }
        assert_eq!(table.lookup("WebFetch").ttl, Duration::from_secs(900));
        assert_eq!(table.lookup("WebSearch").ttl, Duration::from_secs(1800));
    }

    #[test]
    fn mutators_and_side_effect_tools() {
        let table = PolicyTable::standard();
        for tool in FILE_MUTATORS {
            assert!(!table.lookup(tool).cacheable, "{tool}");
            assert!(table.is_mutator(tool), "{tool}");
        }
        for tool in SIDE_EFFECT_TOOLS {
            assert!(!table.lookup(tool).cacheable, "{tool}");
            assert!(!table.is_mutator(tool), "{tool}");
        }
        assert!(!table.is_mutator("Read"));
    }

    #[test]
    fn dependents_of_write() {
        let table = PolicyTable::standard();
        let deps: Vec<_> = table.dependents_of("Write").map(|(t, _)| t).collect();
        assert_eq!(deps, vec!["Glob", "Grep", "Read"]);
        assert_eq!(table.dependents_of("WebFetch").count(), 0);
    }

    #[test]
    fn path_extraction() {
        let table = PolicyTable::standard();
        assert_eq!(
            table.extract_path("Read", &json!({"file_path": "/repo/./a.rs"})),
            Some("/repo/a.rs".to_string())
        );
        assert_eq!(
            table.extract_path("Write", &json!({"path": "/a.txt", "content": "x"})),
            Some("/a.txt".to_string())
        );
        assert_eq!(
            table.extract_path("NotebookEdit", &json!({"notebook_path": "/n.ipynb"})),
            Some("/n.ipynb".to_string())
        );
        assert_eq!(table.extract_path("Edit", &json!({"old_string": "a"})), None);
        assert_eq!(table.extract_path("Edit", &json!({"file_path": "  "})), None);
        assert_eq!(table.extract_path("Edit", &json!({"file_path": 7})), None);
        assert_eq!(table.extract_path("WebSearch", &json!({"query": "rust"})), None);
    }

    #[test]
    fn extractor_prefers_earlier_fields() {
        let extractor = PathExtractor::fields(["file_path", "path"]);
        let input = json!({"path": "/second", "file_path": "/first"});
        assert_eq!(extractor.extract(&input), Some("/first".to_string()));
        let input = json!({"path": "/second", "file_path": ""});
        assert_eq!(extractor.extract(&input), Some("/second".to_string()));
        assert_eq!(extractor.extract(&json!("not an object")), None);
    }

    #[test]
    fn disable_keeps_invalidation_role() {
        let table = PolicyTableBuilder::standard().disable("Read").disable("Write").build();
        assert!(!table.lookup("Read").cacheable);
        assert!(table.is_mutator("Write"));
    }

    #[test]
    fn ttl_override() {
        let table = PolicyTableBuilder::standard()
            .ttl("Read", Duration::from_secs(60))
            .ttl("Bash", Duration::from_secs(60))
            .ttl("Unknown", Duration::from_secs(60))
            .build();
        assert_eq!(table.lookup("Read").ttl, Duration::from_secs(60));
        assert!(!table.lookup("Bash").cacheable);
        assert!(!table.lookup("Unknown").cacheable);
    }

    #[test]
    fn custom_table() {
        let table = PolicyTable::builder()
            .rule(
                "Read",
                PolicyRule::cacheable(Duration::from_secs(300)).invalidated_by(["Write", "Edit"]),
            )
            .rule("Write", PolicyRule::uncacheable())
            .build();
        assert!(table.is_mutator("Edit"));
        assert_eq!(table.rules().count(), 2);
    }
}
