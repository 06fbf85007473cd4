//! End-to-end cache properties, checked against both store backends.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use toolcache_cache::{
    CallOutcome, Decision, ExecuteReason, FileStore, KeyDeriver, MemoryStore, PolicyRule,
    PolicyTable, Scope, Store, Sweeper, ToolCache, ToolCacheBuilder,
};
use toolcache_common::{ManualClock, Timestamp};

struct Harness<S> {
    clock: Arc<ManualClock>,
    cache: ToolCache<S>,
    _dir: Option<tempfile::TempDir>,
}

fn builder(clock: &Arc<ManualClock>) -> ToolCacheBuilder {
    ToolCacheBuilder::new()
        .sweeper(Sweeper::never())
        .clock(Arc::clone(clock))
}

fn start() -> Arc<ManualClock> {
    Arc::new(ManualClock::new(Timestamp::from_millis(1_700_000_000_000)))
}

fn memory(policy: PolicyTable) -> Harness<MemoryStore> {
    let clock = start();
    let cache = builder(&clock).policy(policy).build(MemoryStore::new());
    Harness {
        clock,
        cache,
        _dir: None,
    }
}

fn file(policy: PolicyTable) -> Harness<FileStore> {
    let clock = start();
    let dir = tempfile::tempdir().unwrap();
    let cache = builder(&clock)
        .policy(policy)
        .build(FileStore::new(dir.path().join("tool-cache")));
    Harness {
        clock,
        cache,
        _dir: Some(dir),
    }
}

fn ok(payload: &str) -> CallOutcome<'_> {
    CallOutcome::Success(payload)
}

fn is_miss(decision: Decision) -> bool {
    decision == Decision::Execute(ExecuteReason::Miss)
}

fn read_your_writes<S: Store>(h: Harness<S>) {
    let cache = &h.cache;
    let read = json!({"file_path": "/repo/notes.md"});
    assert!(is_miss(cache.before_call("Read", &read)));
    cache.after_call("Read", &read, ok("version one"));
    assert_eq!(cache.before_call("Read", &read).payload(), Some("version one"));

    for mutator in ["Write", "Edit", "MultiEdit"] {
        let report = cache.after_call(
            mutator,
            &json!({"file_path": "/repo/notes.md", "content": "version two"}),
            ok("done"),
        );
        assert_eq!(report.invalidated, 1, "{mutator}");
        assert!(is_miss(cache.before_call("Read", &read)), "{mutator}");
        cache.after_call("Read", &read, ok("refreshed"));
    }

    let notebook = json!({"file_path": "/repo/analysis.ipynb"});
    cache.after_call("Read", &notebook, ok("cells"));
    cache.after_call(
        "NotebookEdit",
        &json!({"notebook_path": "/repo/analysis.ipynb", "new_source": "x = 1"}),
        ok("done"),
    );
    assert!(is_miss(cache.before_call("Read", &notebook)));
}

fn category_invalidation<S: Store>(h: Harness<S>) {
    let cache = &h.cache;
    let glob = json!({"pattern": "**/*.rs", "path": "/repo/src"});
    let grep = json!({"pattern": "fn main", "path": "/repo"});
    cache.after_call("Glob", &glob, ok("/repo/src/main.rs"));
    cache.after_call("Grep", &grep, ok("/repo/src/main.rs:1"));

    let report = cache.after_call(
        "Write",
        &json!({"file_path": "/somewhere/else/entirely.txt", "content": "x"}),
        ok("written"),
    );
    assert_eq!(report.invalidated, 2);
    assert!(is_miss(cache.before_call("Glob", &glob)));
    assert!(is_miss(cache.before_call("Grep", &grep)));
}

fn ttl_boundary<S: Store>(h: Harness<S>) {
    let cache = &h.cache;
    let read = json!({"file_path": "/repo/a.txt"});
    let ttl = cache.policy().lookup("Read").ttl;
    cache.after_call("Read", &read, ok("a"));

    h.clock.advance(ttl - Duration::from_millis(1));
    assert!(cache.before_call("Read", &read).is_hit());

    h.clock.advance(Duration::from_millis(2));
    assert!(is_miss(cache.before_call("Read", &read)));
}

fn clear_completeness<S: Store>(h: Harness<S>) {
    let cache = &h.cache;
    let calls: Vec<(&str, Value)> = vec![
        ("Read", json!({"file_path": "/a"})),
        ("Read", json!({"file_path": "/b"})),
        ("Glob", json!({"pattern": "*"})),
        ("WebFetch", json!({"url": "https://example.com", "prompt": "summarize"})),
        ("WebSearch", json!({"query": "rust atomic rename"})),
    ];
    for (tool, input) in &calls {
        assert!(cache.after_call(tool, input, ok("result")).stored);
    }
    assert_eq!(cache.stats().total_entries, 5);

    assert_eq!(cache.clear(), 5);
    assert_eq!(cache.stats().total_entries, 0);
    for (tool, input) in &calls {
        assert!(is_miss(cache.before_call(tool, input)), "{tool}");
    }
}

fn non_interference<S: Store>(h: Harness<S>) {
    let cache = &h.cache;
    let fetch = json!({"url": "https://example.com/docs"});
    let search = json!({"query": "serde flatten"});
    let read = json!({"file_path": "/repo/a.rs"});
    cache.after_call("WebFetch", &fetch, ok("<html>"));
    cache.after_call("WebSearch", &search, ok("hits"));
    cache.after_call("Read", &read, ok("fn a() {}"));

    cache.after_call("Write", &json!({"file_path": "/repo/b.rs"}), ok("done"));
    cache.after_call("Bash", &json!({"command": "rm -rf /repo"}), ok(""));
    cache.after_call("Read", &json!({"file_path": "/repo/c.rs"}), ok("c"));
    cache.after_call("WebFetch", &json!({"url": "https://example.com/other"}), ok("x"));

    assert!(cache.before_call("WebFetch", &fetch).is_hit());
    assert!(cache.before_call("WebSearch", &search).is_hit());
    assert!(cache.before_call("Read", &read).is_hit());
}

fn stats_report_live_entries<S: Store>(h: Harness<S>) {
    let cache = &h.cache;
    cache.after_call("Read", &json!({"file_path": "/a"}), ok("12345"));
    cache.after_call("Read", &json!({"file_path": "/b"}), ok("123"));
    cache.after_call("WebSearch", &json!({"query": "q"}), ok("1234567"));

    let stats = cache.stats();
    assert_eq!(stats.total_entries, 3);
    assert_eq!(stats.total_bytes, 15);
    assert_eq!(stats.per_tool["Read"].count, 2);
    assert_eq!(stats.per_tool["Read"].bytes, 8);

    h.clock.advance(Duration::from_secs(10 * 60));
    let stats = cache.stats();
    assert_eq!(stats.total_entries, 1);
    assert_eq!(stats.expired_entries, 2);
    assert!(!stats.per_tool.contains_key("Read"));

    assert_eq!(cache.evict_expired(), 2);
    assert_eq!(cache.stats().expired_entries, 0);
}

fn scenario_policy() -> PolicyTable {
    PolicyTable::builder()
        .rule(
            "Read",
            PolicyRule::cacheable(Duration::from_secs(5 * 60))
                .with_scope(Scope::Exact)
                .invalidated_by(["Write", "Edit"]),
        )
        .extractor("Read", ["path"])
        .rule("Write", PolicyRule::uncacheable())
        .extractor("Write", ["path"])
        .build()
}

fn scenario<S: Store>(h: Harness<S>) {
    let cache = &h.cache;
    let input = json!({"path": "/a.txt"});

    assert!(is_miss(cache.before_call("Read", &input)));
    assert!(cache.after_call("Read", &input, ok("hello")).stored);

    let expected_key = KeyDeriver::default().derive("Read", &input).unwrap();
    match cache.before_call("Read", &input) {
        Decision::Served { payload, key, .. } => {
            assert_eq!(payload, "hello");
            assert_eq!(key, expected_key);
        }
        other => panic!("expected a hit, got {other:?}"),
    }

    let report = cache.after_call("Write", &input, ok("written"));
    assert_eq!(report.invalidated, 1);
    assert!(!report.stored);
    assert!(is_miss(cache.before_call("Read", &input)));
}

macro_rules! on_both_stores {
    ($($property:ident => $policy:expr),* $(,)?) => {
        mod memory_store {
            $(
                #[test]
                fn $property() {
                    super::$property(super::memory($policy));
                }
            )*
        }

        mod file_store {
            $(
                #[test]
                fn $property() {
                    super::$property(super::file($policy));
                }
            )*
        }
    };
}

on_both_stores! {
    read_your_writes => toolcache_cache::PolicyTable::standard(),
    category_invalidation => toolcache_cache::PolicyTable::standard(),
    ttl_boundary => toolcache_cache::PolicyTable::standard(),
    clear_completeness => toolcache_cache::PolicyTable::standard(),
    non_interference => toolcache_cache::PolicyTable::standard(),
    stats_report_live_entries => toolcache_cache::PolicyTable::standard(),
    scenario => super::scenario_policy(),
}

#[test]
fn key_determinism_and_field_insensitivity() {
    let deriver = KeyDeriver::default();
    let a = json!({"pattern": "TODO", "path": "/repo", "-i": true});
    let reordered: Value =
        serde_json::from_str(r#"{"-i": true, "path": "/repo", "pattern": "TODO"}"#).unwrap();
    let described = json!({"pattern": "TODO", "path": "/repo", "-i": true, "description": "find todos"});
    let different = json!({"pattern": "FIXME", "path": "/repo", "-i": true});

    let key = deriver.derive("Grep", &a).unwrap();
    assert_eq!(key, deriver.derive("Grep", &a).unwrap());
    assert_eq!(key, deriver.derive("Grep", &reordered).unwrap());
    assert_eq!(key, deriver.derive("Grep", &described).unwrap());
    assert_ne!(key, deriver.derive("Grep", &different).unwrap());
    assert_eq!(key.to_string().len(), 64);
}
