//! `toolcache pre` and `toolcache post`: the host's hook protocol.
//!
//! Each hook reads one JSON object from stdin and writes one JSON object to
//! stdout. Whatever goes wrong, the hook answers `{}` (let the tool run) and
//! exits 0; the cache must never block the call it wraps.

use std::io::{self, Read};

use serde_json::{json, Value};
use toolcache_cache::{CallOutcome, Decision, Store, ToolCache};
use toolcache_config::{ConfigError, ToolCacheConfig};
use tracing::{debug, warn};

use crate::context::open_cache;
use crate::GlobalArgs;

/// Which side of the tool call is being handled.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HookKind {
    /// Before execution.
    Pre,
    /// After execution.
    Post,
}

/// Fields the hooks use from the host's payload.
///
/// Read field by field: an unexpected shape in one field must not cost the
/// post hook its invalidation.
#[derive(Debug)]
struct HookInput {
    tool_name: String,
    tool_input: Value,
    tool_result: Value,
    is_error: bool,
}

impl HookInput {
    fn from_value(mut value: Value) -> Option<Self> {
        let object = value.as_object_mut()?;
        let tool_name = object
            .get("tool_name")
            .and_then(Value::as_str)
            .filter(|name| !name.is_empty())?
            .to_string();
        let tool_input = object.remove("tool_input").unwrap_or(Value::Null);
        let tool_result = match object.remove("tool_result") {
            Some(result) if !result.is_null() => result,
            _ => object.remove("tool_response").unwrap_or(Value::Null),
        };
        let is_error = object.get("is_error").and_then(Value::as_bool) == Some(true);
        Some(Self {
            tool_name,
            tool_input,
            tool_result,
            is_error,
        })
    }

    fn outcome(&self) -> Option<CallOutcome<'_>> {
        if self.is_error || result_reports_error(&self.tool_result) {
            return Some(CallOutcome::Failure);
        }
        match &self.tool_result {
            Value::String(text) => Some(CallOutcome::Success(text)),
            Value::Null => Some(CallOutcome::Success("")),
            _ => None,
        }
    }
}

/// Runs a hook against stdin/stdout. Always exits 0.
pub fn run(
    kind: HookKind,
    config: Result<ToolCacheConfig, ConfigError>,
    global: &GlobalArgs,
) -> Result<i32, Box<dyn std::error::Error>> {
    let mut raw = String::new();
    let response = match (io::stdin().read_to_string(&mut raw), config) {
        (Err(e), _) => {
            warn!(error = %e, "cannot read hook input");
            json!({})
        }
        (Ok(_), Err(e)) => {
            warn!(error = %e, "configuration unusable; cache bypassed");
            json!({})
        }
        (Ok(_), Ok(config)) => {
            let cache = open_cache(global, &config);
            match kind {
                HookKind::Pre => pre_response(&cache, &raw),
                HookKind::Post => post_response(&cache, &raw),
            }
        }
    };
    println!("{response}");
    Ok(0)
}

/// Answers the pre-tool hook: a deny-with-result on a hit, `{}` otherwise.
pub fn pre_response<S: Store>(cache: &ToolCache<S>, raw: &str) -> Value {
    let Some(input) = parse(raw) else {
        return json!({});
    };
    match cache.before_call(&input.tool_name, &input.tool_input) {
        Decision::Served { payload, .. } => json!({
            "hookSpecificOutput": {
                "hookEventName": "PreToolUse",
                "permissionDecision": "deny",
                "permissionDecisionReason": "result served from tool cache",
            },
            "systemMessage": format!(
                "[CACHE HIT for {}] Returning cached result (tool execution skipped):\n\n{payload}",
                input.tool_name
            ),
        }),
        Decision::Execute(reason) => {
            debug!(tool = %input.tool_name, ?reason, "executing");
            json!({})
        }
    }
}

/// Handles the post-tool hook. Always answers `{}`.
pub fn post_response<S: Store>(cache: &ToolCache<S>, raw: &str) -> Value {
    let Some(input) = parse(raw) else {
        return json!({});
    };
    // Structured results are stored as their JSON text.
    let rendered;
    let outcome = match input.outcome() {
        Some(outcome) => outcome,
        None => {
            rendered = input.tool_result.to_string();
            CallOutcome::Success(&rendered)
        }
    };
    let report = cache.after_call(&input.tool_name, &input.tool_input, outcome);
    debug!(
        tool = %input.tool_name,
        stored = report.stored,
        invalidated = report.invalidated,
        swept = report.swept,
        "post hook"
    );
    json!({})
}

fn parse(raw: &str) -> Option<HookInput> {
    let value = match serde_json::from_str::<Value>(raw) {
        Ok(value) => value,
        Err(e) => {
            warn!(error = %e, "malformed hook input");
            return None;
        }
    };
    let input = HookInput::from_value(value);
    if input.is_none() {
        debug!("hook input names no tool");
    }
    input
}

/// A structured result signals failure through `is_error: true` or a
/// non-null `error` field.
fn result_reports_error(result: &Value) -> bool {
    let Some(object) = result.as_object() else {
        return false;
    };
    object.get("is_error").and_then(Value::as_bool) == Some(true)
        || object.get("error").is_some_and(|e| !e.is_null())
}
