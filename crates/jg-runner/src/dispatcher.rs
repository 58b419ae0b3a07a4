//! Step dispatcher: maps a node's role to its handler.
//!
//! Handlers receive the context by reference and return a patch; they never
//! mutate the context themselves. Merging is the engine's job.

use crate::expression;
use crate::StepError;
use chrono::Utc;
use jg_core::graph::{
    ActionConfig, ApiCallConfig, NodeKind, NodeSpec, NotificationConfig, RuleConfig,
    TransformConfig,
};
use jg_core::step::{StepRecord, StepStatus};
use jg_core::Context;
use rand::Rng;
use serde_json::{json, Value};
use std::time::Instant;

pub const INPUT_DATA_KEY: &str = "inputData";
pub const DECISION_KEY: &str = "decision";
pub const RULE_RESULT_KEY: &str = "ruleResult";
pub const LAST_DECISION_KEY: &str = "lastDecision";
pub const COMPLETED_KEY: &str = "completed";

/// What a handler sees.
#[derive(Debug, Clone, Copy)]
pub struct StepInput<'a> {
    /// Context as produced by the previous step.
    pub context: &'a Context,
    /// The run's initial data, used by the input roles.
    pub initial_data: &'a Context,
}

/// What a handler returns on success.
#[derive(Debug, Clone, PartialEq)]
pub struct StepOutcome {
    pub patch: Context,
    /// Stop the run after this step (terminal roles).
    pub halt: bool,
    /// Boolean result of a decision, used to pick the outgoing edge.
    pub branch: Option<bool>,
}

impl StepOutcome {
    fn patch(patch: Context) -> Self {
        Self {
            patch,
            halt: false,
            branch: None,
        }
    }
}

/// A dispatched node turned into a log entry.
#[derive(Debug, Clone)]
pub struct DispatchedStep {
    pub step: StepRecord,
    pub halt: bool,
    pub branch: Option<bool>,
}

/// Run one node's handler.
pub fn execute(node: &NodeSpec, input: StepInput<'_>) -> Result<StepOutcome, StepError> {
    match &node.kind {
        NodeKind::Input => Ok(StepOutcome::patch(input.initial_data.clone())),
        NodeKind::DataInput => Ok(StepOutcome::patch(data_input(node, input.initial_data))),
        NodeKind::Decision(cfg) => decide(cfg, input.context, DECISION_KEY),
        NodeKind::RuleEngine(cfg) => decide(cfg, input.context, RULE_RESULT_KEY),
        NodeKind::Action(cfg) => action(node, cfg).map(StepOutcome::patch),
        NodeKind::ApiCall(cfg) => api_call(cfg).map(StepOutcome::patch),
        NodeKind::DataTransform(cfg) => transform(cfg, input.context).map(StepOutcome::patch),
        NodeKind::LlmJudgment(_) => Ok(StepOutcome::patch(llm_judgment())),
        NodeKind::Notification(cfg) => notification(cfg).map(StepOutcome::patch),
        NodeKind::Output | NodeKind::ResultOutput => {
            let mut patch = input.context.clone();
            patch.insert(COMPLETED_KEY.into(), Value::Bool(true));
            Ok(StepOutcome {
                patch,
                halt: true,
                branch: None,
            })
        }
        NodeKind::Unsupported { type_name, .. } => {
            Err(StepError::UnsupportedNodeType(type_name.clone()))
        }
    }
}

/// Execute a node and wrap the result as a step record. Failures become
/// error steps with `halt` set.
pub fn run_node(node: &NodeSpec, context: &Context, initial_data: &Context) -> DispatchedStep {
    let timestamp = Utc::now();
    let started = Instant::now();
    let result = execute(
        node,
        StepInput {
            context,
            initial_data,
        },
    );
    let execution_time_ms = started.elapsed().as_millis() as u64;

    let mut step = StepRecord {
        node_id: node.id.clone(),
        node_name: node.display_name().to_string(),
        node_type: node.kind.type_name().to_string(),
        status: StepStatus::Success,
        input: context.clone(),
        output: None,
        error: None,
        execution_time_ms,
        timestamp,
    };

    match result {
        Ok(outcome) => {
            step.output = Some(outcome.patch);
            DispatchedStep {
                step,
                halt: outcome.halt,
                branch: outcome.branch,
            }
        }
        Err(e) => {
            tracing::warn!(node_id = %node.id, "step failed: {e}");
            step.status = StepStatus::Error;
            step.error = Some(e.to_string());
            DispatchedStep {
                step,
                halt: true,
                branch: None,
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

fn data_input(node: &NodeSpec, initial_data: &Context) -> Context {
    let mut patch = initial_data.clone();
    let records = match initial_data.get(INPUT_DATA_KEY) {
        Some(Value::Array(items)) => Value::Array(items.clone()),
        _ => {
            let mut record = Context::new();
            record.insert("id".into(), Value::String(format!("{}-record-1", node.id)));
            for (key, value) in initial_data {
                record.entry(key.clone()).or_insert_with(|| value.clone());
            }
            Value::Array(vec![Value::Object(record)])
        }
    };
    patch.insert(INPUT_DATA_KEY.into(), records);
    patch
}

fn decide(cfg: &RuleConfig, context: &Context, result_key: &str) -> Result<StepOutcome, StepError> {
    let rule = cfg.rule.trim();
    if rule.is_empty() {
        return Err(StepError::Handler("missing rule".into()));
    }
    let result = expression::evaluate(rule, context)?;

    let mut patch = Context::new();
    patch.insert(result_key.into(), Value::Bool(result));
    patch.insert(LAST_DECISION_KEY.into(), Value::Bool(result));
    Ok(StepOutcome {
        patch,
        halt: false,
        branch: Some(result),
    })
}

fn action(node: &NodeSpec, cfg: &ActionConfig) -> Result<Context, StepError> {
    let action = cfg.action.trim();
    if action.is_empty() {
        return Err(StepError::Handler("missing action".into()));
    }
    Ok(single(
        "actionResult",
        json!({"action": action, "status": "executed", "nodeId": node.id}),
    ))
}

fn api_call(cfg: &ApiCallConfig) -> Result<Context, StepError> {
    let endpoint = cfg.endpoint.trim();
    if endpoint.is_empty() {
        return Err(StepError::Handler("missing endpoint".into()));
    }
    let method = cfg
        .method
        .as_deref()
        .map(str::to_ascii_uppercase)
        .unwrap_or_else(|| "GET".into());
    Ok(single(
        "apiResponse",
        json!({"endpoint": endpoint, "method": method, "status": 200, "body": {"ok": true}}),
    ))
}

fn transform(cfg: &TransformConfig, context: &Context) -> Result<Context, StepError> {
    let kind = cfg.transform_type.trim();
    if kind.is_empty() {
        return Err(StepError::Handler("missing transformType".into()));
    }
    let input = context
        .get(INPUT_DATA_KEY)
        .cloned()
        .unwrap_or_else(|| Value::Array(Vec::new()));
    let field = cfg.field.as_deref().unwrap_or("value");

    let transformed = match kind {
        "map" => Value::Array(
            records(&input)
                .into_iter()
                .map(|record| match record {
                    Value::Object(mut map) => {
                        map.insert("transformed".into(), Value::Bool(true));
                        Value::Object(map)
                    }
                    other => json!({"value": other, "transformed": true}),
                })
                .collect(),
        ),
        "filter" => Value::Array(
            records(&input)
                .into_iter()
                .filter(|record| {
                    record
                        .get(field)
                        .is_some_and(|v| !v.is_null() && *v != Value::Bool(false))
                })
                .collect(),
        ),
        "aggregate" => {
            let items = records(&input);
            let sum: f64 = items
                .iter()
                .filter_map(|record| record.get(field).and_then(Value::as_f64))
                .sum();
            json!({"count": items.len(), "sum": sum})
        }
        // Unknown transform types pass the input through unchanged.
        _ => input,
    };

    let mut patch = Context::new();
    patch.insert("transformedData".into(), transformed);
    patch.insert("transformType".into(), Value::String(kind.to_string()));
    Ok(patch)
}

fn records(input: &Value) -> Vec<Value> {
    match input {
        Value::Array(items) => items.clone(),
        Value::Null => Vec::new(),
        other => vec![other.clone()],
    }
}

fn llm_judgment() -> Context {
    const VERDICTS: [&str; 3] = ["pass", "fail", "review"];
    let mut rng = rand::thread_rng();
    let judgment = VERDICTS[rng.gen_range(0..VERDICTS.len())];
    let confidence = (rng.gen_range(0.0..=1.0_f64) * 100.0).round() / 100.0;

    let mut patch = Context::new();
    patch.insert("judgment".into(), Value::String(judgment.into()));
    patch.insert("confidence".into(), json!(confidence));
    patch
}

fn notification(cfg: &NotificationConfig) -> Result<Context, StepError> {
    if cfg.channel.trim().is_empty() {
        return Err(StepError::Handler("missing channel".into()));
    }
    if cfg.message.trim().is_empty() {
        return Err(StepError::Handler("missing message".into()));
    }
    Ok(single(
        "notification",
        json!({
            "channel": cfg.channel,
            "message": cfg.message,
            "sentAt": Utc::now().to_rfc3339(),
            "status": "sent",
        }),
    ))
}

fn single(key: &str, value: Value) -> Context {
    let mut patch = Context::new();
    patch.insert(key.into(), value);
    patch
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
