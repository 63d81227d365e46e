//! Execution of one (provider, prompt, test, repeat) unit

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::{json, Map, Value};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::state::RunState;
use crate::domain::expression::{ExpressionError, ExpressionEvaluator};
use crate::domain::prompt::{Prompt, TemplateFilters};
use crate::domain::provider::{
    ApiProvider, CallContext, CallOptions, ConversationTurn, ProviderResponse, TokenUsage,
};
use crate::domain::test_case::{EvaluateResult, ResultFailureReason, TestCase};
use crate::domain::vars::{Vars, CONVERSATION_VAR};
use crate::domain::DomainError;
use crate::infrastructure::assertion::{apply_scoring_function, AssertionContext, AssertionRunner};
use crate::infrastructure::template::PromptRenderer;

/// One scheduled combination; `test.vars` holds a single concrete assignment
#[derive(Debug, Clone)]
pub struct EvalUnit {
    pub unit_idx: usize,
    pub provider: Arc<dyn ApiProvider>,
    pub provider_idx: usize,
    pub prompt: Prompt,
    pub prompt_idx: usize,
    pub test: TestCase,
    pub test_idx: usize,
    pub repeat_index: usize,
}

impl EvalUnit {
    /// A result carrying this unit's identity and nothing else yet
    pub fn pending_result(&self) -> EvaluateResult {
        let mut result = EvaluateResult::pending(
            self.prompt.clone(),
            self.provider.info(),
            self.test.clone(),
            self.test.vars.clone(),
        );
        result.unit_idx = self.unit_idx;
        result.prompt_idx = self.prompt_idx;
        result.test_idx = self.test_idx;
        result.repeat_index = self.repeat_index;
        result
    }
}

/// Collaborators and limits shared by every unit of a run
#[derive(Clone, Copy)]
pub struct RunEvalContext<'a> {
    pub renderer: &'a PromptRenderer,
    pub assertions: &'a AssertionRunner,
    pub state: &'a RunState,
    pub filters: &'a TemplateFilters,
    pub timeout_ms: u64,
    pub max_eval_time_ms: u64,
    pub default_delay_ms: u64,
    pub run_token: &'a CancellationToken,
}

impl RunEvalContext<'_> {
    /// Error recorded for units cut short by the run token
    pub fn abort_message(&self) -> String {
        if self.state.timed_out() {
            format!(
                "Evaluation exceeded max duration of {}ms",
                self.max_eval_time_ms
            )
        } else {
            "Evaluation aborted".to_string()
        }
    }
}

enum CallOutcome {
    Completed(Result<ProviderResponse, DomainError>),
    TimedOut,
    Aborted,
}

/// Execute one unit
///
/// Always returns at least one terminal result; failures are recorded on the
/// result rather than returned.
pub async fn run_eval(unit: &EvalUnit, ctx: &RunEvalContext<'_>) -> Vec<EvaluateResult> {
    let mut result = unit.pending_result();
    let provider = unit.provider.as_ref();
    let info = provider.info();
    let test = &unit.test;

    let conversation_key =
        RunState::conversation_key(&info, &unit.prompt, test.conversation_id());
    let history = ctx.state.history(&conversation_key).await;

    let mut vars = test.vars.clone();
    for (name, value) in ctx.state.registers().await {
        vars.entry(name).or_insert(value);
    }
    vars.insert(CONVERSATION_VAR.to_string(), json!(history));

    if let Some(source) = &test.options.transform_vars {
        match transform_vars(ctx.assertions.evaluator().as_ref(), source, &vars, &unit.prompt) {
            Ok(updated) => vars.extend(updated),
            Err(e) => {
                result.vars = vars;
                result.set_error(format!("Error running transformVars: {}", e));
                return vec![result];
            }
        }
    }

    let rendered = match ctx
        .renderer
        .render(&unit.prompt, &mut vars, ctx.filters, Some(&info))
        .await
    {
        Ok(rendered) => rendered,
        Err(e) => {
            result.vars = vars;
            result.set_error(e.to_string());
            return vec![result];
        }
    };
    result.rendered_prompt = rendered.text.clone();
    result.vars = vars.clone();

    let call_context = CallContext {
        vars: vars.clone(),
        prompt: unit.prompt.clone(),
        config: rendered.config,
        conversation_history: history,
    };

    let started = Instant::now();
    let outcome = call_provider(provider, &rendered.text, &call_context, ctx).await;
    result.latency_ms = started.elapsed().as_millis() as u64;

    let response = match outcome {
        CallOutcome::Completed(response) => {
            if !response.as_ref().is_ok_and(|r| r.cached) {
                pace(provider, ctx).await;
            }
            match response {
                Ok(response) => response,
                Err(e) => {
                    warn!(provider = %info.id, error = %e, "Provider call failed");
                    result.set_error(e.to_string());
                    return vec![result];
                }
            }
        }
        CallOutcome::TimedOut => {
            warn!(provider = %info.id, timeout_ms = ctx.timeout_ms, "Provider call timed out");
            if let Err(e) = provider.cleanup().await {
                warn!(provider = %info.id, error = %e, "Provider cleanup after timeout failed");
            }
            result.set_error(format!(
                "Evaluation timed out after {}ms",
                ctx.timeout_ms
            ));
            return vec![result];
        }
        CallOutcome::Aborted => {
            result.set_error(ctx.abort_message());
            return vec![result];
        }
    };

    result.cached = response.cached;
    result.token_usage = TokenUsage::from(response.token_usage.unwrap_or_default());
    for (key, value) in &response.metadata {
        result.metadata.insert(key.clone(), value.clone());
    }

    if let Some(error) = &response.error {
        result.set_error(error.clone());
        result.response = Some(response);
        return vec![result];
    }

    let mut response = response;
    let output = match response.output.take().filter(|v| !v.is_null()) {
        Some(output) => match apply_output_transforms(provider, test, output, &vars, &unit.prompt, ctx) {
            Ok(output) => Some(output),
            Err(message) => {
                result.set_error(message);
                result.response = Some(response);
                return vec![result];
            }
        },
        None => None,
    };
    response.output = output.clone();
    result.response = Some(response);

    match output {
        None if test.is_red_team() => {
            result.success = true;
            result.score = 1.0;
        }
        None => {
            result.success = false;
            result.score = 0.0;
            result.failure_reason = ResultFailureReason::Assert;
            result.error = Some("No output".to_string());
        }
        Some(output) => {
            let assertion_context = AssertionContext {
                prompt: &result.rendered_prompt,
                vars: &vars,
                provider: &info,
                latency_ms: result.latency_ms,
            };
            let mut grading = ctx.assertions.run(test, &output, &assertion_context).await;
            if let Some(usage) = &grading.token_usage {
                result.token_usage.add_assertion_usage(usage);
            }

            if let Some(source) = &test.options.scoring_function {
                grading = match apply_scoring_function(
                    ctx.assertions.evaluator().as_ref(),
                    source,
                    grading,
                    &vars,
                ) {
                    Ok(grading) => grading,
                    Err(e) => {
                        result.set_error(e.to_string());
                        return vec![result];
                    }
                };
            }

            result.success = grading.pass;
            result.score = grading.score;
            result.named_scores = grading.named_scores.clone();
            if !grading.pass {
                result.failure_reason = ResultFailureReason::Assert;
                result.error = Some(grading.reason.clone());
            }
            result.grading_result = Some(grading);

            record_turn(unit, &conversation_key, &result.rendered_prompt, &vars, &output, ctx).await;
        }
    }

    vec![result]
}

/// Wait out the provider delay after a live call, cut short by the run token
async fn pace(provider: &dyn ApiProvider, ctx: &RunEvalContext<'_>) {
    let delay_ms = provider.delay_ms().unwrap_or(ctx.default_delay_ms);
    if delay_ms == 0 {
        return;
    }
    debug!(provider = %provider.id(), delay_ms, "Waiting before the next call");
    tokio::select! {
        _ = tokio::time::sleep(Duration::from_millis(delay_ms)) => {}
        _ = ctx.run_token.cancelled() => {}
    }
}

/// Race the call against the per-call timeout and the run token
async fn call_provider(
    provider: &dyn ApiProvider,
    prompt: &str,
    context: &CallContext,
    ctx: &RunEvalContext<'_>,
) -> CallOutcome {
    let call_token = ctx.run_token.child_token();
    let options = CallOptions {
        abort_signal: Some(call_token.clone()),
    };

    let timeout = async {
        if ctx.timeout_ms > 0 {
            tokio::time::sleep(Duration::from_millis(ctx.timeout_ms)).await;
        } else {
            std::future::pending::<()>().await;
        }
    };

    tokio::select! {
        biased;
        _ = ctx.run_token.cancelled() => CallOutcome::Aborted,
        _ = timeout => {
            call_token.cancel();
            CallOutcome::TimedOut
        }
        response = provider.call_api(prompt, context, &options) => CallOutcome::Completed(response),
    }
}

fn expression_bindings(output: Option<&Value>, vars: &Vars, prompt: &Prompt) -> Map<String, Value> {
    let mut bindings = Map::new();
    if let Some(output) = output {
        bindings.insert("output".to_string(), output.clone());
    }
    bindings.insert("vars".to_string(), Value::Object(vars.clone()));
    bindings.insert(
        "context".to_string(),
        json!({
            "vars": vars,
            "prompt": {"raw": prompt.raw, "label": prompt.label},
        }),
    );
    bindings
}

fn transform_vars(
    evaluator: &dyn ExpressionEvaluator,
    source: &str,
    vars: &Vars,
    prompt: &Prompt,
) -> Result<Vars, ExpressionError> {
    match evaluator.evaluate(source, &expression_bindings(None, vars, prompt))? {
        Value::Object(updated) => Ok(updated),
        other => Err(ExpressionError::evaluation(format!(
            "transformVars must return an object, got {}",
            other
        ))),
    }
}

/// Provider transform first, then the test's own
fn apply_output_transforms(
    provider: &dyn ApiProvider,
    test: &TestCase,
    output: Value,
    vars: &Vars,
    prompt: &Prompt,
    ctx: &RunEvalContext<'_>,
) -> Result<Value, String> {
    let evaluator = ctx.assertions.evaluator();
    let mut output = output;

    if let Some(source) = provider.transform() {
        output = evaluator
            .evaluate(source, &expression_bindings(Some(&output), vars, prompt))
            .map_err(|e| format!("Error in provider transform: {}", e))?;
    }

    if let Some(source) = test.options.output_transform() {
        output = evaluator
            .evaluate(source, &expression_bindings(Some(&output), vars, prompt))
            .map_err(|e| format!("Error in test transform: {}", e))?;
    }

    Ok(output)
}

async fn record_turn(
    unit: &EvalUnit,
    conversation_key: &str,
    rendered_prompt: &str,
    vars: &Vars,
    output: &Value,
    ctx: &RunEvalContext<'_>,
) {
    let input = match vars.get("input") {
        Some(Value::String(input)) => input.clone(),
        _ => rendered_prompt.to_string(),
    };
    ctx.state
        .push_turn(
            conversation_key,
            ConversationTurn {
                prompt: rendered_prompt.to_string(),
                input,
                output: output.clone(),
            },
        )
        .await;

    if let Some(name) = &unit.test.options.store_output_as {
        ctx.state.store(name, output.clone()).await;
    }
}
