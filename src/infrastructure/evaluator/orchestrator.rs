//! Evaluation orchestrator
//!
//! Drives a run from the `beforeAll` hook to the finalized summary: expands the
//! suite into units, runs them on a bounded pool of futures, persists each
//! result as it completes and aggregates per-prompt metrics at the end.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::stream::{self, StreamExt};
use serde_json::{json, Map, Value};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::options::EvaluateOptions;
use super::progress::ProgressReporter;
use super::prompt_filter::prompts_for_provider;
use super::run_eval::{run_eval, EvalUnit, RunEvalContext};
use super::state::RunState;
use crate::config::AppConfig;
use crate::domain::provider::ApiProvider;
use crate::domain::sink::ResultSink;
use crate::domain::suite::{CompletedPrompt, DerivedMetric, EvaluateSummary, TestSuite};
use crate::domain::test_case::{validate_test_case, EvaluateResult, TestCase};
use crate::domain::vars::CONVERSATION_VAR;
use crate::domain::DomainError;
use crate::infrastructure::assertion::AssertionRunner;
use crate::infrastructure::extension::ExtensionRunner;
use crate::infrastructure::files::FileMaterializer;
use crate::infrastructure::metrics;
use crate::infrastructure::template::PromptRenderer;
use crate::infrastructure::vars::expand_vars;

/// Runs test suites against their providers
pub struct Evaluator {
    renderer: PromptRenderer,
    assertions: AssertionRunner,
    extensions: ExtensionRunner,
    sink: Arc<dyn ResultSink>,
    options: EvaluateOptions,
}

impl Evaluator {
    pub fn new(sink: Arc<dyn ResultSink>) -> Self {
        Self {
            renderer: PromptRenderer::default(),
            assertions: AssertionRunner::default(),
            extensions: ExtensionRunner::default(),
            sink,
            options: EvaluateOptions::default(),
        }
    }

    /// Evaluator wired from application configuration
    pub fn from_config(config: &AppConfig, sink: Arc<dyn ResultSink>) -> Self {
        let evaluation = &config.evaluation;
        let renderer = PromptRenderer::default()
            .with_materializer(
                FileMaterializer::default()
                    .with_media_base64_disabled(evaluation.disable_media_base64),
            )
            .with_max_iterations(evaluation.var_resolution_max_iterations)
            .with_strip_trailing_newline(evaluation.strip_trailing_newline);

        Self::new(sink)
            .with_renderer(renderer)
            .with_options(EvaluateOptions::from_config(evaluation))
    }

    pub fn with_renderer(mut self, renderer: PromptRenderer) -> Self {
        self.renderer = renderer;
        self
    }

    pub fn with_assertions(mut self, assertions: AssertionRunner) -> Self {
        self.assertions = assertions;
        self
    }

    pub fn with_extensions(mut self, extensions: ExtensionRunner) -> Self {
        self.extensions = extensions;
        self
    }

    pub fn with_options(mut self, options: EvaluateOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> &EvaluateOptions {
        &self.options
    }

    /// Run `suite` to completion
    ///
    /// Per-unit failures are recorded on results. Only configuration and
    /// `beforeAll` hook errors fail the run.
    pub async fn evaluate(&self, suite: TestSuite) -> Result<EvaluateSummary, DomainError> {
        let started = Instant::now();
        let suite = self.extensions.before_all(suite).await?;

        let tests = suite.resolved_tests();
        for test in &tests {
            validate_test_case(test)?;
        }

        let provider_prompts: Vec<Vec<usize>> = suite
            .providers
            .iter()
            .map(|p| prompts_for_provider(p.as_ref(), &suite.prompts, &suite.provider_prompt_map))
            .collect();
        let units = self.build_units(&suite, &tests, &provider_prompts)?;
        let concurrency = self.effective_concurrency(&suite, &tests);

        info!(
            units = units.len(),
            providers = suite.providers.len(),
            prompts = suite.prompts.len(),
            tests = tests.len(),
            concurrency,
            "Starting evaluation"
        );

        let run_token = match &self.options.abort_signal {
            Some(token) => token.child_token(),
            None => CancellationToken::new(),
        };
        let state = Arc::new(RunState::new());
        let deadline = self.spawn_deadline(state.clone(), run_token.clone());
        let progress = ProgressReporter::new(units.len(), self.options.on_progress.clone());

        let ctx = RunEvalContext {
            renderer: &self.renderer,
            assertions: &self.assertions,
            state: &state,
            filters: &suite.nunjucks_filters,
            timeout_ms: self.options.timeout_ms,
            max_eval_time_ms: self.options.max_eval_time_ms,
            default_delay_ms: self.options.delay_ms,
            run_token: &run_token,
        };

        let batches: Vec<Vec<EvaluateResult>> = stream::iter(units.iter())
            .map(|unit| self.run_unit(unit, &ctx, &progress))
            .buffer_unordered(concurrency)
            .collect()
            .await;

        if let Some(deadline) = deadline {
            deadline.abort();
        }

        let mut results: Vec<EvaluateResult> = batches.into_iter().flatten().collect();
        results.sort_by_key(|r| r.unit_idx);

        let mut prompts = completed_prompts(&suite, &provider_prompts, &units, &results);
        self.apply_derived_metrics(&suite.derived_metrics, &mut prompts);

        if let Err(e) = self.extensions.after_all(&suite, &results, &prompts).await {
            warn!(error = %e, "afterAll hook failed");
        }
        if let Err(e) = self.sink.add_prompts(&prompts).await {
            warn!(error = %e, "Failed to persist prompts");
        }

        cleanup_providers(&suite.providers).await;

        let mut summary = EvaluateSummary::new(results, prompts);
        summary.timed_out = state.timed_out();

        info!(
            successes = summary.stats.successes,
            failures = summary.stats.failures,
            errors = summary.stats.errors,
            timed_out = summary.timed_out,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Evaluation finished"
        );

        Ok(summary)
    }

    /// Flatten tests × repeats × variable combinations × providers × prompts
    fn build_units(
        &self,
        suite: &TestSuite,
        tests: &[TestCase],
        provider_prompts: &[Vec<usize>],
    ) -> Result<Vec<EvalUnit>, DomainError> {
        let base_path = self.renderer.materializer().loader().base_path().to_path_buf();
        let repeat = self.options.repeat.max(1);
        let mut units = Vec::new();

        for (test_idx, test) in tests.iter().enumerate() {
            let keep_sequences = test.options.disable_var_expansion.unwrap_or(false);
            let combinations = expand_vars(&test.vars, &base_path, keep_sequences)?;

            for repeat_index in 0..repeat {
                for vars in &combinations {
                    for (provider_idx, provider) in suite.providers.iter().enumerate() {
                        for &prompt_idx in &provider_prompts[provider_idx] {
                            let mut concrete = test.clone();
                            concrete.vars = vars.clone();
                            units.push(EvalUnit {
                                unit_idx: units.len(),
                                provider: provider.clone(),
                                provider_idx,
                                prompt: suite.prompts[prompt_idx].clone(),
                                prompt_idx,
                                test: concrete,
                                test_idx,
                                repeat_index,
                            });
                        }
                    }
                }
            }
        }

        Ok(units)
    }

    /// Conversation threading and output registers need units in order
    fn effective_concurrency(&self, suite: &TestSuite, tests: &[TestCase]) -> usize {
        let requested = self.options.max_concurrency.max(1);
        let sequential = suite.prompts.iter().any(|p| p.raw.contains(CONVERSATION_VAR))
            || tests.iter().any(|t| t.options.store_output_as.is_some());

        if sequential && requested > 1 {
            info!(requested, "Running sequentially for conversation and stored outputs");
            return 1;
        }
        requested
    }

    fn spawn_deadline(
        &self,
        state: Arc<RunState>,
        run_token: CancellationToken,
    ) -> Option<tokio::task::JoinHandle<()>> {
        let max_eval_time_ms = self.options.max_eval_time_ms;
        if max_eval_time_ms == 0 {
            return None;
        }

        Some(tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(max_eval_time_ms)).await;
            warn!(max_eval_time_ms, "Evaluation exceeded max duration, aborting");
            state.mark_timed_out();
            run_token.cancel();
        }))
    }

    async fn run_unit(
        &self,
        unit: &EvalUnit,
        ctx: &RunEvalContext<'_>,
        progress: &ProgressReporter,
    ) -> Vec<EvaluateResult> {
        let started = Instant::now();

        let results = if ctx.run_token.is_cancelled() {
            let mut result = unit.pending_result();
            result.set_error(ctx.abort_message());
            vec![result]
        } else {
            let mut unit = unit.clone();
            match self.extensions.before_each(unit.test.clone()).await {
                Ok(test) => unit.test = test,
                Err(e) => warn!(unit = unit.unit_idx, error = %e, "beforeEach hook failed"),
            }
            debug!(
                unit = unit.unit_idx,
                provider = %unit.provider.id(),
                prompt = %unit.prompt.label,
                "Running unit"
            );
            run_eval(&unit, ctx).await
        };

        for result in &results {
            if let Err(e) = self.extensions.after_each(&result.test_case, result).await {
                warn!(unit = result.unit_idx, error = %e, "afterEach hook failed");
            }
            if let Err(e) = self.sink.add_result(result).await {
                warn!(unit = result.unit_idx, error = %e, "Failed to persist result");
            }
            progress.record(result);
            metrics::record_unit(result, started.elapsed());
        }

        results
    }

    /// Evaluate each derived metric over a prompt's averaged named scores
    fn apply_derived_metrics(&self, derived: &[DerivedMetric], prompts: &mut [CompletedPrompt]) {
        if derived.is_empty() {
            return;
        }
        let evaluator = self.assertions.evaluator();

        for prompt in prompts.iter_mut() {
            let metrics = &mut prompt.metrics;
            let mut scores: Map<String, Value> = metrics
                .named_scores
                .iter()
                .map(|(name, total)| {
                    let count = metrics.named_scores_count.get(name).copied().unwrap_or(1).max(1);
                    (name.clone(), json!(total / count as f64))
                })
                .collect();

            for metric in derived {
                let mut bindings = scores.clone();
                bindings.insert("namedScores".to_string(), Value::Object(scores.clone()));

                match evaluator.evaluate(&metric.value, &bindings) {
                    Ok(value) => match value.as_f64() {
                        Some(score) => {
                            metrics.named_scores.insert(metric.name.clone(), score);
                            metrics.named_scores_count.insert(metric.name.clone(), 1);
                            scores.insert(metric.name.clone(), json!(score));
                        }
                        None => warn!(metric = %metric.name, %value, "Derived metric is not a number"),
                    },
                    Err(e) => warn!(metric = %metric.name, error = %e, "Derived metric failed"),
                }
            }
        }
    }
}

/// One entry per (provider, allowed prompt), with metrics of its results
fn completed_prompts(
    suite: &TestSuite,
    provider_prompts: &[Vec<usize>],
    units: &[EvalUnit],
    results: &[EvaluateResult],
) -> Vec<CompletedPrompt> {
    let mut slots = HashMap::new();
    let mut prompts = Vec::new();

    for (provider_idx, provider) in suite.providers.iter().enumerate() {
        let name = provider.info().display_name().to_string();
        for &prompt_idx in &provider_prompts[provider_idx] {
            slots.insert((provider_idx, prompt_idx), prompts.len());
            prompts.push(CompletedPrompt::new(suite.prompts[prompt_idx].clone(), name.clone()));
        }
    }

    for result in results {
        let Some(unit) = units.get(result.unit_idx) else {
            continue;
        };
        if let Some(&slot) = slots.get(&(unit.provider_idx, unit.prompt_idx)) {
            prompts[slot].metrics.record(result);
        }
    }

    prompts
}

/// Cleanup every distinct provider once
async fn cleanup_providers(providers: &[Arc<dyn ApiProvider>]) {
    let mut cleaned: Vec<&Arc<dyn ApiProvider>> = Vec::new();
    for provider in providers {
        if cleaned.iter().any(|p| Arc::ptr_eq(p, provider)) {
            continue;
        }
        cleaned.push(provider);
        if let Err(e) = provider.cleanup().await {
            warn!(provider = %provider.id(), error = %e, "Provider cleanup failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::extension::{Extension, HookName};
    use crate::domain::prompt::Prompt;
    use crate::domain::provider::{MockProvider, ProviderResponse, TokenCounts};
    use crate::domain::sink::MockResultSink;
    use crate::domain::test_case::{Assertion, ResultFailureReason, TestOptions};
    use crate::infrastructure::sink::InMemoryResultSink;
    use async_trait::async_trait;
    use std::sync::Mutex;

    type Handler = Box<dyn Fn(HookName, &Value) -> anyhow::Result<Option<Value>> + Send + Sync>;

    struct HookExtension {
        handler: Handler,
    }

    #[async_trait]
    impl Extension for HookExtension {
        fn name(&self) -> &str {
            "hooks"
        }

        async fn call(&self, hook: HookName, context: &Value) -> anyhow::Result<Option<Value>> {
            (self.handler)(hook, context)
        }
    }

    fn extensions(
        handler: impl Fn(HookName, &Value) -> anyhow::Result<Option<Value>> + Send + Sync + 'static,
    ) -> ExtensionRunner {
        ExtensionRunner::default().with_extension(Arc::new(HookExtension {
            handler: Box::new(handler),
        }))
    }

    fn usage_provider() -> MockProvider {
        MockProvider::new("mock").with_response(
            ProviderResponse::output("Test output").with_token_usage(TokenCounts::new(5, 5)),
        )
    }

    fn evaluator() -> (Evaluator, Arc<InMemoryResultSink>) {
        let sink = Arc::new(InMemoryResultSink::new());
        (Evaluator::new(sink.clone()), sink)
    }

    #[tokio::test]
    async fn test_single_unit_run() {
        let (evaluator, sink) = evaluator();
        let suite = TestSuite::new()
            .with_provider(Arc::new(usage_provider()))
            .with_prompt(Prompt::new("Test prompt {{var1}} {{var2}}"))
            .with_test(
                TestCase::new()
                    .with_var("var1", "value1")
                    .with_var("var2", "value2")
                    .with_assertion(Assertion::equals("Test output")),
            );

        let summary = evaluator.evaluate(suite).await.unwrap();

        assert_eq!(summary.results.len(), 1);
        assert_eq!(summary.results[0].rendered_prompt, "Test prompt value1 value2");
        assert!(summary.results[0].success);
        assert_eq!(summary.stats.successes, 1);
        assert_eq!(summary.stats.token_usage.total(), 10);
        assert_eq!(sink.results().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_cartesian_vars_multiply_usage() {
        let (evaluator, _) = evaluator();
        let suite = TestSuite::new()
            .with_provider(Arc::new(usage_provider()))
            .with_prompt(Prompt::new("Test prompt {{var1}} {{var2}}"))
            .with_test(
                TestCase::new()
                    .with_var("var1", json!(["value1", "value3"]))
                    .with_var("var2", json!(["value2", "value4"])),
            );

        let summary = evaluator.evaluate(suite).await.unwrap();

        assert_eq!(summary.results.len(), 4);
        assert_eq!(summary.stats.token_usage.total(), 40);
        let rendered: Vec<&str> = summary
            .results
            .iter()
            .map(|r| r.rendered_prompt.as_str())
            .collect();
        assert_eq!(
            rendered,
            vec![
                "Test prompt value1 value2",
                "Test prompt value3 value2",
                "Test prompt value1 value4",
                "Test prompt value3 value4",
            ]
        );
    }

    #[tokio::test]
    async fn test_unit_count_across_providers_prompts_and_repeats() {
        let (evaluator, _) = evaluator();
        let evaluator = evaluator.with_options(EvaluateOptions::default().with_repeat(2));
        let suite = TestSuite::new()
            .with_provider(Arc::new(MockProvider::new("a")))
            .with_provider(Arc::new(MockProvider::new("b")))
            .with_prompt(Prompt::new("one {{ x }}"))
            .with_prompt(Prompt::new("two {{ x }}"))
            .with_test(TestCase::new().with_var("x", json!([1, 2])))
            .with_test(TestCase::new().with_var("x", 3));

        let summary = evaluator.evaluate(suite).await.unwrap();

        // (2 + 1 combinations) * 2 repeats * 2 providers * 2 prompts
        assert_eq!(summary.results.len(), 24);
        assert!(summary.results.windows(2).all(|w| w[0].unit_idx < w[1].unit_idx));
        assert_eq!(summary.prompts.len(), 4);
        assert_eq!(summary.results[0].repeat_index, 0);
        assert_eq!(summary.results[8].repeat_index, 1);
    }

    #[tokio::test]
    async fn test_null_output_standard_and_red_team() {
        let (evaluator, _) = evaluator();
        let suite = TestSuite::new()
            .with_provider(Arc::new(
                MockProvider::new("m").with_response(ProviderResponse::empty()),
            ))
            .with_prompt(Prompt::new("p"))
            .with_test(TestCase::new())
            .with_test(TestCase::new().with_metadata("pluginId", "harmful:hate"));

        let summary = evaluator.evaluate(suite).await.unwrap();

        assert!(!summary.results[0].success);
        assert_eq!(summary.results[0].error.as_deref(), Some("No output"));
        assert_eq!(summary.results[0].score, 0.0);
        assert!(summary.results[1].success);
        assert!(summary.results[1].error.is_none());
    }

    #[tokio::test]
    async fn test_transforms_compose_provider_first() {
        let (evaluator, _) = evaluator();
        let suite = TestSuite::new()
            .with_provider(Arc::new(
                MockProvider::new("m")
                    .with_response(ProviderResponse::output("Original output"))
                    .with_transform("`Provider: ${output}`"),
            ))
            .with_prompt(Prompt::new("p"))
            .with_default_test(TestCase::new().with_transform("`Test: ${output}`"))
            .with_test(TestCase::new());

        let summary = evaluator.evaluate(suite).await.unwrap();
        assert_eq!(
            summary.results[0].output(),
            Some(&json!("Test: Provider: Original output"))
        );
    }

    #[tokio::test]
    async fn test_invalid_assertion_fails_before_running() {
        let (evaluator, sink) = evaluator();
        let provider = Arc::new(MockProvider::new("m"));
        let suite = TestSuite::new()
            .with_provider(provider.clone())
            .with_prompt(Prompt::new("p"))
            .with_test(TestCase::new().with_assertion(Assertion::new("made-up")));

        let err = evaluator.evaluate(suite).await.unwrap_err();

        assert!(err.to_string().contains("Unknown assertion type"));
        assert_eq!(provider.call_count(), 0);
        assert!(sink.results().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_per_call_timeout() {
        let (evaluator, _) = evaluator();
        let evaluator = evaluator.with_options(EvaluateOptions::default().with_timeout_ms(20));
        let provider = Arc::new(MockProvider::new("slow").with_latency(Duration::from_secs(5)));
        let suite = TestSuite::new()
            .with_provider(provider.clone())
            .with_prompt(Prompt::new("p"))
            .with_test(TestCase::new());

        let summary = evaluator.evaluate(suite).await.unwrap();

        let result = &summary.results[0];
        assert_eq!(result.failure_reason, ResultFailureReason::Error);
        assert!(result.error.as_deref().unwrap().contains("timed out"));
        // once after the timeout, once at the end of the run
        assert_eq!(provider.cleanup_count(), 2);
        assert!(!summary.timed_out);
    }

    #[tokio::test]
    async fn test_whole_run_deadline() {
        let (evaluator, _) = evaluator();
        let evaluator = evaluator.with_options(
            EvaluateOptions::default()
                .with_max_concurrency(1)
                .with_max_eval_time_ms(50),
        );
        let provider = Arc::new(MockProvider::new("slow").with_latency(Duration::from_secs(5)));
        let suite = TestSuite::new()
            .with_provider(provider.clone())
            .with_prompt(Prompt::new("p {{ n }}"))
            .with_test(TestCase::new().with_var("n", json!([1, 2, 3])));

        let summary = evaluator.evaluate(suite).await.unwrap();

        assert!(summary.timed_out);
        assert_eq!(summary.results.len(), 3);
        for result in &summary.results {
            assert_eq!(result.failure_reason, ResultFailureReason::Error);
            assert!(result.error.as_deref().unwrap().contains("exceeded max duration"));
        }
        assert_eq!(provider.call_count(), 1);
    }

    #[tokio::test]
    async fn test_external_abort_signal() {
        let (evaluator, _) = evaluator();
        let token = CancellationToken::new();
        token.cancel();
        let evaluator = evaluator.with_options(EvaluateOptions::default().with_abort_signal(token));
        let suite = TestSuite::new()
            .with_provider(Arc::new(MockProvider::new("m")))
            .with_prompt(Prompt::new("p"))
            .with_test(TestCase::new());

        let summary = evaluator.evaluate(suite).await.unwrap();
        assert_eq!(summary.results[0].error.as_deref(), Some("Evaluation aborted"));
        assert!(!summary.timed_out);
    }

    #[tokio::test]
    async fn test_persistence_errors_are_swallowed() {
        let mut sink = MockResultSink::new();
        sink.expect_add_result()
            .times(2)
            .returning(|_| Err(DomainError::storage("disk full")));
        sink.expect_add_prompts().times(1).returning(|_| Ok(()));
        let evaluator = Evaluator::new(Arc::new(sink));

        let suite = TestSuite::new()
            .with_provider(Arc::new(MockProvider::new("m")))
            .with_prompt(Prompt::new("p {{ n }}"))
            .with_test(TestCase::new().with_var("n", json!([1, 2])));

        let summary = evaluator.evaluate(suite).await.unwrap();
        assert_eq!(summary.results.len(), 2);
        assert!(summary.results.iter().all(|r| r.success));
    }

    #[tokio::test]
    async fn test_shared_provider_is_cleaned_up_once() {
        let (evaluator, _) = evaluator();
        let mock = Arc::new(MockProvider::new("m"));
        let shared: Arc<dyn ApiProvider> = mock.clone();
        let suite = TestSuite::new()
            .with_provider(shared.clone())
            .with_provider(shared)
            .with_prompt(Prompt::new("p"));

        let summary = evaluator.evaluate(suite).await.unwrap();
        assert_eq!(summary.results.len(), 2);
        assert_eq!(mock.cleanup_count(), 1);
    }

    #[tokio::test]
    async fn test_progress_reports_every_unit() {
        let (evaluator, _) = evaluator();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let recorder = seen.clone();
        let evaluator = evaluator.with_options(
            EvaluateOptions::default()
                .with_max_concurrency(1)
                .with_progress(move |done, total, _| recorder.lock().unwrap().push((done, total))),
        );
        let suite = TestSuite::new()
            .with_provider(Arc::new(MockProvider::new("m")))
            .with_prompt(Prompt::new("p {{ n }}"))
            .with_test(TestCase::new().with_var("n", json!([1, 2, 3])));

        evaluator.evaluate(suite).await.unwrap();
        assert_eq!(*seen.lock().unwrap(), vec![(1, 3), (2, 3), (3, 3)]);
    }

    #[tokio::test]
    async fn test_allowed_prompts_narrow_units() {
        let (evaluator, _) = evaluator();
        let suite = TestSuite::new()
            .with_provider(Arc::new(
                MockProvider::new("calc").with_allowed_prompts(vec!["math"]),
            ))
            .with_provider(Arc::new(MockProvider::new("open")))
            .with_prompt(Prompt::new("1 + 1").with_label("math:add"))
            .with_prompt(Prompt::new("hello").with_label("chat"))
            .with_test(TestCase::new());

        let summary = evaluator.evaluate(suite).await.unwrap();

        assert_eq!(summary.results.len(), 3);
        assert_eq!(summary.prompts.len(), 3);
        assert_eq!(summary.prompts[0].provider, "calc");
        assert_eq!(summary.prompts[0].prompt.label, "math:add");
    }

    #[tokio::test]
    async fn test_before_each_hook_updates_test() {
        let (evaluator, _) = evaluator();
        let evaluator = evaluator.with_extensions(extensions(|hook, context| match hook {
            HookName::BeforeEach => {
                let mut test = context["test"].clone();
                test["vars"]["name"] = json!("hooked");
                Ok(Some(json!({ "test": test })))
            }
            _ => Ok(None),
        }));
        let suite = TestSuite::new()
            .with_provider(Arc::new(MockProvider::new("m").echoing()))
            .with_prompt(Prompt::new("Hi {{ name }}"))
            .with_test(TestCase::new().with_var("name", "plain"));

        let summary = evaluator.evaluate(suite).await.unwrap();
        assert_eq!(summary.results[0].output(), Some(&json!("Hi hooked")));
    }

    #[tokio::test]
    async fn test_before_all_hook_rejects_unknown_fields() {
        let (evaluator, _) = evaluator();
        let evaluator = evaluator.with_extensions(extensions(|hook, _| match hook {
            HookName::BeforeAll => Ok(Some(json!({ "suite": { "providers": [] } }))),
            _ => Ok(None),
        }));
        let provider = Arc::new(MockProvider::new("m"));
        let suite = TestSuite::new()
            .with_provider(provider.clone())
            .with_prompt(Prompt::new("p"));

        let err = evaluator.evaluate(suite).await.unwrap_err();
        assert!(err.to_string().contains("hooks"));
        assert_eq!(provider.call_count(), 0);
    }

    #[tokio::test]
    async fn test_before_all_hook_replaces_tests() {
        let (evaluator, _) = evaluator();
        let evaluator = evaluator.with_extensions(extensions(|hook, _| match hook {
            HookName::BeforeAll => Ok(Some(json!({
                "suite": { "tests": [{ "vars": { "n": "a" } }, { "vars": { "n": "b" } }] }
            }))),
            _ => Ok(None),
        }));
        let suite = TestSuite::new()
            .with_provider(Arc::new(MockProvider::new("m").echoing()))
            .with_prompt(Prompt::new("{{ n }}"));

        let summary = evaluator.evaluate(suite).await.unwrap();
        let outputs: Vec<_> = summary.results.iter().filter_map(|r| r.output().cloned()).collect();
        assert_eq!(outputs, vec![json!("a"), json!("b")]);
    }

    #[tokio::test]
    async fn test_derived_metrics_use_averaged_named_scores() {
        let (evaluator, _) = evaluator();
        let suite = TestSuite::new()
            .with_provider(Arc::new(MockProvider::new("m").echoing()))
            .with_prompt(Prompt::new("{{ word }}"))
            .with_test(
                TestCase::new()
                    .with_var("word", json!(["yes", "no"]))
                    .with_assertion(Assertion::equals("yes").with_metric("accuracy")),
            )
            .with_derived_metric("doubled", "accuracy * 2");

        let summary = evaluator.evaluate(suite).await.unwrap();

        let metrics = &summary.prompts[0].metrics;
        assert_eq!(metrics.named_scores["doubled"], 1.0);
        assert_eq!(metrics.test_pass_count, 1);
        assert_eq!(metrics.test_fail_count, 1);
    }

    #[tokio::test]
    async fn test_conversation_prompts_force_sequential_order() {
        let (evaluator, _) = evaluator();
        let provider = Arc::new(MockProvider::new("chat").echoing());
        let suite = TestSuite::new()
            .with_provider(provider.clone())
            .with_prompt(Prompt::new("{{ _conversation | length }}:{{ input }}"))
            .with_test(TestCase::new().with_var("input", "first"))
            .with_test(TestCase::new().with_var("input", "second"))
            .with_test(TestCase::new().with_var("input", "third"));

        let summary = evaluator.evaluate(suite).await.unwrap();
        let outputs: Vec<_> = summary.results.iter().filter_map(|r| r.output().cloned()).collect();
        assert_eq!(outputs, vec![json!("0:first"), json!("1:second"), json!("2:third")]);
    }

    #[tokio::test]
    async fn test_store_output_as_is_visible_to_later_tests() {
        let (evaluator, _) = evaluator();
        let suite = TestSuite::new()
            .with_provider(Arc::new(MockProvider::new("m").echoing()))
            .with_prompt(Prompt::new("{{ question }}{{ previous }}"))
            .with_test(
                TestCase::new()
                    .with_var("question", "Q1")
                    .with_options(TestOptions {
                        store_output_as: Some("previous".to_string()),
                        ..TestOptions::default()
                    }),
            )
            .with_test(TestCase::new().with_var("question", "Q2 after "));

        let summary = evaluator.evaluate(suite).await.unwrap();
        assert_eq!(summary.results[1].output(), Some(&json!("Q2 after Q1")));
    }
}
