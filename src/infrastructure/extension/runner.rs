//! Dispatches lifecycle hooks to extensions and merges validated updates

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::domain::extension::{
    AfterAllContext, AfterEachContext, BeforeAllContext, BeforeAllPatch, BeforeEachContext,
    BeforeEachPatch, Extension, HookName,
};
use crate::domain::suite::{CompletedPrompt, TestSuite};
use crate::domain::test_case::{EvaluateResult, TestCase};
use crate::domain::DomainError;

/// Runs a list of extensions in order
#[derive(Clone, Default)]
pub struct ExtensionRunner {
    extensions: Vec<Arc<dyn Extension>>,
}

impl std::fmt::Debug for ExtensionRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.extensions.iter().map(|e| e.name()))
            .finish()
    }
}

impl ExtensionRunner {
    pub fn new(extensions: Vec<Arc<dyn Extension>>) -> Self {
        Self { extensions }
    }

    pub fn with_extension(mut self, extension: Arc<dyn Extension>) -> Self {
        self.extensions.push(extension);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.extensions.is_empty()
    }

    /// Run `hook` over `context` and return the updated context
    ///
    /// `beforeAll` and `beforeEach` contexts are validated before dispatch.
    /// Values returned by those hooks must match the hook's patch shape and
    /// only their present fields are merged. Values returned from `afterEach`
    /// and `afterAll` are ignored.
    pub async fn run(&self, hook: HookName, context: Value) -> Result<Value, DomainError> {
        if self.extensions.is_empty() {
            return Ok(context);
        }

        match hook {
            HookName::BeforeAll => validate::<BeforeAllContext>(hook, &context)?,
            HookName::BeforeEach => validate::<BeforeEachContext>(hook, &context)?,
            HookName::AfterEach | HookName::AfterAll => {}
        }

        let mut context = context;
        for extension in &self.extensions {
            debug!(extension = extension.name(), hook = %hook, "Running extension hook");

            let returned = extension
                .call(hook, &context)
                .await
                .map_err(|e| DomainError::extension(extension.name(), hook.as_str(), e.to_string()))?;

            let Some(returned) = returned else {
                continue;
            };

            if !hook.is_mutating() {
                warn!(
                    extension = extension.name(),
                    hook = %hook,
                    "Ignoring value returned from a read-only hook"
                );
                continue;
            }

            merge_patch(hook, &mut context, returned).map_err(|message| {
                DomainError::extension(extension.name(), hook.as_str(), message)
            })?;
        }

        Ok(context)
    }

    /// Run `beforeAll`; providers and prompt functions survive the round trip
    pub async fn before_all(&self, suite: TestSuite) -> Result<TestSuite, DomainError> {
        if self.is_empty() {
            return Ok(suite);
        }

        let context = to_context(&BeforeAllContext {
            suite: suite.clone(),
        })?;
        let updated: BeforeAllContext = from_context(self.run(HookName::BeforeAll, context).await?)?;

        let mut next = updated.suite;
        next.providers = suite.providers.clone();
        suite.restore_prompt_functions(&mut next.prompts);
        Ok(next)
    }

    pub async fn before_each(&self, test: TestCase) -> Result<TestCase, DomainError> {
        if self.is_empty() {
            return Ok(test);
        }

        let context = to_context(&BeforeEachContext { test })?;
        let updated: BeforeEachContext =
            from_context(self.run(HookName::BeforeEach, context).await?)?;
        Ok(updated.test)
    }

    pub async fn after_each(
        &self,
        test: &TestCase,
        result: &EvaluateResult,
    ) -> Result<(), DomainError> {
        if self.is_empty() {
            return Ok(());
        }

        let context = to_context(&AfterEachContext { test, result })?;
        self.run(HookName::AfterEach, context).await.map(|_| ())
    }

    pub async fn after_all(
        &self,
        suite: &TestSuite,
        results: &[EvaluateResult],
        prompts: &[CompletedPrompt],
    ) -> Result<(), DomainError> {
        if self.is_empty() {
            return Ok(());
        }

        let context = to_context(&AfterAllContext {
            suite,
            results,
            prompts,
        })?;
        self.run(HookName::AfterAll, context).await.map(|_| ())
    }
}

fn validate<T: DeserializeOwned>(hook: HookName, context: &Value) -> Result<(), DomainError> {
    T::deserialize(context).map(|_| ()).map_err(|e| {
        DomainError::validation(format!("Invalid context for {} hook: {}", hook, e))
    })
}

fn to_context<T: Serialize>(context: &T) -> Result<Value, DomainError> {
    serde_json::to_value(context).map_err(|e| DomainError::internal(e.to_string()))
}

fn from_context<T: DeserializeOwned>(context: Value) -> Result<T, DomainError> {
    serde_json::from_value(context).map_err(|e| DomainError::internal(e.to_string()))
}

/// Merge a validated hook return value into `context`
fn merge_patch(hook: HookName, context: &mut Value, returned: Value) -> Result<(), String> {
    match hook {
        HookName::BeforeAll => {
            let patch: BeforeAllPatch = serde_json::from_value(returned)
                .map_err(|e| format!("invalid return value: {}", e))?;
            let fields = serde_json::to_value(&patch.suite).map_err(|e| e.to_string())?;

            if let (Some(suite), Value::Object(fields)) =
                (context.get_mut("suite").and_then(Value::as_object_mut), fields)
            {
                for (key, value) in fields {
                    suite.insert(key, value);
                }
            }
            Ok(())
        }
        HookName::BeforeEach => {
            let patch: BeforeEachPatch = serde_json::from_value(returned)
                .map_err(|e| format!("invalid return value: {}", e))?;
            let test = serde_json::to_value(&patch.test).map_err(|e| e.to_string())?;
            if let Some(context) = context.as_object_mut() {
                context.insert("test".to_string(), test);
            }
            Ok(())
        }
        HookName::AfterEach | HookName::AfterAll => Ok(()),
    }
}
