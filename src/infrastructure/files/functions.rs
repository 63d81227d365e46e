//! Registry of variable functions addressed by script or package reference

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::domain::files::VarFunction;
use crate::domain::provider::ProviderInfo;
use crate::domain::vars::Vars;
use crate::domain::DomainError;

type SyncVarFn = dyn Fn(&str, &Vars) -> anyhow::Result<Value> + Send + Sync;

/// Adapts a synchronous closure into a [`VarFunction`]
pub struct FnVarFunction {
    inner: Box<SyncVarFn>,
}

impl FnVarFunction {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&str, &Vars) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        Self { inner: Box::new(f) }
    }
}

impl fmt::Debug for FnVarFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FnVarFunction")
    }
}

#[async_trait]
impl VarFunction for FnVarFunction {
    async fn call(
        &self,
        var_name: &str,
        _prompt: &str,
        vars: &Vars,
        _provider: Option<&ProviderInfo>,
    ) -> anyhow::Result<Value> {
        (self.inner)(var_name, vars)
    }
}

/// Functions keyed by their full reference, e.g. `file://vars.py:get_var`
#[derive(Debug, Clone, Default)]
pub struct VarFunctionRegistry {
    functions: HashMap<String, Arc<dyn VarFunction>>,
}

impl VarFunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_function(
        mut self,
        reference: impl Into<String>,
        function: Arc<dyn VarFunction>,
    ) -> Self {
        self.register(reference, function);
        self
    }

    pub fn register(&mut self, reference: impl Into<String>, function: Arc<dyn VarFunction>) {
        self.functions.insert(reference.into(), function);
    }

    pub fn get(&self, reference: &str) -> Option<Arc<dyn VarFunction>> {
        self.functions.get(reference).cloned()
    }

    pub fn get_required(&self, reference: &str) -> Result<Arc<dyn VarFunction>, DomainError> {
        self.get(reference).ok_or_else(|| {
            DomainError::file_load(format!("No function registered for '{}'", reference))
        })
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_registered_closure_is_callable() {
        let registry = VarFunctionRegistry::new().with_function(
            "package:helpers:city",
            Arc::new(FnVarFunction::new(|name, vars| {
                Ok(json!(format!("{}={}", name, vars["country"].as_str().unwrap_or("?"))))
            })),
        );

        let function = registry.get_required("package:helpers:city").unwrap();
        let mut vars = Vars::new();
        vars.insert("country".to_string(), json!("France"));

        let value = function.call("city", "", &vars, None).await.unwrap();
        assert_eq!(value, json!("city=France"));
    }

    #[test]
    fn test_missing_function() {
        let registry = VarFunctionRegistry::new();
        assert!(registry.is_empty());
        assert!(matches!(
            registry.get_required("file://vars.js:fn"),
            Err(DomainError::FileLoad { .. })
        ));
    }
}
