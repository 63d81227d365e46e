//! Replaces file and package references in variables with their decoded content

use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD, Engine};
use serde_json::Value;
use tracing::debug;

use super::{LocalFileLoader, VarFunctionRegistry};
use crate::domain::files::{FileKind, FileLoader, PdfExtractor};
use crate::domain::provider::ProviderInfo;
use crate::domain::vars::{value_to_string, Vars, FILE_PREFIX, PACKAGE_PREFIX};
use crate::domain::DomainError;

/// Loads `file://` and `package:` variable values
#[derive(Debug, Clone)]
pub struct FileMaterializer {
    loader: Arc<dyn FileLoader>,
    pdf_extractor: Option<Arc<dyn PdfExtractor>>,
    functions: VarFunctionRegistry,
    disable_media_base64: bool,
}

impl Default for FileMaterializer {
    fn default() -> Self {
        Self::new(Arc::new(LocalFileLoader::default()))
    }
}

impl FileMaterializer {
    pub fn new(loader: Arc<dyn FileLoader>) -> Self {
        Self {
            loader,
            pdf_extractor: None,
            functions: VarFunctionRegistry::new(),
            disable_media_base64: false,
        }
    }

    pub fn with_pdf_extractor(mut self, extractor: Arc<dyn PdfExtractor>) -> Self {
        self.pdf_extractor = Some(extractor);
        self
    }

    pub fn with_functions(mut self, functions: VarFunctionRegistry) -> Self {
        self.functions = functions;
        self
    }

    pub fn with_media_base64_disabled(mut self, disabled: bool) -> Self {
        self.disable_media_base64 = disabled;
        self
    }

    pub fn loader(&self) -> &Arc<dyn FileLoader> {
        &self.loader
    }

    /// Materialize every referencing variable of `vars` in place
    pub async fn materialize(
        &self,
        vars: &mut Vars,
        prompt: &str,
        provider: Option<&ProviderInfo>,
    ) -> Result<(), DomainError> {
        let references: Vec<(String, String)> = vars
            .iter()
            .filter_map(|(name, value)| match value {
                Value::String(s) if s.starts_with(FILE_PREFIX) || s.starts_with(PACKAGE_PREFIX) => {
                    Some((name.clone(), s.clone()))
                }
                _ => None,
            })
            .collect();

        for (name, reference) in references {
            let loaded = self
                .load(&name, &reference, prompt, vars, provider)
                .await
                .map_err(|e| {
                    DomainError::file_load(format!(
                        "Error loading '{}' for variable '{}' (provider: {}): {}",
                        reference,
                        name,
                        provider.map(ProviderInfo::display_name).unwrap_or("none"),
                        e
                    ))
                })?;
            debug!(variable = %name, reference = %reference, "Materialized variable");
            vars.insert(name, loaded);
        }

        Ok(())
    }

    async fn load(
        &self,
        name: &str,
        reference: &str,
        prompt: &str,
        vars: &Vars,
        provider: Option<&ProviderInfo>,
    ) -> Result<Value, DomainError> {
        let path = match reference.strip_prefix(FILE_PREFIX) {
            Some(path) => path,
            None => return self.call_function(name, reference, prompt, vars, provider).await,
        };

        let kind = FileKind::from_path(path);
        if kind == FileKind::Script {
            return self.call_function(name, reference, prompt, vars, provider).await;
        }
        if kind.is_media() && self.disable_media_base64 {
            return Ok(Value::String(reference.to_string()));
        }

        let bytes = self.loader.read_bytes(&self.loader.resolve(path)).await?;

        let text = match kind {
            FileKind::Json => {
                let parsed: Value = serde_json::from_slice(&bytes)
                    .map_err(|e| DomainError::file_load(format!("invalid JSON: {}", e)))?;
                parsed.to_string()
            }
            FileKind::Yaml => {
                let parsed: Value = serde_yaml::from_slice(&bytes)
                    .map_err(|e| DomainError::file_load(format!("invalid YAML: {}", e)))?;
                parsed.to_string()
            }
            FileKind::Pdf => match &self.pdf_extractor {
                Some(extractor) => extractor.extract_text(&bytes).await?,
                None => {
                    return Err(DomainError::file_load(
                        "no PDF extractor is configured",
                    ))
                }
            },
            FileKind::Image | FileKind::Video | FileKind::Audio => STANDARD.encode(&bytes),
            FileKind::Script | FileKind::Text => String::from_utf8(bytes)
                .map_err(|e| DomainError::file_load(format!("invalid UTF-8: {}", e)))?
                .trim()
                .to_string(),
        };

        Ok(Value::String(text))
    }

    async fn call_function(
        &self,
        name: &str,
        reference: &str,
        prompt: &str,
        vars: &Vars,
        provider: Option<&ProviderInfo>,
    ) -> Result<Value, DomainError> {
        let function = self.functions.get_required(reference)?;
        let result = function
            .call(name, prompt, vars, provider)
            .await
            .map_err(|e| DomainError::file_load(e.to_string()))?;

        // Functions may answer `{output}` or `{error}`
        match &result {
            Value::Object(map) if map.contains_key("error") => Err(DomainError::file_load(
                value_to_string(&map["error"]),
            )),
            Value::Object(map) if map.contains_key("output") => {
                Ok(Value::String(value_to_string(&map["output"])))
            }
            other => Ok(Value::String(value_to_string(other))),
        }
    }
}
