use serde::Deserialize;

/// Application configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub evaluation: EvaluationConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Defaults for evaluation runs
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct EvaluationConfig {
    /// Units executed at once
    pub max_concurrency: usize,
    /// Per provider call, 0 disables
    pub timeout_ms: u64,
    /// Whole run, 0 disables
    pub max_eval_time_ms: u64,
    /// Delay after each non-cached call when the provider declares none
    pub delay_ms: u64,
    pub repeat: usize,
    pub var_resolution_max_iterations: usize,
    pub disable_media_base64: bool,
    pub strip_trailing_newline: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::default(),
        }
    }
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 4,
            timeout_ms: 0,
            max_eval_time_ms: 0,
            delay_ms: 0,
            repeat: 1,
            var_resolution_max_iterations: 5,
            disable_media_base64: false,
            strip_trailing_newline: true,
        }
    }
}

impl AppConfig {
    pub fn load() -> Result<Self, config::ConfigError> {
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name("config/local").required(false))
            .add_source(
                config::Environment::with_prefix("EVAL")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_evaluation_defaults() {
        let config = EvaluationConfig::default();
        assert_eq!(config.max_concurrency, 4);
        assert_eq!(config.repeat, 1);
        assert_eq!(config.var_resolution_max_iterations, 5);
        assert!(config.strip_trailing_newline);
    }

    #[test]
    fn test_partial_evaluation_section_keeps_defaults() {
        let config: AppConfig = config::Config::builder()
            .set_override("evaluation.max_concurrency", 8)
            .unwrap()
            .set_override("logging.level", "debug")
            .unwrap()
            .set_override("logging.format", "json")
            .unwrap()
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(config.evaluation.max_concurrency, 8);
        assert_eq!(config.evaluation.repeat, 1);
        assert_eq!(config.logging.format, LogFormat::Json);
    }
}
