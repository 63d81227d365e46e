//! File and function references used as variable values

use std::fmt::Debug;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::Value;

use crate::domain::provider::ProviderInfo;
use crate::domain::vars::Vars;
use crate::domain::DomainError;

/// How a referenced file is decoded into a variable value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Json,
    Yaml,
    Pdf,
    Image,
    Video,
    Audio,
    Script,
    Text,
}

const SCRIPT_EXTENSIONS: &[&str] = &["js", "cjs", "mjs", "ts", "py", "rb", "sh"];

impl FileKind {
    pub fn from_path(path: &str) -> Self {
        let path = strip_function_suffix(path);
        let extension = Path::new(path)
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();

        match extension.as_str() {
            "json" => return Self::Json,
            "yaml" | "yml" => return Self::Yaml,
            "pdf" => return Self::Pdf,
            ext if SCRIPT_EXTENSIONS.contains(&ext) => return Self::Script,
            _ => {}
        }

        match mime_guess::from_path(path).first() {
            Some(mime) if mime.type_() == mime_guess::mime::IMAGE => Self::Image,
            Some(mime) if mime.type_() == mime_guess::mime::VIDEO => Self::Video,
            Some(mime) if mime.type_() == mime_guess::mime::AUDIO => Self::Audio,
            _ => Self::Text,
        }
    }

    pub fn is_media(&self) -> bool {
        matches!(self, Self::Image | Self::Video | Self::Audio)
    }
}

/// Strip a trailing `:function` selector from a script reference
///
/// Windows drive letters (`C:\...`) are left untouched.
pub fn strip_function_suffix(path: &str) -> &str {
    match path.rfind(':') {
        Some(idx) if idx > 1 => &path[..idx],
        _ => path,
    }
}

/// Reads referenced files relative to a base directory
#[async_trait]
pub trait FileLoader: Send + Sync + Debug {
    /// Directory relative references are resolved against
    fn base_path(&self) -> &Path;

    async fn read_bytes(&self, path: &Path) -> Result<Vec<u8>, DomainError>;

    fn resolve(&self, reference: &str) -> PathBuf {
        let path = Path::new(reference);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_path().join(path)
        }
    }
}

/// Extracts text from PDF documents
#[async_trait]
pub trait PdfExtractor: Send + Sync + Debug {
    async fn extract_text(&self, bytes: &[u8]) -> Result<String, DomainError>;
}

/// User function producing a variable value (script files and `package:` refs)
#[async_trait]
pub trait VarFunction: Send + Sync + Debug {
    async fn call(
        &self,
        var_name: &str,
        prompt: &str,
        vars: &Vars,
        provider: Option<&ProviderInfo>,
    ) -> anyhow::Result<Value>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_kind_from_path() {
        assert_eq!(FileKind::from_path("data/input.json"), FileKind::Json);
        assert_eq!(FileKind::from_path("data/input.YML"), FileKind::Yaml);
        assert_eq!(FileKind::from_path("doc.pdf"), FileKind::Pdf);
        assert_eq!(FileKind::from_path("cat.png"), FileKind::Image);
        assert_eq!(FileKind::from_path("clip.mp4"), FileKind::Video);
        assert_eq!(FileKind::from_path("voice.mp3"), FileKind::Audio);
        assert_eq!(FileKind::from_path("vars.py:get_var"), FileKind::Script);
        assert_eq!(FileKind::from_path("notes.txt"), FileKind::Text);
        assert_eq!(FileKind::from_path("README"), FileKind::Text);
    }

    #[test]
    fn test_strip_function_suffix() {
        assert_eq!(strip_function_suffix("vars.js:fn"), "vars.js");
        assert_eq!(strip_function_suffix("vars.js"), "vars.js");
        assert_eq!(strip_function_suffix("C:\\data\\x.txt"), "C:\\data\\x.txt");
    }
}
