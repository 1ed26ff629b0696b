//! Translation engine boundary.
//!
//! The gate and handlers only see this trait. The bundled passthrough
//! engine echoes text back and guesses languages from the script used,
//! which is enough to run and test the server without model files.

use async_trait::async_trait;
use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("{to} is not available as a target language from {from}")]
    UnsupportedPair { from: String, to: String },
    #[error("Cannot translate text: {0}")]
    Failed(String),
}

#[derive(Debug, Clone, Serialize)]
pub struct Language {
    pub code: String,
    pub name: String,
    pub targets: Vec<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Detection {
    pub confidence: f64,
    pub language: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Translation {
    pub text: String,
    pub alternatives: Vec<String>,
}

#[async_trait]
pub trait TranslationEngine: Send + Sync {
    fn languages(&self) -> &[Language];

    async fn translate(
        &self,
        text: &str,
        source: &str,
        target: &str,
        html: bool,
        alternatives: usize,
    ) -> Result<Translation, EngineError>;

    /// Candidates ordered by confidence, best first.
    async fn detect(&self, text: &str) -> Result<Vec<Detection>, EngineError>;

    fn language(&self, code: &str) -> Option<&Language> {
        self.languages().iter().find(|l| l.code == code)
    }
}

const CATALOG: &[(&str, &str)] = &[
    ("en", "English"),
    ("ar", "Arabic"),
    ("de", "German"),
    ("es", "Spanish"),
    ("fr", "French"),
    ("it", "Italian"),
    ("ja", "Japanese"),
    ("pt", "Portuguese"),
    ("ru", "Russian"),
    ("zh", "Chinese"),
];

/// Returns input text unchanged.
pub struct PassthroughEngine {
    languages: Vec<Language>,
}

impl PassthroughEngine {
    /// `load_only` restricts the catalog; empty keeps every language.
    pub fn new(load_only: &[String]) -> Self {
        let codes: Vec<&str> = CATALOG
            .iter()
            .map(|(code, _)| *code)
            .filter(|code| load_only.is_empty() || load_only.iter().any(|l| l == code))
            .collect();

        let languages = CATALOG
            .iter()
            .filter(|(code, _)| codes.contains(code))
            .map(|(code, name)| Language {
                code: code.to_string(),
                name: name.to_string(),
                targets: codes.iter().map(|c| c.to_string()).collect(),
            })
            .collect();

        Self { languages }
    }

    fn guess(&self, text: &str) -> &str {
        let script = text.chars().find_map(|c| match c {
            '\u{0400}'..='\u{04FF}' => Some("ru"),
            '\u{0600}'..='\u{06FF}' => Some("ar"),
            '\u{3040}'..='\u{30FF}' => Some("ja"),
            '\u{4E00}'..='\u{9FFF}' => Some("zh"),
            _ => None,
        });

        script
            .or(Some("en"))
            .filter(|code| self.language(code).is_some())
            .or_else(|| self.languages.first().map(|l| l.code.as_str()))
            .unwrap_or("en")
    }
}

#[async_trait]
impl TranslationEngine for PassthroughEngine {
    fn languages(&self) -> &[Language] {
        &self.languages
    }

    async fn translate(
        &self,
        text: &str,
        source: &str,
        target: &str,
        _html: bool,
        _alternatives: usize,
    ) -> Result<Translation, EngineError> {
        let supported = self
            .language(source)
            .is_some_and(|l| l.targets.iter().any(|t| t == target));
        if !supported {
            return Err(EngineError::UnsupportedPair {
                from: source.to_string(),
                to: target.to_string(),
            });
        }

        Ok(Translation {
            text: text.to_string(),
            alternatives: Vec::new(),
        })
    }

    async fn detect(&self, text: &str) -> Result<Vec<Detection>, EngineError> {
        Ok(vec![Detection {
            confidence: 90.0,
            language: self.guess(text).to_string(),
        }])
    }
}
