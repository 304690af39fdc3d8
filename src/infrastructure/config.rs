use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::application::PromptPolicy;
use crate::domain::{ChunkingOptions, DomainError};
use crate::infrastructure::embedding::EmbeddingModelType;

pub const CONFIG_DIR_ENV: &str = "APP_CONFIG_DIR";
pub const GEMINI_API_KEY_ENV: &str = "GEMINI_API_KEY";
pub const QDRANT_URL_ENV: &str = "QDRANT_URL";
pub const QDRANT_API_KEY_ENV: &str = "QDRANT_API_KEY";

/// Bounds on the knobs a caller may set per request.
pub mod limits {
    use std::ops::RangeInclusive;

    pub const CHUNK_SIZE: RangeInclusive<usize> = 256..=1024;
    pub const CHUNK_OVERLAP: RangeInclusive<usize> = 0..=256;
    pub const TOP_K: RangeInclusive<usize> = 1..=10;
}

/// Settings plus prompt templates, loaded from `config.yaml` and `prompts.yaml`.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub config: Config,
    #[serde(default)]
    pub prompts: PromptsConfig,
}

impl AppConfig {
    /// Loads from `$APP_CONFIG_DIR`, falling back to `./config`.
    pub fn load() -> Result<Self, DomainError> {
        let dir = std::env::var(CONFIG_DIR_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config"));
        Self::load_from_dir(&dir)
    }

    /// Missing files fall back to defaults; malformed files are errors.
    pub fn load_from_dir(dir: &Path) -> Result<Self, DomainError> {
        let config: Config = read_yaml(&dir.join("config.yaml"))?.unwrap_or_default();
        let prompts: PromptsConfig = read_yaml(&dir.join("prompts.yaml"))?.unwrap_or_default();

        let app = Self { config, prompts };
        app.config.validate()?;
        Ok(app)
    }
}

fn read_yaml<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Option<T>, DomainError> {
    if !path.exists() {
        tracing::debug!(path = %path.display(), "config file not found, using defaults");
        return Ok(None);
    }
    let raw = std::fs::read_to_string(path)
        .map_err(|e| DomainError::configuration(format!("{}: {e}", path.display())))?;
    serde_yaml::from_str(&raw)
        .map(Some)
        .map_err(|e| DomainError::configuration(format!("{}: {e}", path.display())))
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub llm: LlmConfig,
    pub embedding: EmbeddingConfig,
    pub vector_store: VectorStoreConfig,
    pub ingestion: IngestionConfig,
    pub rag: RagConfig,
    pub server: ServerConfig,
    pub cors: CorsConfig,
}

impl Config {
    pub fn validate(&self) -> Result<(), DomainError> {
        self.ingestion.chunking()?;
        check_range("rag.top_k", self.rag.top_k, &limits::TOP_K)?;
        if self.rag.max_tokens == 0 {
            return Err(DomainError::configuration("rag.max_tokens must be positive"));
        }
        if self.embedding.dimension == 0 {
            return Err(DomainError::configuration(
                "embedding.dimension must be positive",
            ));
        }
        if self.vector_store.index_name.trim().is_empty() {
            return Err(DomainError::configuration(
                "vector_store.index_name must not be empty",
            ));
        }
        Ok(())
    }
}

pub fn check_range(
    name: &str,
    value: usize,
    range: &RangeInclusive<usize>,
) -> Result<(), DomainError> {
    if range.contains(&value) {
        Ok(())
    } else {
        Err(DomainError::validation(format!(
            "{name} must be between {} and {}, got {value}",
            range.start(),
            range.end()
        )))
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LlmConfig {
    pub model: String,
    pub temperature: f64,
    /// Extraction during compression should copy text, not paraphrase it.
    pub compression_temperature: f64,
    pub timeout_seconds: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: "gemini-1.5-pro".to_string(),
            temperature: 0.1,
            compression_temperature: 0.0,
            timeout_seconds: 120,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub model_type: EmbeddingModelType,
    pub model_name: Option<String>,
    pub dimension: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model_type: EmbeddingModelType::Bge,
            model_name: None,
            dimension: crate::domain::EMBEDDING_DIMENSION,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct VectorStoreConfig {
    pub url: String,
    pub index_name: String,
    pub require_api_key: bool,
    pub deletion_poll_interval_ms: u64,
    pub deletion_timeout_seconds: u64,
}

impl Default for VectorStoreConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:6334".to_string(),
            index_name: "personal-knowledge-assistant".to_string(),
            require_api_key: false,
            deletion_poll_interval_ms: 500,
            deletion_timeout_seconds: 60,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct IngestionConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl IngestionConfig {
    pub fn chunking(&self) -> Result<ChunkingOptions, DomainError> {
        chunking_within_limits(self.chunk_size, self.chunk_overlap)
    }
}

/// Chunking options restricted to the ranges callers are allowed to pick.
pub fn chunking_within_limits(
    chunk_size: usize,
    chunk_overlap: usize,
) -> Result<ChunkingOptions, DomainError> {
    check_range("chunk_size", chunk_size, &limits::CHUNK_SIZE)?;
    check_range("chunk_overlap", chunk_overlap, &limits::CHUNK_OVERLAP)?;
    ChunkingOptions::new(chunk_size, chunk_overlap)
}

impl Default for IngestionConfig {
    fn default() -> Self {
        let defaults = ChunkingOptions::default();
        Self {
            chunk_size: defaults.chunk_size,
            chunk_overlap: defaults.chunk_overlap,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RagConfig {
    pub top_k: usize,
    pub max_tokens: usize,
    pub use_compression: bool,
    pub prompt_policy: PromptPolicy,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            top_k: 5,
            max_tokens: 4000,
            use_compression: false,
            prompt_policy: PromptPolicy::Strict,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub max_upload_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            max_upload_bytes: 50 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct PromptsConfig {
    pub generator: GeneratorPrompts,
    pub compressor: CompressorPrompts,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct GeneratorPrompts {
    pub strict: String,
    pub permissive: String,
    /// Exact reply under the strict policy when the documents cannot answer.
    pub insufficient_context: String,
}

impl GeneratorPrompts {
    pub fn template_for(&self, policy: PromptPolicy) -> &str {
        match policy {
            PromptPolicy::Strict => &self.strict,
            PromptPolicy::Permissive => &self.permissive,
        }
    }
}

impl Default for GeneratorPrompts {
    fn default() -> Self {
        Self {
            strict: DEFAULT_STRICT_TEMPLATE.to_string(),
            permissive: DEFAULT_PERMISSIVE_TEMPLATE.to_string(),
            insufficient_context: DEFAULT_INSUFFICIENT_CONTEXT.to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CompressorPrompts {
    pub template: String,
    /// Marker the model returns when nothing in a chunk is relevant.
    pub no_output: String,
}

impl Default for CompressorPrompts {
    fn default() -> Self {
        Self {
            template: DEFAULT_COMPRESSOR_TEMPLATE.to_string(),
            no_output: "NO_OUTPUT".to_string(),
        }
    }
}

pub const DEFAULT_INSUFFICIENT_CONTEXT: &str =
    "The documents do not contain information to answer this question";

const DEFAULT_STRICT_TEMPLATE: &str = r#"You are a Personal Knowledge Assistant that provides structured, factual answers based STRICTLY on the provided document context.

CRITICAL INSTRUCTIONS:
1. ONLY use information that is explicitly present in the provided documents
2. DO NOT add any information, explanations, or details that are not in the documents
3. Present your response in a structured, organized format with clear sections and bullet points where appropriate
4. Use the exact terminology and phrasing from the documents when possible
5. If the documents don't contain information to answer the question, reply with exactly "{insufficient}" and nothing else
6. Never make up or infer information not present in the documents

Context:
{context}

Question:
{question}

Structured Answer (using ONLY information from the documents):"#;

const DEFAULT_PERMISSIVE_TEMPLATE: &str = r#"You are a Personal Knowledge Assistant. Answer the question thoroughly, grounding your answer in the provided documents first.

INSTRUCTIONS:
1. Prefer information from the documents and mention which document it comes from
2. Where the documents are incomplete, fill the gaps with general knowledge and say that you are doing so
3. Organize longer answers with headings and bullet points

Context:
{context}

Question:
{question}

Answer:"#;

const DEFAULT_COMPRESSOR_TEMPLATE: &str = r#"Given the following question and context, extract any part of the context *AS IS* that is relevant to answer the question. If none of the context is relevant return {no_output}.

Remember, *DO NOT* edit the extracted parts of the context.

> Question: {question}
> Context:
>>>
{context}
>>>
Extracted relevant parts:"#;

/// Secrets read from the environment, never from config files.
#[derive(Clone, Default)]
pub struct Credentials {
    pub gemini_api_key: Option<String>,
    pub qdrant_url: Option<String>,
    pub qdrant_api_key: Option<String>,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("gemini_api_key", &self.gemini_api_key.as_ref().map(|_| "***"))
            .field("qdrant_url", &self.qdrant_url)
            .field("qdrant_api_key", &self.qdrant_api_key.as_ref().map(|_| "***"))
            .finish()
    }
}

impl Credentials {
    pub fn from_env() -> Self {
        Self {
            gemini_api_key: non_empty_env(GEMINI_API_KEY_ENV),
            qdrant_url: non_empty_env(QDRANT_URL_ENV),
            qdrant_api_key: non_empty_env(QDRANT_API_KEY_ENV),
        }
    }

    pub fn require_llm(&self) -> Result<&str, DomainError> {
        self.gemini_api_key.as_deref().ok_or_else(|| {
            DomainError::configuration(format!("{GEMINI_API_KEY_ENV} must be set"))
        })
    }

    /// Resolves the vector store endpoint, preferring the environment over config.
    pub fn require_vector_store(
        &self,
        config: &VectorStoreConfig,
    ) -> Result<(String, Option<String>), DomainError> {
        let url = self
            .qdrant_url
            .clone()
            .unwrap_or_else(|| config.url.clone());
        if url.trim().is_empty() {
            return Err(DomainError::configuration(format!(
                "{QDRANT_URL_ENV} or vector_store.url must be set"
            )));
        }
        if config.require_api_key && self.qdrant_api_key.is_none() {
            return Err(DomainError::configuration(format!(
                "{QDRANT_API_KEY_ENV} must be set"
            )));
        }
        Ok((url, self.qdrant_api_key.clone()))
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.vector_store.index_name, "personal-knowledge-assistant");
        assert_eq!(config.ingestion.chunk_size, 512);
        assert_eq!(config.ingestion.chunk_overlap, 50);
        assert_eq!(config.rag.prompt_policy, PromptPolicy::Strict);
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let config: Config = serde_yaml::from_str(
            "rag:\n  top_k: 3\n  prompt_policy: permissive\nllm:\n  model: gemini-pro\n",
        )
        .unwrap();

        assert_eq!(config.rag.top_k, 3);
        assert_eq!(config.rag.prompt_policy, PromptPolicy::Permissive);
        assert_eq!(config.rag.max_tokens, 4000);
        assert_eq!(config.llm.model, "gemini-pro");
        assert_eq!(config.llm.temperature, 0.1);
        assert_eq!(config.llm.compression_temperature, 0.0);
        assert_eq!(config.embedding.model_type, EmbeddingModelType::Bge);
    }

    #[test]
    fn test_overlap_must_be_below_chunk_size() {
        let mut config = Config::default();
        config.ingestion.chunk_overlap = config.ingestion.chunk_size;
        assert!(matches!(config.validate(), Err(DomainError::Validation(_))));
    }

    #[test]
    fn test_chunking_limits() {
        assert!(chunking_within_limits(256, 0).is_ok());
        assert!(chunking_within_limits(1024, 256).is_ok());
        assert!(chunking_within_limits(128, 10).is_err());
        assert!(chunking_within_limits(512, 300).is_err());
    }

    #[test]
    fn test_template_follows_policy() {
        let prompts = GeneratorPrompts::default();
        assert!(prompts
            .template_for(PromptPolicy::Strict)
            .contains("{insufficient}"));
        assert!(!prompts
            .template_for(PromptPolicy::Permissive)
            .contains("{insufficient}"));
    }

    #[test]
    fn test_top_k_range() {
        let mut config = Config::default();
        config.rag.top_k = 11;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_dir_without_files_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let app = AppConfig::load_from_dir(dir.path()).unwrap();
        assert_eq!(app.config.llm.model, "gemini-1.5-pro");
        assert!(app.prompts.generator.strict.contains("{context}"));
    }

    #[test]
    fn test_shipped_config_matches_defaults() {
        let dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("config");
        let app = AppConfig::load_from_dir(&dir).unwrap();
        let defaults = PromptsConfig::default();

        assert_eq!(app.prompts.generator.strict, defaults.generator.strict);
        assert_eq!(app.prompts.generator.permissive, defaults.generator.permissive);
        assert_eq!(app.prompts.compressor.template, defaults.compressor.template);
        assert_eq!(
            app.prompts.generator.insufficient_context,
            DEFAULT_INSUFFICIENT_CONTEXT
        );
        assert_eq!(app.config.rag.top_k, 5);
        assert_eq!(app.config.server.max_upload_bytes, 50 * 1024 * 1024);
    }

    #[test]
    fn test_load_from_dir_rejects_malformed_yaml() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("config.yaml"), "rag: [unclosed").unwrap();
        let err = AppConfig::load_from_dir(dir.path()).unwrap_err();
        assert!(matches!(err, DomainError::Configuration(_)));
    }

    #[test]
    fn test_missing_llm_key_is_configuration_error() {
        let creds = Credentials::default();
        assert!(matches!(
            creds.require_llm(),
            Err(DomainError::Configuration(_))
        ));
    }

    #[test]
    fn test_vector_store_api_key_requirement() {
        let creds = Credentials::default();
        let mut config = VectorStoreConfig::default();

        let (url, key) = creds.require_vector_store(&config).unwrap();
        assert_eq!(url, "http://localhost:6334");
        assert!(key.is_none());

        config.require_api_key = true;
        assert!(matches!(
            creds.require_vector_store(&config),
            Err(DomainError::Configuration(_))
        ));
    }

    #[test]
    fn test_credentials_debug_redacts_secrets() {
        let creds = Credentials {
            gemini_api_key: Some("secret-key".into()),
            ..Default::default()
        };
        assert!(!format!("{creds:?}").contains("secret-key"));
    }
}
