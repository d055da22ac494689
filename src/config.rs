use serde::{Deserialize, Serialize};

use crate::model::EntityKind;

/// Main configuration structure loaded from ttp_quiz.toml and environment variables
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub scheduling: SchedulingConfig,
    #[serde(default)]
    pub classification: ClassificationConfig,
    #[serde(default)]
    pub true_false: TrueFalseConfig,
    #[serde(default)]
    pub answering: AnsweringConfig,
    /// Runtime configuration loaded from environment variables
    #[serde(skip)]
    pub runtime: RuntimeConfig,
}

/// Generation service endpoint and sampling parameters for MCQ drafting
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct GenerationConfig {
    pub endpoint: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout_ms: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.openai.com/v1/chat/completions".to_string(),
            model: "gpt-4o".to_string(),
            temperature: 0.7,
            max_tokens: 1500,
            timeout_ms: 120_000,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SchedulingConfig {
    /// Minimum spacing between consecutive generation calls; 0 disables pacing
    pub cooldown_ms: u64,
}

impl Default for SchedulingConfig {
    fn default() -> Self {
        Self { cooldown_ms: 1000 }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ClassificationConfig {
    /// Kind assigned to records with no recognized `type` and no child techniques
    pub ambiguous_fallback: EntityKind,
}

impl Default for ClassificationConfig {
    fn default() -> Self {
        Self {
            ambiguous_fallback: EntityKind::Technique,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TrueFalseConfig {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub max_questions: usize,
}

impl Default for TrueFalseConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4o".to_string(),
            temperature: 0.9,
            max_tokens: 4000,
            max_questions: 5,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AnsweringConfig {
    pub models: Vec<String>,
    pub temperature: f32,
    pub max_tokens: u32,
    pub cooldown_ms: u64,
}

impl Default for AnsweringConfig {
    fn default() -> Self {
        Self {
            models: vec!["gpt-4o".to_string(), "gpt-4o-mini".to_string()],
            temperature: 0.1,
            max_tokens: 10,
            cooldown_ms: 500,
        }
    }
}

/// Runtime configuration loaded from environment variables
#[derive(Debug, Clone, Default)]
pub struct RuntimeConfig {
    pub openai_api_key: Option<String>,
}

impl RuntimeConfig {
    /// Load runtime configuration from environment variables
    pub fn load_from_env() -> Self {
        Self {
            openai_api_key: std::env::var("OPENAI_API_KEY").ok(),
        }
    }
}

impl Config {
    /// Load configuration from TOML file and environment variables
    /// Uses TTPQ_CONFIG environment variable or defaults to "ttp_quiz.toml"
    pub fn load() -> anyhow::Result<Self> {
        crate::load_env();

        let config_path =
            std::env::var("TTPQ_CONFIG").unwrap_or_else(|_| "ttp_quiz.toml".to_string());

        let mut config: Config = if let Ok(content) = std::fs::read_to_string(&config_path) {
            Self::from_toml_str(&content)?
        } else {
            tracing::warn!("Config file {} not found, using defaults", config_path);
            Self::default()
        };

        config.apply_env_overrides();
        config.runtime = RuntimeConfig::load_from_env();

        if config.runtime.openai_api_key.is_none() {
            tracing::warn!("OPENAI_API_KEY is not set; requests will be sent without credentials");
        }

        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Apply TTPQ_* environment overrides (env-first)
    pub fn apply_env_overrides(&mut self) {
        if let Ok(endpoint) = std::env::var("TTPQ_ENDPOINT") {
            self.generation.endpoint = endpoint;
        }
        if let Ok(model) = std::env::var("TTPQ_MODEL") {
            self.generation.model = model;
        }
        if let Some(t) = std::env::var("TTPQ_TEMPERATURE")
            .ok()
            .and_then(|v| v.parse::<f32>().ok())
        {
            self.generation.temperature = t;
        }
        if let Some(max) = std::env::var("TTPQ_MAX_TOKENS")
            .ok()
            .and_then(|v| v.parse::<u32>().ok())
        {
            self.generation.max_tokens = max;
        }
        if let Some(timeout) = std::env::var("TTPQ_TIMEOUT_MS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
        {
            self.generation.timeout_ms = timeout;
        }
        if let Some(cooldown) = std::env::var("TTPQ_COOLDOWN_MS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
        {
            self.scheduling.cooldown_ms = cooldown;
        }
        if let Ok(fallback) = std::env::var("TTPQ_AMBIGUOUS_FALLBACK") {
            match EntityKind::parse(&fallback) {
                Some(kind) => self.classification.ambiguous_fallback = kind,
                None => tracing::warn!(
                    "Ignoring TTPQ_AMBIGUOUS_FALLBACK='{}': expected tactic, technique or procedure",
                    fallback
                ),
            }
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if !(0.0..=2.0).contains(&self.generation.temperature) {
            anyhow::bail!("generation.temperature must be between 0.0 and 2.0");
        }
        if self.generation.max_tokens == 0 {
            anyhow::bail!("generation.max_tokens must be > 0");
        }
        if !(0.0..=2.0).contains(&self.true_false.temperature) {
            anyhow::bail!("true_false.temperature must be between 0.0 and 2.0");
        }
        if self.true_false.max_questions == 0 {
            anyhow::bail!("true_false.max_questions must be > 0");
        }
        if self.answering.models.is_empty() {
            anyhow::bail!("answering.models must name at least one model");
        }
        if self.answering.max_tokens == 0 {
            anyhow::bail!("answering.max_tokens must be > 0");
        }
        Ok(())
    }
}
