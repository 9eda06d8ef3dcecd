use std::env;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// Database connection URL
    pub database_url: String,
    /// Maximum database connections in pool
    pub database_max_connections: u32,
    /// Server host address
    pub host: String,
    /// Server port
    pub port: u16,
    /// Externally reachable base URL, used when registering webhooks
    pub public_base_url: String,
    /// Hex-encoded 32-byte key for access-token encryption at rest
    pub credential_key: String,
    /// Source host API base URL
    pub host_api_base: String,
    /// Completion provider base URL
    pub llm_api_base: String,
    /// Completion provider API key
    pub llm_api_key: String,
    /// Model identifier used for all three audience generations
    pub llm_model: String,
    /// Sampling temperature for generation
    pub llm_temperature: f32,
    /// Transactional email provider base URL
    pub mail_api_base: String,
    /// Transactional email provider API key
    pub mail_api_key: String,
    /// Sender address for outbound email
    pub mail_from: String,
    /// Per-call timeout for outbound HTTP, in seconds
    pub http_timeout_secs: u64,
    /// TTL for transient OAuth connect-flow state, in seconds
    pub oauth_state_ttl_secs: u64,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url =
            env::var("DATABASE_URL").map_err(|_| ConfigError::MissingEnvVar("DATABASE_URL"))?;

        let database_max_connections = env::var("DATABASE_MAX_CONNECTIONS")
            .unwrap_or_else(|_| "10".to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidValue("DATABASE_MAX_CONNECTIONS"))?;

        let host = env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());

        let port = env::var("PORT")
            .unwrap_or_else(|_| "8080".to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidValue("PORT"))?;

        let public_base_url = env::var("PUBLIC_BASE_URL")
            .unwrap_or_else(|_| format!("http://{host}:{port}"));

        let credential_key =
            env::var("CREDENTIAL_KEY").map_err(|_| ConfigError::MissingEnvVar("CREDENTIAL_KEY"))?;

        let host_api_base = env::var("HOST_API_BASE")
            .unwrap_or_else(|_| "https://api.github.com".to_string());

        let llm_api_base = env::var("LLM_API_BASE")
            .unwrap_or_else(|_| "https://api.openai.com".to_string());
        let llm_api_key =
            env::var("LLM_API_KEY").map_err(|_| ConfigError::MissingEnvVar("LLM_API_KEY"))?;
        let llm_model = env::var("LLM_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string());
        let llm_temperature = env::var("LLM_TEMPERATURE")
            .unwrap_or_else(|_| "0.7".to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidValue("LLM_TEMPERATURE"))?;

        let mail_api_base = env::var("MAIL_API_BASE")
            .unwrap_or_else(|_| "https://api.resend.com".to_string());
        let mail_api_key =
            env::var("MAIL_API_KEY").map_err(|_| ConfigError::MissingEnvVar("MAIL_API_KEY"))?;
        let mail_from =
            env::var("MAIL_FROM").unwrap_or_else(|_| "releases@shipnotes.dev".to_string());

        let http_timeout_secs = env::var("HTTP_TIMEOUT_SECS")
            .unwrap_or_else(|_| "10".to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidValue("HTTP_TIMEOUT_SECS"))?;

        let oauth_state_ttl_secs = env::var("OAUTH_STATE_TTL_SECS")
            .unwrap_or_else(|_| "600".to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidValue("OAUTH_STATE_TTL_SECS"))?;

        Ok(Self {
            database_url,
            database_max_connections,
            host,
            port,
            public_base_url,
            credential_key,
            host_api_base,
            llm_api_base,
            llm_api_key,
            llm_model,
            llm_temperature,
            mail_api_base,
            mail_api_key,
            mail_from,
            http_timeout_secs,
            oauth_state_ttl_secs,
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(&'static str),
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(&'static str),
}
