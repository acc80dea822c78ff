use anyhow::{Result, anyhow};
use axum::http::HeaderValue;
use std::env;
use std::time::Duration;
use tracing::{info, warn};

use crate::llm_providers::LLMProviderType;

// Import logging macros
use crate::{log_system_event, log_validation};

const DEFAULT_UPLOAD_LIMIT: usize = 25 * 1024 * 1024;

/// Source of configuration values, normally the process environment
type VarSource<'a> = &'a dyn Fn(&str) -> Option<String>;

fn process_env(key: &str) -> Option<String> {
    env::var(key).ok()
}

/// Complete backend configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub database: DatabaseConfig,
    pub llm: LLMConfig,
    pub server: ServerConfig,
    pub auth: AuthConfig,
    pub logging: LoggingConfig,
}

/// Database connection configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
}

/// Completion service configuration
#[derive(Debug, Clone)]
pub struct LLMConfig {
    pub api_key: String,
    pub base_url: Option<String>,
    pub provider: LLMProviderType,
    pub model: Option<String>,
    pub timeout: Duration,
}

/// HTTP server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
    pub allowed_origin: String,
    pub max_upload_bytes: usize,
}

/// Bearer token verification configuration
#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
}

/// Logging system configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub file_enabled: bool,
    pub console_enabled: bool,
    pub log_directory: String,
}

/// Presentation tier configuration
#[derive(Debug, Clone)]
pub struct FrontendConfig {
    pub api_url: String,
    pub host: String,
    pub port: u16,
    pub max_upload_bytes: usize,
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from environment variables with sensible defaults
    pub fn from_env() -> Result<Self> {
        Self::from_source(&process_env)
    }

    fn from_source(vars: VarSource) -> Result<Self> {
        log_system_event!(config, "Loading application configuration from environment variables");

        let config = Config {
            database: DatabaseConfig::from_source(vars),
            llm: LLMConfig::from_source(vars)?,
            server: ServerConfig::from_source(vars)?,
            auth: AuthConfig::from_source(vars),
            logging: LoggingConfig::from_source(vars),
        };

        log_system_event!(config, "Configuration loaded successfully");
        Ok(config)
    }

    /// Log a summary of loaded configuration (without sensitive data)
    pub fn log_configuration_summary(&self) {
        info!(
            database_url_masked = %mask_sensitive_data(&self.database.url),
            llm_provider = ?self.llm.provider,
            llm_model = ?self.llm.model,
            llm_timeout_secs = self.llm.timeout.as_secs(),
            server_address = %format!("{}:{}", self.server.host, self.server.port),
            allowed_origin = %self.server.allowed_origin,
            log_level = %self.logging.level,
            "Configuration summary"
        );
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if !self.database.url.starts_with("sqlite:") {
            return Err(anyhow!("DATABASE_URL must start with 'sqlite:'"));
        }

        if self.server.port == 0 {
            return Err(anyhow!("Server port must be greater than 0"));
        }

        if HeaderValue::from_str(&self.server.allowed_origin).is_err() {
            return Err(anyhow!(
                "ALLOWED_ORIGIN '{}' is not a valid origin",
                self.server.allowed_origin
            ));
        }

        if self.server.max_upload_bytes == 0 {
            return Err(anyhow!("MAX_UPLOAD_BYTES must be greater than 0"));
        }

        if self.llm.timeout.is_zero() {
            return Err(anyhow!("LLM_TIMEOUT_SECS must be greater than 0"));
        }

        if self.auth.jwt_secret.is_empty() {
            return Err(anyhow!("JWT_SECRET must be set"));
        }

        if self.llm.api_key.is_empty() || self.llm.api_key == "your-api-key" {
            warn!("LLM API key appears to be placeholder or empty - quiz generation will fail");
        }

        if !["trace", "debug", "info", "warn", "error"]
            .iter()
            .any(|level| self.logging.level.to_lowercase().starts_with(level))
        {
            warn!("Unusual log filter '{}', falling back to 'info' if it cannot be parsed", self.logging.level);
        }

        log_validation!(success, "configuration", "Configuration validation completed successfully");
        Ok(())
    }
}

impl DatabaseConfig {
    fn from_source(vars: VarSource) -> Self {
        let url = vars("DATABASE_URL").unwrap_or_else(|| "sqlite:quiz_generator.db?mode=rwc".to_string());
        DatabaseConfig { url }
    }
}

impl LLMConfig {
    fn from_source(vars: VarSource) -> Result<Self> {
        let api_key = vars("LLM_API_KEY").unwrap_or_else(|| "your-api-key".to_string());
        let base_url = vars("LLM_BASE_URL");

        let provider_str = vars("LLM_PROVIDER").unwrap_or_else(|| "openai".to_string());
        let provider = match provider_str.to_lowercase().as_str() {
            "gemini" | "google" => LLMProviderType::Gemini,
            "openai" | "chatgpt" | "gpt" => LLMProviderType::OpenAI,
            _ => {
                info!("Unknown LLM provider '{}', defaulting to OpenAI", provider_str);
                LLMProviderType::OpenAI
            }
        };

        let model = vars("LLM_MODEL");

        let timeout_str = vars("LLM_TIMEOUT_SECS").unwrap_or_else(|| "120".to_string());
        let timeout_secs = timeout_str
            .parse::<u64>()
            .map_err(|_| anyhow!("Invalid LLM_TIMEOUT_SECS value: '{}'", timeout_str))?;

        Ok(LLMConfig {
            api_key,
            base_url,
            provider,
            model,
            timeout: Duration::from_secs(timeout_secs),
        })
    }
}

impl ServerConfig {
    fn from_source(vars: VarSource) -> Result<Self> {
        let port = parse_port(vars("PORT"), 8000, "PORT")?;
        let host = vars("HOST").unwrap_or_else(|| "0.0.0.0".to_string());
        let allowed_origin =
            vars("ALLOWED_ORIGIN").unwrap_or_else(|| "http://localhost:3000".to_string());

        Ok(ServerConfig {
            port,
            host,
            allowed_origin,
            max_upload_bytes: parse_upload_limit(vars("MAX_UPLOAD_BYTES"))?,
        })
    }
}

impl AuthConfig {
    fn from_source(vars: VarSource) -> Self {
        AuthConfig {
            jwt_secret: vars("JWT_SECRET").unwrap_or_default(),
        }
    }
}

impl LoggingConfig {
    fn from_source(vars: VarSource) -> Self {
        let level = vars("RUST_LOG").unwrap_or_else(|| "info,quiz_generator=debug".to_string());
        let file_enabled = parse_flag(vars("LOG_FILE_ENABLED"));
        let console_enabled = parse_flag(vars("LOG_CONSOLE_ENABLED"));
        let log_directory = vars("LOG_DIRECTORY").unwrap_or_else(|| "logs".to_string());

        LoggingConfig {
            level,
            file_enabled,
            console_enabled,
            log_directory,
        }
    }
}

impl FrontendConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_source(&process_env)
    }

    fn from_source(vars: VarSource) -> Result<Self> {
        let api_url = vars("API_URL").unwrap_or_else(|| "http://localhost:8000".to_string());
        let host = vars("FRONTEND_HOST").unwrap_or_else(|| "0.0.0.0".to_string());
        let port = parse_port(vars("FRONTEND_PORT"), 3000, "FRONTEND_PORT")?;

        Ok(FrontendConfig {
            api_url: api_url.trim_end_matches('/').to_string(),
            host,
            port,
            max_upload_bytes: parse_upload_limit(vars("MAX_UPLOAD_BYTES"))?,
            logging: LoggingConfig::from_source(vars),
        })
    }
}

fn parse_port(value: Option<String>, default: u16, name: &str) -> Result<u16> {
    match value {
        None => Ok(default),
        Some(port_str) => port_str.parse::<u16>().map_err(|_| {
            anyhow!(
                "Invalid {} value: '{}'. Must be a number between 1-65535",
                name,
                port_str
            )
        }),
    }
}

fn parse_upload_limit(value: Option<String>) -> Result<usize> {
    match value {
        None => Ok(DEFAULT_UPLOAD_LIMIT),
        Some(limit_str) => limit_str
            .parse::<usize>()
            .map_err(|_| anyhow!("Invalid MAX_UPLOAD_BYTES value: '{}'", limit_str)),
    }
}

fn parse_flag(value: Option<String>) -> bool {
    value.and_then(|v| v.parse::<bool>().ok()).unwrap_or(true)
}

/// Mask sensitive data in configuration for safe logging
fn mask_sensitive_data(data: &str) -> String {
    let chars: Vec<char> = data.chars().collect();
    if chars.len() <= 8 {
        "*".repeat(chars.len())
    } else {
        let head: String = chars[..4].iter().collect();
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("{}***{}", head, tail)
    }
}
