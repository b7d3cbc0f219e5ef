// src/config/mod.rs
// Process-level configuration, loaded once from the environment.
// Per-user behavior settings live in the database (see src/settings).

use once_cell::sync::Lazy;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct KindredConfig {
    // ── Database Configuration
    pub database_url: String,
    pub sqlite_max_connections: u32,

    // ── Server Configuration
    pub host: String,
    pub port: u16,

    // ── LLM Collaborator Configuration
    pub llm_base_url: String,
    pub llm_model: String,
    pub llm_timeout_secs: u64,
    pub llm_max_output_tokens: u32,

    // ── Conversation Compaction
    pub context_window_tokens: usize,
    pub compact_batch_size: usize,

    // ── Logging Configuration
    pub log_level: String,
}

// Values may carry trailing comments when read from a .env file; strip them
// before parsing.
fn env_var_or<T>(key: &str, default: T) -> T
where
    T: FromStr,
{
    match std::env::var(key) {
        Ok(val) => {
            let clean_val = val.split('#').next().unwrap_or("").trim();
            match clean_val.parse::<T>() {
                Ok(parsed) => parsed,
                Err(_) => {
                    eprintln!("Config: {} = '{}' (parse failed, using default)", key, val);
                    default
                }
            }
        }
        Err(_) => default,
    }
}

impl KindredConfig {
    pub fn from_env() -> Self {
        // Load from .env file first if it exists
        let _ = dotenvy::dotenv();

        Self {
            database_url: env_var_or("DATABASE_URL", "sqlite:./kindred.db".to_string()),
            sqlite_max_connections: env_var_or("SQLITE_MAX_CONNECTIONS", 10),
            host: env_var_or("KINDRED_HOST", "0.0.0.0".to_string()),
            port: env_var_or("KINDRED_PORT", 3001),
            llm_base_url: env_var_or(
                "KINDRED_LLM_BASE_URL",
                "https://api.openai.com/v1".to_string(),
            ),
            llm_model: env_var_or("KINDRED_LLM_MODEL", "gpt-4.1-mini".to_string()),
            llm_timeout_secs: env_var_or("KINDRED_LLM_TIMEOUT", 30),
            llm_max_output_tokens: env_var_or("KINDRED_LLM_MAX_OUTPUT_TOKENS", 1024),
            context_window_tokens: env_var_or("KINDRED_CONTEXT_WINDOW_TOKENS", 32768),
            compact_batch_size: env_var_or("KINDRED_COMPACT_BATCH_SIZE", 20),
            log_level: env_var_or("KINDRED_LOG_LEVEL", "info".to_string()),
        }
    }

    /// Get server bind address
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Bounded timeout applied to every collaborator call
    pub fn llm_timeout(&self) -> Duration {
        Duration::from_secs(self.llm_timeout_secs)
    }
}

// Global config instance - loaded once at startup
pub static CONFIG: Lazy<KindredConfig> = Lazy::new(KindredConfig::from_env);
