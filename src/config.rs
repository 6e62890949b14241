//! Configuration management

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::llm::OllamaConfig;
use crate::scheduler::SchedulerConfig;

/// Runtime configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// SQLite database path for durable state
    pub db_path: PathBuf,

    /// Ollama URL for text generation (unset = offline placeholders)
    pub ollama_url: Option<String>,

    /// Model name passed to Ollama
    pub model: String,

    /// Scheduler, orchestrator and consolidation settings
    pub scheduler: SchedulerConfig,
}

fn env_or<T: FromStr>(key: &str, default: T) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("{}", e))
            .with_context(|| format!("Invalid value for {}: {:?}", key, raw)),
        _ => Ok(default),
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let db_path = std::env::var("ECHO_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| default_db_path());

        let ollama_url = std::env::var("OLLAMA_URL")
            .ok()
            .filter(|u| !u.trim().is_empty());

        let model = std::env::var("LLAMA_MODEL").unwrap_or_else(|_| "llama3.2:3b".to_string());

        let mut scheduler = SchedulerConfig::default();
        scheduler.tick_interval = Duration::from_millis(env_or("ECHO_TICK_INTERVAL_MS", 2000u64)?);
        scheduler.persist_every = env_or("ECHO_PERSIST_EVERY", scheduler.persist_every)?;
        scheduler.dream_every = env_or("ECHO_DREAM_EVERY", scheduler.dream_every)?;
        scheduler.activity_batch = env_or("ECHO_ACTIVITY_BATCH", scheduler.activity_batch)?;
        scheduler.orchestrator.pursuit_budget =
            Duration::from_secs(env_or("ECHO_PURSUIT_BUDGET_SECS", 10u64)?);

        let llm_timeout = Duration::from_secs(env_or("ECHO_LLM_TIMEOUT_SECS", 30u64)?);
        scheduler.llm_timeout = llm_timeout;
        scheduler.consolidation.llm_timeout = llm_timeout;

        if scheduler.persist_every == 0 || scheduler.dream_every == 0 {
            anyhow::bail!("ECHO_PERSIST_EVERY and ECHO_DREAM_EVERY must be at least 1");
        }

        Ok(Self {
            db_path,
            ollama_url,
            model,
            scheduler,
        })
    }

    /// Ollama settings, if a URL is configured
    pub fn ollama(&self) -> Option<OllamaConfig> {
        self.ollama_url.as_ref().map(|url| OllamaConfig {
            ollama_url: url.trim_end_matches('/').to_string(),
            model: self.model.clone(),
            timeout: self.scheduler.llm_timeout + Duration::from_secs(5),
        })
    }
}

/// `<data_local_dir>/echo-autonomy/state.db`
fn default_db_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("echo-autonomy")
        .join("state.db")
}

#[cfg(test)]
mod tests {
    use super::*;

    // Single test so env mutation never races another test in this module
    #[test]
    fn test_from_env() {
        for key in [
            "ECHO_DB_PATH",
            "ECHO_TICK_INTERVAL_MS",
            "ECHO_PERSIST_EVERY",
            "ECHO_DREAM_EVERY",
            "OLLAMA_URL",
        ] {
            std::env::remove_var(key);
        }

        let config = Config::from_env().unwrap();
        assert!(config.db_path.ends_with("echo-autonomy/state.db"));
        assert_eq!(config.scheduler.tick_interval, Duration::from_secs(2));
        assert_eq!(config.scheduler.persist_every, 5);
        assert!(config.ollama().is_none());

        std::env::set_var("ECHO_TICK_INTERVAL_MS", "250");
        std::env::set_var("ECHO_DB_PATH", "/tmp/echo-test/state.db");
        std::env::set_var("OLLAMA_URL", "http://localhost:11434/");
        let config = Config::from_env().unwrap();
        assert_eq!(config.scheduler.tick_interval, Duration::from_millis(250));
        assert_eq!(config.db_path, PathBuf::from("/tmp/echo-test/state.db"));
        assert_eq!(config.ollama().unwrap().ollama_url, "http://localhost:11434");

        std::env::set_var("ECHO_DREAM_EVERY", "soon");
        assert!(Config::from_env().is_err());
        std::env::set_var("ECHO_DREAM_EVERY", "0");
        assert!(Config::from_env().is_err());

        for key in ["ECHO_TICK_INTERVAL_MS", "ECHO_DB_PATH", "OLLAMA_URL", "ECHO_DREAM_EVERY"] {
            std::env::remove_var(key);
        }
    }
}
