use std::collections::HashSet;
use std::env;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use crate::error::{AppError, Result};

#[derive(Clone)]
pub struct Config {
    pub server_addr: SocketAddr,
    pub gemini_api_key: String,
    pub gemini_model: String,
    pub gemini_base_url: String,
    pub bible_api_url: String,
    pub default_translation: String,
    pub redis_url: Option<String>,
    pub admin_key: Option<String>,
    pub translation_langs: HashSet<String>,
    pub monthly_token_budget: u64,
}

impl Config {
    pub fn load() -> Result<Self> {
        // Load environment variables from .env file if it exists
        dotenv::dotenv().ok();

        // The generation service key is the only required setting
        let gemini_api_key = env::var("GEMINI_API_KEY")?;

        let gemini_model =
            env::var("GEMINI_MODEL").unwrap_or_else(|_| "gemini-1.5-flash".to_string());
        let gemini_base_url = env::var("GEMINI_BASE_URL")
            .unwrap_or_else(|_| "https://generativelanguage.googleapis.com".to_string());
        let bible_api_url =
            env::var("BIBLE_API_URL").unwrap_or_else(|_| "https://bible-api.com".to_string());
        let default_translation =
            env::var("DEFAULT_TRANSLATION").unwrap_or_else(|_| "kjv".to_string());

        let redis_url = env::var("REDIS_URL").ok();
        let admin_key = env::var("ADMIN_KEY").ok();

        // Comma-separated list of languages translation is enabled for
        let translation_langs = env::var("TRANSLATION_LANGS")
            .unwrap_or_else(|_| "ur".to_string())
            .split(',')
            .map(|lang| lang.trim().to_lowercase())
            .filter(|lang| !lang.is_empty())
            .collect::<HashSet<_>>();

        let monthly_token_budget = env::var("MONTHLY_TOKEN_BUDGET")
            .unwrap_or_else(|_| "1000000".to_string())
            .parse::<u64>()
            .map_err(|e| AppError::ConfigError(format!("Invalid token budget: {}", e)))?;

        // Load server configuration with defaults
        let host = env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("PORT").unwrap_or_else(|_| "3000".to_string());
        let port = port.parse::<u16>().map_err(|e| AppError::ConfigError(format!("Invalid port: {}", e)))?;
        let ip = IpAddr::from_str(&host).map_err(|e| AppError::ConfigError(format!("Invalid host address: {}", e)))?;

        let server_addr = SocketAddr::new(ip, port);

        Ok(Config {
            server_addr,
            gemini_api_key,
            gemini_model,
            gemini_base_url,
            bible_api_url,
            default_translation,
            redis_url,
            admin_key,
            translation_langs,
            monthly_token_budget,
        })
    }
}
