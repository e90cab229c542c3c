use serde::{Deserialize, Serialize};

use crate::usage::UsageCounter;

#[derive(Deserialize)]
pub struct SummarizeRequest {
    pub book: String,
    pub chapter: ChapterParam,
    pub translation: Option<String>,
}

/// Clients send the chapter either as a number or as a numeric string.
#[derive(Deserialize)]
#[serde(untagged)]
pub enum ChapterParam {
    Number(u32),
    Text(String),
}

impl ChapterParam {
    pub fn resolve(&self) -> Option<u32> {
        match self {
            ChapterParam::Number(n) => Some(*n),
            ChapterParam::Text(raw) => raw.trim().parse().ok(),
        }
    }
}

#[derive(Deserialize)]
pub struct DailyQuery {
    pub translation: Option<String>,
    pub force: Option<String>,
}

/// A missing or blank translation falls back to the configured default.
pub fn requested_translation(raw: Option<&str>, default: &str) -> String {
    raw.filter(|t| !t.trim().is_empty())
        .unwrap_or(default)
        .to_lowercase()
}

#[derive(Deserialize)]
pub struct TranslateRequest {
    pub text: String,
    #[serde(rename = "targetLang")]
    pub target_lang: String,
}

#[derive(Serialize)]
pub struct TranslateResponse {
    #[serde(rename = "translatedText")]
    pub translated_text: Option<String>,
}

#[derive(Deserialize)]
pub struct AdminQuery {
    pub key: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageDashboard {
    pub usage: UsageCounter,
    pub monthly_token_budget: u64,
    pub remaining_tokens: u64,
}
