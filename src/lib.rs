pub mod api;
pub mod books;
pub mod cache;
pub mod citations;
pub mod config;
pub mod error;
pub mod gemini;
pub mod kv;
pub mod passage;
pub mod retry;
pub mod summary;
pub mod translate;
pub mod usage;

use std::sync::Arc;

use config::Config;
use summary::SummaryService;

/// Application state that will be shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub service: Arc<SummaryService>,
}
