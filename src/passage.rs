use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use reqwest::{Client, ClientBuilder, StatusCode};
use serde::{Deserialize, Serialize};

use crate::books;
use crate::error::{AppError, Result};

// Create a static client to reuse connections
static CLIENT: Lazy<Client> = Lazy::new(|| {
    ClientBuilder::new()
        .timeout(Duration::from_secs(10))
        .connect_timeout(Duration::from_secs(5))
        .pool_max_idle_per_host(10)
        .build()
        .expect("Failed to build HTTP client")
});

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Verse {
    pub number: u32,
    pub text: String,
}

/// One fetched chapter, canonical text. Never expires once cached.
#[derive(Debug, Clone)]
pub struct Passage {
    pub book: String,
    pub chapter: u32,
    pub translation: String,
    pub verses: Vec<Verse>,
    pub raw_text: String,
}

#[async_trait]
pub trait PassageSource: Send + Sync {
    async fn fetch(&self, book: &books::Book, chapter: u32, translation: &str) -> Result<Passage>;
}

// Wire shape of the text service response
#[derive(Deserialize)]
struct ApiPassage {
    verses: Vec<ApiVerse>,
    #[serde(default)]
    text: String,
}

#[derive(Deserialize)]
struct ApiVerse {
    verse: u32,
    text: String,
}

pub struct BibleApi {
    base_url: String,
}

impl BibleApi {
    pub fn new(base_url: impl Into<String>) -> Self {
        BibleApi {
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl PassageSource for BibleApi {
    async fn fetch(&self, book: &books::Book, chapter: u32, translation: &str) -> Result<Passage> {
        let book_path = book.name.replace(' ', "+");
        let url = format!(
            "{}/{}+{}?translation={}",
            self.base_url, book_path, chapter, translation
        );

        let response = CLIENT.get(&url).send().await?;
        let status = response.status();
        // A rate-limited text service keeps its 429 all the way to the client
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(AppError::RateLimited(format!(
                "text service returned HTTP 429 for {} {}",
                book.name, chapter
            )));
        }
        if !status.is_success() {
            return Err(AppError::UpstreamUnavailable(format!(
                "text service returned HTTP {} for {} {}",
                status.as_u16(),
                book.name,
                chapter
            )));
        }

        let body: ApiPassage = response
            .json()
            .await
            .map_err(|e| AppError::UpstreamMalformed(e.to_string()))?;
        if body.verses.is_empty() {
            return Err(AppError::UpstreamMalformed(format!(
                "no verses returned for {} {}",
                book.name, chapter
            )));
        }

        let verses = body
            .verses
            .into_iter()
            .map(|v| Verse {
                number: v.verse,
                text: v.text.trim().to_string(),
            })
            .collect::<Vec<_>>();

        let raw_text = if body.text.trim().is_empty() {
            verses
                .iter()
                .map(|v| v.text.as_str())
                .collect::<Vec<_>>()
                .join(" ")
        } else {
            body.text.trim().to_string()
        };

        Ok(Passage {
            book: book.name.to_string(),
            chapter,
            translation: translation.to_string(),
            verses,
            raw_text,
        })
    }
}

/// Memoizing front for a `PassageSource`. Validates the book name and chapter
/// bounds before anything touches the network; fetched chapters are kept for
/// the life of the process.
pub struct PassageFetcher {
    source: Arc<dyn PassageSource>,
    memo: Mutex<HashMap<(String, String, u32), Arc<Passage>>>,
}

impl PassageFetcher {
    pub fn new(source: Arc<dyn PassageSource>) -> Self {
        PassageFetcher {
            source,
            memo: Mutex::new(HashMap::new()),
        }
    }

    pub async fn fetch(&self, book: &str, chapter: u32, translation: &str) -> Result<Arc<Passage>> {
        let book = books::normalize(book)
            .ok_or_else(|| AppError::InvalidBook(book.trim().to_string()))?;
        if chapter < 1 || chapter > book.chapters {
            return Err(AppError::InvalidInput(format!(
                "{} has chapters 1 to {}",
                book.name, book.chapters
            )));
        }

        let key = (
            translation.to_string(),
            book.name.to_string(),
            chapter,
        );

        {
            let memo = self.memo.lock().unwrap();
            if let Some(passage) = memo.get(&key) {
                return Ok(Arc::clone(passage));
            }
        }

        let passage = Arc::new(self.source.fetch(book, chapter, translation).await?);

        self.memo
            .lock()
            .unwrap()
            .insert(key, Arc::clone(&passage));

        Ok(passage)
    }
}
