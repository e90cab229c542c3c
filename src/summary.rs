//! Generation pipeline: fetch the passage, prompt the model, validate the
//! cited verses (with one stricter retry), extract citations, then best-effort
//! usage accounting and translation. Everything runs behind the summary cache,
//! so concurrent callers for the same passage share one pipeline run.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use crate::books;
use crate::cache::SummaryCache;
use crate::citations::{self, Citation};
use crate::error::{AppError, Result};
use crate::gemini::{GenerationError, GenerationOptions, TextGenerator};
use crate::kv::KvStore;
use crate::passage::{PassageFetcher, PassageSource, Verse};
use crate::translate::Translator;
use crate::usage::{UsageCounter, UsageError, UsageTracker};

/// Bumped whenever the stored payload shape changes, so stale cache entries
/// fall out of rotation on their own.
pub const FORMAT_VERSION: u32 = 2;

const CHAPTER_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);
const DAILY_TTL: Duration = Duration::from_secs(12 * 60 * 60);

const CHAPTER_OPTIONS: GenerationOptions = GenerationOptions {
    temperature: 0.7,
    max_output_tokens: None,
};

// Keep it concise for a daily summary
const DAILY_OPTIONS: GenerationOptions = GenerationOptions {
    temperature: 0.7,
    max_output_tokens: Some(150),
};

const RETRY_TEMPERATURE: f32 = 0.4;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationResult {
    pub book: String,
    pub chapter: u32,
    pub translation: String,
    pub summary: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary_ur: Option<String>,
    pub citations: Vec<Citation>,
    pub verses: Vec<Verse>,
    pub passage_text: String,
}

#[derive(Clone, Copy)]
enum SummaryKind {
    Chapter,
    Daily,
}

pub struct SummaryService {
    fetcher: PassageFetcher,
    generator: Arc<dyn TextGenerator>,
    translator: Translator,
    usage: UsageTracker,
    cache: SummaryCache<GenerationResult>,
}

impl SummaryService {
    pub fn new(
        source: Arc<dyn PassageSource>,
        generator: Arc<dyn TextGenerator>,
        store: Arc<dyn KvStore>,
        translation_langs: HashSet<String>,
    ) -> Self {
        SummaryService {
            fetcher: PassageFetcher::new(source),
            translator: Translator::new(Arc::clone(&generator), translation_langs),
            usage: UsageTracker::new(store),
            generator,
            cache: SummaryCache::new(),
        }
    }

    pub async fn chapter_summary(
        &self,
        book: &str,
        chapter: u32,
        translation: &str,
    ) -> Result<Arc<GenerationResult>> {
        let book = books::normalize(book)
            .ok_or_else(|| AppError::InvalidBook(book.trim().to_string()))?;
        if chapter < 1 || chapter > book.chapters {
            return Err(AppError::InvalidInput(format!(
                "{} has chapters 1 to {}",
                book.name, book.chapters
            )));
        }

        let key = chapter_key(translation, book.name, chapter);
        self.cache
            .request(&key, CHAPTER_TTL, false, || {
                self.generate(book.name, chapter, translation, SummaryKind::Chapter)
            })
            .await
    }

    /// The passage is chosen inside the generator, so one random pick serves
    /// every caller until the entry expires.
    pub async fn daily_summary(
        &self,
        translation: &str,
        force: bool,
    ) -> Result<Arc<GenerationResult>> {
        let key = daily_key(translation);
        self.cache
            .request(&key, DAILY_TTL, force, || async move {
                let (book, chapter) = books::random_daily_passage();
                self.generate(book.name, chapter, translation, SummaryKind::Daily)
                    .await
            })
            .await
    }

    pub async fn translate_text(
        &self,
        text: &str,
        target_lang: &str,
    ) -> std::result::Result<Option<String>, GenerationError> {
        let result = self.translator.translate(text, target_lang).await?;
        // The recorded input is the full prompt that went upstream
        if let (Some(translated), Some(prompt)) =
            (&result, self.translator.prompt_for(text, target_lang))
        {
            self.record_usage(&prompt, translated).await;
        }
        Ok(result)
    }

    pub async fn usage(&self) -> std::result::Result<UsageCounter, UsageError> {
        self.usage.current().await
    }

    async fn generate(
        &self,
        book: &str,
        chapter: u32,
        translation: &str,
        kind: SummaryKind,
    ) -> Result<GenerationResult> {
        let passage = self.fetcher.fetch(book, chapter, translation).await?;

        let prompt = match kind {
            SummaryKind::Chapter => build_chapter_prompt(
                &passage.book,
                chapter,
                passage.verses.len(),
                &passage.raw_text,
            ),
            SummaryKind::Daily => build_daily_prompt(
                &passage.book,
                chapter,
                passage.verses.len(),
                &passage.raw_text,
            ),
        };
        let options = match kind {
            SummaryKind::Chapter => CHAPTER_OPTIONS,
            SummaryKind::Daily => DAILY_OPTIONS,
        };

        let mut summary = self.generator.generate(&prompt, options).await?;
        self.record_usage(&prompt, &summary).await;

        let report = citations::validate(&summary, &passage.verses);
        if !report.valid {
            tracing::info!(
                "{} {} summary cites verses outside 1..={} ({:?}), retrying once",
                passage.book,
                chapter,
                report.max_verse,
                report.invalid_numbers
            );

            let stricter = append_citation_reminder(&prompt, report.max_verse);
            let retry_options = GenerationOptions {
                temperature: RETRY_TEMPERATURE,
                ..options
            };

            // The second result stands as-is; a failed retry keeps the first
            match self.generator.generate(&stricter, retry_options).await {
                Ok(regenerated) => {
                    self.record_usage(&stricter, &regenerated).await;
                    summary = regenerated;
                }
                Err(err) => {
                    tracing::warn!("citation retry failed, keeping first draft: {}", err);
                }
            }
        }

        let cited = citations::extract(&summary, &passage.verses);

        let summary_ur = match self.translate_text(&summary, "ur").await {
            Ok(value) => value,
            Err(err) => {
                tracing::warn!("translation failed, returning summary without it: {}", err);
                None
            }
        };

        Ok(GenerationResult {
            book: passage.book.clone(),
            chapter,
            translation: translation.to_string(),
            summary,
            summary_ur,
            citations: cited,
            verses: passage.verses.clone(),
            passage_text: passage.raw_text.clone(),
        })
    }

    async fn record_usage(&self, input: &str, output: &str) {
        let input_tokens = self.generator.count_tokens(input).await;
        let output_tokens = self.generator.count_tokens(output).await;
        if let Err(err) = self.usage.record(input_tokens, output_tokens).await {
            tracing::warn!("usage tracking unavailable: {}", err);
        }
    }
}

fn chapter_key(translation: &str, book: &str, chapter: u32) -> String {
    format!(
        "summary:{}:{}:{}:{}",
        FORMAT_VERSION,
        translation,
        slug(book),
        chapter
    )
}

fn daily_key(translation: &str) -> String {
    format!("daily:{}:{}", FORMAT_VERSION, translation)
}

fn slug(book: &str) -> String {
    book.to_lowercase().replace(' ', "-")
}

fn build_chapter_prompt(book: &str, chapter: u32, verse_count: usize, text: &str) -> String {
    let mut prompt = String::with_capacity(text.len() + 300);
    prompt.push_str(&format!(
        "Summarize {} chapter {} of the Bible in 3 paragraphs with key lessons. ",
        book, chapter
    ));
    prompt.push_str(&citation_instruction(verse_count));
    prompt.push_str("\n\n");
    prompt.push_str(text);
    prompt
}

fn build_daily_prompt(book: &str, chapter: u32, verse_count: usize, text: &str) -> String {
    let mut prompt = String::with_capacity(text.len() + 300);
    prompt.push_str(&format!(
        "Provide a concise one-paragraph summary of {} chapter {} of the Bible, \
         highlighting a key insight or lesson. ",
        book, chapter
    ));
    prompt.push_str(&citation_instruction(verse_count));
    prompt.push_str("\n\n");
    prompt.push_str(text);
    prompt
}

fn citation_instruction(verse_count: usize) -> String {
    format!(
        "Base the summary on the passage below and cite supporting verses inline with \
         tokens like v3 or v5-7, referring only to verses 1 to {}.",
        verse_count
    )
}

fn append_citation_reminder(prompt: &str, max_verse: u32) -> String {
    let mut stricter = String::with_capacity(prompt.len() + 150);
    stricter.push_str(prompt);
    stricter.push_str(&format!(
        "\n\nReminder: cite only verses that exist in this passage, between v1 and v{}. \
         Do not cite any verse outside that range.",
        max_verse
    ));
    stricter
}
