use std::collections::HashSet;
use std::sync::Arc;

use crate::gemini::{GenerationError, GenerationOptions, TextGenerator};

const TRANSLATION_OPTIONS: GenerationOptions = GenerationOptions {
    temperature: 0.3,
    max_output_tokens: None,
};

// Alternate spellings rewritten to one canonical form each. Longer variants
// first so the diacritic form never leaves its mark behind.
const URDU_TERMINOLOGY: [(&str, &str); 4] = [
    ("عیسیٰ", "یسوع"),
    ("عیسی", "یسوع"),
    ("اللہ", "خدا"),
    ("الله", "خدا"),
];

/// Best-effort secondary generation pass that renders a summary in another
/// language. Languages can be switched off entirely in configuration.
pub struct Translator {
    generator: Arc<dyn TextGenerator>,
    enabled_langs: HashSet<String>,
}

impl Translator {
    pub fn new(generator: Arc<dyn TextGenerator>, enabled_langs: HashSet<String>) -> Self {
        Translator {
            generator,
            enabled_langs,
        }
    }

    /// The full prompt a translation request sends upstream, or `None` when
    /// the language is disabled. Usage accounting counts this, not the bare
    /// input text.
    pub fn prompt_for(&self, text: &str, target_lang: &str) -> Option<String> {
        let lang = target_lang.trim().to_lowercase();
        if !self.enabled_langs.contains(&lang) {
            return None;
        }
        Some(build_prompt(text, &lang))
    }

    /// Returns `None` without an upstream call when `target_lang` is disabled.
    pub async fn translate(
        &self,
        text: &str,
        target_lang: &str,
    ) -> Result<Option<String>, GenerationError> {
        let lang = target_lang.trim().to_lowercase();
        let Some(prompt) = self.prompt_for(text, target_lang) else {
            tracing::debug!("translation disabled for {}", lang);
            return Ok(None);
        };

        let translated = self.generator.generate(&prompt, TRANSLATION_OPTIONS).await?;

        // The prompt already asks for canonical terms; rewrite anyway in case
        // the model ignores it
        let translated = if lang == "ur" {
            fix_urdu_terminology(&translated)
        } else {
            translated
        };

        Ok(Some(translated))
    }
}

pub fn fix_urdu_terminology(text: &str) -> String {
    let mut fixed = text.to_string();
    for (variant, canonical) in URDU_TERMINOLOGY {
        fixed = fixed.replace(variant, canonical);
    }
    fixed
}

fn build_prompt(text: &str, lang: &str) -> String {
    let language = match lang {
        "ur" => "Urdu",
        other => other,
    };

    let mut prompt = String::with_capacity(text.len() + 400);
    prompt.push_str("Translate the following text to ");
    prompt.push_str(language);
    prompt.push_str(
        ". Keep every verse marker like (3) and every citation token like v3 or v5-7 exactly as \
         written. Return only the translated prose.",
    );
    if lang == "ur" {
        prompt.push_str(" Use یسوع for Jesus and خدا for God.");
    }
    prompt.push_str("\n\n");
    prompt.push_str(text);
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct RecordingGenerator {
        calls: AtomicU32,
        reply: String,
        last_prompt: Mutex<Option<String>>,
    }

    impl RecordingGenerator {
        fn new(reply: &str) -> Self {
            RecordingGenerator {
                calls: AtomicU32::new(0),
                reply: reply.to_string(),
                last_prompt: Mutex::new(None),
            }
        }
    }

    #[async_trait]
    impl TextGenerator for RecordingGenerator {
        async fn generate(
            &self,
            prompt: &str,
            _options: GenerationOptions,
        ) -> Result<String, GenerationError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last_prompt.lock().unwrap() = Some(prompt.to_string());
            Ok(self.reply.clone())
        }
    }

    fn langs(codes: &[&str]) -> HashSet<String> {
        codes.iter().map(|c| c.to_string()).collect()
    }

    #[tokio::test]
    async fn disabled_language_skips_the_upstream_call() {
        let generator = Arc::new(RecordingGenerator::new("unused"));
        let translator = Translator::new(generator.clone(), langs(&[]));

        let result = translator.translate("some text", "ur").await.unwrap();
        assert_eq!(result, None);
        assert_eq!(generator.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn enabled_language_translates_and_fixes_terminology() {
        let generator = Arc::new(RecordingGenerator::new("عیسیٰ نے کہا، اللہ محبت ہے"));
        let translator = Translator::new(generator.clone(), langs(&["ur"]));

        let result = translator
            .translate("Jesus said, God is love (v16)", "UR")
            .await
            .unwrap()
            .unwrap();

        assert_eq!(generator.calls.load(Ordering::SeqCst), 1);
        assert!(result.contains("یسوع"));
        assert!(result.contains("خدا"));
        assert!(!result.contains("عیسی"));
        assert!(!result.contains("اللہ"));

        let prompt = generator.last_prompt.lock().unwrap().clone().unwrap();
        assert!(prompt.contains("Jesus said, God is love (v16)"));
        assert!(prompt.contains("یسوع"));
    }

    #[test]
    fn terminology_fixup_covers_every_variant() {
        let fixed = fix_urdu_terminology("عیسیٰ اور عیسی اور اللہ اور الله");
        assert_eq!(fixed, "یسوع اور یسوع اور خدا اور خدا");

        // Canonical text passes through untouched
        let canonical = "یسوع خدا کا کلام";
        assert_eq!(fix_urdu_terminology(canonical), canonical);
    }

    #[tokio::test]
    async fn prompt_for_matches_what_translate_sends() {
        let generator = Arc::new(RecordingGenerator::new("ترجمہ"));
        let translator = Translator::new(generator.clone(), langs(&["ur"]));

        let expected = translator.prompt_for("some text", "UR ").unwrap();
        translator.translate("some text", "UR ").await.unwrap();

        let sent = generator.last_prompt.lock().unwrap().clone().unwrap();
        assert_eq!(sent, expected);

        // Disabled languages have no prompt at all
        assert!(translator.prompt_for("some text", "fr").is_none());
    }
}
