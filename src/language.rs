//! Language detection and translation.
//!
//! Retrieval and grounding always operate in English; this module detects
//! the language of a user query, translates it to English for the pipeline,
//! and exposes the detected code so the answer can be produced in the
//! user's language.
//!
//! Statistical detectors misfire badly on short queries ("Hi", "ok thanks"),
//! so detection is a policy over two signals: a common-English-word ratio
//! heuristic and the detector's top candidate with its confidence. The
//! thresholds are empirical and configurable. Translation failures degrade
//! to the original text — a worse answer beats no answer.

use std::collections::HashSet;
use std::sync::{Arc, LazyLock};

use regex::Regex;
use tracing::{info, warn};

use crate::config::LanguageConfig;
use crate::llm::ChatModel;

/// Common English words used by the likely-English heuristic, including the
/// question words that dominate short queries.
const COMMON_ENGLISH_WORDS: &[&str] = &[
    "the", "be", "to", "of", "and", "a", "in", "that", "have", "i", "it", "for", "not", "on",
    "with", "he", "as", "you", "do", "at", "this", "but", "his", "by", "from", "they", "we", "say",
    "her", "she", "or", "an", "will", "my", "one", "all", "would", "there", "their", "what", "are",
    "is", "can", "how", "when", "where", "why", "who", "which", "about", "explain", "tell", "me",
    "please", "does", "did", "was", "were",
];

static NON_WORD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^\w\s]").unwrap());

static WORD_SET: LazyLock<HashSet<&'static str>> =
    LazyLock::new(|| COMMON_ENGLISH_WORDS.iter().copied().collect());

/// Display names for the language codes the assistant is expected to meet,
/// used when prompting the model to translate or respond in a language.
const LANGUAGE_NAMES: &[(&str, &str)] = &[
    ("hi", "Hindi"),
    ("te", "Telugu"),
    ("ta", "Tamil"),
    ("kn", "Kannada"),
    ("ml", "Malayalam"),
    ("mr", "Marathi"),
    ("gu", "Gujarati"),
    ("bn", "Bengali"),
    ("pa", "Punjabi"),
    ("or", "Odia"),
    ("ur", "Urdu"),
    ("ne", "Nepali"),
    ("es", "Spanish"),
    ("fr", "French"),
    ("de", "German"),
    ("pt", "Portuguese"),
    ("ru", "Russian"),
    ("ja", "Japanese"),
    ("zh", "Chinese"),
    ("ar", "Arabic"),
    ("en", "English"),
];

/// Human-readable name for a language code; unknown codes are upper-cased.
pub fn language_name(code: &str) -> String {
    LANGUAGE_NAMES
        .iter()
        .find(|(c, _)| *c == code)
        .map(|(_, name)| name.to_string())
        .unwrap_or_else(|| code.to_uppercase())
}

/// Fraction-of-common-words heuristic. Empty text counts as English;
/// text whose unique tokens are at least `ratio` common English words is
/// likely English.
pub fn is_likely_english(text: &str, ratio: f64) -> bool {
    if text.trim().is_empty() {
        return true;
    }

    let normalized = NON_WORD.replace_all(&text.to_lowercase(), " ").to_string();
    let words: HashSet<&str> = normalized.split_whitespace().collect();
    if words.is_empty() {
        return false;
    }

    let english = words.iter().filter(|w| WORD_SET.contains(*w)).count();
    english as f64 / words.len() as f64 >= ratio
}

/// Top candidate from a statistical language detector.
#[derive(Debug, Clone)]
pub struct Detection {
    /// ISO 639-1 code where one exists, detector-native code otherwise.
    pub code: String,
    /// Confidence in `[0.0, 1.0]`.
    pub confidence: f64,
}

/// Statistical detector seam. The policy in [`LanguageNormalizer`] is what
/// actually decides; this just reports the detector's best guess.
pub trait LanguageDetector: Send + Sync {
    fn detect(&self, text: &str) -> Option<Detection>;
}

/// Detector backed by whatlang's trigram model.
pub struct WhatlangDetector;

impl LanguageDetector for WhatlangDetector {
    fn detect(&self, text: &str) -> Option<Detection> {
        let info = whatlang::detect(text)?;
        Some(Detection {
            code: iso_639_1(info.lang()).to_string(),
            confidence: info.confidence(),
        })
    }
}

/// whatlang reports ISO 639-3; map the languages we expect to meet onto the
/// 639-1 codes the rest of the pipeline and the prompts use.
fn iso_639_1(lang: whatlang::Lang) -> &'static str {
    use whatlang::Lang;
    match lang {
        Lang::Eng => "en",
        Lang::Hin => "hi",
        Lang::Tel => "te",
        Lang::Tam => "ta",
        Lang::Kan => "kn",
        Lang::Mal => "ml",
        Lang::Mar => "mr",
        Lang::Guj => "gu",
        Lang::Ben => "bn",
        Lang::Pan => "pa",
        Lang::Ori => "or",
        Lang::Urd => "ur",
        Lang::Nep => "ne",
        Lang::Spa => "es",
        Lang::Fra => "fr",
        Lang::Deu => "de",
        Lang::Por => "pt",
        Lang::Rus => "ru",
        Lang::Jpn => "ja",
        Lang::Cmn => "zh",
        Lang::Ara => "ar",
        other => other.code(),
    }
}

/// Detects query language and translates to/from English.
pub struct LanguageNormalizer {
    llm: Arc<dyn ChatModel>,
    detector: Box<dyn LanguageDetector>,
    config: LanguageConfig,
}

/// Translation runs cold — the output should be the input, restated.
const TRANSLATION_TEMPERATURE: f32 = 0.1;

impl LanguageNormalizer {
    pub fn new(llm: Arc<dyn ChatModel>, config: LanguageConfig) -> Self {
        Self {
            llm,
            detector: Box::new(WhatlangDetector),
            config,
        }
    }

    pub fn with_detector(
        llm: Arc<dyn ChatModel>,
        detector: Box<dyn LanguageDetector>,
        config: LanguageConfig,
    ) -> Self {
        Self {
            llm,
            detector,
            config,
        }
    }

    /// Resolve the language of `text`, reconciling the word-ratio heuristic
    /// with the statistical detector:
    ///
    /// - Likely-English text stays English unless the detector disagrees
    ///   with very high confidence (> `english_override_confidence`).
    /// - Otherwise a non-English detection is accepted at
    ///   `non_english_confidence` or above.
    /// - Detector failure defaults to English.
    pub fn detect_language(&self, text: &str) -> String {
        if text.trim().is_empty() {
            return "en".to_string();
        }

        let likely_english = is_likely_english(text, self.config.english_word_ratio);
        let detection = self.detector.detect(text);

        match detection {
            Some(d) if likely_english => {
                if d.code != "en" && d.confidence > self.config.english_override_confidence {
                    info!(lang = %d.code, confidence = d.confidence, "high-confidence non-English override");
                    d.code
                } else {
                    "en".to_string()
                }
            }
            Some(d) => {
                if d.code != "en" && d.confidence >= self.config.non_english_confidence {
                    info!(lang = %d.code, confidence = d.confidence, "detected language");
                    d.code
                } else {
                    "en".to_string()
                }
            }
            None => {
                warn!("language detection failed, defaulting to English");
                "en".to_string()
            }
        }
    }

    /// Translate `text` into English. No-op for English input; returns the
    /// original text unchanged if translation fails.
    pub async fn translate_to_english(&self, text: &str, source_lang: &str) -> String {
        self.translate(text, source_lang, "en").await
    }

    /// Translate English `text` into `target_lang`. No-op for English;
    /// returns the original text unchanged if translation fails.
    pub async fn translate_from_english(&self, text: &str, target_lang: &str) -> String {
        self.translate(text, "en", target_lang).await
    }

    async fn translate(&self, text: &str, source_lang: &str, target_lang: &str) -> String {
        if source_lang == target_lang || source_lang.is_empty() || target_lang.is_empty() {
            return text.to_string();
        }

        let system = format!(
            "You are a professional translator. Translate the following text from {} to {}. \
             Return ONLY the translated text, nothing else.",
            language_name(source_lang),
            language_name(target_lang)
        );

        match self
            .llm
            .generate(&system, &[], text, TRANSLATION_TEMPERATURE)
            .await
        {
            Ok(translated) => translated.trim().to_string(),
            Err(e) => {
                warn!(error = %e, "translation failed, returning original text");
                text.to_string()
            }
        }
    }

    /// Query-side entry point: detect the language and return the English
    /// form of the query along with the detected code.
    pub async fn process_user_query(&self, text: &str) -> (String, String) {
        let lang = self.detect_language(text);

        if lang == "en" {
            return (text.to_string(), lang);
        }

        let english = self.translate_to_english(text, &lang).await;
        (english, lang)
    }
}
