//! Content classification: the [`Classifier`] trait, reply parsing, and the
//! deterministic fallback.
//!
//! Remote classifiers live in the app crate. Whatever they return is passed
//! through [`ClassificationResult::from_reply`], which applies the same
//! segment rules as capture-time resolution. Any failure along the way
//! (no credential, transport error, malformed JSON, no valid label) ends
//! in [`ClassificationResult::fallback`], so classification always
//! produces at least one segment.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::models::{ContentType, Segment};
use crate::segments::{normalize_labels, Classification};

/// Title assigned when nothing better is known.
pub const FALLBACK_TITLE: &str = "Untitled";
/// Description assigned by the fallback classifier.
pub const FALLBACK_DESCRIPTION: &str = "No description available";

/// Text longer than this many characters is treated as an article.
const LONG_FORM_CHARS: usize = 1000;

/// Page signals extracted by the capture agent.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Signals {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub has_images: bool,
    #[serde(default)]
    pub has_videos: bool,
    #[serde(default)]
    pub has_links: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub element_type: Option<String>,
}

/// Where a classification came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClassificationSource {
    Remote,
    Fallback,
}

/// A finished classification. `categories` is never empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassificationResult {
    /// Primary category first.
    pub categories: Vec<Segment>,
    pub title: String,
    pub description: String,
    pub content_type: ContentType,
    pub source: ClassificationSource,
}

impl ClassificationResult {
    /// Build a result from a remote reply. Returns `None` when the reply
    /// names no valid category.
    pub fn from_reply(reply: Classification) -> Option<Self> {
        let field = reply.labels()?;
        if !field.labels().into_iter().any(|l| Segment::from_label(l).is_some()) {
            return None;
        }
        let categories = normalize_labels(field.labels(), &reply.content_type);
        Some(Self {
            categories,
            title: non_empty(reply.title).unwrap_or_else(|| FALLBACK_TITLE.to_string()),
            description: non_empty(reply.description)
                .unwrap_or_else(|| FALLBACK_DESCRIPTION.to_string()),
            content_type: reply.content_type,
            source: ClassificationSource::Remote,
        })
    }

    /// Rule-based classification from signals alone.
    pub fn fallback(signals: &Signals) -> Self {
        let content_type = ContentType::default();
        let primary = fallback_categorization(signals);
        Self {
            categories: normalize_labels([primary.as_str()], &content_type),
            title: FALLBACK_TITLE.to_string(),
            description: FALLBACK_DESCRIPTION.to_string(),
            content_type,
            source: ClassificationSource::Fallback,
        }
    }

    pub fn primary(&self) -> Segment {
        self.categories[0]
    }
}

impl From<&ClassificationResult> for Classification {
    fn from(result: &ClassificationResult) -> Self {
        Classification {
            category: None,
            categories: Some(
                result
                    .categories
                    .iter()
                    .map(|s| s.as_str().to_string())
                    .collect(),
            ),
            title: Some(result.title.clone()),
            description: Some(result.description.clone()),
            content_type: result.content_type.clone(),
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Assigns categories to captured content.
///
/// Implementations must not fail: anything that goes wrong resolves to
/// [`ClassificationResult::fallback`].
#[async_trait]
pub trait Classifier: Send + Sync {
    /// Short identifier for logs (`"openai:gpt-4o-mini"`, `"fallback"`).
    fn name(&self) -> &str;

    async fn classify(&self, signals: &Signals) -> ClassificationResult;
}

/// A classifier that only applies the rule-based fallback.
pub struct FallbackClassifier;

#[async_trait]
impl Classifier for FallbackClassifier {
    fn name(&self) -> &str {
        "fallback"
    }

    async fn classify(&self, signals: &Signals) -> ClassificationResult {
        ClassificationResult::fallback(signals)
    }
}

/// Deterministic single-category heuristic.
///
/// First matching rule wins:
/// 1. images without videos: `Images`
/// 2. videos: `Videos`
/// 3. links and a purchase cue (`buy`, `price`, `$`): `Products`
/// 4. more than 1000 characters of text: `Articles`
/// 5. mentions `book` or `read`: `Books`
/// 6. otherwise `Study`
pub fn fallback_categorization(signals: &Signals) -> Segment {
    let text = signals.text.to_lowercase();

    if signals.has_images && !signals.has_videos {
        Segment::Images
    } else if signals.has_videos {
        Segment::Videos
    } else if signals.has_links
        && (text.contains("buy") || text.contains("price") || text.contains('$'))
    {
        Segment::Products
    } else if signals.text.chars().count() > LONG_FORM_CHARS {
        Segment::Articles
    } else if text.contains("book") || text.contains("read") {
        Segment::Books
    } else {
        Segment::Study
    }
}

/// Parse a model reply into a [`Classification`].
///
/// Tolerates Markdown code fences and prose around the JSON object.
pub fn parse_reply(reply: &str) -> Option<Classification> {
    let start = reply.find('{')?;
    let end = reply.rfind('}')?;
    if end < start {
        return None;
    }
    serde_json::from_str(&reply[start..=end]).ok()
}

/// System prompt for remote classifiers.
pub const SYSTEM_PROMPT: &str = "You categorize saved web content. \
Reply with a single JSON object and nothing else.";

/// Build the user prompt for a remote classifier. The page text is cut to
/// `preview_chars` characters.
pub fn build_prompt(signals: &Signals, preview_chars: usize) -> String {
    let preview: String = signals.text.chars().take(preview_chars).collect();
    format!(
        "Categorize this content into one or more of: Images, Products, Books, Articles, Videos, Study.\n\
         List the best-fitting category first.\n\n\
         Content: {preview}\n\
         Has images: {images}\n\
         Has videos: {videos}\n\
         Has links: {links}\n\
         Element type: {element}\n\n\
         Respond as JSON:\n\
         {{\"categories\": [\"...\"], \"title\": \"short title\", \"description\": \"one sentence\", \
         \"contentType\": {{\"isEducational\": false, \"isTechnical\": false, \"format\": \"text\"}}}}",
        preview = preview,
        images = signals.has_images,
        videos = signals.has_videos,
        links = signals.has_links,
        element = signals.element_type.as_deref().unwrap_or("unknown"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signals(text: &str) -> Signals {
        Signals {
            text: text.to_string(),
            ..Signals::default()
        }
    }

    #[test]
    fn test_fallback_images() {
        let s = Signals {
            has_images: true,
            ..Signals::default()
        };
        assert_eq!(fallback_categorization(&s), Segment::Images);
    }

    #[test]
    fn test_fallback_videos_win_over_images() {
        let s = Signals {
            has_images: true,
            has_videos: true,
            ..Signals::default()
        };
        assert_eq!(fallback_categorization(&s), Segment::Videos);
        let only = Signals {
            has_videos: true,
            ..Signals::default()
        };
        assert_eq!(fallback_categorization(&only), Segment::Videos);
    }

    #[test]
    fn test_fallback_products_need_links() {
        let s = Signals {
            has_links: true,
            ..signals("buy now $5")
        };
        assert_eq!(fallback_categorization(&s), Segment::Products);
        assert_eq!(fallback_categorization(&signals("PRICE drop")), Segment::Study);
    }

    #[test]
    fn test_fallback_long_text_is_article() {
        let long = "word ".repeat(201);
        assert_eq!(fallback_categorization(&signals(&long)), Segment::Articles);
        let exact = "a".repeat(1000);
        assert_eq!(fallback_categorization(&signals(&exact)), Segment::Study);
    }

    #[test]
    fn test_fallback_books_and_default() {
        assert_eq!(
            fallback_categorization(&signals("A Book worth your time")),
            Segment::Books
        );
        assert_eq!(fallback_categorization(&signals("must read")), Segment::Books);
        assert_eq!(fallback_categorization(&signals("")), Segment::Study);
    }

    #[test]
    fn test_fallback_is_pure() {
        let s = Signals {
            has_links: true,
            ..signals("price list")
        };
        assert_eq!(fallback_categorization(&s), fallback_categorization(&s));
    }

    #[test]
    fn test_fallback_result_shape() {
        let result = ClassificationResult::fallback(&signals(""));
        assert_eq!(result.categories, vec![Segment::Study]);
        assert_eq!(result.title, FALLBACK_TITLE);
        assert_eq!(result.description, FALLBACK_DESCRIPTION);
        assert_eq!(result.source, ClassificationSource::Fallback);
    }

    #[test]
    fn test_reply_with_fences() {
        let reply = "```json\n{\"categories\": [\"Videos\"], \"title\": \"Talk\", \
                     \"contentType\": {\"isEducational\": true}}\n```";
        let parsed = parse_reply(reply).unwrap();
        let result = ClassificationResult::from_reply(parsed).unwrap();
        assert_eq!(result.categories, vec![Segment::Videos, Segment::Study]);
        assert_eq!(result.title, "Talk");
        assert_eq!(result.description, FALLBACK_DESCRIPTION);
        assert_eq!(result.source, ClassificationSource::Remote);
    }

    #[test]
    fn test_reply_legacy_category() {
        let parsed = parse_reply(r#"{"category": "Products", "title": "Desk lamp"}"#).unwrap();
        let result = ClassificationResult::from_reply(parsed).unwrap();
        assert_eq!(result.categories, vec![Segment::Products]);
    }

    #[test]
    fn test_reply_without_valid_label() {
        let parsed = parse_reply(r#"{"categories": ["Recipes"]}"#).unwrap();
        assert!(ClassificationResult::from_reply(parsed).is_none());
        assert!(parse_reply("not json at all").is_none());
        assert!(parse_reply("} {").is_none());
    }

    #[test]
    fn test_educational_flag_alone_is_not_a_category() {
        let parsed = parse_reply(
            r#"{"categories": ["Recipes"], "contentType": {"isEducational": true}}"#,
        )
        .unwrap();
        assert!(ClassificationResult::from_reply(parsed).is_none());

        let parsed = parse_reply(
            r#"{"categories": ["Videos", "Recipes"], "contentType": {"isEducational": true}}"#,
        )
        .unwrap();
        let result = ClassificationResult::from_reply(parsed).unwrap();
        assert_eq!(result.categories, vec![Segment::Videos, Segment::Study]);
    }

    #[test]
    fn test_prompt_truncates_text() {
        let s = signals(&"x".repeat(5000));
        let prompt = build_prompt(&s, 1000);
        assert!(prompt.contains(&"x".repeat(1000)));
        assert!(!prompt.contains(&"x".repeat(1001)));
    }

    #[tokio::test]
    async fn test_fallback_classifier() {
        let result = FallbackClassifier.classify(&signals("reading list")).await;
        assert_eq!(result.primary(), Segment::Books);
    }
}
