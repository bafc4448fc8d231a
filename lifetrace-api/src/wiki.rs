//! Wikipedia article source.
//!
//! Two MediaWiki calls per article: a full-text search for the best
//! matching title, then the plain-text extract of that page. Chinese
//! requests go to zh.wikipedia.org with simplified-script conversion,
//! everything else to en.wikipedia.org.

use std::time::Duration;

use async_trait::async_trait;
use lifetrace_core::{ArticleSource, FetchError, LifetraceError, LifetraceResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;

const SOURCE_NAME: &str = "wikipedia";
const SEARCH_LIMIT: &str = "5";

/// One entry of a search-as-you-type response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Suggestion {
    pub name: String,
    pub description: String,
    /// Rank-derived score in (0, 1], best first.
    pub popularity: f64,
}

/// Name suggestions for partial input.
#[async_trait]
pub trait SuggestionSource: Send + Sync {
    async fn search_suggestions(
        &self,
        query: &str,
        language: &str,
        limit: usize,
    ) -> LifetraceResult<Vec<Suggestion>>;
}

/// MediaWiki-backed [`ArticleSource`].
#[derive(Debug, Clone)]
pub struct WikipediaSource {
    client: reqwest::Client,
    /// Replaces `https://{lang}.wikipedia.org` when set.
    base_url: Option<String>,
}

impl WikipediaSource {
    pub fn new(timeout: Duration, user_agent: &str) -> LifetraceResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()
            .map_err(|e| upstream(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            base_url: None,
        })
    }

    /// Point every request at `base_url` instead of the public wikis.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into().trim_end_matches('/').to_string());
        self
    }

    fn api_url(&self, language: &str) -> String {
        match &self.base_url {
            Some(base) => format!("{}/w/api.php", base),
            None => format!("https://{}/w/api.php", wiki_domain(language)),
        }
    }

    async fn get_json(&self, language: &str, params: &[(&str, &str)]) -> LifetraceResult<Value> {
        let mut query: Vec<(&str, &str)> = vec![("format", "json"), ("formatversion", "2")];
        query.extend_from_slice(params);
        if is_chinese(language) {
            query.push(("variant", "zh-hans"));
        }

        let response = self
            .client
            .get(self.api_url(language))
            .query(&query)
            .send()
            .await
            .map_err(|e| upstream(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(upstream(format!("HTTP {}", status)));
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| upstream(format!("invalid JSON: {}", e)))
    }

    async fn best_title(&self, subject_name: &str, language: &str) -> LifetraceResult<String> {
        let body = self
            .get_json(
                language,
                &[
                    ("action", "query"),
                    ("list", "search"),
                    ("srsearch", subject_name),
                    ("srlimit", SEARCH_LIMIT),
                ],
            )
            .await?;
        first_search_title(&body).ok_or_else(|| not_found(subject_name, language))
    }
}

#[async_trait]
impl ArticleSource for WikipediaSource {
    async fn fetch_article_text(
        &self,
        subject_name: &str,
        language: &str,
    ) -> LifetraceResult<String> {
        let title = self.best_title(subject_name, language).await?;
        tracing::debug!(subject = %subject_name, title = %title, "Resolved article title");

        let body = self
            .get_json(
                language,
                &[
                    ("action", "query"),
                    ("prop", "extracts"),
                    ("explaintext", "1"),
                    ("redirects", "1"),
                    ("titles", title.as_str()),
                ],
            )
            .await?;

        match page_extract(&body) {
            Some(text) => {
                tracing::info!(
                    subject = %subject_name,
                    title = %title,
                    chars = text.chars().count(),
                    "Fetched article"
                );
                Ok(text)
            }
            None => Err(not_found(subject_name, language)),
        }
    }

    fn source_name(&self) -> &str {
        SOURCE_NAME
    }
}

#[async_trait]
impl SuggestionSource for WikipediaSource {
    async fn search_suggestions(
        &self,
        query: &str,
        language: &str,
        limit: usize,
    ) -> LifetraceResult<Vec<Suggestion>> {
        let limit_param = limit.to_string();
        let body = self
            .get_json(
                language,
                &[
                    ("action", "opensearch"),
                    ("search", query),
                    ("limit", limit_param.as_str()),
                    ("namespace", "0"),
                ],
            )
            .await?;
        Ok(opensearch_suggestions(&body, limit))
    }
}

pub fn wiki_domain(language: &str) -> &'static str {
    if is_chinese(language) {
        "zh.wikipedia.org"
    } else {
        "en.wikipedia.org"
    }
}

fn is_chinese(language: &str) -> bool {
    language == "zh" || language.starts_with("zh-")
}

fn first_search_title(body: &Value) -> Option<String> {
    body.pointer("/query/search")?
        .as_array()?
        .iter()
        .filter_map(|hit| hit.get("title")?.as_str())
        .map(str::trim)
        .find(|title| !title.is_empty())
        .map(str::to_string)
}

fn page_extract(body: &Value) -> Option<String> {
    body.pointer("/query/pages")?
        .as_array()?
        .iter()
        .filter(|page| page.get("missing").is_none())
        .filter_map(|page| page.get("extract")?.as_str())
        .map(str::trim)
        .find(|text| !text.is_empty())
        .map(str::to_string)
}

/// Opensearch answers `[query, [titles], [descriptions], [urls]]`.
fn opensearch_suggestions(body: &Value, limit: usize) -> Vec<Suggestion> {
    let titles = body.get(1).and_then(Value::as_array);
    let descriptions = body.get(2).and_then(Value::as_array);
    let Some(titles) = titles else {
        return Vec::new();
    };
    titles
        .iter()
        .filter_map(Value::as_str)
        .take(limit)
        .enumerate()
        .map(|(rank, title)| Suggestion {
            name: title.to_string(),
            description: descriptions
                .and_then(|d| d.get(rank))
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            popularity: (1.0 - rank as f64 * 0.1).max(0.1),
        })
        .collect()
}

fn upstream(reason: impl Into<String>) -> LifetraceError {
    FetchError::Upstream {
        source_name: SOURCE_NAME.to_string(),
        reason: reason.into(),
    }
    .into()
}

fn not_found(subject: &str, language: &str) -> LifetraceError {
    FetchError::NotFound {
        subject: subject.to_string(),
        language: language.to_string(),
    }
    .into()
}
