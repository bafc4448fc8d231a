//! Article source collaborator interface.

use crate::LifetraceResult;
use async_trait::async_trait;

/// Supplies the plain-text article for a subject.
///
/// Failures are reported as `FetchError` and are not retried by callers.
#[async_trait]
pub trait ArticleSource: Send + Sync {
    async fn fetch_article_text(&self, subject_name: &str, language: &str)
        -> LifetraceResult<String>;

    /// Short name for logs, e.g. `wikipedia`.
    fn source_name(&self) -> &str;
}
