//! Classification service contract and its HTTP implementation.
//!
//! The pipeline stages only see [`ClassificationService`]: a batch call for
//! relevance screening and a single-document call for content analysis.
//! Both are single-shot from the caller's point of view. Retrying is the
//! caller's job, and the error kind tells it whether a retry makes sense.

pub mod gemini;
mod parse;
mod prompt;

use std::future::Future;
use std::path::Path;

use litscreen_shared::{BatchDecision, BatchItem, DocumentVerdict};

pub use gemini::{GeminiClient, GeminiSettings};
pub use parse::{parse_batch_decisions, parse_document_verdict, strip_code_fences};
pub use prompt::render_batch_prompt;

/// Failure of one classification call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ServiceError {
    /// The service asked us to slow down. The only retryable kind.
    #[error("rate limited: {0}")]
    RateLimited(String),

    /// Non-recoverable service or transport failure.
    #[error("service error: {0}")]
    Service(String),

    /// The response arrived but was not the structured payload we asked for.
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    /// An uploaded document could not be ingested.
    #[error("ingest failed: {0}")]
    IngestFailed(String),
}

impl ServiceError {
    /// Whether the same request may succeed if repeated after a delay.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimited(_))
    }
}

/// External classification service.
///
/// Implementations must be shareable across worker tasks.
pub trait ClassificationService: Send + Sync {
    /// Screen a batch of items. The response may omit ids; omitted items
    /// stay unresolved.
    fn classify_batch(
        &self,
        items: &[BatchItem],
    ) -> impl Future<Output = Result<Vec<BatchDecision>, ServiceError>> + Send;

    /// Classify one document, blocking until the service has ingested it.
    fn classify_document(
        &self,
        artifact: &Path,
    ) -> impl Future<Output = Result<DocumentVerdict, ServiceError>> + Send;
}
