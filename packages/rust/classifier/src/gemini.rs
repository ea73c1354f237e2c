//! Gemini REST implementation of [`ClassificationService`].
//!
//! Batch screening is a single `generateContent` call. Document analysis
//! uploads the file through the resumable Files API, polls until the
//! service has ingested it, asks for a classification, and deletes the
//! uploaded file on every path after a successful upload. The delete is
//! tied to a guard value, so a panic or a dropped future still
//! schedules it.

use std::path::Path;
use std::time::{Duration, Instant};

use litscreen_shared::{BatchDecision, BatchItem, DocumentVerdict, LitScreenError};
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, instrument, warn};

use crate::parse::{parse_batch_decisions, parse_document_verdict};
use crate::prompt::render_batch_prompt;
use crate::{ClassificationService, ServiceError};

/// User-Agent string for service requests.
const USER_AGENT: &str = concat!("litscreen/", env!("CARGO_PKG_VERSION"));

const API_VERSION: &str = "v1beta";
const API_KEY_HEADER: &str = "x-goog-api-key";
const UPLOAD_URL_HEADER: &str = "x-goog-upload-url";
const PDF_MIME: &str = "application/pdf";

const STATE_PROCESSING: &str = "PROCESSING";
const STATE_FAILED: &str = "FAILED";

/// Longest error body excerpt carried into error messages.
const ERROR_BODY_CHARS: usize = 300;

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

/// Connection and prompt settings for [`GeminiClient`].
#[derive(Clone)]
pub struct GeminiSettings {
    /// Endpoint root, e.g. `https://generativelanguage.googleapis.com`.
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    /// Instructions placed ahead of every screening batch.
    pub screening_prompt: String,
    /// Instructions sent alongside every document.
    pub analysis_prompt: String,
    pub request_timeout: Duration,
    /// Delay between ingest-state polls.
    pub poll_interval: Duration,
    /// Upper bound on waiting for a document to leave `PROCESSING`.
    pub ingest_timeout: Duration,
}

impl std::fmt::Debug for GeminiSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiSettings")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("request_timeout", &self.request_timeout)
            .field("poll_interval", &self.poll_interval)
            .field("ingest_timeout", &self.ingest_timeout)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

/// File resource as reported by the Files API.
#[derive(Debug, Clone, Deserialize)]
struct RemoteFile {
    name: String,
    #[serde(default)]
    uri: String,
    #[serde(rename = "mimeType", default)]
    mime_type: String,
    #[serde(default)]
    state: String,
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    file: RemoteFile,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<GenerateCandidate>,
}

#[derive(Debug, Deserialize)]
struct GenerateCandidate {
    content: Option<GenerateContent>,
}

#[derive(Debug, Deserialize)]
struct GenerateContent {
    #[serde(default)]
    parts: Vec<GeneratePart>,
}

#[derive(Debug, Deserialize)]
struct GeneratePart {
    text: Option<String>,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// HTTP client for the Gemini `generateContent` and Files endpoints.
#[derive(Debug, Clone)]
pub struct GeminiClient {
    http: Client,
    base: String,
    api_key: String,
    model: String,
    screening_prompt: String,
    analysis_prompt: String,
    poll_interval: Duration,
    ingest_timeout: Duration,
}

impl GeminiClient {
    pub fn new(settings: GeminiSettings) -> litscreen_shared::Result<Self> {
        let http = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(settings.request_timeout)
            .build()
            .map_err(|e| LitScreenError::config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            base: settings.base_url.trim_end_matches('/').to_string(),
            api_key: settings.api_key,
            model: settings.model,
            screening_prompt: settings.screening_prompt,
            analysis_prompt: settings.analysis_prompt,
            poll_interval: settings.poll_interval,
            ingest_timeout: settings.ingest_timeout,
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{API_VERSION}/{path}", self.base)
    }

    /// Run `generateContent` and return the concatenated text of the first candidate.
    async fn generate(&self, parts: Value) -> Result<String, ServiceError> {
        let url = self.endpoint(&format!("models/{}:generateContent", self.model));
        let body = json!({
            "contents": [{ "role": "user", "parts": parts }],
            "generationConfig": { "responseMimeType": "application/json" },
        });

        let response = self
            .http
            .post(url)
            .header(API_KEY_HEADER, &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;
        let response = check_status(response).await?;

        let parsed: GenerateResponse = response.json().await.map_err(|e| {
            ServiceError::MalformedResponse(format!("unexpected generateContent body: {e}"))
        })?;

        let text: String = parsed
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
            .unwrap_or_default();

        if text.trim().is_empty() {
            return Err(ServiceError::MalformedResponse(
                "response contained no text".into(),
            ));
        }
        Ok(text)
    }

    /// Upload a document through the resumable protocol.
    async fn upload(&self, artifact: &Path) -> Result<RemoteFile, ServiceError> {
        let bytes = tokio::fs::read(artifact).await.map_err(|e| {
            ServiceError::IngestFailed(format!("cannot read {}: {e}", artifact.display()))
        })?;
        let display_name = artifact
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "document.pdf".into());

        let start = self
            .http
            .post(format!("{}/upload/{API_VERSION}/files", self.base))
            .header(API_KEY_HEADER, &self.api_key)
            .header("X-Goog-Upload-Protocol", "resumable")
            .header("X-Goog-Upload-Command", "start")
            .header("X-Goog-Upload-Header-Content-Length", bytes.len().to_string())
            .header("X-Goog-Upload-Header-Content-Type", PDF_MIME)
            .json(&json!({ "file": { "display_name": display_name } }))
            .send()
            .await
            .map_err(transport_error)?;
        let start = check_status(start).await?;

        let session_url = start
            .headers()
            .get(UPLOAD_URL_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| {
                ServiceError::MalformedResponse("upload session URL missing".into())
            })?;

        let finish = self
            .http
            .post(session_url)
            .header(API_KEY_HEADER, &self.api_key)
            .header("X-Goog-Upload-Offset", "0")
            .header("X-Goog-Upload-Command", "upload, finalize")
            .body(bytes)
            .send()
            .await
            .map_err(transport_error)?;
        let finish = check_status(finish).await?;

        let uploaded: UploadResponse = finish.json().await.map_err(|e| {
            ServiceError::MalformedResponse(format!("unexpected upload body: {e}"))
        })?;
        debug!(file = %uploaded.file.name, state = %uploaded.file.state, "document uploaded");
        Ok(uploaded.file)
    }

    async fn get_file(&self, name: &str) -> Result<RemoteFile, ServiceError> {
        let response = self
            .http
            .get(self.endpoint(name))
            .header(API_KEY_HEADER, &self.api_key)
            .send()
            .await
            .map_err(transport_error)?;
        let response = check_status(response).await?;
        response.json().await.map_err(|e| {
            ServiceError::MalformedResponse(format!("unexpected file body: {e}"))
        })
    }

    /// Poll until the file leaves `PROCESSING`. Rate-limited polls are retried.
    async fn wait_until_ready(&self, mut file: RemoteFile) -> Result<RemoteFile, ServiceError> {
        let started = Instant::now();
        while file.state == STATE_PROCESSING {
            if started.elapsed() >= self.ingest_timeout {
                return Err(ServiceError::IngestFailed(format!(
                    "{} still processing after {:?}",
                    file.name, self.ingest_timeout
                )));
            }
            tokio::time::sleep(self.poll_interval).await;
            match self.get_file(&file.name).await {
                Ok(latest) => file = latest,
                Err(e) if e.is_retryable() => debug!(file = %file.name, "poll rate limited"),
                Err(e) => return Err(e),
            }
        }

        if file.state == STATE_FAILED {
            return Err(ServiceError::IngestFailed("File processing failed".into()));
        }
        Ok(file)
    }

    async fn analyze_uploaded(&self, file: RemoteFile) -> Result<DocumentVerdict, ServiceError> {
        let file = self.wait_until_ready(file).await?;
        let mime_type = if file.mime_type.is_empty() {
            PDF_MIME.to_string()
        } else {
            file.mime_type
        };
        let parts = json!([
            { "text": self.analysis_prompt },
            { "fileData": { "mimeType": mime_type, "fileUri": file.uri } },
        ]);
        let text = self.generate(parts).await?;
        parse_document_verdict(&text)
    }

    /// Delete an uploaded file. Failures are logged, never returned.
    async fn release(&self, name: &str) {
        let result = self
            .http
            .delete(self.endpoint(name))
            .header(API_KEY_HEADER, &self.api_key)
            .send()
            .await;
        match result {
            Ok(response) if response.status().is_success() => {
                debug!(file = %name, "uploaded file deleted");
            }
            Ok(response) => warn!(file = %name, status = %response.status(), "failed to delete uploaded file"),
            Err(e) => warn!(file = %name, error = %e, "failed to delete uploaded file"),
        }
    }
}

impl ClassificationService for GeminiClient {
    #[instrument(skip_all, fields(items = items.len()))]
    async fn classify_batch(&self, items: &[BatchItem]) -> Result<Vec<BatchDecision>, ServiceError> {
        let prompt = render_batch_prompt(&self.screening_prompt, items);
        let text = self.generate(json!([{ "text": prompt }])).await?;
        parse_batch_decisions(&text)
    }

    #[instrument(skip_all, fields(artifact = %artifact.display()))]
    async fn classify_document(&self, artifact: &Path) -> Result<DocumentVerdict, ServiceError> {
        let file = self.upload(artifact).await?;
        let guard = UploadGuard::new(self, file.name.clone());
        let outcome = self.analyze_uploaded(file).await;
        guard.release().await;
        outcome
    }
}

// ---------------------------------------------------------------------------
// Upload guard
// ---------------------------------------------------------------------------

/// Remote file owned by one `classify_document` call.
///
/// [`UploadGuard::release`] deletes it in line. If the guard is dropped
/// first, the delete is spawned on the current runtime.
struct UploadGuard {
    client: GeminiClient,
    name: Option<String>,
}

impl UploadGuard {
    fn new(client: &GeminiClient, name: String) -> Self {
        Self {
            client: client.clone(),
            name: Some(name),
        }
    }

    async fn release(mut self) {
        if let Some(name) = self.name.take() {
            self.client.release(&name).await;
        }
    }
}

impl Drop for UploadGuard {
    fn drop(&mut self) {
        let Some(name) = self.name.take() else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                debug!(file = %name, "classification interrupted, deleting uploaded file");
                let client = self.client.clone();
                handle.spawn(async move { client.release(&name).await });
            }
            Err(_) => warn!(file = %name, "no runtime left to delete uploaded file"),
        }
    }
}

// ---------------------------------------------------------------------------
// Error mapping
// ---------------------------------------------------------------------------

fn transport_error(e: reqwest::Error) -> ServiceError {
    ServiceError::Service(format!("request failed: {e}"))
}

/// Pass successful responses through; map the rest to an error kind.
async fn check_status(response: Response) -> Result<Response, ServiceError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let excerpt: String = body.chars().take(ERROR_BODY_CHARS).collect();
    let message = format!("HTTP {status}: {excerpt}");

    if status == StatusCode::TOO_MANY_REQUESTS || body.contains("RESOURCE_EXHAUSTED") {
        Err(ServiceError::RateLimited(message))
    } else {
        Err(ServiceError::Service(message))
    }
}
