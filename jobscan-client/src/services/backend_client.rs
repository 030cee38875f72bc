//! Processing backend HTTP client
//!
//! Wraps the HTTP calls the client makes against the backend: credential
//! registration, process id allocation, the multipart upload, the spreadsheet
//! export and the results archive download. The backend keeps the
//! registered key in its session cookie, so one client (and one cookie jar)
//! must carry every call of a submission.
//! No application-level timeout is set; the upload can take as long as the
//! backend needs to analyze the batch.

use crate::models::{FileSelection, ProcessId};
use async_trait::async_trait;
use futures::StreamExt;
use jobscan_common::api::{
    CreateProcessIdResponse, ExportRequest, ExportResponse, SetApiKeyResponse, UploadOptions,
};
use reqwest::{multipart, Url};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

const USER_AGENT: &str = concat!("jobscan/", env!("CARGO_PKG_VERSION"));

/// Backend client errors
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Server returned {0}: {1}")]
    Status(u16, String),

    #[error("Rejected by server: {0}")]
    Rejected(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Could not read {0}: {1}")]
    ReadFile(String, String),

    #[error("Could not write {0}: {1}")]
    WriteFile(String, String),
}

/// Calls the upload controller, export bridge and CLI make against the backend
#[async_trait]
pub trait ProcessingBackend: Send + Sync {
    /// `POST /set_api_key`; returns the server's confirmation text
    async fn set_api_key(&self, api_key: &str) -> Result<String, BackendError>;

    /// `POST /create_process_id`
    async fn create_process_id(&self) -> Result<ProcessId, BackendError>;

    /// `POST /upload`; returns the results URL the response resolved to
    ///
    /// The backend answers rejected uploads with a redirect to its index
    /// page, so any final URL outside `/results/` is an error.
    async fn upload(
        &self,
        process_id: &ProcessId,
        files: &FileSelection,
        options: UploadOptions,
    ) -> Result<String, BackendError>;

    /// `POST /send_to_spreadsheet/{process_id}`
    ///
    /// A non-2xx reply whose body still parses is returned with `success`
    /// forced to false so its `error` text reaches the user.
    async fn send_to_spreadsheet(
        &self,
        process_id: &str,
        request: &ExportRequest,
    ) -> Result<ExportResponse, BackendError>;

    /// `GET /download/{process_id}?include=...`, streamed to `dest`
    ///
    /// An empty `include` lets the server pick its default items. The body
    /// lands in a sibling `.part` file renamed over `dest` once complete.
    /// Returns the number of bytes written.
    async fn download_results(
        &self,
        process_id: &str,
        include: &[String],
        dest: &Path,
    ) -> Result<u64, BackendError>;
}

/// reqwest implementation of [`ProcessingBackend`]
#[derive(Debug, Clone)]
pub struct HttpBackend {
    http_client: reqwest::Client,
    base_url: Url,
}

impl HttpBackend {
    pub fn new(base_url: &str) -> Result<Self, BackendError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| BackendError::Parse(format!("invalid server URL {}: {}", base_url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(BackendError::Parse(format!(
                "invalid server URL {}: not a base URL",
                base_url
            )));
        }

        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .cookie_store(true)
            .build()
            .map_err(|e| BackendError::Network(e.to_string()))?;

        Ok(Self {
            http_client,
            base_url,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Base URL with `segments` appended, each one percent-encoded
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }
}

/// Unique sibling of `dest` a download is written to before the rename
fn partial_path(dest: &Path) -> PathBuf {
    let mut name = dest.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(format!(".{}.part", Uuid::new_v4().simple()));
    dest.with_file_name(name)
}

/// Whether `url` is a `.../results/{id}` page
fn is_results_url(url: &Url) -> bool {
    let segments: Vec<&str> = match url.path_segments() {
        Some(segments) => segments.collect(),
        None => return false,
    };
    matches!(segments.as_slice(), [.., "results", id] if !id.is_empty())
}

#[async_trait]
impl ProcessingBackend for HttpBackend {
    async fn set_api_key(&self, api_key: &str) -> Result<String, BackendError> {
        let url = self.endpoint(&["set_api_key"]);
        tracing::debug!(url = %url, "Registering API key");

        let form = multipart::Form::new().text("api_key", api_key.to_string());
        let response = self
            .http_client
            .post(url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| BackendError::Network(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| BackendError::Network(e.to_string()))?;

        match serde_json::from_str::<SetApiKeyResponse>(&text) {
            Ok(body) if body.success && status.is_success() => {
                tracing::info!("API key accepted by server");
                Ok(body.message.unwrap_or_default())
            }
            Ok(body) => Err(BackendError::Rejected(
                body.message
                    .filter(|m| !m.is_empty())
                    .unwrap_or_else(|| format!("API key refused (HTTP {})", status.as_u16())),
            )),
            Err(_) if !status.is_success() => Err(BackendError::Status(status.as_u16(), text)),
            Err(e) => Err(BackendError::Parse(e.to_string())),
        }
    }

    async fn create_process_id(&self) -> Result<ProcessId, BackendError> {
        let url = self.endpoint(&["create_process_id"]);
        tracing::debug!(url = %url, "Requesting process id");

        let response = self
            .http_client
            .post(url)
            .send()
            .await
            .map_err(|e| BackendError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(BackendError::Status(status.as_u16(), error_text));
        }

        let body: CreateProcessIdResponse = response
            .json()
            .await
            .map_err(|e| BackendError::Parse(e.to_string()))?;

        if body.process_id.trim().is_empty() {
            return Err(BackendError::Parse("empty process_id".to_string()));
        }

        tracing::info!(process_id = %body.process_id, "Allocated process id");
        Ok(ProcessId::new(body.process_id))
    }

    async fn upload(
        &self,
        process_id: &ProcessId,
        files: &FileSelection,
        options: UploadOptions,
    ) -> Result<String, BackendError> {
        let mut form = multipart::Form::new();
        for file in files.files() {
            let bytes = file
                .read_bytes()
                .await
                .map_err(|e| BackendError::ReadFile(file.name.clone(), e.to_string()))?;
            let part = multipart::Part::bytes(bytes)
                .file_name(file.name.clone())
                .mime_str(&file.mime_type)
                .map_err(|e| BackendError::Parse(e.to_string()))?;
            form = form.part("files", part);
        }
        form = form
            .text("auto_rotate", options.auto_rotate.to_string())
            .text("parallel_process", options.parallel_process.to_string())
            .text("process_id", process_id.to_string());

        let url = self.endpoint(&["upload"]);
        tracing::info!(
            process_id = %process_id,
            files = files.len(),
            bytes = files.total_bytes(),
            auto_rotate = options.auto_rotate,
            parallel_process = options.parallel_process,
            "Uploading files"
        );

        let response = self
            .http_client
            .post(url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| BackendError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(BackendError::Status(status.as_u16(), error_text));
        }

        let final_url = response.url().clone();
        if !is_results_url(&final_url) {
            tracing::warn!(process_id = %process_id, url = %final_url, "Upload redirected away from results");
            return Err(BackendError::Rejected(format!(
                "upload redirected to {} instead of the results page",
                final_url
            )));
        }

        Ok(final_url.to_string())
    }

    async fn send_to_spreadsheet(
        &self,
        process_id: &str,
        request: &ExportRequest,
    ) -> Result<ExportResponse, BackendError> {
        let url = self.endpoint(&["send_to_spreadsheet", process_id]);
        tracing::debug!(process_id = %process_id, url = %url, "Requesting spreadsheet export");

        let response = self
            .http_client
            .post(url)
            .json(request)
            .send()
            .await
            .map_err(|e| BackendError::Network(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| BackendError::Network(e.to_string()))?;

        match serde_json::from_str::<ExportResponse>(&text) {
            Ok(mut body) => {
                if !status.is_success() {
                    body.success = false;
                }
                Ok(body)
            }
            Err(_) if !status.is_success() => Err(BackendError::Status(status.as_u16(), text)),
            Err(e) => Err(BackendError::Parse(e.to_string())),
        }
    }

    async fn download_results(
        &self,
        process_id: &str,
        include: &[String],
        dest: &Path,
    ) -> Result<u64, BackendError> {
        let url = self.endpoint(&["download", process_id]);
        let query: Vec<(&str, &str)> = include.iter().map(|item| ("include", item.as_str())).collect();
        tracing::info!(process_id = %process_id, include = ?include, dest = %dest.display(), "Downloading results");

        let response = self
            .http_client
            .get(url)
            .query(&query)
            .send()
            .await
            .map_err(|e| BackendError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(BackendError::Status(status.as_u16(), error_text));
        }

        let partial = partial_path(dest);
        let write_error =
            |e: std::io::Error| BackendError::WriteFile(dest.display().to_string(), e.to_string());
        let mut file = tokio::fs::File::create(&partial).await.map_err(write_error)?;
        let mut body = response.bytes_stream();
        let mut written = 0u64;

        let copied = async {
            while let Some(chunk) = body.next().await {
                let chunk = chunk.map_err(|e| BackendError::Network(e.to_string()))?;
                file.write_all(&chunk).await.map_err(write_error)?;
                written += chunk.len() as u64;
            }
            file.flush().await.map_err(write_error)
        }
        .await;
        drop(file);

        let finished = match copied {
            Ok(()) => tokio::fs::rename(&partial, dest).await.map_err(write_error),
            Err(e) => Err(e),
        };
        if let Err(e) = finished {
            if let Err(remove) = tokio::fs::remove_file(&partial).await {
                tracing::warn!(error = %remove, path = %partial.display(), "Could not remove partial download");
            }
            return Err(e);
        }

        tracing::info!(process_id = %process_id, bytes = written, "Results archive saved");
        Ok(written)
    }
}
