//! Spreadsheet collaborator client
//!
//! Posts `addJobs` requests straight to an Apps Script deployment. Each
//! accepted request creates a new spreadsheet; nothing here retries.

use crate::error::{ClientError, ClientResult};
use jobscan_common::api::{JobRecord, SpreadsheetPayload, SpreadsheetResponse};
use std::time::Duration;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Apps Script `addJobs` client
#[derive(Debug, Clone)]
pub struct SpreadsheetClient {
    http_client: reqwest::Client,
    url: String,
}

impl SpreadsheetClient {
    pub fn new(url: impl Into<String>) -> ClientResult<Self> {
        let url = url.into();
        if url.trim().is_empty() {
            return Err(ClientError::Export("Apps Script URL is required".to_string()));
        }

        let http_client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ClientError::Export(e.to_string()))?;

        Ok(Self {
            http_client,
            url: url.trim().to_string(),
        })
    }

    /// Send records as a new spreadsheet
    pub async fn add_jobs(
        &self,
        process_id: &str,
        jobs: Vec<JobRecord>,
    ) -> ClientResult<SpreadsheetResponse> {
        if jobs.is_empty() {
            return Err(ClientError::Export("No valid job records to export".to_string()));
        }

        let payload = SpreadsheetPayload::add_jobs(process_id, jobs);
        tracing::info!(
            process_id = %process_id,
            jobs = payload.metadata.total_jobs,
            "Sending records to spreadsheet"
        );

        let response = self
            .http_client
            .post(&self.url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ClientError::Export(
                        "Request timed out; check the Apps Script URL".to_string(),
                    )
                } else {
                    ClientError::Export(format!("Network error: {}", e))
                }
            })?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| ClientError::Export(format!("Network error: {}", e)))?;

        if !status.is_success() {
            tracing::warn!(status = status.as_u16(), body = %text, "Spreadsheet endpoint rejected request");
            return Err(ClientError::Export(format!(
                "Spreadsheet endpoint returned {}",
                status.as_u16()
            )));
        }

        // An empty 2xx body still counts as accepted
        if text.trim().is_empty() {
            return Ok(SpreadsheetResponse {
                success: true,
                jobs_added: Some(payload.metadata.total_jobs as u64),
                ..Default::default()
            });
        }

        let body: SpreadsheetResponse = serde_json::from_str(&text)
            .map_err(|e| ClientError::Export(format!("Invalid spreadsheet response: {}", e)))?;

        if !body.success {
            let message = body
                .error
                .clone()
                .or_else(|| body.message.clone())
                .unwrap_or_else(|| "Spreadsheet endpoint reported failure".to_string());
            return Err(ClientError::Export(message));
        }

        tracing::info!(
            process_id = %process_id,
            spreadsheet_url = ?body.spreadsheet_url,
            jobs_added = ?body.jobs_added,
            "Spreadsheet created"
        );
        Ok(body)
    }
}
