//! Extracted job record filtering
//!
//! The analysis backend emits placeholder records for pages it could not read.
//! These are dropped before anything is pushed to a spreadsheet.

use crate::error::{ClientError, ClientResult};
use jobscan_common::api::JobRecord;
use serde_json::Value;

/// Job title field
pub const JOB_FIELD: &str = "工作";

/// Fields that make up a usable record
pub const MAIN_FIELDS: [&str; 6] = [JOB_FIELD, "行業", "時間", "薪資", "地點", "聯絡方式"];

/// Value the backend uses for "no information"
pub const NO_INFO: &str = "無資訊";

/// Job titles the backend writes when extraction failed
const PLACEHOLDER_JOBS: [&str; 5] = [
    "未識別到工作資訊",
    "未設置Gemini API密鑰",
    "圖片不存在",
    "獲取描述時出錯",
    "不詳",
];

/// Most main fields allowed to be empty or [`NO_INFO`]
const MAX_EMPTY_MAIN_FIELDS: usize = 3;

/// Whether a record carries enough information to export
pub fn is_valid_record(record: &JobRecord) -> bool {
    match record.get(JOB_FIELD).map(String::as_str) {
        None | Some("") => return false,
        Some(job) if PLACEHOLDER_JOBS.contains(&job) => return false,
        Some(_) => {}
    }

    let empty = MAIN_FIELDS
        .iter()
        .filter(|field| {
            let value = record.get(**field).map(String::as_str).unwrap_or("");
            value.is_empty() || value == NO_INFO
        })
        .count();

    empty <= MAX_EMPTY_MAIN_FIELDS
}

/// Keep only exportable records, preserving order
pub fn filter_valid(records: Vec<JobRecord>) -> Vec<JobRecord> {
    records.into_iter().filter(is_valid_record).collect()
}

/// Parse a JSON array of flat objects into records
///
/// Non-string scalars are stored as their JSON text; `null` becomes empty.
pub fn parse_records(json: &str) -> ClientResult<Vec<JobRecord>> {
    let value: Value = serde_json::from_str(json).map_err(jobscan_common::Error::from)?;
    let items = match value {
        Value::Array(items) => items,
        _ => {
            return Err(ClientError::Common(jobscan_common::Error::InvalidInput(
                "expected a JSON array of records".to_string(),
            )))
        }
    };

    items
        .into_iter()
        .enumerate()
        .map(|(index, item)| match item {
            Value::Object(fields) => Ok(fields
                .into_iter()
                .map(|(key, value)| {
                    let text = match value {
                        Value::String(s) => s,
                        Value::Null => String::new(),
                        other => other.to_string(),
                    };
                    (key, text)
                })
                .collect()),
            _ => Err(ClientError::Common(jobscan_common::Error::InvalidInput(format!(
                "record {} is not an object",
                index
            )))),
        })
        .collect()
}
