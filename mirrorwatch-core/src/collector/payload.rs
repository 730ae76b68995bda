//! Wire payloads for the collector
//!
//! Both payloads travel as URL-encoded key/value pairs. Structured fields
//! (`logs`, `times`, `pageParams`) are JSON strings inside the form.

use serde::Serialize;

use crate::error::Result;
use crate::timing::PageTimings;
use crate::types::LogEntry;

/// A log flush
#[derive(Debug, Clone, PartialEq)]
pub struct ReportPayload {
    pub system_id: String,
    pub client_origin: String,
    pub client_href: String,
    /// Decycled JSON array of entries
    pub logs: String,
    pub user_info: String,
    pub uuid: String,
    pub user_agent: String,
    /// JSON of [`PageTimings`], first successful report only
    pub times: Option<String>,
}

impl ReportPayload {
    pub fn to_form(&self) -> String {
        let mut pairs: Vec<(&str, &str)> = vec![
            ("systemId", self.system_id.as_str()),
            ("clientOrigin", self.client_origin.as_str()),
            ("clientHref", self.client_href.as_str()),
            ("logs", self.logs.as_str()),
            ("userInfo", self.user_info.as_str()),
            ("uuid", self.uuid.as_str()),
            ("ua", self.user_agent.as_str()),
        ];
        if let Some(times) = &self.times {
            pairs.push(("times", times.as_str()));
        }
        encode_form(&pairs)
    }
}

/// A standalone page-timing record
#[derive(Debug, Clone, PartialEq)]
pub struct PageTimePayload {
    pub system_id: String,
    /// Host part of the page URL
    pub client_origin: String,
    /// Path part of the page URL
    pub client_href: String,
    pub user_info: String,
    pub uuid: String,
    pub user_agent: String,
    pub page_name: String,
    pub page_time_ms: u64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PageParams<'a> {
    page_name: &'a str,
    page_time: u64,
}

impl PageTimePayload {
    pub fn to_form(&self) -> Result<String> {
        let page_params = serde_json::to_string(&PageParams {
            page_name: &self.page_name,
            page_time: self.page_time_ms,
        })?;

        Ok(encode_form(&[
            ("systemId", self.system_id.as_str()),
            ("clientOrigin", self.client_origin.as_str()),
            ("clientHref", self.client_href.as_str()),
            ("userInfo", self.user_info.as_str()),
            ("uuid", self.uuid.as_str()),
            ("ua", self.user_agent.as_str()),
            ("pageParams", page_params.as_str()),
        ]))
    }
}

/// `k=v&k=v` with both sides percent-encoded
pub fn encode_form(pairs: &[(&str, &str)]) -> String {
    pairs
        .iter()
        .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&")
}

/// Serialize the queue into a JSON array.
///
/// Entry messages were already rendered through the decycler at capture
/// time, so the queue itself is a plain tree.
pub fn encode_logs(entries: &[LogEntry]) -> Result<String> {
    Ok(serde_json::to_string(entries)?)
}

pub fn encode_times(times: &PageTimings) -> Result<String> {
    Ok(serde_json::to_string(times)?)
}
