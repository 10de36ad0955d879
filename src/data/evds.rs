//! EVDS (CBRT Electronic Data Delivery System) HTTP client.
//!
//! Parameters are embedded in the path (`series=...&startDate=...&type=json`)
//! rather than sent as a query string, and the API key travels in the `key`
//! header. Payload columns are kept in the order the service sends them.

use std::time::Duration;

use reqwest::StatusCode;
use reqwest::blocking::Client;
use serde_json::{Map, Value};

use crate::data::{CatalogClient, FetchError};
use crate::domain::{Category, DateRange, RawTable, SeriesEntry, SubCategory};
use crate::error::AppError;

pub const BASE_URL: &str = "https://evds2.tcmb.gov.tr/service/evds";
pub const API_KEY_VAR: &str = "EVDS_API_KEY";

/// Bookkeeping columns in data payloads that are not series values.
const IGNORED_COLUMNS: [&str; 2] = ["UNIXTIME", "YEARWEEK"];

const MAX_ATTEMPTS: u32 = 4;
const RETRY_BASE_DELAY: Duration = Duration::from_millis(500);

pub struct EvdsClient {
    client: Client,
    api_key: String,
    base_url: String,
}

impl EvdsClient {
    /// Build a client with the key from `EVDS_API_KEY`.
    pub fn from_env(base_url: &str, timeout: Duration) -> Result<Self, AppError> {
        let api_key = std::env::var(API_KEY_VAR)
            .ok()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| AppError::config(format!("Missing {API_KEY_VAR} in environment (.env).")))?;
        Self::new(api_key, base_url, timeout)
    }

    pub fn new(api_key: impl Into<String>, base_url: &str, timeout: Duration) -> Result<Self, AppError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::setup(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            api_key: api_key.into().trim().to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn get_json(&self, endpoint: &str) -> Result<Value, FetchError> {
        let url = format!("{}/{endpoint}", self.base_url);
        let mut attempt = 0;
        loop {
            attempt += 1;
            let resp = self
                .client
                .get(&url)
                .header("key", &self.api_key)
                .send()
                .map_err(|source| FetchError::Request {
                    endpoint: endpoint.to_string(),
                    source,
                })?;

            let status = resp.status();
            if status == StatusCode::TOO_MANY_REQUESTS && attempt < MAX_ATTEMPTS {
                let backoff = RETRY_BASE_DELAY * attempt;
                tracing::debug!(endpoint, attempt, backoff_ms = backoff.as_millis() as u64, "rate limited, retrying");
                std::thread::sleep(backoff);
                continue;
            }
            if !status.is_success() {
                return Err(FetchError::Status {
                    endpoint: endpoint.to_string(),
                    status: status.as_u16(),
                });
            }

            return resp.json().map_err(|e| FetchError::InvalidResponse {
                endpoint: endpoint.to_string(),
                message: e.to_string(),
            });
        }
    }
}

impl CatalogClient for EvdsClient {
    fn categories(&self) -> Result<Vec<Category>, FetchError> {
        let endpoint = "categories/type=json";
        let body = self.get_json(endpoint)?;
        parse_categories(&body).ok_or_else(|| invalid(endpoint, "expected a list of categories"))
    }

    fn sub_categories(&self, category_id: &str) -> Result<Vec<SubCategory>, FetchError> {
        let endpoint = format!("datagroups/mode=2&code={category_id}&type=json");
        let body = self.get_json(&endpoint)?;
        parse_sub_categories(&body).ok_or_else(|| invalid(&endpoint, "expected a list of data groups"))
    }

    fn series(&self, sub_category_code: &str) -> Result<Vec<SeriesEntry>, FetchError> {
        let endpoint = format!("serieList/type=json&code={sub_category_code}");
        let body = self.get_json(&endpoint)?;
        parse_series_list(&body).ok_or_else(|| invalid(&endpoint, "expected a list of series"))
    }

    fn observations(&self, code: &str, range: &DateRange) -> Result<Option<RawTable>, FetchError> {
        let endpoint = format!(
            "series={code}&startDate={}&endDate={}&type=json",
            range.start_param(),
            range.end_param()
        );
        let body = self.get_json(&endpoint)?;
        parse_observations(&endpoint, &body)
    }
}

fn invalid(endpoint: &str, message: &str) -> FetchError {
    FetchError::InvalidResponse {
        endpoint: endpoint.to_string(),
        message: message.to_string(),
    }
}

/// Listings come back either as a bare array or wrapped in `{"items": [...]}`.
fn listing(body: &Value) -> Option<&Vec<Value>> {
    match body {
        Value::Array(items) => Some(items),
        Value::Object(obj) => obj.get("items").and_then(Value::as_array),
        _ => None,
    }
}

fn parse_categories(body: &Value) -> Option<Vec<Category>> {
    let items = listing(body)?;
    Some(
        items
            .iter()
            .filter_map(Value::as_object)
            .map(|obj| {
                let id = field(obj, &["CATEGORY_ID"]);
                let title = field(obj, &["TOPIC_TITLE_TR", "TOPIC_TITLE_ENG"]);
                Category {
                    title: if title.is_empty() { id.clone() } else { title },
                    id,
                }
            })
            .filter(|c| !c.id.is_empty())
            .collect(),
    )
}

fn parse_sub_categories(body: &Value) -> Option<Vec<SubCategory>> {
    let items = listing(body)?;
    Some(
        items
            .iter()
            .filter_map(Value::as_object)
            .map(|obj| {
                let code = field(obj, &["DATAGROUP_CODE"]);
                let name = field(obj, &["DATAGROUP_NAME", "DATAGROUP_NAME_ENG"]);
                SubCategory {
                    name: if name.is_empty() { code.clone() } else { name },
                    code,
                }
            })
            .filter(|s| !s.code.is_empty())
            .collect(),
    )
}

/// Series entries keep blank codes; the harvester decides what to do with them.
fn parse_series_list(body: &Value) -> Option<Vec<SeriesEntry>> {
    let items = listing(body)?;
    Some(
        items
            .iter()
            .filter_map(Value::as_object)
            .map(|obj| SeriesEntry {
                code: field(obj, &["SERIE_CODE"]),
                name: field(obj, &["SERIE_NAME", "SERIE_NAME_ENG"]),
            })
            .collect(),
    )
}

/// Convert a data payload (`{"totalCount": n, "items": [{...}, ...]}`) into a
/// table. Column order follows the first item; keys that only show up later
/// are appended.
///
/// An empty `items` array means no data for the range. A body without one
/// (the service answers some errors with `{"error": ...}` and status 200) is
/// an invalid response.
fn parse_observations(endpoint: &str, body: &Value) -> Result<Option<RawTable>, FetchError> {
    let items = body
        .get("items")
        .and_then(Value::as_array)
        .ok_or_else(|| invalid(endpoint, &format!("expected an `items` array, got {}", excerpt(body))))?;

    let mut columns: Vec<String> = Vec::new();
    for obj in items.iter().filter_map(Value::as_object) {
        for key in obj.keys() {
            if !IGNORED_COLUMNS.contains(&key.as_str()) && !columns.contains(key) {
                columns.push(key.clone());
            }
        }
    }
    if columns.is_empty() {
        return Ok(None);
    }

    let mut table = RawTable::new(columns);
    for obj in items.iter().filter_map(Value::as_object) {
        let row: Vec<String> = table
            .columns
            .iter()
            .map(|col| obj.get(col).map(cell_text).unwrap_or_default())
            .collect();
        table.push_row(row);
    }

    Ok(if table.is_empty() { None } else { Some(table) })
}

/// Short rendering of a response body for error messages.
fn excerpt(body: &Value) -> String {
    const MAX_CHARS: usize = 200;
    let text = body.to_string();
    match text.char_indices().nth(MAX_CHARS) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text,
    }
}

/// First non-empty value among `keys`, as text.
fn field(obj: &Map<String, Value>, keys: &[&str]) -> String {
    keys.iter()
        .filter_map(|k| obj.get(*k))
        .map(cell_text)
        .map(|s| s.trim().to_string())
        .find(|s| !s.is_empty())
        .unwrap_or_default()
}

/// JSON scalar as the raw cell text. Integral floats (`1.0`) print as integers
/// so numeric ids stay stable in paths and URLs.
fn cell_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => match (n.as_i64(), n.as_f64()) {
            (Some(i), _) => i.to_string(),
            (None, Some(f)) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", f as i64),
            _ => n.to_string(),
        },
        other => other.to_string(),
    }
}
