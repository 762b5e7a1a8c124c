use chrono::NaiveDateTime;
use serde::Deserialize;
use serde_json::Value;

use crate::modules::collect_info;
use crate::modules::error::ExportError;

// dateCreated arrives in one of two shapes depending on whether the SDK
// recorded sub-second precision; they are tried in this order
const ACCEPTED_TIMESTAMP_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.fZ", "%Y-%m-%dT%H:%M:%SZ"];

// Raw event object from the events listing endpoint. Only the fields the
// export needs are decoded; everything else in the payload is ignored,
// except `entries` which is kept as raw JSON for the stack frame walk.
#[derive(Debug, Clone, Deserialize)]
pub struct SentryEvent {

    #[serde(rename = "groupID")]
    pub group_id: String,

    #[serde(rename = "eventID")]
    pub event_id: String,

    #[serde(rename = "projectID")]
    pub project_id: String,

    #[serde(rename = "type")]
    pub event_type: String,

    // Nullable upstream, depending on platform and event kind
    pub title: Option<String>,

    pub message: Option<String>,

    pub platform: Option<String>,

    pub culprit: Option<String>,

    #[serde(rename = "dateCreated")]
    pub date_created: String,

    // Ordered interface entries; the threads entry holds the stack frames
    pub entries: Vec<Value>,
}

// One CSV row: top-level event fields plus the fields pulled out of the
// collect info payload
#[derive(Debug, Clone)]
pub struct FlatRecord {
    pub issue_id: String,
    pub event_id: String,
    pub project_id: String,
    pub event_type: String,
    pub title: Option<String>,
    pub message: Option<String>,
    pub platform: Option<String>,
    pub culprit: Option<String>,
    pub created_at: String,
    pub collect_id: Option<String>,
    pub kind_of_material: Option<String>,
    pub type_of_packaging: Option<String>,
    pub hauler_cnpj: Option<String>,
    pub receiver_cnpj: Option<String>,
    pub sentry_url: String,
}

impl FlatRecord {
    pub fn from_event(
        event: SentryEvent,
        organization_id: &str,
        web_base_url: &str,
    ) -> Result<Self, ExportError> {
        let collect_info = collect_info::extract_collect_info(&event.entries);
        let created_at = format_timestamp(&event.date_created)?;
        let sentry_url = format!(
            "{}/organizations/{}/issues/{}/events/{}/?project={}",
            web_base_url, organization_id, event.group_id, event.event_id, event.project_id
        );

        Ok(Self {
            issue_id: event.group_id,
            event_id: event.event_id,
            project_id: event.project_id,
            event_type: event.event_type,
            title: event.title,
            message: event.message,
            platform: event.platform,
            culprit: event.culprit,
            created_at,
            collect_id: scalar_field(&collect_info, "id"),
            kind_of_material: scalar_field(&collect_info, "material"),
            type_of_packaging: scalar_field(&collect_info, "packaging"),
            hauler_cnpj: document_digits(&collect_info, "hauler"),
            receiver_cnpj: document_digits(&collect_info, "receiver"),
            sentry_url,
        })
    }
}

// Parse dateCreated and reformat it as `YYYY-MM-DD HH:MM:SS.ffffff` in UTC
fn format_timestamp(raw: &str) -> Result<String, ExportError> {
    let parsed = ACCEPTED_TIMESTAMP_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
        .ok_or_else(|| ExportError::TimestampParse(raw.to_string()))?;

    Ok(parsed.format("%Y-%m-%d %H:%M:%S%.6f").to_string())
}

// Read a scalar from the collect info mapping; null and missing become None,
// non-string scalars keep their JSON rendering
fn scalar_field(collect_info: &Value, key: &str) -> Option<String> {
    match collect_info.get(key) {
        Some(Value::String(s)) => Some(s.clone()),
        Some(Value::Null) | None => None,
        Some(other) => Some(other.to_string()),
    }
}

// The hauler/receiver documents are formatted CNPJ numbers; the export keeps
// the digits only
fn document_digits(collect_info: &Value, party: &str) -> Option<String> {
    collect_info
        .get(party)
        .and_then(|sub| sub.get("document"))
        .and_then(Value::as_str)
        .map(|document| document.chars().filter(|c| c.is_ascii_digit()).collect())
}
