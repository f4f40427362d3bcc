use serde::Serialize;

/// One append-only record of a validation or scoring attempt, keyed by work
/// item id and attempt timestamp.
#[derive(Debug, Clone, Serialize)]
pub struct AuditEvent {
    pub item_id: String,
    pub attempt_ts: i64,
    pub stage: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub worker: Option<String>,
    pub action: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub details: serde_json::Value,
}
