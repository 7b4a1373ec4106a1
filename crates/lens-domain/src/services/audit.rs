use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    Recorded,
    ExcludedNotYetListed,
    ExcludedIndeterminate,
    Failed,
    SkippedDuplicate,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::Recorded => "recorded",
            AuditAction::ExcludedNotYetListed => "excluded_not_yet_listed",
            AuditAction::ExcludedIndeterminate => "excluded_indeterminate",
            AuditAction::Failed => "failed",
            AuditAction::SkippedDuplicate => "skipped_duplicate",
        }
    }
}

/// One line of the run audit trail. Every announcement produces exactly one.
#[derive(Debug, Clone, Serialize)]
pub struct AuditEvent {
    pub run_id: String,
    /// Epoch milliseconds when the outcome was decided.
    pub timestamp: i64,
    pub stage: String,
    pub source_exchange: String,
    pub ticker: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
    pub announced_at: i64,
    pub action: AuditAction,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub details: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::{AuditAction, AuditEvent};

    #[test]
    fn serializes_action_in_snake_case_and_skips_empty_fields() {
        let event = AuditEvent {
            run_id: "r1".to_string(),
            timestamp: 1,
            stage: "listing".to_string(),
            source_exchange: "binance".to_string(),
            ticker: "PEPE".to_string(),
            symbol: None,
            announced_at: 60,
            action: AuditAction::ExcludedNotYetListed,
            error: None,
            details: serde_json::json!({}),
        };
        let line = serde_json::to_string(&event).unwrap();
        assert!(line.contains("\"action\":\"excluded_not_yet_listed\""));
        assert!(!line.contains("symbol"));
        assert!(!line.contains("error"));
        assert_eq!(AuditAction::ExcludedNotYetListed.as_str(), "excluded_not_yet_listed");
    }
}
