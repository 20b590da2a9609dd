//! Wire contracts for the generation backend.
//!
//! Field names follow the documented snake_case wire form; timestamps are
//! RFC 3339 / ISO-8601 strings.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnonymousSessionRequest {
    pub install_id: String,
    pub app_version: String,
    pub platform: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnonymousSessionResponse {
    pub session_token: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreakdownGenerateRequest {
    pub input_text: String,
    pub granularity: i32,
    pub context_hints: Vec<String>,
    pub template_ids: Vec<String>,
}

/// One generated step; substeps nest recursively.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreakdownStep {
    pub title: String,
    #[serde(default)]
    pub substeps: Vec<BreakdownStep>,
}

impl BreakdownStep {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            substeps: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreakdownUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreakdownGenerateResponse {
    pub steps: Vec<BreakdownStep>,
    pub provider: String,
    pub latency_ms: u64,
    pub usage: BreakdownUsage,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageReconcileRequest {
    pub install_id: String,
    pub feature: String,
    pub local_count: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub since: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageReconcileResponse {
    pub server_count: u64,
    pub effective_remaining: i64,
    pub reconciled_at: DateTime<Utc>,
}

/// Error body returned with any non-2xx status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiErrorEnvelope {
    pub error: ApiErrorBody,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiErrorBody {
    pub code: String,
    pub message: String,
    pub request_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde::de::DeserializeOwned;
    use std::fmt::Debug;

    fn roundtrip<T: Serialize + DeserializeOwned + PartialEq + Debug>(value: &T) {
        let encoded = serde_json::to_string(value).unwrap();
        let decoded: T = serde_json::from_str(&encoded).unwrap();
        assert_eq!(&decoded, value);
    }

    #[test]
    fn every_contract_roundtrips() {
        let at = Utc.with_ymd_and_hms(2026, 3, 1, 12, 30, 0).unwrap();
        roundtrip(&AnonymousSessionRequest {
            install_id: "install-1".into(),
            app_version: "1.2.0".into(),
            platform: "ios".into(),
        });
        roundtrip(&AnonymousSessionResponse {
            session_token: "tok".into(),
            expires_at: at,
        });
        roundtrip(&BreakdownGenerateRequest {
            input_text: "Plan trip".into(),
            granularity: 2,
            context_hints: vec!["travel".into()],
            template_ids: vec![],
        });
        roundtrip(&BreakdownGenerateResponse {
            steps: vec![BreakdownStep {
                title: "Book".into(),
                substeps: vec![BreakdownStep::new("Flights")],
            }],
            provider: "openai".into(),
            latency_ms: 120,
            usage: BreakdownUsage {
                input_tokens: 10,
                output_tokens: 20,
            },
        });
        roundtrip(&UsageReconcileRequest {
            install_id: "install-1".into(),
            feature: "breakdown".into(),
            local_count: 4,
            since: Some(at),
        });
        roundtrip(&UsageReconcileResponse {
            server_count: 7,
            effective_remaining: 93,
            reconciled_at: at,
        });
        roundtrip(&ApiErrorEnvelope {
            error: ApiErrorBody {
                code: "quota_exceeded".into(),
                message: "limit".into(),
                request_id: "req-1".into(),
            },
        });
    }

    #[test]
    fn wire_names_are_snake_case() {
        let value = serde_json::to_value(UsageReconcileRequest {
            install_id: "i".into(),
            feature: "breakdown".into(),
            local_count: 1,
            since: None,
        })
        .unwrap();
        assert_eq!(value["install_id"], "i");
        assert_eq!(value["local_count"], 1);
        assert!(value.get("since").is_none());
    }

    #[test]
    fn steps_without_substeps_decode() {
        let decoded: BreakdownStep = serde_json::from_str(r#"{"title":"Only"}"#).unwrap();
        assert!(decoded.substeps.is_empty());
    }

    #[test]
    fn session_expiry_decodes_iso8601() {
        let decoded: AnonymousSessionResponse = serde_json::from_str(
            r#"{"session_token":"abc","expires_at":"2026-03-01T12:30:00Z"}"#,
        )
        .unwrap();
        assert_eq!(
            decoded.expires_at,
            Utc.with_ymd_and_hms(2026, 3, 1, 12, 30, 0).unwrap()
        );
    }
}
