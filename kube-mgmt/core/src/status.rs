use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// The outcome of loading an object's content into the policy engine, as
/// reported back on the object in a status annotation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum SyncStatus {
    Ok,
    Error { error: String },
}

impl SyncStatus {
    pub fn error(message: impl ToString) -> Self {
        Self::Error {
            error: message.to_string(),
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok)
    }

    /// Renders the annotation value.
    pub fn to_annotation(&self) -> String {
        self.to_string()
    }
}

/// Writes the same JSON as `Serialize`, with `status` first.
impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ok => f.write_str(r#"{"status":"ok"}"#),
            Self::Error { error } => write!(
                f,
                r#"{{"status":"error","error":{}}}"#,
                Value::String(error.clone())
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn annotation_values() {
        assert_eq!(SyncStatus::Ok.to_annotation(), r#"{"status":"ok"}"#);
        assert_eq!(
            SyncStatus::error("test error!").to_annotation(),
            r#"{"status":"error","error":"test error!"}"#
        );
    }

    #[test]
    fn error_messages_are_escaped() {
        let status = SyncStatus::error("item1: expected `\"` at line 1\n");
        let value = status.to_annotation();
        assert_eq!(
            value,
            r#"{"status":"error","error":"item1: expected `\"` at line 1\n"}"#
        );
        assert_eq!(serde_json::from_str::<SyncStatus>(&value).unwrap(), status);
    }

    #[test]
    fn parses_annotation_values() {
        let status: SyncStatus =
            serde_json::from_str(r#"{"status":"error","error":"boom"}"#).unwrap();
        assert_eq!(status, SyncStatus::error("boom"));
        assert!(serde_json::from_str::<SyncStatus>(r#"{"status":"ok"}"#)
            .unwrap()
            .is_ok());
    }
}
