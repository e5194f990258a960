use serde::{Deserialize, Serialize};

/// Format tag carried by every exported exception.
pub const FORMAT_VERSION: &str = "appex/v0.1";

/// Exported form of an exception. Absent fields are not serialized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExceptionJson {
    pub constructor_name: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_code: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
    pub stack: String,
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub causes: Option<Vec<serde_json::Value>>,
    pub timestamp: String,
    pub raw_message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_display_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_wrapper: Option<bool>,
    pub v: String,
}
