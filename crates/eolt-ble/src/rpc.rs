//! JSON-RPC messages carried over a streaming link
//!
//! One JSON object per line in each direction; responses are matched to
//! requests by `id`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Request sent to the peer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    /// Protocol version, always `"2.0"`
    pub jsonrpc: String,
    /// Request identifier
    pub id: u32,
    /// Method name
    pub method: String,
    /// Method parameters
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub params: Value,
}

impl Request {
    /// Build a request
    pub fn new(id: u32, method: &str, params: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            method: method.to_string(),
            params,
        }
    }
}

/// Error object of a failed call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcError {
    /// Error code
    pub code: i64,
    /// Message
    pub message: String,
}

/// Response from the peer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    /// Identifier of the request answered
    pub id: u32,
    /// Result on success
    #[serde(default)]
    pub result: Option<Value>,
    /// Error on failure
    #[serde(default)]
    pub error: Option<RpcError>,
}

/// `GetSystemInfo` result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemInfo {
    /// Hardware version string
    #[serde(rename = "HardwareVersion")]
    pub hardware_version: String,
    /// Firmware version string
    #[serde(rename = "SoftwareVersion")]
    pub software_version: String,
    /// Unit serial number
    #[serde(rename = "SerialID")]
    pub serial_id: String,
}
