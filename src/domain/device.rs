use serde::{Deserialize, Serialize};

/// Snapshot of device/app metadata attached to every uploaded document.
///
/// Captured at save time rather than upload time so that a document retried
/// days later still reflects the state under which it was created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceInfo {
    /// Stable per-install identifier, generated once at transport creation.
    pub installation_id: String,
    pub device_name: String,
    pub platform: String,
    pub app_version: String,
}

impl DeviceInfo {
    pub fn capture(installation_id: &str) -> Self {
        let device_name = hostname::get()
            .ok()
            .and_then(|name| name.into_string().ok())
            .unwrap_or_else(|| "unknown".to_string());

        Self {
            installation_id: installation_id.to_string(),
            device_name,
            platform: std::env::consts::OS.to_string(),
            app_version: crate::VERSION.to_string(),
        }
    }
}
