//! Build identity reported by the `Version` RPC.

use crate::proto::VersionResponse;

/// KMS API version implemented by this plugin.
pub const API_VERSION: &str = "v1beta1";

/// Runtime name reported to the host.
pub const RUNTIME_NAME: &str = "KeyVault KMS";

/// Build version, overridable at compile time through `KMS_PLUGIN_BUILD_VERSION`.
pub const BUILD_VERSION: &str = match option_env!("KMS_PLUGIN_BUILD_VERSION") {
    Some(version) => version,
    None => env!("CARGO_PKG_VERSION"),
};

/// Static identity fields, fixed at service construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionInfo {
    /// Protocol version
    pub version: String,
    /// Runtime name
    pub runtime_name: String,
    /// Runtime build version
    pub runtime_version: String,
}

impl Default for VersionInfo {
    fn default() -> Self {
        Self {
            version: API_VERSION.to_string(),
            runtime_name: RUNTIME_NAME.to_string(),
            runtime_version: BUILD_VERSION.to_string(),
        }
    }
}

impl From<&VersionInfo> for VersionResponse {
    fn from(info: &VersionInfo) -> Self {
        Self {
            version: info.version.clone(),
            runtime_name: info.runtime_name.clone(),
            runtime_version: info.runtime_version.clone(),
        }
    }
}
