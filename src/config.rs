use crate::error::ConfigError;
use serde::Deserialize;

/// Settings shared by all pages of one application. Missing keys take their defaults.
///
/// ```toml
/// base_path = "/app"
/// heartbeat_interval_ms = 10000
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LiveConfig {
	/// Prefix of all logical paths pushed to the client's history.
	pub base_path: String,
	pub heartbeat_interval_ms: u64,
	pub client_script_src: String,
	/// Markup the client shows while its connection is down.
	pub connection_lost_widget: String,
	pub doc_type: String,
	/// Name of the cookie that carries the device id.
	pub device_id_cookie: String,
}

impl Default for LiveConfig {
	fn default() -> Self {
		Self {
			base_path: "/".to_owned(),
			heartbeat_interval_ms: 5000,
			client_script_src: "/static/live-dom-client.js".to_owned(),
			connection_lost_widget: concat!(
				r#"<div style="position:fixed;z-index:999;width:100%;background-color:lightyellow;text-align:center;padding:0.5em;">"#,
				"Connection lost. Waiting to resume.",
				"</div>"
			)
			.to_owned(),
			doc_type: "<!DOCTYPE html>".to_owned(),
			device_id_cookie: "deviceId".to_owned(),
		}
	}
}

impl LiveConfig {
	/// # Errors
	///
	/// Iff `toml` isn't valid TOML, has keys of the wrong type or unknown keys.
	pub fn from_toml_str(toml: &str) -> Result<Self, ConfigError> {
		Ok(toml::from_str(toml)?)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn missing_keys_take_defaults() {
		let config = LiveConfig::from_toml_str("base_path = \"/app\"\nheartbeat_interval_ms = 10000\n").unwrap();
		assert_eq!(config.base_path, "/app");
		assert_eq!(config.heartbeat_interval_ms, 10_000);
		assert_eq!(config.doc_type, LiveConfig::default().doc_type);
		assert_eq!(LiveConfig::from_toml_str("").unwrap(), LiveConfig::default());
	}

	#[test]
	fn rejects_unknown_keys_and_wrong_types() {
		assert!(LiveConfig::from_toml_str("base_pth = \"/\"").is_err());
		assert!(LiveConfig::from_toml_str("heartbeat_interval_ms = \"soon\"").is_err());
	}
}
