use crate::error::Result;
use serde::{Deserialize, Serialize};

/// Accessory configuration as supplied by the host
///
/// Field names follow the host's config schema. Missing, zero or empty
/// values fall back to the accessory kind's defaults when resolved.
///
/// ```
/// use analogreader::AccessoryConfig;
///
/// let config = AccessoryConfig::from_json(
///     r#"{ "name": "Attic fan", "ESP_ip": "10.0.0.7", "valueTriggerLimit": 28 }"#,
/// ).unwrap();
/// assert_eq!(config.name, "Attic fan");
/// assert_eq!(config.hold_state, None);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AccessoryConfig {
    /// Display name of the actuator service
    #[serde(default)]
    pub name: String,

    /// ESP peer address
    #[serde(rename = "ESP_ip", default, skip_serializing_if = "Option::is_none")]
    pub esp_ip: Option<String>,

    /// Threshold the window average is compared against
    #[serde(
        rename = "valueTriggerLimit",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub value_trigger_limit: Option<f64>,

    /// Number of samples averaged before acting
    #[serde(rename = "holdState", default, skip_serializing_if = "Option::is_none")]
    pub hold_state: Option<usize>,
}

impl AccessoryConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Parse the host's JSON config object
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Parse an already decoded JSON value
    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        Ok(serde_json::from_value(value)?)
    }

    pub fn with_esp_ip(mut self, ip: impl Into<String>) -> Self {
        self.esp_ip = Some(ip.into());
        self
    }

    pub fn with_trigger_limit(mut self, limit: f64) -> Self {
        self.value_trigger_limit = Some(limit);
        self
    }

    pub fn with_hold_state(mut self, samples: usize) -> Self {
        self.hold_state = Some(samples);
        self
    }

    /// Peer address, or `default` when unset or empty
    pub fn esp_ip_or<'a>(&'a self, default: &'a str) -> &'a str {
        self.esp_ip
            .as_deref()
            .filter(|ip| !ip.is_empty())
            .unwrap_or(default)
    }

    /// Threshold, or `default` when unset or zero
    pub fn trigger_limit_or(&self, default: f64) -> f64 {
        self.value_trigger_limit
            .filter(|limit| *limit != 0.0)
            .unwrap_or(default)
    }

    /// Window size, or `default` when unset or zero
    pub fn hold_state_or(&self, default: usize) -> usize {
        self.hold_state.filter(|n| *n != 0).unwrap_or(default)
    }
}
