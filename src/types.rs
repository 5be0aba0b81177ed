use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Accessory instance identifier
pub type AccessoryId = Uuid;

/// Raw 10-bit ADC sample as reported by the ESP peer
pub type RawReading = i32;

/// Relay channel identifier (single ASCII digit on the wire)
pub type RelayId = char;

/// TCP port the ESP peer listens on (telnet style, no handshake)
pub const ESP_PORT: u16 = 23;

/// Relay channel driven by both accessory kinds
pub const RELAY_CHANNEL: RelayId = '3';

/// Number of samples averaged before a decision when `holdState` is unset
pub const DEFAULT_HOLD_STATE: usize = 5;

/// Largest value a 10-bit ADC can report
pub const MAX_RAW_READING: RawReading = 1023;

/// Connection lifecycle of a [`LineClient`](crate::LineClient)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// No socket; a reconnect is scheduled
    #[default]
    Disconnected,
    /// Socket connect in progress
    Connecting,
    /// Socket established, lines flow both ways
    Connected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
        };
        f.write_str(s)
    }
}

/// Which side of the threshold switches the actuator on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Polarity {
    /// On when the average is `>=` threshold, off when `<` (fan on heat)
    RisingTurnsOn,
    /// On when the average is `<=` threshold, off when `>` (light on dusk)
    FallingTurnsOn,
}

/// Who asked for an actuator change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// Host UI or cold start
    User,
    /// Control loop decision from averaged readings
    Sensor,
}

/// Host service type the actuator is rendered as
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServiceKind {
    /// Relay drives a fan, switched on when hot
    Fan,
    /// Relay drives a light, switched on when dark
    Lightbulb,
}

/// Host service type the sensor is rendered as
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SensorKind {
    /// Thermistor reading in °C
    TemperatureSensor,
    /// Photoresistor reading in lux
    LightSensor,
}

/// Accessory information shown by the host
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessoryInfo {
    /// Random id assigned when the accessory is created
    pub id: AccessoryId,
    /// Display name from the host configuration
    pub name: String,
    /// Manufacturer string, `TE` or `ME`
    pub manufacturer: String,
    /// Board model string
    pub model: String,
    /// Service the relay is exposed as
    pub service: ServiceKind,
    /// Service the analog reading is exposed as
    pub sensor: SensorKind,
}
