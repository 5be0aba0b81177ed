//! Rust library bridging smart-home accessories to ESP analog controllers
//!
//! The ESP boards expose one analog sensor and a relay over a plain TCP
//! line protocol on port 23. This library keeps a connection to each board,
//! turns the raw samples into physical units and switches the relay when a
//! rolling average crosses a threshold. It supports:
//!
//! - A thermistor board driving a fan (°C, on when hot)
//! - A photoresistor board driving a light (lux, on when dark)
//! - Automatic reconnection with a fixed one second delay
//! - Manual override from the host UI
//! - Pushed sensor and actuator updates for rendering
//!
//! # Quick Start
//!
//! ```no_run
//! use analogreader::{
//!     AccessoryConfig, AccessoryHandle, ChannelUi, ClientOptions, LightAccessory, UiUpdate,
//! };
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = AccessoryConfig::from_json(
//!         r#"{ "name": "Porch light", "ESP_ip": "192.168.0.10", "valueTriggerLimit": 700 }"#,
//!     )?;
//!
//!     let ui = Arc::new(ChannelUi::new());
//!     let mut updates = ui.subscribe();
//!     let light = LightAccessory::start(&config, ClientOptions::default(), ui)?;
//!
//!     while let Ok(update) = updates.recv().await {
//!         match update {
//!             UiUpdate::Sensor(lux) => println!("{lux:.0} lux"),
//!             UiUpdate::Actuator(on) => println!("light on: {on}"),
//!         }
//!     }
//!
//!     light.set_actuator(false);
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! - **Accessory**: wires one client to one controller, host-facing traits
//! - **Controller**: sliding window average and threshold hysteresis
//! - **Convert**: thermistor and photoresistor equations
//! - **Connection**: reconnecting line-oriented TCP client
//! - **Protocol**: wire line decoding and relay commands
//! - **Config**: host-supplied accessory configuration

mod accessory;
mod config;
mod connection;
mod controller;
mod convert;
mod error;
mod framing;
mod protocol;
mod subscription;
mod types;

// Public exports
pub use accessory::{
    Accessory, AccessoryHandle, ChannelUi, HostUi, Light, LightAccessory, NullUi, SensorProfile,
    Thermal, ThermalAccessory,
};
pub use config::AccessoryConfig;
pub use connection::{ClientOptions, LineClient};
pub use controller::{
    ActuatorState, ControllerConfig, HysteresisController, Outcome, RelayOutput, SlidingWindow,
};
pub use convert::{to_celsius, to_lux};
pub use error::{ReaderError, Result};
pub use protocol::{decode, encode_relay, DeviceLine, RELAY_OFF, RELAY_ON};
pub use subscription::{ClientEvent, EventReceiver, Subscription, UiUpdate, UpdateReceiver};
pub use types::{
    AccessoryId, AccessoryInfo, ConnectionState, Origin, Polarity, RawReading, RelayId,
    SensorKind, ServiceKind, DEFAULT_HOLD_STATE, ESP_PORT, MAX_RAW_READING, RELAY_CHANNEL,
};
