//! Watch one ESP board from the terminal.
//!
//! ```text
//! cargo run --example monitor -- thermal '{"name": "Fan", "ESP_ip": "192.168.0.11"}'
//! cargo run --example monitor -- light '{"name": "Lamp", "valueTriggerLimit": 700}'
//! ```
//!
//! Typing `on` or `off` followed by enter sends a manual command.

use analogreader::{
    AccessoryConfig, AccessoryHandle, ChannelUi, ClientOptions, LightAccessory, ThermalAccessory,
    UiUpdate,
};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let mut args = std::env::args().skip(1);
    let kind = args.next().unwrap_or_else(|| "thermal".to_string());
    let config = match args.next() {
        Some(json) => AccessoryConfig::from_json(&json)?,
        None => AccessoryConfig::new("Monitor"),
    };

    let ui = Arc::new(ChannelUi::new());
    let mut updates = ui.subscribe();

    let accessory: Box<dyn AccessoryHandle> = match kind.as_str() {
        "thermal" => Box::new(ThermalAccessory::start(&config, ClientOptions::default(), ui)?),
        "light" => Box::new(LightAccessory::start(&config, ClientOptions::default(), ui)?),
        other => {
            let msg = format!("unknown accessory kind {other:?}, expected thermal or light");
            return Err(msg.into());
        }
    };

    let info = accessory.info();
    println!(
        "{} ({} {}) as {:?} + {:?}",
        info.name, info.manufacturer, info.model, info.service, info.sensor
    );

    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            update = updates.recv() => match update {
                Ok(UiUpdate::Sensor(value)) => println!("sensor   {value:.2}"),
                Ok(UiUpdate::Actuator(on)) => {
                    println!("actuator {}", if on { "ON" } else { "OFF" })
                }
                Err(e) => println!("update stream: {e}"),
            },
            line = stdin.next_line() => match line?.as_deref().map(str::trim) {
                Some("on") => accessory.set_actuator(true),
                Some("off") => accessory.set_actuator(false),
                Some("") => println!(
                    "sensor {:.2}, actuator {}",
                    accessory.sensor_value(),
                    accessory.actuator_state()
                ),
                Some(other) => println!("unknown command {other:?}"),
                None => break,
            },
        }
    }

    Ok(())
}
