//! Accessories: one ESP peer, one client, one controller.
//!
//! An [`Accessory`] wires the pieces together. Lines from the
//! [`LineClient`] are decoded, converted by the accessory's
//! [`SensorProfile`], fed to its [`HysteresisController`], and the results
//! pushed to the host through [`HostUi`]. The host drives the accessory
//! through [`AccessoryHandle`].

use crate::config::AccessoryConfig;
use crate::connection::{ClientOptions, LineClient};
use crate::controller::{
    ActuatorState, ControllerConfig, HysteresisController, Outcome, RelayOutput,
};
use crate::convert::{to_celsius, to_lux};
use crate::error::{ReaderError, Result};
use crate::protocol::{decode, DeviceLine};
use crate::subscription::{ClientEvent, EventReceiver, UiUpdate, UpdateReceiver};
use crate::types::{
    AccessoryInfo, ConnectionState, Origin, Polarity, RawReading, SensorKind, ServiceKind,
    DEFAULT_HOLD_STATE, ESP_PORT, RELAY_CHANNEL,
};
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::Instrument;
use uuid::Uuid;

/// Sensor value reported before the first reading arrives
const INITIAL_SENSOR_VALUE: f64 = 1.0;

/// Per-variant behavior of an accessory
pub trait SensorProfile: Send + Sync + 'static {
    /// Short tag used in logs
    const TAG: &'static str;
    const DEFAULT_HOST: &'static str;
    const DEFAULT_TRIGGER_LIMIT: f64;
    const POLARITY: Polarity;
    const MANUFACTURER: &'static str;
    const MODEL: &'static str;
    const SERVICE: ServiceKind;
    const SENSOR: SensorKind;

    /// Convert a raw ADC sample to the unit the threshold is expressed in
    fn convert(raw: RawReading) -> f64;
}

/// Thermistor sensor driving a fan, threshold in °C
#[derive(Debug, Clone, Copy)]
pub struct Thermal;

impl SensorProfile for Thermal {
    const TAG: &'static str = "THERM";
    const DEFAULT_HOST: &'static str = "192.168.0.11";
    const DEFAULT_TRIGGER_LIMIT: f64 = 30.0;
    const POLARITY: Polarity = Polarity::RisingTurnsOn;
    const MANUFACTURER: &'static str = "TE";
    const MODEL: &'static str = "SmartThermistor T1";
    const SERVICE: ServiceKind = ServiceKind::Fan;
    const SENSOR: SensorKind = SensorKind::TemperatureSensor;

    fn convert(raw: RawReading) -> f64 {
        to_celsius(raw)
    }
}

/// Photoresistor sensor driving a light, threshold in lux
#[derive(Debug, Clone, Copy)]
pub struct Light;

impl SensorProfile for Light {
    const TAG: &'static str = "LIGHT";
    const DEFAULT_HOST: &'static str = "192.168.0.10";
    const DEFAULT_TRIGGER_LIMIT: f64 = 3000.0;
    const POLARITY: Polarity = Polarity::FallingTurnsOn;
    const MANUFACTURER: &'static str = "ME";
    const MODEL: &'static str = "SmartLED M1";
    const SERVICE: ServiceKind = ServiceKind::Lightbulb;
    const SENSOR: SensorKind = SensorKind::LightSensor;

    fn convert(raw: RawReading) -> f64 {
        to_lux(raw)
    }
}

/// Host-side sink for characteristic updates.
///
/// Calls are fire-and-forget: errors are logged by the accessory and never
/// interrupt the control loop.
pub trait HostUi: Send + Sync {
    fn update_sensor(&self, value: f64) -> Result<()>;
    fn update_actuator(&self, on: bool) -> Result<()>;
}

/// UI sink that discards every update
#[derive(Debug, Clone, Copy, Default)]
pub struct NullUi;

impl HostUi for NullUi {
    fn update_sensor(&self, _value: f64) -> Result<()> {
        Ok(())
    }

    fn update_actuator(&self, _on: bool) -> Result<()> {
        Ok(())
    }
}

/// UI sink that broadcasts updates to subscribers
#[derive(Debug, Clone)]
pub struct ChannelUi {
    tx: broadcast::Sender<UiUpdate>,
}

impl ChannelUi {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(100);
        Self { tx }
    }

    pub fn subscribe(&self) -> UpdateReceiver {
        UpdateReceiver::new(self.tx.subscribe())
    }

    fn publish(&self, update: UiUpdate) -> Result<()> {
        self.tx
            .send(update)
            .map(|_| ())
            .map_err(|_| ReaderError::Ui("no UI subscribers".to_string()))
    }
}

impl Default for ChannelUi {
    fn default() -> Self {
        Self::new()
    }
}

impl HostUi for ChannelUi {
    fn update_sensor(&self, value: f64) -> Result<()> {
        self.publish(UiUpdate::Sensor(value))
    }

    fn update_actuator(&self, on: bool) -> Result<()> {
        self.publish(UiUpdate::Actuator(on))
    }
}

/// What the host framework needs from an accessory
pub trait AccessoryHandle: Send + Sync {
    fn info(&self) -> &AccessoryInfo;

    /// Actuator state as last commanded or echoed by the hardware
    fn actuator_state(&self) -> bool;

    /// Manual actuator command from the UI
    fn set_actuator(&self, on: bool);

    /// Most recent converted sensor value
    fn sensor_value(&self) -> f64;
}

struct AccessoryState {
    controller: HysteresisController,
    sensor_value: f64,
}

/// Line handling shared by the accessory's tasks
struct Pipeline<P, R> {
    state: Arc<Mutex<AccessoryState>>,
    relay: Arc<R>,
    ui: Arc<dyn HostUi>,
    _profile: PhantomData<P>,
}

impl<P: SensorProfile, R: RelayOutput> Pipeline<P, R> {
    fn new(controller: HysteresisController, relay: Arc<R>, ui: Arc<dyn HostUi>) -> Self {
        Self {
            state: Arc::new(Mutex::new(AccessoryState {
                controller,
                sensor_value: INITIAL_SENSOR_VALUE,
            })),
            relay,
            ui,
            _profile: PhantomData,
        }
    }

    fn handle_line(&self, line: &str) {
        match decode(line) {
            Some(DeviceLine::Blank) => {}
            Some(DeviceLine::Reading { raw }) => self.handle_reading(raw),
            Some(DeviceLine::RelayEcho { relay, state }) if relay == RELAY_CHANNEL => {
                tracing::debug!(state, "relay echo");
                lock(&self.state).controller.apply_echo(state);
            }
            Some(DeviceLine::RelayEcho { relay, .. }) => {
                tracing::trace!(%relay, "ignoring echo for other relay");
            }
            None => tracing::trace!("ignoring line {:?}", line),
        }
    }

    fn handle_reading(&self, raw: RawReading) {
        let value = P::convert(raw);
        lock(&self.state).sensor_value = value;

        // the sensor characteristic only; the actuator is never touched here
        if let Err(e) = self.ui.update_sensor(value) {
            tracing::warn!("sensor UI update failed: {}", e);
        }

        let outcome = lock(&self.state)
            .controller
            .process_value(value, self.relay.as_ref());

        if let Outcome::Tracking { state, .. } = outcome {
            if let Err(e) = self.ui.update_actuator(state) {
                tracing::warn!("actuator UI update failed: {}", e);
            }
        }
    }

    fn set_actuator(&self, on: bool) {
        lock(&self.state)
            .controller
            .set_actuator(on, Origin::User, self.relay.as_ref());
    }
}

impl<P, R> Clone for Pipeline<P, R> {
    fn clone(&self) -> Self {
        Self {
            state: self.state.clone(),
            relay: self.relay.clone(),
            ui: self.ui.clone(),
            _profile: PhantomData,
        }
    }
}

/// A running accessory bound to one ESP peer
///
/// # Example
///
/// ```no_run
/// use analogreader::{AccessoryConfig, AccessoryHandle, ClientOptions, NullUi, ThermalAccessory};
/// use std::sync::Arc;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let config = AccessoryConfig::new("Attic fan").with_esp_ip("192.168.0.11");
///     let fan = ThermalAccessory::start(&config, ClientOptions::default(), Arc::new(NullUi))?;
///
///     tokio::time::sleep(std::time::Duration::from_secs(10)).await;
///     println!("{:.1}°C, fan on: {}", fan.sensor_value(), fan.actuator_state());
///     Ok(())
/// }
/// ```
pub struct Accessory<P: SensorProfile> {
    info: AccessoryInfo,
    client: Arc<LineClient>,
    pipeline: Pipeline<P, LineClient>,
    dropped: Arc<AtomicU64>,
    tasks: Vec<JoinHandle<()>>,
}

/// Fan controlled by a thermistor
pub type ThermalAccessory = Accessory<Thermal>;

/// Light controlled by a photoresistor
pub type LightAccessory = Accessory<Light>;

impl<P: SensorProfile> Accessory<P> {
    /// Build the accessory and start connecting to its peer on port 23.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(
        config: &AccessoryConfig,
        options: ClientOptions,
        ui: Arc<dyn HostUi>,
    ) -> Result<Self> {
        let host = config.esp_ip_or(P::DEFAULT_HOST);
        let client = LineClient::new(host, ESP_PORT, options);
        Self::with_client(config, client, ui)
    }

    /// Build the accessory around an existing, not yet connected client.
    ///
    /// The client's address takes precedence over `ESP_ip`.
    pub fn with_client(
        config: &AccessoryConfig,
        client: LineClient,
        ui: Arc<dyn HostUi>,
    ) -> Result<Self> {
        let controller_config = ControllerConfig::new(
            config.trigger_limit_or(P::DEFAULT_TRIGGER_LIMIT),
            config.hold_state_or(DEFAULT_HOLD_STATE),
            P::POLARITY,
        )?;

        let info = AccessoryInfo {
            id: Uuid::new_v4(),
            name: config.name.clone(),
            manufacturer: P::MANUFACTURER.to_string(),
            model: P::MODEL.to_string(),
            service: P::SERVICE,
            sensor: P::SENSOR,
        };

        let client = Arc::new(client);
        let pipeline = Pipeline::new(
            HysteresisController::new(controller_config),
            client.clone(),
            ui,
        );

        let span = tracing::info_span!("accessory", tag = P::TAG, name = %info.name);
        span.in_scope(|| {
            tracing::info!(
                host = client.host(),
                port = client.port(),
                threshold = controller_config.threshold,
                window = controller_config.window_size,
                "starting TCP client"
            );
        });

        let dropped = Arc::new(AtomicU64::new(0));
        let (gate_tx, gate_rx) = mpsc::channel(1);
        let events = client.subscribe();

        let tasks = vec![
            tokio::spawn(forward_events(events, gate_tx, dropped.clone()).instrument(span.clone())),
            tokio::spawn(process_lines(gate_rx, pipeline.clone()).instrument(span)),
        ];
        client.connect();

        Ok(Self {
            info,
            client,
            pipeline,
            dropped,
            tasks,
        })
    }

    /// Stop processing and close the connection
    pub async fn stop(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
        self.client.stop().await;
    }

    pub fn client(&self) -> &LineClient {
        &self.client
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.client.state()
    }

    /// Relay and override state
    pub fn controller_state(&self) -> ActuatorState {
        lock(&self.pipeline.state).controller.state()
    }

    /// Current window average, `None` while the window is filling
    pub fn last_average(&self) -> Option<f64> {
        lock(&self.pipeline.state).controller.last_average()
    }

    /// Lines dropped because the previous line was still being processed
    pub fn dropped_lines(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl<P: SensorProfile> AccessoryHandle for Accessory<P> {
    fn info(&self) -> &AccessoryInfo {
        &self.info
    }

    fn actuator_state(&self) -> bool {
        let on = lock(&self.pipeline.state).controller.actuator_state();
        tracing::debug!(tag = P::TAG, on, "actuator state GET");
        on
    }

    fn set_actuator(&self, on: bool) {
        self.pipeline.set_actuator(on);
    }

    fn sensor_value(&self) -> f64 {
        lock(&self.pipeline.state).sensor_value
    }
}

impl<P: SensorProfile> Drop for Accessory<P> {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

/// Pass lines into the single-slot gate, dropping them while it is full
async fn forward_events(
    mut events: EventReceiver,
    gate: mpsc::Sender<String>,
    dropped: Arc<AtomicU64>,
) {
    loop {
        match events.recv().await {
            Ok(ClientEvent::Line(line)) => match gate.try_send(line) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(line)) => {
                    dropped.fetch_add(1, Ordering::Relaxed);
                    tracing::debug!("busy, dropping {:?}", line);
                }
                Err(mpsc::error::TrySendError::Closed(_)) => break,
            },
            Ok(ClientEvent::Connected) => tracing::info!("peer connected"),
            Ok(ClientEvent::Disconnected) => tracing::info!("peer disconnected"),
            Err(_) => break,
        }
    }
}

async fn process_lines<P: SensorProfile, R: RelayOutput>(
    mut gate: mpsc::Receiver<String>,
    pipeline: Pipeline<P, R>,
) {
    while let Some(line) = gate.recv().await {
        pipeline.handle_line(&line);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;

    #[derive(Default)]
    struct FakeRelay {
        offline: AtomicBool,
        sent: Mutex<Vec<String>>,
    }

    impl RelayOutput for FakeRelay {
        fn is_connected(&self) -> bool {
            !self.offline.load(Ordering::Relaxed)
        }

        fn send_line(&self, line: &str) {
            self.sent.lock().unwrap().push(line.to_string());
        }
    }

    struct Harness<P> {
        pipeline: Pipeline<P, FakeRelay>,
        relay: Arc<FakeRelay>,
        updates: UpdateReceiver,
    }

    impl<P: SensorProfile> Harness<P> {
        fn new(threshold: f64, window_size: usize) -> Self {
            let config = ControllerConfig::new(threshold, window_size, P::POLARITY).unwrap();
            let relay = Arc::new(FakeRelay::default());
            let ui = ChannelUi::new();
            let updates = ui.subscribe();
            let controller = HysteresisController::new(config);
            let pipeline = Pipeline::new(controller, relay.clone(), Arc::new(ui));
            Self {
                pipeline,
                relay,
                updates,
            }
        }

        fn sent(&self) -> Vec<String> {
            self.relay.sent.lock().unwrap().clone()
        }

        fn drain_updates(&mut self) -> Vec<UiUpdate> {
            let mut out = Vec::new();
            while let Ok(Some(update)) = self.updates.try_recv() {
                out.push(update);
            }
            out
        }

        fn controller(&self) -> ActuatorState {
            lock(&self.pipeline.state).controller.state()
        }

        fn sensor_value(&self) -> f64 {
            lock(&self.pipeline.state).sensor_value
        }
    }

    #[test]
    fn sensor_value_starts_at_one() {
        let harness = Harness::<Thermal>::new(30.0, 3);
        assert_eq!(harness.sensor_value(), 1.0);
    }

    #[test]
    fn first_reading_only_forces_relay_off() {
        let mut harness = Harness::<Thermal>::new(30.0, 3);
        harness.pipeline.handle_line("AV100");

        assert_eq!(harness.sent(), vec!["R30\n"]);
        assert_eq!(harness.drain_updates(), vec![UiUpdate::Sensor(100.0)]);
        assert_eq!(harness.sensor_value(), 100.0);
    }

    #[test]
    fn hot_readings_turn_the_fan_on() {
        let mut harness = Harness::<Thermal>::new(30.0, 3);
        for _ in 0..4 {
            // 929 is just above 30°C
            harness.pipeline.handle_line("AV929 5.0");
        }

        assert_eq!(harness.sent(), vec!["R30\n", "R31\n"]);
        assert!(harness.controller().current_state);
        let updates = harness.drain_updates();
        assert_eq!(updates.last(), Some(&UiUpdate::Actuator(true)));
        assert_eq!(
            updates
                .iter()
                .filter(|u| matches!(u, UiUpdate::Sensor(_)))
                .count(),
            4
        );
    }

    #[test]
    fn cool_readings_keep_the_fan_off() {
        let mut harness = Harness::<Thermal>::new(30.0, 2);
        for _ in 0..3 {
            harness.pipeline.handle_line("AV930");
        }
        assert_eq!(harness.sent(), vec!["R30\n"]);
        assert_eq!(
            harness.drain_updates().last(),
            Some(&UiUpdate::Actuator(false))
        );
    }

    #[test]
    fn dark_readings_turn_the_light_on() {
        let harness = Harness::<Light>::new(3000.0, 2);
        for _ in 0..3 {
            harness.pipeline.handle_line("AV100");
        }
        assert_eq!(harness.sent(), vec!["R30\n", "R31\n"]);
    }

    #[test]
    fn relay_echo_mirrors_hardware() {
        let harness = Harness::<Light>::new(3000.0, 2);
        harness.pipeline.handle_line("R31");
        assert!(harness.controller().current_state);
        harness.pipeline.handle_line("R30");
        assert!(!harness.controller().current_state);
    }

    #[test]
    fn echo_during_manual_hold_keeps_the_hold() {
        let harness = Harness::<Thermal>::new(30.0, 3);
        harness.pipeline.handle_line("AV930");
        harness.pipeline.set_actuator(true);
        harness.pipeline.handle_line("AV1000");

        harness.pipeline.handle_line("R30");
        assert!(!harness.controller().current_state);
        assert!(harness.controller().user_override);
        assert_eq!(lock(&harness.pipeline.state).controller.window().len(), 1);

        harness.pipeline.handle_line("R31");
        assert!(harness.controller().current_state);
        assert!(harness.controller().user_override);
        assert_eq!(harness.sent(), vec!["R30\n", "R31\n"]);
    }

    #[test]
    fn echo_for_other_relay_is_ignored() {
        let harness = Harness::<Light>::new(3000.0, 2);
        harness.pipeline.handle_line("R21");
        assert!(!harness.controller().current_state);
    }

    #[test]
    fn blank_and_unknown_lines_change_nothing() {
        let mut harness = Harness::<Thermal>::new(30.0, 1);
        for line in ["", "\r", "\n", "X99", "hello"] {
            harness.pipeline.handle_line(line);
        }
        assert!(harness.sent().is_empty());
        assert!(harness.drain_updates().is_empty());
        assert_eq!(harness.sensor_value(), 1.0);
    }

    #[test]
    fn manual_set_overrides_the_loop() {
        let harness = Harness::<Thermal>::new(30.0, 1);
        harness.pipeline.handle_line("AV930");
        harness.pipeline.set_actuator(true);
        assert!(harness.controller().user_override);

        for _ in 0..5 {
            harness.pipeline.handle_line("AV1000");
        }
        assert!(harness.controller().current_state);
        assert_eq!(harness.sent(), vec!["R30\n", "R31\n"]);
    }

    #[test]
    fn manual_set_while_offline_is_dropped() {
        let harness = Harness::<Thermal>::new(30.0, 1);
        harness.relay.offline.store(true, Ordering::Relaxed);
        harness.pipeline.set_actuator(true);

        assert!(harness.sent().is_empty());
        assert!(!harness.controller().current_state);
        assert!(harness.controller().user_override);
    }

    #[tokio::test]
    async fn burst_keeps_one_pending_line_and_drops_the_rest() {
        let (tx, rx) = broadcast::channel(16);
        let (gate_tx, mut gate_rx) = mpsc::channel(1);
        let dropped = Arc::new(AtomicU64::new(0));

        tx.send(ClientEvent::Connected).unwrap();
        for line in ["AV1", "AV2", "AV3"] {
            tx.send(ClientEvent::Line(line.to_string())).unwrap();
        }
        drop(tx);

        forward_events(EventReceiver::new(rx), gate_tx, dropped.clone()).await;

        assert_eq!(dropped.load(Ordering::Relaxed), 2);
        assert_eq!(gate_rx.recv().await.as_deref(), Some("AV1"));
        assert_eq!(gate_rx.recv().await, None);
    }

    #[test]
    fn channel_ui_without_subscribers_reports_error() {
        let ui = ChannelUi::new();
        assert!(matches!(ui.update_sensor(1.0), Err(ReaderError::Ui(_))));
    }
}
