//! Windowed-average hysteresis control of a single relay.
//!
//! The controller is synchronous and owns no I/O. Commands leave through a
//! [`RelayOutput`], which the [`LineClient`](crate::LineClient) implements.

use crate::error::{ReaderError, Result};
use crate::protocol::encode_relay;
use crate::types::{Origin, Polarity};
use std::collections::VecDeque;

/// Transport a controller drives its relay through
pub trait RelayOutput {
    /// Whether a command sent now would reach the peer
    fn is_connected(&self) -> bool;

    /// Write one protocol line to the peer
    fn send_line(&self, line: &str);
}

/// Immutable controller parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ControllerConfig {
    /// Value compared against the window average
    pub threshold: f64,
    /// Number of samples averaged before deciding
    pub window_size: usize,
    /// Which side of the threshold switches the relay on
    pub polarity: Polarity,
}

impl ControllerConfig {
    pub fn new(threshold: f64, window_size: usize, polarity: Polarity) -> Result<Self> {
        if window_size == 0 {
            return Err(ReaderError::InvalidConfig(
                "window size must be at least 1".to_string(),
            ));
        }
        Ok(Self {
            threshold,
            window_size,
            polarity,
        })
    }

    /// Decide whether the relay should flip given the current average.
    ///
    /// Rising polarity compares `>=` / `<`, falling compares `<=` / `>`.
    /// A value sitting exactly on the threshold therefore always counts as
    /// "on" territory for both polarities.
    pub fn decide(&self, average: f64, on: bool) -> Option<bool> {
        let threshold = self.threshold;
        match self.polarity {
            Polarity::RisingTurnsOn => {
                if average >= threshold && !on {
                    Some(true)
                } else if average < threshold && on {
                    Some(false)
                } else {
                    None
                }
            }
            Polarity::FallingTurnsOn => {
                if average <= threshold && !on {
                    Some(true)
                } else if average > threshold && on {
                    Some(false)
                } else {
                    None
                }
            }
        }
    }
}

/// Bounded buffer of the most recent samples
#[derive(Debug, Clone)]
pub struct SlidingWindow {
    samples: VecDeque<f64>,
    capacity: usize,
}

impl SlidingWindow {
    pub fn new(capacity: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(capacity + 1),
            capacity,
        }
    }

    /// Append a sample, dropping the oldest once over capacity
    pub fn push(&mut self, sample: f64) {
        self.samples.push_back(sample);
        if self.samples.len() > self.capacity {
            self.samples.pop_front();
        }
    }

    /// Mean of the samples, only once the window is full
    pub fn average(&self) -> Option<f64> {
        if !self.is_full() {
            return None;
        }
        let sum: f64 = self.samples.iter().sum();
        Some(sum / self.samples.len() as f64)
    }

    pub fn is_full(&self) -> bool {
        self.samples.len() == self.capacity
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }

    pub fn samples(&self) -> impl Iterator<Item = f64> + '_ {
        self.samples.iter().copied()
    }
}

/// Relay state as last commanded or echoed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ActuatorState {
    /// Whether the relay is believed to be on
    pub current_state: bool,
    /// Manual control from the UI is in effect
    pub user_override: bool,
}

/// What a call to [`HysteresisController::process_value`] did
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Outcome {
    /// First sample since construction; relay forced off, sample discarded
    ColdStart,
    /// Window not full yet
    Collecting { samples: usize },
    /// Window full but the user holds manual control
    Overridden { average: f64 },
    /// Decision evaluated; `actuated` is the command issued, if any, and
    /// `state` the relay state to publish
    Tracking {
        average: f64,
        actuated: Option<bool>,
        state: bool,
    },
}

/// Hysteresis controller for one accessory
#[derive(Debug, Clone)]
pub struct HysteresisController {
    config: ControllerConfig,
    window: SlidingWindow,
    state: ActuatorState,
    cold_start: bool,
    last_average: Option<f64>,
}

impl HysteresisController {
    pub fn new(config: ControllerConfig) -> Self {
        Self {
            window: SlidingWindow::new(config.window_size),
            config,
            state: ActuatorState::default(),
            cold_start: true,
            last_average: None,
        }
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    pub fn state(&self) -> ActuatorState {
        self.state
    }

    pub fn actuator_state(&self) -> bool {
        self.state.current_state
    }

    pub fn user_override(&self) -> bool {
        self.state.user_override
    }

    pub fn window(&self) -> &SlidingWindow {
        &self.window
    }

    /// Average computed by the most recent sample, `None` while collecting
    pub fn last_average(&self) -> Option<f64> {
        self.last_average
    }

    /// Feed one converted sample through the control loop.
    pub fn process_value(&mut self, value: f64, relay: &impl RelayOutput) -> Outcome {
        // never trust the relay state left over from a previous run
        if self.cold_start {
            self.cold_start = false;
            self.set_actuator(false, Origin::User, relay);
            return Outcome::ColdStart;
        }

        self.window.push(value);
        self.last_average = self.window.average();
        tracing::info!(average = ?self.last_average, "window average");

        let Some(average) = self.last_average else {
            return Outcome::Collecting {
                samples: self.window.len(),
            };
        };

        if self.state.user_override {
            return Outcome::Overridden { average };
        }

        let actuated = self.config.decide(average, self.state.current_state);
        if let Some(on) = actuated {
            tracing::info!(average, threshold = self.config.threshold, on, "switching relay");
            self.set_actuator(on, Origin::Sensor, relay);
        }
        self.state.user_override = false;

        Outcome::Tracking {
            average,
            actuated,
            state: self.state.current_state,
        }
    }

    /// Command the relay.
    ///
    /// Sensor decisions release manual control and restart the window; user
    /// commands hold manual control while `on`. The command is only sent,
    /// and the tracked state only updated, while the transport is
    /// connected. Returns whether the command went out.
    pub fn set_actuator(&mut self, on: bool, origin: Origin, relay: &impl RelayOutput) -> bool {
        match origin {
            Origin::Sensor => {
                self.state.user_override = false;
                self.window.clear();
            }
            Origin::User => self.state.user_override = on,
        }

        if !relay.is_connected() {
            tracing::warn!(on, "relay command dropped, peer not connected");
            return false;
        }

        self.state.current_state = on;
        relay.send_line(encode_relay(on));
        true
    }

    /// Mirror a relay state reported by the hardware
    pub fn apply_echo(&mut self, on: bool) {
        self.state.current_state = on;
    }
}
