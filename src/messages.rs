// Wire-facing message types for the runtime

use serde::{Deserialize, Serialize};

/// One inertial reading from the IMU daemon.
/// Accelerations in m/s^2, rates in deg/s.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default)]
pub struct ImuSample {
    #[serde(default)]
    pub accel_x: f32,
    #[serde(default)]
    pub accel_y: f32,
    #[serde(default)]
    pub accel_z: f32,
    #[serde(default)]
    pub gyro_x: f32,
    #[serde(default)]
    pub gyro_y: f32,
    #[serde(default)]
    pub gyro_z: f32,
}

/// Peer connection state published by the BLE bridge.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ConnEvent {
    pub connected: bool,
}

/// One atomic 4-leg move parsed from the command vocabulary.
/// Angles are unified (left-side convention); delay pauses command intake
/// after the move has been issued.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MoveCommand {
    pub fr: f32,
    pub fl: f32,
    pub br: f32,
    pub bl: f32,
    pub speed: u16,
    pub delay_ms: u64,
}

/// Events fed from the control loop into the transport-delivery task.
#[derive(Debug)]
pub enum TransportEvent {
    /// Raw bytes from one characteristic write (whole or chunked command).
    Data(Vec<u8>),
    /// Peer connection state changed.
    Connected(bool),
}
