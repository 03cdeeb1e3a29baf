// Motion control for the quadruped
//
// Provides:
// - STS3032 serial protocol implementation
// - Unified-angle leg driver with right-side reversal
// - Crawl gait engine and reaction animation playback
// - The Motion arbiter: one owner for "what the legs are doing"

pub mod animation;
pub mod gait;
pub mod legs;
pub mod sts3032;

pub use gait::{ConfigError, GaitConfig, GaitDirection, GaitEngine};
pub use legs::{LegDriver, LegId, LegTargets, StanceConfig};
pub use sts3032::{ServoError, Sts3032Bus};

use std::collections::HashMap;
use std::time::Instant;
use tracing::debug;

use crate::config;
use crate::messages::ImuSample;
use crate::sensor::{Push, PushDetector, ReactionConfig, StabilizeConfig, Stabilizer};
use sts3032::Result;

/// Collaborator surface of one bus servo. The real bus implements this over
/// serial; tests and the no-hardware runtime substitute their own.
pub trait ServoActuator {
    /// Check whether a servo answers on the bus.
    fn ping(&mut self, id: u8) -> Result<bool>;

    fn enable_torque(&mut self, id: u8, on: bool) -> Result<()>;

    /// Command a physical angle (degrees) at a speed (0-4095).
    fn set_angle(&mut self, id: u8, angle: f32, speed: u16) -> Result<()>;

    /// Read the present physical angle (degrees).
    fn get_angle(&mut self, id: u8) -> Result<f32>;

    /// Command several servos at once. The bus overrides this with a
    /// SyncWrite so a gait phase lands in one transaction.
    fn set_all(&mut self, moves: &[(u8, f32)], speed: u16) -> Result<()> {
        for &(id, angle) in moves {
            self.set_angle(id, angle, speed)?;
        }
        Ok(())
    }
}

/// Stand-in actuator for running without hardware.
#[derive(Default)]
pub struct NullServo {
    angles: HashMap<u8, f32>,
}

impl ServoActuator for NullServo {
    fn ping(&mut self, _id: u8) -> Result<bool> {
        Ok(true)
    }

    fn enable_torque(&mut self, id: u8, on: bool) -> Result<()> {
        debug!("null servo {}: torque {}", id, on);
        Ok(())
    }

    fn set_angle(&mut self, id: u8, angle: f32, speed: u16) -> Result<()> {
        debug!("null servo {}: angle {:.1} speed {}", id, angle, speed);
        self.angles.insert(id, angle);
        Ok(())
    }

    fn get_angle(&mut self, id: u8) -> Result<f32> {
        Ok(self.angles.get(&id).copied().unwrap_or(0.0))
    }
}

/// Owns the gait engine and both sensor-driven controllers, and enforces
/// that only one of gait / stabilization drives the legs at a time.
///
/// Methods return leg targets for the caller to apply through the one
/// `LegDriver`; the arbiter itself never touches the bus.
pub struct Motion {
    pub gait: GaitEngine,
    pub stabilizer: Stabilizer,
    pub detector: PushDetector,
}

impl Motion {
    pub fn new(gait: GaitEngine, stabilizer: Stabilizer, detector: PushDetector) -> Self {
        Self {
            gait,
            stabilizer,
            detector,
        }
    }

    /// Build from the compile-time configuration.
    pub fn with_defaults() -> std::result::Result<Self, ConfigError> {
        let gait = GaitEngine::new(GaitConfig::default())?;
        let stance = StanceConfig::default();
        let stabilizer = Stabilizer::new(
            StabilizeConfig::default(),
            stance,
            config::STABILIZE_ENABLED_DEFAULT,
        );
        let detector = PushDetector::new(ReactionConfig::default());
        Ok(Self::new(gait, stabilizer, detector))
    }

    /// Start a gait, suspending stabilization first.
    pub fn start_gait(&mut self, direction: GaitDirection, now: Instant) -> LegTargets {
        self.stabilizer.suspend();
        self.gait.start(direction, now)
    }

    /// Change gait direction; starting from stopped also suspends
    /// stabilization.
    pub fn set_gait_direction(
        &mut self,
        direction: GaitDirection,
        now: Instant,
    ) -> Option<LegTargets> {
        if direction != GaitDirection::Stop {
            self.stabilizer.suspend();
        }
        self.gait.set_direction(direction, now)
    }

    /// Enable stabilization, stopping any running gait first. Returns the
    /// stance targets to apply before corrections begin.
    pub fn enable_stabilization(&mut self, now: Instant) -> LegTargets {
        let stance = self.gait.stop();
        self.stabilizer.set_enabled(true, now);
        stance
    }

    /// Disable stabilization; returns stance targets if it was active.
    pub fn disable_stabilization(&mut self, now: Instant) -> Option<LegTargets> {
        self.stabilizer.set_enabled(false, now)
    }

    /// Halt everything and return stance targets: used for the explicit
    /// stance command and for peer disconnect.
    pub fn halt(&mut self) -> LegTargets {
        self.gait.stop()
    }

    /// Take the legs for a one-shot animation: stops the gait, suspends
    /// stabilization, and reports whether stabilization must be restored.
    pub fn begin_animation(&mut self) -> bool {
        let restore = self.stabilizer.is_enabled();
        self.stabilizer.suspend();
        self.gait.stop();
        restore
    }

    /// Restore stabilization after an animation if it was active before.
    pub fn end_animation(&mut self, restore: bool, now: Instant) {
        if restore {
            self.stabilizer.set_enabled(true, now);
        }
    }

    /// Feed one inertial sample to both consumers.
    pub fn imu_tick(
        &mut self,
        sample: &ImuSample,
        now: Instant,
    ) -> (Option<LegTargets>, Option<Push>) {
        let correction = self.stabilizer.tick(sample, now);
        let push = self.detector.tick(sample, now);
        (correction, push)
    }

    /// Advance a running gait.
    pub fn gait_tick(&mut self, now: Instant) -> Option<LegTargets> {
        self.gait.tick(now)
    }
}
