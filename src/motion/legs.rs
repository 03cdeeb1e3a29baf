// Leg identity, unified-angle kinematics, and the leg driver
//
// All four servos are commanded with one unified angle convention (the
// left-side perspective). Right-side servos are mirror-mounted, so the
// driver reverses their angles before anything touches the bus.

use tracing::{error, info};

use super::sts3032::Result;
use super::ServoActuator;
use crate::config;

/// The four legs, with their bus servo IDs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LegId {
    FrontRight,
    FrontLeft,
    BackRight,
    BackLeft,
}

/// Leg order used everywhere a 4-tuple appears: [FR, FL, BR, BL].
pub const ALL_LEGS: [LegId; 4] = [
    LegId::FrontRight,
    LegId::FrontLeft,
    LegId::BackRight,
    LegId::BackLeft,
];

impl LegId {
    pub fn servo_id(self) -> u8 {
        match self {
            LegId::FrontRight => 1,
            LegId::FrontLeft => 2,
            LegId::BackRight => 3,
            LegId::BackLeft => 4,
        }
    }

    pub fn is_right_side(self) -> bool {
        matches!(self, LegId::FrontRight | LegId::BackRight)
    }

    pub fn is_front(self) -> bool {
        matches!(self, LegId::FrontRight | LegId::FrontLeft)
    }

    pub fn name(self) -> &'static str {
        match self {
            LegId::FrontRight => "Front-Right",
            LegId::FrontLeft => "Front-Left",
            LegId::BackRight => "Back-Right",
            LegId::BackLeft => "Back-Left",
        }
    }
}

/// Map a unified angle to the physical servo angle for one leg.
/// Right-side servos are mirror-mounted and take the reversed angle.
pub fn physical_angle(leg: LegId, virtual_angle: f32) -> f32 {
    if leg.is_right_side() {
        360.0 - virtual_angle
    } else {
        virtual_angle
    }
}

/// Neutral stance table plus the swing envelope around it.
#[derive(Debug, Clone, Copy)]
pub struct StanceConfig {
    /// Front-leg neutral angle (unified, degrees)
    pub front: f32,
    /// Back-leg neutral angle (unified, degrees)
    pub back: f32,
    /// Maximum deviation from stance while swinging (degrees)
    pub swing_amplitude: f32,
    /// Servo speed for stance and plain moves (0-4095)
    pub default_speed: u16,
}

impl Default for StanceConfig {
    fn default() -> Self {
        Self {
            front: config::STANCE_FRONT,
            back: config::STANCE_BACK,
            swing_amplitude: config::SWING_AMPLITUDE,
            default_speed: config::DEFAULT_SPEED,
        }
    }
}

impl StanceConfig {
    /// Neutral angle for a leg before reversal (unified convention).
    pub fn base_stance(&self, leg: LegId) -> f32 {
        if leg.is_front() {
            self.front
        } else {
            self.back
        }
    }

    /// Physical neutral angle for a leg.
    pub fn stance_angle(&self, leg: LegId) -> f32 {
        physical_angle(leg, self.base_stance(leg))
    }

    /// Physical angle of a leg at its forward swing extreme.
    pub fn swing_forward_angle(&self, leg: LegId) -> f32 {
        physical_angle(leg, self.base_stance(leg) + self.swing_amplitude)
    }

    /// Physical angle of a leg at its back swing extreme.
    pub fn swing_back_angle(&self, leg: LegId) -> f32 {
        physical_angle(leg, self.base_stance(leg) - self.swing_amplitude)
    }

    /// Unified targets that put every leg at stance.
    pub fn stance_targets(&self) -> LegTargets {
        LegTargets {
            fr: self.front,
            fl: self.front,
            br: self.back,
            bl: self.back,
            speed: self.default_speed,
        }
    }
}

/// One set of unified angle targets for all four legs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LegTargets {
    pub fr: f32,
    pub fl: f32,
    pub br: f32,
    pub bl: f32,
    pub speed: u16,
}

impl LegTargets {
    pub fn get(&self, leg: LegId) -> f32 {
        match leg {
            LegId::FrontRight => self.fr,
            LegId::FrontLeft => self.fl,
            LegId::BackRight => self.br,
            LegId::BackLeft => self.bl,
        }
    }
}

/// Drives the four leg servos with unified angles, applying the right-side
/// reversal on the way out. The only path to the servo bus.
pub struct LegDriver {
    bus: Box<dyn ServoActuator + Send>,
    stance: StanceConfig,
}

impl LegDriver {
    pub fn new(bus: Box<dyn ServoActuator + Send>, stance: StanceConfig) -> Self {
        Self { bus, stance }
    }

    pub fn stance(&self) -> &StanceConfig {
        &self.stance
    }

    /// Bring up the hardware: ping every leg, enable torque, go to stance.
    ///
    /// A silent leg is logged and skipped rather than failing bring-up;
    /// returns false if any leg did not answer.
    pub fn init(&mut self) -> Result<bool> {
        let mut all_ok = true;

        info!("Checking servos...");
        for leg in ALL_LEGS {
            match self.bus.ping(leg.servo_id()) {
                Ok(true) => info!("Servo {} ({}) OK", leg.servo_id(), leg.name()),
                Ok(false) => {
                    error!("Servo {} ({}) NOT responding", leg.servo_id(), leg.name());
                    all_ok = false;
                }
                Err(e) => return Err(e),
            }
        }

        for leg in ALL_LEGS {
            self.bus.enable_torque(leg.servo_id(), true)?;
        }
        info!("Torque enabled on all servos");

        self.goto_stance()?;
        info!(
            "Legs initialized - stance front={} back={} amplitude={}",
            self.stance.front, self.stance.back, self.stance.swing_amplitude
        );

        Ok(all_ok)
    }

    /// Move one leg to a unified angle.
    pub fn move_leg(&mut self, leg: LegId, virtual_angle: f32, speed: u16) -> Result<()> {
        self.bus
            .set_angle(leg.servo_id(), physical_angle(leg, virtual_angle), speed)
    }

    /// Move all four legs in one bus transaction.
    pub fn move_all(&mut self, targets: &LegTargets) -> Result<()> {
        let moves: Vec<(u8, f32)> = ALL_LEGS
            .iter()
            .map(|&leg| (leg.servo_id(), physical_angle(leg, targets.get(leg))))
            .collect();
        self.bus.set_all(&moves, targets.speed)
    }

    /// Command every leg to its neutral stance angle.
    pub fn goto_stance(&mut self) -> Result<()> {
        self.move_all(&self.stance.stance_targets())
    }

    /// Read back the present unified angles, [FR, FL, BR, BL].
    pub fn read_positions(&mut self) -> Result<[f32; 4]> {
        let mut out = [0.0f32; 4];
        for (slot, leg) in ALL_LEGS.iter().enumerate() {
            let raw = self.bus.get_angle(leg.servo_id())?;
            // Reversal round-trips: physical -> unified is the same transform
            out[slot] = physical_angle(*leg, raw);
        }
        Ok(out)
    }

    pub fn torque(&mut self, on: bool) -> Result<()> {
        for leg in ALL_LEGS {
            self.bus.enable_torque(leg.servo_id(), on)?;
        }
        info!("Torque {} on all servos", if on { "enabled" } else { "disabled" });
        Ok(())
    }

    /// Ping one leg.
    pub fn ping(&mut self, leg: LegId) -> Result<bool> {
        self.bus.ping(leg.servo_id())
    }
}
