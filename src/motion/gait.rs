// Crawl gait phase state machine
//
// A ripple gait: exactly one leg swings per phase while the other three hold
// stance, in a per-direction sequence. The engine owns direction/phase state
// and produces leg targets; callers apply them through the leg driver, so
// every servo write stays on one path.

use std::time::{Duration, Instant};
use tracing::info;

use super::legs::{LegId, LegTargets, StanceConfig};
use crate::config;

/// Gait configuration rejected before any motion is attempted.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("swing amplitude must be non-negative, got {0}")]
    NegativeSwing(f32),

    #[error("step duration must be positive")]
    ZeroStepDuration,

    #[error("servo speed {0} out of range (0-4095)")]
    SpeedOutOfRange(u16),
}

/// Walking direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GaitDirection {
    Forward,
    Backward,
    TurnLeft,
    TurnRight,
    Stop,
}

/// Per-direction swing order, one entry per phase.
///
/// Forward alternates sides (diagonal pairing keeps the body stable);
/// turns lift same-side legs consecutively; backward is the forward
/// sequence reversed, swinging to the back extreme instead.
fn swing_sequence(direction: GaitDirection) -> [LegId; 4] {
    use LegId::*;
    match direction {
        GaitDirection::Forward => [BackLeft, FrontRight, BackRight, FrontLeft],
        GaitDirection::Backward => [FrontLeft, BackRight, FrontRight, BackLeft],
        GaitDirection::TurnRight => [BackLeft, BackRight, FrontLeft, FrontRight],
        GaitDirection::TurnLeft => [BackRight, BackLeft, FrontRight, FrontLeft],
        // Stop never produces a phase; any leg table works as a placeholder
        GaitDirection::Stop => [BackLeft, FrontRight, BackRight, FrontLeft],
    }
}

#[derive(Debug, Clone, Copy)]
pub struct GaitConfig {
    pub stance: StanceConfig,
    pub step_duration: Duration,
    /// Servo speed while walking (0-4095)
    pub speed: u16,
}

impl Default for GaitConfig {
    fn default() -> Self {
        Self {
            stance: StanceConfig::default(),
            step_duration: config::STEP_DURATION,
            speed: config::GAIT_SPEED,
        }
    }
}

impl GaitConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.stance.swing_amplitude < 0.0 {
            return Err(ConfigError::NegativeSwing(self.stance.swing_amplitude));
        }
        if self.step_duration.is_zero() {
            return Err(ConfigError::ZeroStepDuration);
        }
        if self.speed > 4095 {
            return Err(ConfigError::SpeedOutOfRange(self.speed));
        }
        Ok(())
    }
}

/// Four-phase ripple gait engine.
pub struct GaitEngine {
    config: GaitConfig,
    direction: GaitDirection,
    running: bool,
    phase: usize,
    phase_started: Instant,
}

impl GaitEngine {
    pub fn new(config: GaitConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            direction: GaitDirection::Stop,
            running: false,
            phase: 0,
            phase_started: Instant::now(),
        })
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn direction(&self) -> GaitDirection {
        self.direction
    }

    /// Begin walking: reset the phase and return the first phase targets.
    pub fn start(&mut self, direction: GaitDirection, now: Instant) -> LegTargets {
        if direction == GaitDirection::Stop {
            return self.stop();
        }
        info!("Gait start: {:?}", direction);
        self.direction = direction;
        self.running = true;
        self.phase = 0;
        self.phase_started = now;
        self.phase_targets()
    }

    /// Change direction. While running the phase is kept so the switch does
    /// not stutter; when stopped this behaves like start. Returns targets
    /// only when they should be applied immediately.
    pub fn set_direction(&mut self, direction: GaitDirection, now: Instant) -> Option<LegTargets> {
        if direction == GaitDirection::Stop {
            return Some(self.stop());
        }
        if self.running {
            info!("Gait direction: {:?} -> {:?}", self.direction, direction);
            self.direction = direction;
            None
        } else {
            Some(self.start(direction, now))
        }
    }

    /// Halt the gait and return stance targets for all legs.
    pub fn stop(&mut self) -> LegTargets {
        if self.running {
            info!("Gait stop");
        }
        self.running = false;
        self.direction = GaitDirection::Stop;
        self.phase = 0;
        self.config.stance.stance_targets()
    }

    /// Advance the phase if the current one has run its course.
    pub fn tick(&mut self, now: Instant) -> Option<LegTargets> {
        if !self.running {
            return None;
        }
        if now.duration_since(self.phase_started) < self.config.step_duration {
            return None;
        }
        self.phase = (self.phase + 1) % 4;
        self.phase_started = now;
        Some(self.phase_targets())
    }

    /// Targets for the current phase: the swing leg at its extreme, the
    /// other three at stance.
    fn phase_targets(&self) -> LegTargets {
        let stance = &self.config.stance;
        let swing_leg = swing_sequence(self.direction)[self.phase];
        let offset = match self.direction {
            GaitDirection::Backward => -stance.swing_amplitude,
            _ => stance.swing_amplitude,
        };

        let angle_for = |leg: LegId| {
            let base = stance.base_stance(leg);
            if leg == swing_leg { base + offset } else { base }
        };

        LegTargets {
            fr: angle_for(LegId::FrontRight),
            fl: angle_for(LegId::FrontLeft),
            br: angle_for(LegId::BackRight),
            bl: angle_for(LegId::BackLeft),
            speed: self.config.speed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> GaitConfig {
        GaitConfig {
            stance: StanceConfig {
                front: 90.0,
                back: 270.0,
                swing_amplitude: 25.0,
                default_speed: 1000,
            },
            step_duration: Duration::from_millis(250),
            speed: 3000,
        }
    }

    fn swing_leg_of(targets: &LegTargets, config: &GaitConfig) -> Option<LegId> {
        let stance = &config.stance;
        crate::motion::legs::ALL_LEGS
            .into_iter()
            .find(|&leg| (targets.get(leg) - stance.base_stance(leg)).abs() > 0.01)
    }

    #[test]
    fn test_config_validation() {
        let mut bad = test_config();
        bad.stance.swing_amplitude = -1.0;
        assert!(matches!(
            GaitEngine::new(bad),
            Err(ConfigError::NegativeSwing(_))
        ));

        let mut bad = test_config();
        bad.step_duration = Duration::ZERO;
        assert!(matches!(
            GaitEngine::new(bad),
            Err(ConfigError::ZeroStepDuration)
        ));

        let mut bad = test_config();
        bad.speed = 5000;
        assert!(matches!(
            GaitEngine::new(bad),
            Err(ConfigError::SpeedOutOfRange(5000))
        ));

        assert!(GaitEngine::new(test_config()).is_ok());
    }

    #[test]
    fn test_start_swings_first_leg() {
        let mut engine = GaitEngine::new(test_config()).unwrap();
        let now = Instant::now();

        let targets = engine.start(GaitDirection::Forward, now);
        assert!(engine.is_running());
        assert_eq!(targets.bl, 295.0); // back-left swings forward first
        assert_eq!(targets.fr, 90.0);
        assert_eq!(targets.br, 270.0);
        assert_eq!(targets.fl, 90.0);
        assert_eq!(targets.speed, 3000);
    }

    #[test]
    fn test_forward_sequence_order() {
        let config = test_config();
        let mut engine = GaitEngine::new(config).unwrap();
        let mut now = Instant::now();

        let first = engine.start(GaitDirection::Forward, now);
        let mut order = vec![swing_leg_of(&first, &config).unwrap()];
        for _ in 0..3 {
            now += Duration::from_millis(251);
            let targets = engine.tick(now).unwrap();
            order.push(swing_leg_of(&targets, &config).unwrap());
        }

        use LegId::*;
        assert_eq!(order, vec![BackLeft, FrontRight, BackRight, FrontLeft]);
    }

    #[test]
    fn test_turn_sequences_mirror() {
        use LegId::*;
        assert_eq!(
            swing_sequence(GaitDirection::TurnRight),
            [BackLeft, BackRight, FrontLeft, FrontRight]
        );
        assert_eq!(
            swing_sequence(GaitDirection::TurnLeft),
            [BackRight, BackLeft, FrontRight, FrontLeft]
        );
    }

    #[test]
    fn test_backward_swings_to_back_extreme() {
        let mut engine = GaitEngine::new(test_config()).unwrap();
        let targets = engine.start(GaitDirection::Backward, Instant::now());
        // front-left leads and swings back, 90 - 25
        assert_eq!(targets.fl, 65.0);
        assert_eq!(targets.fr, 90.0);
    }

    #[test]
    fn test_tick_respects_step_duration() {
        let mut engine = GaitEngine::new(test_config()).unwrap();
        let now = Instant::now();
        engine.start(GaitDirection::Forward, now);

        assert!(engine.tick(now + Duration::from_millis(100)).is_none());
        assert!(engine.tick(now + Duration::from_millis(250)).is_some());
    }

    #[test]
    fn test_set_direction_keeps_phase_while_running() {
        let config = test_config();
        let mut engine = GaitEngine::new(config).unwrap();
        let mut now = Instant::now();

        engine.start(GaitDirection::Forward, now);
        now += Duration::from_millis(251);
        engine.tick(now); // phase 1

        // Direction change while running: no immediate targets, phase kept
        assert!(engine.set_direction(GaitDirection::TurnRight, now).is_none());
        assert_eq!(engine.direction(), GaitDirection::TurnRight);

        now += Duration::from_millis(251);
        let targets = engine.tick(now).unwrap();
        // Phase 2 of the turn-right sequence
        assert_eq!(swing_leg_of(&targets, &config), Some(LegId::FrontLeft));
    }

    #[test]
    fn test_set_direction_when_stopped_starts() {
        let mut engine = GaitEngine::new(test_config()).unwrap();
        let targets = engine.set_direction(GaitDirection::TurnLeft, Instant::now());
        assert!(targets.is_some());
        assert!(engine.is_running());
    }

    #[test]
    fn test_stop_returns_stance_and_clears_running() {
        let mut engine = GaitEngine::new(test_config()).unwrap();
        engine.start(GaitDirection::Forward, Instant::now());

        let targets = engine.stop();
        assert!(!engine.is_running());
        assert_eq!(engine.direction(), GaitDirection::Stop);
        assert_eq!(
            targets,
            LegTargets {
                fr: 90.0,
                fl: 90.0,
                br: 270.0,
                bl: 270.0,
                speed: 1000
            }
        );
        // Stopped engine does not tick
        assert!(engine.tick(Instant::now() + Duration::from_secs(1)).is_none());
    }

    #[test]
    fn test_running_implies_direction_not_stop() {
        let mut engine = GaitEngine::new(test_config()).unwrap();
        engine.start(GaitDirection::Stop, Instant::now());
        assert!(!engine.is_running());

        engine.start(GaitDirection::Forward, Instant::now());
        engine.set_direction(GaitDirection::Stop, Instant::now());
        assert!(!engine.is_running());
        assert_eq!(engine.direction(), GaitDirection::Stop);
    }
}
