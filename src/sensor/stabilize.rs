// Gyro stabilization: keep the legs facing the ground while the body tilts
//
// Pitch rate (gyro Y) is deadzoned, low-pass filtered, scaled, and fed into
// a leaky integrator whose output offsets all four stance angles. Servo
// speed follows the *change* of the correction, not its magnitude, through
// a power curve, so jitter moves slowly and sudden tilts correct fast.

use std::time::{Duration, Instant};
use tracing::info;

use crate::config;
use crate::messages::ImuSample;
use crate::motion::legs::{LegTargets, StanceConfig};

// Leaky integrator mix: mostly retain, bleed in a little of the new
// correction each update so the offset decays instead of drifting.
const INTEGRATOR_RETAIN: f32 = 0.98;
const INTEGRATOR_INPUT: f32 = 0.02;

#[derive(Debug, Clone, Copy)]
pub struct StabilizeConfig {
    pub update_interval: Duration,
    /// Pitch rates below this magnitude (deg/s) are treated as zero
    pub deadzone: f32,
    /// Low-pass alpha for the raw pitch rate
    pub smoothing: f32,
    /// Filtered rate (deg/s) to correction (degrees) gain
    pub gain: f32,
    /// Accumulated correction clamp (degrees)
    pub max_correction: f32,
    /// Correction change (degrees) that maps to full speed
    pub speed_threshold: f32,
    pub speed_min: u16,
    pub speed_max: u16,
    /// Exponent > 1 biases small corrections toward low speed
    pub speed_curve: f32,
}

impl Default for StabilizeConfig {
    fn default() -> Self {
        Self {
            update_interval: config::STABILIZE_UPDATE_INTERVAL,
            deadzone: config::STABILIZE_DEADZONE,
            smoothing: config::STABILIZE_SMOOTHING,
            gain: config::STABILIZE_GAIN,
            max_correction: config::STABILIZE_MAX_CORRECTION,
            speed_threshold: config::STABILIZE_SPEED_THRESHOLD,
            speed_min: config::STABILIZE_SPEED_MIN,
            speed_max: config::STABILIZE_SPEED_MAX,
            speed_curve: config::STABILIZE_SPEED_CURVE,
        }
    }
}

pub struct Stabilizer {
    config: StabilizeConfig,
    stance: StanceConfig,
    enabled: bool,
    filtered_rate: f32,
    accumulated: f32,
    prev_accumulated: f32,
    last_update: Instant,
}

impl Stabilizer {
    pub fn new(config: StabilizeConfig, stance: StanceConfig, enabled: bool) -> Self {
        Self {
            config,
            stance,
            enabled,
            filtered_rate: 0.0,
            accumulated: 0.0,
            prev_accumulated: 0.0,
            last_update: Instant::now(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Current accumulated correction in degrees.
    pub fn correction(&self) -> f32 {
        self.accumulated
    }

    /// Enable or disable. Enabling resets all filter and integrator state;
    /// disabling returns stance targets for the caller to command.
    pub fn set_enabled(&mut self, on: bool, now: Instant) -> Option<LegTargets> {
        if on && !self.enabled {
            self.reset(now);
            self.enabled = true;
            info!("Gyro stabilization enabled");
            None
        } else if !on && self.enabled {
            self.enabled = false;
            info!("Gyro stabilization disabled - returning to stance");
            Some(self.stance.stance_targets())
        } else {
            None
        }
    }

    /// Turn off without commanding stance; used when a gait or animation
    /// takes over the legs.
    pub fn suspend(&mut self) {
        if self.enabled {
            info!("Gyro stabilization suspended");
        }
        self.enabled = false;
    }

    fn reset(&mut self, now: Instant) {
        self.filtered_rate = 0.0;
        self.accumulated = 0.0;
        self.prev_accumulated = 0.0;
        self.last_update = now;
    }

    /// Process one inertial sample. Returns corrective targets when the
    /// update interval has elapsed, None otherwise.
    pub fn tick(&mut self, sample: &ImuSample, now: Instant) -> Option<LegTargets> {
        if !self.enabled {
            return None;
        }
        if now.duration_since(self.last_update) < self.config.update_interval {
            return None;
        }
        self.last_update = now;

        // Pitch rate with deadzone
        let mut rate = sample.gyro_y;
        if rate.abs() < self.config.deadzone {
            rate = 0.0;
        }

        // Low-pass filter for smoothing
        self.filtered_rate =
            self.config.smoothing * rate + (1.0 - self.config.smoothing) * self.filtered_rate;

        // Proportional correction fed into the leaky integrator
        let correction = self.filtered_rate * self.config.gain;
        self.accumulated = (self.accumulated * INTEGRATOR_RETAIN + correction * INTEGRATOR_INPUT)
            .clamp(-self.config.max_correction, self.config.max_correction);

        // Speed follows how much the correction moved this update
        let delta = (self.accumulated - self.prev_accumulated).abs();
        self.prev_accumulated = self.accumulated;

        let ratio = (delta / self.config.speed_threshold).clamp(0.0, 1.0);
        let ratio = ratio.powf(self.config.speed_curve);
        let span = (self.config.speed_max - self.config.speed_min) as f32;
        let speed = self.config.speed_min + (ratio * span) as u16;

        // Legs have one rotational degree of freedom: only pitch is
        // compensable, and the offset has the same sign front and back.
        Some(LegTargets {
            fr: self.stance.front + self.accumulated,
            fl: self.stance.front + self.accumulated,
            br: self.stance.back + self.accumulated,
            bl: self.stance.back + self.accumulated,
            speed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> StabilizeConfig {
        StabilizeConfig {
            update_interval: Duration::from_millis(20),
            deadzone: 1.0,
            smoothing: 0.3,
            gain: 0.08,
            max_correction: 20.0,
            speed_threshold: 2.0,
            speed_min: 200,
            speed_max: 3000,
            speed_curve: 2.5,
        }
    }

    fn sample(gyro_y: f32) -> ImuSample {
        ImuSample {
            gyro_y,
            ..Default::default()
        }
    }

    fn stabilizer() -> Stabilizer {
        Stabilizer::new(test_config(), StanceConfig::default(), false)
    }

    #[test]
    fn test_disabled_is_noop() {
        let mut stab = stabilizer();
        assert!(stab
            .tick(&sample(100.0), Instant::now() + Duration::from_secs(1))
            .is_none());
    }

    #[test]
    fn test_rate_limited() {
        let mut stab = stabilizer();
        let now = Instant::now();
        stab.set_enabled(true, now);

        assert!(stab.tick(&sample(50.0), now + Duration::from_millis(5)).is_none());
        assert!(stab.tick(&sample(50.0), now + Duration::from_millis(20)).is_some());
        // Interval restarts from the last accepted update
        assert!(stab.tick(&sample(50.0), now + Duration::from_millis(25)).is_none());
    }

    #[test]
    fn test_correction_bounded_under_extreme_input() {
        let mut stab = stabilizer();
        let mut now = Instant::now();
        stab.set_enabled(true, now);

        for _ in 0..10_000 {
            now += Duration::from_millis(20);
            if let Some(targets) = stab.tick(&sample(2000.0), now) {
                let corr = targets.fl - 90.0;
                assert!(corr.abs() <= 20.0 + 1e-3, "correction {} out of bounds", corr);
            }
        }
        assert!(stab.correction().abs() <= 20.0 + 1e-3);
    }

    #[test]
    fn test_deadzone_suppresses_noise() {
        let mut stab = stabilizer();
        let mut now = Instant::now();
        stab.set_enabled(true, now);

        for _ in 0..100 {
            now += Duration::from_millis(20);
            stab.tick(&sample(0.5), now);
        }
        assert_eq!(stab.correction(), 0.0);
    }

    #[test]
    fn test_same_sign_offsets_front_and_back() {
        let mut stab = stabilizer();
        let mut now = Instant::now();
        stab.set_enabled(true, now);

        let mut last = None;
        for _ in 0..50 {
            now += Duration::from_millis(20);
            if let Some(t) = stab.tick(&sample(500.0), now) {
                last = Some(t);
            }
        }
        let t = last.unwrap();
        let front_offset = t.fl - 90.0;
        let back_offset = t.bl - 270.0;
        assert!(front_offset > 0.0);
        assert!((front_offset - back_offset).abs() < 1e-4);
        assert_eq!(t.fr, t.fl);
        assert_eq!(t.br, t.bl);
    }

    #[test]
    fn test_speed_tracks_correction_change() {
        let mut stab = stabilizer();
        let mut now = Instant::now();
        stab.set_enabled(true, now);

        // Large sudden rate: correction moves a lot, speed climbs above min
        now += Duration::from_millis(20);
        let fast = stab.tick(&sample(2000.0), now).unwrap();

        // Hold the same rate until the integrator settles; delta shrinks
        let mut slow = fast;
        for _ in 0..2000 {
            now += Duration::from_millis(20);
            if let Some(t) = stab.tick(&sample(2000.0), now) {
                slow = t;
            }
        }
        assert!(fast.speed >= 200);
        assert_eq!(slow.speed, 200); // settled: no change, minimum speed
    }

    #[test]
    fn test_disable_returns_stance() {
        let mut stab = stabilizer();
        let now = Instant::now();
        stab.set_enabled(true, now);

        let targets = stab.set_enabled(false, now).unwrap();
        assert_eq!(targets, StanceConfig::default().stance_targets());
        assert!(!stab.is_enabled());
    }

    #[test]
    fn test_reenable_resets_state() {
        let mut stab = stabilizer();
        let mut now = Instant::now();
        stab.set_enabled(true, now);
        for _ in 0..100 {
            now += Duration::from_millis(20);
            stab.tick(&sample(1000.0), now);
        }
        assert!(stab.correction().abs() > 0.0);

        stab.set_enabled(false, now);
        stab.set_enabled(true, now);
        assert_eq!(stab.correction(), 0.0);
    }
}
