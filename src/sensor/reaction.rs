// Push detection: react to a sudden shove, not to sustained acceleration
//
// Detection is delta-based: a trigger needs a large change between two
// consecutive accel X samples AND a current reading past a floor, so a
// robot being carried (sustained acceleration) does not false-trigger.

use std::time::{Duration, Instant};
use tracing::info;

use crate::config;
use crate::messages::ImuSample;

/// Which way the robot was pushed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Push {
    Forward,
    Backward,
}

#[derive(Debug, Clone, Copy)]
pub struct ReactionConfig {
    /// Minimum accel X change between samples (m/s^2)
    pub delta_threshold: f32,
    /// Minimum current accel X magnitude (m/s^2)
    pub min_accel: f32,
    /// Debounce between triggers
    pub cooldown: Duration,
}

impl Default for ReactionConfig {
    fn default() -> Self {
        Self {
            delta_threshold: config::REACTION_DELTA_THRESHOLD,
            min_accel: config::REACTION_MIN_ACCEL,
            cooldown: config::REACTION_COOLDOWN,
        }
    }
}

pub struct PushDetector {
    config: ReactionConfig,
    prev_accel_x: f32,
    has_prev: bool,
    last_trigger: Option<Instant>,
}

impl PushDetector {
    pub fn new(config: ReactionConfig) -> Self {
        Self {
            config,
            prev_accel_x: 0.0,
            has_prev: false,
            last_trigger: None,
        }
    }

    fn cooldown_expired(&self, now: Instant) -> bool {
        match self.last_trigger {
            Some(t) => now.duration_since(t) >= self.config.cooldown,
            None => true,
        }
    }

    /// Process one inertial sample. The very first sample only seeds the
    /// previous reading. Thresholds are boundary-inclusive.
    pub fn tick(&mut self, sample: &ImuSample, now: Instant) -> Option<Push> {
        let current = sample.accel_x;

        if !self.has_prev {
            self.prev_accel_x = current;
            self.has_prev = true;
            return None;
        }

        let delta = current - self.prev_accel_x;
        self.prev_accel_x = current;

        if !self.cooldown_expired(now) {
            return None;
        }

        if delta >= self.config.delta_threshold && current >= self.config.min_accel {
            info!(
                "Front push detected (delta +{:.2}, accel {:.2} m/s^2)",
                delta, current
            );
            self.last_trigger = Some(now);
            return Some(Push::Forward);
        }

        if delta <= -self.config.delta_threshold && current <= -self.config.min_accel {
            info!(
                "Back push detected (delta {:.2}, accel {:.2} m/s^2)",
                delta, current
            );
            self.last_trigger = Some(now);
            return Some(Push::Backward);
        }

        None
    }
}
