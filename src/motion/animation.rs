// One-shot keyframe playback for reaction animations

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::sleep;
use tracing::debug;

use super::legs::{LegDriver, LegTargets};
use super::sts3032::Result;

/// One pose held for a fixed time.
pub struct Keyframe {
    pub targets: LegTargets,
    pub hold_ms: u64,
}

/// A single forward walk cycle in the crawl ripple order, used as the
/// front-push reaction. Angles are unified; stance 90/270, swing 25.
pub const WALK_FORWARD: &[Keyframe] = &[
    Keyframe {
        targets: LegTargets { fr: 90.0, fl: 90.0, br: 270.0, bl: 295.0, speed: 3000 },
        hold_ms: 150,
    },
    Keyframe {
        targets: LegTargets { fr: 115.0, fl: 90.0, br: 270.0, bl: 270.0, speed: 3000 },
        hold_ms: 150,
    },
    Keyframe {
        targets: LegTargets { fr: 90.0, fl: 90.0, br: 295.0, bl: 270.0, speed: 3000 },
        hold_ms: 150,
    },
    Keyframe {
        targets: LegTargets { fr: 90.0, fl: 115.0, br: 270.0, bl: 270.0, speed: 3000 },
        hold_ms: 150,
    },
];

/// Play a keyframe sequence a number of times, then settle at stance.
/// `timing_offset` stretches every hold, for tuning playback speed.
pub async fn play(
    legs: &Arc<Mutex<LegDriver>>,
    frames: &[Keyframe],
    cycles: u32,
    timing_offset: Duration,
) -> Result<()> {
    debug!("Playing animation: {} frames x {}", frames.len(), cycles);
    for _ in 0..cycles {
        for frame in frames {
            legs.lock().await.move_all(&frame.targets)?;
            sleep(Duration::from_millis(frame.hold_ms) + timing_offset).await;
        }
    }
    legs.lock().await.goto_stance()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::motion::legs::tests::test_driver;

    #[tokio::test]
    async fn test_play_issues_every_frame_then_stance() {
        let (driver, mock) = test_driver();
        let legs = Arc::new(Mutex::new(driver));

        let frames = [
            Keyframe {
                targets: LegTargets { fr: 100.0, fl: 100.0, br: 260.0, bl: 260.0, speed: 500 },
                hold_ms: 1,
            },
            Keyframe {
                targets: LegTargets { fr: 95.0, fl: 95.0, br: 265.0, bl: 265.0, speed: 500 },
                hold_ms: 1,
            },
        ];

        play(&legs, &frames, 3, Duration::ZERO).await.unwrap();

        let set_alls = mock
            .recorded()
            .iter()
            .filter(|c| matches!(c, crate::motion::legs::tests::Call::SetAll(_, _)))
            .count();
        // 2 frames x 3 cycles + final stance
        assert_eq!(set_alls, 7);

        // Finished at stance
        let (moves, _) = mock.last_set_all().unwrap();
        assert_eq!(moves, vec![(1, 270.0), (2, 90.0), (3, 90.0), (4, 270.0)]);
    }

    #[test]
    fn test_walk_forward_ripple_order() {
        use crate::motion::legs::{LegId, StanceConfig};
        let stance = StanceConfig::default();

        // Exactly one leg off stance per frame, in BL FR BR FL order
        let expect = [LegId::BackLeft, LegId::FrontRight, LegId::BackRight, LegId::FrontLeft];
        for (frame, want) in WALK_FORWARD.iter().zip(expect) {
            let swinging: Vec<LegId> = crate::motion::legs::ALL_LEGS
                .into_iter()
                .filter(|&leg| {
                    (frame.targets.get(leg) - stance.base_stance(leg)).abs() > 0.01
                })
                .collect();
            assert_eq!(swinging, vec![want]);
        }
    }
}
