// Keyboard teleop: canned poses over the command channel, Q quit
//
// Publishes command JSON on the same key expression the BLE bridge uses,
// so the runtime cannot tell it apart from a connected peer. The wiggle
// sequence is long enough to exercise the chunked envelope path.

use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind},
    terminal::{disable_raw_mode, enable_raw_mode},
};
use serde_json::json;
use std::time::Duration;
use tracing::info;

use micropupper_runtime::command::split_into_envelopes;
use micropupper_runtime::config::{MAX_NOTIFY_LEN, TOPIC_CMD, TOPIC_RSP};

const POSE_SPEED: u16 = 1000;
const LEAN: f32 = 20.0;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    info!("Opening Zenoh session...");
    let session = zenoh::open(zenoh::Config::default()).await?;
    let publisher = session.declare_publisher(TOPIC_CMD).await?;
    let replies = session.declare_subscriber(TOPIC_RSP).await?;

    info!("Controls: W=bow, S=sit, F=lean forward, B=lean back, SPACE=stance, G=wiggle, P=ping, Q=quit");

    enable_raw_mode()?;
    let result: Result<(), Box<dyn std::error::Error + Send + Sync>> = async {
        loop {
            // Poll for key with 20ms timeout
            if event::poll(Duration::from_millis(20))? {
                if let Event::Key(KeyEvent { code, kind, .. }) = event::read()? {
                    let pressed = kind == KeyEventKind::Press || kind == KeyEventKind::Repeat;

                    let payload = match code {
                        KeyCode::Char('w') if pressed => Some(pose(-LEAN, -LEAN)),
                        KeyCode::Char('s') if pressed => Some(pose(LEAN, LEAN)),
                        KeyCode::Char('f') if pressed => Some(pose(LEAN, -LEAN)),
                        KeyCode::Char('b') if pressed => Some(pose(-LEAN, LEAN)),
                        KeyCode::Char(' ') if pressed => Some(json!({"r": 1}).to_string()),
                        KeyCode::Char('p') if pressed => Some(json!({"p": 1}).to_string()),
                        KeyCode::Char('g') if pressed => Some(wiggle_sequence()),
                        KeyCode::Char('q') | KeyCode::Esc if pressed => break,
                        _ => None,
                    };

                    if let Some(payload) = payload {
                        // Long commands go out the way a real peer sends
                        // them: split into {"k","t","d"} envelopes
                        for part in split_into_envelopes(&payload, MAX_NOTIFY_LEN) {
                            publisher.put(part).await?;
                        }
                    }
                }
            }

            // Show whatever the robot notified back
            while let Ok(Some(sample)) = replies.try_recv() {
                let text = String::from_utf8_lossy(&sample.payload().to_bytes()).into_owned();
                info!("robot: {}", text);
            }
        }
        Ok(())
    }
    .await;
    disable_raw_mode()?;

    result
}

/// One 4-leg pose offset from stance: front legs + `front`, back legs + `back`.
fn pose(front: f32, back: f32) -> String {
    json!({
        "s": [90.0 + front, 90.0 + front, 270.0 + back, 270.0 + back, POSE_SPEED, 0]
    })
    .to_string()
}

/// A multi-move sequence long enough to need chunking on the wire.
fn wiggle_sequence() -> String {
    let mut moves = Vec::new();
    for _ in 0..6 {
        moves.push(json!([95.0, 95.0, 265.0, 265.0, POSE_SPEED, 120]));
        moves.push(json!([85.0, 85.0, 275.0, 275.0, POSE_SPEED, 120]));
    }
    moves.push(json!([90.0, 90.0, 270.0, 270.0, POSE_SPEED, 0]));
    json!({ "m": moves }).to_string()
}
