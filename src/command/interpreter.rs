// JSON command vocabulary
//
// Recognized shapes, tried in this order:
//   {"s":[fr,fl,br,bl,speed,delay?]}          single move
//   {"m":[[fr,fl,br,bl,speed,delay?], ...]}   move sequence -> {"ok":1}
//   {"p":1}                                   ping -> {"p":1}
//   {"r":1}                                   return to stance -> {"ok":1}
// Malformed input is absorbed and logged, never surfaced to the peer.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::Mutex;
use tokio::time::sleep;
use tracing::{info, warn};

use crate::messages::MoveCommand;
use crate::motion::{LegDriver, LegTargets, Motion};

pub struct CommandInterpreter {
    legs: Arc<Mutex<LegDriver>>,
    motion: Arc<Mutex<Motion>>,
    responses: UnboundedSender<String>,
}

impl CommandInterpreter {
    pub fn new(
        legs: Arc<Mutex<LegDriver>>,
        motion: Arc<Mutex<Motion>>,
        responses: UnboundedSender<String>,
    ) -> Self {
        Self {
            legs,
            motion,
            responses,
        }
    }

    fn respond(&self, text: String) {
        self.responses.send(text).ok();
    }

    /// Execute one complete command payload. Per-move delays sleep here, in
    /// the transport-delivery task, and nowhere else.
    pub async fn on_command(&self, text: &str) {
        info!("Cmd: {}", text);

        let parsed: Value = match serde_json::from_str(text) {
            Ok(v) => v,
            Err(e) => {
                warn!("Invalid JSON: {}", e);
                return;
            }
        };

        // Single move: no reply, the peer paces itself on delay
        if let Some(value) = parsed.get("s").filter(|v| v.is_array()) {
            if let Some(cmd) = parse_move_array(value) {
                self.apply_move(&cmd).await;
            }
            return;
        }

        // Sequence: one {"ok":1} after every member ran
        if let Some(moves) = parsed.get("m").and_then(Value::as_array) {
            info!("Sequence: {} moves", moves.len());
            for item in moves {
                if let Some(cmd) = parse_move_array(item) {
                    self.apply_move(&cmd).await;
                }
            }
            self.respond(json!({"ok": 1}).to_string());
            return;
        }

        if parsed.get("p").is_some() {
            self.respond(json!({"p": 1}).to_string());
            return;
        }

        if parsed.get("r").is_some() {
            info!("Return to stance");
            let targets = self.motion.lock().await.halt();
            self.apply_targets(&targets).await;
            self.respond(json!({"ok": 1}).to_string());
            return;
        }

        warn!("Unknown command");
    }

    /// Read back all four present angles and notify the peer.
    pub async fn send_position_feedback(&self) {
        let read = self.legs.lock().await.read_positions();
        match read {
            Ok([fr, fl, br, bl]) => self.respond(format!(
                "{{\"pos\":[{:.0},{:.0},{:.0},{:.0}]}}",
                fr, fl, br, bl
            )),
            Err(e) => warn!("Position readback failed: {}", e),
        }
    }

    async fn apply_move(&self, cmd: &MoveCommand) {
        info!(
            "Move: FR={:.0} FL={:.0} BR={:.0} BL={:.0} spd={} dly={}",
            cmd.fr, cmd.fl, cmd.br, cmd.bl, cmd.speed, cmd.delay_ms
        );

        let targets = LegTargets {
            fr: cmd.fr,
            fl: cmd.fl,
            br: cmd.br,
            bl: cmd.bl,
            speed: cmd.speed,
        };
        self.apply_targets(&targets).await;

        if cmd.delay_ms > 0 {
            sleep(Duration::from_millis(cmd.delay_ms)).await;
        }
    }

    async fn apply_targets(&self, targets: &LegTargets) {
        if let Err(e) = self.legs.lock().await.move_all(targets) {
            warn!("Servo move failed: {}", e);
        }
    }
}

/// Parse one `[fr,fl,br,bl,speed,delay?]` array. Anything with the wrong
/// arity or non-numeric entries is rejected.
fn parse_move_array(value: &Value) -> Option<MoveCommand> {
    let arr = value.as_array()?;
    if arr.len() < 5 {
        return None;
    }
    let angle = |i: usize| arr.get(i).and_then(Value::as_f64).map(|v| v as f32);

    Some(MoveCommand {
        fr: angle(0)?,
        fl: angle(1)?,
        br: angle(2)?,
        bl: angle(3)?,
        speed: arr.get(4).and_then(Value::as_u64)? as u16,
        delay_ms: arr.get(5).and_then(Value::as_u64).unwrap_or(0),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::chunk::{split_into_envelopes, ChunkAssembler};
    use crate::motion::legs::tests::{test_driver, Call, MockServo};
    use crate::motion::GaitDirection;
    use std::time::Instant;
    use tokio::sync::mpsc;

    fn interpreter() -> (
        CommandInterpreter,
        MockServo,
        Arc<Mutex<Motion>>,
        mpsc::UnboundedReceiver<String>,
    ) {
        let (driver, mock) = test_driver();
        let legs = Arc::new(Mutex::new(driver));
        let motion = Arc::new(Mutex::new(Motion::with_defaults().unwrap()));
        let (tx, rx) = mpsc::unbounded_channel();
        (
            CommandInterpreter::new(legs, motion.clone(), tx),
            mock,
            motion,
            rx,
        )
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<String>) -> Vec<String> {
        let mut out = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            out.push(msg);
        }
        out
    }

    #[tokio::test]
    async fn test_ping_echoes() {
        let (interp, _mock, _motion, mut rx) = interpreter();
        interp.on_command(r#"{"p":1}"#).await;
        assert_eq!(drain(&mut rx), vec![r#"{"p":1}"#]);
    }

    #[tokio::test]
    async fn test_single_move_reverses_right_side() {
        let (interp, mock, _motion, mut rx) = interpreter();
        interp.on_command(r#"{"s":[90,90,270,270,1000,0]}"#).await;

        // Front legs at 90 (FR reversed to 270), back legs at 270 (BR
        // reversed to 90), speed 1000, and no reply for a single move
        let (moves, speed) = mock.last_set_all().unwrap();
        assert_eq!(moves, vec![(1, 270.0), (2, 90.0), (3, 90.0), (4, 270.0)]);
        assert_eq!(speed, 1000);
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn test_single_move_delay_blocks_this_task() {
        let (interp, _mock, _motion, _rx) = interpreter();
        let started = Instant::now();
        interp.on_command(r#"{"s":[90,90,270,270,1000,50]}"#).await;
        assert!(started.elapsed() >= Duration::from_millis(50));
    }

    #[tokio::test]
    async fn test_sequence_applies_in_order_then_one_ok() {
        let (interp, mock, _motion, mut rx) = interpreter();
        interp
            .on_command(r#"{"m":[[100,100,260,260,500],[105,105,265,265,500],[90,90,270,270,500]]}"#)
            .await;

        let set_alls: Vec<(Vec<(u8, f32)>, u16)> = mock
            .recorded()
            .into_iter()
            .filter_map(|c| match c {
                Call::SetAll(moves, speed) => Some((moves, speed)),
                _ => None,
            })
            .collect();
        assert_eq!(set_alls.len(), 3);
        assert_eq!(set_alls[0].0[1], (2, 100.0));
        assert_eq!(set_alls[1].0[1], (2, 105.0));
        assert_eq!(set_alls[2].0[1], (2, 90.0));

        assert_eq!(drain(&mut rx), vec![r#"{"ok":1}"#]);
    }

    #[tokio::test]
    async fn test_sequence_skips_malformed_members() {
        let (interp, mock, _motion, mut rx) = interpreter();
        interp
            .on_command(r#"{"m":[[100,100,260,260,500],[1,2],"nope",[90,90,270,270,500]]}"#)
            .await;

        let set_alls = mock
            .recorded()
            .iter()
            .filter(|c| matches!(c, Call::SetAll(_, _)))
            .count();
        assert_eq!(set_alls, 2);
        assert_eq!(drain(&mut rx), vec![r#"{"ok":1}"#]);
    }

    #[tokio::test]
    async fn test_stance_command_stops_gait() {
        let (interp, mock, motion, mut rx) = interpreter();
        motion
            .lock()
            .await
            .start_gait(GaitDirection::Forward, Instant::now());

        interp.on_command(r#"{"r":1}"#).await;

        assert!(!motion.lock().await.gait.is_running());
        assert_eq!(drain(&mut rx), vec![r#"{"ok":1}"#]);
        let (moves, _) = mock.last_set_all().unwrap();
        assert_eq!(moves, vec![(1, 270.0), (2, 90.0), (3, 90.0), (4, 270.0)]);
    }

    #[tokio::test]
    async fn test_unknown_and_malformed_are_absorbed() {
        let (interp, mock, _motion, mut rx) = interpreter();
        interp.on_command(r#"{"x":42}"#).await;
        interp.on_command("definitely not json").await;
        interp.on_command(r#"{"s":[90,90]}"#).await; // arity too short
        interp.on_command(r#"{"s":[90,90,"a",270,1000]}"#).await; // bad type

        assert!(drain(&mut rx).is_empty());
        assert!(mock.recorded().is_empty());
    }

    #[tokio::test]
    async fn test_position_feedback() {
        let (interp, mock, _motion, mut rx) = interpreter();
        *mock.angles.lock().unwrap() = [270.0, 90.0, 90.0, 270.0];

        interp.send_position_feedback().await;
        assert_eq!(drain(&mut rx), vec![r#"{"pos":[90,90,270,270]}"#]);
    }

    #[tokio::test]
    async fn test_chunked_command_end_to_end() {
        let (interp, mock, _motion, mut rx) = interpreter();
        let (ack_tx, mut ack_rx) = mpsc::unbounded_channel();
        let mut asm = ChunkAssembler::new(ack_tx);

        let long = format!(
            "{{\"m\":[{}]}}",
            (0..30)
                .map(|_| "[90,90,270,270,1000,0]".to_string())
                .collect::<Vec<_>>()
                .join(",")
        );
        let envelopes = split_into_envelopes(&long, 180);
        assert!(envelopes.len() > 1);

        for env in &envelopes {
            if let Some(payload) = asm.on_bytes(env.as_bytes()) {
                interp.on_command(&payload).await;
            }
        }

        // Every fragment acked, all 30 moves ran, one ok
        assert_eq!(drain(&mut ack_rx).len(), envelopes.len());
        let set_alls = mock
            .recorded()
            .iter()
            .filter(|c| matches!(c, Call::SetAll(_, _)))
            .count();
        assert_eq!(set_alls, 30);
        assert_eq!(drain(&mut rx), vec![r#"{"ok":1}"#]);
    }
}
