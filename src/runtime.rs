// Runtime wiring: two lines of activity over shared leg ownership
//
// The transport-delivery task turns inbound bytes into commands and may
// sleep on per-move delays. The fixed-rate control loop processes inertial
// samples, advances a running gait, and pushes responses out - it never
// waits on the command path.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, Mutex};
use tokio::time::interval;
use tracing::{info, warn};

// local imports
use crate::command::{split_into_envelopes, ChunkAssembler, CommandInterpreter};
use crate::config::{
    LOOP_HZ, MAX_NOTIFY_LEN, REACTION_TIMING_OFFSET, REACTION_WALK_CYCLES, SERVO_ENABLED,
    SERVO_PORT, TOPIC_CMD, TOPIC_CONN, TOPIC_IMU, TOPIC_RSP,
};
use crate::messages::{ConnEvent, ImuSample, TransportEvent};
use crate::motion::{
    animation, LegDriver, LegTargets, Motion, NullServo, ServoActuator, StanceConfig, Sts3032Bus,
};
use crate::sensor::Push;

pub async fn run() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    info!("Opening Zenoh session...");
    let session = zenoh::open(zenoh::Config::default()).await?;

    info!("Setting up publishers and subscribers...");
    let sub_cmd = session.declare_subscriber(TOPIC_CMD).await?;
    let sub_imu = session.declare_subscriber(TOPIC_IMU).await?;
    let sub_conn = session.declare_subscriber(TOPIC_CONN).await?;
    let pub_rsp = session.declare_publisher(TOPIC_RSP).await?;

    let bus: Box<dyn ServoActuator + Send> = if SERVO_ENABLED {
        info!("Opening servo bus on {}", SERVO_PORT);
        Box::new(Sts3032Bus::open(SERVO_PORT)?)
    } else {
        info!("Servo hardware disabled, using null actuator");
        Box::new(NullServo::default())
    };

    let mut driver = LegDriver::new(bus, StanceConfig::default());
    if !driver.init()? {
        warn!("Some servos not responding, continuing anyway...");
    }

    let legs = Arc::new(Mutex::new(driver));
    let motion = Arc::new(Mutex::new(Motion::with_defaults()?));

    let (rsp_tx, mut rsp_rx) = mpsc::unbounded_channel::<String>();
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<TransportEvent>();

    let assembler = ChunkAssembler::new(rsp_tx.clone());
    let interpreter = CommandInterpreter::new(legs.clone(), motion.clone(), rsp_tx.clone());
    tokio::spawn(transport_task(cmd_rx, assembler, interpreter));

    let mut tick = interval(Duration::from_millis(1000 / LOOP_HZ));
    info!("Runtime started: {}Hz control loop", LOOP_HZ);
    info!("Subscribed to: {}, {}, {}", TOPIC_CMD, TOPIC_IMU, TOPIC_CONN);
    info!("Publishing to: {}", TOPIC_RSP);

    loop {
        tick.tick().await;
        let now = Instant::now();

        // 1. Forward inbound command bytes to the transport task
        while let Ok(Some(sample)) = sub_cmd.try_recv() {
            let bytes = sample.payload().to_bytes().to_vec();
            if cmd_tx.send(TransportEvent::Data(bytes)).is_err() {
                warn!("Transport task is gone, dropping command bytes");
            }
        }

        // 2. Connection state: a disconnect halts the gait and discards any
        // half-assembled command
        while let Ok(Some(sample)) = sub_conn.try_recv() {
            let payload = sample.payload().to_bytes();
            match serde_json::from_slice::<ConnEvent>(&payload) {
                Ok(event) => {
                    info!(
                        "Peer {}",
                        if event.connected { "connected" } else { "disconnected" }
                    );
                    if !event.connected {
                        let targets = motion.lock().await.halt();
                        apply(&legs, &targets).await;
                    }
                    cmd_tx.send(TransportEvent::Connected(event.connected)).ok();
                }
                Err(e) => warn!("Failed to parse connection event: {}", e),
            }
        }

        // 3. Inertial samples: stabilization and push reaction
        while let Ok(Some(sample)) = sub_imu.try_recv() {
            let payload = sample.payload().to_bytes();
            let imu = match serde_json::from_slice::<ImuSample>(&payload) {
                Ok(s) => s,
                Err(e) => {
                    warn!("Failed to parse IMU sample: {}", e);
                    continue;
                }
            };

            let (correction, push) = motion.lock().await.imu_tick(&imu, now);
            if let Some(targets) = correction {
                apply(&legs, &targets).await;
            }
            match push {
                Some(Push::Forward) => spawn_walk_reaction(legs.clone(), motion.clone()),
                Some(Push::Backward) => warn!("Back push reaction not yet implemented"),
                None => {}
            }
        }

        // 4. Gait phase advance
        let gait_targets = motion.lock().await.gait_tick(now);
        if let Some(targets) = gait_targets {
            apply(&legs, &targets).await;
        }

        // 5. Outbound responses, split to the notify size limit
        while let Ok(response) = rsp_rx.try_recv() {
            for envelope in split_into_envelopes(&response, MAX_NOTIFY_LEN) {
                pub_rsp.put(envelope).await?;
            }
        }
    }
}

/// Apply targets through the one leg driver; a servo failure is logged,
/// never fatal to the loop.
async fn apply(legs: &Arc<Mutex<LegDriver>>, targets: &LegTargets) {
    if let Err(e) = legs.lock().await.move_all(targets) {
        warn!("Servo move failed: {}", e);
    }
}

/// The transport-delivery context: reassembly plus command execution.
/// Per-move delays sleep here without stalling the control loop.
async fn transport_task(
    mut rx: mpsc::UnboundedReceiver<TransportEvent>,
    mut assembler: ChunkAssembler,
    interpreter: CommandInterpreter,
) {
    while let Some(event) = rx.recv().await {
        match event {
            TransportEvent::Data(bytes) => {
                if let Some(command) = assembler.on_bytes(&bytes) {
                    interpreter.on_command(&command).await;
                }
            }
            TransportEvent::Connected(true) => interpreter.send_position_feedback().await,
            TransportEvent::Connected(false) => assembler.reset(),
        }
    }
}

/// One-shot walk-forward playback for a front push. Runs detached so the
/// control loop keeps its rate; the animation bracket keeps the gait and
/// stabilizer off the legs while it plays.
fn spawn_walk_reaction(legs: Arc<Mutex<LegDriver>>, motion: Arc<Mutex<Motion>>) {
    tokio::spawn(async move {
        let restore = motion.lock().await.begin_animation();
        let played = animation::play(
            &legs,
            animation::WALK_FORWARD,
            REACTION_WALK_CYCLES,
            REACTION_TIMING_OFFSET,
        )
        .await;
        if let Err(e) = played {
            warn!("Reaction playback failed: {}", e);
        }
        motion.lock().await.end_animation(restore, Instant::now());
    });
}
