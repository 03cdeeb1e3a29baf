// Loop rate, transport keys, servo bus and control-loop tunables
use std::time::Duration;

// Control loop frequency (gait phase advance, IMU processing, response drain)
pub const LOOP_HZ: u64 = 50;

// Zenoh key expressions. The BLE bridge republishes characteristic writes on
// TOPIC_CMD and connection state on TOPIC_CONN, and forwards everything we
// put on TOPIC_RSP back to the peer as notifications. The IMU daemon
// publishes samples on TOPIC_IMU.
pub const TOPIC_CMD: &str = "pupper/cmd"; // inbound command bytes
pub const TOPIC_RSP: &str = "pupper/rsp"; // outbound notify payloads
pub const TOPIC_IMU: &str = "pupper/imu"; // inertial samples
pub const TOPIC_CONN: &str = "pupper/conn"; // peer connection state

// Serial port for the STS3032 servo chain
pub const SERVO_PORT: &str = "/dev/ttyUSB0";

// Enable hardware servo control (set to false for simulation/testing)
pub const SERVO_ENABLED: bool = true;

// Reassembly buffer capacity for chunked commands (bytes)
pub const CHUNK_BUFFER_SIZE: usize = 2048;

// Largest payload the bridge can push out in a single notification.
// Longer responses are split into {"k":n,"t":total,"d":"..."} envelopes.
pub const MAX_NOTIFY_LEN: usize = 180;

// Stance table (unified angles, degrees). Right-side servos are reversed by
// the leg driver, so front legs share one angle and back legs another.
pub const STANCE_FRONT: f32 = 90.0;
pub const STANCE_BACK: f32 = 270.0;
pub const SWING_AMPLITUDE: f32 = 25.0;
pub const DEFAULT_SPEED: u16 = 1000;

// Crawl gait step phase duration and servo speed while walking
pub const STEP_DURATION: Duration = Duration::from_millis(250);
pub const GAIT_SPEED: u16 = 3000;

// Gyro stabilization
pub const STABILIZE_ENABLED_DEFAULT: bool = true;
pub const STABILIZE_UPDATE_INTERVAL: Duration = Duration::from_millis(20);
pub const STABILIZE_DEADZONE: f32 = 1.0; // deg/s treated as zero
pub const STABILIZE_SMOOTHING: f32 = 0.3; // low-pass alpha
pub const STABILIZE_GAIN: f32 = 0.08; // deg/s -> correction degrees
pub const STABILIZE_MAX_CORRECTION: f32 = 20.0; // degrees
pub const STABILIZE_SPEED_THRESHOLD: f32 = 2.0; // degrees of change = full speed
pub const STABILIZE_SPEED_MIN: u16 = 200;
pub const STABILIZE_SPEED_MAX: u16 = 3000;
pub const STABILIZE_SPEED_CURVE: f32 = 2.5;

// Push reaction (delta-based impulse detection)
pub const REACTION_DELTA_THRESHOLD: f32 = 5.0; // m/s^2 change between samples
pub const REACTION_MIN_ACCEL: f32 = 3.0; // m/s^2 floor on the current sample
pub const REACTION_COOLDOWN: Duration = Duration::from_millis(2000);
pub const REACTION_WALK_CYCLES: u32 = 3;
pub const REACTION_TIMING_OFFSET: Duration = Duration::from_millis(100);
