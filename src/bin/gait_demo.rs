// Crawl gait demo - wave pattern walking
//
// Walks the demo script against real hardware: forward, turn right, turn
// left, forward again, then stop and return to stance.
//
// Usage: cargo run --bin gait_demo -- --port /dev/ttyUSB0
// Pass --dry-run to exercise the sequence without a servo chain attached.

use clap::Parser;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use micropupper_runtime::config;
use micropupper_runtime::motion::{
    GaitConfig, GaitDirection, GaitEngine, LegDriver, NullServo, ServoActuator, StanceConfig,
    Sts3032Bus,
};

#[derive(Parser)]
#[command(about = "Crawl gait demo: forward, turn right, turn left, forward")]
struct Args {
    /// Serial port of the servo chain
    #[arg(long, default_value = config::SERVO_PORT)]
    port: String,

    /// Seconds to walk in each direction
    #[arg(long, default_value_t = 6)]
    seconds: u64,

    /// Use the null actuator instead of hardware
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse().unwrap()))
        .init();

    let args = Args::parse();

    let bus: Box<dyn ServoActuator + Send> = if args.dry_run {
        info!("Dry run: using null actuator");
        Box::new(NullServo::default())
    } else {
        info!("Opening servo bus on {}", args.port);
        Box::new(Sts3032Bus::open(&args.port)?)
    };

    let mut driver = LegDriver::new(bus, StanceConfig::default());
    if !driver.init()? {
        warn!("Some servos not responding, but continuing...");
    }
    sleep(Duration::from_millis(1000)).await;

    let mut engine = GaitEngine::new(GaitConfig::default())?;

    info!(">>> FORWARD - alternating sides for straight motion");
    walk(&mut driver, &mut engine, GaitDirection::Forward, args.seconds).await?;

    info!(">>> TURN RIGHT - same-side consecutive pattern");
    walk(&mut driver, &mut engine, GaitDirection::TurnRight, args.seconds).await?;

    info!(">>> TURN LEFT - mirrored same-side pattern");
    walk(&mut driver, &mut engine, GaitDirection::TurnLeft, args.seconds).await?;

    info!(">>> FORWARD again");
    walk(&mut driver, &mut engine, GaitDirection::Forward, args.seconds).await?;

    info!("Stopping crawl gait");
    let stance = engine.stop();
    driver.move_all(&stance)?;

    info!("Demo complete");
    info!("  FORWARD:    BL -> FR -> BR -> FL (alternating sides)");
    info!("  TURN RIGHT: BL -> BR -> FL -> FR (same-side consecutive)");
    info!("  TURN LEFT:  BR -> BL -> FR -> FL (mirror of turn right)");
    Ok(())
}

async fn walk(
    driver: &mut LegDriver,
    engine: &mut GaitEngine,
    direction: GaitDirection,
    seconds: u64,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let started = Instant::now();
    if let Some(targets) = engine.set_direction(direction, started) {
        driver.move_all(&targets)?;
    }

    let deadline = started + Duration::from_secs(seconds);
    while Instant::now() < deadline {
        sleep(Duration::from_millis(10)).await;
        if let Some(targets) = engine.tick(Instant::now()) {
            driver.move_all(&targets)?;
        }
    }
    Ok(())
}
