// Motion-control core for the MicroPupper quadruped
//
// Turns commands arriving over an MTU-limited wireless link and onboard
// inertial readings into per-leg servo targets: chunked-message reassembly,
// a small JSON command vocabulary, a crawl gait engine, and gyro
// stabilization with push reaction.

pub mod command;
pub mod config;
pub mod messages;
pub mod motion;
pub mod runtime;
pub mod sensor;
