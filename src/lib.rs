// ================================
// src/lib.rs
// ================================
pub mod config;
pub mod control;
pub mod follower;
#[cfg(feature = "ros")]
pub mod node;
pub mod replay;
pub mod state;
pub mod vision;

pub use config::Config;
pub use control::{SteeringController, VelocityCommand};
pub use follower::{CommandSink, DebugSink, FrameSender, LineFollower, ShutdownHandle};
pub use vision::{Detection, Frame, FrameError, FrameProcessor};

/// `RUST_LOG`-driven logger, `info` unless overridden.
pub fn init_logging() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .try_init();
}
