// ================================
// src/main.rs
// ================================
use anyhow::{Context as _, Result};
use line_follow::{node::LineFollowNode, Config, LineFollower};
use log::info;
use rclrs::*;
use std::time::Duration;

const SPIN_SLICE: Duration = Duration::from_millis(100);

#[tokio::main(flavor = "multi_thread", worker_threads = 2)]
async fn main() -> Result<()> {
    line_follow::init_logging();
    info!("Camera line follower (ROS 2)");

    let config = Config::load()?;
    log::debug!("{:#?}", config);

    // Without a transport there is nowhere to send commands
    let context = Context::default_from_env().context("ROS 2 transport unavailable")?;
    let mut executor = context.create_basic_executor();
    let node = LineFollowNode::new(&executor, &config).context("failed to create node")?;

    let follower = LineFollower::new(config);
    let shutdown = follower.shutdown_handle();
    shutdown.install_ctrlc()?;

    let (frames, tasks) = follower.spawn(node.command_sink(), node.debug_sink());
    let _image_subscription = node.subscribe(frames).context("failed to subscribe")?;

    info!("Starting ROS2 executor...");
    let spin_result = tokio::task::block_in_place(|| {
        while !shutdown.is_triggered() {
            executor
                .spin(SpinOptions::default().timeout(SPIN_SLICE))
                .first_error()?;
        }
        Ok::<_, RclrsError>(())
    });

    shutdown.trigger();
    tasks.join().await?;
    spin_result.context("executor failed")
}
