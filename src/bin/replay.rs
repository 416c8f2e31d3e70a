use anyhow::{Context, Result};
use line_follow::{
    replay::{feed_frames, list_frames, LogSink, PngDebugSink},
    Config, DebugSink, LineFollower,
};
use log::info;
use std::path::Path;

#[tokio::main(flavor = "multi_thread", worker_threads = 2)]
async fn main() -> Result<()> {
    line_follow::init_logging();
    info!("Camera line follower (offline replay)");

    let config = Config::load()?;
    log::debug!("{:#?}", config);

    let paths = list_frames(Path::new(&config.replay.frames_dir))?;
    info!(
        "Replaying {} frames from {}",
        paths.len(),
        config.replay.frames_dir
    );

    let debug_sink: Option<Box<dyn DebugSink>> = match &config.replay.output_dir {
        Some(dir) if config.debug.enabled => Some(Box::new(
            PngDebugSink::new(dir).context("failed to prepare debug output")?,
        )),
        _ => None,
    };

    let rate_hz = config.replay.frame_rate_hz;
    let linger = config.steering.publish_period();
    let follower = LineFollower::new(config);
    let shutdown = follower.shutdown_handle();
    shutdown.install_ctrlc()?;

    let (frames, tasks) = follower.spawn(LogSink::default(), debug_sink);
    let feeder = tokio::spawn(feed_frames(paths, frames, rate_hz, linger, shutdown));

    feeder.await.context("frame feeder panicked")?;
    tasks.join().await?;

    info!("Final offset: {}", follower.offset().get());
    Ok(())
}
