// ================================
// src/replay.rs - offline frames from disk, commands to the log
// ================================
use anyhow::{Context, Result};
use log::{info, warn};
use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};
use tokio::time::interval;

use crate::{
    control::VelocityCommand,
    follower::{CommandSink, DebugSink, FrameSender, ShutdownHandle},
    vision::Frame,
};

const FRAME_EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

/// Image files in `dir`, sorted by file name.
pub fn list_frames(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut paths: Vec<PathBuf> = fs::read_dir(dir)
        .with_context(|| format!("failed to read frame directory {}", dir.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| FRAME_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
                .unwrap_or(false)
        })
        .collect();
    paths.sort();
    Ok(paths)
}

pub fn load_frame(path: &Path) -> Result<Frame> {
    let img = image::open(path)
        .with_context(|| format!("failed to open {}", path.display()))?
        .into_rgb8();
    Ok(Frame::from_image(img)?)
}

/// Feeds `paths` at `rate_hz`, then requests shutdown one `linger` later.
pub async fn feed_frames(
    paths: Vec<PathBuf>,
    frames: FrameSender,
    rate_hz: f64,
    linger: Duration,
    shutdown: ShutdownHandle,
) {
    let mut ticker = interval(Duration::from_secs_f64(1.0 / rate_hz));

    for path in paths {
        if shutdown.is_triggered() {
            return;
        }
        ticker.tick().await;
        let loaded = tokio::task::spawn_blocking(move || {
            let frame = load_frame(&path);
            (path, frame)
        })
        .await;
        match loaded {
            Ok((_, Ok(frame))) => {
                frames.submit(Ok(frame));
            }
            Ok((path, Err(e))) => warn!("Skipping {}: {:#}", path.display(), e),
            Err(e) => warn!("Frame loader panicked: {}", e),
        }
    }

    tokio::time::sleep(linger).await;
    info!("All frames replayed");
    shutdown.trigger();
}

/// Logs each command.
#[derive(Debug, Default)]
pub struct LogSink {
    published: u64,
}

impl CommandSink for LogSink {
    fn publish(&mut self, command: VelocityCommand) -> Result<()> {
        self.published += 1;
        info!(
            "cmd #{}: linear {:.3}, angular {:.3}",
            self.published, command.linear, command.angular
        );
        Ok(())
    }
}

/// Writes every debug frame to `dir` as a numbered PNG.
pub struct PngDebugSink {
    dir: PathBuf,
    written: u64,
}

impl PngDebugSink {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create {}", dir.display()))?;
        Ok(Self { dir, written: 0 })
    }
}

impl DebugSink for PngDebugSink {
    fn show(&mut self, frame: Frame) -> Result<()> {
        let path = self.dir.join(format!("frame_{:05}.png", self.written));
        frame
            .as_image()
            .save(&path)
            .with_context(|| format!("failed to write {}", path.display()))?;
        self.written += 1;
        Ok(())
    }
}
