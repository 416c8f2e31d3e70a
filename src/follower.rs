// ================================
// src/follower.rs - frame task + fixed-rate command task
// ================================
use anyhow::{Context, Result};
use log::{debug, error, info, warn};
use std::sync::Arc;
use tokio::{
    sync::{mpsc, watch},
    task::JoinHandle,
    time::{interval, MissedTickBehavior},
};

use crate::{
    config::Config,
    control::{SteeringController, VelocityCommand},
    state::SharedOffset,
    vision::{annotate, Frame, FrameError, FrameProcessor},
};

const FRAME_QUEUE: usize = 4;

/// Where velocity commands go (a ROS publisher, a log, a test buffer).
pub trait CommandSink: Send + 'static {
    fn publish(&mut self, command: VelocityCommand) -> Result<()>;
}

/// Receives every processed frame, annotated when a line was found.
pub trait DebugSink: Send + 'static {
    fn show(&mut self, frame: Frame) -> Result<()>;
}

/// Stops every task spawned by a [`LineFollower`].
#[derive(Clone)]
pub struct ShutdownHandle(Arc<watch::Sender<bool>>);

impl ShutdownHandle {
    pub fn trigger(&self) {
        self.0.send_replace(true);
    }

    pub fn is_triggered(&self) -> bool {
        *self.0.borrow()
    }

    /// Triggers shutdown on Ctrl-C, SIGTERM or SIGHUP.
    pub fn install_ctrlc(&self) -> Result<()> {
        let handle = self.clone();
        ctrlc::set_handler(move || {
            info!("Shutdown requested");
            handle.trigger();
        })
        .context("failed to install Ctrl-C handler")
    }
}

/// Producer side of the frame queue, handed to the transport callback.
#[derive(Clone)]
pub struct FrameSender {
    tx: mpsc::Sender<Result<Frame, FrameError>>,
}

impl FrameSender {
    /// Queues a frame without blocking. Returns false when it was dropped.
    pub fn submit(&self, frame: Result<Frame, FrameError>) -> bool {
        match self.tx.try_send(frame) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                debug!("Frame queue full, dropping frame");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }
}

pub struct FollowerTasks {
    frame: JoinHandle<FrameStats>,
    command: JoinHandle<()>,
    debug: Option<JoinHandle<()>>,
}

impl FollowerTasks {
    pub async fn join(self) -> Result<()> {
        self.frame.await.context("frame task panicked")?;
        self.command.await.context("command task panicked")?;
        if let Some(debug) = self.debug {
            debug.await.context("debug task panicked")?;
        }
        Ok(())
    }
}

/// Owns the shared offset and the shutdown signal of one control loop.
pub struct LineFollower {
    config: Config,
    offset: SharedOffset,
    shutdown: ShutdownHandle,
    shutdown_rx: watch::Receiver<bool>,
}

impl LineFollower {
    pub fn new(config: Config) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Self {
            offset: SharedOffset::new(config.steering.initial_offset),
            config,
            shutdown: ShutdownHandle(Arc::new(shutdown_tx)),
            shutdown_rx,
        }
    }

    pub fn offset(&self) -> SharedOffset {
        self.offset.clone()
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    /// Starts the frame and command tasks, plus a debug task when a sink is given.
    pub fn spawn<C: CommandSink>(
        &self,
        command_sink: C,
        debug_sink: Option<Box<dyn DebugSink>>,
    ) -> (FrameSender, FollowerTasks) {
        let (frame_tx, frame_rx) = mpsc::channel(FRAME_QUEUE);

        let (debug_tx, debug) = match debug_sink {
            Some(sink) => {
                let (tx, rx) = mpsc::channel(1);
                (Some(tx), Some(spawn_debug_task(rx, sink)))
            }
            None => (None, None),
        };

        let frame_task = FrameTask {
            processor: FrameProcessor::new(&self.config),
            offset: self.offset.clone(),
            debug_tx,
            marker_radius: self.config.debug.marker_radius,
            stats: FrameStats::default(),
        };
        let frame = tokio::spawn(frame_task.run(frame_rx, self.shutdown_rx.clone()));

        let command_task = CommandTask {
            controller: SteeringController::new(&self.config),
            offset: self.offset.clone(),
            sink: command_sink,
        };
        let command = tokio::spawn(command_task.run(
            self.config.steering.publish_period(),
            self.shutdown_rx.clone(),
        ));

        (
            FrameSender { tx: frame_tx },
            FollowerTasks {
                frame,
                command,
                debug,
            },
        )
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct FrameStats {
    processed: u64,
    detected: u64,
    skipped: u64,
}

struct FrameTask {
    processor: FrameProcessor,
    offset: SharedOffset,
    debug_tx: Option<mpsc::Sender<Frame>>,
    marker_radius: u32,
    stats: FrameStats,
}

impl FrameTask {
    async fn run(
        mut self,
        mut frames: mpsc::Receiver<Result<Frame, FrameError>>,
        mut shutdown: watch::Receiver<bool>,
    ) -> FrameStats {
        while !*shutdown.borrow() {
            let next = tokio::select! {
                _ = shutdown.changed() => break,
                next = frames.recv() => next,
            };
            let Some(mut latest) = next else { break };

            // Skip stale frames and process only the newest
            while let Ok(newer) = frames.try_recv() {
                latest = newer;
            }

            match latest {
                // a full pass over the pixels; keep it off the async scheduler
                Ok(frame) => tokio::task::block_in_place(|| self.handle(frame)),
                Err(e) => {
                    self.stats.skipped += 1;
                    warn!("Skipping frame: {}", e);
                }
            }
        }

        info!(
            "Frame task stopped: {} processed, {} with line, {} skipped",
            self.stats.processed, self.stats.detected, self.stats.skipped
        );
        self.stats
    }

    fn handle(&mut self, frame: Frame) {
        self.stats.processed += 1;
        let detection = self.processor.process(&frame);

        match &detection {
            Some(d) => {
                self.stats.detected += 1;
                self.offset.set(d.offset);
                debug!(
                    "Line at ({}, {}), area {}, offset {}",
                    d.centroid.0, d.centroid.1, d.area, d.offset
                );
            }
            None => debug!("No line in scan band, keeping offset {}", self.offset.get()),
        }

        if let Some(tx) = &self.debug_tx {
            let frame = match &detection {
                Some(d) => annotate(&frame, d, self.marker_radius),
                None => frame,
            };
            // never wait on the debug sink
            let _ = tx.try_send(frame);
        }
    }
}

struct CommandTask<C> {
    controller: SteeringController,
    offset: SharedOffset,
    sink: C,
}

impl<C: CommandSink> CommandTask<C> {
    async fn run(mut self, period: std::time::Duration, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        while !*shutdown.borrow() {
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = ticker.tick() => {
                    let command = self.controller.command(self.offset.get());
                    if let Err(e) = self.sink.publish(command) {
                        error!("Failed to publish command: {:#}", e);
                    }
                }
            }
        }

        info!("Command task stopped");
    }
}

fn spawn_debug_task(mut frames: mpsc::Receiver<Frame>, mut sink: Box<dyn DebugSink>) -> JoinHandle<()> {
    tokio::task::spawn_blocking(move || {
        // ends once the frame task drops its sender
        while let Some(frame) = frames.blocking_recv() {
            if let Err(e) = sink.show(frame) {
                warn!("Debug sink failed: {:#}", e);
            }
        }
    })
}
