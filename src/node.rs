// ================================
// src/node.rs - ROS2 transport for the line follower
// ================================
use anyhow::Result;
use geometry_msgs::msg::Twist;
use log::info;
use rclrs::*;
use sensor_msgs::msg::Image;

use crate::{
    config::Config,
    control::VelocityCommand,
    follower::{CommandSink, DebugSink, FrameSender},
    vision::{Encoding, Frame, FrameError},
};

pub struct LineFollowNode {
    node: Node,
    image_topic: String,
    cmd_publisher: Publisher<Twist>,
    debug_publisher: Option<Publisher<Image>>,
}

impl LineFollowNode {
    pub fn new(executor: &Executor, config: &Config) -> Result<Self, RclrsError> {
        let node = executor.create_node("line_follow_node")?;

        let cmd_publisher = node.create_publisher::<Twist>(config.topics.cmd_vel.as_str())?;
        let debug_publisher = if config.debug.enabled {
            Some(node.create_publisher::<Image>(config.topics.debug_image.as_str())?)
        } else {
            None
        };

        info!("Publishing velocity commands on {}", config.topics.cmd_vel);

        Ok(Self {
            node,
            image_topic: config.topics.image.clone(),
            cmd_publisher,
            debug_publisher,
        })
    }

    /// Starts delivering camera images into `frames`. Keep the returned
    /// subscription alive for as long as frames should flow.
    pub fn subscribe(&self, frames: FrameSender) -> Result<Subscription<Image>, RclrsError> {
        info!("Subscribing to {}", self.image_topic);
        self.node
            .create_subscription::<Image, _>(self.image_topic.as_str(), move |msg: Image| {
                frames.submit(frame_from_msg(msg));
            })
    }

    pub fn command_sink(&self) -> TwistSink {
        TwistSink(self.cmd_publisher.clone())
    }

    pub fn debug_sink(&self) -> Option<Box<dyn DebugSink>> {
        self.debug_publisher
            .clone()
            .map(|publisher| Box::new(ImageSink(publisher)) as Box<dyn DebugSink>)
    }
}

pub fn frame_from_msg(msg: Image) -> Result<Frame, FrameError> {
    let encoding = Encoding::parse(&msg.encoding)?;
    Frame::new(msg.width, msg.height, msg.step as usize, encoding, msg.data)
}

pub fn frame_to_msg(frame: Frame) -> Image {
    let mut msg = Image::default();
    msg.width = frame.width();
    msg.height = frame.height();
    msg.step = frame.width() * 3;
    msg.encoding = Encoding::Rgb8.as_str().to_string();
    msg.data = frame.into_image().into_raw();
    msg
}

pub struct TwistSink(Publisher<Twist>);

impl CommandSink for TwistSink {
    fn publish(&mut self, command: VelocityCommand) -> Result<()> {
        let mut cmd = Twist::default();
        cmd.linear.x = command.linear;
        cmd.angular.z = command.angular;
        self.0.publish(&cmd)?;
        Ok(())
    }
}

pub struct ImageSink(Publisher<Image>);

impl DebugSink for ImageSink {
    fn show(&mut self, frame: Frame) -> Result<()> {
        self.0.publish(&frame_to_msg(frame))?;
        Ok(())
    }
}
