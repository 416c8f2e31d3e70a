// ================================
// src/control.rs - offset -> velocity command
// ================================
use crate::Config;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct VelocityCommand {
    /// Forward speed in the robot's units (m/s for a turtlebot).
    pub linear: f64,
    /// Turn rate; positive turns left.
    pub angular: f64,
}

// Proportional steering
pub struct SteeringController {
    linear_speed: f64,
    gain_divisor: f64,
}

impl SteeringController {
    pub fn new(config: &Config) -> Self {
        Self {
            linear_speed: config.steering.linear_speed,
            gain_divisor: config.steering.gain_divisor,
        }
    }

    /// A line right of center (positive offset) turns right (negative angular).
    pub fn command(&self, offset: i32) -> VelocityCommand {
        VelocityCommand {
            linear: self.linear_speed,
            angular: -(offset as f64) / self.gain_divisor,
        }
    }
}
