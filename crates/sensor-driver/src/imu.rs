//! Inertial samples delivered by the driver

/// One IMU reading in physical units
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImuSample {
    /// Hardware tick counter (100 µs units)
    pub timestamp: u64,
    /// Acceleration (m/s²)
    pub accel: [f32; 3],
    /// Angular velocity (rad/s)
    pub angular_velocity: [f32; 3],
    /// Die temperature (Celsius), when the sensor reports one
    pub temperature: Option<f32>,
}

impl ImuSample {
    /// Create a sample without a temperature reading
    pub fn new(timestamp: u64, accel: [f32; 3], angular_velocity: [f32; 3]) -> Self {
        Self {
            timestamp,
            accel,
            angular_velocity,
            temperature: None,
        }
    }

    /// Magnitude of the acceleration vector
    pub fn accel_norm(&self) -> f32 {
        self.accel.iter().map(|a| a * a).sum::<f32>().sqrt()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accel_norm() {
        let sample = ImuSample::new(1, [3.0, 4.0, 0.0], [0.0; 3]);
        assert!((sample.accel_norm() - 5.0).abs() < 1e-6);
        assert!(sample.temperature.is_none());
    }
}
