//! Exposure and illumination control
//!
//! Operator keys map to [`Command`]s; [`ExposureControl`] keeps both indices
//! clamped to the driver's tables and pushes every change immediately.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use sensor_driver::{SensorDriver, SensorVariant};
use thiserror::Error;
use tracing::{debug, info};

/// Exposure index applied at driver init
pub const INITIAL_EXPOSURE_INDEX: i32 = 120;

/// Illumination index before the first command
pub const INITIAL_ILLUMINATION_INDEX: i32 = 125;

const ESC: char = '\u{1b}';

/// Control error types
#[derive(Error, Debug, PartialEq)]
pub enum ControlError {
    #[error("{command:?} is not supported on {variant}")]
    Unsupported {
        command: Command,
        variant: SensorVariant,
    },
}

/// Fixed positions in an index table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Preset {
    Min,
    Low,
    High,
    Max,
}

/// Operator command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Quit,
    Save,
    Exposure(Preset),
    ExposureStep(i32),
    ToggleAutoExposure,
    Illumination(Preset),
    IlluminationStep(i32),
    ToggleAutoIllumination,
}

impl Command {
    /// Map a key press to a command
    pub fn from_key(key: char) -> Option<Self> {
        let command = match key {
            ESC => Command::Quit,
            ' ' => Command::Save,
            '1' => Command::Exposure(Preset::Min),
            '2' => Command::Exposure(Preset::Low),
            '3' => Command::Exposure(Preset::High),
            '4' => Command::Exposure(Preset::Max),
            '+' | '=' => Command::ExposureStep(1),
            ']' => Command::ExposureStep(5),
            '-' => Command::ExposureStep(-1),
            '[' => Command::ExposureStep(-5),
            '6' => Command::Illumination(Preset::Min),
            '7' => Command::Illumination(Preset::Low),
            '8' => Command::Illumination(Preset::High),
            '9' => Command::Illumination(Preset::Max),
            '.' => Command::IlluminationStep(1),
            '>' => Command::IlluminationStep(5),
            ',' => Command::IlluminationStep(-1),
            '<' => Command::IlluminationStep(-5),
            'a' | 'A' => Command::ToggleAutoExposure,
            'i' | 'I' => Command::ToggleAutoIllumination,
            _ => return None,
        };
        Some(command)
    }

    /// Parse one line of typed input: a key character or a command word
    pub fn parse_line(line: &str) -> Option<Self> {
        let line = line.trim_end_matches(['\r', '\n']);
        match line.trim() {
            "q" | "quit" | "esc" => return Some(Command::Quit),
            "save" | "space" => return Some(Command::Save),
            _ => {}
        }
        // A bare space is a save trigger, so only strip line endings above
        let mut chars = line.chars();
        match (chars.next(), chars.next()) {
            (Some(key), None) => Self::from_key(key),
            _ => None,
        }
    }
}

/// Exposure / illumination state for one driver
pub struct ExposureControl {
    driver: Arc<dyn SensorDriver>,
    exposure_index: i32,
    illumination_index: i32,
}

impl ExposureControl {
    pub fn new(driver: Arc<dyn SensorDriver>) -> Self {
        Self {
            driver,
            exposure_index: INITIAL_EXPOSURE_INDEX,
            illumination_index: INITIAL_ILLUMINATION_INDEX,
        }
    }

    pub fn exposure_index(&self) -> i32 {
        self.exposure_index
    }

    pub fn illumination_index(&self) -> i32 {
        self.illumination_index
    }

    /// Apply one command.
    ///
    /// Returns whether any driver setting changed. Quit and save are not
    /// control commands and leave everything untouched.
    pub fn apply(
        &mut self,
        command: Command,
        auto_exposure: &AtomicBool,
        auto_illumination: &AtomicBool,
    ) -> Result<bool, ControlError> {
        let variant = self.driver.variant();
        let unsupported = || ControlError::Unsupported { command, variant };

        match command {
            Command::Quit | Command::Save => Ok(false),
            Command::Exposure(_) | Command::ExposureStep(_) | Command::ToggleAutoExposure
                if !variant.supports_exposure_control() =>
            {
                Err(unsupported())
            }
            Command::ToggleAutoIllumination if !variant.supports_illumination_toggle() => {
                Err(unsupported())
            }
            Command::ToggleAutoExposure => {
                let enabled = !auto_exposure.fetch_xor(true, Ordering::SeqCst);
                self.driver.set_auto_exposure(enabled);
                Ok(true)
            }
            Command::ToggleAutoIllumination => {
                let enabled = !auto_illumination.fetch_xor(true, Ordering::SeqCst);
                self.driver.set_auto_illumination(enabled);
                if !enabled {
                    self.illumination_index = 0;
                    self.driver.set_illumination_index(0);
                }
                Ok(true)
            }
            Command::Exposure(preset) => Ok(self.set_exposure(auto_exposure, |_, steps| {
                exposure_preset(preset, steps)
            })),
            Command::ExposureStep(delta) => {
                Ok(self.set_exposure(auto_exposure, |index, _| index + delta))
            }
            Command::Illumination(preset) => {
                Ok(self.set_illumination(auto_illumination, |_, steps| {
                    illumination_preset(preset, steps)
                }))
            }
            Command::IlluminationStep(delta) => {
                Ok(self.set_illumination(auto_illumination, |index, _| index + delta))
            }
        }
    }

    /// Manual exposure change; `target` maps (current index, steps) to the new index
    fn set_exposure(&mut self, auto: &AtomicBool, target: impl FnOnce(i32, i32) -> i32) -> bool {
        if auto.load(Ordering::SeqCst) {
            debug!("Auto exposure on, ignoring manual exposure");
            return false;
        }
        let steps = self.driver.exposure_steps().max(1);
        self.exposure_index = target(self.exposure_index, steps).clamp(0, steps - 1);
        self.driver.set_exposure_index(self.exposure_index);
        info!("Exposure index {}", self.exposure_index);
        true
    }

    fn set_illumination(&mut self, auto: &AtomicBool, target: impl FnOnce(i32, i32) -> i32) -> bool {
        if auto.load(Ordering::SeqCst) {
            debug!("Auto illumination on, ignoring manual illumination");
            return false;
        }
        let steps = self.driver.illumination_steps().max(1);
        self.illumination_index = target(self.illumination_index, steps).clamp(0, steps - 1);
        self.driver.set_illumination_index(self.illumination_index);
        info!("Illumination index {}", self.illumination_index);
        true
    }
}

fn exposure_preset(preset: Preset, steps: i32) -> i32 {
    match preset {
        Preset::Min => 0,
        Preset::Low => (steps as f32 * 0.2) as i32,
        Preset::High => (steps as f32 * 0.6) as i32,
        Preset::Max => steps - 1,
    }
}

fn illumination_preset(preset: Preset, steps: i32) -> i32 {
    match preset {
        Preset::Min => 1,
        Preset::Low => (steps as f32 * 0.2) as i32,
        Preset::High => (steps as f32 * 0.6) as i32,
        Preset::Max => steps - 10,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sensor_driver::synthetic::{EXPOSURE_STEPS, ILLUMINATION_STEPS};
    use sensor_driver::{SensorConfig, SyntheticDriver};

    fn control(variant: SensorVariant) -> (Arc<SyntheticDriver>, ExposureControl) {
        let driver = Arc::new(SyntheticDriver::new(SensorConfig {
            variant,
            ..Default::default()
        }));
        driver.init(INITIAL_EXPOSURE_INDEX).unwrap();
        (driver.clone(), ExposureControl::new(driver))
    }

    fn flags() -> (AtomicBool, AtomicBool) {
        (AtomicBool::new(false), AtomicBool::new(false))
    }

    #[test]
    fn test_key_mapping() {
        assert_eq!(Command::from_key('\u{1b}'), Some(Command::Quit));
        assert_eq!(Command::from_key(' '), Some(Command::Save));
        assert_eq!(Command::from_key('3'), Some(Command::Exposure(Preset::High)));
        assert_eq!(Command::from_key('='), Some(Command::ExposureStep(1)));
        assert_eq!(Command::from_key('['), Some(Command::ExposureStep(-5)));
        assert_eq!(Command::from_key('9'), Some(Command::Illumination(Preset::Max)));
        assert_eq!(Command::from_key('<'), Some(Command::IlluminationStep(-5)));
        assert_eq!(Command::from_key('I'), Some(Command::ToggleAutoIllumination));
        assert_eq!(Command::from_key('x'), None);
    }

    #[test]
    fn test_parse_line() {
        assert_eq!(Command::parse_line("quit\n"), Some(Command::Quit));
        assert_eq!(Command::parse_line(" \n"), Some(Command::Save));
        assert_eq!(Command::parse_line("save"), Some(Command::Save));
        assert_eq!(Command::parse_line("]\r\n"), Some(Command::ExposureStep(5)));
        assert_eq!(Command::parse_line("hello"), None);
        assert_eq!(Command::parse_line(""), None);
    }

    #[test]
    fn test_exposure_steps_clamp() {
        let (driver, mut control) = control(SensorVariant::Xp);
        let (ae, ai) = flags();

        assert!(control.apply(Command::Exposure(Preset::Max), &ae, &ai).unwrap());
        control.apply(Command::ExposureStep(5), &ae, &ai).unwrap();
        assert_eq!(control.exposure_index(), EXPOSURE_STEPS - 1);

        control.apply(Command::Exposure(Preset::Min), &ae, &ai).unwrap();
        control.apply(Command::ExposureStep(-1), &ae, &ai).unwrap();
        assert_eq!(control.exposure_index(), 0);
        assert_eq!(driver.exposure_index(), 0);
    }

    #[test]
    fn test_presets() {
        let (driver, mut control) = control(SensorVariant::XpIrl);
        let (ae, ai) = flags();

        control.apply(Command::Exposure(Preset::Low), &ae, &ai).unwrap();
        assert_eq!(control.exposure_index(), (EXPOSURE_STEPS as f32 * 0.2) as i32);
        control.apply(Command::Exposure(Preset::High), &ae, &ai).unwrap();
        assert_eq!(driver.exposure_index(), (EXPOSURE_STEPS as f32 * 0.6) as i32);

        control.apply(Command::Illumination(Preset::Min), &ae, &ai).unwrap();
        assert_eq!(control.illumination_index(), 1);
        control.apply(Command::Illumination(Preset::Max), &ae, &ai).unwrap();
        assert_eq!(driver.illumination_index(), ILLUMINATION_STEPS - 10);
    }

    #[test]
    fn test_manual_commands_ignored_in_auto() {
        let (driver, mut control) = control(SensorVariant::Xp);
        let (ae, ai) = (AtomicBool::new(true), AtomicBool::new(true));

        assert!(!control.apply(Command::ExposureStep(5), &ae, &ai).unwrap());
        assert!(!control.apply(Command::IlluminationStep(5), &ae, &ai).unwrap());
        assert_eq!(control.exposure_index(), INITIAL_EXPOSURE_INDEX);
        assert_eq!(control.illumination_index(), INITIAL_ILLUMINATION_INDEX);
        assert_eq!(driver.exposure_index(), INITIAL_EXPOSURE_INDEX);
    }

    #[test]
    fn test_toggles() {
        let (driver, mut control) = control(SensorVariant::XpIrl);
        let (ae, ai) = flags();

        control.apply(Command::ToggleAutoExposure, &ae, &ai).unwrap();
        assert!(ae.load(Ordering::SeqCst));
        control.apply(Command::ToggleAutoExposure, &ae, &ai).unwrap();
        assert!(!ae.load(Ordering::SeqCst));

        control.apply(Command::ToggleAutoIllumination, &ae, &ai).unwrap();
        assert!(ai.load(Ordering::SeqCst));
        assert_eq!(control.illumination_index(), INITIAL_ILLUMINATION_INDEX);
        control.apply(Command::ToggleAutoIllumination, &ae, &ai).unwrap();
        assert!(!ai.load(Ordering::SeqCst));
        assert_eq!(control.illumination_index(), 0);
        assert_eq!(driver.illumination_index(), 0);
    }

    #[test]
    fn test_unsupported_commands() {
        let (_, mut li) = control(SensorVariant::Li);
        let (ae, ai) = flags();
        assert_eq!(
            li.apply(Command::ExposureStep(1), &ae, &ai),
            Err(ControlError::Unsupported {
                command: Command::ExposureStep(1),
                variant: SensorVariant::Li,
            })
        );
        assert_eq!(li.exposure_index(), INITIAL_EXPOSURE_INDEX);

        let (_, mut xp2) = control(SensorVariant::Xp2);
        assert!(xp2.apply(Command::ToggleAutoIllumination, &ae, &ai).is_err());
        assert!(!ai.load(Ordering::SeqCst));
        assert!(xp2.apply(Command::Save, &ae, &ai).is_ok());
    }

    /// Driver with degenerate index tables
    struct TinyTables {
        exposure_steps: i32,
        illumination_steps: i32,
        illumination: std::sync::atomic::AtomicI32,
    }

    impl SensorDriver for TinyTables {
        fn variant(&self) -> SensorVariant {
            SensorVariant::XpIrl
        }
        fn init(&self, _: i32) -> Result<(), sensor_driver::DriverError> {
            Ok(())
        }
        fn resolution(&self) -> Result<(u32, u32), sensor_driver::DriverError> {
            Ok((8, 8))
        }
        fn is_color(&self) -> bool {
            false
        }
        fn exposure_steps(&self) -> i32 {
            self.exposure_steps
        }
        fn illumination_steps(&self) -> i32 {
            self.illumination_steps
        }
        fn set_exposure_index(&self, _: i32) {}
        fn set_illumination_index(&self, index: i32) {
            self.illumination.store(index, Ordering::SeqCst);
        }
        fn set_auto_exposure(&self, _: bool) {}
        fn set_auto_illumination(&self, _: bool) {}
        fn capture_rate(&self) -> f32 {
            0.0
        }
        fn imu_rate(&self) -> f32 {
            0.0
        }
        fn run(&self, _: Arc<dyn sensor_driver::SensorSink>) -> Result<(), sensor_driver::DriverError> {
            Ok(())
        }
        fn stop(&self) -> Result<(), sensor_driver::DriverError> {
            Ok(())
        }
    }

    #[test]
    fn test_degenerate_tables_stay_in_range() {
        let driver = Arc::new(TinyTables {
            exposure_steps: 0,
            illumination_steps: 5,
            illumination: std::sync::atomic::AtomicI32::new(-1),
        });
        let mut control = ExposureControl::new(driver.clone());
        let (ae, ai) = flags();

        control.apply(Command::ExposureStep(5), &ae, &ai).unwrap();
        assert_eq!(control.exposure_index(), 0);
        control.apply(Command::Exposure(Preset::Max), &ae, &ai).unwrap();
        assert_eq!(control.exposure_index(), 0);

        // steps - 10 would be negative
        control.apply(Command::Illumination(Preset::Max), &ae, &ai).unwrap();
        assert_eq!(control.illumination_index(), 0);
        assert_eq!(driver.illumination.load(Ordering::SeqCst), 0);
        control.apply(Command::IlluminationStep(50), &ae, &ai).unwrap();
        assert_eq!(control.illumination_index(), 4);
    }
}
