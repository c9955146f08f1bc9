//! Record directory preparation

use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use tracing::{info, warn};

use crate::imu_writer::IMU_FILE;
use crate::LoggerError;

/// Create the record directory, moving to a timestamped sibling when it
/// already holds a continuous recording
pub fn prepare_record_path(path: &Path, manual_trigger: bool) -> Result<PathBuf, LoggerError> {
    prepare_record_path_at(path, manual_trigger, Local::now())
}

/// [`prepare_record_path`] with an explicit clock
pub fn prepare_record_path_at(
    path: &Path,
    manual_trigger: bool,
    now: DateTime<Local>,
) -> Result<PathBuf, LoggerError> {
    let mut target = path.to_path_buf();
    if !manual_trigger && target.join(IMU_FILE).exists() {
        let mut name = target.as_os_str().to_os_string();
        name.push(now.format("_%H%M%S").to_string());
        target = PathBuf::from(name);
        warn!(
            "{} already holds a recording, using {}",
            path.display(),
            target.display()
        );
    }
    std::fs::create_dir_all(&target)?;
    info!("Record path {}", target.display());
    Ok(target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn temp_dir(tag: &str) -> PathBuf {
        std::env::temp_dir().join(format!("xp-logger-record-{}-{}", tag, std::process::id()))
    }

    #[test]
    fn test_creates_missing_directory() {
        let dir = temp_dir("fresh");
        let prepared = prepare_record_path(&dir, false).unwrap();
        assert_eq!(prepared, dir);
        assert!(dir.is_dir());
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_existing_recording_gets_suffix() {
        let dir = temp_dir("busy");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join(IMU_FILE), "1 0 0 9.8 0 0 0 999\n").unwrap();
        let now = Local.with_ymd_and_hms(2024, 1, 2, 13, 4, 5).unwrap();

        let prepared = prepare_record_path_at(&dir, false, now).unwrap();
        let expected = PathBuf::from(format!("{}_130405", dir.display()));
        assert_eq!(prepared, expected);
        assert!(expected.is_dir());

        // Manual trigger keeps adding frames to the same directory
        assert_eq!(prepare_record_path_at(&dir, true, now).unwrap(), dir);

        std::fs::remove_dir_all(&dir).unwrap();
        std::fs::remove_dir_all(&expected).unwrap();
    }
}
