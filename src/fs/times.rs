//! Modification-time helpers.
//!
//! A link-based lock's mtime is its last-refresh timestamp. Hosts sharing a
//! filesystem may disagree on the clock, so an mtime in the future counts as
//! age zero rather than as an error.

use chrono::{DateTime, Utc};
use std::fs::File;
use std::io;
use std::path::Path;
use std::time::{Duration, SystemTime};

/// Modification time of the file at `path`.
pub fn modified_at(path: &Path) -> io::Result<SystemTime> {
    std::fs::metadata(path)?.modified()
}

/// Time elapsed since `time`, clamped to zero for timestamps in the future.
pub fn age_since(time: SystemTime) -> Duration {
    SystemTime::now()
        .duration_since(time)
        .unwrap_or(Duration::ZERO)
}

/// Set the modification time of an open file to now.
pub fn touch(file: &File) -> io::Result<()> {
    file.set_modified(SystemTime::now())
}

pub fn system_time_to_utc(time: SystemTime) -> DateTime<Utc> {
    DateTime::<Utc>::from(time)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn future_timestamps_have_zero_age() {
        let future = SystemTime::now() + Duration::from_secs(3600);
        assert_eq!(age_since(future), Duration::ZERO);
    }

    #[test]
    fn touch_moves_mtime_forward() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("lease");
        let file = File::create(&path).unwrap();

        file.set_modified(SystemTime::now() - Duration::from_secs(600))
            .unwrap();
        assert!(age_since(modified_at(&path).unwrap()) >= Duration::from_secs(600));

        touch(&file).unwrap();
        assert!(age_since(modified_at(&path).unwrap()) < Duration::from_secs(60));
    }
}
