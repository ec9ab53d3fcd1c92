//! Disk usage and device sensor readings.
//!
//! Used by the ingest disk-budget task and the control-plane heartbeat.

use std::fs;
use std::path::Path;

use sysinfo::Disks;

/// Percentage of the volume holding `path` that is in use. `None` when no
/// mounted disk contains the path.
pub fn disk_usage_percent(path: &Path) -> Option<f64> {
    let (total, available) = volume_for(path)?;
    if total == 0 {
        return None;
    }
    Some((total - available) as f64 / total as f64 * 100.0)
}

/// Percentage of the volume holding `path` that is still free.
pub fn free_disk_percent(path: &Path) -> Option<f64> {
    disk_usage_percent(path).map(|used| 100.0 - used)
}

/// `(total, available)` bytes of the most specific mount point containing
/// `path`.
fn volume_for(path: &Path) -> Option<(u64, u64)> {
    let disks = Disks::new_with_refreshed_list();
    disks
        .list()
        .iter()
        .filter(|disk| path.starts_with(disk.mount_point()))
        .max_by_key(|disk| disk.mount_point().as_os_str().len())
        .map(|disk| (disk.total_space(), disk.available_space()))
}

/// GPU temperature in degrees Celsius from the sysfs thermal zones, when
/// the platform exposes one. Heartbeat-only; absence is not an error.
pub fn gpu_temp_c() -> Option<f64> {
    let zones = fs::read_dir("/sys/class/thermal").ok()?;
    for entry in zones.flatten() {
        let zone = entry.path();
        let Ok(zone_type) = fs::read_to_string(zone.join("type")) else {
            continue;
        };
        if !zone_type.to_lowercase().contains("gpu") {
            continue;
        }
        if let Ok(raw) = fs::read_to_string(zone.join("temp")) {
            if let Ok(millidegrees) = raw.trim().parse::<i64>() {
                return Some(millidegrees as f64 / 1000.0);
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_volume_reports_sane_usage() {
        // "/" is always mounted; usage must be a percentage.
        if let Some(used) = disk_usage_percent(Path::new("/")) {
            assert!((0.0..=100.0).contains(&used));
            let free = free_disk_percent(Path::new("/")).unwrap();
            assert!((used + free - 100.0).abs() < 0.01);
        }
    }
}
