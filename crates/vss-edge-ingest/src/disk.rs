//! Disk-budget enforcement for the clip volume.
//!
//! When usage exceeds `max_disk_usage_percent` the budget task raises the
//! shared pause flag (camera workers stop *starting* segments; running
//! segmenters are never signalled) and evicts complete segment files:
//! first anything older than `keep_local_days`, then the oldest beyond
//! `max_local_clips`, oldest first in both phases. A segment counts as
//! complete once it is older than one chunk plus margin, so the file the
//! segmenter is still writing is never a candidate.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use tokio::sync::watch;
use tracing::{info, warn};

use vss_edge_core::disk::disk_usage_percent;

use crate::clips::parse_segment_timestamp;

/// Cadence of the budget check.
pub const BUDGET_CHECK_INTERVAL_SECS: u64 = 60;

/// One complete, evictable segment.
#[derive(Debug, Clone)]
pub struct Segment {
    pub path: PathBuf,
    pub start: DateTime<Utc>,
}

/// Every complete segment under the clip base, oldest first. The
/// `extracted/` tree is not eviction territory.
pub fn collect_segments(clip_base: &Path, chunk_seconds: u32, now: DateTime<Utc>) -> Vec<Segment> {
    let mut segments = Vec::new();
    let completion_age = ChronoDuration::seconds(i64::from(chunk_seconds) * 2);
    collect_into(clip_base, &mut segments);
    segments.retain(|segment| now - segment.start >= completion_age);
    segments.sort_by_key(|segment| segment.start);
    segments
}

fn collect_into(dir: &Path, segments: &mut Vec<Segment>) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            if path.file_name().is_some_and(|name| name == "extracted") {
                continue;
            }
            collect_into(&path, segments);
        } else if let Some(start) = path
            .file_name()
            .and_then(|name| name.to_str())
            .and_then(parse_segment_timestamp)
        {
            segments.push(Segment { path, start });
        }
    }
}

/// Segments past the retention window.
pub fn expired<'a>(
    segments: &'a [Segment],
    now: DateTime<Utc>,
    keep_local_days: u32,
) -> Vec<&'a Segment> {
    let cutoff = now - ChronoDuration::days(i64::from(keep_local_days));
    segments
        .iter()
        .filter(|segment| segment.start < cutoff)
        .collect()
}

/// Oldest segments beyond the local clip count cap.
pub fn overflow(segments: &[Segment], max_local_clips: u64) -> Vec<&Segment> {
    let max = max_local_clips as usize;
    if segments.len() <= max {
        return Vec::new();
    }
    segments[..segments.len() - max].iter().collect()
}

pub struct DiskBudget {
    clip_base: PathBuf,
    chunk_seconds: u32,
    max_disk_usage_percent: f64,
    keep_local_days: u32,
    max_local_clips: u64,
    pause: Arc<AtomicBool>,
}

impl DiskBudget {
    pub fn new(
        clip_base: PathBuf,
        chunk_seconds: u32,
        max_disk_usage_percent: u8,
        keep_local_days: u32,
        max_local_clips: u64,
        pause: Arc<AtomicBool>,
    ) -> Self {
        Self {
            clip_base,
            chunk_seconds,
            max_disk_usage_percent: f64::from(max_disk_usage_percent),
            keep_local_days,
            max_local_clips,
            pause,
        }
    }

    /// Budget loop until shutdown.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker =
            tokio::time::interval(Duration::from_secs(BUDGET_CHECK_INTERVAL_SECS));
        loop {
            tokio::select! {
                _ = ticker.tick() => self.enforce().await,
                _ = shutdown.changed() => return,
            }
        }
    }

    async fn enforce(&self) {
        let Some(usage) = disk_usage_percent(&self.clip_base) else {
            return;
        };

        if usage <= self.max_disk_usage_percent {
            if self.pause.swap(false, Ordering::Relaxed) {
                info!(usage, "disk usage back under budget, resuming ingest");
            }
            return;
        }

        if !self.pause.swap(true, Ordering::Relaxed) {
            warn!(
                usage,
                budget = self.max_disk_usage_percent,
                "disk budget exceeded, pausing new segments and evicting"
            );
        }

        let clip_base = self.clip_base.clone();
        let chunk_seconds = self.chunk_seconds;
        let keep_local_days = self.keep_local_days;
        let max_local_clips = self.max_local_clips;
        let evicted = tokio::task::spawn_blocking(move || {
            let now = Utc::now();
            let segments = collect_segments(&clip_base, chunk_seconds, now);

            let mut victims: Vec<PathBuf> = expired(&segments, now, keep_local_days)
                .into_iter()
                .map(|segment| segment.path.clone())
                .collect();
            for segment in overflow(&segments, max_local_clips) {
                if !victims.contains(&segment.path) {
                    victims.push(segment.path.clone());
                }
            }

            let mut removed = 0_usize;
            for victim in victims {
                if std::fs::remove_file(&victim).is_ok() {
                    removed += 1;
                }
            }
            removed
        })
        .await
        .unwrap_or(0);

        if evicted > 0 {
            info!(evicted, "evicted old segments");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn segment(path: &str, ts: DateTime<Utc>) -> Segment {
        Segment {
            path: PathBuf::from(path),
            start: ts,
        }
    }

    #[test]
    fn collection_skips_extracted_and_incomplete_files() {
        let dir = tempfile::TempDir::new().unwrap();
        let cam = dir.path().join("acme/dev/cam-01/20251116");
        std::fs::create_dir_all(&cam).unwrap();
        std::fs::create_dir_all(dir.path().join("extracted")).unwrap();

        std::fs::write(cam.join("20251116_100000.mp4"), b"old").unwrap();
        std::fs::write(dir.path().join("extracted/cam-01_a_b.mp4"), b"x").unwrap();

        // "now" is well past the segment, so it counts as complete.
        let now = Utc.with_ymd_and_hms(2025, 11, 16, 12, 0, 0).unwrap();
        let segments = collect_segments(dir.path(), 30, now);
        assert_eq!(segments.len(), 1);

        // The same segment is still "in progress" seconds after its start.
        let during = Utc.with_ymd_and_hms(2025, 11, 16, 10, 0, 10).unwrap();
        assert!(collect_segments(dir.path(), 30, during).is_empty());
    }

    #[test]
    fn expiry_honors_keep_local_days() {
        let now = Utc.with_ymd_and_hms(2025, 11, 16, 0, 0, 0).unwrap();
        let segments = vec![
            segment("/c/old.mp4", now - ChronoDuration::days(9)),
            segment("/c/recent.mp4", now - ChronoDuration::days(2)),
        ];

        let victims = expired(&segments, now, 7);
        assert_eq!(victims.len(), 1);
        assert_eq!(victims[0].path, PathBuf::from("/c/old.mp4"));
    }

    #[test]
    fn overflow_evicts_oldest_first() {
        let now = Utc.with_ymd_and_hms(2025, 11, 16, 0, 0, 0).unwrap();
        let segments: Vec<Segment> = (0..5)
            .map(|n| {
                segment(
                    &format!("/c/{n}.mp4"),
                    now - ChronoDuration::minutes(10 - n),
                )
            })
            .collect();

        let victims = overflow(&segments, 3);
        assert_eq!(victims.len(), 2);
        assert_eq!(victims[0].path, PathBuf::from("/c/0.mp4"));
        assert_eq!(victims[1].path, PathBuf::from("/c/1.mp4"));

        assert!(overflow(&segments, 10).is_empty());
    }
}
