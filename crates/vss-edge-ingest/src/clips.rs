//! On-demand clip extraction from the date-partitioned segment tree.
//!
//! Segment files are named `YYYYMMDD_HHMMSS.mp4` under
//! `{camera_dir}/{YYYYMMDD}/`; each covers `[name timestamp,
//! name timestamp + chunk_seconds)`. Extraction selects every overlapping
//! segment and stitches them with the ffmpeg concat demuxer (stream copy)
//! into `{clip_base}/extracted/`.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration as ChronoDuration, NaiveDateTime, TimeZone, Utc};
use tokio::process::Command;
use tracing::{debug, info};

use crate::error::IngestError;

/// One recorded segment.
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentFile {
    pub path: PathBuf,
    pub start: DateTime<Utc>,
}

/// Parse `YYYYMMDD_HHMMSS.mp4` into its starting timestamp.
pub fn parse_segment_timestamp(file_name: &str) -> Option<DateTime<Utc>> {
    let stem = file_name.strip_suffix(".mp4")?;
    let naive = NaiveDateTime::parse_from_str(stem, "%Y%m%d_%H%M%S").ok()?;
    Some(Utc.from_utc_datetime(&naive))
}

/// Timestamp rendering used in extracted-clip file names (`:`-free).
pub fn compact_timestamp(ts: DateTime<Utc>) -> String {
    ts.format("%Y%m%d%H%M%S").to_string()
}

/// All segments of one camera overlapping `[from, to]`, sorted by start.
pub fn find_overlapping_segments(
    camera_dir: &Path,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
    chunk_seconds: u32,
) -> std::io::Result<Vec<SegmentFile>> {
    let chunk = ChronoDuration::seconds(i64::from(chunk_seconds));
    let mut segments = Vec::new();

    let Ok(date_dirs) = std::fs::read_dir(camera_dir) else {
        return Ok(segments);
    };
    for date_dir in date_dirs.flatten() {
        if !date_dir.path().is_dir() {
            continue;
        }
        for entry in std::fs::read_dir(date_dir.path())?.flatten() {
            let name = entry.file_name();
            let Some(start) = name.to_str().and_then(parse_segment_timestamp) else {
                continue;
            };
            let end = start + chunk;
            if start < to && end > from {
                segments.push(SegmentFile {
                    path: entry.path(),
                    start,
                });
            }
        }
    }

    segments.sort_by_key(|segment| segment.start);
    Ok(segments)
}

/// Extract a single stitched clip covering `[from, to]` for one camera.
/// Returns the path of the produced file under `{clip_base}/extracted/`.
pub async fn extract_clip(
    clip_base: &Path,
    camera_dir: &Path,
    camera_id: &str,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
    chunk_seconds: u32,
) -> Result<PathBuf, IngestError> {
    let camera_dir = camera_dir.to_path_buf();
    let segments = {
        let camera_dir = camera_dir.clone();
        tokio::task::spawn_blocking(move || {
            find_overlapping_segments(&camera_dir, from, to, chunk_seconds)
        })
        .await
        .map_err(|e| IngestError::SpawnFailed {
            message: format!("blocking pool failed: {e}"),
        })??
    };

    if segments.is_empty() {
        return Err(IngestError::NoSegments {
            camera_id: camera_id.to_string(),
            from: from.to_rfc3339(),
            to: to.to_rfc3339(),
        });
    }
    debug!(
        camera_id,
        count = segments.len(),
        "stitching overlapping segments"
    );

    let out_dir = clip_base.join("extracted");
    tokio::fs::create_dir_all(&out_dir).await?;
    let output = out_dir.join(format!(
        "{camera_id}_{}_{}.mp4",
        compact_timestamp(from),
        compact_timestamp(to)
    ));

    // Concat demuxer input list; one absolute path per line.
    let list_path = out_dir.join(format!(
        ".concat_{camera_id}_{}_{}.txt",
        compact_timestamp(from),
        compact_timestamp(to)
    ));
    let mut list = String::new();
    for segment in &segments {
        list.push_str(&format!("file '{}'\n", segment.path.display()));
    }
    tokio::fs::write(&list_path, list).await?;

    let result = run_concat(&list_path, &output).await;
    let _ = tokio::fs::remove_file(&list_path).await;
    result?;

    info!(camera_id, output = %output.display(), "clip extracted");
    Ok(output)
}

async fn run_concat(list_path: &Path, output: &Path) -> Result<(), IngestError> {
    let result = Command::new("ffmpeg")
        .args([
            "-y",
            "-f",
            "concat",
            "-safe",
            "0",
            "-i",
            &list_path.display().to_string(),
            "-c",
            "copy",
            &output.display().to_string(),
        ])
        .output()
        .await
        .map_err(|e| IngestError::SpawnFailed {
            message: e.to_string(),
        })?;

    if !result.status.success() {
        return Err(IngestError::FfmpegFailed {
            status: result.status.to_string(),
            stderr: String::from_utf8_lossy(&result.stderr).into_owned(),
        });
    }
    Ok(())
}
