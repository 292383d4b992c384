use serde::Deserialize;
use std::path::Path;
use std::process::Command;

use super::MediaInfo;
use crate::error::MediaError;

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
    #[serde(default)]
    format: Option<ProbeFormat>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    codec_type: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    avg_frame_rate: Option<String>,
    r_frame_rate: Option<String>,
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
}

/// Ask ffprobe for stream geometry, frame rate, duration and audio presence.
pub fn probe(path: &Path) -> Result<MediaInfo, MediaError> {
    if !path.exists() {
        return Err(MediaError::SourceUnavailable {
            path: path.to_path_buf(),
            reason: "file not found".into(),
        });
    }

    let output = Command::new("ffprobe")
        .args(["-v", "error", "-print_format", "json", "-show_streams", "-show_format"])
        .arg(path)
        .output()
        .map_err(|e| MediaError::SourceUnavailable {
            path: path.to_path_buf(),
            reason: format!("failed to run ffprobe: {}", e),
        })?;

    if !output.status.success() {
        return Err(MediaError::SourceUnavailable {
            path: path.to_path_buf(),
            reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    let info = parse_probe_json(&String::from_utf8_lossy(&output.stdout))?;
    log::info!(
        "Probed {}: {}x{} @ {:.3}fps, {:.1}s, audio={}",
        path.display(),
        info.width,
        info.height,
        info.fps,
        info.duration,
        info.has_audio
    );
    Ok(info)
}

pub(crate) fn parse_probe_json(json: &str) -> Result<MediaInfo, MediaError> {
    let parsed: ProbeOutput =
        serde_json::from_str(json).map_err(|e| MediaError::Probe(e.to_string()))?;

    let video = parsed
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"))
        .ok_or_else(|| MediaError::Probe("no video stream".into()))?;
    let has_audio = parsed
        .streams
        .iter()
        .any(|s| s.codec_type.as_deref() == Some("audio"));

    let width = video.width.ok_or_else(|| MediaError::Probe("video width missing".into()))?;
    let height = video.height.ok_or_else(|| MediaError::Probe("video height missing".into()))?;

    let fps = video
        .avg_frame_rate
        .as_deref()
        .and_then(parse_rate)
        .or_else(|| video.r_frame_rate.as_deref().and_then(parse_rate))
        .ok_or_else(|| MediaError::Probe("video frame rate missing".into()))?;

    let duration = parsed
        .format
        .as_ref()
        .and_then(|f| f.duration.as_deref())
        .or(video.duration.as_deref())
        .and_then(|d| d.parse::<f64>().ok())
        .filter(|d| d.is_finite() && *d > 0.0)
        .ok_or_else(|| MediaError::Probe("duration missing".into()))?;

    Ok(MediaInfo {
        width,
        height,
        fps,
        duration,
        has_audio,
    })
}

/// "30000/1001" or "25" to frames per second. "0/0" is treated as absent.
fn parse_rate(rate: &str) -> Option<f64> {
    let value = match rate.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.trim().parse().ok()?;
            let den: f64 = den.trim().parse().ok()?;
            if den == 0.0 {
                return None;
            }
            num / den
        }
        None => rate.trim().parse().ok()?,
    };
    (value.is_finite() && value > 0.0).then_some(value)
}
