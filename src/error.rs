//! Error types for the media, recording and export boundaries.
//!
//! Every failure is terminal for the operation that raised it. The host
//! reports it and returns to an idle state; nothing here aborts the process.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MediaError {
    /// The file could not be opened or decoded at all.
    #[error("media source unavailable: {path}: {reason}")]
    SourceUnavailable { path: PathBuf, reason: String },

    /// The container has no decodable audio track, so no spectral pipeline.
    #[error("no audio track in {0}")]
    NoAudioTrack(PathBuf),

    #[error("audio decode failed: {0}")]
    Decode(String),

    #[error("ffprobe output could not be parsed: {0}")]
    Probe(String),

    #[error("playback could not start: {0}")]
    PlaybackRejected(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum RecorderError {
    #[error("failed to spawn ffmpeg (is ffmpeg installed?): {0}")]
    Spawn(#[source] std::io::Error),

    #[error("recorder is not started")]
    NotStarted,

    #[error("frame size mismatch: expected {expected} bytes, got {got}")]
    FrameSize { expected: usize, got: usize },

    #[error("failed to write frame to encoder: {0}")]
    Write(#[source] std::io::Error),

    #[error("encoder exited with error:\n{0}")]
    Encoder(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("export is disabled: the media has no usable audio pipeline")]
    Disabled,

    #[error("export cannot run while a detection pass is active")]
    DetectionActive,

    #[error("playback could not be started for export: {0}")]
    PlaybackStart(#[source] MediaError),

    #[error("playback failed during export: {0}")]
    Playback(#[source] MediaError),

    #[error("recorder failed: {0}")]
    Recorder(#[from] RecorderError),
}
