pub mod ffmpeg;

use std::path::PathBuf;

use crate::error::RecorderError;

pub use ffmpeg::{EncoderSettings, FfmpegEncoder};

/// What a recording should look like.
#[derive(Clone, Debug)]
pub struct RecordingSpec {
    pub output: PathBuf,
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    /// File whose audio track is muxed into the output, if any.
    pub audio_source: Option<PathBuf>,
}

/// A finished recording.
#[derive(Clone, Debug, PartialEq)]
pub struct Artifact {
    pub path: PathBuf,
    pub frames: u64,
    pub has_audio: bool,
}

/// Sink for composited frames.
///
/// `stop` yields the artifact only after every submitted frame is flushed.
/// `abort` discards whatever was written and never fails.
pub trait Recorder {
    fn start(&mut self, spec: &RecordingSpec) -> Result<(), RecorderError>;
    fn submit_frame(&mut self, rgba: &[u8]) -> Result<(), RecorderError>;
    fn stop(&mut self) -> Result<Artifact, RecorderError>;
    fn abort(&mut self);
    fn is_recording(&self) -> bool;
}

/// Keeps every submitted frame in memory.
#[cfg(test)]
#[derive(Default)]
pub struct MemoryRecorder {
    pub spec: Option<RecordingSpec>,
    pub frames: Vec<Vec<u8>>,
    pub aborted: bool,
    /// Fail `start` with this message.
    pub fail_start: Option<String>,
    recording: bool,
}

#[cfg(test)]
impl Recorder for MemoryRecorder {
    fn start(&mut self, spec: &RecordingSpec) -> Result<(), RecorderError> {
        if let Some(msg) = &self.fail_start {
            return Err(RecorderError::Encoder(msg.clone()));
        }
        self.spec = Some(spec.clone());
        self.frames.clear();
        self.recording = true;
        Ok(())
    }

    fn submit_frame(&mut self, rgba: &[u8]) -> Result<(), RecorderError> {
        if !self.recording {
            return Err(RecorderError::NotStarted);
        }
        self.frames.push(rgba.to_vec());
        Ok(())
    }

    fn stop(&mut self) -> Result<Artifact, RecorderError> {
        if !self.recording {
            return Err(RecorderError::NotStarted);
        }
        self.recording = false;
        let spec = self.spec.as_ref().ok_or(RecorderError::NotStarted)?;
        Ok(Artifact {
            path: spec.output.clone(),
            frames: self.frames.len() as u64,
            has_audio: spec.audio_source.is_some(),
        })
    }

    fn abort(&mut self) {
        self.recording = false;
        self.aborted = true;
        self.frames.clear();
    }

    fn is_recording(&self) -> bool {
        self.recording
    }
}
