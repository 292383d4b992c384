use std::io::Write;
use std::path::Path;
use std::process::{Child, Command, Stdio};

use super::{Artifact, Recorder, RecordingSpec};
use crate::config::OutputConfig;
use crate::error::RecorderError;
use crate::media::VideoFrame;

/// Codec settings handed to ffmpeg.
#[derive(Clone, Debug)]
pub struct EncoderSettings {
    pub codec: String,
    pub pix_fmt: String,
    pub crf: u32,
    /// Target video bitrate; overrides `crf` when set.
    pub bitrate: Option<String>,
    pub audio_bitrate: String,
}

impl From<&OutputConfig> for EncoderSettings {
    fn from(output: &OutputConfig) -> Self {
        Self {
            codec: output.codec.clone(),
            pix_fmt: output.pix_fmt.clone(),
            crf: output.crf,
            bitrate: output.bitrate.clone(),
            audio_bitrate: output.audio_bitrate.clone(),
        }
    }
}

struct ActiveRecording {
    child: Child,
    spec: RecordingSpec,
    frame_len: usize,
    frames: u64,
}

/// Pipes raw RGBA frames into an `ffmpeg` child and muxes the source audio.
pub struct FfmpegEncoder {
    settings: EncoderSettings,
    session: Option<ActiveRecording>,
}

impl FfmpegEncoder {
    pub fn new(settings: EncoderSettings) -> Self {
        Self {
            settings,
            session: None,
        }
    }

    fn discard(session: ActiveRecording) {
        let ActiveRecording { mut child, spec, .. } = session;
        let _ = child.kill();
        let _ = child.wait();
        remove_partial(&spec.output);
    }
}

pub(crate) fn build_args(settings: &EncoderSettings, spec: &RecordingSpec) -> Vec<String> {
    let mut args = vec![
        "-y".to_string(),
        "-loglevel".into(), "error".into(),
        "-f".into(), "rawvideo".into(),
        "-pixel_format".into(), "rgba".into(),
        "-video_size".into(), format!("{}x{}", spec.width, spec.height),
        "-framerate".into(), format!("{}", spec.fps),
        "-i".into(), "pipe:0".into(),
    ];

    if let Some(audio) = &spec.audio_source {
        args.extend([
            "-i".into(), audio.to_string_lossy().into_owned(),
            "-map".into(), "0:v:0".into(),
            "-map".into(), "1:a:0?".into(),
        ]);
    }

    args.extend([
        "-c:v".into(), settings.codec.clone(),
        "-pix_fmt".into(), settings.pix_fmt.clone(),
    ]);

    if let Some(br) = &settings.bitrate {
        args.extend(["-b:v".to_string(), br.clone()]);
    } else {
        args.extend(["-crf".to_string(), settings.crf.to_string()]);
        args.extend(["-preset".to_string(), "medium".to_string()]);
    }

    if spec.audio_source.is_some() {
        args.extend([
            "-c:a".into(), "aac".into(),
            "-b:a".into(), settings.audio_bitrate.clone(),
            "-shortest".into(),
        ]);
    } else {
        args.push("-an".into());
    }

    args.push(spec.output.to_string_lossy().into_owned());
    args
}

fn remove_partial(path: &Path) {
    if path.exists() {
        match std::fs::remove_file(path) {
            Ok(()) => log::debug!("Removed partial output {}", path.display()),
            Err(e) => log::warn!("Could not remove partial output {}: {}", path.display(), e),
        }
    }
}

impl Recorder for FfmpegEncoder {
    fn start(&mut self, spec: &RecordingSpec) -> Result<(), RecorderError> {
        if let Some(previous) = self.session.take() {
            log::warn!("Encoder restarted before stop; discarding previous output");
            Self::discard(previous);
        }

        let args = build_args(&self.settings, spec);
        let child = Command::new("ffmpeg")
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(RecorderError::Spawn)?;

        log::info!(
            "FFmpeg encoder started: {}x{} @ {:.3}fps, codec={}, audio={}",
            spec.width,
            spec.height,
            spec.fps,
            self.settings.codec,
            spec.audio_source.is_some()
        );

        self.session = Some(ActiveRecording {
            child,
            spec: spec.clone(),
            frame_len: VideoFrame::byte_len(spec.width, spec.height),
            frames: 0,
        });
        Ok(())
    }

    fn submit_frame(&mut self, rgba: &[u8]) -> Result<(), RecorderError> {
        let session = self.session.as_mut().ok_or(RecorderError::NotStarted)?;
        if rgba.len() != session.frame_len {
            return Err(RecorderError::FrameSize {
                expected: session.frame_len,
                got: rgba.len(),
            });
        }
        let stdin = session.child.stdin.as_mut().ok_or(RecorderError::NotStarted)?;
        stdin.write_all(rgba).map_err(RecorderError::Write)?;
        session.frames += 1;
        Ok(())
    }

    fn stop(&mut self) -> Result<Artifact, RecorderError> {
        let mut session = self.session.take().ok_or(RecorderError::NotStarted)?;

        // Close stdin to signal EOF
        drop(session.child.stdin.take());

        let output = match session.child.wait_with_output() {
            Ok(output) => output,
            Err(e) => {
                remove_partial(&session.spec.output);
                return Err(e.into());
            }
        };

        if !output.status.success() {
            remove_partial(&session.spec.output);
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(RecorderError::Encoder(stderr.trim().to_string()));
        }

        log::info!(
            "FFmpeg encoding complete: {} frames -> {}",
            session.frames,
            session.spec.output.display()
        );
        Ok(Artifact {
            path: session.spec.output,
            frames: session.frames,
            has_audio: session.spec.audio_source.is_some(),
        })
    }

    fn abort(&mut self) {
        if let Some(session) = self.session.take() {
            log::info!("Recording aborted after {} frames", session.frames);
            Self::discard(session);
        }
    }

    fn is_recording(&self) -> bool {
        self.session.is_some()
    }
}

impl Drop for FfmpegEncoder {
    fn drop(&mut self) {
        self.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn settings() -> EncoderSettings {
        EncoderSettings::from(&OutputConfig::default())
    }

    fn spec(audio: Option<&str>) -> RecordingSpec {
        RecordingSpec {
            output: PathBuf::from("out.mp4"),
            width: 640,
            height: 360,
            fps: 25.0,
            audio_source: audio.map(PathBuf::from),
        }
    }

    fn value_after<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
        args.iter()
            .position(|a| a == flag)
            .and_then(|i| args.get(i + 1))
            .map(String::as_str)
    }

    #[test]
    fn args_mux_source_audio() {
        let args = build_args(&settings(), &spec(Some("in.mp4")));
        assert_eq!(value_after(&args, "-video_size"), Some("640x360"));
        assert_eq!(value_after(&args, "-framerate"), Some("25"));
        assert!(args.iter().any(|a| a == "in.mp4"));
        assert!(args.iter().any(|a| a == "1:a:0?"));
        assert_eq!(value_after(&args, "-b:a"), Some("192k"));
        assert_eq!(value_after(&args, "-crf"), Some("18"));
        assert_eq!(args.last().map(String::as_str), Some("out.mp4"));
    }

    #[test]
    fn args_without_audio_drop_audio_stream() {
        let args = build_args(&settings(), &spec(None));
        assert!(args.iter().any(|a| a == "-an"));
        assert!(!args.iter().any(|a| a == "-c:a"));
        assert_eq!(args.iter().filter(|a| *a == "-i").count(), 1);
    }

    #[test]
    fn bitrate_replaces_crf() {
        let mut settings = settings();
        settings.bitrate = Some("8M".into());
        let args = build_args(&settings, &spec(None));
        assert_eq!(value_after(&args, "-b:v"), Some("8M"));
        assert!(!args.iter().any(|a| a == "-crf"));
    }

    #[test]
    fn frames_before_start_are_rejected() {
        let mut encoder = FfmpegEncoder::new(settings());
        assert!(!encoder.is_recording());
        assert!(matches!(encoder.submit_frame(&[0; 4]), Err(RecorderError::NotStarted)));
        assert!(matches!(encoder.stop(), Err(RecorderError::NotStarted)));
        encoder.abort();
    }

    #[test]
    fn remove_partial_deletes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("partial.mp4");
        std::fs::write(&path, b"junk").unwrap();
        remove_partial(&path);
        assert!(!path.exists());
        remove_partial(&path);
    }
}
