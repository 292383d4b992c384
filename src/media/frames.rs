use std::io::{ErrorKind, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdout, Command, ExitStatus, Stdio};

use super::{MediaInfo, VideoFrame};
use crate::error::MediaError;

/// Sequential decoded frames with random access by time.
pub trait FrameSource {
    /// Next frame, or `None` at end of stream.
    fn next_frame(&mut self) -> Result<Option<VideoFrame>, MediaError>;
    /// Reposition so the next frame is the one at or after `time`.
    fn seek(&mut self, time: f64) -> Result<(), MediaError>;
}

/// Decodes constant-rate RGBA frames through an `ffmpeg` child process.
pub struct FfmpegFrameReader {
    input: PathBuf,
    width: u32,
    height: u32,
    fps: f64,
    child: Option<Child>,
    stdout: Option<ChildStdout>,
    start: f64,
    index: u64,
    finished: bool,
}

impl FfmpegFrameReader {
    pub fn new(input: &Path, info: &MediaInfo) -> Self {
        Self {
            input: input.to_path_buf(),
            width: info.width,
            height: info.height,
            fps: info.fps,
            child: None,
            stdout: None,
            start: 0.0,
            index: 0,
            finished: false,
        }
    }

    fn spawn(&mut self) -> Result<(), MediaError> {
        self.shutdown();

        let start = format!("{:.6}", self.start);
        let filter = format!("fps={:.6}", self.fps);
        let mut child = Command::new("ffmpeg")
            .args(["-v", "error", "-ss", start.as_str(), "-i"])
            .arg(&self.input)
            .args([
                "-an",
                "-vf",
                filter.as_str(),
                "-f",
                "rawvideo",
                "-pix_fmt",
                "rgba",
                "pipe:1",
            ])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| MediaError::SourceUnavailable {
                path: self.input.clone(),
                reason: format!("failed to spawn ffmpeg decoder: {}", e),
            })?;

        self.stdout = child.stdout.take();
        self.child = Some(child);
        self.index = 0;
        self.finished = false;
        log::debug!("Frame decoder started at {:.3}s", self.start);
        Ok(())
    }

    /// Stop a decoder that is no longer wanted (seek or drop).
    fn shutdown(&mut self) {
        self.stdout = None;
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
    }

    /// The decoder closed its output: reap it and surface a failed exit.
    fn finish(&mut self) -> Result<(), MediaError> {
        self.stdout = None;
        self.finished = true;
        let Some(child) = self.child.take() else {
            return Ok(());
        };
        let output = child.wait_with_output()?;
        check_exit(output.status, &output.stderr, self.index)
    }
}

fn check_exit(status: ExitStatus, stderr: &[u8], frames: u64) -> Result<(), MediaError> {
    if status.success() {
        log::debug!("Frame decoder finished after {} frames", frames);
        return Ok(());
    }
    let stderr = String::from_utf8_lossy(stderr);
    Err(MediaError::Decode(format!(
        "ffmpeg frame decoder failed after {} frames ({}): {}",
        frames,
        status,
        stderr.trim()
    )))
}

impl FrameSource for FfmpegFrameReader {
    fn next_frame(&mut self) -> Result<Option<VideoFrame>, MediaError> {
        if self.finished {
            return Ok(None);
        }
        if self.stdout.is_none() {
            self.spawn()?;
        }
        let Some(stdout) = self.stdout.as_mut() else {
            return Ok(None);
        };

        let mut pixels = vec![0u8; VideoFrame::byte_len(self.width, self.height)];
        match stdout.read_exact(&mut pixels) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => {
                self.finish()?;
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        }

        let time = self.start + self.index as f64 / self.fps;
        self.index += 1;
        Ok(Some(VideoFrame {
            width: self.width,
            height: self.height,
            time,
            pixels,
        }))
    }

    fn seek(&mut self, time: f64) -> Result<(), MediaError> {
        self.start = time.max(0.0);
        self.spawn()
    }
}

impl Drop for FfmpegFrameReader {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Frames held in memory, generated by a closure of the frame time.
pub struct MemoryFrames {
    frames: Vec<VideoFrame>,
    cursor: usize,
}

impl MemoryFrames {
    pub fn new(frames: Vec<VideoFrame>) -> Self {
        Self { frames, cursor: 0 }
    }

    pub fn generate(
        width: u32,
        height: u32,
        fps: f64,
        duration: f64,
        mut paint: impl FnMut(f64, &mut [u8]),
    ) -> Self {
        let count = (duration * fps).round() as usize;
        let frames = (0..count)
            .map(|i| {
                let time = i as f64 / fps;
                let mut pixels = vec![0u8; VideoFrame::byte_len(width, height)];
                paint(time, &mut pixels);
                VideoFrame {
                    width,
                    height,
                    time,
                    pixels,
                }
            })
            .collect();
        Self::new(frames)
    }
}

impl FrameSource for MemoryFrames {
    fn next_frame(&mut self) -> Result<Option<VideoFrame>, MediaError> {
        let frame = self.frames.get(self.cursor).cloned();
        if frame.is_some() {
            self.cursor += 1;
        }
        Ok(frame)
    }

    fn seek(&mut self, time: f64) -> Result<(), MediaError> {
        // Tolerate float noise in frame timestamps.
        self.cursor = self.frames.partition_point(|f| f.time < time - 1e-9);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(unix)]
    fn status(code: i32) -> ExitStatus {
        use std::os::unix::process::ExitStatusExt;
        ExitStatus::from_raw(code << 8)
    }

    #[cfg(unix)]
    #[test]
    fn clean_decoder_exit_is_end_of_stream() {
        assert!(check_exit(status(0), b"", 120).is_ok());
    }

    #[cfg(unix)]
    #[test]
    fn failed_decoder_exit_is_an_error() {
        let err = check_exit(status(1), b"  corrupt packet at 4.2s\n", 105).unwrap_err();
        let MediaError::Decode(message) = err else {
            panic!("expected a decode error, got {:?}", err);
        };
        assert!(message.contains("105 frames"));
        assert!(message.contains("corrupt packet at 4.2s"));
    }

    #[test]
    fn memory_frames_play_and_seek() {
        let mut source = MemoryFrames::generate(2, 2, 10.0, 1.0, |t, px| px[0] = (t * 100.0) as u8);
        let first = source.next_frame().unwrap().unwrap();
        assert_eq!(first.time, 0.0);
        assert_eq!(first.pixels.len(), 16);

        source.seek(0.5).unwrap();
        let frame = source.next_frame().unwrap().unwrap();
        assert!((frame.time - 0.5).abs() < 1e-9);
        assert_eq!(frame.pixels[0], 50);

        source.seek(0.95).unwrap();
        assert!(source.next_frame().unwrap().is_none());

        source.seek(0.0).unwrap();
        assert_eq!(source.next_frame().unwrap().unwrap().time, 0.0);
    }
}
