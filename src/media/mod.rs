pub mod frames;
pub mod player;
pub mod probe;

use crate::error::MediaError;

/// One decoded RGBA frame.
#[derive(Clone, Debug, PartialEq)]
pub struct VideoFrame {
    pub width: u32,
    pub height: u32,
    /// Presentation time in seconds.
    pub time: f64,
    pub pixels: Vec<u8>,
}

impl VideoFrame {
    pub fn byte_len(width: u32, height: u32) -> usize {
        width as usize * height as usize * 4
    }
}

/// Stream facts needed to play back and re-encode a file.
#[derive(Clone, Debug, PartialEq)]
pub struct MediaInfo {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub duration: f64,
    pub has_audio: bool,
}

/// Read side of the media element, as seen by the detectors.
pub trait AudioSource {
    fn current_time(&self) -> f64;
    fn is_paused(&self) -> bool;
    fn is_seeking(&self) -> bool;
}

/// Playback control the export pipeline drives and later restores.
pub trait MediaElement: AudioSource {
    fn duration(&self) -> f64;
    fn muted(&self) -> bool;
    fn set_muted(&mut self, muted: bool);
    fn playback_rate(&self) -> f64;
    fn set_playback_rate(&mut self, rate: f64);
    fn play(&mut self) -> Result<(), MediaError>;
    fn pause(&mut self);
    fn seek(&mut self, time: f64);
}
