use std::cell::Cell;
use std::rc::Rc;

use super::frames::FrameSource;
use super::{AudioSource, MediaElement, MediaInfo};
use crate::clock::{FrameClock, FrameTick, Subscribers};
use crate::error::MediaError;

/// Lets code outside the player ask it to pause at the next frame boundary.
#[derive(Clone, Debug, Default)]
pub struct PauseHandle {
    requested: Rc<Cell<bool>>,
}

impl PauseHandle {
    pub fn request(&self) {
        self.requested.set(true);
    }

    fn take(&self) -> bool {
        self.requested.replace(false)
    }
}

/// Media element that presents decoded frames as fast as they are consumed.
///
/// Time comes from frame timestamps, so `playback_rate` and `muted` are
/// tracked as element state only.
pub struct OfflinePlayer<F: FrameSource> {
    source: F,
    duration: f64,
    time: f64,
    paused: bool,
    seeking: bool,
    pending_seek: Option<f64>,
    ended: bool,
    muted: bool,
    rate: f64,
    pause_requests: PauseHandle,
}

impl<F: FrameSource> OfflinePlayer<F> {
    pub fn new(source: F, info: &MediaInfo) -> Self {
        Self {
            source,
            duration: info.duration,
            time: 0.0,
            paused: true,
            seeking: false,
            pending_seek: None,
            ended: false,
            muted: false,
            rate: 1.0,
            pause_requests: PauseHandle::default(),
        }
    }

    pub fn pause_handle(&self) -> PauseHandle {
        self.pause_requests.clone()
    }

    pub fn ended(&self) -> bool {
        self.ended
    }

    fn stop_with(&mut self, err: MediaError) -> MediaError {
        self.paused = true;
        self.seeking = false;
        err
    }
}

impl<F: FrameSource> AudioSource for OfflinePlayer<F> {
    fn current_time(&self) -> f64 {
        self.time
    }

    fn is_paused(&self) -> bool {
        self.paused
    }

    fn is_seeking(&self) -> bool {
        self.seeking
    }
}

impl<F: FrameSource> MediaElement for OfflinePlayer<F> {
    fn duration(&self) -> f64 {
        self.duration
    }

    fn muted(&self) -> bool {
        self.muted
    }

    fn set_muted(&mut self, muted: bool) {
        self.muted = muted;
    }

    fn playback_rate(&self) -> f64 {
        self.rate
    }

    fn set_playback_rate(&mut self, rate: f64) {
        self.rate = rate;
    }

    fn play(&mut self) -> Result<(), MediaError> {
        if !(self.duration > 0.0) {
            return Err(MediaError::PlaybackRejected("media has no duration".into()));
        }
        if self.ended {
            self.seek(0.0);
        }
        // A seek issued while paused settles before playback resumes.
        if let Some(target) = self.pending_seek.take() {
            if let Err(e) = self.source.seek(target) {
                return Err(self.stop_with(e));
            }
        }
        self.seeking = false;
        self.pause_requests.take();
        self.paused = false;
        Ok(())
    }

    fn pause(&mut self) {
        self.paused = true;
    }

    fn seek(&mut self, time: f64) {
        let target = time.clamp(0.0, self.duration.max(0.0));
        self.pending_seek = Some(target);
        self.seeking = true;
        self.ended = false;
        self.time = target;
    }
}

impl<F: FrameSource> FrameClock for OfflinePlayer<F> {
    fn run(&mut self, subscribers: &mut Subscribers<'_>) -> Result<(), MediaError> {
        loop {
            if subscribers.is_empty() {
                return Ok(());
            }
            if self.pause_requests.take() {
                log::debug!("Pause requested at {:.3}s", self.time);
                self.paused = true;
            }
            if self.paused || self.ended {
                subscribers.dispatch(&FrameTick {
                    time: self.time,
                    paused: true,
                    seeking: false,
                    ended: self.ended,
                    frame: None,
                });
                return Ok(());
            }

            let seeking = match self.pending_seek.take() {
                Some(target) => {
                    if let Err(e) = self.source.seek(target) {
                        return Err(self.stop_with(e));
                    }
                    true
                }
                None => false,
            };
            self.seeking = seeking;

            let frame = match self.source.next_frame() {
                Ok(frame) => frame,
                Err(e) => return Err(self.stop_with(e)),
            };
            match frame {
                Some(frame) => {
                    self.time = frame.time;
                    subscribers.dispatch(&FrameTick {
                        time: frame.time,
                        paused: false,
                        seeking,
                        ended: false,
                        frame: Some(&frame),
                    });
                    self.seeking = false;
                }
                None => {
                    log::debug!("Playback ended at {:.3}s", self.time);
                    self.ended = true;
                    self.paused = true;
                    self.seeking = false;
                }
            }
        }
    }
}
