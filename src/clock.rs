//! Per-frame scheduling.
//!
//! Everything runs on one thread: a clock fires one tick at a time and each
//! callback runs to completion before the next tick. Callbacks may borrow
//! the caller's state for the duration of a `run`.

use std::cell::Cell;
use std::ops::ControlFlow;
use std::rc::Rc;

use crate::error::MediaError;
use crate::media::VideoFrame;

/// Media state at the moment a frame is presented.
#[derive(Clone, Copy, Debug)]
pub struct FrameTick<'a> {
    pub time: f64,
    pub paused: bool,
    pub seeking: bool,
    pub ended: bool,
    pub frame: Option<&'a VideoFrame>,
}

impl<'a> FrameTick<'a> {
    pub fn playing(time: f64) -> Self {
        Self {
            time,
            paused: false,
            seeking: false,
            ended: false,
            frame: None,
        }
    }
}

/// Cancellation handle returned by [`Subscribers::subscribe`].
#[derive(Clone, Debug, Default)]
pub struct Subscription {
    cancelled: Rc<Cell<bool>>,
}

impl Subscription {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.set(true);
    }

    pub fn is_active(&self) -> bool {
        !self.cancelled.get()
    }
}

pub type FrameCallback<'a> = Box<dyn FnMut(&FrameTick<'_>) -> ControlFlow<()> + 'a>;

struct Slot<'a> {
    handle: Subscription,
    callback: FrameCallback<'a>,
}

#[derive(Default)]
pub struct Subscribers<'a> {
    slots: Vec<Slot<'a>>,
}

impl<'a> Subscribers<'a> {
    pub fn new() -> Self {
        Self { slots: Vec::new() }
    }

    pub fn subscribe(
        &mut self,
        callback: impl FnMut(&FrameTick<'_>) -> ControlFlow<()> + 'a,
    ) -> Subscription {
        let handle = Subscription::new();
        self.subscribe_with(handle.clone(), callback);
        handle
    }

    /// Subscribe under a handle the caller already holds.
    pub fn subscribe_with(
        &mut self,
        handle: Subscription,
        callback: impl FnMut(&FrameTick<'_>) -> ControlFlow<()> + 'a,
    ) {
        self.slots.push(Slot {
            handle,
            callback: Box::new(callback),
        });
    }

    /// Deliver one tick. Cancelled or finished callbacks are dropped.
    pub fn dispatch(&mut self, tick: &FrameTick<'_>) {
        self.slots.retain_mut(|slot| {
            if !slot.handle.is_active() {
                return false;
            }
            match (slot.callback)(tick) {
                ControlFlow::Continue(()) => slot.handle.is_active(),
                ControlFlow::Break(()) => {
                    slot.handle.cancel();
                    false
                }
            }
        });
    }

    pub fn is_empty(&mut self) -> bool {
        self.slots.retain(|slot| slot.handle.is_active());
        self.slots.is_empty()
    }

    pub fn len(&mut self) -> usize {
        self.slots.retain(|slot| slot.handle.is_active());
        self.slots.len()
    }
}

pub trait FrameClock {
    /// Fire ticks until no subscriber is left or the clock stops. A stopping
    /// clock delivers one last tick with `paused` set.
    fn run(&mut self, subscribers: &mut Subscribers<'_>) -> Result<(), MediaError>;
}

/// Replays a fixed sequence of frameless ticks. Drives detection-only passes,
/// and scripts pauses, seeks and jumps in tests.
#[derive(Clone, Debug, Default)]
pub struct ScriptedClock {
    ticks: Vec<ScriptedTick>,
}

#[derive(Clone, Copy, Debug)]
pub struct ScriptedTick {
    pub time: f64,
    pub paused: bool,
    pub seeking: bool,
}

impl ScriptedClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Evenly spaced playing ticks over `[start, end)`.
    pub fn playing(start: f64, end: f64, fps: f64) -> Self {
        let mut clock = Self::new();
        let count = ((end - start) * fps).round() as usize;
        for i in 0..count {
            clock.push(start + i as f64 / fps, false, false);
        }
        clock
    }

    pub fn push(&mut self, time: f64, paused: bool, seeking: bool) -> &mut Self {
        self.ticks.push(ScriptedTick { time, paused, seeking });
        self
    }
}

impl FrameClock for ScriptedClock {
    fn run(&mut self, subscribers: &mut Subscribers<'_>) -> Result<(), MediaError> {
        let last_time = self.ticks.last().map_or(0.0, |t| t.time);
        for scripted in self.ticks.drain(..) {
            if subscribers.is_empty() {
                return Ok(());
            }
            subscribers.dispatch(&FrameTick {
                time: scripted.time,
                paused: scripted.paused,
                seeking: scripted.seeking,
                ended: false,
                frame: None,
            });
        }
        if !subscribers.is_empty() {
            subscribers.dispatch(&FrameTick {
                time: last_time,
                paused: true,
                seeking: false,
                ended: true,
                frame: None,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[test]
    fn break_unsubscribes() {
        let mut seen = Vec::new();
        {
            let mut subs = Subscribers::new();
            let handle = subs.subscribe(|tick| {
                seen.push(tick.time);
                if tick.time >= 0.2 {
                    ControlFlow::Break(())
                } else {
                    ControlFlow::Continue(())
                }
            });
            ScriptedClock::playing(0.0, 1.0, 10.0).run(&mut subs).unwrap();
            assert!(!handle.is_active());
            assert!(subs.is_empty());
        }
        assert_eq!(seen.len(), 3);
    }

    #[test]
    fn cancel_from_outside_stops_delivery() {
        let count = Rc::new(RefCell::new(0));
        let handle = Subscription::new();
        let mut subs = Subscribers::new();

        let counter = count.clone();
        subs.subscribe_with(handle.clone(), move |_| {
            *counter.borrow_mut() += 1;
            ControlFlow::Continue(())
        });
        // A second subscriber cancels the first after two ticks.
        let watcher = handle.clone();
        let observed = count.clone();
        subs.subscribe(move |_| {
            if *observed.borrow() == 2 {
                watcher.cancel();
            }
            ControlFlow::Continue(())
        });

        ScriptedClock::playing(0.0, 1.0, 10.0).run(&mut subs).unwrap();
        assert_eq!(*count.borrow(), 2);
        assert_eq!(subs.len(), 1);
    }

    #[test]
    fn stopping_clock_sends_final_paused_tick() {
        let mut last = None;
        {
            let mut subs = Subscribers::new();
            subs.subscribe(|tick| {
                last = Some((tick.time, tick.paused, tick.ended));
                ControlFlow::Continue(())
            });
            ScriptedClock::playing(0.0, 0.5, 10.0).run(&mut subs).unwrap();
        }
        let (time, paused, ended) = last.unwrap();
        assert!((time - 0.4).abs() < 1e-9);
        assert!(paused && ended);
    }

    #[test]
    fn empty_clock_returns_immediately() {
        let mut subs = Subscribers::new();
        ScriptedClock::new().run(&mut subs).unwrap();
    }
}
