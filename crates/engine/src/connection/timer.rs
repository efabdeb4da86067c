//! The three per-connection timers.
//!
//! Each timer is a slot holding a `{deadline, generation}` pair. Scheduling bumps the
//! generation and moves the deadline, cancelling bumps the generation and disarms the slot.
//! A [`TimerHandle`] remembers the generation it was issued for, so a firing that was
//! superseded by a later transition is recognised with [`Timers::is_current`] and ignored.
//!
//! The underlying `Sleep` of a slot is allocated on first use and only reset afterwards.

use std::fmt;
use std::future::poll_fn;
use std::pin::Pin;
use std::task::Poll;
use std::time::Duration;

use tokio::time::{Instant, Sleep, sleep_until};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKind {
    /// armed while the head or body of a request is incomplete
    Request,
    /// armed between a complete request and its response
    Response,
    /// armed while idle between two requests
    KeepAlive,
}

impl TimerKind {
    const ALL: [TimerKind; 3] = [TimerKind::Request, TimerKind::Response, TimerKind::KeepAlive];

    fn index(self) -> usize {
        match self {
            TimerKind::Request => 0,
            TimerKind::Response => 1,
            TimerKind::KeepAlive => 2,
        }
    }
}

impl fmt::Display for TimerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TimerKind::Request => "request",
            TimerKind::Response => "response",
            TimerKind::KeepAlive => "keep-alive",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerHandle {
    kind: TimerKind,
    generation: u64,
}

impl TimerHandle {
    pub fn kind(&self) -> TimerKind {
        self.kind
    }
}

#[derive(Debug, Default)]
struct Slot {
    sleep: Option<Pin<Box<Sleep>>>,
    generation: u64,
    armed: bool,
}

#[derive(Debug, Default)]
pub struct Timers {
    slots: [Slot; 3],
}

impl Timers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arms `kind` to fire after `delay`, superseding any earlier schedule of the same timer.
    pub fn schedule(&mut self, kind: TimerKind, delay: Duration) -> TimerHandle {
        let deadline = Instant::now() + delay;
        let slot = &mut self.slots[kind.index()];

        match &mut slot.sleep {
            Some(sleep) => sleep.as_mut().reset(deadline),
            None => slot.sleep = Some(Box::pin(sleep_until(deadline))),
        }
        slot.generation += 1;
        slot.armed = true;

        TimerHandle { kind, generation: slot.generation }
    }

    pub fn cancel(&mut self, kind: TimerKind) {
        let slot = &mut self.slots[kind.index()];
        slot.generation += 1;
        slot.armed = false;
    }

    pub fn cancel_all(&mut self) {
        for kind in TimerKind::ALL {
            self.cancel(kind);
        }
    }

    pub fn is_active(&self, kind: TimerKind) -> bool {
        self.slots[kind.index()].armed
    }

    /// Returns true if no schedule or cancel happened since `handle` was issued.
    pub fn is_current(&self, handle: TimerHandle) -> bool {
        self.slots[handle.kind.index()].generation == handle.generation
    }

    /// Resolves when the earliest armed timer expires, disarming it.
    ///
    /// Stays pending while no timer is armed.
    pub fn fired(&mut self) -> impl Future<Output = TimerHandle> + '_ {
        poll_fn(move |cx| {
            for kind in TimerKind::ALL {
                let slot = &mut self.slots[kind.index()];
                if !slot.armed {
                    continue;
                }

                if let Some(sleep) = &mut slot.sleep
                    && sleep.as_mut().poll(cx).is_ready()
                {
                    slot.armed = false;
                    return Poll::Ready(TimerHandle { kind, generation: slot.generation });
                }
            }
            Poll::Pending
        })
    }
}
