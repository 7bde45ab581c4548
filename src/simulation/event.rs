use std::cmp::Reverse;

use smallvec::SmallVec;

use crate::{
    simulation::Command,
    time::{Delta, Time},
};

/// Most handlers emit at most a few follow-up events.
pub(crate) type EventList = SmallVec<[Event; 4]>;

/// A command bound to a simulated instant.
#[derive(Debug, derivative::Derivative)]
#[derivative(PartialEq, Eq, PartialOrd, Ord)]
pub(crate) struct Event {
    /// `Reverse` turns the schedule's max-heap into earliest-first order.
    time: Reverse<Time>,
    /// FIFO tiebreak among same-instant events, stamped by the schedule.
    pub(super) seq: Reverse<u64>,
    #[derivative(PartialEq = "ignore", PartialOrd = "ignore", Ord = "ignore")]
    pub(crate) cmd: Command,
}

impl Event {
    pub(crate) fn new(time: Time, cmd: impl Into<Command>) -> Self {
        Self {
            time: Reverse(time),
            seq: Reverse(0),
            cmd: cmd.into(),
        }
    }

    pub(crate) fn time(&self) -> Time {
        self.time.0
    }
}

/// Handed to entity handlers so they can emit follow-up events relative
/// to the current instant without touching the schedule directly.
#[derive(Debug)]
pub(crate) struct Context {
    pub(crate) cur_time: Time,
    events: EventList,
}

impl Context {
    pub(crate) fn at(cur_time: Time) -> Self {
        Self {
            cur_time,
            events: EventList::new(),
        }
    }

    pub(crate) fn schedule(&mut self, delta: Delta, cmd: impl Into<Command>) {
        self.events.push(Event::new(self.cur_time + delta, cmd));
    }

    pub(crate) fn schedule_now(&mut self, cmd: impl Into<Command>) {
        self.schedule(Delta::ZERO, cmd);
    }

    #[must_use]
    pub(crate) fn into_events(self) -> EventList {
        self.events
    }
}
