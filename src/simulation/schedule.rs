use std::cmp::Reverse;
use std::collections::BinaryHeap;

use super::Event;

/// The global event queue. Pops run earliest-first; ties at the same
/// instant run in insertion order.
#[derive(Debug, Default)]
pub(crate) struct Schedule {
    events: BinaryHeap<Event>,
    next_seq: u64,
}

impl Schedule {
    /// Stamps the event with the next sequence number so same-instant
    /// events keep their insertion order.
    pub(crate) fn push(&mut self, mut event: Event) {
        event.seq = Reverse(self.next_seq);
        self.next_seq += 1;
        self.events.push(event);
    }

    delegate::delegate! {
        to self.events {
            pub(crate) fn pop(&mut self) -> Option<Event>;
            #[allow(unused)]
            pub(crate) fn is_empty(&self) -> bool;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{entities::workload::WorkloadCmd, time::Time};

    #[test]
    fn pops_earliest_first_then_fifo() {
        let mut schedule = Schedule::default();
        schedule.push(Event::new(Time::new(20), WorkloadCmd::new_step()));
        schedule.push(Event::new(Time::new(10), WorkloadCmd::new_step()));
        schedule.push(Event::new(Time::new(10), WorkloadCmd::new_step()));

        let first = schedule.pop().unwrap();
        let second = schedule.pop().unwrap();
        let third = schedule.pop().unwrap();
        assert_eq!(first.time(), Time::new(10));
        assert_eq!(second.time(), Time::new(10));
        // the two t=10 events keep their push order
        assert!(first.seq.0 < second.seq.0);
        assert_eq!(third.time(), Time::new(20));
        assert!(schedule.is_empty());
    }
}
