use tracing::{debug, warn};

use crate::{
    backoff::Backoff,
    data::Record,
    entities::channel::{DeviceId, SharedChannel},
    frame::{Frame, MacAddr},
    queue::FrameQ,
    simulation::Context,
    topology::NodeId,
    units::BitsPerSec,
};

identifier!(PortId);

#[derive(Debug, Copy, Clone, PartialEq, Eq, derivative::Derivative)]
#[derivative(Default)]
enum TxState {
    #[derivative(Default)]
    Ready,
    Busy,
    Backoff,
}

/// One attachment point to a shared channel: the per-port transmit state
/// machine with its FIFO queue and CSMA backoff.
#[derive(Debug, typed_builder::TypedBuilder)]
pub(crate) struct Port {
    pub(crate) id: PortId,
    pub(crate) node: NodeId,
    pub(crate) channel: super::channel::ChannelId,
    pub(crate) slot: DeviceId,
    pub(crate) address: MacAddr,
    /// Serialization rate, taken from the attached channel.
    #[builder(setter(into))]
    rate: BitsPerSec,
    backoff: Backoff,

    #[builder(default, setter(skip))]
    queue: FrameQ,
    #[builder(default, setter(skip))]
    state: TxState,
    #[builder(default, setter(skip))]
    current: Option<Frame>,

    #[builder(default, setter(skip))]
    pub(crate) records: Vec<Record>,
    #[builder(default, setter(skip))]
    pub(crate) dropped: u64,
}

impl Port {
    /// Queues a frame for transmission and kicks the machine if idle.
    pub(crate) fn send(&mut self, frame: Frame, chan: &mut SharedChannel, ctx: &mut Context) {
        self.queue.enqueue(frame);
        if self.state == TxState::Ready {
            self.start_next(chan, ctx);
        }
    }

    /// Backoff retry wake-up.
    pub(crate) fn try_send(&mut self, chan: &mut SharedChannel, ctx: &mut Context) {
        debug_assert_eq!(self.state, TxState::Backoff);
        self.attempt_transmit(chan, ctx);
    }

    /// The wire-rate serialization of the current frame is done.
    pub(crate) fn tx_complete(&mut self, chan: &mut SharedChannel, ctx: &mut Context) {
        debug_assert_eq!(self.state, TxState::Busy);
        chan.transmit_end(self.slot, ctx);
        self.current = None;
        self.state = TxState::Ready;
        self.start_next(chan, ctx);
    }

    /// Endpoint delivery: frames addressed to this port (or to a group)
    /// are recorded, everything else is ignored.
    pub(crate) fn deliver(&mut self, frame: Frame, ctx: &Context) {
        if frame.dst != self.address && !frame.dst.is_group() {
            return;
        }
        self.records.push(Record {
            id: frame.id,
            src: frame.src,
            dst: frame.dst,
            size: frame.size,
            sent: frame.sent.into_nanos(),
            delivered: ctx.cur_time.into_nanos(),
        });
    }

    fn start_next(&mut self, chan: &mut SharedChannel, ctx: &mut Context) {
        if let Some(frame) = self.queue.dequeue() {
            self.current = Some(frame);
            self.attempt_transmit(chan, ctx);
        }
    }

    fn attempt_transmit(&mut self, chan: &mut SharedChannel, ctx: &mut Context) {
        let frame = self
            .current
            .expect("attempt_transmit without a current frame");
        if chan.transmit_start(frame, self.slot) {
            self.state = TxState::Busy;
            self.backoff.reset();
            let delta = self.rate.length(frame.size).into_delta();
            ctx.schedule(delta, PortCmd::new_tx_complete(self.id));
        } else if self.backoff.max_retries_reached() {
            // expected, recoverable: the wire stayed busy too long
            warn!(port = %self.id, frame = %frame.id, "backoff exhausted, dropping frame");
            self.dropped += 1;
            self.backoff.reset();
            self.current = None;
            self.state = TxState::Ready;
            self.start_next(chan, ctx);
        } else {
            debug!(port = %self.id, "wire busy, backing off");
            self.state = TxState::Backoff;
            self.backoff.incr_retries();
            let delay = self.backoff.delay();
            ctx.schedule(delay, PortCmd::new_try_send(self.id));
        }
    }
}

#[derive(Debug, Clone, Copy, derive_new::new)]
pub(crate) enum PortCmd {
    /// Queue a frame for transmission out this port.
    Send { port: PortId, frame: Frame },
    /// Retry a transmission after backoff.
    TrySend { port: PortId },
    /// Serialization finished; complete the transmission.
    TxComplete { port: PortId },
    /// A frame has propagated to this port.
    Receive {
        port: PortId,
        frame: Frame,
        from: PortId,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        backoff::BackoffConfig,
        entities::channel::ChannelId,
        frame::FrameId,
        time::Time,
        units::{Bytes, Gbps},
    };

    fn make_port(slot: DeviceId, max_retries: u32) -> Port {
        Port::builder()
            .id(PortId::new(slot.into_usize()))
            .node(NodeId::ZERO)
            .channel(ChannelId::ZERO)
            .slot(slot)
            .address(MacAddr::from_u64(2 + 2 * slot.into_usize() as u64))
            .rate(Gbps::new(1).into_bps())
            .backoff(Backoff::new(
                BackoffConfig::builder().max_retries(max_retries).build(),
                slot.into_usize() as u64,
            ))
            .build()
    }

    fn frame(dst: MacAddr) -> Frame {
        Frame::builder()
            .id(FrameId::ZERO)
            .src(MacAddr::from_u64(100))
            .dst(dst)
            .size(Bytes::new(125))
            .build()
    }

    #[test]
    fn send_schedules_completion_after_serialization() {
        let mut chan = SharedChannel::builder()
            .id(ChannelId::ZERO)
            .rate(Gbps::new(1).into_bps())
            .delay(crate::time::Delta::new(10))
            .build();
        let slot = chan.attach(PortId::new(0));
        let mut port = make_port(slot, 4);
        let mut ctx = Context::at(Time::ZERO);
        port.send(frame(MacAddr::from_u64(4)), &mut chan, &mut ctx);
        let events = ctx.into_events();
        assert_eq!(events.len(), 1);
        // 125 bytes at 1 Gbps = 1000 ns
        assert_eq!(events[0].time(), Time::new(1_000));
    }

    #[test]
    fn busy_wire_triggers_backoff_then_drop() {
        let mut chan = SharedChannel::builder()
            .id(ChannelId::ZERO)
            .rate(Gbps::new(1).into_bps())
            .delay(crate::time::Delta::new(10))
            .full_duplex(false)
            .build();
        let other = chan.attach(PortId::new(9));
        let slot = chan.attach(PortId::new(0));
        // hold the wire busy from another device
        assert!(chan.transmit_start(frame(MacAddr::from_u64(6)), other));

        let mut port = make_port(slot, 2);
        let mut ctx = Context::at(Time::ZERO);
        port.send(frame(MacAddr::from_u64(4)), &mut chan, &mut ctx);
        assert_eq!(ctx.into_events().len(), 1); // backoff retry scheduled

        let mut ctx = Context::at(Time::new(1));
        port.try_send(&mut chan, &mut ctx);
        assert_eq!(ctx.into_events().len(), 1);

        // third attempt exhausts the two retries; the frame is dropped
        let mut ctx = Context::at(Time::new(2));
        port.try_send(&mut chan, &mut ctx);
        assert!(ctx.into_events().is_empty());
        assert_eq!(port.dropped, 1);
    }

    #[test]
    fn deliver_records_only_frames_addressed_here() {
        let mut port = make_port(DeviceId::new(0), 4);
        let ctx = Context::at(Time::new(42));
        port.deliver(frame(MacAddr::from_u64(999)), &ctx);
        assert!(port.records.is_empty());
        port.deliver(frame(port.address), &ctx);
        port.deliver(frame(MacAddr::BROADCAST), &ctx);
        assert_eq!(port.records.len(), 2);
        assert_eq!(port.records[0].delivered, crate::units::Nanosecs::new(42));
    }
}
