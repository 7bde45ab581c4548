use tracing::{debug, error, warn};

use crate::{
    entities::port::{PortCmd, PortId},
    frame::Frame,
    simulation::Context,
    time::Delta,
    units::BitsPerSec,
};

identifier!(ChannelId);
identifier!(DeviceId);

/// Transmission state of one device slot on the wire.
#[derive(Debug, Copy, Clone, PartialEq, Eq, derivative::Derivative)]
#[derivative(Default)]
pub(crate) enum WireState {
    #[derivative(Default)]
    Idle,
    Transmitting,
    Propagating,
}

/// Bookkeeping for one device ever attached to the channel. Records are
/// never removed, only deactivated, so slot indices stay stable.
#[derive(Debug)]
pub(crate) struct DeviceRecord {
    pub(crate) port: PortId,
    pub(crate) active: bool,
    pub(crate) state: WireState,
    pub(crate) current: Option<Frame>,
}

impl DeviceRecord {
    fn new(port: PortId) -> Self {
        Self {
            port,
            active: true,
            state: WireState::Idle,
            current: None,
        }
    }
}

/// One broadcast-capable wire.
///
/// Serializes frame delivery without modeling electrical contention: a
/// transmit start is refused unless the relevant slot is idle, which is
/// sufficient because scheduling is single-threaded and deterministic.
/// In half-duplex mode the slot of the current source gates the whole
/// wire; in full-duplex mode each device's slot is independent.
#[derive(Debug, typed_builder::TypedBuilder)]
pub(crate) struct SharedChannel {
    pub(crate) id: ChannelId,
    #[builder(setter(into))]
    rate: BitsPerSec,
    #[builder(setter(into))]
    delay: Delta,
    #[builder(default = true)]
    full_duplex: bool,
    /// Whether the sender's slot stays busy while its signal propagates.
    #[builder(default = false)]
    source_prop: bool,
    #[builder(default, setter(skip))]
    records: Vec<DeviceRecord>,
    /// Source of the transmission in progress (or the last one).
    #[builder(default, setter(skip))]
    current_src: DeviceId,
}

impl SharedChannel {
    /// Appends an active device record and returns its stable slot index.
    pub(crate) fn attach(&mut self, port: PortId) -> DeviceId {
        let id = DeviceId::new(self.records.len());
        self.records.push(DeviceRecord::new(port));
        id
    }

    /// Marks a device inactive. Warns but still succeeds if the device
    /// is mid-transmission; already-scheduled deliveries complete.
    pub(crate) fn detach(&mut self, device: DeviceId) -> bool {
        let Some(rec) = self.records.get_mut(device.into_usize()) else {
            return false;
        };
        if !rec.active {
            warn!(channel = %self.id, %device, "detach: device is already detached");
            return false;
        }
        rec.active = false;
        if rec.state == WireState::Transmitting {
            warn!(channel = %self.id, %device, "detach: device is currently transmitting");
        }
        true
    }

    pub(crate) fn detach_port(&mut self, port: PortId) -> bool {
        match self.device_num(port) {
            Some(device) => self.detach(device),
            None => false,
        }
    }

    /// Reactivates a previously detached device. Fails if the device is
    /// unknown or still active.
    pub(crate) fn reattach(&mut self, device: DeviceId) -> bool {
        match self.records.get_mut(device.into_usize()) {
            Some(rec) if !rec.active => {
                rec.active = true;
                true
            }
            _ => false,
        }
    }

    pub(crate) fn reattach_port(&mut self, port: PortId) -> bool {
        let device = self
            .records
            .iter()
            .position(|rec| rec.port == port)
            .map(DeviceId::new);
        match device {
            Some(device) => self.reattach(device),
            None => false,
        }
    }

    /// Claims the wire for `src`. Fails if the gating slot is not idle
    /// or the source is detached.
    pub(crate) fn transmit_start(&mut self, frame: Frame, src: DeviceId) -> bool {
        let gate = if self.full_duplex { src } else { self.current_src };
        if self.records[gate.into_usize()].state != WireState::Idle {
            debug!(channel = %self.id, %src, "transmit_start: wire is not idle");
            return false;
        }
        if !self.is_active(src) {
            error!(channel = %self.id, %src, "transmit_start: source is not attached");
            return false;
        }
        self.current_src = src;
        let rec = &mut self.records[src.into_usize()];
        rec.state = WireState::Transmitting;
        rec.current = Some(frame);
        true
    }

    /// Completes a transmission: schedules a receive on every *other*
    /// active device after the propagation delay, then returns the
    /// sending slot to idle (via Propagating if source propagation is
    /// on). Calling this on a slot that is not transmitting is a logic
    /// violation.
    pub(crate) fn transmit_end(&mut self, device: DeviceId, ctx: &mut Context) -> bool {
        let rec = &self.records[device.into_usize()];
        if rec.state != WireState::Transmitting
            || (!self.full_duplex && device != self.current_src)
        {
            error!(channel = %self.id, %device, "transmit_end: device is not transmitting");
            debug_assert!(false, "transmit_end on a non-transmitting slot");
            return false;
        }

        let frame = rec.current.expect("transmitting slot has no frame");
        let sender = rec.port;
        let mut ok = true;
        if !rec.active {
            error!(channel = %self.id, %device, "transmit_end: source was detached mid-transmission");
            ok = false;
        }

        for rec in self.records.iter().filter(|r| r.active) {
            if rec.port == sender {
                continue;
            }
            ctx.schedule(self.delay, PortCmd::new_receive(rec.port, frame, sender));
        }

        let rec = &mut self.records[device.into_usize()];
        if self.source_prop {
            rec.state = WireState::Propagating;
            ctx.schedule(self.delay, ChannelCmd::new_propagation_complete(self.id, device));
        } else {
            rec.state = WireState::Idle;
        }
        ok
    }

    /// The sender's signal has reached every receiver; its slot frees up.
    pub(crate) fn propagation_complete(&mut self, device: DeviceId) {
        let rec = &mut self.records[device.into_usize()];
        debug_assert_eq!(rec.state, WireState::Propagating);
        rec.state = WireState::Idle;
    }

    pub(crate) fn is_busy(&self, device: DeviceId) -> bool {
        self.state(device) != WireState::Idle
    }

    pub(crate) fn state(&self, device: DeviceId) -> WireState {
        let gate = if self.full_duplex { device } else { self.current_src };
        self.records[gate.into_usize()].state
    }

    pub(crate) fn is_active(&self, device: DeviceId) -> bool {
        self.records[device.into_usize()].active
    }

    pub(crate) fn num_active(&self) -> usize {
        self.records.iter().filter(|r| r.active).count()
    }

    pub(crate) fn num_devices(&self) -> usize {
        self.records.len()
    }

    pub(crate) fn port(&self, device: DeviceId) -> PortId {
        self.records[device.into_usize()].port
    }

    /// Slot index of an attached, active port.
    pub(crate) fn device_num(&self, port: PortId) -> Option<DeviceId> {
        self.records
            .iter()
            .position(|rec| rec.port == port && rec.active)
            .map(DeviceId::new)
    }

    pub(crate) fn ports(&self) -> impl Iterator<Item = PortId> + '_ {
        self.records.iter().map(|rec| rec.port)
    }

    pub(crate) fn rate(&self) -> BitsPerSec {
        self.rate
    }
}

#[derive(Debug, Clone, Copy, derive_new::new)]
pub(crate) enum ChannelCmd {
    PropagationComplete {
        channel: ChannelId,
        device: DeviceId,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{frame::MacAddr, simulation::Command, time::Time, units::{Bytes, Gbps}};

    fn channel(full_duplex: bool) -> SharedChannel {
        SharedChannel::builder()
            .id(ChannelId::ZERO)
            .rate(Gbps::new(1).into_bps())
            .delay(Delta::new(10))
            .full_duplex(full_duplex)
            .build()
    }

    fn frame() -> Frame {
        Frame::builder()
            .id(crate::frame::FrameId::ZERO)
            .src(MacAddr::from_u64(2))
            .dst(MacAddr::from_u64(4))
            .size(Bytes::new(100))
            .build()
    }

    #[test]
    fn half_duplex_serializes_transmitters() {
        let mut chan = channel(false);
        let d0 = chan.attach(PortId::new(0));
        let d1 = chan.attach(PortId::new(1));
        assert!(chan.transmit_start(frame(), d0));
        // second start with no intervening end must fail
        assert!(!chan.transmit_start(frame(), d1));
        let mut ctx = Context::at(Time::ZERO);
        assert!(chan.transmit_end(d0, &mut ctx));
        assert!(chan.transmit_start(frame(), d1));
    }

    #[test]
    fn full_duplex_slots_are_independent() {
        let mut chan = channel(true);
        let d0 = chan.attach(PortId::new(0));
        let d1 = chan.attach(PortId::new(1));
        assert!(chan.transmit_start(frame(), d0));
        assert!(chan.transmit_start(frame(), d1));
        assert!(chan.is_busy(d0));
        assert!(chan.is_busy(d1));
    }

    #[test]
    fn transmit_end_delivers_to_all_other_active_devices() {
        let mut chan = channel(true);
        let d0 = chan.attach(PortId::new(0));
        chan.attach(PortId::new(1));
        let d2 = chan.attach(PortId::new(2));
        chan.detach(d2);
        assert!(chan.transmit_start(frame(), d0));
        let mut ctx = Context::at(Time::ZERO);
        assert!(chan.transmit_end(d0, &mut ctx));
        let events = ctx.into_events();
        // only the other *active* device hears the frame
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].time(), Time::new(10));
        match events[0].cmd {
            Command::Port(PortCmd::Receive { port, .. }) => assert_eq!(port, PortId::new(1)),
            ref other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn source_propagation_holds_the_slot() {
        let mut chan = SharedChannel::builder()
            .id(ChannelId::ZERO)
            .rate(Gbps::new(1).into_bps())
            .delay(Delta::new(10))
            .full_duplex(true)
            .source_prop(true)
            .build();
        let d0 = chan.attach(PortId::new(0));
        chan.attach(PortId::new(1));
        assert!(chan.transmit_start(frame(), d0));
        let mut ctx = Context::at(Time::ZERO);
        assert!(chan.transmit_end(d0, &mut ctx));
        assert_eq!(chan.state(d0), WireState::Propagating);
        assert!(chan.is_busy(d0));
        chan.propagation_complete(d0);
        assert_eq!(chan.state(d0), WireState::Idle);
    }

    #[test]
    fn detach_mid_transmission_succeeds() {
        let mut chan = channel(true);
        let d0 = chan.attach(PortId::new(0));
        assert!(chan.transmit_start(frame(), d0));
        assert!(chan.detach(d0));
        assert!(!chan.detach(d0));
        assert!(chan.reattach(d0));
        assert!(!chan.reattach(d0));
    }

    #[test]
    fn port_keyed_lookups_track_activity() {
        let mut chan = channel(true);
        let d0 = chan.attach(PortId::new(7));
        chan.attach(PortId::new(8));
        assert_eq!(chan.port(d0), PortId::new(7));
        assert_eq!(chan.device_num(PortId::new(7)), Some(d0));
        assert_eq!(chan.ports().collect::<Vec<_>>(), vec![PortId::new(7), PortId::new(8)]);

        assert!(chan.detach_port(PortId::new(7)));
        // inactive devices are invisible to the active lookup
        assert_eq!(chan.device_num(PortId::new(7)), None);
        assert!(!chan.detach_port(PortId::new(7)));
        assert!(chan.reattach_port(PortId::new(7)));
        assert_eq!(chan.device_num(PortId::new(7)), Some(d0));
        assert!(!chan.reattach_port(PortId::new(99)));
    }

    #[test]
    fn inactive_source_cannot_start() {
        let mut chan = channel(true);
        let d0 = chan.attach(PortId::new(0));
        chan.detach(d0);
        assert!(!chan.transmit_start(frame(), d0));
        assert_eq!(chan.num_active(), 0);
        assert_eq!(chan.num_devices(), 1);
    }
}
