use std::fmt;

use typed_builder::TypedBuilder;

use crate::{time::Time, units::Bytes};

identifier!(FrameId);

/// A 48-bit EUI address, the opaque key frames are switched on.
#[derive(
    Debug,
    Default,
    Copy,
    Clone,
    PartialOrd,
    Ord,
    PartialEq,
    Eq,
    Hash,
    serde::Serialize,
    serde::Deserialize,
)]
pub struct MacAddr([u8; 6]);

impl MacAddr {
    pub const BROADCAST: MacAddr = MacAddr([0xff; 6]);

    pub const fn new(octets: [u8; 6]) -> Self {
        Self(octets)
    }

    pub fn from_u64(val: u64) -> Self {
        let b = val.to_be_bytes();
        Self([b[2], b[3], b[4], b[5], b[6], b[7]])
    }

    pub fn is_broadcast(&self) -> bool {
        *self == Self::BROADCAST
    }

    /// True for multicast (group) addresses, broadcast included.
    pub fn is_group(&self) -> bool {
        self.0[0] & 0x01 != 0
    }
}

impl fmt::Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let o = &self.0;
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            o[0], o[1], o[2], o[3], o[4], o[5]
        )
    }
}

/// Hands out EUI addresses sequentially, skipping the group bit.
#[derive(Debug, Default, derive_new::new)]
pub(crate) struct MacAllocator {
    #[new(default)]
    next: u64,
}

impl MacAllocator {
    pub(crate) fn allocate(&mut self) -> MacAddr {
        self.next += 1;
        let mut addr = MacAddr::from_u64(self.next << 1);
        // the group bit lives in the first octet; clear it so the
        // address stays unicast at any counter value
        addr.0[0] &= 0xfe;
        addr
    }
}

/// A unit of layer-2 data in flight.
#[derive(Debug, Clone, Copy, TypedBuilder)]
pub struct Frame {
    pub(crate) id: FrameId,
    pub(crate) src: MacAddr,
    pub(crate) dst: MacAddr,
    pub(crate) size: Bytes,
    /// Time the frame entered the fabric at its source VM.
    #[builder(default)]
    pub(crate) sent: Time,
}

impl Frame {
    pub fn id(&self) -> FrameId {
        self.id
    }

    pub fn src(&self) -> MacAddr {
        self.src
    }

    pub fn dst(&self) -> MacAddr {
        self.dst
    }

    pub fn size(&self) -> Bytes {
        self.size
    }
}

/// A workload entry: one frame to inject at `start`.
#[derive(Debug, Clone, Copy, TypedBuilder, serde::Serialize, serde::Deserialize)]
pub struct FrameDesc {
    /// Source VM address. Must belong to a placed VM.
    pub src: MacAddr,
    /// Destination address.
    pub dst: MacAddr,
    /// Payload size.
    #[builder(setter(into))]
    pub size: Bytes,
    /// Injection time.
    #[builder(setter(into))]
    pub start: crate::units::Nanosecs,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn broadcast_is_group() {
        assert!(MacAddr::BROADCAST.is_broadcast());
        assert!(MacAddr::BROADCAST.is_group());
    }

    #[test]
    fn allocated_addresses_are_unicast() {
        let mut alloc = MacAllocator::new();
        for _ in 0..64 {
            let addr = alloc.allocate();
            assert!(!addr.is_group(), "{addr} has the group bit set");
        }
    }

    #[test]
    fn allocation_stays_unicast_at_large_counters() {
        // 2^39 allocations would set bit 40, which lands on the group
        // bit of the first octet
        let mut alloc = MacAllocator {
            next: (1 << 39) - 1,
        };
        let addr = alloc.allocate();
        assert!(!addr.is_group(), "{addr} has the group bit set");
    }

    #[test]
    fn display_format() {
        let addr = MacAddr::new([0, 0, 0, 0, 0x01, 0x2a]);
        assert_eq!(addr.to_string(), "00:00:00:00:01:2a");
    }
}
