use std::ops::{Add, Sub};

use rustc_hash::FxHashMap;

use crate::units::BitsPerSec;

/// Capacity-constrained bookkeeping over one quantity.
///
/// `0 <= free <= total` holds after every operation; allocation is
/// all-or-nothing per request.
#[derive(Debug, Clone, Copy)]
pub struct Supply<T> {
    total: T,
    free: T,
}

impl<T> Supply<T>
where
    T: Copy + Ord + Add<Output = T> + Sub<Output = T>,
{
    pub fn new(total: T) -> Self {
        Self { total, free: total }
    }

    pub fn total(&self) -> T {
        self.total
    }

    pub fn free(&self) -> T {
        self.free
    }

    pub fn can_allocate(&self, amount: T) -> bool {
        self.free >= amount
    }

    /// Deducts `amount` from the free capacity. Returns the granted
    /// amount, or `None` without touching any state if the supply cannot
    /// cover the request.
    pub fn allocate(&mut self, amount: T) -> Option<T> {
        if self.free < amount {
            return None;
        }
        self.free = self.free - amount;
        Some(amount)
    }

    /// Returns `amount` to the free capacity. A release that would push
    /// `free` above `total` is rejected with no state change.
    pub fn deallocate(&mut self, amount: T) -> bool {
        if self.free + amount > self.total {
            return false;
        }
        self.free = self.free + amount;
        true
    }
}

/// A host's allocatable resources: link bandwidth plus any number of
/// named counted resources (cores, memory, ...).
#[derive(Debug)]
pub struct HostResources {
    bandwidth: Supply<BitsPerSec>,
    named: FxHashMap<String, Supply<u64>>,
}

impl HostResources {
    pub fn new(bandwidth: BitsPerSec) -> Self {
        Self {
            bandwidth: Supply::new(bandwidth),
            named: FxHashMap::default(),
        }
    }

    pub fn add_named(&mut self, name: impl Into<String>, total: u64) {
        self.named.insert(name.into(), Supply::new(total));
    }

    pub fn free_bandwidth(&self) -> BitsPerSec {
        self.bandwidth.free()
    }

    pub fn free_named(&self, name: &str) -> Option<u64> {
        self.named.get(name).map(|s| s.free())
    }

    /// Reserves bandwidth and every named resource of a placement request
    /// as a unit: if any single supply is short (or a requested name is
    /// unknown), nothing is committed.
    pub fn try_reserve(
        &mut self,
        bandwidth: BitsPerSec,
        named: &FxHashMap<String, u64>,
    ) -> bool {
        if !self.bandwidth.can_allocate(bandwidth) {
            return false;
        }
        for (name, &amount) in named {
            match self.named.get(name) {
                Some(supply) if supply.can_allocate(amount) => {}
                _ => return false,
            }
        }

        self.bandwidth.allocate(bandwidth);
        for (name, &amount) in named {
            self.named.get_mut(name).unwrap().allocate(amount);
        }
        true
    }

    /// Returns a previous reservation. Fails only on release of more
    /// than was ever taken, leaving all supplies untouched.
    pub fn release(&mut self, bandwidth: BitsPerSec, named: &FxHashMap<String, u64>) -> bool {
        if self.bandwidth.free() + bandwidth > self.bandwidth.total() {
            return false;
        }
        for (name, &amount) in named {
            match self.named.get(name) {
                Some(supply) if supply.free() + amount <= supply.total() => {}
                _ => return false,
            }
        }

        self.bandwidth.deallocate(bandwidth);
        for (name, &amount) in named {
            self.named.get_mut(name).unwrap().deallocate(amount);
        }
        true
    }
}

/// What a tenant asks for when placing virtual machines.
#[derive(Debug, Clone, typed_builder::TypedBuilder, serde::Serialize, serde::Deserialize)]
pub struct VmPlacementRequest {
    /// Guaranteed minimum bandwidth per VM.
    #[builder(setter(into))]
    pub reserved_bw: BitsPerSec,
    /// Enforced bandwidth ceiling per VM; the VM's virtual link runs at
    /// this rate.
    #[builder(setter(into))]
    pub hard_limit_bw: BitsPerSec,
    /// Named resource requirements per VM.
    #[builder(default)]
    pub resources: FxHashMap<String, u64>,
    /// Number of VMs requested.
    pub count: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::units::Mbps;

    fn bps(mbps: u64) -> BitsPerSec {
        Mbps::new(mbps).into_bps()
    }

    #[test]
    fn allocate_is_all_or_nothing() {
        let mut supply = Supply::new(bps(100));
        assert_eq!(supply.allocate(bps(60)), Some(bps(60)));
        assert_eq!(supply.allocate(bps(60)), None);
        assert_eq!(supply.free(), bps(40));
    }

    #[test]
    fn deallocate_rejects_overflow_without_mutation() {
        let mut supply = Supply::new(bps(100));
        supply.allocate(bps(30));
        assert!(!supply.deallocate(bps(31)));
        assert_eq!(supply.free(), bps(70));
        assert!(supply.deallocate(bps(30)));
        assert_eq!(supply.free(), bps(100));
    }

    #[test]
    fn bounds_invariant_under_interleaving() {
        let mut supply = Supply::new(100u64);
        let ops: &[(bool, u64)] = &[
            (true, 40),
            (true, 70),
            (false, 40),
            (true, 90),
            (false, 90),
            (false, 100),
            (true, 100),
        ];
        for &(alloc, amount) in ops {
            if alloc {
                supply.allocate(amount);
            } else {
                supply.deallocate(amount);
            }
            assert!(supply.free() <= supply.total());
        }
    }

    #[test]
    fn reserve_fails_as_a_unit() {
        let mut host = HostResources::new(bps(1000));
        host.add_named("cores", 4);
        let mut req = FxHashMap::default();
        req.insert("cores".to_string(), 8);
        assert!(!host.try_reserve(bps(100), &req));
        // nothing was taken
        assert_eq!(host.free_bandwidth(), bps(1000));
        assert_eq!(host.free_named("cores"), Some(4));

        req.insert("cores".to_string(), 2);
        assert!(host.try_reserve(bps(100), &req));
        assert_eq!(host.free_bandwidth(), bps(900));
        assert_eq!(host.free_named("cores"), Some(2));
    }

    #[test]
    fn reserve_unknown_resource_fails() {
        let mut host = HostResources::new(bps(1000));
        let mut req = FxHashMap::default();
        req.insert("gpus".to_string(), 1);
        assert!(!host.try_reserve(bps(100), &req));
        assert_eq!(host.free_bandwidth(), bps(1000));
    }
}
