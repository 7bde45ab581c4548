use crate::time::{Delta, Time};

macro_rules! unit {
    ($name: ident) => {
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
            derive_more::Add,
            derive_more::Sub,
            derive_more::AddAssign,
            derive_more::SubAssign,
            derive_more::Sum,
            derive_more::Display,
            derive_more::FromStr,
            serde::Serialize,
            serde::Deserialize,
        )]
        pub struct $name(u64);

        impl $name {
            pub const ZERO: $name = Self::new(0);
            pub const MAX: $name = Self::new(u64::MAX);

            pub const fn new(value: u64) -> Self {
                Self(value)
            }

            pub const fn into_u64(self) -> u64 {
                self.0
            }

            pub const fn into_f64(self) -> f64 {
                self.0 as f64
            }

            pub const fn saturating_sub(self, rhs: Self) -> Self {
                Self::new(self.0.saturating_sub(rhs.0))
            }
        }
    };
}

unit!(Nanosecs);
unit!(Microsecs);
unit!(Millisecs);
unit!(Secs);

impl Nanosecs {
    pub const fn into_time(self) -> Time {
        Time::new(self.0 as u128)
    }

    pub const fn into_delta(self) -> Delta {
        Delta::new(self.0 as u128)
    }
}

impl Microsecs {
    pub const fn into_ns(self) -> Nanosecs {
        Nanosecs::new(self.0 * 1_000)
    }

    pub fn into_delta(self) -> Delta {
        self.into_ns().into_delta()
    }
}

impl Millisecs {
    pub const fn into_us(self) -> Microsecs {
        Microsecs::new(self.0 * 1_000)
    }

    pub fn into_delta(self) -> Delta {
        self.into_us().into_delta()
    }
}

impl Secs {
    pub const fn into_ms(self) -> Millisecs {
        Millisecs::new(self.0 * 1_000)
    }

    pub fn into_delta(self) -> Delta {
        self.into_ms().into_delta()
    }
}

impl From<Nanosecs> for Delta {
    fn from(ns: Nanosecs) -> Self {
        ns.into_delta()
    }
}

impl From<Microsecs> for Delta {
    fn from(us: Microsecs) -> Self {
        us.into_delta()
    }
}

impl From<Millisecs> for Delta {
    fn from(ms: Millisecs) -> Self {
        ms.into_delta()
    }
}

impl From<Secs> for Delta {
    fn from(s: Secs) -> Self {
        s.into_delta()
    }
}

unit!(Bytes);

unit!(BitsPerSec);
unit!(Mbps);
unit!(Gbps);

impl BitsPerSec {
    /// Computes the time it takes to serialize `size` bytes onto a wire
    /// running at this rate.
    pub fn length(&self, size: Bytes) -> Nanosecs {
        assert!(*self != BitsPerSec::ZERO);
        if size == Bytes::ZERO {
            return Nanosecs::ZERO;
        }
        let bytes = size.into_f64();
        let bps = self.into_f64();
        let delta = (bytes * 1e9 * 8.0) / bps;
        let delta = delta.round() as u64;
        Nanosecs::new(delta)
    }
}

impl Mbps {
    pub const fn into_bps(self) -> BitsPerSec {
        BitsPerSec::new(self.0 * 1_000_000)
    }
}

impl Gbps {
    pub const fn into_bps(self) -> BitsPerSec {
        BitsPerSec::new(self.0 * 1_000_000_000)
    }

    pub fn length(&self, size: Bytes) -> Nanosecs {
        self.into_bps().length(size)
    }
}

impl From<Mbps> for BitsPerSec {
    fn from(val: Mbps) -> Self {
        val.into_bps()
    }
}

impl From<Gbps> for BitsPerSec {
    fn from(val: Gbps) -> Self {
        val.into_bps()
    }
}
