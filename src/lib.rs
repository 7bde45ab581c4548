macro_rules! identifier {
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
            derive_more::Display,
            serde::Serialize,
            serde::Deserialize,
        )]
        pub struct $name(usize);

        impl $name {
            pub const ZERO: $name = Self::new(0);

            pub const fn new(value: usize) -> Self {
                Self(value)
            }

            pub fn from_usize(val: usize) -> Self {
                Self(val)
            }

            pub fn into_usize(self) -> usize {
                self.0
            }
        }
    };
}

pub mod builder;
pub mod driver;
pub mod frame;
pub mod resources;
pub mod time;
pub mod topology;
pub mod units;

pub(crate) mod backoff;
pub(crate) mod data;
pub(crate) mod entities;
pub(crate) mod forward;
pub(crate) mod queue;
pub(crate) mod simulation;

pub use backoff::BackoffConfig;
pub use builder::{BuildError, Fabric, FabricBuilder, FabricConfig, ForwardKind, Placement};
pub use data::Record;
pub use entities::bridge::BridgeHook;
pub use entities::port::PortId;
pub use frame::{Frame, FrameDesc, FrameId, MacAddr};
pub use resources::VmPlacementRequest;
pub use topology::NodeId;
