pub(crate) mod bridge;
pub(crate) mod channel;
pub(crate) mod port;
pub(crate) mod workload;
