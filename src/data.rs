use crate::{
    frame::{FrameId, MacAddr},
    units::{Bytes, Nanosecs},
};

/// One delivered frame, as recorded at the receiving endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Record {
    pub id: FrameId,
    pub src: MacAddr,
    pub dst: MacAddr,
    pub size: Bytes,
    /// When the frame entered the fabric at its source VM.
    pub sent: Nanosecs,
    /// When it reached this endpoint.
    pub delivered: Nanosecs,
}

impl Record {
    pub fn latency(&self) -> Nanosecs {
        self.delivered.saturating_sub(self.sent)
    }
}
