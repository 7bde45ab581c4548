use std::collections::VecDeque;

use rustc_hash::FxHashMap;
use tracing::warn;

use crate::{
    entities::port::{PortCmd, PortId},
    frame::{Frame, FrameDesc, FrameId, MacAddr},
    simulation::{Context, EventList},
};

/// Injects the workload into the fabric: one frame per descriptor, at
/// its start time, out of the source VM's port. Descriptors must be
/// sorted by start time before construction.
#[derive(Debug, derive_new::new)]
pub(crate) struct Workload {
    frames: VecDeque<FrameDesc>,
    /// VM address to VM port, for source lookup.
    endpoints: FxHashMap<MacAddr, PortId>,
    #[new(default)]
    next_id: usize,
}

impl Workload {
    /// Injects the head descriptor and reschedules itself for the next
    /// one. Descriptors whose source is not a placed VM are skipped.
    pub(crate) fn step(&mut self, mut ctx: Context) -> EventList {
        if let Some(desc) = self.frames.pop_front() {
            debug_assert!(desc.start.into_time() >= ctx.cur_time);
            match self.endpoints.get(&desc.src) {
                Some(&port) => {
                    let frame = Frame::builder()
                        .id(FrameId::new(self.next_id))
                        .src(desc.src)
                        .dst(desc.dst)
                        .size(desc.size)
                        .sent(desc.start.into_time())
                        .build();
                    self.next_id += 1;
                    let delta = desc.start.into_time() - ctx.cur_time;
                    ctx.schedule(delta, PortCmd::new_send(port, frame));
                }
                None => {
                    warn!(src = %desc.src, "workload: source is not a placed VM endpoint");
                }
            }
            if let Some(next) = self.frames.front() {
                let delta = next.start.into_time() - ctx.cur_time;
                ctx.schedule(delta, WorkloadCmd::new_step());
            }
        }
        ctx.into_events()
    }
}

#[derive(Debug, Clone, Copy, derive_new::new)]
pub(crate) enum WorkloadCmd {
    /// Inject the next pending frame.
    Step,
}
