use tracing::debug;

use crate::{
    entities::port::{PortCmd, PortId},
    forward::{ForwardEngine, TopoView},
    frame::{Frame, MacAddr},
    simulation::Context,
    topology::NodeId,
};

/// An observation point spliced into a bridge's receive path. Hooks run
/// in installation order before classification; a hook may rewrite the
/// frame or swallow it by returning `None`.
pub trait BridgeHook: Send {
    fn pre_process(&mut self, incoming: PortId, frame: Frame) -> Option<Frame>;
}

/// The switching function of one switch or host node: classifies each
/// received frame and relays it out another port (or floods it) per the
/// node's forwarding engine.
#[derive(derivative::Derivative)]
#[derivative(Debug)]
pub(crate) struct Bridge {
    pub(crate) node: NodeId,
    /// The bridge's own address; frames sent to it terminate here.
    pub(crate) address: MacAddr,
    pub(crate) ports: Vec<PortId>,
    engine: ForwardEngine,
    #[derivative(Debug = "ignore")]
    hooks: Vec<Box<dyn BridgeHook>>,
}

impl Bridge {
    pub(crate) fn new(node: NodeId, address: MacAddr, engine: ForwardEngine) -> Self {
        Self {
            node,
            address,
            ports: Vec::new(),
            engine,
            hooks: Vec::new(),
        }
    }

    pub(crate) fn add_port(&mut self, port: PortId) {
        self.ports.push(port);
    }

    pub(crate) fn install_hook(&mut self, hook: Box<dyn BridgeHook>) {
        self.hooks.push(hook);
    }

    /// Handles a frame that arrived on `incoming`, one of this bridge's
    /// ports.
    pub(crate) fn receive(
        &mut self,
        incoming: PortId,
        frame: Frame,
        view: &mut TopoView<'_>,
        ctx: &mut Context,
    ) {
        let mut frame = frame;
        for hook in &mut self.hooks {
            match hook.pre_process(incoming, frame) {
                Some(f) => frame = f,
                None => return,
            }
        }

        let now = ctx.cur_time;
        if frame.dst == self.address {
            // addressed to the bridge itself; nothing upstream to hand it to
            debug!(node = %self.node, frame = %frame.id, "frame terminated at bridge");
            return;
        }
        self.engine.learn(incoming, frame.src, now);
        if frame.dst.is_group() {
            if self.engine.flooding() {
                self.flood(incoming, frame, ctx);
            }
            return;
        }
        // a resolution to the arrival port is as unusable as no
        // resolution at all; both fall back to the flooding policy
        let out = self
            .engine
            .out_port(self.node, &self.ports, frame.dst, view, now);
        match out {
            Some(port) if port != incoming => {
                ctx.schedule_now(PortCmd::new_send(port, frame));
            }
            _ if self.engine.flooding() => self.flood(incoming, frame, ctx),
            _ => {
                debug!(node = %self.node, frame = %frame.id, "frame dropped: no usable egress");
            }
        }
    }

    fn flood(&self, incoming: PortId, frame: Frame, ctx: &mut Context) {
        for &port in self.ports.iter().filter(|&&p| p != incoming) {
            ctx.schedule_now(PortCmd::new_send(port, frame));
        }
    }
}
