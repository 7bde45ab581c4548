use std::collections::VecDeque;

use crate::frame::Frame;

#[derive(Debug, Default, derive_new::new)]
pub(crate) struct FrameQ {
    #[new(default)]
    inner: VecDeque<Frame>,
}

impl FrameQ {
    delegate::delegate! {
        to self.inner {
            #[call(push_back)]
            pub(crate) fn enqueue(&mut self, frame: Frame);

            #[call(pop_front)]
            pub(crate) fn dequeue(&mut self) -> Option<Frame>;
        }
    }
}
