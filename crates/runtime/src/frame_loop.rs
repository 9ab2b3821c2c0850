/// Handle of one scheduled render-loop tick.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FrameRequest(pub u64);

/// Single-slot render loop state.
///
/// A loop holds at most one outstanding [`FrameRequest`]. Scheduling a new
/// tick replaces the old one, so a tick delivered with a handle that is no
/// longer current belongs to a cancelled loop and must be ignored.
#[derive(Debug, Default)]
pub struct FrameLoop {
    next: u64,
    current: Option<FrameRequest>,
}

impl FrameLoop {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedules the next tick, returning its handle.
    pub fn request(&mut self) -> FrameRequest {
        let req = FrameRequest(self.next);
        self.next = self.next.wrapping_add(1);
        self.current = Some(req);
        req
    }

    pub fn is_running(&self) -> bool {
        self.current.is_some()
    }

    pub fn current(&self) -> Option<FrameRequest> {
        self.current
    }

    /// Consumes the delivered tick if it is the current one.
    pub fn accept(&mut self, req: FrameRequest) -> bool {
        if self.current == Some(req) {
            self.current = None;
            true
        } else {
            false
        }
    }

    /// Stops the loop, returning the handle that still needs cancelling.
    pub fn cancel(&mut self) -> Option<FrameRequest> {
        self.current.take()
    }
}
