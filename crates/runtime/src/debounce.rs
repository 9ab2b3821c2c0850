use foundation::time::Time;

/// Fires once after input has been quiet for `settle_ms`.
///
/// Every `arm` pushes the deadline out again; `poll` reports the settle
/// exactly once and then disarms.
#[derive(Debug, Clone, PartialEq)]
pub struct SettleTimer {
    settle_ms: f64,
    deadline: Option<Time>,
}

impl SettleTimer {
    pub fn new(settle_ms: f64) -> Self {
        Self {
            settle_ms: settle_ms.max(0.0),
            deadline: None,
        }
    }

    pub fn settle_ms(&self) -> f64 {
        self.settle_ms
    }

    pub fn arm(&mut self, now: Time) {
        self.deadline = Some(now.add_millis(self.settle_ms));
    }

    pub fn is_pending(&self) -> bool {
        self.deadline.is_some()
    }

    pub fn deadline(&self) -> Option<Time> {
        self.deadline
    }

    pub fn cancel(&mut self) {
        self.deadline = None;
    }

    pub fn poll(&mut self, now: Time) -> bool {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }
}
