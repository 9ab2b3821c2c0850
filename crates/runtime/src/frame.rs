use foundation::time::Time;

/// Largest step fed to per-frame updates; longer gaps (tab in background,
/// debugger pause) are treated as a single slow frame.
pub const MAX_FRAME_DT_S: f64 = 0.1;

/// Frame metadata for one tick of a render loop.
///
/// Ticks are driven by display refresh timestamps, so `dt_s` is measured
/// rather than fixed. The first frame of a loop has `dt_s == 0`.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Frame {
    /// 0-based frame index.
    pub index: u64,
    /// Seconds since the previous frame, clamped to [`MAX_FRAME_DT_S`].
    pub dt_s: f64,
    /// Timestamp of this frame.
    pub time: Time,
}

impl Frame {
    pub fn first(time: Time) -> Self {
        Self {
            index: 0,
            dt_s: 0.0,
            time,
        }
    }

    /// Next frame at timestamp `time`.
    pub fn advance(self, time: Time) -> Self {
        Self {
            index: self.index + 1,
            dt_s: time.since(self.time).min(MAX_FRAME_DT_S),
            time,
        }
    }
}
