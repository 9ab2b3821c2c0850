/// Time primitives
#[derive(Copy, Clone, Debug, PartialEq, PartialOrd)]
pub struct Time(pub f64); // seconds

impl Time {
    pub const ZERO: Time = Time(0.0);

    pub fn from_millis(ms: f64) -> Self {
        Time(ms / 1000.0)
    }

    pub fn as_millis(self) -> f64 {
        self.0 * 1000.0
    }

    pub fn add_millis(self, ms: f64) -> Self {
        Time(self.0 + ms / 1000.0)
    }

    /// Seconds elapsed since `earlier`, clamped at zero.
    pub fn since(self, earlier: Time) -> f64 {
        (self.0 - earlier.0).max(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::Time;

    #[test]
    fn millis_round_trip_through_seconds() {
        let t = Time::from_millis(150.0);
        assert_eq!(t, Time(0.15));
        assert!((t.as_millis() - 150.0).abs() < 1e-9);
    }

    #[test]
    fn since_never_goes_negative() {
        assert_eq!(Time(1.0).since(Time(2.0)), 0.0);
    }
}
