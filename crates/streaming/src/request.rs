/// Identifies one in-flight texture load.
///
/// Small and copyable so it can be carried through async continuations and
/// checked against the tracker after every suspension point.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Request(pub u64);

/// Which texture a request loads.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LoadPhase {
    Tiny,
    High,
}
