/// Texture residency for one panorama.
///
/// Progression: Idle → TinyLoaded/TinyFallback → HighLoading → HighLoaded/HighFailed.
/// States carry a rank and a transition is only accepted when the rank
/// strictly increases, so the visible texture never regresses.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum TextureState {
    Idle,
    TinyLoaded,
    /// Tiny load failed; the flat fallback material is shown.
    TinyFallback,
    HighLoading,
    HighLoaded,
    /// High-res load failed; whatever was shown before stays.
    HighFailed,
}

impl TextureState {
    pub fn rank(self) -> u8 {
        match self {
            TextureState::Idle => 0,
            TextureState::TinyLoaded | TextureState::TinyFallback => 1,
            TextureState::HighLoading => 2,
            TextureState::HighLoaded | TextureState::HighFailed => 3,
        }
    }

    /// True once a renderable frame (texture or fallback) exists.
    pub fn has_first_frame(self) -> bool {
        self != TextureState::Idle
    }

    pub fn is_settled(self) -> bool {
        matches!(self, TextureState::HighLoaded | TextureState::HighFailed)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Regression {
    pub from: TextureState,
    pub to: TextureState,
}

impl std::fmt::Display for Regression {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "texture state cannot move from {:?} to {:?}", self.from, self.to)
    }
}

impl std::error::Error for Regression {}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct TextureResidency {
    state: TextureState,
}

impl TextureResidency {
    pub fn new() -> Self {
        Self {
            state: TextureState::Idle,
        }
    }

    pub fn state(&self) -> TextureState {
        self.state
    }

    pub fn advance(&mut self, to: TextureState) -> Result<(), Regression> {
        if to.rank() <= self.state.rank() {
            return Err(Regression {
                from: self.state,
                to,
            });
        }
        self.state = to;
        Ok(())
    }
}

impl Default for TextureResidency {
    fn default() -> Self {
        Self::new()
    }
}
