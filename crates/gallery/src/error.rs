use foundation::PanoramaId;

/// Failure reported by a platform call (DOM, GPU, network).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformError {
    pub message: String,
}

impl PlatformError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl std::fmt::Display for PlatformError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for PlatformError {}

/// Image fetch or decode failed for `url`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextureLoadError {
    pub url: String,
    pub reason: String,
}

impl std::fmt::Display for TextureLoadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "failed to load texture {}: {}", self.url, self.reason)
    }
}

impl std::error::Error for TextureLoadError {}

/// Parts of a panorama resource that activation and capture depend on.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ResourcePart {
    Resource,
    Scene,
    Camera,
    Context,
    Controls,
    Surface,
}

impl std::fmt::Display for ResourcePart {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ResourcePart::Resource => "resource",
            ResourcePart::Scene => "scene",
            ResourcePart::Camera => "camera",
            ResourcePart::Context => "render context",
            ResourcePart::Controls => "controls",
            ResourcePart::Surface => "surface",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GalleryError {
    /// The DOM container for the id is absent.
    NotFound { id: PanoramaId },
    /// An expected part of the resource bundle is absent.
    MissingResource { id: PanoramaId, part: ResourcePart },
    TextureLoad(TextureLoadError),
}

impl std::fmt::Display for GalleryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GalleryError::NotFound { id } => write!(f, "container with id {id} not found"),
            GalleryError::MissingResource { id, part } => {
                write!(f, "panorama {id} is missing its {part}")
            }
            GalleryError::TextureLoad(err) => err.fmt(f),
        }
    }
}

impl std::error::Error for GalleryError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            GalleryError::TextureLoad(err) => Some(err),
            _ => None,
        }
    }
}

impl From<TextureLoadError> for GalleryError {
    fn from(err: TextureLoadError) -> Self {
        GalleryError::TextureLoad(err)
    }
}
