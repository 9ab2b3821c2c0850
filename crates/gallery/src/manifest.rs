use foundation::PanoramaId;
use serde::{Deserialize, Serialize};

/// Image pair for one panorama. URLs are opaque to the gallery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PanoramaUrls {
    pub tiny: String,
    pub high: String,
}

/// One entry of a gallery listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GalleryItem {
    pub high: String,
    pub tiny: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
}

impl GalleryItem {
    pub fn urls(&self) -> PanoramaUrls {
        PanoramaUrls {
            tiny: self.tiny.clone(),
            high: self.high.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ManifestError {
    Parse(String),
    EmptyUrl { index: usize, field: &'static str },
}

impl std::fmt::Display for ManifestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ManifestError::Parse(msg) => write!(f, "manifest parse error: {msg}"),
            ManifestError::EmptyUrl { index, field } => {
                write!(f, "item {index}: `{field}` url is empty")
            }
        }
    }
}

impl std::error::Error for ManifestError {}

/// Ordered gallery listing (JSON array of items).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Manifest {
    pub items: Vec<GalleryItem>,
}

impl Manifest {
    pub fn from_json_str(s: &str) -> Result<Self, ManifestError> {
        let items: Vec<GalleryItem> =
            serde_json::from_str(s).map_err(|e| ManifestError::Parse(e.to_string()))?;
        let manifest = Manifest { items };
        manifest.validate()?;
        Ok(manifest)
    }

    pub fn validate(&self) -> Result<(), ManifestError> {
        for (index, item) in self.items.iter().enumerate() {
            if item.tiny.trim().is_empty() {
                return Err(ManifestError::EmptyUrl {
                    index,
                    field: "tiny",
                });
            }
            if item.high.trim().is_empty() {
                return Err(ManifestError::EmptyUrl {
                    index,
                    field: "high",
                });
            }
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&GalleryItem> {
        self.items.get(index)
    }

    /// Container ids in listing order.
    pub fn ids(&self) -> Vec<PanoramaId> {
        (0..self.items.len()).map(PanoramaId::for_index).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::{Manifest, ManifestError};
    use pretty_assertions::assert_eq;

    #[test]
    fn parses_items_with_optional_text() {
        let m = Manifest::from_json_str(
            r#"[{"high":"a.jpg","tiny":"a-t.jpg","title":"Harbor"},{"high":"b.jpg","tiny":"b-t.jpg"}]"#,
        )
        .expect("parse");
        assert_eq!(m.len(), 2);
        assert_eq!(m.items[0].title, "Harbor");
        assert_eq!(m.items[1].description, "");
        assert_eq!(m.items[1].urls().tiny, "b-t.jpg");
        assert_eq!(m.ids()[1].as_str(), "panorama-container-1");
    }

    #[test]
    fn empty_url_is_rejected_with_index() {
        let err = Manifest::from_json_str(r#"[{"high":"a.jpg","tiny":"a.jpg"},{"high":"","tiny":"x"}]"#)
            .unwrap_err();
        assert_eq!(
            err,
            ManifestError::EmptyUrl {
                index: 1,
                field: "high"
            }
        );
    }
}
