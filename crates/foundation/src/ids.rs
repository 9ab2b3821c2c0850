use std::fmt;

/// Stable identifier of one gallery item.
///
/// Ids are opaque strings chosen by the caller (the web front end uses the
/// container element id, e.g. `panorama-container-3`). Ordering is lexical and
/// only used for deterministic map traversal.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PanoramaId(String);

impl PanoramaId {
    pub fn new(id: impl Into<String>) -> Self {
        PanoramaId(id.into())
    }

    /// Container id used for the item at `index` in a gallery listing.
    pub fn for_index(index: usize) -> Self {
        PanoramaId(format!("panorama-container-{index}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PanoramaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PanoramaId {
    fn from(value: &str) -> Self {
        PanoramaId::new(value)
    }
}

impl From<String> for PanoramaId {
    fn from(value: String) -> Self {
        PanoramaId(value)
    }
}

#[cfg(test)]
mod tests {
    use super::PanoramaId;

    #[test]
    fn index_ids_follow_container_naming() {
        assert_eq!(PanoramaId::for_index(3).as_str(), "panorama-container-3");
    }

    #[test]
    fn display_is_the_raw_id() {
        let id = PanoramaId::from("p0");
        assert_eq!(id.to_string(), "p0");
        assert_eq!(id, PanoramaId::new(String::from("p0")));
    }
}
