//! Core ID types shared by the path registry and the anchor table.

/// Index of a map as assigned by the SLAM backend.
///
/// A new index appears whenever the backend starts a fresh map (tracking
/// loss, relocalization failure); indices are never reused for a different
/// physical session.
pub type MapIndex = usize;

/// Stable identity of a backend keyframe.
///
/// The backend owns keyframes; this crate only ever refers to them by this
/// id and through a non-owning [`PoseSource`](super::PoseSource) handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct KeyFrameId(pub u64);

impl KeyFrameId {
    /// Create a new KeyFrameId with the given value.
    pub fn new(id: u64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for KeyFrameId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "KF{}", self.0)
    }
}

/// Identifier of a placed anchor.
///
/// AnchorIds are assigned sequentially by the anchor table and are never
/// recycled, since anchors live for the whole session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AnchorId(pub u64);

impl AnchorId {
    /// Create a new AnchorId with the given value.
    pub fn new(id: u64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for AnchorId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "A{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keyframe_id_equality() {
        let id1 = KeyFrameId::new(42);
        let id2 = KeyFrameId::new(42);
        let id3 = KeyFrameId::new(43);

        assert_eq!(id1, id2);
        assert_ne!(id1, id3);
    }

    #[test]
    fn test_anchor_id_display() {
        let id = AnchorId::new(7);
        assert_eq!(format!("{}", id), "A7");
        assert_eq!(format!("{}", KeyFrameId::new(3)), "KF3");
    }

    #[test]
    fn test_anchor_ids_order_by_creation() {
        let mut ids = vec![AnchorId::new(3), AnchorId::new(1), AnchorId::new(2)];
        ids.sort();
        assert_eq!(ids, vec![AnchorId::new(1), AnchorId::new(2), AnchorId::new(3)]);
    }
}
