use std::fmt;

/// Identifies one frame producer (a compositor frame sink).
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    serde::Serialize,
    serde::Deserialize,
)]
#[serde(transparent)]
pub struct FrameSinkId(pub u32);

impl FrameSinkId {
    /// Sink id zero is reserved as "invalid".
    pub fn is_valid(self) -> bool {
        self.0 != 0
    }
}

/// Version of a surface within one frame sink.
///
/// Ordering is lexicographic on `(parent, child)`: a larger value is a newer surface.
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    serde::Serialize,
    serde::Deserialize,
)]
pub struct LocalSurfaceId {
    /// Sequence number allocated by the embedder.
    pub parent: u32,
    /// Sequence number allocated by the producer itself.
    pub child: u32,
}

impl LocalSurfaceId {
    pub fn new(parent: u32, child: u32) -> Self {
        Self { parent, child }
    }

    pub fn is_valid(self) -> bool {
        self.parent != 0 && self.child != 0
    }
}

/// Names one surface: a frame sink plus the local version within it.
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    serde::Serialize,
    serde::Deserialize,
)]
pub struct SurfaceId {
    pub frame_sink_id: FrameSinkId,
    pub local_surface_id: LocalSurfaceId,
}

impl SurfaceId {
    pub fn new(frame_sink_id: FrameSinkId, local_surface_id: LocalSurfaceId) -> Self {
        Self {
            frame_sink_id,
            local_surface_id,
        }
    }

    /// Shorthand for tests and scene files: `SurfaceId(sink, parent.child)`.
    pub fn from_parts(sink: u32, parent: u32, child: u32) -> Self {
        Self::new(FrameSinkId(sink), LocalSurfaceId::new(parent, child))
    }

    pub fn is_valid(&self) -> bool {
        self.frame_sink_id.is_valid() && self.local_surface_id.is_valid()
    }
}

impl fmt::Display for SurfaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "SurfaceId({}, {}.{})",
            self.frame_sink_id.0, self.local_surface_id.parent, self.local_surface_id.child
        )
    }
}

/// Inclusive range of acceptable surfaces for an embed.
///
/// `end` is the primary surface the embedder wants; `start`, when present, is the oldest
/// surface that may be shown as a fallback while `end` has not arrived yet.
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    serde::Serialize,
    serde::Deserialize,
)]
pub struct SurfaceRange {
    #[serde(default)]
    pub start: Option<SurfaceId>,
    pub end: SurfaceId,
}

impl SurfaceRange {
    pub fn new(start: Option<SurfaceId>, end: SurfaceId) -> Self {
        Self { start, end }
    }

    /// Range holding exactly one surface.
    pub fn single(id: SurfaceId) -> Self {
        Self::new(None, id)
    }

    /// Return `true` when the fallback lives in a different frame sink than the primary.
    pub fn has_different_frame_sink_ids(&self) -> bool {
        self.start
            .is_some_and(|start| start.frame_sink_id != self.end.frame_sink_id)
    }

    /// Return `true` when `id` lies between `start` and `end`, both inclusive.
    pub fn is_in_range_inclusive(&self, id: &SurfaceId) -> bool {
        if id.frame_sink_id == self.end.frame_sink_id {
            if id.local_surface_id > self.end.local_surface_id {
                return false;
            }
            return match self.start {
                Some(start) if start.frame_sink_id == id.frame_sink_id => {
                    id.local_surface_id >= start.local_surface_id
                }
                _ => true,
            };
        }
        match self.start {
            Some(start) if start.frame_sink_id == id.frame_sink_id => {
                id.local_surface_id >= start.local_surface_id
            }
            _ => false,
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/surfaces/ids.rs"]
mod tests;
