use thiserror::Error;

/// Failures reported by the spatial indices. An operation that returns one of these
/// has left the index unchanged.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpatialIndexError {
    /// `remove`/`update` on an object the index does not track.
    #[error("object is not tracked by this index")]
    NotFound,
    /// The object's bounds are not inside the octree's root volume.
    #[error("object bounds lie outside the root volume")]
    OutOfBounds,
    /// The object's key is already tracked (or staged).
    #[error("object is already tracked by this index")]
    AlreadyPresent,
    /// A tracked object's node has lost a parent or sibling link. The index is
    /// corrupt and should be rebuilt.
    #[error("tree links around a tracked object are broken")]
    BrokenLink,
}
