use crate::common::FrameId;

/// Page replacement policy used by the buffer pool.
///
/// A frame is a victim candidate from the moment it is unpinned until it is
/// pinned again or chosen as a victim.
pub trait Replacer: Send + Sync {
    /// Chooses a victim frame and removes it from the candidates.
    /// Returns None if no frame can be evicted.
    fn victim(&self) -> Option<FrameId>;

    /// Marks a frame as in use; it will not be victimized until unpinned.
    fn pin(&self, frame_id: FrameId);

    /// Marks a frame as evictable.
    fn unpin(&self, frame_id: FrameId);

    /// Returns the number of frames that can currently be victimized.
    fn size(&self) -> usize;
}
