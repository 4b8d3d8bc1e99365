//! Pointer tagging for the exchanger slot.
//!
//! Offers are at least 4-byte aligned, so the two low address bits of an
//! offer pointer are free to carry the slot state. All helpers are
//! provenance-safe (`map_addr`), which keeps miri happy.

/// Low bits available for a tag.
pub(crate) const TAG_MASK: usize = 0b11;

/// Attach `tag` to an untagged pointer (provenance-safe).
#[inline(always)]
pub(crate) fn tag_ptr<T>(p: *mut T, tag: usize) -> *mut T {
    debug_assert_eq!(p.addr() & TAG_MASK, 0, "pointer already tagged or misaligned");
    debug_assert_eq!(tag & !TAG_MASK, 0, "tag does not fit in the low bits");
    p.map_addr(|a| a | tag)
}

/// Strip the tag (provenance-safe).
#[inline(always)]
pub(crate) fn untag_ptr<T>(p: *mut T) -> *mut T {
    p.map_addr(|a| a & !TAG_MASK)
}

/// Read the tag.
#[inline(always)]
pub(crate) fn ptr_tag<T>(p: *mut T) -> usize {
    p.addr() & TAG_MASK
}
