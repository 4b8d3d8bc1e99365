//! Node arena for the per-node-locked trees.
//!
//! Tree nodes live in slots of a [`NodeArena`] and refer to each other by
//! [`NodeRef`] (slot index plus reuse generation) instead of owning pointers.
//! Each slot carries its own [`NodeVersion`] lock, two atomic child links and
//! an atomic pointer to an immutable [`Entry`].
//!
//! # Pointer Stability
//!
//! Slots are stored in chunks that double in size and are never moved or freed
//! before the arena drops, so a `&Slot` obtained from any index that was ever
//! handed out stays valid for the arena's lifetime. This is what lets an
//! optimistic descent read a slot that was unlinked (or even reused) under it:
//! the read is stale, not dangling, and the generation check rejects it.
//!
//! # Entries
//!
//! Key and value are published together by swapping the entry pointer. A
//! replaced entry is retired through the arena's `seize` collector, so a reader
//! that loaded the old pointer through [`NodeArena::guard()`] can finish
//! reading it.

use std::cmp::Ordering;
use std::fmt as StdFmt;
use std::marker::PhantomData;
use std::ptr as StdPtr;
use std::sync::atomic::{AtomicPtr, AtomicU32, AtomicU64};

use parking_lot::Mutex;
use seize::{Collector, Guard, LocalGuard};

use crate::nodeversion::{LockGuard, NodeVersion};
use crate::ordering::{CAS_FAILURE, CAS_SUCCESS, READ_ORD, RELAXED, WRITE_ORD};
use crate::tracing_helpers::debug_log;

/// Slots in the first chunk. Chunk `c` holds `FIRST_CHUNK << c` slots.
const FIRST_CHUNK_SHIFT: u32 = 6;
const FIRST_CHUNK: u32 = 1 << FIRST_CHUNK_SHIFT;

/// Number of chunks. Total capacity is `FIRST_CHUNK * (2^MAX_CHUNKS - 1)`,
/// just under 2^31 slots, which keeps every index below [`NodeRef::NIL`].
const MAX_CHUNKS: usize = 25;

// ============================================================================
//  NodeRef
// ============================================================================

/// Generation-tagged reference to an arena slot.
///
/// Two refs are equal only if both the slot index and the generation match,
/// so a slot that was unlinked and reused for another key compares unequal
/// to every ref taken before the unlink.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeRef(u64);

impl NodeRef {
    /// The absent child / empty root.
    pub const NIL: Self = Self(u64::MAX);

    #[inline]
    const fn new(index: u32, generation: u32) -> Self {
        Self(((generation as u64) << 32) | index as u64)
    }

    #[inline]
    pub(crate) const fn from_bits(bits: u64) -> Self {
        Self(bits)
    }

    #[inline]
    pub(crate) const fn to_bits(self) -> u64 {
        self.0
    }

    /// Slot index.
    #[inline]
    #[must_use]
    #[expect(clippy::cast_possible_truncation, reason = "low half is the index")]
    pub const fn index(self) -> u32 {
        self.0 as u32
    }

    /// Slot generation at the time the ref was created.
    #[inline]
    #[must_use]
    pub const fn generation(self) -> u32 {
        (self.0 >> 32) as u32
    }

    /// `true` for [`NodeRef::NIL`].
    #[inline]
    #[must_use]
    pub const fn is_nil(self) -> bool {
        self.0 == Self::NIL.0
    }
}

impl StdFmt::Debug for NodeRef {
    fn fmt(&self, f: &mut StdFmt::Formatter<'_>) -> StdFmt::Result {
        if self.is_nil() {
            write!(f, "NodeRef(nil)")
        } else {
            write!(f, "NodeRef({}@{})", self.index(), self.generation())
        }
    }
}

// ============================================================================
//  Side / Entry
// ============================================================================

/// Which child link of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    /// Keys less than the node's key.
    Left,
    /// Keys greater than the node's key.
    Right,
}

impl Side {
    /// Side a key belongs on relative to a node whose key compared as `ord`
    /// (`key.cmp(node_key)`). `None` when the key matches the node.
    #[inline]
    #[must_use]
    pub const fn of(ord: Ordering) -> Option<Self> {
        match ord {
            Ordering::Less => Some(Self::Left),
            Ordering::Greater => Some(Self::Right),
            Ordering::Equal => None,
        }
    }
}

/// Immutable key/value pair owned by a slot.
#[derive(Debug)]
pub struct Entry<K, V> {
    /// Ordering key.
    pub key: K,
    /// Mapped value.
    pub value: V,
}

impl<K, V> Entry<K, V> {
    pub(crate) fn boxed(key: K, value: V) -> Box<Self> {
        Box::new(Self { key, value })
    }
}

/// Reclaim a boxed entry (seize callback).
///
/// # Safety
///
/// - `ptr` must come from `Box::into_raw` on an `Entry<K, V>`.
/// - Must only be called after seize determines no reader remains.
unsafe fn reclaim_entry_boxed<K, V>(ptr: *mut Entry<K, V>, _collector: &Collector) {
    // SAFETY: Caller guarantees ptr is valid and from Box::into_raw.
    unsafe { drop(Box::from_raw(ptr)) };
}

// ============================================================================
//  Slot
// ============================================================================

/// One tree node.
pub struct Slot<K, V> {
    version: NodeVersion,
    left: AtomicU64,
    right: AtomicU64,
    entry: AtomicPtr<Entry<K, V>>,
}

impl<K, V> Slot<K, V> {
    fn vacant() -> Self {
        Self {
            version: NodeVersion::new(),
            left: AtomicU64::new(NodeRef::NIL.to_bits()),
            right: AtomicU64::new(NodeRef::NIL.to_bits()),
            entry: AtomicPtr::new(StdPtr::null_mut()),
        }
    }

    /// The slot's lock and generation.
    #[inline]
    pub fn version(&self) -> &NodeVersion {
        &self.version
    }

    #[inline]
    const fn link(&self, side: Side) -> &AtomicU64 {
        match side {
            Side::Left => &self.left,
            Side::Right => &self.right,
        }
    }

    /// Read a child link. Unsynchronized readers may see a stale value.
    #[inline]
    pub fn child(&self, side: Side) -> NodeRef {
        NodeRef::from_bits(self.link(side).load(READ_ORD))
    }

    /// Publish a child link. The caller must hold this slot's lock.
    #[inline]
    pub fn set_child(&self, lock: &LockGuard<'_>, side: Side, child: NodeRef) {
        debug_assert!(lock.guards(&self.version), "set_child without the slot lock");
        self.link(side).store(child.to_bits(), WRITE_ORD);
    }

    /// `true` if neither child link is set.
    #[inline]
    pub fn is_leaf(&self) -> bool {
        self.child(Side::Left).is_nil() && self.child(Side::Right).is_nil()
    }

    /// Borrow the entry under the slot lock.
    ///
    /// Returns `None` only for a slot that is being unlinked.
    #[inline]
    pub fn entry_locked<'l>(&'l self, lock: &'l LockGuard<'_>) -> Option<&'l Entry<K, V>> {
        debug_assert!(lock.guards(&self.version), "entry_locked without the slot lock");
        let ptr: *mut Entry<K, V> = self.entry.load(READ_ORD);

        // SAFETY: entries are only replaced or cleared under this slot's lock,
        // which the caller holds for 'l, so the pointee is not retired before
        // the borrow ends.
        unsafe { ptr.as_ref() }
    }

    /// Borrow the entry without the lock, protected by a seize guard.
    ///
    /// The entry may already have been replaced; it stays readable until
    /// `guard` drops.
    #[inline]
    pub fn entry_protected<'g>(&self, guard: &'g LocalGuard<'_>) -> Option<&'g Entry<K, V>> {
        let ptr: *mut Entry<K, V> = guard.protect(&self.entry, READ_ORD);

        // SAFETY: protected loads stay valid until the guard drops; replaced
        // entries go through `defer_retire`, never a direct free.
        unsafe { ptr.as_ref() }
    }

    /// Swap in a new entry (or clear it with null) under the slot lock and
    /// return the previous pointer. The caller decides whether to retire it
    /// or hand it to another slot.
    #[inline]
    pub(crate) fn swap_entry(
        &self,
        lock: &LockGuard<'_>,
        entry: *mut Entry<K, V>,
    ) -> *mut Entry<K, V> {
        debug_assert!(lock.guards(&self.version), "swap_entry without the slot lock");
        self.entry.swap(entry, CAS_SUCCESS)
    }
}

// ============================================================================
//  NodeArena
// ============================================================================

/// Growable, never-moving slot storage with generation-tagged reuse.
///
/// Allocation takes a slot from the free list or bumps the high-water mark.
/// A slot goes back on the free list only after its unlinker released the
/// lock, which is also when its generation moved on.
pub struct NodeArena<K, V> {
    /// Chunk `c` points to `FIRST_CHUNK << c` slots, allocated on first use.
    chunks: [AtomicPtr<Slot<K, V>>; MAX_CHUNKS],

    /// High-water mark: slots below it have been handed out at least once.
    next: AtomicU32,

    /// Released slot indices.
    free: Mutex<Vec<u32>>,

    /// Reclaims replaced entries once no protected reader can see them.
    collector: Collector,

    _marker: PhantomData<Box<Entry<K, V>>>,
}

// SAFETY: the arena hands out `&Entry` across threads (Sync) and moves entries
// between threads on drop/reclaim (Send).
unsafe impl<K: Send + Sync, V: Send + Sync> Send for NodeArena<K, V> {}
// SAFETY: see above.
unsafe impl<K: Send + Sync, V: Send + Sync> Sync for NodeArena<K, V> {}

impl<K, V> StdFmt::Debug for NodeArena<K, V> {
    fn fmt(&self, f: &mut StdFmt::Formatter<'_>) -> StdFmt::Result {
        f.debug_struct("NodeArena")
            .field("allocated", &self.allocated())
            .field("free_slots", &self.free_slots())
            .finish_non_exhaustive()
    }
}

impl<K, V> Default for NodeArena<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

/// Map a slot index to (chunk, offset within chunk).
#[inline]
const fn locate(index: u32) -> (usize, usize) {
    let biased: u64 = index as u64 + FIRST_CHUNK as u64;
    let chunk: u32 = (63 - biased.leading_zeros()) - FIRST_CHUNK_SHIFT;
    let offset: u64 = biased - (1u64 << (chunk + FIRST_CHUNK_SHIFT));
    (chunk as usize, offset as usize)
}

#[inline]
const fn chunk_len(chunk: usize) -> usize {
    (FIRST_CHUNK as usize) << chunk
}

impl<K, V> NodeArena<K, V> {
    /// Create an empty arena. No chunk is allocated until the first node.
    #[must_use]
    pub fn new() -> Self {
        Self {
            chunks: std::array::from_fn(|_| AtomicPtr::new(StdPtr::null_mut())),
            next: AtomicU32::new(0),
            free: Mutex::new(Vec::new()),
            collector: Collector::new(),
            _marker: PhantomData,
        }
    }

    /// Enter a protected region for unsynchronized entry reads and retirement.
    #[must_use]
    #[inline]
    pub fn guard(&self) -> LocalGuard<'_> {
        self.collector.enter()
    }

    /// Slots handed out so far (live or free).
    #[must_use]
    pub fn allocated(&self) -> usize {
        self.next.load(RELAXED) as usize
    }

    /// Slots waiting on the free list.
    #[must_use]
    pub fn free_slots(&self) -> usize {
        self.free.lock().len()
    }

    /// Resolve a ref to its slot, regardless of generation.
    ///
    /// Every ref in circulation came from [`NodeArena::alloc()`], so its chunk
    /// exists.
    #[inline]
    pub fn slot(&self, node: NodeRef) -> &Slot<K, V> {
        debug_assert!(!node.is_nil(), "slot(NIL)");
        let (chunk, offset) = locate(node.index());

        #[expect(clippy::indexing_slicing, reason = "chunk < MAX_CHUNKS for every issued index")]
        let base: *mut Slot<K, V> = self.chunks[chunk].load(READ_ORD);
        debug_assert!(!base.is_null(), "slot({node:?}) in an unallocated chunk");

        // SAFETY: the chunk was installed before the index was handed out and
        // is only freed in Drop; offset < chunk_len(chunk) by construction.
        unsafe { &*base.add(offset) }
    }

    /// `true` if the slot behind `node` still carries the same generation.
    #[inline]
    pub fn is_current(&self, node: NodeRef) -> bool {
        self.slot(node).version().generation() == node.generation()
    }

    /// Allocate a leaf node holding `entry`.
    ///
    /// # Panics
    ///
    /// Panics when all `2^31` slots are live.
    pub fn alloc(&self, entry: Box<Entry<K, V>>) -> NodeRef {
        let index: u32 = match self.free.lock().pop() {
            Some(index) => index,
            None => self.next.fetch_add(1, RELAXED),
        };

        let (chunk, _) = locate(index);
        assert!(chunk < MAX_CHUNKS, "node arena exhausted at index {index}");
        self.ensure_chunk(chunk);

        let generation: u32 = {
            let node = NodeRef::new(index, 0);
            let slot: &Slot<K, V> = self.slot(node);
            slot.left.store(NodeRef::NIL.to_bits(), RELAXED);
            slot.right.store(NodeRef::NIL.to_bits(), RELAXED);

            let previous = slot.entry.swap(Box::into_raw(entry), WRITE_ORD);
            debug_assert!(previous.is_null(), "allocated slot {index} still owns an entry");

            slot.version().generation()
        };

        NodeRef::new(index, generation)
    }

    /// Return an unlinked slot to the free list.
    ///
    /// The caller must have cleared the slot's entry and released its lock
    /// after `mark_unlinked()`.
    pub fn free(&self, node: NodeRef) {
        debug_assert!(
            !self.is_current(node),
            "freeing {node:?} whose generation never moved"
        );
        self.free.lock().push(node.index());
    }

    /// Retire an entry that is no longer reachable from any slot.
    ///
    /// # Safety
    ///
    /// `entry` must have come from this arena (`Entry::boxed` via `alloc` or a
    /// slot swap) and must not be reachable from any slot anymore.
    pub(crate) unsafe fn retire_entry(&self, entry: *mut Entry<K, V>, guard: &LocalGuard<'_>) {
        if entry.is_null() {
            return;
        }

        // SAFETY: caller guarantees the entry is unreachable; readers that
        // protected it before the swap keep it alive through the guard.
        unsafe { guard.defer_retire(entry, reclaim_entry_boxed::<K, V>) };
    }

    fn ensure_chunk(&self, chunk: usize) {
        #[expect(clippy::indexing_slicing, reason = "caller checked chunk < MAX_CHUNKS")]
        let cell: &AtomicPtr<Slot<K, V>> = &self.chunks[chunk];

        if !cell.load(READ_ORD).is_null() {
            return;
        }

        let fresh: Box<[Slot<K, V>]> = (0..chunk_len(chunk)).map(|_| Slot::vacant()).collect();
        let fresh: *mut Slot<K, V> = Box::into_raw(fresh).cast::<Slot<K, V>>();

        match cell.compare_exchange(StdPtr::null_mut(), fresh, CAS_SUCCESS, CAS_FAILURE) {
            Ok(_) => {
                debug_log!(chunk, slots = chunk_len(chunk), "arena chunk installed");
            }
            Err(_) => {
                // Another allocator won the race.
                // SAFETY: `fresh` was never published.
                unsafe { drop_chunk(fresh, chunk) };
            }
        }
    }
}

/// Free a chunk allocation without touching slot entries.
///
/// # Safety
///
/// `base` must come from `ensure_chunk` for the same `chunk` and be unshared.
unsafe fn drop_chunk<K, V>(base: *mut Slot<K, V>, chunk: usize) {
    let slice: *mut [Slot<K, V>] = StdPtr::slice_from_raw_parts_mut(base, chunk_len(chunk));
    // SAFETY: reconstructs the Box<[Slot]> leaked in ensure_chunk.
    unsafe { drop(Box::from_raw(slice)) };
}

impl<K, V> Drop for NodeArena<K, V> {
    fn drop(&mut self) {
        for (chunk, cell) in self.chunks.iter_mut().enumerate() {
            let base: *mut Slot<K, V> = *cell.get_mut();
            if base.is_null() {
                continue;
            }

            for offset in 0..chunk_len(chunk) {
                // SAFETY: offset is within the chunk; we have exclusive access.
                let slot: &mut Slot<K, V> = unsafe { &mut *base.add(offset) };
                let entry: *mut Entry<K, V> = *slot.entry.get_mut();
                if !entry.is_null() {
                    // SAFETY: live entries are owned by exactly one slot.
                    unsafe { drop(Box::from_raw(entry)) };
                }
            }

            // SAFETY: exclusive access; the chunk came from ensure_chunk.
            unsafe { drop_chunk(base, chunk) };
        }
        // `collector` drops after this and reclaims the retired entries.
    }
}
