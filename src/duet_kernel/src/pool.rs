//! Fixed-capacity pool of one-word buffer slots.
//!
//! The pool is an arena of [`Entry`]s addressed by index. Every slot is a
//! member of exactly one singly-linked list at any time: the pool's own free
//! list, or one [`SlotList`] owned by somebody else. Lists are linked through
//! the `next` index stored in each entry, so moving a whole chain from one
//! list to another is O(1).
//!
//! A slot taken out of a list is represented by [`Slot`], a move-only token.
//! Because `Slot` is neither `Copy` nor `Clone`, pushing the same slot onto two
//! lists is rejected at compile time.
//!
//! Indices are one-based when stored so that `Option<NonZeroU16>` can be used
//! for links without a separate tag:
//!
//! ```
//! use duet_kernel::pool::{Pool, SlotList};
//! let mut pool = Pool::new(4);
//! let mut list = SlotList::new();
//! let slot = pool.alloc(0xdead_beef).unwrap();
//! pool.push_back(&mut list, slot);
//! assert_eq!(pool.free_len() + list.len(), pool.capacity());
//! ```
use alloc::{boxed::Box, vec::Vec};
use core::{fmt, num::NonZeroU16};

/// A stored slot index (one-based).
type Link = NonZeroU16;

/// An exclusively owned buffer slot that is not a member of any list.
#[must_use = "a slot that is neither freed nor pushed onto a list is leaked"]
pub struct Slot(Link);

/// Identifies a slot without owning it. Used to check whether a particular
/// message is still at the head of a queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotMark(Link);

/// What the slot's word holds beyond its raw value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotKind {
    /// A plain payload word.
    Unused,
    /// The first slot of a reassembled data message. The entry's `extra`
    /// field holds the message length in bytes.
    DataStart,
}

#[derive(Clone, Copy)]
struct Entry {
    word: u32,
    next: Option<Link>,
    kind: SlotKind,
    extra: u8,
}

/// A singly-linked list of slots in a [`Pool`].
///
/// A `SlotList` is only meaningful together with the pool its slots were
/// allocated from.
#[derive(Default)]
pub struct SlotList {
    head: Option<Link>,
    tail: Option<Link>,
    len: usize,
}

/// Fixed-capacity pool of buffer slots.
pub struct Pool {
    entries: Box<[Entry]>,
    free: SlotList,
}

impl Slot {
    #[inline]
    fn index(&self) -> usize {
        self.0.get() as usize - 1
    }

    #[inline]
    pub fn mark(&self) -> SlotMark {
        SlotMark(self.0)
    }
}

impl fmt::Debug for Slot {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Slot({})", self.index())
    }
}

impl SlotList {
    pub const fn new() -> Self {
        Self {
            head: None,
            tail: None,
            len: 0,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    #[inline]
    pub fn front_mark(&self) -> Option<SlotMark> {
        self.head.map(SlotMark)
    }
}

impl fmt::Debug for SlotList {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("SlotList").field("len", &self.len).finish()
    }
}

impl Pool {
    /// Construct a pool with `capacity` slots, all of them free.
    ///
    /// # Panics
    ///
    /// `capacity` must fit in a 16-bit slot index.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity < u16::MAX as usize, "too many slots");

        let entries: Vec<Entry> = (0..capacity)
            .map(|i| Entry {
                word: 0,
                next: if i + 1 < capacity {
                    Some(link_from_index(i + 1))
                } else {
                    None
                },
                kind: SlotKind::Unused,
                extra: 0,
            })
            .collect();

        let free = if capacity > 0 {
            SlotList {
                head: Some(link_from_index(0)),
                tail: Some(link_from_index(capacity - 1)),
                len: capacity,
            }
        } else {
            SlotList::new()
        };

        Self {
            entries: entries.into_boxed_slice(),
            free,
        }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.entries.len()
    }

    /// Get the number of slots on the free list.
    #[inline]
    pub fn free_len(&self) -> usize {
        self.free.len
    }

    /// Take a slot from the head of the free list and store `word` in it.
    /// Returns `None` if the pool is exhausted.
    pub fn alloc(&mut self, word: u32) -> Option<Slot> {
        let slot = self.pop_free()?;
        let e = &mut self.entries[slot.index()];
        e.word = word;
        e.kind = SlotKind::Unused;
        e.extra = 0;
        Some(slot)
    }

    /// Return a slot to the tail of the free list.
    pub fn free(&mut self, slot: Slot) {
        self.push_free(slot);
    }

    /// Return every slot of `list` to the free list.
    pub fn free_list(&mut self, list: SlotList) {
        let mut free = core::mem::take(&mut self.free);
        self.append(&mut free, list);
        self.free = free;
    }

    #[inline]
    pub fn word(&self, slot: &Slot) -> u32 {
        self.entries[slot.index()].word
    }

    #[inline]
    pub fn set_word(&mut self, slot: &Slot, word: u32) {
        self.entries[slot.index()].word = word;
    }

    #[inline]
    pub fn kind(&self, slot: &Slot) -> (SlotKind, u8) {
        let e = &self.entries[slot.index()];
        (e.kind, e.extra)
    }

    #[inline]
    pub fn set_kind(&mut self, slot: &Slot, kind: SlotKind, extra: u8) {
        let e = &mut self.entries[slot.index()];
        e.kind = kind;
        e.extra = extra;
    }

    /// Get the word stored in the first slot of `list`.
    #[inline]
    pub fn front_word(&self, list: &SlotList) -> Option<u32> {
        list.head.map(|l| self.entries[index_from_link(l)].word)
    }

    /// Get the kind of the first slot of `list`.
    #[inline]
    pub fn front_kind(&self, list: &SlotList) -> Option<(SlotKind, u8)> {
        list.head.map(|l| {
            let e = &self.entries[index_from_link(l)];
            (e.kind, e.extra)
        })
    }

    /// Iterate over the words stored in `list`, front to back.
    pub fn words<'a>(&'a self, list: &'a SlotList) -> impl Iterator<Item = u32> + 'a {
        let mut cur = list.head;
        core::iter::from_fn(move || {
            let l = cur?;
            let e = &self.entries[index_from_link(l)];
            cur = e.next;
            Some(e.word)
        })
    }

    /// Append `slot` to the tail of `list`.
    pub fn push_back(&mut self, list: &mut SlotList, slot: Slot) {
        let i = slot.index();
        self.entries[i].next = None;
        match list.tail {
            Some(tail) => self.entries[index_from_link(tail)].next = Some(slot.0),
            None => list.head = Some(slot.0),
        }
        list.tail = Some(slot.0);
        list.len += 1;
    }

    /// Remove the first slot of `list`.
    pub fn pop_front(&mut self, list: &mut SlotList) -> Option<Slot> {
        let head = list.head?;
        let e = &mut self.entries[index_from_link(head)];
        list.head = e.next.take();
        if list.head.is_none() {
            list.tail = None;
        }
        list.len -= 1;
        Some(Slot(head))
    }

    /// Move every slot of `other` to the tail of `list` in O(1).
    pub fn append(&mut self, list: &mut SlotList, other: SlotList) {
        let (Some(other_head), Some(other_tail)) = (other.head, other.tail) else {
            return;
        };
        match list.tail {
            Some(tail) => self.entries[index_from_link(tail)].next = Some(other_head),
            None => list.head = Some(other_head),
        }
        list.tail = Some(other_tail);
        list.len += other.len;
    }

    /// Detach the first `count` slots of `list` as a new list.
    ///
    /// # Panics
    ///
    /// `list` must have at least `count` slots.
    pub fn split_front(&mut self, list: &mut SlotList, count: usize) -> SlotList {
        assert!(count <= list.len, "not enough slots to split");
        if count == 0 {
            return SlotList::new();
        }
        if count == list.len {
            return core::mem::take(list);
        }

        let head = list.head.unwrap();
        let mut last = head;
        for _ in 1..count {
            last = self.entries[index_from_link(last)].next.unwrap();
        }
        let rest = self.entries[index_from_link(last)].next.take();

        list.head = rest;
        list.len -= count;

        SlotList {
            head: Some(head),
            tail: Some(last),
            len: count,
        }
    }

    // The free list is stored inside `self`, so the generic list primitives
    // can't borrow it alongside `self.entries`. It's moved out temporarily.

    fn pop_free(&mut self) -> Option<Slot> {
        let mut free = core::mem::take(&mut self.free);
        let slot = self.pop_front(&mut free);
        self.free = free;
        slot
    }

    fn push_free(&mut self, slot: Slot) {
        let mut free = core::mem::take(&mut self.free);
        self.push_back(&mut free, slot);
        self.free = free;
    }
}

impl fmt::Debug for Pool {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Pool")
            .field("capacity", &self.capacity())
            .field("free", &self.free_len())
            .finish()
    }
}

#[inline]
fn link_from_index(i: usize) -> Link {
    Link::new(i as u16 + 1).unwrap()
}

#[inline]
fn index_from_link(l: Link) -> usize {
    l.get() as usize - 1
}
