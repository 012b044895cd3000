//! A single slot of a bucket.
//!
//! A slot's state and version share one atomic word, the stamp. The low two
//! bits hold the state tag, the remaining bits a version that is bumped on
//! every transition. Every compare-and-swap is made against a full stamp, so
//! a thread that observed a slot at version `n` can never succeed in
//! transitioning it after someone else moved it on, even if the state tag has
//! come back around to the same value.
//!
//! Legal transitions are
//!
//! ```text
//! EMPTY -> TRANSITIONING -> OCCUPIED      insert
//! OCCUPIED -> TRANSITIONING -> OCCUPIED   replace, evict and reuse
//! OCCUPIED -> TRANSITIONING -> EMPTY      remove, evict
//! EMPTY -> TRANSITIONING -> EMPTY         rollback of a lost claim
//! ```
//!
//! The thread that moves a slot into `TRANSITIONING` owns the key and value
//! cells until it publishes the next stamp. Readers use the stamp as a
//! seqlock: they read it, copy the key and value pointer, then read it
//! again, and only trust the copy if both reads agree and showed `OCCUPIED`.

use crossbeam_epoch::{Atomic, Guard, Shared};
use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::ptr;
use std::sync::atomic::{fence, AtomicU64, AtomicU8, Ordering};

const STATE_MASK: u64 = 0b11;
const VERSION_SHIFT: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SlotState {
    Empty,
    Occupied,
    Transitioning,
}

impl SlotState {
    #[inline]
    const fn tag(self) -> u64 {
        match self {
            SlotState::Empty => 0,
            SlotState::Occupied => 1,
            SlotState::Transitioning => 2,
        }
    }
}

/// A state tag packed with its version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Stamp(u64);

impl Stamp {
    const EMPTY: Stamp = Stamp(0);

    #[inline]
    pub(crate) fn state(self) -> SlotState {
        match self.0 & STATE_MASK {
            0 => SlotState::Empty,
            1 => SlotState::Occupied,
            _ => SlotState::Transitioning,
        }
    }

    #[inline]
    pub(crate) fn version(self) -> u64 {
        self.0 >> VERSION_SHIFT
    }

    #[inline]
    fn next(self, state: SlotState) -> Stamp {
        Stamp((self.version().wrapping_add(1) << VERSION_SHIFT) | state.tag())
    }
}

/// The result of a validated read.
pub(crate) enum SlotRead<'g, K, V> {
    Empty(Stamp),
    Occupied {
        stamp: Stamp,
        key: K,
        value: Shared<'g, V>,
    },
    /// A writer owns the slot, or changed it while we were reading.
    Busy,
}

pub(crate) struct Slot<K, V> {
    stamp: AtomicU64,
    recency: AtomicU8,
    key: UnsafeCell<MaybeUninit<K>>,
    value: Atomic<V>,
}

// The key cell is only written by the thread holding the slot in
// TRANSITIONING, and only trusted by readers after stamp validation.
unsafe impl<K: Send, V: Send + Sync> Send for Slot<K, V> {}
unsafe impl<K: Send + Sync, V: Send + Sync> Sync for Slot<K, V> {}

impl<K: Copy + Eq, V> Slot<K, V> {
    pub(crate) fn new() -> Self {
        Slot {
            stamp: AtomicU64::new(Stamp::EMPTY.0),
            recency: AtomicU8::new(0),
            key: UnsafeCell::new(MaybeUninit::uninit()),
            value: Atomic::null(),
        }
    }

    #[inline]
    pub(crate) fn stamp(&self) -> Stamp {
        Stamp(self.stamp.load(Ordering::Acquire))
    }

    /// Seqlock read of the slot.
    pub(crate) fn read<'g>(&self, guard: &'g Guard) -> SlotRead<'g, K, V> {
        let before = self.stamp();
        match before.state() {
            SlotState::Empty => SlotRead::Empty(before),
            SlotState::Transitioning => SlotRead::Busy,
            SlotState::Occupied => {
                // The copy may be torn by a concurrent writer, so it stays
                // uninit until the stamp check below proves it is whole.
                let key = unsafe { ptr::read_volatile(self.key.get()) };
                let value = self.value.load(Ordering::Acquire, guard);
                fence(Ordering::Acquire);
                let after = Stamp(self.stamp.load(Ordering::Relaxed));
                if before != after {
                    return SlotRead::Busy;
                }
                SlotRead::Occupied {
                    stamp: before,
                    // SAFETY: the stamp was OCCUPIED and unchanged across the
                    // copy, and the key is always written before OCCUPIED is
                    // published.
                    key: unsafe { key.assume_init() },
                    value,
                }
            }
        }
    }

    /// Move the slot from `expected` into TRANSITIONING. On success the caller
    /// owns the slot until it calls [`Slot::publish`] with the returned stamp.
    #[inline]
    pub(crate) fn try_claim(&self, expected: Stamp) -> Option<Stamp> {
        debug_assert!(expected.state() != SlotState::Transitioning);
        let claimed = expected.next(SlotState::Transitioning);
        self.stamp
            .compare_exchange(expected.0, claimed.0, Ordering::Acquire, Ordering::Relaxed)
            .ok()
            .map(|_| {
                // Order our cell writes after the claim for seqlock readers.
                fence(Ordering::Release);
                claimed
            })
    }

    /// Release a claimed slot into `state`.
    #[inline]
    pub(crate) fn publish(&self, claimed: Stamp, state: SlotState) {
        debug_assert!(claimed.state() == SlotState::Transitioning);
        debug_assert!(state != SlotState::Transitioning);
        self.stamp.store(claimed.next(state).0, Ordering::Release);
    }

    /// Read the key of a slot we have claimed out of OCCUPIED.
    ///
    /// # Safety
    /// The caller must hold the slot in TRANSITIONING, claimed from OCCUPIED.
    #[inline]
    pub(crate) unsafe fn owned_key(&self) -> K {
        (*self.key.get()).assume_init()
    }

    /// # Safety
    /// The caller must hold the slot in TRANSITIONING.
    #[inline]
    pub(crate) unsafe fn write_key(&self, key: K) {
        ptr::write_volatile(self.key.get(), MaybeUninit::new(key));
    }

    /// Swap the value pointer of a claimed slot, returning the previous one.
    #[inline]
    pub(crate) fn swap_value<'g>(&self, new: Shared<'g, V>, guard: &'g Guard) -> Shared<'g, V> {
        self.value.swap(new, Ordering::AcqRel, guard)
    }

    /// Mark the slot as recently used.
    #[inline]
    pub(crate) fn touch(&self) {
        self.recency.store(1, Ordering::Relaxed);
    }

    /// Clear the recency mark, returning whether it was set.
    #[inline]
    pub(crate) fn second_chance(&self) -> bool {
        self.recency.swap(0, Ordering::Relaxed) != 0
    }

    #[inline]
    pub(crate) fn forget(&self) {
        self.recency.store(0, Ordering::Relaxed);
    }

    /// Take the value out of the slot during teardown.
    pub(crate) fn take_exclusive(&mut self) -> Option<(K, Box<V>)> {
        // SAFETY: we hold &mut so no guard can observe the slot.
        let guard = unsafe { crossbeam_epoch::unprotected() };
        let value = self.value.swap(Shared::null(), Ordering::Relaxed, guard);
        if value.is_null() {
            return None;
        }
        let stamp = self.stamp.get_mut();
        *stamp = Stamp(*stamp).next(SlotState::Empty).0;
        // SAFETY: a non-null value is only ever present alongside a written
        // key, and nothing else references the allocation.
        unsafe { Some((self.owned_key(), value.into_owned().into_box())) }
    }
}

impl<K, V> Drop for Slot<K, V> {
    fn drop(&mut self) {
        // SAFETY: dropping implies exclusive access.
        let guard = unsafe { crossbeam_epoch::unprotected() };
        let value = self.value.swap(Shared::null(), Ordering::Relaxed, guard);
        if !value.is_null() {
            drop(unsafe { value.into_owned() });
        }
    }
}

/// Hand a value that has been unlinked from its slot back to the caller.
///
/// The table's own allocation is destroyed once every thread that might
/// still be reading it has unpinned, so the caller receives a clone.
///
/// # Safety
/// `old` must be non-null, must have been unlinked from its slot by the
/// calling thread, and must not be retired twice.
pub(crate) unsafe fn retire<V: Clone>(old: Shared<'_, V>, guard: &Guard) -> V {
    debug_assert!(!old.is_null());
    let v = old.deref().clone();
    guard.defer_destroy(old);
    v
}

#[cfg(test)]
mod tests {
    use super::{retire, Slot, SlotRead, SlotState, Stamp};
    use crossbeam_epoch::{self as epoch, Owned};

    #[test]
    fn test_stamp_versions() {
        let s = Stamp::EMPTY;
        assert_eq!(s.state(), SlotState::Empty);
        assert_eq!(s.version(), 0);
        let t = s.next(SlotState::Transitioning);
        assert_eq!(t.state(), SlotState::Transitioning);
        assert_eq!(t.version(), 1);
        let o = t.next(SlotState::Occupied);
        assert_eq!(o.state(), SlotState::Occupied);
        assert_eq!(o.version(), 2);
        // Same tag, different version, never equal.
        assert_ne!(s, o.next(SlotState::Transitioning).next(SlotState::Empty));
    }

    #[test]
    fn test_claim_fill_take() {
        let guard = epoch::pin();
        let slot: Slot<u64, String> = Slot::new();

        let empty = match slot.read(&guard) {
            SlotRead::Empty(s) => s,
            _ => panic!("new slot must be empty"),
        };
        let claimed = slot.try_claim(empty).unwrap();
        // A second claim against the stale stamp must lose.
        assert!(slot.try_claim(empty).is_none());
        assert!(matches!(slot.read(&guard), SlotRead::Busy));

        unsafe { slot.write_key(7) };
        let prev = slot.swap_value(Owned::new("seven".to_string()).into_shared(&guard), &guard);
        assert!(prev.is_null());
        slot.publish(claimed, SlotState::Occupied);

        let stamp = match slot.read(&guard) {
            SlotRead::Occupied { stamp, key, value } => {
                assert_eq!(key, 7);
                assert_eq!(unsafe { value.deref() }, "seven");
                stamp
            }
            _ => panic!("slot must be occupied"),
        };

        let claimed = slot.try_claim(stamp).unwrap();
        let old = slot.swap_value(epoch::Shared::null(), &guard);
        assert_eq!(unsafe { slot.owned_key() }, 7);
        slot.publish(claimed, SlotState::Empty);
        assert_eq!(unsafe { retire(old, &guard) }, "seven");
        assert!(matches!(slot.read(&guard), SlotRead::Empty(_)));
        assert_eq!(slot.stamp().version(), 4);
    }

    #[test]
    fn test_recency() {
        let slot: Slot<u8, u8> = Slot::new();
        assert!(!slot.second_chance());
        slot.touch();
        assert!(slot.second_chance());
        assert!(!slot.second_chance());
        slot.touch();
        slot.forget();
        assert!(!slot.second_chance());
    }
}
