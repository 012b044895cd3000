//! A bucket: a fixed run of slots selected by a key's hash.
//!
//! Keys never move between buckets and a bucket never chains, so every
//! operation is a linear scan of `bucket_length` slots. Uniqueness of keys is
//! held by the membership sequence `seq`: any attempt that places a new key
//! into the bucket must advance `seq` from the value it observed before its
//! scan. Two racing inserts of the same key therefore can't both land, the
//! loser rolls back its claim and rescans, where it finds the winner's key.

use crossbeam_epoch::{Guard, Shared};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use tracing::trace;

use super::slot::{retire, Slot, SlotRead, SlotState, Stamp};
use crate::backoff::Attempt;

/// The result of [`Bucket::find_or_claim`].
pub(crate) enum Claim {
    /// The key is present and validated at `stamp`.
    Found { index: usize, stamp: Stamp },
    /// An empty slot was reserved for the key. It must be filled and
    /// published by the caller.
    Claimed { index: usize, stamp: Stamp },
    /// No slot matches or is free. `seq` is the membership sequence the scan
    /// ran under.
    Full { seq: u64 },
}

/// What an upsert did to the bucket.
pub(crate) enum Upsert<K, V> {
    Inserted,
    Replaced(V),
    Evicted(K, V),
    Full,
}

pub(crate) struct Bucket<K, V> {
    seq: AtomicU64,
    hand: AtomicUsize,
    slots: Box<[Slot<K, V>]>,
}

impl<K, V> Bucket<K, V>
where
    K: Copy + Eq + std::fmt::Debug,
    V: Clone,
{
    pub(crate) fn new(length: usize) -> Self {
        Bucket {
            seq: AtomicU64::new(0),
            hand: AtomicUsize::new(0),
            slots: (0..length).map(|_| Slot::new()).collect(),
        }
    }

    #[inline]
    fn advance_seq(&self, seq: u64) -> bool {
        self.seq
            .compare_exchange(seq, seq.wrapping_add(1), Ordering::AcqRel, Ordering::Relaxed)
            .is_ok()
    }

    /// Find a validated slot holding `key`. A scan that misses while some
    /// slot is mid transition must retry, as that slot may be about to hold
    /// (or still hold) the key.
    pub(crate) fn lookup<'g>(
        &self,
        key: &K,
        touch: bool,
        guard: &'g Guard,
    ) -> Attempt<Option<Shared<'g, V>>> {
        let mut busy = false;
        for slot in self.slots.iter() {
            match slot.read(guard) {
                SlotRead::Occupied { key: k, value, .. } if k == *key => {
                    if touch {
                        slot.touch();
                    }
                    return Attempt::Done(Some(value));
                }
                SlotRead::Busy => busy = true,
                _ => {}
            }
        }
        if busy {
            Attempt::Retry
        } else {
            Attempt::Done(None)
        }
    }

    /// Scan the bucket for `key`, reserving the first empty slot if the key
    /// is absent.
    pub(crate) fn find_or_claim(&self, key: &K, guard: &Guard) -> Attempt<Claim> {
        let seq = self.seq.load(Ordering::Acquire);
        let mut vacant = None;
        let mut busy = false;

        for (index, slot) in self.slots.iter().enumerate() {
            match slot.read(guard) {
                SlotRead::Occupied { stamp, key: k, .. } if k == *key => {
                    return Attempt::Done(Claim::Found { index, stamp });
                }
                SlotRead::Occupied { .. } => {}
                SlotRead::Empty(stamp) => {
                    if vacant.is_none() {
                        vacant = Some((index, stamp));
                    }
                }
                SlotRead::Busy => busy = true,
            }
        }

        // A busy slot may be someone else's half finished insert of this key.
        if busy {
            return Attempt::Retry;
        }

        let Some((index, stamp)) = vacant else {
            return Attempt::Done(Claim::Full { seq });
        };

        let slot = &self.slots[index];
        let Some(claimed) = slot.try_claim(stamp) else {
            return Attempt::Retry;
        };
        if !self.advance_seq(seq) {
            slot.publish(claimed, SlotState::Empty);
            trace!(index, "claim rolled back, bucket membership changed");
            return Attempt::Retry;
        }
        Attempt::Done(Claim::Claimed {
            index,
            stamp: claimed,
        })
    }

    /// Fill and publish a slot reserved by [`Bucket::find_or_claim`].
    fn fill(&self, index: usize, claimed: Stamp, key: K, value: Shared<'_, V>, guard: &Guard) {
        let slot = &self.slots[index];
        // SAFETY: we hold the slot in TRANSITIONING.
        unsafe { slot.write_key(key) };
        let prev = slot.swap_value(value, guard);
        debug_assert!(prev.is_null());
        slot.touch();
        slot.publish(claimed, SlotState::Occupied);
    }

    /// Swap the value of the slot at `index`, if it is still at `stamp`.
    fn replace(&self, index: usize, stamp: Stamp, value: Shared<'_, V>, guard: &Guard) -> Attempt<V> {
        let slot = &self.slots[index];
        let Some(claimed) = slot.try_claim(stamp) else {
            return Attempt::Retry;
        };
        let old = slot.swap_value(value, guard);
        slot.touch();
        slot.publish(claimed, SlotState::Occupied);
        // SAFETY: the slot was OCCUPIED so `old` is non-null, and we unlinked it.
        Attempt::Done(unsafe { retire(old, guard) })
    }

    /// Insert or replace `key`. With `evict` set a full bucket gives up its
    /// clock victim's slot to the new key rather than reporting `Full`.
    ///
    /// `value` is only linked into the bucket when the attempt is done with
    /// something other than `Full`.
    pub(crate) fn upsert<'g>(
        &self,
        key: K,
        value: Shared<'g, V>,
        evict: bool,
        guard: &'g Guard,
    ) -> Attempt<Upsert<K, V>> {
        match self.find_or_claim(&key, guard) {
            Attempt::Retry => Attempt::Retry,
            Attempt::Done(Claim::Found { index, stamp }) => {
                self.replace(index, stamp, value, guard).map(Upsert::Replaced)
            }
            Attempt::Done(Claim::Claimed { index, stamp }) => {
                self.fill(index, stamp, key, value, guard);
                Attempt::Done(Upsert::Inserted)
            }
            Attempt::Done(Claim::Full { seq }) if evict => self.evict_into(seq, key, value, guard),
            Attempt::Done(Claim::Full { .. }) => Attempt::Done(Upsert::Full),
        }
    }

    /// Second chance clock sweep. Starting at the hand, a slot with a set
    /// recency mark has it cleared and is passed over, the first unmarked
    /// occupied slot is the victim. Two passes are always enough unless
    /// other threads keep marking slots behind the hand.
    fn select_victim(&self, guard: &Guard) -> Option<(usize, Stamp)> {
        let len = self.slots.len();
        let start = self.hand.load(Ordering::Relaxed) % len;
        for step in 0..(2 * len) {
            let index = (start + step) % len;
            let slot = &self.slots[index];
            if let SlotRead::Occupied { stamp, .. } = slot.read(guard) {
                if !slot.second_chance() {
                    self.hand.store((index + 1) % len, Ordering::Relaxed);
                    return Some((index, stamp));
                }
            }
        }
        None
    }

    /// Evict the clock victim and hand its slot straight to `key`.
    ///
    /// The victim is claimed before `seq` is advanced, so if membership
    /// changed since the `Full` scan the victim is restored untouched and the
    /// whole upsert is retried.
    fn evict_into(&self, seq: u64, key: K, value: Shared<'_, V>, guard: &Guard) -> Attempt<Upsert<K, V>> {
        let Some((index, stamp)) = self.select_victim(guard) else {
            return Attempt::Retry;
        };
        let slot = &self.slots[index];
        let Some(claimed) = slot.try_claim(stamp) else {
            return Attempt::Retry;
        };
        if !self.advance_seq(seq) {
            slot.publish(claimed, SlotState::Occupied);
            return Attempt::Retry;
        }

        // SAFETY: the slot was claimed out of OCCUPIED by us.
        let old_key = unsafe { slot.owned_key() };
        let old = slot.swap_value(value, guard);
        // SAFETY: still held in TRANSITIONING.
        unsafe { slot.write_key(key) };
        slot.touch();
        slot.publish(claimed, SlotState::Occupied);
        trace!(index, ?old_key, ?key, "evicted for insert");

        // SAFETY: the slot was OCCUPIED so `old` is non-null, and we unlinked it.
        Attempt::Done(Upsert::Evicted(old_key, unsafe { retire(old, guard) }))
    }

    /// Remove `key`, returning its value.
    pub(crate) fn remove(&self, key: &K, guard: &Guard) -> Attempt<Option<V>> {
        let mut busy = false;
        for slot in self.slots.iter() {
            match slot.read(guard) {
                SlotRead::Occupied { stamp, key: k, .. } if k == *key => {
                    return self.unlink(slot, stamp, guard).map(|(_, v)| Some(v));
                }
                SlotRead::Busy => busy = true,
                _ => {}
            }
        }
        if busy {
            Attempt::Retry
        } else {
            Attempt::Done(None)
        }
    }

    /// Evict the clock victim without replacing it.
    pub(crate) fn evict_one(&self, guard: &Guard) -> Attempt<Option<(K, V)>> {
        let Some((index, stamp)) = self.select_victim(guard) else {
            return Attempt::Done(None);
        };
        let r = self.unlink(&self.slots[index], stamp, guard);
        if let Attempt::Done((k, _)) = &r {
            trace!(index, ?k, "evicted");
        }
        r.map(Some)
    }

    fn unlink(&self, slot: &Slot<K, V>, stamp: Stamp, guard: &Guard) -> Attempt<(K, V)> {
        let Some(claimed) = slot.try_claim(stamp) else {
            return Attempt::Retry;
        };
        // SAFETY: the slot was claimed out of OCCUPIED by us.
        let key = unsafe { slot.owned_key() };
        let old = slot.swap_value(Shared::null(), guard);
        slot.forget();
        slot.publish(claimed, SlotState::Empty);
        // SAFETY: the slot was OCCUPIED so `old` is non-null, and we unlinked it.
        Attempt::Done((key, unsafe { retire(old, guard) }))
    }

    /// Call `f` on each validated entry. Slots that are mid transition are
    /// skipped.
    pub(crate) fn for_each<F>(&self, guard: &Guard, f: &mut F)
    where
        F: FnMut(&K, &V),
    {
        for slot in self.slots.iter() {
            if let SlotRead::Occupied { key, value, .. } = slot.read(guard) {
                // SAFETY: validated OCCUPIED values are non-null and kept
                // alive by the guard.
                if let Some(v) = unsafe { value.as_ref() } {
                    f(&key, v);
                }
            }
        }
    }

    /// The number of slots currently OCCUPIED.
    pub(crate) fn occupied(&self) -> usize {
        self.slots
            .iter()
            .filter(|s| s.stamp().state() == SlotState::Occupied)
            .count()
    }

    pub(crate) fn drain_exclusive(&mut self, into: &mut Vec<(K, V)>) {
        for slot in self.slots.iter_mut() {
            if let Some((k, v)) = slot.take_exclusive() {
                into.push((k, *v));
            }
        }
    }
}
