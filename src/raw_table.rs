//! RawPairTable: the open-addressing core shared by `PairMap` and `ByteMap`.
//!
//! Layout and rules:
//! - `slots.len()` is the capacity, always a power of two and at least
//!   `MIN_CAPACITY`. A pair's home slot is its hash reduced modulo the
//!   capacity (a mask, since the capacity is a power of two).
//! - Collisions are resolved by linear probing: home, home + 1, ... with
//!   wrap-around. At least one slot is always empty, so every probe ends.
//! - Removal back-shifts the rest of the cluster into the hole; there are
//!   no tombstones, and a probe stops at the first empty slot.
//! - A new pair that would push the load factor over 3/4 first doubles the
//!   table. The new slot array is allocated before anything moves, so a
//!   refused allocation leaves the table exactly as it was.
//! - Callers pass precomputed hashes and an equality predicate; the table
//!   never looks inside a pair block beyond its stored hash.

use crate::alloc::{AllocError, RawAlloc};
use crate::alloc_vec::AllocVec;
use crate::pair::PairBlock;
use crate::reentrancy::DebugReentrancy;

/// Slot count of a fresh table.
pub(crate) const MIN_CAPACITY: usize = 16;
const MAX_LOAD_NUM: usize = 3;
const MAX_LOAD_DEN: usize = 4;
const GROWTH_FACTOR: usize = 2;

pub(crate) struct RawPairTable<P: PairBlock, A: RawAlloc + Clone> {
    slots: AllocVec<Option<P>, A>,
    len: usize,
    reentrancy: DebugReentrancy,
}

impl<P: PairBlock, A: RawAlloc + Clone> RawPairTable<P, A> {
    /// Table able to hold `pairs` entries before its first growth.
    pub(crate) fn try_with_capacity_in(pairs: usize, alloc: A) -> Result<Self, AllocError> {
        let slots = AllocVec::try_from_fn_in(slots_for(pairs)?, |_| None, alloc)?;
        Ok(Self {
            slots,
            len: 0,
            reentrancy: DebugReentrancy::new(),
        })
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub(crate) fn capacity(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    pub(crate) fn allocator(&self) -> &A {
        self.slots.allocator()
    }

    // Ok(slot holding a match) or Err(first empty slot on the probe path).
    // `eq` only sees pairs whose stored hash equals `hash`.
    fn probe(&self, hash: u64, mut eq: impl FnMut(&P) -> bool) -> Result<usize, usize> {
        let mask = self.slots.len() - 1;
        let mut i = (hash as usize) & mask;
        loop {
            match &self.slots[i] {
                None => return Err(i),
                Some(p) if p.hash() == hash && eq(p) => return Ok(i),
                Some(_) => {}
            }
            i = (i + 1) & mask;
        }
    }

    pub(crate) fn get(&self, hash: u64, eq: impl FnMut(&P) -> bool) -> Option<&P> {
        let _g = self.reentrancy.enter("get");
        let i = self.probe(hash, eq).ok()?;
        self.slots[i].as_ref()
    }

    pub(crate) fn get_mut(&mut self, hash: u64, eq: impl FnMut(&P) -> bool) -> Option<&mut P> {
        let i = {
            let _g = self.reentrancy.enter("get_mut");
            self.probe(hash, eq).ok()?
        };
        self.slots[i].as_mut()
    }

    /// Place a freshly built pair whose key is not in the table, growing
    /// first when needed. If growth is refused the pair is freed and the
    /// table is unchanged.
    pub(crate) fn insert_vacant(&mut self, pair: P) -> Result<(), AllocError> {
        let g = self.reentrancy.enter("insert");
        if self.needs_growth() {
            if let Err(e) = Self::grow(&mut self.slots, self.len) {
                drop(g);
                // SAFETY: callers build pairs with this table's allocator.
                unsafe { pair.free(self.allocator()) };
                return Err(e);
            }
        }
        let i = vacant_slot(&self.slots, pair.hash());
        self.slots[i] = Some(pair);
        self.len += 1;
        Ok(())
    }

    /// Unlink the matching pair and hand its block to the caller.
    pub(crate) fn take(&mut self, hash: u64, eq: impl FnMut(&P) -> bool) -> Option<P> {
        let _g = self.reentrancy.enter("remove");
        let i = self.probe(hash, eq).ok()?;
        let pair = self.slots[i].take()?;
        self.len -= 1;
        Self::backshift(&mut self.slots, i);
        Some(pair)
    }

    /// Free every pair; the slot array keeps its capacity.
    pub(crate) fn clear(&mut self) {
        let _g = self.reentrancy.enter("clear");
        for i in 0..self.slots.len() {
            if let Some(p) = self.slots[i].take() {
                self.len -= 1;
                // SAFETY: every pair in the table came from this allocator.
                unsafe { p.free(self.slots.allocator()) };
            }
        }
        debug_assert_eq!(self.len, 0);
    }

    /// Make room for `additional` more pairs without further growth.
    pub(crate) fn try_reserve(&mut self, additional: usize) -> Result<(), AllocError> {
        let _g = self.reentrancy.enter("try_reserve");
        let wanted = self
            .len
            .checked_add(additional)
            .ok_or(AllocError::CapacityOverflow)?;
        let slots = slots_for(wanted)?;
        if slots > self.slots.len() {
            Self::resize(&mut self.slots, self.len, slots)?;
        }
        Ok(())
    }

    pub(crate) fn iter(&self) -> RawIter<'_, P> {
        RawIter {
            slots: self.slots.iter(),
            remaining: self.len,
        }
    }

    pub(crate) fn iter_mut(&mut self) -> RawIterMut<'_, P> {
        RawIterMut {
            remaining: self.len,
            slots: self.slots.iter_mut(),
        }
    }

    fn needs_growth(&self) -> bool {
        (self.len + 1) * MAX_LOAD_DEN > self.slots.len() * MAX_LOAD_NUM
    }

    // The slot array is passed explicitly so callers can hold the
    // reentrancy guard across the call.
    fn grow(slots: &mut AllocVec<Option<P>, A>, len: usize) -> Result<(), AllocError> {
        let new_cap = slots
            .len()
            .checked_mul(GROWTH_FACTOR)
            .ok_or(AllocError::CapacityOverflow)?;
        Self::resize(slots, len, new_cap)
    }

    // Move every pair block into a fresh slot array of `new_cap` slots,
    // placing each by its stored hash.
    fn resize(
        slots: &mut AllocVec<Option<P>, A>,
        len: usize,
        new_cap: usize,
    ) -> Result<(), AllocError> {
        debug_assert!(new_cap.is_power_of_two() && new_cap > len);
        let old_cap = slots.len();
        let mut fresh = match AllocVec::try_from_fn_in(new_cap, |_| None, slots.allocator().clone()) {
            Ok(v) => v,
            Err(e) => {
                tracing::debug!(
                    capacity = old_cap,
                    requested = new_cap,
                    error = %e,
                    "pair table growth refused; table left unchanged"
                );
                return Err(e);
            }
        };
        for slot in slots.iter_mut() {
            if let Some(p) = slot.take() {
                let i = vacant_slot(&fresh, p.hash());
                fresh[i] = Some(p);
            }
        }
        // The old array is all empty slots now; dropping it frees only its block.
        *slots = fresh;
        tracing::trace!(
            old_capacity = old_cap,
            new_capacity = new_cap,
            pairs = len,
            "pair table resized"
        );
        Ok(())
    }

    // Close the hole at `hole` by pulling back cluster members whose home
    // lies cyclically at or before it.
    fn backshift(slots: &mut [Option<P>], mut hole: usize) {
        let mask = slots.len() - 1;
        let mut j = (hole + 1) & mask;
        loop {
            let home = match &slots[j] {
                None => break,
                Some(p) => (p.hash() as usize) & mask,
            };
            let dist_home = j.wrapping_sub(home) & mask;
            let dist_hole = j.wrapping_sub(hole) & mask;
            if dist_home >= dist_hole {
                slots.swap(hole, j);
                hole = j;
            }
            j = (j + 1) & mask;
        }
    }

    #[cfg(test)]
    pub(crate) fn slot_of(&self, hash: u64, eq: impl FnMut(&P) -> bool) -> Option<usize> {
        self.probe(hash, eq).ok()
    }
}

impl<P: PairBlock, A: RawAlloc + Clone> Drop for RawPairTable<P, A> {
    fn drop(&mut self) {
        self.clear();
    }
}

// Slot count holding `pairs` entries under the load limit.
fn slots_for(pairs: usize) -> Result<usize, AllocError> {
    let min_slots = pairs
        .checked_mul(MAX_LOAD_DEN)
        .map(|n| n / MAX_LOAD_NUM + 1)
        .ok_or(AllocError::CapacityOverflow)?;
    min_slots
        .max(MIN_CAPACITY)
        .checked_next_power_of_two()
        .ok_or(AllocError::CapacityOverflow)
}

// First empty slot on `hash`'s probe path; the slice is never full.
fn vacant_slot<P>(slots: &[Option<P>], hash: u64) -> usize {
    let mask = slots.len() - 1;
    let mut i = (hash as usize) & mask;
    while slots[i].is_some() {
        i = (i + 1) & mask;
    }
    i
}

/// Occupied slots in slot order.
pub(crate) struct RawIter<'a, P> {
    slots: core::slice::Iter<'a, Option<P>>,
    remaining: usize,
}

impl<'a, P> Iterator for RawIter<'a, P> {
    type Item = &'a P;

    fn next(&mut self) -> Option<&'a P> {
        let p = self.slots.by_ref().find_map(Option::as_ref)?;
        self.remaining -= 1;
        Some(p)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<P> ExactSizeIterator for RawIter<'_, P> {}

pub(crate) struct RawIterMut<'a, P> {
    slots: core::slice::IterMut<'a, Option<P>>,
    remaining: usize,
}

impl<'a, P> Iterator for RawIterMut<'a, P> {
    type Item = &'a mut P;

    fn next(&mut self) -> Option<&'a mut P> {
        let p = self.slots.by_ref().find_map(Option::as_mut)?;
        self.remaining -= 1;
        Some(p)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<P> ExactSizeIterator for RawIterMut<'_, P> {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alloc::{CountingAlloc, Global};
    use crate::pair::{BytePair, Pair, PairPtr};

    type Table<A> = RawPairTable<PairPtr<u32, u32>, A>;

    fn table(a: &CountingAlloc) -> Table<&CountingAlloc> {
        RawPairTable::try_with_capacity_in(0, a).unwrap()
    }

    fn put<A: RawAlloc + Clone>(t: &mut Table<A>, hash: u64, key: u32, value: u32) -> Result<(), AllocError> {
        let p = PairPtr::try_new_in(Pair { hash, key, value }, t.allocator())?;
        t.insert_vacant(p)
    }

    fn value<A: RawAlloc + Clone>(t: &Table<A>, hash: u64, key: u32) -> Option<u32> {
        t.get(hash, |p| p.get().key == key).map(|p| p.get().value)
    }

    fn slot<A: RawAlloc + Clone>(t: &Table<A>, hash: u64, key: u32) -> Option<usize> {
        t.slot_of(hash, |p| p.get().key == key)
    }

    fn remove<A: RawAlloc + Clone>(t: &mut Table<A>, hash: u64, key: u32) -> Option<(u32, u32)> {
        let p = t.take(hash, |p| p.get().key == key)?;
        let Pair { key, value, .. } = unsafe { p.release(t.allocator()) };
        Some((key, value))
    }

    /// Capacity hints round up to a power of two that keeps the hinted
    /// number of pairs under the load limit.
    #[test]
    fn capacity_hint_rounding() {
        assert_eq!(slots_for(0).unwrap(), 16);
        assert_eq!(slots_for(12).unwrap(), 32);
        assert_eq!(slots_for(11).unwrap(), 16);
        assert_eq!(slots_for(100).unwrap(), 256);
        assert!(slots_for(usize::MAX).is_err());
    }

    /// Twelve pairs fit in sixteen slots; the thirteenth doubles the table.
    #[test]
    fn grows_past_three_quarters() {
        let a = CountingAlloc::new();
        let mut t = table(&a);
        for k in 0..12u32 {
            put(&mut t, k as u64, k, k).unwrap();
        }
        assert_eq!(t.capacity(), 16);
        put(&mut t, 12, 12, 12).unwrap();
        assert_eq!(t.capacity(), 32);
        for k in 0..13u32 {
            assert_eq!(value(&t, k as u64, k), Some(k));
        }
        // One slot array plus one block per pair.
        assert_eq!(a.live_blocks(), 13 + 1);
    }

    /// Keys sharing a home slot form one cluster; removing from its middle
    /// back-shifts the tail so every survivor stays reachable.
    #[test]
    fn backshift_keeps_cluster_reachable() {
        let a = CountingAlloc::new();
        let mut t = table(&a);
        // 3, 19 and 35 all reduce to slot 3; 4 has its own home inside the cluster.
        for k in [3u32, 19, 4, 35] {
            put(&mut t, k as u64, k, k * 10).unwrap();
        }
        assert_eq!(slot(&t, 3, 3), Some(3));
        assert_eq!(slot(&t, 19, 19), Some(4));
        assert_eq!(slot(&t, 4, 4), Some(5));
        assert_eq!(slot(&t, 35, 35), Some(6));

        assert_eq!(remove(&mut t, 19, 19), Some((19, 190)));
        // 4 moves home, 35 moves next to 3.
        assert_eq!(slot(&t, 4, 4), Some(4));
        assert_eq!(slot(&t, 35, 35), Some(5));
        for k in [3u32, 4, 35] {
            assert_eq!(value(&t, k as u64, k), Some(k * 10));
        }
        assert_eq!(value(&t, 19, 19), None);
        assert_eq!(t.len(), 3);
    }

    /// A cluster that wraps past the last slot is probed and shifted with
    /// wrap-around.
    #[test]
    fn cluster_wraps_around_the_end() {
        let a = CountingAlloc::new();
        let mut t = table(&a);
        for k in [15u32, 31, 47] {
            put(&mut t, 15, k, k).unwrap();
        }
        assert_eq!(slot(&t, 15, 31), Some(0));
        assert_eq!(slot(&t, 15, 47), Some(1));
        assert_eq!(remove(&mut t, 15, 15), Some((15, 15)));
        assert_eq!(slot(&t, 15, 31), Some(15));
        assert_eq!(slot(&t, 15, 47), Some(0));
    }

    /// The predicate only runs for pairs whose stored hash matches.
    #[test]
    fn predicate_skips_other_hashes() {
        let a = CountingAlloc::new();
        let mut t = table(&a);
        put(&mut t, 5, 1, 10).unwrap();
        put(&mut t, 21, 2, 20).unwrap();
        let mut calls = 0;
        let hit = t.get(21, |p| {
            calls += 1;
            p.get().key == 2
        });
        assert_eq!(hit.map(|p| p.get().value), Some(20));
        assert_eq!(calls, 1);
    }

    /// A refused growth frees the already-built pair and changes nothing.
    #[test]
    fn refused_growth_is_atomic() {
        let a = CountingAlloc::new();
        let mut t = table(&a);
        for k in 0..12u32 {
            put(&mut t, k as u64, k, k + 1).unwrap();
        }
        let blocks = a.live_blocks();

        // The pair block is granted, the bigger slot array is not.
        a.set_budget(Some(1));
        assert!(put(&mut t, 99, 99, 0).is_err());
        assert_eq!(a.live_blocks(), blocks);
        assert_eq!(t.len(), 12);
        assert_eq!(t.capacity(), 16);
        for k in 0..12u32 {
            assert_eq!(value(&t, k as u64, k), Some(k + 1));
        }

        a.set_budget(None);
        assert_eq!(put(&mut t, 99, 99, 0), Ok(()));
        assert_eq!(t.capacity(), 32);
    }

    /// `get_mut` edits a pair in place without allocating.
    #[test]
    fn get_mut_edits_in_place() {
        let a = CountingAlloc::new();
        let mut t = table(&a);
        put(&mut t, 1, 1, 100).unwrap();
        a.set_budget(Some(0));
        t.get_mut(1, |p| p.get().key == 1).unwrap().get_mut().value = 150;
        assert_eq!(value(&t, 1, 1), Some(150));
        assert!(t.get_mut(1, |p| p.get().key == 2).is_none());
    }

    /// Dropping the table returns every block.
    #[test]
    fn drop_frees_everything() {
        let a = CountingAlloc::new();
        {
            let mut t = table(&a);
            for k in 0..100u32 {
                put(&mut t, k as u64 * 7, k, k).unwrap();
            }
            remove(&mut t, 7, 1);
        }
        assert_eq!(a.live_blocks(), 0);
    }

    /// Byte pairs go through the same table and come back by key bytes.
    #[test]
    fn holds_byte_pairs() {
        let a = CountingAlloc::new();
        {
            let mut t: RawPairTable<BytePair, &CountingAlloc> =
                RawPairTable::try_with_capacity_in(0, &a).unwrap();
            for k in 0..20u8 {
                let p = BytePair::try_new_in(k as u64 % 3, &[k], &[k, k], t.allocator()).unwrap();
                t.insert_vacant(p).unwrap();
            }
            assert_eq!(a.live_blocks(), 20 + 1);
            let p = t.get(1, |p| p.key() == [7]).unwrap();
            assert_eq!(p.value(), [7, 7]);
            let p = t.take(2, |p| p.key() == [5]).unwrap();
            unsafe { p.free(t.allocator()) };
            assert!(t.get(2, |p| p.key() == [5]).is_none());
            assert_eq!(a.live_blocks(), 19 + 1);
        }
        assert_eq!(a.live_blocks(), 0);
    }

    #[test]
    fn reserve_then_insert_without_growth() {
        let mut t: Table<Global> = RawPairTable::try_with_capacity_in(0, Global).unwrap();
        t.try_reserve(100).unwrap();
        let cap = t.capacity();
        for k in 0..100u32 {
            put(&mut t, k as u64, k, 0).unwrap();
        }
        assert_eq!(t.capacity(), cap);
        assert_eq!(t.iter().len(), 100);
        for p in t.iter_mut() {
            let pair = p.get_mut();
            pair.value = pair.key + 1;
        }
        assert_eq!(t.iter().map(|p| p.get().value).sum::<u32>(), (1..=100).sum());
    }
}
