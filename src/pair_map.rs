//! PairMap: typed hash map over a pluggable allocator.

use crate::alloc::{AllocError, Global, RawAlloc};
use crate::pair::{Pair, PairPtr};
use crate::raw_table::{RawIter, RawIterMut, RawPairTable};
use core::alloc::Layout;
use core::borrow::Borrow;
use core::fmt;
use core::hash::{BuildHasher, Hash};
use std::collections::hash_map::RandomState;

/// Hash map storing each key/value pair in its own block from `A`.
///
/// Lookups may use any borrowed form `Q` of the key, as with
/// `std::collections::HashMap`. Iteration order is unspecified.
pub struct PairMap<K, V, S = RandomState, A: RawAlloc + Clone = Global> {
    hasher: S,
    table: RawPairTable<PairPtr<K, V>, A>,
}

impl<K, V> PairMap<K, V>
where
    K: Eq + Hash,
{
    pub fn new() -> Self {
        Self::with_hasher(Default::default())
    }

    pub fn with_capacity(capacity: usize) -> Self {
        or_alloc_failure(Self::try_with_capacity_and_hasher_in(
            capacity,
            Default::default(),
            Global,
        ))
    }
}

impl<K, V> Default for PairMap<K, V>
where
    K: Eq + Hash,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V, S> PairMap<K, V, S>
where
    K: Eq + Hash,
    S: BuildHasher,
{
    /// Map on the process allocator. Allocation failure is handled like
    /// it is for `std` collections.
    pub fn with_hasher(hasher: S) -> Self {
        or_alloc_failure(Self::try_with_hasher_in(hasher, Global))
    }
}

impl<K, V, S, A> PairMap<K, V, S, A>
where
    K: Eq + Hash,
    S: BuildHasher,
    A: RawAlloc + Clone,
{
    /// Map whose table and pairs come from `alloc`.
    pub fn try_with_hasher_in(hasher: S, alloc: A) -> Result<Self, AllocError> {
        Self::try_with_capacity_and_hasher_in(0, hasher, alloc)
    }

    /// Map that holds at least `capacity` pairs before its first growth.
    pub fn try_with_capacity_and_hasher_in(
        capacity: usize,
        hasher: S,
        alloc: A,
    ) -> Result<Self, AllocError> {
        Ok(Self {
            hasher,
            table: RawPairTable::try_with_capacity_in(capacity, alloc)?,
        })
    }

    fn make_hash<Q>(&self, q: &Q) -> u64
    where
        Q: ?Sized + Hash,
    {
        self.hasher.hash_one(q)
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }
    pub fn is_empty(&self) -> bool {
        self.table.len() == 0
    }

    /// Number of slots in the table.
    pub fn capacity(&self) -> usize {
        self.table.capacity()
    }

    /// Live pairs per slot.
    pub fn load_factor(&self) -> f64 {
        self.table.len() as f64 / self.table.capacity() as f64
    }

    pub fn hasher(&self) -> &S {
        &self.hasher
    }

    pub fn allocator(&self) -> &A {
        self.table.allocator()
    }

    pub fn get<Q>(&self, q: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        self.get_key_value(q).map(|(_, v)| v)
    }

    pub fn get_key_value<Q>(&self, q: &Q) -> Option<(&K, &V)>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        let hash = self.make_hash(q);
        self.table
            .get(hash, |p| q == p.get().key.borrow())
            .map(|p| {
                let pair = p.get();
                (&pair.key, &pair.value)
            })
    }

    pub fn get_mut<Q>(&mut self, q: &Q) -> Option<&mut V>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        let hash = self.make_hash(q);
        self.table
            .get_mut(hash, |p| q == p.get().key.borrow())
            .map(|p| &mut p.get_mut().value)
    }

    pub fn contains_key<Q>(&self, q: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        self.get_key_value(q).is_some()
    }

    /// Insert `key -> value`.
    ///
    /// For a key already present the stored key is kept, the value is
    /// replaced in place and the previous value returned; nothing is
    /// allocated. Otherwise a new pair block is allocated, growing the table
    /// first if the load factor would pass 3/4. If the allocator refuses,
    /// the map is left exactly as it was.
    pub fn insert(&mut self, key: K, value: V) -> Result<Option<V>, AllocError> {
        let hash = self.make_hash(&key);
        if let Some(p) = self.table.get_mut(hash, |p| p.get().key == key) {
            return Ok(Some(core::mem::replace(&mut p.get_mut().value, value)));
        }
        let pair = PairPtr::try_new_in(Pair { hash, key, value }, self.table.allocator())?;
        self.table.insert_vacant(pair)?;
        Ok(None)
    }

    pub fn remove<Q>(&mut self, q: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        self.remove_entry(q).map(|(_, v)| v)
    }

    /// Remove the pair for `q` and return its key and value. The table never
    /// shrinks.
    pub fn remove_entry<Q>(&mut self, q: &Q) -> Option<(K, V)>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        let hash = self.make_hash(q);
        let pair = self.table.take(hash, |p| q == p.get().key.borrow())?;
        // The table is consistent again; user Drop code may run from here on.
        // SAFETY: every pair in the table came from its allocator.
        let Pair { key, value, .. } = unsafe { pair.release(self.table.allocator()) };
        Some((key, value))
    }

    /// Grow ahead of time so `additional` more pairs fit without growth.
    pub fn try_reserve(&mut self, additional: usize) -> Result<(), AllocError> {
        self.table.try_reserve(additional)
    }

    pub fn clear(&mut self) {
        self.table.clear()
    }

    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter {
            inner: self.table.iter(),
        }
    }

    pub fn iter_mut(&mut self) -> IterMut<'_, K, V> {
        IterMut {
            inner: self.table.iter_mut(),
        }
    }

    pub fn keys(&self) -> impl Iterator<Item = &K> + '_ {
        self.iter().map(|(k, _)| k)
    }

    pub fn values(&self) -> impl Iterator<Item = &V> + '_ {
        self.iter().map(|(_, v)| v)
    }

    /// Release every pair and the table. Dropping the map does the same.
    pub fn free(self) {
        drop(self)
    }
}

impl<K, V, S, A> fmt::Debug for PairMap<K, V, S, A>
where
    K: fmt::Debug,
    V: fmt::Debug,
    A: RawAlloc + Clone,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let pairs = Iter {
            inner: self.table.iter(),
        };
        f.debug_map().entries(pairs).finish()
    }
}

/// Iterator over `(&K, &V)` in slot order.
pub struct Iter<'a, K, V> {
    inner: RawIter<'a, PairPtr<K, V>>,
}

impl<'a, K, V> Iterator for Iter<'a, K, V> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        let pair = self.inner.next()?.get();
        Some((&pair.key, &pair.value))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<K, V> ExactSizeIterator for Iter<'_, K, V> {}

/// Iterator over `(&K, &mut V)` in slot order.
pub struct IterMut<'a, K, V> {
    inner: RawIterMut<'a, PairPtr<K, V>>,
}

impl<'a, K, V> Iterator for IterMut<'a, K, V> {
    type Item = (&'a K, &'a mut V);

    fn next(&mut self) -> Option<Self::Item> {
        let pair = self.inner.next()?.get_mut();
        Some((&pair.key, &mut pair.value))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<K, V> ExactSizeIterator for IterMut<'_, K, V> {}

impl<'a, K, V, S, A> IntoIterator for &'a PairMap<K, V, S, A>
where
    K: Eq + Hash,
    S: BuildHasher,
    A: RawAlloc + Clone,
{
    type Item = (&'a K, &'a V);
    type IntoIter = Iter<'a, K, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

// Process-allocator constructors behave like `std` collections on failure.
fn or_alloc_failure<T>(r: Result<T, AllocError>) -> T {
    match r {
        Ok(v) => v,
        Err(AllocError::Exhausted { size, align }) => match Layout::from_size_align(size, align) {
            Ok(layout) => std::alloc::handle_alloc_error(layout),
            Err(_) => panic!("pair table allocation failed"),
        },
        Err(AllocError::CapacityOverflow) => panic!("capacity overflow"),
    }
}
