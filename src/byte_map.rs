//! ByteMap: fixed-width byte keys and values with a caller-supplied hash.
//!
//! The run-time sized face of the crate. Widths are fixed at construction
//! and every call checks the slices it is given against them; a mismatch
//! is reported, never stored. Each pair is one block from the map's
//! allocator holding the lengths, the key bytes and the value bytes, so the
//! map never aliases caller buffers.

use crate::alloc::{Global, RawAlloc};
use crate::error::MapError;
use crate::pair::{BytePair, PairBlock};
use crate::raw_table::RawPairTable;
use core::fmt;

/// Hash over a key's bytes. Must be deterministic.
pub type HashFn = fn(&[u8]) -> u64;

pub struct ByteMap<H = HashFn, A: RawAlloc + Clone = Global> {
    key_len: usize,
    val_len: usize,
    hash: H,
    table: RawPairTable<BytePair, A>,
}

impl<H> ByteMap<H, Global>
where
    H: Fn(&[u8]) -> u64,
{
    /// Map on the process allocator.
    pub fn new(key_len: usize, val_len: usize, hash: H) -> Result<Self, MapError> {
        Self::new_in(key_len, val_len, hash, Global)
    }
}

impl<H, A> ByteMap<H, A>
where
    H: Fn(&[u8]) -> u64,
    A: RawAlloc + Clone,
{
    /// Map storing `key_len`-byte keys and `val_len`-byte values in memory
    /// from `alloc`.
    ///
    /// Zero widths are rejected before anything is allocated.
    pub fn new_in(key_len: usize, val_len: usize, hash: H, alloc: A) -> Result<Self, MapError> {
        Self::with_capacity_in(0, key_len, val_len, hash, alloc)
    }

    /// As `new_in`, sized to hold `capacity` pairs before the first growth.
    pub fn with_capacity_in(
        capacity: usize,
        key_len: usize,
        val_len: usize,
        hash: H,
        alloc: A,
    ) -> Result<Self, MapError> {
        if key_len == 0 || val_len == 0 {
            return Err(MapError::ZeroWidth { key_len, val_len });
        }
        let table = RawPairTable::try_with_capacity_in(capacity, alloc)?;
        Ok(Self {
            key_len,
            val_len,
            hash,
            table,
        })
    }

    pub fn key_len(&self) -> usize {
        self.key_len
    }

    pub fn val_len(&self) -> usize {
        self.val_len
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.table.capacity()
    }

    pub fn load_factor(&self) -> f64 {
        self.table.len() as f64 / self.table.capacity() as f64
    }

    pub fn allocator(&self) -> &A {
        self.table.allocator()
    }

    fn check_key(&self, key: &[u8]) -> Result<(), MapError> {
        if key.len() != self.key_len {
            return Err(MapError::KeyLength {
                expected: self.key_len,
                actual: key.len(),
            });
        }
        Ok(())
    }

    fn check_value(&self, value: &[u8]) -> Result<(), MapError> {
        if value.len() != self.val_len {
            return Err(MapError::ValueLength {
                expected: self.val_len,
                actual: value.len(),
            });
        }
        Ok(())
    }

    /// Store a copy of `value` under a copy of `key`.
    ///
    /// An existing key has its value bytes overwritten in place without
    /// allocating. A new key costs one pair block and may grow the table;
    /// if either allocation is refused, the map is unchanged.
    pub fn insert(&mut self, key: &[u8], value: &[u8]) -> Result<(), MapError> {
        self.check_key(key)?;
        self.check_value(value)?;
        let hash = (self.hash)(key);
        if let Some(p) = self.table.get_mut(hash, |p| p.key() == key) {
            p.value_mut().copy_from_slice(value);
            return Ok(());
        }
        let pair = BytePair::try_new_in(hash, key, value, self.table.allocator())?;
        self.table.insert_vacant(pair)?;
        Ok(())
    }

    /// Value bytes stored for `key`, or `None` when absent.
    pub fn lookup(&self, key: &[u8]) -> Result<Option<&[u8]>, MapError> {
        self.check_key(key)?;
        let hash = (self.hash)(key);
        Ok(self.table.get(hash, |p| p.key() == key).map(BytePair::value))
    }

    pub fn lookup_mut(&mut self, key: &[u8]) -> Result<Option<&mut [u8]>, MapError> {
        self.check_key(key)?;
        let hash = (self.hash)(key);
        Ok(self
            .table
            .get_mut(hash, |p| p.key() == key)
            .map(BytePair::value_mut))
    }

    pub fn contains(&self, key: &[u8]) -> Result<bool, MapError> {
        Ok(self.lookup(key)?.is_some())
    }

    /// Remove `key`. Returns whether a pair was removed; an absent key is
    /// not an error.
    pub fn delete(&mut self, key: &[u8]) -> Result<bool, MapError> {
        self.check_key(key)?;
        let hash = (self.hash)(key);
        match self.table.take(hash, |p| p.key() == key) {
            Some(pair) => {
                // SAFETY: every pair in the table came from its allocator.
                unsafe { pair.free(self.table.allocator()) };
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn clear(&mut self) {
        self.table.clear()
    }

    /// `(key, value)` byte slices in unspecified order.
    pub fn iter(&self) -> impl Iterator<Item = (&[u8], &[u8])> + '_ {
        self.table.iter().map(|p| (p.key(), p.value()))
    }

    /// Release every pair, then the table.
    pub fn free(self) {
        drop(self)
    }
}

impl<H, A: RawAlloc + Clone> fmt::Debug for ByteMap<H, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ByteMap")
            .field("key_len", &self.key_len)
            .field("val_len", &self.val_len)
            .field("len", &self.table.len())
            .field("capacity", &self.table.capacity())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alloc::CountingAlloc;

    fn fnv1a(bytes: &[u8]) -> u64 {
        bytes.iter().fold(0xcbf2_9ce4_8422_2325, |h, &b| {
            (h ^ b as u64).wrapping_mul(0x0100_0000_01b3)
        })
    }

    fn int(n: u32) -> [u8; 4] {
        n.to_le_bytes()
    }

    /// key_len = val_len = 4: (1 -> 100), (2 -> 200), (1 -> 150) leaves two
    /// pairs with 1 -> 150.
    #[test]
    fn integer_scenario() {
        let mut m = ByteMap::new(4, 4, fnv1a).unwrap();
        m.insert(&int(1), &int(100)).unwrap();
        m.insert(&int(2), &int(200)).unwrap();
        m.insert(&int(1), &int(150)).unwrap();
        assert_eq!(m.lookup(&int(1)).unwrap(), Some(&int(150)[..]));
        assert_eq!(m.lookup(&int(2)).unwrap(), Some(&int(200)[..]));
        assert_eq!(m.len(), 2);
    }

    /// Overwriting a present key copies into the existing pair block.
    #[test]
    fn overwrite_needs_no_memory() {
        let a = CountingAlloc::new();
        let mut m = ByteMap::new_in(2, 3, fnv1a, &a).unwrap();
        m.insert(b"ab", b"xyz").unwrap();
        let blocks = a.live_blocks();
        a.set_budget(Some(0));
        m.insert(b"ab", b"123").unwrap();
        assert_eq!(m.lookup(b"ab").unwrap(), Some(&b"123"[..]));
        assert_eq!(a.live_blocks(), blocks);
    }

    /// Stored bytes are copies; later edits to the caller's buffers do not
    /// reach the map.
    #[test]
    fn no_aliasing_of_caller_buffers() {
        let mut m = ByteMap::new(1, 2, fnv1a).unwrap();
        let mut key = [7u8];
        let mut val = [1u8, 2];
        m.insert(&key, &val).unwrap();
        key[0] = 8;
        val[0] = 9;
        assert_eq!(m.lookup(&[7]).unwrap(), Some(&[1u8, 2][..]));
        assert_eq!(m.lookup(&key).unwrap(), None);
    }

    #[test]
    fn lookup_mut_edits_value() {
        let mut m = ByteMap::new(1, 1, fnv1a).unwrap();
        m.insert(&[1], &[10]).unwrap();
        m.lookup_mut(&[1]).unwrap().unwrap()[0] += 1;
        assert_eq!(m.lookup(&[1]).unwrap(), Some(&[11u8][..]));
        assert_eq!(m.lookup_mut(&[2]).unwrap(), None);
    }

    /// A new key costs exactly one block holding both key and value.
    #[test]
    fn one_block_per_pair() {
        let a = CountingAlloc::new();
        let mut m = ByteMap::new_in(4, 4, fnv1a, &a).unwrap();
        let table_bytes = a.live_bytes();
        m.insert(&int(1), &int(100)).unwrap();
        assert_eq!(a.live_blocks(), 1 + 1);
        assert!(a.live_bytes() - table_bytes >= 8);
        m.insert(&int(2), &int(200)).unwrap();
        assert_eq!(a.live_blocks(), 1 + 2);
        assert!(m.delete(&int(1)).unwrap());
        assert_eq!(a.live_blocks(), 1 + 1);
    }

    #[test]
    fn debug_shows_shape() {
        let m = ByteMap::new(4, 8, fnv1a).unwrap();
        let s = format!("{:?}", m);
        assert!(s.contains("key_len: 4") && s.contains("val_len: 8"), "{s}");
    }
}
