#![cfg(test)]

// Property tests for PairMap and ByteMap kept inside the crate, next to the
// raw table they both sit on.

use crate::alloc::CountingAlloc;
use crate::byte_map::ByteMap;
use crate::error::MapError;
use crate::pair_map::PairMap;
use hashbrown::HashMap;
use proptest::prelude::*;
use std::collections::hash_map::RandomState;
use std::collections::BTreeMap;
use std::fmt;
use std::hash::{BuildHasher, Hasher};

// Key newtype with Borrow<str> to exercise borrowed lookup.
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
struct Key(String);
impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}
impl std::borrow::Borrow<str> for Key {
    fn borrow(&self) -> &str {
        &self.0
    }
}

#[derive(Clone, Default)]
struct ConstBuildHasher;
struct ConstHasher;
impl BuildHasher for ConstBuildHasher {
    type Hasher = ConstHasher;
    fn build_hasher(&self) -> ConstHasher {
        ConstHasher
    }
}
impl Hasher for ConstHasher {
    fn write(&mut self, _bytes: &[u8]) {}
    fn finish(&self) -> u64 {
        0
    }
}

// Pool-indexed operations to improve shrinking: indices shrink to earlier keys,
// pool length shrinks, and op lists shrink in length.
#[derive(Clone, Debug)]
enum OpI {
    Insert(usize, i32),
    Remove(usize),
    Get(usize),
    Contains(String),
    Mutate(usize, i32),
    Iterate,
    Clear,
}

fn key_from(pool: &[String], i: usize) -> Key {
    Key(pool[i].clone())
}

fn arb_scenario() -> impl Strategy<Value = (Vec<String>, Vec<OpI>)> {
    proptest::collection::vec("[a-z]{0,5}", 1..=40).prop_flat_map(|pool| {
        let idxs: Vec<usize> = (0..pool.len()).collect();
        let idx = proptest::sample::select(idxs);
        let contains_pool = proptest::sample::select(pool.clone());
        let op = prop_oneof![
            4 => (idx.clone(), any::<i32>()).prop_map(|(i, v)| OpI::Insert(i, v)),
            2 => idx.clone().prop_map(OpI::Remove),
            2 => idx.clone().prop_map(OpI::Get),
            1 => prop_oneof![contains_pool, "[a-z]{0,5}"].prop_map(OpI::Contains),
            1 => (idx.clone(), any::<i32>()).prop_map(|(i, d)| OpI::Mutate(i, d)),
            1 => Just(OpI::Iterate),
            1 => Just(OpI::Clear),
        ];
        proptest::collection::vec(op, 1..120).prop_map(move |ops| (pool.clone(), ops))
    })
}

fn snapshot<S: BuildHasher>(m: &PairMap<Key, i32, S>) -> BTreeMap<Key, i32> {
    m.iter().map(|(k, v)| (k.clone(), *v)).collect()
}

// Runs one scenario against a hashbrown model. Shared by the real-hasher and
// constant-hasher properties; the latter puts every key in one cluster.
fn run_state_machine<S: BuildHasher>(
    mut sut: PairMap<Key, i32, S>,
    pool: &[String],
    ops: Vec<OpI>,
) -> Result<(), TestCaseError> {
    let mut model: HashMap<Key, i32> = HashMap::new();
    for op in ops {
        match op {
            OpI::Insert(i, v) => {
                let k = key_from(pool, i);
                let prev = sut.insert(k.clone(), v).expect("process allocator");
                prop_assert_eq!(prev, model.insert(k, v));
            }
            OpI::Remove(i) => {
                let k = key_from(pool, i);
                prop_assert_eq!(sut.remove_entry(k.0.as_str()), model.remove_entry(&k));
            }
            OpI::Get(i) => {
                let k = key_from(pool, i);
                prop_assert_eq!(sut.get(&k), model.get(&k));
            }
            OpI::Contains(s) => {
                let has_model = model.keys().any(|k| k.0 == s);
                prop_assert_eq!(sut.contains_key(s.as_str()), has_model);
            }
            OpI::Mutate(i, d) => {
                let k = key_from(pool, i);
                match (sut.get_mut(&k), model.get_mut(&k)) {
                    (Some(a), Some(b)) => {
                        *a = a.wrapping_add(d);
                        *b = b.wrapping_add(d);
                    }
                    (None, None) => {}
                    (a, b) => prop_assert!(false, "presence mismatch {:?} vs {:?}", a, b),
                }
            }
            OpI::Iterate => {
                let seen = snapshot(&sut);
                prop_assert_eq!(seen.len(), sut.iter().count(), "a pair was yielded twice");
                let expected: BTreeMap<Key, i32> =
                    model.iter().map(|(k, v)| (k.clone(), *v)).collect();
                prop_assert_eq!(seen, expected);
            }
            OpI::Clear => {
                let cap = sut.capacity();
                sut.clear();
                model.clear();
                prop_assert_eq!(sut.capacity(), cap);
            }
        }
        prop_assert_eq!(sut.len(), model.len());
        prop_assert_eq!(sut.is_empty(), model.is_empty());
        prop_assert!(sut.capacity().is_power_of_two());
        prop_assert!(sut.len() * 4 <= sut.capacity() * 3, "load factor above 3/4");
    }
    Ok(())
}

// Property: state-machine equivalence against hashbrown::HashMap.
// - `insert` returns the previous value exactly when the model does.
// - `get`/`contains_key` parity, including borrowed `&str` lookups.
// - `remove_entry` hands back the owned pair the model held.
// - `iter` yields each live pair exactly once.
// - Capacity stays a power of two with load at most 3/4.
proptest! {
    #![proptest_config(ProptestConfig { cases: 64, .. ProptestConfig::default() })]
    #[test]
    fn prop_state_machine((pool, ops) in arb_scenario()) {
        run_state_machine(PairMap::with_hasher(RandomState::new()), &pool, ops)?;
    }

    // Same sequence with every key hashing to 0: one wrap-around cluster,
    // so backward-shift deletion is exercised on every remove.
    #[test]
    fn prop_state_machine_const_hash((pool, ops) in arb_scenario()) {
        run_state_machine(PairMap::with_hasher(ConstBuildHasher), &pool, ops)?;
    }
}

#[derive(Clone, Debug)]
enum FaultOp {
    Insert(u16, u32),
    Remove(u16),
    Budget(Option<usize>),
}

fn arb_fault_ops() -> impl Strategy<Value = Vec<FaultOp>> {
    let op = prop_oneof![
        6 => (0u16..64, any::<u32>()).prop_map(|(k, v)| FaultOp::Insert(k, v)),
        2 => (0u16..64).prop_map(FaultOp::Remove),
        1 => proptest::option::of(0usize..3).prop_map(FaultOp::Budget),
    ];
    proptest::collection::vec(op, 1..200)
}

// Property: a refused allocation leaves the map exactly as it was.
// - A failed insert only happens for a new key, and changes neither the
//   contents nor the capacity.
// - Overwrites and removes succeed with no allocation budget at all.
// - After `free`, every block the map took has been returned.
proptest! {
    #![proptest_config(ProptestConfig { cases: 64, .. ProptestConfig::default() })]
    #[test]
    fn prop_refused_allocation_is_atomic(ops in arb_fault_ops()) {
        let alloc = CountingAlloc::new();
        {
            let mut sut: PairMap<u16, u32, RandomState, &CountingAlloc> =
                PairMap::try_with_hasher_in(RandomState::new(), &alloc).expect("no budget yet");
            let mut model: HashMap<u16, u32> = HashMap::new();
            for op in ops {
                match op {
                    FaultOp::Insert(k, v) => {
                        let cap = sut.capacity();
                        match sut.insert(k, v) {
                            Ok(prev) => prop_assert_eq!(prev, model.insert(k, v)),
                            Err(_) => {
                                prop_assert!(!model.contains_key(&k), "overwrite must not allocate");
                                prop_assert_eq!(sut.capacity(), cap);
                            }
                        }
                    }
                    FaultOp::Remove(k) => {
                        prop_assert_eq!(sut.remove(&k), model.remove(&k));
                    }
                    FaultOp::Budget(b) => alloc.set_budget(b),
                }
                prop_assert_eq!(sut.len(), model.len());
                // One block per pair plus the slot array.
                prop_assert_eq!(alloc.live_blocks(), model.len() + 1);
                for (k, v) in &model {
                    prop_assert_eq!(sut.get(k), Some(v));
                }
            }
            sut.free();
        }
        prop_assert_eq!(alloc.live_blocks(), 0);
        prop_assert_eq!(alloc.live_bytes(), 0);
    }
}

#[derive(Clone, Debug)]
enum ByteOp {
    Insert(u8, u8),
    Delete(u8),
    Lookup(u8),
    Budget(Option<usize>),
}

fn arb_byte_ops() -> impl Strategy<Value = Vec<ByteOp>> {
    let op = prop_oneof![
        6 => (0u8..48, any::<u8>()).prop_map(|(k, v)| ByteOp::Insert(k, v)),
        2 => (0u8..48).prop_map(ByteOp::Delete),
        2 => (0u8..48).prop_map(ByteOp::Lookup),
        1 => proptest::option::of(0usize..2).prop_map(ByteOp::Budget),
    ];
    proptest::collection::vec(op, 1..200)
}

fn byte_key(k: u8) -> [u8; 3] {
    [k, k ^ 0x5a, 7]
}

fn byte_value(v: u8) -> [u8; 5] {
    [v; 5]
}

// Four of the 48 generated keys share each hash value.
fn fold_hash(bytes: &[u8]) -> u64 {
    (bytes[0] % 12) as u64
}

// Property: the byte map under a fault-injecting allocator.
// - Results match a hashbrown model of owned byte vectors.
// - A refused insert is only ever for a new key and changes nothing,
//   capacity included.
// - Each pair is exactly one block; after `free` nothing is left.
proptest! {
    #![proptest_config(ProptestConfig { cases: 64, .. ProptestConfig::default() })]
    #[test]
    fn prop_byte_map_refused_allocation_is_atomic(ops in arb_byte_ops()) {
        let alloc = CountingAlloc::new();
        {
            let mut sut = ByteMap::new_in(3, 5, fold_hash, &alloc).expect("no budget yet");
            let mut model: HashMap<Vec<u8>, Vec<u8>> = HashMap::new();
            for op in ops {
                match op {
                    ByteOp::Insert(k, v) => {
                        let (key, value) = (byte_key(k), byte_value(v));
                        let cap = sut.capacity();
                        match sut.insert(&key, &value) {
                            Ok(()) => {
                                model.insert(key.to_vec(), value.to_vec());
                            }
                            Err(MapError::Alloc(_)) => {
                                prop_assert!(!model.contains_key(&key[..]), "overwrite must not allocate");
                                prop_assert_eq!(sut.capacity(), cap);
                            }
                            Err(e) => prop_assert!(false, "unexpected error {}", e),
                        }
                    }
                    ByteOp::Delete(k) => {
                        let key = byte_key(k);
                        prop_assert_eq!(sut.delete(&key), Ok(model.remove(&key[..]).is_some()));
                    }
                    ByteOp::Lookup(k) => {
                        let key = byte_key(k);
                        let expected = model.get(&key[..]).map(Vec::as_slice);
                        prop_assert_eq!(sut.lookup(&key), Ok(expected));
                    }
                    ByteOp::Budget(b) => alloc.set_budget(b),
                }
                prop_assert_eq!(sut.len(), model.len());
                // One block per pair plus the slot array.
                prop_assert_eq!(alloc.live_blocks(), model.len() + 1);
            }
            let seen: BTreeMap<Vec<u8>, Vec<u8>> =
                sut.iter().map(|(k, v)| (k.to_vec(), v.to_vec())).collect();
            let expected: BTreeMap<Vec<u8>, Vec<u8>> = model.into_iter().collect();
            prop_assert_eq!(seen, expected);
            sut.free();
        }
        prop_assert_eq!(alloc.live_blocks(), 0);
        prop_assert_eq!(alloc.live_bytes(), 0);
    }
}
