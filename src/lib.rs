//! pairmap: a hash map whose pairs live in memory from a caller-supplied
//! allocator.
//!
//! Internal Design:
//!
//! Summary
//! - Goal: an associative map that never touches memory it was not handed,
//!   and that survives allocator refusal with its contents intact.
//! - Layers:
//!   - `RawAlloc`: the allocator capability. `Global`, `FnAlloc` (a pair of
//!     plain functions), `CountingAlloc` (accounting plus a refusal budget),
//!     and `&A` for any allocator `A`.
//!   - `AllocVec<T, A>`: growable array over a `RawAlloc`; the table's slot
//!     storage.
//!   - `RawPairTable<P, A>`: open addressing with linear probing and
//!     backward-shift deletion over pair blocks `P`. Each pair is one
//!     allocator block holding the stored hash, key and value; the table
//!     reads only the hash and takes key equality as a predicate.
//!   - `PairMap<K, V, S, A>`: typed map over `{hash, key, value}` blocks,
//!     hashing with a `BuildHasher`.
//!   - `ByteMap<H, A>`: fixed-width byte keys and values checked at run
//!     time, hashed with a caller-supplied `Fn(&[u8]) -> u64`. Its blocks
//!     are a `{hash, key_len, val_len}` header followed by the key and value
//!     bytes.
//!
//! Table policy
//! - Capacity is a power of two, starting at 16 slots. A pair's home slot is
//!   its hash modulo the capacity; collisions probe forward one slot at a
//!   time, wrapping at the end.
//! - An insert that would take the load factor over 3/4 doubles the table
//!   before placing the new pair. Deleting never shrinks the table.
//! - Deletion pulls later members of the cluster back into the hole, so
//!   there are no tombstones and probes stop at the first empty slot.
//!
//! Failure atomicity
//! - Every allocation an operation needs happens before the table changes.
//!   When the allocator refuses, the operation returns an error and the map
//!   holds exactly what it held before, at the same capacity.
//! - Overwriting a present key and deleting never allocate.
//!
//! Hasher and rehashing invariants
//! - Each pair stores its full `u64` hash; growth relocates pair blocks by
//!   that stored hash and never calls user hashing again. Pair blocks are
//!   moved, not copied, so keys and values stay bit-identical.
//!
//! Concurrency and reentrancy
//! - No internal locking. Maps are `Send` when their contents and allocator
//!   are, and never `Sync`, in debug and release builds alike; share one
//!   behind a lock.
//! - `K: Eq`/`K: Hash` and `Drop` of keys and values may run inside map
//!   operations. Debug builds panic if such code re-enters the same map;
//!   removed keys and values are handed back only after the table is
//!   consistent again.
//!
//! Notes and non-goals
//! - No automatic hashing for `ByteMap`: the caller picks the function.
//! - Iteration order is slot order and otherwise unspecified.
//! - Growth and refused growth are reported through `tracing` at trace and
//!   debug level; the crate prints nothing itself.

#![deny(unsafe_op_in_unsafe_fn)]

pub mod alloc;
pub mod alloc_vec;
mod byte_map;
mod error;
mod pair;
mod pair_map;
mod pair_map_proptest;
mod raw_table;
mod reentrancy;

// Public surface
pub use alloc::{AllocError, CountingAlloc, FnAlloc, Global, RawAlloc};
pub use alloc_vec::AllocVec;
pub use byte_map::{ByteMap, HashFn};
pub use error::MapError;
pub use pair_map::{Iter, IterMut, PairMap};
