//! Errors reported by the maps.

use crate::alloc::AllocError;
use thiserror::Error;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Error)]
pub enum MapError {
    /// A byte map was asked for zero-width keys or values.
    #[error("key and value widths must be non-zero (key_len = {key_len}, val_len = {val_len})")]
    ZeroWidth { key_len: usize, val_len: usize },
    #[error("key is {actual} bytes but this map stores {expected}-byte keys")]
    KeyLength { expected: usize, actual: usize },
    #[error("value is {actual} bytes but this map stores {expected}-byte values")]
    ValueLength { expected: usize, actual: usize },
    /// The allocator refused a block; the map is unchanged.
    #[error(transparent)]
    Alloc(#[from] AllocError),
}
