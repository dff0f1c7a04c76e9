//! String dictionary with lock-free reads.
//!
//! The `Dictionary` deduplicates strings (or slices of bytes): interning a value returns a cheap, copyable, handle to
//! the unique copy of this value within the dictionary. Handles compare by content, and give access to the hash of
//! the value in O(1).
//!
//!
//! #   How to use?
//!
//! If you just want to get going, use the process-wide instance, either via `global()` or directly with
//! `DictStr::new`. For isolation, create a private instance with `Dictionary::new`.
//!
//! You can always tune it later, using the configuration options.
//!
//!
//! #   Configuration options
//!
//! The `Dictionary` offers multiple configuration options, available via the `DictionaryBuilder`:
//!
//! -   The hashing algorithm can be tuned, it defaults to Fx Hash.
//! -   The source of memory can be tuned, it defaults to the global allocator.
//! -   The size of the pages storing the values can be tuned, it defaults to 64KB. It bounds the size of a value.
//! -   The number of initial buckets and the maximum number of generations of the table can be tuned, they default
//!     to 8K buckets and 16 generations.
//!
//!
//! #   Limits
//!
//! The `Dictionary` has some hard limits, due to design constraints:
//!
//! -   A value must fit within a single page, alongside its header.
//! -   The table stops growing after its last generation, 16 at most. Beyond `initial << 15` values, look-ups slow
//!     down linearly as chains lengthen.
//! -   Values are never removed, their memory is only reclaimed when the `Dictionary` is dropped.
//!
//!
//! #   Internals
//!
//! The `Dictionary` is a split-ordered list hashtable:
//!
//! -   Each value is stored in a node, allocated from a bump allocator: a fixed header (next, hash, length)
//!     immediately followed by the bytes and a terminating 0. Handles point to the bytes, and recover the header by
//!     stepping back.
//! -   Nodes are chained, and chains are ordered by bit-reversed hash. The nodes of a bucket are therefore contiguous
//!     at any table size.
//! -   The table of buckets is jagged: each generation doubles the number of buckets, by allocating a new array
//!     whose buckets simply point into the existing chains. Nodes never move.
//!
//! Look-ups only follow pointers, published with release stores, and never block. Insertions take a single lock,
//! re-check for a concurrent insertion of the same value, then splice the new node with a single store.

//  Ensure unsafe operations are duly checked.
#![deny(unsafe_op_in_unsafe_fn)]
//  Ensure proper documentation.
#![deny(missing_docs)]

mod arena;
mod dictionary;
mod error;
mod iter;
mod node;
mod provider;
mod string;
mod table;

pub use dictionary::{global, DefaultBuildHasher, Dictionary, DictionaryBuilder, Statistics};
pub use error::DictionaryError;
pub use iter::{EntryMetadata, Iter, IterStr, IterWithMetadata};
pub use provider::{Global, MemoryProvider};
pub use string::{DictBytes, DictStr};
