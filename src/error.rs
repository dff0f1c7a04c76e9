//  Errors from the library.

use thiserror::Error;

/// Errors returned by this library.
#[derive(Clone, Copy, Debug, Eq, Error, PartialEq)]
pub enum DictionaryError {
    /// The input is longer than the maximum storable size of the `Dictionary`.
    ///
    /// Raised before any mutation, the `Dictionary` is left unchanged.
    #[error("input of {length} bytes exceeds the maximum of {maximum} bytes")]
    OversizedInput {
        /// Length of the rejected input, in bytes.
        length: usize,
        /// Maximum storable length, in bytes.
        maximum: usize,
    },
    /// No memory could be allocated.
    #[error("memory provider could not satisfy the allocation")]
    AllocationFailure,
}

// mod tests
