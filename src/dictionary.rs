//  Implementation of the `Dictionary`.

use std::{
    fmt,
    hash::{BuildHasher, Hasher},
    mem,
    ptr::NonNull,
    sync::{
        atomic::{AtomicPtr, AtomicUsize, Ordering},
        OnceLock,
    },
};

use parking_lot::Mutex;

use crate::{
    arena::Arena,
    error::DictionaryError,
    iter::{Iter, IterStr, IterWithMetadata},
    node::Node,
    provider::{Global, MemoryProvider},
    string::{DictBytes, DictStr},
    table::{SegmentTable, MAX_GENERATIONS},
};

/// The default hashing algorithm, Fx Hash.
pub type DefaultBuildHasher = fxhash::FxBuildHasher;

/// Returns the process-wide `Dictionary`.
///
/// The instance is created on first use, and lives until the end of the process.
pub fn global() -> &'static Dictionary {
    static GLOBAL: OnceLock<Dictionary> = OnceLock::new();

    GLOBAL.get_or_init(Dictionary::new)
}

/// A string dictionary, with lock-free look-ups.
///
/// Interning a value returns a handle to its unique, immutable, copy within the dictionary. Values are never removed:
/// they live as long as the dictionary itself.
///
/// Look-ups of previously interned values never block. Insertions of new values, and the occasional growth of the
/// table, are serialized by a single lock.
pub struct Dictionary<H = DefaultBuildHasher, P = Global>
where
    P: MemoryProvider,
{
    table: SegmentTable,
    //  The insertion lock, guarding the arena and all structural mutations of the table.
    writer: Mutex<Arena>,
    entries: AtomicUsize,
    page_size: usize,
    hasher: H,
    provider: P,
}

impl Dictionary {
    /// Creates a new Dictionary, with default configuration.
    ///
    /// No memory is allocated until the first non-empty value is interned.
    ///
    /// To customize the Dictionary, use the `with()` method instead.
    pub fn new() -> Self {
        Self::with(DefaultBuildHasher::default(), Global).build()
    }

    /// Returns the process-wide `Dictionary`.
    pub fn global() -> &'static Self {
        global()
    }
}

impl Default for Dictionary {
    fn default() -> Self {
        Self::new()
    }
}

impl<H, P> Dictionary<H, P>
where
    P: MemoryProvider,
{
    /// Creates a builder for the Dictionary, allowing finer-grained tuning.
    pub fn with(hasher: H, provider: P) -> DictionaryBuilder<H, P> {
        DictionaryBuilder {
            hasher,
            provider,
            page_size: DEFAULT_PAGE_SIZE,
            initial_buckets: None,
            max_generations: MAX_GENERATIONS,
        }
    }

    /// Returns the number of distinct values interned, the empty value excluded.
    pub fn len(&self) -> usize {
        self.entries.load(Ordering::Relaxed)
    }

    /// Returns whether no value was interned yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the maximum number of bytes of a value.
    pub fn max_string_size(&self) -> usize {
        Arena::max_string_size(self.page_size)
    }

    /// Returns a snapshot of the internal statistics.
    ///
    /// Briefly takes the insertion lock.
    pub fn statistics(&self) -> Statistics {
        let arena = self.writer.lock();

        let (generations, table_size) = self
            .table
            .snapshot()
            .map_or((0, 0), |snapshot| (snapshot.generation + 1, snapshot.table_size));

        Statistics {
            entries: self.len(),
            generations,
            table_size,
            pages: arena.number_pages(),
            allocated_bytes: arena.allocated_bytes() + self.table.allocated_bytes(),
        }
    }

    /// Returns an iterator over all interned values.
    ///
    /// The order is deterministic, by bucket, but otherwise unrelated to the order of insertion.
    ///
    /// Insertions which do not grow the table may proceed concurrently, and their values may or may not be
    /// observed. If the table grows during the iteration, values may be skipped.
    pub fn iter(&self) -> Iter<'_> {
        Iter::new(self.iter_with_metadata())
    }

    /// Returns an iterator over all interned values which are valid UTF-8.
    ///
    /// See `iter`.
    pub fn iter_str(&self) -> IterStr<'_> {
        IterStr::new(self.iter())
    }

    /// Returns an iterator over all interned values, alongside their location in the table.
    ///
    /// See `iter`.
    pub fn iter_with_metadata(&self) -> IterWithMetadata<'_> {
        IterWithMetadata::new(&self.table)
    }
}

impl<H, P> Dictionary<H, P>
where
    H: BuildHasher,
    P: MemoryProvider,
{
    /// Interns a string.
    ///
    /// Returns a handle to the unique copy of `text` within this instance, creating it if necessary.
    ///
    /// #   Errors
    ///
    /// -   `OversizedInput` if `text` is longer than `max_string_size`, in which case nothing is modified.
    /// -   `AllocationFailure` if the provider could not supply memory.
    pub fn intern(&self, text: &str) -> Result<DictStr<'_>, DictionaryError> {
        let bytes = self.intern_bytes(text.as_bytes())?;

        //  Safety:
        //  -   A string was interned.
        let result = unsafe { DictStr::from_dict_bytes(bytes) };

        Ok(result)
    }

    /// Interns a slice of bytes.
    ///
    /// Returns a handle to the unique copy of `bytes` within this instance, creating it if necessary.
    ///
    /// #   Errors
    ///
    /// -   `OversizedInput` if `bytes` is longer than `max_string_size`, in which case nothing is modified.
    /// -   `AllocationFailure` if the provider could not supply memory.
    pub fn intern_bytes(&self, bytes: &[u8]) -> Result<DictBytes<'_>, DictionaryError> {
        if bytes.is_empty() {
            return Ok(DictBytes::default());
        }

        let maximum = self.max_string_size();

        if bytes.len() > maximum {
            return Err(DictionaryError::OversizedInput {
                length: bytes.len(),
                maximum,
            });
        }

        let hash = self.hash(bytes);

        let node = match self.find(hash, bytes) {
            Some(node) => node,
            None => self.insert(hash, bytes)?,
        };

        //  Safety:
        //  -   `node` was allocated by `self`, and lives as long as `self`.
        let result = unsafe { DictBytes::from_node(node) };

        Ok(result)
    }
}

impl<H, P> Drop for Dictionary<H, P>
where
    P: MemoryProvider,
{
    fn drop(&mut self) {
        //  Safety:
        //  -   `self.provider` was used for all allocations.
        //  -   No handle can outlive `self`.
        unsafe {
            self.table.release(&self.provider);
            self.writer.get_mut().release(&self.provider);
        }
    }
}

impl<H, P> fmt::Debug for Dictionary<H, P>
where
    P: MemoryProvider,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        write!(
            f,
            "{{ page_size: {}, entries: {}, table: {:?}, values: [",
            self.page_size,
            self.len(),
            self.table
        )?;

        for (index, (bytes, metadata)) in self.iter_with_metadata().enumerate() {
            let separator = if index > 0 { ", " } else { "" };

            write!(
                f,
                "{separator}({}, {}, {}) -> {bytes:?}",
                metadata.generation, metadata.bucket, metadata.position
            )?;
        }

        write!(f, "] }}")
    }
}

/// A builder for the Dictionary.
pub struct DictionaryBuilder<H, P> {
    hasher: H,
    provider: P,
    page_size: usize,
    initial_buckets: Option<usize>,
    max_generations: usize,
}

impl<H, P> DictionaryBuilder<H, P> {
    /// Sets the size of the pages in which values are stored.
    ///
    /// The maximum size of a value is slightly less than the size of a page, see `Dictionary::max_string_size`.
    ///
    /// #   Panics
    ///
    /// If `page_size` is too small to hold a single 1-byte value, or larger than `u32::MAX`.
    pub fn set_page_size(&mut self, page_size: usize) -> &mut Self {
        assert!(page_size >= Arena::MIN_PAGE_SIZE, "page size too small: {page_size}");
        assert!(page_size <= u32::MAX as usize, "page size too large: {page_size}");

        self.page_size = page_size;
        self
    }

    /// Sets the number of buckets of the first generation of the table.
    ///
    /// Each subsequent generation doubles the total number of buckets. By default, as many as fit in a page.
    ///
    /// #   Panics
    ///
    /// If `initial_buckets` is not a power of 2, or is larger than 2**24.
    pub fn set_initial_buckets(&mut self, initial_buckets: usize) -> &mut Self {
        assert_eq!(1, initial_buckets.count_ones());
        assert!(initial_buckets <= MAX_INITIAL_BUCKETS);

        self.initial_buckets = Some(initial_buckets);
        self
    }

    /// Sets the maximum number of generations of the table.
    ///
    /// Once the last generation is reached, the table stops growing, and look-ups slow down as chains lengthen.
    ///
    /// On targets with narrow pointers, `build` lowers the cap so that the total number of buckets fits in a `usize`.
    ///
    /// #   Panics
    ///
    /// If `max_generations` is 0, or larger than 16.
    pub fn set_max_generations(&mut self, max_generations: usize) -> &mut Self {
        assert!(max_generations >= 1);
        assert!(max_generations <= MAX_GENERATIONS);

        self.max_generations = max_generations;
        self
    }
}

impl<H, P> DictionaryBuilder<H, P>
where
    P: MemoryProvider,
{
    /// Builds a Dictionary with the current configuration.
    ///
    /// No memory is allocated until the first non-empty value is interned.
    pub fn build(self) -> Dictionary<H, P> {
        let initial_buckets = self.initial_buckets.unwrap_or_else(|| {
            let fitting = self.page_size / mem::size_of::<AtomicPtr<Node>>();

            floor_power_of_two(fitting)
        });

        let log_initial_buckets = initial_buckets.ilog2();
        let max_generations = fit_generations(log_initial_buckets, self.max_generations, usize::BITS);

        let table = SegmentTable::new(log_initial_buckets as u8, max_generations);

        Dictionary {
            table,
            writer: Mutex::new(Arena::new(self.page_size)),
            entries: AtomicUsize::new(0),
            page_size: self.page_size,
            hasher: self.hasher,
            provider: self.provider,
        }
    }
}

impl<H, P> fmt::Debug for DictionaryBuilder<H, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        f.debug_struct("DictionaryBuilder")
            .field("page_size", &self.page_size)
            .field("initial_buckets", &self.initial_buckets)
            .field("max_generations", &self.max_generations)
            .finish()
    }
}

/// Statistics of a Dictionary.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub struct Statistics {
    /// Number of distinct values interned.
    pub entries: usize,
    /// Number of generations of the table.
    pub generations: usize,
    /// Total number of buckets of the table.
    pub table_size: usize,
    /// Number of pages storing values.
    pub pages: usize,
    /// Total number of bytes requested from the memory provider.
    pub allocated_bytes: usize,
}

//
//  Implementation
//

const DEFAULT_PAGE_SIZE: usize = 64 * 1024;

const MAX_INITIAL_BUCKETS: usize = 1 << 24;

//  Largest power of 2 no greater than `n`, clamped to `[1, MAX_INITIAL_BUCKETS]`.
fn floor_power_of_two(n: usize) -> usize {
    if n == 0 {
        return 1;
    }

    (1usize << n.ilog2()).min(MAX_INITIAL_BUCKETS)
}

//  Lowers `requested` so that the largest table, `1 << (log_initial_buckets + generations - 1)`, is representable with
//  `pointer_bits` bits.
fn fit_generations(log_initial_buckets: u32, requested: usize, pointer_bits: u32) -> usize {
    debug_assert!(log_initial_buckets < pointer_bits);

    requested.min((pointer_bits - log_initial_buckets) as usize)
}

impl<H, P> Dictionary<H, P>
where
    H: BuildHasher,
    P: MemoryProvider,
{
    fn hash(&self, bytes: &[u8]) -> u32 {
        let mut hasher = self.hasher.build_hasher();

        hasher.write(bytes);

        let hash = hasher.finish();

        //  Fold, so that the low bits used for bucketing depend on all bits of the hash.
        (hash >> 32) as u32 ^ hash as u32
    }

    //  Lock-free look-up.
    fn find(&self, hash: u32, bytes: &[u8]) -> Option<NonNull<Node>> {
        let snapshot = self.table.snapshot()?;

        //  Safety:
        //  -   `snapshot` was obtained from `self.table`.
        //  -   Nodes live as long as `self`.
        unsafe { self.table.search(snapshot, hash, bytes).found }
    }

    //  Locked insertion, growing the table first if necessary.
    //
    //  Another thread may have inserted `bytes` since the lock-free look-up, in which case its node is returned.
    fn insert(&self, hash: u32, bytes: &[u8]) -> Result<NonNull<Node>, DictionaryError> {
        let mut arena = self.writer.lock();

        let entries = self.entries.load(Ordering::Relaxed);

        //  Safety (of `grow`):
        //  -   The insertion lock is held.
        //  -   `self.provider` is used for all allocations.
        //  -   Nodes live as long as `self`.
        let snapshot = match self.table.snapshot() {
            None => unsafe { self.table.grow(entries, &self.provider)? },
            Some(snapshot) if self.table.should_grow(snapshot, entries) => unsafe {
                self.table.grow(entries, &self.provider)?
            },
            Some(snapshot) => snapshot,
        };

        //  Safety:
        //  -   `snapshot` was obtained from `self.table`.
        //  -   Nodes live as long as `self`.
        let search = unsafe { self.table.search(snapshot, hash, bytes) };

        if let Some(node) = search.found {
            return Ok(node);
        }

        let node = arena.allocate_node(hash, bytes, search.successor, &self.provider)?;

        //  Safety:
        //  -   The insertion lock is held, and was held since `search`.
        //  -   `node` is fully constructed, with `search.successor` as next, and lives as long as `self`.
        unsafe { self.table.link(&search, node) };

        self.entries.store(entries + 1, Ordering::Relaxed);

        Ok(node)
    }
}

// mod tests
