//  The jagged bucket table of a dictionary, indexing split-ordered chains of nodes.
//
//  The table is a sequence of generations (segments): generation 0 holds the initial buckets, and each subsequent
//  generation doubles the total number of buckets, so that generation `g > 0` holds buckets
//  `[initial << (g - 1), initial << g)`. Segments are allocated once, and never moved nor resized.
//
//  All chains are ordered by split-order key (bit-reversed hash). As a result, at any table size, the nodes of a
//  bucket form a contiguous run of a chain, and growing the table is only a matter of pointing each new bucket at the
//  appropriate suffix of its parent's chain; no node is ever moved nor rewritten by a growth.
//
//  Lock-free readers load the number of published generations, then follow chains. Writers, serialized by the
//  dictionary's insertion lock, publish new nodes and new generations with a single release store each.

use std::{
    alloc::Layout,
    fmt,
    ptr::{self, NonNull},
    sync::atomic::{AtomicPtr, AtomicUsize, Ordering},
};

use tracing::{debug, warn};

use crate::{
    error::DictionaryError,
    node::{split_order_key, Node},
    provider::MemoryProvider,
};

/// Maximum number of generations of a table.
pub(crate) const MAX_GENERATIONS: usize = 16;

/// The table of buckets.
pub(crate) struct SegmentTable {
    log_initial_buckets: u8,
    max_generations: usize,
    //  Number of published generations, 0 until the first insertion.
    generations: AtomicUsize,
    segments: [AtomicPtr<Bucket>; MAX_GENERATIONS],
}

/// A published layout of the table.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) struct Snapshot {
    /// Index of the newest generation.
    pub(crate) generation: usize,
    /// Total number of buckets, across all generations up to `generation`.
    pub(crate) table_size: usize,
}

impl Snapshot {
    /// Returns the bucket of `hash`, in this layout.
    #[inline(always)]
    pub(crate) fn bucket_of(&self, hash: u32) -> usize {
        debug_assert_eq!(1, self.table_size.count_ones());

        hash as usize & (self.table_size - 1)
    }
}

/// The result of searching a chain.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Search {
    /// The bucket searched.
    pub(crate) bucket: usize,
    /// The node holding the searched bytes, if any.
    pub(crate) found: Option<NonNull<Node>>,
    /// The node after which the searched bytes would be spliced, `None` for the head of the bucket.
    pub(crate) predecessor: Option<NonNull<Node>>,
    /// The node before which the searched bytes would be spliced, if any.
    pub(crate) successor: Option<NonNull<Node>>,
}

impl SegmentTable {
    /// Creates a new table, without any generation.
    pub(crate) fn new(log_initial_buckets: u8, max_generations: usize) -> Self {
        debug_assert!(max_generations >= 1 && max_generations <= MAX_GENERATIONS);
        debug_assert!(log_initial_buckets as usize + max_generations <= usize::BITS as usize);

        Self {
            log_initial_buckets,
            max_generations,
            generations: AtomicUsize::new(0),
            segments: Default::default(),
        }
    }

    /// Returns the current layout, or `None` if no generation was published yet.
    #[inline(always)]
    pub(crate) fn snapshot(&self) -> Option<Snapshot> {
        let generations = self.generations.load(Ordering::Acquire);

        let generation = generations.checked_sub(1)?;

        Some(Snapshot {
            generation,
            table_size: self.table_size(generation),
        })
    }

    /// Returns the total number of buckets of the table, once `generation` is published.
    #[inline(always)]
    pub(crate) fn table_size(&self, generation: usize) -> usize {
        (1usize << self.log_initial_buckets) << generation
    }

    /// Returns the number of buckets contributed by the generations prior to `generation`.
    #[inline(always)]
    pub(crate) fn prev_table_size(&self, generation: usize) -> usize {
        if generation == 0 {
            0
        } else {
            self.table_size(generation - 1)
        }
    }

    /// Returns the generation holding `bucket`, and the index of `bucket` within this generation.
    #[inline(always)]
    pub(crate) fn locate(&self, bucket: usize) -> (usize, usize) {
        let outer = bucket >> self.log_initial_buckets;

        let generation = (usize::BITS - outer.leading_zeros()) as usize;

        debug_assert!(self.prev_table_size(generation) <= bucket);
        debug_assert!(bucket < self.table_size(generation));

        (generation, bucket - self.prev_table_size(generation))
    }

    /// Returns the first node of the chain of `bucket`, if any.
    ///
    /// The chain may extend past the nodes of `bucket`, see `Snapshot::bucket_of`.
    ///
    /// #   Safety
    ///
    /// `bucket` must be less than the `table_size` of a snapshot of this table.
    #[inline(always)]
    pub(crate) unsafe fn head(&self, bucket: usize) -> Option<NonNull<Node>> {
        //  Safety:
        //  -   `bucket` is within a published generation.
        let bucket = unsafe { self.bucket(bucket) };

        NonNull::new(bucket.load(Ordering::Acquire))
    }

    /// Searches `bytes` in the chain of its bucket, under the `snapshot` layout.
    ///
    /// The search stops at the first node which either belongs to another bucket, or sorts after `bytes`.
    ///
    /// #   Safety
    ///
    /// -   `snapshot` must have been obtained from this table.
    /// -   The nodes of this table must outlive the call.
    pub(crate) unsafe fn search(&self, snapshot: Snapshot, hash: u32, bytes: &[u8]) -> Search {
        let bucket = snapshot.bucket_of(hash);
        let key = split_order_key(hash);

        let mut predecessor = None;

        //  Safety:
        //  -   `bucket` is less than `snapshot.table_size`.
        let mut current = unsafe { self.head(bucket) };

        while let Some(node) = current {
            //  Safety:
            //  -   Nodes outlive the call.
            let header = unsafe { Node::header(node) };

            if snapshot.bucket_of(header.hash()) != bucket || split_order_key(header.hash()) > key {
                break;
            }

            //  Safety:
            //  -   Nodes outlive the call.
            if header.hash() == hash && unsafe { Node::bytes(node) } == bytes {
                return Search {
                    bucket,
                    found: Some(node),
                    predecessor,
                    successor: header.next(),
                };
            }

            predecessor = Some(node);
            current = header.next();
        }

        Search {
            bucket,
            found: None,
            predecessor,
            successor: current,
        }
    }

    /// Splices `node` in the position determined by `search`.
    ///
    /// #   Safety
    ///
    /// -   Must be called under the insertion lock, with no insertion nor growth since `search`.
    /// -   `node` must be fully constructed, with `search.successor` as next, and outlive the table.
    pub(crate) unsafe fn link(&self, search: &Search, node: NonNull<Node>) {
        match search.predecessor {
            //  Safety:
            //  -   The predecessor outlives the table.
            Some(predecessor) => unsafe { Node::header(predecessor).set_next(Some(node)) },
            None => {
                //  Safety:
                //  -   `search.bucket` was computed from a snapshot of this table.
                let bucket = unsafe { self.bucket(search.bucket) };

                bucket.store(node.as_ptr(), Ordering::Release);
            }
        }
    }

    /// Returns whether the table should grow, given the current number of entries.
    ///
    /// Once the generation cap is reached, the table no longer grows and its chains lengthen instead.
    pub(crate) fn should_grow(&self, snapshot: Snapshot, entries: usize) -> bool {
        entries >= snapshot.table_size && snapshot.generation + 1 < self.max_generations
    }

    /// Returns whether `generation` is the last one this table may publish.
    pub(crate) fn is_last_generation(&self, generation: usize) -> bool {
        generation + 1 == self.max_generations
    }

    /// Allocates, populates, and publishes the next generation.
    ///
    /// When no generation exists yet, the first generation is created empty. Otherwise, each bucket of the new
    /// generation adopts the suffix of its parent's chain which belongs to it.
    ///
    /// #   Safety
    ///
    /// -   Must be called under the insertion lock.
    /// -   This `provider` must be used for all allocations of this instance.
    /// -   The nodes of this table must outlive the call.
    pub(crate) unsafe fn grow<P>(&self, entries: usize, provider: &P) -> Result<Snapshot, DictionaryError>
    where
        P: MemoryProvider,
    {
        let generation = self.generations.load(Ordering::Relaxed);

        debug_assert!(generation < self.max_generations);

        let layout = self.segment_layout(generation)?;
        let number_buckets = self.table_size(generation) - self.prev_table_size(generation);

        let segment: NonNull<Bucket> = provider.allocate(layout)?.cast();

        if generation == 0 {
            for index in 0..number_buckets {
                //  Safety:
                //  -   `index` is within the freshly allocated segment.
                unsafe { ptr::write(segment.as_ptr().add(index), AtomicPtr::new(ptr::null_mut())) };
            }
        } else {
            let previous = self.prev_table_size(generation);
            let mask = self.table_size(generation) - 1;

            debug_assert_eq!(previous, number_buckets);

            for index in 0..previous {
                //  Safety:
                //  -   `index` is within the previous generations, which are published.
                let mut current = unsafe { self.head(index) };

                //  Skip over the nodes which remain in `index`.
                while let Some(node) = current {
                    //  Safety:
                    //  -   Nodes outlive the call.
                    let header = unsafe { Node::header(node) };

                    if header.hash() as usize & mask != index {
                        break;
                    }

                    current = header.next();
                }

                //  The chain may directly continue with nodes of unrelated buckets.
                let sibling = current.filter(|node| {
                    //  Safety:
                    //  -   Nodes outlive the call.
                    let hash = unsafe { Node::header(*node).hash() };

                    hash as usize & mask == index + previous
                });

                let sibling = sibling.map_or(ptr::null_mut(), NonNull::as_ptr);

                //  Safety:
                //  -   `index` is within the freshly allocated segment.
                unsafe { ptr::write(segment.as_ptr().add(index), AtomicPtr::new(sibling)) };
            }
        }

        self.segments[generation].store(segment.as_ptr(), Ordering::Release);
        self.generations.store(generation + 1, Ordering::Release);

        let table_size = self.table_size(generation);

        debug!(generation, table_size, entries, "dictionary generation published");

        if self.is_last_generation(generation) {
            warn!(
                generation,
                table_size, "dictionary generation cap reached, chains will lengthen from now on"
            );
        }

        Ok(Snapshot {
            generation,
            table_size,
        })
    }

    /// Returns the number of bytes allocated for the published segments.
    pub(crate) fn allocated_bytes(&self) -> usize {
        self.snapshot()
            .map_or(0, |snapshot| snapshot.table_size * std::mem::size_of::<Bucket>())
    }

    /// Releases all segments.
    ///
    /// #   Safety
    ///
    /// This `provider` must have been used for all allocations of this instance.
    pub(crate) unsafe fn release<P>(&mut self, provider: &P)
    where
        P: MemoryProvider,
    {
        let generations = *self.generations.get_mut();

        for generation in 0..generations {
            let segment = self.segments[generation].swap(ptr::null_mut(), Ordering::Relaxed);

            let Some(segment) = NonNull::new(segment) else { continue };

            let Ok(layout) = self.segment_layout(generation) else { continue };

            //  Safety:
            //  -   `segment` was allocated by `provider`, with `layout`, and is released only once.
            unsafe { provider.deallocate(segment.cast(), layout) };
        }

        *self.generations.get_mut() = 0;
    }
}

impl fmt::Debug for SegmentTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        f.debug_struct("SegmentTable")
            .field("initial_buckets", &(1usize << self.log_initial_buckets))
            .field("max_generations", &self.max_generations)
            .field("snapshot", &self.snapshot())
            .finish()
    }
}

//
//  Implementation
//

type Bucket = AtomicPtr<Node>;

impl SegmentTable {
    fn segment_layout(&self, generation: usize) -> Result<Layout, DictionaryError> {
        let number_buckets = self.table_size(generation) - self.prev_table_size(generation);

        Layout::array::<Bucket>(number_buckets).map_err(|_| DictionaryError::AllocationFailure)
    }

    //  #   Safety
    //
    //  `bucket` must be less than the `table_size` of a snapshot of this table.
    unsafe fn bucket(&self, bucket: usize) -> &Bucket {
        let (generation, index) = self.locate(bucket);

        let segment = self.segments[generation].load(Ordering::Acquire);

        debug_assert!(!segment.is_null());

        //  Safety:
        //  -   The generation is published, hence `segment` is non-null and points to initialized buckets.
        //  -   `index` is within the bounds of the segment, as computed by `locate`.
        //  -   The segment is never released while `self` is borrowed.
        unsafe { &*segment.add(index) }
    }
}

// mod tests
