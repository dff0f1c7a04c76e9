//  Iteration over the values of a dictionary.

use std::{iter::FusedIterator, ptr::NonNull};

use crate::{
    dictionary::Dictionary,
    node::Node,
    provider::MemoryProvider,
    string::{DictBytes, DictStr},
    table::{SegmentTable, Snapshot},
};

/// An iterator over the values of a `Dictionary`.
///
/// See `Dictionary::iter`.
pub struct Iter<'a>(IterWithMetadata<'a>);

impl<'a> Iter<'a> {
    pub(crate) fn new(inner: IterWithMetadata<'a>) -> Self {
        Self(inner)
    }
}

impl<'a> Iterator for Iter<'a> {
    type Item = DictBytes<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        self.0.next().map(|(bytes, _)| bytes)
    }
}

impl FusedIterator for Iter<'_> {}

/// An iterator over the values of a `Dictionary` which are valid UTF-8.
///
/// See `Dictionary::iter_str`.
pub struct IterStr<'a>(Iter<'a>);

impl<'a> IterStr<'a> {
    pub(crate) fn new(inner: Iter<'a>) -> Self {
        Self(inner)
    }
}

impl<'a> Iterator for IterStr<'a> {
    type Item = DictStr<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        self.0.find_map(|bytes| bytes.to_str())
    }
}

impl FusedIterator for IterStr<'_> {}

/// The location of a value within a `Dictionary`.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct EntryMetadata {
    /// Generation of the bucket.
    pub generation: usize,
    /// Index of the bucket, across all generations.
    pub bucket: usize,
    /// Index of the value within its bucket.
    pub position: usize,
    /// Total number of buckets at the time of the iteration; the value's hash modulo `table_size` is `bucket`.
    pub table_size: usize,
}

/// An iterator over the values of a `Dictionary`, and their location.
///
/// The layout of the table is captured when the iterator is created: buckets are visited in increasing order, and
/// within each bucket, the values are visited in chain order.
pub struct IterWithMetadata<'a> {
    table: &'a SegmentTable,
    //  `None` once exhausted.
    snapshot: Option<Snapshot>,
    bucket: usize,
    next_bucket: usize,
    position: usize,
    current: Option<NonNull<Node>>,
}

impl<'a> IterWithMetadata<'a> {
    pub(crate) fn new(table: &'a SegmentTable) -> Self {
        Self {
            table,
            snapshot: table.snapshot(),
            bucket: 0,
            next_bucket: 0,
            position: 0,
            current: None,
        }
    }
}

impl<'a> Iterator for IterWithMetadata<'a> {
    type Item = (DictBytes<'a>, EntryMetadata);

    fn next(&mut self) -> Option<Self::Item> {
        let snapshot = self.snapshot?;

        loop {
            if let Some(node) = self.current {
                //  Safety:
                //  -   Nodes live as long as the table.
                let header = unsafe { Node::header(node) };

                if snapshot.bucket_of(header.hash()) == self.bucket {
                    let (generation, _) = self.table.locate(self.bucket);

                    let metadata = EntryMetadata {
                        generation,
                        bucket: self.bucket,
                        position: self.position,
                        table_size: snapshot.table_size,
                    };

                    self.position += 1;
                    self.current = header.next();

                    //  Safety:
                    //  -   `node` was allocated by the dictionary owning the table, which outlives `'a`.
                    let bytes = unsafe { DictBytes::from_node(node) };

                    return Some((bytes, metadata));
                }
            }

            //  The current bucket is exhausted.
            if self.next_bucket >= snapshot.table_size {
                self.snapshot = None;
                self.current = None;
                return None;
            }

            self.bucket = self.next_bucket;
            self.next_bucket += 1;
            self.position = 0;

            //  Safety:
            //  -   `self.bucket` is less than `snapshot.table_size`.
            self.current = unsafe { self.table.head(self.bucket) };
        }
    }
}

impl FusedIterator for IterWithMetadata<'_> {}

impl<'a, H, P> IntoIterator for &'a Dictionary<H, P>
where
    P: MemoryProvider,
{
    type Item = DictBytes<'a>;
    type IntoIter = Iter<'a>;

    fn into_iter(self) -> Iter<'a> {
        self.iter()
    }
}

// mod tests
