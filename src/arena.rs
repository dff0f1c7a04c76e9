//  Paged bump allocator for the nodes of a dictionary.
//
//  Pages are requested from the `MemoryProvider`, carved sequentially, and linked together through a small header at
//  their start so they can all be released at once. Individual nodes are never released.

use std::{
    alloc::Layout,
    fmt, mem,
    ptr::{self, NonNull},
};

use tracing::trace;

use crate::{error::DictionaryError, node::Node, provider::MemoryProvider};

/// A bump allocator of nodes.
///
/// Only ever accessed under the insertion lock.
pub(crate) struct Arena {
    page_size: usize,
    //  Next free byte of the current page, `None` until the first page is allocated.
    cursor: Option<NonNull<u8>>,
    remaining: usize,
    pages: Option<NonNull<PageHeader>>,
    number_pages: usize,
}

impl Arena {
    /// Minimum size of a page, so that at least a 1-byte string fits.
    pub(crate) const MIN_PAGE_SIZE: usize = PAGE_HEADER_SIZE + Node::size_for(1);

    /// Creates a new, empty, arena.
    ///
    /// No memory is allocated until the first node is.
    pub(crate) fn new(page_size: usize) -> Self {
        debug_assert!(page_size >= Self::MIN_PAGE_SIZE);

        Self {
            page_size,
            cursor: None,
            remaining: 0,
            pages: None,
            number_pages: 0,
        }
    }

    /// Returns the maximum number of bytes a single node may hold with this page size.
    pub(crate) const fn max_string_size(page_size: usize) -> usize {
        page_size - PAGE_HEADER_SIZE - Node::size_for(0)
    }

    /// Returns the number of pages allocated so far.
    pub(crate) fn number_pages(&self) -> usize {
        self.number_pages
    }

    /// Returns the number of bytes allocated so far.
    pub(crate) fn allocated_bytes(&self) -> usize {
        self.number_pages * self.page_size
    }

    /// Allocates and constructs a node.
    ///
    /// The node is fully constructed, with `next` as successor, but not yet reachable by anyone.
    ///
    /// #   Errors
    ///
    /// -   If `bytes` is longer than `max_string_size`, nothing is allocated.
    /// -   If a new page is necessary, and the provider fails to supply one.
    pub(crate) fn allocate_node<P>(
        &mut self,
        hash: u32,
        bytes: &[u8],
        next: Option<NonNull<Node>>,
        provider: &P,
    ) -> Result<NonNull<Node>, DictionaryError>
    where
        P: MemoryProvider,
    {
        let maximum = Self::max_string_size(self.page_size);

        if bytes.len() > maximum {
            return Err(DictionaryError::OversizedInput {
                length: bytes.len(),
                maximum,
            });
        }

        let size = Node::size_for(bytes.len());

        let pointer = match self.reserve(size) {
            Some(pointer) => pointer,
            None => {
                self.push_page(provider)?;

                //  A fresh page always fits a node of `max_string_size` bytes.
                self.reserve(size).ok_or(DictionaryError::AllocationFailure)?
            }
        };

        //  Safety:
        //  -   `pointer` is valid for writes of `size` bytes, exclusively reserved.
        //  -   `pointer` is aligned for `Node`.
        //  -   `bytes.len()` is less than `page_size`, which fits in a `u32`.
        let node = unsafe { Node::write(pointer, hash, bytes, next) };

        Ok(node)
    }

    /// Releases all pages, invalidating all nodes allocated so far.
    ///
    /// #   Safety
    ///
    /// -   This `provider` must have been used for all allocations of this instance.
    /// -   No node of this instance may be accessed afterwards.
    pub(crate) unsafe fn release<P>(&mut self, provider: &P)
    where
        P: MemoryProvider,
    {
        let layout = self.page_layout();

        let mut current = self.pages.take();

        while let Some(page) = current {
            //  Safety:
            //  -   `page` points to an initialized header, of a live page.
            current = unsafe { ptr::read(page.as_ptr()).next };

            //  Safety:
            //  -   `page` was allocated by `provider`, with `layout`, and is released only once.
            unsafe { provider.deallocate(page.cast(), layout) };
        }

        self.cursor = None;
        self.remaining = 0;
        self.number_pages = 0;
    }
}

impl fmt::Debug for Arena {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        f.debug_struct("Arena")
            .field("page_size", &self.page_size)
            .field("remaining", &self.remaining)
            .field("number_pages", &self.number_pages)
            .finish()
    }
}

//  Safety:
//  -   The arena exclusively owns its pages, and is only accessed through `&mut`.
unsafe impl Send for Arena {}

//
//  Implementation
//

//  Header of each page, linking it to the previously allocated page.
#[repr(C)]
struct PageHeader {
    next: Option<NonNull<PageHeader>>,
}

const PAGE_ALIGNMENT: usize = if mem::align_of::<PageHeader>() > Node::ALIGNMENT {
    mem::align_of::<PageHeader>()
} else {
    Node::ALIGNMENT
};

//  Offset of the first node within a page.
const PAGE_HEADER_SIZE: usize = mem::size_of::<PageHeader>().next_multiple_of(Node::ALIGNMENT);

impl Arena {
    fn page_layout(&self) -> Layout {
        //  Safety:
        //  -   `PAGE_ALIGNMENT` is a power of 2.
        //  -   `page_size` was validated at construction, and is nowhere near `isize::MAX`.
        unsafe { Layout::from_size_align_unchecked(self.page_size, PAGE_ALIGNMENT) }
    }

    //  Reserves `size` bytes, aligned for a node, within the current page.
    fn reserve(&mut self, size: usize) -> Option<NonNull<u8>> {
        let cursor = self.cursor?;

        let padding = cursor.as_ptr().align_offset(Node::ALIGNMENT);
        let needed = padding.checked_add(size)?;

        if needed > self.remaining {
            return None;
        }

        //  Safety:
        //  -   `cursor + needed` is within the current page, or one past its end.
        let (pointer, next) = unsafe { (cursor.add(padding), cursor.add(needed)) };

        self.cursor = Some(next);
        self.remaining -= needed;

        Some(pointer)
    }

    //  Allocates a new page, and makes it current.
    fn push_page<P>(&mut self, provider: &P) -> Result<(), DictionaryError>
    where
        P: MemoryProvider,
    {
        let layout = self.page_layout();

        let page: NonNull<PageHeader> = provider.allocate(layout)?.cast();

        //  Safety:
        //  -   `page` is valid for writes of `page_size` bytes, and aligned for `PageHeader`.
        unsafe { ptr::write(page.as_ptr(), PageHeader { next: self.pages }) };

        self.pages = Some(page);
        self.number_pages += 1;

        //  Safety:
        //  -   `PAGE_HEADER_SIZE` is less than `page_size`.
        self.cursor = Some(unsafe { page.cast::<u8>().add(PAGE_HEADER_SIZE) });
        self.remaining = self.page_size - PAGE_HEADER_SIZE;

        trace!(page_size = self.page_size, pages = self.number_pages, "arena page allocated");

        Ok(())
    }
}

// mod tests
