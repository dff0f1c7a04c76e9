//  A node of the dictionary: a fixed header, immediately followed by the bytes of the string and a terminating 0.
//
//  The layout is load-bearing: a handle only points to the bytes, and recovers the header by stepping back by
//  `HEADER_SIZE` bytes. All pointer arithmetic relying on this layout is confined to this module.

use std::{
    mem,
    ptr::{self, NonNull},
    slice,
    sync::atomic::{AtomicPtr, Ordering},
};

/// Header of a node, the bytes follow immediately.
#[repr(C)]
pub(crate) struct Node {
    //  Only ever written once per splice, with a single store.
    next: AtomicPtr<Node>,
    hash: u32,
    length: u32,
}

impl Node {
    /// Size of the header, and offset of the bytes from the start of the node.
    pub(crate) const HEADER_SIZE: usize = mem::size_of::<Node>();

    /// Alignment of a node.
    pub(crate) const ALIGNMENT: usize = mem::align_of::<Node>();

    /// Returns the number of bytes occupied by a node holding `length` bytes, terminator included.
    pub(crate) const fn size_for(length: usize) -> usize {
        Self::HEADER_SIZE + length + 1
    }

    /// Returns the hash of the bytes.
    pub(crate) fn hash(&self) -> u32 {
        self.hash
    }

    /// Returns the number of bytes, terminator excluded.
    pub(crate) fn len(&self) -> usize {
        self.length as usize
    }

    /// Returns the next node of the chain, if any.
    pub(crate) fn next(&self) -> Option<NonNull<Node>> {
        NonNull::new(self.next.load(Ordering::Acquire))
    }

    /// Links `next` after this node.
    ///
    /// `next` must be fully initialized: the store publishes it to lock-free readers.
    pub(crate) fn set_next(&self, next: Option<NonNull<Node>>) {
        self.next.store(as_raw(next), Ordering::Release);
    }

    /// Constructs a node at `pointer`, copying `bytes` and appending the terminator.
    ///
    /// #   Safety
    ///
    /// -   `pointer` must be valid for writes of `Node::size_for(bytes.len())` bytes.
    /// -   `pointer` must be aligned to `Node::ALIGNMENT`.
    /// -   `bytes.len()` must fit in a `u32`.
    pub(crate) unsafe fn write(
        pointer: NonNull<u8>,
        hash: u32,
        bytes: &[u8],
        next: Option<NonNull<Node>>,
    ) -> NonNull<Node> {
        debug_assert_eq!(0, pointer.as_ptr() as usize % Self::ALIGNMENT);
        debug_assert!(u32::try_from(bytes.len()).is_ok());

        let node: NonNull<Node> = pointer.cast();

        let header = Node {
            next: AtomicPtr::new(as_raw(next)),
            hash,
            length: bytes.len() as u32,
        };

        //  Safety:
        //  -   `node` is valid for writes, and aligned, as per pre-conditions.
        unsafe { ptr::write(node.as_ptr(), header) };

        //  Safety:
        //  -   `node` points to the start of a block of `Node::size_for(bytes.len())` bytes.
        let data = unsafe { Self::data(node) };

        //  Safety:
        //  -   `data` is valid for writes of `bytes.len() + 1` bytes.
        //  -   `bytes` cannot overlap with a freshly reserved block.
        unsafe {
            ptr::copy_nonoverlapping(bytes.as_ptr(), data.as_ptr(), bytes.len());
            ptr::write(data.as_ptr().add(bytes.len()), 0);
        }

        node
    }

    /// Returns a pointer to the bytes of the node.
    ///
    /// #   Safety
    ///
    /// `node` must point to a node, constructed by `write` or the empty sentinel.
    pub(crate) unsafe fn data(node: NonNull<Node>) -> NonNull<u8> {
        //  Safety:
        //  -   The bytes are part of the same block as the header.
        unsafe { node.cast::<u8>().add(Self::HEADER_SIZE) }
    }

    /// Recovers the node from a pointer to its bytes.
    ///
    /// #   Safety
    ///
    /// `data` must have been obtained from `Node::data`.
    pub(crate) unsafe fn from_data(data: NonNull<u8>) -> NonNull<Node> {
        //  Safety:
        //  -   The header immediately precedes the bytes, within the same block.
        unsafe { data.sub(Self::HEADER_SIZE).cast() }
    }

    /// Returns a reference to the header.
    ///
    /// #   Safety
    ///
    /// `node` must point to a node which outlives `'a`.
    pub(crate) unsafe fn header<'a>(node: NonNull<Node>) -> &'a Node {
        //  Safety:
        //  -   `node` is aligned, dereferenceable, and initialized as per pre-conditions.
        //  -   Only `next` is ever mutated after construction, through an atomic.
        unsafe { node.as_ref() }
    }

    /// Returns the bytes of the node, terminator excluded.
    ///
    /// #   Safety
    ///
    /// `node` must point to a node which outlives `'a`.
    pub(crate) unsafe fn bytes<'a>(node: NonNull<Node>) -> &'a [u8] {
        //  Safety:
        //  -   `node` points to a live node.
        let (data, length) = unsafe { (Self::data(node), Self::header(node).len()) };

        //  Safety:
        //  -   `data` is valid for reads of `length` initialized bytes, never mutated after construction.
        unsafe { slice::from_raw_parts(data.as_ptr(), length) }
    }

    /// Returns the bytes of the node, terminator included.
    ///
    /// #   Safety
    ///
    /// `node` must point to a node which outlives `'a`.
    pub(crate) unsafe fn bytes_with_terminator<'a>(node: NonNull<Node>) -> &'a [u8] {
        //  Safety:
        //  -   `node` points to a live node.
        let (data, length) = unsafe { (Self::data(node), Self::header(node).len()) };

        //  Safety:
        //  -   The terminator is written right after the bytes.
        unsafe { slice::from_raw_parts(data.as_ptr(), length + 1) }
    }

    /// Returns the statically allocated empty node.
    pub(crate) fn empty() -> NonNull<Node> {
        NonNull::from(&EMPTY).cast()
    }
}

/// Returns the key ordering the nodes of a chain: the bit-reversed hash.
///
/// Ordering chains by this key keeps all nodes of a bucket contiguous at every table size, so that a bucket can be
/// split by merely pointing at the suffix of its chain.
pub(crate) fn split_order_key(hash: u32) -> u32 {
    hash.reverse_bits()
}

//
//  Implementation
//

//  The empty sentinel, laid out as a node holding no byte.
#[repr(C)]
struct EmptyNode {
    node: Node,
    terminator: u8,
}

static EMPTY: EmptyNode = EmptyNode {
    node: Node {
        next: AtomicPtr::new(ptr::null_mut()),
        hash: 0,
        length: 0,
    },
    terminator: 0,
};

fn as_raw(node: Option<NonNull<Node>>) -> *mut Node {
    node.map_or(ptr::null_mut(), NonNull::as_ptr)
}

// mod tests
