//  Handles to the interned values of a dictionary.

use std::{
    borrow::Borrow,
    cmp,
    ffi::CStr,
    fmt,
    hash::{Hash, Hasher},
    marker::PhantomData,
    ops::Deref,
    ptr::NonNull,
    str,
};

use crate::{dictionary, error::DictionaryError, node::Node};

/// A handle to an interned slice of bytes.
///
/// The handle is a single pointer to the bytes: copying it is free, and never touches the `Dictionary`. Two handles
/// obtained from interning equal bytes in the same `Dictionary` point to the very same storage.
///
/// The length is authoritative: embedded zero bytes are preserved. A zero byte is nonetheless stored after the last
/// byte, see `to_c_str`.
///
/// Comparisons are content-based, and thus meaningful across dictionaries. Use `ptr_eq` to compare storage.
#[derive(Clone, Copy)]
pub struct DictBytes<'a> {
    data: NonNull<u8>,
    _marker: PhantomData<&'a [u8]>,
}

impl<'a> DictBytes<'a> {
    /// Returns the interned bytes.
    pub fn as_bytes(&self) -> &'a [u8] {
        //  Safety:
        //  -   The node outlives `'a`.
        unsafe { Node::bytes(self.node()) }
    }

    /// Returns the number of bytes.
    pub fn len(&self) -> usize {
        self.header().len()
    }

    /// Returns whether there is any byte.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the hash computed by the `Dictionary` when interning these bytes, 0 for the empty value.
    ///
    /// #   Complexity
    ///
    /// O(1): the hash is stored alongside the bytes.
    pub fn hash_code(&self) -> u32 {
        self.header().hash()
    }

    /// Returns a pointer to the first byte.
    pub fn as_ptr(&self) -> *const u8 {
        self.data.as_ptr()
    }

    /// Returns whether both handles refer to the same storage.
    pub fn ptr_eq(this: &Self, other: &DictBytes<'_>) -> bool {
        this.data == other.data
    }

    /// Returns the bytes as a C string, or `None` if they contain a zero byte.
    pub fn to_c_str(&self) -> Option<&'a CStr> {
        //  Safety:
        //  -   The node outlives `'a`.
        let bytes = unsafe { Node::bytes_with_terminator(self.node()) };

        CStr::from_bytes_with_nul(bytes).ok()
    }

    /// Returns the bytes as a string handle, or `None` if they are not valid UTF-8.
    pub fn to_str(&self) -> Option<DictStr<'a>> {
        str::from_utf8(self.as_bytes()).ok()?;

        //  Safety:
        //  -   The bytes were just checked.
        Some(unsafe { DictStr::from_dict_bytes(*self) })
    }
}

//  Crate methods
impl<'a> DictBytes<'a> {
    /// Creates a handle to the bytes of `node`.
    ///
    /// #   Safety
    ///
    /// `node` must be the empty sentinel, or a node allocated by a dictionary outliving `'a`.
    pub(crate) unsafe fn from_node(node: NonNull<Node>) -> Self {
        //  Safety:
        //  -   `node` is a node.
        let data = unsafe { Node::data(node) };

        Self {
            data,
            _marker: PhantomData,
        }
    }

    fn node(&self) -> NonNull<Node> {
        //  Safety:
        //  -   `self.data` was obtained from `Node::data`.
        unsafe { Node::from_data(self.data) }
    }

    fn header(&self) -> &'a Node {
        //  Safety:
        //  -   The node outlives `'a`.
        unsafe { Node::header(self.node()) }
    }
}

impl Default for DictBytes<'_> {
    fn default() -> Self {
        //  Safety:
        //  -   The sentinel is static.
        unsafe { Self::from_node(Node::empty()) }
    }
}

impl Deref for DictBytes<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.as_bytes()
    }
}

impl AsRef<[u8]> for DictBytes<'_> {
    fn as_ref(&self) -> &[u8] {
        self.as_bytes()
    }
}

impl Borrow<[u8]> for DictBytes<'_> {
    fn borrow(&self) -> &[u8] {
        self.as_bytes()
    }
}

impl fmt::Debug for DictBytes<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        match str::from_utf8(self.as_bytes()) {
            Ok(string) => write!(f, "{string:?}"),
            Err(_) => write!(f, "{:x?}", self.as_bytes()),
        }
    }
}

impl Eq for DictBytes<'_> {}

impl<'b> PartialEq<DictBytes<'b>> for DictBytes<'_> {
    fn eq(&self, other: &DictBytes<'b>) -> bool {
        Self::ptr_eq(self, other) || self.as_bytes() == other.as_bytes()
    }
}

impl PartialEq<[u8]> for DictBytes<'_> {
    fn eq(&self, other: &[u8]) -> bool {
        self.as_bytes() == other
    }
}

impl PartialEq<&[u8]> for DictBytes<'_> {
    fn eq(&self, other: &&[u8]) -> bool {
        self.as_bytes() == *other
    }
}

impl PartialEq<Vec<u8>> for DictBytes<'_> {
    fn eq(&self, other: &Vec<u8>) -> bool {
        self.as_bytes() == &other[..]
    }
}

impl PartialEq<DictBytes<'_>> for [u8] {
    fn eq(&self, other: &DictBytes<'_>) -> bool {
        self == other.as_bytes()
    }
}

impl PartialEq<DictBytes<'_>> for &[u8] {
    fn eq(&self, other: &DictBytes<'_>) -> bool {
        *self == other.as_bytes()
    }
}

impl Ord for DictBytes<'_> {
    fn cmp(&self, other: &Self) -> cmp::Ordering {
        self.as_bytes().cmp(other.as_bytes())
    }
}

impl<'b> PartialOrd<DictBytes<'b>> for DictBytes<'_> {
    fn partial_cmp(&self, other: &DictBytes<'b>) -> Option<cmp::Ordering> {
        Some(self.as_bytes().cmp(other.as_bytes()))
    }
}

impl PartialOrd<[u8]> for DictBytes<'_> {
    fn partial_cmp(&self, other: &[u8]) -> Option<cmp::Ordering> {
        Some(self.as_bytes().cmp(other))
    }
}

//  Consistent with `Borrow<[u8]>`, the stored hash is available through `hash_code`.
impl Hash for DictBytes<'_> {
    fn hash<S: Hasher>(&self, state: &mut S) {
        self.as_bytes().hash(state)
    }
}

//  Safety:
//  -   The referenced bytes are immutable, and live as long as `'a`.
unsafe impl Send for DictBytes<'_> {}
unsafe impl Sync for DictBytes<'_> {}

/// A handle to an interned string.
///
/// A `DictStr` is a `DictBytes` known to contain valid UTF-8, see `DictBytes` for its properties.
///
/// `DictStr<'static>` handles are obtained from the process-wide `Dictionary`, with `DictStr::new` or `try_from`.
#[derive(Clone, Copy, Default, Eq, Ord)]
pub struct DictStr<'a>(DictBytes<'a>);

impl DictStr<'static> {
    /// Interns `text` in the process-wide `Dictionary`.
    ///
    /// Interning previously seen text always resolves to the same storage.
    ///
    /// #   Errors
    ///
    /// If `text` is longer than the maximum storable size, or memory cannot be allocated.
    pub fn new(text: &str) -> Result<Self, DictionaryError> {
        dictionary::global().intern(text)
    }
}

impl<'a> DictStr<'a> {
    /// Creates an instance from a `DictBytes`.
    ///
    /// #   Safety
    ///
    /// The `DictBytes` must point to a valid UTF-8 encoded slice of bytes.
    pub unsafe fn from_dict_bytes(bytes: DictBytes<'a>) -> Self {
        Self(bytes)
    }

    /// Returns the interned string.
    pub fn as_str(&self) -> &'a str {
        //  Safety:
        //  -   A `DictStr` only refers to valid UTF-8.
        unsafe { str::from_utf8_unchecked(self.0.as_bytes()) }
    }

    /// Returns the interned bytes.
    pub fn as_bytes(&self) -> &'a [u8] {
        self.0.as_bytes()
    }

    /// Returns as `DictBytes`.
    pub fn as_dict_bytes(&self) -> DictBytes<'a> {
        self.0
    }

    /// Returns the length of the string, in bytes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns whether the string is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the hash computed by the `Dictionary` when interning this string, in O(1).
    pub fn hash_code(&self) -> u32 {
        self.0.hash_code()
    }

    /// Returns a pointer to the first byte of the string.
    pub fn as_ptr(&self) -> *const u8 {
        self.0.as_ptr()
    }

    /// Returns whether both handles refer to the same storage.
    pub fn ptr_eq(this: &Self, other: &DictStr<'_>) -> bool {
        DictBytes::ptr_eq(&this.0, &other.0)
    }

    /// Returns the string as a C string, or `None` if it contains a NUL character.
    pub fn to_c_str(&self) -> Option<&'a CStr> {
        self.0.to_c_str()
    }

    /// Resets the handle to the empty string.
    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

impl TryFrom<&str> for DictStr<'static> {
    type Error = DictionaryError;

    fn try_from(text: &str) -> Result<Self, DictionaryError> {
        Self::new(text)
    }
}

impl<'a> From<DictStr<'a>> for DictBytes<'a> {
    fn from(string: DictStr<'a>) -> Self {
        string.0
    }
}

impl Deref for DictStr<'_> {
    type Target = str;

    fn deref(&self) -> &str {
        self.as_str()
    }
}

impl AsRef<str> for DictStr<'_> {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl AsRef<[u8]> for DictStr<'_> {
    fn as_ref(&self) -> &[u8] {
        self.as_bytes()
    }
}

impl Borrow<str> for DictStr<'_> {
    fn borrow(&self) -> &str {
        self.as_str()
    }
}

impl fmt::Debug for DictStr<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        write!(f, "{:?}", self.as_str())
    }
}

impl fmt::Display for DictStr<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        f.write_str(self.as_str())
    }
}

impl<'b> PartialEq<DictStr<'b>> for DictStr<'_> {
    fn eq(&self, other: &DictStr<'b>) -> bool {
        self.0 == other.0
    }
}

impl PartialEq<str> for DictStr<'_> {
    fn eq(&self, other: &str) -> bool {
        self.as_str() == other
    }
}

impl PartialEq<&str> for DictStr<'_> {
    fn eq(&self, other: &&str) -> bool {
        self.as_str() == *other
    }
}

impl PartialEq<String> for DictStr<'_> {
    fn eq(&self, other: &String) -> bool {
        self.as_str() == other.as_str()
    }
}

impl PartialEq<DictStr<'_>> for str {
    fn eq(&self, other: &DictStr<'_>) -> bool {
        self == other.as_str()
    }
}

impl PartialEq<DictStr<'_>> for &str {
    fn eq(&self, other: &DictStr<'_>) -> bool {
        *self == other.as_str()
    }
}

impl PartialEq<DictStr<'_>> for String {
    fn eq(&self, other: &DictStr<'_>) -> bool {
        self.as_str() == other.as_str()
    }
}

impl<'b> PartialOrd<DictStr<'b>> for DictStr<'_> {
    fn partial_cmp(&self, other: &DictStr<'b>) -> Option<cmp::Ordering> {
        Some(self.as_str().cmp(other.as_str()))
    }
}

impl PartialOrd<str> for DictStr<'_> {
    fn partial_cmp(&self, other: &str) -> Option<cmp::Ordering> {
        Some(self.as_str().cmp(other))
    }
}

impl PartialOrd<&str> for DictStr<'_> {
    fn partial_cmp(&self, other: &&str) -> Option<cmp::Ordering> {
        Some(self.as_str().cmp(*other))
    }
}

impl PartialOrd<DictStr<'_>> for str {
    fn partial_cmp(&self, other: &DictStr<'_>) -> Option<cmp::Ordering> {
        Some(self.cmp(other.as_str()))
    }
}

impl PartialOrd<DictStr<'_>> for &str {
    fn partial_cmp(&self, other: &DictStr<'_>) -> Option<cmp::Ordering> {
        Some((*self).cmp(other.as_str()))
    }
}

//  Consistent with `Borrow<str>`.
impl Hash for DictStr<'_> {
    fn hash<S: Hasher>(&self, state: &mut S) {
        self.as_str().hash(state)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::{BTreeSet, HashMap};

    use crate::dictionary::Dictionary;

    use super::*;

    fn ensure_send<T: Send>() {}
    fn ensure_sync<T: Sync>() {}

    #[test]
    fn handles_send_sync() {
        ensure_send::<DictBytes<'static>>();
        ensure_sync::<DictBytes<'static>>();
        ensure_send::<DictStr<'static>>();
        ensure_sync::<DictStr<'static>>();
    }

    #[test]
    fn handle_is_a_pointer() {
        assert_eq!(std::mem::size_of::<*const u8>(), std::mem::size_of::<DictStr<'static>>());
        assert_eq!(
            std::mem::size_of::<*const u8>(),
            std::mem::size_of::<Option<DictStr<'static>>>()
        );
    }

    #[test]
    fn default_is_empty() {
        let bytes = DictBytes::default();
        let string = DictStr::default();

        assert!(bytes.is_empty());
        assert!(string.is_empty());
        assert_eq!(0, string.len());
        assert_eq!(0, string.hash_code());
        assert_eq!("", string.as_str());
        assert_eq!(c"", string.to_c_str().unwrap());

        assert!(DictStr::ptr_eq(&string, &DictStr::default()));
    }

    #[test]
    fn empty_interning_is_default() {
        let dictionary = Dictionary::new();

        let interned = dictionary.intern("").unwrap();

        assert_eq!(DictStr::default(), interned);
        assert!(DictStr::ptr_eq(&DictStr::default(), &interned));
        assert_eq!(0, dictionary.statistics().allocated_bytes);
    }

    #[test]
    fn comparisons() {
        let dictionary = Dictionary::new();

        let apple = dictionary.intern("apple").unwrap();
        let banana = dictionary.intern("banana").unwrap();

        assert_eq!(apple, "apple");
        assert_eq!("apple", apple);
        assert_eq!(apple, String::from("apple"));
        assert_ne!(apple, banana);

        assert!(apple < banana);
        assert!(apple < "apples");
        assert!("a" < apple);
        assert!(DictStr::default() < apple);

        let sorted: BTreeSet<_> = [banana, apple, banana].into_iter().collect();
        let sorted: Vec<_> = sorted.into_iter().map(|s| s.as_str()).collect();

        assert_eq!(vec!["apple", "banana"], sorted);
    }

    #[test]
    fn cross_dictionary_equality() {
        let first = Dictionary::new();
        let second = Dictionary::new();

        let a = first.intern("shared").unwrap();
        let b = second.intern("shared").unwrap();

        assert_eq!(a, b);
        assert!(!DictStr::ptr_eq(&a, &b));
    }

    #[test]
    fn borrow_lookup() {
        let dictionary = Dictionary::new();

        let mut counts = HashMap::new();

        for word in ["to", "be", "or", "not", "to", "be"] {
            *counts.entry(dictionary.intern(word).unwrap()).or_insert(0) += 1;
        }

        assert_eq!(Some(&2), counts.get("to"));
        assert_eq!(Some(&1), counts.get("not"));
        assert_eq!(None, counts.get("question"));
    }

    #[test]
    fn embedded_zeroes() {
        let dictionary = Dictionary::new();

        let bytes = dictionary.intern_bytes(b"a\0b\0").unwrap();

        assert_eq!(4, bytes.len());
        assert_eq!(b"a\0b\0", bytes.as_bytes());
        assert_eq!(None, bytes.to_c_str());

        let other = dictionary.intern_bytes(b"a").unwrap();

        assert_ne!(bytes, other);
        assert_eq!(c"a", other.to_c_str().unwrap());
    }

    #[test]
    fn bytes_to_str() {
        let dictionary = Dictionary::new();

        let valid = dictionary.intern_bytes("héllo".as_bytes()).unwrap();
        let invalid = dictionary.intern_bytes(&[0xFF, 0xFE]).unwrap();

        let string = valid.to_str().unwrap();

        assert_eq!("héllo", string);
        assert!(DictBytes::ptr_eq(&valid, &string.as_dict_bytes()));
        assert!(invalid.to_str().is_none());

        assert_eq!("\"héllo\"", format!("{valid:?}"));
        assert_eq!("[ff, fe]", format!("{invalid:?}"));
    }

    #[test]
    fn display_and_clear() {
        let dictionary = Dictionary::new();

        let mut string = dictionary.intern("Mama mia!").unwrap();

        assert_eq!("Mama mia!", string.to_string());
        assert_eq!("\"Mama mia!\"", format!("{string:?}"));

        string.clear();

        assert!(string.is_empty());
        assert_eq!("", string.to_string());
    }

    #[test]
    fn global_handles() {
        let a = DictStr::new("global handle").unwrap();
        let b = DictStr::try_from("global handle").unwrap();

        assert!(DictStr::ptr_eq(&a, &b));
        assert_eq!(a.hash_code(), b.hash_code());
    }
} // mod tests
