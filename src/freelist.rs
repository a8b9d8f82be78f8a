use std::{marker::PhantomData, ptr::NonNull};

use crate::block::Header;


/// Non-null pointer to `T`.
pub(crate) type Link<T> = Option<NonNull<T>>;

/// Singly linked list of free blocks.
///
/// The list is intrusive: the [`Header`] of each free block is the list node,
/// so keeping track of a free block costs no memory besides its header.
///
/// ```text
///  head
///   |
///   v
/// +--------+    +--------+    +--------+    +----------+
/// | Header | -> | Header | -> | Header | -> | sentinel | -> None
/// +--------+    +--------+    +--------+    +----------+
/// ```
///
/// The sentinel is a zero sized header that is inserted first and can never
/// satisfy a request, so it never leaves the list and always stays at the tail.
/// It lives outside of any region, in its own boxed slot, so the list can be
/// moved around freely.
///
/// Inserting pushes at the front, there is no ordering among free blocks.
pub(crate) struct FreeList {
    head: NonNull<Header>,
    sentinel: NonNull<Header>,
    /// Number of free blocks, the sentinel excluded.
    len: usize,
}

pub(crate) struct Iter<'a> {
    current: NonNull<Header>,
    sentinel: NonNull<Header>,
    marker: PhantomData<&'a FreeList>,
}

impl FreeList {
    /// Creates an empty list: the head points at the sentinel.
    pub fn new() -> Self {
        let sentinel = NonNull::from(Box::leak(Box::new(Header::sentinel())));

        Self {
            head: sentinel,
            sentinel,
            len: 0,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn head(&self) -> NonNull<Header> {
        self.head
    }

    #[cfg(test)]
    pub fn sentinel(&self) -> NonNull<Header> {
        self.sentinel
    }

    #[inline]
    pub fn is_sentinel(&self, header: NonNull<Header>) -> bool {
        header == self.sentinel
    }

    /// Pushes `header` at the front of the list.
    ///
    /// **SAFETY**: `header` must point to a valid header of a block the list
    /// does not know about yet. Its `next` has to be empty.
    pub unsafe fn insert(&mut self, mut header: NonNull<Header>) {
        unsafe {
            debug_assert!(header.as_ref().next.is_none(), "block is already linked");

            header.as_mut().next = Some(self.head);
        }

        self.head = header;
        self.len += 1;
    }

    /// Unlinks `header` given its predecessor `prev` (`None` when `header`
    /// is the head) and clears its link.
    ///
    /// **SAFETY**: `header` must be in the list and `prev` must be exactly the
    /// node that precedes it.
    pub unsafe fn remove(&mut self, mut header: NonNull<Header>, prev: Link<Header>) {
        debug_assert!(!self.is_sentinel(header), "the sentinel never leaves the list");

        unsafe {
            let next = header.as_ref().next;

            match prev {
                Some(mut prev) => {
                    debug_assert_eq!(prev.as_ref().next, Some(header));
                    prev.as_mut().next = next;
                }
                None => {
                    debug_assert_eq!(self.head, header);
                    self.head = next.unwrap_or(self.sentinel);
                }
            }

            header.as_mut().next = None;
        }

        self.len -= 1;
    }

    /// Returns the block that best fits `size` together with its predecessor.
    ///
    /// This goes through the whole list once and keeps the smallest block that
    /// is at least `size` bytes long. On ties the block found first wins, so a
    /// perfect fit is only beaten by an earlier perfect fit.
    pub fn best_fit(&self, size: usize) -> Option<(NonNull<Header>, Link<Header>)> {
        let mut best: Option<(NonNull<Header>, Link<Header>)> = None;
        let mut best_size = usize::MAX;

        let mut prev: Link<Header> = None;
        let mut current = Some(self.head);

        while let Some(node) = current {
            unsafe {
                let node_size = node.as_ref().size;

                if node_size >= size && node_size < best_size {
                    best = Some((node, prev));
                    best_size = node_size;
                }

                prev = Some(node);
                current = node.as_ref().next;
            }
        }

        best
    }

    /// Whether `header` is currently linked in this list.
    pub fn contains(&self, header: NonNull<Header>) -> bool {
        self.iter().any(|node| node == header)
    }

    /// Iterates over the free blocks in list order, the sentinel excluded.
    pub fn iter(&self) -> Iter<'_> {
        Iter {
            current: self.head,
            sentinel: self.sentinel,
            marker: PhantomData,
        }
    }
}

impl Drop for FreeList {
    fn drop(&mut self) {
        // SAFETY: the sentinel was leaked from a box in `FreeList::new` and
        // nothing else frees it.
        unsafe { drop(Box::from_raw(self.sentinel.as_ptr())) }
    }
}

impl<'a> Iterator for Iter<'a> {
    type Item = NonNull<Header>;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.current;

        if node == self.sentinel {
            return None;
        }

        unsafe {
            self.current = node.as_ref().next.unwrap_or(self.sentinel);
        }

        Some(node)
    }
}

impl<'a> IntoIterator for &'a FreeList {
    type Item = NonNull<Header>;
    type IntoIter = Iter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::HEADER_SIZE;

    /// Backing storage for a handful of hand made headers.
    struct Blocks {
        storage: Vec<u64>,
    }

    impl Blocks {
        fn new(count: usize) -> Self {
            Self { storage: vec![0; count * HEADER_SIZE / 8] }
        }

        fn header(&mut self, index: usize, size: usize) -> NonNull<Header> {
            let addr = NonNull::from(&mut self.storage[index * HEADER_SIZE / 8]).cast();
            unsafe { Header::write(addr, size) }
        }
    }

    fn sizes(list: &FreeList) -> Vec<usize> {
        list.iter().map(|node| unsafe { node.as_ref().size }).collect()
    }

    #[test]
    fn new_list_is_empty() {
        let list = FreeList::new();

        assert_eq!(list.len(), 0);
        assert!(list.is_empty());
        assert!(list.iter().next().is_none());
        assert_eq!(list.head(), list.sentinel());
        unsafe {
            assert_eq!(0, list.sentinel().as_ref().size);
            assert!(list.sentinel().as_ref().next.is_none());
        }
    }

    #[test]
    fn sentinel_never_fits() {
        let list = FreeList::new();

        assert!(list.best_fit(8).is_none());
    }

    #[test]
    fn insert_pushes_at_the_front() {
        let mut blocks = Blocks::new(3);
        let mut list = FreeList::new();

        unsafe {
            list.insert(blocks.header(0, 16));
            list.insert(blocks.header(1, 64));
            list.insert(blocks.header(2, 32));
        }

        assert_eq!(vec![32, 64, 16], sizes(&list));
        assert_eq!(3, list.len());
    }

    #[test]
    fn best_fit_prefers_the_smallest_block() {
        let mut blocks = Blocks::new(3);
        let mut list = FreeList::new();

        let small = blocks.header(0, 16);
        let big = blocks.header(1, 64);
        let medium = blocks.header(2, 32);

        unsafe {
            list.insert(small);
            list.insert(big);
            list.insert(medium);
        }

        let (found, prev) = list.best_fit(16).unwrap();
        assert_eq!(small, found);
        assert_eq!(Some(big), prev);

        let (found, prev) = list.best_fit(24).unwrap();
        assert_eq!(medium, found);
        assert_eq!(None, prev);

        assert_eq!(big, list.best_fit(40).unwrap().0);
        assert!(list.best_fit(72).is_none());
    }

    #[test]
    fn best_fit_ties_go_to_the_first_block() {
        let mut blocks = Blocks::new(2);
        let mut list = FreeList::new();

        let older = blocks.header(0, 32);
        let newer = blocks.header(1, 32);

        unsafe {
            list.insert(older);
            list.insert(newer);
        }

        assert_eq!(newer, list.best_fit(32).unwrap().0);
    }

    #[test]
    fn remove_head_and_middle() {
        let mut blocks = Blocks::new(3);
        let mut list = FreeList::new();

        let a = blocks.header(0, 8);
        let b = blocks.header(1, 16);
        let c = blocks.header(2, 24);

        unsafe {
            list.insert(a);
            list.insert(b);
            list.insert(c);

            // c -> b -> a
            list.remove(b, Some(c));
            assert!(b.as_ref().next.is_none());
            assert_eq!(vec![24, 8], sizes(&list));

            list.remove(c, None);
            assert_eq!(vec![8], sizes(&list));
            assert_eq!(a, list.head());

            list.remove(a, None);
        }

        assert!(list.is_empty());
        assert_eq!(list.sentinel(), list.head());
    }

    #[test]
    fn contains_only_linked_blocks() {
        let mut blocks = Blocks::new(2);
        let mut list = FreeList::new();

        let linked = blocks.header(0, 8);
        let unlinked = blocks.header(1, 8);

        unsafe { list.insert(linked) };

        assert!(list.contains(linked));
        assert!(!list.contains(unlinked));
        assert!(!list.contains(list.sentinel()));
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "block is already linked")]
    fn inserting_a_linked_block_panics() {
        let mut blocks = Blocks::new(1);
        let mut list = FreeList::new();

        let header = blocks.header(0, 16);

        unsafe {
            list.insert(header);
            list.insert(header);
        }
    }
}
