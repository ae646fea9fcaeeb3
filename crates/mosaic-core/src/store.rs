//! Offset-ordered fragment store.
//!
//! An unbalanced binary search tree keyed by fragment offset. Its lifetime
//! and size are scoped to a single message, so the O(n) worst case on sorted
//! arrival is accepted. Insertion, traversal, and drop are all iterative:
//! a degenerate tree is a linked list and must not exhaust the stack.

use crate::wire::Fragment;

struct Node {
    fragment: Fragment,
    left: Link,
    right: Link,
}

type Link = Option<Box<Node>>;

/// Fragments of one message, ordered by offset.
#[derive(Default)]
pub struct OrderedFragments {
    root: Link,
    len: usize,
}

impl OrderedFragments {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `fragment` at its offset.
    ///
    /// An equal offset is a no-op: the first fragment stored at an offset is
    /// kept and `false` is returned. Callers are expected to filter duplicates
    /// before getting here.
    pub fn insert(&mut self, fragment: Fragment) -> bool {
        let key = fragment.offset();
        let mut link = &mut self.root;
        while let Some(node) = link {
            let here = node.fragment.offset();
            if key < here {
                link = &mut node.left;
            } else if key > here {
                link = &mut node.right;
            } else {
                return false;
            }
        }
        *link = Some(Box::new(Node {
            fragment,
            left: None,
            right: None,
        }));
        self.len += 1;
        true
    }

    /// All stored fragments in ascending offset order.
    ///
    /// Recomputed by in-order traversal on every call; nothing is cached.
    pub fn ordered(&self) -> Vec<&Fragment> {
        let mut out = Vec::with_capacity(self.len);
        let mut stack: Vec<&Node> = Vec::new();
        let mut cursor = self.root.as_deref();
        loop {
            while let Some(node) = cursor {
                stack.push(node);
                cursor = node.left.as_deref();
            }
            let Some(node) = stack.pop() else { break };
            out.push(&node.fragment);
            cursor = node.right.as_deref();
        }
        out
    }

    pub fn contains(&self, offset: u32) -> bool {
        let mut cursor = self.root.as_deref();
        while let Some(node) = cursor {
            let here = node.fragment.offset();
            cursor = if offset < here {
                node.left.as_deref()
            } else if offset > here {
                node.right.as_deref()
            } else {
                return true;
            };
        }
        false
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl Drop for OrderedFragments {
    fn drop(&mut self) {
        let mut pending: Vec<Box<Node>> = self.root.take().into_iter().collect();
        while let Some(mut node) = pending.pop() {
            pending.extend(node.left.take());
            pending.extend(node.right.take());
        }
    }
}

impl std::fmt::Debug for OrderedFragments {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.ordered().iter().map(|frag| (frag.offset(), frag.data_length())))
            .finish()
    }
}
