#![forbid(unsafe_code)]

//! Singly-linked list backed by a pooled slot arena.
//!
//! The runtime uses the same list for two jobs:
//!
//! - a LIFO stack ([`push`](LinkedList::push) / [`shift`](LinkedList::shift) /
//!   [`peek`](LinkedList::peek)) for the processor call stack and the
//!   processing-context stack;
//! - a priority queue ([`insert`](LinkedList::insert) / `shift`) for the
//!   reconciliation queue.
//!
//! # Invariants
//!
//! 1. `len()` equals the number of items reachable from the head.
//! 2. Released slots are chained on a free list and reused before the arena
//!    grows, so a list that oscillates around N items allocates N slots.
//! 3. Iteration order is head to tail.

/// One arena slot. `item` is `None` while the slot sits on the free list.
#[derive(Debug)]
struct Slot<T> {
    item: Option<T>,
    next: Option<usize>,
}

/// Pooled singly-linked list.
#[derive(Debug)]
pub struct LinkedList<T> {
    slots: Vec<Slot<T>>,
    head: Option<usize>,
    free: Option<usize>,
    len: usize,
}

impl<T> Default for LinkedList<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> LinkedList<T> {
    /// Create an empty list.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            slots: Vec::new(),
            head: None,
            free: None,
            len: 0,
        }
    }

    /// Number of items in the list.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the list holds no item.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of slots ever allocated (live + pooled).
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Push an item at the head of the list.
    pub fn push(&mut self, item: T) {
        let head = self.head;
        let idx = self.alloc(item, head);
        self.head = Some(idx);
    }

    /// Remove and return the head item.
    pub fn shift(&mut self) -> Option<T> {
        let idx = self.head?;
        self.head = self.slots[idx].next;
        self.release(idx)
    }

    /// Head item, if any.
    #[must_use]
    pub fn peek(&self) -> Option<&T> {
        self.head.and_then(|idx| self.slots[idx].item.as_ref())
    }

    /// Insert an item before the first element for which `before` returns
    /// true; append at the tail if there is none.
    pub fn insert(&mut self, item: T, mut before: impl FnMut(&T, &T) -> bool) {
        let mut prev: Option<usize> = None;
        let mut cursor = self.head;
        while let Some(idx) = cursor {
            let Some(existing) = self.slots[idx].item.as_ref() else {
                break;
            };
            if before(&item, existing) {
                break;
            }
            prev = Some(idx);
            cursor = self.slots[idx].next;
        }
        let idx = self.alloc(item, cursor);
        match prev {
            Some(p) => self.slots[p].next = Some(idx),
            None => self.head = Some(idx),
        }
    }

    /// Remove the first item matching `pred` and return it.
    pub fn remove_first(&mut self, mut pred: impl FnMut(&T) -> bool) -> Option<T> {
        let mut prev: Option<usize> = None;
        let mut cursor = self.head;
        while let Some(idx) = cursor {
            let matches = self.slots[idx].item.as_ref().is_some_and(&mut pred);
            let next = self.slots[idx].next;
            if matches {
                match prev {
                    Some(p) => self.slots[p].next = next,
                    None => self.head = next,
                }
                return self.release(idx);
            }
            prev = Some(idx);
            cursor = next;
        }
        None
    }

    /// Whether any item matches `pred`.
    pub fn contains(&self, pred: impl FnMut(&T) -> bool) -> bool {
        self.iter().any(pred)
    }

    /// Drop every item; slots stay pooled.
    pub fn clear(&mut self) {
        while self.shift().is_some() {}
    }

    /// Iterate from head to tail.
    pub fn iter(&self) -> Iter<'_, T> {
        Iter {
            list: self,
            cursor: self.head,
        }
    }

    fn alloc(&mut self, item: T, next: Option<usize>) -> usize {
        self.len += 1;
        match self.free {
            Some(idx) => {
                let slot = &mut self.slots[idx];
                self.free = slot.next;
                slot.item = Some(item);
                slot.next = next;
                idx
            }
            None => {
                self.slots.push(Slot {
                    item: Some(item),
                    next,
                });
                self.slots.len() - 1
            }
        }
    }

    fn release(&mut self, idx: usize) -> Option<T> {
        self.len -= 1;
        let free = self.free;
        let slot = &mut self.slots[idx];
        slot.next = free;
        self.free = Some(idx);
        slot.item.take()
    }
}

/// Head-to-tail iterator over a [`LinkedList`].
pub struct Iter<'a, T> {
    list: &'a LinkedList<T>,
    cursor: Option<usize>,
}

impl<'a, T> Iterator for Iter<'a, T> {
    type Item = &'a T;

    fn next(&mut self) -> Option<Self::Item> {
        let idx = self.cursor?;
        let slot = &self.list.slots[idx];
        self.cursor = slot.next;
        slot.item.as_ref()
    }
}

impl<'a, T> IntoIterator for &'a LinkedList<T> {
    type Item = &'a T;
    type IntoIter = Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
