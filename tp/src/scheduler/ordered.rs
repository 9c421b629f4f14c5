//! Ordered queue with O(1) removal by handle
//!
//! A doubly-linked list whose nodes live in a slot vector. Freed slots are
//! recycled through a free list, and each slot carries a generation counter
//! so a handle that outlived its node can never unlink a newer occupant.

/// Handle to a node previously appended to an [`OrderedQueue`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeHandle {
    index: u32,
    generation: u32,
}

#[derive(Debug)]
struct Node<T> {
    value: T,
    prev: Option<u32>,
    next: Option<u32>,
}

#[derive(Debug)]
enum SlotEntry<T> {
    Linked(Node<T>),
    Free { next_free: Option<u32> },
}

#[derive(Debug)]
struct Slot<T> {
    generation: u32,
    entry: SlotEntry<T>,
}

/// FIFO queue supporting append, pop-front and removal of any node
#[derive(Debug)]
pub struct OrderedQueue<T> {
    slots: Vec<Slot<T>>,
    head: Option<u32>,
    tail: Option<u32>,
    free_head: Option<u32>,
    len: usize,
}

impl<T> Default for OrderedQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> OrderedQueue<T> {
    /// Create an empty queue
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            head: None,
            tail: None,
            free_head: None,
            len: 0,
        }
    }

    /// Number of queued values
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    /// Insert at the tail
    ///
    /// The returned handle is valid until the node is popped or removed.
    pub fn append(&mut self, value: T) -> NodeHandle {
        let node = Node {
            value,
            prev: self.tail,
            next: None,
        };

        let (index, generation) = match self.free_head {
            Some(index) => {
                let slot = &mut self.slots[index as usize];
                if let SlotEntry::Free { next_free } = slot.entry {
                    self.free_head = next_free;
                }
                slot.entry = SlotEntry::Linked(node);
                (index, slot.generation)
            }
            None => {
                let index = self.slots.len() as u32;
                self.slots.push(Slot {
                    generation: 0,
                    entry: SlotEntry::Linked(node),
                });
                (index, 0)
            }
        };

        match self.tail {
            Some(tail) => {
                if let Some(tail_node) = self.node_mut(tail) {
                    tail_node.next = Some(index);
                }
            }
            None => self.head = Some(index),
        }
        self.tail = Some(index);
        self.len += 1;

        NodeHandle { index, generation }
    }

    /// Remove and return the head value
    pub fn pop_front(&mut self) -> Option<T> {
        let head = self.head?;
        self.unlink(head)
    }

    /// Remove the node behind `handle`, wherever it sits
    ///
    /// Each handle is meant to be used once. A handle whose node has already
    /// been popped or removed yields `None` and leaves the queue untouched.
    pub fn remove(&mut self, handle: NodeHandle) -> Option<T> {
        let slot = self.slots.get(handle.index as usize)?;
        if slot.generation != handle.generation || !matches!(slot.entry, SlotEntry::Linked(_)) {
            return None;
        }
        self.unlink(handle.index)
    }

    /// Iterate values front to back
    pub fn iter(&self) -> Iter<'_, T> {
        Iter {
            queue: self,
            cursor: self.head,
        }
    }

    fn node(&self, index: u32) -> Option<&Node<T>> {
        match &self.slots.get(index as usize)?.entry {
            SlotEntry::Linked(node) => Some(node),
            SlotEntry::Free { .. } => None,
        }
    }

    fn node_mut(&mut self, index: u32) -> Option<&mut Node<T>> {
        match &mut self.slots.get_mut(index as usize)?.entry {
            SlotEntry::Linked(node) => Some(node),
            SlotEntry::Free { .. } => None,
        }
    }

    fn unlink(&mut self, index: u32) -> Option<T> {
        let slot = self.slots.get_mut(index as usize)?;
        let entry = std::mem::replace(
            &mut slot.entry,
            SlotEntry::Free {
                next_free: self.free_head,
            },
        );
        let node = match entry {
            SlotEntry::Linked(node) => node,
            free @ SlotEntry::Free { .. } => {
                slot.entry = free;
                return None;
            }
        };
        slot.generation = slot.generation.wrapping_add(1);
        self.free_head = Some(index);

        let Node { value, prev, next } = node;
        match prev {
            Some(prev) => {
                if let Some(prev_node) = self.node_mut(prev) {
                    prev_node.next = next;
                }
            }
            None => self.head = next,
        }
        match next {
            Some(next) => {
                if let Some(next_node) = self.node_mut(next) {
                    next_node.prev = prev;
                }
            }
            None => self.tail = prev,
        }
        self.len -= 1;

        Some(value)
    }
}

/// Front-to-back iterator over an [`OrderedQueue`]
pub struct Iter<'a, T> {
    queue: &'a OrderedQueue<T>,
    cursor: Option<u32>,
}

impl<'a, T> Iterator for Iter<'a, T> {
    type Item = &'a T;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.queue.node(self.cursor?)?;
        self.cursor = node.next;
        Some(&node.value)
    }
}
