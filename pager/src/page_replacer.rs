use std::collections::HashMap;

use crate::PageNumber;

/// Recency bookkeeping over the resident pages.
pub trait PageReplacer {
    /// Promotes `page_number` to most recently used, tracking it if needed.
    fn touch(&mut self, page_number: PageNumber);

    /// The page to evict next. Does not untrack it.
    fn evict_candidate(&self) -> Option<PageNumber>;

    /// Returns false if the page was not tracked.
    fn remove(&mut self, page_number: PageNumber) -> bool;

    fn contains(&self, page_number: PageNumber) -> bool;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Tracked pages, most recently used first.
    fn pages(&self) -> Vec<PageNumber>;
}

#[derive(Copy, Clone, Debug)]
struct Node {
    page_number: PageNumber,
    prev: Option<usize>,
    next: Option<usize>,
}

/// Exact LRU: a doubly-linked list threaded through a node arena, plus a
/// page -> node index. Every operation is O(1).
#[derive(Default, Debug)]
pub struct LruPageReplacer {
    nodes: Vec<Node>,
    vacant: Vec<usize>,
    index: HashMap<PageNumber, usize>,
    /// Most recently used.
    head: Option<usize>,
    /// Least recently used.
    tail: Option<usize>,
}

impl LruPageReplacer {
    pub fn with_capacity(capacity: usize) -> Self {
        LruPageReplacer {
            nodes: Vec::with_capacity(capacity),
            index: HashMap::with_capacity(capacity),
            ..Self::default()
        }
    }

    fn alloc(&mut self, page_number: PageNumber) -> usize {
        let node = Node {
            page_number,
            prev: None,
            next: None,
        };

        match self.vacant.pop() {
            Some(slot) => {
                self.nodes[slot] = node;
                slot
            }
            None => {
                self.nodes.push(node);
                self.nodes.len() - 1
            }
        }
    }

    fn unlink(&mut self, slot: usize) {
        let Node { prev, next, .. } = self.nodes[slot];

        match prev {
            Some(prev) => self.nodes[prev].next = next,
            None => self.head = next,
        }

        match next {
            Some(next) => self.nodes[next].prev = prev,
            None => self.tail = prev,
        }

        self.nodes[slot].prev = None;
        self.nodes[slot].next = None;
    }

    fn push_front(&mut self, slot: usize) {
        self.nodes[slot].prev = None;
        self.nodes[slot].next = self.head;

        match self.head {
            Some(head) => self.nodes[head].prev = Some(slot),
            None => self.tail = Some(slot),
        }

        self.head = Some(slot);
    }
}

impl PageReplacer for LruPageReplacer {
    fn touch(&mut self, page_number: PageNumber) {
        match self.index.get(&page_number) {
            Some(&slot) if self.head == Some(slot) => {}
            Some(&slot) => {
                self.unlink(slot);
                self.push_front(slot);
            }
            None => {
                let slot = self.alloc(page_number);
                self.index.insert(page_number, slot);
                self.push_front(slot);
            }
        }
    }

    fn evict_candidate(&self) -> Option<PageNumber> {
        self.tail.map(|slot| self.nodes[slot].page_number)
    }

    fn remove(&mut self, page_number: PageNumber) -> bool {
        let Some(slot) = self.index.remove(&page_number) else {
            return false;
        };

        self.unlink(slot);
        self.vacant.push(slot);

        true
    }

    fn contains(&self, page_number: PageNumber) -> bool {
        self.index.contains_key(&page_number)
    }

    fn len(&self) -> usize {
        self.index.len()
    }

    fn pages(&self) -> Vec<PageNumber> {
        let mut pages = Vec::with_capacity(self.len());
        let mut cursor = self.head;

        while let Some(slot) = cursor {
            pages.push(self.nodes[slot].page_number);
            cursor = self.nodes[slot].next;
        }

        pages
    }
}
