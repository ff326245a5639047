// =============================================================================
// Max Binary Heap
// =============================================================================
// Array-backed binary max-heap over (sort key, account). The pool keeps one
// for shorts and one for longs; the root is always the most leveraged
// position on that side, which is what the margin-call sweep inspects.
//
// Every slot move is reported to a `HeapIndexSink` so the position ledger can
// keep each position's 1-based `heap_index` pointing at its slot. Index 0 in
// the sink means "not in a heap".
// =============================================================================

use anchor_lang::prelude::*;

use crate::error::MarginPoolError;

/// One heap slot.
#[derive(AnchorSerialize, AnchorDeserialize, Clone, Copy, Debug, PartialEq, Eq, InitSpace)]
pub struct HeapNode {
    /// Leverage proxy, larger is riskier
    pub key: u128,
    /// Owner of the position occupying this slot
    pub account: Pubkey,
}

/// Receives back-reference updates whenever a node lands in a new slot.
pub trait HeapIndexSink {
    /// `index` is 1-based; 0 clears the back-reference.
    fn set_heap_index(&mut self, account: &Pubkey, index: u32);
}

#[derive(AnchorSerialize, AnchorDeserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct MaxHeap {
    nodes: Vec<HeapNode>,
}

impl Space for MaxHeap {
    // empty vec prefix, nodes are sized per position by the pool
    const INIT_SPACE: usize = 4;
}

impl MaxHeap {
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &HeapNode> {
        self.nodes.iter()
    }

    /// Root node without removing it, `None` when empty.
    pub fn peek_root(&self) -> Option<HeapNode> {
        self.nodes.first().copied()
    }

    /// Node at a 0-based slot.
    pub fn node_at(&self, index: usize) -> Option<HeapNode> {
        self.nodes.get(index).copied()
    }

    /// Append and sift up. Returns the 0-based slot the node settled in.
    pub fn insert<S: HeapIndexSink>(&mut self, node: HeapNode, sink: &mut S) -> usize {
        self.nodes.push(node);
        let index = self.nodes.len() - 1;
        sink.set_heap_index(&node.account, index as u32 + 1);
        self.sift_up(index, sink)
    }

    /// Remove the node at a 0-based slot, filling the hole with the last node.
    pub fn remove_at<S: HeapIndexSink>(&mut self, index: usize, sink: &mut S) -> Result<HeapNode> {
        require!(index < self.nodes.len(), MarginPoolError::HeapCorrupted);

        let last = self.nodes.len() - 1;
        if index != last {
            self.swap(index, last, sink);
        }
        let removed = self.nodes.pop().ok_or(MarginPoolError::HeapCorrupted)?;
        sink.set_heap_index(&removed.account, 0);

        if index < self.nodes.len() {
            self.restore(index, sink);
        }
        Ok(removed)
    }

    /// Replace the key at a 0-based slot and rebalance. Returns the new slot.
    pub fn update_at<S: HeapIndexSink>(&mut self, index: usize, key: u128, sink: &mut S) -> Result<usize> {
        let node = self
            .nodes
            .get_mut(index)
            .ok_or(MarginPoolError::HeapCorrupted)?;
        node.key = key;
        Ok(self.restore(index, sink))
    }

    /// Hand a slot to another account, keeping its key and position.
    pub fn update_account_at<S: HeapIndexSink>(
        &mut self,
        index: usize,
        account: Pubkey,
        sink: &mut S,
    ) -> Result<()> {
        let node = self
            .nodes
            .get_mut(index)
            .ok_or(MarginPoolError::HeapCorrupted)?;
        let previous = node.account;
        node.account = account;
        sink.set_heap_index(&previous, 0);
        sink.set_heap_index(&account, index as u32 + 1);
        Ok(())
    }

    fn restore<S: HeapIndexSink>(&mut self, index: usize, sink: &mut S) -> usize {
        if index > 0 && self.nodes[index].key > self.nodes[(index - 1) / 2].key {
            self.sift_up(index, sink)
        } else {
            self.sift_down(index, sink)
        }
    }

    fn sift_up<S: HeapIndexSink>(&mut self, mut index: usize, sink: &mut S) -> usize {
        while index > 0 {
            let parent = (index - 1) / 2;
            if self.nodes[parent].key >= self.nodes[index].key {
                break;
            }
            self.swap(parent, index, sink);
            index = parent;
        }
        index
    }

    fn sift_down<S: HeapIndexSink>(&mut self, mut index: usize, sink: &mut S) -> usize {
        let len = self.nodes.len();
        loop {
            let left = 2 * index + 1;
            let right = left + 1;
            let mut largest = index;
            if left < len && self.nodes[left].key > self.nodes[largest].key {
                largest = left;
            }
            if right < len && self.nodes[right].key > self.nodes[largest].key {
                largest = right;
            }
            if largest == index {
                return index;
            }
            self.swap(index, largest, sink);
            index = largest;
        }
    }

    fn swap<S: HeapIndexSink>(&mut self, a: usize, b: usize, sink: &mut S) {
        self.nodes.swap(a, b);
        sink.set_heap_index(&self.nodes[a].account, a as u32 + 1);
        sink.set_heap_index(&self.nodes[b].account, b as u32 + 1);
    }
}
