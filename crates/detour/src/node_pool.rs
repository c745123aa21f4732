//! Node pool and open list used by path searches
//!

use super::PolyRef;

bitflags::bitflags! {
    /// Search state of a node
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct NodeFlags: u8 {
        const OPEN = 0x01;
        const CLOSED = 0x02;
        /// The parent of the node is not adjacent; the polygons in between
        /// are recovered with a raycast when the path is finalized
        const PARENT_DETACHED = 0x04;
    }
}

/// Index of a node inside its pool
pub type NodeIndex = u16;

/// End of a hash chain
const NULL_IDX: NodeIndex = NodeIndex::MAX;

/// Largest pool a `NodeIndex` can address
pub const MAX_NODES: usize = NULL_IDX as usize - 1;

/// Maximum number of states per polygon
pub const MAX_STATES_PER_NODE: u8 = 4;

/// Search node for one polygon and state
#[derive(Debug, Clone)]
pub struct Node {
    /// Position of the node, the point where the search entered the polygon
    pub pos: [f32; 3],
    /// Cost from the start to this node
    pub cost: f32,
    /// Cost plus heuristic
    pub total: f32,
    /// Parent node
    pub pidx: Option<NodeIndex>,
    /// Extra state, the tile side crossed to reach the node
    pub state: u8,
    pub flags: NodeFlags,
    pub id: PolyRef,
}

impl Node {
    fn new(id: PolyRef, state: u8) -> Self {
        Self {
            pos: [0.0; 3],
            cost: 0.0,
            total: 0.0,
            pidx: None,
            state,
            flags: NodeFlags::empty(),
            id,
        }
    }
}

/// Fixed-capacity pool of search nodes addressed through a hash of the polygon reference
#[derive(Debug)]
pub struct NodePool {
    nodes: Vec<Node>,
    first: Vec<NodeIndex>,
    next: Vec<NodeIndex>,
    max_nodes: usize,
    hash_size: usize,
}

impl NodePool {
    /// Creates a pool; `hash_size` must be a power of two
    pub fn new(max_nodes: usize, hash_size: usize) -> Self {
        let max_nodes = max_nodes.min(MAX_NODES);
        let hash_size = hash_size.max(1).next_power_of_two();
        Self {
            nodes: Vec::with_capacity(max_nodes),
            first: vec![NULL_IDX; hash_size],
            next: vec![NULL_IDX; max_nodes],
            max_nodes,
            hash_size,
        }
    }

    pub fn clear(&mut self) {
        self.first.fill(NULL_IDX);
        self.nodes.clear();
    }

    /// Finds the node of a polygon and state, allocating it when missing
    ///
    /// Returns `None` when the pool is exhausted.
    pub fn get_node(&mut self, id: PolyRef, state: u8) -> Option<NodeIndex> {
        if let Some(idx) = self.find_node(id, state) {
            return Some(idx);
        }
        if self.nodes.len() >= self.max_nodes {
            return None;
        }

        let idx = self.nodes.len() as NodeIndex;
        self.nodes.push(Node::new(id, state));
        let bucket = self.bucket(id);
        self.next[idx as usize] = self.first[bucket];
        self.first[bucket] = idx;
        Some(idx)
    }

    /// Finds an existing node of a polygon and state
    pub fn find_node(&self, id: PolyRef, state: u8) -> Option<NodeIndex> {
        self.chain(id)
            .find(|&i| self.nodes[i as usize].state == state)
    }

    /// Finds every node of a polygon regardless of state
    pub fn find_nodes(&self, id: PolyRef) -> Vec<NodeIndex> {
        self.chain(id).collect()
    }

    pub fn node(&self, idx: NodeIndex) -> &Node {
        &self.nodes[idx as usize]
    }

    pub fn node_mut(&mut self, idx: NodeIndex) -> &mut Node {
        &mut self.nodes[idx as usize]
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn max_nodes(&self) -> usize {
        self.max_nodes
    }

    pub fn hash_size(&self) -> usize {
        self.hash_size
    }

    /// Iterates all allocated nodes
    pub fn nodes(&self) -> impl Iterator<Item = (NodeIndex, &Node)> {
        self.nodes.iter().enumerate().map(|(i, n)| (i as NodeIndex, n))
    }

    fn chain(&self, id: PolyRef) -> impl Iterator<Item = NodeIndex> + '_ {
        let mut idx = self.first[self.bucket(id)];
        std::iter::from_fn(move || {
            while idx != NULL_IDX {
                let cur = idx;
                idx = self.next[cur as usize];
                if self.nodes[cur as usize].id == id {
                    return Some(cur);
                }
            }
            None
        })
    }

    fn bucket(&self, id: PolyRef) -> usize {
        hash_ref(id) as usize & (self.hash_size - 1)
    }
}

/// Integer hash of a polygon reference
fn hash_ref(id: PolyRef) -> u32 {
    let mut a = id.id();
    a = a.wrapping_add(!(a << 15));
    a ^= a >> 10;
    a = a.wrapping_add(a << 3);
    a ^= a >> 6;
    a = a.wrapping_add(!(a << 11));
    a ^= a >> 16;
    a
}

/// Binary min-heap of node indices ordered by node total cost
#[derive(Debug)]
pub struct NodeQueue {
    heap: Vec<NodeIndex>,
    capacity: usize,
}

impl NodeQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            heap: Vec::with_capacity(capacity),
            capacity,
        }
    }

    pub fn clear(&mut self) {
        self.heap.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn top(&self) -> Option<NodeIndex> {
        self.heap.first().copied()
    }

    /// Removes and returns the node with the lowest total
    pub fn pop(&mut self, pool: &NodePool) -> Option<NodeIndex> {
        let result = self.top()?;
        let last = self.heap.pop()?;
        if !self.heap.is_empty() {
            self.trickle_down(0, last, pool);
        }
        Some(result)
    }

    pub fn push(&mut self, idx: NodeIndex, pool: &NodePool) {
        if self.heap.len() >= self.capacity {
            return;
        }
        self.heap.push(idx);
        self.bubble_up(self.heap.len() - 1, idx, pool);
    }

    /// Restores heap order after the total of a queued node decreased
    pub fn modify(&mut self, idx: NodeIndex, pool: &NodePool) {
        if let Some(i) = self.heap.iter().position(|&n| n == idx) {
            self.bubble_up(i, idx, pool);
        }
    }

    fn bubble_up(&mut self, mut i: usize, idx: NodeIndex, pool: &NodePool) {
        let total = pool.node(idx).total;
        while i > 0 {
            let parent = (i - 1) / 2;
            if pool.node(self.heap[parent]).total <= total {
                break;
            }
            self.heap[i] = self.heap[parent];
            i = parent;
        }
        self.heap[i] = idx;
    }

    fn trickle_down(&mut self, mut i: usize, idx: NodeIndex, pool: &NodePool) {
        let size = self.heap.len();
        let mut child = i * 2 + 1;
        while child < size {
            if child + 1 < size
                && pool.node(self.heap[child]).total > pool.node(self.heap[child + 1]).total
            {
                child += 1;
            }
            self.heap[i] = self.heap[child];
            i = child;
            child = i * 2 + 1;
        }
        self.bubble_up(i, idx, pool);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_pool() {
        let mut pool = NodePool::new(16, 8);

        let poly1 = PolyRef::new(1);
        let idx = pool.get_node(poly1, 0).unwrap();
        assert_eq!(pool.node(idx).id, poly1);
        assert_eq!(pool.find_node(poly1, 0), Some(idx));
        assert_eq!(pool.get_node(poly1, 0), Some(idx));

        // Different states are different nodes
        let other = pool.get_node(poly1, 1).unwrap();
        assert_ne!(idx, other);
        assert_eq!(pool.find_nodes(poly1).len(), 2);
        assert_eq!(pool.find_node(PolyRef::new(2), 0), None);

        pool.clear();
        assert_eq!(pool.node_count(), 0);
        assert_eq!(pool.find_node(poly1, 0), None);
    }

    #[test]
    fn test_node_pool_exhaustion() {
        let mut pool = NodePool::new(2, 2);
        assert!(pool.get_node(PolyRef::new(1), 0).is_some());
        assert!(pool.get_node(PolyRef::new(2), 0).is_some());
        assert!(pool.get_node(PolyRef::new(3), 0).is_none());
        // Existing nodes are still found
        assert!(pool.get_node(PolyRef::new(2), 0).is_some());
    }

    #[test]
    fn test_node_queue() {
        let mut pool = NodePool::new(16, 8);
        let mut queue = NodeQueue::new(16);

        for (id, total) in [(1, 5.0), (2, 3.0), (3, 7.0), (4, 1.0)] {
            let idx = pool.get_node(PolyRef::new(id), 0).unwrap();
            pool.node_mut(idx).total = total;
            queue.push(idx, &pool);
        }

        // Lower the cost of node 3 below all others
        let idx3 = pool.find_node(PolyRef::new(3), 0).unwrap();
        pool.node_mut(idx3).total = 0.5;
        queue.modify(idx3, &pool);

        let order: Vec<u32> = std::iter::from_fn(|| queue.pop(&pool))
            .map(|i| pool.node(i).id.id())
            .collect();
        assert_eq!(order, vec![3, 4, 2, 1]);
        assert!(queue.is_empty());
    }
}
