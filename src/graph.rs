//! Adjacency graph over representative k-mer slots.
//!
//! Strand 0 is the same sense as the normalized source k-mer, strand 1 the
//! opposite. An edge's orientation packs the two strands as
//! `(left << 1) | right`: source> sink> is strandwards, source> <sink inwards,
//! <source sink> outwards, <source <sink backwards.

/// Edge orientation, `(left_strand << 1) | right_strand`.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(u8)]
pub enum Orient {
    Strandwards = 0,
    Inwards = 1,
    Outwards = 2,
    Backwards = 3,
}

#[inline]
pub fn make_orient(left_strand: bool, right_strand: bool) -> Orient {
    match (left_strand, right_strand) {
        (false, false) => Orient::Strandwards,
        (false, true) => Orient::Inwards,
        (true, false) => Orient::Outwards,
        (true, true) => Orient::Backwards,
    }
}

/// One observed adjacency. Support is accumulated over all reads without
/// distinguishing their source libraries, so edges carry no library field.
#[derive(Debug, Copy, Clone)]
pub struct Edge {
    pub sink: usize,
    pub orient: Orient,
    /// Start of right k-mer minus start of left k-mer; 0 marks the edge as
    /// bogus after conflicting observations.
    pub dist: u32,
    /// Reads supporting the edge.
    pub nreads: u32,
}

/// A first entry with zero support marks a list that overflowed
/// [`MAX_DEGREE`]; further additions in that direction are dropped.
pub const MAX_DEGREE: usize = 64;

#[derive(Debug, Clone, Default)]
pub struct Node {
    pub up: Vec<Edge>,
    pub down: Vec<Edge>,
}

impl Node {
    /// Record one observation of an edge to `sink`. Strandwards and inwards
    /// orientations go in the downstream list, the rest upstream. Repeat
    /// observations accumulate support; a conflicting orientation or distance
    /// zeroes the distance, marking the edge bogus for walking.
    pub fn add_edge(&mut self, sink: usize, orient: Orient, dist: u32, inc: u32) {
        let edges = if matches!(orient, Orient::Strandwards | Orient::Inwards) {
            &mut self.down
        } else {
            &mut self.up
        };
        if edges.first().map(|e| e.nreads == 0).unwrap_or(false) {
            return; // already had too many distinct edges
        }
        if let Some(e) = edges.iter_mut().find(|e| e.sink == sink) {
            e.nreads = e.nreads.saturating_add(inc);
            if e.orient != orient || e.dist != dist {
                e.dist = 0;
            }
            return;
        }
        if edges.len() >= MAX_DEGREE {
            edges.clear();
            edges.push(Edge {
                sink: 0,
                orient,
                dist: 0,
                nreads: 0,
            });
            return;
        }
        edges.push(Edge {
            sink,
            orient,
            dist,
            nreads: inc,
        });
    }

    #[inline]
    pub fn degree(&self) -> usize {
        self.up.len() + self.down.len()
    }
}

pub struct Graph {
    nodes: Vec<Node>,
}

impl Graph {
    pub fn new(size: usize) -> Self {
        Self {
            nodes: vec![Node::default(); size],
        }
    }
}

impl std::ops::Index<usize> for Graph {
    type Output = Node;

    #[inline]
    fn index(&self, slot: usize) -> &Node {
        &self.nodes[slot]
    }
}

impl std::ops::IndexMut<usize> for Graph {
    #[inline]
    fn index_mut(&mut self, slot: usize) -> &mut Node {
        &mut self.nodes[slot]
    }
}

mod test {
    #[allow(unused_imports)]
    use super::*;

    #[test]
    fn orientation_routes_to_the_right_list() {
        let mut n = Node::default();
        n.add_edge(1, make_orient(false, false), 30, 1);
        n.add_edge(2, make_orient(false, true), 30, 1);
        n.add_edge(3, make_orient(true, false), 30, 1);
        n.add_edge(4, make_orient(true, true), 30, 1);
        assert_eq!(n.down.iter().map(|e| e.sink).collect::<Vec<_>>(), [1, 2]);
        assert_eq!(n.up.iter().map(|e| e.sink).collect::<Vec<_>>(), [3, 4]);
        assert_eq!(n.degree(), 4);
    }

    #[test]
    fn repeat_support_accumulates_and_conflicts_zero_distance() {
        let mut n = Node::default();
        n.add_edge(7, Orient::Strandwards, 30, 1);
        n.add_edge(7, Orient::Strandwards, 30, 2);
        assert_eq!(n.down[0].nreads, 3);
        assert_eq!(n.down[0].dist, 30);
        // a conflicting distance keeps the support but zeroes the distance
        n.add_edge(7, Orient::Strandwards, 31, 1);
        assert_eq!(n.down[0].nreads, 4);
        assert_eq!(n.down[0].dist, 0);
        // a conflicting orientation does the same (same list)
        n.add_edge(7, Orient::Inwards, 30, 1);
        assert_eq!(n.down[0].dist, 0);
    }

    #[test]
    fn overflowing_degree_collapses_to_sentinel() {
        let mut n = Node::default();
        for sink in 1..=MAX_DEGREE {
            n.add_edge(sink, Orient::Strandwards, 30, 1);
        }
        assert_eq!(n.down.len(), MAX_DEGREE);
        n.add_edge(MAX_DEGREE + 1, Orient::Strandwards, 30, 1);
        assert_eq!(n.down.len(), 1);
        assert_eq!(n.down[0].nreads, 0);
        // saturated: everything in this direction is dropped, even repeats
        n.add_edge(1, Orient::Strandwards, 30, 1);
        assert_eq!(n.down.len(), 1);
        assert_eq!(n.down[0].nreads, 0);
        // the other direction is unaffected
        n.add_edge(1, Orient::Outwards, 30, 1);
        assert_eq!(n.up.len(), 1);
    }
}
