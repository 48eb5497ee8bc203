//! Span dependency graph and its traversals.
//!
//! Every span contributes one edge `span -> upstream_span`, so following
//! outgoing edges walks toward the power source and following incoming edges
//! walks toward the customers. Input snapshots are not guaranteed to be
//! acyclic, so both traversals are iterative, keep a visited set, and report
//! the edge that closes a loop instead of recursing forever.

use std::collections::{HashMap, HashSet, VecDeque};

use petgraph::algo::connected_components;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{PspsError, PspsResult};
use crate::model::Span;
use crate::SpanId;

/// Order in which a traversal reports reachable spans.
///
/// Both orders reach the same set of spans.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum TraversalOrder {
    #[default]
    #[serde(rename = "dfs", alias = "depth_first")]
    DepthFirst,
    #[serde(rename = "bfs", alias = "breadth_first")]
    BreadthFirst,
}

/// The edge that closed a loop during traversal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CycleReport {
    pub from: SpanId,
    pub to: SpanId,
}

/// Spans reachable from `start`, excluding `start` itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Traversal {
    pub start: SpanId,
    pub nodes: Vec<SpanId>,
    pub cycle: Option<CycleReport>,
}

impl Traversal {
    pub fn is_cyclic(&self) -> bool {
        self.cycle.is_some()
    }

    /// Reachable spans followed by the start span.
    pub fn with_start(&self) -> Vec<SpanId> {
        let mut chain = self.nodes.clone();
        if !chain.contains(&self.start) {
            chain.push(self.start.clone());
        }
        chain
    }
}

/// Node/edge listing used for inspection and debugging output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GraphExport {
    pub nodes: Vec<String>,
    pub edges: Vec<(String, String)>,
}

/// Summary statistics for a span graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GraphStats {
    pub node_count: usize,
    pub edge_count: usize,
    /// Weakly connected components
    pub components: usize,
    /// Nodes with no upstream edge
    pub roots: usize,
    pub self_loops: usize,
}

/// Upstream pointer that names a span absent from the span table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DanglingUpstream {
    pub span: SpanId,
    pub upstream: SpanId,
}

/// Directed graph over span ids with edges `span -> upstream`.
#[derive(Debug, Clone, Default)]
pub struct SpanGraph {
    graph: DiGraph<SpanId, ()>,
    index: HashMap<SpanId, NodeIndex>,
    dangling: Vec<DanglingUpstream>,
}

impl SpanGraph {
    /// Build the graph from span records.
    ///
    /// Every span gets a node even without an upstream edge. Upstream ids that
    /// are not spans still become nodes (graph boundaries) and are listed in
    /// [`SpanGraph::dangling_upstreams`].
    ///
    /// A blank or repeated `globalid` is an input error: a span has exactly
    /// one upstream pointer.
    pub fn build(spans: &[Span], root_sentinels: &[String]) -> PspsResult<Self> {
        let mut known: HashSet<&SpanId> = HashSet::with_capacity(spans.len());
        for span in spans {
            if span.id.as_str().trim().is_empty() {
                return Err(PspsError::invalid_input("spans", "span with blank globalid"));
            }
            if !known.insert(&span.id) {
                return Err(PspsError::invalid_input(
                    "spans",
                    format!("duplicate globalid '{}'", span.id),
                ));
            }
        }

        let mut graph = SpanGraph::default();
        for span in spans {
            let from = graph.ensure_node(&span.id);
            if let Some(upstream) = span.upstream_id(root_sentinels) {
                let to = graph.ensure_node(upstream);
                graph.graph.update_edge(from, to, ());
                if !known.contains(upstream) {
                    graph.dangling.push(DanglingUpstream {
                        span: span.id.clone(),
                        upstream: upstream.clone(),
                    });
                }
            }
        }

        if !graph.dangling.is_empty() {
            warn!(
                count = graph.dangling.len(),
                "upstream ids missing from span table; treating them as roots"
            );
        }
        debug!(
            nodes = graph.node_count(),
            edges = graph.edge_count(),
            "built span graph"
        );
        Ok(graph)
    }

    fn ensure_node(&mut self, id: &SpanId) -> NodeIndex {
        if let Some(&idx) = self.index.get(id) {
            return idx;
        }
        let idx = self.graph.add_node(id.clone());
        self.index.insert(id.clone(), idx);
        idx
    }

    pub fn contains(&self, id: &SpanId) -> bool {
        self.index.contains_key(id)
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn dangling_upstreams(&self) -> &[DanglingUpstream] {
        &self.dangling
    }

    /// Immediate upstream span, if any.
    pub fn parent(&self, id: &SpanId) -> Option<&SpanId> {
        let idx = *self.index.get(id)?;
        self.graph
            .neighbors_directed(idx, Direction::Outgoing)
            .next()
            .map(|n| &self.graph[n])
    }

    /// All spans upstream of `id`, excluding `id`.
    pub fn upstream(&self, id: &SpanId, order: TraversalOrder) -> PspsResult<Traversal> {
        self.traverse(id, Direction::Outgoing, order)
    }

    /// All spans downstream of `id`, excluding `id`.
    pub fn downstream(&self, id: &SpanId, order: TraversalOrder) -> PspsResult<Traversal> {
        self.traverse(id, Direction::Incoming, order)
    }

    fn traverse(
        &self,
        id: &SpanId,
        direction: Direction,
        order: TraversalOrder,
    ) -> PspsResult<Traversal> {
        let start = *self
            .index
            .get(id)
            .ok_or_else(|| PspsError::SpanNotFound(id.to_string()))?;

        let (visited, cycle) = self.depth_first(start, direction);
        let visited = match order {
            TraversalOrder::DepthFirst => visited,
            TraversalOrder::BreadthFirst => self.breadth_first(start, direction),
        };

        Ok(Traversal {
            start: id.clone(),
            nodes: visited.into_iter().map(|n| self.graph[n].clone()).collect(),
            cycle: cycle.map(|(from, to)| CycleReport {
                from: self.graph[from].clone(),
                to: self.graph[to].clone(),
            }),
        })
    }

    /// Neighbors in edge insertion order.
    fn ordered_neighbors(&self, node: NodeIndex, direction: Direction) -> Vec<NodeIndex> {
        let mut neighbors: Vec<NodeIndex> =
            self.graph.neighbors_directed(node, direction).collect();
        neighbors.reverse();
        neighbors
    }

    /// Preorder DFS with an explicit stack. The first edge into a node still on
    /// the current path is returned as the cycle.
    fn depth_first(
        &self,
        start: NodeIndex,
        direction: Direction,
    ) -> (Vec<NodeIndex>, Option<(NodeIndex, NodeIndex)>) {
        let mut order = Vec::new();
        let mut cycle = None;
        let mut visited: HashSet<NodeIndex> = HashSet::from([start]);
        let mut on_path: HashSet<NodeIndex> = HashSet::from([start]);
        let mut stack: Vec<(NodeIndex, Vec<NodeIndex>, usize)> =
            vec![(start, self.ordered_neighbors(start, direction), 0)];

        while let Some((node, neighbors, cursor)) = stack.last_mut() {
            let node = *node;
            if *cursor >= neighbors.len() {
                on_path.remove(&node);
                stack.pop();
                continue;
            }
            let next = neighbors[*cursor];
            *cursor += 1;

            if on_path.contains(&next) {
                if cycle.is_none() {
                    cycle = Some((node, next));
                }
                continue;
            }
            if !visited.insert(next) {
                continue;
            }
            order.push(next);
            on_path.insert(next);
            stack.push((next, self.ordered_neighbors(next, direction), 0));
        }

        (order, cycle)
    }

    fn breadth_first(&self, start: NodeIndex, direction: Direction) -> Vec<NodeIndex> {
        let mut order = Vec::new();
        let mut visited: HashSet<NodeIndex> = HashSet::from([start]);
        let mut queue = VecDeque::from([start]);

        while let Some(node) = queue.pop_front() {
            for next in self.ordered_neighbors(node, direction) {
                if visited.insert(next) {
                    order.push(next);
                    queue.push_back(next);
                }
            }
        }

        order
    }

    /// Node list and edge list, in insertion order.
    pub fn export(&self) -> GraphExport {
        let nodes = self
            .graph
            .node_indices()
            .map(|n| self.graph[n].to_string())
            .collect();
        let edges = self
            .graph
            .edge_references()
            .map(|e| {
                (
                    self.graph[e.source()].to_string(),
                    self.graph[e.target()].to_string(),
                )
            })
            .collect();
        GraphExport { nodes, edges }
    }

    pub fn to_json(&self) -> PspsResult<String> {
        Ok(serde_json::to_string(&self.export())?)
    }

    pub fn stats(&self) -> GraphStats {
        let roots = self
            .graph
            .node_indices()
            .filter(|&n| {
                self.graph
                    .neighbors_directed(n, Direction::Outgoing)
                    .next()
                    .is_none()
            })
            .count();
        let self_loops = self
            .graph
            .edge_references()
            .filter(|e| e.source() == e.target())
            .count();
        GraphStats {
            node_count: self.node_count(),
            edge_count: self.edge_count(),
            components: connected_components(&self.graph),
            roots,
            self_loops,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(values: &[&str]) -> Vec<SpanId> {
        values.iter().map(|v| SpanId::new(*v)).collect()
    }

    /// root <- a <- b <- c, and d <- b (a branch)
    fn radial() -> SpanGraph {
        let spans = vec![
            Span::new("root"),
            Span::new("a").with_upstream("root"),
            Span::new("b").with_upstream("a"),
            Span::new("c").with_upstream("b"),
            Span::new("d").with_upstream("b"),
        ];
        SpanGraph::build(&spans, &[]).unwrap()
    }

    #[test]
    fn repeated_span_id_is_rejected() {
        let spans = vec![
            Span::new("a").with_upstream("b"),
            Span::new("a").with_upstream("c"),
            Span::new("b"),
            Span::new("c"),
        ];
        let err = SpanGraph::build(&spans, &[]).unwrap_err();
        assert!(matches!(err, PspsError::InvalidInput { table: "spans", .. }));
        assert!(err.to_string().contains("duplicate globalid 'a'"));
    }

    #[test]
    fn blank_span_id_is_rejected() {
        let spans = vec![Span::new("a"), Span::new("  ").with_upstream("a")];
        let err = SpanGraph::build(&spans, &[]).unwrap_err();
        assert!(matches!(err, PspsError::InvalidInput { .. }));
    }

    #[test]
    fn every_span_gets_a_node() {
        let graph = SpanGraph::build(&[Span::new("lonely")], &[]).unwrap();
        assert!(graph.contains(&SpanId::new("lonely")));
        assert_eq!(graph.edge_count(), 0);
        let up = graph
            .upstream(&SpanId::new("lonely"), TraversalOrder::DepthFirst)
            .unwrap();
        assert!(up.nodes.is_empty());
        assert!(!up.is_cyclic());
        assert_eq!(up.with_start(), ids(&["lonely"]));
    }

    #[test]
    fn upstream_excludes_start_and_follows_chain() {
        let graph = radial();
        let up = graph
            .upstream(&SpanId::new("c"), TraversalOrder::DepthFirst)
            .unwrap();
        assert_eq!(up.nodes, ids(&["b", "a", "root"]));
        assert_eq!(up.with_start(), ids(&["b", "a", "root", "c"]));
    }

    #[test]
    fn downstream_follows_predecessors() {
        let graph = radial();
        let down = graph
            .downstream(&SpanId::new("a"), TraversalOrder::DepthFirst)
            .unwrap();
        let mut nodes = down.nodes.clone();
        nodes.sort();
        assert_eq!(nodes, ids(&["b", "c", "d"]));
        assert_eq!(down.nodes[0], SpanId::new("b"));
    }

    #[test]
    fn breadth_first_reaches_same_set() {
        let graph = radial();
        let root = SpanId::new("root");
        let mut dfs = graph
            .downstream(&root, TraversalOrder::DepthFirst)
            .unwrap()
            .nodes;
        let mut bfs = graph
            .downstream(&root, TraversalOrder::BreadthFirst)
            .unwrap()
            .nodes;
        assert_eq!(bfs[0], SpanId::new("a"));
        dfs.sort();
        bfs.sort();
        assert_eq!(dfs, bfs);
    }

    #[test]
    fn two_span_cycle_terminates_and_is_flagged() {
        let spans = vec![
            Span::new("A").with_upstream("B"),
            Span::new("B").with_upstream("A"),
        ];
        let graph = SpanGraph::build(&spans, &[]).unwrap();
        for order in [TraversalOrder::DepthFirst, TraversalOrder::BreadthFirst] {
            let up = graph.upstream(&SpanId::new("A"), order).unwrap();
            assert_eq!(up.nodes, ids(&["B"]));
            assert_eq!(
                up.cycle,
                Some(CycleReport {
                    from: SpanId::new("B"),
                    to: SpanId::new("A"),
                })
            );
        }
    }

    #[test]
    fn self_loop_is_flagged() {
        let graph = SpanGraph::build(&[Span::new("x").with_upstream("x")], &[]).unwrap();
        let up = graph
            .upstream(&SpanId::new("x"), TraversalOrder::DepthFirst)
            .unwrap();
        assert!(up.nodes.is_empty());
        assert!(up.is_cyclic());
        assert_eq!(graph.stats().self_loops, 1);
    }

    #[test]
    fn cycle_above_start_is_flagged() {
        let spans = vec![
            Span::new("s").with_upstream("a"),
            Span::new("a").with_upstream("b"),
            Span::new("b").with_upstream("a"),
        ];
        let graph = SpanGraph::build(&spans, &[]).unwrap();
        let up = graph
            .upstream(&SpanId::new("s"), TraversalOrder::DepthFirst)
            .unwrap();
        assert_eq!(up.nodes, ids(&["a", "b"]));
        assert!(up.is_cyclic());
    }

    #[test]
    fn dangling_upstream_becomes_boundary_node() {
        let spans = vec![Span::new("a").with_upstream("ghost")];
        let graph = SpanGraph::build(&spans, &[]).unwrap();
        assert_eq!(graph.dangling_upstreams().len(), 1);
        assert_eq!(graph.dangling_upstreams()[0].upstream, SpanId::new("ghost"));
        let up = graph
            .upstream(&SpanId::new("a"), TraversalOrder::DepthFirst)
            .unwrap();
        assert_eq!(up.nodes, ids(&["ghost"]));
        assert_eq!(graph.parent(&SpanId::new("a")), Some(&SpanId::new("ghost")));
    }

    #[test]
    fn sentinel_upstream_adds_no_edge() {
        let spans = vec![Span::new("a").with_upstream("0")];
        let graph = SpanGraph::build(&spans, &["0".to_string()]).unwrap();
        assert_eq!(graph.node_count(), 1);
        assert_eq!(graph.edge_count(), 0);
        assert!(graph.dangling_upstreams().is_empty());
    }

    #[test]
    fn unknown_span_is_an_error() {
        let graph = radial();
        let err = graph
            .upstream(&SpanId::new("nope"), TraversalOrder::DepthFirst)
            .unwrap_err();
        assert!(matches!(err, PspsError::SpanNotFound(_)));
    }

    #[test]
    fn export_lists_nodes_and_edges() {
        let graph = radial();
        let export = graph.export();
        assert_eq!(export.nodes.len(), 5);
        assert_eq!(export.edges.len(), 4);
        assert!(export.edges.contains(&("c".to_string(), "b".to_string())));

        let json = graph.to_json().unwrap();
        assert!(json.contains("\"nodes\""));
        assert!(json.contains("[\"a\",\"root\"]"));
    }

    #[test]
    fn stats_count_components_and_roots() {
        let spans = vec![
            Span::new("a").with_upstream("b"),
            Span::new("b"),
            Span::new("x"),
        ];
        let stats = SpanGraph::build(&spans, &[]).unwrap().stats();
        assert_eq!(stats.node_count, 3);
        assert_eq!(stats.edge_count, 1);
        assert_eq!(stats.components, 2);
        assert_eq!(stats.roots, 2);
        assert_eq!(stats.self_loops, 0);
    }
}
