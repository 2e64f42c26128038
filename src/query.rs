//! Read-only graph queries over one index snapshot.
//!
//! A [GraphQuery] is bound to exactly one `Arc<Index>`. The store hands out a new one after
//! every mutation, so the lazily built link graph and the distance cache can never observe a
//! different index than the one they were built from.

use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use petgraph::{
    algo::dijkstra,
    graph::{NodeIndex, UnGraph},
};
use serde::{Deserialize, Serialize};
use std::{
    collections::{BTreeMap, BTreeSet, HashMap, VecDeque},
    sync::Arc,
};

use crate::{index::Index, properties::Mention};

/// One mention whose target could not be resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrokenLink {
    pub source: String,
    /// Raw target as written.
    pub target: String,
    pub mention: Mention,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub valid: usize,
    pub broken: usize,
    pub details: Vec<BrokenLink>,
}

impl ValidationReport {
    pub fn is_clean(&self) -> bool {
        self.broken == 0
    }
}

/// Undirected document graph: one node per document, one edge per linked pair.
#[derive(Debug, Default)]
struct LinkGraph {
    graph: UnGraph<String, ()>,
    nodes: HashMap<String, NodeIndex>,
}

impl LinkGraph {
    fn build(index: &Index) -> LinkGraph {
        let mut link_graph = LinkGraph::default();
        for id in index.ids() {
            let node = link_graph.graph.add_node(id.to_string());
            link_graph.nodes.insert(id.to_string(), node);
        }
        let mut pairs: BTreeSet<(&str, &str)> = BTreeSet::new();
        for (id, record) in index.documents().iter() {
            for target in record.targets() {
                if target == id.as_str() {
                    continue;
                }
                let pair = if id.as_str() < target {
                    (id.as_str(), target)
                } else {
                    (target, id.as_str())
                };
                pairs.insert(pair);
            }
        }
        for (a, b) in pairs {
            if let (Some(a), Some(b)) = (link_graph.nodes.get(a), link_graph.nodes.get(b)) {
                link_graph.graph.add_edge(*a, *b, ());
            }
        }
        tracing::debug!(
            "[LinkGraph::build] {} nodes, {} edges",
            link_graph.graph.node_count(),
            link_graph.graph.edge_count()
        );
        link_graph
    }

    /// Hop counts from `start`, not expanding beyond `max_depth`.
    fn bfs(&self, start: NodeIndex, max_depth: Option<usize>) -> HashMap<NodeIndex, usize> {
        let mut seen: HashMap<NodeIndex, usize> = HashMap::new();
        let mut queue = VecDeque::new();
        seen.insert(start, 0);
        queue.push_back(start);
        while let Some(node) = queue.pop_front() {
            let depth = seen.get(&node).copied().unwrap_or_default();
            if max_depth.is_some_and(|max| depth >= max) {
                continue;
            }
            for neighbor in self.graph.neighbors(node) {
                if !seen.contains_key(&neighbor) {
                    seen.insert(neighbor, depth + 1);
                    queue.push_back(neighbor);
                }
            }
        }
        seen
    }
}

#[derive(Debug)]
pub struct GraphQuery {
    index: Arc<Index>,
    graph: OnceCell<LinkGraph>,
    distances: Mutex<HashMap<(String, String), Option<usize>>>,
}

impl GraphQuery {
    pub fn new(index: Arc<Index>) -> GraphQuery {
        GraphQuery {
            index,
            graph: OnceCell::new(),
            distances: Mutex::new(HashMap::new()),
        }
    }

    /// The snapshot this query answers for.
    pub fn index(&self) -> &Arc<Index> {
        &self.index
    }

    fn link_graph(&self) -> &LinkGraph {
        self.graph.get_or_init(|| LinkGraph::build(&self.index))
    }

    /// Documents with a resolved mention of `doc`, sorted.
    pub fn backlinks_of(&self, doc: &str) -> Vec<String> {
        self.index
            .backlinks_of(doc)
            .map(|sources| sources.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Outgoing mentions of `doc` in source order, resolved or not.
    pub fn forward_links_of(&self, doc: &str) -> &[Mention] {
        self.index
            .document(doc)
            .map(|record| record.mentions.as_slice())
            .unwrap_or_default()
    }

    /// Distinct documents `doc` links to, sorted.
    pub fn linked_documents(&self, doc: &str) -> Vec<String> {
        self.index
            .document(doc)
            .map(|record| record.targets().into_iter().map(str::to_string).collect())
            .unwrap_or_default()
    }

    /// Fewest undirected hops between `a` and `b`; `Some(0)` when `a == b`, `None` when either
    /// document is unknown or no path exists.
    pub fn distance(&self, a: &str, b: &str) -> Option<usize> {
        if a == b {
            return Some(0);
        }
        let key = if a < b {
            (a.to_string(), b.to_string())
        } else {
            (b.to_string(), a.to_string())
        };
        if let Some(hit) = self.distances.lock().get(&key) {
            return *hit;
        }
        let graph = self.link_graph();
        let distance = match (graph.nodes.get(a), graph.nodes.get(b)) {
            (Some(start), Some(goal)) => dijkstra(&graph.graph, *start, Some(*goal), |_| 1usize)
                .get(goal)
                .copied(),
            _ => None,
        };
        self.distances.lock().insert(key, distance);
        distance
    }

    /// Every document within `max_depth` undirected hops of `doc` (unbounded when `None`), mapped
    /// to its distance. `doc` itself is not included.
    pub fn connected_neighborhood(
        &self,
        doc: &str,
        max_depth: Option<usize>,
    ) -> BTreeMap<String, usize> {
        let graph = self.link_graph();
        let Some(start) = graph.nodes.get(doc) else {
            return BTreeMap::new();
        };
        graph
            .bfs(*start, max_depth)
            .into_iter()
            .filter(|(node, _)| node != start)
            .map(|(node, depth)| (graph.graph[node].clone(), depth))
            .collect()
    }

    /// Documents with at least one unresolved mention, sorted.
    pub fn documents_with_broken_links(&self) -> Vec<String> {
        self.index
            .documents()
            .values()
            .filter(|record| record.broken_mentions().next().is_some())
            .map(|record| record.id.clone())
            .collect()
    }

    pub fn validate_all(&self) -> ValidationReport {
        let mut report = ValidationReport::default();
        for record in self.index.documents().values() {
            for mention in record.mentions.iter() {
                if mention.exists {
                    report.valid += 1;
                } else {
                    report.broken += 1;
                    report.details.push(BrokenLink {
                        source: record.id.clone(),
                        target: mention.raw.clone(),
                        mention: mention.clone(),
                    });
                }
            }
        }
        tracing::debug!(
            "[GraphQuery::validate_all] {} valid, {} broken",
            report.valid,
            report.broken
        );
        report
    }

    /// Documents with neither resolved outgoing mentions nor backlinks.
    pub fn orphans(&self) -> Vec<String> {
        self.index
            .documents()
            .values()
            .filter(|record| {
                record.targets().is_empty()
                    && self
                        .index
                        .backlinks_of(&record.id)
                        .is_none_or(|sources| sources.is_empty())
            })
            .map(|record| record.id.clone())
            .collect()
    }

    /// Documents tagged `tag` (case-insensitive, leading `#` optional), sorted.
    pub fn documents_with_tag(&self, tag: &str) -> Vec<String> {
        let tag = tag.trim().trim_start_matches('#').to_lowercase();
        self.index
            .documents_with_tag(&tag)
            .map(|ids| ids.iter().cloned().collect())
            .unwrap_or_default()
    }

    #[cfg(test)]
    pub(crate) fn cached_distances(&self) -> usize {
        self.distances.lock().len()
    }
}
