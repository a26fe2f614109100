//! Impact traversal over the spec graph.
//!
//! Answers "what is affected if these artifacts change?" and "what
//! implements/tests this spec?" with a bounded-depth breadth-first walk
//! from a set of start nodes. Cumulative confidence along a path is the
//! product of edge confidences; nodes reached via multiple paths keep
//! the maximum confidence and the shallowest depth.

use crate::edge::Relationship;
use crate::graph::ImpactGraph;
use petgraph::graph::NodeIndex;
use petgraph::visit::EdgeRef;
use serde::{Deserialize, Serialize};
use specimpact_core::ArtifactKind;
use std::collections::{HashMap, HashSet, VecDeque};

/// Which way the walk follows edges.
///
/// Edges point from an artifact to the thing it derives from: code
/// points at the spec it implements, tests point at what they exercise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Follow outgoing edges: "what affects this?" From a code file
    /// this reaches the specs it implements.
    Upstream,

    /// Follow incoming edges: "what does a change here affect?" From a
    /// spec this reaches its implementations and tests.
    Downstream,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Upstream => write!(f, "upstream"),
            Direction::Downstream => write!(f, "downstream"),
        }
    }
}

impl std::str::FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "upstream" => Ok(Self::Upstream),
            "downstream" => Ok(Self::Downstream),
            other => Err(format!("unknown direction: {}", other)),
        }
    }
}

/// Parameters of one impact query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImpactQuery {
    /// Start node ids, treated as the depth-0 frontier.
    pub start_ids: Vec<String>,

    /// Maximum hops from the frontier. Depth 0 returns nothing unless
    /// `include_start` is set.
    pub max_depth: usize,

    /// Walk direction.
    pub direction: Direction,

    /// Restrict the output to these kinds. `None` keeps all kinds.
    /// Filtering applies to the output only; the walk still passes
    /// through nodes of every kind.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind_filter: Option<Vec<ArtifactKind>>,

    /// Include the start nodes themselves in the output.
    #[serde(default)]
    pub include_start: bool,

    /// Follow `Suggests` edges (low-confidence oracle links). Off by
    /// default so soft links never inflate impact sets.
    #[serde(default)]
    pub include_suggested: bool,
}

impl ImpactQuery {
    /// Creates a query with default filters.
    pub fn new(start_ids: Vec<String>, max_depth: usize, direction: Direction) -> Self {
        Self {
            start_ids,
            max_depth,
            direction,
            kind_filter: None,
            include_start: false,
            include_suggested: false,
        }
    }

    pub fn with_kinds(mut self, kinds: Vec<ArtifactKind>) -> Self {
        self.kind_filter = Some(kinds);
        self
    }

    pub fn with_start_nodes(mut self) -> Self {
        self.include_start = true;
        self
    }

    pub fn with_suggested(mut self) -> Self {
        self.include_suggested = true;
        self
    }
}

/// One reached node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImpactEntry {
    pub id: String,
    pub kind: ArtifactKind,
    pub path: String,

    /// Product of edge confidences along the best path.
    pub confidence: f64,

    /// Hops along the shallowest path from the frontier.
    pub depth: usize,
}

/// Result of an impact query, bucketed by artifact kind.
///
/// Within each bucket entries are ordered by confidence descending,
/// then depth ascending, then id ascending.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImpactSet {
    pub specs: Vec<ImpactEntry>,
    pub code: Vec<ImpactEntry>,
    pub tests: Vec<ImpactEntry>,
}

impl ImpactSet {
    /// Total number of entries across buckets.
    pub fn total(&self) -> usize {
        self.specs.len() + self.code.len() + self.tests.len()
    }

    /// True if no nodes were reached.
    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }

    /// Iterates over every entry, specs first.
    pub fn all(&self) -> impl Iterator<Item = &ImpactEntry> {
        self.specs.iter().chain(self.code.iter()).chain(self.tests.iter())
    }

    /// Looks up an entry by id.
    pub fn get(&self, id: &str) -> Option<&ImpactEntry> {
        self.all().find(|entry| entry.id == id)
    }
}

impl ImpactGraph {
    /// Runs a bounded breadth-first impact query.
    ///
    /// All start ids form the depth-0 frontier simultaneously. A node is
    /// finalized the first time it is dequeued; later rediscoveries only
    /// improve its recorded score and never re-expand it, which also
    /// breaks cycles. Unknown start ids and empty input yield an empty
    /// set, not an error.
    pub fn impact(&self, query: &ImpactQuery) -> ImpactSet {
        let mut best: HashMap<NodeIndex, (f64, usize)> = HashMap::new();
        let mut finalized: HashSet<NodeIndex> = HashSet::new();
        let mut queue: VecDeque<NodeIndex> = VecDeque::new();
        let mut starts: HashSet<NodeIndex> = HashSet::new();

        let petgraph_direction = match query.direction {
            Direction::Upstream => petgraph::Direction::Outgoing,
            Direction::Downstream => petgraph::Direction::Incoming,
        };

        for id in &query.start_ids {
            if let Some(index) = self.index_of(id) {
                if starts.insert(index) {
                    best.insert(index, (1.0, 0));
                    queue.push_back(index);
                }
            }
        }

        while let Some(current) = queue.pop_front() {
            if !finalized.insert(current) {
                continue;
            }

            let (confidence, depth) = match best.get(&current) {
                Some(&entry) => entry,
                None => continue,
            };

            // Stop expanding once the hop budget is spent.
            if depth >= query.max_depth {
                continue;
            }

            for edge_ref in self.graph.edges_directed(current, petgraph_direction) {
                let edge = edge_ref.weight();
                if edge.relationship == Relationship::Suggests && !query.include_suggested {
                    continue;
                }

                let neighbor = match petgraph_direction {
                    petgraph::Direction::Outgoing => edge_ref.target(),
                    petgraph::Direction::Incoming => edge_ref.source(),
                };

                let candidate = (confidence * edge.confidence, depth + 1);

                match best.entry(neighbor) {
                    std::collections::hash_map::Entry::Vacant(slot) => {
                        slot.insert(candidate);
                        queue.push_back(neighbor);
                    }
                    std::collections::hash_map::Entry::Occupied(mut slot) => {
                        let entry = slot.get_mut();
                        let improved = candidate.0 > entry.0;
                        entry.0 = entry.0.max(candidate.0);
                        entry.1 = entry.1.min(candidate.1);
                        // Re-enqueue only strictly better, unfinalized nodes.
                        if improved && !finalized.contains(&neighbor) {
                            queue.push_back(neighbor);
                        }
                    }
                }
            }
        }

        self.collect(query, &best, &starts)
    }

    fn collect(
        &self,
        query: &ImpactQuery,
        best: &HashMap<NodeIndex, (f64, usize)>,
        starts: &HashSet<NodeIndex>,
    ) -> ImpactSet {
        let mut set = ImpactSet::default();

        for (&index, &(confidence, depth)) in best {
            if starts.contains(&index) && !query.include_start {
                continue;
            }

            let Some(node) = self.graph.node_weight(index) else {
                continue;
            };

            if let Some(kinds) = &query.kind_filter {
                if !kinds.contains(&node.kind) {
                    continue;
                }
            }

            let entry = ImpactEntry {
                id: node.id.clone(),
                kind: node.kind,
                path: node.path.clone(),
                confidence,
                depth,
            };

            match node.kind {
                ArtifactKind::Spec => set.specs.push(entry),
                ArtifactKind::Code => set.code.push(entry),
                ArtifactKind::Test => set.tests.push(entry),
            }
        }

        for bucket in [&mut set.specs, &mut set.code, &mut set.tests] {
            bucket.sort_by(|a, b| {
                b.confidence
                    .partial_cmp(&a.confidence)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| a.depth.cmp(&b.depth))
                    .then_with(|| a.id.cmp(&b.id))
            });
        }

        set
    }
}
