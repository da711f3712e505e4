//! Foreign-key graph discovery.
//!
//! Breadth-first over foreign keys, starting from one table or from every
//! table. Each table is expanded at most once, so cycles terminate; tables
//! first reached on the last level are recorded as nodes but not expanded.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use futures::future::join_all;
use petgraph::algo::astar;
use petgraph::graph::{NodeIndex, UnGraph};
use serde::Serialize;
use tracing::{debug, warn};

use crate::cache::SchemaMetadataCache;
use crate::error::{ErrorInfo, ExecError, ExecResult};
use crate::schema::TableMetadata;

/// Default number of BFS levels.
pub const DEFAULT_MAX_DEPTH: usize = 2;

/// A table in the graph.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GraphNode {
    pub table_id: String,
    pub column_count: usize,
    pub primary_keys: Vec<String>,
    pub row_count: Option<i64>,
}

/// A foreign key from `source_table` to `target_table`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GraphEdge {
    pub id: String,
    pub source_table: String,
    pub target_table: String,
    pub local_columns: Vec<String>,
    pub referred_columns: Vec<String>,
}

/// Tables and foreign keys reachable from a starting point.
///
/// When discovery fails the graph is empty and `error` is set.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RelationshipGraph {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
}

impl RelationshipGraph {
    pub fn failed(err: &ExecError) -> Self {
        Self {
            nodes: Vec::new(),
            edges: Vec::new(),
            error: Some(err.to_info()),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    pub fn node(&self, table: &str) -> Option<&GraphNode> {
        self.nodes.iter().find(|n| n.table_id.eq_ignore_ascii_case(table))
    }

    /// Shortest chain of foreign keys connecting `from` and `to`, ignoring
    /// edge direction. `Some(vec![])` when both name the same table.
    pub fn join_path(&self, from: &str, to: &str) -> Option<Vec<&GraphEdge>> {
        let mut graph: UnGraph<(), usize> = UnGraph::new_undirected();
        let mut index: HashMap<String, NodeIndex> = HashMap::new();
        let mut node_for = |graph: &mut UnGraph<(), usize>, table: &str| {
            *index
                .entry(table.to_lowercase())
                .or_insert_with(|| graph.add_node(()))
        };

        for node in &self.nodes {
            node_for(&mut graph, &node.table_id);
        }
        for (i, edge) in self.edges.iter().enumerate() {
            let a = node_for(&mut graph, &edge.source_table);
            let b = node_for(&mut graph, &edge.target_table);
            graph.add_edge(a, b, i);
        }

        let start = *index.get(&from.to_lowercase())?;
        let goal = *index.get(&to.to_lowercase())?;
        let (_, nodes) = astar(&graph, start, |n| n == goal, |_| 1usize, |_| 0usize)?;

        nodes
            .windows(2)
            .map(|pair| {
                graph
                    .find_edge(pair[0], pair[1])
                    .map(|e| &self.edges[graph[e]])
            })
            .collect()
    }
}

/// Builds [`RelationshipGraph`]s from cached table metadata.
pub struct RelationshipDiscovery {
    schema: Arc<SchemaMetadataCache>,
}

impl RelationshipDiscovery {
    pub fn new(schema: Arc<SchemaMetadataCache>) -> Self {
        Self { schema }
    }

    /// Discover the graph around `start_table`, or the whole schema when
    /// `None`, following at most `max_depth` levels of foreign keys.
    ///
    /// Never fails; an introspection error yields an empty graph with
    /// `error` set.
    pub async fn discover(&self, start_table: Option<&str>, max_depth: usize) -> RelationshipGraph {
        match self.traverse(start_table, max_depth).await {
            Ok(graph) => {
                debug!(
                    start = start_table.unwrap_or("*"),
                    nodes = graph.nodes.len(),
                    edges = graph.edges.len(),
                    "relationship graph built"
                );
                graph
            }
            Err(err) => {
                warn!(start = start_table.unwrap_or("*"), error = %err, "relationship discovery failed");
                RelationshipGraph::failed(&err)
            }
        }
    }

    async fn traverse(&self, start_table: Option<&str>, max_depth: usize) -> ExecResult<RelationshipGraph> {
        let mut frontier: Vec<String> = match start_table {
            Some(table) => vec![table.to_string()],
            None => self.schema.list_tables().await?,
        };

        let mut visited: HashSet<String> = frontier.iter().map(|t| t.to_lowercase()).collect();
        let mut seen_edges: HashSet<(String, String, Vec<String>)> = HashSet::new();
        let mut graph = RelationshipGraph::default();

        let mut depth = 0;
        while !frontier.is_empty() && depth < max_depth {
            let mut next = Vec::new();
            for table in self.fetch(&frontier).await? {
                graph.nodes.push(node(&table));

                for fk in &table.foreign_keys {
                    let key = (
                        table.name.to_lowercase(),
                        fk.referred_table.to_lowercase(),
                        fk.local_columns.iter().map(|c| c.to_lowercase()).collect(),
                    );
                    if seen_edges.insert(key) {
                        graph.edges.push(GraphEdge {
                            id: format!(
                                "{}.{}->{}",
                                table.name,
                                fk.local_columns.join(","),
                                fk.referred_table
                            ),
                            source_table: table.name.clone(),
                            target_table: fk.referred_table.clone(),
                            local_columns: fk.local_columns.clone(),
                            referred_columns: fk.referred_columns.clone(),
                        });
                    }
                    if visited.insert(fk.referred_table.to_lowercase()) {
                        next.push(fk.referred_table.clone());
                    }
                }
            }
            frontier = next;
            depth += 1;
        }

        // Reached but not expanded.
        for table in self.fetch(&frontier).await? {
            graph.nodes.push(node(&table));
        }

        Ok(graph)
    }

    async fn fetch(&self, tables: &[String]) -> ExecResult<Vec<Arc<TableMetadata>>> {
        join_all(tables.iter().map(|t| self.schema.get_table_metadata(t, false)))
            .await
            .into_iter()
            .collect()
    }
}

fn node(table: &TableMetadata) -> GraphNode {
    GraphNode {
        table_id: table.name.clone(),
        column_count: table.columns.len(),
        primary_keys: table.primary_keys.clone(),
        row_count: table.row_count_estimate,
    }
}
