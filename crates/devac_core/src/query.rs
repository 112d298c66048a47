//! Symbol and call-graph queries over a package's merged view.

use crate::config::QueryConfig;
use crate::error::{DevacError, Result};
use crate::store::SeedStore;
use crate::types::Node;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

/// Output granularity for symbol queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Granularity {
    /// Totals per kind, no rows.
    Counts,
    /// One-line summaries.
    Summary,
    /// Full node rows.
    Full,
}

impl Granularity {
    /// Parses a CLI label.
    ///
    /// # Errors
    ///
    /// `InvalidQuery` for unknown labels.
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "counts" => Ok(Granularity::Counts),
            "summary" => Ok(Granularity::Summary),
            "full" => Ok(Granularity::Full),
            other => Err(DevacError::InvalidQuery(format!(
                "unknown granularity '{}' (expected counts, summary, or full)",
                other
            ))),
        }
    }
}

/// Filters for symbol lookup. All present filters must match.
#[derive(Debug, Clone, Default)]
pub struct SymbolFilter {
    /// Case-insensitive substring match on the symbol name.
    pub name: Option<String>,
    /// Exact kind match.
    pub kind: Option<String>,
    /// Exact file path match.
    pub file_path: Option<String>,
    /// Keep only exported symbols.
    pub exported_only: bool,
}

impl SymbolFilter {
    fn matches(&self, node: &Node) -> bool {
        if let Some(name) = &self.name {
            if !node.name.to_lowercase().contains(&name.to_lowercase()) {
                return false;
            }
        }
        if let Some(kind) = &self.kind {
            if &node.kind != kind {
                return false;
            }
        }
        if let Some(file) = &self.file_path {
            if &node.file_path != file {
                return false;
            }
        }
        if self.exported_only && !node.is_exported {
            return false;
        }
        true
    }
}

/// Limit/offset pagination.
#[derive(Debug, Clone, Copy)]
pub struct Page {
    pub limit: usize,
    pub offset: usize,
}

impl Page {
    /// First page with the configured default size.
    pub fn first(config: &QueryConfig) -> Self {
        Self {
            limit: config.default_limit,
            offset: 0,
        }
    }
}

/// One-line symbol summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolSummary {
    pub entity_id: String,
    pub name: String,
    pub qualified_name: String,
    pub kind: String,
    pub file_path: String,
    pub start_line: u32,
    pub is_exported: bool,
}

impl From<&Node> for SymbolSummary {
    fn from(node: &Node) -> Self {
        Self {
            entity_id: node.entity_id.clone(),
            name: node.name.clone(),
            qualified_name: node.qualified_name.clone(),
            kind: node.kind.clone(),
            file_path: node.file_path.clone(),
            start_line: node.start_line,
            is_exported: node.is_exported,
        }
    }
}

/// Symbol query result at the requested granularity.
///
/// `total` is always the full match count before pagination.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "granularity", rename_all = "snake_case")]
pub enum SymbolMatches {
    Counts {
        total: usize,
        by_kind: BTreeMap<String, usize>,
    },
    Summary {
        total: usize,
        symbols: Vec<SymbolSummary>,
    },
    Full {
        total: usize,
        symbols: Vec<Node>,
    },
}

/// Looks up symbols in the merged view.
///
/// # Errors
///
/// `InvalidQuery` for a zero or over-limit page size; storage errors
/// propagate from the merged read.
pub fn find_symbols(
    store: &SeedStore,
    filter: &SymbolFilter,
    granularity: Granularity,
    page: Page,
    config: &QueryConfig,
) -> Result<SymbolMatches> {
    if page.limit == 0 {
        return Err(DevacError::InvalidQuery(
            "limit must be positive".to_string(),
        ));
    }
    if page.limit > config.max_limit {
        return Err(DevacError::InvalidQuery(format!(
            "limit {} exceeds maximum {}",
            page.limit, config.max_limit
        )));
    }

    let merged = store.read_merged()?;
    let matched: Vec<&Node> = merged.nodes.iter().filter(|n| filter.matches(n)).collect();
    let total = matched.len();

    Ok(match granularity {
        Granularity::Counts => {
            let mut by_kind: BTreeMap<String, usize> = BTreeMap::new();
            for node in &matched {
                *by_kind.entry(node.kind.clone()).or_insert(0) += 1;
            }
            SymbolMatches::Counts { total, by_kind }
        }
        Granularity::Summary => SymbolMatches::Summary {
            total,
            symbols: matched
                .into_iter()
                .skip(page.offset)
                .take(page.limit)
                .map(SymbolSummary::from)
                .collect(),
        },
        Granularity::Full => SymbolMatches::Full {
            total,
            symbols: matched
                .into_iter()
                .skip(page.offset)
                .take(page.limit)
                .cloned()
                .collect(),
        },
    })
}

/// Which way to walk CALLS edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallDirection {
    /// Symbols that call the root (walk edges backwards).
    Callers,
    /// Symbols the root calls.
    Callees,
    /// Both walks.
    Both,
}

impl CallDirection {
    /// Parses a CLI label.
    ///
    /// # Errors
    ///
    /// `InvalidQuery` for unknown labels.
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "callers" => Ok(CallDirection::Callers),
            "callees" => Ok(CallDirection::Callees),
            "both" => Ok(CallDirection::Both),
            other => Err(DevacError::InvalidQuery(format!(
                "unknown direction '{}' (expected callers, callees, or both)",
                other
            ))),
        }
    }
}

/// One symbol reached during a call-graph walk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallGraphEntry {
    pub entity_id: String,
    pub name: String,
    pub file_path: String,
    pub start_line: u32,
    /// Hop distance from the root.
    pub depth: u32,
    /// Which walk found it.
    pub direction: CallDirection,
}

/// Result of a call-graph walk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallGraph {
    /// The root entity the walk started from.
    pub root: String,
    /// Reached symbols, ordered by (depth, entity id).
    pub entries: Vec<CallGraphEntry>,
    /// True when the result cap cut the walk short.
    pub truncated: bool,
}

/// Walks CALLS edges from an entity in the requested direction(s).
///
/// The walk is breadth-first with a visited set per direction, so cyclic
/// call graphs terminate. Edge endpoints that do not resolve to a known
/// symbol (unresolved cross-file targets) are omitted. The `cap` bounds
/// the total number of entries; hitting it sets `truncated`.
///
/// # Errors
///
/// `EntityNotFound` when the root is not a known symbol.
pub fn call_graph(
    store: &SeedStore,
    entity_id: &str,
    direction: CallDirection,
    cap: usize,
) -> Result<CallGraph> {
    let merged = store.read_merged()?;

    let nodes_by_id: HashMap<&str, &Node> = merged
        .nodes
        .iter()
        .map(|n| (n.entity_id.as_str(), n))
        .collect();

    if !nodes_by_id.contains_key(entity_id) {
        return Err(DevacError::EntityNotFound(entity_id.to_string()));
    }

    let mut callees_of: HashMap<&str, Vec<&str>> = HashMap::new();
    let mut callers_of: HashMap<&str, Vec<&str>> = HashMap::new();
    for edge in merged.edges.iter().filter(|e| e.edge_type == "CALLS") {
        callees_of
            .entry(edge.source_entity_id.as_str())
            .or_default()
            .push(edge.target_entity_id.as_str());
        callers_of
            .entry(edge.target_entity_id.as_str())
            .or_default()
            .push(edge.source_entity_id.as_str());
    }

    let mut entries: Vec<CallGraphEntry> = Vec::new();
    let mut truncated = false;

    let mut walks: Vec<(CallDirection, &HashMap<&str, Vec<&str>>)> = Vec::new();
    if matches!(direction, CallDirection::Callers | CallDirection::Both) {
        walks.push((CallDirection::Callers, &callers_of));
    }
    if matches!(direction, CallDirection::Callees | CallDirection::Both) {
        walks.push((CallDirection::Callees, &callees_of));
    }

    'walks: for (walk_direction, adjacency) in walks {
        let mut visited: HashSet<&str> = HashSet::new();
        visited.insert(entity_id);
        let mut queue: VecDeque<(&str, u32)> = VecDeque::new();
        queue.push_back((entity_id, 0));

        while let Some((current, depth)) = queue.pop_front() {
            let Some(neighbors) = adjacency.get(current) else {
                continue;
            };
            for &neighbor in neighbors {
                if !visited.insert(neighbor) {
                    continue;
                }
                queue.push_back((neighbor, depth + 1));

                let Some(node) = nodes_by_id.get(neighbor) else {
                    continue;
                };
                if entries.len() >= cap {
                    truncated = true;
                    break 'walks;
                }
                entries.push(CallGraphEntry {
                    entity_id: node.entity_id.clone(),
                    name: node.name.clone(),
                    file_path: node.file_path.clone(),
                    start_line: node.start_line,
                    depth: depth + 1,
                    direction: walk_direction,
                });
            }
        }
    }

    entries.sort_by(|a, b| (a.depth, &a.entity_id).cmp(&(b.depth, &b.entity_id)));

    Ok(CallGraph {
        root: entity_id.to_string(),
        entries,
        truncated,
    })
}
