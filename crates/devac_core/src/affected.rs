//! Change-impact analysis: which files depend on a set of changed files.
//!
//! Traversal runs over the persisted merged view, breadth-first along the
//! "referenced-by" direction: an edge `source -> target` means the source
//! depends on the target, so when a target changes, the edge's source file
//! is affected. Depth is counted in edge hops with explicit frontier and
//! visited structures; mutually recursive call graphs are an expected
//! case, so nothing here recurses.

use crate::error::Result;
use crate::store::SeedStore;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fmt;

/// How far from the change a file was first reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImpactClass {
    /// One hop from a changed symbol.
    Direct,
    /// More than one hop.
    Transitive,
}

impl ImpactClass {
    fn from_depth(depth: u32) -> Self {
        if depth <= 1 {
            ImpactClass::Direct
        } else {
            ImpactClass::Transitive
        }
    }

    /// Stable lowercase label.
    pub fn as_str(&self) -> &'static str {
        match self {
            ImpactClass::Direct => "direct",
            ImpactClass::Transitive => "transitive",
        }
    }
}

impl fmt::Display for ImpactClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A symbol defined in one of the changed files (depth 0).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangedSymbol {
    pub entity_id: String,
    pub name: String,
    pub kind: String,
    pub file_path: String,
}

/// A file reached from a changed symbol within the depth bound.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AffectedFile {
    pub file_path: String,
    /// Minimum reachable depth across all symbols the file defines.
    pub depth: u32,
    pub classification: ImpactClass,
}

/// Complete result of one affected-files analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AffectedReport {
    /// Depth-0 set: every symbol the changed files define.
    pub changed_symbols: Vec<ChangedSymbol>,
    /// Files reachable along "referenced-by" edges, ordered by
    /// (depth, path).
    pub affected_files: Vec<AffectedFile>,
    /// The bound the traversal ran with.
    pub max_depth: u32,
}

impl AffectedReport {
    fn empty(max_depth: u32) -> Self {
        Self {
            changed_symbols: Vec::new(),
            affected_files: Vec::new(),
            max_depth,
        }
    }
}

/// Computes the files affected by changes to `changed_files`.
///
/// Edge-case policy: an empty input yields an empty report without
/// touching storage; changed files matching no nodes contribute nothing;
/// `max_depth == 0` reports only the changed symbols. Any storage failure
/// aborts the whole analysis; a partial affected set is never reported
/// as complete.
///
/// A file whose symbols are all in the depth-0 set is excluded unless an
/// edge from one of its symbols reaches a changed symbol, in which case
/// it appears at that hop depth like any other file.
pub fn analyze_affected(
    store: &SeedStore,
    changed_files: &[String],
    max_depth: u32,
) -> Result<AffectedReport> {
    if changed_files.is_empty() {
        return Ok(AffectedReport::empty(max_depth));
    }

    let merged = store.read_merged()?;
    let changed_set: BTreeSet<&str> = changed_files.iter().map(|f| f.as_str()).collect();

    // Depth-0 frontier: every symbol the changed files define.
    let mut changed_symbols = Vec::new();
    let mut frontier: Vec<&str> = Vec::new();
    for node in &merged.nodes {
        if changed_set.contains(node.file_path.as_str()) {
            changed_symbols.push(ChangedSymbol {
                entity_id: node.entity_id.clone(),
                name: node.name.clone(),
                kind: node.kind.clone(),
                file_path: node.file_path.clone(),
            });
            frontier.push(node.entity_id.as_str());
        }
    }

    // Reverse adjacency: target -> [(source entity, owning file)].
    let mut referenced_by: HashMap<&str, Vec<(&str, &str)>> = HashMap::new();
    for edge in &merged.edges {
        referenced_by
            .entry(edge.target_entity_id.as_str())
            .or_default()
            .push((
                edge.source_entity_id.as_str(),
                edge.source_file_path.as_str(),
            ));
    }

    let mut visited: HashSet<&str> = frontier.iter().copied().collect();
    let mut file_depths: BTreeMap<&str, u32> = BTreeMap::new();
    let mut depth = 0u32;

    while !frontier.is_empty() && depth < max_depth {
        depth += 1;
        let mut next: Vec<&str> = Vec::new();

        for target in frontier {
            let Some(sources) = referenced_by.get(target) else {
                continue;
            };
            for &(source, file) in sources {
                // First-seen depth wins; a file recorded shallower is
                // never revisited deeper. Edge type does not participate.
                file_depths.entry(file).or_insert(depth);
                if visited.insert(source) {
                    next.push(source);
                }
            }
        }

        frontier = next;
    }

    let affected_files = file_depths
        .into_iter()
        .map(|(file_path, depth)| AffectedFile {
            file_path: file_path.to_string(),
            depth,
            classification: ImpactClass::from_depth(depth),
        })
        .collect::<Vec<_>>();

    let mut report = AffectedReport {
        changed_symbols,
        affected_files,
        max_depth,
    };
    report
        .affected_files
        .sort_by(|a, b| (a.depth, &a.file_path).cmp(&(b.depth, &b.file_path)));
    Ok(report)
}
