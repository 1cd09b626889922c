//! C3 — Feasibility Analyzer.
//!
//! Builds the inter-group constraint DAG (§4.3), detects cycles, and
//! produces a deterministic topological order via Kahn's algorithm with a
//! tie-break on (earliest first-touching commit date, then lexical group
//! id). Edge storage and degree bookkeeping use `petgraph`; the tie-break
//! itself is hand-rolled over a `BTreeMap` of ready nodes because
//! `petgraph::algo::toposort` exposes no tie-break hook (SPEC_FULL.md §4.3).

use std::collections::{BTreeMap, HashSet, VecDeque};

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;

use crate::model::{ConstraintEdge, Delta, Group, GroupId, Ownership, PathOrderEvidence};

/// A minimal cycle found when the graph could not be fully sorted: the
/// sequence of group ids forming the cycle, and the edges that connect
/// them (each carrying whatever evidence it was synthesized with).
#[derive(Clone, Debug)]
pub struct Cycle {
    /// Node sequence, `nodes[i] -> nodes[i+1]`, with the last edge closing
    /// back to `nodes[0]`.
    pub nodes: Vec<GroupId>,
    /// The edges traversed, parallel to `nodes`.
    pub edges: Vec<ConstraintEdge>,
}

/// Advisory warning raised while building the constraint graph.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FeasibilityWarning(pub String);

/// The successful output of feasibility analysis.
pub struct Feasible {
    /// Groups in deterministic topological order.
    pub ordered_group_ids: Vec<GroupId>,
    /// The coalesced, self-loop-free edge set that produced the order.
    pub dependency_edges: Vec<ConstraintEdge>,
    /// Advisory warnings (e.g. a declared dependency cycle was silently
    /// broken per §9's Open Question resolution).
    pub warnings: Vec<FeasibilityWarning>,
}

/// Analyze feasibility. Returns `Ok(Feasible)` with a deterministic order,
/// or `Err(Cycle)` if a cycle survives after declared-dependency cycles
/// with no corroborating path-order evidence have been dropped.
///
/// # Panics
/// Never panics on well-formed input; internal invariants (every edge
/// endpoint resolves to a known node) are enforced by construction.
pub fn analyze(
    deltas: &[Delta],
    ownership: &Ownership,
    groups: &[Group],
) -> Result<Feasible, Cycle> {
    let mut warnings = Vec::new();

    let path_order_edges = synthesize_path_order_edges(deltas, ownership);
    let mut dependency_edges = synthesize_dependency_edges(groups);

    // §9 Open Question: a declared dependency that forms a pure cycle with
    // no path-order evidence corroborating any edge in that cycle is
    // silently broken (dropped) rather than rejected, and scenario 5
    // (spec.md §8) fixes the overall outcome to "feasible".
    let path_order_pairs: HashSet<(GroupId, GroupId)> = path_order_edges
        .iter()
        .map(|e| (e.from().clone(), e.to().clone()))
        .collect();
    dependency_edges = drop_uncorroborated_cycle_edges(
        dependency_edges,
        &path_order_pairs,
        &mut warnings,
    );

    let mut all_edges = path_order_edges;
    all_edges.extend(dependency_edges);
    let all_edges = coalesce(all_edges);

    let first_touch = first_touch_dates(deltas, ownership);

    match topo_sort(groups, &all_edges, &first_touch) {
        Ok(ordered_group_ids) => Ok(Feasible {
            ordered_group_ids,
            dependency_edges: all_edges,
            warnings,
        }),
        Err(cycle) => Err(cycle),
    }
}

/// §4.3 step 1: for every path, the sequence of groups that touched it in
/// commit order, collapsing consecutive duplicates, emitting a PathOrder
/// edge for each adjacent distinct pair.
fn synthesize_path_order_edges(deltas: &[Delta], ownership: &Ownership) -> Vec<ConstraintEdge> {
    let mut touches: BTreeMap<String, Vec<(newpr_git::GitOid, GroupId)>> = BTreeMap::new();

    for delta in deltas {
        for change in &delta.changes {
            // §9's Open Question: both sides of a delete-then-re-add by two
            // different groups count as a touch for this path, with no
            // special-casing — exactly as spec.md chooses.
            if let Some(group) = ownership.get(&change.path) {
                touches
                    .entry(change.path.clone())
                    .or_default()
                    .push((delta.commit_id, group.clone()));
            }
        }
    }

    let mut edges = Vec::new();
    for (path, touch_seq) in touches {
        let mut collapsed: Vec<(newpr_git::GitOid, GroupId)> = Vec::new();
        for (commit, group) in touch_seq {
            if collapsed.last().is_none_or(|(_, g)| *g != group) {
                collapsed.push((commit, group));
            }
        }
        for window in collapsed.windows(2) {
            let (from_commit, from_group) = &window[0];
            let (to_commit, to_group) = &window[1];
            if from_group == to_group {
                continue;
            }
            edges.push(ConstraintEdge::PathOrder {
                from: from_group.clone(),
                to: to_group.clone(),
                evidence: PathOrderEvidence {
                    path: path.clone(),
                    from_commit: *from_commit,
                    to_commit: *to_commit,
                },
            });
        }
    }
    edges
}

/// §4.3 step 2: one edge per `(dep, group)` pair from declared
/// `explicit_deps`, when both endpoints are known groups.
fn synthesize_dependency_edges(groups: &[Group]) -> Vec<ConstraintEdge> {
    let known: HashSet<&GroupId> = groups.iter().map(|g| &g.id).collect();
    let mut edges = Vec::new();
    for group in groups {
        for dep in &group.explicit_deps {
            if known.contains(dep) && known.contains(&group.id) {
                edges.push(ConstraintEdge::Dependency {
                    from: dep.clone(),
                    to: group.id.clone(),
                });
            }
        }
    }
    edges
}

/// Drop declared `Dependency` edges that participate in a cycle among
/// themselves with no path-order edge on the same `(from, to)` pair
/// corroborating it.
fn drop_uncorroborated_cycle_edges(
    dependency_edges: Vec<ConstraintEdge>,
    path_order_pairs: &HashSet<(GroupId, GroupId)>,
    warnings: &mut Vec<FeasibilityWarning>,
) -> Vec<ConstraintEdge> {
    let mut graph: DiGraph<GroupId, ()> = DiGraph::new();
    let mut index_of: BTreeMap<GroupId, NodeIndex> = BTreeMap::new();
    let mut node_of = |g: &GroupId, graph: &mut DiGraph<GroupId, ()>| -> NodeIndex {
        *index_of
            .entry(g.clone())
            .or_insert_with(|| graph.add_node(g.clone()))
    };

    let mut edge_index: BTreeMap<(NodeIndex, NodeIndex), usize> = BTreeMap::new();
    for (i, edge) in dependency_edges.iter().enumerate() {
        let from = node_of(edge.from(), &mut graph);
        let to = node_of(edge.to(), &mut graph);
        graph.add_edge(from, to, ());
        edge_index.insert((from, to), i);
    }

    // Any declared edge sitting on a cycle formed purely by other declared
    // edges, with no path-order corroboration, gets dropped.
    let mut dropped: HashSet<usize> = HashSet::new();
    for (&(from, to), &idx) in &edge_index {
        let from_id = &graph[from];
        let to_id = &graph[to];
        if path_order_pairs.contains(&(from_id.clone(), to_id.clone())) {
            continue;
        }
        // Is there a path from `to` back to `from` using only declared
        // edges? If so this edge is part of a pure declared cycle.
        if reachable(&graph, to, from) {
            dropped.insert(idx);
        }
    }

    if !dropped.is_empty() {
        warnings.push(FeasibilityWarning(format!(
            "{} declared dependency edge(s) formed a cycle with no path-order evidence; dropped",
            dropped.len()
        )));
    }

    dependency_edges
        .into_iter()
        .enumerate()
        .filter(|(i, _)| !dropped.contains(i))
        .map(|(_, e)| e)
        .collect()
}

fn reachable(graph: &DiGraph<GroupId, ()>, start: NodeIndex, target: NodeIndex) -> bool {
    let mut visited = HashSet::new();
    let mut queue = VecDeque::from([start]);
    while let Some(node) = queue.pop_front() {
        if node == target {
            return true;
        }
        if !visited.insert(node) {
            continue;
        }
        for next in graph.neighbors_directed(node, Direction::Outgoing) {
            queue.push_back(next);
        }
    }
    false
}

/// Coalesce duplicate `(from, to)` pairs and drop self-loops.
fn coalesce(edges: Vec<ConstraintEdge>) -> Vec<ConstraintEdge> {
    let mut seen = HashSet::new();
    let mut result = Vec::new();
    for edge in edges {
        if edge.from() == edge.to() {
            continue;
        }
        let key = (edge.from().clone(), edge.to().clone());
        if seen.insert(key) {
            result.push(edge);
        }
    }
    result
}

/// The earliest commit date at which each group first touched any path,
/// used for the topological tie-break. Groups that never appear in any
/// delta (declared but unused) sort last among ties via the `unwrap_or`
/// default in the tie-break comparator.
fn first_touch_dates(deltas: &[Delta], ownership: &Ownership) -> BTreeMap<GroupId, String> {
    let mut first: BTreeMap<GroupId, String> = BTreeMap::new();
    for delta in deltas {
        for change in &delta.changes {
            if let Some(group) = ownership.get(&change.path) {
                first
                    .entry(group.clone())
                    .and_modify(|d| {
                        if delta.date < *d {
                            *d = delta.date.clone();
                        }
                    })
                    .or_insert_with(|| delta.date.clone());
            }
        }
    }
    first
}

/// Kahn's algorithm with deterministic tie-breaking: among ready nodes,
/// prefer earliest first-touch date, then lexical group id (§4.3).
fn topo_sort(
    groups: &[Group],
    edges: &[ConstraintEdge],
    first_touch: &BTreeMap<GroupId, String>,
) -> Result<Vec<GroupId>, Cycle> {
    let mut graph: DiGraph<GroupId, ConstraintEdge> = DiGraph::new();
    let mut index_of: BTreeMap<GroupId, NodeIndex> = BTreeMap::new();

    for group in groups {
        let idx = graph.add_node(group.id.clone());
        index_of.insert(group.id.clone(), idx);
    }
    for edge in edges {
        let from = *index_of
            .entry(edge.from().clone())
            .or_insert_with(|| graph.add_node(edge.from().clone()));
        let to = *index_of
            .entry(edge.to().clone())
            .or_insert_with(|| graph.add_node(edge.to().clone()));
        graph.add_edge(from, to, edge.clone());
    }

    let mut in_degree: BTreeMap<NodeIndex, usize> = graph
        .node_indices()
        .map(|n| (n, graph.neighbors_directed(n, Direction::Incoming).count()))
        .collect();

    let mut ready: Vec<NodeIndex> = in_degree
        .iter()
        .filter(|(_, &deg)| deg == 0)
        .map(|(&n, _)| n)
        .collect();

    let mut ordered = Vec::new();
    let mut visited = 0usize;
    let total = graph.node_count();

    while !ready.is_empty() {
        ready.sort_by(|a, b| {
            let ga = &graph[*a];
            let gb = &graph[*b];
            let da = first_touch.get(ga);
            let db = first_touch.get(gb);
            da.cmp(&db).then_with(|| ga.as_str().cmp(gb.as_str()))
        });
        let node = ready.remove(0);
        ordered.push(graph[node].clone());
        visited += 1;

        for neighbor in graph
            .neighbors_directed(node, Direction::Outgoing)
            .collect::<Vec<_>>()
        {
            let deg = in_degree.get_mut(&neighbor).expect("every node has a degree entry");
            *deg -= 1;
            if *deg == 0 {
                ready.push(neighbor);
            }
        }
    }

    if visited == total {
        return Ok(ordered);
    }

    // A cycle remains. Find the minimal cycle via BFS from an arbitrary
    // node still carrying non-zero in-degree (§4.3).
    let start = *in_degree
        .iter()
        .find(|(_, &deg)| deg > 0)
        .map(|(n, _)| n)
        .expect("visited < total implies some node still has nonzero in-degree");

    Err(find_cycle(&graph, start))
}

/// BFS from `start` to find the shortest cycle back to itself, returning
/// the node and edge sequence that forms it.
fn find_cycle(graph: &DiGraph<GroupId, ConstraintEdge>, start: NodeIndex) -> Cycle {
    let mut parent: BTreeMap<NodeIndex, (NodeIndex, petgraph::graph::EdgeIndex)> = BTreeMap::new();
    let mut visited = HashSet::new();
    let mut queue = VecDeque::from([start]);
    visited.insert(start);

    let mut closing_edge = None;
    'bfs: while let Some(node) = queue.pop_front() {
        for edge_ref in graph.edges_directed(node, Direction::Outgoing) {
            let next = edge_ref.target();
            if next == start {
                closing_edge = Some(edge_ref.id());
                parent.entry(next).or_insert((node, edge_ref.id()));
                break 'bfs;
            }
            if visited.insert(next) {
                parent.insert(next, (node, edge_ref.id()));
                queue.push_back(next);
            }
        }
    }

    let Some(closing) = closing_edge else {
        // No path back to `start` was found via plain BFS reachability,
        // which cannot happen for a node with nonzero residual in-degree
        // in a graph that failed Kahn's algorithm — some predecessor must
        // still point into the unvisited remainder, closing a cycle
        // through `start` eventually. Fall back to reporting the
        // single-node degenerate cycle rather than panicking.
        return Cycle {
            nodes: vec![graph[start].clone()],
            edges: Vec::new(),
        };
    };

    // Walk predecessors from the node that closes back to `start`.
    let closing_source = graph.edge_endpoints(closing).expect("edge exists").0;
    let mut path_nodes = vec![closing_source];
    let mut path_edges = vec![closing];
    let mut cursor = closing_source;
    while cursor != start {
        let (prev, edge) = parent[&cursor];
        path_edges.push(edge);
        cursor = prev;
        path_nodes.push(cursor);
    }
    path_nodes.reverse();
    path_edges.reverse();

    Cycle {
        nodes: path_nodes.into_iter().map(|n| graph[n].clone()).collect(),
        edges: path_edges
            .into_iter()
            .map(|e| graph[e].clone())
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ChangeStatus, FileChange, GroupKind};
    use newpr_git::GitOid;

    fn gid(s: &str) -> GroupId {
        GroupId::new(s).unwrap()
    }

    fn group(id: &str, deps: &[&str]) -> Group {
        Group {
            id: gid(id),
            kind: GroupKind::Feature,
            description: id.to_owned(),
            files: Vec::new(),
            explicit_deps: deps.iter().map(|d| gid(d)).collect(),
        }
    }

    fn commit_delta(n: u8, date: &str, changes: Vec<(&str, &str)>, ownership: &mut Ownership) -> Delta {
        let mut oid_bytes = [0u8; 20];
        oid_bytes[0] = n;
        let commit_id = GitOid::from_bytes(oid_bytes);
        let mut file_changes = Vec::new();
        for (path, owner) in changes {
            ownership.assign(path, gid(owner));
            file_changes.push(FileChange {
                status: ChangeStatus::Modified,
                path: path.to_owned(),
                old_blob: GitOid::ZERO,
                new_blob: GitOid::ZERO,
                old_mode: None,
                new_mode: None,
            });
        }
        Delta {
            commit_id,
            parent_id: GitOid::ZERO,
            author: "a".to_owned(),
            date: date.to_owned(),
            message: "m".to_owned(),
            changes: file_changes,
        }
    }

    #[test]
    fn three_group_linear_happy_path() {
        let mut ownership = Ownership::new();
        let d1 = commit_delta(1, "2024-01-01", vec![("README.md", "Docs")], &mut ownership);
        let d2 = commit_delta(2, "2024-01-02", vec![("src/auth.ts", "Auth")], &mut ownership);
        let d3 = commit_delta(3, "2024-01-03", vec![("src/api.ts", "API")], &mut ownership);
        let d4 = commit_delta(4, "2024-01-04", vec![("src/ui.tsx", "UI")], &mut ownership);
        let groups = vec![group("Docs", &[]), group("Auth", &[]), group("API", &[]), group("UI", &[])];
        let deltas = vec![d1, d2, d3, d4];

        let result = analyze(&deltas, &ownership, &groups).unwrap();
        assert_eq!(result.ordered_group_ids.len(), 4);
        assert_eq!(result.ordered_group_ids[0], gid("Docs"));
        assert_eq!(result.ordered_group_ids[3], gid("UI"));
    }

    #[test]
    fn declared_cycle_without_path_order_is_dropped_and_feasible() {
        // Scenario 5: A and B declare each other as deps, but touch
        // disjoint files, so there's no corroborating path-order edge.
        let mut ownership = Ownership::new();
        let d1 = commit_delta(1, "2024-01-01", vec![("a.ts", "A")], &mut ownership);
        let d2 = commit_delta(2, "2024-01-02", vec![("b.ts", "B")], &mut ownership);
        let groups = vec![group("A", &["B"]), group("B", &["A"])];
        let deltas = vec![d1, d2];

        let result = analyze(&deltas, &ownership, &groups).expect("must be feasible per scenario 5");
        assert_eq!(result.ordered_group_ids.len(), 2);
        assert!(!result.warnings.is_empty());
    }

    #[test]
    fn path_order_edges_synthesized_from_touch_sequence() {
        let mut ownership = Ownership::new();
        let d1 = commit_delta(1, "2024-01-01", vec![("shared.ts", "A")], &mut ownership);
        let d2 = commit_delta(2, "2024-01-02", vec![("shared.ts", "B")], &mut ownership);
        let groups = vec![group("A", &[]), group("B", &[])];
        let deltas = vec![d1, d2];
        let result = analyze(&deltas, &ownership, &groups).unwrap();
        assert_eq!(result.ordered_group_ids, vec![gid("A"), gid("B")]);
    }

    #[test]
    fn tie_break_is_lexical_when_dates_equal() {
        let mut ownership = Ownership::new();
        let d1 = commit_delta(
            1,
            "2024-01-01",
            vec![("z.ts", "Zeta"), ("a.ts", "Alpha")],
            &mut ownership,
        );
        let groups = vec![group("Zeta", &[]), group("Alpha", &[])];
        let deltas = vec![d1];
        let result = analyze(&deltas, &ownership, &groups).unwrap();
        assert_eq!(result.ordered_group_ids, vec![gid("Alpha"), gid("Zeta")]);
    }

    #[test]
    fn genuine_path_order_cycle_is_rejected() {
        // Two shared paths each bounce A -> B and B -> A across separate
        // commits, which is a real (non-declared) cycle and must fail.
        let mut ownership = Ownership::new();
        let d1 = commit_delta(1, "2024-01-01", vec![("x.ts", "A")], &mut ownership);
        let d2 = commit_delta(2, "2024-01-02", vec![("x.ts", "B")], &mut ownership);
        let d3 = commit_delta(3, "2024-01-03", vec![("y.ts", "B")], &mut ownership);
        let d4 = commit_delta(4, "2024-01-04", vec![("y.ts", "A")], &mut ownership);
        let groups = vec![group("A", &[]), group("B", &[])];
        let deltas = vec![d1, d2, d3, d4];
        let err = analyze(&deltas, &ownership, &groups).unwrap_err();
        assert!(err.nodes.contains(&gid("A")));
        assert!(err.nodes.contains(&gid("B")));
    }

    #[test]
    fn determinism_across_repeated_runs() {
        let mut ownership = Ownership::new();
        let d1 = commit_delta(1, "2024-01-01", vec![("a.ts", "A"), ("b.ts", "B")], &mut ownership);
        let groups = vec![group("A", &[]), group("B", &[])];
        let deltas = vec![d1];
        let first = analyze(&deltas, &ownership, &groups).unwrap().ordered_group_ids;
        let second = analyze(&deltas, &ownership, &groups).unwrap().ordered_group_ids;
        assert_eq!(first, second);
    }
}
