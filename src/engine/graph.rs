//! Rule dependency graph.
//!
//! Turns the flat list of parsed [`RuleItem`]s into an execution order, or
//! into every structural problem found along the way. Nodes are top-level
//! rules and blocks, addressed by `NodeId` (an index into the node arena);
//! block members share the identifier namespace but not the ordering, so an
//! `After` naming a member resolves to the member's block.
//!
//! ```text
//! items ──▶ register ids ──▶ resolve After ──▶ SCC scan ──▶ tag deps ──▶ ordered sort
//!            DuplicateId     UnknownAfter      Circular
//! ```
//!
//! Besides declared `After` entries, an item that reads `{kind}` is ordered
//! after the items producing `kind` when that does not contradict the
//! declared order.
//!
//! Every check runs regardless of earlier failures, and errors come out in a
//! stable order: duplicates, then unknown references, then cycles.
//!
//! ## Invariants
//!
//! - `deps[n]` lists the nodes `n` runs after, deduplicated: declared
//!   entries first, then implicit tag dependencies.
//! - One `CircularDependency` error per strongly connected component that has
//!   more than one node or a self-loop.
//! - Ties in the order are broken by discovery index, so the result only
//!   depends on the input order.

use crate::error::{LoadError, LoadErrorKind, SourceLocation};
use crate::rule::RuleItem;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use tracing::{debug, trace};

/// Arena index of a top-level rule or block.
pub(crate) type NodeId = usize;

/// Validated dependency graph over top-level items.
#[derive(Debug)]
pub(crate) struct RuleGraph {
    items: Vec<RuleItem>,
    deps: Vec<Vec<NodeId>>,
}

impl RuleGraph {
    /// Validate `items` and build the graph. Fails with every structural error
    /// found; never returns a partial graph.
    pub(crate) fn build(items: Vec<RuleItem>) -> Result<RuleGraph, Vec<LoadError>> {
        let mut errors = Vec::new();

        // Identifier namespace: id -> owning node. Duplicates are reported and
        // left out of the graph.
        let mut owners: HashMap<String, (NodeId, SourceLocation)> = HashMap::new();
        let mut entries: Vec<(RuleItem, bool)> = Vec::with_capacity(items.len());
        let mut accepted_count = 0;
        for item in items {
            let node = accepted_count;
            let accepted = register(&mut owners, item.id(), node, item.location(), &mut errors);
            for member in item.members() {
                // Members of a rejected block are still checked, but own nothing.
                let owner = if accepted { node } else { NodeId::MAX };
                register(&mut owners, &member.id, owner, &member.location, &mut errors);
            }
            if accepted {
                accepted_count += 1;
            }
            entries.push((item, accepted));
        }
        owners.retain(|_, (owner, _)| *owner != NodeId::MAX);

        // Rejected duplicates still get their references checked; only
        // accepted items contribute edges.
        let mut nodes: Vec<RuleItem> = Vec::with_capacity(accepted_count);
        let mut deps: Vec<Vec<NodeId>> = Vec::with_capacity(accepted_count);
        for (item, accepted) in entries {
            let mut item_deps = Vec::new();
            let member_after = item.members().iter().flat_map(|m| m.after.iter().map(move |a| (a, &m.location)));
            let own_after = item.after().iter().map(|a| (a, item.location()));
            for (target, location) in own_after.chain(member_after) {
                match owners.get(target) {
                    Some((dep, _)) => {
                        if accepted && !item_deps.contains(dep) {
                            item_deps.push(*dep);
                        }
                    }
                    None => errors.push(LoadError::new(
                        LoadErrorKind::UnknownAfterReference,
                        format!("`{}` runs after unknown rule `{}`", item.id(), target),
                        location.clone(),
                    )),
                }
            }
            if accepted {
                nodes.push(item);
                deps.push(item_deps);
            }
        }

        for cycle in find_cycles(&deps) {
            let detail = match cycle.as_slice() {
                [only] => format!("rule `{}` runs after itself", nodes[*only].id()),
                _ => {
                    let ids: Vec<String> = cycle.iter().map(|&n| format!("`{}`", nodes[n].id())).collect();
                    format!("rules {} depend on each other", ids.join(", "))
                }
            };
            errors.push(LoadError::new(LoadErrorKind::CircularDependency, detail, nodes[cycle[0]].location().clone()));
        }

        if !errors.is_empty() {
            return Err(errors);
        }
        add_tag_dependencies(&nodes, &mut deps);
        Ok(RuleGraph { items: nodes, deps })
    }

    pub(crate) fn len(&self) -> usize {
        self.items.len()
    }

    /// Consume the graph into its items in execution order.
    ///
    /// Kahn's algorithm over a min-heap of discovery indices: among the nodes
    /// whose dependencies have all run, the earliest declared goes first.
    pub(crate) fn into_ordered(self) -> Vec<RuleItem> {
        let n = self.items.len();
        let mut pending: Vec<usize> = self.deps.iter().map(Vec::len).collect();
        let mut dependents: Vec<Vec<NodeId>> = vec![Vec::new(); n];
        for (node, deps) in self.deps.iter().enumerate() {
            for &dep in deps {
                dependents[dep].push(node);
            }
        }

        let mut ready: BinaryHeap<Reverse<NodeId>> = (0..n).filter(|&i| pending[i] == 0).map(Reverse).collect();
        let mut order = Vec::with_capacity(n);
        while let Some(Reverse(node)) = ready.pop() {
            order.push(node);
            for &next in &dependents[node] {
                pending[next] -= 1;
                if pending[next] == 0 {
                    ready.push(Reverse(next));
                }
            }
        }

        let mut slots: Vec<Option<RuleItem>> = self.items.into_iter().map(Some).collect();
        order.into_iter().filter_map(|i| slots[i].take()).collect()
    }
}

/// Order readers of a tag kind after the items that produce it.
///
/// A rule whose pattern or guards look at `{kind}` runs after every other
/// item with a rule producing `kind`, unless that item already (directly or
/// not) runs after the reader; declared `After` entries always win. Edges are
/// added one at a time in node order, so the graph stays acyclic.
fn add_tag_dependencies(nodes: &[RuleItem], deps: &mut [Vec<NodeId>]) {
    for reader in 0..nodes.len() {
        for producer in 0..nodes.len() {
            if producer == reader || deps[reader].contains(&producer) {
                continue;
            }
            let feeds = nodes[reader]
                .rules()
                .iter()
                .any(|r| nodes[producer].rules().iter().any(|p| r.reads_output_of(p)));
            if !feeds {
                continue;
            }
            if depends_on(deps, producer, reader) {
                debug!(
                    reader = nodes[reader].id(),
                    producer = nodes[producer].id(),
                    "tag dependency conflicts with declared order; keeping declared order"
                );
                continue;
            }
            trace!(reader = nodes[reader].id(), producer = nodes[producer].id(), "implicit tag dependency");
            deps[reader].push(producer);
        }
    }
}

/// True when `from` runs after `to`, directly or through other nodes.
fn depends_on(deps: &[Vec<NodeId>], from: NodeId, to: NodeId) -> bool {
    let mut seen = vec![false; deps.len()];
    let mut stack = vec![from];
    while let Some(node) = stack.pop() {
        if node == to {
            return true;
        }
        if !std::mem::replace(&mut seen[node], true) {
            stack.extend(deps[node].iter().copied());
        }
    }
    false
}

/// Claim `id` for `owner`; report a duplicate if it is already taken.
fn register(
    owners: &mut HashMap<String, (NodeId, SourceLocation)>,
    id: &str,
    owner: NodeId,
    location: &SourceLocation,
    errors: &mut Vec<LoadError>,
) -> bool {
    if let Some((_, first)) = owners.get(id) {
        errors.push(LoadError::new(
            LoadErrorKind::DuplicateId,
            format!("`{}` is already defined in {}", id, first),
            location.clone(),
        ));
        return false;
    }
    owners.insert(id.to_string(), (owner, location.clone()));
    true
}

/// Strongly connected components that form cycles, each sorted by node id,
/// ordered by their smallest node id.
fn find_cycles(deps: &[Vec<NodeId>]) -> Vec<Vec<NodeId>> {
    let mut tarjan = Tarjan {
        deps,
        index: vec![None; deps.len()],
        low: vec![0; deps.len()],
        on_stack: vec![false; deps.len()],
        stack: Vec::new(),
        next_index: 0,
        components: Vec::new(),
    };
    for node in 0..deps.len() {
        if tarjan.index[node].is_none() {
            tarjan.visit(node);
        }
    }

    let mut cycles: Vec<Vec<NodeId>> = tarjan
        .components
        .into_iter()
        .filter(|c| c.len() > 1 || deps[c[0]].contains(&c[0]))
        .map(|mut c| {
            c.sort_unstable();
            c
        })
        .collect();
    cycles.sort_by_key(|c| c[0]);
    cycles
}

struct Tarjan<'a> {
    deps: &'a [Vec<NodeId>],
    index: Vec<Option<usize>>,
    low: Vec<usize>,
    on_stack: Vec<bool>,
    stack: Vec<NodeId>,
    next_index: usize,
    components: Vec<Vec<NodeId>>,
}

impl Tarjan<'_> {
    fn visit(&mut self, node: NodeId) {
        self.index[node] = Some(self.next_index);
        self.low[node] = self.next_index;
        self.next_index += 1;
        self.stack.push(node);
        self.on_stack[node] = true;

        let deps = self.deps;
        for &dep in &deps[node] {
            match self.index[dep] {
                None => {
                    self.visit(dep);
                    self.low[node] = self.low[node].min(self.low[dep]);
                }
                Some(idx) if self.on_stack[dep] => self.low[node] = self.low[node].min(idx),
                Some(_) => {}
            }
        }

        if Some(self.low[node]) == self.index[node] {
            let mut component = Vec::new();
            while let Some(top) = self.stack.pop() {
                self.on_stack[top] = false;
                component.push(top);
                if top == node {
                    break;
                }
            }
            self.components.push(component);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pattern::Pattern;
    use crate::rule::{BlockMode, Guard, GuardScope, RuleBlock, RuleDescriptor, RuleFlags};

    fn rule(id: &str, after: &[&str]) -> RuleDescriptor {
        RuleDescriptor {
            id: id.to_string(),
            pattern: Pattern::parse("<x>", false).unwrap(),
            tag_kind: Some("date".to_string()),
            after: after.iter().map(|s| s.to_string()).collect(),
            block: None,
            guards: Vec::new(),
            flags: RuleFlags::empty(),
            location: SourceLocation::rule(format!("{id}.rule"), id),
        }
    }

    fn block(id: &str, after: &[&str], members: &[&str]) -> RuleItem {
        RuleItem::Block(RuleBlock {
            id: id.to_string(),
            after: after.iter().map(|s| s.to_string()).collect(),
            mode: BlockMode::RunAll,
            members: members
                .iter()
                .map(|m| RuleDescriptor { block: Some(id.to_string()), ..rule(m, &[]) })
                .collect(),
            location: SourceLocation::rule(format!("{id}.ruleblock"), id),
        })
    }

    fn ids(items: Vec<RuleItem>) -> Vec<String> {
        RuleGraph::build(items).unwrap().into_ordered().iter().map(|i| i.id().to_string()).collect()
    }

    fn kinds(items: Vec<RuleItem>) -> Vec<LoadErrorKind> {
        RuleGraph::build(items).unwrap_err().iter().map(|e| e.kind).collect()
    }

    #[test]
    fn unconstrained_rules_keep_discovery_order() {
        let items = vec![rule("c", &[]).into(), rule("a", &[]).into(), rule("b", &[]).into()];
        assert_eq!(ids(items), vec!["c", "a", "b"]);
    }

    #[test]
    fn after_constraints_reorder() {
        let items = vec![
            rule("relative", &["weekday", "number"]).into(),
            rule("weekday", &[]).into(),
            rule("number", &[]).into(),
            rule("free", &[]).into(),
        ];
        assert_eq!(ids(items), vec!["weekday", "number", "relative", "free"]);
    }

    #[test]
    fn ordering_is_stable_for_chains() {
        let items = vec![rule("c", &["b"]).into(), rule("b", &["a"]).into(), rule("a", &[]).into(), rule("d", &[]).into()];
        assert_eq!(ids(items), vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn duplicate_and_unknown_reference_are_both_reported() {
        let items = vec![rule("a", &["missing"]).into(), rule("b", &[]).into(), rule("b", &[]).into()];
        let errors = RuleGraph::build(items).unwrap_err();
        assert_eq!(errors.len(), 2);
        assert_eq!(errors[0].kind, LoadErrorKind::DuplicateId);
        assert!(errors[0].detail.contains("`b` is already defined in b.rule"));
        assert_eq!(errors[1].kind, LoadErrorKind::UnknownAfterReference);
        assert!(errors[1].detail.contains("`missing`"));
    }

    #[test]
    fn every_duplicate_occurrence_is_an_error() {
        let items = vec![rule("a", &[]).into(), rule("a", &[]).into(), rule("a", &[]).into()];
        assert_eq!(kinds(items), vec![LoadErrorKind::DuplicateId, LoadErrorKind::DuplicateId]);
    }

    #[test]
    fn member_ids_share_the_namespace() {
        let items = vec![rule("friday", &[]).into(), block("days", &[], &["friday", "monday", "monday"])];
        assert_eq!(kinds(items), vec![LoadErrorKind::DuplicateId, LoadErrorKind::DuplicateId]);

        let items = vec![block("days", &[], &["days"])];
        assert_eq!(kinds(items), vec![LoadErrorKind::DuplicateId]);
    }

    #[test]
    fn after_a_member_orders_after_its_block() {
        let items = vec![rule("relative", &["monday"]).into(), block("days", &[], &["monday"])];
        assert_eq!(ids(items), vec!["days", "relative"]);
    }

    #[test]
    fn one_error_per_cycle() {
        let items = vec![
            rule("a", &["b"]).into(),
            rule("b", &["a"]).into(),
            rule("c", &["e"]).into(),
            rule("d", &["c"]).into(),
            rule("e", &["d"]).into(),
            rule("f", &["a"]).into(),
        ];
        let errors = RuleGraph::build(items).unwrap_err();
        assert_eq!(errors.len(), 2);
        assert!(errors.iter().all(|e| e.kind == LoadErrorKind::CircularDependency));
        assert_eq!(errors[0].detail, "rules `a`, `b` depend on each other");
        assert_eq!(errors[1].detail, "rules `c`, `d`, `e` depend on each other");
    }

    #[test]
    fn self_reference_is_a_cycle() {
        let items = vec![rule("a", &["a"]).into(), rule("b", &[]).into()];
        let errors = RuleGraph::build(items).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].kind, LoadErrorKind::CircularDependency);
        assert_eq!(errors[0].detail, "rule `a` runs after itself");
    }

    #[test]
    fn cycle_message_does_not_invent_a_path() {
        // a <-> b and b <-> c: one component, but no a -> b -> c -> a path.
        let items = vec![rule("a", &["b"]).into(), rule("b", &["a", "c"]).into(), rule("c", &["b"]).into()];
        let errors = RuleGraph::build(items).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].detail, "rules `a`, `b`, `c` depend on each other");
    }

    #[test]
    fn duplicates_still_have_their_references_checked() {
        let items = vec![
            rule("thursday", &[]).into(),
            rule("thursday", &["nowhere"]).into(),
            block("thursday", &["elsewhere"], &["thu"]),
        ];
        let errors = RuleGraph::build(items).unwrap_err();
        let kinds: Vec<LoadErrorKind> = errors.iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![
                LoadErrorKind::DuplicateId,
                LoadErrorKind::DuplicateId,
                LoadErrorKind::UnknownAfterReference,
                LoadErrorKind::UnknownAfterReference,
            ]
        );
        assert!(errors[2].detail.contains("`nowhere`"));
        assert!(errors[3].detail.contains("`elsewhere`"));
    }

    fn reader(id: &str, source: &str, after: &[&str]) -> RuleDescriptor {
        RuleDescriptor { pattern: Pattern::parse(source, false).unwrap(), ..rule(id, after) }
    }

    fn producer(id: &str, kind: &str) -> RuleDescriptor {
        RuleDescriptor { tag_kind: Some(kind.to_string()), ..rule(id, &[]) }
    }

    #[test]
    fn readers_of_a_kind_run_after_its_producers() {
        let items = vec![
            reader("relative", "<last> {date}", &[]).into(),
            producer("weekday", "date").into(),
            producer("clock", "time").into(),
        ];
        assert_eq!(ids(items), vec!["weekday", "relative", "clock"]);

        let items = vec![reader("anything", "{} <x>", &[]).into(), producer("clock", "time").into()];
        assert_eq!(ids(items), vec!["clock", "anything"]);
    }

    #[test]
    fn guards_count_as_reads() {
        let mut guarded = rule("guarded", &[]);
        guarded.guards.push(Guard {
            scope: GuardScope::Before,
            negated: true,
            pattern: Pattern::parse("{date}$", false).unwrap(),
        });
        let items = vec![guarded.into(), producer("weekday", "date").into()];
        assert_eq!(ids(items), vec!["weekday", "guarded"]);
    }

    #[test]
    fn declared_order_beats_tag_dependency() {
        // `weekday` explicitly runs after `relative`; the implicit edge the
        // other way would close a cycle and is dropped.
        let items = vec![
            reader("relative", "<last> {date}", &[]).into(),
            RuleDescriptor { after: vec!["relative".to_string()], ..producer("weekday", "date") }.into(),
        ];
        assert_eq!(ids(items), vec!["relative", "weekday"]);
    }

    #[test]
    fn block_members_read_and_produce_for_their_block() {
        let days = RuleItem::Block(RuleBlock {
            id: "days".to_string(),
            after: Vec::new(),
            mode: BlockMode::RunAll,
            members: vec![producer("monday", "date")],
            location: SourceLocation::rule("days.ruleblock", "days"),
        });
        let items = vec![reader("relative", "<last> {date}", &[]).into(), days];
        assert_eq!(ids(items), vec!["days", "relative"]);
    }

    #[test]
    fn squelch_rules_produce_nothing() {
        let squelch = RuleDescriptor { flags: RuleFlags::SQUELCH, ..producer("modal", "date") };
        let items = vec![reader("relative", "<last> {date}", &[]).into(), squelch.into()];
        assert_eq!(ids(items), vec!["relative", "modal"]);
    }

    #[test]
    fn structural_errors_come_out_grouped() {
        let items = vec![
            rule("a", &["b", "nowhere"]).into(),
            rule("b", &["a"]).into(),
            rule("a", &[]).into(),
        ];
        assert_eq!(
            kinds(items),
            vec![LoadErrorKind::DuplicateId, LoadErrorKind::UnknownAfterReference, LoadErrorKind::CircularDependency]
        );
    }
}
