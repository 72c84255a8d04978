//! Finding the script modules that consume a stylesheet.
//!
//! The graph only stores forward edges (consumer -> dependency), so every
//! script node is tried once as a query root instead of walking reverse
//! edges from the stylesheet.

use std::collections::HashSet;

use log::{debug, trace};
use modcss_core::ModuleId;

use crate::graph::{ModuleGraph, ModuleNode};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reach {
    /// The consumer imports the stylesheet itself
    Direct,
    /// The consumer reaches it through forwarding script modules
    Indirect,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Consumer {
    pub node: usize,
    pub reach: Reach,
}

/// Every script module that reaches `stylesheet`, each once.
///
/// Identities are compared in canonical form, so a dependency on
/// `loaderA!S` reaches a stylesheet registered as `loaderB!S`. Modules that
/// only forward the stylesheet (no usages of their own) are not consumers;
/// the modules importing it from them are.
pub fn find_consumers(graph: &ModuleGraph, stylesheet: &ModuleId) -> Vec<Consumer> {
    let target = stylesheet.canonical();
    // script nodes known to reach the target
    let mut proven: HashSet<usize> = HashSet::new();
    let mut consumers = Vec::new();

    for (idx, node) in graph.iter() {
        if !node.is_script() {
            continue;
        }
        let deps = graph.distinct_dependencies(idx);
        if deps.is_empty() {
            continue;
        }

        if deps.iter().any(|d| d.canonical() == target) {
            proven.insert(idx);
            if uses_directly(node, target) {
                trace!("{} consumes {} directly", node.id, target);
                consumers.push(Consumer { node: idx, reach: Reach::Direct });
                continue;
            }
        }

        if has_usages(node) && reaches_through_scripts(graph, idx, target, &mut proven) {
            trace!("{} consumes {} through re-exports", node.id, target);
            consumers.push(Consumer { node: idx, reach: Reach::Indirect });
        }
    }

    debug!("Found {} consumers of {}", consumers.len(), target);
    consumers
}

/// Scripts holding an untracked reference (an unbound `require`, an
/// `import()`) to the stylesheet or to a script that reaches it. Their
/// accesses to the export map are unknown.
pub fn untracked_dependents(graph: &ModuleGraph, stylesheet: &ModuleId) -> Vec<usize> {
    let target = stylesheet.canonical();
    let mut proven: HashSet<usize> = HashSet::new();
    let mut found = Vec::new();

    for (idx, node) in graph.iter() {
        let Some(script) = node.as_script() else {
            continue;
        };
        for request in &script.records.untracked_requests {
            let Some(dep) = node.dependency_for(request) else {
                continue;
            };
            let reaches = dep.canonical() == target
                || graph.index_of(dep).is_some_and(|next| reaches_from(graph, next, target, &mut proven));
            if reaches {
                trace!("{} references {} through untracked '{}'", node.id, target, request);
                found.push(idx);
                break;
            }
        }
    }
    found
}

/// Whether script `start` imports `target` itself or through other scripts.
fn reaches_from(graph: &ModuleGraph, start: usize, target: &str, proven: &mut HashSet<usize>) -> bool {
    if !graph.node(start).is_script() {
        return false;
    }
    if proven.contains(&start) || graph.distinct_dependencies(start).iter().any(|d| d.canonical() == target) {
        proven.insert(start);
        return true;
    }
    reaches_through_scripts(graph, start, target, proven)
}

/// Whether the node's own usages (or an unknown set of them, when
/// extraction failed) read a binding resolving to `target`.
fn uses_directly(node: &ModuleNode, target: &str) -> bool {
    let Some(script) = node.as_script() else {
        return false;
    };
    if script.failure.is_some() {
        return true;
    }
    let records = &script.records;
    records.usages.iter().any(|usage| {
        records.bindings.get(usage.binding).is_some_and(|binding| {
            node.dependency_for(&binding.request).is_some_and(|dep| dep.canonical() == target)
        })
    })
}

fn has_usages(node: &ModuleNode) -> bool {
    node.as_script().is_some_and(|s| s.failure.is_some() || !s.records.usages.is_empty())
}

/// Depth-first walk over the script dependencies of `root`, looking for a
/// module that imports `target`. Stylesheet nodes are never expanded.
fn reaches_through_scripts(
    graph: &ModuleGraph,
    root: usize,
    target: &str,
    proven: &mut HashSet<usize>,
) -> bool {
    let mut visited: HashSet<usize> = HashSet::from([root]);
    let mut stack: Vec<usize> = script_deps(graph, root).collect();

    while let Some(cur) = stack.pop() {
        if !visited.insert(cur) {
            continue;
        }
        if proven.contains(&cur) {
            proven.insert(root);
            return true;
        }
        let deps = graph.distinct_dependencies(cur);
        if deps.iter().any(|d| d.canonical() == target) {
            proven.insert(cur);
            proven.insert(root);
            return true;
        }
        stack.extend(script_deps(graph, cur).filter(|next| !visited.contains(next)));
    }
    false
}

fn script_deps(graph: &ModuleGraph, idx: usize) -> impl Iterator<Item = usize> + '_ {
    graph
        .distinct_dependencies(idx)
        .into_iter()
        .filter_map(move |d| graph.index_of(d))
        .filter(move |&i| graph.node(i).is_script())
}
