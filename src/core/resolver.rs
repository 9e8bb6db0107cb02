//! SF-005: Prompt template resolution and dependency DAG analysis.
//!
//! Resolves `{{Operation.name}}` and `{{Operation.input}}` in step prompts.
//! Builds a DAG from `dependency` edges and computes topological order using
//! Kahn's algorithm with declaration-order tie-breaking, so cyclic plans are
//! rejected before the scheduler ever sees them.

use super::types::ActionGraph;
use indexmap::IndexMap;
use std::collections::VecDeque;

/// Resolve all `{{Operation.*}}` variables in a prompt template.
pub fn resolve_template(template: &str, name: &str, input: &str) -> Result<String, String> {
    let mut result = template.to_string();
    let mut start = 0;

    while let Some(open) = result[start..].find("{{") {
        let open = start + open;
        let close = result[open..]
            .find("}}")
            .ok_or_else(|| format!("unclosed template at position {}", open))?;
        let close = open + close + 2;
        let key = result[open + 2..close - 2].trim();

        let value = match key {
            "Operation.name" => name.to_string(),
            "Operation.input" => input.to_string(),
            _ => return Err(format!("unknown template variable: {}", key)),
        };

        result.replace_range(open..close, &value);
        start = open + value.len();
    }

    Ok(result)
}

/// First dependency edge that points at a step missing from the graph.
pub fn find_unknown_dependency(graph: &ActionGraph) -> Option<(String, String)> {
    graph.actions.iter().find_map(|(id, node)| {
        node.dependency
            .iter()
            .find(|dep| !graph.contains(dep))
            .map(|dep| (id.clone(), dep.clone()))
    })
}

/// Kahn's algorithm. Returns the order reached plus whatever never became ready.
fn kahn(graph: &ActionGraph) -> (Vec<String>, Vec<String>) {
    let mut in_degree: IndexMap<&str, usize> = IndexMap::new();
    let mut adjacency: IndexMap<&str, Vec<&str>> = IndexMap::new();

    for id in graph.names() {
        in_degree.insert(id, 0);
        adjacency.insert(id, Vec::new());
    }

    for (id, node) in &graph.actions {
        for dep in &node.dependency {
            if let Some(children) = adjacency.get_mut(dep.as_str()) {
                children.push(id);
                if let Some(d) = in_degree.get_mut(id.as_str()) {
                    *d += 1;
                }
            }
        }
    }

    let mut queue: VecDeque<&str> = in_degree
        .iter()
        .filter(|(_, &d)| d == 0)
        .map(|(id, _)| *id)
        .collect();

    let mut order = Vec::new();
    while let Some(current) = queue.pop_front() {
        order.push(current.to_string());

        let mut next_ready: Vec<&str> = Vec::new();
        if let Some(children) = adjacency.get(current) {
            for child in children {
                if let Some(degree) = in_degree.get_mut(child) {
                    *degree -= 1;
                    if *degree == 0 {
                        next_ready.push(*child);
                    }
                }
            }
        }
        next_ready.sort_by_key(|id| graph.actions.get_index_of(*id));
        queue.extend(next_ready);
    }

    let stuck = graph
        .names()
        .filter(|id| !order.contains(*id))
        .cloned()
        .collect();
    (order, stuck)
}

/// Steps that sit on (or behind) a dependency cycle. Empty for a DAG.
pub fn find_cycle_members(graph: &ActionGraph) -> Vec<String> {
    kahn(graph).1
}

/// Build a topological execution order from step dependencies.
pub fn build_execution_order(graph: &ActionGraph) -> Result<Vec<String>, String> {
    if let Some((id, dep)) = find_unknown_dependency(graph) {
        return Err(format!("step '{}' depends on unknown step '{}'", id, dep));
    }

    let (order, stuck) = kahn(graph);
    if !stuck.is_empty() {
        return Err(format!(
            "dependency cycle detected involving: {}",
            stuck.join(", ")
        ));
    }

    Ok(order)
}

/// Group steps by dependency depth: wave N only depends on waves < N.
pub fn wavefronts(graph: &ActionGraph) -> Result<Vec<Vec<String>>, String> {
    let order = build_execution_order(graph)?;
    let mut level: IndexMap<&str, usize> = IndexMap::new();

    for id in &order {
        let depth = graph
            .get(id)
            .map(|node| {
                node.dependency
                    .iter()
                    .filter_map(|d| level.get(d.as_str()))
                    .map(|l| l + 1)
                    .max()
                    .unwrap_or(0)
            })
            .unwrap_or(0);
        level.insert(id, depth);
    }

    let depth = level.values().copied().max().map_or(0, |m| m + 1);
    let mut waves = vec![Vec::new(); depth];
    for id in graph.names() {
        if let Some(&l) = level.get(id.as_str()) {
            waves[l].push(id.clone());
        }
    }
    Ok(waves)
}

/// Steps no other step depends on, in declaration order.
pub fn sink_nodes(graph: &ActionGraph) -> Vec<String> {
    graph
        .names()
        .filter(|id| {
            !graph
                .actions
                .values()
                .any(|node| node.dependency.contains(id.as_str()))
        })
        .cloned()
        .collect()
}
