//! Registration order for modules with "after" links.

use std::collections::{HashMap, VecDeque};

use crate::error::{RegistryError, Result};
use crate::module::Module;

/// Orders modules so each one follows the modules listed in its
/// `dependencies` that are part of the same set.
///
/// Cycles are broken by force-placing a module once a full pass over the
/// pending queue makes no progress. With `strict` set, a cycle is an error
/// instead.
#[derive(Debug, Clone, Copy, Default)]
pub struct DependencyOrderer {
    strict: bool,
}

impl DependencyOrderer {
    pub fn new(strict: bool) -> Self {
        Self { strict }
    }

    pub fn order(&self, modules: Vec<Module>) -> Result<Vec<Module>> {
        let names: Vec<&str> = modules.iter().map(|m| m.name.as_str()).collect();
        let adj = requirement_graph(&modules, &names);

        if self.strict {
            if let Some(path) = detect_cycle_with_path(&names, &adj) {
                return Err(RegistryError::CycleDetected { path });
            }
        }

        let order = stabilise(&names, &adj);

        let mut slots: Vec<Option<Module>> = modules.into_iter().map(Some).collect();
        Ok(order.into_iter().filter_map(|i| slots[i].take()).collect())
    }
}

/// `adj[i]` = indices of the modules `i` must come after. Absent targets,
/// self references and duplicates are dropped.
fn requirement_graph(modules: &[Module], names: &[&str]) -> Vec<Vec<usize>> {
    let idx: HashMap<&str, usize> = names.iter().enumerate().map(|(i, &n)| (n, i)).collect();

    modules
        .iter()
        .enumerate()
        .map(|(i, m)| {
            let mut targets = Vec::new();
            for dep in &m.dependencies {
                if let Some(&j) = idx.get(dep.as_str()) {
                    if j != i && !targets.contains(&j) {
                        targets.push(j);
                    }
                }
            }
            targets
        })
        .collect()
}

fn stabilise(names: &[&str], adj: &[Vec<usize>]) -> Vec<usize> {
    let mut placed = vec![false; names.len()];
    let mut order = Vec::with_capacity(names.len());
    let mut pending: VecDeque<usize> = (0..names.len()).collect();
    let mut stalled = 0usize;

    let unplaced = |i: usize, placed: &[bool]| adj[i].iter().filter(|&&d| !placed[d]).count();

    while let Some(i) = pending.pop_front() {
        if unplaced(i, &placed) == 0 {
            placed[i] = true;
            order.push(i);
            stalled = 0;
            continue;
        }

        pending.push_back(i);
        stalled += 1;
        if stalled < pending.len() {
            continue;
        }

        // Every pending module waits on another pending one.
        let pick = pending
            .iter()
            .copied()
            .enumerate()
            .min_by_key(|&(pos, j)| (unplaced(j, &placed), pos))
            .map(|(pos, _)| pos);
        let Some(forced) = pick.and_then(|pos| pending.remove(pos)) else {
            break;
        };

        let waiting_on: Vec<&str> = adj[forced]
            .iter()
            .filter(|&&d| !placed[d])
            .map(|&d| names[d])
            .collect();
        tracing::warn!(
            module = names[forced],
            waiting_on = ?waiting_on,
            "dependency cycle, placing module before its requirements"
        );

        placed[forced] = true;
        order.push(forced);
        stalled = 0;
    }

    order
}

/// DFS with path tracking. The returned path closes the cycle
/// (`a -> b -> a`), read as "a requires b".
fn detect_cycle_with_path(names: &[&str], adj: &[Vec<usize>]) -> Option<Vec<String>> {
    #[derive(Clone, Copy, PartialEq)]
    enum Color {
        White,
        Gray,
        Black,
    }

    fn dfs(
        node: usize,
        names: &[&str],
        adj: &[Vec<usize>],
        colors: &mut [Color],
        path: &mut Vec<usize>,
    ) -> Option<Vec<String>> {
        colors[node] = Color::Gray;
        path.push(node);

        for &next in &adj[node] {
            match colors[next] {
                Color::Gray => {
                    if let Some(start) = path.iter().position(|&n| n == next) {
                        let mut cycle: Vec<String> =
                            path[start..].iter().map(|&i| names[i].to_string()).collect();
                        cycle.push(names[next].to_string());
                        return Some(cycle);
                    }
                }
                Color::White => {
                    if let Some(cycle) = dfs(next, names, adj, colors, path) {
                        return Some(cycle);
                    }
                }
                Color::Black => {}
            }
        }

        path.pop();
        colors[node] = Color::Black;
        None
    }

    let mut colors = vec![Color::White; names.len()];
    let mut path = Vec::new();
    for i in 0..names.len() {
        if colors[i] == Color::White {
            if let Some(cycle) = dfs(i, names, adj, &mut colors, &mut path) {
                return Some(cycle);
            }
        }
    }
    None
}
