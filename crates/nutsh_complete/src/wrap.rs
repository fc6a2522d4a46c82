use std::collections::{BTreeMap, HashSet};

use parking_lot::Mutex;

/// The directed graph of command wrapping: an edge from `gco` to `git`
/// means completions for `git` also apply to `gco`.
#[derive(Debug, Default)]
pub struct WrapGraph {
    wraps: Mutex<BTreeMap<String, Vec<String>>>,
}

impl WrapGraph {
    /// Adds a wrap edge. Adding an existing edge is a no-op.
    ///
    /// Returns `false` if either name is empty.
    pub fn add(&self, command: &str, target: &str) -> bool {
        if command.is_empty() || target.is_empty() {
            return false;
        }

        let mut wraps = self.wraps.lock();
        let targets = wraps.entry(command.to_string()).or_default();
        if !targets.iter().any(|known| known == target) {
            targets.push(target.to_string());
        }
        true
    }

    /// Removes a wrap edge.
    ///
    /// Returns `true` if the edge existed.
    pub fn remove(&self, command: &str, target: &str) -> bool {
        let mut wraps = self.wraps.lock();
        let Some(targets) = wraps.get_mut(command) else {
            return false;
        };

        let Some(index) = targets.iter().position(|known| known == target) else {
            return false;
        };
        targets.remove(index);
        if targets.is_empty() {
            wraps.remove(command);
        }
        true
    }

    /// Returns the chain of commands whose completions apply to `root`:
    /// the root itself, then every transitively wrapped command in
    /// depth-first order. Each name appears at most once; cycles are cut
    /// by the visited set.
    pub fn chain(&self, root: &str) -> Vec<String> {
        if root.is_empty() {
            return Vec::new();
        }

        let wraps = self.wraps.lock();
        let mut chain = Vec::new();
        let mut visited = HashSet::new();
        let mut worklist = vec![root.to_string()];

        while let Some(command) = worklist.pop() {
            if !visited.insert(command.clone()) {
                continue;
            }

            if let Some(targets) = wraps.get(&command) {
                // Reverse keeps depth-first order with a stack worklist.
                worklist.extend(targets.iter().rev().cloned());
            }
            chain.push(command);
        }
        chain
    }

    /// Returns all wrap edges as `(command, target)` pairs in stable order.
    pub fn pairs(&self) -> Vec<(String, String)> {
        let wraps = self.wraps.lock();
        wraps
            .iter()
            .flat_map(|(command, targets)| {
                targets
                    .iter()
                    .map(move |target| (command.clone(), target.clone()))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_chains_transitively() {
        let graph = WrapGraph::default();
        assert!(graph.add("gco", "git"));
        assert!(graph.add("git", "hub"));

        assert_eq!(graph.chain("gco"), vec!["gco", "git", "hub"]);
        assert_eq!(graph.chain("hub"), vec!["hub"]);
    }

    #[test]
    fn it_adds_idempotently() {
        let graph = WrapGraph::default();
        assert!(graph.add("a", "b"));
        assert!(graph.add("a", "b"));
        assert_eq!(graph.pairs(), vec![("a".to_string(), "b".to_string())]);
    }

    #[test]
    fn it_rejects_empty_names() {
        let graph = WrapGraph::default();
        assert!(!graph.add("", "b"));
        assert!(!graph.add("a", ""));
        assert!(graph.pairs().is_empty());
    }

    #[test]
    fn it_breaks_cycles() {
        let graph = WrapGraph::default();
        graph.add("a", "b");
        graph.add("b", "a");
        graph.add("a", "a");

        assert_eq!(graph.chain("a"), vec!["a", "b"]);
        assert_eq!(graph.chain("b"), vec!["b", "a"]);
    }

    #[test]
    fn it_removes_edges() {
        let graph = WrapGraph::default();
        graph.add("a", "b");
        assert!(graph.remove("a", "b"));
        assert!(!graph.remove("a", "b"));
        assert_eq!(graph.chain("a"), vec!["a"]);
    }

    #[test]
    fn it_visits_depth_first() {
        let graph = WrapGraph::default();
        graph.add("root", "left");
        graph.add("root", "right");
        graph.add("left", "leaf");

        assert_eq!(graph.chain("root"), vec!["root", "left", "leaf", "right"]);
    }
}
