//! Flat tree store: id-keyed task records with a derived children index.
//!
//! Parent links are lookup-only back-references, never ownership edges, so an
//! arbitrarily corrupt collection (dangling parents, even parent cycles) can
//! always be held in memory and handed to the validator. Every walk that
//! follows links carries a visited guard for that reason.

use std::collections::{BTreeMap, HashSet};

use crate::task::Task;

/// In-memory collection of task records keyed by id.
#[derive(Debug, Clone, Default)]
pub struct TaskTree {
    tasks: BTreeMap<String, Task>,
    children: BTreeMap<String, Vec<String>>,
}

impl TaskTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a tree from a flat record list, reconstructing the children
    /// index. The records are not validated; run the validator before
    /// trusting levels or parent links.
    pub fn from_tasks(tasks: Vec<Task>) -> Self {
        let mut tree = Self::new();
        for task in tasks {
            tree.tasks.insert(task.id.clone(), task);
        }
        tree.rebuild_index();
        tree
    }

    /// Rebuild the parent→children index from the stored records.
    pub fn rebuild_index(&mut self) {
        self.children.clear();
        for task in self.tasks.values() {
            if let Some(parent) = &task.parent {
                self.children
                    .entry(parent.clone())
                    .or_default()
                    .push(task.id.clone());
            }
        }
        for ids in self.children.values_mut() {
            ids.sort();
        }
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.tasks.contains_key(id)
    }

    pub fn get(&self, id: &str) -> Option<&Task> {
        self.tasks.get(id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut Task> {
        self.tasks.get_mut(id)
    }

    pub fn tasks(&self) -> impl Iterator<Item = &Task> {
        self.tasks.values()
    }

    pub fn ids(&self) -> impl Iterator<Item = &String> {
        self.tasks.keys()
    }

    /// Flat record list in id order, the persisted form.
    pub fn to_tasks(&self) -> Vec<Task> {
        self.tasks.values().cloned().collect()
    }

    /// Insert a record and index it under its parent.
    pub fn insert(&mut self, task: Task) {
        if let Some(existing) = self.tasks.get(&task.id) {
            let old_parent = existing.parent.clone();
            self.detach(&task.id, old_parent.as_deref());
        }
        if let Some(parent) = task.parent.clone() {
            self.attach(&task.id, &parent);
        }
        self.tasks.insert(task.id.clone(), task);
    }

    /// Remove a single record. Children of the removed task are left in
    /// place; structural cleanup is the mutation engine's job.
    pub fn remove(&mut self, id: &str) -> Option<Task> {
        let task = self.tasks.remove(id)?;
        self.detach(id, task.parent.as_deref());
        Some(task)
    }

    /// Re-point a task's parent link and keep the index in step.
    pub fn set_parent(&mut self, id: &str, new_parent: Option<String>) {
        let old_parent = match self.tasks.get(id) {
            Some(task) => task.parent.clone(),
            None => return,
        };
        self.detach(id, old_parent.as_deref());
        if let Some(parent) = &new_parent {
            self.attach(id, parent);
        }
        if let Some(task) = self.tasks.get_mut(id) {
            task.parent = new_parent;
        }
    }

    fn attach(&mut self, id: &str, parent: &str) {
        let ids = self.children.entry(parent.to_string()).or_default();
        if let Err(pos) = ids.binary_search_by(|entry| entry.as_str().cmp(id)) {
            ids.insert(pos, id.to_string());
        }
    }

    fn detach(&mut self, id: &str, parent: Option<&str>) {
        if let Some(parent) = parent {
            if let Some(ids) = self.children.get_mut(parent) {
                ids.retain(|entry| entry != id);
                if ids.is_empty() {
                    self.children.remove(parent);
                }
            }
        }
    }

    /// Direct children of a task, in id order.
    pub fn children(&self, id: &str) -> &[String] {
        self.children.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Root task ids in id order.
    pub fn roots(&self) -> Vec<String> {
        self.tasks
            .values()
            .filter(|task| task.parent.is_none())
            .map(|task| task.id.clone())
            .collect()
    }

    /// Every task reachable below `id`, breadth-first. Safe on corrupt
    /// trees: each node is visited at most once.
    pub fn descendants(&self, id: &str) -> Vec<String> {
        let mut result = Vec::new();
        let mut visited: HashSet<&str> = HashSet::new();
        visited.insert(id);
        let mut queue: Vec<&str> = vec![id];
        let mut cursor = 0;
        while cursor < queue.len() {
            let current = queue[cursor];
            cursor += 1;
            for child in self.children(current) {
                if visited.insert(child) {
                    queue.push(child);
                    result.push(child.clone());
                }
            }
        }
        result
    }

    /// Parent chain of `id`, nearest first. Safe on corrupt trees: the walk
    /// stops at the first repeated node.
    pub fn ancestors(&self, id: &str) -> Vec<String> {
        let mut result = Vec::new();
        let mut visited: HashSet<&str> = HashSet::new();
        visited.insert(id);
        let mut current = self.tasks.get(id).and_then(|task| task.parent.as_deref());
        while let Some(parent) = current {
            if !visited.insert(parent) {
                break;
            }
            result.push(parent.to_string());
            current = self.tasks.get(parent).and_then(|task| task.parent.as_deref());
        }
        result
    }

    /// Whether `candidate` lies strictly below `of` in the tree.
    pub fn is_descendant(&self, candidate: &str, of: &str) -> bool {
        if candidate == of {
            return false;
        }
        self.ancestors(candidate).iter().any(|entry| entry == of)
    }

    /// Depth of the subtree rooted at `id`, in levels below `id`.
    pub fn subtree_depth(&self, id: &str) -> u32 {
        let mut depth = 0;
        let mut frontier: Vec<&str> = vec![id];
        let mut visited: HashSet<&str> = HashSet::new();
        visited.insert(id);
        loop {
            let mut next: Vec<&str> = Vec::new();
            for current in &frontier {
                for child in self.children(current) {
                    if visited.insert(child) {
                        next.push(child);
                    }
                }
            }
            if next.is_empty() {
                return depth;
            }
            depth += 1;
            frontier = next;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schedule::Calendar;
    use crate::task::TaskFields;

    fn make(title: &str, parent: Option<&str>, level: u32) -> Task {
        Task::create(
            TaskFields {
                title: title.to_string(),
                ..TaskFields::default()
            },
            parent.map(str::to_string),
            level,
            &Calendar::default(),
        )
        .unwrap()
    }

    fn sample_tree() -> (TaskTree, String, String, String) {
        let mut tree = TaskTree::new();
        let root = make("root", None, 0);
        let root_id = root.id.clone();
        tree.insert(root);
        let child = make("child", Some(&root_id), 1);
        let child_id = child.id.clone();
        tree.insert(child);
        let leaf = make("leaf", Some(&child_id), 2);
        let leaf_id = leaf.id.clone();
        tree.insert(leaf);
        (tree, root_id, child_id, leaf_id)
    }

    #[test]
    fn children_are_derived_from_parent_links() {
        let (tree, root_id, child_id, leaf_id) = sample_tree();
        assert_eq!(tree.children(&root_id), &[child_id.clone()]);
        assert_eq!(tree.children(&child_id), &[leaf_id.clone()]);
        assert!(tree.children(&leaf_id).is_empty());
        assert_eq!(tree.roots(), vec![root_id]);
    }

    #[test]
    fn descendants_and_ancestors_walk_the_whole_chain() {
        let (tree, root_id, child_id, leaf_id) = sample_tree();
        let descendants = tree.descendants(&root_id);
        assert_eq!(descendants.len(), 2);
        assert!(descendants.contains(&child_id));
        assert!(descendants.contains(&leaf_id));

        assert_eq!(tree.ancestors(&leaf_id), vec![child_id.clone(), root_id.clone()]);
        assert!(tree.is_descendant(&leaf_id, &root_id));
        assert!(!tree.is_descendant(&root_id, &leaf_id));
        assert!(!tree.is_descendant(&root_id, &root_id));
        assert_eq!(tree.subtree_depth(&root_id), 2);
    }

    #[test]
    fn set_parent_keeps_index_in_step() {
        let (mut tree, root_id, child_id, leaf_id) = sample_tree();
        tree.set_parent(&leaf_id, Some(root_id.clone()));
        assert!(tree.children(&child_id).is_empty());
        assert!(tree.children(&root_id).contains(&leaf_id));

        tree.set_parent(&leaf_id, None);
        assert_eq!(tree.roots().len(), 2);
    }

    #[test]
    fn walks_terminate_on_parent_cycles() {
        let (mut tree, root_id, child_id, _leaf_id) = sample_tree();
        // Force a corrupt cycle root -> child -> root.
        tree.set_parent(&root_id, Some(child_id.clone()));

        let ancestors = tree.ancestors(&child_id);
        assert_eq!(ancestors, vec![root_id.clone()]);
        let descendants = tree.descendants(&child_id);
        assert!(descendants.contains(&root_id));
    }

    #[test]
    fn from_tasks_round_trips_records() {
        let (tree, _root, _child, _leaf) = sample_tree();
        let rebuilt = TaskTree::from_tasks(tree.to_tasks());
        assert_eq!(rebuilt.len(), tree.len());
        for task in tree.tasks() {
            assert_eq!(rebuilt.get(&task.id).unwrap().parent, task.parent);
        }
    }
}
