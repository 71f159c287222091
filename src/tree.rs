//! The synthesis tree.
//!
//! Every root-to-leaf path in the tree is a candidate chain of tasks. The tree
//! is stored as an index arena: nodes live in a [`StableGraph`] and an edge
//! `parent -> child` links a node to each of its successors. Parents are
//! found by walking the single incoming edge, so nodes never hold references
//! to each other. A `StableGraph` keeps indices valid while pruning removes
//! nodes.
//!
//! All traversals use an explicit stack. The depth of the tree is bounded by
//! the caller supplied `max_depth`, never by the host call stack.

use std::collections::HashSet;
use std::fmt::{Display, Formatter};

use indexmap::IndexSet;
use petgraph::Direction;
use petgraph::stable_graph::{NodeIndex, StableGraph};

use crate::core::{ArcStr, SINK, overlaps};
use crate::error::PipeError;
use crate::task::{Root, TaskRef};

/// A vertex of the synthesis tree.
#[derive(Debug, Clone)]
pub struct Node {
    task: TaskRef,
    depth: usize,
}

impl Node {
    pub fn task(&self) -> &TaskRef {
        &self.task
    }

    /// Distance from the root, which sits at depth 0.
    pub fn depth(&self) -> usize {
        self.depth
    }
}

/// Work item of the expansion stack. The visited set is per path, so a task
/// may appear in many branches but at most once along any one of them.
struct Frame {
    index: NodeIndex,
    depth: usize,
    visited: HashSet<ArcStr>,
}

pub struct Tree {
    graph: StableGraph<Node, ()>,
    root: NodeIndex,
    leaves: IndexSet<NodeIndex>,
}

impl Tree {
    pub(crate) fn new() -> Self {
        let mut graph = StableGraph::new();
        let root = graph.add_node(Node {
            task: TaskRef::new(Root),
            depth: 0,
        });

        Self {
            graph,
            root,
            leaves: IndexSet::new(),
        }
    }

    /// Expands, then prunes, a fresh tree over `library`.
    pub(crate) fn build(library: &[TaskRef], max_depth: usize) -> Result<Self, PipeError> {
        if !library.iter().any(TaskRef::is_entry_point) {
            return Err(PipeError::NoEntryPoints);
        }

        let mut tree = Self::new();
        tree.expand(library, max_depth)?;
        tracing::debug!(
            "expanded tree to {} nodes with {} leaves",
            tree.len(),
            tree.leaves.len()
        );

        tree.prune();
        tracing::debug!(
            "pruned tree to {} nodes with {} leaves",
            tree.len(),
            tree.leaves.len()
        );

        if tree.leaves.is_empty() {
            return Err(PipeError::EmptyTree);
        }

        Ok(tree)
    }

    /// Links a new node for `task` below `parent`.
    pub(crate) fn attach(
        &mut self,
        parent: NodeIndex,
        task: TaskRef,
    ) -> Result<NodeIndex, PipeError> {
        let node = &self.graph[parent];

        if !overlaps(&node.task.output_types(), &task.input_types()) {
            return Err(PipeError::IncompatibleLink {
                parent: node.task.name_arc().clone(),
                child: task.name_arc().clone(),
            });
        }

        let depth = node.depth + 1;
        let child = self.graph.add_node(Node { task, depth });
        self.graph.add_edge(parent, child, ());

        Ok(child)
    }

    fn expand(&mut self, library: &[TaskRef], max_depth: usize) -> Result<(), PipeError> {
        let mut stack = vec![Frame {
            index: self.root,
            depth: 0,
            visited: HashSet::new(),
        }];

        while let Some(Frame {
            index,
            depth,
            visited,
        }) = stack.pop()
        {
            if depth > max_depth {
                self.leaves.insert(index);
                continue;
            }

            let outputs = self.graph[index].task.output_types();
            let candidates: Vec<&TaskRef> = library
                .iter()
                .filter(|task| !visited.contains(task.name_arc()))
                .filter(|task| overlaps(&outputs, &task.input_types()))
                .collect();

            if candidates.is_empty() {
                self.leaves.insert(index);
                continue;
            }

            let mut frames = Vec::with_capacity(candidates.len());
            for task in candidates {
                let child = self.attach(index, task.clone())?;
                let mut visited = visited.clone();
                visited.insert(task.name_arc().clone());
                frames.push(Frame {
                    index: child,
                    depth: depth + 1,
                    visited,
                });
            }

            // reversed, so the first candidate is expanded first
            stack.extend(frames.into_iter().rev());
        }

        Ok(())
    }

    /// Removes every branch which does not end in a sink-producing task.
    ///
    /// Works bottom-up from each leaf: a childless node which does not produce
    /// the sink tag is deleted, and its parent is then checked the same way.
    /// A parent that loses all its children but does produce the sink tag
    /// becomes a leaf itself.
    fn prune(&mut self) {
        let mut leaves = std::mem::take(&mut self.leaves);
        let initial: Vec<NodeIndex> = leaves.iter().copied().collect();

        for leaf in initial {
            let mut current = leaf;

            loop {
                if !self.graph.contains_node(current) || self.has_children(current) {
                    break;
                }

                if self.graph[current].task.output_types().contains(SINK) {
                    leaves.insert(current);
                    break;
                }

                let parent = self.parent(current);
                self.graph.remove_node(current);
                leaves.swap_remove(&current);

                match parent {
                    Some(parent) => current = parent,
                    None => break,
                }
            }
        }

        // swap removal shuffles, creation order is index order
        leaves.sort_unstable();
        self.leaves = leaves;
    }

    pub fn root(&self) -> NodeIndex {
        self.root
    }

    pub fn node(&self, index: NodeIndex) -> Option<&Node> {
        self.graph.node_weight(index)
    }

    pub fn parent(&self, index: NodeIndex) -> Option<NodeIndex> {
        self.graph
            .neighbors_directed(index, Direction::Incoming)
            .next()
    }

    /// Children of a node in creation order.
    pub fn children(&self, index: NodeIndex) -> Vec<NodeIndex> {
        let mut children: Vec<_> = self
            .graph
            .neighbors_directed(index, Direction::Outgoing)
            .collect();
        // indices are handed out in creation order and pruning only removes
        children.sort_unstable();
        children
    }

    fn has_children(&self, index: NodeIndex) -> bool {
        self.graph
            .neighbors_directed(index, Direction::Outgoing)
            .next()
            .is_some()
    }

    /// Surviving leaves in creation order.
    pub fn leaves(&self) -> &IndexSet<NodeIndex> {
        &self.leaves
    }

    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    /// Every root-to-leaf path, depth first, without the sentinel root.
    pub fn paths(&self) -> Vec<Vec<TaskRef>> {
        let mut paths = Vec::new();

        if !self.graph.contains_node(self.root) {
            return paths;
        }

        let mut stack = vec![(self.root, Vec::new())];

        while let Some((index, path)) = stack.pop() {
            let children = self.children(index);

            if children.is_empty() {
                // a childless root means there is nothing to enumerate
                if index != self.root {
                    paths.push(path);
                }
                continue;
            }

            for child in children.into_iter().rev() {
                let mut path = path.clone();
                path.push(self.graph[child].task.clone());
                stack.push((child, path));
            }
        }

        paths
    }
}

impl Display for Tree {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if !self.graph.contains_node(self.root) {
            return Ok(());
        }

        let mut stack = vec![(self.root, String::new(), true)];

        while let Some((index, prefix, is_last)) = stack.pop() {
            let connector = if is_last { "└── " } else { "├── " };
            writeln!(f, "{prefix}{connector}{}", self.graph[index].task.name())?;

            let continuation = if is_last { "    " } else { "│   " };
            let children = self.children(index);
            let total = children.len();

            for (i, child) in children.into_iter().enumerate().rev() {
                stack.push((child, format!("{prefix}{continuation}"), i + 1 == total));
            }
        }

        Ok(())
    }
}

impl std::fmt::Debug for Tree {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tree")
            .field("nodes", &self.len())
            .field("leaves", &self.leaves.len())
            .finish()
    }
}
