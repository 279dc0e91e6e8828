//! Tuple tree tracking for the local cluster.
//!
//! Every reliable spout emit opens a root. Each delivered tuple is an edge
//! that belongs to the roots of its anchors. A root completes once no edge
//! belonging to it is pending, and fails as soon as any of its edges fails.

use crate::domain::model::TupleId;
use std::collections::{HashMap, HashSet};

pub type RootId = u64;

/// A spout message whose tree is still being processed.
#[derive(Debug, Clone, PartialEq)]
pub struct Root {
    pub spout_task: usize,
    pub component: String,
    pub stream: String,
    pub message_id: TupleId,
    pending: HashSet<TupleId>,
}

#[derive(Debug, Clone)]
struct Edge {
    component: String,
    stream: String,
    roots: Vec<RootId>,
}

/// Source component and stream of a settled edge, for counters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EdgeOrigin {
    pub component: String,
    pub stream: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AckOutcome {
    Unknown,
    Acked {
        origin: EdgeOrigin,
        completed: Vec<Root>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum FailOutcome {
    Unknown,
    Failed {
        origin: EdgeOrigin,
        failed: Vec<Root>,
    },
}

#[derive(Debug, Default)]
pub struct AckTracker {
    roots: HashMap<RootId, Root>,
    edges: HashMap<TupleId, Edge>,
    next_root: RootId,
}

impl AckTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open_root(
        &mut self,
        spout_task: usize,
        component: &str,
        stream: &str,
        message_id: TupleId,
    ) -> RootId {
        self.next_root += 1;
        let id = self.next_root;
        self.roots.insert(
            id,
            Root {
                spout_task,
                component: component.to_string(),
                stream: stream.to_string(),
                message_id,
                pending: HashSet::new(),
            },
        );
        id
    }

    /// Live roots reachable from the given anchors. Unknown anchors are ignored.
    pub fn roots_of(&self, anchors: &[TupleId]) -> Vec<RootId> {
        let mut roots: Vec<RootId> = anchors
            .iter()
            .filter_map(|anchor| self.edges.get(anchor))
            .flat_map(|edge| edge.roots.iter().copied())
            .filter(|root| self.roots.contains_key(root))
            .collect();
        roots.sort_unstable();
        roots.dedup();
        roots
    }

    pub fn add_edge(
        &mut self,
        edge_id: TupleId,
        component: &str,
        stream: &str,
        roots: Vec<RootId>,
    ) {
        for root in &roots {
            if let Some(root) = self.roots.get_mut(root) {
                root.pending.insert(edge_id.clone());
            }
        }
        self.edges.insert(
            edge_id,
            Edge {
                component: component.to_string(),
                stream: stream.to_string(),
                roots,
            },
        );
    }

    /// Completes a root that ended up with nothing pending, e.g. a spout
    /// emit on a stream nobody subscribes to.
    pub fn complete_if_idle(&mut self, root: RootId) -> Option<Root> {
        if self.roots.get(&root)?.pending.is_empty() {
            return self.roots.remove(&root);
        }
        None
    }

    pub fn ack(&mut self, edge_id: &TupleId) -> AckOutcome {
        let Some(edge) = self.edges.remove(edge_id) else {
            return AckOutcome::Unknown;
        };

        let mut completed = Vec::new();
        for root_id in &edge.roots {
            let Some(root) = self.roots.get_mut(root_id) else {
                // the tree already failed
                continue;
            };
            root.pending.remove(edge_id);
            if root.pending.is_empty() {
                if let Some(root) = self.roots.remove(root_id) {
                    completed.push(root);
                }
            }
        }

        AckOutcome::Acked {
            origin: EdgeOrigin {
                component: edge.component,
                stream: edge.stream,
            },
            completed,
        }
    }

    pub fn fail(&mut self, edge_id: &TupleId) -> FailOutcome {
        let Some(edge) = self.edges.remove(edge_id) else {
            return FailOutcome::Unknown;
        };

        let failed = edge
            .roots
            .iter()
            .filter_map(|root_id| self.roots.remove(root_id))
            .collect();

        FailOutcome::Failed {
            origin: EdgeOrigin {
                component: edge.component,
                stream: edge.stream,
            },
            failed,
        }
    }

    /// Open roots for a spout task, compared against max spout pending.
    pub fn pending_for(&self, spout_task: usize) -> usize {
        self.roots
            .values()
            .filter(|root| root.spout_task == spout_task)
            .count()
    }

    pub fn open_edges(&self) -> usize {
        self.edges.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn completed_ids(outcome: AckOutcome) -> Vec<TupleId> {
        match outcome {
            AckOutcome::Acked { completed, .. } => {
                completed.into_iter().map(|r| r.message_id).collect()
            }
            AckOutcome::Unknown => panic!("edge should be known"),
        }
    }

    #[test]
    fn test_root_completes_after_whole_tree_is_acked() {
        let mut tracker = AckTracker::new();
        let root = tracker.open_root(0, "sentence_spout", "default", "s1".into());
        tracker.add_edge(1.into(), "sentence_spout", "default", vec![root]);

        // split bolt emits two words anchored to edge 1 before acking it
        let roots = tracker.roots_of(&[1.into()]);
        tracker.add_edge(2.into(), "split", "default", roots.clone());
        tracker.add_edge(3.into(), "split", "default", roots);

        assert!(completed_ids(tracker.ack(&1.into())).is_empty());
        assert!(completed_ids(tracker.ack(&2.into())).is_empty());
        assert_eq!(tracker.pending_for(0), 1);
        assert_eq!(completed_ids(tracker.ack(&3.into())), vec![TupleId::from("s1")]);
        assert_eq!(tracker.pending_for(0), 0);
        assert_eq!(tracker.open_edges(), 0);
    }

    #[test]
    fn test_fail_fails_root_once() {
        let mut tracker = AckTracker::new();
        let root = tracker.open_root(0, "sentence_spout", "default", 10.into());
        tracker.add_edge(1.into(), "sentence_spout", "default", vec![root]);
        tracker.add_edge(2.into(), "sentence_spout", "default", vec![root]);

        match tracker.fail(&1.into()) {
            FailOutcome::Failed { failed, origin } => {
                assert_eq!(failed.len(), 1);
                assert_eq!(failed[0].message_id, TupleId::Int(10));
                assert_eq!(origin.component, "sentence_spout");
            }
            FailOutcome::Unknown => panic!("edge should be known"),
        }

        // sibling acked after the tree failed completes nothing
        assert!(completed_ids(tracker.ack(&2.into())).is_empty());
        assert_eq!(tracker.fail(&1.into()), FailOutcome::Unknown);
        assert_eq!(tracker.ack(&99.into()), AckOutcome::Unknown);
    }

    #[test]
    fn test_multi_anchored_edge_belongs_to_both_roots() {
        let mut tracker = AckTracker::new();
        let a = tracker.open_root(0, "spout", "default", 1.into());
        let b = tracker.open_root(0, "spout", "default", 2.into());
        tracker.add_edge(10.into(), "spout", "default", vec![a]);
        tracker.add_edge(11.into(), "spout", "default", vec![b]);

        let joined = tracker.roots_of(&[10.into(), 11.into(), 404.into()]);
        assert_eq!(joined, vec![a, b]);
        tracker.add_edge(12.into(), "join", "default", joined);

        tracker.ack(&10.into());
        tracker.ack(&11.into());
        let mut done = completed_ids(tracker.ack(&12.into()));
        done.sort_by_key(|id| id.to_string());
        assert_eq!(done, vec![TupleId::Int(1), TupleId::Int(2)]);
    }

    #[test]
    fn test_idle_root_completes_immediately() {
        let mut tracker = AckTracker::new();
        let root = tracker.open_root(3, "spout", "unused", 5.into());
        let done = tracker.complete_if_idle(root).unwrap();
        assert_eq!(done.spout_task, 3);
        assert!(tracker.complete_if_idle(root).is_none());
    }
}
