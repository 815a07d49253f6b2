//! The core revision walk.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, HashSet, VecDeque};

use grit_hash::ObjectId;
use grit_object::Commit;
use grit_odb::Odb;

use crate::{read_commit, WalkError};

/// Order in which commits are emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WalkOrder {
    /// Committer timestamp descending; equal timestamps break by id
    /// (lexicographic) for determinism.
    #[default]
    CommitterTime,
    /// Children always before parents; ties by committer date
    /// descending, then id.
    Topological,
    /// Follow only the first parent of each commit.
    FirstParent,
}

/// A resumable snapshot of a walk's position.
#[derive(Debug, Clone)]
pub struct WalkSnapshot {
    pub order: WalkOrder,
    /// Commits queued but not yet emitted.
    pub frontier: Vec<ObjectId>,
    /// Everything enqueued so far (emitted or pending).
    pub seen: Vec<ObjectId>,
}

/// Heap entry: max by (commit time, id).
struct TimeEntry {
    time: i64,
    id: ObjectId,
}

impl PartialEq for TimeEntry {
    fn eq(&self, other: &Self) -> bool {
        self.time == other.time && self.id == other.id
    }
}
impl Eq for TimeEntry {}
impl PartialOrd for TimeEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for TimeEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.time
            .cmp(&other.time)
            .then_with(|| self.id.cmp(&other.id))
    }
}

/// Iterator over commits reachable from the pushed tips.
pub struct RevWalk<'o> {
    odb: &'o Odb,
    order: WalkOrder,
    /// History is truncated at these commits: their parents are not
    /// followed (and typically do not exist locally).
    shallow: HashSet<ObjectId>,
    heap: BinaryHeap<TimeEntry>,
    seen: HashSet<ObjectId>,
    /// Topological state, built lazily on the first `next`.
    topo: Option<TopoState>,
    /// First-parent chain cursor.
    chain: VecDeque<ObjectId>,
    closed: bool,
}

struct TopoState {
    /// Children not yet emitted, per commit.
    pending_children: HashMap<ObjectId, usize>,
    parents: HashMap<ObjectId, Vec<ObjectId>>,
    /// In-degree-zero commits, max-ordered by (time, id).
    ready: BinaryHeap<TimeEntry>,
}

impl<'o> RevWalk<'o> {
    pub fn new(odb: &'o Odb, order: WalkOrder) -> Self {
        Self {
            odb,
            order,
            shallow: HashSet::new(),
            heap: BinaryHeap::new(),
            seen: HashSet::new(),
            topo: None,
            chain: VecDeque::new(),
            closed: false,
        }
    }

    /// Truncate history at these commits (the `shallow` file's set).
    pub fn set_shallow(&mut self, shallow: HashSet<ObjectId>) {
        self.shallow = shallow;
    }

    /// Add a starting tip.
    pub fn push(&mut self, tip: ObjectId) -> Result<(), WalkError> {
        if !self.seen.insert(tip) {
            return Ok(());
        }
        let commit = read_commit(self.odb, &tip)?;
        match self.order {
            WalkOrder::FirstParent => self.chain.push_back(tip),
            _ => self.heap.push(TimeEntry {
                time: commit.commit_time(),
                id: tip,
            }),
        }
        Ok(())
    }

    /// Resume a walk from a snapshot.
    pub fn resume(odb: &'o Odb, snapshot: &WalkSnapshot) -> Result<Self, WalkError> {
        let mut walk = Self::new(odb, snapshot.order);
        walk.seen = snapshot.seen.iter().copied().collect();
        for id in &snapshot.frontier {
            match snapshot.order {
                WalkOrder::FirstParent => walk.chain.push_back(*id),
                _ => {
                    let commit = read_commit(odb, id)?;
                    walk.heap.push(TimeEntry {
                        time: commit.commit_time(),
                        id: *id,
                    });
                }
            }
        }
        Ok(walk)
    }

    /// Snapshot the current frontier for later resumption.
    pub fn snapshot(&self) -> WalkSnapshot {
        let frontier = match self.order {
            WalkOrder::FirstParent => self.chain.iter().copied().collect(),
            WalkOrder::Topological => self
                .topo
                .as_ref()
                .map(|t| t.ready.iter().map(|e| e.id).collect())
                .unwrap_or_else(|| self.heap.iter().map(|e| e.id).collect()),
            WalkOrder::CommitterTime => self.heap.iter().map(|e| e.id).collect(),
        };
        WalkSnapshot {
            order: self.order,
            frontier,
            seen: self.seen.iter().copied().collect(),
        }
    }

    /// Release the walk; subsequent `next` calls return `None`.
    pub fn close(&mut self) {
        self.closed = true;
        self.heap.clear();
        self.chain.clear();
        self.topo = None;
    }

    fn next_time_ordered(&mut self) -> Option<Result<(ObjectId, Commit), WalkError>> {
        let entry = self.heap.pop()?;
        let commit = match read_commit(self.odb, &entry.id) {
            Ok(commit) => commit,
            Err(e) => return Some(Err(e)),
        };
        let at_boundary = self.shallow.contains(&entry.id);
        if !at_boundary {
            for parent in &commit.parents {
                if !self.seen.insert(*parent) {
                    continue;
                }
                // Parents beyond the shallow boundary are intentionally
                // absent; skip rather than fail.
                if !self.odb.has(parent) {
                    continue;
                }
                match read_commit(self.odb, parent) {
                    Ok(pc) => self.heap.push(TimeEntry {
                        time: pc.commit_time(),
                        id: *parent,
                    }),
                    Err(e) => return Some(Err(e)),
                }
            }
        }
        Some(Ok((entry.id, commit)))
    }

    fn next_first_parent(&mut self) -> Option<Result<(ObjectId, Commit), WalkError>> {
        let id = self.chain.pop_front()?;
        let commit = match read_commit(self.odb, &id) {
            Ok(commit) => commit,
            Err(e) => return Some(Err(e)),
        };
        if !self.shallow.contains(&id) {
            if let Some(parent) = commit.first_parent() {
                if self.seen.insert(*parent) && self.odb.has(parent) {
                    self.chain.push_back(*parent);
                }
            }
        }
        Some(Ok((id, commit)))
    }

    /// Build the sub-DAG and in-degrees for Kahn's algorithm.
    fn prepare_topo(&mut self) -> Result<(), WalkError> {
        let tips: Vec<ObjectId> = self.heap.drain().map(|e| e.id).collect();

        let mut parents: HashMap<ObjectId, Vec<ObjectId>> = HashMap::new();
        let mut pending_children: HashMap<ObjectId, usize> = HashMap::new();
        let mut times: HashMap<ObjectId, i64> = HashMap::new();

        let mut queue: VecDeque<ObjectId> = tips.iter().copied().collect();
        let mut visited: HashSet<ObjectId> = tips.iter().copied().collect();

        while let Some(id) = queue.pop_front() {
            let commit = read_commit(self.odb, &id)?;
            times.insert(id, commit.commit_time());
            let followed: Vec<ObjectId> = if self.shallow.contains(&id) {
                Vec::new()
            } else {
                commit
                    .parents
                    .iter()
                    .filter(|p| self.odb.has(p))
                    .copied()
                    .collect()
            };
            for parent in &followed {
                *pending_children.entry(*parent).or_insert(0) += 1;
                if visited.insert(*parent) {
                    queue.push_back(*parent);
                }
            }
            parents.insert(id, followed);
        }

        let mut ready = BinaryHeap::new();
        for id in &visited {
            if pending_children.get(id).copied().unwrap_or(0) == 0 {
                ready.push(TimeEntry {
                    time: times.get(id).copied().unwrap_or(0),
                    id: *id,
                });
            }
        }

        self.seen.extend(visited);
        self.topo = Some(TopoState {
            pending_children,
            parents,
            ready,
        });
        Ok(())
    }

    fn next_topological(&mut self) -> Option<Result<(ObjectId, Commit), WalkError>> {
        if self.topo.is_none() {
            if let Err(e) = self.prepare_topo() {
                return Some(Err(e));
            }
        }
        let topo = self.topo.as_mut()?;

        let entry = topo.ready.pop()?;
        let commit = match read_commit(self.odb, &entry.id) {
            Ok(commit) => commit,
            Err(e) => return Some(Err(e)),
        };

        if let Some(followed) = topo.parents.get(&entry.id) {
            for parent in followed.clone() {
                let pending = topo
                    .pending_children
                    .get_mut(&parent)
                    .expect("parent counted during prepare");
                *pending -= 1;
                if *pending == 0 {
                    let time = read_commit(self.odb, &parent)
                        .map(|c| c.commit_time())
                        .unwrap_or(0);
                    topo.ready.push(TimeEntry { time, id: parent });
                }
            }
        }
        Some(Ok((entry.id, commit)))
    }
}

impl Iterator for RevWalk<'_> {
    type Item = Result<(ObjectId, Commit), WalkError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.closed {
            return None;
        }
        match self.order {
            WalkOrder::CommitterTime => self.next_time_ordered(),
            WalkOrder::Topological => self.next_topological(),
            WalkOrder::FirstParent => self.next_first_parent(),
        }
    }
}
