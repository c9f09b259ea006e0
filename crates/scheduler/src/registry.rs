//! Tile handle registry.
//!
//! Each registered handle owns a small [`HandleState`] behind its own mutex.
//! Submissions lock only the handles they touch, in ascending handle order,
//! so concurrent submitters on disjoint tiles never contend.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use serde::Serialize;
use tessera_core::{Access, SchedulerError, TaskId, TileHandle};
use tracing::debug;

use crate::task::lock;

/// Reader lists are compacted once they grow past this many entries.
const READER_COMPACT_THRESHOLD: usize = 64;

/// Dependency bookkeeping for one tile.
#[derive(Debug, Default)]
pub(crate) struct HandleState {
    /// Latest task declaring a write.
    pub last_writer: Option<TaskId>,
    /// Readers submitted since `last_writer`.
    pub readers: Vec<TaskId>,
    /// Set once unregistered; late submitters holding the state must bail.
    pub retired: bool,
}

impl HandleState {
    /// Record `task` against this tile and return the tasks it must wait for.
    pub fn record(&mut self, access: Access, task: TaskId, predecessors: &mut Vec<TaskId>) {
        if access.mode.is_write() {
            predecessors.extend(self.last_writer);
            predecessors.append(&mut self.readers);
            self.last_writer = Some(task);
        } else {
            predecessors.extend(self.last_writer);
            self.readers.push(task);
        }
    }

    /// Drop readers that are no longer live.
    pub fn compact(&mut self, is_live: impl Fn(TaskId) -> bool) {
        if self.readers.len() >= READER_COMPACT_THRESHOLD {
            self.readers.retain(|&r| is_live(r));
        }
    }

    fn in_use(&self, is_live: &impl Fn(TaskId) -> bool) -> bool {
        self.last_writer.is_some_and(is_live) || self.readers.iter().any(|&r| is_live(r))
    }
}

/// Snapshot of a tile's bookkeeping, for diagnostics and tests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HandleInfo {
    pub handle: TileHandle,
    pub last_writer: Option<TaskId>,
    pub readers: Vec<TaskId>,
}

pub(crate) type SharedHandleState = Arc<Mutex<HandleState>>;

pub(crate) struct HandleTable {
    next_id: AtomicU64,
    slots: RwLock<HashMap<TileHandle, SharedHandleState>>,
}

impl Default for HandleTable {
    fn default() -> Self {
        Self {
            next_id: AtomicU64::new(0),
            slots: RwLock::new(HashMap::new()),
        }
    }
}

impl HandleTable {
    /// Create `count` fresh handles with empty access state.
    pub fn register(&self, count: usize) -> Vec<TileHandle> {
        let first = self.next_id.fetch_add(count as u64, Ordering::Relaxed);
        let handles: Vec<TileHandle> = (first..first + count as u64).map(TileHandle).collect();

        let mut slots = self.slots.write().unwrap_or_else(PoisonError::into_inner);
        for &handle in &handles {
            slots.insert(handle, SharedHandleState::default());
        }
        debug!(count, first = first, "registered tiles");
        handles
    }

    /// Resolve the state cells for an already normalized access list.
    pub fn lookup(&self, accesses: &[Access]) -> Result<Vec<SharedHandleState>, SchedulerError> {
        let slots = self.slots.read().unwrap_or_else(PoisonError::into_inner);
        accesses
            .iter()
            .map(|a| {
                slots
                    .get(&a.handle)
                    .cloned()
                    .ok_or(SchedulerError::UnknownHandle(a.handle))
            })
            .collect()
    }

    /// Remove handles, all or nothing. Fails if any of them is still the
    /// last writer or a pending reader of a live task.
    pub fn unregister(
        &self,
        handles: &[TileHandle],
        is_live: impl Fn(TaskId) -> bool,
    ) -> Result<(), SchedulerError> {
        let mut sorted = handles.to_vec();
        sorted.sort_unstable();
        sorted.dedup();

        let mut slots = self.slots.write().unwrap_or_else(PoisonError::into_inner);
        let cells = sorted
            .iter()
            .map(|h| {
                slots
                    .get(h)
                    .cloned()
                    .ok_or(SchedulerError::UnknownHandle(*h))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut guards: Vec<_> = cells.iter().map(|c| lock(c)).collect();
        for (handle, state) in sorted.iter().zip(guards.iter()) {
            if state.in_use(&is_live) {
                return Err(SchedulerError::HandleInUse(*handle));
            }
        }
        for state in guards.iter_mut() {
            state.retired = true;
        }
        drop(guards);

        for handle in &sorted {
            slots.remove(handle);
        }
        debug!(count = sorted.len(), "unregistered tiles");
        Ok(())
    }

    pub fn info(&self, handle: TileHandle) -> Option<HandleInfo> {
        let cell = self
            .slots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&handle)
            .cloned()?;
        let state = lock(&cell);
        Some(HandleInfo {
            handle,
            last_writer: state.last_writer,
            readers: state.readers.clone(),
        })
    }

    pub fn len(&self) -> usize {
        self.slots.read().unwrap_or_else(PoisonError::into_inner).len()
    }
}
