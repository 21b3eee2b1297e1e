//! Workload registry - Fixed table of workloads and their runtime state

use std::sync::{Mutex, MutexGuard, RwLock, TryLockError};

use super::error::{Result, SupervisorError};
use super::workload::{Handle, Lifecycle, RuntimeRecord, WorkloadId, WorkloadInfo, WorkloadSpec};

/// One registry entry.
///
/// `record` is read and written as a unit so status and handle always come from
/// the same transition. `op` serializes start/kill/reap on this id; it is held
/// across slow spawns while `record` is only taken to publish the result.
struct Slot {
    spec: WorkloadSpec,
    op: Mutex<()>,
    record: RwLock<RuntimeRecord>,
}

/// Ordered set of workloads, indexed by id. Size is fixed after construction.
pub struct WorkloadRegistry {
    slots: Vec<Slot>,
}

/// Held while a start/kill/reap is in flight for one workload
pub type OpGuard<'a> = MutexGuard<'a, ()>;

impl WorkloadRegistry {
    pub fn new(specs: Vec<WorkloadSpec>) -> Self {
        let slots = specs
            .into_iter()
            .map(|spec| Slot {
                spec,
                op: Mutex::new(()),
                record: RwLock::new(RuntimeRecord::default()),
            })
            .collect();
        Self { slots }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// All workload ids, in order
    pub fn ids(&self) -> impl Iterator<Item = WorkloadId> + '_ {
        (0..self.slots.len()).map(WorkloadId)
    }

    /// Convert a client-supplied id into a workload id
    pub fn resolve(&self, raw: i64) -> Result<WorkloadId> {
        usize::try_from(raw)
            .ok()
            .filter(|&index| index < self.slots.len())
            .map(WorkloadId)
            .ok_or(SupervisorError::NotFound(raw))
    }

    fn slot(&self, id: WorkloadId) -> Result<&Slot> {
        self.slots
            .get(id.index())
            .ok_or(SupervisorError::NotFound(id.index() as i64))
    }

    /// Bounds-checked lookup of one workload's current state
    pub fn get(&self, id: WorkloadId) -> Result<WorkloadInfo> {
        let slot = self.slot(id)?;
        let record = slot
            .record
            .read()
            .map_err(|_| SupervisorError::LockPoisoned("workload record"))?;
        Ok(WorkloadInfo::new(id, &slot.spec, &record))
    }

    /// Immutable definition of a workload
    pub fn spec(&self, id: WorkloadId) -> Result<&WorkloadSpec> {
        Ok(&self.slot(id)?.spec)
    }

    /// Current lifecycle state of a workload
    pub fn lifecycle(&self, id: WorkloadId) -> Result<Lifecycle> {
        let slot = self.slot(id)?;
        let record = slot
            .record
            .read()
            .map_err(|_| SupervisorError::LockPoisoned("workload record"))?;
        Ok(record.lifecycle.clone())
    }

    /// Point-in-time copy of every workload, each read atomically
    pub fn snapshot(&self) -> Result<Vec<WorkloadInfo>> {
        self.ids().map(|id| self.get(id)).collect()
    }

    pub fn set_running(&self, id: WorkloadId, handle: Handle) -> Result<()> {
        let slot = self.slot(id)?;
        slot.record
            .write()
            .map_err(|_| SupervisorError::LockPoisoned("workload record"))?
            .mark_running(handle);
        Ok(())
    }

    pub fn set_dead(&self, id: WorkloadId, reason: Option<String>) -> Result<()> {
        let slot = self.slot(id)?;
        slot.record
            .write()
            .map_err(|_| SupervisorError::LockPoisoned("workload record"))?
            .mark_dead(reason);
        Ok(())
    }

    /// Block until no other operation is in flight for `id`
    pub(crate) fn op_guard(&self, id: WorkloadId) -> Result<OpGuard<'_>> {
        self.slot(id)?
            .op
            .lock()
            .map_err(|_| SupervisorError::LockPoisoned("workload operation"))
    }

    /// Like `op_guard`, but returns None instead of waiting
    pub(crate) fn try_op_guard(&self, id: WorkloadId) -> Result<Option<OpGuard<'_>>> {
        match self.slot(id)?.op.try_lock() {
            Ok(guard) => Ok(Some(guard)),
            Err(TryLockError::WouldBlock) => Ok(None),
            Err(TryLockError::Poisoned(_)) => {
                Err(SupervisorError::LockPoisoned("workload operation"))
            }
        }
    }

    /// Number of workloads currently running
    pub fn running_count(&self) -> usize {
        self.slots
            .iter()
            .filter(|slot| {
                slot.record
                    .read()
                    .map(|r| r.lifecycle.status().is_running())
                    .unwrap_or(false)
            })
            .count()
    }
}
