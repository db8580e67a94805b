//! In-memory backend for tests
//!
//! Behaves like a small account: containers holding sized objects, paged
//! listings, and a refusal to delete non-empty containers. Faults can be
//! scripted per operation and container, and every call is counted.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, HashSet};

use crate::backend::{
    BackendError, BackendResult, ContainerEntry, DeleteReport, DeletionService, ListingService,
    ObjectEntry, ObjectListing,
};

/// Backend operations that can be counted or made to fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    ListObjects,
    ListContainers,
    DeleteObjects,
    DeleteContainer,
}

#[derive(Debug, Clone)]
enum Fault {
    /// Fail with an election failure this many more times
    Elections(usize),
    /// Fail every call with this message
    Permanent(String),
}

#[derive(Debug, Default)]
struct State {
    containers: BTreeMap<String, BTreeMap<String, u64>>,
    faults: HashMap<(Operation, String), Fault>,
    /// (container, object) pairs that refuse deletion
    pinned: HashSet<(String, String)>,
    calls: HashMap<Operation, usize>,
    deleted_objects: u64,
    deleted_containers: Vec<String>,
}

/// Scriptable in-memory [`StorageBackend`](crate::backend::StorageBackend)
#[derive(Debug)]
pub struct InMemoryBackend {
    state: Mutex<State>,
    object_page_size: usize,
    container_page_size: usize,
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
            object_page_size: 1000,
            container_page_size: 1000,
        }
    }

    /// Limit how many objects a single `list_objects` call returns
    pub fn with_object_page_size(mut self, size: usize) -> Self {
        self.object_page_size = size.max(1);
        self
    }

    /// Limit how many containers a single `list_containers` call returns
    pub fn with_container_page_size(mut self, size: usize) -> Self {
        self.container_page_size = size.max(1);
        self
    }

    /// Create an empty container
    pub fn add_container(&self, name: &str) {
        self.state
            .lock()
            .containers
            .entry(name.to_string())
            .or_default();
    }

    /// Create `count` objects named `obj-N` of `size` bytes each in `container`
    pub fn add_objects(&self, container: &str, count: usize, size: u64) {
        let mut state = self.state.lock();
        let objects = state.containers.entry(container.to_string()).or_default();
        let start = objects.len();
        for i in start..start + count {
            objects.insert(format!("obj-{i:06}"), size);
        }
    }

    /// Make the next `times` calls of `op` on `container` fail with an
    /// election failure
    pub fn fail_elections(&self, op: Operation, container: &str, times: usize) {
        if times == 0 {
            return;
        }
        self.state
            .lock()
            .faults
            .insert((op, container.to_string()), Fault::Elections(times));
    }

    /// Make every call of `op` on `container` fail with a non-transient error.
    /// For `ListContainers` the key is the listing prefix.
    pub fn fail_permanently(&self, op: Operation, container: &str, message: &str) {
        self.state.lock().faults.insert(
            (op, container.to_string()),
            Fault::Permanent(message.to_string()),
        );
    }

    /// Make `object` in `container` refuse deletion. Bulk deletes still
    /// succeed and report it as failed.
    pub fn pin_object(&self, container: &str, object: &str) {
        self.state
            .lock()
            .pinned
            .insert((container.to_string(), object.to_string()));
    }

    /// Number of calls made for `op`, failed ones included
    pub fn calls(&self, op: Operation) -> usize {
        self.state.lock().calls.get(&op).copied().unwrap_or(0)
    }

    /// Objects removed through `delete_objects`
    pub fn deleted_objects(&self) -> u64 {
        self.state.lock().deleted_objects
    }

    /// Containers removed, in deletion order
    pub fn deleted_containers(&self) -> Vec<String> {
        self.state.lock().deleted_containers.clone()
    }

    pub fn container_exists(&self, name: &str) -> bool {
        self.state.lock().containers.contains_key(name)
    }

    pub fn object_count(&self, container: &str) -> usize {
        self.state
            .lock()
            .containers
            .get(container)
            .map(BTreeMap::len)
            .unwrap_or(0)
    }

    /// Count the call and apply any scripted fault
    fn enter(&self, state: &mut State, op: Operation, key: &str) -> BackendResult<()> {
        *state.calls.entry(op).or_insert(0) += 1;

        let fault_key = (op, key.to_string());
        let (result, exhausted) = match state.faults.get_mut(&fault_key) {
            Some(Fault::Elections(remaining)) => {
                *remaining -= 1;
                let err = BackendError::ElectionFailed(format!("Election failed for {key}"));
                (Err(err), *remaining == 0)
            }
            Some(Fault::Permanent(message)) => {
                let err = BackendError::Http {
                    status: 500,
                    message: message.clone(),
                };
                (Err(err), false)
            }
            None => (Ok(()), false),
        };

        if exhausted {
            state.faults.remove(&fault_key);
        }
        result
    }
}

#[async_trait]
impl ListingService for InMemoryBackend {
    async fn list_objects(&self, _account: &str, container: &str) -> BackendResult<ObjectListing> {
        let mut state = self.state.lock();
        self.enter(&mut state, Operation::ListObjects, container)?;

        let objects = state
            .containers
            .get(container)
            .ok_or_else(|| BackendError::NotFound(container.to_string()))?;

        Ok(ObjectListing {
            objects: objects
                .iter()
                .take(self.object_page_size)
                .map(|(name, size)| ObjectEntry {
                    name: name.clone(),
                    size: *size,
                })
                .collect(),
        })
    }

    async fn list_containers(
        &self,
        _account: &str,
        prefix: &str,
        marker: Option<&str>,
    ) -> BackendResult<Vec<ContainerEntry>> {
        let mut state = self.state.lock();
        self.enter(&mut state, Operation::ListContainers, prefix)?;

        Ok(state
            .containers
            .iter()
            .filter(|(name, _)| name.starts_with(prefix))
            .filter(|(name, _)| marker.is_none_or(|m| name.as_str() > m))
            .take(self.container_page_size)
            .map(|(name, objects)| {
                ContainerEntry::new(name.clone(), objects.len() as u64, objects.values().sum())
            })
            .collect())
    }
}

#[async_trait]
impl DeletionService for InMemoryBackend {
    async fn delete_objects(
        &self,
        _account: &str,
        container: &str,
        names: &[String],
    ) -> BackendResult<DeleteReport> {
        let mut state = self.state.lock();
        self.enter(&mut state, Operation::DeleteObjects, container)?;

        let State {
            containers,
            pinned,
            deleted_objects,
            ..
        } = &mut *state;
        let objects = containers
            .get_mut(container)
            .ok_or_else(|| BackendError::NotFound(container.to_string()))?;

        let mut report = DeleteReport::default();
        for name in names {
            if pinned.contains(&(container.to_string(), name.clone())) {
                let err = BackendError::Http {
                    status: 409,
                    message: format!("object {name} is locked"),
                };
                report.failed.push((name.clone(), err));
            } else if objects.remove(name.as_str()).is_some() {
                report.deleted.push(name.clone());
            } else {
                report
                    .failed
                    .push((name.clone(), BackendError::NotFound(name.clone())));
            }
        }
        *deleted_objects += report.deleted.len() as u64;
        Ok(report)
    }

    async fn delete_container(&self, _account: &str, container: &str) -> BackendResult<()> {
        let mut state = self.state.lock();
        self.enter(&mut state, Operation::DeleteContainer, container)?;

        let is_empty = state.containers.get(container).map(BTreeMap::is_empty);
        match is_empty {
            None => Err(BackendError::NotFound(container.to_string())),
            Some(false) => Err(BackendError::Http {
                status: 409,
                message: format!("container {container} not empty"),
            }),
            Some(true) => {
                state.containers.remove(container);
                state.deleted_containers.push(container.to_string());
                Ok(())
            }
        }
    }
}
