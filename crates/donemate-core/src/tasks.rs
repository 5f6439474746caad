use std::collections::HashSet;

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::observe::{Listeners, Subscription};
use crate::store::{DurableStore, KeyValueStore};
use crate::task::{Description, Task, TaskCollection, TaskId, TaskStats};

/// Owns the task collection and mirrors every accepted change to durable
/// storage. Mutations land in memory before the write starts.
///
/// Not-found ids, blank descriptions and clearing an empty list are no-ops:
/// nothing is written and no listener fires.
#[derive(Debug)]
pub struct TaskList<S: KeyValueStore> {
    tasks: TaskCollection,
    store: DurableStore<S>,
    retired: HashSet<TaskId>,
    listeners: Listeners<TaskCollection>,
}

impl<S: KeyValueStore> TaskList<S> {
    #[tracing::instrument(skip(store), fields(key = %store.key()))]
    pub fn open(store: DurableStore<S>) -> Self {
        let tasks = store.load();
        info!(count = tasks.len(), "task list ready");
        Self {
            tasks,
            store,
            retired: HashSet::new(),
            listeners: Listeners::new(),
        }
    }

    pub fn tasks(&self) -> &TaskCollection {
        &self.tasks
    }

    pub fn get(&self, id: TaskId) -> Option<&Task> {
        self.tasks.get(id)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn stats(&self) -> TaskStats {
        self.tasks.stats()
    }

    /// Registers a callback run after each accepted change, once the write
    /// has been attempted.
    pub fn subscribe(&self, listener: impl Fn(&TaskCollection) + 'static) -> Subscription {
        self.listeners.add(listener)
    }

    pub fn add(&mut self, description: &str) -> &TaskCollection {
        self.add_at(description, Utc::now())
    }

    pub fn add_at(&mut self, description: &str, now: DateTime<Utc>) -> &TaskCollection {
        let Some(description) = Description::parse(description) else {
            debug!("ignoring add with blank description");
            return &self.tasks;
        };

        let id = self.fresh_id();
        if self.tasks.push(Task::new(id, description, now)) {
            debug!(task_id = %id, "added task");
            self.commit();
        }
        &self.tasks
    }

    pub fn toggle(&mut self, id: TaskId) -> &TaskCollection {
        self.toggle_at(id, Utc::now())
    }

    pub fn toggle_at(&mut self, id: TaskId, now: DateTime<Utc>) -> &TaskCollection {
        if self.tasks.toggle(id, now) {
            debug!(task_id = %id, packed = self.tasks.get(id).is_some_and(Task::is_packed), "toggled task");
            self.commit();
        } else {
            debug!(task_id = %id, "toggle on unknown task ignored");
        }
        &self.tasks
    }

    pub fn edit(&mut self, id: TaskId, new_description: &str) -> &TaskCollection {
        let Some(description) = Description::parse(new_description) else {
            debug!(task_id = %id, "ignoring edit with blank description");
            return &self.tasks;
        };

        if self.tasks.edit(id, description) {
            debug!(task_id = %id, "edited task");
            self.commit();
        } else {
            debug!(task_id = %id, "edit on unknown task ignored");
        }
        &self.tasks
    }

    pub fn delete(&mut self, id: TaskId) -> &TaskCollection {
        match self.tasks.remove(id) {
            Some(removed) => {
                self.retired.insert(removed.id());
                debug!(task_id = %id, "deleted task");
                self.commit();
            }
            None => debug!(task_id = %id, "delete on unknown task ignored"),
        }
        &self.tasks
    }

    pub fn clear_all(&mut self) -> &TaskCollection {
        if self.tasks.is_empty() {
            return &self.tasks;
        }

        let removed = self.tasks.clear();
        info!(count = removed.len(), "cleared all tasks");
        self.retired.extend(removed.iter().map(Task::id));
        self.commit();
        &self.tasks
    }

    fn fresh_id(&self) -> TaskId {
        loop {
            let id = TaskId::new();
            if !self.tasks.contains(id) && !self.retired.contains(&id) {
                return id;
            }
        }
    }

    fn commit(&mut self) {
        self.store.save(&self.tasks);
        self.listeners.notify(&self.tasks);
    }
}
