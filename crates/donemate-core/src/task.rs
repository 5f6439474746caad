use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(Uuid);

impl TaskId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Stable id for tasks written by older builds, which keyed tasks by
    /// their creation time in milliseconds.
    pub fn from_legacy(millis: u64) -> Self {
        Self(Uuid::from_u64_pair(0, millis))
    }

    /// Stable id for an older task whose id was free text. Numeric text maps
    /// like [`TaskId::from_legacy`], anything else hashes to a v5 uuid.
    pub fn from_legacy_text(text: &str) -> Self {
        let text = text.trim();
        if let Ok(millis) = text.parse::<u64>() {
            return Self::from_legacy(millis);
        }
        if let Ok(uuid) = Uuid::parse_str(text) {
            return Self(uuid);
        }
        Self(Uuid::new_v5(&Uuid::NAMESPACE_OID, text.as_bytes()))
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for TaskId {
    fn from(value: Uuid) -> Self {
        Self(value)
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for TaskId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim()).map(Self)
    }
}

/// Task text that has already passed boundary validation: trimmed and
/// non-empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Description(String);

impl Description {
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for Description {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    id: TaskId,
    description: String,
    #[serde(default)]
    packed: bool,
    created_at: DateTime<Utc>,
    #[serde(default)]
    done_at: Option<DateTime<Utc>>,
}

impl Task {
    pub fn new(id: TaskId, description: Description, now: DateTime<Utc>) -> Self {
        Self {
            id,
            description: description.into_string(),
            packed: false,
            created_at: now,
            done_at: None,
        }
    }

    pub(crate) fn restore(
        id: TaskId,
        description: String,
        packed: bool,
        created_at: DateTime<Utc>,
        done_at: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            id,
            description,
            packed,
            created_at,
            done_at,
        }
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn is_packed(&self) -> bool {
        self.packed
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn done_at(&self) -> Option<DateTime<Utc>> {
        self.done_at
    }

    /// Flips completion. `done_at` follows `packed`.
    pub fn toggle(&mut self, now: DateTime<Utc>) {
        self.packed = !self.packed;
        self.done_at = if self.packed { Some(now) } else { None };
    }

    pub fn rename(&mut self, description: Description) {
        self.description = description.into_string();
    }

    /// Restores the `done_at`/`packed` agreement on data that did not come
    /// through [`Task::toggle`]. Returns whether anything changed.
    fn repair(&mut self) -> bool {
        match (self.packed, self.done_at) {
            (true, None) => {
                self.done_at = Some(self.created_at);
                true
            }
            (false, Some(_)) => {
                self.done_at = None;
                true
            }
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TaskStats {
    pub total: usize,
    pub done: usize,
    pub percent_complete: u8,
}

/// Ordered tasks, unique on id. Order is insertion order and never changes
/// on toggle or edit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskCollection {
    tasks: Vec<Task>,
}

impl TaskCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a collection from tasks read back from storage, dropping
    /// duplicates and blank entries and repairing completion timestamps.
    pub fn from_loaded(tasks: Vec<Task>) -> Self {
        let mut seen = HashSet::with_capacity(tasks.len());
        let mut kept = Vec::with_capacity(tasks.len());

        for mut task in tasks {
            if task.description.trim().is_empty() {
                warn!(task_id = %task.id, "dropping stored task with blank description");
                continue;
            }
            if !seen.insert(task.id) {
                warn!(task_id = %task.id, "dropping stored task with duplicate id");
                continue;
            }
            if task.repair() {
                warn!(
                    task_id = %task.id,
                    packed = task.packed,
                    "repaired completion timestamp on stored task"
                );
            }
            kept.push(task);
        }

        Self { tasks: kept }
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Task> {
        self.tasks.iter()
    }

    pub fn as_slice(&self) -> &[Task] {
        &self.tasks
    }

    pub fn get(&self, id: TaskId) -> Option<&Task> {
        self.tasks.iter().find(|task| task.id == id)
    }

    pub fn contains(&self, id: TaskId) -> bool {
        self.get(id).is_some()
    }

    pub fn position(&self, id: TaskId) -> Option<usize> {
        self.tasks.iter().position(|task| task.id == id)
    }

    pub fn last(&self) -> Option<&Task> {
        self.tasks.last()
    }

    /// Appends `task`. Refuses a task whose id is already present.
    pub fn push(&mut self, task: Task) -> bool {
        if self.contains(task.id) {
            return false;
        }
        self.tasks.push(task);
        true
    }

    pub fn toggle(&mut self, id: TaskId, now: DateTime<Utc>) -> bool {
        match self.tasks.iter_mut().find(|task| task.id == id) {
            Some(task) => {
                task.toggle(now);
                true
            }
            None => false,
        }
    }

    pub fn edit(&mut self, id: TaskId, description: Description) -> bool {
        match self.tasks.iter_mut().find(|task| task.id == id) {
            Some(task) => {
                task.rename(description);
                true
            }
            None => false,
        }
    }

    pub fn remove(&mut self, id: TaskId) -> Option<Task> {
        let idx = self.position(id)?;
        Some(self.tasks.remove(idx))
    }

    /// Empties the collection and returns the removed tasks.
    pub fn clear(&mut self) -> Vec<Task> {
        std::mem::take(&mut self.tasks)
    }

    pub fn stats(&self) -> TaskStats {
        let total = self.tasks.len();
        let done = self.tasks.iter().filter(|task| task.packed).count();
        let percent_complete = if total == 0 {
            0
        } else {
            // round half up
            ((done * 200 + total) / (total * 2)) as u8
        };

        TaskStats {
            total,
            done,
            percent_complete,
        }
    }
}

impl<'a> IntoIterator for &'a TaskCollection {
    type Item = &'a Task;
    type IntoIter = std::slice::Iter<'a, Task>;

    fn into_iter(self) -> Self::IntoIter {
        self.tasks.iter()
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::{Description, Task, TaskCollection, TaskId};

    fn at(minute: u32) -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 9, minute, 0)
            .single()
            .expect("valid timestamp")
    }

    fn task(text: &str, minute: u32) -> Task {
        Task::new(
            TaskId::new(),
            Description::parse(text).expect("non-empty description"),
            at(minute),
        )
    }

    #[test]
    fn description_rejects_blank_and_trims() {
        assert!(Description::parse("").is_none());
        assert!(Description::parse(" \t\n ").is_none());
        assert_eq!(
            Description::parse("  Buy milk ").expect("valid").as_str(),
            "Buy milk"
        );
    }

    #[test]
    fn toggle_sets_and_clears_done_at() {
        let mut t = task("Pay rent", 0);
        assert!(!t.is_packed());
        assert_eq!(t.done_at(), None);

        t.toggle(at(5));
        assert!(t.is_packed());
        assert_eq!(t.done_at(), Some(at(5)));

        t.toggle(at(6));
        assert!(!t.is_packed());
        assert_eq!(t.done_at(), None);
        assert_eq!(t.created_at(), at(0));
    }

    #[test]
    fn push_refuses_duplicate_id() {
        let mut tasks = TaskCollection::new();
        let first = task("one", 0);
        let mut dup = task("two", 1);
        dup.id = first.id();

        assert!(tasks.push(first));
        assert!(!tasks.push(dup));
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks.as_slice()[0].description(), "one");
    }

    #[test]
    fn unknown_ids_are_no_ops() {
        let mut tasks = TaskCollection::new();
        tasks.push(task("keep", 0));
        let before = tasks.clone();
        let missing = TaskId::new();

        assert!(!tasks.toggle(missing, at(1)));
        assert!(!tasks.edit(missing, Description::parse("x").expect("valid")));
        assert!(tasks.remove(missing).is_none());
        assert_eq!(tasks, before);
    }

    #[test]
    fn edit_and_toggle_keep_insertion_order() {
        let mut tasks = TaskCollection::new();
        let a = task("a", 0);
        let b = task("b", 1);
        let c = task("c", 2);
        let (a_id, b_id, c_id) = (a.id(), b.id(), c.id());
        tasks.push(a);
        tasks.push(b);
        tasks.push(c);

        tasks.toggle(b_id, at(3));
        tasks.edit(a_id, Description::parse("a2").expect("valid"));

        let ids: Vec<TaskId> = tasks.iter().map(Task::id).collect();
        assert_eq!(ids, vec![a_id, b_id, c_id]);
        assert_eq!(tasks.get(a_id).map(Task::description), Some("a2"));
    }

    #[test]
    fn stats_round_percent() {
        let mut tasks = TaskCollection::new();
        assert_eq!(tasks.stats().percent_complete, 0);

        for minute in 0..3 {
            tasks.push(task("t", minute));
        }
        let first = tasks.as_slice()[0].id();
        tasks.toggle(first, at(10));

        let stats = tasks.stats();
        assert_eq!(stats.total, 3);
        assert_eq!(stats.done, 1);
        assert_eq!(stats.percent_complete, 33);

        let second = tasks.as_slice()[1].id();
        tasks.toggle(second, at(11));
        assert_eq!(tasks.stats().percent_complete, 67);
    }

    #[test]
    fn from_loaded_repairs_and_dedups() {
        let mut packed_without_time = task("done", 0);
        packed_without_time.packed = true;
        let mut unpacked_with_time = task("open", 1);
        unpacked_with_time.done_at = Some(at(2));
        let mut dup = task("dup", 3);
        dup.id = packed_without_time.id();
        let mut blank = task("x", 4);
        blank.description = "   ".to_string();

        let tasks = TaskCollection::from_loaded(vec![
            packed_without_time.clone(),
            unpacked_with_time,
            dup,
            blank,
        ]);

        assert_eq!(tasks.len(), 2);
        let first = &tasks.as_slice()[0];
        assert!(first.is_packed());
        assert_eq!(first.done_at(), Some(first.created_at()));
        assert_eq!(tasks.as_slice()[1].done_at(), None);
    }

    #[test]
    fn legacy_text_ids_are_stable() {
        assert_eq!(
            TaskId::from_legacy_text(" 1717000000000 "),
            TaskId::from_legacy(1_717_000_000_000)
        );
        assert_eq!(
            TaskId::from_legacy_text("chore-42"),
            TaskId::from_legacy_text("chore-42")
        );
        assert_ne!(
            TaskId::from_legacy_text("chore-42"),
            TaskId::from_legacy_text("chore-43")
        );

        let existing = TaskId::new();
        assert_eq!(TaskId::from_legacy_text(&existing.to_string()), existing);
    }

    #[test]
    fn serialized_field_names_match_stored_blob() {
        let t = task("Buy milk", 0);
        let value = serde_json::to_value(&t).expect("serialize");
        assert!(value.get("createdAt").is_some());
        assert!(value.get("doneAt").is_some());
        assert_eq!(value["packed"], serde_json::Value::Bool(false));
    }
}
