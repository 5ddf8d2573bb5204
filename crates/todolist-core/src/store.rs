use anyhow::Context;
use tracing::{debug, error, info, warn};

use crate::codec::{self, DecodeError, EMPTY_LIST};
use crate::form::{ValidationError, validate_title};
use crate::storage::KeyValueStore;
use crate::task::Task;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("task ids are exhausted; no id after {last} is available")]
    IdsExhausted { last: u64 },
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

/// In-memory state captured before a mutation so a failed save can undo it.
#[derive(Debug)]
struct Snapshot {
    tasks: Vec<Task>,
    next_id: u64,
}

/// Result of [`TaskStore::load`]. A corrupt stored list never replaces the
/// in-memory tasks.
#[derive(Debug)]
pub enum LoadOutcome {
    Loaded { count: usize },
    Missing,
    Corrupt(DecodeError),
}

impl LoadOutcome {
    pub fn is_corrupt(&self) -> bool {
        matches!(self, LoadOutcome::Corrupt(_))
    }
}

/// Ordered task list mirrored to a [`KeyValueStore`] under a single key.
#[derive(Debug)]
pub struct TaskStore<S> {
    storage: S,
    key: String,
    tasks: Vec<Task>,
    next_id: u64,
}

impl<S: KeyValueStore> TaskStore<S> {
    pub fn new(storage: S) -> Self {
        Self::with_key(storage, codec::STORAGE_KEY)
    }

    pub fn with_key(storage: S, key: impl Into<String>) -> Self {
        Self {
            storage,
            key: key.into(),
            tasks: Vec::new(),
            next_id: 1,
        }
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn get(&self, id: u64) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }

    pub fn next_id(&self) -> u64 {
        self.next_id
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    #[tracing::instrument(skip(self))]
    pub fn add(&mut self, title: &str) -> Result<Task, StoreError> {
        validate_title(title)?;

        let id = self.next_id;
        let following = id
            .checked_add(1)
            .ok_or(StoreError::IdsExhausted { last: id })?;

        let before = self.snapshot();
        let task = Task::new_pending(id, title);
        self.tasks.push(task.clone());
        self.next_id = following;
        self.commit(before)?;

        info!(id = task.id, count = self.tasks.len(), "task added");
        Ok(task)
    }

    /// Removes the first task equal to `task`. Persists even when nothing matched.
    #[tracing::instrument(skip(self, task), fields(id = task.id))]
    pub fn remove(&mut self, task: &Task) -> anyhow::Result<bool> {
        let before = self.snapshot();
        let removed = match self.tasks.iter().position(|t| t == task) {
            Some(idx) => {
                self.tasks.remove(idx);
                true
            }
            None => false,
        };
        self.commit(before)?;

        debug!(removed, count = self.tasks.len(), "remove finished");
        Ok(removed)
    }

    pub fn mark_as_done(&mut self, task: &Task) -> anyhow::Result<bool> {
        self.set_done(task, true)
    }

    pub fn mark_as_undone(&mut self, task: &Task) -> anyhow::Result<bool> {
        self.set_done(task, false)
    }

    #[tracing::instrument(skip(self, task), fields(id = task.id))]
    fn set_done(&mut self, task: &Task, done: bool) -> anyhow::Result<bool> {
        let before = self.snapshot();
        let found = match self.tasks.iter_mut().find(|t| **t == *task) {
            Some(target) => {
                target.done = done;
                true
            }
            None => false,
        };
        self.commit(before)?;

        debug!(found, done, "status updated");
        Ok(found)
    }

    /// Form-based update: finds the first task whose current title equals
    /// `title` and writes `title` back into it. Since the lookup key and the
    /// new value are the same text, this never renames anything.
    ///
    /// Returns `false` without persisting when no title matches.
    #[tracing::instrument(skip(self))]
    pub fn update(&mut self, title: &str) -> Result<bool, StoreError> {
        validate_title(title)?;

        let before = self.snapshot();
        let Some(target) = self.tasks.iter_mut().find(|t| t.title == title) else {
            debug!("no task with a matching title");
            return Ok(false);
        };
        target.title = title.to_string();
        let id = target.id;
        self.commit(before)?;

        info!(id, "task updated");
        Ok(true)
    }

    /// Inline rename: trims `text` and commits it to the task with `id`.
    /// Only emptiness is checked; the form's length bound does not apply.
    #[tracing::instrument(skip(self, text))]
    pub fn rename(&mut self, id: u64, text: &str) -> anyhow::Result<bool> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            debug!("blank inline edit ignored");
            return Ok(false);
        }
        let before = self.snapshot();
        let Some(target) = self.tasks.iter_mut().find(|t| t.id == id) else {
            debug!("no task with that id");
            return Ok(false);
        };
        target.title = trimmed.to_string();
        self.commit(before)?;

        info!(id, "task renamed");
        Ok(true)
    }

    #[tracing::instrument(skip(self), fields(key = %self.key, count = self.tasks.len()))]
    pub fn save(&mut self) -> anyhow::Result<()> {
        let data = codec::encode_tasks(&self.tasks)?;
        self.storage
            .set_item(&self.key, &data)
            .with_context(|| format!("failed to save {}", self.key))?;
        self.storage
            .set_item(&codec::counter_key(&self.key), &self.next_id.to_string())
            .with_context(|| format!("failed to save id counter for {}", self.key))?;
        Ok(())
    }

    fn snapshot(&self) -> Snapshot {
        Snapshot {
            tasks: self.tasks.clone(),
            next_id: self.next_id,
        }
    }

    /// Saves, or puts `before` back when the write fails.
    fn commit(&mut self, before: Snapshot) -> anyhow::Result<()> {
        if let Err(err) = self.save() {
            warn!(error = %err, "save failed; restoring previous tasks");
            self.tasks = before.tasks;
            self.next_id = before.next_id;
            return Err(err);
        }
        Ok(())
    }

    /// Replaces the in-memory tasks with the stored list.
    ///
    /// Decode failures are logged and reported through [`LoadOutcome::Corrupt`];
    /// the current tasks stay as they were. Only storage read failures error.
    #[tracing::instrument(skip(self), fields(key = %self.key))]
    pub fn load(&mut self) -> anyhow::Result<LoadOutcome> {
        let stored = self
            .storage
            .get_item(&self.key)
            .with_context(|| format!("failed to read {}", self.key))?;
        let missing = stored.is_none();
        let raw = stored.unwrap_or_else(|| EMPTY_LIST.to_string());

        let tasks = match codec::decode_tasks(&raw) {
            Ok(tasks) => tasks,
            Err(err) => {
                error!(error = %err, key = %self.key, "failed parsing stored task list");
                return Ok(LoadOutcome::Corrupt(err));
            }
        };

        let highest = tasks.iter().map(|t| t.id).max().unwrap_or(0);
        let Some(derived) = highest.checked_add(1) else {
            let err = DecodeError::IdOverflow(highest);
            error!(error = %err, key = %self.key, "stored task list exhausts the id space");
            return Ok(LoadOutcome::Corrupt(err));
        };

        let stored_counter = self.load_counter()?;
        self.next_id = stored_counter.unwrap_or(1).max(derived);
        self.tasks = tasks;

        info!(count = self.tasks.len(), next_id = self.next_id, "loaded tasks");
        if missing {
            Ok(LoadOutcome::Missing)
        } else {
            Ok(LoadOutcome::Loaded {
                count: self.tasks.len(),
            })
        }
    }

    fn load_counter(&self) -> anyhow::Result<Option<u64>> {
        let key = codec::counter_key(&self.key);
        let Some(raw) = self
            .storage
            .get_item(&key)
            .with_context(|| format!("failed to read {key}"))?
        else {
            return Ok(None);
        };
        match codec::decode_counter(&raw) {
            Ok(value) => Ok(Some(value)),
            Err(err) => {
                warn!(error = %err, "ignoring stored id counter");
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use anyhow::bail;
    use pretty_assertions::assert_eq;

    use super::{LoadOutcome, StoreError, TaskStore};
    use crate::codec::DecodeError;
    use crate::form::ValidationError;
    use crate::storage::{KeyValueStore, MemoryStore};
    use crate::task::Task;

    fn store() -> TaskStore<MemoryStore> {
        TaskStore::new(MemoryStore::new())
    }

    /// Memory storage whose writes can be switched to fail.
    #[derive(Debug, Default)]
    struct FlakyStore {
        inner: MemoryStore,
        fail_writes: bool,
    }

    impl KeyValueStore for FlakyStore {
        fn get_item(&self, key: &str) -> anyhow::Result<Option<String>> {
            self.inner.get_item(key)
        }

        fn set_item(&mut self, key: &str, value: &str) -> anyhow::Result<()> {
            if self.fail_writes {
                bail!("disk full");
            }
            self.inner.set_item(key, value)
        }
    }

    #[test]
    fn add_appends_pending_task_and_persists() {
        let mut store = store();
        let task = store.add("Buy milk").unwrap();

        assert_eq!(task, Task::new_pending(1, "Buy milk"));
        assert_eq!(store.tasks(), &[task]);
        assert_eq!(
            store.storage().get_item("todos").unwrap().as_deref(),
            Some(r#"[{"id":1,"task":"Buy milk","done":false}]"#)
        );
        assert_eq!(store.storage().get_item("todos.next_id").unwrap().as_deref(), Some("2"));
    }

    #[test]
    fn add_rejects_invalid_titles_without_mutating() {
        let mut store = store();
        assert!(matches!(
            store.add(""),
            Err(StoreError::Validation(ValidationError::Required))
        ));
        assert!(matches!(
            store.add(&"x".repeat(41)),
            Err(StoreError::Validation(ValidationError::TooLong { .. }))
        ));
        assert!(store.is_empty());
        assert_eq!(store.next_id(), 1);
        assert_eq!(store.storage().get_item("todos").unwrap(), None);
    }

    #[test]
    fn add_allows_duplicate_titles() {
        let mut store = store();
        store.add("same").unwrap();
        store.add("same").unwrap();
        assert_eq!(store.len(), 2);
        assert_eq!(store.tasks()[1].id, 2);
    }

    #[test]
    fn ids_are_never_reused_after_removal() {
        let mut store = store();
        let a = store.add("A").unwrap();
        let b = store.add("B").unwrap();
        store.remove(&a).unwrap();
        let c = store.add("C").unwrap();

        assert_eq!(b.id, 2);
        assert_eq!(c.id, 3);
        assert_eq!(store.tasks(), &[b, c]);
    }

    #[test]
    fn remove_twice_is_a_noop_the_second_time() {
        let mut store = store();
        let a = store.add("A").unwrap();
        store.add("B").unwrap();

        assert!(store.remove(&a).unwrap());
        let after_first = store.tasks().to_vec();
        assert!(!store.remove(&a).unwrap());
        assert_eq!(store.tasks(), after_first.as_slice());
    }

    #[test]
    fn remove_miss_still_persists() {
        let mut store = store();
        store.remove(&Task::new_pending(9, "ghost")).unwrap();
        assert_eq!(store.storage().get_item("todos").unwrap().as_deref(), Some("[]"));
    }

    #[test]
    fn remove_keeps_remaining_ids() {
        let mut store = store();
        store.add("A").unwrap();
        let b = store.add("B").unwrap();
        store.add("C").unwrap();
        store.remove(&b).unwrap();

        let ids: Vec<u64> = store.tasks().iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![1, 3]);
    }

    #[test]
    fn done_then_undone_round_trips() {
        let mut store = store();
        let task = store.add("A").unwrap();

        assert!(store.mark_as_done(&task).unwrap());
        assert!(store.get(task.id).unwrap().done);

        let done = store.get(task.id).cloned().unwrap();
        assert!(store.mark_as_undone(&done).unwrap());
        assert!(!store.get(task.id).unwrap().done);
    }

    #[test]
    fn form_update_never_renames() {
        let mut store = store();
        store.add("Buy milk").unwrap();
        let before = store.tasks().to_vec();

        assert!(store.update("Buy milk").unwrap());
        assert_eq!(store.tasks(), before.as_slice());
        assert!(!store.update("Buy bread").unwrap());
        assert_eq!(store.tasks(), before.as_slice());
    }

    #[test]
    fn form_update_matches_first_duplicate_title() {
        let mut store = store();
        store.add("dup").unwrap();
        store.add("dup").unwrap();
        assert!(store.update("dup").unwrap());
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn rename_trims_and_skips_blank_text() {
        let mut store = store();
        let task = store.add("A").unwrap();

        assert!(!store.rename(task.id, "   ").unwrap());
        assert_eq!(store.get(task.id).unwrap().title, "A");

        assert!(store.rename(task.id, "  Renamed  ").unwrap());
        assert_eq!(store.get(task.id).unwrap().title, "Renamed");

        assert!(!store.rename(99, "nobody").unwrap());
    }

    #[test]
    fn rename_does_not_apply_the_form_length_bound() {
        let mut store = store();
        let task = store.add("short").unwrap();
        let long = "y".repeat(60);

        assert!(store.rename(task.id, &long).unwrap());
        assert_eq!(store.get(task.id).unwrap().title, long);
    }

    #[test]
    fn save_then_load_reconstructs_the_sequence() {
        let mut store = store();
        store.add("A").unwrap();
        let b = store.add("B").unwrap();
        store.mark_as_done(&b).unwrap();
        let saved = store.tasks().to_vec();

        let storage = store.storage().clone();
        let mut reloaded = TaskStore::new(storage);
        let outcome = reloaded.load().unwrap();

        assert!(matches!(outcome, LoadOutcome::Loaded { count: 2 }));
        assert_eq!(reloaded.tasks(), saved.as_slice());
        assert_eq!(reloaded.next_id(), 3);
    }

    #[test]
    fn load_without_stored_value_yields_empty_list() {
        let mut store = store();
        assert!(matches!(store.load().unwrap(), LoadOutcome::Missing));
        assert!(store.is_empty());
        assert_eq!(store.next_id(), 1);
    }

    #[test]
    fn corrupt_value_keeps_existing_tasks() {
        let mut store = store();
        store.add("keep me").unwrap();
        store.storage.set_item("todos", "{not json").unwrap();

        let outcome = store.load().unwrap();
        assert!(outcome.is_corrupt());
        assert_eq!(store.tasks(), &[Task::new_pending(1, "keep me")]);
        assert_eq!(store.next_id(), 2);
    }

    #[test]
    fn counter_falls_back_to_highest_id() {
        let storage = MemoryStore::new()
            .with_item("todos", r#"[{"id":4,"task":"x","done":false}]"#)
            .with_item("todos.next_id", "garbage");
        let mut store = TaskStore::new(storage);
        store.load().unwrap();
        assert_eq!(store.next_id(), 5);
    }

    #[test]
    fn stored_counter_outlives_deleted_tail() {
        let storage = MemoryStore::new()
            .with_item("todos", r#"[{"id":1,"task":"x","done":false}]"#)
            .with_item("todos.next_id", "6");
        let mut store = TaskStore::new(storage);
        store.load().unwrap();
        assert_eq!(store.add("y").unwrap().id, 6);
    }

    #[test]
    fn custom_key_is_used_for_both_records() {
        let mut store = TaskStore::with_key(MemoryStore::new(), "work");
        store.add("A").unwrap();
        assert!(store.storage().get_item("work").unwrap().is_some());
        assert!(store.storage().get_item("work.next_id").unwrap().is_some());
        assert_eq!(store.storage().get_item("todos").unwrap(), None);
    }

    #[test]
    fn max_stored_id_is_reported_as_corrupt() {
        let storage = MemoryStore::new().with_item(
            "todos",
            r#"[{"id":18446744073709551615,"task":"x","done":false}]"#,
        );
        let mut store = TaskStore::new(storage);

        let outcome = store.load().unwrap();
        assert!(matches!(
            outcome,
            LoadOutcome::Corrupt(DecodeError::IdOverflow(u64::MAX))
        ));
        assert!(store.is_empty());
        assert_eq!(store.next_id(), 1);
    }

    #[test]
    fn exhausted_counter_refuses_to_add() {
        let storage = MemoryStore::new()
            .with_item("todos", "[]")
            .with_item("todos.next_id", "18446744073709551615");
        let mut store = TaskStore::new(storage);
        store.load().unwrap();

        assert!(matches!(
            store.add("a"),
            Err(StoreError::IdsExhausted { last: u64::MAX })
        ));
        assert!(store.is_empty());
        assert_eq!(store.next_id(), u64::MAX);
        assert_eq!(store.storage().get_item("todos").unwrap().as_deref(), Some("[]"));
    }

    #[test]
    fn second_to_last_id_is_still_handed_out() {
        let storage = MemoryStore::new().with_item("todos.next_id", "18446744073709551614");
        let mut store = TaskStore::new(storage);
        store.load().unwrap();

        assert_eq!(store.add("last").unwrap().id, u64::MAX - 1);
        assert!(matches!(store.add("one more"), Err(StoreError::IdsExhausted { .. })));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn failed_save_rolls_back_add() {
        let mut store = TaskStore::new(FlakyStore::default());
        let a = store.add("A").unwrap();
        store.storage.fail_writes = true;

        assert!(matches!(store.add("B"), Err(StoreError::Storage(_))));
        assert_eq!(store.tasks(), &[a.clone()]);
        assert_eq!(store.next_id(), 2);

        store.storage.fail_writes = false;
        assert_eq!(store.add("B").unwrap().id, 2);
    }

    #[test]
    fn failed_save_rolls_back_every_mutation() {
        let mut store = TaskStore::new(FlakyStore::default());
        let a = store.add("A").unwrap();
        store.storage.fail_writes = true;

        assert!(store.remove(&a).is_err());
        assert!(store.mark_as_done(&a).is_err());
        assert!(store.rename(a.id, "Renamed").is_err());
        assert!(store.update("A").is_err());
        assert_eq!(store.tasks(), &[a]);
    }
}
