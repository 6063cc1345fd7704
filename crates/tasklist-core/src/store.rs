use std::collections::BTreeSet;

use anyhow::{Context, anyhow};
use chrono::{DateTime, NaiveDate, Utc};
use tracing::{debug, info, warn};

use crate::storage::{CORRUPT_TODOS_KEY, KeyValueStore, THEME_KEY, TODOS_KEY};
use crate::task::{Category, Priority, Task, Theme};

/// Owns the task collection and theme, persisting every change through `S`.
///
/// The collection is read once in [`TaskStore::load`]; after that memory is
/// the source of truth and each mutation rewrites the whole `todos` key.
#[derive(Debug)]
pub struct TaskStore<S: KeyValueStore> {
    storage: S,
    tasks: Vec<Task>,
    theme: Theme,
    /// `None` once the id space is used up.
    next_id: Option<u64>,
}

impl<S: KeyValueStore> TaskStore<S> {
    /// Malformed `todos` (bad JSON or not even UTF-8) never fails the load:
    /// the payload is copied to `todos.corrupt` and the store starts empty.
    /// Only storage I/O errors are returned.
    #[tracing::instrument(skip(storage))]
    pub fn load(mut storage: S) -> anyhow::Result<Self> {
        let tasks = match storage.get_bytes(TODOS_KEY).context("failed to read todos")? {
            Some(bytes) => match decode_task_bytes(&bytes) {
                Ok(tasks) => tasks,
                Err(err) => {
                    let reason = format!("{err:#}");
                    warn!(
                        error = %reason,
                        backup = CORRUPT_TODOS_KEY,
                        "stored todos are unreadable; starting with an empty list"
                    );
                    storage
                        .set(CORRUPT_TODOS_KEY, &String::from_utf8_lossy(&bytes))
                        .context("failed to back up unreadable todos")?;
                    Vec::new()
                }
            },
            None => Vec::new(),
        };

        let theme = match storage.get(THEME_KEY).context("failed to read theme")? {
            Some(raw) => raw.parse::<Theme>().unwrap_or_else(|err| {
                warn!(error = %err, "stored theme is unreadable; using light");
                Theme::default()
            }),
            None => Theme::default(),
        };

        let mut seen = BTreeSet::new();
        for task in &tasks {
            if !seen.insert(task.id) {
                warn!(id = task.id, "stored todos contain a duplicate id");
            }
        }

        let next_id = match tasks.iter().map(|t| t.id).max() {
            Some(max) => max.checked_add(1),
            None => Some(1),
        };

        info!(count = tasks.len(), %theme, ?next_id, "loaded task store");
        Ok(Self {
            storage,
            tasks,
            theme,
            next_id,
        })
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn theme(&self) -> Theme {
        self.theme
    }

    pub fn get(&self, id: u64) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Tears the store down and hands the backend back.
    pub fn into_storage(self) -> S {
        self.storage
    }

    pub fn add(
        &mut self,
        text: &str,
        category: Category,
        priority: Priority,
        due_date: Option<NaiveDate>,
    ) -> anyhow::Result<Option<Task>> {
        self.add_at(text, category, priority, due_date, Utc::now())
    }

    /// Returns `Ok(None)` without touching storage when `text` is blank.
    /// Memory only changes once the write has succeeded.
    #[tracing::instrument(skip(self, text, now))]
    pub fn add_at(
        &mut self,
        text: &str,
        category: Category,
        priority: Priority,
        due_date: Option<NaiveDate>,
        now: DateTime<Utc>,
    ) -> anyhow::Result<Option<Task>> {
        if text.trim().is_empty() {
            debug!("rejected task with empty text");
            return Ok(None);
        }

        let Some(id) = self.next_id else {
            return Err(anyhow!("task id space exhausted"));
        };

        let task = Task::new(id, text.to_string(), category, priority, due_date, now);
        let mut tasks = self.tasks.clone();
        tasks.push(task.clone());
        self.commit_tasks(tasks)?;
        self.next_id = id.checked_add(1);

        info!(id, count = self.tasks.len(), "task added");
        Ok(Some(task))
    }

    /// Returns the new `completed` value, or `None` for an unknown id.
    #[tracing::instrument(skip(self))]
    pub fn toggle_completed(&mut self, id: u64) -> anyhow::Result<Option<bool>> {
        let Some(idx) = self.tasks.iter().position(|t| t.id == id) else {
            debug!(id, "toggle ignored; no such task");
            return Ok(None);
        };

        let mut tasks = self.tasks.clone();
        let completed = !tasks[idx].completed;
        tasks[idx].completed = completed;
        self.commit_tasks(tasks)?;

        info!(id, completed, "task toggled");
        Ok(Some(completed))
    }

    #[tracing::instrument(skip(self))]
    pub fn delete(&mut self, id: u64) -> anyhow::Result<Option<Task>> {
        let Some(idx) = self.tasks.iter().position(|t| t.id == id) else {
            debug!(id, "delete ignored; no such task");
            return Ok(None);
        };

        let mut tasks = self.tasks.clone();
        let removed = tasks.remove(idx);
        self.commit_tasks(tasks)?;

        info!(id, count = self.tasks.len(), "task deleted");
        Ok(Some(removed))
    }

    #[tracing::instrument(skip(self))]
    pub fn set_theme(&mut self, theme: Theme) -> anyhow::Result<()> {
        self.storage
            .set(THEME_KEY, theme.as_str())
            .context("failed to save theme")?;
        self.theme = theme;
        info!(%theme, "theme set");
        Ok(())
    }

    pub fn toggle_theme(&mut self) -> anyhow::Result<Theme> {
        let next = self.theme.toggled();
        self.set_theme(next)?;
        Ok(next)
    }

    /// Writes `tasks` as the whole `todos` payload, then adopts it.
    fn commit_tasks(&mut self, tasks: Vec<Task>) -> anyhow::Result<()> {
        let payload = serde_json::to_string(&tasks)?;
        self.storage
            .set(TODOS_KEY, &payload)
            .context("failed to save todos")?;
        debug!(count = tasks.len(), "persisted todos");
        self.tasks = tasks;
        Ok(())
    }
}

fn decode_task_bytes(bytes: &[u8]) -> anyhow::Result<Vec<Task>> {
    let raw = std::str::from_utf8(bytes).context("stored todos are not valid UTF-8")?;
    decode_tasks(raw)
}

/// `null` and blank payloads decode as an empty list.
pub fn decode_tasks(raw: &str) -> anyhow::Result<Vec<Task>> {
    if raw.trim().is_empty() {
        return Ok(Vec::new());
    }
    let tasks: Option<Vec<Task>> =
        serde_json::from_str(raw).context("failed parsing stored todos")?;
    Ok(tasks.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::rc::Rc;

    use anyhow::anyhow;
    use chrono::{Duration, NaiveDate, TimeZone, Utc};

    use super::TaskStore;
    use crate::storage::{KeyValueStore, MemoryStore};
    use crate::task::{Category, Priority, Theme};

    fn empty_store() -> TaskStore<MemoryStore> {
        TaskStore::load(MemoryStore::new()).expect("load empty store")
    }

    /// Memory-backed storage whose writes can be switched off from outside.
    struct FlakyStore {
        inner: MemoryStore,
        fail_writes: Rc<Cell<bool>>,
    }

    impl KeyValueStore for FlakyStore {
        fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
            self.inner.get(key)
        }

        fn set(&mut self, key: &str, value: &str) -> anyhow::Result<()> {
            if self.fail_writes.get() {
                return Err(anyhow!("disk full"));
            }
            self.inner.set(key, value)
        }
    }

    #[test]
    fn add_appends_one_incomplete_task() {
        let mut store = empty_store();
        let task = store
            .add("Buy milk", Category::Shopping, Priority::High, None)
            .expect("add")
            .expect("task created");

        assert_eq!(store.tasks().len(), 1);
        assert!(!task.completed);
        assert_eq!(task.text, "Buy milk");
        assert_eq!(task.category, Category::Shopping);
        assert_eq!(task.priority, Priority::High);
        assert_eq!(store.tasks()[0], task);
    }

    #[test]
    fn whitespace_text_is_rejected_without_writing() {
        let mut store = empty_store();
        let created = store
            .add("   \t", Category::Work, Priority::Low, None)
            .expect("add");

        assert!(created.is_none());
        assert!(store.tasks().is_empty());
        assert_eq!(store.storage().get("todos").expect("get"), None);
    }

    #[test]
    fn ids_stay_unique_after_deleting_the_newest() {
        let mut store = empty_store();
        let first = store
            .add("a", Category::All, Priority::Low, None)
            .expect("add")
            .expect("created");
        let second = store
            .add("b", Category::All, Priority::Low, None)
            .expect("add")
            .expect("created");
        store.delete(second.id).expect("delete");
        let third = store
            .add("c", Category::All, Priority::Low, None)
            .expect("add")
            .expect("created");

        assert!(first.id < second.id);
        assert!(second.id < third.id);
    }

    #[test]
    fn toggle_twice_restores_flag_and_unknown_id_is_noop() {
        let mut store = empty_store();
        let task = store
            .add("Run", Category::Health, Priority::Medium, None)
            .expect("add")
            .expect("created");

        assert_eq!(store.toggle_completed(task.id).expect("toggle"), Some(true));
        assert_eq!(store.toggle_completed(task.id).expect("toggle"), Some(false));
        assert!(!store.tasks()[0].completed);

        let before = store.tasks().to_vec();
        assert_eq!(store.toggle_completed(task.id + 100).expect("toggle"), None);
        assert_eq!(store.tasks(), before.as_slice());
    }

    #[test]
    fn delete_removes_exactly_one_task() {
        let mut store = empty_store();
        let keep = store
            .add("keep", Category::Work, Priority::Low, None)
            .expect("add")
            .expect("created");
        let gone = store
            .add("drop", Category::Work, Priority::Low, None)
            .expect("add")
            .expect("created");

        let removed = store.delete(gone.id).expect("delete");
        assert_eq!(removed.map(|t| t.id), Some(gone.id));
        assert_eq!(store.tasks().len(), 1);
        assert_eq!(store.tasks()[0].id, keep.id);

        assert!(store.delete(gone.id).expect("delete again").is_none());
        assert_eq!(store.tasks().len(), 1);
    }

    #[test]
    fn reload_reproduces_every_field() {
        let mut store = empty_store();
        let now = Utc.with_ymd_and_hms(2026, 10, 16, 8, 30, 0).unwrap();
        store
            .add_at(
                "Dentist",
                Category::Health,
                Priority::High,
                NaiveDate::from_ymd_opt(2026, 10, 30),
                now,
            )
            .expect("add");
        let done = store
            .add_at(
                "Report",
                Category::Work,
                Priority::Medium,
                None,
                now + Duration::milliseconds(1234),
            )
            .expect("add")
            .expect("created");
        store.toggle_completed(done.id).expect("toggle");
        store.set_theme(Theme::Dark).expect("theme");

        let expected = store.tasks().to_vec();
        let reloaded = TaskStore::load(store.into_storage()).expect("reload");

        assert_eq!(reloaded.tasks(), expected.as_slice());
        assert_eq!(reloaded.theme(), Theme::Dark);
    }

    #[test]
    fn corrupt_todos_fall_back_to_empty_and_are_preserved() {
        let storage = MemoryStore::new()
            .with_entry("todos", "[{\"id\": 1, \"text\": ")
            .with_entry("theme", "dark");
        let store = TaskStore::load(storage).expect("load");

        assert!(store.tasks().is_empty());
        assert_eq!(store.theme(), Theme::Dark);
        assert_eq!(
            store.storage().get("todos.corrupt").expect("get").as_deref(),
            Some("[{\"id\": 1, \"text\": ")
        );
    }

    #[test]
    fn missing_or_unknown_theme_defaults_to_light() {
        assert_eq!(empty_store().theme(), Theme::Light);

        let store =
            TaskStore::load(MemoryStore::new().with_entry("theme", "sepia")).expect("load");
        assert_eq!(store.theme(), Theme::Light);
    }

    #[test]
    fn null_todos_load_as_empty() {
        let store = TaskStore::load(MemoryStore::new().with_entry("todos", "null")).expect("load");
        assert!(store.tasks().is_empty());
    }

    #[test]
    fn next_id_continues_after_stored_ids() {
        let raw = r#"[{"id":1718000000000,"text":"old","completed":false,"category":"Work","priority":"low","dueDate":null,"createdAt":"2024-06-10T06:13:20.000Z"}]"#;
        let mut store = TaskStore::load(MemoryStore::new().with_entry("todos", raw)).expect("load");

        let task = store
            .add("new", Category::Work, Priority::Low, None)
            .expect("add")
            .expect("created");
        assert_eq!(task.id, 1_718_000_000_001);
    }

    #[test]
    fn failed_writes_leave_memory_unchanged() {
        let fail_writes = Rc::new(Cell::new(false));
        let storage = FlakyStore {
            inner: MemoryStore::new(),
            fail_writes: Rc::clone(&fail_writes),
        };
        let mut store = TaskStore::load(storage).expect("load");
        let kept = store
            .add("Keep me", Category::Work, Priority::Low, None)
            .expect("add")
            .expect("created");
        let before = store.tasks().to_vec();

        fail_writes.set(true);
        assert!(store.add("Buy milk", Category::Shopping, Priority::High, None).is_err());
        assert!(store.toggle_completed(kept.id).is_err());
        assert!(store.delete(kept.id).is_err());
        assert!(store.toggle_theme().is_err());
        assert_eq!(store.tasks(), before.as_slice());
        assert_eq!(store.theme(), Theme::Light);

        fail_writes.set(false);
        let next = store
            .add("Buy milk", Category::Shopping, Priority::High, None)
            .expect("add")
            .expect("created");
        assert_eq!(next.id, kept.id + 1);

        let reloaded = TaskStore::load(store.into_storage()).expect("reload");
        assert_eq!(reloaded.tasks().len(), 2);
        assert!(!reloaded.tasks()[0].completed);
    }

    #[test]
    fn add_fails_once_ids_run_out() {
        let raw = format!(
            r#"[{{"id":{},"text":"last","completed":false,"category":"Work","priority":"low","dueDate":null,"createdAt":"2026-10-16T08:00:00.000Z"}}]"#,
            u64::MAX - 1
        );
        let mut store =
            TaskStore::load(MemoryStore::new().with_entry("todos", &raw)).expect("load");

        let task = store
            .add("max", Category::Work, Priority::Low, None)
            .expect("add")
            .expect("created");
        assert_eq!(task.id, u64::MAX);

        assert!(store.add("overflow", Category::Work, Priority::Low, None).is_err());
        assert_eq!(store.tasks().len(), 2);
        assert_eq!(store.tasks().iter().filter(|t| t.id == u64::MAX).count(), 1);
    }

    #[test]
    fn theme_toggles_and_persists() {
        let mut store = empty_store();
        assert_eq!(store.toggle_theme().expect("toggle"), Theme::Dark);
        assert_eq!(
            store.storage().get("theme").expect("get").as_deref(),
            Some("dark")
        );
        assert_eq!(store.toggle_theme().expect("toggle"), Theme::Light);
    }

    #[test]
    fn example_scenario() {
        let mut store = empty_store();
        let t1 = store
            .add("Buy milk", Category::Shopping, Priority::High, None)
            .expect("add")
            .expect("created");
        assert_eq!(store.tasks().len(), 1);

        assert!(
            store
                .add("  ", Category::Shopping, Priority::High, None)
                .expect("add")
                .is_none()
        );
        assert_eq!(store.tasks().len(), 1);

        store.toggle_completed(t1.id).expect("toggle");
        assert!(store.get(t1.id).expect("present").completed);

        store.delete(t1.id).expect("delete");
        assert!(store.tasks().is_empty());
        assert_eq!(
            store.storage().get("todos").expect("get").as_deref(),
            Some("[]")
        );
    }
}
