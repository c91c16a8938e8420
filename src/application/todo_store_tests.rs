#[cfg(test)]
mod tests {
    use super::super::todo_store::{StorageOp, TodoStore, WritePolicy, NEXT_ID_KEY, TODOS_KEY};
    use crate::domain::{repository::KeyValueStore, todo::{Priority, TodoDraft, TodoId}};
    use crate::error::{StorageError, TodoError};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    #[derive(Clone, Default)]
    struct InMemoryKv {
        values: Arc<Mutex<HashMap<String, String>>>,
        writes: Arc<Mutex<Vec<(String, String)>>>,
        failing_sets: Arc<AtomicU32>,
        failing_gets: Arc<AtomicBool>,
        refused_key: Arc<Mutex<Option<String>>>,
    }

    impl InMemoryKv {
        fn with(key: &str, value: &str) -> Self {
            let kv = Self::default();
            kv.values.lock().unwrap().insert(key.to_string(), value.to_string());
            kv
        }
        fn value(&self, key: &str) -> Option<String> { self.values.lock().unwrap().get(key).cloned() }
        fn fail_next_sets(&self, n: u32) { self.failing_sets.store(n, Ordering::SeqCst); }
        fn refuse_key(&self, key: Option<&str>) { *self.refused_key.lock().unwrap() = key.map(str::to_string); }
        fn todo_writes(&self) -> Vec<String> {
            self.writes.lock().unwrap().iter().filter(|(k, _)| k == TODOS_KEY).map(|(_, v)| v.clone()).collect()
        }
    }

    #[async_trait]
    impl KeyValueStore for InMemoryKv {
        async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
            if self.failing_gets.load(Ordering::SeqCst) { return Err(StorageError::Backend("get refused".into())) }
            Ok(self.value(key))
        }
        async fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
            if self.refused_key.lock().unwrap().as_deref() == Some(key) {
                return Err(StorageError::Backend(format!("{key} is read-only")));
            }
            let remaining = self.failing_sets.load(Ordering::SeqCst);
            if remaining > 0 {
                self.failing_sets.store(remaining - 1, Ordering::SeqCst);
                return Err(StorageError::Backend("disk full".into()));
            }
            self.values.lock().unwrap().insert(key.to_string(), value.to_string());
            self.writes.lock().unwrap().push((key.to_string(), value.to_string()));
            Ok(())
        }
    }

    async fn open(kv: &InMemoryKv) -> TodoStore<InMemoryKv> { TodoStore::open(kv.clone(), WritePolicy::default()).await }

    fn ids(store: &TodoStore<InMemoryKv>) -> Vec<&str> { store.items().iter().map(|i| i.id.as_str()).collect() }

    #[tokio::test]
    async fn create_appends_pending_item_and_persists() {
        let kv = InMemoryKv::default();
        let mut store = open(&kv).await;
        let id = store.create(TodoDraft::new("Buy milk")).await.unwrap();

        assert_eq!(id, TodoId::from("1"));
        assert_eq!(store.items().len(), 1);
        let item = store.find(&id).unwrap();
        assert!(!item.completed);
        assert_eq!(item.priority, Priority::Low);
        assert_eq!(
            kv.value(TODOS_KEY).unwrap(),
            r#"[{"id":"1","title":"Buy milk","description":"","completed":false,"priority":"3"}]"#
        );
        assert_eq!(kv.value(NEXT_ID_KEY).as_deref(), Some("2"));
        assert!(store.last_saved_at().is_some());
    }

    #[tokio::test]
    async fn empty_title_is_rejected_without_writing() {
        let kv = InMemoryKv::default();
        let mut store = open(&kv).await;
        assert_eq!(store.create(TodoDraft::new("")).await, Err(TodoError::EmptyTitle));
        assert!(store.items().is_empty());
        assert!(kv.value(TODOS_KEY).is_none());
    }

    #[tokio::test]
    async fn toggle_twice_restores_completion() {
        let kv = InMemoryKv::default();
        let mut store = open(&kv).await;
        let id = store.create(TodoDraft::new("Buy milk")).await.unwrap();

        assert_eq!(store.toggle_complete(&id).await, Ok(true));
        assert!(store.find(&id).unwrap().completed);
        assert_eq!(store.toggle_complete(&id).await, Ok(false));
        assert!(!store.find(&id).unwrap().completed);
    }

    #[tokio::test]
    async fn edit_keeps_identity_and_completion() {
        let kv = InMemoryKv::default();
        let mut store = open(&kv).await;
        let id = store.create(TodoDraft::new("Draft")).await.unwrap();
        store.toggle_complete(&id).await.unwrap();

        store.edit(&id, TodoDraft::new("Final").description("ship it").priority(Priority::High)).await.unwrap();
        let item = store.find(&id).unwrap();
        assert_eq!(item.id, id);
        assert!(item.completed);
        assert_eq!(item.title, "Final");
        assert_eq!(item.description, "ship it");
        assert_eq!(item.priority, Priority::High);
    }

    #[tokio::test]
    async fn edit_rejects_empty_title_and_unknown_id() {
        let kv = InMemoryKv::default();
        let mut store = open(&kv).await;
        let id = store.create(TodoDraft::new("Keep")).await.unwrap();
        let writes = kv.todo_writes().len();

        assert_eq!(store.edit(&id, TodoDraft::new("")).await, Err(TodoError::EmptyTitle));
        let missing = TodoId::from("42");
        assert_eq!(store.edit(&missing, TodoDraft::new("x")).await, Err(TodoError::NotFound(missing.clone())));
        assert_eq!(store.toggle_complete(&missing).await, Err(TodoError::NotFound(missing.clone())));
        assert_eq!(store.delete(&missing).await, Err(TodoError::NotFound(missing)));

        assert_eq!(store.find(&id).unwrap().title, "Keep");
        assert_eq!(kv.todo_writes().len(), writes);
    }

    #[tokio::test]
    async fn delete_keeps_order_and_never_reuses_ids() {
        let kv = InMemoryKv::default();
        let mut store = open(&kv).await;
        store.create(TodoDraft::new("A")).await.unwrap();
        store.create(TodoDraft::new("B").priority(Priority::Moderate)).await.unwrap();
        store.create(TodoDraft::new("C")).await.unwrap();

        store.delete(&TodoId::from("1")).await.unwrap();
        assert_eq!(ids(&store), ["2", "3"]);
        assert_eq!(store.items()[0].title, "B");

        store.delete(&TodoId::from("3")).await.unwrap();
        let id = store.create(TodoDraft::new("D")).await.unwrap();
        assert_eq!(id, TodoId::from("4"));
        assert_eq!(ids(&store), ["2", "4"]);
    }

    #[tokio::test]
    async fn reopen_reproduces_sequence_and_counter() {
        let kv = InMemoryKv::default();
        let mut store = open(&kv).await;
        store.create(TodoDraft::new("A")).await.unwrap();
        store.create(TodoDraft::new("B").description("second")).await.unwrap();
        store.toggle_complete(&TodoId::from("2")).await.unwrap();
        store.delete(&TodoId::from("2")).await.unwrap();
        let before = store.items().to_vec();
        drop(store);

        let mut reopened = open(&kv).await;
        assert_eq!(reopened.items(), before.as_slice());
        let id = reopened.create(TodoDraft::new("C")).await.unwrap();
        assert_eq!(id, TodoId::from("3"));
    }

    #[tokio::test]
    async fn counter_resumes_past_largest_id_when_counter_slot_missing() {
        let kv = InMemoryKv::with(TODOS_KEY, r#"[{"id":"5","title":"old","description":"","completed":true,"priority":"1"}]"#);
        let mut store = open(&kv).await;
        assert!(store.items()[0].completed);
        assert_eq!(store.create(TodoDraft::new("new")).await, Ok(TodoId::from("6")));
    }

    #[tokio::test]
    async fn corrupt_slot_loads_empty_with_warning() {
        let kv = InMemoryKv::with(TODOS_KEY, "{not json");
        let mut store = open(&kv).await;
        assert!(store.items().is_empty());
        let warning = store.take_warning().unwrap();
        assert_eq!(warning.op, StorageOp::Load);
        assert!(store.take_warning().is_none());
    }

    #[tokio::test]
    async fn failed_reload_keeps_prior_items() {
        let kv = InMemoryKv::default();
        let mut store = open(&kv).await;
        store.create(TodoDraft::new("A")).await.unwrap();

        kv.failing_gets.store(true, Ordering::SeqCst);
        assert_eq!(store.load().await.len(), 1);
        assert_eq!(store.take_warning().map(|w| w.op), Some(StorageOp::Load));
    }

    #[tokio::test(start_paused = true)]
    async fn single_write_failure_is_retried() {
        let kv = InMemoryKv::default();
        let mut store = open(&kv).await;
        kv.fail_next_sets(1);
        store.create(TodoDraft::new("A")).await.unwrap();

        assert!(store.take_warning().is_none());
        assert!(kv.value(TODOS_KEY).unwrap().contains("\"A\""));
    }

    #[tokio::test(start_paused = true)]
    async fn repeated_write_failure_warns_and_keeps_memory_state() {
        let kv = InMemoryKv::default();
        let mut store = open(&kv).await;
        kv.fail_next_sets(2);
        store.create(TodoDraft::new("A")).await.unwrap();

        let warning = store.take_warning().unwrap();
        assert_eq!(warning.op, StorageOp::Save);
        assert_eq!(warning.error, StorageError::Backend("disk full".into()));
        assert!(warning.to_string().starts_with("changes are not saved"));
        assert_eq!(store.items().len(), 1);
        assert!(store.last_saved_at().is_none());

        store.create(TodoDraft::new("B")).await.unwrap();
        assert_eq!(kv.value(TODOS_KEY).unwrap().matches("\"title\"").count(), 2);
    }

    #[tokio::test]
    async fn writes_follow_mutation_order() {
        let kv = InMemoryKv::default();
        let mut store = open(&kv).await;
        let a = store.create(TodoDraft::new("A")).await.unwrap();
        store.create(TodoDraft::new("B")).await.unwrap();
        store.toggle_complete(&a).await.unwrap();
        store.delete(&a).await.unwrap();

        let lens: Vec<usize> = kv.todo_writes().iter().map(|w| w.matches("\"id\"").count()).collect();
        assert_eq!(lens, [1, 2, 2, 1]);
        assert!(kv.todo_writes()[2].contains(r#""completed":true"#));
    }

    #[tokio::test(start_paused = true)]
    async fn lost_counter_write_is_repaired_by_next_save() {
        let kv = InMemoryKv::default();
        let mut store = open(&kv).await;
        store.create(TodoDraft::new("A")).await.unwrap();

        kv.refuse_key(Some(NEXT_ID_KEY));
        let b = store.create(TodoDraft::new("B")).await.unwrap();
        assert_eq!(b, TodoId::from("2"));
        assert_eq!(store.take_warning().map(|w| w.op), Some(StorageOp::Save));
        assert_eq!(kv.value(NEXT_ID_KEY).as_deref(), Some("2"));

        kv.refuse_key(None);
        store.delete(&b).await.unwrap();
        assert_eq!(kv.value(NEXT_ID_KEY).as_deref(), Some("3"));
        drop(store);

        let mut reopened = open(&kv).await;
        assert_eq!(reopened.create(TodoDraft::new("C")).await, Ok(TodoId::from("3")));
    }

    #[tokio::test]
    async fn stale_counter_slot_is_rewritten_on_first_save() {
        let kv = InMemoryKv::with(TODOS_KEY, r#"[{"id":"5","title":"old"}]"#);
        kv.values.lock().unwrap().insert(NEXT_ID_KEY.to_string(), "2".to_string());
        let mut store = open(&kv).await;

        store.delete(&TodoId::from("5")).await.unwrap();
        assert_eq!(kv.value(NEXT_ID_KEY).as_deref(), Some("6"));
        drop(store);

        let mut reopened = open(&kv).await;
        assert_eq!(reopened.create(TodoDraft::new("new")).await, Ok(TodoId::from("6")));
    }

    #[tokio::test]
    async fn exhausted_counter_rejects_create() {
        let kv = InMemoryKv::with(TODOS_KEY, r#"[{"id":"18446744073709551615","title":"x"}]"#);
        let mut store = open(&kv).await;

        assert_eq!(store.create(TodoDraft::new("y")).await, Err(TodoError::IdsExhausted));
        assert_eq!(store.items().len(), 1);
        assert!(kv.todo_writes().is_empty());
    }

    #[test]
    fn retry_delay_saturates_instead_of_overflowing() {
        let policy = WritePolicy { retries: 3, backoff: Duration::MAX };
        assert_eq!(policy.delay_before(2), Duration::MAX);
        assert_eq!(WritePolicy::default().delay_before(2), Duration::from_millis(400));
    }
}
