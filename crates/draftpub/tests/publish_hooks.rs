mod common;

use std::sync::Arc;

use common::*;
use draftpub::{
    FieldValue, InMemoryStore, PublishError, PublishOptions, Publisher, Record, RecordId,
    RecordStore, Selection,
};

#[test]
fn batch_hook_counts_match_visits_in_any_order() {
    for reversed in [false, true] {
        let hooks = Arc::new(RecordingHooks::default());
        let publisher = publisher_with_hooks(hooks.clone());
        let parent = page(&publisher, "parent", None);
        let child = page(&publisher, "child", Some(&parent));

        let mut batch = vec![parent.clone(), child.clone()];
        if reversed {
            batch.reverse();
        }
        let report = publisher
            .publish_all(&batch, PublishOptions::default(), None)
            .unwrap();

        assert_eq!(report.visited, 2);
        assert_eq!(hooks.count("before"), 2);
        assert_eq!(hooks.count("after"), 2);
        assert!(hooks.events().iter().all(|event| !event.deleted));
    }
}

#[test]
fn dry_run_fires_no_hooks() {
    let hooks = Arc::new(RecordingHooks::default());
    let publisher = publisher_with_hooks(hooks.clone());
    let parent = page(&publisher, "parent", None);
    let child = page(&publisher, "child", Some(&parent));

    let report = publisher
        .publish_all(&[child], PublishOptions::dry_run(), None)
        .unwrap();
    assert!(report.dry_run);
    assert_eq!(report.visited, 2);
    assert!(hooks.events().is_empty());
}

#[test]
fn before_hook_sees_draft_state_prior_to_publish() {
    let hooks = Arc::new(RecordingHooks::default());
    let publisher = publisher_with_hooks(hooks.clone());
    let draft = page(&publisher, "home", None);
    publisher
        .publish(&draft, PublishOptions::default(), None)
        .unwrap();

    let events = hooks.events();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].phase, "before");
    assert_eq!(events[1].phase, "after");
    assert_eq!(events[0].key, key(&draft));
}

#[test]
fn unpublish_fires_no_hooks() {
    let hooks = Arc::new(RecordingHooks::default());
    let publisher = publisher_with_hooks(hooks.clone());
    let draft = page(&publisher, "home", None);
    publisher
        .publish(&draft, PublishOptions::default(), None)
        .unwrap();
    hooks.clear();

    publisher
        .unpublish(&reload(&publisher, &draft), PublishOptions::default())
        .unwrap();
    assert!(hooks.events().is_empty());
}

/// Store that refuses to create public records of one model.
struct FailingStore {
    inner: Arc<InMemoryStore>,
    model: &'static str,
}

impl RecordStore for FailingStore {
    fn get(&self, model: &str, id: RecordId) -> Result<Option<Record>, PublishError> {
        self.inner.get(model, id)
    }

    fn insert(&self, record: Record) -> Result<Record, PublishError> {
        if record.is_public && record.model == self.model {
            return Err(PublishError::Storage(format!("{} is read-only", self.model)));
        }
        self.inner.insert(record)
    }

    fn update(&self, record: &Record) -> Result<(), PublishError> {
        self.inner.update(record)
    }

    fn remove(&self, model: &str, id: RecordId) -> Result<bool, PublishError> {
        self.inner.remove(model, id)
    }

    fn select(&self, model: &str, selection: Selection) -> Result<Vec<Record>, PublishError> {
        self.inner.select(model, selection)
    }

    fn referencing(
        &self,
        model: &str,
        field: &str,
        id: RecordId,
    ) -> Result<Vec<Record>, PublishError> {
        self.inner.referencing(model, field, id)
    }

    fn begin(&self) -> Result<(), PublishError> {
        self.inner.begin()
    }

    fn commit(&self) -> Result<(), PublishError> {
        self.inner.commit()
    }

    fn rollback(&self) -> Result<(), PublishError> {
        self.inner.rollback()
    }
}

#[test]
fn storage_failure_rolls_back_whole_publish() {
    let inner = Arc::new(InMemoryStore::new());
    let publisher = Publisher::new(
        FailingStore {
            inner: inner.clone(),
            model: "author",
        },
        Arc::new(registry()),
    );
    let mut author = Record::draft("author").with("name", "Ann");
    publisher.save_draft(&mut author, true).unwrap();
    let mut draft = Record::draft("page")
        .with("slug", "home")
        .with("authors", FieldValue::References(vec![author.id.unwrap()]));
    publisher.save_draft(&mut draft, true).unwrap();
    let before = inner.records();

    let err = publisher
        .publish(&draft, PublishOptions::default(), None)
        .unwrap_err();
    assert!(matches!(err, PublishError::Storage(_)), "{err}");
    assert_eq!(inner.records(), before);
    assert!(!inner.in_transaction());
}
