#![allow(dead_code)]

use std::sync::Arc;

use draftpub::{
    FieldValue, InMemoryStore, ModelPolicy, PublishHooks, Publisher, Record, RecordKey, Registry,
    ThroughRelation, functions,
};
use parking_lot::Mutex;

pub type TestPublisher = Publisher<Arc<InMemoryStore>>;

/// Content models used across the integration tests.
pub fn registry() -> Registry {
    Registry::new()
        .with(
            ModelPolicy::publishable("page")
                .field("slug")
                .field("title")
                .field("content")
                .reference("parent", "page")
                .many_to_many("authors", "author")
                .many_to_many("log", "change_log")
                .exclude("log")
                .function("pub_date", functions::now())
                .reverse("blocks", "page_block", "page")
                .through(ThroughRelation {
                    name: "tags".into(),
                    target: "tag".into(),
                    through_model: "page_tag_order".into(),
                    source_field: "tagged_page".into(),
                    target_field: "page_tag".into(),
                    order_field: Some("tag_order".into()),
                })
                .cascade("comments", "comment", "page"),
        )
        .with(
            ModelPolicy::publishable("page_block")
                .reference("page", "page")
                .field("content"),
        )
        .with(
            ModelPolicy::publishable("page_tag_order")
                .reference("tagged_page", "page")
                .reference("page_tag", "tag")
                .field("tag_order"),
        )
        .with(ModelPolicy::plain("tag").field("name"))
        .with(ModelPolicy::plain("comment").reference("page", "page").field("body"))
        .with(
            ModelPolicy::publishable("author")
                .field("name")
                .reverse("profile", "author_profile", "author"),
        )
        .with(
            ModelPolicy::plain("author_profile")
                .reference("author", "author")
                .field("bio"),
        )
        .with(ModelPolicy::plain("change_log").field("message"))
        .with(
            ModelPolicy::publishable("flat_page")
                .field("title")
                .many_to_many("sites", "site"),
        )
        .with(ModelPolicy::plain("site").field("domain"))
}

pub fn publisher() -> TestPublisher {
    let registry = registry();
    registry.validate().expect("fixture registry is consistent");
    Publisher::new(Arc::new(InMemoryStore::new()), Arc::new(registry))
}

pub fn publisher_with_hooks(hooks: Arc<RecordingHooks>) -> TestPublisher {
    publisher().with_hooks(hooks)
}

pub fn save(publisher: &TestPublisher, mut record: Record) -> Record {
    publisher
        .save_draft(&mut record, true)
        .expect("draft saves");
    record
}

pub fn page(publisher: &TestPublisher, slug: &str, parent: Option<&Record>) -> Record {
    let mut record = Record::draft("page").with("slug", slug).with("title", slug);
    if let Some(parent) = parent {
        record.set("parent", FieldValue::Reference(id(parent)));
    }
    save(publisher, record)
}

pub fn id(record: &Record) -> u64 {
    record.id.expect("saved record")
}

pub fn key(record: &Record) -> RecordKey {
    record.key().expect("saved record")
}

pub fn reload(publisher: &TestPublisher, record: &Record) -> Record {
    publisher
        .reload(record)
        .expect("store readable")
        .expect("record still exists")
}

pub fn exists(publisher: &TestPublisher, record: &Record) -> bool {
    publisher.reload(record).expect("store readable").is_some()
}

pub fn public_of(publisher: &TestPublisher, record: &Record) -> Record {
    let draft = reload(publisher, record);
    publisher
        .public_of(&draft)
        .expect("store readable")
        .expect("draft has a public counterpart")
}

/// Slash-joined slugs from the root page down to `record`, following `parent` links on
/// whichever side (draft or public) `record` lives.
pub fn path(publisher: &TestPublisher, record: &Record) -> String {
    let mut slugs = Vec::new();
    let mut cursor = Some(record.clone());
    while let Some(current) = cursor {
        slugs.push(current.text("slug").unwrap_or_default().to_string());
        cursor = current.reference("parent").and_then(|parent| {
            publisher
                .reload(&Record {
                    id: Some(parent),
                    ..Record::draft("page")
                })
                .expect("store readable")
        });
    }
    slugs.reverse();
    format!("/{}/", slugs.join("/"))
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HookEvent {
    pub phase: &'static str,
    pub key: RecordKey,
    pub deleted: bool,
}

#[derive(Default)]
pub struct RecordingHooks {
    events: Mutex<Vec<HookEvent>>,
}

impl RecordingHooks {
    pub fn events(&self) -> Vec<HookEvent> {
        self.events.lock().clone()
    }

    pub fn count(&self, phase: &str) -> usize {
        self.events
            .lock()
            .iter()
            .filter(|event| event.phase == phase)
            .count()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }

    fn push(&self, phase: &'static str, record: &Record, deleted: bool) {
        self.events.lock().push(HookEvent {
            phase,
            key: record.key().expect("hooks see saved drafts"),
            deleted,
        });
    }
}

impl PublishHooks for RecordingHooks {
    fn before_state_change(&self, record: &Record, deleted: bool) {
        self.push("before", record, deleted);
    }

    fn after_state_change(&self, record: &Record, deleted: bool) {
        self.push("after", record, deleted);
    }
}
