mod common;

use std::sync::Arc;

use common::*;
use draftpub::{
    DeleteOutcome, FieldValue, PublishError, PublishOptions, PublishState, Record, RecordStore,
    Selection, VisitedSet,
};

fn publish(publisher: &TestPublisher, record: &Record) -> Option<Record> {
    publisher
        .publish(record, PublishOptions::default(), None)
        .expect("publish succeeds")
}

fn block(publisher: &TestPublisher, page: &Record, content: &str) -> Record {
    save(
        publisher,
        Record::draft("page_block")
            .with("page", FieldValue::Reference(id(page)))
            .with("content", content),
    )
}

#[test]
fn deletion_round_trip() {
    let publisher = publisher();
    let draft = page(&publisher, "doomed", None);
    let public = publish(&publisher, &draft).unwrap();

    let outcome = publisher.delete(&reload(&publisher, &draft)).unwrap();
    let DeleteOutcome::Marked { record } = outcome else {
        panic!("published draft should only be marked");
    };
    assert_eq!(record.publish_state, PublishState::Delete);
    assert_eq!(record.status().label(), "To be deleted");
    assert!(exists(&publisher, &public));
    assert_eq!(
        publisher.store().select("page", Selection::Deleted).unwrap().len(),
        1
    );
    assert!(publisher.store().select("page", Selection::Draft).unwrap().is_empty());

    assert_eq!(publish(&publisher, &record), None);
    assert!(!exists(&publisher, &draft));
    assert!(!exists(&publisher, &public));

    let err = publisher
        .publish(&record, PublishOptions::default(), None)
        .unwrap_err();
    assert!(matches!(err, PublishError::PublishPrecondition(_)));
}

#[test]
fn deleting_public_record_is_rejected() {
    let publisher = publisher();
    let draft = page(&publisher, "home", None);
    let public = publish(&publisher, &draft).unwrap();

    let err = publisher.delete(&public).unwrap_err();
    assert!(matches!(err, PublishError::PublishPrecondition(_)));
}

#[test]
fn editing_a_marked_draft_requires_undelete() {
    let publisher = publisher();
    let draft = page(&publisher, "home", None);
    publish(&publisher, &draft);
    publisher.delete(&reload(&publisher, &draft)).unwrap();

    let mut marked = reload(&publisher, &draft);
    marked.set("title", "edited");
    let err = publisher.save_draft(&mut marked, true).unwrap_err();
    assert!(matches!(err, PublishError::PublishPrecondition(_)));

    assert!(publisher.undelete(&marked).unwrap());
    let mut restored = reload(&publisher, &draft);
    assert_eq!(restored.publish_state, PublishState::Changed);
    assert!(publisher.public_of(&restored).unwrap().is_some());
    restored.set("title", "edited");
    publisher.save_draft(&mut restored, true).unwrap();
}

#[test]
fn never_published_children_are_removed_with_their_parent() {
    let publisher = publisher();
    let draft = page(&publisher, "home", None);
    let first = block(&publisher, &draft, "first");

    assert!(matches!(
        publisher.delete(&draft).unwrap(),
        DeleteOutcome::Removed { .. }
    ));
    assert!(!exists(&publisher, &draft));
    assert!(!exists(&publisher, &first));
}

#[test]
fn realized_deletion_removes_owned_tree_and_cascades() {
    let hooks = Arc::new(RecordingHooks::default());
    let publisher = publisher_with_hooks(hooks.clone());
    let draft = page(&publisher, "home", None);
    let first = block(&publisher, &draft, "first");
    let public = publish(&publisher, &draft).unwrap();
    let first_public = public_of(&publisher, &first);
    let comment = save(
        &publisher,
        Record::draft("comment")
            .with("page", FieldValue::Reference(id(&public)))
            .with("body", "nice"),
    );
    hooks.clear();

    publisher.delete(&reload(&publisher, &draft)).unwrap();
    assert_eq!(publish(&publisher, &reload(&publisher, &draft)), None);

    for record in [&draft, &first, &public, &first_public, &comment] {
        assert!(!exists(&publisher, record), "{record:?} should be gone");
    }
    let events = hooks.events();
    assert_eq!(events.len(), 4);
    assert!(events.iter().all(|event| event.deleted));
    assert_eq!(hooks.count("before"), 2);
}

#[test]
fn deleted_owner_reached_from_child_removes_both() {
    // 0: the child alone; 1: child before owner; 2: owner before child.
    for ordering in 0..3 {
        let hooks = Arc::new(RecordingHooks::default());
        let publisher = publisher_with_hooks(hooks.clone());
        let draft = page(&publisher, "home", None);
        let first = block(&publisher, &draft, "first");
        let public = publish(&publisher, &draft).unwrap();
        let first_public = public_of(&publisher, &first);
        publisher.delete(&reload(&publisher, &draft)).unwrap();
        hooks.clear();

        let owner = reload(&publisher, &draft);
        let child = reload(&publisher, &first);
        match ordering {
            0 => assert_eq!(publish(&publisher, &child), None),
            1 | 2 => {
                let batch = if ordering == 1 {
                    [child, owner]
                } else {
                    [owner, child]
                };
                let report = publisher
                    .publish_all(&batch, PublishOptions::default(), None)
                    .unwrap();
                assert_eq!(report.visited, 2);
            }
            _ => unreachable!(),
        }

        for record in [&draft, &first, &public, &first_public] {
            assert!(!exists(&publisher, record), "ordering {ordering}: {record:?} remains");
        }
        assert_eq!(hooks.count("before"), 2, "ordering {ordering}");
        assert_eq!(hooks.count("after"), 2, "ordering {ordering}");
        assert!(hooks.events().iter().any(|event| event.deleted));
        assert!(!publisher.store().in_transaction());
    }
}

#[test]
fn dry_run_from_child_of_deleted_owner_matches_real_run() {
    let publisher = publisher();
    let draft = page(&publisher, "home", None);
    let first = block(&publisher, &draft, "first");
    publish(&publisher, &draft);
    publisher.delete(&reload(&publisher, &draft)).unwrap();
    let before = publisher.store().records();

    let child = reload(&publisher, &first);
    let mut dry = VisitedSet::new();
    let preview = publisher
        .publish(&child, PublishOptions::dry_run(), Some(&mut dry))
        .unwrap();
    assert_eq!(preview, None);
    assert_eq!(publisher.store().records(), before);

    let mut real = VisitedSet::new();
    publisher
        .publish(&child, PublishOptions::default(), Some(&mut real))
        .unwrap();
    let dry: Vec<_> = dry.iter().cloned().collect();
    let real: Vec<_> = real.iter().cloned().collect();
    assert_eq!(dry, real);
    assert_eq!(dry, vec![key(&first), key(&draft)]);
}

#[test]
fn deleted_dependency_is_realized_and_reference_cleared() {
    let publisher = publisher();
    let parent = page(&publisher, "parent", None);
    let child = page(&publisher, "child", Some(&parent));
    publish(&publisher, &child);
    publisher.delete(&reload(&publisher, &parent)).unwrap();

    let public_child = publish(&publisher, &reload(&publisher, &child)).unwrap();
    assert_eq!(public_child.get("parent"), Some(&FieldValue::Null));
    assert!(!exists(&publisher, &parent));
}

#[test]
fn pre_seeded_visited_set_suppresses_deletion() {
    let publisher = publisher();
    let parent = page(&publisher, "parent", None);
    let child = page(&publisher, "child", Some(&parent));
    publish(&publisher, &child);
    let parent_public = public_of(&publisher, &parent);
    publisher.delete(&reload(&publisher, &parent)).unwrap();

    let mut visited = VisitedSet::new();
    visited.add(key(&parent), None);
    let public_child = publisher
        .publish(
            &reload(&publisher, &child),
            PublishOptions::default(),
            Some(&mut visited),
        )
        .unwrap()
        .unwrap();

    assert_eq!(public_child.reference("parent"), parent_public.id);
    assert_eq!(reload(&publisher, &parent).publish_state, PublishState::Delete);
    assert!(exists(&publisher, &parent_public));
}

#[test]
fn dry_run_deletion_leaves_store_untouched() {
    let publisher = publisher();
    let draft = page(&publisher, "home", None);
    block(&publisher, &draft, "first");
    publish(&publisher, &draft);
    publisher.delete(&reload(&publisher, &draft)).unwrap();
    let before = publisher.store().records();

    let mut visited = VisitedSet::new();
    let result = publisher
        .publish(
            &reload(&publisher, &draft),
            PublishOptions::dry_run(),
            Some(&mut visited),
        )
        .unwrap();
    assert_eq!(result, None);
    assert_eq!(visited.len(), 2);
    assert_eq!(publisher.store().records(), before);
}

#[test]
fn unpublish_removes_public_tree_and_resets_drafts() {
    let publisher = publisher();
    let draft = page(&publisher, "home", None);
    let first = block(&publisher, &draft, "first");
    let public = publish(&publisher, &draft).unwrap();
    let first_public = public_of(&publisher, &first);
    let comment = save(
        &publisher,
        Record::draft("comment")
            .with("page", FieldValue::Reference(id(&public)))
            .with("body", "nice"),
    );

    let before = publisher.store().records();
    let preview = publisher
        .unpublish(&reload(&publisher, &draft), PublishOptions::dry_run())
        .unwrap();
    assert_eq!(preview.and_then(|record| record.id), public.id);
    assert_eq!(publisher.store().records(), before);

    let removed = publisher
        .unpublish(&reload(&publisher, &draft), PublishOptions::default())
        .unwrap();
    assert_eq!(removed.and_then(|record| record.id), public.id);

    for record in [&public, &first_public, &comment] {
        assert!(!exists(&publisher, record));
    }
    for record in [&draft, &first] {
        let record = reload(&publisher, record);
        assert_eq!(record.public_id, None);
        assert_eq!(record.publish_state, PublishState::Changed);
    }

    let err = publisher
        .unpublish(&reload(&publisher, &draft), PublishOptions::default())
        .unwrap_err();
    assert!(matches!(err, PublishError::UnpublishPrecondition(_)));
}

#[test]
fn unpublish_preconditions() {
    let publisher = publisher();
    let draft = page(&publisher, "home", None);
    let public = publish(&publisher, &draft).unwrap();

    for record in [public, Record::draft("page")] {
        let err = publisher
            .unpublish(&record, PublishOptions::dry_run())
            .unwrap_err();
        assert!(matches!(err, PublishError::UnpublishPrecondition(_)));
    }
}
