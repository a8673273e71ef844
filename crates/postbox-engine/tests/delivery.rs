mod common;

use std::collections::BTreeSet;

use chrono::Duration;

use common::{Harness, RecordingNotifier, names};
use postbox_engine::{PostboxError, ValidationError};
use postbox_types::models::{MailboxStatus, UserId};

#[test]
fn full_inbox_is_skipped_and_the_rest_admitted() {
    let h = Harness::new(5);
    let a = h.user("alice");
    let b = h.user("bob");
    let c = h.user("carol");
    let d = h.user("dave");
    h.group("ops", &[c, d]);

    for _ in 0..5 {
        h.send(a, &["bob"]);
    }

    let outcome = h
        .postbox
        .create_message(Some(a), &names(&["bob"]), &names(&["ops"]), "Status", "All good", None)
        .unwrap();

    assert_eq!(outcome.admitted, BTreeSet::from([c, d]));
    assert_eq!(outcome.quota_exceeded, BTreeSet::from([b]));
    assert_eq!(h.holders(outcome.message_id), vec![c, d]);
    assert_eq!(h.message_count(), 6);
    assert_eq!(h.postbox.count(b, false).unwrap(), 5);
}

#[test]
fn group_and_nickname_overlap_yields_one_entry_each() {
    let h = Harness::new(30);
    let a = h.user("alice");
    let b = h.user("bob");
    let c = h.user("carol");
    let d = h.user("dave");
    h.group("team", &[b, c, d]);

    let outcome = h
        .postbox
        .create_message(Some(a), &names(&["bob"]), &names(&["team"]), "Hi", "Body", None)
        .unwrap();

    assert_eq!(outcome.admitted, BTreeSet::from([b, c, d]));
    assert_eq!(h.holders(outcome.message_id), vec![b, c, d]);
    for user in [b, c, d] {
        let entry = h.entry(user, outcome.message_id).unwrap();
        assert_eq!(entry.status, MailboxStatus::New);
    }
}

#[test]
fn nobody_admitted_leaves_no_message_behind() {
    let h = Harness::new(1);
    let a = h.user("alice");
    let b = h.user("bob");
    h.send(a, &["bob"]);

    let outcome = h
        .postbox
        .create_message(Some(a), &names(&["bob"]), &[], "Again", "Body", None)
        .unwrap();

    assert!(outcome.admitted.is_empty());
    assert_eq!(outcome.quota_exceeded, BTreeSet::from([b]));
    assert!(!h.message_exists(outcome.message_id));
    assert_eq!(h.message_count(), 1);
}

#[test]
fn exempt_role_bypasses_the_quota() {
    let h = Harness::new(1);
    let a = h.user("alice");
    let root = h.exempt_user("root");
    let b = h.user("bob");

    for _ in 0..3 {
        let outcome = h
            .postbox
            .create_message(Some(a), &names(&["root", "bob"]), &[], "Hi", "Body", None)
            .unwrap();
        assert!(outcome.admitted.contains(&root));
    }

    assert_eq!(h.postbox.count(root, false).unwrap(), 3);
    assert_eq!(h.postbox.count(b, false).unwrap(), 1);

    let over = h.postbox.users_over_quota().unwrap();
    assert_eq!(over, vec![(b, 1)]);
}

#[test]
fn validation_failures_persist_nothing() {
    let h = Harness::new(30);
    let a = h.user("alice");
    h.user("bob");
    h.group("ops", &[]);

    let err = h
        .postbox
        .create_message(Some(a), &names(&["bob", "ghost"]), &[], "Hi", "Body", None)
        .unwrap_err();
    assert!(matches!(err, PostboxError::Validation(ValidationError::UnknownUser(ref n)) if n == "ghost"));

    let err = h
        .postbox
        .create_message(Some(a), &names(&["bob"]), &names(&["nope"]), "Hi", "Body", None)
        .unwrap_err();
    assert!(matches!(err, PostboxError::Validation(ValidationError::UnknownGroup(ref n)) if n == "nope"));

    let err = h
        .postbox
        .create_message(Some(a), &names(&["bob", "bob"]), &[], "Hi", "Body", None)
        .unwrap_err();
    assert!(matches!(err, PostboxError::Validation(ValidationError::DuplicateRecipient(_))));

    let err = h
        .postbox
        .create_message(Some(a), &names(&["  "]), &[], "Hi", "Body", None)
        .unwrap_err();
    assert!(matches!(err, PostboxError::Validation(ValidationError::NoRecipients)));

    let long = "x".repeat(201);
    let err = h
        .postbox
        .create_message(Some(a), &names(&["bob"]), &[], "Hi", &long, None)
        .unwrap_err();
    assert!(matches!(
        err,
        PostboxError::Validation(ValidationError::BodyTooLong { len: 201, max: 200 })
    ));

    assert_eq!(h.message_count(), 0);
}

#[test]
fn empty_group_resolves_but_delivers_to_nobody() {
    let h = Harness::new(30);
    let a = h.user("alice");
    h.group("empty", &[]);

    let outcome = h
        .postbox
        .create_message(Some(a), &[], &names(&["empty"]), "Hi", "Body", None)
        .unwrap();

    assert!(outcome.admitted.is_empty());
    assert!(!h.message_exists(outcome.message_id));
}

#[test]
fn unknown_sender_is_rejected() {
    let h = Harness::new(30);
    let a = h.user("alice");
    h.user("bob");

    let ghost = UserId(a.0 + 100);
    let err = h
        .postbox
        .create_message(Some(ghost), &names(&["bob"]), &[], "Hi", "Body", None)
        .unwrap_err();
    assert!(matches!(err, PostboxError::Validation(ValidationError::UnknownSender(u)) if u == ghost));
}

#[test]
fn failing_notifier_does_not_fail_the_send() {
    // Fresh databases hand out user ids from 1 in creation order.
    let h = Harness::with_notifier(
        30,
        RecordingNotifier {
            fail_for: Some(UserId(2)),
            ..RecordingNotifier::default()
        },
    );
    let a = h.user("alice");
    let b = h.user("bob");
    let c = h.user("carol");
    assert_eq!(b, UserId(2));

    let id = h.send(a, &["bob", "carol"]);

    assert_eq!(h.holders(id), vec![b, c]);
    assert_eq!(h.notifier.recipients(), vec![c]);
}

#[test]
fn notifications_carry_the_deferred_flag() {
    let h = Harness::new(30);
    let a = h.user("alice");
    let b = h.user("bob");

    h.send(a, &["bob"]);
    let later = h.clock_now() + Duration::hours(2);
    h.postbox
        .create_message(Some(a), &names(&["bob"]), &[], "Later", "Body", Some(later))
        .unwrap();

    let sent = h.notifier.sent.lock().unwrap();
    assert_eq!(sent.len(), 2);
    assert!(sent.iter().all(|(user, _)| *user == b));
    assert!(!sent[0].1.deferred);
    assert!(sent[1].1.deferred);
    assert_eq!(sent[1].1.subject, "Later");
}

#[test]
fn concurrent_sends_never_overfill_an_inbox() {
    let h = Harness::new(3);
    let a = h.user("alice");
    let b = h.user("bob");

    let admitted: usize = std::thread::scope(|s| {
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let postbox = h.postbox.clone();
                s.spawn(move || {
                    postbox
                        .create_message(Some(a), &names(&["bob"]), &[], "Race", "Body", None)
                        .unwrap()
                        .admitted
                        .len()
                })
            })
            .collect();
        handles.into_iter().map(|handle| handle.join().unwrap()).sum()
    });

    assert_eq!(admitted, 3);
    assert_eq!(h.postbox.count(b, false).unwrap(), 3);
    assert_eq!(h.message_count(), 3);
}
