//! Store-level tests of the registration, cancellation and edit workflows
//! over the in-memory document store.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)] // Test code can use unwrap/expect/panic

use registration::queries::RosterQueries;
use registration::workflows::cancellation::Authorization;
use registration::{
    Affiliation, Amendment, ListKind, RecordRef, RegistrationForm, Residence, RosterError,
    RosterRepository, RosterWorkflows, Submission, WorkflowEnvironment,
};
use roster_core::environment::Clock;
use roster_testing::{InMemoryDocumentStore, ManualClock, WriteOp, test_clock};
use std::sync::Arc;
use std::time::Duration;

struct Harness {
    documents: Arc<InMemoryDocumentStore>,
    records: RosterRepository,
    workflows: RosterWorkflows,
}

fn harness() -> Harness {
    harness_with(Arc::new(ManualClock::stepping()), Duration::from_secs(5))
}

fn harness_with(clock: Arc<dyn Clock>, timeout: Duration) -> Harness {
    let documents = Arc::new(InMemoryDocumentStore::new());
    let env = WorkflowEnvironment::new(documents.clone(), clock);
    let records = env.records.clone();
    Harness {
        documents,
        records,
        workflows: RosterWorkflows::new(env, timeout),
    }
}

fn form(name: &str, student_id: &str) -> RegistrationForm {
    RegistrationForm {
        name: name.to_string(),
        student_id: student_id.to_string(),
        phone: "010-1234-5678".to_string(),
        affiliation: Some(Affiliation::Graduate),
        residence: Residence::NotApplicable,
        residence_phone: String::new(),
        password: format!("pw-{student_id}"),
        event_id: "1".to_string(),
    }
}

impl Harness {
    fn count(&self, list: ListKind) -> usize {
        self.documents.len(list.collection())
    }

    async fn accepted(&self, name: &str, student_id: &str) -> RecordRef {
        match self.workflows.submit(form(name, student_id)).await.unwrap() {
            Submission::Accepted { id } => RecordRef::new(ListKind::Registrations, id),
            other => panic!("expected acceptance, got {other:?}"),
        }
    }
}

#[tokio::test]
async fn test_default_capacity_accepts_first_submission() {
    let h = harness();

    let outcome = h.workflows.submit(form("김이화", "20250001")).await.unwrap();

    assert!(matches!(outcome, Submission::Accepted { .. }));
    assert_eq!(h.count(ListKind::Registrations), 1);
    assert_eq!(h.count(ListKind::Waitlist), 0);
    let settings = h.records.settings().await.unwrap().expect("settings created");
    assert_eq!(settings.max_capacity, 50);
    assert!(!settings.is_closed);
}

#[tokio::test]
async fn test_closed_registration_rejects_without_writes() {
    let h = harness();
    h.workflows.toggle_closed().await.unwrap();

    let result = h.workflows.submit(form("김이화", "20250001")).await;

    assert!(matches!(result, Err(RosterError::RegistrationClosed)));
    assert_eq!(h.count(ListKind::Registrations), 0);
    assert_eq!(h.count(ListKind::Waitlist), 0);
}

#[tokio::test]
async fn test_overflow_goes_to_waitlist_in_order() {
    let h = harness();
    h.workflows.set_capacity(1).await.unwrap();
    h.accepted("A", "1").await;

    let second = h.workflows.submit(form("B", "2")).await.unwrap();
    let third = h.workflows.submit(form("C", "3")).await.unwrap();

    assert!(matches!(second, Submission::Waitlisted { position: 1, .. }));
    assert!(matches!(third, Submission::Waitlisted { position: 2, .. }));
    assert_eq!(h.count(ListKind::Registrations), 1);
    assert_eq!(h.count(ListKind::Waitlist), 2);
}

#[tokio::test]
async fn test_duplicate_student_id_is_rejected_in_either_list() {
    let h = harness();
    h.workflows.set_capacity(1).await.unwrap();
    h.accepted("A", "1").await;
    h.workflows.submit(form("B", "2")).await.unwrap();

    let registered = h.workflows.submit(form("A again", "1")).await;
    let waitlisted = h.workflows.submit(form("B again", "2")).await;

    assert!(matches!(registered, Err(RosterError::AlreadyRegistered)));
    assert!(matches!(waitlisted, Err(RosterError::AlreadyWaitlisted)));
    assert_eq!(h.count(ListKind::Registrations), 1);
    assert_eq!(h.count(ListKind::Waitlist), 1);
}

#[tokio::test]
async fn test_blank_fields_are_invalid() {
    let h = harness();
    let mut blank = form("김이화", "20250001");
    blank.phone = "  ".to_string();

    let result = h.workflows.submit(blank).await;

    assert!(matches!(result, Err(RosterError::Invalid(_))));
    assert_eq!(h.count(ListKind::Registrations), 0);
}

#[tokio::test]
async fn test_capacity_two_promotion_example() {
    let h = harness();
    h.workflows.set_capacity(2).await.unwrap();
    let a = h.accepted("A", "1").await;
    h.accepted("B", "2").await;

    let c = h.workflows.submit(form("C", "3")).await.unwrap();
    assert!(matches!(c, Submission::Waitlisted { position: 1, .. }));

    let promoted = h
        .workflows
        .cancel(a, Authorization::Secret("pw-1".to_string()))
        .await
        .unwrap()
        .expect("head promoted");
    assert_eq!(promoted.student_id, "3");

    let registrations = h.records.list(ListKind::Registrations).await.unwrap();
    let names: Vec<&str> = registrations
        .iter()
        .map(|record| record.registrant.name.as_str())
        .collect();
    assert_eq!(names, ["B", "C"]);
    assert!(registrations[1].registrant.moved_from_waiting);
    assert_eq!(h.count(ListKind::Waitlist), 0);
}

#[tokio::test]
async fn test_cancel_with_waitlist_keeps_registration_count() {
    let h = harness();
    h.workflows.set_capacity(1).await.unwrap();
    let a = h.accepted("A", "1").await;
    h.workflows.submit(form("B", "2")).await.unwrap();
    h.workflows.submit(form("C", "3")).await.unwrap();
    let head = h.records.waitlist_head().await.unwrap().unwrap();

    h.workflows.cancel(a, Authorization::Admin).await.unwrap();

    assert_eq!(h.count(ListKind::Registrations), 1);
    assert_eq!(h.count(ListKind::Waitlist), 1);
    let promoted = &h.records.list(ListKind::Registrations).await.unwrap()[0];
    assert_eq!(promoted.registrant.name, head.registrant.name);
    assert_eq!(promoted.registrant.student_id, head.registrant.student_id);
    assert_eq!(promoted.registrant.phone, head.registrant.phone);
}

#[tokio::test]
async fn test_cancel_with_empty_waitlist_frees_slot() {
    let h = harness();
    let a = h.accepted("A", "1").await;
    h.accepted("B", "2").await;

    let promoted = h
        .workflows
        .cancel(a, Authorization::Secret("pw-1".to_string()))
        .await
        .unwrap();

    assert!(promoted.is_none());
    assert_eq!(h.count(ListKind::Registrations), 1);
    assert_eq!(h.count(ListKind::Waitlist), 0);
}

#[tokio::test]
async fn test_cancelling_waitlist_entry_does_not_promote() {
    let h = harness();
    h.workflows.set_capacity(1).await.unwrap();
    h.accepted("A", "1").await;
    let Submission::Waitlisted { id, .. } = h.workflows.submit(form("B", "2")).await.unwrap()
    else {
        panic!("expected waitlist");
    };

    let promoted = h
        .workflows
        .cancel(
            RecordRef::new(ListKind::Waitlist, id),
            Authorization::Secret("pw-2".to_string()),
        )
        .await
        .unwrap();

    assert!(promoted.is_none());
    assert_eq!(h.count(ListKind::Registrations), 1);
    assert_eq!(h.count(ListKind::Waitlist), 0);
}

#[tokio::test]
async fn test_wrong_password_blocks_cancel_and_edit() {
    let h = harness();
    let a = h.accepted("A", "1").await;
    let before = h.records.get(&a).await.unwrap().unwrap();

    let cancel = h
        .workflows
        .cancel(a.clone(), Authorization::Secret("nope".to_string()))
        .await;
    let amend = h
        .workflows
        .amend(
            a.clone(),
            "nope".to_string(),
            Amendment {
                name: "Z".to_string(),
                phone: "010".to_string(),
                affiliation: Some(Affiliation::Other),
                residence: Residence::NotApplicable,
                residence_phone: String::new(),
            },
        )
        .await;

    assert!(matches!(cancel, Err(RosterError::WrongPassword)));
    assert!(matches!(amend, Err(RosterError::WrongPassword)));
    assert_eq!(h.records.get(&a).await.unwrap().unwrap(), before);
}

#[tokio::test]
async fn test_edit_with_password_updates_fields() {
    let h = harness();
    let a = h.accepted("A", "1").await;

    h.workflows
        .amend(
            a.clone(),
            "pw-1".to_string(),
            Amendment {
                name: "A2".to_string(),
                phone: "010-9999-0000".to_string(),
                affiliation: Some(Affiliation::EwhaGirlsHigh),
                residence: Residence::Dormitory,
                residence_phone: "02-000-0000".to_string(),
            },
        )
        .await
        .unwrap();

    let stored = h.records.get(&a).await.unwrap().unwrap().registrant;
    assert_eq!(stored.name, "A2");
    assert_eq!(stored.affiliation, Some(Affiliation::EwhaGirlsHigh));
    assert_eq!(stored.residence, Residence::Dormitory);
    assert_eq!(stored.student_id, "1");
    assert!(stored.secret.verify("pw-1"));
}

#[tokio::test]
async fn test_missing_record_is_not_found() {
    let h = harness();

    let result = h
        .workflows
        .cancel(
            RecordRef::new(ListKind::Registrations, "missing"),
            Authorization::Admin,
        )
        .await;

    assert!(matches!(result, Err(RosterError::RecordNotFound(_))));
}

#[tokio::test]
async fn test_failed_promotion_reports_after_delete() {
    let h = harness();
    h.workflows.set_capacity(1).await.unwrap();
    let a = h.accepted("A", "1").await;
    h.workflows.submit(form("B", "2")).await.unwrap();
    h.documents
        .fail_next(WriteOp::Delete, ListKind::Waitlist.collection());

    let result = h.workflows.cancel(a, Authorization::Admin).await;

    assert!(matches!(result, Err(RosterError::PromotionFailed(_))));
    assert_eq!(h.count(ListKind::Registrations), 0);
    assert_eq!(h.count(ListKind::Waitlist), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_submissions_all_get_their_outcome() {
    let h = harness_with(Arc::new(ManualClock::stepping()), Duration::from_secs(3));
    h.workflows.set_capacity(10_000).await.unwrap();

    let mut handles = Vec::new();
    for n in 0..300 {
        let workflows = h.workflows.clone();
        handles.push(tokio::spawn(async move {
            workflows
                .submit(form(&format!("신청자{n}"), &format!("2025{n:04}")))
                .await
        }));
    }

    let mut failures = Vec::new();
    for handle in handles {
        match handle.await.expect("Task panicked") {
            Ok(Submission::Accepted { .. }) => {},
            other => failures.push(other),
        }
    }

    assert!(failures.is_empty(), "{} submissions failed: {failures:?}", failures.len());
    assert_eq!(h.count(ListKind::Registrations), 300);
}

#[tokio::test]
async fn test_same_millisecond_waitlist_positions_are_sequential() {
    let h = harness_with(Arc::new(test_clock()), Duration::from_secs(5));
    h.workflows.set_capacity(1).await.unwrap();
    h.accepted("정원", "20240000").await;

    let mut positions = Vec::new();
    for n in 1..=8 {
        match h
            .workflows
            .submit(form(&format!("대기{n}"), &format!("2025000{n}")))
            .await
            .unwrap()
        {
            Submission::Waitlisted { position, .. } => positions.push(position),
            other => panic!("expected waitlist, got {other:?}"),
        }
    }
    assert_eq!(positions, (1..=8).collect::<Vec<_>>());

    let queries = RosterQueries::new(h.records.clone());
    for n in 1..=8 {
        let view = queries
            .lookup(&format!("대기{n}"), &format!("2025000{n}"))
            .await
            .unwrap();
        assert_eq!(view.waiting_number, Some(n));
    }

    let names: Vec<_> = h
        .records
        .list(ListKind::Waitlist)
        .await
        .unwrap()
        .into_iter()
        .map(|record| record.registrant.name)
        .collect();
    assert_eq!(names, (1..=8).map(|n| format!("대기{n}")).collect::<Vec<_>>());
}

#[tokio::test]
async fn test_padded_submission_is_found_by_lookup_and_blocks_duplicates() {
    let h = harness();
    h.workflows
        .submit(form("  김이화 ", " 20250001\t"))
        .await
        .unwrap();

    let view = RosterQueries::new(h.records.clone())
        .lookup("김이화", "20250001")
        .await
        .unwrap();
    assert_eq!(view.name, "김이화");

    let again = h.workflows.submit(form("김이화", "20250001")).await;
    assert!(matches!(again, Err(RosterError::AlreadyRegistered)));
    assert_eq!(h.count(ListKind::Registrations), 1);
}

#[tokio::test]
async fn test_invalid_capacity_is_rejected() {
    let h = harness();

    assert!(matches!(
        h.workflows.set_capacity(0).await,
        Err(RosterError::InvalidCapacity)
    ));
    assert!(matches!(
        h.workflows.set_capacity(-3).await,
        Err(RosterError::InvalidCapacity)
    ));
    assert_eq!(h.workflows.settings().await.unwrap().max_capacity, 50);
}

#[tokio::test]
async fn test_workflow_stores_report_healthy_and_shut_down() {
    let h = harness();

    let checks = h.workflows.health();
    assert_eq!(checks.len(), 4);
    assert!(checks.iter().any(|c| c.component == "registration_store"));

    h.workflows.shutdown(Duration::from_secs(1)).await.unwrap();
}
