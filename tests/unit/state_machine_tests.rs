//! Unit tests for the checkup workflow state machine.
//!
//! Exercises the full status × event grid: every legal pair must advance
//! and stamp the writer, every other pair must be refused.

use chrono::{Duration, Utc};

use checkup_sync::models::checkup::{
    CheckupSession, CheckupStatus, PatientSnapshot, Priority, Surface,
};
use checkup_sync::workflow::{can_transition, next_status, transition, WorkflowEvent};
use checkup_sync::AppError;

fn session_in(status: CheckupStatus) -> CheckupSession {
    let mut session = CheckupSession::new(
        42_u64,
        "P-001",
        PatientSnapshot {
            name: "Juan Dela Cruz".into(),
            ..PatientSnapshot::default()
        },
        "Consultation",
        Priority::Normal,
    );
    session.status = status;
    session.last_updated = Utc::now() - Duration::hours(1);
    session
}

fn legal(status: CheckupStatus, event: WorkflowEvent) -> Option<CheckupStatus> {
    use CheckupStatus::{Cancelled, Completed, DoctorNotified, Ongoing, Waiting};
    match (status, event) {
        (Waiting, WorkflowEvent::NotifyDoctor) => Some(DoctorNotified),
        (DoctorNotified, WorkflowEvent::StartConsultation) => Some(Ongoing),
        (Ongoing, WorkflowEvent::Complete) => Some(Completed),
        (Waiting | DoctorNotified | Ongoing, WorkflowEvent::Cancel) => Some(Cancelled),
        _ => None,
    }
}

#[test]
fn every_pair_in_the_grid_matches_the_legal_table() {
    let at = Utc::now();
    for status in CheckupStatus::ALL {
        for event in WorkflowEvent::ALL {
            let before = session_in(status);
            match (legal(status, event), transition(&before, event, Surface::Doctor, at)) {
                (Some(expected), Ok(after)) => {
                    assert_eq!(after.status, expected, "{status} + {event}");
                    assert_eq!(after.last_updated, at, "{status} + {event} stamps time");
                    assert_eq!(after.last_updated_by, Some(Surface::Doctor));
                }
                (None, Err(AppError::InvalidTransition(_))) => {}
                (expected, actual) => {
                    panic!("{status} + {event}: expected {expected:?}, got {actual:?}")
                }
            }
        }
    }
}

#[test]
fn transition_leaves_input_untouched() {
    let before = session_in(CheckupStatus::Waiting);
    let snapshot = before.clone();
    let _ = transition(&before, WorkflowEvent::NotifyDoctor, Surface::Admin, Utc::now());
    assert_eq!(before, snapshot);
}

#[test]
fn timestamps_follow_the_workflow() {
    let t0 = Utc::now();
    let waiting = session_in(CheckupStatus::Waiting);

    let notified = transition(&waiting, WorkflowEvent::NotifyDoctor, Surface::Admin, t0).unwrap();
    assert_eq!(notified.queued_at, Some(t0));

    let t1 = t0 + Duration::minutes(5);
    let ongoing =
        transition(&notified, WorkflowEvent::StartConsultation, Surface::Doctor, t1).unwrap();
    assert_eq!(ongoing.started_at, Some(t1));
    assert_eq!(ongoing.queued_at, Some(t0), "queued_at is kept");

    let t2 = t1 + Duration::minutes(20);
    let completed = transition(&ongoing, WorkflowEvent::Complete, Surface::Doctor, t2).unwrap();
    assert_eq!(completed.completed_at, Some(t2));
    assert!(completed.status.is_terminal());
}

#[test]
fn completed_cannot_return_to_waiting() {
    assert!(!can_transition(CheckupStatus::Completed, CheckupStatus::Waiting));
    assert!(!can_transition(CheckupStatus::Waiting, CheckupStatus::Waiting));
    assert!(can_transition(CheckupStatus::Ongoing, CheckupStatus::Cancelled));
}

#[test]
fn terminal_states_accept_no_event() {
    for status in [CheckupStatus::Completed, CheckupStatus::Cancelled] {
        for event in WorkflowEvent::ALL {
            let err = next_status(status, event).unwrap_err();
            assert!(err.to_string().starts_with("invalid transition:"), "{err}");
        }
    }
}

#[test]
fn toward_names_the_event_for_each_target() {
    assert_eq!(WorkflowEvent::toward(CheckupStatus::Waiting), None);
    for target in CheckupStatus::ALL.into_iter().skip(1) {
        let event = WorkflowEvent::toward(target).expect("event for non-initial status");
        assert!(CheckupStatus::ALL
            .into_iter()
            .any(|from| next_status(from, event).is_ok_and(|to| to == target)));
    }
}
