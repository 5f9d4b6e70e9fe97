//! Unit tests for the checkup and queue models.

use chrono::{Duration, Utc};
use serde_json::json;

use checkup_sync::models::checkup::{
    CheckupDraft, CheckupId, CheckupPatch, CheckupSession, CheckupStatus, PatientSnapshot,
    Priority, Surface, VitalSigns,
};
use checkup_sync::models::queue::{self, QueueEntry};

fn patient(name: &str) -> PatientSnapshot {
    PatientSnapshot {
        name: name.into(),
        age: Some(34),
        gender: Some("male".into()),
        contact: Some("0917-000-0000".into()),
    }
}

#[test]
fn checkup_id_accepts_numbers_and_strings() {
    let numeric: CheckupId = serde_json::from_value(json!(42)).unwrap();
    let text: CheckupId = serde_json::from_value(json!("42")).unwrap();
    assert_eq!(numeric, text);
    assert_eq!(serde_json::to_value(&numeric).unwrap(), json!("42"));
}

#[test]
fn local_ids_are_prefixed_and_unique() {
    let a = CheckupId::local();
    let b = CheckupId::local();
    assert!(a.is_local());
    assert!(a.as_str().starts_with("local-"));
    assert_ne!(a, b);
    assert!(!CheckupId::from(7_u64).is_local());
}

#[test]
fn status_uses_kebab_case_on_the_wire() {
    assert_eq!(
        serde_json::to_value(CheckupStatus::DoctorNotified).unwrap(),
        json!("doctor-notified")
    );
    let parsed: CheckupStatus = serde_json::from_value(json!("ongoing")).unwrap();
    assert_eq!(parsed, CheckupStatus::Ongoing);
    assert_eq!(CheckupStatus::Cancelled.to_string(), "cancelled");
}

#[test]
fn session_deserializes_with_sparse_fields() {
    let session: CheckupSession = serde_json::from_value(json!({
        "id": 9,
        "patient_id": "P-9",
        "status": "waiting",
        "service_type": "Consultation",
        "last_updated": "2024-05-01T08:00:00Z"
    }))
    .unwrap();

    assert_eq!(session.id, CheckupId::from(9_u64));
    assert_eq!(session.priority, Priority::Normal);
    assert!(session.prescriptions.is_empty());
    assert!(session.session_data.is_none());
}

#[test]
fn draft_becomes_locally_identified_waiting_session() {
    let draft = CheckupDraft {
        patient_id: "P-1".into(),
        patient: patient("Maria Santos"),
        service_type: "Prenatal".into(),
        priority: Priority::Urgent,
        ..CheckupDraft::default()
    };
    let session = CheckupSession::from_draft(draft, Surface::Admin);

    assert!(session.id.is_local());
    assert_eq!(session.status, CheckupStatus::Waiting);
    assert_eq!(session.priority, Priority::Urgent);
    assert_eq!(session.last_updated_by, Some(Surface::Admin));
}

#[test]
fn patch_only_touches_present_fields() {
    let mut session = CheckupSession::new(1_u64, "P-1", patient("A"), "Consultation", Priority::Normal);
    session.notes = Some("initial".into());

    let vitals = VitalSigns {
        blood_pressure: Some("120/80".into()),
        ..VitalSigns::default()
    };
    session.apply_patch(&CheckupPatch {
        vital_signs: Some(vitals.clone()),
        ..CheckupPatch::default()
    });

    assert_eq!(session.notes.as_deref(), Some("initial"));
    assert_eq!(session.vital_signs, Some(vitals));
    assert!(CheckupPatch::default().is_empty());
}

#[test]
fn queue_entry_projects_patient_details() {
    let session = CheckupSession::new(5_u64, "P-5", patient("Jose Rizal"), "Consultation", Priority::Emergency);
    let entry = QueueEntry::from_session(&session);

    assert_eq!(entry.patient_name, "Jose Rizal");
    assert_eq!(entry.age, Some(34));
    assert_eq!(entry.priority, Priority::Emergency);
    assert_eq!(entry.queued_at, session.last_updated, "falls back to last write");

    let back = entry.to_session();
    assert_eq!(back.patient, session.patient);
    assert_eq!(back.status, CheckupStatus::Waiting);
}

#[test]
fn upsert_merges_same_id_in_place() {
    let first = CheckupSession::new(42_u64, "P-1", patient("Juan Dela Cruz"), "Consultation", Priority::Normal);
    let mut entries = Vec::new();
    assert!(queue::upsert(&mut entries, QueueEntry::from_session(&first)));
    let original_queued_at = entries[0].queued_at;

    let mut second = QueueEntry::from_session(&first);
    second.status = CheckupStatus::DoctorNotified;
    second.priority = Priority::Urgent;
    second.notes = None;
    second.queued_at = original_queued_at + Duration::minutes(10);
    second.last_updated = Utc::now();

    assert!(!queue::upsert(&mut entries, second));
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].status, CheckupStatus::DoctorNotified);
    assert_eq!(entries[0].priority, Priority::Urgent);
    assert_eq!(entries[0].queued_at, original_queued_at, "first queue time is kept");
}

#[test]
fn merge_does_not_erase_optional_fields() {
    let session = CheckupSession::new(3_u64, "P-3", patient("B"), "Consultation", Priority::Normal);
    let mut existing = QueueEntry::from_session(&session);
    existing.notes = Some("bring lab results".into());

    let mut incoming = QueueEntry::from_session(&session);
    incoming.contact = None;
    existing.merge(incoming);

    assert_eq!(existing.notes.as_deref(), Some("bring lab results"));
    assert_eq!(existing.contact.as_deref(), Some("0917-000-0000"));
}
