//! Catalogue of independently persisted state slices.

use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

/// Named subset of application state, saved as its own document.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum SliceName {
    /// Clinician working queue.
    Queue,
    /// Checkups registered today (the active slice).
    TodaysCheckups,
    /// Clinician checkup history (the historical slice).
    DoctorCheckups,
    /// Patient directory.
    Patients,
    /// Family groupings.
    Families,
    /// Scheduled appointments.
    Appointments,
    /// Dashboard aggregate counters.
    Dashboard,
    /// Analytics series.
    Analytics,
    /// Pharmacy and supply inventory.
    Inventory,
    /// Medical records.
    MedicalRecords,
    /// Household members not yet assigned to a family.
    UnassignedMembers,
}

impl SliceName {
    /// Every slice, in persistence order.
    pub const ALL: [Self; 11] = [
        Self::Queue,
        Self::TodaysCheckups,
        Self::DoctorCheckups,
        Self::Patients,
        Self::Families,
        Self::Appointments,
        Self::Dashboard,
        Self::Analytics,
        Self::Inventory,
        Self::MedicalRecords,
        Self::UnassignedMembers,
    ];

    /// Storage key and backup map key.
    #[must_use]
    pub fn as_key(self) -> &'static str {
        match self {
            Self::Queue => "queue",
            Self::TodaysCheckups => "todays_checkups",
            Self::DoctorCheckups => "doctor_checkups",
            Self::Patients => "patients",
            Self::Families => "families",
            Self::Appointments => "appointments",
            Self::Dashboard => "dashboard",
            Self::Analytics => "analytics",
            Self::Inventory => "inventory",
            Self::MedicalRecords => "medical_records",
            Self::UnassignedMembers => "unassigned_members",
        }
    }

    /// Resolve a storage key back to its slice.
    #[must_use]
    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|slice| slice.as_key() == key)
    }

    /// Whether the slice holds a keyed object rather than a list.
    #[must_use]
    pub fn is_object(self) -> bool {
        matches!(self, Self::Dashboard | Self::Analytics)
    }
}

impl Display for SliceName {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_key())
    }
}
