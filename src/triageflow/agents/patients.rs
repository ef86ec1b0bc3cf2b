// SPDX-License-Identifier: MIT

//! Patient record lookup
//!
//! Unknown ids never fail: stores answer with [`PatientRecord::unknown`].

use crate::adk::error::TriageError;
use crate::triageflow::workflow::state::PatientRecord;
use once_cell::sync::Lazy;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

/// Source of demographic and history records
pub trait PatientStore: Send + Sync {
    fn get_patient_record(&self, patient_id: &str) -> PatientRecord;
}

fn record(
    name: &str,
    age: u32,
    gender: &str,
    history: &[&str],
    allergies: &[&str],
    medications: &[&str],
    emergency_contact: &str,
) -> PatientRecord {
    let owned = |items: &[&str]| -> Vec<String> { items.iter().map(|s| s.to_string()).collect() };
    PatientRecord {
        name: name.to_string(),
        age: Some(age),
        gender: gender.to_string(),
        medical_history: owned(history),
        allergies: owned(allergies),
        current_medications: owned(medications),
        emergency_contact: emergency_contact.to_string(),
    }
}

static MOCK_PATIENTS: Lazy<HashMap<&'static str, PatientRecord>> = Lazy::new(|| {
    HashMap::from([
        (
            "P001",
            record(
                "John Doe",
                45,
                "Male",
                &["Hypertension", "Type 2 Diabetes"],
                &["Penicillin", "Nuts"],
                &["Metformin", "Lisinopril"],
                "Jane Doe - 555-0123",
            ),
        ),
        (
            "P002",
            record(
                "Sarah Smith",
                32,
                "Female",
                &["Asthma"],
                &["Latex"],
                &["Albuterol inhaler"],
                "Mike Smith - 555-0456",
            ),
        ),
        (
            "P003",
            record(
                "Robert Johnson",
                67,
                "Male",
                &["Heart Disease", "Arthritis"],
                &["Aspirin"],
                &["Metoprolol", "Ibuprofen"],
                "Mary Johnson - 555-0789",
            ),
        ),
    ])
});

/// Built-in demo records P001 to P003
#[derive(Clone, Copy, Debug, Default)]
pub struct MockPatientStore;

impl PatientStore for MockPatientStore {
    fn get_patient_record(&self, patient_id: &str) -> PatientRecord {
        MOCK_PATIENTS
            .get(patient_id)
            .cloned()
            .unwrap_or_else(PatientRecord::unknown)
    }
}

#[derive(Debug, Deserialize)]
struct PatientDirectory {
    patients: HashMap<String, PatientRecord>,
}

/// Records loaded from a YAML file of the form
///
/// ```yaml
/// patients:
///   P100:
///     name: Ada Lovelace
///     age: 36
///     gender: Female
///     medical_history: [Migraine]
/// ```
#[derive(Clone, Debug, Default)]
pub struct YamlPatientStore {
    patients: HashMap<String, PatientRecord>,
}

impl YamlPatientStore {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, TriageError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            TriageError::config(format!("cannot read patients file {:?}: {}", path, e))
        })?;
        let store = Self::from_yaml(&content)?;
        log::info!("Loaded {} patient records from {:?}", store.len(), path);
        Ok(store)
    }

    pub fn from_yaml(content: &str) -> Result<Self, TriageError> {
        let directory: PatientDirectory = serde_yaml::from_str(content)?;
        Ok(Self {
            patients: directory.patients,
        })
    }

    pub fn len(&self) -> usize {
        self.patients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patients.is_empty()
    }
}

impl PatientStore for YamlPatientStore {
    fn get_patient_record(&self, patient_id: &str) -> PatientRecord {
        match self.patients.get(patient_id) {
            Some(record) => record.clone(),
            None => {
                log::debug!("Patient '{}' not in directory", patient_id);
                PatientRecord::unknown()
            }
        }
    }
}
