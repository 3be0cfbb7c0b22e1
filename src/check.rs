//! Referential consistency of a radiotherapy dataset.

use std::fmt::{self, Display};

use serde::Serialize;

use crate::model::{InstanceKind, Patient, Study};

/// Tree level a defect is reported at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Patient,
    Study,
    Instance,
}

impl Level {
    /// Indentation of report lines at this level.
    pub fn indent(&self) -> usize {
        match self {
            Level::Patient => 0,
            Level::Study => 2,
            Level::Instance => 4,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "defect", rename_all = "snake_case")]
pub enum Defect {
    NoStudies,
    MultipleStudies { count: usize },
    MultipleFramesOfReference { study: String },
    PlanMissingStructureSet { instance: String },
    StructureSetMissingCt { instance: String },
    DoseMissingPlan { instance: String },
    DoseMissingStructureSet { instance: String },
}

impl Defect {
    pub fn level(&self) -> Level {
        match self {
            Defect::NoStudies | Defect::MultipleStudies { .. } => Level::Patient,
            Defect::MultipleFramesOfReference { .. } => Level::Study,
            _ => Level::Instance,
        }
    }

    /// The study a study-level defect is about.
    pub fn study(&self) -> Option<&str> {
        match self {
            Defect::MultipleFramesOfReference { study } => Some(study),
            _ => None,
        }
    }

    /// The instance an instance-level defect is about.
    pub fn instance(&self) -> Option<&str> {
        match self {
            Defect::PlanMissingStructureSet { instance }
            | Defect::StructureSetMissingCt { instance }
            | Defect::DoseMissingPlan { instance }
            | Defect::DoseMissingStructureSet { instance } => Some(instance),
            _ => None,
        }
    }
}

impl Display for Defect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Defect::NoStudies => f.write_str("No studies"),
            Defect::MultipleStudies { .. } => f.write_str("Multiple studies"),
            Defect::MultipleFramesOfReference { .. } => {
                f.write_str("Study has multiple Frames of Reference")
            }
            Defect::PlanMissingStructureSet { .. } => {
                f.write_str("RTPLAN references missing Structure Set")
            }
            Defect::StructureSetMissingCt { .. } => f.write_str("RTSTRUCT references missing CT"),
            Defect::DoseMissingPlan { .. } => f.write_str("RTDOSE references missing RTPlan"),
            Defect::DoseMissingStructureSet { .. } => {
                f.write_str("RTDOSE references missing Structure Set")
            }
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CheckReport {
    pub defects: Vec<Defect>,
}

impl CheckReport {
    pub fn is_fine(&self) -> bool {
        self.defects.is_empty()
    }

    /// The patient tree with each defect listed under the node it is about,
    /// ending in a success line when there are none.
    pub fn render(&self, patient: &Patient) -> String {
        let mut lines = vec![patient.to_string()];
        let error = |defect: &Defect| format!("{:indent$}ERROR: {defect}", "", indent = defect.level().indent());
        lines.extend(
            self.defects
                .iter()
                .filter(|d| d.instance().is_none() && d.study().is_none())
                .map(error),
        );
        for study in patient.studies() {
            lines.push(format!("> {study}"));
            lines.extend(
                self.defects
                    .iter()
                    .filter(|d| d.study() == Some(study.uid.as_str()))
                    .map(error),
            );
            for series in study.series() {
                lines.push(format!("  > {series}"));
                lines.extend(
                    self.defects
                        .iter()
                        .filter(|d| d.instance().is_some_and(|uid| series.instances.contains(uid)))
                        .map(error),
                );
            }
        }
        if self.is_fine() {
            lines.push("Dataset is consistent".to_string());
        }
        lines.join("\n")
    }

    fn push(&mut self, defect: Defect) {
        tracing::debug!(%defect, "consistency defect");
        self.defects.push(defect);
    }
}

/// Check a patient folder that should hold exactly one study.
///
/// All defects are collected. With more than one study only the first is
/// examined further.
pub fn check_patient(patient: &Patient) -> CheckReport {
    let mut report = CheckReport::default();
    match patient.studies.len() {
        0 => {
            report.push(Defect::NoStudies);
            return report;
        }
        1 => {}
        count => report.push(Defect::MultipleStudies { count }),
    }
    if let Some(study) = patient.studies().next() {
        check_study(study, &mut report);
    }
    report
}

/// Check the frame of reference and the references of every RT instance.
pub fn check_study(study: &Study, report: &mut CheckReport) {
    if !study.single_frame_of_reference() {
        report.push(Defect::MultipleFramesOfReference {
            study: study.uid.clone(),
        });
    }

    for instance in study.instances() {
        let uid = || instance.uid.clone();
        match &instance.kind {
            InstanceKind::Plan(plan) => {
                if plan.structure_set(study).is_none() {
                    report.push(Defect::PlanMissingStructureSet { instance: uid() });
                }
            }
            InstanceKind::StructureSet(ss) => {
                if ss.ct(study).is_none() {
                    report.push(Defect::StructureSetMissingCt { instance: uid() });
                }
            }
            InstanceKind::Dose(dose) => {
                if dose.rtplan(study).is_none() {
                    report.push(Defect::DoseMissingPlan { instance: uid() });
                }
                if dose.structure_set(study).is_none() {
                    report.push(Defect::DoseMissingStructureSet { instance: uid() });
                }
            }
            InstanceKind::Other => {}
        }
    }
}
