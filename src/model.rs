//! Patient → Study → Series → Instance hierarchy of one patient folder.
//!
//! Every level owns its children in a [UidMap], which keeps discovery order and
//! refuses duplicates: adding a child whose UID is already known hands back the
//! existing child. Children point back to their parent by UID only.

use std::collections::HashMap;
use std::fmt::{self, Display};
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde::Serialize;

/// Something identified by a UID within its parent.
pub trait Keyed {
    fn uid(&self) -> &str;
}

/// Insertion-ordered map from UID to child entity.
#[derive(Debug, Clone, Serialize)]
#[serde(transparent)]
pub struct UidMap<T> {
    items: Vec<T>,
    #[serde(skip)]
    index: HashMap<String, usize>,
}

impl<T> Default for UidMap<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            index: HashMap::new(),
        }
    }
}

impl<T: Keyed> UidMap<T> {
    /// Insert `item` unless its UID is present. Either way, returns the entry stored
    /// under that UID.
    pub fn insert_or_get(&mut self, item: T) -> &mut T {
        let position = match self.index.get(item.uid()) {
            Some(&position) => position,
            None => {
                let position = self.items.len();
                self.index.insert(item.uid().to_string(), position);
                self.items.push(item);
                position
            }
        };
        &mut self.items[position]
    }

    pub fn get(&self, uid: &str) -> Option<&T> {
        self.index.get(uid).map(|&i| &self.items[i])
    }

    pub fn contains(&self, uid: &str) -> bool {
        self.index.contains_key(uid)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Entries in insertion order.
    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.items.iter()
    }

    pub fn as_slice(&self) -> &[T] {
        &self.items
    }
}

impl<'a, T> IntoIterator for &'a UidMap<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Sex {
    Male,
    Female,
    Other,
    Unknown,
}

impl Sex {
    pub fn from_code(code: &str) -> Self {
        match code.trim() {
            "M" => Sex::Male,
            "F" => Sex::Female,
            "O" => Sex::Other,
            _ => Sex::Unknown,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Sex::Male => "M",
            Sex::Female => "F",
            Sex::Other => "O",
            Sex::Unknown => "",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub enum Modality {
    Ct,
    Mr,
    Pt,
    RtPlan,
    RtStruct,
    RtDose,
    RtImage,
    Reg,
    Other(String),
}

impl Modality {
    pub fn from_code(code: &str) -> Self {
        match code.trim() {
            "CT" => Modality::Ct,
            "MR" => Modality::Mr,
            "PT" => Modality::Pt,
            "RTPLAN" => Modality::RtPlan,
            "RTSTRUCT" => Modality::RtStruct,
            "RTDOSE" => Modality::RtDose,
            "RTIMAGE" => Modality::RtImage,
            "REG" => Modality::Reg,
            other => Modality::Other(other.to_string()),
        }
    }

    pub fn code(&self) -> &str {
        match self {
            Modality::Ct => "CT",
            Modality::Mr => "MR",
            Modality::Pt => "PT",
            Modality::RtPlan => "RTPLAN",
            Modality::RtStruct => "RTSTRUCT",
            Modality::RtDose => "RTDOSE",
            Modality::RtImage => "RTIMAGE",
            Modality::Reg => "REG",
            Modality::Other(code) => code,
        }
    }
}

impl Display for Modality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Patient {
    pub patient_id: String,
    pub name: String,
    /// PatientBirthDate as stored.
    pub birth_date_raw: String,
    pub birth_date: Option<NaiveDate>,
    pub sex: Sex,
    pub studies: UidMap<Study>,
}

impl Patient {
    pub fn new(patient_id: String, name: String, birth_date_raw: String, sex: Sex) -> Self {
        let birth_date = NaiveDate::parse_from_str(&birth_date_raw, "%Y%m%d").ok();
        Self {
            patient_id,
            name,
            birth_date_raw,
            birth_date,
            sex,
            studies: UidMap::default(),
        }
    }

    pub fn add_study(&mut self, study: Study) -> &mut Study {
        self.studies.insert_or_get(study)
    }

    pub fn studies(&self) -> std::slice::Iter<'_, Study> {
        self.studies.iter()
    }

    pub fn study_by_uid(&self, uid: &str) -> Option<&Study> {
        self.studies.get(uid)
    }

    pub fn series_count(&self) -> usize {
        self.studies().map(|s| s.series.len()).sum()
    }

    pub fn instance_count(&self) -> usize {
        self.studies().map(Study::instance_count).sum()
    }
}

impl Display for Patient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Patient({}, {}, {}, {})",
            self.patient_id,
            self.name,
            self.birth_date_raw,
            self.sex.code()
        )
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Study {
    pub uid: String,
    pub description: String,
    pub date: String,
    pub time: String,
    pub patient_id: String,
    pub series: UidMap<Series>,
}

impl Keyed for Study {
    fn uid(&self) -> &str {
        &self.uid
    }
}

impl Study {
    pub fn new(uid: String, description: String, date: String, time: String, patient_id: String) -> Self {
        Self {
            uid,
            description,
            date,
            time,
            patient_id,
            series: UidMap::default(),
        }
    }

    pub fn add_series(&mut self, series: Series) -> &mut Series {
        self.series.insert_or_get(series)
    }

    pub fn series(&self) -> std::slice::Iter<'_, Series> {
        self.series.iter()
    }

    pub fn series_by_uid(&self, uid: &str) -> Option<&Series> {
        self.series.get(uid)
    }

    /// Search every series of the study for an instance.
    pub fn instance_by_uid(&self, uid: &str) -> Option<&Instance> {
        self.series().find_map(|s| s.instances.get(uid))
    }

    pub fn instances(&self) -> impl Iterator<Item = &Instance> {
        self.series().flat_map(|s| s.instances())
    }

    pub fn instance_count(&self) -> usize {
        self.series().map(|s| s.instances.len()).sum()
    }

    /// True when all instances agree on their frame of reference.
    pub fn single_frame_of_reference(&self) -> bool {
        let mut frames = self.instances().map(Instance::frame_of_reference);
        match frames.next() {
            None => true,
            Some(first) => frames.all(|f| f == first),
        }
    }
}

impl Display for Study {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Study({}, {}, {} {})", self.uid, self.description, self.date, self.time)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Series {
    pub uid: String,
    pub description: String,
    pub date: String,
    pub time: String,
    pub modality: Modality,
    pub patient_position: Option<String>,
    pub study_uid: String,
    pub instances: UidMap<Instance>,
}

impl Keyed for Series {
    fn uid(&self) -> &str {
        &self.uid
    }
}

impl Series {
    pub fn add_instance(&mut self, instance: Instance) -> &mut Instance {
        self.instances.insert_or_get(instance)
    }

    pub fn instances(&self) -> std::slice::Iter<'_, Instance> {
        self.instances.iter()
    }

    pub fn first_instance(&self) -> Option<&Instance> {
        self.instances.as_slice().first()
    }
}

impl Display for Series {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Series({}, {}, {}, {}, {} {})",
            self.modality,
            self.uid,
            self.description,
            self.patient_position.as_deref().unwrap_or(""),
            self.date,
            self.time
        )
    }
}

/// Modality-specific part of an instance: the UIDs it refers to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum InstanceKind {
    Plan(Plan),
    StructureSet(StructureSet),
    Dose(Dose),
    Other,
}

/// RTPLAN references.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Plan {
    pub structure_set_uid: Option<String>,
}

/// RTSTRUCT references.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StructureSet {
    pub referenced_frame_of_reference_uid: Option<String>,
    pub ct_series_uid: Option<String>,
}

/// RTDOSE references.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Dose {
    pub plan_uid: Option<String>,
    pub structure_set_uid: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Instance {
    pub uid: String,
    pub file: PathBuf,
    pub series_uid: String,
    /// The instance's own FrameOfReferenceUID.
    pub frame_of_reference_uid: Option<String>,
    pub kind: InstanceKind,
}

impl Keyed for Instance {
    fn uid(&self) -> &str {
        &self.uid
    }
}

impl Instance {
    pub fn file(&self) -> &Path {
        &self.file
    }

    /// Frame of reference the instance lives in. A structure set reports the frame
    /// its contours were drawn on.
    pub fn frame_of_reference(&self) -> Option<&str> {
        match &self.kind {
            InstanceKind::StructureSet(ss) => ss.frame_of_reference(),
            _ => self.frame_of_reference_uid.as_deref(),
        }
    }

    pub fn as_plan(&self) -> Option<&Plan> {
        match &self.kind {
            InstanceKind::Plan(plan) => Some(plan),
            _ => None,
        }
    }

    pub fn as_structure_set(&self) -> Option<&StructureSet> {
        match &self.kind {
            InstanceKind::StructureSet(ss) => Some(ss),
            _ => None,
        }
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub fn study(uid: &str) -> Study {
        Study::new(uid.into(), String::new(), "20240101".into(), "120000".into(), "P001".into())
    }

    pub fn series(uid: &str, modality: Modality) -> Series {
        Series {
            uid: uid.into(),
            description: String::new(),
            date: String::new(),
            time: String::new(),
            modality,
            patient_position: None,
            study_uid: "1.1".into(),
            instances: UidMap::default(),
        }
    }

    pub fn instance(uid: &str, frame: Option<&str>, kind: InstanceKind) -> Instance {
        Instance {
            uid: uid.into(),
            file: PathBuf::from(format!("{uid}.dcm")),
            series_uid: String::new(),
            frame_of_reference_uid: frame.map(String::from),
            kind,
        }
    }
}
