//! Radiotherapy cross references, resolved within the owning study.
//!
//! A dose is computed for a plan on a structure set, and a structure set is
//! drawn on a CT series. These objects only name each other by UID, so every
//! relation below is a lookup in the study the referring instance belongs to.
//! An unresolved relation is `None`.

use dicom_dictionary_std::tags;
use dicom_object::InMemDicomObject;

use crate::header::{nested_text, rt_tags};
use crate::model::{Dose, Instance, InstanceKind, Modality, Plan, Series, Study, StructureSet};

const STRUCTURE_SET_CT_SERIES: [dicom_core::Tag; 3] = [
    rt_tags::REFERENCED_FRAME_OF_REFERENCE_SEQUENCE,
    rt_tags::RT_REFERENCED_STUDY_SEQUENCE,
    rt_tags::RT_REFERENCED_SERIES_SEQUENCE,
];

impl InstanceKind {
    /// Read the references of an instance of the given modality.
    pub fn from_header(modality: &Modality, obj: &InMemDicomObject) -> Self {
        match modality {
            Modality::RtPlan => InstanceKind::Plan(Plan {
                structure_set_uid: nested_text(
                    obj,
                    &[rt_tags::REFERENCED_STRUCTURE_SET_SEQUENCE],
                    rt_tags::REFERENCED_SOP_INSTANCE_UID,
                ),
            }),
            Modality::RtStruct => InstanceKind::StructureSet(StructureSet {
                referenced_frame_of_reference_uid: nested_text(
                    obj,
                    &STRUCTURE_SET_CT_SERIES[..1],
                    tags::FRAME_OF_REFERENCE_UID,
                ),
                ct_series_uid: nested_text(obj, &STRUCTURE_SET_CT_SERIES, tags::SERIES_INSTANCE_UID),
            }),
            Modality::RtDose => InstanceKind::Dose(Dose {
                plan_uid: nested_text(
                    obj,
                    &[rt_tags::REFERENCED_RT_PLAN_SEQUENCE],
                    rt_tags::REFERENCED_SOP_INSTANCE_UID,
                ),
                structure_set_uid: nested_text(
                    obj,
                    &[rt_tags::REFERENCED_STRUCTURE_SET_SEQUENCE],
                    rt_tags::REFERENCED_SOP_INSTANCE_UID,
                ),
            }),
            _ => InstanceKind::Other,
        }
    }
}

impl Plan {
    pub fn structure_set<'s>(&self, study: &'s Study) -> Option<&'s Instance> {
        study.instance_by_uid(self.structure_set_uid.as_deref()?)
    }
}

impl StructureSet {
    /// CT series the contours were drawn on.
    pub fn ct<'s>(&self, study: &'s Study) -> Option<&'s Series> {
        study.series_by_uid(self.ct_series_uid.as_deref()?)
    }

    /// FrameOfReferenceUID of the first referenced frame of reference.
    pub fn frame_of_reference(&self) -> Option<&str> {
        self.referenced_frame_of_reference_uid.as_deref()
    }
}

impl Dose {
    pub fn rtplan<'s>(&self, study: &'s Study) -> Option<&'s Instance> {
        study.instance_by_uid(self.plan_uid.as_deref()?)
    }

    pub fn structure_set<'s>(&self, study: &'s Study) -> Option<&'s Instance> {
        study.instance_by_uid(self.structure_set_uid.as_deref()?)
    }
}
