#![allow(dead_code)]

use std::path::{Path, PathBuf};

use dicom_core::value::{DataSetSequence, PrimitiveValue};
use dicom_core::{DataElement, Tag, VR};
use dicom_dictionary_std::tags;
use dicom_object::InMemDicomObject;
use dicom_object::meta::FileMetaTableBuilder;

pub const EXPLICIT_VR_LE: &str = "1.2.840.10008.1.2.1";

pub const PATIENT: &str = "P001";
pub const STUDY: &str = "1.2.826.1.1";
pub const FRAME: &str = "1.2.826.1.9";

pub const CT_SERIES: &str = "1.2.826.1.1.1";
pub const RTSTRUCT_SERIES: &str = "1.2.826.1.1.2";
pub const RTPLAN_SERIES: &str = "1.2.826.1.1.3";
pub const RTDOSE_SERIES: &str = "1.2.826.1.1.4";

pub const STRUCTURE_SET: &str = "1.2.826.1.1.2.1";
pub const PLAN: &str = "1.2.826.1.1.3.1";
pub const DOSE: &str = "1.2.826.1.1.4.1";

const REFERENCED_SOP_INSTANCE_UID: Tag = Tag(0x0008, 0x1155);

/// One DICOM file under construction.
pub struct DicomFile {
    obj: InMemDicomObject,
    sop_class: &'static str,
    sop_instance: String,
}

impl DicomFile {
    pub fn new(modality: &str, study: &str, series: &str, sop_instance: &str) -> Self {
        let sop_class = match modality {
            "RTSTRUCT" => "1.2.840.10008.5.1.4.1.1.481.3",
            "RTPLAN" => "1.2.840.10008.5.1.4.1.1.481.5",
            "RTDOSE" => "1.2.840.10008.5.1.4.1.1.481.2",
            _ => "1.2.840.10008.5.1.4.1.1.2",
        };
        let file = DicomFile {
            obj: InMemDicomObject::new_empty(),
            sop_class,
            sop_instance: sop_instance.to_string(),
        };
        file.with(tags::SOP_CLASS_UID, VR::UI, sop_class)
            .with(tags::SOP_INSTANCE_UID, VR::UI, sop_instance)
            .with(tags::STUDY_DATE, VR::DA, "20240102")
            .with(tags::STUDY_TIME, VR::TM, "093000")
            .with(tags::MODALITY, VR::CS, modality)
            .with(tags::SERIES_DESCRIPTION, VR::LO, "PT 1234567")
            .with(tags::PATIENT_NAME, VR::PN, "Doe^John")
            .with(tags::PATIENT_ID, VR::LO, PATIENT)
            .with(tags::PATIENT_BIRTH_DATE, VR::DA, "19790401")
            .with(tags::PATIENT_SEX, VR::CS, "M")
            .with(tags::STUDY_INSTANCE_UID, VR::UI, study)
            .with(tags::SERIES_INSTANCE_UID, VR::UI, series)
    }

    pub fn with(mut self, tag: Tag, vr: VR, value: &str) -> Self {
        self.obj.put(DataElement::new(tag, vr, PrimitiveValue::from(value)));
        self
    }

    pub fn with_sequence(mut self, tag: Tag, item: InMemDicomObject) -> Self {
        self.obj
            .put(DataElement::new(tag, VR::SQ, DataSetSequence::from(vec![item])));
        self
    }

    pub fn without(mut self, tag: Tag) -> Self {
        self.obj.remove_element(tag);
        self
    }

    pub fn write(self, dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        self.obj
            .with_meta(
                FileMetaTableBuilder::new()
                    .transfer_syntax(EXPLICIT_VR_LE)
                    .media_storage_sop_class_uid(self.sop_class)
                    .media_storage_sop_instance_uid(self.sop_instance.as_str()),
            )
            .unwrap()
            .write_to_file(&path)
            .unwrap();
        path
    }
}

/// A sequence item holding one referenced SOP instance.
pub fn reference(uid: &str) -> InMemDicomObject {
    InMemDicomObject::from_element_iter([DataElement::new(
        REFERENCED_SOP_INSTANCE_UID,
        VR::UI,
        PrimitiveValue::from(uid),
    )])
}

pub fn ct(number: u32) -> DicomFile {
    let uid = format!("{CT_SERIES}.{number}");
    DicomFile::new("CT", STUDY, CT_SERIES, &uid)
        .with(tags::FRAME_OF_REFERENCE_UID, VR::UI, FRAME)
        .with(tags::PATIENT_POSITION, VR::CS, "HFS")
}

/// A structure set of `study` drawn on `ct_series`.
pub fn rtstruct(study: &str, ct_series: &str) -> DicomFile {
    let series = InMemDicomObject::from_element_iter([DataElement::new(
        tags::SERIES_INSTANCE_UID,
        VR::UI,
        PrimitiveValue::from(ct_series),
    )]);
    let mut referenced_study = reference(study);
    referenced_study.put(DataElement::new(
        Tag(0x3006, 0x0014),
        VR::SQ,
        DataSetSequence::from(vec![series]),
    ));
    let frame = InMemDicomObject::from_element_iter([
        DataElement::new(tags::FRAME_OF_REFERENCE_UID, VR::UI, PrimitiveValue::from(FRAME)),
        DataElement::new(
            Tag(0x3006, 0x0012),
            VR::SQ,
            DataSetSequence::from(vec![referenced_study]),
        ),
    ]);
    DicomFile::new("RTSTRUCT", study, RTSTRUCT_SERIES, STRUCTURE_SET)
        .with_sequence(Tag(0x3006, 0x0010), frame)
}

pub fn rtplan(structure_set: &str) -> DicomFile {
    DicomFile::new("RTPLAN", STUDY, RTPLAN_SERIES, PLAN)
        .with(tags::FRAME_OF_REFERENCE_UID, VR::UI, FRAME)
        .with(Tag(0x300A, 0x0004), VR::ST, "Prostate")
        .with_sequence(Tag(0x300C, 0x0060), reference(structure_set))
}

pub fn rtdose(study: &str, plan: &str, structure_set: &str) -> DicomFile {
    let mut referenced_study = reference(study);
    referenced_study.put(DataElement::new(
        tags::REFERENCED_SOP_CLASS_UID,
        VR::UI,
        PrimitiveValue::from("1.2.840.10008.3.1.2.3.1"),
    ));
    DicomFile::new("RTDOSE", study, RTDOSE_SERIES, DOSE)
        .with(tags::FRAME_OF_REFERENCE_UID, VR::UI, FRAME)
        .with_sequence(Tag(0x300C, 0x0002), reference(plan))
        .with_sequence(Tag(0x300C, 0x0060), reference(structure_set))
        .with_sequence(Tag(0x0008, 0x1110), referenced_study)
}

/// Two CT slices, a structure set on them, a plan and its dose: a consistent folder.
pub fn planned_folder(dir: &Path) {
    ct(1).write(dir, "CT1.dcm");
    ct(2).write(dir, "CT2.dcm");
    rtstruct(STUDY, CT_SERIES).write(dir, "RS.dcm");
    rtplan(STRUCTURE_SET).write(dir, "RP.dcm");
    rtdose(STUDY, PLAN, STRUCTURE_SET).write(dir, "RD.dcm");
}
