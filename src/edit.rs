//! Patching operations on the files of a loaded patient folder.
//!
//! Every write replaces the whole file: the dataset is serialized next to the
//! target and renamed over it, so a failed write leaves the old file intact.
//! The in-memory tree is not updated after a rewrite.

use std::fs;
use std::path::{Path, PathBuf};

use dicom_core::value::PrimitiveValue;
use dicom_core::{DataElement, Tag, VR};
use dicom_dictionary_std::tags;
use dicom_object::meta::FileMetaTableBuilder;
use dicom_object::{DefaultDicomObject, InMemDicomObject};
use rayon::prelude::*;
use serde::Serialize;

use crate::cache::{DatasetCache, open_dataset};
use crate::error::{Error, Result};
use crate::header::{rt_tags, text, update_nested_item};
use crate::loader::folder_files;
use crate::model::{Modality, Patient, Series, Study};
use crate::uid::UidRemapper;

/// Patient positions a series can be converted between.
pub const PATIENT_POSITIONS: [&str; 4] = ["HFS", "FFS", "HFP", "FFP"];

/// Longest SeriesDescription (VR LO).
pub const MAX_DESCRIPTION_LEN: usize = 64;

const RT_PLAN_DESCRIPTION: Tag = Tag(0x300A, 0x0004);

/// Sequence items holding the referenced study of a structure set or dose.
const RTSTRUCT_STUDY_REFERENCE: &[Tag] = &[
    rt_tags::REFERENCED_FRAME_OF_REFERENCE_SEQUENCE,
    rt_tags::RT_REFERENCED_STUDY_SEQUENCE,
];
const RTDOSE_STUDY_REFERENCE: &[Tag] = &[rt_tags::REFERENCED_STUDY_SEQUENCE];

/// Write `obj` to `path`, replacing any existing file.
///
/// The temporary file is a dotfile in the same folder, which the loader skips
/// if it is ever left behind.
pub fn write_dataset(obj: &DefaultDicomObject, path: &Path) -> Result<()> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    let tmp = tempfile::Builder::new()
        .prefix(".")
        .suffix(".tmp")
        .tempfile_in(dir)?;
    obj.write_to_file(tmp.path()).map_err(|source| Error::Write {
        path: path.to_path_buf(),
        source,
    })?;
    tmp.persist(path).map_err(|e| e.error)?;
    tracing::debug!(path = %path.display(), "wrote dataset");
    Ok(())
}

fn put_text(obj: &mut InMemDicomObject, tag: Tag, vr: VR, value: &str) {
    obj.put(DataElement::new(tag, vr, PrimitiveValue::from(value)));
}

#[derive(Debug, Clone)]
pub struct AnonymizeOptions {
    pub remove: Vec<Tag>,
    pub clear: Vec<Tag>,
    pub birth_date: String,
    pub parallel: bool,
}

impl Default for AnonymizeOptions {
    fn default() -> Self {
        Self {
            remove: vec![
                rt_tags::OTHER_PATIENT_IDS,
                rt_tags::OTHER_PATIENT_IDS_SEQUENCE,
                rt_tags::OTHER_PATIENT_NAMES,
            ],
            clear: Vec::new(),
            birth_date: "19500101".to_string(),
            parallel: false,
        }
    }
}

/// Anonymize every file of a folder in place. Returns the number of files written.
pub fn anonymize_folder<P: AsRef<Path>>(folder: P, options: &AnonymizeOptions) -> Result<usize> {
    let files = folder_files(folder.as_ref())?;
    if options.parallel {
        files
            .par_iter()
            .map(|file| anonymize_file(file, options))
            .collect::<Result<Vec<_>>>()?;
    } else {
        for file in &files {
            anonymize_file(file, options)?;
        }
    }
    tracing::info!(files = files.len(), "anonymized folder");
    Ok(files.len())
}

pub fn anonymize_file(path: &Path, options: &AnonymizeOptions) -> Result<()> {
    let mut obj = open_dataset(path)?;
    anonymize_obj(&mut obj, options);
    write_dataset(&obj, path)
}

/// Remove and blank the configured tags; absent tags are skipped.
pub fn anonymize_obj(obj: &mut InMemDicomObject, options: &AnonymizeOptions) {
    for &tag in &options.remove {
        if obj.remove_element(tag) {
            tracing::debug!(%tag, "removed");
        }
    }
    for &tag in &options.clear {
        if let Some(vr) = obj.element_opt(tag).ok().flatten().map(|e| e.vr()) {
            obj.put(DataElement::new(tag, vr, PrimitiveValue::Empty));
        }
    }
    put_text(obj, tags::PATIENT_BIRTH_DATE, VR::DA, &options.birth_date);
}

#[derive(Debug, Clone, Serialize)]
pub struct FileChange {
    pub file: PathBuf,
    pub changes: Vec<&'static str>,
}

/// Move series of one study into another by rewriting their study UIDs.
///
/// Structure sets and doses carry the study UID again in their reference
/// sequences; those are rewritten too when they name the source study.
pub fn merge_study(
    patient: &Patient,
    source: &Study,
    target: &Study,
    series_uids: &[String],
    cache: &mut DatasetCache,
) -> Result<Vec<FileChange>> {
    if source.uid == target.uid {
        return Err(Error::SameStudy(source.uid.clone()));
    }
    let old = source.uid.as_str();
    let new = target.uid.as_str();
    tracing::info!(patient = %patient.patient_id, from = old, into = new, "merging study");

    let mut report = Vec::new();
    for series_uid in series_uids {
        let series = source.series_by_uid(series_uid).ok_or_else(|| Error::NotFound {
            kind: "series",
            key: series_uid.clone(),
        })?;
        for instance in series.instances() {
            let obj = cache.get_mut(instance)?;
            let mut changes = Vec::new();
            if text(obj, tags::STUDY_INSTANCE_UID).as_deref() == Some(old) {
                put_text(obj, tags::STUDY_INSTANCE_UID, VR::UI, new);
                changes.push("StudyInstanceUID changed");
            }
            let reference = match series.modality {
                Modality::RtStruct => Some((
                    RTSTRUCT_STUDY_REFERENCE,
                    "RTSTRUCT Referenced Study UID changed",
                )),
                Modality::RtDose => Some((RTDOSE_STUDY_REFERENCE, "RTDOSE Referenced Study UID changed")),
                _ => None,
            };
            if let Some((path, message)) = reference {
                let mut rewritten = false;
                update_nested_item(obj, path, &mut |item| {
                    if text(item, rt_tags::REFERENCED_SOP_INSTANCE_UID).as_deref() == Some(old) {
                        put_text(item, rt_tags::REFERENCED_SOP_INSTANCE_UID, VR::UI, new);
                        rewritten = true;
                    }
                });
                if rewritten {
                    changes.push(message);
                }
            }
            write_dataset(obj, instance.file())?;
            report.push(FileChange {
                file: instance.file.clone(),
                changes,
            });
        }
    }
    Ok(report)
}

#[derive(Debug, Clone, Serialize)]
pub struct PositionChange {
    pub original_dir: PathBuf,
    pub output_dir: PathBuf,
    pub files: usize,
}

/// Write copies of a series with a different patient position and fresh UIDs.
///
/// The untouched files are saved to `<dest>/<series uid>-orig`; the converted ones
/// to `<dest>/<new series uid>-<old>to<new>`. Study, series and instance UIDs are
/// renumbered through `uids`, so the converted files form one new series.
pub fn change_patient_position(
    series: &Series,
    position: &str,
    dest: &Path,
    uids: &mut UidRemapper,
    cache: &mut DatasetCache,
) -> Result<PositionChange> {
    let position = position.trim().to_uppercase();
    if !PATIENT_POSITIONS.contains(&position.as_str()) {
        return Err(Error::InvalidPatientPosition(position));
    }
    if series.patient_position.as_deref() == Some(position.as_str()) {
        return Err(Error::UnchangedPatientPosition(position));
    }

    let original_dir = dest.join(format!("{}-orig", series.uid));
    fs::create_dir_all(&original_dir)?;
    let mut output_dir = None;

    for instance in series.instances() {
        let obj = cache.get(instance)?;
        write_dataset(obj, &original_dir.join(format!("{}.dcm", instance.uid)))?;

        let old_position = text(obj, tags::PATIENT_POSITION)
            .or_else(|| series.patient_position.clone())
            .unwrap_or_default();
        let mut dataset: InMemDicomObject = (**obj).clone();
        put_text(&mut dataset, tags::PATIENT_POSITION, VR::CS, &position);
        put_text(
            &mut dataset,
            tags::SERIES_DESCRIPTION,
            VR::LO,
            &format!("{old_position} -> {position}"),
        );
        for tag in [tags::SOP_INSTANCE_UID, tags::SERIES_INSTANCE_UID, tags::STUDY_INSTANCE_UID] {
            if let Some(current) = text(&dataset, tag) {
                let renumbered = uids.remap(&current)?;
                put_text(&mut dataset, tag, VR::UI, &renumbered);
            }
        }

        let sop_instance_uid = text(&dataset, tags::SOP_INSTANCE_UID).unwrap_or_default();
        let series_uid = text(&dataset, tags::SERIES_INSTANCE_UID).unwrap_or_default();
        let converted = dataset
            .with_meta(
                FileMetaTableBuilder::new()
                    .transfer_syntax(obj.meta().transfer_syntax.trim_end_matches('\0'))
                    .media_storage_sop_class_uid(obj.meta().media_storage_sop_class_uid.trim_end_matches('\0'))
                    .media_storage_sop_instance_uid(sop_instance_uid.as_str()),
            )
            .map_err(|e| Error::Meta(e.to_string()))?;

        let dir = dest.join(format!("{series_uid}-{old_position}to{position}"));
        fs::create_dir_all(&dir)?;
        write_dataset(&converted, &dir.join(format!("{sop_instance_uid}.dcm")))?;
        output_dir.get_or_insert(dir);
    }

    let output_dir = output_dir.ok_or_else(|| Error::NotFound {
        kind: "instance in series",
        key: series.uid.clone(),
    })?;
    tracing::info!(
        series = %series.uid,
        %position,
        output = %output_dir.display(),
        "changed patient position"
    );
    Ok(PositionChange {
        original_dir,
        output_dir,
        files: series.instances.len(),
    })
}

/// Cut every SeriesDescription of a series to `max_len` characters, in place.
/// Returns the number of files that needed it.
pub fn truncate_series_description(
    series: &Series,
    max_len: usize,
    cache: &mut DatasetCache,
) -> Result<usize> {
    let mut changed = 0;
    for instance in series.instances() {
        let obj = cache.get_mut(instance)?;
        let Some(description) = text(obj, tags::SERIES_DESCRIPTION) else {
            continue;
        };
        if description.chars().count() <= max_len {
            continue;
        }
        let truncated: String = description.chars().take(max_len).collect();
        tracing::debug!(
            file = %instance.file.display(),
            length = description.chars().count(),
            "truncating SeriesDescription"
        );
        put_text(obj, tags::SERIES_DESCRIPTION, VR::LO, &truncated);
        write_dataset(obj, instance.file())?;
        changed += 1;
    }
    Ok(changed)
}

/// Values filled into empty patient attributes by [reset_upi].
#[derive(Debug, Clone)]
pub struct UpiDefaults {
    pub sex: String,
    pub birth_date: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct UpiChange {
    pub series_uid: String,
    pub modality: String,
    pub old_description: Option<String>,
    pub new_description: Option<String>,
    pub filled_sex: bool,
    pub filled_birth_date: bool,
}

/// The UPI of a series description such as `XX 12345`, i.e. all but the first
/// three characters. `None` when the description already has the `U=` form.
pub fn upi_of(description: &str) -> Option<String> {
    if description.is_empty() || description.contains('=') {
        return None;
    }
    Some(description.chars().skip(3).collect())
}

/// Rewrite the first instance of every RTPLAN and RTDOSE series so that its
/// description reads `U=<upi>` and its patient sex and birth date are set.
pub fn reset_upi(study: &Study, defaults: &UpiDefaults, cache: &mut DatasetCache) -> Result<Vec<UpiChange>> {
    let mut report = Vec::new();
    for series in study.series() {
        if !matches!(series.modality, Modality::RtPlan | Modality::RtDose) {
            continue;
        }
        let Some(instance) = series.first_instance() else {
            continue;
        };
        let obj = cache.get_mut(instance)?;
        tracing::debug!(
            instance = %instance.uid,
            study_description = %text(obj, tags::STUDY_DESCRIPTION).unwrap_or_default(),
            plan_description = %text(obj, RT_PLAN_DESCRIPTION).unwrap_or_default(),
            "resetting UPI"
        );

        let filled_sex = text(obj, tags::PATIENT_SEX).is_none();
        if filled_sex {
            put_text(obj, tags::PATIENT_SEX, VR::CS, &defaults.sex);
        }
        let filled_birth_date = text(obj, tags::PATIENT_BIRTH_DATE).is_none();
        if filled_birth_date {
            put_text(obj, tags::PATIENT_BIRTH_DATE, VR::DA, &defaults.birth_date);
        }

        let old_description = text(obj, tags::SERIES_DESCRIPTION);
        let new_description = old_description
            .as_deref()
            .and_then(upi_of)
            .map(|upi| format!("U={upi}"));
        if let Some(description) = &new_description {
            put_text(obj, tags::SERIES_DESCRIPTION, VR::LO, description);
        }
        write_dataset(obj, instance.file())?;
        report.push(UpiChange {
            series_uid: series.uid.clone(),
            modality: series.modality.to_string(),
            old_description,
            new_description,
            filled_sex,
            filled_birth_date,
        });
    }
    Ok(report)
}
