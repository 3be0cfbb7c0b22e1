use std::path::{Path, PathBuf};

use dicom_dictionary_std::tags;
use dicom_object::{DefaultDicomObject, OpenFileOptions};
use indicatif::ProgressBar;
use walkdir::WalkDir;

use crate::error::{Error, Result};
use crate::header::{required, text, text_or_empty};
use crate::model::{Instance, InstanceKind, Modality, Patient, Series, Sex, Study};

/// Service folders of a Conquest data directory that do not hold patients.
pub const IGNORE_DIRS: [&str; 3] = ["dbase", "incoming", "printer_files"];

/// Builds the hierarchy of one patient folder.
#[derive(Default)]
pub struct Loader {
    progress: Option<ProgressBar>,
}

impl Loader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance `progress` once per file read.
    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Read every file directly inside `folder` into one [Patient].
    ///
    /// Fails on the first file that is not DICOM, lacks an identifying tag or
    /// belongs to a different patient than the files before it.
    pub fn load_folder<P: AsRef<Path>>(&self, folder: P) -> Result<Patient> {
        let files = folder_files(folder.as_ref())?;
        if let Some(pb) = &self.progress {
            pb.set_length(files.len() as u64);
        }

        let mut patient: Option<Patient> = None;
        for path in files {
            let obj = read_header(&path)?;
            let patient_id = required(&obj, tags::PATIENT_ID, &path)?;
            if let Some(first) = &patient {
                if first.patient_id != patient_id {
                    return Err(Error::MultiplePatients {
                        first: first.patient_id.clone(),
                        other: patient_id,
                        path,
                    });
                }
            }
            let patient = patient.get_or_insert_with(|| {
                Patient::new(
                    patient_id,
                    text_or_empty(&obj, tags::PATIENT_NAME),
                    text_or_empty(&obj, tags::PATIENT_BIRTH_DATE),
                    Sex::from_code(&text_or_empty(&obj, tags::PATIENT_SEX)),
                )
            });
            add_file(patient, &obj, path)?;
            if let Some(pb) = &self.progress {
                pb.inc(1);
            }
        }

        let patient = patient.ok_or_else(|| Error::NotFound {
            kind: "DICOM file",
            key: folder.as_ref().display().to_string(),
        })?;
        tracing::info!(
            patient = %patient.patient_id,
            studies = patient.studies.len(),
            series = patient.series_count(),
            instances = patient.instance_count(),
            "loaded folder"
        );
        Ok(patient)
    }
}

/// Load a patient folder without progress reporting.
pub fn load_folder<P: AsRef<Path>>(folder: P) -> Result<Patient> {
    Loader::new().load_folder(folder)
}

/// Patient folders in a Conquest data directory, by name.
pub fn list_patient_folders<P: AsRef<Path>>(data_dir: P) -> Result<Vec<PathBuf>> {
    let mut folders = Vec::new();
    for entry in WalkDir::new(data_dir).min_depth(1).max_depth(1).sort_by_file_name() {
        let entry = entry.map_err(std::io::Error::from)?;
        let ignored = entry
            .file_name()
            .to_str()
            .is_some_and(|name| IGNORE_DIRS.contains(&name));
        if entry.file_type().is_dir() && !ignored {
            folders.push(entry.into_path());
        }
    }
    Ok(folders)
}

/// Regular files directly inside `folder`, sorted by name.
///
/// Hidden files are skipped: an interrupted write leaves its temporary file
/// behind as a dotfile.
pub(crate) fn folder_files(folder: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(folder).min_depth(1).max_depth(1).sort_by_file_name() {
        let entry = entry.map_err(std::io::Error::from)?;
        if !entry.file_type().is_file() {
            continue;
        }
        if entry.file_name().to_string_lossy().starts_with('.') {
            tracing::debug!(path = %entry.path().display(), "skipping hidden file");
            continue;
        }
        files.push(entry.into_path());
    }
    Ok(files)
}

/// Open a file, stopping before the pixel data.
fn read_header(path: &Path) -> Result<DefaultDicomObject> {
    tracing::debug!(path = %path.display(), "reading header");
    OpenFileOptions::new()
        .read_until(tags::PIXEL_DATA)
        .open_file(path)
        .map_err(|source| Error::Read {
            path: path.to_path_buf(),
            source,
        })
}

/// Attach the study, series and instance of one file to `patient`.
fn add_file(patient: &mut Patient, obj: &DefaultDicomObject, path: PathBuf) -> Result<()> {
    let study_uid = required(obj, tags::STUDY_INSTANCE_UID, &path)?;
    let series_uid = required(obj, tags::SERIES_INSTANCE_UID, &path)?;
    let instance_uid = required(obj, tags::SOP_INSTANCE_UID, &path)?;
    let modality = Modality::from_code(&required(obj, tags::MODALITY, &path)?);

    let patient_id = patient.patient_id.clone();
    let study = patient.add_study(Study::new(
        study_uid.clone(),
        text_or_empty(obj, tags::STUDY_DESCRIPTION),
        text_or_empty(obj, tags::STUDY_DATE),
        text_or_empty(obj, tags::STUDY_TIME),
        patient_id,
    ));
    let series = study.add_series(Series {
        uid: series_uid.clone(),
        description: text_or_empty(obj, tags::SERIES_DESCRIPTION),
        date: text_or_empty(obj, tags::SERIES_DATE),
        time: text_or_empty(obj, tags::SERIES_TIME),
        modality: modality.clone(),
        patient_position: text(obj, tags::PATIENT_POSITION),
        study_uid,
        instances: Default::default(),
    });
    if series.modality != modality {
        tracing::warn!(
            series = %series.uid,
            expected = %series.modality,
            found = %modality,
            path = %path.display(),
            "instance modality differs from its series"
        );
    }
    series.add_instance(Instance {
        uid: instance_uid,
        kind: InstanceKind::from_header(&modality, obj),
        frame_of_reference_uid: text(obj, tags::FRAME_OF_REFERENCE_UID),
        series_uid,
        file: path,
    });
    Ok(())
}
