use std::path::PathBuf;


#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("failed to read DICOM file {path:?}")]
    Read {
        path: PathBuf,
        #[source]
        source: dicom_object::ReadError,
    },

    #[error("failed to write DICOM file {path:?}")]
    Write {
        path: PathBuf,
        #[source]
        source: dicom_object::WriteError,
    },

    #[error("could not build file meta group: {0}")]
    Meta(String),

    #[error("{path:?} does not have the required tag {tag}")]
    MissingTag { path: PathBuf, tag: &'static str },

    #[error("multiple patients in one folder: {first} and {other} (in {path:?})")]
    MultiplePatients {
        first: String,
        other: String,
        path: PathBuf,
    },

    #[error("no {kind} matches \"{key}\"")]
    NotFound { kind: &'static str, key: String },

    #[error("invalid patient position \"{0}\", expected one of HFS, FFS, HFP, FFP")]
    InvalidPatientPosition(String),

    #[error("patient position is already {0}")]
    UnchangedPatientPosition(String),

    #[error("invalid UID \"{0}\"")]
    InvalidUid(String),

    #[error("cannot merge study {0} into itself")]
    SameStudy(String),
}

pub type Result<T> = std::result::Result<T, Error>;
