//! Inspect, check and patch DICOM radiotherapy datasets stored one file per
//! instance, one folder per patient.

pub mod cache;
pub mod check;
pub mod dump;
pub mod edit;
pub mod error;
pub mod header;
pub mod loader;
pub mod model;
pub mod references;
pub mod select;
pub mod uid;

pub use cache::DatasetCache;
pub use check::{CheckReport, Defect, check_patient};
pub use dump::DumpTree;
pub use error::{Error, Result};
pub use loader::{Loader, list_patient_folders, load_folder};
pub use model::{Dose, Instance, InstanceKind, Modality, Patient, Plan, Series, Study, StructureSet};
pub use uid::{UidGenerator, UidRemapper};
