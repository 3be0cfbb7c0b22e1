use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::path::Path;

use dicom_object::{DefaultDicomObject, open_file};

use crate::error::{Error, Result};
use crate::model::Instance;

/// Full datasets of instances, opened on first access.
///
/// Entries are never refreshed on their own. After writing a dataset back to
/// disk the cached copy is what was written, but anything derived from it at
/// load time (descriptions, positions in the [crate::model] tree) is stale.
#[derive(Default)]
pub struct DatasetCache {
    entries: HashMap<String, DefaultDicomObject>,
}

impl DatasetCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&mut self, instance: &Instance) -> Result<&DefaultDicomObject> {
        self.get_mut(instance).map(|obj| &*obj)
    }

    pub fn get_mut(&mut self, instance: &Instance) -> Result<&mut DefaultDicomObject> {
        match self.entries.entry(instance.uid.clone()) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => Ok(entry.insert(open_dataset(instance.file())?)),
        }
    }

    pub fn is_loaded(&self, uid: &str) -> bool {
        self.entries.contains_key(uid)
    }

    /// Forget one dataset so that the next access re-reads the file.
    pub fn invalidate(&mut self, uid: &str) -> Option<DefaultDicomObject> {
        self.entries.remove(uid)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Open a complete DICOM file, pixel data included.
pub fn open_dataset(path: &Path) -> Result<DefaultDicomObject> {
    tracing::debug!(path = %path.display(), "opening dataset");
    open_file(path).map_err(|source| Error::Read {
        path: path.to_path_buf(),
        source,
    })
}
