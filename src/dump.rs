//! Tag tree of a single DICOM file, as text.
//!
//! The tree has two top rows, `Metadata` (file meta group) and `Dataset`.
//! Every element row has six columns: structural role, tag, description, VR,
//! VM and value. Sequence items appear as `item` rows below their sequence.

use std::fmt::Write as _;
use std::path::Path;

use dicom_core::VR;
use dicom_core::header::Header;
use dicom_object::{DefaultDicomObject, FileMetaTable, InMemDicomObject};
use dicom_object::mem::InMemElement;
use serde::Serialize;

use crate::cache::open_dataset;
use crate::error::Result;
use crate::header::{name_of, tag_string};

/// Number of columns in a rendered row.
pub const COLUMNS: usize = 6;

/// Shortest query [DumpTree::search] looks for.
pub const MIN_QUERY_LEN: usize = 2;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DumpRow {
    /// 0 for the `Metadata` and `Dataset` rows.
    pub depth: usize,
    pub columns: [String; COLUMNS],
}

impl DumpRow {
    fn label(depth: usize, label: &str) -> Self {
        Self {
            depth,
            columns: [label.to_string(), String::new(), String::new(), String::new(), String::new(), String::new()],
        }
    }

    pub fn role(&self) -> &str {
        &self.columns[0]
    }

    pub fn tag(&self) -> &str {
        &self.columns[1]
    }

    pub fn value(&self) -> &str {
        &self.columns[5]
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct DumpTree {
    pub rows: Vec<DumpRow>,
}

impl DumpTree {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let obj = open_dataset(path.as_ref())?;
        Ok(Self::from_object(&obj))
    }

    pub fn from_object(obj: &DefaultDicomObject) -> Self {
        let mut tree = DumpTree::default();
        tree.rows.push(DumpRow::label(0, "Metadata"));
        tree.push_meta(obj.meta());
        tree.rows.push(DumpRow::label(0, "Dataset"));
        tree.push_dataset(obj, 1);
        tree
    }

    fn push_meta(&mut self, meta: &FileMetaTable) {
        let version = bytes_text(meta.information_version.len());
        let entries: [(u16, VR, Option<&str>); 8] = [
            (0x0000, VR::UL, None),
            (0x0001, VR::OB, Some(&version)),
            (0x0002, VR::UI, Some(&meta.media_storage_sop_class_uid)),
            (0x0003, VR::UI, Some(&meta.media_storage_sop_instance_uid)),
            (0x0010, VR::UI, Some(&meta.transfer_syntax)),
            (0x0012, VR::UI, Some(&meta.implementation_class_uid)),
            (0x0013, VR::SH, meta.implementation_version_name.as_deref()),
            (0x0016, VR::AE, meta.source_application_entity_title.as_deref()),
        ];
        let group_length = meta.information_group_length.to_string();
        for (element, vr, value) in entries {
            let value = match (element, value) {
                (0x0000, _) => group_length.as_str(),
                (_, Some(value)) => value,
                (_, None) => continue,
            };
            let tag = dicom_core::Tag(0x0002, element);
            self.rows.push(DumpRow {
                depth: 1,
                columns: [
                    "element".to_string(),
                    tag_string(tag),
                    name_of(tag).unwrap_or("").to_string(),
                    vr.to_string().to_string(),
                    "1".to_string(),
                    value.trim_end_matches(['\0', ' ']).to_string(),
                ],
            });
        }
    }

    fn push_dataset(&mut self, obj: &InMemDicomObject, depth: usize) {
        for element in obj.iter() {
            self.rows.push(element_row(element, depth));
            if let Some(items) = element.items() {
                for item in items {
                    self.rows.push(DumpRow::label(depth + 1, "item"));
                    self.push_dataset(item, depth + 2);
                }
            }
        }
    }

    /// Tab-indented text export, one line per row.
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        for row in &self.rows {
            let _ = writeln!(out, "{}{}", "\t".repeat(row.depth), row.columns.join("\t"));
        }
        out
    }

    /// Rows containing `query`, ignoring case, in tree order.
    ///
    /// Looks at the role, tag, description and VR columns, and at the value
    /// too with `include_value`.
    pub fn search(&self, query: &str, include_value: bool) -> Vec<&DumpRow> {
        if query.chars().count() < MIN_QUERY_LEN {
            return Vec::new();
        }
        let query = query.to_lowercase();
        self.rows
            .iter()
            .filter(|row| {
                let mut columns = row.columns[..4].iter();
                columns.any(|c| c.to_lowercase().contains(&query))
                    || (include_value && row.columns[5].to_lowercase().contains(&query))
            })
            .collect()
    }
}

fn element_row(element: &InMemElement, depth: usize) -> DumpRow {
    let tag = element.tag();
    let description = name_of(tag)
        .map(String::from)
        .unwrap_or_else(|| if tag.group() % 2 == 1 { "Private tag".into() } else { "Unknown".into() });
    let (role, value) = match element.items() {
        Some(items) => ("sequence", format!("Sequence of length {}", items.len())),
        None => ("element", value_text(element)),
    };
    DumpRow {
        depth,
        columns: [
            role.to_string(),
            tag_string(tag),
            description,
            element.vr().to_string().to_string(),
            element.value().multiplicity().to_string(),
            value,
        ],
    }
}

fn value_text(element: &InMemElement) -> String {
    match element.value().primitive() {
        Some(p) if is_binary(element.vr()) => bytes_text(p.to_bytes().len()),
        Some(p) => p.to_str().trim_end_matches(['\0', ' ']).to_string(),
        None => "Encapsulated pixel data".to_string(),
    }
}

fn bytes_text(len: usize) -> String {
    format!("{len} bytes")
}

fn is_binary(vr: VR) -> bool {
    matches!(vr, VR::OB | VR::OW | VR::OF | VR::OD | VR::OL | VR::UN)
}

#[cfg(test)]
mod tests {
    use super::*;
    use dicom_core::value::{DataSetSequence, PrimitiveValue};
    use dicom_core::{DataElement, Tag};
    use dicom_dictionary_std::tags;
    use dicom_object::meta::FileMetaTableBuilder;
    use pretty_assertions::assert_eq;
    use rstest::*;

    #[fixture]
    fn plan() -> DefaultDicomObject {
        let item = InMemDicomObject::from_element_iter([DataElement::new(
            Tag(0x0008, 0x1155),
            VR::UI,
            PrimitiveValue::from("1.2.3.4"),
        )]);
        InMemDicomObject::from_element_iter([
            DataElement::new(tags::SOP_CLASS_UID, VR::UI, PrimitiveValue::from("1.2.840.10008.5.1.4.1.1.481.5")),
            DataElement::new(tags::SOP_INSTANCE_UID, VR::UI, PrimitiveValue::from("1.2.3.5")),
            DataElement::new(tags::MODALITY, VR::CS, PrimitiveValue::from("RTPLAN")),
            DataElement::new(tags::PATIENT_NAME, VR::PN, PrimitiveValue::from("Doe^John")),
            DataElement::new(Tag(0x300C, 0x0060), VR::SQ, DataSetSequence::from(vec![item])),
        ])
        .with_meta(
            FileMetaTableBuilder::new()
                .transfer_syntax("1.2.840.10008.1.2.1")
                .media_storage_sop_class_uid("1.2.840.10008.5.1.4.1.1.481.5")
                .media_storage_sop_instance_uid("1.2.3.5"),
        )
        .unwrap()
    }

    #[rstest]
    fn test_tree_structure(plan: DefaultDicomObject) {
        let tree = DumpTree::from_object(&plan);
        let dataset_start = tree.rows.iter().position(|r| r.role() == "Dataset").unwrap();
        let roles: Vec<(usize, &str)> = tree.rows[dataset_start..]
            .iter()
            .map(|r| (r.depth, r.role()))
            .collect();
        assert_eq!(
            roles,
            vec![
                (0, "Dataset"),
                (1, "element"),
                (1, "element"),
                (1, "element"),
                (1, "element"),
                (1, "sequence"),
                (2, "item"),
                (3, "element"),
            ]
        );
        let sequence = &tree.rows[dataset_start + 5];
        assert_eq!(sequence.tag(), "(300C,0060)");
        assert_eq!(sequence.value(), "Sequence of length 1");
        assert_eq!(sequence.columns[3], "SQ");
    }

    #[rstest]
    fn test_metadata_rows(plan: DefaultDicomObject) {
        let tree = DumpTree::from_object(&plan);
        assert_eq!(tree.rows[0].role(), "Metadata");
        let ts = tree.rows.iter().find(|r| r.tag() == "(0002,0010)").unwrap();
        assert_eq!(ts.depth, 1);
        assert_eq!(ts.value(), "1.2.840.10008.1.2.1");
        // binary meta elements read like binary dataset elements
        let version = tree.rows.iter().find(|r| r.tag() == "(0002,0001)").unwrap();
        assert_eq!(version.value(), "2 bytes");
    }

    #[rstest]
    fn test_render_text(plan: DefaultDicomObject) {
        let text = DumpTree::from_object(&plan).render_text();
        assert!(text.starts_with("Metadata\t\t\t\t\t\n"));
        assert!(text.contains("\telement\t(0010,0010)\tPatientName\tPN\t1\tDoe^John\n"));
        assert!(text.contains("\t\titem\t\t\t\t\t\n"));
        assert!(text.contains("\t\t\telement\t(0008,1155)\tReferencedSOPInstanceUID\tUI\t1\t1.2.3.4\n"));
        for line in text.lines() {
            assert_eq!(line.trim_start_matches('\t').split('\t').count(), COLUMNS, "{line:?}");
        }
    }

    #[rstest]
    #[case("p", false, 0)]
    #[case("patientname", false, 1)]
    #[case("doe^", false, 0)]
    #[case("doe^", true, 1)]
    #[case("(300c", false, 1)]
    fn test_search(plan: DefaultDicomObject, #[case] query: &str, #[case] include_value: bool, #[case] hits: usize) {
        let tree = DumpTree::from_object(&plan);
        assert_eq!(tree.search(query, include_value).len(), hits);
    }
}
