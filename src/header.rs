//! Explicit tag reads from a DICOM header.
//!
//! A tag that is absent, empty or not representable as text reads as `None`;
//! nothing here fails for a missing attribute. Required attributes are checked
//! by the caller with [required].

use std::path::Path;

use dicom_core::Tag;
use dicom_core::dictionary::DataDictionary;
use dicom_dictionary_std::StandardDataDictionary;
use dicom_object::InMemDicomObject;

use crate::error::{Error, Result};

/// Radiotherapy attributes used to follow references between objects.
pub mod rt_tags {
    use dicom_core::Tag;

    pub const REFERENCED_RT_PLAN_SEQUENCE: Tag = Tag(0x300C, 0x0002);
    pub const REFERENCED_STRUCTURE_SET_SEQUENCE: Tag = Tag(0x300C, 0x0060);
    pub const REFERENCED_FRAME_OF_REFERENCE_SEQUENCE: Tag = Tag(0x3006, 0x0010);
    pub const RT_REFERENCED_STUDY_SEQUENCE: Tag = Tag(0x3006, 0x0012);
    pub const RT_REFERENCED_SERIES_SEQUENCE: Tag = Tag(0x3006, 0x0014);
    pub const REFERENCED_STUDY_SEQUENCE: Tag = Tag(0x0008, 0x1110);
    pub const REFERENCED_SOP_INSTANCE_UID: Tag = Tag(0x0008, 0x1155);

    pub const OTHER_PATIENT_IDS: Tag = Tag(0x0010, 0x1000);
    pub const OTHER_PATIENT_NAMES: Tag = Tag(0x0010, 0x1001);
    pub const OTHER_PATIENT_IDS_SEQUENCE: Tag = Tag(0x0010, 0x1002);
}

/// Trimmed string value of a tag, `None` when absent or empty.
pub fn text(obj: &InMemDicomObject, tag: Tag) -> Option<String> {
    obj.element_opt(tag)
        .ok()
        .flatten()
        .and_then(|e| e.to_str().ok())
        .map(|s| s.trim_end_matches(['\0', ' ']).trim_start().to_string())
        .filter(|s| !s.is_empty())
}

/// String value of a tag, or an empty string.
pub fn text_or_empty(obj: &InMemDicomObject, tag: Tag) -> String {
    text(obj, tag).unwrap_or_default()
}

/// String value of a tag which must be present.
pub fn required<P: AsRef<Path>>(obj: &InMemDicomObject, tag: Tag, path: P) -> Result<String> {
    text(obj, tag).ok_or_else(|| Error::MissingTag {
        path: path.as_ref().to_path_buf(),
        tag: name_of(tag).unwrap_or("unknown"),
    })
}

/// First item of a sequence attribute.
pub fn first_item(obj: &InMemDicomObject, sequence: Tag) -> Option<&InMemDicomObject> {
    obj.element_opt(sequence)
        .ok()
        .flatten()
        .and_then(|e| e.items())
        .and_then(|items| items.first())
}

/// Follow the first item of each sequence in `path`, then read `tag` as text.
///
/// `nested_text(obj, &[A, B], T)` reads `A[0].B[0].T`.
pub fn nested_text(obj: &InMemDicomObject, path: &[Tag], tag: Tag) -> Option<String> {
    let mut current = obj;
    for sequence in path {
        current = first_item(current, *sequence)?;
    }
    text(current, tag)
}

/// Mutable counterpart of [nested_text]: run `f` on the item holding the
/// leaf attribute. Returns whether every sequence in `path` had an item.
pub fn update_nested_item(
    obj: &mut InMemDicomObject,
    path: &[Tag],
    f: &mut dyn FnMut(&mut InMemDicomObject),
) -> bool {
    let Some((&sequence, rest)) = path.split_first() else {
        f(obj);
        return true;
    };
    let mut reached = false;
    obj.update_value(sequence, |value| {
        if let Some(item) = value.items_mut().and_then(|items| items.first_mut()) {
            reached = update_nested_item(item, rest, &mut *f);
        }
    });
    reached
}

/// Standard keyword of a tag.
pub fn name_of(tag: Tag) -> Option<&'static str> {
    StandardDataDictionary.by_tag(tag).map(|e| e.alias)
}

/// Format a tag as `(gggg,eeee)`.
pub fn tag_string(tag: Tag) -> String {
    format!("({:04X},{:04X})", tag.group(), tag.element())
}

/// Parse `ggggeeee`, `gggg,eeee` or `(gggg,eeee)` as a tag.
pub fn parse_tag(s: &str) -> std::result::Result<Tag, String> {
    let hex: String = s
        .chars()
        .filter(|c| !matches!(c, '(' | ')' | ',' | ' '))
        .collect();
    if hex.len() != 8 {
        return Err(format!("{s} is not a valid tag"));
    }
    let group = u16::from_str_radix(&hex[..4], 16).map_err(|_| format!("{s} is not a valid tag"))?;
    let element = u16::from_str_radix(&hex[4..], 16).map_err(|_| format!("{s} is not a valid tag"))?;
    Ok(Tag(group, element))
}

#[cfg(test)]
mod tests {
    use super::*;
    use dicom_core::value::{DataSetSequence, PrimitiveValue};
    use dicom_core::{DataElement, VR};
    use dicom_dictionary_std::tags;
    use rstest::*;

    fn structure_set_header() -> InMemDicomObject {
        let series = InMemDicomObject::from_element_iter([DataElement::new(
            tags::SERIES_INSTANCE_UID,
            VR::UI,
            PrimitiveValue::from("1.2.3.4"),
        )]);
        let study = InMemDicomObject::from_element_iter([DataElement::new(
            rt_tags::RT_REFERENCED_SERIES_SEQUENCE,
            VR::SQ,
            DataSetSequence::from(vec![series]),
        )]);
        let frame = InMemDicomObject::from_element_iter([
            DataElement::new(tags::FRAME_OF_REFERENCE_UID, VR::UI, PrimitiveValue::from("1.2.3.9")),
            DataElement::new(
                rt_tags::RT_REFERENCED_STUDY_SEQUENCE,
                VR::SQ,
                DataSetSequence::from(vec![study]),
            ),
        ]);
        InMemDicomObject::from_element_iter([
            DataElement::new(tags::PATIENT_ID, VR::LO, PrimitiveValue::from("P001 ")),
            DataElement::new(tags::STUDY_DESCRIPTION, VR::LO, PrimitiveValue::from("")),
            DataElement::new(
                rt_tags::REFERENCED_FRAME_OF_REFERENCE_SEQUENCE,
                VR::SQ,
                DataSetSequence::from(vec![frame]),
            ),
        ])
    }

    #[rstest]
    #[case(tags::PATIENT_ID, Some("P001"))]
    #[case(tags::STUDY_DESCRIPTION, None)]
    #[case(tags::SERIES_DESCRIPTION, None)]
    fn test_text(#[case] tag: Tag, #[case] expected: Option<&str>) {
        let obj = structure_set_header();
        assert_eq!(text(&obj, tag).as_deref(), expected);
    }

    #[test]
    fn test_nested_text() {
        let obj = structure_set_header();
        let series_uid = nested_text(
            &obj,
            &[
                rt_tags::REFERENCED_FRAME_OF_REFERENCE_SEQUENCE,
                rt_tags::RT_REFERENCED_STUDY_SEQUENCE,
                rt_tags::RT_REFERENCED_SERIES_SEQUENCE,
            ],
            tags::SERIES_INSTANCE_UID,
        );
        assert_eq!(series_uid.as_deref(), Some("1.2.3.4"));
        let frame = nested_text(
            &obj,
            &[rt_tags::REFERENCED_FRAME_OF_REFERENCE_SEQUENCE],
            tags::FRAME_OF_REFERENCE_UID,
        );
        assert_eq!(frame.as_deref(), Some("1.2.3.9"));
        assert!(nested_text(&obj, &[rt_tags::REFERENCED_RT_PLAN_SEQUENCE], tags::SOP_INSTANCE_UID).is_none());
    }

    #[test]
    fn test_update_nested_item() {
        let mut obj = structure_set_header();
        let path = [
            rt_tags::REFERENCED_FRAME_OF_REFERENCE_SEQUENCE,
            rt_tags::RT_REFERENCED_STUDY_SEQUENCE,
            rt_tags::RT_REFERENCED_SERIES_SEQUENCE,
        ];
        let reached = update_nested_item(&mut obj, &path, &mut |item| {
            item.put(DataElement::new(
                tags::SERIES_INSTANCE_UID,
                VR::UI,
                PrimitiveValue::from("1.2.3.5"),
            ));
        });
        assert!(reached);
        assert_eq!(nested_text(&obj, &path, tags::SERIES_INSTANCE_UID).as_deref(), Some("1.2.3.5"));
        // siblings of the rewritten item are kept
        assert_eq!(
            nested_text(
                &obj,
                &[rt_tags::REFERENCED_FRAME_OF_REFERENCE_SEQUENCE],
                tags::FRAME_OF_REFERENCE_UID
            )
            .as_deref(),
            Some("1.2.3.9")
        );

        let mut calls = 0;
        let reached = update_nested_item(&mut obj, &[rt_tags::REFERENCED_RT_PLAN_SEQUENCE], &mut |_| calls += 1);
        assert!(!reached);
        assert_eq!(calls, 0);
    }

    #[test]
    fn test_required_reports_keyword() {
        let obj = structure_set_header();
        let err = required(&obj, tags::MODALITY, "x.dcm").unwrap_err();
        assert!(matches!(err, Error::MissingTag { tag: "Modality", .. }));
    }

    #[rstest]
    #[case("00101000", Some(Tag(0x0010, 0x1000)))]
    #[case("(0010,1002)", Some(Tag(0x0010, 0x1002)))]
    #[case("300a,0004", Some(Tag(0x300A, 0x0004)))]
    #[case("0010", None)]
    #[case("0010zz00", None)]
    fn test_parse_tag(#[case] s: &str, #[case] expected: Option<Tag>) {
        assert_eq!(parse_tag(s).ok(), expected);
    }

    #[test]
    fn test_tag_string() {
        assert_eq!(tag_string(tags::PATIENT_ID), "(0010,0020)");
    }
}
