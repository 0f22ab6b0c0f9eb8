use log::debug;

use crate::model::{
    strategy_for, DataElement, DecodeStrategy, DicomValue, ElementTable, FlattenedItem,
    ItemFields, ResolvedValue,
};
use crate::util::{normalize_tag, strip_key_marker};

// Cross-reference fields extracted from sequence items.
const REF_SOP_INSTANCE_UID: &str = "x00081155";
const REF_SOP_CLASS_UID: &str = "x00081150";
const REF_PLAN_SOP_INSTANCE_UID: &str = "x300C0006";
const FRAME_OF_REFERENCE_UID: &str = "x00200052";

/// Look a normalized key up in the table: exact match first, then the
/// lowercase-hex spelling some producers emit, then a full case-insensitive
/// scan as the slow path.
pub fn find_element<'a>(table: &'a ElementTable, key: &str) -> Option<&'a DataElement> {
    if let Some(element) = table.get(key) {
        return Some(element);
    }
    let lower = format!("x{}", strip_key_marker(key).to_ascii_lowercase());
    if let Some(element) = table.get(&lower) {
        return Some(element);
    }
    let wanted = key.to_ascii_lowercase();
    table
        .elements
        .iter()
        .find(|(k, _)| k.to_ascii_lowercase() == wanted)
        .map(|(_, element)| element)
}

/// Best-effort recovery of an element's byte span as text, regardless of the
/// declared VR. The format's default text encoding is the single-byte Latin
/// set. Embedded NULs are stripped before trimming so padded values like
/// "12345 \0" come back clean.
pub fn read_raw_value(buffer: &[u8], element: &DataElement) -> Option<String> {
    if element.length == 0 {
        return None;
    }
    let end = element.data_offset.checked_add(element.length)?;
    let bytes = buffer.get(element.data_offset..end)?;
    let (decoded, _, _) = encoding_rs::WINDOWS_1252.decode(bytes);
    let cleaned = decoded.replace('\0', "");
    let trimmed = cleaned.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Resolve a tag to its logical value. Sequences flatten to item records;
/// scalars prefer the parser's structured value and degrade to the raw byte
/// decoder. This never fails: anything unreadable is `Absent`.
pub fn get_tag_value(table: &ElementTable, buffer: &[u8], tag: &str) -> ResolvedValue {
    let key = normalize_tag(tag);
    let element = match find_element(table, &key) {
        Some(element) => element,
        None => return ResolvedValue::Absent,
    };
    if strategy_for(&element.vr) == DecodeStrategy::Sequence {
        return flatten_sequence(element, buffer);
    }
    resolve_scalar(element, buffer)
}

/// Structured-then-raw scalar resolution. A structured text value that trims
/// to nothing is `Absent` outright; only a missing or unusable structured
/// value falls back to the raw bytes.
pub fn resolve_scalar(element: &DataElement, buffer: &[u8]) -> ResolvedValue {
    match &element.value {
        Some(DicomValue::String(text)) => {
            let trimmed = text.trim();
            if trimmed.is_empty() {
                ResolvedValue::Absent
            } else {
                ResolvedValue::Scalar(trimmed.to_string())
            }
        }
        Some(value) => match stringify_numeric(value) {
            Some(text) => ResolvedValue::Scalar(text),
            None => raw_or_absent(element, buffer),
        },
        None => raw_or_absent(element, buffer),
    }
}

fn raw_or_absent(element: &DataElement, buffer: &[u8]) -> ResolvedValue {
    match read_raw_value(buffer, element) {
        Some(text) => {
            debug!("tag {} recovered from raw bytes", element.tag);
            ResolvedValue::Scalar(text)
        }
        None => ResolvedValue::Absent,
    }
}

fn stringify_numeric(value: &DicomValue) -> Option<String> {
    match value {
        DicomValue::U16(values) => join(values),
        DicomValue::U32(values) => join(values),
        DicomValue::I16(values) => join(values),
        DicomValue::I32(values) => join(values),
        DicomValue::F32(values) => join(values),
        DicomValue::F64(values) => join(values),
        DicomValue::String(_) | DicomValue::Bytes(_) => None,
    }
}

fn join<T: ToString>(values: &[T]) -> Option<String> {
    if values.is_empty() {
        return None;
    }
    Some(
        values
            .iter()
            .map(|value| value.to_string())
            .collect::<Vec<_>>()
            .join(", "),
    )
}

/// Walk a sequence element's items and pull out the well-known reference
/// identifiers. Each field lookup is independent, so one malformed nested
/// element never blocks the others. Items with nothing readable become
/// placeholders carrying their ordinal, keeping output length equal to the
/// source item count. `Absent` only when the element has no items at all.
pub fn flatten_sequence(element: &DataElement, buffer: &[u8]) -> ResolvedValue {
    let items = match &element.items {
        Some(items) if !items.is_empty() => items,
        _ => return ResolvedValue::Absent,
    };
    let mut flattened = Vec::with_capacity(items.len());
    for (index, item) in items.iter().enumerate() {
        let mut fields = ItemFields {
            referenced_sop_instance_uid: scalar_field(item, buffer, REF_SOP_INSTANCE_UID),
            referenced_sop_class_uid: scalar_field(item, buffer, REF_SOP_CLASS_UID),
            frame_of_reference_uid: scalar_field(item, buffer, FRAME_OF_REFERENCE_UID),
        };
        // Plan/structure references carry the instance UID at 300C,0006;
        // when present it wins over 0008,1155.
        if let Some(uid) = scalar_field(item, buffer, REF_PLAN_SOP_INSTANCE_UID) {
            fields.referenced_sop_instance_uid = Some(uid);
        }
        if fields.is_empty() {
            flattened.push(FlattenedItem::Placeholder(index + 1));
        } else {
            flattened.push(FlattenedItem::Fields(fields));
        }
    }
    ResolvedValue::Items(flattened)
}

fn scalar_field(item: &ElementTable, buffer: &[u8], key: &str) -> Option<String> {
    let element = find_element(item, key)?;
    match resolve_scalar(element, buffer) {
        ResolvedValue::Scalar(text) => Some(text),
        _ => None,
    }
}
