use std::panic::{catch_unwind, AssertUnwindSafe};

use lazy_static::lazy_static;
use regex::Regex;

use crate::dict::NameResolver;
use crate::model::{
    strategy_for, DataElement, DecodeStrategy, ElementTable, FlattenedItem, ResolvedValue,
};
use crate::resolve::{flatten_sequence, get_tag_value, resolve_scalar};
use crate::util::{format_tag, strip_key_marker};

pub const NOT_AVAILABLE: &str = "Not available";
pub const EMPTY_SEQUENCE: &str = "Empty sequence";
pub const UNABLE_TO_READ: &str = "[Unable to read value]";
pub const ERROR_READING: &str = "[Error reading value]";

const GENERIC_VALUE_CAP: usize = 100;
const SEQUENCE_SUMMARY_CAP: usize = 150;
const BINARY_SCAN_MIN_LEN: usize = 50;
const PRINTABLE_SURVIVAL_MIN: f64 = 0.3;

pub const MODALITY_TAG: &str = "00080060";
const PIXEL_DATA_TAG: &str = "7FE00010";

lazy_static! {
    // Control characters outside printable ASCII and common whitespace.
    static ref CONTROL_CHARS: Regex =
        Regex::new("[\\x00-\\x08\\x0E-\\x1F\\x7F-\\u{9F}]").unwrap();
}

/// Fixed tag list for one summary group.
pub struct TagSpec {
    pub label: &'static str,
    pub tag: &'static str,
}

pub const GENERAL_TAGS: &[TagSpec] = &[
    TagSpec { label: "Patient ID", tag: "00100020" },
    TagSpec { label: "Study Date", tag: "00080020" },
    TagSpec { label: "Modality", tag: "00080060" },
    TagSpec { label: "Study Instance UID", tag: "0020000D" },
];

pub const RT_PLAN_TAGS: &[TagSpec] = &[
    TagSpec { label: "SOP Instance UID", tag: "00080018" },
    TagSpec { label: "RT Plan Label", tag: "300A0002" },
    TagSpec { label: "RT Plan Name", tag: "300A0003" },
    TagSpec { label: "RT Plan Date", tag: "300A0006" },
    TagSpec { label: "Referenced RT Plan Sequence", tag: "300C0002" },
];

pub const RT_DOSE_TAGS: &[TagSpec] = &[TagSpec {
    label: "Referenced RT Plan Sequence",
    tag: "300C0002",
}];

pub const RT_STRUCT_TAGS: &[TagSpec] = &[
    TagSpec { label: "Frame of Reference UID", tag: "00200052" },
    TagSpec { label: "Referenced Frame of Reference Sequence", tag: "30060010" },
];

pub struct MetadataRow {
    pub label: &'static str,
    pub tag: &'static str,
    pub value: ResolvedValue,
}

/// A summary group either renders its rows or one empty-state line naming
/// the modality actually found.
pub enum GroupContent {
    Rows(Vec<MetadataRow>),
    EmptyState(String),
}

pub struct TableRow {
    pub tag: String,
    pub name: String,
    pub value: String,
}

/// Render a resolved value for a metadata slot. Total: every input maps to a
/// non-empty string.
pub fn format_value(value: &ResolvedValue) -> String {
    match value {
        ResolvedValue::Absent => NOT_AVAILABLE.to_string(),
        ResolvedValue::Scalar(text) => text.clone(),
        ResolvedValue::Items(items) if items.is_empty() => EMPTY_SEQUENCE.to_string(),
        ResolvedValue::Items(items) => items
            .iter()
            .enumerate()
            .map(|(index, item)| format_item_block(index, item))
            .collect::<Vec<_>>()
            .join("\n"),
    }
}

fn format_item_block(index: usize, item: &FlattenedItem) -> String {
    match item {
        FlattenedItem::Placeholder(ordinal) => placeholder_text(*ordinal),
        FlattenedItem::Fields(fields) => {
            let mut lines = vec![format!("Item {}:", index + 1)];
            if let Some(uid) = &fields.referenced_sop_instance_uid {
                lines.push(format!("  ReferencedSOPInstanceUID: {uid}"));
            }
            if let Some(uid) = &fields.referenced_sop_class_uid {
                lines.push(format!("  ReferencedSOPClassUID: {uid}"));
            }
            if let Some(uid) = &fields.frame_of_reference_uid {
                lines.push(format!("  FrameOfReferenceUID: {uid}"));
            }
            lines.join("\n")
        }
    }
}

pub fn placeholder_text(ordinal: usize) -> String {
    format!("Item {ordinal} — no readable fields")
}

/// Render one element for the full-table view. Binary and bulk categories
/// bypass decoding entirely; everything else goes through resolution, the
/// binary-vs-text heuristic, and the display cap.
pub fn format_element_value(buffer: &[u8], element: &DataElement) -> String {
    match strategy_for(&element.vr) {
        DecodeStrategy::Sequence => match flatten_sequence(element, buffer) {
            ResolvedValue::Items(items) if !items.is_empty() => sequence_summary(&items),
            _ => {
                let count = element.items.as_ref().map_or(0, |items| items.len());
                format!("[Sequence - {count} items]")
            }
        },
        DecodeStrategy::Bytes => format!("[Binary Data - {} bytes]", element.length),
        DecodeStrategy::Unknown if element.vr == "UN" => {
            format!("[Unknown VR - {} bytes]", element.length)
        }
        _ if element.tag.eq_ignore_ascii_case(PIXEL_DATA_TAG) => {
            format!("[Pixel Data - {} bytes]", element.length)
        }
        _ => match resolve_scalar(element, buffer) {
            ResolvedValue::Scalar(text) => classify_scalar(&text, element.length),
            _ => UNABLE_TO_READ.to_string(),
        },
    }
}

/// One-line sequence rendition for the table view, capped at the sequence
/// summary limit.
fn sequence_summary(items: &[FlattenedItem]) -> String {
    let rendered = items
        .iter()
        .enumerate()
        .map(|(index, item)| match item {
            FlattenedItem::Placeholder(ordinal) => placeholder_text(*ordinal),
            FlattenedItem::Fields(fields) => {
                let mut parts = Vec::new();
                if let Some(uid) = &fields.referenced_sop_instance_uid {
                    parts.push(format!("UID: {uid}"));
                }
                if let Some(uid) = &fields.referenced_sop_class_uid {
                    parts.push(format!("Class: {uid}"));
                }
                if let Some(uid) = &fields.frame_of_reference_uid {
                    parts.push(format!("FOR UID: {uid}"));
                }
                if parts.is_empty() {
                    format!("Item {}", index + 1)
                } else {
                    format!("Item {}: {}", index + 1, parts.join(", "))
                }
            }
        })
        .collect::<Vec<_>>()
        .join("; ");
    truncate(&rendered, SEQUENCE_SUMMARY_CAP)
}

/// Binary-vs-text heuristic: a long string is binary when fewer than 30% of
/// its characters survive stripping control characters. Deliberately kept
/// as-is; it is a heuristic, not a classifier.
fn classify_scalar(value: &str, byte_length: usize) -> String {
    let total = value.chars().count();
    if CONTROL_CHARS.is_match(value) && total > BINARY_SCAN_MIN_LEN {
        let printable = CONTROL_CHARS.replace_all(value, "");
        if (printable.chars().count() as f64) < total as f64 * PRINTABLE_SURVIVAL_MIN {
            return format!("[Binary/Encoded Data - {byte_length} bytes]");
        }
    }
    truncate(value, GENERIC_VALUE_CAP)
}

fn truncate(value: &str, cap: usize) -> String {
    if value.chars().count() > cap {
        let mut truncated: String = value.chars().take(cap).collect();
        truncated.push_str("...");
        truncated
    } else {
        value.to_string()
    }
}

fn modality(table: &ElementTable, buffer: &[u8]) -> Option<String> {
    match get_tag_value(table, buffer, MODALITY_TAG) {
        ResolvedValue::Scalar(text) => Some(text),
        _ => None,
    }
}

fn collect_rows(table: &ElementTable, buffer: &[u8], tags: &[TagSpec]) -> Vec<MetadataRow> {
    tags.iter()
        .map(|spec| MetadataRow {
            label: spec.label,
            tag: spec.tag,
            value: get_tag_value(table, buffer, spec.tag),
        })
        .collect()
}

fn gated_group(
    table: &ElementTable,
    buffer: &[u8],
    expected_modality: &str,
    kind: &str,
    tags: &[TagSpec],
) -> GroupContent {
    let found = modality(table, buffer);
    if found.as_deref() != Some(expected_modality) {
        return GroupContent::EmptyState(format!(
            "This file is not an {kind}. Modality: {}",
            found.as_deref().unwrap_or("Unknown")
        ));
    }
    GroupContent::Rows(collect_rows(table, buffer, tags))
}

pub fn general_group(table: &ElementTable, buffer: &[u8]) -> GroupContent {
    GroupContent::Rows(collect_rows(table, buffer, GENERAL_TAGS))
}

pub fn rt_plan_group(table: &ElementTable, buffer: &[u8]) -> GroupContent {
    gated_group(table, buffer, "RTPLAN", "RT Plan", RT_PLAN_TAGS)
}

pub fn rt_dose_group(table: &ElementTable, buffer: &[u8]) -> GroupContent {
    gated_group(table, buffer, "RTDOSE", "RT Dose", RT_DOSE_TAGS)
}

pub fn rt_struct_group(table: &ElementTable, buffer: &[u8]) -> GroupContent {
    gated_group(table, buffer, "RTSTRUCT", "RT Structure", RT_STRUCT_TAGS)
}

/// Every element in the table, sorted by key, as (tag, name, value) display
/// rows. One malformed element never aborts the rest: a failure while
/// formatting becomes an explicit marker in that cell.
pub fn all_rows(table: &ElementTable, buffer: &[u8], names: &NameResolver) -> Vec<TableRow> {
    table
        .elements
        .iter()
        .map(|(key, element)| {
            let bare = strip_key_marker(key);
            let value = catch_unwind(AssertUnwindSafe(|| format_element_value(buffer, element)))
                .unwrap_or_else(|_| ERROR_READING.to_string());
            TableRow {
                tag: format_tag(bare),
                name: names
                    .resolve(bare)
                    .unwrap_or_else(|| "Unknown".to_string()),
                value,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DicomValue, ItemFields};

    fn element(tag: &str, vr: &str, length: usize, value: Option<DicomValue>) -> DataElement {
        DataElement {
            tag: tag.to_string(),
            vr: vr.to_string(),
            length,
            data_offset: 0,
            value,
            items: None,
        }
    }

    #[test]
    fn absent_renders_not_available() {
        assert_eq!(format_value(&ResolvedValue::Absent), NOT_AVAILABLE);
    }

    #[test]
    fn item_blocks_render_fields_and_placeholders() {
        let items = ResolvedValue::Items(vec![
            FlattenedItem::Fields(ItemFields {
                referenced_sop_instance_uid: Some("1.2.3".to_string()),
                ..ItemFields::default()
            }),
            FlattenedItem::Placeholder(2),
        ]);
        let rendered = format_value(&items);
        assert!(rendered.contains("Item 1:"));
        assert!(rendered.contains("ReferencedSOPInstanceUID: 1.2.3"));
        assert!(rendered.contains("Item 2 — no readable fields"));
    }

    #[test]
    fn truncation_cap_is_exact() {
        let just_fits = "a".repeat(100);
        assert_eq!(truncate(&just_fits, 100), just_fits);

        let over = "a".repeat(101);
        let truncated = truncate(&over, 100);
        assert_eq!(truncated.len(), 103);
        assert!(truncated.ends_with("..."));
        assert_eq!(&truncated[..100], &over[..100]);
    }

    #[test]
    fn long_scalar_is_truncated_in_table_view() {
        let long = "a".repeat(101);
        let e = element("00081030", "LO", 101, Some(DicomValue::String(long.clone())));
        let rendered = format_element_value(b"", &e);
        assert_eq!(rendered, format!("{}...", &long[..100]));
    }

    #[test]
    fn binary_heuristic_cuts_at_thirty_percent_survival() {
        // 29 printable of 100 -> binary.
        let mostly_binary = format!("{}{}", "A".repeat(29), "\u{1}".repeat(71));
        let e = element("00091001", "LO", 100, Some(DicomValue::String(mostly_binary)));
        assert_eq!(format_element_value(b"", &e), "[Binary/Encoded Data - 100 bytes]");

        // 31 printable of 100 -> still text.
        let mostly_text = format!("{}{}", "A".repeat(31), "\u{1}".repeat(69));
        let e = element("00091001", "LO", 100, Some(DicomValue::String(mostly_text.clone())));
        assert_eq!(format_element_value(b"", &e), mostly_text);
    }

    #[test]
    fn short_strings_skip_the_binary_scan() {
        // Length 50 is not above the scan minimum, so control characters pass.
        let short = format!("{}{}", "A".repeat(15), "\u{1}".repeat(35));
        let e = element("00091001", "LO", 50, Some(DicomValue::String(short.clone())));
        assert_eq!(format_element_value(b"", &e), short);
    }

    #[test]
    fn binary_categories_render_byte_markers() {
        let e = element("7FE00010", "OW", 4096, None);
        assert_eq!(format_element_value(b"", &e), "[Binary Data - 4096 bytes]");

        let e = element("00091002", "UN", 64, None);
        assert_eq!(format_element_value(b"", &e), "[Unknown VR - 64 bytes]");

        // Unknown payloads never decode, even when the bytes read as text.
        let e = element("00091002", "UN", 14, None);
        assert_eq!(
            format_element_value(b"SOMEVENDORTEXT", &e),
            "[Unknown VR - 14 bytes]"
        );
        let e = element(
            "00091002",
            "UN",
            14,
            Some(DicomValue::String("SOMEVENDORTEXT".to_string())),
        );
        assert_eq!(format_element_value(b"", &e), "[Unknown VR - 14 bytes]");

        // Pixel data with a text-ish VR still never decodes.
        let e = element("7FE00010", "LO", 4096, None);
        assert_eq!(format_element_value(b"", &e), "[Pixel Data - 4096 bytes]");
    }

    #[test]
    fn empty_sequence_renders_item_count_marker() {
        let mut e = element("300C0002", "SQ", 0, None);
        e.items = Some(Vec::new());
        assert_eq!(format_element_value(b"", &e), "[Sequence - 0 items]");
    }

    #[test]
    fn unreadable_element_renders_marker() {
        let e = element("00100020", "LO", 0, None);
        assert_eq!(format_element_value(b"", &e), UNABLE_TO_READ);
    }

    #[test]
    fn mismatched_modality_names_the_found_one() {
        let mut table = ElementTable::new();
        table.insert(
            "x00080060".to_string(),
            element("00080060", "CS", 6, Some(DicomValue::String("RTDOSE".to_string()))),
        );
        match rt_plan_group(&table, b"") {
            GroupContent::EmptyState(message) => {
                assert_eq!(message, "This file is not an RT Plan. Modality: RTDOSE");
            }
            GroupContent::Rows(_) => panic!("group should be gated off"),
        }
    }

    #[test]
    fn missing_modality_reads_unknown() {
        let table = ElementTable::new();
        match rt_struct_group(&table, b"") {
            GroupContent::EmptyState(message) => {
                assert_eq!(message, "This file is not an RT Structure. Modality: Unknown");
            }
            GroupContent::Rows(_) => panic!("group should be gated off"),
        }
    }

    #[test]
    fn matching_modality_yields_all_group_rows() {
        let mut table = ElementTable::new();
        table.insert(
            "x00080060".to_string(),
            element("00080060", "CS", 6, Some(DicomValue::String("RTPLAN".to_string()))),
        );
        match rt_plan_group(&table, b"") {
            GroupContent::Rows(rows) => {
                assert_eq!(rows.len(), RT_PLAN_TAGS.len());
                assert_eq!(rows[1].label, "RT Plan Label");
                assert_eq!(rows[1].value, ResolvedValue::Absent);
            }
            GroupContent::EmptyState(message) => panic!("unexpected empty state: {message}"),
        }
    }

    #[test]
    fn every_table_row_formats_to_a_non_empty_string() {
        let mut table = ElementTable::new();
        table.insert(
            "x00080060".to_string(),
            element("00080060", "CS", 2, Some(DicomValue::String("CT".to_string()))),
        );
        table.insert("x00100020".to_string(), element("00100020", "LO", 0, None));
        table.insert("x7FE00010".to_string(), element("7FE00010", "OW", 100, None));
        let mut sequence = element("300C0002", "SQ", 0, None);
        sequence.items = Some(Vec::new());
        table.insert("x300C0002".to_string(), sequence);

        let rows = all_rows(&table, b"", &NameResolver::builtin_only());
        assert_eq!(rows.len(), table.len());
        for row in &rows {
            assert!(!row.value.is_empty());
            assert!(!row.name.is_empty());
        }
        // Sorted ascending by key.
        assert_eq!(rows[0].tag, "(0008, 0060)");
        assert_eq!(rows[0].name, "Modality");
        assert_eq!(rows[3].tag, "(7FE0, 0010)");
    }
}
