use std::collections::BTreeMap;

/// Parsed element table for one file: normalized key ("x" + uppercase hex)
/// to element descriptor. BTreeMap keeps full-table display sorted by key.
#[derive(Debug, Clone, Default)]
pub struct ElementTable {
    pub elements: BTreeMap<String, DataElement>,
}

impl ElementTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&DataElement> {
        self.elements.get(key)
    }

    pub fn insert(&mut self, key: String, element: DataElement) {
        self.elements.insert(key, element);
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }
}

/// One tag entry: declared VR, byte span into the shared file buffer, the
/// structured value precomputed by the parser (when it could decode one),
/// and nested item tables for sequence elements.
#[derive(Debug, Clone)]
pub struct DataElement {
    pub tag: String,
    pub vr: String,
    pub length: usize,
    pub data_offset: usize,
    pub value: Option<DicomValue>,
    pub items: Option<Vec<ElementTable>>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DicomValue {
    String(String),
    U16(Vec<u16>),
    U32(Vec<u32>),
    I16(Vec<i16>),
    I32(Vec<i32>),
    F32(Vec<f32>),
    F64(Vec<f64>),
    Bytes(Vec<u8>),
}

/// Result of resolving one tag.
#[derive(Debug, Clone, PartialEq)]
pub enum ResolvedValue {
    Absent,
    Scalar(String),
    Items(Vec<FlattenedItem>),
}

/// Cross-referenced identifiers pulled out of one sequence item.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ItemFields {
    pub referenced_sop_instance_uid: Option<String>,
    pub referenced_sop_class_uid: Option<String>,
    pub frame_of_reference_uid: Option<String>,
}

impl ItemFields {
    pub fn is_empty(&self) -> bool {
        self.referenced_sop_instance_uid.is_none()
            && self.referenced_sop_class_uid.is_none()
            && self.frame_of_reference_uid.is_none()
    }
}

/// One entry of a flattened sequence. Items with no readable fields keep
/// their ordinal position as a placeholder so list length always matches
/// the source item count.
#[derive(Debug, Clone, PartialEq)]
pub enum FlattenedItem {
    Fields(ItemFields),
    Placeholder(usize),
}

/// How an element's payload is decoded, keyed by VR code. All VR-driven
/// branching goes through this table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeStrategy {
    Text,
    DecimalString,
    IntegerString,
    U16List,
    U32List,
    I16List,
    I32List,
    F32List,
    F64List,
    Bytes,
    Sequence,
    Unknown,
}

pub fn strategy_for(vr: &str) -> DecodeStrategy {
    match vr {
        "AE" | "AS" | "CS" | "DA" | "DT" | "LO" | "LT" | "PN" | "SH" | "ST" | "TM" | "UI"
        | "UT" => DecodeStrategy::Text,
        "DS" => DecodeStrategy::DecimalString,
        "IS" => DecodeStrategy::IntegerString,
        "US" => DecodeStrategy::U16List,
        "UL" => DecodeStrategy::U32List,
        "SS" => DecodeStrategy::I16List,
        "SL" => DecodeStrategy::I32List,
        "FL" => DecodeStrategy::F32List,
        "FD" => DecodeStrategy::F64List,
        "OB" | "OD" | "OF" | "OW" => DecodeStrategy::Bytes,
        "SQ" => DecodeStrategy::Sequence,
        _ => DecodeStrategy::Unknown,
    }
}

/// Every VR code the explicit transfer syntax can carry.
pub const KNOWN_VRS: &[&str] = &[
    "AE", "AS", "AT", "CS", "DA", "DS", "DT", "FL", "FD", "IS", "LO", "LT", "OB", "OD", "OF",
    "OW", "PN", "SH", "SL", "SQ", "SS", "ST", "TM", "UI", "UL", "UN", "US", "UT",
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequence_vr_dispatches_to_sequence_strategy() {
        assert_eq!(strategy_for("SQ"), DecodeStrategy::Sequence);
    }

    #[test]
    fn text_vrs_share_one_strategy() {
        for vr in ["UI", "LO", "PN", "CS", "DA"] {
            assert_eq!(strategy_for(vr), DecodeStrategy::Text);
        }
    }

    #[test]
    fn unrecognized_vr_is_unknown() {
        assert_eq!(strategy_for("UN"), DecodeStrategy::Unknown);
        assert_eq!(strategy_for("ZZ"), DecodeStrategy::Unknown);
    }
}
