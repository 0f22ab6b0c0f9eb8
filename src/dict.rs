use std::collections::HashMap;
use std::fs::File;
use std::io::{self, BufRead};
use std::path::Path;

use lazy_static::lazy_static;
use log::warn;
use regex::Regex;

use crate::util::{normalize_tag, strip_key_marker};
use crate::CommonResult;

/// Optional external tag-name source, injected by the caller.
pub trait TagNameProvider {
    fn lookup(&self, tag: &str) -> Option<String>;
}

/// Dictionary lookup: built-in table first, then the external provider.
/// Returns None on a miss; substituting "Unknown" is the renderer's job.
pub struct NameResolver<'a> {
    external: Option<&'a dyn TagNameProvider>,
}

impl<'a> NameResolver<'a> {
    pub fn builtin_only() -> Self {
        Self { external: None }
    }

    pub fn with_external(provider: &'a dyn TagNameProvider) -> Self {
        Self {
            external: Some(provider),
        }
    }

    pub fn resolve(&self, tag: &str) -> Option<String> {
        let canonical = strip_key_marker(&normalize_tag(tag)).to_string();
        if let Some(name) = TAG_NAMES.get(canonical.as_str()) {
            return Some((*name).to_string());
        }
        self.external.and_then(|provider| provider.lookup(&canonical))
    }
}

/// Tab-separated `tag<TAB>name` file. Tags containing `x` are wildcards and
/// become regex entries checked after the exact ones.
pub struct FileTagDictionary {
    full: HashMap<String, String>,
    partial: Vec<(Regex, String)>,
}

impl FileTagDictionary {
    pub fn load(path: &Path) -> CommonResult<Self> {
        let file = File::open(path)?;
        Ok(Self::from_reader(io::BufReader::new(file)))
    }

    pub fn from_reader<R: BufRead>(reader: R) -> Self {
        let mut full = HashMap::new();
        let mut partial = Vec::new();
        for line in reader.lines() {
            let line = match line {
                Ok(line) => line,
                Err(error) => {
                    warn!("skipping unreadable dictionary line: {error}");
                    continue;
                }
            };
            let mut columns = line.splitn(2, '\t');
            let (tag, name) = match (columns.next(), columns.next()) {
                (Some(tag), Some(name)) if !tag.trim().is_empty() => {
                    (tag.trim().to_string(), name.trim().to_string())
                }
                _ => continue,
            };
            let canonical = tag.replace([' ', ','], "").to_ascii_uppercase();
            if canonical.contains('X') {
                let pattern = format!("^{}$", canonical.replace('X', "\\w"));
                match Regex::new(&pattern) {
                    Ok(regex) => partial.push((regex, name)),
                    Err(error) => warn!("bad wildcard tag {tag}: {error}"),
                }
            } else {
                full.insert(canonical, name);
            }
        }
        Self { full, partial }
    }
}

impl TagNameProvider for FileTagDictionary {
    fn lookup(&self, tag: &str) -> Option<String> {
        if let Some(name) = self.full.get(tag) {
            return Some(name.clone());
        }
        self.partial
            .iter()
            .find(|(regex, _)| regex.is_match(tag))
            .map(|(_, name)| name.clone())
    }
}

lazy_static! {
    static ref TAG_NAMES: HashMap<&'static str, &'static str> =
        BUILTIN_TAG_NAMES.iter().copied().collect();
}

const BUILTIN_TAG_NAMES: &[(&str, &str)] = &[
    ("00020000", "File Meta Information Group Length"),
    ("00020001", "File Meta Information Version"),
    ("00020002", "Media Storage SOP Class UID"),
    ("00020003", "Media Storage SOP Instance UID"),
    ("00020010", "Transfer Syntax UID"),
    ("00020012", "Implementation Class UID"),
    ("00020013", "Implementation Version Name"),
    ("00080005", "Specific Character Set"),
    ("00080012", "Instance Creation Date"),
    ("00080013", "Instance Creation Time"),
    ("00080016", "SOP Class UID"),
    ("00080018", "SOP Instance UID"),
    ("00080020", "Study Date"),
    ("00080021", "Series Date"),
    ("00080023", "Content Date"),
    ("00080030", "Study Time"),
    ("00080031", "Series Time"),
    ("00080033", "Content Time"),
    ("00080050", "Accession Number"),
    ("00080060", "Modality"),
    ("00080070", "Manufacturer"),
    ("00080090", "Referring Physician Name"),
    ("00081010", "Station Name"),
    ("00081030", "Study Description"),
    ("0008103E", "Series Description"),
    ("00081048", "Physician(s) of Record"),
    ("00081070", "Operator Name"),
    ("00081090", "Manufacturer Model Name"),
    ("00081100", "Coding Scheme Identification Sequence"),
    ("00081110", "Coding Scheme Identification Sequence"),
    ("00081230", "Coding Scheme Name"),
    ("00081240", "Coding Scheme Responsible Organization"),
    ("00100010", "Patient Name"),
    ("00100020", "Patient ID"),
    ("00100030", "Patient Birth Date"),
    ("00100032", "Patient Birth Time"),
    ("00100040", "Patient Sex"),
    ("00101000", "Other Patient IDs"),
    ("00180050", "Slice Thickness"),
    ("00181000", "Device Serial Number"),
    ("00181020", "Software Version(s)"),
    ("0020000D", "Study Instance UID"),
    ("0020000E", "Series Instance UID"),
    ("00200010", "Study ID"),
    ("00200011", "Series Number"),
    ("00200032", "Image Position (Patient)"),
    ("00200037", "Image Orientation (Patient)"),
    ("00200052", "Frame of Reference UID"),
    ("00201040", "Slice Location"),
    ("00280002", "Samples per Pixel"),
    ("00280004", "Photometric Interpretation"),
    ("00280008", "Number of Frames"),
    ("00280009", "Frame Increment Pointer"),
    ("00280010", "Rows"),
    ("00280011", "Columns"),
    ("00280030", "Pixel Spacing"),
    ("00280100", "Bits Allocated"),
    ("00280101", "Bits Stored"),
    ("00280102", "High Bit"),
    ("00280103", "Pixel Representation"),
    ("30040002", "Dose Units"),
    ("30040004", "Dose Type"),
    ("3004000A", "Dose Summation Type"),
    ("3004000C", "Grid Frame Offset Vector"),
    ("3004000E", "Dose Grid Scaling"),
    ("30040014", "Dose Comment"),
    ("30040050", "Structure Set Label"),
    ("30060002", "Structure Set Label"),
    ("30060004", "Structure Set Name"),
    ("30060008", "Structure Set Date"),
    ("30060009", "Structure Set Time"),
    ("30060010", "Referenced Frame of Reference Sequence"),
    ("30060020", "Structure Set ROI Sequence"),
    ("30060039", "ROI Contour Sequence"),
    ("30060080", "RT ROI Observations Sequence"),
    ("300A0002", "RT Plan Label"),
    ("300A0003", "RT Plan Name"),
    ("300A0006", "RT Plan Date"),
    ("300C0002", "Referenced RT Plan Sequence"),
    ("300C0006", "Referenced SOP Instance UID"),
    ("300C0060", "Referenced Structure Set Sequence"),
    ("300E0002", "Approval Status"),
    ("300E0004", "Review Date"),
    ("300E0005", "Review Time"),
    ("300E0008", "Reviewer Name"),
    ("7FE00010", "Pixel Data"),
];
