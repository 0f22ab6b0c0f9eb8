use log::{debug, warn};

use crate::model::{strategy_for, DataElement, DecodeStrategy, DicomValue, ElementTable, KNOWN_VRS};
use crate::util::normalize_tag;
use crate::CommonResult;

const PREAMBLE_LENGTH: usize = 128;
const PREFIX: &[u8] = b"DICM";
const UNDEFINED_LENGTH: u32 = 0xFFFF_FFFF;

// Delimiter tags as stored on the wire (little-endian words).
const ITEM_TAG: [u8; 4] = [0xFE, 0xFF, 0x00, 0xE0];
const ITEM_DELIMITER: [u8; 8] = [0xFE, 0xFF, 0x0D, 0xE0, 0x00, 0x00, 0x00, 0x00];
const SEQUENCE_DELIMITER: [u8; 8] = [0xFE, 0xFF, 0xDD, 0xE0, 0x00, 0x00, 0x00, 0x00];

// VRs whose explicit form carries a reserved word and a 4-byte length.
const LONG_FORM_VRS: &[&str] = &["OB", "OD", "OF", "OW", "UN", "UT"];

/// Parse an explicit-little-endian file buffer into an element table. Every
/// element records its absolute byte span; structured values are precomputed
/// where the VR decodes cleanly and left unset otherwise.
pub fn parse(buffer: &[u8]) -> CommonResult<ElementTable> {
    let mut offset = check_header(buffer)?;
    let mut table = ElementTable::new();
    while offset < buffer.len() {
        if buffer.len() - offset < 8 {
            warn!("{} trailing bytes after the last element", buffer.len() - offset);
            break;
        }
        let (element, consumed) = read_element(buffer, offset)?;
        offset += consumed;
        table.insert(normalize_tag(&element.tag), element);
    }
    Ok(table)
}

fn check_header(buffer: &[u8]) -> CommonResult<usize> {
    let prefix_end = PREAMBLE_LENGTH + PREFIX.len();
    let prefix = buffer
        .get(PREAMBLE_LENGTH..prefix_end)
        .ok_or("file is shorter than the preamble")?;
    if prefix != PREFIX {
        return Err("DICM prefix not found".into());
    }
    Ok(prefix_end)
}

fn read_element(buffer: &[u8], start: usize) -> CommonResult<(DataElement, usize)> {
    let mut offset = start;
    let group = read_u16(buffer, offset)?;
    let element_number = read_u16(buffer, offset + 2)?;
    offset += 4;
    let tag = format!("{:04X}{:04X}", group, element_number);

    let vr_bytes = buffer
        .get(offset..offset + 2)
        .ok_or("unexpected end of data in element header")?;
    let vr: String = vr_bytes.iter().map(|b| char::from(*b)).collect();

    if !KNOWN_VRS.contains(&vr.as_str()) {
        // No VR on the wire: implicit form, 4-byte length right after the tag.
        warn!("tag {tag}: unrecognized VR bytes, reading as implicit");
        let length = read_u32(buffer, offset)? as usize;
        offset += 4;
        let end = span_end(buffer, offset, length)?;
        let element = DataElement {
            tag,
            vr: "UN".to_string(),
            length,
            data_offset: offset,
            value: None,
            items: None,
        };
        return Ok((element, end - start));
    }
    offset += 2;

    if vr == "SQ" {
        // Reserved word, then a 4-byte length that may be undefined.
        offset += 2;
        let declared = read_u32(buffer, offset)?;
        offset += 4;
        let content_offset = offset;
        let (items, consumed) = read_sequence_items(buffer, content_offset, declared)?;
        let element = DataElement {
            tag,
            vr,
            length: consumed,
            data_offset: content_offset,
            value: None,
            items: Some(items),
        };
        return Ok((element, content_offset + consumed - start));
    }

    let mut length = if LONG_FORM_VRS.contains(&vr.as_str()) {
        offset += 2;
        let declared = read_u32(buffer, offset)?;
        offset += 4;
        declared as usize
    } else {
        let declared = read_u16(buffer, offset)?;
        offset += 2;
        declared as usize
    };

    let mut trailer = 0;
    if length == UNDEFINED_LENGTH as usize {
        // Undefined-length payload outside a sequence: scan for the closing
        // delimiter to recover the actual span.
        let delimiter_at = find_delimiter(buffer, offset, &SEQUENCE_DELIMITER)
            .ok_or("sequence delimiter not found for undefined-length element")?;
        length = delimiter_at - offset;
        trailer = SEQUENCE_DELIMITER.len();
    }

    let data_offset = offset;
    let end = span_end(buffer, data_offset, length)?;
    let value = decode_value(&buffer[data_offset..end], &vr, &tag);
    let element = DataElement {
        tag,
        vr,
        length,
        data_offset,
        value,
        items: None,
    };
    Ok((element, end + trailer - start))
}

fn read_sequence_items(
    buffer: &[u8],
    start: usize,
    declared: u32,
) -> CommonResult<(Vec<ElementTable>, usize)> {
    let content_end = if declared == UNDEFINED_LENGTH {
        None
    } else {
        Some(span_end(buffer, start, declared as usize)?)
    };

    // Walk the content structurally instead of scanning for the closing
    // delimiter: a nested undefined-length sequence carries its own
    // delimiters and a flat scan would stop at the inner one.
    let mut items = Vec::new();
    let mut offset = start;
    loop {
        if let Some(end) = content_end {
            if offset >= end {
                return Ok((items, declared as usize));
            }
        }
        let header = buffer
            .get(offset..offset + 8)
            .ok_or("truncated item header")?;
        if content_end.is_none() && header == SEQUENCE_DELIMITER {
            return Ok((items, offset + SEQUENCE_DELIMITER.len() - start));
        }
        if header[..4] != ITEM_TAG {
            return Err("invalid item tag in sequence".into());
        }
        let declared_item = u32::from_le_bytes(header[4..8].try_into()?);
        offset += 8;

        let (item, item_consumed) = read_item(buffer, offset, declared_item)?;
        items.push(item);
        offset += item_consumed;
    }
}

fn read_item(buffer: &[u8], start: usize, declared: u32) -> CommonResult<(ElementTable, usize)> {
    let mut item = ElementTable::new();
    let mut offset = start;
    if declared == UNDEFINED_LENGTH {
        loop {
            let header = buffer
                .get(offset..offset + 8)
                .ok_or("item delimiter not found")?;
            if header == ITEM_DELIMITER {
                return Ok((item, offset + ITEM_DELIMITER.len() - start));
            }
            let (element, consumed) = read_element(buffer, offset)?;
            offset += consumed;
            item.insert(normalize_tag(&element.tag), element);
        }
    }
    let end = span_end(buffer, offset, declared as usize)?;
    while offset < end {
        let (element, consumed) = read_element(buffer, offset)?;
        offset += consumed;
        item.insert(normalize_tag(&element.tag), element);
    }
    Ok((item, declared as usize))
}

/// Structured read for one element's payload, dispatched through the VR
/// strategy table. Anything that does not decode cleanly yields None and the
/// raw bytes remain the fallback; a bad value never aborts the parse.
fn decode_value(bytes: &[u8], vr: &str, tag: &str) -> Option<DicomValue> {
    if bytes.is_empty() {
        return None;
    }
    let decoded = match strategy_for(vr) {
        DecodeStrategy::Text => Some(DicomValue::String(decode_text(bytes))),
        DecodeStrategy::DecimalString => parse_delimited::<f64>(bytes).map(DicomValue::F64),
        DecodeStrategy::IntegerString => parse_delimited::<i32>(bytes).map(DicomValue::I32),
        DecodeStrategy::U16List => decode_chunks(bytes, u16::from_le_bytes).map(DicomValue::U16),
        DecodeStrategy::U32List => decode_chunks(bytes, u32::from_le_bytes).map(DicomValue::U32),
        DecodeStrategy::I16List => decode_chunks(bytes, i16::from_le_bytes).map(DicomValue::I16),
        DecodeStrategy::I32List => decode_chunks(bytes, i32::from_le_bytes).map(DicomValue::I32),
        DecodeStrategy::F32List => decode_chunks(bytes, f32::from_le_bytes).map(DicomValue::F32),
        DecodeStrategy::F64List => decode_chunks(bytes, f64::from_le_bytes).map(DicomValue::F64),
        DecodeStrategy::Bytes => Some(DicomValue::Bytes(bytes.to_vec())),
        DecodeStrategy::Sequence | DecodeStrategy::Unknown => None,
    };
    if decoded.is_none() {
        debug!("tag {tag}: no structured value for VR {vr}");
    }
    decoded
}

fn decode_text(bytes: &[u8]) -> String {
    let (decoded, _, _) = encoding_rs::WINDOWS_1252.decode(bytes);
    decoded.replace('\0', "").trim().to_string()
}

fn parse_delimited<T: std::str::FromStr>(bytes: &[u8]) -> Option<Vec<T>> {
    let text = decode_text(bytes);
    if text.is_empty() {
        return None;
    }
    text.split('\\')
        .map(|part| part.trim().parse::<T>().ok())
        .collect()
}

fn decode_chunks<const N: usize, T>(bytes: &[u8], convert: fn([u8; N]) -> T) -> Option<Vec<T>> {
    if bytes.len() % N != 0 {
        return None;
    }
    bytes
        .chunks_exact(N)
        .map(|chunk| chunk.try_into().ok().map(convert))
        .collect()
}

fn find_delimiter(buffer: &[u8], start: usize, delimiter: &[u8]) -> Option<usize> {
    buffer
        .get(start..)?
        .windows(delimiter.len())
        .position(|window| window == delimiter)
        .map(|index| start + index)
}

fn span_end(buffer: &[u8], offset: usize, length: usize) -> CommonResult<usize> {
    offset
        .checked_add(length)
        .filter(|end| *end <= buffer.len())
        .ok_or_else(|| "element length runs past the end of the buffer".into())
}

fn read_u16(buffer: &[u8], offset: usize) -> CommonResult<u16> {
    Ok(u16::from_le_bytes(
        buffer
            .get(offset..offset + 2)
            .ok_or("unexpected end of data")?
            .try_into()?,
    ))
}

fn read_u32(buffer: &[u8], offset: usize) -> CommonResult<u32> {
    Ok(u32::from_le_bytes(
        buffer
            .get(offset..offset + 4)
            .ok_or("unexpected end of data")?
            .try_into()?,
    ))
}
