use crate::metadata::{
    clean_base_name, MetadataRecord, RecordError, CAMERA_MODEL_FIELD, CREATION_DATE_FIELD,
};
use anyhow::{Context, Result};
use chrono::DateTime;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use tracing::debug;

/// (element, attribute) pairs pulled out of a sidecar. Anything else is ignored.
const TARGET_ATTRIBUTES: &[(&str, &str)] = &[("CreationDate", "value"), ("Device", "modelName")];

/// Reads a sidecar from disk.
///
/// I/O failures come back as plain `anyhow` errors; a missing or malformed
/// `CreationDate` comes back as a [`RecordError`] inside the `anyhow::Error`
/// so callers can tell the two apart with `downcast_ref`.
pub fn read_sidecar(path: &Path, strip_token: &str) -> Result<MetadataRecord> {
    let xml = fs::read_to_string(path)
        .with_context(|| format!("cannot read sidecar: {}", path.display()))?;
    Ok(parse_sidecar(&xml, path, strip_token)?)
}

pub fn parse_sidecar(
    xml: &str,
    path: &Path,
    strip_token: &str,
) -> Result<MetadataRecord, RecordError> {
    let original_base_name = clean_base_name(path, strip_token);
    debug!("parsing sidecar {} ({})", path.display(), original_base_name);

    let values = collect_attribute_values(xml);
    let raw_date = values
        .get(CREATION_DATE_FIELD)
        .ok_or_else(|| RecordError::MissingField {
            field: CREATION_DATE_FIELD,
            sidecar: path.to_path_buf(),
        })?;
    debug!("found CreationDate {}", raw_date);

    let creation_time = DateTime::parse_from_rfc3339(raw_date.trim()).map_err(|_| {
        RecordError::InvalidTimestamp {
            value: raw_date.clone(),
            sidecar: path.to_path_buf(),
        }
    })?;

    Ok(MetadataRecord {
        original_base_name,
        creation_time,
        camera_model: values.get(CAMERA_MODEL_FIELD).cloned(),
        sidecar_path: path.to_path_buf(),
    })
}

/// Walks every opening tag and keeps the first value seen for each target
/// attribute, keyed as `Element/@attribute`.
fn collect_attribute_values(xml: &str) -> HashMap<String, String> {
    let mut values = HashMap::<String, String>::new();
    let mut cursor = 0usize;

    while let Some(start) = xml[cursor..].find('<') {
        let start = cursor + start;

        if xml[start..].starts_with("<!--") {
            match xml[start..].find("-->") {
                Some(end) => {
                    cursor = start + end + 3;
                    continue;
                }
                None => break,
            }
        }

        let Some(end) = find_tag_end(xml, start) else {
            break;
        };
        let raw_tag = &xml[start + 1..end];
        cursor = end + 1;

        if raw_tag.starts_with('/') || raw_tag.starts_with('?') || raw_tag.starts_with('!') {
            continue;
        }

        let tag_name = raw_tag
            .split(|c: char| c.is_ascii_whitespace() || c == '/')
            .next()
            .unwrap_or_default();
        let element = local_name(tag_name);
        if !TARGET_ATTRIBUTES.iter().any(|(name, _)| *name == element) {
            continue;
        }

        for (name, value) in tag_attributes(raw_tag) {
            let attribute = local_name(name);
            let wanted = TARGET_ATTRIBUTES
                .iter()
                .any(|(el, attr)| *el == element && *attr == attribute);
            if !wanted {
                continue;
            }
            values
                .entry(format!("{element}/@{attribute}"))
                .or_insert_with(|| xml_unescape(value));
        }
    }

    values
}

/// Splits the inside of a tag (`Device manufacturer="Sony" modelName='X'`)
/// into name/value pairs. Unquoted values run to the next whitespace.
fn tag_attributes(raw_tag: &str) -> Vec<(&str, &str)> {
    let bytes = raw_tag.as_bytes();
    let mut out = Vec::new();
    let mut cursor = 0usize;

    while cursor < bytes.len() && !bytes[cursor].is_ascii_whitespace() {
        cursor += 1;
    }

    while cursor < bytes.len() {
        while cursor < bytes.len() && bytes[cursor].is_ascii_whitespace() {
            cursor += 1;
        }
        if cursor >= bytes.len() || bytes[cursor] == b'/' {
            break;
        }

        let name_start = cursor;
        while cursor < bytes.len()
            && !bytes[cursor].is_ascii_whitespace()
            && bytes[cursor] != b'='
            && bytes[cursor] != b'/'
        {
            cursor += 1;
        }
        if name_start == cursor {
            cursor += 1;
            continue;
        }
        let name = &raw_tag[name_start..cursor];

        while cursor < bytes.len() && bytes[cursor].is_ascii_whitespace() {
            cursor += 1;
        }
        if cursor >= bytes.len() || bytes[cursor] != b'=' {
            continue;
        }
        cursor += 1;

        while cursor < bytes.len() && bytes[cursor].is_ascii_whitespace() {
            cursor += 1;
        }
        if cursor >= bytes.len() {
            break;
        }

        let (value_start, value_end) = if bytes[cursor] == b'"' || bytes[cursor] == b'\'' {
            let quote = bytes[cursor];
            cursor += 1;
            let value_start = cursor;
            while cursor < bytes.len() && bytes[cursor] != quote {
                cursor += 1;
            }
            if cursor >= bytes.len() {
                break;
            }
            let value_end = cursor;
            cursor += 1;
            (value_start, value_end)
        } else {
            let value_start = cursor;
            while cursor < bytes.len() && !bytes[cursor].is_ascii_whitespace() {
                cursor += 1;
            }
            (value_start, cursor)
        };

        out.push((name, &raw_tag[value_start..value_end]));
    }

    out
}

fn local_name(name: &str) -> &str {
    name.rsplit(':').next().unwrap_or(name)
}

/// Index of the `>` closing the tag opened at `start`. `>` inside a quoted
/// attribute value does not count.
fn find_tag_end(xml: &str, start: usize) -> Option<usize> {
    let mut quote: Option<u8> = None;
    for (offset, byte) in xml.as_bytes()[start..].iter().enumerate() {
        match (quote, *byte) {
            (Some(q), b) if b == q => quote = None,
            (Some(_), _) => {}
            (None, b'"' | b'\'') => quote = Some(*byte),
            (None, b'>') => return Some(start + offset),
            (None, _) => {}
        }
    }
    None
}

/// Decodes the predefined entities and numeric character references.
/// Anything unrecognised is kept verbatim.
fn xml_unescape(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        rest = &rest[amp..];

        let decoded = rest
            .find(';')
            .and_then(|semi| decode_entity(&rest[1..semi]).map(|ch| (ch, semi)));
        match decoded {
            Some((ch, semi)) => {
                out.push(ch);
                rest = &rest[semi + 1..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }

    out.push_str(rest);
    out
}

fn decode_entity(name: &str) -> Option<char> {
    match name {
        "lt" => Some('<'),
        "gt" => Some('>'),
        "amp" => Some('&'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        _ => {
            let number = name.strip_prefix('#')?;
            let code = match number.strip_prefix(['x', 'X']) {
                Some(hex) => u32::from_str_radix(hex, 16).ok()?,
                None => number.parse::<u32>().ok()?,
            };
            char::from_u32(code)
        }
    }
}
