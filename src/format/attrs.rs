//! Attribute encoding for the container metadata.
//!
//! Every metadata attribute is stored as UTF-8 text. [`encode_to_utf8`] maps the value
//! kinds the formatter writes onto UTF-8 byte sequences:
//!
//! - text → its UTF-8 bytes
//! - a sequence of texts → one UTF-8 entry per element
//! - a boolean → `"True"`/`"False"`, then encoded
//!
//! [`decode_utf8`] is the exact inverse. Booleans round-trip through the tokens
//! `"True"`/`"False"` and nothing else: [`str_to_bool`] rejects every other token.
//!
//! Units with several entries, and the metadata lists of the single-table layout, are
//! stored as Python list literals (`['V', 'A']`); [`list_repr`] and [`parse_list_repr`]
//! convert between that form and Rust vectors.

use crate::error::{AppResult, DaqError};

/// Attribute value before encoding.
#[derive(Debug, Clone, PartialEq)]
pub enum AttrValue {
    /// A single text value.
    Text(String),
    /// An ordered list of texts.
    TextList(Vec<String>),
    /// A boolean, stringified as `"True"`/`"False"`.
    Bool(bool),
}

impl From<&str> for AttrValue {
    fn from(value: &str) -> Self {
        AttrValue::Text(value.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(value: String) -> Self {
        AttrValue::Text(value)
    }
}

impl From<Vec<String>> for AttrValue {
    fn from(value: Vec<String>) -> Self {
        AttrValue::TextList(value)
    }
}

impl From<bool> for AttrValue {
    fn from(value: bool) -> Self {
        AttrValue::Bool(value)
    }
}

/// UTF-8 encoded attribute payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Encoded {
    /// One byte sequence.
    Scalar(Vec<u8>),
    /// One byte sequence per list element.
    List(Vec<Vec<u8>>),
}

/// Encode an attribute value as UTF-8 bytes.
pub fn encode_to_utf8(value: &AttrValue) -> Encoded {
    match value {
        AttrValue::Text(text) => Encoded::Scalar(text.as_bytes().to_vec()),
        AttrValue::TextList(items) => {
            Encoded::List(items.iter().map(|s| s.as_bytes().to_vec()).collect())
        }
        AttrValue::Bool(flag) => Encoded::Scalar(bool_to_str(*flag).as_bytes().to_vec()),
    }
}

/// Decode a stored UTF-8 byte sequence.
///
/// # Errors
///
/// Returns [`DaqError::Decode`] if the bytes are not valid UTF-8.
pub fn decode_utf8(bytes: &[u8]) -> AppResult<String> {
    String::from_utf8(bytes.to_vec())
        .map_err(|e| DaqError::Decode(format!("attribute is not valid UTF-8: {}", e)))
}

/// Token stored for a boolean.
pub fn bool_to_str(value: bool) -> &'static str {
    if value {
        "True"
    } else {
        "False"
    }
}

/// Parse the exact tokens `"True"` and `"False"`.
///
/// # Errors
///
/// Returns [`DaqError::InvalidBool`] for any other token, including `"true"` or `"1"`.
pub fn str_to_bool(value: &str) -> AppResult<bool> {
    match value {
        "True" => Ok(true),
        "False" => Ok(false),
        other => Err(DaqError::InvalidBool(other.to_string())),
    }
}

/// Render texts as a Python list literal, e.g. `['V', 'A']`.
pub fn list_repr<S: AsRef<str>>(items: &[S]) -> String {
    let quoted: Vec<String> = items.iter().map(|s| quote(s.as_ref())).collect();
    format!("[{}]", quoted.join(", "))
}

fn quote(text: &str) -> String {
    let delimiter = if text.contains('\'') && !text.contains('"') {
        '"'
    } else {
        '\''
    };
    let mut out = String::with_capacity(text.len() + 2);
    out.push(delimiter);
    for c in text.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            c if c == delimiter => {
                out.push('\\');
                out.push(c);
            }
            c => out.push(c),
        }
    }
    out.push(delimiter);
    out
}

/// Entry of a list literal, before `None` handling.
enum ListItem {
    Quoted(String),
    Bare(String),
}

/// Parse a flat Python list literal of strings and `None`s.
///
/// Unquoted entries other than `None` (numbers, nested lists) are kept verbatim.
/// Returns `None` if `text` is not a list literal.
pub fn parse_list_repr(text: &str) -> Option<Vec<Option<String>>> {
    let items = parse_list_items(text)?
        .into_iter()
        .map(|item| match item {
            ListItem::Quoted(text) => Some(text),
            ListItem::Bare(token) => (token != "None").then_some(token),
        })
        .collect();
    Some(items)
}

fn parse_list_items(text: &str) -> Option<Vec<ListItem>> {
    let inner = text.trim().strip_prefix('[')?.strip_suffix(']')?;
    let mut chars = inner.chars().peekable();
    let mut items = Vec::new();

    loop {
        while chars.next_if(|c| c.is_whitespace()).is_some() {}
        match chars.peek().copied() {
            None => break,
            Some(delimiter @ ('\'' | '"')) => {
                chars.next();
                let mut item = String::new();
                loop {
                    match chars.next()? {
                        '\\' => match chars.next()? {
                            'n' => item.push('\n'),
                            't' => item.push('\t'),
                            other => item.push(other),
                        },
                        c if c == delimiter => break,
                        c => item.push(c),
                    }
                }
                items.push(ListItem::Quoted(item));
            }
            Some(_) => {
                let mut token = String::new();
                let mut depth = 0usize;
                while let Some(&c) = chars.peek() {
                    match c {
                        ',' if depth == 0 => break,
                        '[' | '(' => depth += 1,
                        ']' | ')' => depth = depth.saturating_sub(1),
                        _ => {}
                    }
                    token.push(c);
                    chars.next();
                }
                items.push(ListItem::Bare(token.trim().to_string()));
            }
        }
        while chars.next_if(|c| c.is_whitespace()).is_some() {}
        match chars.next() {
            None => break,
            Some(',') => continue,
            Some(_) => return None,
        }
    }
    Some(items)
}

/// Text stored in the `units` attribute.
///
/// No units store `""`, one unit stores the unit itself, several store a list literal.
/// A single unit that itself starts with `[` is stored as a one-element list literal so
/// it reads back unchanged.
pub fn units_to_attr(units: Option<&[String]>) -> String {
    match units {
        None => String::new(),
        Some([unit]) if !unit.trim_start().starts_with('[') => unit.clone(),
        Some(units) => list_repr(units),
    }
}

/// Units recovered from the `units` attribute.
pub fn units_from_attr(text: &str) -> Option<Vec<String>> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }
    // Only a list of quoted entries is a list; `[a.u.]` is a unit.
    let quoted = parse_list_items(trimmed).and_then(|items| {
        items
            .into_iter()
            .map(|item| match item {
                ListItem::Quoted(unit) => Some(unit),
                ListItem::Bare(_) => None,
            })
            .collect::<Option<Vec<String>>>()
    });
    if let Some(units) = quoted {
        return if units.iter().all(String::is_empty) {
            None
        } else {
            Some(units)
        };
    }
    Some(vec![text.to_string()])
}

#[cfg(feature = "storage_hdf5")]
pub(crate) use self::hdf5_attrs::{has_attr, read_text_attr, read_text_list_attr, write_text_attr};

#[cfg(feature = "storage_hdf5")]
mod hdf5_attrs {
    use super::{decode_utf8, encode_to_utf8, AttrValue, Encoded};
    use crate::error::{AppResult, DaqError};
    use hdf5::types::{FixedAscii, FixedUnicode, TypeDescriptor, VarLenAscii, VarLenUnicode};
    use hdf5::Location;
    use ndarray::ArrayView1;
    use std::str::FromStr;

    /// Upper bound for reading fixed-length strings written by other tools.
    const FIXED_TEXT_CAPACITY: usize = 1024;

    fn to_var_len_unicode(bytes: &[u8]) -> AppResult<VarLenUnicode> {
        let text = decode_utf8(bytes)?;
        VarLenUnicode::from_str(&text)
            .map_err(|e| DaqError::Decode(format!("cannot store attribute text: {}", e)))
    }

    pub(crate) fn has_attr(location: &Location, name: &str) -> AppResult<bool> {
        Ok(location.attr_names()?.iter().any(|n| n == name))
    }

    pub(crate) fn write_text_attr(location: &Location, name: &str, value: &AttrValue) -> AppResult<()> {
        match encode_to_utf8(value) {
            Encoded::Scalar(bytes) => {
                let text = to_var_len_unicode(&bytes)?;
                location
                    .new_attr::<VarLenUnicode>()
                    .create(name)?
                    .write_scalar(&text)?;
            }
            Encoded::List(entries) => {
                let values = entries
                    .iter()
                    .map(|bytes| to_var_len_unicode(bytes))
                    .collect::<AppResult<Vec<_>>>()?;
                let attr = location
                    .new_attr::<VarLenUnicode>()
                    .shape((values.len(),))
                    .create(name)?;
                if !values.is_empty() {
                    attr.write(ArrayView1::from(values.as_slice()))?;
                }
            }
        }
        Ok(())
    }

    macro_rules! read_scalar_bytes {
        ($attr:expr, $ty:ty) => {
            $attr.read_scalar::<$ty>()?.as_bytes().to_vec()
        };
    }

    macro_rules! read_list_bytes {
        ($attr:expr, $ty:ty) => {
            $attr
                .read_raw::<$ty>()?
                .iter()
                .map(|v| v.as_bytes().to_vec())
                .collect::<Vec<_>>()
        };
    }

    fn unsupported(name: &str, descriptor: &TypeDescriptor) -> DaqError {
        DaqError::Decode(format!(
            "attribute '{}' has non-text type {:?}",
            name, descriptor
        ))
    }

    /// Read a scalar text attribute, whatever string flavour it was stored with.
    pub(crate) fn read_text_attr(location: &Location, name: &str) -> AppResult<Option<String>> {
        if !has_attr(location, name)? {
            return Ok(None);
        }
        let attr = location.attr(name)?;
        let descriptor = attr.dtype()?.to_descriptor()?;
        let bytes = match descriptor {
            TypeDescriptor::VarLenUnicode => read_scalar_bytes!(attr, VarLenUnicode),
            TypeDescriptor::VarLenAscii => read_scalar_bytes!(attr, VarLenAscii),
            TypeDescriptor::FixedAscii(_) => read_scalar_bytes!(attr, FixedAscii<FIXED_TEXT_CAPACITY>),
            TypeDescriptor::FixedUnicode(_) => {
                read_scalar_bytes!(attr, FixedUnicode<FIXED_TEXT_CAPACITY>)
            }
            other => return Err(unsupported(name, &other)),
        };
        decode_utf8(&bytes).map(Some)
    }

    /// Read a one-dimensional text list attribute. A scalar reads as one entry.
    pub(crate) fn read_text_list_attr(
        location: &Location,
        name: &str,
    ) -> AppResult<Option<Vec<String>>> {
        if !has_attr(location, name)? {
            return Ok(None);
        }
        let attr = location.attr(name)?;
        if attr.ndim() == 0 {
            return read_text_attr(location, name).map(|text| text.map(|t| vec![t]));
        }
        if attr.size() == 0 {
            return Ok(Some(Vec::new()));
        }
        let descriptor = attr.dtype()?.to_descriptor()?;
        let entries = match descriptor {
            TypeDescriptor::VarLenUnicode => read_list_bytes!(attr, VarLenUnicode),
            TypeDescriptor::VarLenAscii => read_list_bytes!(attr, VarLenAscii),
            TypeDescriptor::FixedAscii(_) => read_list_bytes!(attr, FixedAscii<FIXED_TEXT_CAPACITY>),
            TypeDescriptor::FixedUnicode(_) => {
                read_list_bytes!(attr, FixedUnicode<FIXED_TEXT_CAPACITY>)
            }
            other => return Err(unsupported(name, &other)),
        };
        entries
            .iter()
            .map(|bytes| decode_utf8(bytes))
            .collect::<AppResult<Vec<_>>>()
            .map(Some)
    }
}
