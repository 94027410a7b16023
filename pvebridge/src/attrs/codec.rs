//! Table-driven encode/decode of property strings.

use super::{Access, AttributeRecord, Field, Result, LIST_SEPARATOR, PAIR_SEPARATOR};
use crate::error::AttrError;

/// Encode a record as `name=value` pairs joined by `,`, in descriptor order.
///
/// Empty strings, empty sequences and absent optionals are omitted. Nothing is
/// returned on error, not even a prefix of the output.
pub fn encode<R: AttributeRecord>(record: &R) -> Result<String> {
    let mut pairs = Vec::new();

    for field in R::fields().iter().filter(|f| f.is_mapped()) {
        if let Some(value) = render(field, record)? {
            pairs.push(format!("{}={}", field.name, value));
        }
    }

    Ok(pairs.join(&PAIR_SEPARATOR.to_string()))
}

/// Decode a property string into a default record.
pub fn decode<R: AttributeRecord>(input: &str) -> Result<R> {
    let mut record = R::default();
    decode_into(input, &mut record)?;
    Ok(record)
}

/// Decode a property string on top of an existing record.
///
/// Only fields named in `input` are touched. On error `record` may hold the
/// fields applied before the failing pair.
pub fn decode_into<R: AttributeRecord>(input: &str, record: &mut R) -> Result<()> {
    for pair in input.split(PAIR_SEPARATOR) {
        // Bare values (positional defaults like `agent: 1`) carry no key.
        let Some((key, value)) = pair.trim().split_once('=') else {
            continue;
        };

        for field in R::fields() {
            if field.is_mapped() && field.name.eq_ignore_ascii_case(key) {
                apply(field, value, record)?;
            }
        }
    }

    Ok(())
}

fn render<R>(field: &Field<R>, record: &R) -> Result<Option<String>> {
    let value = match &field.access {
        Access::Bool { get, .. } => Some(get(record).to_string()),
        Access::Str { get, .. } => {
            let value = get(record).trim();
            (!value.is_empty()).then(|| value.to_string())
        }
        Access::Int { get, .. } => get(record).map(|v| v.to_string()),
        Access::Flag { get, .. } => get(record).map(|v| if v { "1" } else { "0" }.to_string()),
        Access::StrList { get, .. } => {
            let values = get(record);
            (!values.is_empty()).then(|| values.join(&LIST_SEPARATOR.to_string()))
        }
        Access::IntList { get, .. } => {
            let values = get(record);
            (!values.is_empty()).then(|| {
                values
                    .iter()
                    .map(i64::to_string)
                    .collect::<Vec<_>>()
                    .join(&LIST_SEPARATOR.to_string())
            })
        }
        Access::Opaque { type_name } => {
            return Err(AttrError::Encode {
                field: field.name.to_string(),
                reason: format!("unsupported field type {}", type_name),
            });
        }
    };

    Ok(value)
}

fn apply<R>(field: &Field<R>, value: &str, record: &mut R) -> Result<()> {
    match &field.access {
        Access::Bool { set, .. } => set(record, value == "true"),
        Access::Str { set, .. } => set(record, value.trim().to_string()),
        Access::Int { set, .. } => set(record, parse_int(field, value, value)?),
        Access::Flag { set, .. } => set(record, value == "1" || value == "true"),
        Access::StrList { set, .. } => {
            set(record, value.split(LIST_SEPARATOR).map(str::to_string).collect())
        }
        Access::IntList { set, .. } => {
            let values = value
                .split(LIST_SEPARATOR)
                .map(|item| parse_int(field, value, item))
                .collect::<Result<Vec<_>>>()?;
            set(record, values)
        }
        Access::Opaque { type_name } => {
            return Err(AttrError::Decode {
                field: field.name.to_string(),
                value: value.to_string(),
                reason: format!("unsupported field type {}", type_name),
            });
        }
    }

    Ok(())
}

/// Strict decimal: no surrounding whitespace, no empty items.
fn parse_int<R>(field: &Field<R>, value: &str, item: &str) -> Result<i64> {
    item.parse::<i64>().map_err(|e| AttrError::Decode {
        field: field.name.to_string(),
        value: value.to_string(),
        reason: format!("failed to parse int value '{}': {}", item, e),
    })
}
