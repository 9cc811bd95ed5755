//! Placeholder expansion.
//!
//! A rendered fragment may still contain two kinds of markers:
//!
//! - `${key}` is replaced by the record value verbatim (identifiers, table
//!   names, anything that cannot be bound).
//! - `#{key}` is replaced by a positional token and the value is appended to
//!   the parameter list.
//!
//! In [`Mode::Batch`] every key addresses one record of the argument sequence
//! as `@<index>.<name>`.

use sqlp_config::Placeholder;

use crate::{
    error::{Result, SqlpError},
    value::{Record, Value},
};

const INLINE_OPEN: &str = "${";
const BOUND_OPEN: &str = "#{";
const CLOSE: &str = "}";

/// How marker keys are resolved against the argument records.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Mode {
    /// Keys are looked up in the first (and only) record.
    #[default]
    Normal,

    /// Keys are `@<index>.<name>` over the ordered record sequence.
    Batch,
}

/// Expands both marker kinds in `text` and returns the final SQL with its
/// ordered parameter list.
///
/// Line breaks in the result are replaced by spaces.
pub fn expand(
    text: &str,
    mode: Mode,
    records: &[Record],
    placeholder: Placeholder,
) -> Result<(String, Vec<Value>)> {
    let inlined = replace_markers(text, INLINE_OPEN, |key| {
        match resolve(key, mode, records)? {
            Some(value) => value.as_text().ok_or_else(|| {
                SqlpError::Type(format!(
                    "the '{key}' must be text or bytes, found {}",
                    value.kind()
                ))
            }),
            None => Ok(String::new()),
        }
    })?;

    let mut params = Vec::new();
    let mut tokens = 0;
    let sql = replace_markers(&inlined, BOUND_OPEN, |key| {
        if let Some(value) = resolve(key, mode, records)? {
            params.push(value.clone());
        }
        let token = placeholder.token(tokens);
        tokens += 1;
        Ok(token.into_owned())
    })?;

    Ok((sql.replace(['\r', '\n'], " "), params))
}

/// Scans `text` left to right for `open ... }` and replaces each occurrence
/// with the output of `f`. Stops at the first open delimiter that has no
/// closing brace, leaving the rest of the text untouched.
fn replace_markers<F>(text: &str, open: &str, mut f: F) -> Result<String>
where
    F: FnMut(&str) -> Result<String>,
{
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(start) = rest.find(open) {
        let key_start = start + open.len();
        let Some(len) = rest[key_start..].find(CLOSE) else {
            break;
        };

        out.push_str(&rest[..start]);
        out.push_str(&f(&rest[key_start..key_start + len])?);
        rest = &rest[key_start + len + CLOSE.len()..];
    }

    out.push_str(rest);
    Ok(out)
}

/// Looks up the value a marker key refers to. `Ok(None)` means the key is
/// absent, which is not an error.
fn resolve<'r>(key: &str, mode: Mode, records: &'r [Record]) -> Result<Option<&'r Value>> {
    match mode {
        Mode::Normal => Ok(records.first().and_then(|record| record.get(key))),
        Mode::Batch => {
            if records.is_empty() {
                return Ok(None);
            }
            let (index, name) = split_batch_key(key)?;
            let record = records.get(index).ok_or_else(|| {
                SqlpError::Format(format!(
                    "{key} (index {index} out of {} records)",
                    records.len()
                ))
            })?;
            Ok(record.get(name))
        }
    }
}

fn split_batch_key(key: &str) -> Result<(usize, &str)> {
    let mut segments = key.split('.');
    let (Some(index), Some(name), None) = (segments.next(), segments.next(), segments.next())
    else {
        return Err(SqlpError::Format(key.to_string()));
    };

    let index = index.strip_prefix('@').unwrap_or(index);
    let index = index
        .parse::<usize>()
        .map_err(|_| SqlpError::Format(key.to_string()))?;

    Ok((index, name))
}
