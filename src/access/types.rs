//! Column types and field values.
//!
//! Every type has a fixed on-disk length so that a row of a given schema
//! always occupies the same number of bytes. Integers are written big-endian.
//! Text is written as a big-endian byte length followed by exactly
//! [`TEXT_LEN`] payload bytes, zero padded.

use crate::error::{DbError, DbResult};
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::{Read, Write};

/// Maximum number of payload bytes in a text field.
pub const TEXT_LEN: usize = 128;

/// Column types supported by the storage layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Type {
    Int,
    Text,
}

impl Type {
    /// Number of bytes a value of this type occupies on disk.
    pub fn byte_len(&self) -> usize {
        match self {
            Type::Int => 4,
            Type::Text => 4 + TEXT_LEN,
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Type::Int)
    }

    /// Read one value of this type.
    pub fn read_field<R: Read>(&self, reader: &mut R) -> DbResult<Field> {
        match self {
            Type::Int => {
                let value = reader.read_i32::<BigEndian>().map_err(truncated)?;
                Ok(Field::Int(value))
            }
            Type::Text => {
                let len = reader.read_i32::<BigEndian>().map_err(truncated)?;
                if len < 0 || len as usize > TEXT_LEN {
                    return Err(DbError::Format(format!("text length {} out of range", len)));
                }
                let mut payload = [0u8; TEXT_LEN];
                reader.read_exact(&mut payload).map_err(truncated)?;
                let text = std::str::from_utf8(&payload[..len as usize])
                    .map_err(|e| DbError::Format(format!("invalid text: {}", e)))?;
                Ok(Field::Text(text.to_string()))
            }
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Int => write!(f, "INT"),
            Type::Text => write!(f, "TEXT"),
        }
    }
}

fn truncated(e: std::io::Error) -> DbError {
    DbError::Format(format!("truncated field: {}", e))
}

/// Longest prefix of `s` that fits in a text field without splitting a
/// character.
fn fit_text(s: &str) -> &str {
    if s.len() <= TEXT_LEN {
        return s;
    }
    let mut end = TEXT_LEN;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// A typed value. Ordering and hashing are structural so fields can be used
/// directly as grouping keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Field {
    Int(i32),
    Text(String),
}

impl Field {
    /// Build a text field, truncating to [`TEXT_LEN`] bytes.
    pub fn text(s: impl AsRef<str>) -> Self {
        Field::Text(fit_text(s.as_ref()).to_string())
    }

    pub fn field_type(&self) -> Type {
        match self {
            Field::Int(_) => Type::Int,
            Field::Text(_) => Type::Text,
        }
    }

    pub fn as_int(&self) -> Option<i32> {
        match self {
            Field::Int(v) => Some(*v),
            Field::Text(_) => None,
        }
    }

    /// Write this value in its fixed-length encoding.
    pub fn write_to<W: Write>(&self, writer: &mut W) -> DbResult<()> {
        match self {
            Field::Int(v) => writer.write_i32::<BigEndian>(*v)?,
            Field::Text(s) => {
                let bytes = fit_text(s).as_bytes();
                writer.write_i32::<BigEndian>(bytes.len() as i32)?;
                writer.write_all(bytes)?;
                writer.write_all(&[0u8; TEXT_LEN][..TEXT_LEN - bytes.len()])?;
            }
        }
        Ok(())
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Field::Int(v) => write!(f, "{}", v),
            Field::Text(s) => write!(f, "{}", s),
        }
    }
}
