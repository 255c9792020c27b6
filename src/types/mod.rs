use crate::errors::Error;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Attribute types understood by the scan filter and the executor. Ints and
/// floats are fixed 4-byte little-endian fields; strings are schema-sized,
/// NUL-padded byte blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataType {
    Str,
    Int,
    Float,
}

impl DataType {
    pub fn fixed_size(&self) -> Option<usize> {
        match self {
            DataType::Int => Some(std::mem::size_of::<i32>()),
            DataType::Float => Some(std::mem::size_of::<f32>()),
            DataType::Str => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operator {
    Lt,
    Lte,
    Eq,
    Gte,
    Gt,
    Ne,
}

impl Operator {
    pub fn matches(&self, ord: Ordering) -> bool {
        match self {
            Operator::Lt => ord == Ordering::Less,
            Operator::Lte => ord != Ordering::Greater,
            Operator::Eq => ord == Ordering::Equal,
            Operator::Gte => ord != Ordering::Less,
            Operator::Gt => ord == Ordering::Greater,
            Operator::Ne => ord != Ordering::Equal,
        }
    }
}

/// Encode a textual attribute value into its fixed-width on-record bytes.
pub fn encode_value(ty: DataType, len: usize, value: &str) -> Result<Vec<u8>, Error> {
    match ty {
        DataType::Int => {
            let parsed: i32 = value
                .trim()
                .parse()
                .map_err(|_| Error::BadAttrValue(value.to_string()))?;
            Ok(parsed.to_le_bytes().to_vec())
        }
        DataType::Float => {
            let parsed: f32 = value
                .trim()
                .parse()
                .map_err(|_| Error::BadAttrValue(value.to_string()))?;
            Ok(parsed.to_le_bytes().to_vec())
        }
        DataType::Str => {
            let mut bytes = vec![0u8; len];
            let copied = value.len().min(len);
            bytes[..copied].copy_from_slice(&value.as_bytes()[..copied]);
            Ok(bytes)
        }
    }
}
