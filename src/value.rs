//! Scalar values and their canonical text encoding
//!
//! Every stored result carries exactly one scalar, persisted as a pair of
//! columns: the canonical text and a type tag.
//! - `int`: base-10 `i64`
//! - `float`: shortest round-trip `f64` text
//! - `str`: verbatim text
//!
//! Collections never reach the codec directly; they are flattened by
//! [`CollectionSerializer`](crate::collection::CollectionSerializer) first.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The stored type tag of a scalar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    Int,
    Float,
    Str,
}

impl ValueType {
    /// Get the on-disk representation of the type tag
    pub fn as_str(&self) -> &'static str {
        match self {
            ValueType::Int => "int",
            ValueType::Float => "float",
            ValueType::Str => "str",
        }
    }

    pub fn all() -> &'static [ValueType] {
        &[ValueType::Int, ValueType::Float, ValueType::Str]
    }
}

impl FromStr for ValueType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "int" => Ok(ValueType::Int),
            "float" => Ok(ValueType::Float),
            "str" => Ok(ValueType::Str),
            _ => Err(Error::UnknownValueType(s.to_string())),
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single typed value attached to a result row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum ScalarValue {
    Integer(i64),
    Float(f64),
    Text(String),
}

impl ScalarValue {
    pub fn value_type(&self) -> ValueType {
        match self {
            ScalarValue::Integer(_) => ValueType::Int,
            ScalarValue::Float(_) => ValueType::Float,
            ScalarValue::Text(_) => ValueType::Str,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ScalarValue::Integer(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ScalarValue::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            ScalarValue::Text(v) => Some(v),
            _ => None,
        }
    }
}

impl fmt::Display for ScalarValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScalarValue::Integer(v) => write!(f, "{}", v),
            ScalarValue::Float(v) => write!(f, "{}", v),
            ScalarValue::Text(v) => write!(f, "{:?}", v),
        }
    }
}

impl From<i64> for ScalarValue {
    fn from(v: i64) -> Self {
        ScalarValue::Integer(v)
    }
}

impl From<i32> for ScalarValue {
    fn from(v: i32) -> Self {
        ScalarValue::Integer(v.into())
    }
}

impl From<f64> for ScalarValue {
    fn from(v: f64) -> Self {
        ScalarValue::Float(v)
    }
}

impl From<&str> for ScalarValue {
    fn from(v: &str) -> Self {
        ScalarValue::Text(v.to_string())
    }
}

impl From<String> for ScalarValue {
    fn from(v: String) -> Self {
        ScalarValue::Text(v)
    }
}

/// A producer-side value: a scalar or an arbitrarily nested sequence.
///
/// Nesting is unrestricted here so that unsupported shapes (ragged rows,
/// three or more dimensions) can be detected and rejected at insertion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Datum {
    Scalar(ScalarValue),
    Sequence(Vec<Datum>),
}

impl Datum {
    pub fn is_scalar(&self) -> bool {
        matches!(self, Datum::Scalar(_))
    }

    pub fn as_scalar(&self) -> Option<&ScalarValue> {
        match self {
            Datum::Scalar(v) => Some(v),
            Datum::Sequence(_) => None,
        }
    }

    pub fn as_sequence(&self) -> Option<&[Datum]> {
        match self {
            Datum::Scalar(_) => None,
            Datum::Sequence(items) => Some(items),
        }
    }
}

impl From<ScalarValue> for Datum {
    fn from(v: ScalarValue) -> Self {
        Datum::Scalar(v)
    }
}

macro_rules! scalar_datum_from {
    ($($t:ty),*) => {
        $(
            impl From<$t> for Datum {
                fn from(v: $t) -> Self {
                    Datum::Scalar(v.into())
                }
            }
        )*
    };
}

scalar_datum_from!(i64, i32, f64, &str, String);

impl From<Vec<Datum>> for Datum {
    fn from(items: Vec<Datum>) -> Self {
        Datum::Sequence(items)
    }
}

/// Build a [`Datum::Sequence`] from heterogeneous literals.
///
/// ```
/// use data_manager::{datum, Datum};
/// let row = datum![1, "test", 0.25];
/// assert_eq!(row.as_sequence().map(|s| s.len()), Some(3));
/// let matrix = datum![datum![1, 2], datum!["3", 4]];
/// assert!(!matrix.is_scalar());
/// ```
#[macro_export]
macro_rules! datum {
    ($($item:expr),* $(,)?) => {
        $crate::Datum::Sequence(vec![$($crate::Datum::from($item)),*])
    };
}

/// Encoder/decoder between [`ScalarValue`] and its stored text form.
pub struct ValueCodec;

impl ValueCodec {
    /// Encode a producer value. Sequences must go through the collection
    /// serializer and are rejected here.
    pub fn encode(datum: &Datum) -> Result<(ValueType, String)> {
        match datum {
            Datum::Scalar(value) => Ok(Self::encode_scalar(value)),
            Datum::Sequence(items) => Err(Error::UnsupportedValueKind(format!(
                "sequence of {} elements; store collections with insert_collection",
                items.len()
            ))),
        }
    }

    /// Encode a scalar to its type tag and canonical text
    pub fn encode_scalar(value: &ScalarValue) -> (ValueType, String) {
        let text = match value {
            ScalarValue::Integer(v) => v.to_string(),
            // Display for f64 is the shortest text that parses back to the same bits
            ScalarValue::Float(v) => v.to_string(),
            ScalarValue::Text(v) => v.clone(),
        };
        (value.value_type(), text)
    }

    /// Decode stored text according to its type tag
    pub fn decode(value_type: ValueType, text: &str) -> Result<ScalarValue> {
        match value_type {
            ValueType::Int => text
                .parse::<i64>()
                .map(ScalarValue::Integer)
                .map_err(|_| Error::InvalidEncoding(format!("'{}' is not an int", text))),
            ValueType::Float => text
                .parse::<f64>()
                .map(ScalarValue::Float)
                .map_err(|_| Error::InvalidEncoding(format!("'{}' is not a float", text))),
            ValueType::Str => Ok(ScalarValue::Text(text.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(value: ScalarValue) -> ScalarValue {
        let (tag, text) = ValueCodec::encode_scalar(&value);
        ValueCodec::decode(tag, &text).unwrap()
    }

    #[test]
    fn test_value_type_roundtrip() {
        for value_type in ValueType::all() {
            let parsed: ValueType = value_type.as_str().parse().unwrap();
            assert_eq!(*value_type, parsed);
        }
        assert!(matches!("list".parse::<ValueType>(), Err(Error::UnknownValueType(_))));
    }

    #[test]
    fn test_integer_roundtrip() {
        for v in [0i64, 1, -1, 42, i64::MIN, i64::MAX] {
            assert_eq!(roundtrip(ScalarValue::Integer(v)), ScalarValue::Integer(v));
        }
    }

    #[test]
    fn test_float_roundtrip_preserves_bits() {
        let samples = [
            0.0f64,
            -0.0,
            0.25,
            -21.34,
            0.1 + 0.2,
            1e-300,
            6.02214076e23,
            f64::MAX,
            f64::INFINITY,
            f64::NEG_INFINITY,
        ];
        for v in samples {
            let decoded = roundtrip(ScalarValue::Float(v));
            assert_eq!(decoded.as_f64().unwrap().to_bits(), v.to_bits(), "value {v}");
        }
    }

    #[test]
    fn test_text_roundtrip() {
        for v in ["", "Doublet", "  padded  ", "4", "line\nbreak"] {
            assert_eq!(roundtrip(ScalarValue::from(v)), ScalarValue::from(v));
        }
    }

    #[test]
    fn test_encoded_tags() {
        assert_eq!(ValueCodec::encode_scalar(&1.into()), (ValueType::Int, "1".to_string()));
        assert_eq!(ValueCodec::encode_scalar(&0.25.into()), (ValueType::Float, "0.25".to_string()));
        assert_eq!(ValueCodec::encode_scalar(&"4".into()), (ValueType::Str, "4".to_string()));
    }

    #[test]
    fn test_sequence_is_rejected() {
        let err = ValueCodec::encode(&datum![1, 2]).unwrap_err();
        assert!(matches!(err, Error::UnsupportedValueKind(_)));

        let ok = ValueCodec::encode(&Datum::from(-3)).unwrap();
        assert_eq!(ok, (ValueType::Int, "-3".to_string()));
    }

    #[test]
    fn test_malformed_text() {
        let int = ValueCodec::decode(ValueType::Int, "1.5");
        assert!(matches!(int, Err(Error::InvalidEncoding(_))));
        let float = ValueCodec::decode(ValueType::Float, "abc");
        assert!(matches!(float, Err(Error::InvalidEncoding(_))));
    }
}
