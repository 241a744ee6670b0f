// Sample: the data flowing through a pipeline
//
// A request is parsed into a Sample keyed by interface destination; stages
// transform it; the output interface reads fields back out of it.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

/// One value carried by a [`Sample`] field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// Binary payload materialised in the request's scratch directory
    File(PathBuf),
    /// Binary payload held in memory
    Bytes(Vec<u8>),
    Number(f64),
    Text(String),
    /// Point list, e.g. fiducial coordinates
    Points(Vec<Vec<f64>>),
}

impl FieldValue {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            FieldValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_points(&self) -> Option<&[Vec<f64>]> {
        match self {
            FieldValue::Points(p) => Some(p),
            _ => None,
        }
    }

    /// Short name of the variant, used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            FieldValue::File(_) => "file",
            FieldValue::Bytes(_) => "bytes",
            FieldValue::Number(_) => "number",
            FieldValue::Text(_) => "text",
            FieldValue::Points(_) => "points",
        }
    }
}

/// Render points as `x,y,z;x,y,z`.
pub fn format_points(points: &[Vec<f64>]) -> String {
    points
        .iter()
        .map(|p| {
            p.iter()
                .map(|v| v.to_string())
                .collect::<Vec<_>>()
                .join(",")
        })
        .collect::<Vec<_>>()
        .join(";")
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::File(path) => write!(f, "{}", path.display()),
            FieldValue::Bytes(bytes) => write!(f, "<{} bytes>", bytes.len()),
            FieldValue::Number(n) => write!(f, "{}", n),
            FieldValue::Text(s) => f.write_str(s),
            FieldValue::Points(points) => f.write_str(&format_points(points)),
        }
    }
}

/// Named fields handed from stage to stage.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Sample {
    fields: BTreeMap<String, FieldValue>,
}

impl Sample {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, name: impl Into<String>, value: FieldValue) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: FieldValue) -> Option<FieldValue> {
        self.fields.insert(name.into(), value)
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    pub fn take(&mut self, name: &str) -> Option<FieldValue> {
        self.fields.remove(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }
}
