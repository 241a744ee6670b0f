// Interface descriptors
//
// The input interface tells clients which form fields to send and how to
// present them; the output interface tells the server which sample fields
// to return and how to encode them.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Widget / payload type of an input field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputKind {
    /// Binary volume, base64 in the form field
    Volume,
    /// Floating point value
    Slider,
    Checkbox,
    Radiobutton,
    /// `x,y,z;x,y,z`
    Fiducials,
    /// `<ext>\n<base64>` with ext one of nii.gz, h5, mat
    Transform,
}

/// One input field descriptor.
///
/// Presentation hints (`minimum`, `maximum`, `text`, `options`, ...) are
/// kept as-is so `/interface` returns exactly what was configured.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputField {
    #[serde(rename = "type")]
    pub kind: InputKind,
    pub destination: String,
    #[serde(flatten)]
    pub constraints: Map<String, Value>,
}

impl InputField {
    pub fn new(kind: InputKind, destination: impl Into<String>) -> Self {
        Self {
            kind,
            destination: destination.into(),
            constraints: Map::new(),
        }
    }

    /// Builder-style presentation hint.
    pub fn hint(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.constraints.insert(key.into(), value.into());
        self
    }
}

/// Ordered input descriptors, serialized as a bare JSON array.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InputInterface(pub Vec<InputField>);

impl InputInterface {
    pub fn fields(&self) -> &[InputField] {
        &self.0
    }
}

impl From<Vec<InputField>> for InputInterface {
    fn from(fields: Vec<InputField>) -> Self {
        Self(fields)
    }
}

/// Encoding of a returned field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutputKind {
    LabelVolume,
    #[serde(rename = "VTKMesh")]
    VtkMesh,
    PlainText,
    Fiducials,
    TransformGrid,
    TransformBSpline,
    TransformLinear,
}

impl OutputKind {
    /// Kinds whose content is a base64-encoded binary blob.
    pub fn is_binary(&self) -> bool {
        !matches!(self, OutputKind::PlainText | OutputKind::Fiducials)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputField {
    #[serde(rename = "type")]
    pub kind: OutputKind,
    /// Sample field the content is read from
    pub field: String,
    #[serde(default)]
    pub label: String,
}

impl OutputField {
    pub fn new(kind: OutputKind, field: impl Into<String>) -> Self {
        Self {
            kind,
            field: field.into(),
            label: String::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OutputInterface(pub Vec<OutputField>);

impl OutputInterface {
    pub fn fields(&self) -> &[OutputField] {
        &self.0
    }
}

impl From<Vec<OutputField>> for OutputInterface {
    fn from(fields: Vec<OutputField>) -> Self {
        Self(fields)
    }
}
