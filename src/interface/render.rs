// Response rendering: Sample → wire items

use super::response::ResponseItem;
use super::descriptor::{OutputInterface, OutputKind};
use crate::pipeline::{format_points, FieldValue, Sample};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("pipeline result has no field '{0}'")]
    MissingField(String),
    #[error("field '{field}' holds {found}, which cannot be rendered as {kind:?}")]
    Incompatible {
        field: String,
        kind: OutputKind,
        found: &'static str,
    },
    #[error("failed to read result file: {0}")]
    Io(#[from] std::io::Error),
}

/// Render every output field in interface order.
pub fn render_response(
    interface: &OutputInterface,
    sample: &Sample,
) -> Result<Vec<ResponseItem>, RenderError> {
    interface
        .fields()
        .iter()
        .map(|output| {
            let value = sample
                .get(&output.field)
                .ok_or_else(|| RenderError::MissingField(output.field.clone()))?;
            let content = render_content(output.kind, &output.field, value)?;
            Ok(ResponseItem::output(output.kind, content, output.label.clone()))
        })
        .collect()
}

fn render_content(
    kind: OutputKind,
    field: &str,
    value: &FieldValue,
) -> Result<String, RenderError> {
    let incompatible = || RenderError::Incompatible {
        field: field.to_string(),
        kind,
        found: value.kind(),
    };

    match kind {
        OutputKind::PlainText => Ok(value.to_string()),
        OutputKind::Fiducials => value
            .as_points()
            .map(format_points)
            .ok_or_else(incompatible),
        _ => match value {
            FieldValue::File(path) => Ok(STANDARD.encode(std::fs::read(path)?)),
            FieldValue::Bytes(bytes) => Ok(STANDARD.encode(bytes)),
            _ => Err(incompatible()),
        },
    }
}
