// Wire response items
//
// Every `/predict` and `/responses` reply is a JSON array of these.

use super::descriptor::OutputKind;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ResponseItem {
    PlainText { content: String, label: String },
    LabelVolume { content: String, label: String },
    #[serde(rename = "VTKMesh")]
    VtkMesh { content: String, label: String },
    Fiducials { content: String, label: String },
    TransformGrid { content: String, label: String },
    TransformBSpline { content: String, label: String },
    TransformLinear { content: String, label: String },
    /// The result is not ready; poll `/responses` with this id.
    DelayedResponse { request_id: String },
}

impl ResponseItem {
    /// Rendered output of the given kind.
    pub fn output(kind: OutputKind, content: String, label: String) -> Self {
        match kind {
            OutputKind::PlainText => ResponseItem::PlainText { content, label },
            OutputKind::LabelVolume => ResponseItem::LabelVolume { content, label },
            OutputKind::VtkMesh => ResponseItem::VtkMesh { content, label },
            OutputKind::Fiducials => ResponseItem::Fiducials { content, label },
            OutputKind::TransformGrid => ResponseItem::TransformGrid { content, label },
            OutputKind::TransformBSpline => ResponseItem::TransformBSpline { content, label },
            OutputKind::TransformLinear => ResponseItem::TransformLinear { content, label },
        }
    }

    /// Plain text message with an empty label.
    pub fn text(message: impl Into<String>) -> Self {
        ResponseItem::PlainText {
            content: message.into(),
            label: String::new(),
        }
    }

    /// User-visible error; clients display the "Error!" label.
    pub fn error(message: impl Into<String>) -> Self {
        ResponseItem::PlainText {
            content: message.into(),
            label: "Error!".to_string(),
        }
    }

    pub fn delayed(request_id: impl Into<String>) -> Self {
        ResponseItem::DelayedResponse {
            request_id: request_id.into(),
        }
    }

    pub fn content(&self) -> Option<&str> {
        match self {
            ResponseItem::PlainText { content, .. }
            | ResponseItem::LabelVolume { content, .. }
            | ResponseItem::VtkMesh { content, .. }
            | ResponseItem::Fiducials { content, .. }
            | ResponseItem::TransformGrid { content, .. }
            | ResponseItem::TransformBSpline { content, .. }
            | ResponseItem::TransformLinear { content, .. } => Some(content),
            ResponseItem::DelayedResponse { .. } => None,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, ResponseItem::PlainText { label, .. } if label == "Error!")
    }

    pub fn is_delayed(&self) -> bool {
        matches!(self, ResponseItem::DelayedResponse { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_error_item_wire_shape() {
        let item = ResponseItem::error("Server-side ERROR during processing");
        assert_eq!(
            serde_json::to_value(&item).unwrap(),
            json!({
                "type": "PlainText",
                "content": "Server-side ERROR during processing",
                "label": "Error!"
            })
        );
        assert!(item.is_error());
    }

    #[test]
    fn test_delayed_marker_wire_shape() {
        let item = ResponseItem::delayed("abc");
        assert_eq!(
            serde_json::to_value(&item).unwrap(),
            json!({"type": "DelayedResponse", "request_id": "abc"})
        );
        assert!(item.content().is_none());
    }

    #[test]
    fn test_vtk_mesh_tag() {
        let item = ResponseItem::output(OutputKind::VtkMesh, "bWVzaA==".into(), String::new());
        assert_eq!(serde_json::to_value(&item).unwrap()["type"], "VTKMesh");
    }
}
