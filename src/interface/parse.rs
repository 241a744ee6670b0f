// Request parsing: form fields → Sample
//
// Binary fields are materialised as files inside the request's scratch
// directory; the sample carries their paths.

use super::descriptor::{InputInterface, InputKind};
use crate::pipeline::{FieldValue, Sample};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Raw form fields of one request (first value per name).
pub type RequestForm = HashMap<String, Vec<u8>>;

/// Transform file extensions accepted in the `<ext>\n<base64>` encoding.
const TRANSFORM_EXTENSIONS: [&str; 3] = ["nii.gz", "h5", "mat"];

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("missing form field '{0}'")]
    MissingField(String),
    #[error("field '{field}' is not a number: {value:?}")]
    InvalidNumber { field: String, value: String },
    #[error("field '{0}' is not a valid fiducial list (expected x,y,z;x,y,z)")]
    InvalidFiducials(String),
    #[error("field '{0}' is not a valid transform (expected <nii.gz|h5|mat>\\n<base64>)")]
    InvalidTransform(String),
    #[error("failed to write field to scratch directory: {0}")]
    Io(#[from] std::io::Error),
}

/// Build the pipeline input for one request.
pub fn parse_request(
    interface: &InputInterface,
    form: &RequestForm,
    scratch: &Path,
) -> Result<Sample, ParseError> {
    let mut sample = Sample::new();

    for field in interface.fields() {
        let name = field.destination.as_str();
        let raw = form
            .get(name)
            .ok_or_else(|| ParseError::MissingField(name.to_string()))?;

        let value = match field.kind {
            InputKind::Volume => {
                let path = scratch_file(scratch, "mha");
                std::fs::write(&path, decode_blob(name, raw))?;
                FieldValue::File(path)
            }
            InputKind::Slider => {
                let text = String::from_utf8_lossy(raw);
                let number = text
                    .trim()
                    .parse::<f64>()
                    .map_err(|_| ParseError::InvalidNumber {
                        field: name.to_string(),
                        value: text.to_string(),
                    })?;
                FieldValue::Number(number)
            }
            InputKind::Checkbox | InputKind::Radiobutton => {
                FieldValue::Text(String::from_utf8_lossy(raw).into_owned())
            }
            InputKind::Fiducials => FieldValue::Points(parse_fiducials(name, raw)?),
            InputKind::Transform => {
                let (extension, bytes) = parse_transform(name, raw)?;
                let path = scratch_file(scratch, extension);
                std::fs::write(&path, bytes)?;
                FieldValue::File(path)
            }
        };

        sample.insert(name, value);
    }

    Ok(sample)
}

fn scratch_file(scratch: &Path, extension: &str) -> PathBuf {
    scratch.join(format!("{}.{}", Uuid::new_v4().simple(), extension))
}

/// Decode a base64 blob; clients that still send raw bytes are accepted
/// with a warning.
pub fn decode_blob(field: &str, raw: &[u8]) -> Vec<u8> {
    if let Some(decoded) = strict_base64(raw) {
        return decoded;
    }
    tracing::warn!(
        field,
        "Client sent raw file content instead of a base64 string; this is deprecated"
    );
    raw.to_vec()
}

/// Decode only if the input is canonical base64 (line breaks allowed).
fn strict_base64(raw: &[u8]) -> Option<Vec<u8>> {
    let compact: Vec<u8> = raw
        .iter()
        .copied()
        .filter(|b| !b.is_ascii_whitespace())
        .collect();
    if compact.is_empty() {
        return None;
    }
    let decoded = STANDARD.decode(&compact).ok()?;
    (STANDARD.encode(&decoded).as_bytes() == compact.as_slice()).then_some(decoded)
}

fn parse_fiducials(field: &str, raw: &[u8]) -> Result<Vec<Vec<f64>>, ParseError> {
    let text = String::from_utf8_lossy(raw);
    let text = text.trim();
    if text.is_empty() {
        return Err(ParseError::InvalidFiducials(field.to_string()));
    }

    text.split(';')
        .map(|point| {
            point
                .split(',')
                .map(|v| v.trim().parse::<f64>())
                .collect::<Result<Vec<_>, _>>()
                .map_err(|_| ParseError::InvalidFiducials(field.to_string()))
        })
        .collect()
}

fn parse_transform<'a>(field: &str, raw: &'a [u8]) -> Result<(&'static str, Vec<u8>), ParseError> {
    let invalid = || ParseError::InvalidTransform(field.to_string());

    let newline = raw.iter().position(|&b| b == b'\n').ok_or_else(invalid)?;
    let header = std::str::from_utf8(&raw[..newline]).map_err(|_| invalid())?;
    let extension = TRANSFORM_EXTENSIONS
        .iter()
        .find(|ext| header.trim() == **ext)
        .copied()
        .ok_or_else(invalid)?;
    let payload: &'a [u8] = &raw[newline + 1..];
    let bytes = strict_base64(payload).ok_or_else(invalid)?;
    Ok((extension, bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interface::InputField;

    fn form(pairs: &[(&str, &[u8])]) -> RequestForm {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_vec()))
            .collect()
    }

    #[test]
    fn test_volume_and_slider() {
        let scratch = tempfile::tempdir().unwrap();
        let iface = InputInterface(vec![
            InputField::new(InputKind::Volume, "input"),
            InputField::new(InputKind::Slider, "threshold"),
        ]);
        let encoded = STANDARD.encode(b"volume-bytes");
        let sample = parse_request(
            &iface,
            &form(&[("input", encoded.as_bytes()), ("threshold", b" 0.25 ")]),
            scratch.path(),
        )
        .unwrap();

        let Some(FieldValue::File(path)) = sample.get("input") else {
            panic!("volume should be stored as a file");
        };
        assert!(path.starts_with(scratch.path()));
        assert_eq!(path.extension().unwrap(), "mha");
        assert_eq!(std::fs::read(path).unwrap(), b"volume-bytes");
        assert_eq!(sample.get("threshold"), Some(&FieldValue::Number(0.25)));
    }

    #[test]
    fn test_raw_volume_accepted() {
        let scratch = tempfile::tempdir().unwrap();
        let iface = InputInterface(vec![InputField::new(InputKind::Volume, "input")]);
        let raw: &[u8] = &[0xff, 0x00, 0x10, b'!'];
        let sample = parse_request(&iface, &form(&[("input", raw)]), scratch.path()).unwrap();
        let Some(FieldValue::File(path)) = sample.get("input") else {
            panic!("expected file");
        };
        assert_eq!(std::fs::read(path).unwrap(), raw);
    }

    #[test]
    fn test_missing_field() {
        let scratch = tempfile::tempdir().unwrap();
        let iface = InputInterface(vec![InputField::new(InputKind::Checkbox, "flag")]);
        let err = parse_request(&iface, &form(&[]), scratch.path()).unwrap_err();
        assert!(matches!(err, ParseError::MissingField(ref f) if f == "flag"));
    }

    #[test]
    fn test_bad_slider() {
        let scratch = tempfile::tempdir().unwrap();
        let iface = InputInterface(vec![InputField::new(InputKind::Slider, "t")]);
        let err = parse_request(&iface, &form(&[("t", b"high")]), scratch.path()).unwrap_err();
        assert!(matches!(err, ParseError::InvalidNumber { .. }));
    }

    #[test]
    fn test_fiducials() {
        let scratch = tempfile::tempdir().unwrap();
        let iface = InputInterface(vec![InputField::new(InputKind::Fiducials, "fids")]);
        let sample = parse_request(
            &iface,
            &form(&[("fids", b"1,2,3;4.5,-5,6")]),
            scratch.path(),
        )
        .unwrap();
        assert_eq!(
            sample.get("fids"),
            Some(&FieldValue::Points(vec![vec![1.0, 2.0, 3.0], vec![4.5, -5.0, 6.0]]))
        );

        let err = parse_request(&iface, &form(&[("fids", b"1,2;x")]), scratch.path());
        assert!(matches!(err, Err(ParseError::InvalidFiducials(_))));
    }

    #[test]
    fn test_transform() {
        let scratch = tempfile::tempdir().unwrap();
        let iface = InputInterface(vec![InputField::new(InputKind::Transform, "trf")]);
        let body = format!("h5\n{}", STANDARD.encode(b"bspline"));
        let sample = parse_request(&iface, &form(&[("trf", body.as_bytes())]), scratch.path())
            .unwrap();
        let Some(FieldValue::File(path)) = sample.get("trf") else {
            panic!("expected file");
        };
        assert!(path.to_string_lossy().ends_with(".h5"));
        assert_eq!(std::fs::read(path).unwrap(), b"bspline");

        let err = parse_request(&iface, &form(&[("trf", b"obj\nAAAA")]), scratch.path());
        assert!(matches!(err, Err(ParseError::InvalidTransform(_))));
    }

    #[test]
    fn test_strict_base64_rejects_non_canonical() {
        assert_eq!(strict_base64(b"aGVsbG8=").as_deref(), Some(&b"hello"[..]));
        assert_eq!(strict_base64(b"aGVs\nbG8=").as_deref(), Some(&b"hello"[..]));
        assert!(strict_base64(b"hello!").is_none());
        assert!(strict_base64(b"").is_none());
    }
}
