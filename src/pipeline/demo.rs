// Built-in demo applications
//
// Small pipelines used by `perch serve --demo` to exercise every wire
// encoding without any model installed.

use super::runner::Pipeline;
use super::sample::{FieldValue, Sample};
use super::stage::{Passthrough, StageError};
use crate::interface::{
    InputField, InputInterface, InputKind, OutputField, OutputInterface, OutputKind,
};
use std::str::FromStr;

/// A pipeline together with the interfaces it is served with.
pub struct DemoApp {
    pub pipeline: Pipeline,
    pub input: InputInterface,
    pub output: OutputInterface,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Demo {
    /// Checkbox in, fixed text out
    Text,
    /// Fiducials in, negated fiducials out
    Fiducials,
    /// Volume + threshold in, the same volume and a report out
    Echo,
}

impl FromStr for Demo {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(Demo::Text),
            "fiducials" => Ok(Demo::Fiducials),
            "echo" => Ok(Demo::Echo),
            other => Err(format!(
                "unknown demo '{}' (expected text, fiducials or echo)",
                other
            )),
        }
    }
}

impl Demo {
    pub fn build(self) -> DemoApp {
        match self {
            Demo::Text => text_app(),
            Demo::Fiducials => fiducials_app(),
            Demo::Echo => echo_app(),
        }
    }
}

fn text_app() -> DemoApp {
    let postprocess = |_sample: Sample| -> Result<Sample, StageError> {
        Ok(Sample::new().with("demotext", FieldValue::Text("This is a demo text...".into())))
    };
    DemoApp {
        pipeline: Pipeline::new(Passthrough, Passthrough, postprocess),
        input: InputInterface(vec![
            InputField::new(InputKind::Checkbox, "checkbox").hint("text", "checkbox test")
        ]),
        output: OutputInterface(vec![OutputField::new(OutputKind::PlainText, "demotext")]),
    }
}

fn fiducials_app() -> DemoApp {
    let inference = |mut sample: Sample| -> Result<Sample, StageError> {
        let points = match sample.take("fids") {
            Some(FieldValue::Points(points)) => points,
            _ => return Err(StageError::missing("fids")),
        };
        let negated = points
            .into_iter()
            .map(|p| p.into_iter().map(|v| -v).collect())
            .collect();
        Ok(sample.with("fids", FieldValue::Points(negated)))
    };
    DemoApp {
        pipeline: Pipeline::new(Passthrough, inference, Passthrough),
        input: InputInterface(vec![InputField::new(InputKind::Fiducials, "fids")]),
        output: OutputInterface(vec![OutputField::new(OutputKind::Fiducials, "fids")]),
    }
}

fn echo_app() -> DemoApp {
    let preprocess = |mut sample: Sample| -> Result<Sample, StageError> {
        let bytes = match sample.take("input") {
            Some(FieldValue::File(path)) => std::fs::read(path)?,
            _ => return Err(StageError::missing("input")),
        };
        Ok(sample.with("volume", FieldValue::Bytes(bytes)))
    };
    let inference = |mut sample: Sample| -> Result<Sample, StageError> {
        let threshold = sample
            .get("threshold")
            .and_then(FieldValue::as_number)
            .ok_or_else(|| StageError::missing("threshold"))?;
        let size = match sample.get("volume") {
            Some(FieldValue::Bytes(bytes)) => bytes.len(),
            _ => return Err(StageError::missing("volume")),
        };
        sample.insert(
            "report",
            FieldValue::Text(format!("received {} bytes, threshold {}", size, threshold)),
        );
        Ok(sample)
    };
    DemoApp {
        pipeline: Pipeline::new(preprocess, inference, Passthrough),
        input: InputInterface(vec![
            InputField::new(InputKind::Volume, "input"),
            InputField::new(InputKind::Slider, "threshold")
                .hint("minimum", 0)
                .hint("maximum", 1),
        ]),
        output: OutputInterface(vec![
            OutputField::new(OutputKind::LabelVolume, "volume"),
            OutputField::new(OutputKind::PlainText, "report"),
        ]),
    }
}
