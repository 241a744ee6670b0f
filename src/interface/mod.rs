// Interface module
//
// Input/output interface descriptors and the codec between wire form
// fields, pipeline samples, and JSON response items.

mod descriptor;
mod parse;
mod render;
mod response;

pub use descriptor::{
    InputField, InputInterface, InputKind, OutputField, OutputInterface, OutputKind,
};
pub use parse::{decode_blob, parse_request, ParseError, RequestForm};
pub use render::{render_response, RenderError};
pub use response::ResponseItem;
