use std::io;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Fatal errors. Anything returned here aborts the render pass; output already
/// streamed into a backend must be discarded.
#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("invalid document definition: {0}")]
    Json(#[from] serde_json::Error),

    /// Unknown page size name, malformed margins, impossible geometry.
    #[error("configuration error: {0}")]
    Config(String),

    /// No font file exists for the requested family/style combination.
    #[error("no font file for family {family:?} (bold={bold}, italic={italic})")]
    FontResolution {
        family: String,
        bold: bool,
        italic: bool,
    },

    #[error("font error: {0}")]
    Font(String),

    /// A deferred page reference points at a node that never appears in the layout.
    #[error("page reference to node {0:?} cannot be resolved")]
    UnresolvedReference(String),

    #[error("image error: {0}")]
    Image(String),

    #[error("svg error: {0}")]
    Svg(String),
}
