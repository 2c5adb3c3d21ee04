//! Error types for the mpsvar caller.

use std::fmt;
use std::io;

/// The main error type for caller operations.
#[derive(Debug)]
pub enum SvError {
    /// Error during IO operations (reading alignments, writing outputs)
    Io(io::Error),
    /// Missing or invalid configuration / arguments
    Config(String),
    /// Unreadable or malformed genomic mask
    MaskLoad(String),
    /// The alignment input produced no usable records or terminated abnormally
    AlignerIo(String),
    /// Background-noise threshold cannot be satisfied at sigma <= 3
    PoorLibrary { sigma: u32 },
    /// Inferred inward and outward insert-size intervals overlap
    NonDeconvolvable {
        inward: (u32, u32),
        outward: (u32, u32),
    },
}

impl fmt::Display for SvError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SvError::Io(err) => write!(f, "IO error: {}", err),
            SvError::Config(msg) => write!(f, "Invalid configuration: {}", msg),
            SvError::MaskLoad(msg) => write!(f, "Mask load error: {}", msg),
            SvError::AlignerIo(msg) => write!(f, "Alignment input error: {}", msg),
            SvError::PoorLibrary { sigma } => write!(
                f,
                "Poor library: no fragment-size peak clears the noise cutoff at sigma <= {}",
                sigma
            ),
            SvError::NonDeconvolvable { inward, outward } => write!(
                f,
                "Non-deconvolvable library: inward [{}, {}] and outward [{}, {}] insert windows are not discrete",
                inward.0, inward.1, outward.0, outward.1
            ),
        }
    }
}

impl std::error::Error for SvError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SvError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for SvError {
    fn from(err: io::Error) -> Self {
        SvError::Io(err)
    }
}

/// Result type alias for caller operations.
pub type SvResult<T> = Result<T, SvError>;
