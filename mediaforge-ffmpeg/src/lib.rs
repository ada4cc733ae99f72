// Process-backed ingestion: supervised external ffmpeg bridges and one-shot
// frame capture, built on the registry model from `mediaforge-core`.

pub mod cmd;
pub mod error;
pub mod process;
pub mod snap;
pub mod source;

pub use error::{SnapError, SnapResult, SourceError, SourceResult};
pub use process::{MockProcessRunner, ProcessHandle, ProcessRunner, TokioProcessRunner};
pub use snap::{FfmpegSnap, SnapDecoder, SnapMode};
pub use source::FfmpegSource;
