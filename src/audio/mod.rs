//! Uploaded audio handling: temp file scopes and container conversion.

pub mod janitor;
pub mod transcode;

pub use janitor::ResourceJanitor;
pub use transcode::{AudioTranscoder, ContainerConverter, DecodedAudio, FfmpegConverter, TargetFormat};
