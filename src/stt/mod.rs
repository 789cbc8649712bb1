//! Speech-to-text: recognizer capability, Google backend and the upload pipeline.

pub mod google;
pub mod recognizer;
pub mod transcriber;

pub use google::{GoogleSpeechConfig, GoogleSpeechRecognizer};
pub use recognizer::{LinearAudio, Recognizer};
pub use transcriber::{Transcriber, Transcript, TranscriptionPipeline};
