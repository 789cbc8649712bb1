//! Conversation turns over a generation backend.

pub mod responder;

pub use responder::{
    ERROR_MARKER_PREFIX, ResponderOptions, ResponseStream, StreamingResponder, error_fragment,
    is_error_fragment,
};
