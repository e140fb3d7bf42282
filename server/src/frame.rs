//! Server-side helpers on top of the shared wire frame.
//!
//! The wire type itself lives in the `frames` crate so the relay and its
//! clients agree on the encoding. This module adds the error-reporting
//! convention: every service error carries a grepable `E_*` code and a
//! retryable flag, and is turned into an error frame the same way.

use frames::{Frame, Status};
use serde_json::{Map, Value};

/// Frame data key for error messages.
pub const FRAME_MESSAGE: &str = "message";

/// Frame data key for grepable error codes.
pub const FRAME_CODE: &str = "code";

/// Frame data key for the retryable flag on error frames.
pub const FRAME_RETRYABLE: &str = "retryable";

/// Errors that can be reported to a client.
pub trait ErrorCode: std::fmt::Display {
    fn error_code(&self) -> &'static str;

    fn retryable(&self) -> bool {
        false
    }
}

pub trait FrameExt {
    /// Error reply built from a typed error: code, message and retryable.
    fn error_from(&self, err: &(impl ErrorCode + ?Sized)) -> Frame;
}

impl FrameExt for Frame {
    fn error_from(&self, err: &(impl ErrorCode + ?Sized)) -> Frame {
        let mut reply = self.error(err.error_code(), err.to_string());
        if let Value::Object(data) = &mut reply.data {
            data.insert(FRAME_RETRYABLE.into(), Value::Bool(err.retryable()));
        }
        reply
    }
}

/// Standalone error frame for input that never became a request.
#[must_use]
pub fn gateway_error(code: &str, message: impl Into<String>) -> Frame {
    let mut data = Map::new();
    data.insert(FRAME_CODE.into(), Value::String(code.to_owned()));
    data.insert(FRAME_MESSAGE.into(), Value::String(message.into()));
    let mut frame = Frame::request(frames::syscall::GATEWAY_ERROR, Value::Object(data));
    frame.status = Status::Error;
    frame
}

#[cfg(test)]
#[path = "frame_test.rs"]
mod tests;
