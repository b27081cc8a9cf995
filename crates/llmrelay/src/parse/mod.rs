//! Frame decoders for streamed upstream bodies. Each yields the JSON payload of one provider
//! event.

use crate::*;

pub mod aws_eventstream;
pub mod sse;

/// Upper bound on a single buffered frame.
pub const DEFAULT_FRAME_LIMIT: usize = 2 * 1024 * 1024;

#[derive(thiserror::Error, Debug)]
pub enum Error {
	#[error("io error: {0}")]
	Io(#[from] std::io::Error),
	#[error("frame exceeds {0} bytes")]
	LimitExceeded(usize),
	#[error("invalid event stream frame: {0}")]
	Frame(Strng),
	#[error("invalid event payload: {0}")]
	Payload(Strng),
	#[error("upstream sent {kind}: {message}")]
	Exception { kind: Strng, message: Strng },
}
