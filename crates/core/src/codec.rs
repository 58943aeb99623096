//! Pluggable transforms applied to memoized values.
//!
//! The scheduler only ever stores the blobs a codec hands back. Embedders that
//! memoize references into a live world wrap them in a tagged enum of their own
//! (or a [`Handle`](crate::Handle)) so only stable identifiers reach the log.

use serde_json::Value;

use crate::error::SchedError;

pub trait MemoCodec {
    /// Transform a freshly computed value before it is appended to the memo log.
    fn serialise(&self, value: Value) -> Result<Value, SchedError>;

    /// Transform a logged blob back into a value during replay.
    fn deserialise(&self, blob: Value) -> Result<Value, SchedError>;
}

/// Stores values verbatim.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughCodec;

impl MemoCodec for PassthroughCodec {
    fn serialise(&self, value: Value) -> Result<Value, SchedError> {
        Ok(value)
    }

    fn deserialise(&self, blob: Value) -> Result<Value, SchedError> {
        Ok(blob)
    }
}

impl<F, G> MemoCodec for (F, G)
where
    F: Fn(Value) -> Result<Value, SchedError>,
    G: Fn(Value) -> Result<Value, SchedError>,
{
    fn serialise(&self, value: Value) -> Result<Value, SchedError> {
        (self.0)(value)
    }

    fn deserialise(&self, blob: Value) -> Result<Value, SchedError> {
        (self.1)(blob)
    }
}
