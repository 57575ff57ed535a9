//! Payload transform hook
//!
//! The client never encrypts or compresses on its own. Callers that need
//! client-side encryption plug a [`PayloadTransform`] into
//! [`S3Client::with_transform`](crate::S3Client::with_transform); it runs on
//! every full-object upload before signing and on every full-object download
//! after the body arrives. Range reads return raw stored bytes.

use crate::Result;
use bytes::Bytes;
use std::fmt;

/// Byte transform applied to object payloads
pub trait PayloadTransform: Send + Sync + fmt::Debug {
    /// Transform plaintext into the bytes to store
    fn encode(&self, key: &str, data: Bytes) -> Result<Bytes>;

    /// Transform stored bytes back into plaintext
    fn decode(&self, key: &str, data: Bytes) -> Result<Bytes>;
}

/// Leaves payloads untouched
#[derive(Clone, Copy, Debug, Default)]
pub struct Identity;

impl PayloadTransform for Identity {
    fn encode(&self, _key: &str, data: Bytes) -> Result<Bytes> {
        Ok(data)
    }

    fn decode(&self, _key: &str, data: Bytes) -> Result<Bytes> {
        Ok(data)
    }
}
