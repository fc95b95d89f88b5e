// lib/src/codec.rs

use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};

use serde::de::DeserializeOwned;
use serde::Serialize;

use models::errors::{WardError, WardResult};

const MAGIC: &[u8; 4] = b"WRD1";
const VERSION: u8 = 1;
const HEADER_LEN: usize = 4 + 1 + 8;

/// Seals structured documents into the opaque blobs the stores persist.
///
/// The engine never inspects a sealed blob. Everything it relies on is
/// `open(seal(x)) == x`, and that `open` rejects blobs produced with an
/// incompatible key or format version. The cipher applied to the payload
/// is a deployment concern kept behind this trait.
pub trait DocumentCodec: Send + Sync + fmt::Debug + 'static {
    /// Seals a serialized document into an opaque blob.
    fn seal(&self, plain: &[u8]) -> WardResult<Vec<u8>>;

    /// Opens a blob produced by `seal` with a compatible key and version.
    /// Fails with `CorruptDocument` for anything else.
    fn open(&self, blob: &[u8]) -> WardResult<Vec<u8>>;
}

/// Default codec: envelopes the payload with a magic/version header and
/// the fingerprint of the configured key, so `open` detects foreign or
/// stale blobs before deserialization sees them. Deployments layer their
/// cipher over the payload behind the same trait.
#[derive(Clone)]
pub struct EnvelopeCodec {
    fingerprint: [u8; 8],
}

impl fmt::Debug for EnvelopeCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // never print key material
        f.debug_struct("EnvelopeCodec").finish_non_exhaustive()
    }
}

impl EnvelopeCodec {
    /// Creates a codec bound to the given key id.
    pub fn new(key_id: &str) -> Self {
        let mut hasher = DefaultHasher::new();
        key_id.hash(&mut hasher);
        EnvelopeCodec {
            fingerprint: hasher.finish().to_be_bytes(),
        }
    }
}

impl DocumentCodec for EnvelopeCodec {
    fn seal(&self, plain: &[u8]) -> WardResult<Vec<u8>> {
        let mut blob = Vec::with_capacity(HEADER_LEN + plain.len());
        blob.extend_from_slice(MAGIC);
        blob.push(VERSION);
        blob.extend_from_slice(&self.fingerprint);
        blob.extend_from_slice(plain);
        Ok(blob)
    }

    fn open(&self, blob: &[u8]) -> WardResult<Vec<u8>> {
        if blob.len() < HEADER_LEN || blob[..4] != MAGIC[..] {
            return Err(WardError::CorruptDocument(
                "blob is not a sealed document".to_string(),
            ));
        }
        if blob[4] != VERSION {
            return Err(WardError::CorruptDocument(format!(
                "unsupported document version {}",
                blob[4]
            )));
        }
        if blob[5..HEADER_LEN] != self.fingerprint {
            return Err(WardError::CorruptDocument(
                "document was sealed with a different key".to_string(),
            ));
        }
        Ok(blob[HEADER_LEN..].to_vec())
    }
}

/// Serializes a document and seals it.
pub fn encode_document<T: Serialize>(
    codec: &dyn DocumentCodec,
    value: &T,
) -> WardResult<Vec<u8>> {
    let plain = serde_json::to_vec(value)
        .map_err(|e| WardError::Serialization(format!("document encode: {e}")))?;
    codec.seal(&plain)
}

/// Opens a blob and deserializes the document inside it.
pub fn decode_document<T: DeserializeOwned>(
    codec: &dyn DocumentCodec,
    blob: &[u8],
) -> WardResult<T> {
    let plain = codec.open(blob)?;
    serde_json::from_slice(&plain)
        .map_err(|e| WardError::CorruptDocument(format!("document decode: {e}")))
}
