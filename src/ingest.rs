use serde_json::Value;
use thiserror::Error;
use tracing::{error, info, info_span, warn, Instrument};

use crate::{
    codec::{self, CodecError, SharedKey},
    dto::{Envelope, LocationRow},
    record::{self, ParseError},
    store::{LocationStore, StoreError},
};

/// Where a submission stopped. `Stored` is the only successful end state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IngestStage {
    Received,
    Decoded,
    Parsed,
    Stored,
}

/// Terminal failure of a submission, tagged with the stage that rejected it.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("invalid request envelope: {0}")]
    InputShape(String),

    #[error("payload decode failed: {0}")]
    Decode(#[source] CodecError),

    #[error("payload decrypt failed: {0}")]
    Decrypt(#[source] CodecError),

    #[error("record parse failed: {0}")]
    Parse(#[from] ParseError),

    #[error("record store failed: {0}")]
    Store(#[from] StoreError),
}

impl From<CodecError> for IngestError {
    fn from(err: CodecError) -> Self {
        if err.is_transport_encoding() {
            IngestError::Decode(err)
        } else {
            IngestError::Decrypt(err)
        }
    }
}

impl IngestError {
    /// Machine readable tag for the failing stage.
    pub fn kind(&self) -> &'static str {
        match self {
            IngestError::InputShape(_) => "input",
            IngestError::Decode(_) => "decode",
            IngestError::Decrypt(_) => "decrypt",
            IngestError::Parse(_) => "parse",
            IngestError::Store(_) => "store",
        }
    }

    /// Last stage the submission completed before failing.
    pub fn reached(&self) -> IngestStage {
        match self {
            IngestError::InputShape(_) | IngestError::Decode(_) | IngestError::Decrypt(_) => {
                IngestStage::Received
            }
            IngestError::Parse(_) => IngestStage::Decoded,
            IngestError::Store(_) => IngestStage::Parsed,
        }
    }
}

/// Decrypt → parse → append. Holds the process-wide key and the store handle;
/// cheap to clone into every request.
#[derive(Clone, Debug)]
pub struct Ingestor {
    key: SharedKey,
    store: LocationStore,
}

impl Ingestor {
    pub fn new(key: SharedKey, store: LocationStore) -> Self {
        Ingestor { key, store }
    }

    pub async fn ingest(&self, payload: &str, iv: &str) -> Result<LocationRow, IngestError> {
        let plaintext = codec::decode(payload, iv, &self.key)?;
        let record = record::parse(&plaintext)?;
        Ok(self.store.append(&record).await?)
    }

    /// Accept a raw `POST /public/receive` body, whatever its declared content type.
    pub async fn ingest_body(&self, body: &[u8]) -> Result<LocationRow, IngestError> {
        let span = info_span!("ingest", bytes = body.len());

        async {
            let result = match read_envelope(body) {
                Ok(envelope) => self.ingest(&envelope.payload, &envelope.iv).await,
                Err(err) => Err(err),
            };

            match &result {
                Ok(row) => info!(
                    "Stored location {} for device {:?} ({:?})",
                    row.id,
                    row.device,
                    IngestStage::Stored
                ),
                Err(err @ IngestError::Store(_)) => {
                    error!(stage = err.kind(), "Submission failed: {}", err)
                }
                Err(err) => warn!(
                    stage = err.kind(),
                    "Submission rejected after {:?}: {}",
                    err.reached(),
                    err
                ),
            }

            result
        }
        .instrument(span)
        .await
    }
}

/// The body must be a JSON object with string `payload` and `iv` members.
pub fn read_envelope(body: &[u8]) -> Result<Envelope, IngestError> {
    let value: Value = serde_json::from_slice(body)
        .map_err(|err| IngestError::InputShape(format!("body is not JSON: {}", err)))?;

    let Value::Object(fields) = value else {
        return Err(IngestError::InputShape("body is not a JSON object".into()));
    };

    let field = |name: &str| match fields.get(name) {
        Some(Value::String(text)) => Ok(text.clone()),
        Some(_) => Err(IngestError::InputShape(format!("`{}` must be a string", name))),
        None => Err(IngestError::InputShape(format!("missing field `{}`", name))),
    };

    Ok(Envelope {
        payload: field("payload")?,
        iv: field("iv")?,
    })
}
