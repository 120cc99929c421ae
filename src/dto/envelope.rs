use serde::{Deserialize, Serialize};

/// Wire body of `POST /public/receive`: base64 ciphertext plus the base64 IV it was sealed with.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    pub payload: String,
    pub iv: String,
}
