//! Plan persistence, optionally sealed at rest.
//!
//! Unsealed plans are pretty JSON. Sealed plans are wrapped in an envelope:
//!
//! ```json
//! { "schema": "redline.sealed_plan.v1", "nonce": "<base64>", "ciphertext": "<base64>" }
//! ```
//!
//! The ciphertext is ChaCha20-Poly1305 over the plan JSON with the envelope
//! schema as associated data. Keys are always passed in by the caller.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use camino::Utf8Path;
use chacha20poly1305::aead::{Aead, AeadCore, KeyInit, OsRng, Payload};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use crate::ports::WritePort;
use fs_err as fs;
use redline_types::plan::Plan;
use redline_types::schema::REDLINE_SEALED_PLAN_V1;
use serde::{Deserialize, Serialize};
use thiserror::Error;

const NONCE_LEN: usize = 12;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("plan store i/o: {0}")]
    Io(#[from] std::io::Error),

    #[error("plan is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),

    /// The plan is sealed and could not be opened (no key, wrong key, damaged envelope).
    #[error("sealed plan: {0}")]
    Sealed(String),

    #[error("plan key: {0}")]
    Key(String),
}

impl StoreError {
    /// Returns the recommended exit code for this error.
    pub fn exit_code(&self) -> u8 {
        match self {
            StoreError::Io(_) => 3,
            StoreError::Parse(_) | StoreError::Sealed(_) | StoreError::Key(_) => 2,
        }
    }
}

/// 256-bit symmetric key for sealing plans.
#[derive(Clone, PartialEq, Eq)]
pub struct PlanKey([u8; 32]);

impl std::fmt::Debug for PlanKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("PlanKey(..)")
    }
}

impl PlanKey {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Parse 64 hex characters, surrounding whitespace ignored.
    pub fn from_hex(s: &str) -> Result<Self, StoreError> {
        let raw = hex::decode(s.trim()).map_err(|e| StoreError::Key(e.to_string()))?;
        let bytes: [u8; 32] = raw
            .try_into()
            .map_err(|v: Vec<u8>| StoreError::Key(format!("expected 32 bytes, got {}", v.len())))?;
        Ok(Self(bytes))
    }

    /// Read a hex key file.
    pub fn load(path: &Utf8Path) -> Result<Self, StoreError> {
        let text = fs::read_to_string(path)?;
        Self::from_hex(&text)
    }

    /// A fresh random key from the OS generator.
    pub fn generate() -> Self {
        let key = ChaCha20Poly1305::generate_key(&mut OsRng);
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&key);
        Self(bytes)
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    fn cipher(&self) -> ChaCha20Poly1305 {
        ChaCha20Poly1305::new(Key::from_slice(&self.0))
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct SealedEnvelope {
    schema: String,
    nonce: String,
    ciphertext: String,
}

/// Serialize a plan, sealing it when `key` is given.
pub fn encode_plan(plan: &Plan, key: Option<&PlanKey>) -> Result<Vec<u8>, StoreError> {
    let mut json = serde_json::to_vec_pretty(plan)?;
    json.push(b'\n');
    let Some(key) = key else {
        return Ok(json);
    };

    let nonce = ChaCha20Poly1305::generate_nonce(&mut OsRng);
    let ciphertext = key
        .cipher()
        .encrypt(
            &nonce,
            Payload {
                msg: &json,
                aad: REDLINE_SEALED_PLAN_V1.as_bytes(),
            },
        )
        .map_err(|_| StoreError::Sealed("encryption failed".to_string()))?;

    let envelope = SealedEnvelope {
        schema: REDLINE_SEALED_PLAN_V1.to_string(),
        nonce: STANDARD.encode(nonce),
        ciphertext: STANDARD.encode(ciphertext),
    };
    let mut out = serde_json::to_vec_pretty(&envelope)?;
    out.push(b'\n');
    Ok(out)
}

/// Parse a plan, opening the sealed envelope when there is one.
pub fn decode_plan(bytes: &[u8], key: Option<&PlanKey>) -> Result<Plan, StoreError> {
    let value: serde_json::Value = serde_json::from_slice(bytes)?;
    if value.get("schema").and_then(|s| s.as_str()) != Some(REDLINE_SEALED_PLAN_V1) {
        return Ok(serde_json::from_value(value)?);
    }

    let Some(key) = key else {
        return Err(StoreError::Sealed(
            "plan is sealed and no key was provided".to_string(),
        ));
    };
    let envelope: SealedEnvelope = serde_json::from_value(value)?;
    let nonce = STANDARD
        .decode(&envelope.nonce)
        .map_err(|e| StoreError::Sealed(format!("nonce: {e}")))?;
    if nonce.len() != NONCE_LEN {
        return Err(StoreError::Sealed(format!(
            "nonce is {} bytes, expected {NONCE_LEN}",
            nonce.len()
        )));
    }
    let ciphertext = STANDARD
        .decode(&envelope.ciphertext)
        .map_err(|e| StoreError::Sealed(format!("ciphertext: {e}")))?;

    let plain = key
        .cipher()
        .decrypt(
            Nonce::from_slice(&nonce),
            Payload {
                msg: &ciphertext,
                aad: REDLINE_SEALED_PLAN_V1.as_bytes(),
            },
        )
        .map_err(|_| StoreError::Sealed("wrong key or tampered envelope".to_string()))?;
    Ok(serde_json::from_slice(&plain)?)
}

/// Encode a plan (sealed when `key` is given) and write it through `writer`.
pub fn write_plan(
    writer: &dyn WritePort,
    path: &Utf8Path,
    plan: &Plan,
    key: Option<&PlanKey>,
) -> anyhow::Result<()> {
    let bytes = encode_plan(plan, key)?;
    writer.write_file(path, &bytes)
}

pub fn read_plan(path: &Utf8Path, key: Option<&PlanKey>) -> Result<Plan, StoreError> {
    let bytes = fs::read(path)?;
    decode_plan(&bytes, key)
}
