//! # Payment Proof
//!
//! One image the customer attaches as evidence of an out-of-band payment.
//! Checked here before anything is stashed or uploaded; the backend and the
//! staff queue only ever see the data-URL form.
//!
//! ```text
//! bytes + MIME ──► from_bytes ──► PaymentProof ──► to_data_url ──► PATCH payment-proof
//!                     │
//!                     ├── empty        → ProofEmpty
//!                     ├── not image/*  → ProofNotImage
//!                     └── > max bytes  → ProofTooLarge
//! ```

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use crate::error::CoreError;

/// A validated proof image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentProof {
    mime: String,
    bytes: Vec<u8>,
}

impl PaymentProof {
    /// Validates an attachment.
    ///
    /// `mime` is compared case-insensitively and parameters after `;` are
    /// ignored.
    pub fn from_bytes(mime: &str, bytes: Vec<u8>, max_bytes: usize) -> Result<Self, CoreError> {
        if bytes.is_empty() {
            return Err(CoreError::ProofEmpty);
        }

        let mime = normalize_mime(mime);
        if !mime.starts_with("image/") || mime.len() == "image/".len() {
            return Err(CoreError::ProofNotImage { mime });
        }

        if bytes.len() > max_bytes {
            return Err(CoreError::ProofTooLarge {
                size: bytes.len(),
                max: max_bytes,
            });
        }

        Ok(PaymentProof { mime, bytes })
    }

    pub fn to_data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime, STANDARD.encode(&self.bytes))
    }

    pub fn mime(&self) -> &str {
        &self.mime
    }

    pub fn size(&self) -> usize {
        self.bytes.len()
    }

    /// Best-effort MIME type from a file name, for callers that only have a
    /// path. Unknown extensions map to `application/octet-stream`, which
    /// [`PaymentProof::from_bytes`] rejects.
    pub fn guess_mime(file_name: &str) -> &'static str {
        let ext = file_name
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "png" => "image/png",
            "jpg" | "jpeg" => "image/jpeg",
            "webp" => "image/webp",
            "gif" => "image/gif",
            "heic" => "image/heic",
            _ => "application/octet-stream",
        }
    }
}

fn normalize_mime(mime: &str) -> String {
    mime.split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}
