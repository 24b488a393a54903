use std::path::PathBuf;

use clap::Args;
use common::crypto::{Crypto, VerifyKey};
use common::object::WireDocument;

/// Check the signature on a wire document
///
/// Only proves the document was signed by the key it names. Whether that
/// key may sign for the path depends on the tree above it.
#[derive(Args, Debug, Clone)]
pub struct Verify {
    /// Wire document as JSON
    pub file: PathBuf,

    /// Also require the signature to come from this verify key (base64)
    #[arg(long)]
    pub signer: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum VerifyError {
    #[error("failed to read {0}: {1}")]
    Read(PathBuf, std::io::Error),
    #[error("not a wire document: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("invalid verify key: {0}")]
    InvalidKey(#[from] common::crypto::CryptoError),
    #[error("'{0}' is not signed")]
    NoSignature(String),
    #[error("invalid signature on '{0}'")]
    InvalidSignature(String),
    #[error("'{path}' is signed by {found}, expected {expected}")]
    UnexpectedSigner {
        path: String,
        found: String,
        expected: String,
    },
}

#[async_trait::async_trait]
impl crate::op::Op for Verify {
    type Error = VerifyError;
    type Output = String;

    async fn execute(&self, _ctx: &crate::op::OpContext) -> Result<Self::Output, Self::Error> {
        let json = std::fs::read_to_string(&self.file)
            .map_err(|e| VerifyError::Read(self.file.clone(), e))?;
        let doc = WireDocument::from_json(&json)?;
        let Some(signature) = &doc.signature else {
            return Err(VerifyError::NoSignature(doc.path));
        };

        if !doc.verify_self_signed(&Crypto::default()) {
            return Err(VerifyError::InvalidSignature(doc.path));
        }
        if let Some(expected) = &self.signer {
            let expected = VerifyKey::from_base64(expected)?;
            if expected != signature.owner_verify_key {
                return Err(VerifyError::UnexpectedSigner {
                    path: doc.path.clone(),
                    found: signature.owner_verify_key.to_base64(),
                    expected: expected.to_base64(),
                });
            }
        }

        let owner = if signature.owner_path.is_empty() {
            "root"
        } else {
            signature.owner_path.as_str()
        };
        let mut lines = vec![
            format!("path: {}", doc.path),
            format!("version: {}", doc.version),
            format!("signed by: {} ({})", owner, signature.owner_verify_key.to_base64()),
        ];
        if doc.is_tombstone() {
            lines.push("tombstone: yes".to_string());
        }
        if let Some(envelope) = &doc.confidential {
            let recipients: Vec<&str> = envelope
                .recipient_wrapped_keys
                .keys()
                .map(|path| if path.is_empty() { "root" } else { path.as_str() })
                .collect();
            lines.push(format!("recipients: {}", recipients.join(", ")));
        }
        tracing::debug!(path = %doc.path, "signature verified");
        Ok(lines.join("\n"))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::op::{Op, OpContext};
    use common::crypto::SignKey;
    use common::object::DocumentSignature;

    fn signed(key: &SignKey) -> WireDocument {
        let mut doc = WireDocument::new("/notes/a", 1);
        doc.fields.insert("title".into(), serde_json::json!("hi"));
        doc.signature = Some(DocumentSignature {
            signature: Crypto::default().sign(&doc.signing_bytes(), key),
            owner_path: String::new(),
            owner_verify_key: key.verify_key(),
        });
        doc
    }

    async fn run(doc: &WireDocument, signer: Option<String>) -> Result<String, VerifyError> {
        let temp = tempfile::tempdir().unwrap();
        let file = temp.path().join("doc.json");
        std::fs::write(&file, doc.to_json().unwrap()).unwrap();
        Verify { file, signer }
            .execute(&OpContext::new(None, None))
            .await
    }

    #[tokio::test]
    async fn test_verify_document() {
        let key = SignKey::generate().unwrap();
        let doc = signed(&key);

        let output = run(&doc, Some(key.verify_key().to_base64())).await.unwrap();
        assert!(output.contains("signed by: root"));

        let other = SignKey::generate().unwrap();
        assert!(matches!(
            run(&doc, Some(other.verify_key().to_base64())).await,
            Err(VerifyError::UnexpectedSigner { .. })
        ));

        let mut tampered = doc.clone();
        tampered.version = 2;
        assert!(matches!(
            run(&tampered, None).await,
            Err(VerifyError::InvalidSignature(_))
        ));
    }
}
