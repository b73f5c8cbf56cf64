//! Signature service: integrity and freshness of issued payloads.
//!
//! The signature covers the canonical JSON of the signed field set
//! (`version`, `walletId`, `amount`, `currency`, `nonce`, `expiresAt`) and is
//! carried as base64url without padding.

use std::sync::Arc;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{DateTime, Utc};
use ed25519_dalek::{Signer as _, SigningKey};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use tracing::{debug, warn};
use zeroize::Zeroizing;

use crate::canon;
use crate::error::{QrError, Result};
use crate::types::{DraftPayload, Signature, SignedFields, SignedPayload, VerifiedPayload};

type HmacSha256 = Hmac<Sha256>;

/// Keyed, deterministic signing over canonical bytes.
pub trait PayloadSigner: Send + Sync {
    fn algorithm(&self) -> &'static str;

    fn sign(&self, message: &[u8]) -> Result<Vec<u8>>;
}

/// HMAC-SHA256 with a server-held secret.
pub struct HmacSigner {
    secret: Zeroizing<Vec<u8>>,
}

impl HmacSigner {
    pub fn new(secret: impl Into<Vec<u8>>) -> Result<Self> {
        let secret = Zeroizing::new(secret.into());
        if secret.is_empty() {
            return Err(QrError::InvalidInput("signing secret must not be empty".into()));
        }
        Ok(Self { secret })
    }
}

impl PayloadSigner for HmacSigner {
    fn algorithm(&self) -> &'static str {
        "hmac-sha256"
    }

    fn sign(&self, message: &[u8]) -> Result<Vec<u8>> {
        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .map_err(|e| QrError::GenerationFailed(format!("hmac key: {e}")))?;
        mac.update(message);
        Ok(mac.finalize().into_bytes().to_vec())
    }
}

/// Ed25519 from a 32-byte seed. Ed25519 signatures are deterministic, so the
/// verifier can recompute and compare like it does for a MAC.
pub struct Ed25519Signer {
    key: SigningKey,
}

impl Ed25519Signer {
    pub fn from_seed(seed: &[u8]) -> Result<Self> {
        let seed: [u8; 32] = seed
            .try_into()
            .map_err(|_| QrError::InvalidInput("ed25519 seed must be 32 bytes".into()))?;
        Ok(Self { key: SigningKey::from_bytes(&seed) })
    }

    pub fn verifying_key_b64(&self) -> String {
        URL_SAFE_NO_PAD.encode(self.key.verifying_key().to_bytes())
    }
}

impl PayloadSigner for Ed25519Signer {
    fn algorithm(&self) -> &'static str {
        "ed25519"
    }

    fn sign(&self, message: &[u8]) -> Result<Vec<u8>> {
        Ok(self.key.sign(message).to_bytes().to_vec())
    }
}

/// Signs drafts and verifies scanned payloads. Holds nothing but the key, so
/// it can be shared freely between issuing and scanning.
#[derive(Clone)]
pub struct SignatureService {
    signer: Arc<dyn PayloadSigner>,
}

impl SignatureService {
    pub fn new(signer: Arc<dyn PayloadSigner>) -> Self {
        Self { signer }
    }

    pub fn algorithm(&self) -> &'static str {
        self.signer.algorithm()
    }

    pub fn sign(&self, draft: &DraftPayload) -> Result<Signature> {
        let encoded = self
            .compute(&draft.signed_fields())
            .map_err(|e| match e {
                QrError::GenerationFailed(_) => e,
                other => QrError::GenerationFailed(other.to_string()),
            })?;
        Ok(Signature(encoded))
    }

    /// Expiry is checked before the signature so an expired code reports as
    /// expired even when it is otherwise genuine.
    pub fn verify(&self, payload: SignedPayload, now: DateTime<Utc>) -> Result<VerifiedPayload> {
        if payload.expires_at <= now {
            debug!(nonce = %payload.nonce, "payload expired at {}", payload.expires_at);
            return Err(QrError::Expired);
        }

        let expected = self
            .compute(&payload.signed_fields())
            .map_err(|e| QrError::Unexpected(e.to_string()))?;
        let matches: bool = expected.as_bytes().ct_eq(payload.signature.as_bytes()).into();
        if !matches {
            warn!(wallet = %payload.wallet_id, "signature mismatch on scanned payload");
            return Err(QrError::TamperedOrInvalidSignature);
        }

        Ok(VerifiedPayload::new(payload))
    }

    fn compute(&self, fields: &SignedFields<'_>) -> Result<String> {
        let canonical = canon::to_canonical_string(fields)
            .map_err(|e| QrError::GenerationFailed(format!("canonicalize: {e}")))?;
        let raw = self.signer.sign(canonical.as_bytes())?;
        Ok(URL_SAFE_NO_PAD.encode(raw))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::PayloadCodec;
    use crate::types::Amount;
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 18, 10, 0, 0).unwrap()
    }

    fn service() -> SignatureService {
        SignatureService::new(Arc::new(HmacSigner::new(b"test-secret".to_vec()).unwrap()))
    }

    fn issue(svc: &SignatureService) -> SignedPayload {
        let draft = PayloadCodec::default()
            .build_draft("WAL001", Some(1000.0), Some("USD"), Some("dinner"), 300, now())
            .unwrap();
        let sig = svc.sign(&draft).unwrap();
        draft.seal(sig)
    }

    #[test]
    fn sign_then_verify_at_creation() {
        let svc = service();
        let verified = svc.verify(issue(&svc), now()).unwrap();
        assert_eq!(verified.payload().wallet_id, "WAL001");
        assert_eq!(verified.payload().amount, Amount::new(1000.0));
    }

    #[test]
    fn signing_is_deterministic() {
        let svc = service();
        let draft = PayloadCodec::default()
            .build_draft("WAL001", None, None, None, 60, now())
            .unwrap();
        assert_eq!(svc.sign(&draft).unwrap(), svc.sign(&draft).unwrap());
    }

    #[test]
    fn expired_wins_over_bad_signature() {
        let svc = service();
        let mut p = issue(&svc);
        assert_eq!(svc.verify(p.clone(), now() + Duration::seconds(301)), Err(QrError::Expired));
        // exactly at expiry is already too late
        assert_eq!(svc.verify(p.clone(), now() + Duration::seconds(300)), Err(QrError::Expired));

        p.signature = "garbage".into();
        assert_eq!(svc.verify(p, now() + Duration::seconds(400)), Err(QrError::Expired));
    }

    #[test]
    fn any_signed_field_change_is_detected() {
        let svc = service();
        let base = issue(&svc);
        let mutations: Vec<Box<dyn Fn(&mut SignedPayload)>> = vec![
            Box::new(|p: &mut SignedPayload| p.amount = Amount::new(1.0)),
            Box::new(|p: &mut SignedPayload| p.amount = None),
            Box::new(|p: &mut SignedPayload| p.wallet_id = "WAL666".into()),
            Box::new(|p: &mut SignedPayload| p.currency = "EUR".into()),
            Box::new(|p: &mut SignedPayload| p.nonce = "another-nonce".into()),
            Box::new(|p: &mut SignedPayload| p.expires_at += Duration::seconds(3600)),
            Box::new(|p: &mut SignedPayload| p.version = 2),
        ];
        for mutate in mutations {
            let mut p = base.clone();
            mutate(&mut p);
            assert_eq!(svc.verify(p, now()), Err(QrError::TamperedOrInvalidSignature));
        }
    }

    #[test]
    fn note_is_outside_the_signed_set() {
        let svc = service();
        let mut p = issue(&svc);
        p.note = Some("edited".into());
        assert!(svc.verify(p, now()).is_ok());
    }

    #[test]
    fn other_key_is_rejected() {
        let p = issue(&service());
        let other = SignatureService::new(Arc::new(HmacSigner::new(b"other".to_vec()).unwrap()));
        assert_eq!(other.verify(p, now()), Err(QrError::TamperedOrInvalidSignature));
    }

    #[test]
    fn ed25519_round_trip() {
        let signer = Ed25519Signer::from_seed(&[7u8; 32]).unwrap();
        assert_eq!(signer.verifying_key_b64().len(), 43);
        let svc = SignatureService::new(Arc::new(signer));
        let mut p = issue(&svc);
        assert_eq!(URL_SAFE_NO_PAD.decode(&p.signature).unwrap().len(), 64);
        assert!(svc.verify(p.clone(), now()).is_ok());
        p.wallet_id = "WAL002".into();
        assert_eq!(svc.verify(p, now()), Err(QrError::TamperedOrInvalidSignature));
    }

    #[test]
    fn empty_secret_and_short_seed_are_refused() {
        assert!(HmacSigner::new(Vec::<u8>::new()).is_err());
        assert!(Ed25519Signer::from_seed(&[1u8; 16]).is_err());
    }
}
