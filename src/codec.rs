//! Payment payload codec.
//!
//! Builds drafts, writes issued payloads into a transport string
//! (`<scheme>://pay?v=<version>&payload=<base64url(canonical json)>`), and
//! reads them back. Reading is purely structural: expiry and signature
//! checks belong to the signature service.

use base64::{
    engine::general_purpose::{STANDARD_NO_PAD, URL_SAFE_NO_PAD},
    Engine,
};
use chrono::{DateTime, Duration, SubsecRound, Utc};
use rand::RngCore;
use serde::Deserialize;
use tracing::debug;
use url::Url;

use crate::canon;
use crate::error::{QrError, Result};
use crate::types::{iso_millis, Amount, DraftPayload, SignedPayload, PROTOCOL_VERSION};

pub const DEFAULT_SCHEME: &str = "neowallet";
pub const DEFAULT_CURRENCY: &str = "USD";

const PAY_HOST: &str = "pay";
const NONCE_BYTES: usize = 24;

#[derive(Debug, Clone)]
pub struct PayloadCodec {
    scheme: String,
    default_currency: String,
}

impl Default for PayloadCodec {
    fn default() -> Self {
        Self::new(DEFAULT_SCHEME, DEFAULT_CURRENCY)
    }
}

/// Wire shape accepted by `parse`. Older generators wrote `v` and `sig`.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WirePayload {
    #[serde(alias = "v")]
    version: u64,
    wallet_id: String,
    #[serde(default)]
    amount: Option<Amount>,
    #[serde(default)]
    currency: Option<String>,
    #[serde(default)]
    note: Option<String>,
    #[serde(with = "iso_millis")]
    expires_at: DateTime<Utc>,
    nonce: String,
    #[serde(alias = "sig")]
    signature: String,
}

impl PayloadCodec {
    pub fn new(scheme: impl Into<String>, default_currency: impl Into<String>) -> Self {
        Self {
            scheme: scheme.into().to_ascii_lowercase(),
            default_currency: default_currency.into(),
        }
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    pub fn default_currency(&self) -> &str {
        &self.default_currency
    }

    /// Pre-signature payload with a fresh nonce and `expiresAt = now + ttl`.
    pub fn build_draft(
        &self,
        wallet_id: &str,
        amount: Option<f64>,
        currency: Option<&str>,
        note: Option<&str>,
        ttl_seconds: i64,
        now: DateTime<Utc>,
    ) -> Result<DraftPayload> {
        let wallet_id = wallet_id.trim();
        if wallet_id.is_empty() {
            return Err(QrError::InvalidInput("walletId is required".into()));
        }
        if ttl_seconds <= 0 {
            return Err(QrError::InvalidInput("ttlSeconds must be positive".into()));
        }
        let amount = match amount {
            Some(raw) => Some(
                Amount::new(raw)
                    .ok_or_else(|| QrError::InvalidInput("amount must be a non-negative number".into()))?,
            ),
            None => None,
        };

        // Millisecond precision is what goes on the wire.
        let created_at = now.trunc_subsecs(3);
        let expires_at = Duration::try_seconds(ttl_seconds)
            .and_then(|ttl| created_at.checked_add_signed(ttl))
            .ok_or_else(|| QrError::InvalidInput("ttlSeconds is out of range".into()))?;

        Ok(DraftPayload {
            version: PROTOCOL_VERSION,
            wallet_id: wallet_id.to_string(),
            amount,
            currency: self.currency_or_default(currency),
            note: note.map(str::to_string),
            created_at,
            expires_at,
            nonce: gen_nonce(),
        })
    }

    pub fn serialize(&self, payload: &SignedPayload) -> Result<String> {
        let json = canon::to_canonical_string(payload)
            .map_err(|e| QrError::GenerationFailed(format!("encode payload: {e}")))?;
        Ok(format!(
            "{}://{PAY_HOST}?v={}&payload={}",
            self.scheme,
            payload.version,
            URL_SAFE_NO_PAD.encode(json)
        ))
    }

    /// Accepts the URI form, a bare base64 payload, or bare JSON.
    pub fn parse(&self, input: &str) -> Result<SignedPayload> {
        let input = input.trim();
        if input.is_empty() {
            return Err(malformed("empty input"));
        }
        if input.starts_with('{') {
            debug!("parsing bare JSON payload");
            return self.validate(decode_wire(input.as_bytes())?);
        }
        if input.contains("://") {
            return self.parse_uri(input);
        }
        debug!("parsing bare encoded payload");
        let bytes = decode_b64(input)?;
        self.validate(decode_wire(&bytes)?)
    }

    fn parse_uri(&self, input: &str) -> Result<SignedPayload> {
        let uri = Url::parse(input).map_err(|e| malformed(format!("not a valid URI: {e}")))?;
        if uri.scheme() != self.scheme {
            return Err(malformed(format!("unexpected scheme `{}`", uri.scheme())));
        }
        if uri.host_str() != Some(PAY_HOST) {
            return Err(malformed("not a payment URI"));
        }

        let mut version_param = None;
        let mut encoded = None;
        for (k, v) in uri.query_pairs() {
            match &*k {
                "v" => version_param = Some(v.into_owned()),
                "payload" => encoded = Some(v.into_owned()),
                _ => {}
            }
        }
        let encoded = encoded.ok_or_else(|| malformed("missing payload parameter"))?;

        let uri_version = match version_param {
            Some(v) => Some(
                v.parse::<u64>()
                    .map_err(|_| malformed(format!("invalid version parameter `{v}`")))?,
            ),
            None => None,
        };
        if let Some(v) = uri_version {
            if v != PROTOCOL_VERSION {
                return Err(QrError::UnsupportedVersion(v));
            }
        }

        // Query decoding turns a standard-alphabet `+` into a space.
        let bytes = decode_b64(&encoded.replace(' ', "+"))?;
        let wire = decode_wire(&bytes)?;
        // A supported `v` wrapped around a different body version is a broken
        // envelope, not a newer protocol.
        if let Some(v) = uri_version {
            if v != wire.version {
                return Err(malformed("URI version does not match payload version"));
            }
        }
        self.validate(wire)
    }

    fn validate(&self, wire: WirePayload) -> Result<SignedPayload> {
        if wire.version != PROTOCOL_VERSION {
            return Err(QrError::UnsupportedVersion(wire.version));
        }
        for (name, value) in [
            ("walletId", &wire.wallet_id),
            ("nonce", &wire.nonce),
            ("signature", &wire.signature),
        ] {
            if value.trim().is_empty() {
                return Err(malformed(format!("{name} is empty")));
            }
        }

        Ok(SignedPayload {
            version: wire.version,
            wallet_id: wire.wallet_id,
            amount: wire.amount,
            currency: self.currency_or_default(wire.currency.as_deref()),
            note: wire.note,
            expires_at: wire.expires_at,
            nonce: wire.nonce,
            signature: wire.signature,
        })
    }

    fn currency_or_default(&self, currency: Option<&str>) -> String {
        currency
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .unwrap_or(self.default_currency.as_str())
            .to_string()
    }
}

fn decode_wire(bytes: &[u8]) -> Result<WirePayload> {
    serde_json::from_slice(bytes).map_err(|e| malformed(format!("invalid payload JSON: {e}")))
}

fn gen_nonce() -> String {
    let mut b = [0u8; NONCE_BYTES];
    rand::thread_rng().fill_bytes(&mut b);
    URL_SAFE_NO_PAD.encode(b)
}

/// URL-safe or standard alphabet, padded or not.
fn decode_b64(s: &str) -> Result<Vec<u8>> {
    let trimmed = s.trim_end_matches('=');
    URL_SAFE_NO_PAD
        .decode(trimmed)
        .or_else(|_| STANDARD_NO_PAD.decode(trimmed))
        .map_err(|e| malformed(format!("invalid base64: {e}")))
}

fn malformed(why: impl Into<String>) -> QrError {
    QrError::MalformedPayload(why.into())
}
