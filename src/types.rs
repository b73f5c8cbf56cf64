// src/types.rs
use chrono::{DateTime, Utc};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use uuid::Uuid;

/// Only protocol version defined so far.
pub const PROTOCOL_VERSION: u64 = 1;

/// A finite, non-negative amount of money in major units.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Amount(f64);

impl Amount {
    pub fn new(value: f64) -> Option<Self> {
        (value.is_finite() && value >= 0.0).then_some(Self(value))
    }

    pub fn value(self) -> f64 {
        self.0
    }
}

// 2^53 - 1, the largest integer a JSON reader is guaranteed to keep exact.
const MAX_EXACT_INTEGER: f64 = 9_007_199_254_740_991.0;

impl Serialize for Amount {
    // Whole amounts go out as `1000`, not `1000.0`.
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        if self.0.fract() == 0.0 && self.0 <= MAX_EXACT_INTEGER {
            s.serialize_u64(self.0 as u64)
        } else {
            s.serialize_f64(self.0)
        }
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let raw = f64::deserialize(d)?;
        Amount::new(raw).ok_or_else(|| de::Error::custom("amount must be a finite non-negative number"))
    }
}

/// RFC 3339 UTC with millisecond precision and a `Z` suffix.
pub(crate) mod iso_millis {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn format(ts: &DateTime<Utc>) -> String {
        ts.to_rfc3339_opts(SecondsFormat::Millis, true)
    }

    pub fn serialize<S: Serializer>(ts: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&format(ts))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(d)?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|ts| ts.with_timezone(&Utc))
            .map_err(|e| de::Error::custom(format!("expiresAt is not an RFC 3339 timestamp: {e}")))
    }
}

/// Unsigned payment request, produced only by the codec.
#[derive(Debug, Clone, PartialEq)]
pub struct DraftPayload {
    pub(crate) version: u64,
    pub(crate) wallet_id: String,
    pub(crate) amount: Option<Amount>,
    pub(crate) currency: String,
    pub(crate) note: Option<String>,
    pub(crate) created_at: DateTime<Utc>,
    pub(crate) expires_at: DateTime<Utc>,
    pub(crate) nonce: String,
}

impl DraftPayload {
    pub fn wallet_id(&self) -> &str {
        &self.wallet_id
    }

    pub fn amount(&self) -> Option<Amount> {
        self.amount
    }

    pub fn currency(&self) -> &str {
        &self.currency
    }

    pub fn note(&self) -> Option<&str> {
        self.note.as_deref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    pub fn nonce(&self) -> &str {
        &self.nonce
    }

    pub(crate) fn signed_fields(&self) -> SignedFields<'_> {
        SignedFields {
            version: self.version,
            wallet_id: &self.wallet_id,
            amount: self.amount,
            currency: &self.currency,
            nonce: &self.nonce,
            expires_at: self.expires_at,
        }
    }

    /// Attach the signature computed over this exact draft. Consumes the
    /// draft, so nothing can change between signing and issuing.
    pub fn seal(self, signature: Signature) -> SignedPayload {
        SignedPayload {
            version: self.version,
            wallet_id: self.wallet_id,
            amount: self.amount,
            currency: self.currency,
            note: self.note,
            expires_at: self.expires_at,
            nonce: self.nonce,
            signature: signature.0,
        }
    }
}

/// The fields covered by a signature. Adding a field here is a protocol
/// version bump.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SignedFields<'a> {
    pub version: u64,
    pub wallet_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<Amount>,
    pub currency: &'a str,
    pub nonce: &'a str,
    #[serde(with = "iso_millis")]
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature(pub(crate) String);

impl Signature {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// A fully issued payload as it travels inside a code.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedPayload {
    pub version: u64,
    pub wallet_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<Amount>,
    pub currency: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(with = "iso_millis")]
    pub expires_at: DateTime<Utc>,
    pub nonce: String,
    pub signature: String,
}

impl SignedPayload {
    pub(crate) fn signed_fields(&self) -> SignedFields<'_> {
        SignedFields {
            version: self.version,
            wallet_id: &self.wallet_id,
            amount: self.amount,
            currency: &self.currency,
            nonce: &self.nonce,
            expires_at: self.expires_at,
        }
    }
}

/// A payload that passed both the expiry and the signature check. Only the
/// signature service can build one.
#[derive(Debug, Clone, PartialEq)]
pub struct VerifiedPayload {
    inner: SignedPayload,
}

impl VerifiedPayload {
    pub(crate) fn new(inner: SignedPayload) -> Self {
        Self { inner }
    }

    pub fn payload(&self) -> &SignedPayload {
        &self.inner
    }

    pub fn into_intent(self) -> PaymentIntent {
        PaymentIntent {
            wallet_id: self.inner.wallet_id,
            amount: self.inner.amount,
            currency: self.inner.currency,
            note: self.inner.note,
        }
    }
}

/// What the payment-confirmation step needs to move money.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentIntent {
    pub wallet_id: String,
    pub amount: Option<Amount>,
    pub currency: String,
    pub note: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanSource {
    Camera,
    Upload,
}

/// Parameters for issuing a new code.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateParams {
    pub wallet_id: String,
    pub amount: Option<f64>,
    pub currency: Option<String>,
    pub note: Option<String>,
    pub ttl_seconds: Option<i64>,
}

/// A code ready to be displayed.
#[derive(Debug, Clone, PartialEq)]
pub struct IssuedCode {
    pub display_string: String,
    pub expires_at: DateTime<Utc>,
    pub payload: SignedPayload,
}

// ---------- HTTP bodies ---------- //

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateReq {
    #[serde(flatten)]
    pub params: GenerateParams,
    pub slot_id: Option<Uuid>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateRes {
    pub slot_id: Uuid,
    pub display_string: String,
    pub expires_at: String,
    pub seconds_remaining: i64,
}

#[derive(Deserialize)]
pub struct ScanReq {
    pub raw: String,
    pub source: ScanSource,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotStatusRes {
    pub slot_id: Uuid,
    pub state: &'static str,
    pub seconds_remaining: i64,
    pub label: String,
    pub low_time: bool,
    pub expires_at: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn whole_amounts_serialize_as_integers() {
        let a = Amount::new(1000.0).unwrap();
        assert_eq!(serde_json::to_string(&a).unwrap(), "1000");
        let b = Amount::new(12.5).unwrap();
        assert_eq!(serde_json::to_string(&b).unwrap(), "12.5");
    }

    #[test]
    fn negative_amounts_are_rejected() {
        assert!(Amount::new(-1.0).is_none());
        assert!(Amount::new(f64::NAN).is_none());
        assert!(serde_json::from_str::<Amount>("-3").is_err());
        assert_eq!(serde_json::from_str::<Amount>("7").unwrap().value(), 7.0);
    }
}
