use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use anyhow::{anyhow, bail, Context};
use base64::{
    engine::general_purpose::{STANDARD_NO_PAD, URL_SAFE_NO_PAD},
    Engine,
};
use rand::RngCore;
use tracing::warn;
use zeroize::Zeroizing;

use crate::codec::{DEFAULT_CURRENCY, DEFAULT_SCHEME};
use crate::controller::DEFAULT_TTL_SECS;
use crate::signature::{Ed25519Signer, HmacSigner, PayloadSigner};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SigningAlg {
    Hmac,
    Ed25519,
}

pub struct Config {
    pub bind: SocketAddr,
    pub scheme: String,
    pub default_currency: String,
    pub default_ttl_secs: i64,
    pub signing_alg: SigningAlg,
    pub signing_key: Option<Zeroizing<Vec<u8>>>,
    pub request_timeout: StdDuration,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let bind: SocketAddr = get("QRPAY_BIND")
            .unwrap_or_else(|| "0.0.0.0:8080".into())
            .parse()
            .context("QRPAY_BIND")?;
        let scheme = get("QRPAY_SCHEME").unwrap_or_else(|| DEFAULT_SCHEME.into());
        if scheme.is_empty() || !scheme.chars().all(|c| c.is_ascii_alphanumeric() || "+-.".contains(c)) {
            bail!("QRPAY_SCHEME `{scheme}` is not a valid URI scheme");
        }
        let default_currency = get("QRPAY_DEFAULT_CURRENCY")
            .map(|c| c.trim().to_string())
            .unwrap_or_else(|| DEFAULT_CURRENCY.into());
        if default_currency.is_empty() {
            bail!("QRPAY_DEFAULT_CURRENCY must not be empty");
        }
        let default_ttl_secs: i64 = match get("QRPAY_DEFAULT_TTL_SECS") {
            Some(v) => v.parse().context("QRPAY_DEFAULT_TTL_SECS")?,
            None => DEFAULT_TTL_SECS,
        };
        if default_ttl_secs <= 0 {
            bail!("QRPAY_DEFAULT_TTL_SECS must be positive");
        }
        let signing_alg = match get("QRPAY_SIGNING_ALG").as_deref().unwrap_or("hmac") {
            "hmac" | "hmac-sha256" => SigningAlg::Hmac,
            "ed25519" => SigningAlg::Ed25519,
            other => bail!("unknown QRPAY_SIGNING_ALG `{other}`"),
        };
        let signing_key = match get("QRPAY_SIGNING_KEY_B64") {
            Some(v) => Some(Zeroizing::new(decode_key(&v)?)),
            None => None,
        };
        let request_timeout_secs: u64 = match get("QRPAY_REQUEST_TIMEOUT_SECS") {
            Some(v) => v.parse().context("QRPAY_REQUEST_TIMEOUT_SECS")?,
            None => 10,
        };
        if request_timeout_secs == 0 {
            bail!("QRPAY_REQUEST_TIMEOUT_SECS must be positive");
        }
        let request_timeout = StdDuration::from_secs(request_timeout_secs);

        Ok(Self {
            bind,
            scheme,
            default_currency,
            default_ttl_secs,
            signing_alg,
            signing_key,
            request_timeout,
        })
    }

    /// Without a configured key a random one is made up, so codes issued
    /// before a restart stop verifying.
    pub fn build_signer(&self) -> anyhow::Result<Arc<dyn PayloadSigner>> {
        let key = match &self.signing_key {
            Some(k) => k.clone(),
            None => {
                warn!("QRPAY_SIGNING_KEY_B64 not set; using a random per-process key");
                let mut b = Zeroizing::new(vec![0u8; 32]);
                rand::thread_rng().fill_bytes(&mut b);
                b
            }
        };
        let signer: Arc<dyn PayloadSigner> = match self.signing_alg {
            SigningAlg::Hmac => Arc::new(HmacSigner::new(key.to_vec()).map_err(|e| anyhow!("{e}"))?),
            SigningAlg::Ed25519 => Arc::new(Ed25519Signer::from_seed(&key).map_err(|e| anyhow!("{e}"))?),
        };
        Ok(signer)
    }
}

fn decode_key(v: &str) -> anyhow::Result<Vec<u8>> {
    let trimmed = v.trim().trim_end_matches('=');
    URL_SAFE_NO_PAD
        .decode(trimmed)
        .or_else(|_| STANDARD_NO_PAD.decode(trimmed))
        .context("QRPAY_SIGNING_KEY_B64 is not base64")
}
