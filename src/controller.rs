//! QR lifecycle controller.
//!
//! Sender side: draft, sign, serialize, all or nothing, then show the code in
//! a display slot with its own countdown. Receiver side: every scan, whatever
//! its source, goes through `consume_scan`.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use tracing::{info, warn};
use uuid::Uuid;

use crate::clock::Clock;
use crate::codec::PayloadCodec;
use crate::confirm::{PaymentConfirmation, PendingPayment};
use crate::countdown::{SlotRegistry, SlotStatus};
use crate::error::{QrError, Result};
use crate::signature::SignatureService;
use crate::types::{GenerateParams, IssuedCode, PaymentIntent, ScanSource};

pub const DEFAULT_TTL_SECS: i64 = 300;

pub struct QrController {
    codec: PayloadCodec,
    signatures: SignatureService,
    clock: Arc<dyn Clock>,
    confirmation: Arc<dyn PaymentConfirmation>,
    slots: SlotRegistry,
    default_ttl_secs: i64,
}

impl QrController {
    pub fn new(
        codec: PayloadCodec,
        signatures: SignatureService,
        clock: Arc<dyn Clock>,
        confirmation: Arc<dyn PaymentConfirmation>,
    ) -> Self {
        Self {
            codec,
            signatures,
            slots: SlotRegistry::new(clock.clone()),
            clock,
            confirmation,
            default_ttl_secs: DEFAULT_TTL_SECS,
        }
    }

    /// Countdown refresh interval for display slots.
    pub fn with_countdown_tick(mut self, tick: StdDuration) -> Self {
        self.slots = SlotRegistry::with_tick(self.clock.clone(), tick);
        self
    }

    pub fn with_default_ttl(mut self, secs: i64) -> Self {
        self.default_ttl_secs = secs;
        self
    }

    pub fn codec(&self) -> &PayloadCodec {
        &self.codec
    }

    pub fn clock(&self) -> Arc<dyn Clock> {
        self.clock.clone()
    }

    pub fn slots(&self) -> &SlotRegistry {
        &self.slots
    }

    /// Issues a brand-new code and shows it in `slot`, cancelling the
    /// countdown of whatever the slot showed before. Refreshing is just
    /// calling this again; the new code carries a new nonce, expiry and
    /// signature. Must be called inside a tokio runtime.
    pub fn generate(&self, slot: Uuid, params: &GenerateParams) -> Result<IssuedCode> {
        let code = self.issue(params)?;
        self.slots.present(slot, code.clone());
        Ok(code)
    }

    pub fn slot_status(&self, slot: Uuid) -> Result<SlotStatus> {
        self.slots.status(slot)
    }

    /// Stops the slot's countdown and forgets the code it showed.
    pub fn close(&self, slot: Uuid) -> Result<()> {
        self.slots.close(slot)
    }

    fn issue(&self, params: &GenerateParams) -> Result<IssuedCode> {
        let draft = self.codec.build_draft(
            &params.wallet_id,
            params.amount,
            params.currency.as_deref(),
            params.note.as_deref(),
            params.ttl_seconds.unwrap_or(self.default_ttl_secs),
            self.clock.now(),
        )?;
        let signature = self.signatures.sign(&draft).map_err(generation_failed)?;
        let payload = draft.seal(signature);
        let display_string = self.codec.serialize(&payload).map_err(generation_failed)?;

        info!(
            wallet = %payload.wallet_id,
            expires_at = %payload.expires_at,
            alg = self.signatures.algorithm(),
            "issued payment code"
        );
        Ok(IssuedCode { display_string, expires_at: payload.expires_at, payload })
    }

    /// Parse, verify against the current time, and map to a payment intent.
    pub fn consume_scan(&self, raw: &str, source: ScanSource) -> Result<PaymentIntent> {
        let verified = self
            .codec
            .parse(raw)
            .and_then(|payload| self.signatures.verify(payload, self.clock.now()));
        match verified {
            Ok(v) => {
                info!(?source, wallet = %v.payload().wallet_id, "scan verified");
                Ok(v.into_intent())
            }
            Err(e) => {
                warn!(?source, code = e.code(), "scan rejected: {e}");
                Err(e)
            }
        }
    }

    /// `consume_scan`, then hand the intent to the confirmation step.
    pub fn consume_and_confirm(&self, raw: &str, source: ScanSource) -> Result<PendingPayment> {
        let intent = self.consume_scan(raw, source)?;
        self.confirmation.submit(intent).map_err(|e| match e {
            QrError::Unexpected(_) => e,
            other => QrError::Unexpected(other.to_string()),
        })
    }
}

fn generation_failed(e: QrError) -> QrError {
    match e {
        QrError::GenerationFailed(_) => e,
        other => QrError::GenerationFailed(other.to_string()),
    }
}
