//! Signed, time-limited QR payment requests.
//!
//! A sender issues a code (`neowallet://pay?v=1&payload=...`) bound to an
//! expiry and a keyed signature; a receiver parses, verifies and turns it
//! into a [`types::PaymentIntent`].

pub mod api;
pub mod canon;
pub mod capture;
pub mod clock;
pub mod codec;
pub mod config;
pub mod confirm;
pub mod controller;
pub mod countdown;
pub mod error;
pub mod signature;
pub mod types;

pub use error::{QrError, Result};
