//! # impano-core — Foundational Types for the Impano Donation Platform
//!
//! Domain primitives shared by every other crate in the workspace:
//!
//! - **Identifiers** ([`identity`]): UUID-backed newtypes for donors,
//!   subscriptions, donations, projects, and programs, plus the validated
//!   [`TransactionId`] assigned to every charge attempt.
//! - **Currency** ([`currency`]): the supported currency set, the
//!   gateway-family routing rule, and the injected [`RateTable`] that
//!   converts foreign-currency amounts into the RWF settlement currency.
//! - **Money** ([`money`]): minor-unit (`i64` cents) formatting helpers.
//!
//! This crate performs no I/O and has no async code. Everything here is
//! valid by construction or validated at the parse boundary.

pub mod currency;
pub mod error;
pub mod identity;
pub mod money;

pub use currency::{gateway_for, Conversion, Currency, CurrencyError, GatewayKind, RateTable};
pub use error::ValidationError;
pub use identity::{DonationId, DonorId, ProgramId, ProjectId, SubscriptionId, TransactionId};
