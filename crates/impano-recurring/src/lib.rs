//! # impano-recurring — Recurring-Donation Domain
//!
//! The state machine and records behind recurring giving:
//!
//! - **Schedule** ([`schedule`]): calendar arithmetic for due dates.
//!   Monthly/quarterly/yearly periods are computed from the *previous*
//!   `next_charge_date`, never from "today", so a batch that runs late
//!   does not accumulate drift.
//! - **Subscription** ([`subscription`]): the `active → paused → cancelled`
//!   lifecycle with explicit transition validation, the once-per-due-date
//!   charge claim, and the enumerated patch type for edits.
//! - **Donation** ([`donation`]): the immutable charge-attempt record built
//!   from a subscription, with a forward-only payment-status machine and
//!   collision-resistant transaction ids.
//!
//! Everything here is pure domain logic — persistence and gateway I/O live
//! in `impano-api` and `impano-gateway`.

pub mod donation;
pub mod schedule;
pub mod subscription;

pub use donation::{
    Donation, DonationError, DonationMetadata, DonationType, PaymentDetails, PaymentMethod,
    PaymentStatus,
};
pub use schedule::next_charge_date;
pub use subscription::{
    ChargeClaim, Frequency, MobileMoneyProvider, PaymentMethodDetails, RecurringSubscription,
    SubscriptionError, SubscriptionPatch, SubscriptionStatus,
};
