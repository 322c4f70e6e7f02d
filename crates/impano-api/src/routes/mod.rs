//! # API Route Modules
//!
//! Route modules for the donation platform API surface:
//!
//! - `donors` — Donor registration and lookup.
//! - `subscriptions` — Recurring subscription lifecycle: create, patch,
//!   cancel, pause, resume.
//! - `donations` — Donation records and the recurring charge batch
//!   trigger.

use serde::Deserialize;
use utoipa::ToSchema;

pub mod donations;
pub mod donors;
pub mod subscriptions;

/// Pagination parameters for list endpoints.
#[derive(Debug, Deserialize, Default, ToSchema)]
pub struct PaginationParams {
    /// Maximum number of items to return (default: 100, max: 1000).
    pub limit: Option<usize>,
    /// Number of items to skip (default: 0).
    pub offset: Option<usize>,
}

impl PaginationParams {
    const DEFAULT_LIMIT: usize = 100;
    const MAX_LIMIT: usize = 1000;

    pub(crate) fn effective_limit(&self) -> usize {
        self.limit
            .unwrap_or(Self::DEFAULT_LIMIT)
            .min(Self::MAX_LIMIT)
    }

    pub(crate) fn effective_offset(&self) -> usize {
        self.offset.unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pagination_defaults() {
        let p = PaginationParams::default();
        assert_eq!(p.effective_limit(), 100);
        assert_eq!(p.effective_offset(), 0);
    }

    #[test]
    fn pagination_caps_limit() {
        let p = PaginationParams {
            limit: Some(50_000),
            offset: Some(7),
        };
        assert_eq!(p.effective_limit(), 1000);
        assert_eq!(p.effective_offset(), 7);
    }
}
