// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2025 Daniel Negri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Error types for payment reconciliation.

use rust_decimal::Decimal;
use thiserror::Error;

/// Errors surfaced by the ledger engine to its callers.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// Caller input is missing or malformed. Never retried.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Requested payment is larger than what is still owed
    #[error("payment amount ({amount}) exceeds remaining balance ({remaining})")]
    AmountExceedsBalance { amount: Decimal, remaining: Decimal },

    /// Lookup miss
    #[error("not found: {0}")]
    NotFound(String),

    /// Ledger store could not be reached. Safe to retry the whole operation.
    #[error("ledger store unavailable: {0}")]
    StoreUnavailable(String),

    /// Payment reference service failed
    #[error(transparent)]
    Issuer(#[from] IssuerError),
}

impl LedgerError {
    /// Stable machine-readable code reported alongside the message.
    pub fn code(&self) -> &'static str {
        match self {
            LedgerError::Validation(_) => "VALIDATION_ERROR",
            LedgerError::AmountExceedsBalance { .. } => "INVALID_AMOUNT",
            LedgerError::NotFound(_) => "NOT_FOUND",
            LedgerError::StoreUnavailable(_) => "SERVER_ERROR",
            LedgerError::Issuer(err) => err.code(),
        }
    }
}

/// Errors reported by a [`LedgerStore`](crate::store::LedgerStore).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Store could not be reached
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// Insert collided with an existing transaction ID
    #[error("duplicate transaction ID")]
    DuplicateTransaction,

    /// Insert collided with an existing matric number
    #[error("duplicate matric number")]
    DuplicateStudent,

    /// Update targeted a row that does not exist
    #[error("record not found")]
    MissingRecord,
}

impl From<StoreError> for LedgerError {
    fn from(err: StoreError) -> Self {
        // Duplicate-key errors are handled inside the engine; anything that
        // escapes is an infrastructure problem from the caller's point of view.
        LedgerError::StoreUnavailable(err.to_string())
    }
}

/// Failures of the payment reference service.
///
/// The variants only differ in what the payer is told; internally every one
/// of them means "retry later".
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IssuerError {
    /// Gateway rejected our credentials
    #[error("The payment system is currently unavailable. Please try again later or contact support.")]
    Auth,

    /// Gateway did not answer in time
    #[error("The payment service is taking too long to respond. Please try again later.")]
    Timeout,

    /// Gateway could not be reached
    #[error("There seems to be a network issue. Please check your connection and try again.")]
    Network,

    /// Gateway answered but refused to issue a reference
    #[error("Unable to generate your payment reference: {0}")]
    Rejected(String),
}

impl IssuerError {
    pub fn code(&self) -> &'static str {
        match self {
            IssuerError::Auth => "AUTH_ERROR",
            IssuerError::Timeout => "TIMEOUT",
            IssuerError::Network => "NETWORK_ERROR",
            IssuerError::Rejected(_) => "GENERATION_FAILED",
        }
    }
}
