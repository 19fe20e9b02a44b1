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

//! # Hostel Fee Ledger
//!
//! Payment reconciliation for a flat hostel fee. Payments arrive from several
//! entry points, often before the student who made them is registered; the
//! ledger deduplicates them, links them to students when it can, and answers
//! how much of the fee has been paid.
//!
//! ## Core Components
//!
//! - [`Engine`]: Reconciler, status resolver and registration gate
//! - [`FeeSchedule`] / [`compute_summary`]: The balance calculator
//! - [`LedgerStore`]: Storage boundary, with the in-memory [`MemoryStore`]
//! - [`ReferenceIssuer`]: Payment gateway boundary, with [`SandboxIssuer`]
//! - [`LedgerError`]: Error taxonomy shared by every operation
//!
//! ## Example
//!
//! ```
//! use hostel_fee_ledger::{Engine, FeeSchedule, MatricNumber, RecordPayment, PaymentStatus};
//! use rust_decimal_macros::dec;
//!
//! let engine = Engine::in_memory(FeeSchedule::default());
//!
//! // A payment for a student who has not registered yet
//! let summary = engine
//!     .record_payment(RecordPayment::completed("TXN-1", "2020/1234", dec!(100000)))
//!     .unwrap();
//! assert_eq!(summary.remaining_balance, dec!(119000));
//!
//! // Replaying it changes nothing
//! let again = engine
//!     .record_payment(RecordPayment::completed("TXN-1", "2020/1234", dec!(100000)))
//!     .unwrap();
//! assert_eq!(again, summary);
//!
//! let report = engine.resolve_by_identity(&MatricNumber::from("2020/1234")).unwrap();
//! assert_eq!(report.status, PaymentStatus::Pending);
//! assert_eq!(report.summary.payment_percentage, 46);
//! ```
//!
//! ## Thread Safety
//!
//! The engine is `Send + Sync`. Concurrent submissions of the same
//! transaction ID are serialized by the store's uniqueness check, so the
//! ledger ends up with exactly one entry whichever call wins.

mod base;
pub mod config;
mod engine;
pub mod error;
pub mod http;
pub mod issuer;
mod payment;
pub mod store;
mod student;
mod summary;

pub use base::{EntryId, MatricNumber, Reference, StudentId, TransactionId};
pub use engine::{
    DEFAULT_PAYER_PHONE, Engine, InitiatePayment, InitiatedPayment, MAX_PAYMENT_AMOUNT,
    PaymentDetails, RecordPayment, Registration, StatusReport,
};
pub use error::{IssuerError, LedgerError, StoreError};
pub use issuer::{IssueOutcome, IssueRequest, ReferenceIssuer, SandboxIssuer};
pub use payment::{NewPaymentEntry, PaymentEntry, PaymentStatus, Transition};
pub use store::{LedgerStore, MemoryStore};
pub use student::{NewStudent, StudentIdentity, StudentProfile};
pub use summary::{DEFAULT_FEE_TARGET, FeeSchedule, PaymentSummary, compute_summary};
