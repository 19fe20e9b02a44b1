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

//! Payment entries.
//!
//! Entries follow a forward-only state machine:
//!
//! ```text
//!  Pending ──complete──► Completed
//!     │
//!     └─────fail───────► Failed
//! ```
//!
//! `Completed` and `Failed` are terminal. Entries are never deleted.

use crate::base::{EntryId, MatricNumber, Reference, StudentId, TransactionId};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    #[default]
    Pending,
    Completed,
    Failed,
}

impl PaymentStatus {
    /// Whether an entry in `self` may move to `next`.
    ///
    /// `Pending -> Pending` is allowed so a reference can be attached to a
    /// payment that has not settled yet.
    pub fn can_transition_to(self, next: PaymentStatus) -> bool {
        matches!(
            (self, next),
            (PaymentStatus::Pending, PaymentStatus::Pending)
                | (PaymentStatus::Pending, PaymentStatus::Completed)
                | (PaymentStatus::Pending, PaymentStatus::Failed)
        )
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, PaymentStatus::Pending)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Completed => "completed",
            PaymentStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pending" => Ok(PaymentStatus::Pending),
            "completed" => Ok(PaymentStatus::Completed),
            "failed" => Ok(PaymentStatus::Failed),
            other => Err(format!("unknown payment status '{other}'")),
        }
    }
}

/// A payment row as stored in the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentEntry {
    pub id: EntryId,
    pub transaction_id: TransactionId,
    pub reference: Option<Reference>,
    /// Weak link to the owning student; may be filled in long after creation.
    pub student_id: Option<StudentId>,
    /// Natural-key fallback used while `student_id` is empty.
    pub matric_number: Option<MatricNumber>,
    pub amount: Decimal,
    pub status: PaymentStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PaymentEntry {
    pub fn is_completed(&self) -> bool {
        self.status == PaymentStatus::Completed
    }

    pub fn is_linked(&self) -> bool {
        self.student_id.is_some()
    }

    /// Sort key for "most recent first" ordering: `created_at`, then `id`.
    pub fn recency(&self) -> (DateTime<Utc>, EntryId) {
        (self.created_at, self.id)
    }
}

/// Data needed to insert a new entry; the store assigns id and timestamps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPaymentEntry {
    pub transaction_id: TransactionId,
    pub reference: Option<Reference>,
    pub student_id: Option<StudentId>,
    pub matric_number: Option<MatricNumber>,
    pub amount: Decimal,
    pub status: PaymentStatus,
}

/// Outcome of applying a status transition to a stored entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    /// The entry after the transition attempt.
    pub entry: PaymentEntry,
    /// Status before the attempt.
    pub previous: PaymentStatus,
    /// False when the entry was already terminal and nothing was written.
    pub applied: bool,
}

impl Transition {
    /// True only for the single call that moved the entry into `Completed`.
    pub fn newly_completed(&self) -> bool {
        self.applied
            && self.previous != PaymentStatus::Completed
            && self.entry.status == PaymentStatus::Completed
    }
}

/// Sums the amounts of completed entries, saturating at [`Decimal::MAX`].
pub fn completed_total<'a>(entries: impl IntoIterator<Item = &'a PaymentEntry>) -> Decimal {
    entries
        .into_iter()
        .filter(|entry| entry.is_completed())
        .fold(Decimal::ZERO, |total, entry| {
            total.checked_add(entry.amount).unwrap_or(Decimal::MAX)
        })
}

/// Picks the most recent entry by `created_at`, ties broken by larger `id`.
pub fn most_recent<'a>(
    entries: impl IntoIterator<Item = &'a PaymentEntry>,
) -> Option<&'a PaymentEntry> {
    entries.into_iter().max_by_key(|entry| entry.recency())
}
