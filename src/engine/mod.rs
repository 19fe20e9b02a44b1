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

//! Payment reconciliation engine.
//!
//! The [`Engine`] is the central component that merges payment events into
//! the ledger and answers "how much has this student paid?".
//!
//! # Operations
//!
//! - **Record payment**: idempotent on the transaction ID; links the entry to
//!   the student when one exists, otherwise keeps it under the matric number.
//! - **Resolve status**: by reference or by matric number, always through the
//!   same balance calculation.
//! - **Complete registration**: upserts the student and retroactively links
//!   payments made before the student existed.
//! - **Initiate / verify payment**: issue a gateway reference, then poll it.
//!
//! # Consistency
//!
//! The aggregate cached on a student is best-effort. A payment that
//! completes adds its amount to the cache. Every read compares the cache
//! with the total derived from raw entries and, when the cache is behind,
//! answers from the entries and writes the cache back. No store transaction
//! spans an entry write and the cache write; a crash in between leaves a
//! stale cache that the next read repairs.

mod initiate;
mod reconcile;
mod registration;
mod status;

pub use initiate::{InitiatePayment, InitiatedPayment};
pub use reconcile::RecordPayment;
pub use registration::Registration;
pub use status::{PaymentDetails, StatusReport};

use crate::LedgerError;
use crate::base::{EntryId, MatricNumber};
use crate::issuer::{ReferenceIssuer, SandboxIssuer};
use crate::payment::{PaymentEntry, completed_total};
use crate::store::{LedgerStore, MemoryStore};
use crate::student::StudentIdentity;
use crate::summary::{FeeSchedule, PaymentSummary};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, warn};

pub const DEFAULT_PAYER_PHONE: &str = "08000000000";

/// Largest amount a single payment may carry.
pub const MAX_PAYMENT_AMOUNT: Decimal = dec!(1000000000000);

/// Payment reconciliation engine.
///
/// Cheap to share: wrap it in an [`Arc`] and call it from any thread. Every
/// method is one short unit of work against the store.
///
/// # Invariants
///
/// - At most one entry exists per transaction ID.
/// - Entry status only moves forward (`Pending` to `Completed` or `Failed`).
/// - A completed entry is added to its student's cached `total_paid` at
///   most once, and the cache is never lowered.
pub struct Engine {
    store: Arc<dyn LedgerStore>,
    issuer: Arc<dyn ReferenceIssuer>,
    schedule: FeeSchedule,
    payer_phone_fallback: String,
}

impl Engine {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        issuer: Arc<dyn ReferenceIssuer>,
        schedule: FeeSchedule,
    ) -> Self {
        Engine {
            store,
            issuer,
            schedule,
            payer_phone_fallback: DEFAULT_PAYER_PHONE.to_string(),
        }
    }

    /// Engine over a fresh [`MemoryStore`] and [`SandboxIssuer`].
    pub fn in_memory(schedule: FeeSchedule) -> Self {
        Self::new(
            Arc::new(MemoryStore::new()),
            Arc::new(SandboxIssuer::new()),
            schedule,
        )
    }

    pub fn with_payer_phone_fallback(mut self, phone: impl Into<String>) -> Self {
        self.payer_phone_fallback = phone.into();
        self
    }

    pub fn schedule(&self) -> &FeeSchedule {
        &self.schedule
    }

    pub fn store(&self) -> &dyn LedgerStore {
        self.store.as_ref()
    }

    /// Current aggregate for a matric number.
    ///
    /// Reads the student's cache when the student exists (repairing it if it
    /// lags the entries), otherwise sums the completed entries recorded under
    /// the matric number.
    pub fn current_summary(&self, matric_number: &MatricNumber) -> Result<PaymentSummary, LedgerError> {
        Ok(self.summary_and_student(matric_number)?.0)
    }

    fn summary_and_student(
        &self,
        matric_number: &MatricNumber,
    ) -> Result<(PaymentSummary, Option<StudentIdentity>), LedgerError> {
        match self.store.find_student_by_matric(matric_number)? {
            Some(student) => Ok((self.student_summary(&student)?, Some(student))),
            None => {
                let entries = self.store.entries_for_matric(matric_number)?;
                Ok((self.schedule.summarize(completed_total(&entries)), None))
            }
        }
    }

    /// Entries counted towards a student: those linked to them plus unlinked
    /// entries carrying their matric number. Most recent first.
    fn attributable_entries(
        &self,
        student: &StudentIdentity,
    ) -> Result<Vec<PaymentEntry>, LedgerError> {
        let mut entries = self.store.entries_for_student(student.id)?;
        let mut seen: HashSet<_> = entries.iter().map(|entry| entry.id).collect();
        for entry in self.store.entries_for_matric(&student.matric_number)? {
            if entry.student_id.is_none() && seen.insert(entry.id) {
                entries.push(entry);
            }
        }
        entries.sort_by(|a, b| b.recency().cmp(&a.recency()));
        Ok(entries)
    }

    /// Two-tier read of a student's aggregate.
    fn student_summary(&self, student: &StudentIdentity) -> Result<PaymentSummary, LedgerError> {
        let entries = self.attributable_entries(student)?;
        let derived = completed_total(&entries);
        if derived <= student.total_paid {
            return Ok(student.cached_summary(&self.schedule));
        }

        warn!(
            matric = %student.matric_number,
            cached = %student.total_paid,
            %derived,
            "cached total is behind payment entries, repairing"
        );
        self.raise_cache(student, derived, &completed_ids(&entries));
        Ok(self.schedule.summarize(derived))
    }

    /// Adds entries that just became completed (or just became the
    /// student's) to the cached total, then repairs the cache if it still
    /// lags the entries.
    ///
    /// Best-effort: failures are logged and left for the next read to repair.
    fn credit_student_cache(&self, student: &StudentIdentity, entries: &[PaymentEntry]) {
        let credits: Vec<(EntryId, Decimal)> = entries
            .iter()
            .filter(|entry| entry.is_completed())
            .map(|entry| (entry.id, entry.amount))
            .collect();
        if credits.is_empty() {
            self.sync_student_cache(student);
            return;
        }

        match self
            .store
            .credit_student_total(student.id, &credits, &self.schedule)
        {
            Ok(updated) => {
                info!(
                    matric = %updated.matric_number,
                    credited = credits.len(),
                    total_paid = %updated.total_paid,
                    remaining = %updated.remaining_balance,
                    "student aggregate updated"
                );
                self.sync_student_cache(&updated);
            }
            Err(err) => warn!(
                matric = %student.matric_number,
                error = %err,
                "failed to update cached aggregate"
            ),
        }
    }

    /// Recomputes a student's cache from raw entries.
    ///
    /// Best-effort: failures are logged and left for the next read to repair.
    fn sync_student_cache(&self, student: &StudentIdentity) {
        match self.attributable_entries(student) {
            Ok(entries) => {
                let derived = completed_total(&entries);
                if derived > student.total_paid {
                    self.raise_cache(student, derived, &completed_ids(&entries));
                }
            }
            Err(err) => {
                warn!(matric = %student.matric_number, error = %err, "deferred cache refresh");
            }
        }
    }

    fn raise_cache(&self, student: &StudentIdentity, total_paid: Decimal, counted: &[EntryId]) {
        match self
            .store
            .raise_student_total(student.id, total_paid, counted, &self.schedule)
        {
            Ok(updated) => info!(
                matric = %updated.matric_number,
                total_paid = %updated.total_paid,
                remaining = %updated.remaining_balance,
                "student aggregate repaired"
            ),
            Err(err) => warn!(
                matric = %student.matric_number,
                error = %err,
                "failed to update cached aggregate"
            ),
        }
    }
}

fn completed_ids(entries: &[PaymentEntry]) -> Vec<EntryId> {
    entries
        .iter()
        .filter(|entry| entry.is_completed())
        .map(|entry| entry.id)
        .collect()
}

/// Trims a required text field, rejecting blank values.
fn required(field: &str, value: &str) -> Result<String, LedgerError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(LedgerError::Validation(format!("{field} is required")));
    }
    Ok(trimmed.to_string())
}

fn positive_amount(amount: Decimal) -> Result<Decimal, LedgerError> {
    if amount <= Decimal::ZERO {
        return Err(LedgerError::Validation(format!(
            "amount must be positive, got {amount}"
        )));
    }
    if amount > MAX_PAYMENT_AMOUNT {
        return Err(LedgerError::Validation(format!(
            "amount must not exceed {MAX_PAYMENT_AMOUNT}, got {amount}"
        )));
    }
    Ok(amount)
}
