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

use super::{Engine, positive_amount, required};
use crate::LedgerError;
use crate::base::{MatricNumber, Reference, TransactionId};
use crate::error::StoreError;
use crate::payment::{NewPaymentEntry, PaymentEntry, PaymentStatus, Transition};
use crate::summary::PaymentSummary;
use rust_decimal::Decimal;
use tracing::{debug, info, warn};

/// A payment event to merge into the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordPayment {
    pub transaction_id: TransactionId,
    pub matric_number: MatricNumber,
    pub amount: Decimal,
    pub status: PaymentStatus,
    pub reference: Option<Reference>,
}

impl RecordPayment {
    /// A completed payment without a reference.
    pub fn completed(
        transaction_id: impl Into<TransactionId>,
        matric_number: impl Into<MatricNumber>,
        amount: Decimal,
    ) -> Self {
        RecordPayment {
            transaction_id: transaction_id.into(),
            matric_number: matric_number.into(),
            amount,
            status: PaymentStatus::Completed,
            reference: None,
        }
    }

    pub fn with_status(mut self, status: PaymentStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_reference(mut self, reference: impl Into<Reference>) -> Self {
        self.reference = Some(reference.into());
        self
    }
}

impl Engine {
    /// Merges a payment event into the ledger and returns the student's
    /// aggregate afterwards.
    ///
    /// | Existing entry | Behavior |
    /// |----------------|----------|
    /// | none | Insert, linked to the student if one exists |
    /// | pending | Move to `status`, attach `reference` |
    /// | completed / failed | Nothing is written (replay) |
    ///
    /// Calling this any number of times with the same transaction ID leaves
    /// the ledger as the first successful call did.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::Validation`] - Blank identifiers or non-positive amount.
    /// - [`LedgerError::StoreUnavailable`] - Store failure; safe to retry.
    pub fn record_payment(&self, payment: RecordPayment) -> Result<PaymentSummary, LedgerError> {
        let transaction_id = TransactionId::new(required("transactionId", payment.transaction_id.as_str())?);
        let matric_number = MatricNumber::new(required("matricNumber", payment.matric_number.as_str())?);
        let amount = positive_amount(payment.amount)?;

        if let Some(existing) = self.store.find_entry_by_transaction(&transaction_id)? {
            return self.update_existing(existing, &matric_number, payment.status, payment.reference);
        }

        let student = self.store.find_student_by_matric(&matric_number)?;
        let new = NewPaymentEntry {
            transaction_id: transaction_id.clone(),
            reference: payment.reference.clone(),
            student_id: student.as_ref().map(|s| s.id),
            matric_number: Some(matric_number.clone()),
            amount,
            status: payment.status,
        };

        match self.store.insert_entry(new) {
            Ok(entry) => {
                info!(
                    transaction_id = %entry.transaction_id,
                    matric = %matric_number,
                    amount = %entry.amount,
                    status = %entry.status,
                    linked = entry.is_linked(),
                    "payment recorded"
                );
                if entry.is_completed() {
                    if let Some(student) = &student {
                        self.credit_student_cache(student, std::slice::from_ref(&entry));
                    }
                }
                self.current_summary(&matric_number)
            }
            Err(StoreError::DuplicateTransaction) => {
                // Lost a race with a concurrent submission of the same ID
                debug!(%transaction_id, "concurrent insert, falling back to update");
                let existing = self
                    .store
                    .find_entry_by_transaction(&transaction_id)?
                    .ok_or_else(|| {
                        LedgerError::StoreUnavailable(format!(
                            "transaction {transaction_id} reported as duplicate but not found"
                        ))
                    })?;
                self.update_existing(existing, &matric_number, payment.status, payment.reference)
            }
            Err(err) => Err(err.into()),
        }
    }

    fn update_existing(
        &self,
        existing: PaymentEntry,
        matric_number: &MatricNumber,
        status: PaymentStatus,
        reference: Option<Reference>,
    ) -> Result<PaymentSummary, LedgerError> {
        if existing.matric_number.as_ref() != Some(matric_number) {
            warn!(
                transaction_id = %existing.transaction_id,
                recorded = ?existing.matric_number,
                submitted = %matric_number,
                "replayed transaction carries a different matric number"
            );
        }

        if existing.status.is_terminal() {
            debug!(
                transaction_id = %existing.transaction_id,
                status = %existing.status,
                "payment already settled, replay ignored"
            );
            return self.current_summary(matric_number);
        }

        self.apply_transition(&existing, status, reference)?;
        self.current_summary(matric_number)
    }

    /// Moves a stored entry forward and credits the owner's cache when the
    /// entry has just completed.
    pub(super) fn apply_transition(
        &self,
        entry: &PaymentEntry,
        status: PaymentStatus,
        reference: Option<Reference>,
    ) -> Result<Transition, LedgerError> {
        let transition = self.store.transition_entry(entry.id, status, reference)?;
        if !transition.applied {
            return Ok(transition);
        }

        info!(
            transaction_id = %transition.entry.transaction_id,
            from = %transition.previous,
            to = %transition.entry.status,
            "payment status updated"
        );

        if transition.newly_completed() {
            let owner = match (&transition.entry.student_id, &transition.entry.matric_number) {
                (Some(id), _) => self.store.find_student(*id)?,
                (None, Some(matric)) => self.store.find_student_by_matric(matric)?,
                (None, None) => None,
            };
            if let Some(student) = owner {
                self.credit_student_cache(&student, std::slice::from_ref(&transition.entry));
            }
        }
        Ok(transition)
    }
}
