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

use super::Engine;
use crate::LedgerError;
use crate::base::{MatricNumber, Reference, TransactionId};
use crate::payment::{PaymentEntry, PaymentStatus, completed_total, most_recent};
use crate::summary::PaymentSummary;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

/// Payment progress as reported to the payer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusReport {
    pub status: PaymentStatus,
    pub summary: PaymentSummary,
    pub payment_details: Option<PaymentDetails>,
}

/// The entry a status report is about (or the latest one).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentDetails {
    pub reference: Option<Reference>,
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,
    pub status: PaymentStatus,
    pub payment_date: DateTime<Utc>,
    pub transaction_id: TransactionId,
    pub matric_number: Option<MatricNumber>,
}

impl PaymentDetails {
    fn of(entry: &PaymentEntry, matric_number: Option<MatricNumber>) -> Self {
        PaymentDetails {
            reference: entry.reference.clone(),
            amount: entry.amount,
            status: entry.status,
            payment_date: entry.created_at,
            transaction_id: entry.transaction_id.clone(),
            matric_number: matric_number.or_else(|| entry.matric_number.clone()),
        }
    }
}

impl Engine {
    /// Status of the payment carrying `reference`.
    ///
    /// The aggregate comes from, in order of preference: the linked student,
    /// all completed entries sharing the entry's matric number, or the entry
    /// alone.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::NotFound`] - No entry carries the reference.
    /// - [`LedgerError::StoreUnavailable`] - Store failure.
    pub fn resolve_by_reference(&self, reference: &Reference) -> Result<StatusReport, LedgerError> {
        let entry = self
            .store
            .find_entry_by_reference(reference)?
            .ok_or_else(|| LedgerError::NotFound(format!("payment with reference {reference}")))?;

        let student = match entry.student_id {
            Some(id) => self.store.find_student(id)?,
            None => None,
        };

        let (summary, matric_number) = if let Some(student) = student {
            (self.student_summary(&student)?, Some(student.matric_number))
        } else if let Some(matric) = &entry.matric_number {
            let entries = self.store.entries_for_matric(matric)?;
            (self.schedule.summarize(completed_total(&entries)), Some(matric.clone()))
        } else {
            (self.schedule.summarize(entry.amount), None)
        };

        Ok(StatusReport {
            status: entry.status,
            summary,
            payment_details: Some(PaymentDetails::of(&entry, matric_number)),
        })
    }

    /// Status of a student, registered or not.
    ///
    /// The reported status is derived: `Completed` once the fee is fully
    /// paid, `Pending` before that.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::Validation`] - Blank matric number.
    /// - [`LedgerError::StoreUnavailable`] - Store failure.
    pub fn resolve_by_identity(&self, matric_number: &MatricNumber) -> Result<StatusReport, LedgerError> {
        let matric_number = MatricNumber::new(super::required("matricNumber", matric_number.as_str())?);

        let (summary, latest) = match self.store.find_student_by_matric(&matric_number)? {
            Some(student) => {
                let entries = self.attributable_entries(&student)?;
                (self.student_summary(&student)?, most_recent(&entries).cloned())
            }
            None => {
                let entries = self.store.entries_for_matric(&matric_number)?;
                let summary = self.schedule.summarize(completed_total(&entries));
                (summary, most_recent(&entries).cloned())
            }
        };

        let status = if summary.is_fully_paid {
            PaymentStatus::Completed
        } else {
            PaymentStatus::Pending
        };

        Ok(StatusReport {
            status,
            summary,
            payment_details: latest.map(|entry| PaymentDetails::of(&entry, Some(matric_number.clone()))),
        })
    }
}
