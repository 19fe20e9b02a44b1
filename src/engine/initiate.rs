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

use super::{Engine, RecordPayment, StatusReport, positive_amount, required};
use crate::LedgerError;
use crate::base::{MatricNumber, Reference, TransactionId};
use crate::issuer::{IssueOutcome, IssueRequest};
use crate::payment::PaymentStatus;
use crate::student::looks_like_email;
use crate::summary::PaymentSummary;
use chrono::Utc;
use rust_decimal::Decimal;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Payer details for a new payment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitiatePayment {
    pub matric_number: MatricNumber,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub amount: Decimal,
    pub phone_number: Option<String>,
}

/// A payment opened with the gateway, and the balance before it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitiatedPayment {
    /// `None` for in-page charges, which get their reference on completion.
    pub reference: Option<Reference>,
    pub transaction_id: TransactionId,
    pub summary: PaymentSummary,
}

impl Engine {
    /// Opens a payment with the gateway and records it as pending.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::Validation`] - Missing payer details or bad amount.
    /// - [`LedgerError::AmountExceedsBalance`] - More than is still owed.
    /// - [`LedgerError::Issuer`] - The gateway failed.
    /// - [`LedgerError::StoreUnavailable`] - Store failure.
    pub fn initiate_payment(&self, request: InitiatePayment) -> Result<InitiatedPayment, LedgerError> {
        let matric_number = MatricNumber::new(required("matricNumber", request.matric_number.as_str())?);
        let first_name = required("firstName", &request.first_name)?;
        let last_name = required("lastName", &request.last_name)?;
        let email = required("email", &request.email)?;
        if !looks_like_email(&email) {
            return Err(LedgerError::Validation(format!("invalid email address '{email}'")));
        }
        let amount = positive_amount(request.amount)?;

        let (summary, student) = self.summary_and_student(&matric_number)?;
        if amount > summary.remaining_balance {
            return Err(LedgerError::AmountExceedsBalance {
                amount,
                remaining: summary.remaining_balance,
            });
        }

        let transaction_id = mint_transaction_id(&matric_number);
        let payer_phone = request
            .phone_number
            .map(|phone| phone.trim().to_string())
            .filter(|phone| !phone.is_empty())
            .or_else(|| student.and_then(|s| s.profile.phone_number))
            .unwrap_or_else(|| self.payer_phone_fallback.clone());

        let issue = IssueRequest {
            order_id: transaction_id.clone(),
            amount,
            payer_name: format!("{first_name} {last_name}"),
            payer_email: email,
            payer_phone,
            description: format!("Hostel fee payment for {matric_number}"),
        };
        let reference = match self.issuer.issue(&issue) {
            Ok(IssueOutcome::Reference(reference)) => Some(reference),
            Ok(IssueOutcome::DirectCharge) => None,
            Err(err) => {
                warn!(matric = %matric_number, %transaction_id, code = err.code(), error = %err, "payment issuance failed");
                return Err(err.into());
            }
        };

        let pending = RecordPayment {
            transaction_id: transaction_id.clone(),
            matric_number: matric_number.clone(),
            amount,
            status: PaymentStatus::Pending,
            reference: reference.clone(),
        };
        self.record_payment(pending)?;
        info!(
            matric = %matric_number,
            %transaction_id,
            reference = ?reference,
            %amount,
            "payment initiated"
        );

        Ok(InitiatedPayment {
            reference,
            transaction_id,
            summary,
        })
    }

    /// Asks the gateway about a pending payment and applies its answer.
    ///
    /// Settled entries are reported as they are without calling the gateway.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::NotFound`] - No entry carries the reference.
    /// - [`LedgerError::Issuer`] - The gateway failed.
    /// - [`LedgerError::StoreUnavailable`] - Store failure.
    pub fn verify_payment(&self, reference: &Reference) -> Result<StatusReport, LedgerError> {
        let entry = self
            .store
            .find_entry_by_reference(reference)?
            .ok_or_else(|| LedgerError::NotFound(format!("payment with reference {reference}")))?;

        if entry.status == PaymentStatus::Pending {
            let status = self.issuer.check_status(reference)?;
            if status == PaymentStatus::Pending {
                debug!(%reference, "payment still pending at gateway");
            } else {
                self.apply_transition(&entry, status, None)?;
            }
        }
        self.resolve_by_reference(reference)
    }
}

/// `FEE-<matric>-<unix millis>-<8 hex>`; the random suffix keeps two
/// attempts in the same millisecond apart.
fn mint_transaction_id(matric_number: &MatricNumber) -> TransactionId {
    let suffix = Uuid::new_v4().simple().to_string();
    TransactionId::new(format!(
        "FEE-{}-{}-{}",
        matric_number,
        Utc::now().timestamp_millis(),
        &suffix[..8]
    ))
}
