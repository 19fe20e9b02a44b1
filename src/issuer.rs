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

//! Payment reference issuance.
//!
//! The gateway that hands out payment references is an external service.
//! [`ReferenceIssuer`] is the narrow view the engine needs of it; the
//! [`SandboxIssuer`] stands in for it in development and tests.

use crate::base::{Reference, TransactionId};
use crate::error::IssuerError;
use crate::payment::PaymentStatus;
use dashmap::DashMap;
use parking_lot::Mutex;
use rand::Rng;
use rust_decimal::Decimal;
use std::sync::atomic::{AtomicBool, Ordering};

/// What the gateway needs to open a payment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssueRequest {
    /// Our transaction ID, used by the gateway as its order ID.
    pub order_id: TransactionId,
    pub amount: Decimal,
    pub payer_name: String,
    pub payer_email: String,
    pub payer_phone: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IssueOutcome {
    /// Reference code the payer completes on the hosted page.
    Reference(Reference),
    /// Payment is taken in-page; a reference is assigned once it completes.
    DirectCharge,
}

pub trait ReferenceIssuer: Send + Sync {
    fn issue(&self, request: &IssueRequest) -> Result<IssueOutcome, IssuerError>;

    /// Current status of a previously issued reference.
    fn check_status(&self, reference: &Reference) -> Result<PaymentStatus, IssuerError>;
}

/// Development issuer that hands out random nine-digit references.
///
/// References stay pending until [`settle`](SandboxIssuer::settle) is called,
/// which mimics the payer finishing (or abandoning) the hosted payment.
#[derive(Debug, Default)]
pub struct SandboxIssuer {
    statuses: DashMap<Reference, PaymentStatus>,
    scripted_failure: Mutex<Option<IssuerError>>,
    direct_charge: AtomicBool,
}

impl SandboxIssuer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Issues [`IssueOutcome::DirectCharge`] instead of references.
    pub fn with_direct_charge(self) -> Self {
        self.direct_charge.store(true, Ordering::SeqCst);
        self
    }

    /// Records the gateway-side outcome of a reference.
    pub fn settle(&self, reference: &Reference, status: PaymentStatus) {
        self.statuses.insert(reference.clone(), status);
    }

    /// Makes the next call fail with `error`.
    pub fn fail_next(&self, error: IssuerError) {
        *self.scripted_failure.lock() = Some(error);
    }

    fn take_failure(&self) -> Result<(), IssuerError> {
        match self.scripted_failure.lock().take() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

impl ReferenceIssuer for SandboxIssuer {
    fn issue(&self, request: &IssueRequest) -> Result<IssueOutcome, IssuerError> {
        self.take_failure()?;
        if request.amount <= Decimal::ZERO {
            return Err(IssuerError::Rejected(format!(
                "invalid amount {}",
                request.amount
            )));
        }
        if self.direct_charge.load(Ordering::SeqCst) {
            return Ok(IssueOutcome::DirectCharge);
        }

        let mut rng = rand::thread_rng();
        let reference = loop {
            let candidate = Reference::new(rng.gen_range(100_000_000u32..1_000_000_000).to_string());
            if !self.statuses.contains_key(&candidate) {
                break candidate;
            }
        };
        self.statuses.insert(reference.clone(), PaymentStatus::Pending);
        tracing::debug!(%reference, order_id = %request.order_id, "sandbox reference issued");
        Ok(IssueOutcome::Reference(reference))
    }

    fn check_status(&self, reference: &Reference) -> Result<PaymentStatus, IssuerError> {
        self.take_failure()?;
        Ok(self
            .statuses
            .get(reference)
            .map(|status| *status)
            .unwrap_or(PaymentStatus::Pending))
    }
}
