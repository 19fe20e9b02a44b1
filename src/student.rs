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

//! Student identity records.
//!
//! A [`StudentIdentity`] carries a cached payment aggregate. The cache is a
//! convenience for readers: the source of truth is always the set of
//! completed payment entries attributable to the student.

use crate::LedgerError;
use crate::base::{MatricNumber, StudentId};
use crate::summary::{FeeSchedule, PaymentSummary};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Personal and academic details collected on the registration form.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StudentProfile {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone_number: Option<String>,
    pub faculty: Option<String>,
    pub department: Option<String>,
    pub programme: Option<String>,
    pub level: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub gender: Option<String>,
    pub state_of_origin: Option<String>,
    pub marital_status: Option<String>,
    pub address: Option<String>,
    pub emergency_contact: Option<String>,
    pub emergency_contact_name: Option<String>,
    pub emergency_contact_relationship: Option<String>,
}

impl StudentProfile {
    pub fn new(
        first_name: impl Into<String>,
        last_name: impl Into<String>,
        email: impl Into<String>,
    ) -> Self {
        StudentProfile {
            first_name: first_name.into(),
            last_name: last_name.into(),
            email: email.into(),
            ..Default::default()
        }
    }

    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name.trim(), self.last_name.trim())
    }

    /// Checks the fields registration cannot proceed without.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Validation`] naming every missing field.
    pub fn validate(&self, matric_number: &MatricNumber) -> Result<(), LedgerError> {
        let mut missing = Vec::new();
        if matric_number.as_str().trim().is_empty() {
            missing.push("matricNumber");
        }
        if self.first_name.trim().is_empty() {
            missing.push("firstName");
        }
        if self.last_name.trim().is_empty() {
            missing.push("lastName");
        }
        if self.email.trim().is_empty() {
            missing.push("email");
        }
        if !missing.is_empty() {
            return Err(LedgerError::Validation(format!(
                "missing required student information: {}",
                missing.join(", ")
            )));
        }
        if !looks_like_email(&self.email) {
            return Err(LedgerError::Validation(format!(
                "invalid email address '{}'",
                self.email
            )));
        }
        Ok(())
    }
}

pub(crate) fn looks_like_email(email: &str) -> bool {
    match email.trim().split_once('@') {
        Some((local, domain)) => !local.is_empty() && domain.contains('.') && !domain.ends_with('.'),
        None => false,
    }
}

/// A registered (or registering) student.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudentIdentity {
    pub id: StudentId,
    pub matric_number: MatricNumber,
    pub profile: StudentProfile,
    /// Cached sum of completed payments.
    pub total_paid: Decimal,
    /// Cached `max(0, target - total_paid)`.
    pub remaining_balance: Decimal,
    pub registration_completed: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StudentIdentity {
    /// Summary derived from the cached total.
    ///
    /// Paid status and percentage are always recomputed rather than stored.
    pub fn cached_summary(&self, schedule: &FeeSchedule) -> PaymentSummary {
        schedule.summarize(self.total_paid)
    }
}

/// Data needed to insert a new student; the store assigns id and timestamps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewStudent {
    pub matric_number: MatricNumber,
    pub profile: StudentProfile,
    pub total_paid: Decimal,
    pub remaining_balance: Decimal,
    pub registration_completed: bool,
}
