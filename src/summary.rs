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

//! Balance calculation against the flat hostel fee.
//!
//! Every total the crate reports, whether it comes from a student's cached
//! aggregate or from summing raw payment entries, goes through
//! [`compute_summary`], so the four figures can never disagree between entry
//! points.
//!
//! # Example
//!
//! ```
//! use hostel_fee_ledger::{FeeSchedule, compute_summary};
//! use rust_decimal_macros::dec;
//!
//! let summary = compute_summary(dec!(150000), dec!(219000));
//! assert_eq!(summary.remaining_balance, dec!(69000));
//! assert_eq!(summary.payment_percentage, 68);
//! assert!(!summary.is_fully_paid);
//!
//! assert_eq!(FeeSchedule::default().summarize(dec!(219000)).payment_percentage, 100);
//! ```

use crate::LedgerError;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Full hostel fee, in whole currency units.
pub const DEFAULT_FEE_TARGET: Decimal = dec!(219000);

const ONE_HUNDRED: Decimal = dec!(100);

/// Payment progress of one student against the fee target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentSummary {
    #[serde(with = "rust_decimal::serde::float")]
    pub total_paid: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub remaining_balance: Decimal,
    pub is_fully_paid: bool,
    pub payment_percentage: i64,
}

/// Maps an amount paid so far to the four-field summary.
///
/// - `remaining_balance = max(0, target - total_paid)`
/// - `is_fully_paid = total_paid >= target`
/// - `payment_percentage = min(100, round(100 * total_paid / target))`
///
/// Halves round away from zero. Negative totals are not special-cased.
/// Totals too large to scale saturate instead of overflowing.
pub fn compute_summary(total_paid: Decimal, target: Decimal) -> PaymentSummary {
    let remaining_balance = target.saturating_sub(total_paid).max(Decimal::ZERO);
    let percentage = total_paid
        .checked_mul(ONE_HUNDRED)
        .and_then(|scaled| scaled.checked_div(target))
        .map(|ratio| ratio.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero))
        .unwrap_or(if total_paid.is_sign_negative() {
            Decimal::ZERO
        } else {
            ONE_HUNDRED
        })
        .min(ONE_HUNDRED);

    PaymentSummary {
        total_paid,
        remaining_balance,
        is_fully_paid: total_paid >= target,
        payment_percentage: percentage.to_i64().unwrap_or_default(),
    }
}

/// The fee every student owes.
///
/// Carried explicitly through the engine so that tests and deployments can
/// use a different amount without touching global state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeeSchedule {
    target: Decimal,
}

impl FeeSchedule {
    /// Creates a schedule for the given fee.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Validation`] if `target` is not positive.
    pub fn new(target: Decimal) -> Result<Self, LedgerError> {
        if target <= Decimal::ZERO {
            return Err(LedgerError::Validation(format!(
                "fee target must be positive, got {target}"
            )));
        }
        Ok(FeeSchedule { target })
    }

    pub fn target(&self) -> Decimal {
        self.target
    }

    pub fn summarize(&self, total_paid: Decimal) -> PaymentSummary {
        compute_summary(total_paid, self.target)
    }

    /// Summary of a student who has paid nothing yet.
    pub fn empty(&self) -> PaymentSummary {
        self.summarize(Decimal::ZERO)
    }
}

impl Default for FeeSchedule {
    fn default() -> Self {
        FeeSchedule {
            target: DEFAULT_FEE_TARGET,
        }
    }
}
