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

//! Persistence boundary of the ledger.
//!
//! The engine only talks to storage through [`LedgerStore`]. Two tables sit
//! behind it: payment entries and student identities. Implementations must
//! provide three atomic primitives, everything else is plain reads:
//!
//! - [`insert_entry`](LedgerStore::insert_entry) rejects a second row with the
//!   same transaction ID ([`StoreError::DuplicateTransaction`]).
//! - [`transition_entry`](LedgerStore::transition_entry) is a compare-and-set
//!   on the entry status.
//! - [`credit_student_total`](LedgerStore::credit_student_total) adds a
//!   completed entry to the cached aggregate at most once per entry.
//! - [`raise_student_total`](LedgerStore::raise_student_total) moves the
//!   cached aggregate up to a recomputed total and marks the entries it
//!   covers as counted. It never lowers the total, so concurrent readers
//!   repairing the cache cannot undo a credit.

mod memory;

pub use memory::MemoryStore;

use crate::base::{EntryId, MatricNumber, Reference, StudentId, TransactionId};
use crate::error::StoreError;
use crate::payment::{NewPaymentEntry, PaymentEntry, PaymentStatus, Transition};
use crate::student::{NewStudent, StudentIdentity, StudentProfile};
use crate::summary::FeeSchedule;
use rust_decimal::Decimal;

pub trait LedgerStore: Send + Sync {
    fn find_entry_by_transaction(
        &self,
        transaction_id: &TransactionId,
    ) -> Result<Option<PaymentEntry>, StoreError>;

    /// Most recent entry carrying `reference`.
    fn find_entry_by_reference(
        &self,
        reference: &Reference,
    ) -> Result<Option<PaymentEntry>, StoreError>;

    /// All entries carrying `reference`, most recent first.
    fn entries_with_reference(&self, reference: &Reference)
    -> Result<Vec<PaymentEntry>, StoreError>;

    /// All entries recorded under `matric_number`, linked or not, most recent first.
    fn entries_for_matric(
        &self,
        matric_number: &MatricNumber,
    ) -> Result<Vec<PaymentEntry>, StoreError>;

    /// All entries linked to `student_id`, most recent first.
    fn entries_for_student(&self, student_id: StudentId)
    -> Result<Vec<PaymentEntry>, StoreError>;

    /// Inserts a new entry.
    ///
    /// # Errors
    ///
    /// [`StoreError::DuplicateTransaction`] if an entry with the same
    /// transaction ID exists. Callers fall back to the update path.
    fn insert_entry(&self, entry: NewPaymentEntry) -> Result<PaymentEntry, StoreError>;

    /// Moves an entry to `status`, attaching `reference` when given.
    ///
    /// Terminal entries are left untouched and reported with
    /// `applied == false`.
    fn transition_entry(
        &self,
        id: EntryId,
        status: PaymentStatus,
        reference: Option<Reference>,
    ) -> Result<Transition, StoreError>;

    /// Links every listed entry that is not linked yet to `student_id`.
    ///
    /// Returns exactly the entries this call linked.
    fn link_entries(
        &self,
        ids: &[EntryId],
        student_id: StudentId,
    ) -> Result<Vec<PaymentEntry>, StoreError>;

    fn find_student(&self, id: StudentId) -> Result<Option<StudentIdentity>, StoreError>;

    fn find_student_by_matric(
        &self,
        matric_number: &MatricNumber,
    ) -> Result<Option<StudentIdentity>, StoreError>;

    /// # Errors
    ///
    /// [`StoreError::DuplicateStudent`] if the matric number is taken.
    fn insert_student(&self, student: NewStudent) -> Result<StudentIdentity, StoreError>;

    /// Replaces the profile and marks registration as completed.
    fn complete_student_registration(
        &self,
        id: StudentId,
        profile: StudentProfile,
    ) -> Result<StudentIdentity, StoreError>;

    /// Adds each entry's amount to the cached total, skipping entries the
    /// total already counts, and recomputes the remaining balance.
    fn credit_student_total(
        &self,
        id: StudentId,
        credits: &[(EntryId, Decimal)],
        schedule: &FeeSchedule,
    ) -> Result<StudentIdentity, StoreError>;

    /// Raises the cached total to at least `total_paid` and recomputes the
    /// remaining balance. Never lowers it. When the total moves, the
    /// `counted` entries are recorded as included.
    fn raise_student_total(
        &self,
        id: StudentId,
        total_paid: Decimal,
        counted: &[EntryId],
        schedule: &FeeSchedule,
    ) -> Result<StudentIdentity, StoreError>;
}
