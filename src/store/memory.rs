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

//! Thread-safe in-memory ledger store.
//!
//! Rows live in [`DashMap`]s keyed by their primary key, with secondary
//! indexes for transaction ID, reference and matric number. Uniqueness of
//! transaction IDs and matric numbers is enforced with the entry API, so a
//! find-or-insert race always ends with one winner and one
//! [`StoreError::DuplicateTransaction`] / [`StoreError::DuplicateStudent`].
//!
//! Lock order is `by_transaction` → `entries` → `by_reference`/`by_matric`
//! (and `students_by_matric` → `students`). No method acquires them in the
//! opposite direction.
//!
//! Each student row remembers which entries its cached total already
//! includes, so crediting the same entry twice is a no-op.

use super::LedgerStore;
use crate::base::{EntryId, MatricNumber, Reference, StudentId, TransactionId};
use crate::error::StoreError;
use crate::payment::{NewPaymentEntry, PaymentEntry, PaymentStatus, Transition};
use crate::student::{NewStudent, StudentIdentity, StudentProfile};
use crate::summary::FeeSchedule;
use chrono::Utc;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use rust_decimal::Decimal;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug)]
struct StudentRow {
    identity: StudentIdentity,
    counted: HashSet<EntryId>,
}

#[derive(Debug)]
pub struct MemoryStore {
    entries: DashMap<EntryId, PaymentEntry>,
    by_transaction: DashMap<TransactionId, EntryId>,
    by_reference: DashMap<Reference, Vec<EntryId>>,
    by_matric: DashMap<MatricNumber, Vec<EntryId>>,
    students: DashMap<StudentId, StudentRow>,
    students_by_matric: DashMap<MatricNumber, StudentId>,
    next_entry_id: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
            by_transaction: DashMap::new(),
            by_reference: DashMap::new(),
            by_matric: DashMap::new(),
            students: DashMap::new(),
            students_by_matric: DashMap::new(),
            next_entry_id: AtomicU64::new(1),
        }
    }

    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    pub fn student_count(&self) -> usize {
        self.students.len()
    }

    /// Matric numbers that have at least one entry, sorted.
    pub fn matric_numbers(&self) -> Vec<MatricNumber> {
        let mut matrics: Vec<MatricNumber> =
            self.by_matric.iter().map(|item| item.key().clone()).collect();
        matrics.sort();
        matrics
    }

    /// Resolves ids to rows, most recent first.
    fn collect(&self, ids: Vec<EntryId>) -> Vec<PaymentEntry> {
        let mut rows: Vec<PaymentEntry> = ids
            .into_iter()
            .filter_map(|id| self.entries.get(&id).map(|row| row.clone()))
            .collect();
        rows.sort_by(|a, b| b.recency().cmp(&a.recency()));
        rows
    }

    fn index_ids<K>(index: &DashMap<K, Vec<EntryId>>, key: &K) -> Vec<EntryId>
    where
        K: std::hash::Hash + Eq,
    {
        index.get(key).map(|ids| ids.clone()).unwrap_or_default()
    }

    fn update_student<F>(&self, id: StudentId, update: F) -> Result<StudentIdentity, StoreError>
    where
        F: FnOnce(&mut StudentIdentity, &mut HashSet<EntryId>),
    {
        let mut row = self.students.get_mut(&id).ok_or(StoreError::MissingRecord)?;
        let StudentRow { identity, counted } = &mut *row;
        update(identity, counted);
        identity.updated_at = Utc::now();
        Ok(identity.clone())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl LedgerStore for MemoryStore {
    fn find_entry_by_transaction(
        &self,
        transaction_id: &TransactionId,
    ) -> Result<Option<PaymentEntry>, StoreError> {
        let Some(id) = self.by_transaction.get(transaction_id).map(|id| *id) else {
            return Ok(None);
        };
        Ok(self.entries.get(&id).map(|row| row.clone()))
    }

    fn find_entry_by_reference(
        &self,
        reference: &Reference,
    ) -> Result<Option<PaymentEntry>, StoreError> {
        Ok(self.entries_with_reference(reference)?.into_iter().next())
    }

    fn entries_with_reference(
        &self,
        reference: &Reference,
    ) -> Result<Vec<PaymentEntry>, StoreError> {
        Ok(self.collect(Self::index_ids(&self.by_reference, reference)))
    }

    fn entries_for_matric(
        &self,
        matric_number: &MatricNumber,
    ) -> Result<Vec<PaymentEntry>, StoreError> {
        Ok(self.collect(Self::index_ids(&self.by_matric, matric_number)))
    }

    fn entries_for_student(
        &self,
        student_id: StudentId,
    ) -> Result<Vec<PaymentEntry>, StoreError> {
        let ids = self
            .entries
            .iter()
            .filter(|row| row.student_id == Some(student_id))
            .map(|row| row.id)
            .collect();
        Ok(self.collect(ids))
    }

    fn insert_entry(&self, new: NewPaymentEntry) -> Result<PaymentEntry, StoreError> {
        // Entry API gives an atomic check-and-insert on the transaction ID
        match self.by_transaction.entry(new.transaction_id.clone()) {
            Entry::Occupied(_) => Err(StoreError::DuplicateTransaction),
            Entry::Vacant(slot) => {
                let id = EntryId(self.next_entry_id.fetch_add(1, Ordering::SeqCst));
                let now = Utc::now();
                let entry = PaymentEntry {
                    id,
                    transaction_id: new.transaction_id,
                    reference: new.reference,
                    student_id: new.student_id,
                    matric_number: new.matric_number,
                    amount: new.amount,
                    status: new.status,
                    created_at: now,
                    updated_at: now,
                };

                self.entries.insert(id, entry.clone());
                if let Some(reference) = &entry.reference {
                    self.by_reference.entry(reference.clone()).or_default().push(id);
                }
                if let Some(matric) = &entry.matric_number {
                    self.by_matric.entry(matric.clone()).or_default().push(id);
                }
                // Published last: a reader that sees the ID also sees the row
                slot.insert(id);
                Ok(entry)
            }
        }
    }

    fn transition_entry(
        &self,
        id: EntryId,
        status: PaymentStatus,
        reference: Option<Reference>,
    ) -> Result<Transition, StoreError> {
        let mut row = self.entries.get_mut(&id).ok_or(StoreError::MissingRecord)?;
        let previous = row.status;

        if !previous.can_transition_to(status) {
            return Ok(Transition {
                entry: row.clone(),
                previous,
                applied: false,
            });
        }

        row.status = status;
        if let Some(reference) = reference {
            if row.reference.as_ref() != Some(&reference) {
                if let Some(old) = row.reference.take() {
                    if let Some(mut ids) = self.by_reference.get_mut(&old) {
                        ids.retain(|other| *other != id);
                    }
                }
                self.by_reference.entry(reference.clone()).or_default().push(id);
                row.reference = Some(reference);
            }
        }
        row.updated_at = Utc::now();

        Ok(Transition {
            entry: row.clone(),
            previous,
            applied: true,
        })
    }

    fn link_entries(
        &self,
        ids: &[EntryId],
        student_id: StudentId,
    ) -> Result<Vec<PaymentEntry>, StoreError> {
        let mut linked = Vec::new();
        for id in ids {
            if let Some(mut row) = self.entries.get_mut(id) {
                if row.student_id.is_none() {
                    row.student_id = Some(student_id);
                    row.updated_at = Utc::now();
                    linked.push(row.clone());
                }
            }
        }
        Ok(linked)
    }

    fn find_student(&self, id: StudentId) -> Result<Option<StudentIdentity>, StoreError> {
        Ok(self.students.get(&id).map(|row| row.identity.clone()))
    }

    fn find_student_by_matric(
        &self,
        matric_number: &MatricNumber,
    ) -> Result<Option<StudentIdentity>, StoreError> {
        let Some(id) = self.students_by_matric.get(matric_number).map(|id| *id) else {
            return Ok(None);
        };
        self.find_student(id)
    }

    fn insert_student(&self, new: NewStudent) -> Result<StudentIdentity, StoreError> {
        match self.students_by_matric.entry(new.matric_number.clone()) {
            Entry::Occupied(_) => Err(StoreError::DuplicateStudent),
            Entry::Vacant(slot) => {
                let now = Utc::now();
                let student = StudentIdentity {
                    id: StudentId::new(),
                    matric_number: new.matric_number,
                    profile: new.profile,
                    total_paid: new.total_paid,
                    remaining_balance: new.remaining_balance,
                    registration_completed: new.registration_completed,
                    created_at: now,
                    updated_at: now,
                };
                self.students.insert(
                    student.id,
                    StudentRow {
                        identity: student.clone(),
                        counted: HashSet::new(),
                    },
                );
                slot.insert(student.id);
                Ok(student)
            }
        }
    }

    fn complete_student_registration(
        &self,
        id: StudentId,
        profile: StudentProfile,
    ) -> Result<StudentIdentity, StoreError> {
        self.update_student(id, |student, _| {
            student.profile = profile;
            student.registration_completed = true;
        })
    }

    fn credit_student_total(
        &self,
        id: StudentId,
        credits: &[(EntryId, Decimal)],
        schedule: &FeeSchedule,
    ) -> Result<StudentIdentity, StoreError> {
        self.update_student(id, |student, counted| {
            for (entry_id, amount) in credits {
                if counted.insert(*entry_id) {
                    student.total_paid = student.total_paid.saturating_add(*amount);
                }
            }
            student.remaining_balance = schedule.summarize(student.total_paid).remaining_balance;
        })
    }

    fn raise_student_total(
        &self,
        id: StudentId,
        total_paid: Decimal,
        counted_entries: &[EntryId],
        schedule: &FeeSchedule,
    ) -> Result<StudentIdentity, StoreError> {
        self.update_student(id, |student, counted| {
            if total_paid > student.total_paid {
                student.total_paid = total_paid;
                counted.extend(counted_entries.iter().copied());
            }
            student.remaining_balance = schedule.summarize(student.total_paid).remaining_balance;
        })
    }
}
