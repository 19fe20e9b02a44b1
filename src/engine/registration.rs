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

use super::{Engine, required};
use crate::LedgerError;
use crate::base::{EntryId, MatricNumber, Reference, StudentId};
use crate::error::StoreError;
use crate::payment::PaymentEntry;
use crate::student::{NewStudent, StudentIdentity, StudentProfile};
use rust_decimal::Decimal;
use std::collections::BTreeSet;
use tracing::{debug, info, warn};

/// A submitted registration form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    pub matric_number: MatricNumber,
    pub profile: StudentProfile,
    /// Reference of the payment the student claims to have made.
    pub reference: Option<Reference>,
    /// Amount the client believes was paid. Logged only; the ledger decides.
    pub paid_amount: Option<Decimal>,
}

impl Registration {
    pub fn new(matric_number: impl Into<MatricNumber>, profile: StudentProfile) -> Self {
        Registration {
            matric_number: matric_number.into(),
            profile,
            reference: None,
            paid_amount: None,
        }
    }

    pub fn with_reference(mut self, reference: impl Into<Reference>) -> Self {
        self.reference = Some(reference.into());
        self
    }
}

impl Engine {
    /// Creates or updates the student and adopts every payment made before
    /// the student existed.
    ///
    /// The payment reference is not enforced: a missing, unknown or
    /// uncompleted reference is logged and registration proceeds. Linking and
    /// the cache refresh are best-effort; whatever they miss is picked up by
    /// the next status read.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::Validation`] - Required profile fields missing.
    /// - [`LedgerError::StoreUnavailable`] - Store failure while reading the
    ///   reference or writing the student.
    pub fn complete_registration(&self, registration: Registration) -> Result<StudentId, LedgerError> {
        let Registration {
            matric_number,
            profile,
            reference,
            paid_amount,
        } = registration;
        profile.validate(&matric_number)?;
        let matric_number = MatricNumber::new(required("matricNumber", matric_number.as_str())?);

        let payment = match &reference {
            Some(reference) => {
                let entry = self.store.find_entry_by_reference(reference)?;
                match &entry {
                    None => warn!(%reference, matric = %matric_number, "registration references an unknown payment"),
                    Some(entry) if !entry.is_completed() => warn!(
                        %reference,
                        matric = %matric_number,
                        status = %entry.status,
                        "registration references a payment that is not completed"
                    ),
                    Some(_) => {}
                }
                entry
            }
            None => {
                debug!(matric = %matric_number, "registration without payment reference");
                None
            }
        };
        if let Some(paid_amount) = paid_amount {
            debug!(matric = %matric_number, %paid_amount, "client-reported paid amount");
        }

        let student = self.upsert_student(&matric_number, profile)?;
        info!(matric = %matric_number, student_id = %student.id, "registration completed");

        let adopted = self.adopt_entries(&student, payment.as_ref());

        match self.store.find_student(student.id) {
            Ok(Some(fresh)) => self.credit_student_cache(&fresh, &adopted),
            Ok(None) => warn!(student_id = %student.id, "student vanished after registration"),
            Err(err) => warn!(student_id = %student.id, error = %err, "deferred cache refresh"),
        }
        Ok(student.id)
    }

    fn upsert_student(
        &self,
        matric_number: &MatricNumber,
        profile: StudentProfile,
    ) -> Result<StudentIdentity, LedgerError> {
        if let Some(existing) = self.store.find_student_by_matric(matric_number)? {
            return Ok(self.store.complete_student_registration(existing.id, profile)?);
        }

        let new = NewStudent {
            matric_number: matric_number.clone(),
            profile: profile.clone(),
            total_paid: Decimal::ZERO,
            remaining_balance: self.schedule.target(),
            registration_completed: true,
        };
        match self.store.insert_student(new) {
            Ok(student) => Ok(student),
            Err(StoreError::DuplicateStudent) => {
                // Registered concurrently; update the winner instead
                let existing = self.store.find_student_by_matric(matric_number)?.ok_or_else(|| {
                    LedgerError::StoreUnavailable(format!(
                        "student {matric_number} reported as duplicate but not found"
                    ))
                })?;
                Ok(self.store.complete_student_registration(existing.id, profile)?)
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Links the referenced entry, its unlinked siblings by reference, and
    /// every unlinked entry under the student's matric number. Returns the
    /// entries this call linked.
    fn adopt_entries(&self, student: &StudentIdentity, payment: Option<&PaymentEntry>) -> Vec<PaymentEntry> {
        let mut candidates = BTreeSet::new();

        if let Some(payment) = payment {
            match payment.student_id {
                Some(owner) if owner != student.id => warn!(
                    transaction_id = %payment.transaction_id,
                    %owner,
                    student_id = %student.id,
                    "referenced payment belongs to another student, not linking"
                ),
                _ => {
                    candidates.insert(payment.id);
                }
            }
            if let Some(reference) = &payment.reference {
                match self.store.entries_with_reference(reference) {
                    Ok(entries) => candidates.extend(unlinked_ids(&entries)),
                    Err(err) => warn!(%reference, error = %err, "could not load entries for reference"),
                }
            }
        }

        match self.store.entries_for_matric(&student.matric_number) {
            Ok(entries) => candidates.extend(unlinked_ids(&entries)),
            Err(err) => warn!(matric = %student.matric_number, error = %err, "could not load orphaned entries"),
        }

        if candidates.is_empty() {
            return Vec::new();
        }
        let ids: Vec<EntryId> = candidates.into_iter().collect();
        match self.store.link_entries(&ids, student.id) {
            Ok(linked) => {
                if !linked.is_empty() {
                    info!(
                        matric = %student.matric_number,
                        linked = linked.len(),
                        "linked earlier payments to student"
                    );
                }
                linked
            }
            Err(err) => {
                warn!(
                    matric = %student.matric_number,
                    error = %err,
                    "failed to link earlier payments, status reads will still count them"
                );
                Vec::new()
            }
        }
    }
}

fn unlinked_ids(entries: &[PaymentEntry]) -> impl Iterator<Item = EntryId> + '_ {
    entries.iter().filter(|entry| !entry.is_linked()).map(|entry| entry.id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FeeSchedule;
    use crate::engine::RecordPayment;
    use crate::payment::PaymentStatus;
    use rust_decimal_macros::dec;

    fn profile() -> StudentProfile {
        StudentProfile::new("Ada", "Obi", "ada@example.edu")
    }

    #[test]
    fn missing_profile_fields_are_rejected() {
        let engine = Engine::in_memory(FeeSchedule::default());
        let registration = Registration::new("2020/1", StudentProfile::new("Ada", "", ""));
        let err = engine.complete_registration(registration).unwrap_err();
        assert!(matches!(err, LedgerError::Validation(ref msg) if msg.contains("lastName")));
        assert!(engine.store().find_student_by_matric(&MatricNumber::from("2020/1")).unwrap().is_none());
    }

    #[test]
    fn unknown_reference_does_not_block_registration() {
        let engine = Engine::in_memory(FeeSchedule::default());
        let registration = Registration::new("2020/1", profile()).with_reference("999999999");
        let id = engine.complete_registration(registration).unwrap();

        let student = engine.store().find_student(id).unwrap().unwrap();
        assert!(student.registration_completed);
        assert_eq!(student.total_paid, Decimal::ZERO);
        assert_eq!(student.remaining_balance, dec!(219000));
    }

    #[test]
    fn reregistration_updates_profile_and_keeps_id() {
        let engine = Engine::in_memory(FeeSchedule::default());
        let first = engine
            .complete_registration(Registration::new("2020/1", profile()))
            .unwrap();

        let mut updated = profile();
        updated.department = Some("Physics".to_string());
        let second = engine
            .complete_registration(Registration::new("2020/1", updated))
            .unwrap();

        assert_eq!(first, second);
        let student = engine.store().find_student(first).unwrap().unwrap();
        assert_eq!(student.profile.department.as_deref(), Some("Physics"));
    }

    #[test]
    fn pending_entries_are_linked_but_not_counted() {
        let engine = Engine::in_memory(FeeSchedule::default());
        let pending = RecordPayment::completed("TXN1", "2020/1", dec!(50000))
            .with_status(PaymentStatus::Pending)
            .with_reference("123456789");
        engine.record_payment(pending).unwrap();

        let id = engine
            .complete_registration(Registration::new("2020/1", profile()).with_reference("123456789"))
            .unwrap();

        let entry = engine
            .store()
            .find_entry_by_reference(&Reference::from("123456789"))
            .unwrap()
            .unwrap();
        assert_eq!(entry.student_id, Some(id));
        let student = engine.store().find_student(id).unwrap().unwrap();
        assert_eq!(student.total_paid, Decimal::ZERO);
    }

    #[test]
    fn entries_owned_by_another_student_stay_put() {
        let engine = Engine::in_memory(FeeSchedule::default());
        let owner = engine
            .complete_registration(Registration::new("2020/1", profile()))
            .unwrap();
        engine
            .record_payment(RecordPayment::completed("TXN1", "2020/1", dec!(10000)).with_reference("111111111"))
            .unwrap();

        let other = engine
            .complete_registration(Registration::new("2020/2", profile()).with_reference("111111111"))
            .unwrap();

        let entry = engine
            .store()
            .find_entry_by_reference(&Reference::from("111111111"))
            .unwrap()
            .unwrap();
        assert_eq!(entry.student_id, Some(owner));
        let other = engine.store().find_student(other).unwrap().unwrap();
        assert_eq!(other.total_paid, Decimal::ZERO);
    }

    #[test]
    fn adopted_payments_add_to_an_existing_cache() {
        let engine = Engine::in_memory(FeeSchedule::default());
        engine
            .store()
            .insert_student(NewStudent {
                matric_number: MatricNumber::from("2020/1"),
                profile: profile(),
                total_paid: dec!(100000),
                remaining_balance: dec!(119000),
                registration_completed: false,
            })
            .unwrap();
        // Recorded under another matric number, found through the reference
        engine
            .record_payment(RecordPayment::completed("TXN1", "2020/9", dec!(19000)).with_reference("222222222"))
            .unwrap();

        let id = engine
            .complete_registration(Registration::new("2020/1", profile()).with_reference("222222222"))
            .unwrap();

        let student = engine.store().find_student(id).unwrap().unwrap();
        assert_eq!(student.total_paid, dec!(119000));
        assert_eq!(student.remaining_balance, dec!(100000));
    }
}
