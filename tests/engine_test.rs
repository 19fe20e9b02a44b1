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

//! Engine public API integration tests.

use hostel_fee_ledger::{
    EntryId, Engine, FeeSchedule, LedgerError, LedgerStore, MatricNumber, MemoryStore,
    NewPaymentEntry, NewStudent, PaymentEntry, PaymentStatus, RecordPayment, Reference,
    Registration, SandboxIssuer, StoreError, StudentId, StudentIdentity, StudentProfile,
    TransactionId, Transition,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

fn profile() -> StudentProfile {
    StudentProfile::new("Chiamaka", "Eze", "chiamaka@example.edu")
}

fn engine_over(store: Arc<dyn LedgerStore>) -> Engine {
    Engine::new(store, Arc::new(SandboxIssuer::new()), FeeSchedule::default())
}

fn matric(value: &str) -> MatricNumber {
    MatricNumber::from(value)
}

// === Scenarios ===

#[test]
fn full_payment_is_fully_paid() {
    let engine = Engine::in_memory(FeeSchedule::default());
    engine
        .record_payment(RecordPayment::completed("TXN1", "2020/1234", dec!(219000)))
        .unwrap();

    let report = engine.resolve_by_identity(&matric("2020/1234")).unwrap();
    assert_eq!(report.summary.total_paid, dec!(219000));
    assert_eq!(report.summary.remaining_balance, Decimal::ZERO);
    assert!(report.summary.is_fully_paid);
    assert_eq!(report.summary.payment_percentage, 100);
    assert_eq!(report.status, PaymentStatus::Completed);
}

#[test]
fn unlinked_entries_are_summed_by_matric() {
    let engine = Engine::in_memory(FeeSchedule::default());
    engine
        .record_payment(RecordPayment::completed("TXN2", "2020/5555", dec!(100000)))
        .unwrap();
    engine
        .record_payment(RecordPayment::completed("TXN3", "2020/5555", dec!(50000)))
        .unwrap();

    let report = engine.resolve_by_identity(&matric("2020/5555")).unwrap();
    assert_eq!(report.summary.total_paid, dec!(150000));
    assert_eq!(report.summary.remaining_balance, dec!(69000));
    assert_eq!(report.summary.payment_percentage, 68);
    assert!(!report.summary.is_fully_paid);
    assert_eq!(
        report.payment_details.unwrap().transaction_id,
        TransactionId::from("TXN3")
    );
}

#[test]
fn registration_folds_in_earlier_payments() {
    let engine = Engine::in_memory(FeeSchedule::default());
    engine
        .record_payment(RecordPayment::completed("TXN2", "2020/5555", dec!(100000)))
        .unwrap();
    engine
        .record_payment(RecordPayment::completed("TXN3", "2020/5555", dec!(50000)))
        .unwrap();

    let id = engine
        .complete_registration(Registration::new("2020/5555", profile()))
        .unwrap();

    let student = engine.store().find_student(id).unwrap().unwrap();
    assert_eq!(student.total_paid, dec!(150000));
    assert_eq!(student.remaining_balance, dec!(69000));
    assert!(student.registration_completed);
    for entry in engine.store().entries_for_matric(&matric("2020/5555")).unwrap() {
        assert_eq!(entry.student_id, Some(id));
    }

    // Registering again does not count the same payments twice
    engine
        .complete_registration(Registration::new("2020/5555", profile()))
        .unwrap();
    let student = engine.store().find_student(id).unwrap().unwrap();
    assert_eq!(student.total_paid, dec!(150000));
}

#[test]
fn registration_links_siblings_sharing_a_reference() {
    let engine = Engine::in_memory(FeeSchedule::default());
    engine
        .record_payment(RecordPayment::completed("TXN-A", "2020/9", dec!(20000)).with_reference("444555666"))
        .unwrap();
    // Retry recorded under a mistyped matric number, same gateway reference
    engine
        .record_payment(RecordPayment::completed("TXN-B", "2020/09", dec!(30000)).with_reference("444555666"))
        .unwrap();

    let id = engine
        .complete_registration(Registration::new("2020/9", profile()).with_reference("444555666"))
        .unwrap();

    let linked: Vec<PaymentEntry> = engine
        .store()
        .entries_with_reference(&Reference::from("444555666"))
        .unwrap();
    assert_eq!(linked.len(), 2);
    assert!(linked.iter().all(|entry| entry.student_id == Some(id)));

    let report = engine.resolve_by_identity(&matric("2020/9")).unwrap();
    assert_eq!(report.summary.total_paid, dec!(50000));
}

#[test]
fn payments_after_registration_update_the_cache() {
    let engine = Engine::in_memory(FeeSchedule::default());
    let id = engine
        .complete_registration(Registration::new("2020/1", profile()))
        .unwrap();

    engine
        .record_payment(RecordPayment::completed("TXN1", "2020/1", dec!(109500)))
        .unwrap();

    let student = engine.store().find_student(id).unwrap().unwrap();
    assert_eq!(student.total_paid, dec!(109500));
    assert_eq!(student.remaining_balance, dec!(109500));
    let entry = engine
        .store()
        .find_entry_by_transaction(&TransactionId::from("TXN1"))
        .unwrap()
        .unwrap();
    assert_eq!(entry.student_id, Some(id));
}

// === Idempotence ===

#[test]
fn replay_returns_same_aggregate() {
    let engine = Engine::in_memory(FeeSchedule::default());
    let first = engine
        .record_payment(RecordPayment::completed("TXN1", "2020/1", dec!(1000)))
        .unwrap();
    for _ in 0..5 {
        let again = engine
            .record_payment(RecordPayment::completed("TXN1", "2020/1", dec!(1000)))
            .unwrap();
        assert_eq!(again, first);
    }
    assert_eq!(
        engine.store().entries_for_matric(&matric("2020/1")).unwrap().len(),
        1
    );
}

#[test]
fn completed_entry_ignores_later_status() {
    let engine = Engine::in_memory(FeeSchedule::default());
    engine
        .record_payment(RecordPayment::completed("TXN1", "2020/1", dec!(1000)))
        .unwrap();
    let summary = engine
        .record_payment(RecordPayment::completed("TXN1", "2020/1", dec!(1000)).with_status(PaymentStatus::Failed))
        .unwrap();
    assert_eq!(summary.total_paid, dec!(1000));

    let entry = engine
        .store()
        .find_entry_by_transaction(&TransactionId::from("TXN1"))
        .unwrap()
        .unwrap();
    assert_eq!(entry.status, PaymentStatus::Completed);
}

// === Status by reference ===

#[test]
fn reference_of_linked_entry_reports_student_aggregate() {
    let engine = Engine::in_memory(FeeSchedule::default());
    engine
        .complete_registration(Registration::new("2020/1", profile()))
        .unwrap();
    engine
        .record_payment(RecordPayment::completed("TXN1", "2020/1", dec!(100000)))
        .unwrap();
    engine
        .record_payment(RecordPayment::completed("TXN2", "2020/1", dec!(19000)).with_reference("987654321"))
        .unwrap();

    let report = engine
        .resolve_by_reference(&Reference::from("987654321"))
        .unwrap();
    assert_eq!(report.status, PaymentStatus::Completed);
    assert_eq!(report.summary.total_paid, dec!(119000));
    let details = report.payment_details.unwrap();
    assert_eq!(details.amount, dec!(19000));
    assert_eq!(details.matric_number, Some(matric("2020/1")));
}

#[test]
fn reference_of_unlinked_entry_sums_matric() {
    let engine = Engine::in_memory(FeeSchedule::default());
    engine
        .record_payment(RecordPayment::completed("TXN1", "2020/2", dec!(50000)))
        .unwrap();
    engine
        .record_payment(
            RecordPayment::completed("TXN2", "2020/2", dec!(60000))
                .with_status(PaymentStatus::Pending)
                .with_reference("222333444"),
        )
        .unwrap();

    let report = engine
        .resolve_by_reference(&Reference::from("222333444"))
        .unwrap();
    assert_eq!(report.status, PaymentStatus::Pending);
    assert_eq!(report.summary.total_paid, dec!(50000));
}

#[test]
fn blank_matric_is_rejected() {
    let engine = Engine::in_memory(FeeSchedule::default());
    assert!(matches!(
        engine.resolve_by_identity(&matric("  ")),
        Err(LedgerError::Validation(_))
    ));
}

#[test]
fn oversized_amount_is_rejected_before_storing() {
    let engine = Engine::in_memory(FeeSchedule::default());
    let err = engine
        .record_payment(RecordPayment::completed("TXN1", "2020/1", Decimal::MAX))
        .unwrap_err();
    assert!(matches!(err, LedgerError::Validation(_)));
    assert!(engine.store().entries_for_matric(&matric("2020/1")).unwrap().is_empty());

    let report = engine.resolve_by_identity(&matric("2020/1")).unwrap();
    assert_eq!(report.summary.total_paid, Decimal::ZERO);
}

#[test]
fn huge_stored_totals_stay_readable() {
    let store = Arc::new(MemoryStore::new());
    let engine = engine_over(store.clone());
    for tx in ["TXN1", "TXN2"] {
        store
            .insert_entry(NewPaymentEntry {
                transaction_id: TransactionId::from(tx),
                reference: Some(Reference::from("999999999")),
                student_id: None,
                matric_number: Some(matric("2020/1")),
                amount: Decimal::MAX,
                status: PaymentStatus::Completed,
            })
            .unwrap();
    }

    let report = engine.resolve_by_identity(&matric("2020/1")).unwrap();
    assert_eq!(report.summary.total_paid, Decimal::MAX);
    assert_eq!(report.summary.payment_percentage, 100);
    assert!(engine.resolve_by_reference(&Reference::from("999999999")).is_ok());
}

// === Cache repair ===

#[test]
fn stale_cache_is_repaired_by_status_read() {
    let store = Arc::new(MemoryStore::new());
    let engine = engine_over(store.clone());
    let student = store
        .insert_student(NewStudent {
            matric_number: matric("2020/3"),
            profile: profile(),
            total_paid: Decimal::ZERO,
            remaining_balance: dec!(219000),
            registration_completed: true,
        })
        .unwrap();
    // Entry written without the cache update, as after a crash
    store
        .insert_entry(NewPaymentEntry {
            transaction_id: TransactionId::from("TXN1"),
            reference: None,
            student_id: Some(student.id),
            matric_number: Some(matric("2020/3")),
            amount: dec!(219000),
            status: PaymentStatus::Completed,
        })
        .unwrap();

    let report = engine.resolve_by_identity(&matric("2020/3")).unwrap();
    assert!(report.summary.is_fully_paid);
    assert_eq!(report.status, PaymentStatus::Completed);

    let repaired = store.find_student(student.id).unwrap().unwrap();
    assert_eq!(repaired.total_paid, dec!(219000));
    assert_eq!(repaired.remaining_balance, Decimal::ZERO);
}

#[test]
fn completed_payment_adds_to_cache_ahead_of_entries() {
    let store = Arc::new(MemoryStore::new());
    let engine = engine_over(store.clone());
    let student = store
        .insert_student(NewStudent {
            matric_number: matric("2020/4"),
            profile: profile(),
            total_paid: dec!(100000),
            remaining_balance: dec!(119000),
            registration_completed: true,
        })
        .unwrap();

    let pending = RecordPayment::completed("TXN1", "2020/4", dec!(50000))
        .with_status(PaymentStatus::Pending)
        .with_reference("444444444");
    engine.record_payment(pending).unwrap();
    assert_eq!(store.find_student(student.id).unwrap().unwrap().total_paid, dec!(100000));

    engine
        .record_payment(RecordPayment::completed("TXN1", "2020/4", dec!(50000)))
        .unwrap();
    let report = engine.resolve_by_identity(&matric("2020/4")).unwrap();
    assert_eq!(report.summary.total_paid, dec!(150000));
    assert_eq!(report.summary.remaining_balance, dec!(69000));
    assert_eq!(report.summary.payment_percentage, 68);
}

// === Store failures ===

/// Delegates to a [`MemoryStore`] until switched off.
struct FlakyStore {
    inner: MemoryStore,
    down: AtomicBool,
    /// When set, only writes to student rows fail.
    student_writes_only: AtomicBool,
}

impl FlakyStore {
    fn new() -> Self {
        Self {
            inner: MemoryStore::new(),
            down: AtomicBool::new(false),
            student_writes_only: AtomicBool::new(false),
        }
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.down.load(Ordering::SeqCst) && !self.student_writes_only.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("connection refused".into()));
        }
        Ok(())
    }

    fn check_student_write(&self) -> Result<(), StoreError> {
        if self.down.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("connection refused".into()));
        }
        Ok(())
    }
}

impl LedgerStore for FlakyStore {
    fn find_entry_by_transaction(&self, id: &TransactionId) -> Result<Option<PaymentEntry>, StoreError> {
        self.check()?;
        self.inner.find_entry_by_transaction(id)
    }

    fn find_entry_by_reference(&self, reference: &Reference) -> Result<Option<PaymentEntry>, StoreError> {
        self.check()?;
        self.inner.find_entry_by_reference(reference)
    }

    fn entries_with_reference(&self, reference: &Reference) -> Result<Vec<PaymentEntry>, StoreError> {
        self.check()?;
        self.inner.entries_with_reference(reference)
    }

    fn entries_for_matric(&self, matric_number: &MatricNumber) -> Result<Vec<PaymentEntry>, StoreError> {
        self.check()?;
        self.inner.entries_for_matric(matric_number)
    }

    fn entries_for_student(&self, student_id: StudentId) -> Result<Vec<PaymentEntry>, StoreError> {
        self.check()?;
        self.inner.entries_for_student(student_id)
    }

    fn insert_entry(&self, entry: NewPaymentEntry) -> Result<PaymentEntry, StoreError> {
        self.check()?;
        self.inner.insert_entry(entry)
    }

    fn transition_entry(
        &self,
        id: EntryId,
        status: PaymentStatus,
        reference: Option<Reference>,
    ) -> Result<Transition, StoreError> {
        self.check()?;
        self.inner.transition_entry(id, status, reference)
    }

    fn link_entries(&self, ids: &[EntryId], student_id: StudentId) -> Result<Vec<PaymentEntry>, StoreError> {
        self.check()?;
        self.inner.link_entries(ids, student_id)
    }

    fn find_student(&self, id: StudentId) -> Result<Option<StudentIdentity>, StoreError> {
        self.check()?;
        self.inner.find_student(id)
    }

    fn find_student_by_matric(&self, matric_number: &MatricNumber) -> Result<Option<StudentIdentity>, StoreError> {
        self.check()?;
        self.inner.find_student_by_matric(matric_number)
    }

    fn insert_student(&self, student: NewStudent) -> Result<StudentIdentity, StoreError> {
        self.check_student_write()?;
        self.inner.insert_student(student)
    }

    fn complete_student_registration(
        &self,
        id: StudentId,
        profile: StudentProfile,
    ) -> Result<StudentIdentity, StoreError> {
        self.check_student_write()?;
        self.inner.complete_student_registration(id, profile)
    }

    fn credit_student_total(
        &self,
        id: StudentId,
        credits: &[(EntryId, Decimal)],
        schedule: &FeeSchedule,
    ) -> Result<StudentIdentity, StoreError> {
        self.check_student_write()?;
        self.inner.credit_student_total(id, credits, schedule)
    }

    fn raise_student_total(
        &self,
        id: StudentId,
        total_paid: Decimal,
        counted: &[EntryId],
        schedule: &FeeSchedule,
    ) -> Result<StudentIdentity, StoreError> {
        self.check_student_write()?;
        self.inner.raise_student_total(id, total_paid, counted, schedule)
    }
}

#[test]
fn unreachable_store_is_reported_and_retry_succeeds() {
    let store = Arc::new(FlakyStore::new());
    let engine = engine_over(store.clone());

    store.down.store(true, Ordering::SeqCst);
    let err = engine
        .record_payment(RecordPayment::completed("TXN1", "2020/1", dec!(1000)))
        .unwrap_err();
    assert!(matches!(err, LedgerError::StoreUnavailable(_)));
    assert_eq!(err.code(), "SERVER_ERROR");

    store.down.store(false, Ordering::SeqCst);
    let summary = engine
        .record_payment(RecordPayment::completed("TXN1", "2020/1", dec!(1000)))
        .unwrap();
    assert_eq!(summary.total_paid, dec!(1000));
}

#[test]
fn failed_cache_write_is_healed_on_next_read() {
    let store = Arc::new(FlakyStore::new());
    let engine = engine_over(store.clone());
    let id = engine
        .complete_registration(Registration::new("2020/1", profile()))
        .unwrap();

    // Entry writes go through, cache writes do not
    store.student_writes_only.store(true, Ordering::SeqCst);
    store.down.store(true, Ordering::SeqCst);
    let summary = engine
        .record_payment(RecordPayment::completed("TXN1", "2020/1", dec!(40000)))
        .unwrap();
    assert_eq!(summary.total_paid, dec!(40000));
    assert_eq!(store.inner.find_student(id).unwrap().unwrap().total_paid, Decimal::ZERO);

    store.down.store(false, Ordering::SeqCst);
    let report = engine.resolve_by_identity(&matric("2020/1")).unwrap();
    assert_eq!(report.summary.total_paid, dec!(40000));
    assert_eq!(store.inner.find_student(id).unwrap().unwrap().total_paid, dec!(40000));
}

#[test]
fn registration_store_failure_propagates() {
    let store = Arc::new(FlakyStore::new());
    let engine = engine_over(store.clone());
    store.down.store(true, Ordering::SeqCst);

    let err = engine
        .complete_registration(Registration::new("2020/1", profile()))
        .unwrap_err();
    assert!(matches!(err, LedgerError::StoreUnavailable(_)));
}

// === Custom fee ===

#[test]
fn fee_target_is_configurable() {
    let schedule = FeeSchedule::new(dec!(100000)).unwrap();
    let engine = Engine::in_memory(schedule);
    let summary = engine
        .record_payment(RecordPayment::completed("TXN1", "2020/1", dec!(25000)))
        .unwrap();
    assert_eq!(summary.remaining_balance, dec!(75000));
    assert_eq!(summary.payment_percentage, 25);
    assert_eq!(engine.schedule().target(), dec!(100000));
}
