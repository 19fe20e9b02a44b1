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

//! JSON API over the [`Engine`].
//!
//! ```bash
//! # Open a payment and get a reference
//! curl -X POST http://localhost:3000/api/payment-reference \
//!   -H "Content-Type: application/json" \
//!   -d '{"matricNumber": "2020/1234", "firstName": "Ada", "lastName": "Obi",
//!        "email": "ada@example.edu", "amount": 100000}'
//!
//! # Report a completed payment
//! curl -X POST http://localhost:3000/api/payment \
//!   -H "Content-Type: application/json" \
//!   -d '{"transactionId": "TXN-1", "matricNumber": "2020/1234", "amount": 100000}'
//!
//! # Check progress
//! curl "http://localhost:3000/api/check-payment-status?matricNumber=2020/1234"
//! ```
//!
//! Every failure is answered with `{"success": false, "error": ..., "errorCode": ...}`.

use crate::base::{MatricNumber, Reference, StudentId, TransactionId};
use crate::engine::{
    Engine, InitiatePayment, PaymentDetails, RecordPayment, Registration, StatusReport,
};
use crate::error::LedgerError;
use crate::payment::PaymentStatus;
use crate::student::StudentProfile;
use crate::summary::PaymentSummary;
use axum::{
    Json, Router,
    extract::{
        Path, Query, State,
        rejection::{JsonRejection, PathRejection, QueryRejection},
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::error;

// === Request/Response DTOs ===

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StatusQuery {
    #[serde(alias = "rrr")]
    pub reference: Option<String>,
    pub matric_number: Option<String>,
}

/// Body of `POST /api/payment`.
///
/// `transactionId` is the idempotency key; when absent the reference doubles
/// as the key.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PaymentRequest {
    pub transaction_id: Option<String>,
    #[serde(alias = "rrr")]
    pub reference: Option<String>,
    pub matric_number: Option<String>,
    pub amount: Option<Decimal>,
    pub status: Option<String>,
}

impl PaymentRequest {
    fn into_record(self) -> Result<RecordPayment, LedgerError> {
        let reference = non_blank(self.reference);
        let transaction_id = non_blank(self.transaction_id)
            .or_else(|| reference.clone())
            .ok_or_else(|| LedgerError::Validation("transactionId is required".to_string()))?;
        let matric_number = non_blank(self.matric_number)
            .ok_or_else(|| LedgerError::Validation("matricNumber is required".to_string()))?;
        let amount = self
            .amount
            .ok_or_else(|| LedgerError::Validation("amount is required".to_string()))?;
        let status = match non_blank(self.status) {
            Some(status) => status.parse().map_err(LedgerError::Validation)?,
            None => PaymentStatus::Completed,
        };

        Ok(RecordPayment {
            transaction_id: TransactionId::new(transaction_id),
            matric_number: MatricNumber::new(matric_number),
            amount,
            status,
            reference: reference.map(Reference::new),
        })
    }
}

/// Body of `POST /api/payment-reference`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReferenceRequest {
    pub matric_number: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub amount: Option<Decimal>,
    pub phone_number: Option<String>,
}

/// Body of `POST /api/register-student`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RegisterRequest {
    pub matric_number: String,
    #[serde(flatten)]
    pub profile: StudentProfile,
    #[serde(alias = "paymentRRR")]
    pub payment_reference: Option<String>,
    pub paid_amount: Option<Decimal>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub success: bool,
    pub message: String,
    pub status: PaymentStatus,
    #[serde(flatten)]
    pub summary: PaymentSummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_details: Option<PaymentDetails>,
}

impl From<StatusReport> for StatusResponse {
    fn from(report: StatusReport) -> Self {
        let message = match report.status {
            PaymentStatus::Completed if report.summary.is_fully_paid => {
                "Payment completed. You can now proceed to registration."
            }
            PaymentStatus::Completed => "Payment received.",
            PaymentStatus::Pending => "Payment is still pending.",
            PaymentStatus::Failed => "Payment failed.",
        };
        StatusResponse {
            success: true,
            message: message.to_string(),
            status: report.status,
            summary: report.summary,
            payment_details: report.payment_details,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryResponse {
    pub success: bool,
    pub message: String,
    #[serde(flatten)]
    pub summary: PaymentSummary,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferenceResponse {
    pub success: bool,
    pub message: String,
    pub reference: Option<Reference>,
    pub transaction_id: TransactionId,
    #[serde(flatten)]
    pub summary: PaymentSummary,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterResponse {
    pub success: bool,
    pub message: String,
    pub student_id: StudentId,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
    pub error_code: String,
}

// === Error Handling ===

/// Wrapper for converting `LedgerError` into HTTP responses.
pub struct AppError(LedgerError);

impl From<LedgerError> for AppError {
    fn from(err: LedgerError) -> Self {
        AppError(err)
    }
}

// Malformed bodies, queries and paths are validation failures like any other
impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError(LedgerError::Validation(rejection.body_text()))
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        AppError(LedgerError::Validation(rejection.body_text()))
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        AppError(LedgerError::Validation(rejection.body_text()))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            LedgerError::Validation(_) | LedgerError::AmountExceedsBalance { .. } => {
                StatusCode::BAD_REQUEST
            }
            LedgerError::NotFound(_) => StatusCode::NOT_FOUND,
            LedgerError::StoreUnavailable(_) | LedgerError::Issuer(_) => {
                error!(error = %self.0, code = self.0.code(), "request failed");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        (
            status,
            Json(ErrorResponse {
                success: false,
                error: self.0.to_string(),
                error_code: self.0.code().to_string(),
            }),
        )
            .into_response()
    }
}

// === Handlers ===

/// GET /api/check-payment-status - Status by reference or matric number.
async fn check_payment_status(
    State(engine): State<Arc<Engine>>,
    query: Result<Query<StatusQuery>, QueryRejection>,
) -> Result<Json<StatusResponse>, AppError> {
    let Query(query) = query?;
    let report = match (non_blank(query.reference), non_blank(query.matric_number)) {
        (Some(reference), _) => engine.resolve_by_reference(&Reference::new(reference))?,
        (None, Some(matric)) => engine.resolve_by_identity(&MatricNumber::new(matric))?,
        (None, None) => {
            return Err(LedgerError::Validation(
                "either reference or matricNumber is required".to_string(),
            )
            .into());
        }
    };
    Ok(Json(report.into()))
}

/// POST /api/payment - Record a payment event.
async fn record_payment(
    State(engine): State<Arc<Engine>>,
    request: Result<Json<PaymentRequest>, JsonRejection>,
) -> Result<Json<SummaryResponse>, AppError> {
    let Json(request) = request?;
    let summary = engine.record_payment(request.into_record()?)?;
    Ok(Json(SummaryResponse {
        success: true,
        message: "Payment recorded successfully".to_string(),
        summary,
    }))
}

/// POST /api/payment-reference - Open a payment with the gateway.
async fn create_payment_reference(
    State(engine): State<Arc<Engine>>,
    request: Result<Json<ReferenceRequest>, JsonRejection>,
) -> Result<Json<ReferenceResponse>, AppError> {
    let Json(request) = request?;
    let amount = request
        .amount
        .ok_or_else(|| LedgerError::Validation("amount is required".to_string()))?;
    let initiated = engine.initiate_payment(InitiatePayment {
        matric_number: MatricNumber::new(request.matric_number),
        first_name: request.first_name,
        last_name: request.last_name,
        email: request.email,
        amount,
        phone_number: request.phone_number,
    })?;

    let message = if initiated.reference.is_some() {
        "Payment reference generated successfully"
    } else {
        "Payment initiated"
    };
    Ok(Json(ReferenceResponse {
        success: true,
        message: message.to_string(),
        reference: initiated.reference,
        transaction_id: initiated.transaction_id,
        summary: initiated.summary,
    }))
}

/// POST /api/register-student - Complete registration.
async fn register_student(
    State(engine): State<Arc<Engine>>,
    request: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<Json<RegisterResponse>, AppError> {
    let Json(request) = request?;
    let registration = Registration {
        matric_number: MatricNumber::new(request.matric_number),
        profile: request.profile,
        reference: non_blank(request.payment_reference).map(Reference::new),
        paid_amount: request.paid_amount,
    };
    let student_id = engine.complete_registration(registration)?;
    Ok(Json(RegisterResponse {
        success: true,
        message: "Registration completed successfully".to_string(),
        student_id,
    }))
}

/// POST /api/payments/{reference}/verify - Poll the gateway for a payment.
async fn verify_payment(
    State(engine): State<Arc<Engine>>,
    reference: Result<Path<String>, PathRejection>,
) -> Result<Json<StatusResponse>, AppError> {
    let Path(reference) = reference?;
    let report = engine.verify_payment(&Reference::new(reference))?;
    Ok(Json(report.into()))
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

// === Router ===

pub fn router(engine: Arc<Engine>) -> Router {
    Router::new()
        .route("/api/check-payment-status", get(check_payment_status))
        .route("/api/payment", post(record_payment))
        .route("/api/payment-reference", post(create_payment_reference))
        .route("/api/register-student", post(register_student))
        .route("/api/payments/{reference}/verify", post(verify_payment))
        .with_state(engine)
}
