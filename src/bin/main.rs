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

use clap::{Parser, Subcommand};
use csv::{ReaderBuilder, Trim, Writer};
use hostel_fee_ledger::config::{DEFAULT_CONFIG_PATH, Settings};
use hostel_fee_ledger::{
    Engine, FeeSchedule, MatricNumber, MemoryStore, PaymentStatus, RecordPayment, SandboxIssuer,
    TransactionId, http,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, Read, Write};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

/// Hostel fee ledger - payment reconciliation service
///
/// Serves the payment JSON API, or replays a CSV of payment events and prints
/// the resulting balance of every student.
#[derive(Parser, Debug)]
#[command(name = "hostel-fees")]
#[command(about = "Reconciles hostel fee payments", long_about = None)]
struct Args {
    /// Settings file (TOML). Missing files fall back to defaults.
    #[arg(long, global = true, value_name = "FILE", default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP API
    Serve {
        /// Address to listen on, overrides `server.bind`
        #[arg(long)]
        bind: Option<String>,
    },
    /// Replay payment events from a CSV file
    ///
    /// Expected format: transaction_id,matric_number,amount,status,reference
    /// Example: hostel-fees replay payments.csv > balances.csv
    Replay {
        #[arg(value_name = "FILE")]
        input: PathBuf,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let settings = match Settings::load(&args.config) {
        Ok(settings) => settings,
        Err(e) => {
            error!(path = %args.config.display(), error = %e, "invalid settings");
            process::exit(1);
        }
    };
    let schedule = match settings.fee_schedule() {
        Ok(schedule) => schedule,
        Err(e) => {
            error!(error = %e, "invalid fee target");
            process::exit(1);
        }
    };

    match args.command {
        Command::Serve { bind } => {
            let bind = bind.unwrap_or_else(|| settings.server.bind.clone());
            if let Err(e) = serve(&settings, schedule, &bind).await {
                error!(%bind, error = %e, "server stopped");
                process::exit(1);
            }
        }
        Command::Replay { input } => {
            let file = match File::open(&input) {
                Ok(f) => f,
                Err(e) => {
                    error!(path = %input.display(), error = %e, "cannot open input");
                    process::exit(1);
                }
            };

            let store = Arc::new(MemoryStore::new());
            let engine = Engine::new(store.clone(), Arc::new(SandboxIssuer::new()), schedule);
            if let Err(e) = process_payments(&engine, BufReader::new(file)) {
                error!(error = %e, "error processing payments");
                process::exit(1);
            }
            if let Err(e) = write_summaries(&engine, &store.matric_numbers(), std::io::stdout()) {
                error!(error = %e, "error writing output");
                process::exit(1);
            }
        }
    }
}

async fn serve(settings: &Settings, schedule: FeeSchedule, bind: &str) -> std::io::Result<()> {
    let issuer = if settings.issuer.direct_charge {
        SandboxIssuer::new().with_direct_charge()
    } else {
        SandboxIssuer::new()
    };
    let engine = Engine::new(Arc::new(MemoryStore::new()), Arc::new(issuer), schedule)
        .with_payer_phone_fallback(settings.issuer.payer_phone_fallback.clone());

    let listener = TcpListener::bind(bind).await?;
    info!(
        addr = %listener.local_addr()?,
        fee = %schedule.target(),
        "hostel fee API listening"
    );
    axum::serve(listener, http::router(Arc::new(engine))).await
}

/// Raw CSV record matching the input format.
///
/// Fields: `transaction_id, matric_number, amount, status, reference`
#[derive(Debug, Deserialize)]
struct CsvRecord {
    transaction_id: String,
    matric_number: String,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    amount: Option<Decimal>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    reference: Option<String>,
}

impl CsvRecord {
    /// Returns `None` when the amount or status cannot be parsed.
    fn into_payment(self) -> Option<RecordPayment> {
        let status = match self.status.as_deref().map(str::trim) {
            None | Some("") => PaymentStatus::Completed,
            Some(status) => status.parse().ok()?,
        };
        let payment = RecordPayment::completed(
            TransactionId::new(self.transaction_id),
            MatricNumber::new(self.matric_number),
            self.amount?,
        )
        .with_status(status);

        Some(match self.reference.filter(|r| !r.trim().is_empty()) {
            Some(reference) => payment.with_reference(reference),
            None => payment,
        })
    }
}

/// Streams payment events from a CSV reader into the engine.
///
/// Malformed rows and rejected events are skipped. Returns the number of
/// events the engine accepted.
///
/// # CSV Format
///
/// ```csv
/// transaction_id,matric_number,amount,status,reference
/// TXN-1,2020/1234,100000,completed,123456789
/// TXN-2,2020/1234,50000,pending,
/// ```
///
/// # Errors
///
/// Returns a CSV error if the reader fails.
pub fn process_payments<R: Read>(engine: &Engine, reader: R) -> Result<usize, csv::Error> {
    let mut rdr = ReaderBuilder::new()
        .trim(Trim::All)
        .flexible(true)
        .has_headers(true)
        .from_reader(reader);

    let mut accepted = 0;
    for result in rdr.deserialize::<CsvRecord>() {
        let record = match result {
            Ok(record) => record,
            Err(e) => {
                debug!(error = %e, "skipping malformed row");
                continue;
            }
        };
        let Some(payment) = record.into_payment() else {
            debug!("skipping invalid payment record");
            continue;
        };

        let transaction_id = payment.transaction_id.clone();
        match engine.record_payment(payment) {
            Ok(_) => accepted += 1,
            Err(e) => debug!(%transaction_id, error = %e, "skipping payment"),
        }
    }

    Ok(accepted)
}

#[derive(Debug, Serialize)]
struct SummaryRow<'a> {
    matric_number: &'a str,
    total_paid: Decimal,
    remaining_balance: Decimal,
    fully_paid: bool,
    percentage: i64,
}

/// Writes one balance row per matric number.
///
/// # CSV Format
///
/// ```csv
/// matric_number,total_paid,remaining_balance,fully_paid,percentage
/// 2020/1234,100000,119000,false,46
/// ```
///
/// # Errors
///
/// Returns a CSV error if writing fails or a balance cannot be read.
pub fn write_summaries<W: Write>(
    engine: &Engine,
    matric_numbers: &[MatricNumber],
    writer: W,
) -> Result<(), csv::Error> {
    let mut wtr = Writer::from_writer(writer);

    for matric in matric_numbers {
        let summary = engine
            .current_summary(matric)
            .map_err(|e| csv::Error::from(std::io::Error::other(e)))?;
        wtr.serialize(SummaryRow {
            matric_number: matric.as_str(),
            total_paid: summary.total_paid,
            remaining_balance: summary.remaining_balance,
            fully_paid: summary.is_fully_paid,
            percentage: summary.payment_percentage,
        })?;
    }

    wtr.flush()?;
    Ok(())
}
