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

use chrono::NaiveDate;
use clap::{Parser, ValueEnum};
use credit_ledger_rs::{
    AccountId, AccountProfile, Clock, DueSummary, DueTotals, EntryType, FixedClock,
    InMemoryDirectory, LedgerConfig, LedgerEngine, LedgerEntry, NewEntry, QueueKind, SystemClock,
};
use csv::{ReaderBuilder, Trim, Writer};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, Read, Write};
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Credit Ledger - Replay entry CSV files and report what is due
///
/// Loads accounts, applies every entry through the ledger engine and writes
/// the requested report to stdout as CSV. Rejected entries are logged to
/// stderr and skipped.
#[derive(Parser, Debug)]
#[command(name = "credit-ledger")]
#[command(
    about = "A credit ledger that reports balances, dues and aging from entry CSVs",
    long_about = None
)]
struct Args {
    /// Path to CSV file with entries
    ///
    /// Expected format: account,type,debit,credit,description,due_date,created_by,reference
    #[arg(value_name = "FILE")]
    entries: PathBuf,

    /// Path to CSV file with accounts
    ///
    /// Expected format: account,credit_limit,due_days
    #[arg(long, value_name = "FILE")]
    accounts: PathBuf,

    /// Report to write
    #[arg(long, value_enum, default_value_t = Report::Summary)]
    report: Report,

    /// Account for the ledger report
    #[arg(long, required_if_eq("report", "ledger"))]
    account: Option<u32>,

    /// Treat this date as today (YYYY-MM-DD)
    #[arg(long, value_name = "DATE")]
    as_of: Option<NaiveDate>,

    /// Log filter used when RUST_LOG is unset
    #[arg(long, env = "LEDGER_LOG_LEVEL", default_value = "warn")]
    log_level: String,

    #[command(flatten)]
    config: ConfigArgs,
}

#[derive(clap::Args, Debug)]
struct ConfigArgs {
    /// Extra attempts after a lost version race
    #[arg(long, env = "LEDGER_MAX_APPEND_RETRIES", default_value_t = 5)]
    max_append_retries: u32,

    /// Days ahead counted as due this week
    #[arg(long, env = "LEDGER_DUE_SOON_DAYS", default_value_t = 7)]
    due_soon_days: u32,

    /// Entries per page of the ledger report
    #[arg(long, env = "LEDGER_PAGE_SIZE", default_value_t = 500)]
    page_size: usize,

    /// Notification delivery
    #[arg(long, env = "LEDGER_NOTIFICATIONS", value_enum, default_value_t = QueueKind::Disabled)]
    notifications: QueueKind,
}

impl ConfigArgs {
    fn into_config(self) -> LedgerConfig {
        LedgerConfig {
            max_append_retries: self.max_append_retries,
            due_soon_days: self.due_soon_days,
            default_page_size: self.page_size,
            max_page_size: self.page_size.max(LedgerConfig::default().max_page_size),
            notifications: self.notifications,
            ..LedgerConfig::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Report {
    /// Accounts with something due, most overdue first
    Summary,
    /// Portfolio-wide totals
    Totals,
    /// Every entry of one account
    Ledger,
}

fn main() {
    let args = Args::parse();
    init_tracing(&args.log_level);

    let directory = match open(&args.accounts).and_then(|file| Ok(load_accounts(file)?)) {
        Ok(directory) => directory,
        Err(e) => {
            eprintln!("Error loading accounts '{}': {}", args.accounts.display(), e);
            process::exit(1);
        }
    };

    let clock: Arc<dyn Clock> = match args.as_of {
        Some(date) => Arc::new(FixedClock::on(date)),
        None => Arc::new(SystemClock),
    };
    let engine = match LedgerEngine::builder(Arc::new(directory))
        .clock(clock)
        .config(args.config.into_config())
        .build()
    {
        Ok(engine) => engine,
        Err(e) => {
            eprintln!("Invalid configuration: {}", e);
            process::exit(1);
        }
    };

    let file = match open(&args.entries) {
        Ok(file) => file,
        Err(e) => {
            eprintln!("Error opening file '{}': {}", args.entries.display(), e);
            process::exit(1);
        }
    };
    if let Err(e) = process_entries(&engine, file) {
        eprintln!("Error processing entries: {}", e);
        process::exit(1);
    }

    let stdout = std::io::stdout();
    let result = match args.report {
        Report::Summary => write_summaries(&engine, stdout),
        Report::Totals => write_totals(&engine, stdout),
        Report::Ledger => {
            let account = AccountId(args.account.unwrap_or_default());
            write_ledger(&engine, account, stdout)
        }
    };
    if let Err(e) = result {
        eprintln!("Error writing output: {}", e);
        process::exit(1);
    }
}

fn init_tracing(log_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn open(path: &Path) -> Result<BufReader<File>, Box<dyn std::error::Error>> {
    Ok(BufReader::new(File::open(path)?))
}

/// Raw CSV record of the accounts file.
#[derive(Debug, Deserialize)]
struct AccountRecord {
    account: u32,
    credit_limit: Decimal,
    due_days: u32,
}

/// Loads account profiles from CSV.
///
/// # Errors
///
/// Returns a CSV error on the first malformed row; accounts are not skipped.
fn load_accounts<R: Read>(reader: R) -> Result<InMemoryDirectory, csv::Error> {
    let mut rdr = ReaderBuilder::new().trim(Trim::All).from_reader(reader);
    rdr.deserialize::<AccountRecord>()
        .map(|record| {
            let record = record?;
            Ok(AccountProfile::new(
                AccountId(record.account),
                record.credit_limit,
                record.due_days,
            ))
        })
        .collect()
}

/// Raw CSV record matching the entries format.
///
/// Fields: `account, type, debit, credit, description, due_date, created_by, reference`
#[derive(Debug, Deserialize)]
struct EntryRecord {
    account: u32,
    #[serde(rename = "type")]
    entry_type: EntryType,
    #[serde(deserialize_with = "csv::invalid_option")]
    debit: Option<Decimal>,
    #[serde(deserialize_with = "csv::invalid_option")]
    credit: Option<Decimal>,
    description: String,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    due_date: Option<NaiveDate>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    created_by: Option<String>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    reference: Option<String>,
}

impl EntryRecord {
    fn into_request(self) -> NewEntry {
        let mut request = NewEntry::new(
            AccountId(self.account),
            self.entry_type,
            self.debit.unwrap_or_default(),
            self.credit.unwrap_or_default(),
            self.description,
        );
        request.due_date = self.due_date;
        request.reference = self.reference.filter(|reference| !reference.is_empty());
        if let Some(user) = self.created_by.filter(|user| !user.is_empty()) {
            request = request.created_by(user);
        }
        request
    }
}

/// Applies entries from a CSV reader, in file order.
///
/// Malformed rows and rejected entries are logged and skipped. Returns the
/// number of entries committed.
///
/// # CSV Format
///
/// ```csv
/// account,type,debit,credit,description,due_date,created_by,reference
/// 1,purchase,100.00,,Invoice 17,2025-03-01,clerk,INV-17
/// 1,payment,,40.00,Cash,,clerk,
/// ```
///
/// # Errors
///
/// Returns a CSV error if the reader fails or the CSV structure is invalid.
fn process_entries<R: Read>(engine: &LedgerEngine, reader: R) -> Result<usize, csv::Error> {
    let mut rdr = ReaderBuilder::new()
        .trim(Trim::All)
        .flexible(true)
        .has_headers(true)
        .from_reader(reader);

    let mut applied = 0;
    for (row, result) in rdr.deserialize::<EntryRecord>().enumerate() {
        let record = match result {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!(row = row + 1, error = %e, "skipping malformed row");
                continue;
            }
        };
        match engine.create_entry(record.into_request()) {
            Ok(_) => applied += 1,
            Err(e) => tracing::warn!(row = row + 1, error = %e, "skipping rejected entry"),
        }
    }
    Ok(applied)
}

const DECIMAL_PRECISION: u32 = 4;

/// Rounds to four places and pads, so every amount column lines up.
fn fixed(amount: Decimal) -> Decimal {
    let mut amount = amount.round_dp(DECIMAL_PRECISION);
    amount.rescale(DECIMAL_PRECISION);
    amount
}

/// Flat CSV row of a [`DueSummary`].
#[derive(Debug, Serialize)]
struct SummaryRow {
    account: AccountId,
    current_balance: Decimal,
    total_due: Decimal,
    overdue: Decimal,
    due_today: Decimal,
    due_this_week: Decimal,
    #[serde(rename = "0-30")]
    aging_30: Decimal,
    #[serde(rename = "31-60")]
    aging_60: Decimal,
    #[serde(rename = "61-90")]
    aging_90: Decimal,
    #[serde(rename = "90+")]
    aging_over_90: Decimal,
    last_activity: Option<String>,
}

impl From<&DueSummary> for SummaryRow {
    fn from(summary: &DueSummary) -> Self {
        Self {
            account: summary.account_id,
            current_balance: fixed(summary.current_balance),
            total_due: fixed(summary.total_due),
            overdue: fixed(summary.overdue_amount),
            due_today: fixed(summary.due_today),
            due_this_week: fixed(summary.due_this_week),
            aging_30: fixed(summary.aging.up_to_30),
            aging_60: fixed(summary.aging.up_to_60),
            aging_90: fixed(summary.aging.up_to_90),
            aging_over_90: fixed(summary.aging.over_90),
            last_activity: summary.last_activity.map(|at| at.to_rfc3339()),
        }
    }
}

#[derive(Debug, Serialize)]
struct TotalsRow {
    accounts: usize,
    current_balance: Decimal,
    total_due: Decimal,
    overdue: Decimal,
    due_today: Decimal,
    due_this_week: Decimal,
    #[serde(rename = "0-30")]
    aging_30: Decimal,
    #[serde(rename = "31-60")]
    aging_60: Decimal,
    #[serde(rename = "61-90")]
    aging_90: Decimal,
    #[serde(rename = "90+")]
    aging_over_90: Decimal,
}

impl From<&DueTotals> for TotalsRow {
    fn from(totals: &DueTotals) -> Self {
        Self {
            accounts: totals.account_count,
            current_balance: fixed(totals.current_balance),
            total_due: fixed(totals.total_due),
            overdue: fixed(totals.overdue_amount),
            due_today: fixed(totals.due_today),
            due_this_week: fixed(totals.due_this_week),
            aging_30: fixed(totals.aging.up_to_30),
            aging_60: fixed(totals.aging.up_to_60),
            aging_90: fixed(totals.aging.up_to_90),
            aging_over_90: fixed(totals.aging.over_90),
        }
    }
}

#[derive(Debug, Serialize)]
struct LedgerRow<'a> {
    id: u64,
    created_at: String,
    #[serde(rename = "type")]
    entry_type: EntryType,
    description: &'a str,
    debit: Decimal,
    credit: Decimal,
    balance: Decimal,
    due_date: Option<NaiveDate>,
    reference: Option<&'a str>,
}

impl<'a> From<&'a LedgerEntry> for LedgerRow<'a> {
    fn from(entry: &'a LedgerEntry) -> Self {
        Self {
            id: entry.id.0,
            created_at: entry.created_at.to_rfc3339(),
            entry_type: entry.entry_type,
            description: &entry.description,
            debit: fixed(entry.debit),
            credit: fixed(entry.credit),
            balance: fixed(entry.balance),
            due_date: entry.due_date,
            reference: entry.reference.as_deref(),
        }
    }
}

/// Writes the ranked due summaries.
///
/// # CSV Format
///
/// ```csv
/// account,current_balance,total_due,overdue,due_today,due_this_week,0-30,31-60,61-90,90+,last_activity
/// 1,250.0000,250.0000,200.0000,0.0000,50.0000,0.0000,200.0000,0.0000,0.0000,2025-06-15T00:00:00+00:00
/// ```
fn write_summaries<W: Write>(
    engine: &LedgerEngine,
    writer: W,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut wtr = Writer::from_writer(writer);
    for summary in engine.list_accounts_with_due()? {
        wtr.serialize(SummaryRow::from(&summary))?;
    }
    wtr.flush()?;
    Ok(())
}

fn write_totals<W: Write>(
    engine: &LedgerEngine,
    writer: W,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut wtr = Writer::from_writer(writer);
    wtr.serialize(TotalsRow::from(&engine.global_due_totals()?))?;
    wtr.flush()?;
    Ok(())
}

/// Writes every entry of `account`, page by page.
fn write_ledger<W: Write>(
    engine: &LedgerEngine,
    account: AccountId,
    writer: W,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut wtr = Writer::from_writer(writer);
    let mut page = 1;
    loop {
        let ledger = engine.get_account_ledger(account, page, None)?;
        for entry in &ledger.entries {
            wtr.serialize(LedgerRow::from(entry))?;
        }
        if page >= ledger.pagination.total_pages {
            break;
        }
        page += 1;
    }
    wtr.flush()?;
    Ok(())
}
