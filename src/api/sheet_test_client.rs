//! Implements the `Sheet` trait using in-memory data for testing purposes.
//!
//! Note: this is compiled even in the "production" version of this app so that we can run the whole
//! app, top-to-bottom, without using Google Sheets.

use crate::api::Sheet;
use crate::error::{tagged, ErrorType, Res};
use crate::model::A1Range;
use std::collections::{BTreeMap, HashMap};
use std::io::Cursor;
use std::sync::{Mutex, OnceLock, PoisonError};
use tracing::trace;

/// The tab names present in a freshly seeded spreadsheet.
pub const SEED_TABS: &[&str] = &["Transactions", "Summary", "Metrics", "Deltas", "Accounts"];

/// Spreadsheet contents, shared by every `TestSheet` in the process and keyed by spreadsheet id,
/// so that a run and the test inspecting it see the same data.
static SPREADSHEETS: OnceLock<Mutex<HashMap<String, TestSheetState>>> = OnceLock::new();

/// The cell grid of every tab in one spreadsheet. Rows and cells are trimmed of trailing
/// empties, the same way the Sheets API returns them.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct TestSheetState {
    tabs: BTreeMap<String, Vec<Vec<String>>>,
}

impl TestSheetState {
    /// A spreadsheet with seed transactions and empty report tabs.
    pub fn seeded() -> Res<Self> {
        let mut state = Self::default();
        for tab in SEED_TABS {
            state.set_tab(*tab, Vec::new());
        }
        state.set_tab("Transactions", load_csv(TRANSACTION_DATA)?);
        Ok(state)
    }

    pub fn tab(&self, name: &str) -> Option<&Vec<Vec<String>>> {
        self.tabs.get(name)
    }

    pub fn set_tab<S: Into<String>>(&mut self, name: S, rows: Vec<Vec<String>>) {
        let mut rows = rows;
        normalize(&mut rows);
        self.tabs.insert(name.into(), rows);
    }

    fn grid(&mut self, range: &A1Range) -> Res<&mut Vec<Vec<String>>> {
        self.tabs
            .get_mut(range.sheet())
            .ok_or_else(|| tagged(ErrorType::Config, format!("Unable to parse range: {range}")))
    }
}

/// How a `TestSheet` should misbehave.
#[derive(Debug, Clone, Default)]
struct Faults {
    /// Writes beyond this many succeed no more.
    fail_writes_after: Option<usize>,
    read_error: Option<ErrorType>,
}

/// An implementation of the `Sheet` trait that does not use Google sheets. It counts calls and
/// can inject faults.
#[derive(Debug, Default)]
pub struct TestSheet {
    faults: Faults,
    reads: usize,
    writes: usize,
    clears: usize,
}

impl TestSheet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every write after the first `n` fails with `ErrorType::RemoteUnavailable`.
    pub fn fail_writes_after(mut self, n: usize) -> Self {
        self.faults.fail_writes_after = Some(n);
        self
    }

    /// Every read fails with `error_type`.
    pub fn fail_reads_with(mut self, error_type: ErrorType) -> Self {
        self.faults.read_error = Some(error_type);
        self
    }

    pub fn reads(&self) -> usize {
        self.reads
    }

    pub fn writes(&self) -> usize {
        self.writes
    }

    pub fn clears(&self) -> usize {
        self.clears
    }

    /// The current contents of the spreadsheet, seeding it first if it has never been used.
    pub fn get_state(spreadsheet_id: &str) -> Res<TestSheetState> {
        with_state(spreadsheet_id, |state| Ok(state.clone()))
    }

    pub fn set_state(spreadsheet_id: &str, state: TestSheetState) {
        spreadsheets()
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(spreadsheet_id.to_string(), state);
    }
}

#[async_trait::async_trait]
impl Sheet for TestSheet {
    async fn read(&mut self, spreadsheet_id: &str, range: &A1Range) -> Res<Vec<Vec<String>>> {
        trace!("read {range}");
        self.reads += 1;
        if let Some(error_type) = self.faults.read_error {
            return Err(tagged(error_type, format!("Injected failure reading {range}")));
        }
        with_state(spreadsheet_id, |state| {
            let grid = state.grid(range)?;
            let (start_row, start_col) = range.start();
            let mut rows = Vec::new();
            for (r, row) in grid.iter().enumerate().skip(start_row) {
                if range.end_row().is_some_and(|end| r > end) {
                    break;
                }
                rows.push(
                    row.iter()
                        .enumerate()
                        .skip(start_col)
                        .take_while(|(c, _)| range.end_col().map_or(true, |end| *c <= end))
                        .map(|(_, cell)| cell.clone())
                        .collect(),
                );
            }
            normalize(&mut rows);
            Ok(rows)
        })
    }

    async fn write(
        &mut self,
        spreadsheet_id: &str,
        range: &A1Range,
        rows: &[Vec<String>],
    ) -> Res<()> {
        trace!("write {} rows to {range}", rows.len());
        if self
            .faults
            .fail_writes_after
            .is_some_and(|limit| self.writes >= limit)
        {
            return Err(tagged(
                ErrorType::RemoteUnavailable,
                format!("Injected failure writing {range}"),
            ));
        }
        self.writes += 1;

        let (start_row, start_col) = range.start();
        if let Some(end_row) = range.end_row() {
            if rows.len() > end_row + 1 - start_row {
                return Err(too_big(range, "rows"));
            }
        }
        if let Some(width) = range.width() {
            if rows.iter().any(|row| row.len() > width) {
                return Err(too_big(range, "columns"));
            }
        }

        with_state(spreadsheet_id, |state| {
            let grid = state.grid(range)?;
            for (i, row) in rows.iter().enumerate() {
                let r = start_row + i;
                if grid.len() <= r {
                    grid.resize(r + 1, Vec::new());
                }
                for (j, cell) in row.iter().enumerate() {
                    let c = start_col + j;
                    if grid[r].len() <= c {
                        grid[r].resize(c + 1, String::new());
                    }
                    grid[r][c] = cell.clone();
                }
            }
            normalize(grid);
            Ok(())
        })
    }

    async fn clear(&mut self, spreadsheet_id: &str, range: &A1Range) -> Res<()> {
        trace!("clear {range}");
        self.clears += 1;
        with_state(spreadsheet_id, |state| {
            let grid = state.grid(range)?;
            for (r, row) in grid.iter_mut().enumerate() {
                for (c, cell) in row.iter_mut().enumerate() {
                    if range.contains(r, c) {
                        cell.clear();
                    }
                }
            }
            normalize(grid);
            Ok(())
        })
    }
}

fn spreadsheets() -> &'static Mutex<HashMap<String, TestSheetState>> {
    SPREADSHEETS.get_or_init(|| Mutex::new(HashMap::new()))
}

fn with_state<T>(
    spreadsheet_id: &str,
    f: impl FnOnce(&mut TestSheetState) -> Res<T>,
) -> Res<T> {
    let mut map = spreadsheets()
        .lock()
        .unwrap_or_else(PoisonError::into_inner);
    if !map.contains_key(spreadsheet_id) {
        map.insert(spreadsheet_id.to_string(), TestSheetState::seeded()?);
    }
    match map.get_mut(spreadsheet_id) {
        Some(state) => f(state),
        None => Err(tagged(ErrorType::Internal, "The test spreadsheet vanished")),
    }
}

fn too_big(range: &A1Range, what: &str) -> anyhow::Error {
    tagged(
        ErrorType::Config,
        format!("The data has more {what} than the range {range}"),
    )
}

/// Drops trailing empty cells from each row and then trailing empty rows.
fn normalize(rows: &mut Vec<Vec<String>>) {
    for row in rows.iter_mut() {
        while row.last().is_some_and(|c| c.is_empty()) {
            row.pop();
        }
    }
    while rows.last().is_some_and(|r| r.is_empty()) {
        rows.pop();
    }
}

/// Loads data from a CSV-formatted string.
fn load_csv(csv_data: &str) -> Res<Vec<Vec<String>>> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(Cursor::new(csv_data.as_bytes()));

    let mut rows: Vec<Vec<String>> = Vec::new();
    for result in rdr.records() {
        let record = result?;
        rows.push(record.iter().map(|field| field.to_string()).collect());
    }
    Ok(rows)
}

/// Seed transaction data. Includes an excluded row, a row with a bad amount and a blank row.
const TRANSACTION_DATA: &str = r##"Date,Description,Category,Amount,Account
10/1/2025,Opening balance,Starting Balance,"$2,500.00",Checking 1
10/1/2025,Acme Corp Payroll,Paycheck,"$3,850.00",Checking 1
10/1/2025,City Water District,Utilities,-$45.88,Checking 1
10/2/2025,In-N-Out Burger,Restaurants,-$9.75,Credit Card 1
10/3/2025,Shell Station #4521,Gas & Fuel,-$61.45,Credit Card 1
10/4/2025,Starbucks #1923,Coffee Shops,-$5.95,Credit Card 1
10/5/2025,Costco Wholesale,Groceries,-$118.56,Credit Card 1
10/6/2025,AT&T Wireless,Utilities,-$75.00,Checking 1
10/7/2025,Olive Garden,Restaurants,-$42.30,Credit Card 1
10/8/2025,Transfer to savings,Savings,-$500.00,Checking 1
10/9/2025,Blue Bottle Coffee,Coffee Shops,-$8.50,Credit Card 1
10/10/2025,Credit card payment,Exclude,"$1,200.00",Checking 1
,,,,
10/11/2025,Comcast Internet,Utilities,-$89.99,Checking 1
10/12/2025,Brokerage deposit,Investing,-$250.00,Checking 1
10/13/2025,Farmers market,Groceries,pending,Credit Card 1
10/14/2025,Mystery merchant,Llama Grooming,-$19.99,Credit Card 1
11/1/2025,Acme Corp Payroll,Paycheck,"$3,850.00",Checking 1
11/2/2025,Trader Joe's #429,Groceries,-$63.21,Credit Card 1
11/3/2025,Peet's Coffee & Tea,Coffee Shops,-$7.25,Credit Card 1
11/4/2025,PG&E Electric,Utilities,-$142.67,Checking 1
11/5/2025,Interest payment,Interest,$1.12,Savings 1
"##;
