//! Extraction of global-mean time series from experiment SQLite databases.
//!
//! Each variable is stored as its own `(year, value)` table. Legacy land
//! databases use a `sum` column instead of `value`. Optional cell-measure
//! tables hold areas used to convert means into integrals.

use std::{collections::BTreeSet, path::Path};

use anyhow::{bail, Context, Result};
use rusqlite::Connection;
use tracing::warn;

use crate::{gaps::find_gaps, series::GlobalMeanTable};

/// Metadata tables that are never variables.
const NON_VARIABLE_TABLES: [&str; 3] = ["units", "long_name", "cell_measure"];

#[derive(Debug, Clone)]
pub struct ReadOptions {
    /// Read the legacy land `sum` column instead of `value`.
    pub legacy_land: bool,
    /// Multiply each value by the variable's cell measure.
    pub multiply_by_area: bool,
    /// Constant scale factor applied to every value.
    pub scale: f64,
    /// Constant offset added to the year axis.
    pub yearshift: f64,
    /// Inclusive year bounds applied after the shift.
    pub start: Option<f64>,
    pub end: Option<f64>,
}

impl Default for ReadOptions {
    fn default() -> Self {
        ReadOptions {
            legacy_land: false,
            multiply_by_area: false,
            scale: 1.0,
            yearshift: 0.0,
            start: None,
            end: None,
        }
    }
}

#[derive(Debug, Clone)]
/// One variable's annual series.
pub struct Timeseries {
    pub years: Vec<i64>,
    pub values: Vec<f64>,
}

impl Timeseries {
    /// Reads one variable table, applying the scale and optional area
    /// weighting. Warns when the year sequence has holes.
    pub fn read(conn: &Connection, variable: &str, options: &ReadOptions) -> Result<Self> {
        check_table_name(variable)?;

        let column = if options.legacy_land { "sum" } else { "value" };
        let sql = format!("SELECT year, {} FROM {}", column, variable);

        let mut statement = conn.prepare(&sql)?;
        let mut rows = statement.query([])?;

        let mut years = vec![];
        let mut values = vec![];
        while let Some(row) = rows.next()? {
            years.push(row.get::<_, i64>(0)?);
            values.push(row.get::<_, f64>(1)?);
        }

        let mut scale = vec![options.scale; values.len()];
        if options.multiply_by_area {
            let area = read_cell_measure(conn, variable)?;
            if area.len() == 1 {
                for s in &mut scale {
                    *s *= area[0];
                }
            } else if area.len() == values.len() {
                for (s, a) in scale.iter_mut().zip(&area) {
                    *s *= a;
                }
            } else {
                bail!(
                    "Cell measure for {} has {} rows, expected 1 or {}",
                    variable,
                    area.len(),
                    values.len()
                );
            }
        }

        for (value, s) in values.iter_mut().zip(&scale) {
            *value *= s;
        }

        if !years.is_empty() {
            let first = *years.iter().min().unwrap();
            let last = *years.iter().max().unwrap();
            let missing = find_gaps(&years, Some(first), Some(last), 1);
            if !missing.is_empty() {
                warn!(variable, ?missing, "timeseries is incomplete");
            }
        }

        Ok(Timeseries { years, values })
    }
}

/// Resolves the cell-measure table for a variable. A `cell_measure` lookup
/// table maps variables to their measure; without one the measure table is
/// named `area`.
fn read_cell_measure(conn: &Connection, variable: &str) -> Result<Vec<f64>> {
    let measure = if table_exists(conn, "cell_measure")? {
        conn.query_row(
            "SELECT value FROM cell_measure WHERE var = ?1",
            [variable],
            |row| row.get::<_, String>(0),
        )
        .with_context(|| format!("No cell measure registered for {}", variable))?
    } else {
        "area".to_string()
    };

    check_table_name(&measure)?;
    let sql = format!("SELECT value FROM {}", measure);

    let mut statement = conn.prepare(&sql)?;
    let mut rows = statement.query([])?;

    let mut area = vec![];
    while let Some(row) = rows.next()? {
        area.push(row.get::<_, f64>(0)?);
    }

    Ok(area)
}

fn table_exists(conn: &Connection, name: &str) -> Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
        [name],
        |row| row.get(0),
    )?;

    Ok(count > 0)
}

/// Table names are interpolated into SQL, so restrict them to identifier
/// characters.
fn check_table_name(name: &str) -> Result<()> {
    let valid = !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if !valid {
        bail!("Invalid variable table name: {}", name);
    }

    Ok(())
}

/// Reads a whole experiment database into a [`GlobalMeanTable`]. Variables
/// default to every table except the metadata ones; unreadable tables are
/// skipped with a warning.
pub fn read_db(
    db_path: &Path,
    variables: Option<&[String]>,
    options: &ReadOptions,
) -> Result<GlobalMeanTable> {
    let conn = Connection::open(db_path)
        .with_context(|| format!("Cannot open database: {}", db_path.display()))?;

    let variables: Vec<String> = match variables {
        Some(variables) => variables.to_vec(),
        None => list_variables(&conn)?,
    };

    let mut series = vec![];
    let mut all_years = BTreeSet::new();
    for variable in &variables {
        match Timeseries::read(&conn, variable, options) {
            Ok(ts) if !ts.years.is_empty() => {
                all_years.extend(ts.years.iter().copied());
                series.push((variable.clone(), ts));
            }
            Ok(_) => {}
            Err(e) => {
                warn!(variable = variable.as_str(), error = %e, "skipping unreadable table");
            }
        }
    }

    let years: Vec<i64> = all_years.into_iter().collect();
    let columns = series
        .into_iter()
        .map(|(name, ts)| {
            let values = years
                .iter()
                .map(|year| {
                    ts.years
                        .iter()
                        .position(|y| y == year)
                        .map(|i| ts.values[i])
                })
                .collect();
            (name, values)
        })
        .collect();

    let mut table = GlobalMeanTable {
        years: years.iter().map(|&y| y as f64).collect(),
        columns,
    };

    table.shift_years(options.yearshift);
    let table = table.select_years(options.start, options.end);

    Ok(table)
}

fn list_variables(conn: &Connection) -> Result<Vec<String>> {
    let mut statement =
        conn.prepare("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name")?;
    let names = statement
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(names
        .into_iter()
        .filter(|name| !NON_VARIABLE_TABLES.contains(&name.as_str()))
        .collect())
}

// -- Tests -------------------------------------------------------------------
