use std::path::{Path, PathBuf};

use anyhow::Result;

use doralite::{
    db::{read_db, ReadOptions},
    units::conversion_for,
    DoraClient, GlobalMeanTable,
};

use crate::cli::create_spinner;

use super::make_parquet_file_name;

#[allow(clippy::too_many_arguments)]
pub async fn global_mean(
    client: &DoraClient,
    id: &str,
    component: &str,
    start: Option<f64>,
    end: Option<f64>,
    yearshift: Option<f64>,
    convert: bool,
    output: Option<PathBuf>,
) -> Result<String> {
    let spinner = create_spinner(format!("Fetching {} global means for {}...", component, id));
    let csv = client
        .global_mean(id, component, start, end, yearshift)
        .await?;
    spinner.finish_with_message("Global means fetched");

    let mut table = GlobalMeanTable::from_csv(&csv, component == "c4mip")?;
    if convert {
        apply_conversions(&mut table);
    }

    let file_name = output.unwrap_or_else(|| make_parquet_file_name("global-mean"));
    table.save_parquet(&file_name)?;

    Ok(format!(
        "{} years x {} variables saved to `{}`",
        table.years.len(),
        table.columns.len(),
        file_name.display()
    ))
}

pub async fn db(
    db_file: &Path,
    variables: &[String],
    legacy_land: bool,
    yearshift: Option<f64>,
    output: Option<PathBuf>,
) -> Result<String> {
    let options = ReadOptions {
        legacy_land,
        yearshift: yearshift.unwrap_or(0.0),
        ..Default::default()
    };

    let variables = (!variables.is_empty()).then_some(variables);
    let table = read_db(db_file, variables, &options)?;

    let file_name = output.unwrap_or_else(|| make_parquet_file_name("db"));
    table.save_parquet(&file_name)?;

    Ok(format!(
        "{} years x {} variables saved to `{}`",
        table.years.len(),
        table.columns.len(),
        file_name.display()
    ))
}

fn apply_conversions(table: &mut GlobalMeanTable) {
    for variable in table.variables() {
        if let Some(conversion) = conversion_for(&variable) {
            table.convert_column(&variable, &conversion);
        }
    }
}

// -- Tests -------------------------------------------------------------------
