use std::path::PathBuf;

use anyhow::{bail, Result};

use doralite::{AssetKind, DoraClient, FindOptions, TimeRange};

use crate::cli::create_spinner;

use super::make_parquet_file_name;

#[allow(clippy::too_many_arguments)]
pub async fn catalog(
    client: &DoraClient,
    id: &str,
    variable: Option<String>,
    frequency: Option<String>,
    kind: &str,
    trange: Option<String>,
    output: Option<PathBuf>,
) -> Result<String> {
    let spinner = create_spinner(format!("Fetching catalog for {}...", id));
    let catalog = client.fetch_catalog(id).await?;
    spinner.finish_with_message(format!("Catalog fetched ({} assets)", catalog.len()));

    let options = FindOptions {
        variable,
        frequency,
        kind: parse_kind(kind)?,
        date_range: trange.as_deref().map(TimeRange::parse).transpose()?,
        ..Default::default()
    };
    let found = catalog.find(&options);

    if found.is_empty() {
        return Ok("No assets match the given filters".to_string());
    }

    let file_name = output.unwrap_or_else(|| make_parquet_file_name("catalog"));
    found.save_parquet(&file_name)?;

    Ok(format!(
        "{} assets saved to `{}`",
        found.len(),
        file_name.display()
    ))
}

fn parse_kind(kind: &str) -> Result<AssetKind> {
    match kind {
        "av" => Ok(AssetKind::Av),
        "ts" => Ok(AssetKind::Ts),
        "both" => Ok(AssetKind::Both),
        _ => bail!("Unknown asset kind `{}` (expected av, ts or both)", kind),
    }
}

// -- Tests -------------------------------------------------------------------
