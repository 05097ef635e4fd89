//! Catalog of post-processed file assets for one experiment.
//!
//! The catalog is a flat listing of file assets (one row per file) with the
//! dataset attributes Dora serves in its CSV catalog endpoint. Filters
//! compose: each returns a new catalog over a subset of the rows.

use std::{fs::File, io::Read, path::PathBuf, sync::Arc};

use anyhow::Result;
use arrow::{
    array::{ArrayRef, StringArray},
    record_batch::RecordBatch,
};
use parquet::{arrow::ArrowWriter, file::properties::WriterProperties};
use serde::{Deserialize, Serialize};

use crate::time::{is_overlapping, TimeRange};

/// Realm/chunk preference value used when nothing in the priority list is
/// present in the catalog. Matches no row.
const NO_MATCH: &str = "__nomatch__";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// One file asset in the experiment catalog.
pub struct CatalogRow {
    pub source_id: String,
    pub experiment_id: String,
    pub frequency: String,
    pub table_id: String,
    pub grid_label: String,
    pub realm: String,
    pub member_id: String,
    pub chunk_freq: String,
    pub variable_id: String,
    pub cell_methods: String,
    pub time_range: String,
    pub path: String,
}

impl CatalogRow {
    /// Parses the row's encoded time range (`19800101-19891231`).
    pub fn range(&self) -> Result<TimeRange> {
        TimeRange::parse(&self.time_range)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
/// Whether an asset is an average, a time series, or either. Post-processing
/// trees place averages under an `/av/` segment and time series under `/ts/`.
/// Rows with neither segment only match `Both`.
pub enum AssetKind {
    Av,
    Ts,
    #[default]
    Both,
}

impl AssetKind {
    fn matches(&self, row: &CatalogRow) -> bool {
        match self {
            AssetKind::Av => row.path.contains("/av/"),
            AssetKind::Ts => row.path.contains("/ts/"),
            AssetKind::Both => true,
        }
    }
}

#[derive(Debug, Clone, Default)]
/// Options for [`Catalog::find`]. Filters apply in the order of the fields.
pub struct FindOptions {
    /// Keep only this variable.
    pub variable: Option<String>,
    /// Synthesize annual-mean assets from the realm(s) of this reference
    /// variable before the remaining filters run.
    pub infer_averages_from: Option<String>,
    /// Keep only this output frequency.
    pub frequency: Option<String>,
    /// Keep only averages, time series, or either.
    pub kind: AssetKind,
    /// Keep only assets overlapping this range.
    pub date_range: Option<TimeRange>,
    /// Preferred realms, most preferred first.
    pub realm_priority: Option<Vec<String>>,
    /// Preferred chunk frequencies, most preferred first.
    pub chunk_freq_priority: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default)]
pub struct Catalog {
    rows: Vec<CatalogRow>,
}

impl Catalog {
    pub fn new(rows: Vec<CatalogRow>) -> Self {
        Catalog { rows }
    }

    pub fn rows(&self) -> &[CatalogRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Reads a catalog from CSV with a header row naming the asset
    /// attributes.
    pub fn from_csv<R: Read>(reader: R) -> Result<Self> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_reader(reader);

        let mut rows = vec![];
        for record in csv_reader.deserialize() {
            let row: CatalogRow = record?;
            rows.push(row);
        }

        Ok(Catalog { rows })
    }

    /// Rows whose named attribute equals `value`. Unknown attributes or
    /// unmatched values yield an empty catalog, never an error.
    pub fn search(&self, attribute: &str, value: &str) -> Catalog {
        let rows = self
            .rows
            .iter()
            .filter(|row| {
                let field = match attribute {
                    "source_id" => &row.source_id,
                    "experiment_id" => &row.experiment_id,
                    "frequency" => &row.frequency,
                    "table_id" => &row.table_id,
                    "grid_label" => &row.grid_label,
                    "realm" => &row.realm,
                    "member_id" => &row.member_id,
                    "chunk_freq" => &row.chunk_freq,
                    "variable_id" => &row.variable_id,
                    "cell_methods" => &row.cell_methods,
                    "path" => &row.path,
                    _ => return false,
                };
                field == value
            })
            .cloned()
            .collect();

        Catalog { rows }
    }

    /// Rows whose time range overlaps `range`. Rows with unparseable ranges
    /// are dropped.
    pub fn tsel(&self, range: &TimeRange) -> Catalog {
        let rows = self
            .rows
            .iter()
            .filter(|row| match row.range() {
                Ok(r) => is_overlapping(&r, range),
                Err(_) => false,
            })
            .cloned()
            .collect();

        Catalog { rows }
    }

    /// Concatenates two catalogs, dropping duplicate `(path, variable_id)`
    /// assets from `other`.
    pub fn merge(&self, other: &Catalog) -> Catalog {
        let mut rows = self.rows.clone();
        for row in &other.rows {
            let duplicate = rows
                .iter()
                .any(|r| r.path == row.path && r.variable_id == row.variable_id);
            if !duplicate {
                rows.push(row.clone());
            }
        }

        Catalog { rows }
    }

    /// Chained asset resolution. The filter order is fixed: variable,
    /// annual-mean inference, frequency, asset kind, date range, then
    /// realm/chunk preference.
    pub fn find(&self, options: &FindOptions) -> Catalog {
        let mut result = self.clone();

        if let Some(variable) = &options.variable {
            result = result.search("variable_id", variable);
        }

        if let Some(reference) = &options.infer_averages_from {
            result = result.merge(&result.infer_averages(reference));
        }

        if let Some(frequency) = &options.frequency {
            result = result.search("frequency", frequency);
        }

        result = Catalog {
            rows: result
                .rows
                .into_iter()
                .filter(|row| options.kind.matches(row))
                .collect(),
        };

        if let Some(range) = &options.date_range {
            result = result.tsel(range);
        }

        if let Some(priority) = &options.realm_priority {
            let chosen = result.preferred_value(priority, |row| &row.realm);
            result = result.search("realm", &chosen);
        }

        if let Some(priority) = &options.chunk_freq_priority {
            let chosen = result.preferred_value(priority, |row| &row.chunk_freq);
            result = result.search("chunk_freq", &chosen);
        }

        result
    }

    /// Synthesizes annual-mean assets from the rows sharing a realm with
    /// `reference`: cell methods are relabelled to the averaged marker and
    /// the chunk frequency loses its `monthly_`/`annual_` prefix.
    fn infer_averages(&self, reference: &str) -> Catalog {
        let realms: Vec<&String> = self
            .rows
            .iter()
            .filter(|row| row.variable_id == reference)
            .map(|row| &row.realm)
            .collect();

        let rows = self
            .rows
            .iter()
            .filter(|row| realms.contains(&&row.realm))
            .map(|row| {
                let mut row = row.clone();
                row.cell_methods = "av".to_string();
                row.chunk_freq = row
                    .chunk_freq
                    .strip_prefix("monthly_")
                    .or_else(|| row.chunk_freq.strip_prefix("annual_"))
                    .unwrap_or(&row.chunk_freq)
                    .to_string();
                row
            })
            .collect();

        Catalog { rows }
    }

    /// First value from `priority` present in the column selected by
    /// `extract`, or the non-matching sentinel.
    fn preferred_value(&self, priority: &[String], extract: fn(&CatalogRow) -> &String) -> String {
        priority
            .iter()
            .find(|p| self.rows.iter().any(|row| extract(row) == *p))
            .cloned()
            .unwrap_or_else(|| NO_MATCH.to_string())
    }

    /// Sorted distinct variable ids in the catalog.
    pub fn variables(&self) -> Vec<String> {
        let mut variables: Vec<String> =
            self.rows.iter().map(|row| row.variable_id.clone()).collect();
        variables.sort();
        variables.dedup();
        variables
    }

    /// Materializes the listing as an Arrow record batch.
    pub fn to_record_batch(&self) -> Result<RecordBatch> {
        let column =
            |extract: fn(&CatalogRow) -> &String| -> ArrayRef {
                Arc::new(StringArray::from(
                    self.rows.iter().map(extract).cloned().collect::<Vec<_>>(),
                ))
            };

        let columns: Vec<(&str, ArrayRef)> = vec![
            ("source_id", column(|r| &r.source_id)),
            ("experiment_id", column(|r| &r.experiment_id)),
            ("frequency", column(|r| &r.frequency)),
            ("table_id", column(|r| &r.table_id)),
            ("grid_label", column(|r| &r.grid_label)),
            ("realm", column(|r| &r.realm)),
            ("member_id", column(|r| &r.member_id)),
            ("chunk_freq", column(|r| &r.chunk_freq)),
            ("variable_id", column(|r| &r.variable_id)),
            ("cell_methods", column(|r| &r.cell_methods)),
            ("time_range", column(|r| &r.time_range)),
            ("path", column(|r| &r.path)),
        ];

        let batch = RecordBatch::try_from_iter(columns)?;

        Ok(batch)
    }

    /// Saves the listing to a Snappy-compressed parquet file.
    pub fn save_parquet(&self, file_path: &PathBuf) -> Result<()> {
        let batch = self.to_record_batch()?;

        let file = File::create(file_path)?;
        let props = WriterProperties::builder()
            .set_compression(parquet::basic::Compression::SNAPPY)
            .build();

        let mut writer = ArrowWriter::try_new(file, batch.schema(), Some(props))?;
        writer.write(&batch)?;
        writer.close()?;

        Ok(())
    }
}

// -- Tests -------------------------------------------------------------------

#[cfg(test)]
mod tests {

    use super::*;

    fn row(variable: &str, realm: &str, chunk_freq: &str, time_range: &str, path: &str) -> CatalogRow {
        CatalogRow {
            source_id: "ESM4".to_string(),
            experiment_id: "ESM4_historical_D1".to_string(),
            frequency: "mon".to_string(),
            table_id: "Amon".to_string(),
            grid_label: "gr1".to_string(),
            realm: realm.to_string(),
            member_id: "r1i1p1f1".to_string(),
            chunk_freq: chunk_freq.to_string(),
            variable_id: variable.to_string(),
            cell_methods: "time: mean".to_string(),
            time_range: time_range.to_string(),
            path: path.to_string(),
        }
    }

    fn sample() -> Catalog {
        Catalog::new(vec![
            row(
                "tas",
                "atmos",
                "monthly_5yr",
                "19800101-19841231",
                "/pp/atmos/ts/monthly/5yr/atmos.198001-198412.tas.nc",
            ),
            row(
                "tas",
                "atmos",
                "monthly_5yr",
                "19850101-19891231",
                "/pp/atmos/ts/monthly/5yr/atmos.198501-198912.tas.nc",
            ),
            row(
                "tos",
                "ocean",
                "monthly_5yr",
                "19800101-19841231",
                "/pp/ocean/ts/monthly/5yr/ocean.198001-198412.tos.nc",
            ),
            row(
                "tas",
                "atmos",
                "5yr",
                "19800101-19841231",
                "/pp/atmos/av/monthly_5yr/atmos.1980-1984.tas.nc",
            ),
        ])
    }

    #[test]
    fn should_parse_catalog_from_csv() {
        let csv = "\
source_id,experiment_id,frequency,table_id,grid_label,realm,member_id,chunk_freq,variable_id,cell_methods,time_range,path
ESM4,ESM4_historical_D1,mon,Amon,gr1,atmos,r1i1p1f1,monthly_5yr,tas,time: mean,19800101-19841231,/pp/atmos/ts/monthly/5yr/atmos.198001-198412.tas.nc
";
        let catalog = Catalog::from_csv(csv.as_bytes()).unwrap();

        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog.rows()[0].variable_id, "tas");
        assert_eq!(catalog.rows()[0].realm, "atmos");
    }

    #[test]
    fn should_return_empty_catalog_for_absent_variable() {
        let options = FindOptions {
            variable: Some("nonexistent".to_string()),
            kind: AssetKind::Both,
            ..Default::default()
        };

        assert!(sample().find(&options).is_empty());
    }

    #[test]
    fn should_filter_by_variable_and_kind() {
        let options = FindOptions {
            variable: Some("tas".to_string()),
            kind: AssetKind::Ts,
            ..Default::default()
        };

        let found = sample().find(&options);

        assert_eq!(found.len(), 2);
        assert!(found.rows().iter().all(|r| r.path.contains("/ts/")));
    }

    #[test]
    fn should_select_overlapping_time_ranges() {
        let range = TimeRange::parse("1983-1986").unwrap();
        let selected = sample().tsel(&range);

        // Both tas chunks and the tos chunk overlap 1983-1986; the av asset
        // overlaps too
        assert_eq!(selected.len(), 4);

        let range = TimeRange::parse("1990-1999").unwrap();
        assert!(sample().tsel(&range).is_empty());
    }

    #[test]
    fn should_apply_realm_preference_order() {
        let options = FindOptions {
            kind: AssetKind::Ts,
            realm_priority: Some(vec!["ocean".to_string(), "atmos".to_string()]),
            ..Default::default()
        };

        let found = sample().find(&options);

        assert_eq!(found.len(), 1);
        assert_eq!(found.rows()[0].realm, "ocean");
    }

    #[test]
    fn should_yield_empty_result_for_unmatched_preference() {
        let options = FindOptions {
            kind: AssetKind::Ts,
            realm_priority: Some(vec!["land".to_string()]),
            ..Default::default()
        };

        assert!(sample().find(&options).is_empty());
    }

    #[test]
    fn should_infer_annual_means_from_reference_realm() {
        let inferred = sample().infer_averages("tas");

        // Every atmos row is copied with the averaged marker
        assert!(!inferred.is_empty());
        assert!(inferred.rows().iter().all(|r| r.realm == "atmos"));
        assert!(inferred.rows().iter().all(|r| r.cell_methods == "av"));
        assert!(inferred
            .rows()
            .iter()
            .all(|r| !r.chunk_freq.starts_with("monthly_")));
    }

    #[test]
    fn should_keep_untagged_rows_under_both_kind() {
        let untagged = Catalog::new(vec![row(
            "tas",
            "atmos",
            "monthly_5yr",
            "19800101-19841231",
            "/pp/atmos/monthly/5yr/atmos.198001-198412.tas.nc",
        )]);

        let found = untagged.find(&FindOptions::default());
        assert_eq!(found.len(), 1);

        // Untagged rows match neither av nor ts specifically
        let options = FindOptions {
            kind: AssetKind::Ts,
            ..Default::default()
        };
        assert!(untagged.find(&options).is_empty());

        let options = FindOptions {
            kind: AssetKind::Av,
            ..Default::default()
        };
        assert!(untagged.find(&options).is_empty());
    }

    #[test]
    fn should_merge_without_duplicates() {
        let catalog = sample();
        let merged = catalog.merge(&catalog);

        assert_eq!(merged.len(), catalog.len());
    }

    #[test]
    fn should_materialize_record_batch() {
        let batch = sample().to_record_batch().unwrap();

        assert_eq!(batch.num_rows(), 4);
        assert_eq!(batch.num_columns(), 12);
    }
}
