//! Year-indexed table of global-mean scalar diagnostics.

use std::{fs::File, path::PathBuf, sync::Arc};

use anyhow::{bail, Result};
use arrow::{
    array::{ArrayRef, Float64Array},
    record_batch::RecordBatch,
};
use parquet::{arrow::ArrowWriter, file::properties::WriterProperties};

use crate::units::Conversion;

#[derive(Debug, Clone, Default)]
/// Global-mean values keyed by model year. Columns share the year axis;
/// missing cells are `None`.
pub struct GlobalMeanTable {
    pub years: Vec<f64>,
    pub columns: Vec<(String, Vec<Option<f64>>)>,
}

impl GlobalMeanTable {
    /// Parses the CSV body returned by the global-mean endpoints. Lines
    /// starting with `#` are comments. The first column is the year axis.
    /// `whitespace_delimited` handles the c4mip table layout.
    pub fn from_csv(text: &str, whitespace_delimited: bool) -> Result<Self> {
        let mut lines = text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'));

        let Some(header) = lines.next() else {
            bail!("Global mean response contained no header row");
        };

        let split = |line: &str| -> Vec<String> {
            if whitespace_delimited {
                line.split_whitespace().map(str::to_string).collect()
            } else {
                line.split(',').map(|s| s.trim().to_string()).collect()
            }
        };

        let header = split(header);
        if header.len() < 2 {
            bail!("Global mean header has no data columns: {:?}", header);
        }

        let names: Vec<String> = header[1..].to_vec();
        let mut years = vec![];
        let mut values: Vec<Vec<Option<f64>>> = vec![vec![]; names.len()];

        for line in lines {
            let fields = split(line);
            let year: f64 = match fields.first().map(|f| f.parse()) {
                Some(Ok(year)) => year,
                _ => continue,
            };
            years.push(year);

            for (i, column) in values.iter_mut().enumerate() {
                let cell = fields.get(i + 1).and_then(|f| f.parse().ok());
                column.push(cell);
            }
        }

        let columns = names.into_iter().zip(values).collect();

        Ok(GlobalMeanTable { years, columns })
    }

    pub fn is_empty(&self) -> bool {
        self.years.is_empty()
    }

    /// Sorted column names.
    pub fn variables(&self) -> Vec<String> {
        let mut names: Vec<String> = self.columns.iter().map(|(name, _)| name.clone()).collect();
        names.sort();
        names
    }

    /// Keeps the rows whose year falls inside the inclusive bounds.
    pub fn select_years(&self, start: Option<f64>, end: Option<f64>) -> GlobalMeanTable {
        let keep: Vec<bool> = self
            .years
            .iter()
            .map(|&year| start.map_or(true, |s| year >= s) && end.map_or(true, |e| year <= e))
            .collect();

        let years = self
            .years
            .iter()
            .zip(&keep)
            .filter(|(_, &k)| k)
            .map(|(&year, _)| year)
            .collect();

        let columns = self
            .columns
            .iter()
            .map(|(name, values)| {
                let values = values
                    .iter()
                    .zip(&keep)
                    .filter(|(_, &k)| k)
                    .map(|(&value, _)| value)
                    .collect();
                (name.clone(), values)
            })
            .collect();

        GlobalMeanTable { years, columns }
    }

    /// Shifts the year axis by a constant offset.
    pub fn shift_years(&mut self, offset: f64) {
        for year in &mut self.years {
            *year += offset;
        }
    }

    /// Applies a display-unit conversion to one column in place. Unknown
    /// columns are left untouched.
    pub fn convert_column(&mut self, name: &str, conversion: &Conversion) {
        for (column, values) in &mut self.columns {
            if column == name {
                for value in values.iter_mut().flatten() {
                    *value = conversion.apply(*value);
                }
            }
        }
    }

    /// Materializes the table as an Arrow record batch with a `year` column
    /// followed by one Float64 column per variable.
    pub fn to_record_batch(&self) -> Result<RecordBatch> {
        let mut columns: Vec<(String, ArrayRef)> = vec![(
            "year".to_string(),
            Arc::new(Float64Array::from(self.years.clone())) as ArrayRef,
        )];

        for (name, values) in &self.columns {
            columns.push((
                name.clone(),
                Arc::new(Float64Array::from(values.clone())) as ArrayRef,
            ));
        }

        let batch = RecordBatch::try_from_iter(
            columns.iter().map(|(name, array)| (name.as_str(), array.clone())),
        )?;

        Ok(batch)
    }

    /// Saves the table to a Snappy-compressed parquet file.
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
    use crate::units::conversion_for;

    const SAMPLE: &str = "\
# experiment: ESM4_historical_D1
# component: atmos
year,tas,pr
1980,287.1,2.9e-5
1981,287.3,
1982,287.2,3.1e-5
";

    #[test]
    fn should_parse_csv_with_comments_and_missing_cells() {
        let table = GlobalMeanTable::from_csv(SAMPLE, false).unwrap();

        assert_eq!(table.years, vec![1980.0, 1981.0, 1982.0]);
        assert_eq!(table.variables(), vec!["pr", "tas"]);
        assert_eq!(table.columns[0].1[0], Some(287.1));
        assert_eq!(table.columns[1].1[1], None);
    }

    #[test]
    fn should_parse_whitespace_delimited_table() {
        let text = "\
YEAR  NBP   GPP
1980  1.2   120.4
1981  1.3   121.0
";
        let table = GlobalMeanTable::from_csv(text, true).unwrap();

        assert_eq!(table.years, vec![1980.0, 1981.0]);
        assert_eq!(table.variables(), vec!["GPP", "NBP"]);
        assert_eq!(table.columns[1].1[1], Some(121.0));
    }

    #[test]
    fn should_select_year_range() {
        let table = GlobalMeanTable::from_csv(SAMPLE, false).unwrap();
        let selected = table.select_years(Some(1981.0), Some(1982.0));

        assert_eq!(selected.years, vec![1981.0, 1982.0]);
        assert_eq!(selected.columns[0].1, vec![Some(287.3), Some(287.2)]);
    }

    #[test]
    fn should_shift_years() {
        let mut table = GlobalMeanTable::from_csv(SAMPLE, false).unwrap();
        table.shift_years(-1979.0);

        assert_eq!(table.years[0], 1.0);
    }

    #[test]
    fn should_convert_column_units() {
        let mut table = GlobalMeanTable::from_csv(SAMPLE, false).unwrap();
        let conversion = conversion_for("tas").unwrap();
        table.convert_column("tas", &conversion);

        let tas = &table.columns[0].1;
        assert!((tas[0].unwrap() - (287.1 - 273.15)).abs() < 1e-9);
    }

    #[test]
    fn should_fail_on_empty_body() {
        assert!(GlobalMeanTable::from_csv("# only comments\n", false).is_err());
    }

    #[test]
    fn should_materialize_record_batch() {
        let table = GlobalMeanTable::from_csv(SAMPLE, false).unwrap();
        let batch = table.to_record_batch().unwrap();

        assert_eq!(batch.num_rows(), 3);
        assert_eq!(batch.num_columns(), 3);
    }
}
