//! Experiment metadata returned by the Dora `meta.py` endpoint.

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
/// One registered climate model run. Immutable once fetched.
pub struct ExperimentMetadata {
    /// Dora's master id. `None` for experiments not registered with Dora.
    pub id: Option<i64>,
    #[serde(rename = "expName")]
    pub exp_name: String,
    #[serde(rename = "pathPP")]
    pub path_pp: String,
    #[serde(rename = "pathDB", default)]
    pub path_db: Option<String>,
    #[serde(rename = "pathXML", default)]
    pub path_xml: Option<String>,
    #[serde(rename = "pathAnalysis", default)]
    pub path_analysis: Option<String>,
    #[serde(rename = "expYearRange", default)]
    pub exp_year_range: Option<String>,
    #[serde(rename = "userName", default)]
    pub owner: Option<String>,
    #[serde(rename = "modelType", default)]
    pub model: Option<String>,
    /// Derived from `path_pp`, not part of the wire payload.
    #[serde(skip)]
    pub path_history: String,
}

impl ExperimentMetadata {
    /// Fills in the fields derived from the wire payload. Called once after
    /// deserialisation.
    pub fn finalise(mut self) -> Self {
        self.path_history = self.path_pp.replace("/pp", "/history");
        self
    }

    /// The `YYYY-YYYY` span from the experiment registration, when present.
    pub fn year_span(&self) -> Option<(i64, i64)> {
        let range = self.exp_year_range.as_deref()?;
        let (start, end) = range.split_once('-')?;
        Some((start.trim().parse().ok()?, end.trim().parse().ok()?))
    }
}

// -- Tests -------------------------------------------------------------------

#[cfg(test)]
mod tests {

    use super::*;

    #[test]
    fn should_deserialise_and_derive_history_path() {
        let payload = r#"{
            "id": 1234,
            "expName": "ESM4_historical_D1",
            "pathPP": "/archive/oar.gfdl/ESM4/ESM4_historical_D1/gfdl.ncrc4-intel16-prod-openmp/pp",
            "pathDB": "/home/oar.gfdl/ESM4_historical_D1/db",
            "pathXML": "/home/oar.gfdl/xml/ESM4_historical_D1.xml",
            "expYearRange": "1850-2014"
        }"#;

        let meta: ExperimentMetadata = serde_json::from_str(payload).unwrap();
        let meta = meta.finalise();

        assert_eq!(meta.id, Some(1234));
        assert!(meta.path_history.ends_with("/history"));
        assert!(!meta.path_history.contains("/pp"));
        assert_eq!(meta.year_span(), Some((1850, 2014)));
    }

    #[test]
    fn should_accept_unregistered_experiment() {
        let payload = r#"{
            "id": null,
            "expName": "scratch_run",
            "pathPP": "/archive/scratch_run/pp"
        }"#;

        let meta: ExperimentMetadata = serde_json::from_str(payload).unwrap();
        let meta = meta.finalise();

        assert_eq!(meta.id, None);
        assert_eq!(meta.year_span(), None);
    }
}
