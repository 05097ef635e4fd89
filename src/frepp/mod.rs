//! Post-processing tree inspection and repair planning.
//!
//! A [`TsGroup`] pairs one experiment with one output component, inventories
//! the time-series chunks on disk against the history archive's year span,
//! and plans the `frepp` invocations that would regenerate missing chunks.
//! Commands are returned as text, never executed here.

use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{anyhow, bail, Context, Result};
use tracing::warn;

use crate::{
    api::DoraClient,
    gaps::{find_gaps, is_consecutive},
    metadata::ExperimentMetadata,
};

#[derive(Debug, Clone, PartialEq)]
/// One time-series file, parsed from the naming pattern
/// `<component>.<start>-<end>.<variable>.nc` under `<freq>/<chunk>/`.
pub struct TsFile {
    pub path: PathBuf,
    /// Output frequency, the last two directory segments (`monthly/5yr`).
    pub freq: String,
    pub component: String,
    pub variable: String,
    pub start_year: i64,
    pub end_year: i64,
}

impl TsFile {
    pub fn parse(path: &Path) -> Result<Self> {
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| anyhow!("Invalid ts file path: {}", path.display()))?;

        let parts: Vec<&str> = file_name.split('.').collect();
        if parts.len() < 4 {
            bail!("Unexpected ts file name: {}", file_name);
        }

        let component = parts[0].to_string();
        let time_period = parts[1];
        let variable = parts[2].to_string();

        let (start, end) = time_period
            .split_once('-')
            .ok_or_else(|| anyhow!("Unexpected time period in {}", file_name))?;
        let start_year = parse_year(start)
            .with_context(|| format!("Bad start year in {}", file_name))?;
        let end_year = parse_year(end).with_context(|| format!("Bad end year in {}", file_name))?;

        let freq = path
            .ancestors()
            .nth(2)
            .and_then(Path::file_name)
            .and_then(|n| n.to_str())
            .map(|outer| {
                let chunk = path
                    .parent()
                    .and_then(Path::file_name)
                    .and_then(|n| n.to_str())
                    .unwrap_or("");
                format!("{}/{}", outer, chunk)
            })
            .unwrap_or_default();

        Ok(TsFile {
            path: path.to_path_buf(),
            freq,
            component,
            variable,
            start_year,
            end_year,
        })
    }
}

fn parse_year(token: &str) -> Result<i64> {
    let year = token
        .get(0..4)
        .filter(|y| y.chars().all(|c| c.is_ascii_digit()))
        .ok_or_else(|| anyhow!("Year token must start with four digits: {}", token))?;

    Ok(year.parse()?)
}

/// Parses the chunk length out of a frequency label (`monthly/5yr` -> 5).
fn chunk_length(freq: &str) -> Result<i64> {
    let chunk = freq.rsplit('/').next().unwrap_or(freq);
    let years = chunk
        .strip_suffix("yr")
        .ok_or_else(|| anyhow!("Frequency has no chunk length: {}", freq))?;

    let years: i64 = years
        .parse()
        .with_context(|| format!("Bad chunk length in frequency: {}", freq))?;
    if years < 1 {
        bail!("Chunk length must be at least one year: {}", freq);
    }

    Ok(years)
}

#[derive(Debug, Clone)]
/// Yearly tar archives in an experiment's history directory.
pub struct History {
    pub directory: PathBuf,
    pub years: Vec<i64>,
}

impl History {
    pub fn open(directory: &Path) -> Result<Self> {
        if !directory.exists() {
            bail!("History dir does not exist: {}", directory.display());
        }

        let mut files: Vec<String> = fs::read_dir(directory)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.file_name().to_string_lossy().to_string())
            .filter(|name| name.ends_with(".tar"))
            .collect();
        files.sort();

        let years = files
            .iter()
            .filter_map(|name| name.get(0..4).and_then(|y| y.parse().ok()))
            .collect();

        Ok(History {
            directory: directory.to_path_buf(),
            years,
        })
    }

    pub fn consecutive(&self, start: Option<i64>, end: Option<i64>) -> bool {
        is_consecutive(&self.years, start, end, 1)
    }

    pub fn gaps(&self, start: Option<i64>, end: Option<i64>) -> Vec<i64> {
        find_gaps(&self.years, start, end, 1)
    }
}

#[derive(Debug)]
/// One experiment+component pair and its on-disk time-series inventory.
pub struct TsGroup {
    pub metadata: ExperimentMetadata,
    /// Requested id, `None` when the experiment is not registered.
    pub id: Option<String>,
    pub component: String,
    pub path: PathBuf,
    pub files: Vec<TsFile>,
    pub history: History,
    pub start: i64,
    pub end: i64,
}

impl TsGroup {
    /// Resolves metadata over the network, then inspects the tree.
    pub async fn fetch(
        client: &DoraClient,
        id: &str,
        component: &str,
        start: Option<i64>,
        end: Option<i64>,
    ) -> Result<Self> {
        let metadata = client.metadata(id).await?;
        let requested = metadata.id.is_some().then(|| id.to_string());

        Self::open(metadata, requested, component, start, end)
    }

    /// Builds a group from already-resolved metadata.
    pub fn open(
        metadata: ExperimentMetadata,
        requested_id: Option<String>,
        component: &str,
        start: Option<i64>,
        end: Option<i64>,
    ) -> Result<Self> {
        let id = if metadata.id.is_some() {
            requested_id.or_else(|| metadata.id.map(|i| i.to_string()))
        } else {
            None
        };

        let pp_root = Path::new(&metadata.path_pp);
        if !pp_root.exists() {
            bail!("Cannot access {}", metadata.path_pp);
        }

        let path = pp_root.join(component);
        if !path.exists() {
            bail!("Cannot access {} component", component);
        }

        let mut nc_files = vec![];
        let ts_root = path.join("ts");
        if ts_root.exists() {
            collect_nc_files(&ts_root, &mut nc_files)?;
        }
        nc_files.sort();

        let files = nc_files
            .iter()
            .map(|p| TsFile::parse(p))
            .collect::<Result<Vec<_>>>()?;

        let history = History::open(Path::new(&metadata.path_history))?;

        let span = metadata.year_span();
        let start = start
            .or(span.map(|(s, _)| s))
            .or_else(|| history.years.first().copied())
            .ok_or_else(|| anyhow!("Cannot infer a start year for {}", metadata.exp_name))?;
        let end = end
            .or(span.map(|(_, e)| e))
            .or_else(|| history.years.last().copied())
            .ok_or_else(|| anyhow!("Cannot infer an end year for {}", metadata.exp_name))?;

        if !history.consecutive(Some(start), Some(end)) {
            warn!(
                directory = %history.directory.display(),
                missing = ?history.gaps(Some(start), Some(end)),
                "history directory is incomplete"
            );
        }

        Ok(TsGroup {
            metadata,
            id,
            component: component.to_string(),
            path,
            files,
            history,
            start,
            end,
        })
    }

    /// Sorted distinct variables in the group.
    pub fn variables(&self) -> Vec<String> {
        let mut variables: Vec<String> =
            self.files.iter().map(|f| f.variable.clone()).collect();
        variables.sort();
        variables.dedup();
        variables
    }

    /// Sorted distinct output frequencies in the group.
    pub fn freqs(&self) -> Vec<String> {
        let mut freqs: Vec<String> = self.files.iter().map(|f| f.freq.clone()).collect();
        freqs.sort();
        freqs.dedup();
        freqs
    }

    /// Missing chunk end-years for one frequency, stepped by its chunk
    /// length and bounded by the group's span.
    pub fn missing_for_freq(&self, freq: &str) -> Result<Vec<i64>> {
        let mut end_years: Vec<i64> = self
            .files
            .iter()
            .filter(|f| f.freq == freq)
            .map(|f| f.end_year)
            .collect();
        end_years.sort_unstable();
        end_years.dedup();

        let step = chunk_length(freq)?;

        Ok(find_gaps(&end_years, Some(self.start), Some(self.end), step))
    }

    /// Union of missing chunk end-years across every observed frequency.
    pub fn missing(&self) -> Result<Vec<i64>> {
        let mut missing = vec![];
        for freq in self.freqs() {
            missing.extend(self.missing_for_freq(&freq)?);
        }
        missing.sort_unstable();
        missing.dedup();

        Ok(missing)
    }

    /// Plans the repair: one state-file removal covering the missing
    /// chunks, then one `frepp` invocation per chunk. Requires a registered
    /// experiment and an intact state directory and XML.
    pub fn repair(&self) -> Result<Vec<String>> {
        if self.id.is_none() {
            bail!("Experiment must be registered in dora to do a repair.");
        }

        let path_db = self
            .metadata
            .path_db
            .as_deref()
            .ok_or_else(|| anyhow!("Experiment has no database path"))?;
        let state_dir = PathBuf::from(path_db.replace("db", "state")).join("postProcess");
        if !state_dir.exists() {
            bail!("Cannot access state directory: {}", state_dir.display());
        }

        let missing = self.missing()?;
        let mut commands = vec![];

        let state_files: Vec<String> = missing
            .iter()
            .map(|year| state_dir.join(format!("{}.{}", self.component, year)))
            .filter(|path| path.exists())
            .map(|path| path.to_string_lossy().to_string())
            .collect();
        if !state_files.is_empty() {
            commands.push(format!("rm -f {}", state_files.join(" ")));
        }

        let xml_path = self
            .metadata
            .path_xml
            .as_deref()
            .ok_or_else(|| anyhow!("Experiment has no XML path"))?
            .trim_end_matches('/')
            .to_string();
        if !Path::new(&xml_path).exists() {
            bail!("Cannot find xml: {}", xml_path);
        }

        let (platform, target) = infer_platform_target(&state_dir)?;

        for year in &missing {
            commands.push(format!(
                "frepp -s -x {} -t {} -P {} -T {} -d {} -c {} {}",
                xml_path,
                year,
                platform,
                target,
                self.history.directory.display(),
                self.component,
                self.metadata.exp_name
            ));
        }

        Ok(commands)
    }
}

fn collect_nc_files(dir: &Path, files: &mut Vec<PathBuf>) -> Result<()> {
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_nc_files(&path, files)?;
        } else if path.extension().and_then(|e| e.to_str()) == Some("nc") {
            files.push(path);
        }
    }

    Ok(())
}

/// The platform/target pair is encoded in the state directory's
/// third-from-last path segment, e.g. `gfdl.ncrc4-intel16-prod-openmp`:
/// platform joins the first two tokens with `-`, target the rest with `,`.
fn infer_platform_target(state_dir: &Path) -> Result<(String, String)> {
    let segments: Vec<&str> = state_dir
        .iter()
        .filter_map(|s| s.to_str())
        .collect();
    if segments.len() < 3 {
        bail!(
            "State directory too shallow to infer platform: {}",
            state_dir.display()
        );
    }

    let encoded = segments[segments.len() - 3];
    let tokens: Vec<&str> = encoded.split('-').collect();
    if tokens.len() < 3 {
        bail!("Cannot infer platform and target from: {}", encoded);
    }

    let platform = tokens[..2].join("-");
    let target = tokens[2..].join(",");

    Ok((platform, target))
}

/// Plans repairs for every component of an experiment (or the named ones).
/// Removal commands sort before `frepp` invocations; ties break on the
/// full command text.
pub async fn repair_all_components(
    client: &DoraClient,
    id: &str,
    components: Option<Vec<String>>,
) -> Result<Vec<String>> {
    let metadata = client.metadata(id).await?;
    let requested = metadata.id.is_some().then(|| id.to_string());

    repair_components(metadata, requested, components)
}

/// Offline planner over already-resolved metadata.
pub fn repair_components(
    metadata: ExperimentMetadata,
    requested_id: Option<String>,
    components: Option<Vec<String>>,
) -> Result<Vec<String>> {
    let components = match components {
        Some(components) => components,
        None => list_components(Path::new(&metadata.path_pp))?,
    };

    let mut commands = vec![];
    for component in &components {
        let group = TsGroup::open(
            metadata.clone(),
            requested_id.clone(),
            component,
            None,
            None,
        )?;
        commands.extend(group.repair()?);
    }

    commands.sort_by(|a, b| command_sort_key(a).cmp(&command_sort_key(b)));

    Ok(commands)
}

fn command_sort_key(command: &str) -> (u8, &str) {
    let class = match command.chars().next().map(|c| c.to_ascii_lowercase()) {
        Some('r') => 0,
        Some('f') => 1,
        _ => 2,
    };

    (class, command)
}

fn list_components(pp_root: &Path) -> Result<Vec<String>> {
    let mut components: Vec<String> = fs::read_dir(pp_root)?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.path().is_dir())
        .map(|entry| entry.file_name().to_string_lossy().to_string())
        .filter(|name| !name.starts_with('.'))
        .collect();
    components.sort();

    Ok(components)
}

// -- Tests -------------------------------------------------------------------

#[cfg(test)]
mod tests {

    use super::*;
    use std::fs::File;
    use tempfile::TempDir;

    /// Lays out a minimal post-processing tree:
    /// `<root>/gfdl.ncrc4-intel16-prod-openmp/{pp,history,db,state}` with an
    /// `atmos` component holding 5-year monthly chunks. Returns the state
    /// directory exactly as `repair` will derive it from the db path.
    fn fixture(
        present_chunks: &[(i64, i64)],
        history_years: &[i64],
    ) -> (TempDir, ExperimentMetadata, PathBuf) {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("gfdl.ncrc4-intel16-prod-openmp");

        let pp = root.join("pp");
        let ts_dir = pp.join("atmos/ts/monthly/5yr");
        fs::create_dir_all(&ts_dir).unwrap();
        for (start, end) in present_chunks {
            let name = format!("atmos.{}01-{}12.tas.nc", start, end);
            File::create(ts_dir.join(name)).unwrap();
        }

        let history = root.join("history");
        fs::create_dir_all(&history).unwrap();
        for year in history_years {
            File::create(history.join(format!("{}.nc.tar", year))).unwrap();
        }

        let path_db = root.join("db").to_string_lossy().to_string();
        fs::create_dir_all(root.join("db")).unwrap();
        let state_dir = PathBuf::from(path_db.replace("db", "state")).join("postProcess");
        fs::create_dir_all(&state_dir).unwrap();

        let xml = dir.path().join("experiment.xml");
        File::create(&xml).unwrap();

        let metadata = ExperimentMetadata {
            id: Some(1234),
            exp_name: "ESM4_historical_D1".to_string(),
            path_pp: pp.to_string_lossy().to_string(),
            path_db: Some(path_db),
            path_xml: Some(xml.to_string_lossy().to_string()),
            path_analysis: None,
            exp_year_range: None,
            owner: None,
            model: None,
            path_history: history.to_string_lossy().to_string(),
        };

        (dir, metadata, state_dir)
    }

    #[test]
    fn should_parse_ts_file() {
        let path = Path::new("/pp/atmos/ts/monthly/5yr/atmos.200001-200412.tas.nc");
        let file = TsFile::parse(path).unwrap();

        assert_eq!(file.component, "atmos");
        assert_eq!(file.variable, "tas");
        assert_eq!(file.freq, "monthly/5yr");
        assert_eq!(file.start_year, 2000);
        assert_eq!(file.end_year, 2004);
    }

    #[test]
    fn should_reject_unparseable_ts_file() {
        assert!(TsFile::parse(Path::new("/pp/atmos/ts/monthly/5yr/garbage.nc")).is_err());
    }

    #[test]
    fn should_reject_non_digit_year_tokens_without_panicking() {
        // Multibyte character straddling the year slice boundary
        let path = Path::new("/pp/atmos/ts/monthly/5yr/atmos.200\u{fc}01-200412.tas.nc");
        assert!(TsFile::parse(path).is_err());

        let path = Path::new("/pp/atmos/ts/monthly/5yr/atmos.19x0-1984.tas.nc");
        assert!(TsFile::parse(path).is_err());
    }

    #[test]
    fn should_parse_chunk_length() {
        assert_eq!(chunk_length("monthly/5yr").unwrap(), 5);
        assert_eq!(chunk_length("annual/20yr").unwrap(), 20);
        assert!(chunk_length("monthly/latest").is_err());
        assert!(chunk_length("monthly/0yr").is_err());
    }

    #[test]
    fn should_infer_platform_and_target() {
        let state_dir = Path::new("/archive/gfdl.ncrc4-intel16-prod-openmp/state/postProcess");
        let (platform, target) = infer_platform_target(state_dir).unwrap();

        assert_eq!(platform, "gfdl.ncrc4-intel16");
        assert_eq!(target, "prod,openmp");
    }

    #[test]
    fn should_report_no_missing_chunks_for_complete_tree() {
        let chunks = [(2000, 2004), (2005, 2009), (2010, 2014)];
        let (_dir, metadata, _state_dir) = fixture(&chunks, &(2000..=2014).collect::<Vec<_>>());

        let group =
            TsGroup::open(metadata, Some("1234".to_string()), "atmos", None, None).unwrap();

        assert_eq!(group.start, 2000);
        assert_eq!(group.end, 2014);
        assert!(group.missing().unwrap().is_empty());
    }

    #[test]
    fn should_detect_missing_chunk_and_plan_repair() {
        // 2005-2009 chunk absent; its end year 2009 is the gap
        let chunks = [(2000, 2004), (2010, 2014)];
        let (_dir, metadata, state_dir) = fixture(&chunks, &(2000..=2014).collect::<Vec<_>>());

        // Stale state marker for the missing chunk
        File::create(state_dir.join("atmos.2009")).unwrap();

        let group =
            TsGroup::open(metadata, Some("1234".to_string()), "atmos", None, None).unwrap();

        assert_eq!(group.missing().unwrap(), vec![2009]);

        let commands = group.repair().unwrap();
        assert_eq!(commands.len(), 2);
        assert!(commands[0].starts_with("rm -f "));
        assert!(commands[0].contains("atmos.2009"));
        assert!(commands[1].starts_with("frepp -s -x "));
        assert!(commands[1].contains("-t 2009"));
        assert!(commands[1].contains("-P gfdl.ncrc4-intel16"));
        assert!(commands[1].contains("-T prod,openmp"));
        assert!(commands[1].contains("-c atmos"));
        assert!(commands[1].ends_with("ESM4_historical_D1"));
    }

    #[test]
    fn should_refuse_repair_for_unregistered_experiment() {
        let chunks = [(2000, 2004)];
        let (_dir, mut metadata, _state_dir) = fixture(&chunks, &(2000..=2004).collect::<Vec<_>>());
        metadata.id = None;

        let group = TsGroup::open(metadata, None, "atmos", None, None).unwrap();

        assert!(group.repair().is_err());
    }

    #[test]
    fn should_fail_for_missing_component() {
        let chunks = [(2000, 2004)];
        let (_dir, metadata, _state_dir) = fixture(&chunks, &(2000..=2004).collect::<Vec<_>>());

        let result = TsGroup::open(metadata, Some("1234".to_string()), "ocean", None, None);

        assert!(result.is_err());
    }

    #[test]
    fn should_prefer_explicit_bounds_over_history() {
        let chunks = [(2000, 2004)];
        let (_dir, metadata, _state_dir) = fixture(&chunks, &(2000..=2009).collect::<Vec<_>>());

        let group = TsGroup::open(
            metadata,
            Some("1234".to_string()),
            "atmos",
            Some(2000),
            Some(2004),
        )
        .unwrap();

        assert!(group.missing().unwrap().is_empty());
    }

    #[test]
    fn should_plan_repairs_for_all_components() {
        let chunks = [(2000, 2004), (2010, 2014)];
        let (_dir, metadata, _state_dir) = fixture(&chunks, &(2000..=2014).collect::<Vec<_>>());

        let commands = repair_components(metadata, Some("1234".to_string()), None).unwrap();

        assert_eq!(commands.len(), 1);
        assert!(commands[0].starts_with("frepp "));
    }

    #[test]
    fn should_sort_removals_before_frepp_invocations() {
        let mut commands = vec![
            "frepp -s -x b.xml".to_string(),
            "rm -f /state/atmos.2009".to_string(),
            "frepp -s -x a.xml".to_string(),
        ];
        commands.sort_by(|a, b| command_sort_key(a).cmp(&command_sort_key(b)));

        assert!(commands[0].starts_with("rm "));
        assert_eq!(commands[1], "frepp -s -x a.xml");
    }

    #[test]
    fn should_report_history_gaps_with_bounds() {
        let chunks = [(2000, 2004)];
        let mut years: Vec<i64> = (2000..=2004).collect();
        years.push(2006);
        let (_dir, metadata, _state_dir) = fixture(&chunks, &years);

        let group = TsGroup::open(metadata, Some("1234".to_string()), "atmos", None, None).unwrap();

        assert!(!group.history.consecutive(Some(2000), Some(2006)));
        assert_eq!(group.history.gaps(Some(2000), Some(2006)), vec![2005]);
    }
}
