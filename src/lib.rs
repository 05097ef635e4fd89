//! Client library for the Dora climate-model catalog server.
//!
//! Queries experiment metadata and file catalogs, fetches and parses
//! global-mean diagnostics, and plans post-processing repairs from the
//! on-disk time-series inventory.

pub mod api;
pub mod catalog;
pub mod db;
pub mod frepp;
pub mod gaps;
pub mod metadata;
pub mod series;
pub mod time;
pub mod units;

pub use api::{set_proxy, unset_proxy, DoraClient, DEFAULT_API};
pub use catalog::{AssetKind, Catalog, CatalogRow, FindOptions};
pub use frepp::{repair_all_components, History, TsFile, TsGroup};
pub use gaps::{find_gaps, is_consecutive};
pub use metadata::ExperimentMetadata;
pub use series::GlobalMeanTable;
pub use time::{is_overlapping, TimeRange};
