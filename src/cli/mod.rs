//! Command line interface.

pub mod command;

use std::{path::PathBuf, time::Duration};

use clap::{command, Parser, Subcommand};
use indicatif::ProgressBar;

#[derive(Parser)]
#[command(version, about, long_about = None)]
/// Contains the commands
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Retry failed requests once with TLS verification disabled
    #[arg(long, global = true)]
    pub insecure: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show metadata for an experiment
    Meta {
        /// Experiment id (integer or project-scoped string)
        id: String,
    },
    /// Search registered experiments
    Search {
        /// Search string
        query: String,
        /// Attribute to return (pathPP, pathDB, pathAnalysis, expName)
        #[arg(long, default_value = "pathPP")]
        attribute: String,
    },
    /// List the projects known to the server
    Projects,
    /// Fetch and filter an experiment's file catalog
    Catalog {
        /// Experiment id
        id: String,
        /// Keep only this variable
        #[arg(long)]
        variable: Option<String>,
        /// Keep only this output frequency
        #[arg(long)]
        frequency: Option<String>,
        /// Asset kind: av, ts or both
        #[arg(long, default_value = "both")]
        kind: String,
        /// Keep only assets overlapping this range, e.g. 19800101-19891231
        #[arg(long)]
        trange: Option<String>,
        /// Save the filtered listing to this parquet file
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Fetch global-mean time series for a component
    GlobalMean {
        /// Experiment id
        id: String,
        /// Component name (e.g. atmos, land, c4mip)
        component: String,
        /// First year to keep
        #[arg(long)]
        start: Option<f64>,
        /// Last year to keep
        #[arg(long)]
        end: Option<f64>,
        /// Constant offset added to the year axis
        #[arg(long)]
        yearshift: Option<f64>,
        /// Apply conventional display-unit conversions
        #[arg(long)]
        convert: bool,
        /// Save the table to this parquet file
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Read global means from a local experiment SQLite database
    Db {
        /// Path to the database file
        db_file: PathBuf,
        /// Variables to read (default: all tables)
        #[arg(long)]
        variable: Vec<String>,
        /// Read the legacy land `sum` column
        #[arg(long)]
        legacy_land: bool,
        /// Constant offset added to the year axis
        #[arg(long)]
        yearshift: Option<f64>,
        /// Save the table to this parquet file
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Report missing time-series chunks for a component
    Missing {
        /// Experiment id
        id: String,
        /// Component name
        component: String,
        /// Override the experiment's start year
        #[arg(long)]
        start: Option<i64>,
        /// Override the experiment's end year
        #[arg(long)]
        end: Option<i64>,
    },
    /// Print the commands that would regenerate missing chunks
    Repair {
        /// Experiment id
        id: String,
        /// Components to repair (default: every component)
        #[arg(long)]
        component: Vec<String>,
    },
}

/// Creates a spinner.
pub fn create_spinner(message: String) -> ProgressBar {
    let bar = ProgressBar::new_spinner().with_message(message);
    bar.enable_steady_tick(Duration::from_millis(100));

    bar
}
