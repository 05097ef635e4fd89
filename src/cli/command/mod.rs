pub mod catalog;
pub mod global_mean;
pub mod meta;
pub mod repair;
pub mod search;

use std::path::PathBuf;

use chrono::{Datelike, Local};
pub use catalog::catalog;
pub use global_mean::{db, global_mean};
pub use meta::meta;
pub use repair::{missing, repair};
pub use search::{projects, search};

pub fn make_parquet_file_name(what: &str) -> PathBuf {
    let today = Local::now();
    let file_name = format!(
        "dora-{}-{}-{:02}-{:02}.parquet",
        what,
        today.year(),
        today.month(),
        today.day()
    );

    dirs::home_dir().unwrap_or_default().join(file_name)
}
