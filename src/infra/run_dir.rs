// ============================================================
// Layer 6 — Run Folders
// ============================================================
// Every training run gets its own folder under the output root:
//
//   <root>/stellar_cnn_1019_run001
//   <root>/stellar_cnn_1019_run002
//   <root>/stellar_cnn_1020_run001
//
// The date part is MMDD; the run number restarts each day and
// is one more than the highest number already on disk.

use std::{fs, path::{Path, PathBuf}};

use anyhow::{Context, Result};
use chrono::NaiveDate;

pub const RUN_PREFIX: &str = "stellar_cnn";

fn day_stem(prefix: &str, date: NaiveDate) -> String {
    format!("{prefix}_{}_run", date.format("%m%d"))
}

/// Highest run number already used under `root` for this day, 0 if none
fn last_run_number(root: &Path, stem: &str) -> Result<u32> {
    if !root.exists() {
        return Ok(0);
    }
    let mut last = 0;
    for entry in fs::read_dir(root)
        .with_context(|| format!("Cannot read directory '{}'", root.display()))?
    {
        let entry = entry?;
        let name  = entry.file_name();
        let Some(number) = name
            .to_str()
            .and_then(|n| n.strip_prefix(stem))
            .and_then(|n| n.parse::<u32>().ok())
        else {
            continue;
        };
        last = last.max(number);
    }
    Ok(last)
}

/// Create and return the next run folder for `date`
pub fn create_run_dir(root: &Path, prefix: &str, date: NaiveDate) -> Result<PathBuf> {
    let stem = day_stem(prefix, date);
    let next = last_run_number(root, &stem)? + 1;
    let dir  = root.join(format!("{stem}{next:03}"));
    fs::create_dir_all(&dir)
        .with_context(|| format!("Cannot create run folder '{}'", dir.display()))?;
    tracing::info!("Run folder: '{}'", dir.display());
    Ok(dir)
}

/// Today's date in local time
pub fn today() -> NaiveDate {
    chrono::Local::now().date_naive()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 7).unwrap()
    }

    #[test]
    fn test_first_run_is_001() {
        let root = tempfile::tempdir().unwrap();
        let dir  = create_run_dir(root.path(), RUN_PREFIX, date()).unwrap();
        assert_eq!(dir.file_name().unwrap(), "stellar_cnn_0307_run001");
        assert!(dir.is_dir());
    }

    #[test]
    fn test_numbers_increase_past_gaps() {
        let root = tempfile::tempdir().unwrap();
        fs::create_dir(root.path().join("stellar_cnn_0307_run004")).unwrap();
        fs::create_dir(root.path().join("stellar_cnn_0306_run009")).unwrap();
        fs::create_dir(root.path().join("unrelated")).unwrap();

        let dir = create_run_dir(root.path(), RUN_PREFIX, date()).unwrap();
        assert_eq!(dir.file_name().unwrap(), "stellar_cnn_0307_run005");
    }

    #[test]
    fn test_missing_root_is_created() {
        let root = tempfile::tempdir().unwrap();
        let dir  = create_run_dir(&root.path().join("nested"), RUN_PREFIX, date()).unwrap();
        assert!(dir.is_dir());
    }
}
