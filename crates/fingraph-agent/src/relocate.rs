//! Relocation of files the agent generated outside the output root.
//!
//! The agent's tools drop images and tables into their own working
//! directories. After a run, anything fresh enough is mirrored into the
//! mounted output root and the result text is rewritten to the new paths.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;
use walkdir::WalkDir;

use crate::config::AgentConfig;

/// Allowed clock skew between tool writes and the recorded run start.
const MTIME_SKEW: Duration = Duration::from_secs(5);

const IMAGE_EXTS: &[&str] = &["png", "jpg", "jpeg"];
const TABLE_EXTS: &[&str] = &["xlsx", "csv", "tsv"];

/// One relocated file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MovedFile {
    #[serde(rename = "from")]
    pub from_path: String,
    #[serde(rename = "to")]
    pub to_path: String,
}

/// Mirror fresh output files into the output root and rewrite any mention of
/// their old paths inside the result's text fields.
pub fn relocate_outputs(
    config: &AgentConfig,
    result: &mut Value,
    run_started_at: SystemTime,
) -> Vec<MovedFile> {
    let cutoff = run_started_at
        .checked_sub(MTIME_SKEW)
        .unwrap_or(SystemTime::UNIX_EPOCH);

    let mut moved = Vec::new();
    let mut moved_map = HashMap::new();

    for scan_dir in &config.scan_dirs {
        if !scan_dir.exists() {
            continue;
        }

        for entry in WalkDir::new(scan_dir).into_iter().filter_map(Result::ok) {
            let path = entry.path();
            if !entry.file_type().is_file() {
                continue;
            }

            let Some(ext) = extension_of(path) else {
                continue;
            };
            let is_image = IMAGE_EXTS.contains(&ext.as_str());
            if !is_image && !TABLE_EXTS.contains(&ext.as_str()) {
                continue;
            }

            let Ok(metadata) = entry.metadata() else {
                continue;
            };
            match metadata.modified() {
                Ok(mtime) if mtime >= cutoff => {}
                _ => continue,
            }

            // Files already under the output root stay where they are.
            if path.starts_with(&config.output_root) {
                continue;
            }

            let dest_dir = if is_image {
                &config.citations_dir
            } else {
                &config.exports_dir
            };

            if let Some(dest) = copy_to_output(path, dest_dir) {
                let from = path.to_string_lossy().into_owned();
                let to = dest.to_string_lossy().into_owned();
                moved_map.insert(from.clone(), to.clone());
                moved.push(MovedFile {
                    from_path: from,
                    to_path: to,
                });
            }
        }
    }

    if !moved_map.is_empty() {
        rewrite_result_paths(result, &moved_map);
    }

    moved
}

fn extension_of(path: &Path) -> Option<String> {
    path.extension().map(|e| e.to_string_lossy().to_lowercase())
}

/// Copy a file into the destination directory.
///
/// A same-sized existing file is reused; a different-sized collision gets a
/// numeric suffix.
fn copy_to_output(src: &Path, dest_dir: &Path) -> Option<PathBuf> {
    if let Err(e) = std::fs::create_dir_all(dest_dir) {
        warn!("Failed to create output directory {}: {}", dest_dir.display(), e);
        return None;
    }

    let name = src.file_name()?;
    let mut dest = dest_dir.join(name);

    if dest.exists() {
        let same_size = match (src.metadata(), dest.metadata()) {
            (Ok(a), Ok(b)) => a.len() == b.len(),
            _ => false,
        };
        if same_size {
            return Some(dest);
        }

        let stem = src.file_stem().unwrap_or_default().to_string_lossy();
        let ext = src
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy()))
            .unwrap_or_default();
        let mut counter = 1;
        loop {
            let candidate = dest_dir.join(format!("{stem}_{counter}{ext}"));
            if !candidate.exists() {
                dest = candidate;
                break;
            }
            counter += 1;
        }
    }

    match std::fs::copy(src, &dest) {
        Ok(_) => Some(dest),
        Err(e) => {
            warn!(
                "Failed to copy output file {} to {}: {}",
                src.display(),
                dest.display(),
                e
            );
            None
        }
    }
}

fn rewrite_result_paths(result: &mut Value, moved_map: &HashMap<String, String>) {
    let Some(obj) = result.as_object_mut() else {
        return;
    };
    for key in ["response", "text", "content", "message"] {
        if let Some(Value::String(text)) = obj.get_mut(key) {
            for (from, to) in moved_map {
                if text.contains(from) {
                    *text = text.replace(from, to);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::path::PathBuf;

    fn test_config(scan: &Path, out: &Path) -> AgentConfig {
        AgentConfig {
            program: "opencode".into(),
            agent: None,
            config_dir: PathBuf::from("/nonexistent"),
            output_root: out.to_path_buf(),
            exports_dir: out.join("exports"),
            citations_dir: out.join("citations"),
            trace_dir: out.join("opencode"),
            scan_dirs: vec![scan.to_path_buf()],
            redis_url: "redis://localhost:6379".into(),
            live_mcp_events: true,
        }
    }

    #[test]
    fn test_images_and_tables_are_sorted_into_dirs() {
        let scan = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        std::fs::write(scan.path().join("chart.png"), b"png").unwrap();
        std::fs::write(scan.path().join("metrics.csv"), b"a,b").unwrap();
        std::fs::write(scan.path().join("notes.txt"), b"skip me").unwrap();

        let config = test_config(scan.path(), out.path());
        let started = SystemTime::now() - Duration::from_secs(60);
        let mut result = json!({});
        let moved = relocate_outputs(&config, &mut result, started);

        assert_eq!(moved.len(), 2);
        assert!(out.path().join("citations/chart.png").exists());
        assert!(out.path().join("exports/metrics.csv").exists());
    }

    #[test]
    fn test_stale_files_are_skipped() {
        let scan = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        std::fs::write(scan.path().join("old.png"), b"png").unwrap();

        let config = test_config(scan.path(), out.path());
        // Run "started" an hour from now: nothing can be fresh enough.
        let started = SystemTime::now() + Duration::from_secs(3600);
        let mut result = json!({});
        let moved = relocate_outputs(&config, &mut result, started);
        assert!(moved.is_empty());
    }

    #[test]
    fn test_collision_gets_numeric_suffix() {
        let scan = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let citations = out.path().join("citations");
        std::fs::create_dir_all(&citations).unwrap();
        std::fs::write(citations.join("chart.png"), b"different length").unwrap();
        std::fs::write(scan.path().join("chart.png"), b"png").unwrap();

        let config = test_config(scan.path(), out.path());
        let started = SystemTime::now() - Duration::from_secs(60);
        let mut result = json!({});
        let moved = relocate_outputs(&config, &mut result, started);

        assert_eq!(moved.len(), 1);
        assert!(moved[0].to_path.ends_with("chart_1.png"));
        assert!(citations.join("chart_1.png").exists());
    }

    #[test]
    fn test_same_size_collision_reuses_existing() {
        let scan = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let exports = out.path().join("exports");
        std::fs::create_dir_all(&exports).unwrap();
        std::fs::write(exports.join("data.csv"), b"a,b").unwrap();
        std::fs::write(scan.path().join("data.csv"), b"a,b").unwrap();

        let config = test_config(scan.path(), out.path());
        let started = SystemTime::now() - Duration::from_secs(60);
        let mut result = json!({});
        let moved = relocate_outputs(&config, &mut result, started);

        assert_eq!(moved.len(), 1);
        assert!(moved[0].to_path.ends_with("data.csv"));
        assert!(!exports.join("data_1.csv").exists());
    }

    #[test]
    fn test_result_paths_are_rewritten() {
        let scan = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let src = scan.path().join("chart.png");
        std::fs::write(&src, b"png").unwrap();

        let config = test_config(scan.path(), out.path());
        let started = SystemTime::now() - Duration::from_secs(60);
        let mut result = json!({
            "response": format!("See the chart at {}", src.display())
        });
        relocate_outputs(&config, &mut result, started);

        let response = result["response"].as_str().unwrap();
        assert!(!response.contains(&src.display().to_string()));
        assert!(response.contains("citations"));
    }
}
