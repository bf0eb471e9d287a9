//! Configuration discovery, filtering and listing.

use crate::error::MlError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Placeholder for a field a listed file does not declare.
pub const UNKNOWN: &str = "Unknown";
/// Placeholder for every field of a file that cannot be read as JSON.
pub const UNREADABLE: &str = "Error";

/// `*.json` files directly inside `dir`, excluding `index_file`, sorted.
pub fn discover(dir: &Path, index_file: &str) -> Result<Vec<PathBuf>, MlError> {
    if !dir.is_dir() {
        return Err(MlError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("configuration directory {} does not exist", dir.display()),
        )));
    }

    let mut configs = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1) {
        let entry = entry.map_err(|e| MlError::Io(std::io::Error::other(e.to_string())))?;
        let path = entry.path();
        if !entry.file_type().is_file() {
            continue;
        }
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        if entry.file_name() == index_file {
            continue;
        }
        configs.push(path.to_path_buf());
    }
    configs.sort();
    Ok(configs)
}

/// What a listing shows about one configuration file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigSummary {
    pub path: PathBuf,
    pub model_type: String,
    pub run_name: String,
    pub experiment_name: String,
}

impl ConfigSummary {
    /// Read the listing fields without validating the file.
    pub fn read(path: &Path) -> Self {
        let parsed = std::fs::read_to_string(path)
            .ok()
            .and_then(|text| serde_json::from_str::<serde_json::Value>(&text).ok());
        match parsed {
            Some(value) => {
                let field = |key: &str| {
                    value
                        .get(key)
                        .and_then(|v| v.as_str())
                        .unwrap_or(UNKNOWN)
                        .to_string()
                };
                Self {
                    path: path.to_path_buf(),
                    model_type: field("model_type"),
                    run_name: field("run_name"),
                    experiment_name: field("experiment_name"),
                }
            }
            None => Self {
                path: path.to_path_buf(),
                model_type: UNREADABLE.to_string(),
                run_name: UNREADABLE.to_string(),
                experiment_name: UNREADABLE.to_string(),
            },
        }
    }
}

/// Filter for a partial batch. Both criteria must match when both are set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchFilter {
    /// Case-insensitive substring of the file path.
    pub pattern: Option<String>,
    /// Case-insensitive substring of the declared `model_type`.
    pub model_type: Option<String>,
}

impl BatchFilter {
    pub fn matches(&self, summary: &ConfigSummary) -> bool {
        let contains = |haystack: &str, needle: &str| {
            haystack.to_lowercase().contains(&needle.to_lowercase())
        };
        let path_ok = self
            .pattern
            .as_deref()
            .is_none_or(|p| contains(&summary.path.to_string_lossy(), p));
        let model_ok = self
            .model_type
            .as_deref()
            .is_none_or(|m| contains(&summary.model_type, m));
        path_ok && model_ok
    }
}

/// Summaries matching `filter`, in their original order.
pub fn select<'a>(summaries: &'a [ConfigSummary], filter: &BatchFilter) -> Vec<&'a ConfigSummary> {
    summaries.iter().filter(|s| filter.matches(s)).collect()
}

/// Group by declared model type, groups in first-seen order.
pub fn group_by_model(summaries: &[ConfigSummary]) -> Vec<(&str, Vec<&ConfigSummary>)> {
    let mut groups: Vec<(&str, Vec<&ConfigSummary>)> = Vec::new();
    for summary in summaries {
        match groups
            .iter_mut()
            .find(|(model, _)| *model == summary.model_type)
        {
            Some((_, members)) => members.push(summary),
            None => groups.push((summary.model_type.as_str(), vec![summary])),
        }
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn summary(path: &str, model: &str) -> ConfigSummary {
        ConfigSummary {
            path: PathBuf::from(path),
            model_type: model.into(),
            run_name: "r".into(),
            experiment_name: "e".into(),
        }
    }

    #[test]
    fn test_discover_sorts_and_skips_index() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.json", "a.json", "index.json", "notes.txt"] {
            std::fs::write(dir.path().join(name), "{}").unwrap();
        }
        std::fs::create_dir(dir.path().join("nested")).unwrap();
        std::fs::write(dir.path().join("nested/c.json"), "{}").unwrap();

        let found = discover(dir.path(), "index.json").unwrap();
        let names: Vec<_> = found
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.json", "b.json"]);
    }

    #[test]
    fn test_discover_missing_dir() {
        assert!(matches!(
            discover(Path::new("/nonexistent/goalcast/configs"), "index.json"),
            Err(MlError::Io(_))
        ));
    }

    #[test]
    fn test_summary_is_lenient() {
        let dir = tempfile::tempdir().unwrap();
        let partial = dir.path().join("partial.json");
        std::fs::write(&partial, r#"{"model_type": "LinearRegression"}"#).unwrap();
        let broken = dir.path().join("broken.json");
        std::fs::write(&broken, "{ nope").unwrap();

        let s = ConfigSummary::read(&partial);
        assert_eq!(s.model_type, "LinearRegression");
        assert_eq!(s.run_name, UNKNOWN);

        let s = ConfigSummary::read(&broken);
        assert_eq!(s.model_type, UNREADABLE);
        assert_eq!(s.experiment_name, UNREADABLE);
    }

    #[test]
    fn test_filter_by_model_type() {
        let all = vec![
            summary("configs/RF_config_01.json", "RandomForestRegressor"),
            summary("configs/LR_config_01.json", "LinearRegression"),
            summary("configs/RF_config_02.json", "RandomForestRegressor"),
        ];
        let filter = BatchFilter {
            model_type: Some("randomforest".into()),
            ..Default::default()
        };
        let picked = select(&all, &filter);
        assert_eq!(picked.len(), 2);
        assert!(picked.iter().all(|s| s.model_type == "RandomForestRegressor"));
    }

    #[test]
    fn test_filter_by_pattern_and_model() {
        let all = vec![
            summary("configs/RF_config_01.json", "RandomForestRegressor"),
            summary("configs/RF_config_02.json", "RandomForestRegressor"),
            summary("configs/LR_config_02.json", "LinearRegression"),
        ];
        let filter = BatchFilter {
            pattern: Some("CONFIG_02".into()),
            model_type: Some("Linear".into()),
        };
        let picked = select(&all, &filter);
        assert_eq!(picked.len(), 1);
        assert_eq!(picked[0].path, PathBuf::from("configs/LR_config_02.json"));
    }

    #[test]
    fn test_empty_filter_result() {
        let all = vec![summary("configs/a.json", "LinearRegression")];
        let filter = BatchFilter {
            model_type: Some("Poisson".into()),
            ..Default::default()
        };
        assert!(select(&all, &filter).is_empty());
    }

    #[test]
    fn test_group_by_model_first_seen_order() {
        let all = vec![
            summary("a", "LinearRegression"),
            summary("b", "RandomForestRegressor"),
            summary("c", "LinearRegression"),
        ];
        let groups = group_by_model(&all);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].0, "LinearRegression");
        assert_eq!(groups[0].1.len(), 2);
        assert_eq!(groups[1].0, "RandomForestRegressor");
    }
}
