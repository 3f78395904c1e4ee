//! Loading source definitions from YAML directories.
//!
//! Each directory is scanned (non-recursively) for `.yml` / `.yaml` files,
//! one [`SourceDefinition`] per file. Files are read in name order so the
//! resulting list is stable across runs.
//!
//! # Selection
//!
//! - with `only` set, exactly the named definitions are kept, enabled or not
//! - otherwise only definitions with `enabled: true` are kept
//!
//! Every definition is validated and names must be unique across all
//! directories, selected or not.

use crate::error::FeedError;
use crate::scraper::SourceDefinition;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument, warn};

/// Which definitions to keep.
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    /// Names to load regardless of `enabled`; empty keeps enabled ones.
    pub only: Vec<String>,
}

fn is_yaml(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yml") | Some("yaml")
    )
}

/// Parse and validate one definition.
pub fn parse_definition(path: &Path, text: &str) -> Result<SourceDefinition, FeedError> {
    let definition: SourceDefinition =
        serde_yaml::from_str(text).map_err(|source| FeedError::Yaml {
            path: path.display().to_string(),
            source,
        })?;
    definition.validate()?;
    Ok(definition)
}

async fn yaml_files(dir: &Path) -> Result<Vec<PathBuf>, FeedError> {
    let mut files = Vec::new();
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if !entry.file_type().await?.is_file() {
            continue;
        }
        if is_yaml(&path) {
            files.push(path);
        } else {
            warn!(path = %path.display(), "Skipping non-YAML file");
        }
    }
    files.sort();
    Ok(files)
}

/// Load the selected definitions from every directory in `dirs`.
#[instrument(level = "info", skip_all, fields(dirs = dirs.len()))]
pub async fn load(
    dirs: &[PathBuf],
    options: &LoadOptions,
) -> Result<Vec<SourceDefinition>, FeedError> {
    let mut seen = HashSet::new();
    let mut selected = Vec::new();

    for dir in dirs {
        for path in yaml_files(dir).await? {
            let text = tokio::fs::read_to_string(&path).await?;
            let definition = parse_definition(&path, &text)?;
            if !seen.insert(definition.name.clone()) {
                return Err(FeedError::DuplicateSource(definition.name));
            }

            let keep = if options.only.is_empty() {
                definition.enabled
            } else {
                options.only.contains(&definition.name)
            };
            if keep {
                debug!(source = %definition.name, path = %path.display(), "Loaded source");
                selected.push(definition);
            } else if options.only.is_empty() {
                warn!(source = %definition.name, "Source is disabled");
            } else {
                warn!(source = %definition.name, "Source is not in the list to be loaded");
            }
        }
    }

    for name in &options.only {
        if !seen.contains(name) {
            warn!(source = %name, "Requested source was not found");
        }
    }

    info!(count = selected.len(), "Source definitions loaded");
    Ok(selected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scraper::ParserKind;
    use std::fs;

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("gamer_feed_{name}_{}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn definition(name: &str, enabled: bool) -> String {
        format!(
            "name: {name}\nenabled: {enabled}\nbase_url: https://{name}.test\npaths: [/news]\nattributes:\n  entry_selector: article\n"
        )
    }

    #[tokio::test]
    async fn test_keeps_enabled_definitions_in_name_order() {
        let dir = temp_dir("enabled");
        fs::write(dir.join("b.yml"), definition("beta", true)).unwrap();
        fs::write(dir.join("a.yaml"), definition("alpha", true)).unwrap();
        fs::write(dir.join("c.yml"), definition("gamma", false)).unwrap();
        fs::write(dir.join("README.md"), "not a source").unwrap();

        let loaded = load(&[dir.clone()], &LoadOptions::default()).await.unwrap();
        let names: Vec<_> = loaded.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["alpha", "beta"]);
        assert_eq!(loaded[0].parser, ParserKind::Html);

        let _ = fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn test_only_overrides_enabled() {
        let dir = temp_dir("only");
        fs::write(dir.join("a.yml"), definition("alpha", true)).unwrap();
        fs::write(dir.join("b.yml"), definition("beta", false)).unwrap();

        let options = LoadOptions { only: vec!["beta".into(), "missing".into()] };
        let loaded = load(&[dir.clone()], &options).await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].name, "beta");

        let _ = fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn test_duplicate_names_across_dirs_are_rejected() {
        let first = temp_dir("dup_a");
        let second = temp_dir("dup_b");
        fs::write(first.join("a.yml"), definition("alpha", true)).unwrap();
        fs::write(second.join("a.yml"), definition("alpha", false)).unwrap();

        let result = load(&[first.clone(), second.clone()], &LoadOptions::default()).await;
        assert!(matches!(result, Err(FeedError::DuplicateSource(name)) if name == "alpha"));

        let _ = fs::remove_dir_all(&first);
        let _ = fs::remove_dir_all(&second);
    }

    #[tokio::test]
    async fn test_missing_directory_is_io_error() {
        let missing = std::env::temp_dir().join("gamer_feed_definitely_missing_dir");
        let result = load(&[missing], &LoadOptions::default()).await;
        assert!(matches!(result, Err(FeedError::Io(_))));
    }

    #[test]
    fn test_parse_definition_errors_name_the_file() {
        let err = parse_definition(Path::new("broken.yml"), "name: [unclosed").unwrap_err();
        assert!(err.to_string().contains("broken.yml"));

        let err = parse_definition(Path::new("empty.yml"), "name: empty\npaths: []\n").unwrap_err();
        assert!(matches!(err, FeedError::SourceDefinition { .. }));
    }

    #[test]
    fn test_bundled_definitions_parse() {
        for (file, text) in [
            ("voxel.yml", include_str!("../sources/voxel.yml")),
            ("theenemy.yml", include_str!("../sources/theenemy.yml")),
            ("tecnoblog.yml", include_str!("../sources/tecnoblog.yml")),
        ] {
            let definition = parse_definition(Path::new(file), text).unwrap();
            assert!(!definition.page_urls().unwrap().is_empty(), "{file}");
        }
    }
}
