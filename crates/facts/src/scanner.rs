use ignore::WalkBuilder;
use std::path::{Path, PathBuf};

/// Scanner for finding per-module fact files in a dump directory
pub struct DumpScanner {
    root: PathBuf,
}

/// Files to parse plus the ones rejected before parsing.
#[derive(Debug, Default)]
pub struct ScanOutcome {
    pub files: Vec<PathBuf>,
    pub skipped: Vec<(PathBuf, String)>,
}

impl DumpScanner {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// Walk the dump and collect fact files in path order
    pub fn scan(&self) -> ScanOutcome {
        let mut outcome = ScanOutcome::default();

        let mut builder = WalkBuilder::new(&self.root);
        builder
            .hidden(true) // editor swap files, .DS_Store and friends
            .git_ignore(false)
            .git_global(false)
            .git_exclude(false)
            .ignore(false)
            .parents(false)
            .follow_links(false);

        for result in builder.build() {
            match result {
                Ok(entry) => {
                    let Some(file_type) = entry.file_type() else {
                        continue;
                    };
                    if !file_type.is_file() {
                        continue;
                    }

                    let path = entry.path();
                    if !Self::is_fact_file(path) {
                        continue;
                    }

                    if let Ok(meta) = entry.metadata() {
                        if meta.len() > MAX_FACT_FILE_BYTES {
                            log::warn!(
                                "Skipping oversized fact file {} ({} bytes > {})",
                                path.display(),
                                meta.len(),
                                MAX_FACT_FILE_BYTES
                            );
                            outcome.skipped.push((
                                path.to_path_buf(),
                                format!("file exceeds {MAX_FACT_FILE_BYTES} bytes"),
                            ));
                            continue;
                        }
                    }

                    outcome.files.push(path.to_path_buf());
                }
                Err(e) => log::warn!("Failed to read dump entry: {e}"),
            }
        }

        outcome.files.sort();
        log::info!(
            "Found {} fact files under {}",
            outcome.files.len(),
            self.root.display()
        );
        outcome
    }

    fn is_fact_file(path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| FACT_EXTENSIONS.iter().any(|c| ext.eq_ignore_ascii_case(c)))
    }
}

const FACT_EXTENSIONS: &[&str] = &["json"];
const MAX_FACT_FILE_BYTES: u64 = 64 * 1_048_576; // 64 MB

#[cfg(test)]
mod tests {
    use super::DumpScanner;
    use pretty_assertions::assert_eq;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn finds_nested_json_in_order() {
        let temp = tempdir().unwrap();
        let nested = temp.path().join("Data").join("Queue");
        fs::create_dir_all(&nested).unwrap();
        fs::write(nested.join("Internal.json"), b"{}").unwrap();
        fs::write(temp.path().join("Main.json"), b"{}").unwrap();
        fs::write(temp.path().join("README.md"), b"notes").unwrap();

        let outcome = DumpScanner::new(temp.path()).scan();

        assert_eq!(outcome.files.len(), 2);
        assert!(outcome.files[0].ends_with("Data/Queue/Internal.json"));
        assert!(outcome.files[1].ends_with("Main.json"));
    }

    #[test]
    fn skips_hidden_entries() {
        let temp = tempdir().unwrap();
        let hidden = temp.path().join(".cache");
        fs::create_dir_all(&hidden).unwrap();
        fs::write(hidden.join("stale.json"), b"{}").unwrap();
        fs::write(temp.path().join(".partial.json"), b"{}").unwrap();
        fs::write(temp.path().join("A.JSON"), b"{}").unwrap();

        let outcome = DumpScanner::new(temp.path()).scan();

        assert_eq!(outcome.files.len(), 1);
        assert!(outcome.files[0].ends_with("A.JSON"));
    }
}
