//! Consolidation of markdown artifacts into a single ordered document
//!
//! Artifacts are merged in natural order, so `2_body.md` precedes
//! `10_appendix.md`. The consolidated document is rebuilt from scratch on every
//! call and written atomically (temp file + rename); an unchanged artifact set
//! yields byte-identical output.

use crate::error::ConsolidationError;
use crate::types::ConsolidationReport;
use std::cmp::Ordering;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Extension shared by all artifacts
pub const ARTIFACT_EXTENSION: &str = "md";

/// Title line of the consolidated document
const TITLE: &str = "# Consolidated Files";

/// One maximal run of a file name
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
enum Segment {
    /// Digit run: significant length first, then the digits without leading zeros
    Number(usize, String),
    /// Non-digit run, lowercased
    Text(String),
}

/// Sort key splitting a name into digit and non-digit runs
///
/// Digit runs compare numerically, text runs case-insensitively, and a key that
/// is a prefix of another sorts first. A digit run sorts before a text run at
/// the same position.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct NaturalKey(Vec<Segment>);

impl NaturalKey {
    /// Build the key for `name`
    pub fn new(name: &str) -> Self {
        let mut segments = Vec::new();
        let mut current = String::new();
        let mut in_digits = false;

        for c in name.chars() {
            let is_digit = c.is_ascii_digit();
            if !current.is_empty() && is_digit != in_digits {
                segments.push(Self::segment(&current, in_digits));
                current.clear();
            }
            in_digits = is_digit;
            current.push(c);
        }
        if !current.is_empty() {
            segments.push(Self::segment(&current, in_digits));
        }

        Self(segments)
    }

    fn segment(run: &str, digits: bool) -> Segment {
        if digits {
            let significant = run.trim_start_matches('0');
            Segment::Number(significant.len(), significant.to_string())
        } else {
            Segment::Text(run.to_lowercase())
        }
    }
}

/// Natural-order comparison with the raw name as a final tie-breaker
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    NaturalKey::new(a)
        .cmp(&NaturalKey::new(b))
        .then_with(|| a.cmp(b))
}

/// Sort names in natural order
pub fn sort_natural(names: &mut [String]) {
    names.sort_by(|a, b| natural_cmp(a, b));
}

/// Merge every artifact under `directory` into `output_path`
///
/// Unreadable artifacts are logged and skipped. The output file itself is never
/// treated as an artifact, even when it lives in `directory`.
pub async fn consolidate(
    directory: &Path,
    output_path: &Path,
) -> Result<ConsolidationReport, ConsolidationError> {
    use tokio::fs;

    let is_dir = fs::metadata(directory)
        .await
        .map(|m| m.is_dir())
        .unwrap_or(false);
    if !is_dir {
        warn!(?directory, "artifact directory does not exist");
        return Err(ConsolidationError::NoSuchDirectory {
            path: directory.to_path_buf(),
        });
    }

    let artifacts = list_artifacts(directory, output_path).await?;
    if artifacts.is_empty() {
        warn!(?directory, "no artifacts to consolidate");
        return Err(ConsolidationError::NoArtifacts {
            path: directory.to_path_buf(),
        });
    }

    info!(count = artifacts.len(), ?directory, "consolidating artifacts in natural order");

    let mut document = String::new();
    document.push_str(TITLE);
    document.push_str("\n\n");
    document.push_str(&format!(
        "*Consolidation of {} markdown files*\n\n",
        artifacts.len()
    ));

    let mut included = Vec::with_capacity(artifacts.len());
    let mut skipped = Vec::new();
    for (i, name) in artifacts.iter().enumerate() {
        let content = match fs::read_to_string(directory.join(name)).await {
            Ok(content) => content,
            Err(e) => {
                warn!(file = %name, error = %e, "failed to read artifact, skipping");
                skipped.push(name.clone());
                continue;
            }
        };

        debug!(index = i + 1, total = artifacts.len(), file = %name, "appending artifact");
        document.push_str(&format!("\n---\n\n## {name}\n\n"));
        document.push_str(&content);
        if !content.ends_with('\n') {
            document.push('\n');
        }
        document.push_str(&format!("\n\n*--- End of {name} ---*\n"));
        included.push(name.clone());
    }

    write_atomically(output_path, document.as_bytes()).await?;

    info!(?output_path, included = included.len(), skipped = skipped.len(), "consolidation complete");
    Ok(ConsolidationReport {
        output_path: output_path.to_path_buf(),
        included,
        skipped,
    })
}

/// Artifact names directly under `directory`, naturally sorted
async fn list_artifacts(
    directory: &Path,
    output_path: &Path,
) -> Result<Vec<String>, ConsolidationError> {
    use tokio::fs;

    let output_canonical = fs::canonicalize(output_path).await.ok();
    let suffix = format!(".{ARTIFACT_EXTENSION}");

    let mut entries = fs::read_dir(directory).await.map_err(|e| {
        warn!(?directory, error = %e, "failed to list artifact directory");
        ConsolidationError::NoSuchDirectory {
            path: directory.to_path_buf(),
        }
    })?;

    let mut names = Vec::new();
    loop {
        let entry = match entries.next_entry().await {
            Ok(Some(entry)) => entry,
            Ok(None) => break,
            Err(e) => {
                warn!(?directory, error = %e, "failed to read directory entry");
                return Err(ConsolidationError::ScanFailure {
                    path: directory.to_path_buf(),
                    reason: e.to_string(),
                });
            }
        };

        let Some(name) = entry.file_name().to_str().map(str::to_string) else {
            continue;
        };
        if !name.ends_with(&suffix) {
            continue;
        }
        let is_file = entry
            .file_type()
            .await
            .map(|ft| ft.is_file())
            .unwrap_or(false);
        if !is_file {
            continue;
        }
        if let Some(output) = &output_canonical
            && fs::canonicalize(entry.path()).await.ok().as_ref() == Some(output)
        {
            continue;
        }
        names.push(name);
    }

    sort_natural(&mut names);
    Ok(names)
}

/// Write `contents` to a sibling temp file, then rename it over `path`
async fn write_atomically(path: &Path, contents: &[u8]) -> Result<(), ConsolidationError> {
    use tokio::fs;

    let write_failure = |reason: String| ConsolidationError::WriteFailure {
        path: path.to_path_buf(),
        reason,
    };

    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| write_failure("output path has no file name".to_string()))?;
    let parent = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));

    fs::create_dir_all(&parent)
        .await
        .map_err(|e| write_failure(e.to_string()))?;

    let temp_path = parent.join(format!(".{file_name}.tmp"));
    let result = async {
        fs::write(&temp_path, contents).await?;
        fs::rename(&temp_path, path).await
    }
    .await;

    if let Err(e) = result {
        if let Err(remove_err) = fs::remove_file(&temp_path).await
            && remove_err.kind() != std::io::ErrorKind::NotFound
        {
            warn!(path = ?temp_path, error = %remove_err, "failed to remove temp file");
        }
        warn!(?path, error = %e, "failed to write consolidated document");
        return Err(write_failure(e.to_string()));
    }
    Ok(())
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sorted(names: &[&str]) -> Vec<String> {
        let mut names: Vec<String> = names.iter().map(|n| n.to_string()).collect();
        sort_natural(&mut names);
        names
    }

    #[test]
    fn numbers_compare_numerically() {
        assert_eq!(
            sorted(&["file_b.md", "10_x.md", "2_x.md"]),
            vec!["2_x.md", "10_x.md", "file_b.md"]
        );
    }

    #[test]
    fn text_compares_case_insensitively() {
        assert_eq!(
            sorted(&["b.md", "A.md", "c.md"]),
            vec!["A.md", "b.md", "c.md"]
        );
        assert_eq!(
            sorted(&["Chapter10.md", "chapter9.md", "CHAPTER1.md"]),
            vec!["CHAPTER1.md", "chapter9.md", "Chapter10.md"]
        );
    }

    #[test]
    fn prefix_sorts_first() {
        assert_eq!(sorted(&["ab1.md", "ab.md"]), vec!["ab.md", "ab1.md"]);
        assert!(NaturalKey::new("part") < NaturalKey::new("part2"));
    }

    #[test]
    fn leading_zeros_and_large_numbers() {
        assert_eq!(NaturalKey::new("007"), NaturalKey::new("7"));
        assert_eq!(natural_cmp("007.md", "7.md"), "007.md".cmp("7.md"));
        assert_eq!(
            sorted(&["123456789012345678901234567890.md", "99.md"]),
            vec!["99.md", "123456789012345678901234567890.md"]
        );
    }

    #[test]
    fn digit_run_precedes_text_run() {
        assert_eq!(sorted(&["a.md", "1.md"]), vec!["1.md", "a.md"]);
    }

    async fn write(dir: &Path, name: &str, content: &str) {
        tokio::fs::write(dir.join(name), content).await.unwrap();
    }

    #[tokio::test]
    async fn missing_directory_fails() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("missing");
        let err = consolidate(&missing, &dir.path().join("out.md"))
            .await
            .unwrap_err();
        assert!(matches!(err, ConsolidationError::NoSuchDirectory { .. }));
    }

    #[tokio::test]
    async fn directory_without_artifacts_fails() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "notes.txt", "not markdown").await;
        let err = consolidate(dir.path(), &dir.path().join("Consolidated.md"))
            .await
            .unwrap_err();
        assert!(matches!(err, ConsolidationError::NoArtifacts { .. }));
        assert!(!dir.path().join("Consolidated.md").exists());
    }

    #[tokio::test]
    async fn writes_sections_in_natural_order() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "10_appendix.md", "appendix").await;
        write(dir.path(), "1_intro.md", "intro\n").await;
        write(dir.path(), "2_body.md", "body").await;
        let output = dir.path().join("Consolidated.md");

        let report = consolidate(dir.path(), &output).await.unwrap();
        assert_eq!(report.included, vec!["1_intro.md", "2_body.md", "10_appendix.md"]);
        assert!(report.skipped.is_empty());

        let text = std::fs::read_to_string(&output).unwrap();
        let expected = "# Consolidated Files\n\n\
             *Consolidation of 3 markdown files*\n\n\
             \n---\n\n## 1_intro.md\n\nintro\n\n\n*--- End of 1_intro.md ---*\n\
             \n---\n\n## 2_body.md\n\nbody\n\n\n*--- End of 2_body.md ---*\n\
             \n---\n\n## 10_appendix.md\n\nappendix\n\n\n*--- End of 10_appendix.md ---*\n";
        assert_eq!(text, expected);
    }

    #[tokio::test]
    async fn rerun_is_byte_identical_and_excludes_output() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "a.md", "alpha").await;
        write(dir.path(), "b.md", "beta").await;
        let output = dir.path().join("Consolidated.md");

        consolidate(dir.path(), &output).await.unwrap();
        let first = std::fs::read(&output).unwrap();
        let report = consolidate(dir.path(), &output).await.unwrap();
        let second = std::fs::read(&output).unwrap();

        assert_eq!(first, second);
        assert_eq!(report.included, vec!["a.md", "b.md"]);
    }

    #[tokio::test]
    async fn unreadable_artifact_is_skipped() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "1_ok.md", "fine").await;
        tokio::fs::write(dir.path().join("2_bad.md"), [0xff, 0xfe, 0x00])
            .await
            .unwrap();
        let output = dir.path().join("Consolidated.md");

        let report = consolidate(dir.path(), &output).await.unwrap();

        assert_eq!(report.included, vec!["1_ok.md"]);
        assert_eq!(report.skipped, vec!["2_bad.md"]);
        let text = std::fs::read_to_string(&output).unwrap();
        assert!(text.contains("## 1_ok.md"));
        assert!(!text.contains("## 2_bad.md"));
    }

    #[tokio::test]
    async fn creates_missing_output_parent() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "a.md", "alpha").await;
        let output = dir.path().join("merged").join("all.md");

        consolidate(dir.path(), &output).await.unwrap();
        assert!(output.exists());
        assert!(!dir.path().join("merged").join(".all.md.tmp").exists());
    }

    #[tokio::test]
    async fn write_failure_leaves_no_output() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "a.md", "alpha").await;
        // A directory in place of the output file makes the rename fail.
        let output = dir.path().join("blocked.out");
        std::fs::create_dir(&output).unwrap();
        std::fs::write(output.join("keep"), b"x").unwrap();

        let err = consolidate(dir.path(), &output).await.unwrap_err();

        assert!(matches!(err, ConsolidationError::WriteFailure { .. }));
        assert!(!dir.path().join(".blocked.out.tmp").exists());
    }
}
