// Developer utility: packs the project into a gzip-compressed tarball.

use anyhow::{Context, Result};
use flate2::{write::GzEncoder, Compression};
use std::fs::File;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info};
use walkdir::{DirEntry, WalkDir};

/// Top-level directories that never go into the archive.
pub const EXCLUDED_DIRS: &[&str] = &["node_modules", "dist", "target", ".git"];

/// File extensions worth shipping. Dotfiles are always included.
pub const INCLUDED_EXTENSIONS: &[&str] = &[
    "rs", "toml", "js", "jsx", "ts", "tsx", "json", "html", "css", "md", "env",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageSummary {
    pub output: PathBuf,
    /// Archive paths, relative to the project root, in the order they were added.
    pub files: Vec<PathBuf>,
}

fn is_excluded_dir(relative: &Path) -> bool {
    match relative.components().next() {
        Some(Component::Normal(first)) => EXCLUDED_DIRS.iter().any(|dir| first == *dir),
        _ => false,
    }
}

/// Decides whether a file (given relative to the project root) belongs in the archive.
pub fn should_include(relative: &Path) -> bool {
    if is_excluded_dir(relative) {
        return false;
    }
    let is_dotfile = relative
        .file_name()
        .and_then(|name| name.to_str())
        .map(|name| name.starts_with('.'))
        .unwrap_or(false);
    let allowed_extension = relative
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| INCLUDED_EXTENSIONS.contains(&ext))
        .unwrap_or(false);
    allowed_extension || is_dotfile
}

/// Walks `root` and writes every included file to a `.tar.gz` at `output`.
pub fn package_project(root: &Path, output: &Path) -> Result<PackageSummary> {
    let archive_file = File::create(output)
        .with_context(|| format!("Failed to create archive {}", output.display()))?;
    // The archive may live inside the tree being walked.
    let output_abs = output.canonicalize().unwrap_or_else(|_| output.to_path_buf());

    let encoder = GzEncoder::new(archive_file, Compression::default());
    let mut builder = tar::Builder::new(encoder);
    let mut files = Vec::new();

    let prune = |entry: &DirEntry| -> bool {
        match entry.path().strip_prefix(root) {
            Ok(relative) if entry.file_type().is_dir() && !relative.as_os_str().is_empty() => {
                !is_excluded_dir(relative)
            }
            _ => true,
        }
    };

    for entry in WalkDir::new(root).sort_by_file_name().into_iter().filter_entry(prune) {
        let entry = entry.with_context(|| format!("Failed to walk {}", root.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry
            .path()
            .strip_prefix(root)
            .context("Walked outside of the project root")?
            .to_path_buf();

        if !should_include(&relative) {
            continue;
        }
        if entry.path().canonicalize().ok().as_deref() == Some(output_abs.as_path()) {
            continue;
        }

        debug!(path = %relative.display(), "Adding to archive");
        builder
            .append_path_with_name(entry.path(), &relative)
            .with_context(|| format!("Failed to add {} to archive", relative.display()))?;
        files.push(relative);
    }

    let encoder = builder.into_inner().context("Failed to finish tar stream")?;
    encoder.finish().context("Failed to finish gzip stream")?;

    info!(files = files.len(), output = %output.display(), "Project packaged");
    Ok(PackageSummary {
        output: output.to_path_buf(),
        files,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::GzDecoder;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_should_include_rules() {
        assert!(should_include(Path::new("src/main.rs")));
        assert!(should_include(Path::new("Cargo.toml")));
        assert!(should_include(Path::new("templates/index.html")));
        assert!(should_include(Path::new(".env")));
        assert!(should_include(Path::new("static/.gitkeep")));
        assert!(!should_include(Path::new("logo.png")));
        assert!(!should_include(Path::new("Cargo.lock")));
        assert!(!should_include(Path::new("node_modules/react/index.js")));
        assert!(!should_include(Path::new("target/debug/build.rs")));
        assert!(!should_include(Path::new("dist/bundle.js")));
        // only the top-level component is matched, not a string prefix
        assert!(should_include(Path::new("distance.md")));
        assert!(should_include(Path::new("docs/target/notes.md")));
    }

    #[test]
    fn test_package_project_writes_filtered_archive() {
        let project = TempDir::new().unwrap();
        let root = project.path();
        fs::create_dir_all(root.join("src")).unwrap();
        fs::create_dir_all(root.join("node_modules/pkg")).unwrap();
        fs::create_dir_all(root.join("target/debug")).unwrap();
        fs::write(root.join("Cargo.toml"), "[package]\n").unwrap();
        fs::write(root.join("src/main.rs"), "fn main() {}\n").unwrap();
        fs::write(root.join(".env"), "DEEPSEEK_API_KEY=x\n").unwrap();
        fs::write(root.join("photo.png"), [0u8, 1, 2]).unwrap();
        fs::write(root.join("node_modules/pkg/index.js"), "x").unwrap();
        fs::write(root.join("target/debug/out.rs"), "x").unwrap();

        let output = root.join("project.tar.gz");
        let summary = package_project(root, &output).unwrap();

        assert_eq!(
            summary.files,
            vec![
                PathBuf::from(".env"),
                PathBuf::from("Cargo.toml"),
                PathBuf::from("src/main.rs"),
            ]
        );

        let mut archive = tar::Archive::new(GzDecoder::new(File::open(&output).unwrap()));
        let mut names: Vec<String> = archive
            .entries()
            .unwrap()
            .map(|e| e.unwrap().path().unwrap().display().to_string())
            .collect();
        names.sort();
        assert_eq!(names, vec![".env", "Cargo.toml", "src/main.rs"]);
    }
}
