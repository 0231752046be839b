use ignore::WalkBuilder;
use std::path::{Path, PathBuf};

/// Scanner for finding ingestible text files in a repository
pub struct FileScanner {
    root: PathBuf,
    max_file_size: u64,
}

impl FileScanner {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            max_file_size: MAX_FILE_SIZE_BYTES,
        }
    }

    #[must_use]
    pub const fn with_max_file_size(mut self, bytes: u64) -> Self {
        self.max_file_size = bytes;
        self
    }

    /// Scan directory for candidate files (.gitignore aware), sorted by path
    pub fn scan(&self) -> Vec<PathBuf> {
        let mut files = Vec::new();

        let root = self.root.clone();
        let mut builder = WalkBuilder::new(&self.root);
        builder
            .hidden(true)
            .git_ignore(true)
            .git_global(true)
            .git_exclude(true);
        builder.filter_entry(move |entry| !Self::is_ignored_scope(entry.path(), &root));

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
                    if let Ok(meta) = entry.metadata() {
                        if meta.len() > self.max_file_size {
                            log::debug!(
                                "Skipping large file {} ({} bytes > {})",
                                path.display(),
                                meta.len(),
                                self.max_file_size
                            );
                            continue;
                        }
                    }

                    if Self::is_denylisted(path) {
                        log::debug!("Skipping denylisted file {}", path.display());
                        continue;
                    }

                    files.push(path.to_path_buf());
                }
                Err(e) => log::warn!("Failed to read entry: {e}"),
            }
        }

        files.sort();
        log::info!("Found {} candidate files", files.len());
        files
    }

    /// Name, suffix and binary-extension filters
    pub(crate) fn is_denylisted(path: &Path) -> bool {
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            return true;
        };
        let lowered = name.to_lowercase();

        if NOISE_FILE_NAMES.iter().any(|candidate| lowered == *candidate) {
            return true;
        }

        // sample env files tend to carry fake credentials, not code
        if lowered.contains("example") && lowered.ends_with(".env") {
            return true;
        }

        if NOISE_SUFFIXES.iter().any(|suffix| lowered.ends_with(suffix)) {
            return true;
        }

        path.extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_lowercase)
            .is_some_and(|ext| BINARY_EXTENSIONS.contains(&ext.as_str()))
    }

    fn is_ignored_scope(path: &Path, root: &Path) -> bool {
        if let Ok(relative) = path.strip_prefix(root) {
            for component in relative.components() {
                if let std::path::Component::Normal(name) = component {
                    let lowered = name.to_string_lossy().to_lowercase();
                    if IGNORED_SCOPES.iter().any(|ignored| *ignored == lowered) {
                        return true;
                    }
                }
            }
        }
        false
    }
}

const IGNORED_SCOPES: &[&str] = &[
    // VCS / tooling
    ".git",
    ".yarn",
    // caches / builds
    ".cache",
    "node_modules",
    "build",
    "dist",
    "target",
    "__pycache__",
    // environments / vendored code
    "venv",
    "env",
    ".venv",
    "vendor",
];

const NOISE_FILE_NAMES: &[&str] = &[
    "license",
    "notice",
    "changelog",
    "authors",
    ".gitignore",
    ".npmrc",
    ".yarnrc",
    ".yarnrc.yml",
];

const NOISE_SUFFIXES: &[&str] = &[".lock", ".map", ".min.js", ".min.css"];

const BINARY_EXTENSIONS: &[&str] = &[
    "pyc", "exe", "dll", "so", "dylib", "bin", "jpg", "jpeg", "png", "gif", "ico", "pdf", "zip",
    "tar", "gz", "mp4", "mp3",
];

const MAX_FILE_SIZE_BYTES: u64 = 1_048_576; // 1 MB
