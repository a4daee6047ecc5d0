use globset::{Glob, GlobSet, GlobSetBuilder};
use ignore::{DirEntry, WalkBuilder};
use log::{debug, warn};
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum DiscoverError {
    #[error("at least one input pattern is required")]
    NoPatterns,
    #[error("invalid glob pattern '{pattern}': {source}")]
    Pattern {
        pattern: String,
        source: globset::Error,
    },
    #[error("failed to build glob set: {0}")]
    GlobSet(globset::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoverOptions {
    pub base_path: PathBuf,
    pub respect_gitignore: bool,
    pub include_node_modules: bool,
    /// Lowercase, without the dot. Empty accepts any extension.
    pub extensions: Vec<String>,
}

impl Default for DiscoverOptions {
    fn default() -> Self {
        Self {
            base_path: PathBuf::from("."),
            respect_gitignore: true,
            include_node_modules: false,
            extensions: vec!["svelte".to_string()],
        }
    }
}

#[derive(Debug, Clone)]
pub struct ComponentFilter {
    include: GlobSet,
    exclude: GlobSet,
    options: DiscoverOptions,
}

impl ComponentFilter {
    pub fn new(
        patterns: &[String],
        ignore_patterns: &[String],
        options: DiscoverOptions,
    ) -> Result<Self, DiscoverError> {
        if patterns.is_empty() {
            return Err(DiscoverError::NoPatterns);
        }
        Ok(Self {
            include: glob_set(patterns)?,
            exclude: glob_set(ignore_patterns)?,
            options,
        })
    }

    /// Globs are tried against the path relative to the base and against
    /// `path` as given.
    pub fn matches(&self, path: &Path) -> bool {
        let relative = path.strip_prefix(&self.options.base_path).unwrap_or(path);
        let globbed = |set: &GlobSet| set.is_match(relative) || set.is_match(path);
        globbed(&self.include)
            && !globbed(&self.exclude)
            && self.wanted_extension(path)
            && (self.options.include_node_modules || !in_node_modules(path))
    }

    pub fn discover(&self) -> Vec<PathBuf> {
        let respect = self.options.respect_gitignore;
        let mut paths = WalkBuilder::new(&self.options.base_path)
            .hidden(false)
            .require_git(false)
            .git_ignore(respect)
            .git_global(respect)
            .git_exclude(respect)
            .build()
            .filter_map(|entry| {
                entry
                    .map_err(|err| warn!("skipping unreadable entry: {}", err))
                    .ok()
            })
            .filter(|entry| entry.file_type().is_some_and(|ft| ft.is_file()))
            .map(DirEntry::into_path)
            .filter(|path| self.matches(path))
            .collect::<Vec<_>>();
        paths.sort();
        paths.dedup();

        debug!(
            "discovered {} files under {}",
            paths.len(),
            self.options.base_path.display()
        );
        paths
    }

    fn wanted_extension(&self, path: &Path) -> bool {
        if self.options.extensions.is_empty() {
            return true;
        }
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase)
            .is_some_and(|ext| self.options.extensions.contains(&ext))
    }
}

pub fn discover(
    patterns: &[String],
    ignore_patterns: &[String],
    options: &DiscoverOptions,
) -> Result<Vec<PathBuf>, DiscoverError> {
    Ok(ComponentFilter::new(patterns, ignore_patterns, options.clone())?.discover())
}

fn in_node_modules(path: &Path) -> bool {
    path.components()
        .any(|component| component.as_os_str() == "node_modules")
}

fn glob_set(patterns: &[String]) -> Result<GlobSet, DiscoverError> {
    patterns
        .iter()
        .try_fold(GlobSetBuilder::new(), |mut builder, pattern| {
            let glob = Glob::new(pattern).map_err(|source| DiscoverError::Pattern {
                pattern: pattern.clone(),
                source,
            })?;
            builder.add(glob);
            Ok::<_, DiscoverError>(builder)
        })?
        .build()
        .map_err(DiscoverError::GlobSet)
}
