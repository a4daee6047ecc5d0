pub mod config;
pub mod error;
pub mod files;
pub mod markup;
pub mod preprocess;
pub mod resolver;
pub mod scanner;
pub mod session;
pub mod splice;
pub mod style;
pub mod table;

#[cfg(test)]
mod test_support;

pub use config::{Config, Mode, Options};
pub use error::PreprocessError;
pub use markup::{ComponentParser, MarkupParser};
pub use preprocess::{Preprocessor, Processed, SourceInput};
pub use resolver::{Resolution, UtilityResolver};
pub use session::{Session, SessionSummary};
pub use style::StyleSheet;
pub use table::TableResolver;

use clap::{Args, Parser, Subcommand};
use config::ConfigError;
use files::{ComponentFilter, DiscoverError, DiscoverOptions};
use log::{debug, info};
use std::collections::{BTreeSet, HashSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{RecvTimeoutError, channel};
use std::time::{Duration, Instant};

const DEBOUNCE: Duration = Duration::from_millis(200);

#[derive(Debug, Parser)]
#[command(name = "windi-preprocess")]
#[command(about = "Resolve utility classes in component files and inject the generated CSS")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Process every matching component once
    Build(BuildArgs),
    /// Build, then reprocess components as they change
    Watch(WatchArgs),
}

#[derive(Debug, Clone, PartialEq, Eq, Args)]
pub struct BuildArgs {
    /// TOML config with options, utilities and preflight entries
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Resolution mode: rewrite or resolve-in-place
    #[arg(long, value_name = "MODE")]
    pub mode: Option<Mode>,

    /// Prefix for generated class names in rewrite mode
    #[arg(long)]
    pub prefix: Option<String>,

    /// Directory that receives processed files; stdout when omitted
    #[arg(short, long = "out-dir", value_name = "DIR")]
    pub out_dir: Option<PathBuf>,

    /// Glob of paths to skip (repeatable)
    #[arg(short = 'I', long = "ignore", value_name = "GLOB")]
    pub ignore: Vec<String>,

    /// Component file extension (repeatable)
    #[arg(long = "ext", value_name = "EXT", default_values_t = [String::from("svelte")])]
    pub extensions: Vec<String>,

    /// Directory patterns and output paths are relative to
    #[arg(long, value_name = "DIR", default_value = ".")]
    pub root: PathBuf,

    /// Also process files excluded by .gitignore
    #[arg(long)]
    pub no_gitignore: bool,

    /// Glob patterns selecting component files
    #[arg(required = true, value_name = "GLOB")]
    pub inputs: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Args)]
pub struct WatchArgs {
    #[command(flatten)]
    pub build: BuildArgs,

    /// Poll the file system instead of using native events
    #[arg(long)]
    pub poll: bool,

    /// Poll interval in milliseconds
    #[arg(long = "poll-interval", value_name = "MS", default_value_t = 500)]
    pub poll_interval_ms: u64,
}

#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Discover(#[from] DiscoverError),
    #[error("failed to {action} {}: {source}", path.display())]
    Io {
        action: &'static str,
        path: PathBuf,
        source: io::Error,
    },
    #[error("{}: {source}", path.display())]
    Preprocess {
        path: PathBuf,
        source: PreprocessError,
    },
    #[error("{0}")]
    Watch(String),
    #[error("{0}")]
    Usage(String),
}

pub fn run(command: Command) -> Result<(), CliError> {
    match command {
        Command::Build(args) => run_build(&args),
        Command::Watch(args) => run_watch(&args),
    }
}

pub fn run_from_env() -> Result<(), CliError> {
    run(Cli::parse().command)
}

pub fn parse_args<I>(args: I) -> Result<Command, CliError>
where
    I: IntoIterator<Item = String>,
{
    let argv = std::iter::once("windi-preprocess".to_string()).chain(args);
    Cli::try_parse_from(argv)
        .map(|cli| cli.command)
        .map_err(|err| CliError::Usage(err.to_string()))
}

struct Pipeline {
    preprocessor: Preprocessor<TableResolver>,
    session: Session,
    filter: ComponentFilter,
    patterns: Vec<String>,
    out_dir: Option<PathBuf>,
    root: PathBuf,
    root_abs: PathBuf,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
struct BuildReport {
    files: usize,
    ignored: usize,
}

impl Pipeline {
    fn open(args: &BuildArgs) -> Result<Self, CliError> {
        let config = match args.config.as_deref() {
            Some(path) => config::load(path)?,
            None => Config::default(),
        };
        let mut options = config.options.clone();
        if let Some(mode) = args.mode {
            options.mode = mode;
        }
        if let Some(prefix) = args.prefix.as_ref() {
            options.prefix = prefix.clone();
        }
        let resolver = TableResolver::from_config(&config)?;
        debug!("loaded {} utilities", resolver.utility_count());

        let root_abs = fs::canonicalize(&args.root).map_err(|source| CliError::Io {
            action: "resolve root",
            path: args.root.clone(),
            source,
        })?;
        let mut ignore = args.ignore.clone();
        if let Some(out_dir) = args.out_dir.as_ref() {
            let relative = out_dir.strip_prefix(&args.root).unwrap_or(out_dir);
            ignore.push(format!("{}/**", relative.display()));
        }

        let filter = ComponentFilter::new(
            &args.inputs,
            &ignore,
            DiscoverOptions {
                base_path: args.root.clone(),
                respect_gitignore: !args.no_gitignore,
                extensions: args
                    .extensions
                    .iter()
                    .map(|ext| ext.trim_start_matches('.').to_ascii_lowercase())
                    .collect(),
                ..DiscoverOptions::default()
            },
        )?;

        Ok(Self {
            preprocessor: Preprocessor::new(resolver),
            session: Session::open(options),
            filter,
            patterns: args.inputs.clone(),
            out_dir: args.out_dir.clone(),
            root: args.root.clone(),
            root_abs,
        })
    }

    fn build_all(&mut self) -> Result<BuildReport, CliError> {
        let paths = self.filter.discover();
        if self.out_dir.is_none() && paths.len() != 1 {
            return Err(CliError::Usage(format!(
                "{} files matched; pass --out-dir to process more than one",
                paths.len()
            )));
        }

        let mut report = BuildReport::default();
        for path in &paths {
            let processed = self.process_path(path)?;
            report.files += 1;
            report.ignored += processed.ignored.len();
        }
        Ok(report)
    }

    fn relative_path(&self, path: &Path) -> PathBuf {
        path.strip_prefix(&self.root_abs)
            .or_else(|_| path.strip_prefix(&self.root))
            .unwrap_or(path)
            .to_path_buf()
    }

    fn process_path(&mut self, path: &Path) -> Result<Processed, CliError> {
        let relative = self.relative_path(path);
        let source = fs::read_to_string(path).map_err(|source| CliError::Io {
            action: "read",
            path: path.to_path_buf(),
            source,
        })?;
        let filename = relative.to_string_lossy().replace('\\', "/");
        let processed = self
            .preprocessor
            .process(
                &mut self.session,
                SourceInput {
                    source: &source,
                    filename: &filename,
                },
            )
            .map_err(|source| CliError::Preprocess {
                path: path.to_path_buf(),
                source,
            })?;

        match self.out_dir.as_ref() {
            Some(out_dir) => {
                if relative.is_absolute() {
                    return Err(CliError::Usage(format!(
                        "{} is outside {}",
                        path.display(),
                        self.root.display()
                    )));
                }
                let target = out_dir.join(&relative);
                if let Some(parent) = target.parent() {
                    fs::create_dir_all(parent).map_err(|source| CliError::Io {
                        action: "create directory",
                        path: parent.to_path_buf(),
                        source,
                    })?;
                }
                fs::write(&target, &processed.code).map_err(|source| CliError::Io {
                    action: "write",
                    path: target.clone(),
                    source,
                })?;
                info!("{} -> {}", path.display(), target.display());
            }
            None => print!("{}", processed.code),
        }
        Ok(processed)
    }

    fn changed_components(&self, event: &notify::Event) -> Vec<PathBuf> {
        if event.kind.is_access() || event.kind.is_remove() {
            return Vec::new();
        }
        event
            .paths
            .iter()
            .filter(|path| path.is_file())
            .map(|path| self.relative_path(path))
            .filter(|relative| self.filter.matches(&self.root.join(relative)))
            .collect()
    }
}

fn run_build(args: &BuildArgs) -> Result<(), CliError> {
    let started = Instant::now();
    let mut pipeline = Pipeline::open(args)?;
    let report = pipeline.build_all()?;
    let summary = pipeline.session.close();
    eprintln!(
        "processed {} files, {} tags, {} ignored classes in {}ms",
        report.files,
        summary.tags,
        report.ignored,
        started.elapsed().as_millis()
    );
    Ok(())
}

fn run_watch(args: &WatchArgs) -> Result<(), CliError> {
    let mut pipeline = Pipeline::open(&args.build)?;
    let report = pipeline.build_all()?;
    eprintln!("processed {} files", report.files);

    let (tx, rx) = channel();
    let mut watcher: Box<dyn notify::Watcher> = if args.poll {
        Box::new(
            notify::PollWatcher::new(
                tx,
                notify::Config::default()
                    .with_poll_interval(Duration::from_millis(args.poll_interval_ms)),
            )
            .map_err(|err| CliError::Watch(format!("failed to start poll watcher: {}", err)))?,
        )
    } else {
        Box::new(
            notify::recommended_watcher(tx)
                .map_err(|err| CliError::Watch(format!("failed to start watcher: {}", err)))?,
        )
    };

    for root in watch_roots(&pipeline.patterns) {
        let root = pipeline.root.join(root);
        watcher
            .watch(&root, notify::RecursiveMode::Recursive)
            .map_err(|err| {
                CliError::Watch(format!("failed to watch {}: {}", root.display(), err))
            })?;
    }

    if args.poll {
        eprintln!("watching for changes (polling, press Ctrl+C to stop)...");
    } else {
        eprintln!("watching for changes (press Ctrl+C to stop)...");
    }

    let mut pending = BTreeSet::new();
    let mut last_event = Instant::now();
    loop {
        match rx.recv_timeout(DEBOUNCE) {
            Ok(Ok(event)) => {
                let changed = pipeline.changed_components(&event);
                if !changed.is_empty() {
                    pending.extend(changed);
                    last_event = Instant::now();
                }
            }
            Ok(Err(err)) => eprintln!("watch error: {}", err),
            Err(RecvTimeoutError::Timeout) => {
                if pending.is_empty() || last_event.elapsed() < DEBOUNCE {
                    continue;
                }
                for relative in std::mem::take(&mut pending) {
                    let path = pipeline.root.join(&relative);
                    eprintln!("change detected, reprocessing {}", relative.display());
                    if let Err(err) = pipeline.process_path(&path) {
                        eprintln!("build failed: {}", err);
                    }
                }
            }
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    Ok(())
}

fn watch_roots(patterns: &[String]) -> Vec<PathBuf> {
    let mut roots = Vec::new();
    let mut seen = HashSet::new();
    for pattern in patterns {
        let root = glob_root(pattern);
        if seen.insert(root.clone()) {
            roots.push(root);
        }
    }
    roots
}

fn glob_root(pattern: &str) -> PathBuf {
    let parts = pattern.split(['/', '\\']).collect::<Vec<_>>();
    let literal = parts
        .iter()
        .take_while(|part| !part.contains(['*', '?', '[', '{']))
        .count();
    let keep = if literal == parts.len() {
        literal.saturating_sub(1)
    } else {
        literal
    };

    let mut root = if pattern.starts_with('/') {
        PathBuf::from("/")
    } else {
        PathBuf::new()
    };
    for part in parts[..keep].iter().filter(|part| !part.is_empty()) {
        root.push(part);
    }
    if root.as_os_str().is_empty() {
        PathBuf::from(".")
    } else {
        root
    }
}
