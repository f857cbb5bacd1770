use clap::{Parser, Subcommand};
use imageloader::cache::ThumbnailCache;
use imageloader::config::{self, LoaderConfig};
use imageloader::metadata::MetadataStore;
use imageloader::scan::{self, DirectoryIndexer};
use imageloader::{output, server};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;
use walkdir::WalkDir;

#[derive(Parser)]
#[command(name = "imageloader")]
#[command(about = "Image browser backend: thumbnails, directory listings, ratings and tags")]
#[command(long_about = "\
Image browser backend: thumbnails, directory listings, ratings and tags

Serves a directory of images to the loader node's front-end:

  GET    /imageloader/thumbnail?filepath=<abs>   cached JPEG preview
  GET    /imageloader/files?directory=<path>     one directory level
  POST   /imageloader/metadata                   {path, rating?, tags?}
  DELETE /imageloader/delete                     {path}
  GET    /imageloader/options                    selector options

Thumbnails are written to the cache directory as <sha256>.jpg, keyed by the
source path and modification time. Ratings and tags live in one JSON file.

Run 'imageloader gen-config' to generate a documented imageloader.toml.
Set RUST_LOG (e.g. RUST_LOG=imageloader=debug) to change log verbosity.")]
#[command(version)]
struct Cli {
    /// Config file
    #[arg(long, default_value = config::DEFAULT_CONFIG_FILE, global = true)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the HTTP API until Ctrl-C
    Serve {
        /// Address to listen on (overrides [server] bind)
        #[arg(long)]
        bind: Option<SocketAddr>,
    },
    /// List one directory level (defaults to the configured root)
    Scan {
        directory: Option<PathBuf>,
        /// List image files inside each sub-folder
        #[arg(long, short)]
        recursive: bool,
    },
    /// Print the loader node's selector options for the root
    Options,
    /// Generate missing or stale thumbnails for every image under a directory
    Warm { directory: Option<PathBuf> },
    /// Print a stock imageloader.toml with all options documented
    GenConfig,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_logging();

    match cli.command {
        Command::Serve { bind } => {
            let mut config = load_config(&cli.config)?;
            if let Some(addr) = bind {
                config.server.bind = addr.to_string();
            }
            tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()?
                .block_on(server::serve(config))?;
        }
        Command::Scan {
            directory,
            recursive,
        } => {
            let config = load_config(&cli.config)?;
            let indexer = indexer(&config);
            let directory = directory.unwrap_or_else(|| indexer.root().to_path_buf());
            if !directory.is_dir() {
                return Err(format!("not a directory: {}", directory.display()).into());
            }
            let mut items = indexer.scan(&directory, recursive);
            scan::sort_for_display(&mut items);
            output::print_listing(&directory, &items);
        }
        Command::Options => {
            let config = load_config(&cli.config)?;
            let indexer = indexer(&config);
            let entries = indexer.list_selectable_entries(indexer.root());
            output::print_options(&entries);
        }
        Command::Warm { directory } => {
            let config = load_config(&cli.config)?;
            let indexer = indexer(&config);
            let directory = directory.unwrap_or_else(|| indexer.root().to_path_buf());
            if !directory.is_dir() {
                return Err(format!("not a directory: {}", directory.display()).into());
            }
            init_thread_pool(&config.processing);
            let sources = collect_images(&indexer, &directory);
            info!(count = sources.len(), directory = %directory.display(), "warming thumbnails");
            let cache = ThumbnailCache::new(&config)?;
            let stats = cache.warm(&sources);
            output::print_warm_summary(&stats, cache.cache_dir());
        }
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
        }
    }

    Ok(())
}

fn load_config(path: &Path) -> Result<LoaderConfig, config::ConfigError> {
    let config = config::load_config(path)?;
    info!(
        config = %path.display(),
        root = %config.root_dir.display(),
        "configuration loaded"
    );
    Ok(config)
}

/// Log to stderr, filtered by `RUST_LOG` (default `info`).
fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Initialize the rayon thread pool based on processing config.
///
/// Caps at the number of available CPU cores; the config can constrain down, not up.
fn init_thread_pool(processing: &config::ProcessingConfig) {
    let threads = config::effective_threads(processing);
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()
        .ok();
}

fn indexer(config: &LoaderConfig) -> DirectoryIndexer {
    let metadata = Arc::new(MetadataStore::new(config.metadata_file.clone()));
    DirectoryIndexer::new(config, metadata)
}

/// Every image under `root`, at any depth, skipping hidden entries.
fn collect_images(indexer: &DirectoryIndexer, root: &Path) -> Vec<PathBuf> {
    WalkDir::new(root)
        .follow_links(true)
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !e.file_name().to_string_lossy().starts_with('.'))
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file() && indexer.is_image(e.path()))
        .map(|e| std::path::absolute(e.path()).unwrap_or_else(|_| e.into_path()))
        .collect()
}
