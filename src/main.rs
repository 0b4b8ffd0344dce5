use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use json::{object, JsonValue};
use mnist_idx::parsing::csv;
use mnist_idx::{Config, Dataset, DatasetSplit, MnistLoader};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "mnist-idx", version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,

    /// Path of a TOML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Directory the dataset files are cached in
    #[arg(long, global = true)]
    cache_dir: Option<PathBuf>,

    /// URL the dataset file names are appended to
    #[arg(long, global = true)]
    base_url: Option<String>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Download and verify the four dataset files
    Fetch,

    /// Load the train and test splits and print a summary
    Load {
        /// Also write the summary as JSON to this path
        #[arg(short, long)]
        summary_path: Option<PathBuf>,
    },

    /// Parse a CSV dataset (label followed by 784 pixels per line)
    Csv {
        /// The path of the CSV file
        #[arg(short, long)]
        path: PathBuf,
    },

    /// Print an example configuration file
    ExampleConfig,
}

fn setup_logging(verbose: bool) -> Result<()> {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber).context("Failed to set subscriber")?;

    Ok(())
}

fn load_config(args: &Args) -> Result<Config> {
    let mut config = match &args.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => Config::default(),
    };

    if let Some(cache_dir) = &args.cache_dir {
        config.cache_dir = cache_dir.clone();
    }
    if let Some(base_url) = &args.base_url {
        config.base_url = base_url.clone();
    }

    Ok(config)
}

/// Sample count and per-class histogram of a dataset
fn describe(dataset: &Dataset) -> JsonValue {
    object! {
        samples: dataset.len(),
        class_counts: dataset.class_counts(),
    }
}

fn print_dataset(name: &str, dataset: &Dataset) {
    println!("{name}: {} samples", dataset.len());
    for (class, count) in dataset.class_counts().iter().enumerate() {
        println!("  {class}: {count}");
    }
}

/// Write the split summary in JSON format
fn write_summary(summary_path: &Path, split: &DatasetSplit) -> std::io::Result<()> {
    let data = object! {
        rows: split.geometry.rows,
        cols: split.geometry.cols,
        classes: split.geometry.classes,
        train: describe(&split.train),
        test: describe(&split.test),
    };
    let mut file = File::create(summary_path)?;

    file.write_all(data.pretty(2).as_bytes())?;

    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();
    setup_logging(args.verbose)?;

    match &args.command {
        Commands::Fetch => {
            let loader = MnistLoader::from_config(load_config(&args)?)?;
            for path in loader.fetch_all().context("fetching dataset files")? {
                println!("{}", path.display());
            }
        }
        Commands::Load { summary_path } => {
            let loader = MnistLoader::from_config(load_config(&args)?)?;
            let split = loader.load_split().context("loading dataset")?;

            println!(
                "Images are {}x{} with {} classes",
                split.geometry.rows, split.geometry.cols, split.geometry.classes
            );
            print_dataset("train", &split.train);
            print_dataset("test", &split.test);

            if let Some(summary_path) = summary_path {
                write_summary(summary_path, &split)
                    .with_context(|| format!("writing {}", summary_path.display()))?;
                info!(path = %summary_path.display(), "Summary written");
            }
        }
        Commands::Csv { path } => {
            let dataset = csv::parse_dataset(path)
                .with_context(|| format!("parsing {}", path.display()))?;
            print_dataset(&path.display().to_string(), &dataset);
        }
        Commands::ExampleConfig => {
            print!("{}", Config::default().to_toml()?);
        }
    }

    Ok(())
}
