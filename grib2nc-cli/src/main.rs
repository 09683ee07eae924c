use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;

use grib2nc::{download_names, list_names, unpack_bz2, Conversion};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List file names at an HTTP index
    List {
        /// Index URL, ending in "/"
        url: String,

        /// File extension to match, e.g. ".bz2"
        #[arg(short, long, default_value = ".bz2")]
        ext: String,
    },

    /// Download files from an HTTP index
    Download {
        /// Index URL, ending in "/"
        url: String,

        /// File extension to match, e.g. ".bz2"
        #[arg(short, long, default_value = ".bz2")]
        ext: String,

        /// Download directory
        #[arg(short, long, value_name = "DIR")]
        output: PathBuf,

        /// Download at most this many files
        #[arg(short, long)]
        limit: Option<usize>,

        /// Redownload files that already exist
        #[arg(long)]
        overwrite: bool,
    },

    /// Decompress a bz2 archive
    Unpack {
        /// Input .bz2 file
        input: PathBuf,

        /// Output file (defaults to the input without its .bz2 suffix)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Unpack even if the output already exists
        #[arg(long)]
        overwrite: bool,
    },

    /// Convert a GRIB file to a netCDF archive
    Convert {
        /// Input GRIB file
        input: PathBuf,

        /// Output netCDF path
        #[arg(short, long)]
        output: PathBuf,

        /// Target CRS kind: EPSG, Wkt, Proj4 or ESRI
        #[arg(long, default_value = "EPSG")]
        crs_kind: String,

        /// Target CRS payload, e.g. "4326"
        #[arg(long, default_value = "4326")]
        crs: String,

        /// Time axis calendar
        #[arg(long, default_value = "gregorian")]
        calendar: String,

        /// Time axis units, "<unit> since <timestamp>"
        #[arg(long)]
        units: String,

        /// Convert even if the output already exists
        #[arg(long)]
        overwrite: bool,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let start_time = std::time::Instant::now();

    match args.command {
        Command::List { url, ext } => {
            let names = list_names(&url, &ext)?;
            for name in names {
                println!("{name}");
            }
        }

        Command::Download {
            url,
            ext,
            output,
            limit,
            overwrite,
        } => {
            std::fs::create_dir_all(&output)
                .with_context(|| format!("Failed to create {}", output.display()))?;

            let names = list_names(&url, &ext)?;
            let take = limit.unwrap_or(names.len()).min(names.len());
            let fetched = download_names(&url, &names[..take], &output, overwrite)
                .with_context(|| format!("Failed to download from {url}"))?;
            info!(
                "Downloaded {} of {} files to {}",
                fetched.len(),
                take,
                output.display()
            );
        }

        Command::Unpack {
            input,
            output,
            overwrite,
        } => {
            let output = output.unwrap_or_else(|| input.with_extension(""));
            unpack_bz2(&input, &output, overwrite)
                .with_context(|| format!("Failed to unpack {}", input.display()))?;
        }

        Command::Convert {
            input,
            output,
            crs_kind,
            crs,
            calendar,
            units,
            overwrite,
        } => {
            let mut session = Conversion::new(&input);
            session.set_output_path(&output)?;
            session.set_target_crs(&crs_kind, &crs)?;
            session.set_time(&calendar, &units)?;

            let read = session.verify()?.read()?;
            read.convert(overwrite)
                .with_context(|| format!("Failed to convert {}", input.display()))?;
        }
    }

    info!("Total processing time: {:?}", start_time.elapsed());
    Ok(())
}
