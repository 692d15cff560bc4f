//! Prepare the exploration dataset from archive spectrum files.
//!
//! Reads a catalog (`ID` and `Z` extensions), loads every object's coadded
//! flux from the archive, resamples onto the feature grid, normalizes each
//! spectrum, draws the train/validation/test split and writes the FITS
//! container.
//!
//! Usage:
//! ```
//! cargo run --bin prepare_dataset -- --catalog data/catalog.fits \
//!     --archive data/spectra --output data/dataset.fits
//! ```

use anyhow::{bail, Context};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use log::info;
use ndarray::{Array1, Array2};
use rayon::prelude::*;
use spectra::archive::{object_path, read_object_flux};
use spectra::container::{read_catalog, write_container, PreparedArrays};
use spectra::grid::{resample_rows, LogLamGrid, LOGLAM_MAX, LOGLAM_MIN, N_FEATURES, N_WAVES};
use spectra::id::SpectrumId;
use spectra::scale::minmax_rows;
use spectra::split::{split_indices, SplitSizes, SPLIT_SEED};
use std::error::Error;
use std::path::PathBuf;

/// Command line arguments for dataset preparation
#[derive(Parser, Debug)]
#[command(
    name = "prepare_dataset",
    about = "Builds the exploration dataset container from archive spectra",
    long_about = None
)]
struct Args {
    /// Catalog FITS file with ID and Z extensions
    #[arg(long)]
    catalog: PathBuf,

    /// Root directory of per-object spectrum files
    #[arg(long)]
    archive: PathBuf,

    /// Output container path
    #[arg(short, long, default_value = "data/dataset.fits")]
    output: PathBuf,

    /// Validation set size
    #[arg(long, default_value_t = 50_000)]
    n_validation: usize,

    /// Test set size
    #[arg(long, default_value_t = 50_000)]
    n_test: usize,

    /// Split seed
    #[arg(long, default_value_t = SPLIT_SEED)]
    seed: u64,
}

/// Load every object's flux row, in catalog order, across the rayon pool.
fn load_flux_rows(args: &Args, ids: &[SpectrumId]) -> anyhow::Result<Array2<f32>> {
    let progress = ProgressBar::new(ids.len() as u64);
    progress.set_style(
        ProgressStyle::default_bar()
            .template("{msg} [{bar:40.cyan/blue}] {pos}/{len} ({eta})")
            .unwrap()
            .progress_chars("█▉▊▋▌▍▎▏ "),
    );
    progress.set_message("Loading spectra");

    let rows: anyhow::Result<Vec<Array1<f32>>> = ids
        .par_iter()
        .map(|&id| {
            let path = object_path(&args.archive, id);
            let flux = read_object_flux(&path, LOGLAM_MIN, LOGLAM_MAX)
                .with_context(|| format!("reading {}", path.display()))?;
            if flux.len() != N_WAVES {
                bail!(
                    "{}: expected {} bins on the common grid, found {}",
                    id,
                    N_WAVES,
                    flux.len()
                );
            }
            progress.inc(1);
            Ok(flux)
        })
        .collect();
    let rows = rows?;
    progress.finish_with_message("Spectra loaded");

    let mut flux = Array2::zeros((rows.len(), N_WAVES));
    for (mut row, loaded) in flux.rows_mut().into_iter().zip(&rows) {
        row.assign(loaded);
    }
    Ok(flux)
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();
    let args = Args::parse();

    let (ids, z) = read_catalog(&args.catalog)?;
    info!("catalog lists {} spectra", ids.len());

    let flux = load_flux_rows(&args, &ids)?;

    info!("resampling onto {N_FEATURES} feature bins");
    let mut x = resample_rows(&LogLamGrid::features(), &LogLamGrid::raw(), flux.view())?;
    minmax_rows(&mut x);

    let split = split_indices(
        ids.len(),
        SplitSizes {
            validation: args.n_validation,
            test: args.n_test,
        },
        args.seed,
    )?;
    info!(
        "split: {} train / {} validation / {} test",
        split.train.len(),
        split.validation.len(),
        split.test.len()
    );

    let prepared = PreparedArrays {
        ids,
        flux,
        x,
        z,
        z_std: None,
    };
    write_container(&args.output, &prepared, &split, args.seed)?;
    println!("Wrote {}", args.output.display());

    Ok(())
}
