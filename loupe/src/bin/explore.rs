//! Headless exploration session over a prepared dataset.
//!
//! Loads one subset of the container, runs a single reduction, renders the
//! projection (and, after picks, the spectrum detail) to PNG files and
//! exports recorded labels as JSON. Pick and label actions replay from the
//! command line, which makes a full session scriptable.
//!
//! Usage:
//! ```
//! cargo run --bin explore -- --dataset data/dataset.fits --subset validation \
//!     --reduction '{"method":"umap","n_neighbors":30}' \
//!     --label 17=2.31 --label 940=0.002
//! ```

use anyhow::{bail, Context};
use clap::Parser;
use log::info;
use loupe::{Explorer, ExplorerEvent};
use reduce::Reduction;
use spectra::{read_subset, Subset};
use std::collections::BTreeMap;
use std::error::Error;
use std::fs;
use std::path::PathBuf;

/// Command line arguments for an exploration session
#[derive(Parser, Debug)]
#[command(
    name = "explore",
    about = "Embeds a prepared spectrum collection and replays pick/label actions",
    long_about = None
)]
struct Args {
    /// Prepared dataset container
    #[arg(long)]
    dataset: PathBuf,

    /// Subset to explore: train, validation, test or full
    #[arg(long, default_value = "validation")]
    subset: String,

    /// Reduction parameters as JSON, e.g. '{"method":"pca"}'
    #[arg(long, default_value = r#"{"method":"pca"}"#)]
    reduction: String,

    /// Keep only the first N items of the subset (0 keeps all)
    #[arg(long, default_value_t = 2000)]
    limit: usize,

    /// Pick an item and record a label, as INDEX=VALUE (repeatable)
    #[arg(long = "label", value_name = "INDEX=VALUE")]
    labels: Vec<String>,

    /// Directory for rendered views and the label export
    #[arg(short, long, default_value = "explore_out")]
    out: PathBuf,
}

fn parse_subset(name: &str) -> anyhow::Result<Option<Subset>> {
    Ok(match name {
        "train" => Some(Subset::Train),
        "validation" => Some(Subset::Validation),
        "test" => Some(Subset::Test),
        "full" => None,
        other => bail!("unknown subset '{other}', expected train, validation, test or full"),
    })
}

fn parse_label_action(action: &str) -> anyhow::Result<(usize, f64)> {
    let (index, value) = action
        .split_once('=')
        .with_context(|| format!("label action '{action}' is not INDEX=VALUE"))?;
    Ok((
        index
            .parse()
            .with_context(|| format!("bad index in '{action}'"))?,
        value
            .parse()
            .with_context(|| format!("bad value in '{action}'"))?,
    ))
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();
    let args = Args::parse();

    let subset = parse_subset(&args.subset)?;
    let reduction: Reduction =
        serde_json::from_str(&args.reduction).context("parsing --reduction")?;

    let mut dataset = read_subset(&args.dataset, subset)?;
    if args.limit > 0 {
        dataset.truncate(args.limit);
    }
    info!(
        "exploring {} spectra from {}",
        dataset.len(),
        args.dataset.display()
    );

    let ids = dataset.ids().to_vec();
    let features = dataset.features_f64();
    let targets = dataset.targets().mapv(f64::from);
    let uncertainties = dataset.uncertainties().map(|u| u.mapv(f64::from));

    let mut explorer = Explorer::new(ids, features, targets, uncertainties)?;
    explorer.register_callback(|event| {
        if let ExplorerEvent::LabelRecorded { identifier, value } = event {
            println!("Recorded {identifier} = {value:.4}");
        }
    });

    explorer.run_reduction(&reduction)?;

    fs::create_dir_all(&args.out)?;
    explorer.save_projection(&args.out.join("projection.png"))?;

    for action in &args.labels {
        let (index, value) = parse_label_action(action)?;
        explorer.pick(index)?;
        explorer.edit_label(value)?;
        explorer.confirm_label();
    }
    if explorer.selection().is_some() {
        explorer.save_detail(&args.out.join("detail.png"))?;
    }

    let export: BTreeMap<String, f64> = explorer
        .labels()
        .iter()
        .map(|(id, &value)| (id.to_string(), value))
        .collect();
    let labels_path = args.out.join("labels.json");
    serde_json::to_writer_pretty(fs::File::create(&labels_path)?, &export)?;
    println!("Wrote {} ({} labels)", labels_path.display(), export.len());

    Ok(())
}
