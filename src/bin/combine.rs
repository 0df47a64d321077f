//! Stack the effect tables of the three experiment variants.
//!
//! Each input is an `effects_<method>.json` written by `abxlab-analyze`.
//!
//! Usage:
//!   abxlab-combine --original results/original --ratings-matched results/rm \
//!       --ratings-prices-matched results/rpm --output-dir results/combined

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use abxlab::combine::{combine, Experiment};
use abxlab::env_config::init_base_path;
use abxlab::marginals::MarginalEffects;
use abxlab::output::{read_effects_json, write_combined_csv};

#[derive(Parser)]
#[command(name = "abxlab-combine", about = "Combine effect tables across experiment variants")]
struct Args {
    /// Output directory of the original run
    #[arg(long)]
    original: PathBuf,

    #[arg(long)]
    ratings_matched: PathBuf,

    #[arg(long)]
    ratings_prices_matched: PathBuf,

    #[arg(long)]
    output_dir: PathBuf,

    /// Combine AME tables instead of EMM tables
    #[arg(long)]
    ame: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    let args = Args::parse();
    init_base_path().context("failed to enter ABXLAB_BASE_PATH")?;

    let file = if args.ame { "effects_ame.json" } else { "effects_emm.json" };
    let dirs = [&args.original, &args.ratings_matched, &args.ratings_prices_matched];
    let mut loaded: Vec<(Experiment, MarginalEffects)> = Vec::with_capacity(dirs.len());
    for (experiment, dir) in Experiment::ALL.into_iter().zip(dirs) {
        let path = dir.join(file);
        let effects: MarginalEffects =
            read_effects_json(&path).with_context(|| format!("cannot read {}", path.display()))?;
        info!(experiment = experiment.label(), path = %path.display(), "loaded effects");
        loaded.push((experiment, effects));
    }

    let inputs: Vec<(Experiment, &MarginalEffects)> = loaded.iter().map(|(x, e)| (*x, e)).collect();
    let tables = combine(&inputs);

    std::fs::create_dir_all(&args.output_dir)
        .with_context(|| format!("cannot create {}", args.output_dir.display()))?;
    let method = if args.ame { "ame" } else { "emm" };
    write_combined_csv(args.output_dir.join(format!("{method}_main_combined.csv")), &tables.main)?;
    write_combined_csv(args.output_dir.join(format!("{method}_category_combined.csv")), &tables.category)?;
    write_combined_csv(args.output_dir.join(format!("{method}_text_combined.csv")), &tables.text)?;
    Ok(())
}
