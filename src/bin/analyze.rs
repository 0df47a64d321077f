//! Analyze one experiment variant and write its tables.
//!
//! Usage:
//!   abxlab-analyze --input data/original.csv --output-dir results/original
//!   abxlab-analyze --input data/profiles.csv --output-dir results/profiles --variant profile
//!   abxlab-analyze --input data/original.csv --output-dir results/original --ame --seed 7

use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use tracing::info;
use tracing_subscriber::EnvFilter;

use abxlab::constants::{AME_SAMPLE_SEED, AME_SAMPLE_TARGET, MAX_GRID_CELLS};
use abxlab::data_prep::{load_raw_records, prepare, prepare_independent, summarize_trials, MalformedRowPolicy};
use abxlab::env_config::{init_base_path, init_rayon_threads_lenient, EngineConfig};
use abxlab::marginals::{EffectEstimate, MarginalEffectsEngine};
use abxlab::models::{fit, fit_independent, fit_profile, FittedModel};
use abxlab::output::{
    write_coefficients_csv, write_effects_csv, write_effects_json, write_trial_summaries_csv,
};
use abxlab::types::RawTrialRecord;

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Variant {
    Main,
    Profile,
    Independent,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Malformed {
    Drop,
    Abort,
}

#[derive(Parser)]
#[command(name = "abxlab-analyze", about = "Fit choice models and compute marginal effects for one experiment")]
struct Args {
    /// Raw trial CSV exported by the harness
    #[arg(long)]
    input: PathBuf,

    /// Directory for the output tables (created if missing)
    #[arg(long)]
    output_dir: PathBuf,

    /// Force the rating-free formulas
    #[arg(long)]
    drop_rating: bool,

    #[arg(long, value_enum, default_value_t = Variant::Main)]
    variant: Variant,

    /// Average marginal effects on a stratified subsample instead of EMM contrasts
    #[arg(long)]
    ame: bool,

    #[arg(long, default_value_t = AME_SAMPLE_TARGET)]
    sample_target: usize,

    #[arg(long, default_value_t = AME_SAMPLE_SEED)]
    seed: u64,

    /// Largest EMM reference grid
    #[arg(long, default_value_t = MAX_GRID_CELLS)]
    max_grid_cells: usize,

    /// Records with unparseable price/rating lists (independent variant)
    #[arg(long, value_enum, default_value_t = Malformed::Abort)]
    malformed: Malformed,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    let args = Args::parse();
    init_base_path().context("failed to enter ABXLAB_BASE_PATH")?;
    init_rayon_threads_lenient();

    let t0 = Instant::now();
    std::fs::create_dir_all(&args.output_dir)
        .with_context(|| format!("cannot create {}", args.output_dir.display()))?;
    let records = load_raw_records(&args.input)
        .with_context(|| format!("cannot load {}", args.input.display()))?;

    let config = EngineConfig {
        ame_sample_target: args.sample_target,
        sample_seed: args.seed,
        max_grid_cells: args.max_grid_cells,
    };

    match args.variant {
        Variant::Main => run_main(&args, &records, config)?,
        Variant::Profile => run_profile(&args, &records, config)?,
        Variant::Independent => run_independent(&args, &records)?,
    }

    info!(elapsed_s = t0.elapsed().as_secs_f64(), "analysis finished");
    Ok(())
}

fn out(args: &Args, name: &str) -> PathBuf {
    args.output_dir.join(name)
}

fn run_main(args: &Args, records: &[RawTrialRecord], config: EngineConfig) -> Result<()> {
    let panel = prepare(records, args.drop_rating)?;
    let fitted = fit(&panel, args.drop_rating).context("model fit failed")?;
    log_fit("main", &fitted.main_model);
    log_fit("nudge", &fitted.nudge_model);
    write_coefficients_csv(out(args, "coefficients_main.csv"), &fitted.main_model.coefficient_table())?;
    write_coefficients_csv(out(args, "coefficients_nudge.csv"), &fitted.nudge_model.coefficient_table())?;

    let engine = MarginalEffectsEngine::new(config);
    info!(config = ?engine.config(), ame = args.ame, "computing marginal effects");
    let (effects, prefix) = if args.ame {
        (engine.compute_ame(&fitted, &panel)?, "ame")
    } else {
        (engine.compute_emm(&fitted, &panel)?, "emm")
    };
    write_effects_json(out(args, &format!("effects_{prefix}.json")), &effects)?;
    write_family(args, prefix, "main", &effects.main)?;
    write_family(args, prefix, "category", &effects.category)?;
    write_family(args, prefix, "text", &effects.text)?;
    write_family(args, prefix, "text_aggregated", &effects.text_aggregated)?;
    Ok(())
}

fn run_profile(args: &Args, records: &[RawTrialRecord], config: EngineConfig) -> Result<()> {
    let panel = prepare(records, args.drop_rating)?;
    let fitted = fit_profile(&panel, args.drop_rating).context("profile model fit failed")?;
    log_fit("profile_no_nudge", &fitted.no_nudge_model);
    log_fit("profile_nudge", &fitted.nudge_model);
    write_coefficients_csv(
        out(args, "coefficients_profile_no_nudge.csv"),
        &fitted.no_nudge_model.coefficient_table(),
    )?;
    write_coefficients_csv(
        out(args, "coefficients_profile_nudge.csv"),
        &fitted.nudge_model.coefficient_table(),
    )?;
    let engine = MarginalEffectsEngine::new(config);
    info!(config = ?engine.config(), "computing profile effects");
    let effects = engine.compute_profile_emm(&fitted)?;
    write_effects_json(out(args, "effects_profile.json"), &effects)?;
    write_family(args, "emm", "profile_no_nudge", &effects.no_nudge)?;
    write_family(args, "emm", "profile_nudge", &effects.nudge)?;
    Ok(())
}

fn run_independent(args: &Args, records: &[RawTrialRecord]) -> Result<()> {
    let policy = match args.malformed {
        Malformed::Drop => MalformedRowPolicy::Drop,
        Malformed::Abort => MalformedRowPolicy::Abort,
    };
    let priced = prepare_independent(records, policy)?;
    let summaries = summarize_trials(&priced);
    write_trial_summaries_csv(out(args, "trial_summaries.csv"), &summaries)?;
    let fitted = fit_independent(&summaries).context("independent model fit failed")?;
    log_fit("cheaper", &fitted.cheaper);
    log_fit("rating", &fitted.rating);
    write_coefficients_csv(out(args, "coefficients_cheaper.csv"), &fitted.cheaper.coefficient_table())?;
    write_coefficients_csv(out(args, "coefficients_rating.csv"), &fitted.rating.coefficient_table())?;
    Ok(())
}

fn log_fit(name: &str, model: &FittedModel) {
    info!(
        model = name,
        n_obs = model.n_obs,
        n_dropped = model.n_dropped,
        aliased = model.num_aliased(),
        r2_within = model.r2_within,
        "fitted"
    );
}

fn write_family(args: &Args, prefix: &str, family: &str, rows: &[EffectEstimate]) -> Result<()> {
    write_effects_csv(out(args, &format!("{prefix}_{family}.csv")), rows)?;
    Ok(())
}
