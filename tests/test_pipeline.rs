//! End-to-end tests: raw records → panel → fitted models → effect tables.
//!
//! The synthetic data set has three models (one of them the human
//! baseline), three categories with nudge trials, one category without any,
//! and two nudge texts, so both cluster dimensions have several groups.

use abxlab::combine::{combine, Experiment, OutcomeLabel};
use abxlab::data_prep::records::read_raw_records;
use abxlab::data_prep::{prepare, prepare_independent, summarize_trials, MalformedRowPolicy};
use abxlab::env_config::EngineConfig;
use abxlab::marginals::adjust::{benjamini_hochberg, two_sided_p};
use abxlab::marginals::{EffectEstimate, Family, MarginalEffectsEngine};
use abxlab::models::{fit, fit_independent, Var};
use abxlab::types::RawTrialRecord;

const MODELS: [&str; 3] = ["gpt-4o", "o3", "human"];
const CATEGORIES: [&str; 3] = ["Lamps", "Toys", "Headphones"];
const TEXTS: [&str; 2] = ["Bestseller", "Only 2 left in stock"];

/// Deterministic noise in `0..100`.
fn noise(t: usize, m: usize, salt: u64) -> u64 {
    let mut x = (t as u64 + 1).wrapping_mul(0x9E37_79B9_7F4A_7C15) ^ (m as u64 + salt).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    x ^= x >> 31;
    x = x.wrapping_mul(0x94D0_49BB_1331_11EB);
    x ^= x >> 29;
    x % 100
}

fn base_record(id: usize, model: &str, category: &str) -> RawTrialRecord {
    RawTrialRecord {
        experiment_id: format!("exp{id}"),
        model_family: model.to_string(),
        category: category.to_string(),
        nudge_text: None,
        nudge_trial: "False".to_string(),
        nudged_idx: None,
        chose_idx: None,
        cheaper_idx: None,
        better_rated_idx: None,
        avg_price: Some(30.0),
        prices: None,
        ratings: None,
        user_preference: None,
        coverage_type: None,
    }
}

fn synthetic_records(models: &[&str], with_rating: bool) -> Vec<RawTrialRecord> {
    let mut out = Vec::new();
    let mut id = 0;
    for (m, model) in models.iter().enumerate() {
        for t in 0..480 {
            let cheaper = (t % 2) as i64;
            let nudged = ((t / 2) % 2) as i64;
            let rated = if with_rating { ((t / 4) % 2) as i64 } else { 0 };
            let is_nudge = (t / 8) % 2 == 1;

            let mut r = base_record(id, model, CATEGORIES[(t / 16) % 3]);
            r.cheaper_idx = Some(cheaper);
            r.better_rated_idx = Some(rated);
            if is_nudge {
                r.nudge_trial = "True".to_string();
                r.nudge_text = Some(TEXTS[(t / 3) % 2].to_string());
                r.nudged_idx = Some(nudged);
            }
            let chose = if is_nudge && noise(t, m, 1) < 30 {
                nudged
            } else if noise(t, m, 2) < 60 + 10 * m as u64 {
                cheaper
            } else {
                1 - cheaper
            };
            r.chose_idx = Some(chose);
            out.push(r);
            id += 1;
        }
        // a category that never sees a nudge
        for t in 0..40 {
            let mut r = base_record(id, model, "Socks");
            r.cheaper_idx = Some((t % 2) as i64);
            r.better_rated_idx = Some(0);
            r.chose_idx = Some(if noise(t, m, 3) < 70 { (t % 2) as i64 } else { 1 - (t % 2) as i64 });
            out.push(r);
            id += 1;
        }
    }
    out
}

fn family_terms(rows: &[EffectEstimate]) -> Vec<Var> {
    let mut terms: Vec<Var> = rows.iter().map(|r| r.term).collect();
    terms.sort();
    terms.dedup();
    terms
}

#[test]
fn end_to_end_scenario_single_trial() {
    let mut r = base_record(1, "gpt-4o", "Lamps");
    r.chose_idx = Some(1);
    r.cheaper_idx = Some(0);
    r.better_rated_idx = Some(1);
    // a second trial with the higher-rated option at position 0 keeps the
    // rating column in the panel
    let mut other = base_record(2, "gpt-4o", "Lamps");
    other.better_rated_idx = Some(0);
    let panel = prepare(&[r, other], false).unwrap();
    assert!(panel.has_rating);
    assert_eq!(panel.len(), 4);

    let (p0, p1) = (&panel.rows[0], &panel.rows[1]);
    assert_eq!(p0.product_position_idx, 0);
    assert_eq!((p0.chose_product, p0.product_is_cheaper, p0.product_is_higher_rated), (0, 1, Some(0)));
    assert_eq!(p1.product_position_idx, 1);
    assert_eq!((p1.chose_product, p1.product_is_cheaper, p1.product_is_higher_rated), (1, 0, Some(1)));
}

#[test]
fn rating_index_fixed_at_one_is_dropped() {
    // the higher-rated option always sits at position 1, so its indicator
    // would be a copy of the position
    let records: Vec<RawTrialRecord> = synthetic_records(&MODELS[..2], false)
        .into_iter()
        .map(|mut r| {
            r.better_rated_idx = Some(1);
            r
        })
        .collect();
    let panel = prepare(&records, false).unwrap();
    assert!(!panel.has_rating);

    let fitted = fit(&panel, false).unwrap();
    assert!(!fitted.has_rating);
    let position = fitted.main_model.design.term_columns(&[Var::Position]);
    assert!(!position.is_empty());
    assert!(position.iter().all(|&c| fitted.main_model.kept[c].is_some()));
    let effects = MarginalEffectsEngine::new(EngineConfig::default())
        .compute_emm(&fitted, &panel)
        .unwrap();
    assert!(effects.main.iter().all(|r| r.term != Var::HigherRated));
}

#[test]
fn negative_nudge_points_at_the_other_option() {
    let mut r = base_record(3, "o3", "Lamps");
    r.nudge_trial = "True".to_string();
    r.nudge_text = Some("Final sale: no returns or exchanges".to_string());
    r.nudged_idx = Some(0);
    r.chose_idx = Some(0);
    r.cheaper_idx = Some(0);
    let panel = prepare(&[r], false).unwrap();
    let pos1 = panel.rows.iter().find(|r| r.product_position_idx == 1).unwrap();
    let pos0 = panel.rows.iter().find(|r| r.product_position_idx == 0).unwrap();
    assert_eq!(pos1.product_is_nudged, 1);
    assert_eq!(pos0.product_is_nudged, 0);
    assert!(pos1.negative_nudge);
    assert!(pos1.nudge_text.ends_with("(negative)"));
}

#[test]
fn human_label_from_csv() {
    let data = "\
experiment_id,model_family,category,nudge_text,nudge_trial,nudged_idx,chose_idx,cheaper_idx,better_rated_idx,avg_price
exp1,human,Lamps,,False,,1.0,0,1,20.5
exp2,gpt-4o,Lamps,Bestseller,True,1,0,0,,31
";
    let records = read_raw_records(csv::Reader::from_reader(data.as_bytes())).unwrap();
    let panel = prepare(&records, false).unwrap();
    assert_eq!(panel.rows[0].model, "Human");
    assert!(panel.rows[0].is_human());
    assert_eq!(panel.rows[2].model, "GPT-4o");
    assert_eq!(panel.rows[0].nudge_text, "None");
    assert_eq!(panel.rows[3].product_is_nudged, 1);
}

#[test]
fn emm_pipeline_produces_every_family() {
    let records = synthetic_records(&MODELS, true);
    let panel = prepare(&records, false).unwrap();
    assert!(panel.has_rating);

    let fitted = fit(&panel, false).unwrap();
    assert!(fitted.has_rating);
    assert_eq!(fitted.main_model.n_dropped, 0);
    assert!(fitted.main_model.clusters.iter().all(|(_, g)| *g > 1));

    let engine = MarginalEffectsEngine::new(EngineConfig::default());
    let effects = engine.compute_emm(&fitted, &panel).unwrap();

    // main: every model, including the human baseline, for every treatment
    let mut models: Vec<&str> = effects.main.iter().filter_map(|r| r.model.as_deref()).collect();
    models.sort();
    models.dedup();
    assert_eq!(models, vec!["GPT-4o", "Human", "o3"]);
    assert_eq!(family_terms(&effects.main), vec![Var::Cheaper, Var::Nudged, Var::HigherRated]);
    assert!(effects.main.iter().all(|r| r.panel == Family::Main && r.std_error > 0.0));

    // category and text use the refit without the human baseline
    let mut categories: Vec<&str> = effects.category.iter().filter_map(|r| r.category.as_deref()).collect();
    categories.sort();
    categories.dedup();
    assert_eq!(categories, vec!["Headphones", "Lamps", "Toys"]);
    assert!(effects.category.iter().all(|r| r.model.is_none()));
    assert!(effects.text.iter().all(|r| r.nudge_text.is_some() && r.model.is_some()));
    assert!(effects.text.iter().any(|r| r.model.as_deref() == Some("Human")));
    assert!(effects.text_aggregated.iter().all(|r| r.model.is_none()));
    assert_eq!(effects.text_aggregated.len(), TEXTS.len() * 3);

    // a subject choosing the cheaper option most of the time shows a
    // positive cheaper effect
    let o3_cheaper = effects
        .main
        .iter()
        .find(|r| r.model.as_deref() == Some("o3") && r.term == Var::Cheaper)
        .unwrap();
    assert!(o3_cheaper.estimate > 0.0, "{o3_cheaper:?}");
}

#[test]
fn aggregate_slices_ignore_human_rows() {
    let engine = MarginalEffectsEngine::new(EngineConfig::default());

    let with_human = prepare(&synthetic_records(&MODELS, true), false).unwrap();
    let effects = engine.compute_emm(&fit(&with_human, false).unwrap(), &with_human).unwrap();

    let machine_records: Vec<RawTrialRecord> = synthetic_records(&MODELS, true)
        .into_iter()
        .filter(|r| r.model_family != "human")
        .collect();
    let machine = prepare(&machine_records, false).unwrap();
    let machine_effects = engine.compute_emm(&fit(&machine, false).unwrap(), &machine).unwrap();

    assert_eq!(effects.category.len(), machine_effects.category.len());
    for (a, b) in effects.category.iter().zip(&machine_effects.category) {
        assert_eq!((a.category.as_deref(), a.term), (b.category.as_deref(), b.term));
        assert!((a.estimate - b.estimate).abs() < 1e-9);
        assert!((a.std_error - b.std_error).abs() < 1e-9);
    }
}

#[test]
fn bh_is_applied_within_each_family() {
    let panel = prepare(&synthetic_records(&MODELS, true), false).unwrap();
    let fitted = fit(&panel, false).unwrap();
    let effects = MarginalEffectsEngine::new(EngineConfig::default())
        .compute_emm(&fitted, &panel)
        .unwrap();

    for family in [&effects.main, &effects.category, &effects.text, &effects.text_aggregated] {
        let raw: Vec<f64> = family.iter().map(|r| two_sided_p(r.statistic)).collect();
        let adjusted = benjamini_hochberg(&raw);
        for (row, expected) in family.iter().zip(adjusted) {
            assert!((row.p_value - expected).abs() < 1e-12, "{row:?}");
        }
    }
}

#[test]
fn uninformative_ratings_never_reach_effect_terms() {
    let records = synthetic_records(&MODELS[..2], false);
    assert!(records.iter().all(|r| r.better_rated_idx == Some(0)));
    let panel = prepare(&records, false).unwrap();
    assert!(!panel.has_rating);
    assert!(panel.rows.iter().all(|r| r.product_is_higher_rated.is_none()));

    let fitted = fit(&panel, false).unwrap();
    let effects = MarginalEffectsEngine::new(EngineConfig::default())
        .compute_emm(&fitted, &panel)
        .unwrap();
    for family in [&effects.main, &effects.category, &effects.text, &effects.text_aggregated] {
        assert!(family.iter().all(|r| r.term != Var::HigherRated));
    }
    assert!(fitted
        .main_model
        .design
        .column_names
        .iter()
        .all(|c| !c.contains("product_is_higher_rated")));
}

#[test]
fn ame_pipeline_is_reproducible() {
    let panel = prepare(&synthetic_records(&MODELS[..2], true), false).unwrap();
    let fitted = fit(&panel, false).unwrap();
    let config = EngineConfig {
        ame_sample_target: 600,
        ..EngineConfig::default()
    };
    let engine = MarginalEffectsEngine::new(config);
    let first = engine.compute_ame(&fitted, &panel).unwrap();
    let second = engine.compute_ame(&fitted, &panel).unwrap();
    assert_eq!(first.main, second.main);
    assert!(!first.main.is_empty());
    assert_eq!(family_terms(&first.main), vec![Var::Cheaper, Var::Nudged, Var::HigherRated]);
}

#[test]
fn combined_tables_stack_variants() {
    let panel = prepare(&synthetic_records(&MODELS[..2], true), false).unwrap();
    let fitted = fit(&panel, false).unwrap();
    let effects = MarginalEffectsEngine::new(EngineConfig::default())
        .compute_emm(&fitted, &panel)
        .unwrap();
    let tables = combine(&[
        (Experiment::Original, &effects),
        (Experiment::RatingsMatched, &effects),
    ]);
    assert_eq!(tables.main.len(), 2 * effects.main.len());
    assert_eq!(tables.text.len(), 2 * effects.text_aggregated.len());
    assert_eq!(tables.main[0].experiment, Experiment::Original);
    assert_eq!(tables.main[0].outcome, OutcomeLabel::Cheaper);
    assert_eq!(tables.main.last().unwrap().experiment, Experiment::RatingsMatched);
}

#[test]
fn independent_variant_fits_both_regressions() {
    let mut records = Vec::new();
    for t in 0..300usize {
        let model = MODELS[t % 2];
        let mut r = base_record(t, model, CATEGORIES[(t / 2) % 3]);
        let low = 10.0 + (t % 17) as f64;
        let high = low * (1.1 + (t % 5) as f64 * 0.2);
        let (r_low, r_high) = (70.0 + (t % 7) as f64, 80.0 + (t % 11) as f64 * 1.5);
        let cheaper_first = t % 3 != 0;
        let prices = if cheaper_first { [low, high] } else { [high, low] };
        r.prices = Some(format!("[{}, {}]", prices[0], prices[1]));
        r.ratings = Some(format!("[{r_low}, {r_high}]"));
        r.cheaper_idx = Some(if cheaper_first { 0 } else { 1 });
        r.chose_idx = Some(if noise(t, 0, 4) < 65 { r.cheaper_idx.unwrap_or(0) } else { 1 - r.cheaper_idx.unwrap_or(0) });
        records.push(r);
    }
    let mut malformed = base_record(999, "o3", "Lamps");
    malformed.prices = Some("not a list".to_string());
    malformed.ratings = Some("[1, 2]".to_string());
    records.push(malformed);

    assert!(prepare_independent(&records, MalformedRowPolicy::Abort).is_err());
    let priced = prepare_independent(&records, MalformedRowPolicy::Drop).unwrap();
    assert_eq!(priced.len(), 600);

    let summaries = summarize_trials(&priced);
    assert_eq!(summaries.len(), 300);
    let fitted = fit_independent(&summaries).unwrap();
    assert_eq!(fitted.cheaper.n_obs, 300);
    assert_eq!(fitted.rating.n_obs, 300);
    let table = fitted.rating.coefficient_table();
    assert_eq!(table[0].term, "(Intercept)");
    assert!(table.iter().any(|c| c.term == "rating_diff" && c.std_error.is_some()));
}
