//! Output tables for the reporting layer.
//!
//! CSV columns follow the R broom conventions (`std.error`, `p.value`) so
//! existing plotting scripts read them unchanged. Effect sets are also
//! written as JSON, which is what the combiner reads back.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::info;

use crate::combine::CombinedEstimate;
use crate::error::Result;
use crate::marginals::EffectEstimate;
use crate::models::fit::CoefficientRow;
use crate::types::TrialSummaryRow;

fn write_csv<T: Serialize>(path: &Path, rows: &[T]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    info!(path = %path.display(), rows = rows.len(), "wrote csv");
    Ok(())
}

pub fn write_effects_csv<P: AsRef<Path>>(path: P, rows: &[EffectEstimate]) -> Result<()> {
    write_csv(path.as_ref(), rows)
}

pub fn write_coefficients_csv<P: AsRef<Path>>(path: P, rows: &[CoefficientRow]) -> Result<()> {
    write_csv(path.as_ref(), rows)
}

pub fn write_trial_summaries_csv<P: AsRef<Path>>(path: P, rows: &[TrialSummaryRow]) -> Result<()> {
    write_csv(path.as_ref(), rows)
}

pub fn write_combined_csv<P: AsRef<Path>>(path: P, rows: &[CombinedEstimate]) -> Result<()> {
    write_csv(path.as_ref(), rows)
}

/// Pretty-printed JSON of any effect set.
pub fn write_effects_json<P: AsRef<Path>, T: Serialize>(path: P, effects: &T) -> Result<()> {
    let path = path.as_ref();
    let writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(writer, effects)?;
    info!(path = %path.display(), "wrote json");
    Ok(())
}

pub fn read_effects_json<P: AsRef<Path>, T: DeserializeOwned>(path: P) -> Result<T> {
    let reader = BufReader::new(File::open(path.as_ref())?);
    Ok(serde_json::from_reader(reader)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::marginals::{Family, MarginalEffects};
    use crate::models::spec::Var;

    fn effect() -> EffectEstimate {
        EffectEstimate {
            model: Some("GPT-4o".to_string()),
            category: None,
            nudge_text: None,
            profile_variable: None,
            profile_sensitivity: None,
            term: Var::Cheaper,
            estimate: 0.12,
            std_error: 0.03,
            statistic: 4.0,
            p_value: 0.001,
            panel: Family::Main,
        }
    }

    #[test]
    fn test_effects_csv_header() {
        let path = std::env::temp_dir().join("abxlab_effects_test.csv");
        write_effects_csv(&path, &[effect()]).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        let mut lines = text.lines();
        assert_eq!(
            lines.next().unwrap(),
            "model,category,nudge_text,profile_variable,profile_sensitivity,term,estimate,std.error,statistic,p.value,panel"
        );
        assert_eq!(lines.next().unwrap(), "GPT-4o,,,,,product_is_cheaper,0.12,0.03,4.0,0.001,main");
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_effects_json_reads_back() {
        let path = std::env::temp_dir().join("abxlab_effects_test.json");
        let effects = MarginalEffects {
            main: vec![effect()],
            ..Default::default()
        };
        write_effects_json(&path, &effects).unwrap();
        let back: MarginalEffects = read_effects_json(&path).unwrap();
        assert_eq!(back.main, effects.main);
        assert!(back.category.is_empty());
        let _ = std::fs::remove_file(&path);
    }
}
