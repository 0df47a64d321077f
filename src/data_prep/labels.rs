//! Categorical label normalisation: nudge text, model display names,
//! trial ids and user profiles.

use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

use crate::constants::*;
use crate::types::UserProfile;

/// Transliterate to plain ASCII-compatible text so that encoding variants of
/// the same nudge (curly quotes, non-breaking spaces, accented letters)
/// collapse onto one level.
pub fn transliterate(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.nfkd() {
        if is_combining_mark(c) {
            continue;
        }
        match c {
            '\u{2018}' | '\u{2019}' | '\u{201A}' | '\u{2032}' => out.push('\''),
            '\u{201C}' | '\u{201D}' | '\u{201E}' | '\u{2033}' => out.push('"'),
            '\u{2010}'..='\u{2015}' | '\u{2212}' => out.push('-'),
            '\u{2026}' => out.push_str("..."),
            c if c.is_whitespace() => {
                if !out.ends_with(' ') {
                    out.push(' ');
                }
            }
            c => out.push(c),
        }
    }
    out.trim().to_string()
}

/// Exact-string membership in the negative-nudge blacklist.
pub fn is_negative_nudge(text: &str) -> bool {
    NEGATIVE_NUDGES.contains(&text)
}

/// Canonical label for a (transliterated) nudge text.
///
/// Long-form phrasings are collapsed by case-insensitive substring match;
/// negative nudges then get [`NEGATIVE_NUDGE_MARKER`] appended.
pub fn nudge_label(text: &str, negative: bool) -> String {
    let lowered = text.to_lowercase();
    let base = NUDGE_CONSOLIDATIONS
        .iter()
        .find(|(needle, _)| lowered.contains(needle))
        .map(|(_, label)| label.to_string())
        .unwrap_or_else(|| text.to_string());
    if negative {
        format!("{}{}", base, NEGATIVE_NUDGE_MARKER)
    } else {
        base
    }
}

/// Display name for a model-family identifier; unmapped values pass through.
pub fn model_display_name(model_family: &str) -> String {
    MODEL_DISPLAY_NAMES
        .iter()
        .find(|(id, _)| *id == model_family)
        .map(|(_, label)| label.to_string())
        .unwrap_or_else(|| model_family.to_string())
}

/// `"exp123"` → 123. Identifiers without the prefix are parsed as-is.
pub fn parse_trial_id(experiment_id: &str) -> Option<i64> {
    let trimmed = experiment_id.trim();
    let digits = trimmed.strip_prefix(TRIAL_ID_PREFIX).unwrap_or(trimmed);
    digits.parse().ok()
}

/// Profile covariates for a user-preference sentence, `None` when unknown.
pub fn user_profile(preference: Option<&str>) -> Option<UserProfile> {
    let preference = transliterate(preference?);
    USER_PROFILES
        .iter()
        .find(|(text, _, _)| *text == preference)
        .map(|(_, variable, sensitivity)| UserProfile {
            variable: variable.to_string(),
            sensitivity: sensitivity.to_string(),
        })
}
