//! Fixed lookup tables and literals of the experimental design.
//!
//! Everything here is data, not logic: the model-family display table, the
//! negative-nudge blacklist, the long-form nudge consolidations, the
//! user-preference profile table, and the numeric defaults used by the
//! marginal-effects engine.

/// Literal prefix of the harness experiment identifier (`"exp123"` → trial 123).
pub const TRIAL_ID_PREFIX: &str = "exp";

/// The textual truthy value of the `nudge_trial` column. Source data is text,
/// so the comparison is against this literal, not a parsed boolean.
pub const NUDGE_TRIAL_TRUE: &str = "True";

/// Internal model-family identifier of human-baseline rows.
pub const HUMAN_MODEL_FAMILY: &str = "human";

/// Reserved display name for human-baseline rows.
pub const HUMAN_MODEL_LABEL: &str = "Human";

/// Canonical label for trials that carry no nudge text at all.
pub const NO_NUDGE_TEXT: &str = "None";

/// Marker appended to negative nudge labels so they stay distinguishable
/// after consolidation.
pub const NEGATIVE_NUDGE_MARKER: &str = " (negative)";

/// Nudge texts whose framing pushes choice away from the nudged option.
/// Matched by exact string after transliteration.
pub const NEGATIVE_NUDGES: [&str; 2] = [
    "Final sale: no returns or exchanges",
    "Outdated version",
];

/// Long-form nudge phrasings collapsed into short canonical labels by
/// substring match: `(needle, label)`.
pub const NUDGE_CONSOLIDATIONS: [(&str, &str); 2] = [
    ("recommended by our product experts", "Expert recommendation"),
    ("customers who viewed this item also bought", "Social proof"),
];

/// Model-family identifier → display name. Unmapped identifiers pass through.
pub const MODEL_DISPLAY_NAMES: [(&str, &str); 22] = [
    (HUMAN_MODEL_FAMILY, HUMAN_MODEL_LABEL),
    ("gpt-4o", "GPT-4o"),
    ("gpt-4o-mini", "GPT-4o mini"),
    ("gpt-4.1", "GPT-4.1"),
    ("gpt-4.1-mini", "GPT-4.1 mini"),
    ("gpt-4.1-nano", "GPT-4.1 nano"),
    ("gpt-5", "GPT-5"),
    ("gpt-5-mini", "GPT-5 mini"),
    ("o3", "o3"),
    ("o4-mini", "o4-mini"),
    ("claude-3-5-haiku-20241022", "Claude 3.5 Haiku"),
    ("claude-3-5-sonnet-20241022", "Claude 3.5 Sonnet"),
    ("claude-3-7-sonnet-20250219", "Claude 3.7 Sonnet"),
    ("claude-sonnet-4-20250514", "Claude Sonnet 4"),
    ("claude-opus-4-20250514", "Claude Opus 4"),
    ("gemini-2.0-flash", "Gemini 2.0 Flash"),
    ("gemini-2.5-flash", "Gemini 2.5 Flash"),
    ("gemini-2.5-pro", "Gemini 2.5 Pro"),
    ("meta-llama/llama-3.3-70b-instruct", "Llama 3.3 70B"),
    ("meta-llama/llama-4-maverick", "Llama 4 Maverick"),
    ("deepseek/deepseek-chat-v3", "DeepSeek V3"),
    ("qwen/qwen-2.5-72b-instruct", "Qwen 2.5 72B"),
];

/// User-preference sentence → (profile variable, profile sensitivity).
pub const USER_PROFILES: [(&str, &str, &str); 6] = [
    ("The user highly values recommendations from experts.", "experts", "high"),
    ("The user doesn't trust recommendations from experts.", "experts", "low"),
    ("The user is on a tight budget.", "price", "high"),
    ("The user is willing to pay more for a better product.", "price", "low"),
    ("The user values highly-rated products.", "rating", "high"),
    ("The user doesn't put much stock in what other customers think.", "rating", "low"),
];

/// Default AME subsample size (rows).
pub const AME_SAMPLE_TARGET: usize = 5000;

/// Default seed for the AME stratified subsample.
pub const AME_SAMPLE_SEED: u64 = 42;

/// Default reference-grid size limit for the EMM engine.
pub const MAX_GRID_CELLS: usize = 1_000_000;

/// Relative pivot tolerance below which a design column is declared aliased.
pub const COLLINEARITY_TOL: f64 = 1e-10;
