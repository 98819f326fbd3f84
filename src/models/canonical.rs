//! Canonical model identification
//!
//! Catalog and meter names arrive as free text ("gpt 4o 0806 Inp regnl",
//! "GPT-4o-mini-0718-Outp-glbl", "o1 mini input"). They are normalised into
//! dash-separated tokens and matched against an ordered rule table. The first
//! rule whose predicate accepts the tokens decides the model; rules further
//! down are never consulted. A variant (`-mini`, `-nano`) must therefore be
//! listed before its base family, otherwise the base rule would claim it.
//! Text that no rule accepts maps to `None` and is discarded by callers.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The fixed set of model families a dashboard row can represent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CanonicalModel {
    #[serde(rename = "gpt-4o")]
    Gpt4o,
    #[serde(rename = "gpt-4o-mini")]
    Gpt4oMini,
    #[serde(rename = "gpt-4.1")]
    Gpt41,
    #[serde(rename = "gpt-4.1-mini")]
    Gpt41Mini,
    #[serde(rename = "gpt-4.1-nano")]
    Gpt41Nano,
    #[serde(rename = "o1")]
    O1,
    #[serde(rename = "o1-mini")]
    O1Mini,
    #[serde(rename = "o3-mini")]
    O3Mini,
    #[serde(rename = "gpt-35-turbo")]
    Gpt35Turbo,
}

impl CanonicalModel {
    pub const ALL: [CanonicalModel; 9] = [
        CanonicalModel::Gpt4o,
        CanonicalModel::Gpt4oMini,
        CanonicalModel::Gpt41,
        CanonicalModel::Gpt41Mini,
        CanonicalModel::Gpt41Nano,
        CanonicalModel::O1,
        CanonicalModel::O1Mini,
        CanonicalModel::O3Mini,
        CanonicalModel::Gpt35Turbo,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CanonicalModel::Gpt4o => "gpt-4o",
            CanonicalModel::Gpt4oMini => "gpt-4o-mini",
            CanonicalModel::Gpt41 => "gpt-4.1",
            CanonicalModel::Gpt41Mini => "gpt-4.1-mini",
            CanonicalModel::Gpt41Nano => "gpt-4.1-nano",
            CanonicalModel::O1 => "o1",
            CanonicalModel::O1Mini => "o1-mini",
            CanonicalModel::O3Mini => "o3-mini",
            CanonicalModel::Gpt35Turbo => "gpt-35-turbo",
        }
    }

    /// Position in [`CanonicalModel::ALL`], used to stagger per-model series
    pub fn ordinal(&self) -> usize {
        CanonicalModel::ALL
            .iter()
            .position(|m| m == self)
            .unwrap_or_default()
    }
}

impl fmt::Display for CanonicalModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which side of a model's price a catalog entry describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Input,
    Output,
}

/// Lowercase, unify separators and split into non-empty tokens
pub fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| c.is_whitespace() || c == '-' || c == '_' || c == '/' || c == ',')
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// True when `needle` occurs as a consecutive run inside `tokens`
fn has_run(tokens: &[String], needle: &[&str]) -> bool {
    if needle.is_empty() || needle.len() > tokens.len() {
        return false;
    }
    tokens
        .windows(needle.len())
        .any(|w| w.iter().zip(needle).all(|(t, n)| t == n))
}

fn has_any(tokens: &[String], candidates: &[&str]) -> bool {
    tokens.iter().any(|t| candidates.contains(&t.as_str()))
}

type Predicate = fn(&[String]) -> bool;

fn is_gpt4o_mini(t: &[String]) -> bool {
    has_run(t, &["gpt", "4o", "mini"]) || has_run(t, &["gpt4o", "mini"])
}

fn is_gpt4o(t: &[String]) -> bool {
    has_run(t, &["gpt", "4o"]) || has_any(t, &["gpt4o"])
}

fn is_gpt41_mini(t: &[String]) -> bool {
    has_run(t, &["gpt", "4.1", "mini"])
}

fn is_gpt41_nano(t: &[String]) -> bool {
    has_run(t, &["gpt", "4.1", "nano"])
}

fn is_gpt41(t: &[String]) -> bool {
    has_run(t, &["gpt", "4.1"])
}

fn is_o1_mini(t: &[String]) -> bool {
    has_run(t, &["o1", "mini"])
}

fn is_o3_mini(t: &[String]) -> bool {
    has_run(t, &["o3", "mini"])
}

fn is_o1(t: &[String]) -> bool {
    has_any(t, &["o1"])
}

fn is_gpt35_turbo(t: &[String]) -> bool {
    has_run(t, &["gpt", "35", "turbo"]) || has_run(t, &["gpt", "3.5", "turbo"])
}

/// Ordered model rules. Evaluation stops at the first match.
const MODEL_RULES: &[(Predicate, CanonicalModel)] = &[
    (is_gpt4o_mini, CanonicalModel::Gpt4oMini),
    (is_gpt4o, CanonicalModel::Gpt4o),
    (is_gpt41_mini, CanonicalModel::Gpt41Mini),
    (is_gpt41_nano, CanonicalModel::Gpt41Nano),
    (is_gpt41, CanonicalModel::Gpt41),
    (is_o1_mini, CanonicalModel::O1Mini),
    (is_o3_mini, CanonicalModel::O3Mini),
    (is_o1, CanonicalModel::O1),
    (is_gpt35_turbo, CanonicalModel::Gpt35Turbo),
];

/// Tiers priced differently from the plain text input/output rate;
/// excluded from pricing so they never overwrite the standard price of a
/// model. Audio and realtime meters share the text model's family name.
const EXCLUDED_TIER_TOKENS: &[&str] = &[
    "cached", "cchd", "cache", "batch", "ft", "finetune", "training", "hosting",
    "aud", "audio", "realtime", "rt", "rtm", "transcribe", "transcription", "tts",
    "stt", "speech",
];

const INPUT_TOKENS: &[&str] = &["input", "inp", "prompt", "in"];
const OUTPUT_TOKENS: &[&str] = &["output", "outp", "completion", "out"];

/// Map free text to a canonical model, or `None` when no rule matches
pub fn identify_model(text: &str) -> Option<CanonicalModel> {
    let tokens = tokenize(text);
    identify_tokens(&tokens)
}

fn identify_tokens(tokens: &[String]) -> Option<CanonicalModel> {
    MODEL_RULES
        .iter()
        .find(|(predicate, _)| predicate(tokens))
        .map(|(_, model)| *model)
}

/// Classify a price catalog entry into (model, direction)
///
/// Excluded tiers are rejected before direction matching. An entry naming
/// both directions (or neither) is ambiguous and rejected.
pub fn classify_price_entry(text: &str) -> Option<(CanonicalModel, Direction)> {
    let tokens = tokenize(text);
    let model = identify_tokens(&tokens)?;

    if has_any(&tokens, EXCLUDED_TIER_TOKENS) {
        return None;
    }

    let is_input = has_any(&tokens, INPUT_TOKENS);
    let is_output = has_any(&tokens, OUTPUT_TOKENS);

    match (is_input, is_output) {
        (true, false) => Some((model, Direction::Input)),
        (false, true) => Some((model, Direction::Output)),
        _ => None,
    }
}
