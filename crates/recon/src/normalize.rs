use std::collections::{BTreeMap, BTreeSet};

use crate::config::NormalizeConfig;

/// Space characters that are replaced with an ordinary space.
const SPACE_LIKE: [char; 6] = [
    '\u{00A0}', // no-break space
    '\u{2007}', // figure space
    '\u{202F}', // narrow no-break space
    '\u{2009}', // thin space
    '\u{3000}', // ideographic space
    '\t',
];

/// Invisible characters that are dropped outright.
const INVISIBLE: [char; 4] = ['\u{200B}', '\u{200C}', '\u{200D}', '\u{FEFF}'];

/// Canonicalizes raw catalog names before registry lookup.
///
/// Built once per run from the configured substitution tables. Never
/// rejects a name; unmatched names are the matcher's concern.
#[derive(Debug, Clone, Default)]
pub struct NameNormalizer {
    names: BTreeMap<String, String>,
    tokens: BTreeMap<String, String>,
}

impl NameNormalizer {
    pub fn new(config: &NormalizeConfig) -> Self {
        // Keys go through the same whitespace cleanup so that a table entry
        // written with a stray NBSP still matches.
        let tokens = config
            .tokens
            .iter()
            .map(|(k, v)| (clean_whitespace(k), clean_whitespace(v)))
            .filter(|(k, _)| !k.is_empty())
            .collect();
        let mut normalizer = Self { names: BTreeMap::new(), tokens };

        // Whole-name keys are compared against token-replaced names, so
        // they get the token pass too.
        normalizer.names = config
            .names
            .iter()
            .map(|(k, v)| (normalizer.replace_tokens(&clean_whitespace(k)), clean_whitespace(v)))
            .filter(|(k, _)| !k.is_empty())
            .collect();
        normalizer
    }

    pub fn normalize(&self, raw: &str) -> String {
        let replaced = self.replace_tokens(&clean_whitespace(raw));
        match self.names.get(&replaced) {
            Some(sub) => sub.clone(),
            None => replaced,
        }
    }

    fn replace_tokens(&self, cleaned: &str) -> String {
        if self.tokens.is_empty() {
            return cleaned.to_string();
        }
        let words: Vec<&str> = cleaned
            .split(' ')
            .map(|w| self.tokens.get(w).map(String::as_str).unwrap_or(w))
            .collect();
        clean_whitespace(&words.join(" "))
    }

    /// First table entry whose replacement would itself be rewritten by a
    /// second pass (`"spp." = "sp."` next to `"sp." = "sp"`). Normalizing
    /// stays idempotent only when there is none.
    pub fn unstable_entry(&self) -> Option<String> {
        if let Some((k, v)) = self.tokens.iter().find(|(_, v)| self.replace_tokens(v) != **v) {
            return Some(format!("normalize.tokens \"{k}\" = \"{v}\""));
        }
        self.names
            .iter()
            .find(|(_, v)| self.normalize(v) != **v)
            .map(|(k, v)| format!("normalize.names \"{k}\" = \"{v}\""))
    }

    /// Normalize a batch of raw names into a deduplicated, sorted list.
    /// Names that normalize to nothing are dropped.
    pub fn normalize_all<'a>(&self, raw: impl IntoIterator<Item = &'a str>) -> Vec<String> {
        raw.into_iter()
            .map(|name| self.normalize(name))
            .filter(|name| !name.is_empty())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }
}

/// Replace space-like characters, drop invisible ones, collapse runs of
/// whitespace and trim.
pub fn clean_whitespace(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut pending_space = false;
    for ch in raw.chars() {
        if INVISIBLE.contains(&ch) {
            continue;
        }
        if ch.is_whitespace() || SPACE_LIKE.contains(&ch) {
            pending_space = true;
            continue;
        }
        if pending_space && !out.is_empty() {
            out.push(' ');
        }
        pending_space = false;
        out.push(ch);
    }
    out
}

/// Make a registry-supplied text field safe for the output tables:
/// no-break spaces become ordinary spaces and tab / line breaks become
/// spaces. Interior spacing is otherwise kept as the registry sent it.
pub fn scrub_field(value: &str) -> String {
    value
        .chars()
        .map(|ch| match ch {
            '\u{00A0}' | '\u{202F}' | '\u{2007}' | '\t' | '\r' | '\n' => ' ',
            other => other,
        })
        .collect::<String>()
        .trim()
        .to_string()
}
