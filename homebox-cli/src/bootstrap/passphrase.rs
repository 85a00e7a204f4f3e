//! Diceware passphrases from the system word list

use rand::rngs::OsRng;
use rand::seq::SliceRandom;
use snafu::{OptionExt, ResultExt};
use std::collections::BTreeSet;
use std::fmt;
use std::fs;
use std::path::Path;
use tracing::debug;

use crate::error::{EmptyDictionarySnafu, ReadWordListSnafu, Result};

pub const SEPARATOR: &str = "-";

/// Sorted, deduplicated lowercase alphabetic words within a length bound.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Dictionary {
    words: Vec<String>,
}

impl Dictionary {
    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    pub fn contains(&self, word: &str) -> bool {
        self.words.binary_search_by(|w| w.as_str().cmp(word)).is_ok()
    }

    pub fn words(&self) -> &[String] {
        &self.words
    }
}

/// Keep words of `min_len..=max_len` characters that are purely alphabetic.
/// Bounds apply to the lowercased form, which can differ in length.
pub fn build_dictionary<'a, I>(raw_words: I, min_len: usize, max_len: usize) -> Dictionary
where
    I: IntoIterator<Item = &'a str>,
{
    let words: BTreeSet<String> = raw_words
        .into_iter()
        .map(|word| word.trim().to_lowercase())
        .filter(|word| {
            let len = word.chars().count();
            (min_len..=max_len).contains(&len) && word.chars().all(char::is_alphabetic)
        })
        .collect();

    Dictionary {
        words: words.into_iter().collect(),
    }
}

/// Read a newline separated word list. Invalid UTF-8 is replaced, which
/// drops those words at the alphabetic check.
pub fn load_dictionary(path: &Path, min_len: usize, max_len: usize) -> Result<Dictionary> {
    let raw = fs::read(path).context(ReadWordListSnafu { path })?;
    let text = String::from_utf8_lossy(&raw);
    debug!("System dictionary size: {}", text.lines().count());

    let dictionary = build_dictionary(text.lines(), min_len, max_len);
    debug!("Effective dictionary size: {}", dictionary.len());
    Ok(dictionary)
}

/// Words joined with `-`; kept out of `Debug` output.
#[derive(Clone, PartialEq, Eq)]
pub struct Passphrase(String);

impl Passphrase {
    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn words(&self) -> impl Iterator<Item = &str> {
        self.0.split(SEPARATOR)
    }
}

impl fmt::Debug for Passphrase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Passphrase({} words)", self.words().count())
    }
}

/// Draw `word_count` words independently, with replacement, from the OS
/// entropy source.
pub fn generate(dictionary: &Dictionary, word_count: usize) -> Result<Passphrase> {
    let mut rng = OsRng;
    let words = (0..word_count)
        .map(|_| dictionary.words.choose(&mut rng).map(String::as_str))
        .collect::<Option<Vec<&str>>>()
        .context(EmptyDictionarySnafu)?;

    // a zero-word passphrase would encrypt keys with an empty string
    if words.is_empty() {
        return EmptyDictionarySnafu.fail();
    }

    Ok(Passphrase(words.join(SEPARATOR)))
}
