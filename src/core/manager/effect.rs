//! Effect-word stemming
//!
//! Queries name an effect with a word such as `Allowed` or `Denied`. The word
//! is lower-cased and mapped to the stem statements declare (`allow`,
//! `deny`). Words without an entry stem to themselves.

use std::collections::HashMap;

/// Lower-cased word → stem table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EffectStemmer {
    stems: HashMap<String, String>,
}

impl EffectStemmer {
    /// Table seeded with `allowed → allow` and `denied → deny`
    pub fn new() -> Self {
        let mut stemmer = EffectStemmer {
            stems: HashMap::new(),
        };
        stemmer.register("allowed", "allow");
        stemmer.register("denied", "deny");
        stemmer
    }

    /// Built-in entries with `custom` merged over them
    pub fn with_custom<I, K, V>(custom: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut stemmer = Self::new();
        for (word, stem) in custom {
            stemmer.register(word.as_ref(), stem);
        }
        stemmer
    }

    pub fn register(&mut self, word: &str, stem: impl Into<String>) {
        self.stems.insert(word.to_lowercase(), stem.into());
    }

    /// Stem a query word
    pub fn stem(&self, word: &str) -> String {
        let lower = word.to_lowercase();
        match self.stems.get(&lower) {
            Some(stem) => stem.clone(),
            None => lower,
        }
    }
}

impl Default for EffectStemmer {
    fn default() -> Self {
        Self::new()
    }
}
