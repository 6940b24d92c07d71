//! Entity name canonicalisation.
//!
//! Names are NFKC-normalised, casefolded, expanded through a small role
//! dictionary, flipped out of "Last, First" form, and projected three
//! ways: the base form (every word), the short form (first + last), and
//! initials. Two mentions merge when any projection matches and their
//! entity types agree. A lone first name ("Sarah") is absorbed into a
//! multi-word cluster when exactly one cluster starts with it.

use std::collections::BTreeMap;
use unicode_normalization::UnicodeNormalization;

/// Role variants expanded before projection.
const ROLE_VARIANTS: &[(&str, &str)] = &[
    ("chief executive officer", "ceo"),
    ("chief financial officer", "cfo"),
    ("chief operating officer", "coo"),
    ("managing director", "md"),
    ("vice president", "vp"),
    ("human resources", "hr"),
];

/// The three projections of a canonicalised name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalName {
    /// All whitespace-separated words.
    pub base: String,
    /// First word + last word; equals `base` for short names.
    pub short: String,
    /// First letter of each word.
    pub initials: String,
}

impl CanonicalName {
    /// Number of words in the base form.
    pub fn word_count(&self) -> usize {
        self.base.split(' ').filter(|w| !w.is_empty()).count()
    }

    /// First word of the base form.
    pub fn first_word(&self) -> &str {
        self.base.split(' ').next().unwrap_or("")
    }

    /// True when any projection coincides.
    pub fn intersects(&self, other: &CanonicalName) -> bool {
        self.base == other.base || self.short == other.short || self.initials == other.initials
    }
}

/// Canonicalises a raw entity name.
pub fn canonicalise(name: &str) -> CanonicalName {
    let mut folded: String = name.nfkc().collect::<String>().to_lowercase();

    for (variant, replacement) in ROLE_VARIANTS {
        if folded.contains(variant) {
            folded = folded.replace(variant, replacement);
        }
    }

    // "Last, First" → "First Last"; only the first comma is structural.
    if let Some((last, first)) = folded.split_once(',') {
        folded = format!("{} {}", first.trim(), last.trim());
    }

    let words: Vec<String> = folded
        .split_whitespace()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()).to_string())
        .filter(|w| !w.is_empty())
        .collect();

    let base = words.join(" ");
    let short = if words.len() >= 2 {
        format!("{} {}", words[0], words[words.len() - 1])
    } else {
        base.clone()
    };
    let initials: String = words
        .iter()
        .filter_map(|w| w.chars().next())
        .collect();

    CanonicalName {
        base,
        short,
        initials,
    }
}

/// One mention of an entity prior to clustering.
#[derive(Debug, Clone)]
pub struct Mention {
    pub name: String,
    pub evidence_sha256: String,
    pub context: String,
    pub confidence: f64,
}

/// A merged cluster of mentions referring to one entity.
#[derive(Debug, Clone)]
pub struct Cluster {
    /// Display name: the longest mention name (most words, then longest
    /// string) seen in the cluster.
    pub display_name: String,
    pub mentions: Vec<Mention>,
}

impl Cluster {
    /// Distinct name variants in the cluster, sorted.
    pub fn variants(&self) -> Vec<String> {
        let mut variants: Vec<String> = self.mentions.iter().map(|m| m.name.clone()).collect();
        variants.sort();
        variants.dedup();
        variants
    }
}

/// Clusters mentions of one entity type.
///
/// Mentions merge when any of their three projections match; a second
/// pass absorbs lone first names into the unique multi-word cluster that
/// starts with them, so "Sarah" and "Sarah Johnson" correlate.
pub fn cluster_mentions(mentions: Vec<Mention>) -> Vec<Cluster> {
    let canonical: Vec<CanonicalName> = mentions.iter().map(|m| canonicalise(&m.name)).collect();
    let mut cluster_of: Vec<usize> = (0..mentions.len()).collect();

    fn root(cluster_of: &mut Vec<usize>, mut i: usize) -> usize {
        while cluster_of[i] != i {
            cluster_of[i] = cluster_of[cluster_of[i]];
            i = cluster_of[i];
        }
        i
    }

    // Pass 1: merge on intersecting projections.
    for i in 0..mentions.len() {
        for j in (i + 1)..mentions.len() {
            if canonical[i].intersects(&canonical[j]) {
                let (a, b) = (root(&mut cluster_of, i), root(&mut cluster_of, j));
                if a != b {
                    cluster_of[a] = b;
                }
            }
        }
    }

    // Pass 2: absorb lone first names into the one multi-word cluster
    // starting with the same word, when unambiguous.
    for i in 0..mentions.len() {
        if canonical[i].word_count() != 1 {
            continue;
        }
        let word = canonical[i].first_word().to_string();
        let mut target: Option<usize> = None;
        let mut ambiguous = false;
        for j in 0..mentions.len() {
            if canonical[j].word_count() > 1 && canonical[j].first_word() == word {
                let r = root(&mut cluster_of, j);
                match target {
                    None => target = Some(r),
                    Some(existing) if existing != r => ambiguous = true,
                    _ => {}
                }
            }
        }
        if let Some(t) = target
            && !ambiguous
        {
            let r = root(&mut cluster_of, i);
            if r != t {
                cluster_of[r] = t;
            }
        }
    }

    let mut grouped: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for i in 0..mentions.len() {
        let r = root(&mut cluster_of, i);
        grouped.entry(r).or_default().push(i);
    }

    grouped
        .into_values()
        .map(|indices| {
            let display_name = indices
                .iter()
                .map(|&i| mentions[i].name.as_str())
                .max_by_key(|name| (name.split_whitespace().count(), name.len()))
                .unwrap_or_default()
                .to_string();
            Cluster {
                display_name,
                mentions: indices.into_iter().map(|i| mentions[i].clone()).collect(),
            }
        })
        .collect()
}
