use anyhow::{bail, Result};
use serde::Serialize;
use strsim::normalized_levenshtein;
use vdir_core::{slugify, Record};

const NAME_STOPWORDS: &[&str] = &["the", "hotel", "restaurant"];

/// Thresholds splitting [0, 1] into new / needs-review / high-confidence.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchConfig {
    pub high: f64,
    pub review: f64,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            high: 0.9,
            review: 0.7,
        }
    }
}

impl MatchConfig {
    pub fn validate(&self) -> Result<()> {
        let in_unit = |v: f64| (0.0..=1.0).contains(&v);
        if !in_unit(self.high) || !in_unit(self.review) || self.review > self.high {
            bail!(
                "match thresholds must satisfy 0 <= review ({}) <= high ({}) <= 1",
                self.review,
                self.high
            );
        }
        Ok(())
    }

    pub fn classify(&self, score: f64) -> MatchClass {
        if score >= self.high {
            MatchClass::High
        } else if score >= self.review {
            MatchClass::Review
        } else {
            MatchClass::New
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchClass {
    High,
    Review,
    New,
}

/// Best existing candidate for an incoming name, with its class.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchOutcome {
    pub class: MatchClass,
    /// Index into the candidate slice; `None` when no candidate shares the city.
    pub index: Option<usize>,
    pub score: f64,
}

/// Case-folded name with `&` spelled out, punctuation flattened to spaces
/// and the `the`/`hotel`/`restaurant` stopwords removed. A name made only
/// of stopwords keeps them.
pub fn normalize_name(name: &str) -> String {
    let flattened = name
        .to_lowercase()
        .replace('&', " and ")
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect::<String>();
    let words = flattened.split_whitespace().collect::<Vec<_>>();
    let kept = words
        .iter()
        .copied()
        .filter(|word| !NAME_STOPWORDS.contains(word))
        .collect::<Vec<_>>();
    if kept.is_empty() {
        words.join(" ")
    } else {
        kept.join(" ")
    }
}

/// Similarity of two names after normalization; an empty side scores 0.
pub fn similarity(a: &str, b: &str) -> f64 {
    let (a, b) = (normalize_name(a), normalize_name(b));
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    normalized_levenshtein(&a, &b)
}

pub fn same_city(a: &str, b: &str) -> bool {
    let (a, b) = (slugify(a), slugify(b));
    !a.is_empty() && a == b
}

/// Score `name` against every candidate in `city`. The highest score wins;
/// on ties the earliest candidate is kept.
pub fn best_match(config: &MatchConfig, name: &str, city: &str, candidates: &[Record]) -> MatchOutcome {
    let mut best: Option<(usize, f64)> = None;
    for (index, candidate) in candidates.iter().enumerate() {
        let Some(candidate_city) = candidate.city.as_deref() else {
            continue;
        };
        if !same_city(city, candidate_city) {
            continue;
        }
        let score = similarity(name, &candidate.name);
        if best.map_or(true, |(_, top)| score > top) {
            best = Some((index, score));
        }
    }
    match best {
        Some((index, score)) => MatchOutcome {
            class: config.classify(score),
            index: Some(index),
            score,
        },
        None => MatchOutcome {
            class: MatchClass::New,
            index: None,
            score: 0.0,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(name: &str, city: &str) -> Record {
        Record {
            slug: slugify(name),
            name: name.to_string(),
            city: Some(city.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn normalization_drops_stopwords_and_punctuation() {
        assert_eq!(normalize_name("The Mark Hotel"), "mark");
        assert_eq!(normalize_name("Bar & Grill-Room"), "bar and grill room");
        assert_eq!(normalize_name("  "), "");
        assert_eq!(normalize_name("Theatre"), "theatre");
    }

    #[test]
    fn identical_normalized_names_score_one_and_classify_high() {
        let config = MatchConfig::default();
        for (a, b) in [
            ("The Mark", "Mark Hotel"),
            ("Park Hyatt", "park  hyatt"),
            ("Dishoom & Co.", "dishoom and co"),
        ] {
            assert_eq!(normalize_name(a), normalize_name(b));
            let score = similarity(a, b);
            assert_eq!(score, 1.0, "{a} vs {b}");
            assert_eq!(config.classify(score), MatchClass::High);
        }
    }

    #[test]
    fn empty_names_never_match() {
        assert_eq!(similarity("", "Anything"), 0.0);
        assert_eq!(similarity(" - ", "Anything"), 0.0);
    }

    #[test]
    fn stopword_only_names_still_match_themselves() {
        assert_eq!(normalize_name("The Hotel"), "the hotel");
        assert_eq!(normalize_name("Restaurant"), "restaurant");
        assert_eq!(similarity("The Hotel", "The Hotel"), 1.0);

        let candidates = vec![record("The Hotel", "lucerne")];
        let outcome = best_match(&MatchConfig::default(), "The Hotel", "lucerne", &candidates);
        assert_eq!(outcome.index, Some(0));
        assert_eq!(outcome.class, MatchClass::High);
    }

    #[test]
    fn thresholds_partition_the_unit_interval() {
        let config = MatchConfig::default();
        assert_eq!(config.classify(1.0), MatchClass::High);
        assert_eq!(config.classify(0.9), MatchClass::High);
        assert_eq!(config.classify(0.89), MatchClass::Review);
        assert_eq!(config.classify(0.7), MatchClass::Review);
        assert_eq!(config.classify(0.69), MatchClass::New);
        assert_eq!(config.classify(0.0), MatchClass::New);
    }

    #[test]
    fn only_candidates_in_the_same_city_are_scored() {
        let candidates = vec![record("New Cafe", "london"), record("Old Cafe", "paris")];
        let outcome = best_match(&MatchConfig::default(), "New Cafe", "paris", &candidates);
        assert_eq!(outcome.index, Some(1));
        assert!(outcome.score < 0.9);

        let none = best_match(&MatchConfig::default(), "New Cafe", "tokyo", &candidates);
        assert_eq!(none.index, None);
        assert_eq!(none.class, MatchClass::New);
    }

    #[test]
    fn ties_keep_the_first_candidate() {
        let candidates = vec![record("Aman", "tokyo"), record("The Aman", "tokyo")];
        let outcome = best_match(&MatchConfig::default(), "Aman Hotel", "Tokyo", &candidates);
        assert_eq!(outcome.index, Some(0));
        assert_eq!(outcome.class, MatchClass::High);
    }

    #[test]
    fn invalid_thresholds_fail_validation() {
        assert!(MatchConfig { high: 0.7, review: 0.9 }.validate().is_err());
        assert!(MatchConfig { high: 1.2, review: 0.7 }.validate().is_err());
        assert!(MatchConfig::default().validate().is_ok());
    }
}
