//! Answer-set consensus across trusted references
//!
//! Each reference answer is normalized to an [`AnswerSet`] (order and TTL
//! ignored), the sets are tallied, and a [`ConsensusPolicy`] decides
//! whether the leading set is a usable majority.

use std::collections::BTreeSet;
use std::fmt;

use hickory_proto::rr::RecordType;
use serde::Serialize;

use crate::transport::Answer;

/// Normalized answer: the set of record values of the queried type
///
/// Addresses are compared as parsed IPs, other data by lowercase
/// presentation form.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct AnswerSet(BTreeSet<String>);

impl AnswerSet {
    /// Normalize the records of `record_type` among `answers`
    pub fn from_answers(answers: &[Answer], record_type: RecordType) -> Self {
        Self(
            answers
                .iter()
                .filter(|a| a.record_type == record_type)
                .map(|a| match a.address {
                    Some(ip) => ip.to_string(),
                    None => a.data.trim_end_matches('.').to_ascii_lowercase(),
                })
                .collect(),
        )
    }

    /// Whether no record of the queried type was returned
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of distinct values
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Values in sorted order
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl<S: Into<String>> FromIterator<S> for AnswerSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

impl fmt::Display for AnswerSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, value) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            f.write_str(value)?;
        }
        write!(f, "}}")
    }
}

/// Count votes per distinct set, most votes first
///
/// Ties keep the set order, so the result is deterministic.
pub fn tally(sets: &[AnswerSet]) -> Vec<(AnswerSet, usize)> {
    let mut votes: Vec<(AnswerSet, usize)> = Vec::new();
    for set in sets {
        match votes.iter_mut().find(|(s, _)| s == set) {
            Some((_, n)) => *n += 1,
            None => votes.push((set.clone(), 1)),
        }
    }
    votes.sort_by(|(a, na), (b, nb)| nb.cmp(na).then_with(|| a.cmp(b)));
    votes
}

/// What the references agree on
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Consensus {
    /// A set with at least the quorum and a strict majority of votes
    Majority {
        /// Agreed set
        set: AnswerSet,
        /// Votes for it
        votes: usize,
        /// References that answered
        responding: usize,
    },
    /// Exactly one reference answered and no quorum is possible
    Single(AnswerSet),
    /// References answered but none of the sets qualifies
    Split,
    /// No reference answered
    NoData,
}

/// Majority rule for reference answers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConsensusPolicy {
    /// Minimum votes for a majority
    pub min_quorum: usize,
}

impl Default for ConsensusPolicy {
    fn default() -> Self {
        Self { min_quorum: 2 }
    }
}

impl ConsensusPolicy {
    /// Policy with a given quorum (clamped to at least 1)
    pub fn new(min_quorum: usize) -> Self {
        Self {
            min_quorum: min_quorum.max(1),
        }
    }

    /// Decide on the answers of the references that responded
    ///
    /// # Example
    ///
    /// ```
    /// use dns_bench::security::{AnswerSet, Consensus, ConsensusPolicy};
    ///
    /// let a: AnswerSet = ["192.0.2.1"].into_iter().collect();
    /// let b: AnswerSet = ["192.0.2.9"].into_iter().collect();
    /// let policy = ConsensusPolicy::new(2);
    ///
    /// assert!(matches!(policy.decide(&[a.clone(), a.clone(), b.clone()]), Consensus::Majority { .. }));
    /// assert_eq!(policy.decide(&[a.clone(), b]), Consensus::Split);
    /// assert_eq!(policy.decide(&[a.clone()]), Consensus::Single(a));
    /// ```
    pub fn decide(&self, references: &[AnswerSet]) -> Consensus {
        let responding = references.len();
        let votes = tally(references);

        let Some((leader, top)) = votes.first() else {
            return Consensus::NoData;
        };

        if *top >= self.min_quorum && top * 2 > responding {
            return Consensus::Majority {
                set: leader.clone(),
                votes: *top,
                responding,
            };
        }

        if responding == 1 {
            Consensus::Single(leader.clone())
        } else {
            Consensus::Split
        }
    }
}
