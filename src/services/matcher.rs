//! Identity reconciliation
//!
//! Matching runs an explicit ordered list of strategies instead of ad hoc
//! branches, so the precedence is readable here and new strategies slot in
//! without re-deriving it.

use crate::identity::CanonicalIdentity;
use crate::types::CustomerRecord;

/// One way two identities can be considered the same, strongest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchStrategy {
    /// Full E.164 equality. Disambiguates country and area-code ambiguity.
    ByE164,
    /// Last-10-digits equality. Fallback when either side predates
    /// normalization or is an international number with no derived E.164.
    ByLast10,
}

/// Precedence order. First strategy with any hit wins.
pub const STRATEGIES: [MatchStrategy; 2] = [MatchStrategy::ByE164, MatchStrategy::ByLast10];

impl MatchStrategy {
    /// Whether two identities match under this strategy. Both sides must
    /// carry the relevant key.
    pub fn matches(&self, left: &CanonicalIdentity, right: &CanonicalIdentity) -> bool {
        match self {
            MatchStrategy::ByE164 => left.e164.is_some() && left.e164 == right.e164,
            MatchStrategy::ByLast10 => left.last10.is_some() && left.last10 == right.last10,
        }
    }
}

/// The strongest strategy under which two identities match, if any.
pub fn identity_match(left: &CanonicalIdentity, right: &CanonicalIdentity) -> Option<MatchStrategy> {
    STRATEGIES.into_iter().find(|s| s.matches(left, right))
}

/// Select "the" matching record from a candidate set, or none.
///
/// Within one strategy, multiple hits are broken by most-recently-updated;
/// record id is the final tie-break so the choice never depends on input
/// order.
pub fn select_match<'a>(
    identity: &CanonicalIdentity,
    candidates: &'a [CustomerRecord],
) -> Option<(&'a CustomerRecord, MatchStrategy)> {
    for strategy in STRATEGIES {
        let hit = candidates
            .iter()
            .filter(|record| strategy.matches(identity, &record.identity()))
            .max_by(|a, b| {
                a.updated_at
                    .cmp(&b.updated_at)
                    .then_with(|| a.id.cmp(&b.id))
            });
        if let Some(record) = hit {
            return Some((record, strategy));
        }
    }
    None
}
