//! Ordered predicate tables.
//!
//! Every precedence decision in the aggregator is a slice of [`Rule`]s
//! evaluated top-down; the first rule whose predicate holds decides the
//! status. Tables are plain constants so each one can be read and tested
//! on its own.

use crate::core::StageStatus;

/// One predicate → status pair.
pub struct Rule<I> {
    /// Short name used in traces and tests.
    pub name: &'static str,
    /// Predicate over the rule input.
    pub when: fn(&I) -> bool,
    /// Status produced when the predicate holds.
    pub then: StageStatus,
}

impl<I> std::fmt::Debug for Rule<I> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rule")
            .field("name", &self.name)
            .field("then", &self.then)
            .finish()
    }
}

/// Returns the first rule whose predicate holds.
#[must_use]
pub fn first_match<'r, I>(rules: &'r [Rule<I>], input: &I) -> Option<&'r Rule<I>> {
    rules.iter().find(|rule| (rule.when)(input))
}

/// Evaluates a table, returning `fallback` when no rule matches.
#[must_use]
pub fn evaluate<I>(rules: &[Rule<I>], input: &I, fallback: StageStatus) -> StageStatus {
    first_match(rules, input).map_or(fallback, |rule| rule.then)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PARITY: &[Rule<u32>] = &[
        Rule {
            name: "zero",
            when: |n: &u32| *n == 0,
            then: StageStatus::Pending,
        },
        Rule {
            name: "even",
            when: |n: &u32| n % 2 == 0,
            then: StageStatus::Passed,
        },
    ];

    #[test]
    fn test_first_rule_wins() {
        // 0 is also even, but "zero" is listed first
        assert_eq!(first_match(PARITY, &0).map(|r| r.name), Some("zero"));
        assert_eq!(first_match(PARITY, &4).map(|r| r.name), Some("even"));
    }

    #[test]
    fn test_fallback_when_nothing_matches() {
        assert!(first_match(PARITY, &3).is_none());
        assert_eq!(evaluate(PARITY, &3, StageStatus::Failed), StageStatus::Failed);
    }
}
