//! Model flow classifier with conjunction support.
//!
//! The production classifier is out of scope; this model implements just
//! the contract the compiler depends on: `insert(rule, priority)` and
//! `lookup(packet)`, where a rule whose match carries conjunction
//! memberships only fires as part of a fully-satisfied group — one member
//! of every clause must match the packet.

use std::collections::HashMap;

use flowexpr_flows::{Match, MatchList};

/// A model classifier holding installed rules at fixed priorities.
#[derive(Debug, Default)]
pub struct Classifier {
    rules: Vec<Rule>,
}

#[derive(Debug)]
struct Rule {
    m: Match,
    priority: u32,
}

impl Classifier {
    /// An empty classifier.
    pub fn new() -> Self {
        Self::default()
    }

    /// Install one rule.
    pub fn insert(&mut self, m: Match, priority: u32) {
        self.rules.push(Rule { m, priority });
    }

    /// Install every match of a compiled expression.
    pub fn insert_matches(&mut self, list: &MatchList, priority: u32) {
        for m in &list.matches {
            self.insert(m.clone(), priority);
        }
    }

    /// Whether any installed rule accepts the packet.
    ///
    /// A plain rule accepts when its tuple matches. A conjunction group
    /// accepts when, for each of its `n_clauses` clauses, at least one
    /// member rule matches the packet.
    pub fn lookup(&self, packet: &HashMap<u32, u128>) -> bool {
        // (conjunction id) -> (n_clauses, clauses with a matching member)
        let mut groups: HashMap<u32, (u32, Vec<bool>)> = HashMap::new();

        for rule in &self.rules {
            if !rule.m.matches_packet(packet) {
                continue;
            }
            if rule.m.conjunctions.is_empty() {
                return true;
            }
            for conj in &rule.m.conjunctions {
                let entry = groups
                    .entry(conj.id)
                    .or_insert_with(|| (conj.n_clauses, vec![false; conj.n_clauses as usize]));
                entry.1[conj.clause as usize] = true;
            }
        }
        groups.values().any(|(_, clauses)| clauses.iter().all(|&hit| hit))
    }

    /// Number of installed rules.
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Whether no rules are installed.
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Highest priority among installed rules (informational).
    pub fn max_priority(&self) -> Option<u32> {
        self.rules.iter().map(|r| r.priority).max()
    }
}

#[cfg(test)]
mod tests {
    use flowexpr_flows::{Conjunction, FieldMatch};

    use super::*;

    fn field(value: u128, mask: u128) -> FieldMatch {
        FieldMatch { name: "f".to_string(), n_bits: 8, value, mask }
    }

    fn packet(entries: &[(u32, u128)]) -> HashMap<u32, u128> {
        entries.iter().copied().collect()
    }

    #[test]
    fn plain_rule_matches() {
        let mut cls = Classifier::new();
        let mut m = Match::new();
        m.fields.insert(0, field(5, 0xff));
        cls.insert(m, 0);

        assert!(cls.lookup(&packet(&[(0, 5)])));
        assert!(!cls.lookup(&packet(&[(0, 6)])));
        // Missing fields read as zero.
        assert!(!cls.lookup(&packet(&[])));
    }

    #[test]
    fn conjunction_needs_every_clause() {
        let mut cls = Classifier::new();
        // Clause 0: f0 == 1 or f0 == 2; clause 1: f1 == 3.
        for (clause, fid, value) in [(0u32, 0u32, 1u128), (0, 0, 2), (1, 1, 3)] {
            let mut m = Match::new();
            m.fields.insert(fid, field(value, 0xff));
            m.conjunctions.push(Conjunction { id: 1, clause, n_clauses: 2 });
            cls.insert(m, 0);
        }

        assert!(cls.lookup(&packet(&[(0, 1), (1, 3)])));
        assert!(cls.lookup(&packet(&[(0, 2), (1, 3)])));
        assert!(!cls.lookup(&packet(&[(0, 1), (1, 4)])));
        assert!(!cls.lookup(&packet(&[(0, 3), (1, 3)])));
    }
}
