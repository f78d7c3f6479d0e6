// Copyright (c) The gtest-parallel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::join_test_name;
use indexmap::{IndexMap, IndexSet};
use std::collections::BTreeSet;

/// A snapshot of the tests in a GoogleTest binary: suite keys mapped to their cases, in the order
/// the binary listed them.
///
/// An enumeration is taken at the start of each pass and stays fixed for the duration of the pass.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct TestEnumeration {
    suites: IndexMap<String, IndexSet<String>>,
}

impl TestEnumeration {
    /// Creates an empty enumeration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an enumeration from `(suite key, cases)` pairs.
    pub fn from_suites<S, I, C>(suites: I) -> Self
    where
        I: IntoIterator<Item = (S, Vec<C>)>,
        S: Into<String>,
        C: Into<String>,
    {
        let mut enumeration = Self::new();
        for (suite_key, cases) in suites {
            let suite_key = suite_key.into();
            for case in cases {
                enumeration.push(suite_key.clone(), case);
            }
        }
        enumeration
    }

    /// Adds a case to a suite, creating the suite if necessary. Duplicate cases are ignored.
    pub fn push(&mut self, suite_key: impl Into<String>, case: impl Into<String>) {
        self.suites
            .entry(suite_key.into())
            .or_default()
            .insert(case.into());
    }

    /// Returns the number of tests in this enumeration.
    pub fn test_count(&self) -> usize {
        self.suites.values().map(IndexSet::len).sum()
    }

    /// Returns true if there are no tests in this enumeration.
    pub fn is_empty(&self) -> bool {
        self.test_count() == 0
    }

    /// Iterates over `(suite key, cases)` pairs in listing order.
    pub fn suites(&self) -> impl Iterator<Item = (&str, &IndexSet<String>)> + '_ {
        self.suites
            .iter()
            .map(|(suite_key, cases)| (suite_key.as_str(), cases))
    }

    /// Returns the cases in a suite, if the suite is present.
    pub fn cases(&self, suite_key: &str) -> Option<&IndexSet<String>> {
        self.suites.get(suite_key)
    }

    /// Iterates over `(suite key, case)` pairs in listing order.
    pub fn iter_tests(&self) -> impl Iterator<Item = (&str, &str)> + '_ {
        self.suites.iter().flat_map(|(suite_key, cases)| {
            cases
                .iter()
                .map(move |case| (suite_key.as_str(), case.as_str()))
        })
    }

    /// Iterates over full `Suite.Case` names in listing order.
    pub fn test_names(&self) -> impl Iterator<Item = String> + '_ {
        self.iter_tests()
            .map(|(suite_key, case)| join_test_name(suite_key, case))
    }

    /// Returns true if the enumeration contains the given `Suite.Case` name.
    pub fn contains(&self, test_name: &str) -> bool {
        match super::split_test_name(test_name) {
            Some((suite_key, case)) => self
                .cases(suite_key)
                .is_some_and(|cases| cases.contains(case)),
            None => false,
        }
    }

    /// Returns a copy of this enumeration without the given tests. Suites left empty are dropped.
    pub fn without(&self, excluded: &BTreeSet<String>) -> Self {
        if excluded.is_empty() {
            return self.clone();
        }
        let mut out = Self::new();
        for (suite_key, case) in self.iter_tests() {
            if !excluded.contains(&join_test_name(suite_key, case)) {
                out.push(suite_key, case);
            }
        }
        out
    }
}

/// The tests in a suite that are part of a [`Batch`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct BatchGroup {
    /// The suite key, including the trailing dot.
    pub suite_key: String,

    /// The cases from this suite, in listing order.
    pub cases: Vec<String>,
}

/// A contiguous set of tests executed in one invocation of the binary.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Batch {
    groups: Vec<BatchGroup>,
}

impl Batch {
    /// Creates a batch from flattened `(suite key, case)` pairs, regrouping them by suite key.
    ///
    /// Suites appear in the order they're first seen, and cases keep their relative order.
    pub fn from_tests<S, C>(tests: impl IntoIterator<Item = (S, C)>) -> Self
    where
        S: Into<String>,
        C: Into<String>,
    {
        let mut grouped: IndexMap<String, Vec<String>> = IndexMap::new();
        for (suite_key, case) in tests {
            grouped.entry(suite_key.into()).or_default().push(case.into());
        }
        Self {
            groups: grouped
                .into_iter()
                .map(|(suite_key, cases)| BatchGroup { suite_key, cases })
                .collect(),
        }
    }

    /// Creates a batch containing a single test.
    pub fn singleton(suite_key: impl Into<String>, case: impl Into<String>) -> Self {
        Self::from_tests([(suite_key.into(), case.into())])
    }

    /// Returns the suite groups in this batch.
    pub fn groups(&self) -> &[BatchGroup] {
        &self.groups
    }

    /// Returns the number of tests in this batch.
    pub fn len(&self) -> usize {
        self.groups.iter().map(|group| group.cases.len()).sum()
    }

    /// Returns true if this batch has no tests.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Iterates over `(suite key, case)` pairs in batch order.
    pub fn iter_tests(&self) -> impl Iterator<Item = (&str, &str)> + '_ {
        self.groups.iter().flat_map(|group| {
            group
                .cases
                .iter()
                .map(move |case| (group.suite_key.as_str(), case.as_str()))
        })
    }

    /// Iterates over full `Suite.Case` names in batch order.
    pub fn test_names(&self) -> impl Iterator<Item = String> + '_ {
        self.iter_tests()
            .map(|(suite_key, case)| join_test_name(suite_key, case))
    }

    /// Returns the only test in this batch, if it has exactly one.
    pub fn single_test(&self) -> Option<String> {
        let mut iter = self.test_names();
        match (iter.next(), iter.next()) {
            (Some(name), None) => Some(name),
            _ => None,
        }
    }
}
