// Copyright (c) The gtest-parallel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Condensing failing tests into filter entries.
//!
//! A filter entry is either a literal `Suite.Case` name or a pattern `Suite.Prefix*` with a single
//! trailing wildcard. [`condense_failures`] turns a set of failing tests into a small list of
//! entries that skip exactly those tests, and nothing else the binary currently lists.

use crate::list::{TestEnumeration, split_test_name};
use std::{
    cmp::Reverse,
    collections::{BTreeMap, BTreeSet},
};

/// Returns true if a filter entry matches a test name.
pub fn entry_matches(entry: &str, test_name: &str) -> bool {
    match entry.strip_suffix('*') {
        Some(prefix) => test_name.starts_with(prefix),
        None => entry == test_name,
    }
}

/// Computes the filter entries for a set of failing tests.
///
/// The result is sorted and free of duplicates. It:
///
/// * matches every test in `failed`,
/// * matches no other test in `enumeration`,
/// * keeps every entry of `previous` that matches no test in `enumeration`. Those entries cover
///   tests that were filtered out or removed from the binary.
///
/// A suite in which every test failed is collapsed to `Suite.*`.
pub fn condense_failures(
    failed: &BTreeSet<String>,
    enumeration: &TestEnumeration,
    previous: &BTreeSet<String>,
) -> Vec<String> {
    let mut out = BTreeSet::new();

    let mut failed_by_suite: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
    for test_name in failed {
        match split_test_name(test_name) {
            Some((suite_key, case)) if enumeration.contains(test_name) => {
                failed_by_suite.entry(suite_key).or_default().insert(case);
            }
            _ => {
                out.insert(test_name.clone());
            }
        }
    }

    for (suite_key, failed_cases) in failed_by_suite {
        let passing: Vec<&str> = enumeration
            .cases(suite_key)
            .into_iter()
            .flatten()
            .map(String::as_str)
            .filter(|case| !failed_cases.contains(case))
            .collect();

        if passing.is_empty() {
            out.insert(format!("{suite_key}*"));
            continue;
        }

        for pattern in cover_cases(&failed_cases, &passing) {
            out.insert(format!("{suite_key}{pattern}"));
        }
    }

    let listed: Vec<String> = enumeration.test_names().collect();
    for entry in previous {
        if !listed.iter().any(|test_name| entry_matches(entry, test_name)) {
            out.insert(entry.clone());
        }
    }

    out.into_iter().collect()
}

/// Greedily covers `failed` with case patterns that match nothing in `passing`.
fn cover_cases(failed: &BTreeSet<&str>, passing: &[&str]) -> Vec<String> {
    let mut remaining = failed.clone();
    let mut patterns = Vec::new();

    while !remaining.is_empty() {
        let candidates: BTreeSet<String> = remaining
            .iter()
            .flat_map(|case| candidate_patterns(case))
            .filter(|pattern| !passing.iter().any(|case| entry_matches(pattern, case)))
            .collect();

        let best = candidates
            .into_iter()
            .map(|pattern| {
                let covered: Vec<&str> = remaining
                    .iter()
                    .copied()
                    .filter(|case| entry_matches(&pattern, case))
                    .collect();
                (pattern, covered)
            })
            .filter(|(_, covered)| !covered.is_empty())
            .min_by(|(a, a_covered), (b, b_covered)| {
                (Reverse(a_covered.len()), a.len(), a).cmp(&(Reverse(b_covered.len()), b.len(), b))
            });

        let Some((pattern, covered)) = best else {
            break;
        };
        for case in covered {
            remaining.remove(case);
        }
        patterns.push(pattern);
    }

    // A literal always covers itself, so this only happens if a case is also listed as passing.
    patterns.extend(remaining.into_iter().map(str::to_owned));
    patterns
}

/// Returns the case itself along with a `Prefix*` pattern for every word boundary in it.
///
/// A boundary is before an uppercase letter, before an underscore, before the first digit of a run
/// of digits, and after an underscore.
fn candidate_patterns(case: &str) -> Vec<String> {
    let mut out = vec![case.to_owned()];
    let mut prev: Option<char> = None;
    for (index, ch) in case.char_indices() {
        if let Some(prev) = prev {
            let boundary = ch.is_uppercase()
                || ch == '_'
                || (ch.is_ascii_digit() && !prev.is_ascii_digit())
                || prev == '_';
            if boundary {
                out.push(format!("{}*", &case[..index]));
            }
        }
        prev = Some(ch);
    }
    if case.ends_with('_') {
        out.push(format!("{case}*"));
    }
    out
}
