// Copyright (c) The gtest-parallel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{
    list::join_test_name,
    worker::{CommandOutput, CommandStatus},
};
use camino::Utf8Path;
use gtest_parallel_metadata::FailureKind;
use indexmap::IndexSet;
use quick_xml::{
    Reader,
    events::{BytesStart, Event},
};
use regex::Regex;
use std::{
    collections::{BTreeMap, BTreeSet},
    sync::LazyLock,
};
use tracing::debug;

static RUN_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\[\s*RUN\s*\]\s+(\S+)").unwrap());

/// What happened to the tests in one batch.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct BatchOutcome {
    /// True if the batch exited successfully and no test failed.
    pub passed: bool,

    /// How the command finished.
    pub status: CommandStatus,

    /// The expected tests that the binary reported running.
    pub executed: BTreeSet<String>,

    /// Failures by category.
    pub failures: BTreeMap<FailureKind, BTreeSet<String>>,

    /// Log text per failed test.
    pub logs: BTreeMap<String, String>,

    /// The last expected test that the binary announced on a RUN line.
    pub last_running_test: Option<String>,
}

impl BatchOutcome {
    fn new(status: CommandStatus) -> Self {
        Self {
            passed: false,
            status,
            executed: BTreeSet::new(),
            failures: BTreeMap::new(),
            logs: BTreeMap::new(),
            last_running_test: None,
        }
    }

    /// Records a failure for a test.
    pub fn record(&mut self, kind: FailureKind, test_name: impl Into<String>, log: impl Into<String>) {
        let test_name = test_name.into();
        self.failures
            .entry(kind)
            .or_default()
            .insert(test_name.clone());
        let log = log.into();
        let entry = self.logs.entry(test_name).or_default();
        if !entry.is_empty() && !log.is_empty() {
            entry.push('\n');
        }
        entry.push_str(&log);
    }

    /// Returns the tests recorded under a category.
    pub fn failures_of(&self, kind: FailureKind) -> impl Iterator<Item = &str> + '_ {
        self.failures
            .get(&kind)
            .into_iter()
            .flat_map(|tests| tests.iter().map(String::as_str))
    }

    /// Returns true if any test was recorded under a category.
    pub fn has_failures_of(&self, kind: FailureKind) -> bool {
        self.failures.get(&kind).is_some_and(|tests| !tests.is_empty())
    }

    /// Returns the number of CRASH and TIMEOUT records.
    pub fn crash_count(&self) -> usize {
        FailureKind::ALL
            .iter()
            .filter(|kind| kind.needs_isolation())
            .map(|kind| self.failures_of(*kind).count())
            .sum()
    }
}

/// Interprets the result of running a batch.
///
/// `expected` is the set of tests the batch asked for. Names outside it, in stdout or in the XML
/// report, are ignored.
pub fn parse_batch_output(
    output: &CommandOutput,
    xml_path: &Utf8Path,
    expected: &IndexSet<String>,
) -> BatchOutcome {
    let mut outcome = BatchOutcome::new(output.status);
    let started = started_tests(&output.stdout, expected);
    outcome.last_running_test = started.last().cloned();

    let single_test = if expected.len() == 1 {
        expected.first()
    } else {
        None
    };

    if output.status.is_timeout() {
        outcome.executed.extend(started);
        if let Some(test_name) = single_test {
            outcome.record(FailureKind::Timeout, test_name.clone(), output.combined());
        }
        return outcome;
    }

    if let Some(test_cases) = read_xml_report(xml_path) {
        for test_case in test_cases {
            // Disabled tests are reported as not run, but the binary still accounted for them.
            if !expected.contains(&test_case.name) {
                continue;
            }
            if !test_case.failures.is_empty() {
                outcome.record(FailureKind::Fail, &test_case.name, test_case.failures.join("\n"));
            }
            outcome.executed.insert(test_case.name);
        }
        outcome.passed = output.status.is_success() && !outcome.has_failures_of(FailureKind::Fail);
        // The binary died after writing its report, e.g. in a global destructor.
        if let (false, Some(test_name)) = (outcome.passed, single_test) {
            if outcome.failures.is_empty() {
                outcome.record(FailureKind::Crash, test_name.clone(), output.combined());
            }
        }
        return outcome;
    }

    outcome.executed.extend(started);
    if output.status.is_success() {
        outcome.passed = expected.iter().all(|test_name| outcome.executed.contains(test_name));
    } else if let Some(test_name) = single_test {
        outcome.record(FailureKind::Crash, test_name.clone(), output.combined());
    }
    outcome
}

/// Returns the expected tests announced by RUN lines, in order of appearance.
fn started_tests(stdout: &str, expected: &IndexSet<String>) -> Vec<String> {
    let plain = strip_ansi_escapes::strip_str(stdout);
    RUN_MARKER
        .captures_iter(&plain)
        .filter_map(|captures| captures.get(1))
        .map(|m| m.as_str())
        .filter(|name| expected.contains(*name))
        .map(str::to_owned)
        .collect()
}

/// A `<testcase>` in a GoogleTest XML report.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct XmlTestCase {
    /// The full `Suite.Case` name.
    pub name: String,

    /// False for tests the report lists as not run.
    pub executed: bool,

    /// The failure messages, if any.
    pub failures: Vec<String>,
}

fn read_xml_report(path: &Utf8Path) -> Option<Vec<XmlTestCase>> {
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(error) => {
            debug!("no XML report at {path}: {error}");
            return None;
        }
    };
    if contents.trim().is_empty() {
        return None;
    }
    match parse_xml_report(&contents) {
        Ok(test_cases) => Some(test_cases),
        Err(error) => {
            debug!("ignoring unreadable XML report at {path}: {error}");
            None
        }
    }
}

/// Parses the test cases out of a GoogleTest XML report.
pub fn parse_xml_report(contents: &str) -> Result<Vec<XmlTestCase>, quick_xml::Error> {
    let mut reader = Reader::from_str(contents);
    reader.config_mut().trim_text(true);

    let mut test_cases = Vec::new();
    let mut suite_key: Option<String> = None;
    let mut current: Option<XmlTestCase> = None;
    let mut in_failure = false;

    loop {
        match reader.read_event()? {
            Event::Start(start) => match start.name().as_ref() {
                b"testsuite" => suite_key = suite_key_attr(&start)?,
                b"testcase" => current = test_case_start(&start, suite_key.as_deref())?,
                b"failure" => {
                    if let Some(test_case) = &mut current {
                        test_case.failures.push(attr(&start, "message")?.unwrap_or_default());
                        in_failure = true;
                    }
                }
                _ => {}
            },
            Event::Empty(start) => match start.name().as_ref() {
                b"testcase" => {
                    test_cases.extend(test_case_start(&start, suite_key.as_deref())?);
                }
                b"failure" => {
                    if let Some(test_case) = &mut current {
                        test_case.failures.push(attr(&start, "message")?.unwrap_or_default());
                    }
                }
                _ => {}
            },
            Event::Text(text) if in_failure => {
                let text = text.unescape()?;
                push_failure_detail(&mut current, &text);
            }
            Event::CData(data) if in_failure => {
                let data = data.into_inner();
                push_failure_detail(&mut current, &String::from_utf8_lossy(&data));
            }
            Event::End(end) => match end.name().as_ref() {
                b"testsuite" => suite_key = None,
                b"testcase" => test_cases.extend(current.take()),
                b"failure" => in_failure = false,
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(test_cases)
}

fn attr(start: &BytesStart<'_>, name: &str) -> Result<Option<String>, quick_xml::Error> {
    match start.try_get_attribute(name)? {
        Some(attribute) => Ok(Some(attribute.unescape_value()?.into_owned())),
        None => Ok(None),
    }
}

fn suite_key_attr(start: &BytesStart<'_>) -> Result<Option<String>, quick_xml::Error> {
    Ok(attr(start, "name")?.map(|mut name| {
        if !name.ends_with('.') {
            name.push('.');
        }
        name
    }))
}

fn test_case_start(
    start: &BytesStart<'_>,
    suite_key: Option<&str>,
) -> Result<Option<XmlTestCase>, quick_xml::Error> {
    let Some(case) = attr(start, "name")? else {
        return Ok(None);
    };
    let name = match suite_key {
        Some(suite_key) => join_test_name(suite_key, &case),
        // Fall back to the classname GoogleTest writes on each test case.
        None => match attr(start, "classname")? {
            Some(class_name) => format!("{class_name}.{case}"),
            None => return Ok(None),
        },
    };
    let executed = attr(start, "status")?.as_deref() != Some("notrun");
    Ok(Some(XmlTestCase {
        name,
        executed,
        failures: Vec::new(),
    }))
}

fn push_failure_detail(current: &mut Option<XmlTestCase>, detail: &str) {
    let Some(last) = current.as_mut().and_then(|test_case| test_case.failures.last_mut()) else {
        return;
    };
    if detail.is_empty() || last.contains(detail) {
        return;
    }
    if !last.is_empty() {
        last.push('\n');
    }
    last.push_str(detail);
}
