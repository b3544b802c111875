//! Blocker counting and tracker comment rendering.
//!
//! Comments use the tracker's wiki markup, where `|` separates link text from the
//! target and panel parameters, so free text never carries a literal pipe.

use std::fmt::Write as _;

use crate::model::{FailureSummary, SuiteStatus, TestFailure};

const FAILED_SUITE_COLOR: &str = "#d04437";
const BLOCKERS_PANEL_BG: &str = "#F7D6C1";
const NO_BLOCKERS_PANEL_BG: &str = "#D6F7C1";

/// Blockers of a build: every suite counts its listed failing tests, and a
/// suite without listed tests counts as one.
pub fn blocker_count(suites: &[SuiteStatus]) -> u32 {
    suites
        .iter()
        .map(|s| u32::try_from(s.test_failures.len()).unwrap_or(u32::MAX).max(1))
        .fold(0u32, u32::saturating_add)
}

/// Replaces markup delimiters in free text.
pub fn escape_markup_text(txt: &str) -> String {
    txt.replace('|', "/")
}

/// Escapes text for transport: XML special characters and everything outside
/// printable ASCII become entities.
pub fn xml_escape_text(txt: &str) -> String {
    let mut out = String::with_capacity(txt.len());
    for c in txt.chars() {
        match c {
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '&' => out.push_str("&amp;"),
            '\'' => out.push_str("&apos;"),
            c if u32::from(c) > 0x7e => {
                let _ = write!(out, "&#{};", u32::from(c));
            }
            c => out.push(c),
        }
    }
    out
}

/// Renders the visa comment for one build.
///
/// `visa_suite_name` is the display name of the build type the visa was
/// requested for; `build_web_url` links to the analysed build.
pub fn render_visa_comment(
    suites: &[SuiteStatus],
    build_web_url: &str,
    visa_suite_name: &str,
) -> String {
    let name = escape_markup_text(visa_suite_name);
    let mut body = String::new();

    for suite in suites {
        let _ = write!(
            body,
            "{{color:{FAILED_SUITE_COLOR}}}{}{{color}} [[tests {}",
            escape_markup_text(&suite.name),
            suite.failed_tests
        );
        if let Some(result) = suite.result.as_deref().filter(|r| !r.is_empty()) {
            body.push(' ');
            body.push_str(&escape_markup_text(result));
        }
        let _ = writeln!(body, "|{}]]", suite.web_to_build);

        for failure in &suite.test_failures {
            body.push_str("* ");
            body.push_str(&failure_title(failure));
            if let Some(recent) = &failure.recent {
                body.push_str(&history_note(recent));
            }
            body.push('\n');
        }
        body.push('\n');
    }

    let mut res = if body.is_empty() {
        format!(
            "{{panel:title={name}: No blockers found!|borderStyle=dashed|borderColor=#ccc|titleBGColor={NO_BLOCKERS_PANEL_BG}}}{{panel}}"
        )
    } else {
        format!(
            "{{panel:title={name}: Possible Blockers|borderStyle=dashed|borderColor=#ccc|titleBGColor={BLOCKERS_PANEL_BG}}}\n{body}{{panel}}"
        )
    };
    let _ = write!(res, "\n[TeamCity *{name}* Results|{build_web_url}]");

    xml_escape_text(&res)
}

fn failure_title(failure: &TestFailure) -> String {
    match (&failure.suite_name, &failure.test_name) {
        (Some(suite), Some(test)) => {
            format!("{}: {}", escape_markup_text(suite), escape_markup_text(test))
        }
        _ => escape_markup_text(&failure.name),
    }
}

fn history_note(recent: &FailureSummary) -> String {
    match (&recent.failure_rate, recent.failures, recent.runs) {
        (Some(rate), _, Some(runs)) => format!(" - {rate}% fails in last {runs} master runs."),
        (None, Some(failures), Some(runs)) => format!(" - {failures} fails / {runs} master runs."),
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn suite(name: &str, tests: usize) -> SuiteStatus {
        SuiteStatus {
            name: name.into(),
            failed_tests: tests as u32,
            result: None,
            web_to_build: format!("http://ci/{name}"),
            test_failures: (0..tests)
                .map(|i| TestFailure {
                    name: format!("{name}.test{i}"),
                    ..Default::default()
                })
                .collect(),
        }
    }

    #[test]
    fn blocker_count_counts_empty_suite_as_one() {
        let suites = vec![suite("a", 0), suite("b", 1), suite("c", 3)];
        assert_eq!(blocker_count(&suites), 5);
        assert_eq!(blocker_count(&[]), 0);
    }

    #[test]
    fn pipes_are_replaced() {
        assert_eq!(escape_markup_text("a|b||c"), "a/b//c");
    }

    #[test]
    fn xml_escape_covers_specials_and_non_ascii() {
        assert_eq!(xml_escape_text("<a & 'b'>\"é\""), "&lt;a &amp; &apos;b&apos;&gt;&quot;&#233;&quot;");
        assert_eq!(xml_escape_text("line\nnext"), "line\nnext");
    }

    #[test]
    fn no_blockers_panel() {
        let c = render_visa_comment(&[], "http://ci/build/1", "Run All");
        assert!(c.contains("Run All: No blockers found!"));
        assert!(c.contains("titleBGColor=#D6F7C1"));
        assert!(c.ends_with("[TeamCity *Run All* Results|http://ci/build/1]"));
        assert!(!c.contains("Possible Blockers"));
    }

    #[test]
    fn blockers_panel_lists_suites_and_history() {
        let mut flaky = suite("Cache 7", 1);
        flaky.test_failures[0] = TestFailure {
            name: "ignored".into(),
            suite_name: Some("CacheTestSuite".into()),
            test_name: Some("testPut|Get".into()),
            recent: Some(FailureSummary {
                failure_rate: Some("25".into()),
                failures: Some(10),
                runs: Some(40),
            }),
        };
        let mut counted = suite("Basic 1", 1);
        counted.test_failures[0].recent = Some(FailureSummary {
            failure_rate: None,
            failures: Some(3),
            runs: Some(50),
        });
        let plain = suite("Binary 2", 1);
        let mut exit_code = suite("Queries", 0);
        exit_code.result = Some("Exit code".into());

        let c = render_visa_comment(&[flaky, counted, plain, exit_code], "http://ci/b", "Run All");

        assert!(c.starts_with("{panel:title=Run All: Possible Blockers|"));
        assert!(c.contains("{color:#d04437}Cache 7{color} [[tests 1|http://ci/Cache 7]]\n"));
        assert!(c.contains("* CacheTestSuite: testPut/Get - 25% fails in last 40 master runs.\n"));
        assert!(c.contains("* Basic 1.test0 - 3 fails / 50 master runs.\n"));
        assert!(c.contains("\n* Binary 2.test0\n"));
        assert!(c.contains("[[tests 0 Exit code|http://ci/Queries]]"));
        assert!(c.contains("{panel}\n[TeamCity *Run All* Results|http://ci/b]"));
    }
}
