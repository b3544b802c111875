//! CI branch naming rules.
//!
//! A contribution id is positive for pull requests and negative for ticket-driven
//! (PR-less) branches, where `-id` is the numeric suffix after the branch prefix.

use std::num::ParseIntError;

/// Length of an abbreviated commit id.
pub const SHORT_COMMIT_LEN: usize = 7;

/// `pull/<id>/head`: the pull request head as mirrored by the CI server.
pub fn pr_head_branch(pr_number: i64) -> String {
    format!("pull/{pr_number}/head")
}

/// `pull/<id>/merge`: the pull request merged into its target.
pub fn pr_merge_branch(pr_number: i64) -> String {
    format!("pull/{pr_number}/merge")
}

/// Branch of a PR-less contribution, `<prefix><-id>`. `None` for pull request ids.
pub fn pr_less_branch(branch_prefix: &str, contribution_id: i64) -> Option<String> {
    (contribution_id < 0).then(|| format!("{branch_prefix}{}", contribution_id.unsigned_abs()))
}

/// Derives the negative contribution id of a PR-less branch.
///
/// `None` when the branch does not carry the prefix, `Some(Err)` when the
/// suffix is not a number.
pub fn pr_less_id(branch: &str, branch_prefix: &str) -> Option<Result<i64, ParseIntError>> {
    let suffix = branch.strip_prefix(branch_prefix)?;
    Some(suffix.parse::<i64>().map(|n| -n))
}

/// Pull request number of a `pull/<n>/head` or `pull/<n>/merge` branch.
pub fn pr_number_from_branch(branch: &str) -> Option<i64> {
    let rest = branch.strip_prefix("pull/")?;
    let (num, tail) = rest.split_once('/')?;
    if tail != "head" && tail != "merge" {
        return None;
    }
    num.parse().ok().filter(|n: &i64| *n > 0)
}

/// First 7 characters of a commit id, lower-cased.
///
/// Ids that are not longer than 7 characters or do not start with 7 hex digits
/// yield `None`.
pub fn short_commit(commit: &str) -> Option<String> {
    if commit.len() <= SHORT_COMMIT_LEN {
        return None;
    }
    let head = commit.get(..SHORT_COMMIT_LEN)?;
    head.chars()
        .all(|c| c.is_ascii_hexdigit())
        .then(|| head.to_ascii_lowercase())
}
