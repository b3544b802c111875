//! Ticket key matching against free text, pull requests and branch names.

use crate::model::{PullRequest, Ticket};

/// Matches `<CODE>-<digits>` ticket keys of one tracker project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TicketPattern {
    code: String,
}

impl TicketPattern {
    /// Pattern for one project code, case-insensitive.
    pub fn new(project_code: &str) -> Self {
        Self {
            code: project_code.trim().to_ascii_uppercase(),
        }
    }

    /// Project code, upper-cased.
    pub fn code(&self) -> &str {
        &self.code
    }

    /// Finds the first ticket key in `text`, normalised to upper case.
    ///
    /// `IGNITE-123` and `ignite 123` both match; `XIGNITE-1` does not.
    pub fn find_in(&self, text: &str) -> Option<String> {
        if self.code.is_empty() {
            return None;
        }
        let upper = text.to_ascii_uppercase();
        for (pos, _) in upper.match_indices(self.code.as_str()) {
            let preceded_by_word = upper[..pos]
                .chars()
                .next_back()
                .is_some_and(|c| c.is_ascii_alphanumeric());
            if preceded_by_word {
                continue;
            }
            let rest = &upper[pos + self.code.len()..];
            let Some(rest) = rest.strip_prefix('-').or_else(|| rest.strip_prefix(' ')) else {
                continue;
            };
            let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
            if !digits.is_empty() {
                return Some(format!("{}-{}", self.code, digits));
            }
        }
        None
    }

    /// Normalises a user supplied ticket: a bare number gets the project prefix.
    pub fn normalize_hint(&self, hint: &str) -> Option<String> {
        let hint = hint.trim();
        if hint.is_empty() {
            return None;
        }
        if hint.chars().all(|c| c.is_ascii_digit()) {
            return Some(format!("{}-{}", self.code, hint));
        }
        Some(self.find_in(hint).unwrap_or_else(|| hint.to_string()))
    }

    /// Numeric part of a key of this project.
    pub fn number_of(&self, key: &str) -> Option<String> {
        let upper = key.trim().to_ascii_uppercase();
        let num = upper.strip_prefix(self.code.as_str())?.strip_prefix('-')?;
        (!num.is_empty() && num.chars().all(|c| c.is_ascii_digit())).then(|| num.to_string())
    }

    /// Ticket a pull request belongs to: key from the title, then from the head ref.
    pub fn ticket_for_pull_request<'a>(
        &self,
        tickets: &'a [Ticket],
        pr: &PullRequest,
    ) -> Option<&'a Ticket> {
        let key = self
            .find_in(&pr.title)
            .or_else(|| pr.head_ref().and_then(|r| self.find_in(r)))?;
        tickets.iter().find(|t| t.key.eq_ignore_ascii_case(&key))
    }

    /// PR-less branch of a ticket: `<branch_prefix><ticket number>`.
    pub fn pr_less_branch(&self, ticket: &Ticket, branch_prefix: &str) -> Option<String> {
        self.number_of(&ticket.key)
            .map(|num| format!("{branch_prefix}{num}"))
    }
}
