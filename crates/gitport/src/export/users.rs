//! Email extraction and deduplication for the top-level `users.json`.

use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::provider::{BranchRule, PullRequestData, is_fallback_email};

use super::ExportError;

/// Shape of the top-level `users.json` interchange file.
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct UsersFile {
    pub emails: Vec<String>,
}

/// Deduplicated set of every email discovered during the run.
#[derive(Debug, Default)]
pub(crate) struct UserDirectory {
    emails: BTreeSet<String>,
}

impl UserDirectory {
    /// Fold one repository's pull requests and branch rules in, returning
    /// how many distinct synthesized fallback emails this repository
    /// contributed.
    pub(crate) fn add_repo(&mut self, prs: &[PullRequestData], rules: &[BranchRule]) -> usize {
        let mut unknown: BTreeSet<&str> = BTreeSet::new();

        let add = |emails: &mut BTreeSet<String>, email: &str| {
            if email.is_empty() {
                return false;
            }
            emails.insert(email.to_string());
            is_fallback_email(email)
        };

        for pr in prs {
            if add(&mut self.emails, &pr.pull_request.author.email) {
                unknown.insert(&pr.pull_request.author.email);
            }
            for comment in &pr.comments {
                if add(&mut self.emails, &comment.author.email) {
                    unknown.insert(&comment.author.email);
                }
            }
            for reviewer in &pr.reviewers {
                if add(&mut self.emails, &reviewer.email) {
                    unknown.insert(&reviewer.email);
                }
            }
        }
        for rule in rules {
            for email in &rule.bypass_emails {
                if add(&mut self.emails, email) {
                    unknown.insert(email);
                }
            }
        }

        unknown.len()
    }

    pub(crate) fn len(&self) -> usize {
        self.emails.len()
    }

    /// Write `users.json` at the export root.
    pub(crate) fn write(&self, export_dir: &Path) -> Result<(), ExportError> {
        let file = UsersFile {
            emails: self.emails.iter().cloned().collect(),
        };
        let bytes = serde_json::to_vec(&file)?;
        fs::write(export_dir.join("users.json"), bytes)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{
        Comment, PullRequest, PullRequestState, User, fallback_email,
    };

    fn user(login: &str, email: &str) -> User {
        User {
            login: login.to_string(),
            name: None,
            email: email.to_string(),
        }
    }

    fn pr_with_comment(author: User, commenter: User) -> PullRequestData {
        PullRequestData {
            pull_request: PullRequest {
                number: 1,
                title: "t".to_string(),
                body: String::new(),
                author,
                source_branch: "f".to_string(),
                target_branch: "main".to_string(),
                state: PullRequestState::Merged,
                created_at: None,
                updated_at: None,
            },
            comments: vec![Comment {
                id: 1,
                body: "lgtm".to_string(),
                author: commenter,
                created_at: None,
            }],
            reviewers: Vec::new(),
        }
    }

    #[test]
    fn emails_deduplicate_across_repos() {
        let mut dir = UserDirectory::default();
        let prs = vec![pr_with_comment(
            user("alice", "alice@example.com"),
            user("bob", "bob@example.com"),
        )];
        dir.add_repo(&prs, &[]);
        dir.add_repo(&prs, &[]);

        assert_eq!(dir.len(), 2);
    }

    #[test]
    fn bypass_emails_are_included() {
        let mut dir = UserDirectory::default();
        let rules = vec![BranchRule {
            pattern: "main".to_string(),
            block_deletion: true,
            block_force_push: true,
            bypass_emails: vec!["ops@example.com".to_string()],
        }];
        dir.add_repo(&[], &rules);
        assert_eq!(dir.len(), 1);
    }

    #[test]
    fn fallback_emails_are_counted_separately_but_still_listed() {
        let mut dir = UserDirectory::default();
        let synthetic = fallback_email("Ghost User");
        let prs = vec![pr_with_comment(
            user("ghost", &synthetic),
            user("bob", "bob@example.com"),
        )];

        let unknown = dir.add_repo(&prs, &[]);
        assert_eq!(unknown, 1);
        assert_eq!(dir.len(), 2);
    }

    #[test]
    fn empty_emails_are_dropped() {
        let mut dir = UserDirectory::default();
        let prs = vec![pr_with_comment(user("a", ""), user("b", "b@example.com"))];
        dir.add_repo(&prs, &[]);
        assert_eq!(dir.len(), 1);
    }

    #[test]
    fn users_file_roundtrips() {
        let tmp = tempfile::tempdir().unwrap();
        let mut dir = UserDirectory::default();
        dir.add_repo(
            &[pr_with_comment(
                user("a", "a@example.com"),
                user("b", "b@example.com"),
            )],
            &[],
        );
        dir.write(tmp.path()).unwrap();

        let parsed: UsersFile =
            serde_json::from_slice(&fs::read(tmp.path().join("users.json")).unwrap()).unwrap();
        assert_eq!(parsed.emails, vec!["a@example.com", "b@example.com"]);
    }
}
