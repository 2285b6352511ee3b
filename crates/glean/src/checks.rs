//! Whole-history consistency checks over merged metrics.

use crate::notify::{DUPLICATE_METRICS, EXPIRED_METRICS, Notification, NotificationQueue};
use crate::repository::Repositories;
use crate::state::RepoState;
use derive_more::Display;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use time::Date;
use time::macros::format_description;

#[derive(Clone, Copy, Debug, Display, PartialEq, Eq, PartialOrd, Ord)]
pub enum FindingKind {
    #[display("duplicate metric")]
    DuplicateMetric,
    #[display("expired metric")]
    ExpiredMetric,
}

impl FindingKind {
    fn subject(self) -> &'static str {
        match self {
            Self::DuplicateMetric => DUPLICATE_METRICS,
            Self::ExpiredMetric => EXPIRED_METRICS,
        }
    }

    /// Findings of this kind abort the run once notifications are sent.
    pub fn escalates(self) -> bool {
        matches!(self, Self::DuplicateMetric)
    }
}

#[derive(Clone, Debug, Display, PartialEq, Eq)]
#[display("{repository}: {kind}: {message}")]
pub struct Finding {
    pub repository: String,
    pub kind: FindingKind,
    pub message: String,
}

/// A metric name currently defined (see [`RepoState::latest_metrics`]) by
/// two or more repositories within one repository's dependency scope.
pub fn check_duplicates(repositories: &Repositories, states: &BTreeMap<String, RepoState>) -> Vec<Finding> {
    let mut findings = Vec::new();
    for repository in repositories.iter() {
        let scope = std::iter::once(&repository.name).chain(&repository.dependencies).collect::<BTreeSet<_>>();
        let mut defined_in: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
        for name in scope {
            let Some(metrics) = states.get(name.as_str()).and_then(RepoState::latest_metrics) else {
                continue;
            };
            for metric in metrics.keys() {
                defined_in.entry(metric.as_str()).or_default().push(name.as_str());
            }
        }
        for (metric, owners) in defined_in.into_iter().filter(|(_, owners)| owners.len() > 1) {
            findings.push(Finding {
                repository: repository.name.clone(),
                kind: FindingKind::DuplicateMetric,
                message: format!("{metric} is defined in {}", owners.join(", ")),
            });
        }
    }
    findings
}

fn is_expired(expires: &Value, today: Date) -> bool {
    let format = format_description!("[year]-[month]-[day]");
    match expires.as_str() {
        Some("expired") => true,
        Some(date) => Date::parse(date, format).is_ok_and(|date| date <= today),
        None => false,
    }
}

/// Currently defined metrics of each updated repository whose expiry
/// has passed. Version-number and `never` expiries are not checked.
pub fn check_expired<'a>(
    updated: impl IntoIterator<Item = &'a str>,
    states: &BTreeMap<String, RepoState>,
    today: Date,
) -> Vec<Finding> {
    let mut findings = Vec::new();
    for repository in updated {
        let Some(metrics) = states.get(repository).and_then(RepoState::latest_metrics) else {
            continue;
        };
        for (metric, definition) in metrics {
            let expires = definition.get("expires").unwrap_or(&Value::Null);
            if is_expired(expires, today) {
                findings.push(Finding {
                    repository: repository.to_string(),
                    kind: FindingKind::ExpiredMetric,
                    message: format!("{metric} expired ({expires})"),
                });
            }
        }
    }
    findings
}

/// Queue one notification per repository and finding kind. Returns whether
/// any finding escalates.
pub fn report(findings: &[Finding], repositories: &Repositories, queue: &mut NotificationQueue) -> bool {
    let mut grouped: BTreeMap<(&str, FindingKind), Vec<&str>> = BTreeMap::new();
    for finding in findings {
        tracing::warn!(%finding, "validation finding");
        grouped.entry((finding.repository.as_str(), finding.kind)).or_default().push(finding.message.as_str());
    }
    for ((name, kind), messages) in grouped {
        if let Some(repository) = repositories.get(name) {
            queue.push(repository, Notification::new(kind.subject(), messages.join("\n")));
        }
    }
    findings.iter().any(|finding| finding.kind.escalates())
}
