//! Queued notifications to repository owners.

use crate::error::{ErrorKind, Result};
use crate::repository::Repository;
use async_trait::async_trait;
use std::collections::BTreeMap;

pub const IMPROPER_FILE: &str = "Probe Scraper: Improper File";
pub const PARSE_ERRORS: &str = "Probe Scraper: Error on parsing metric or ping files";
pub const DUPLICATE_METRICS: &str = "Probe Scraper: Duplicate metric identifiers detected";
pub const EXPIRED_METRICS: &str = "Probe Scraper: Expired metrics found";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Notification {
    pub subject: String,
    pub body: String,
}

impl Notification {
    pub fn new(subject: &str, body: impl Into<String>) -> Self {
        Self { subject: subject.to_string(), body: body.into() }
    }
}

/// Delivers one message.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, from: &str, to: &[String], notification: &Notification) -> Result<()>;
}

/// Delivers to the log.
#[derive(Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, from: &str, to: &[String], notification: &Notification) -> Result<()> {
        tracing::warn!(
            from,
            to = %to.join(", "),
            subject = %notification.subject,
            body = %notification.body,
            "notification"
        );
        Ok(())
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Pending {
    pub recipients: Vec<String>,
    pub notifications: Vec<Notification>,
}

/// Notifications per repository, delivered together at the end of a run.
#[derive(Debug, Default)]
pub struct NotificationQueue {
    pending: BTreeMap<String, Pending>,
}

impl NotificationQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, repository: &Repository, notification: Notification) {
        tracing::info!(repository = repository.name, subject = notification.subject, "queued notification");
        let pending = self.pending.entry(repository.name.clone()).or_insert_with(|| Pending {
            recipients: repository.notification_emails.clone(),
            notifications: Vec::new(),
        });
        pending.notifications.push(notification);
    }

    pub fn get(&self, repository: &str) -> Option<&Pending> {
        self.pending.get(repository)
    }

    pub fn len(&self) -> usize {
        self.pending.values().map(|pending| pending.notifications.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Send everything queued to the repository's recipients plus
    /// `default_to`. With `dry_run` nothing is sent. Every notification is
    /// attempted; the first delivery failure is returned afterwards.
    pub async fn deliver(self, notifier: &dyn Notifier, from: &str, default_to: &str, dry_run: bool) -> Result<usize> {
        let mut sent = 0;
        let mut failed = None;
        for (repository, pending) in self.pending {
            let mut to = pending.recipients;
            if !to.iter().any(|address| address == default_to) {
                to.push(default_to.to_string());
            }
            for notification in &pending.notifications {
                if dry_run {
                    tracing::info!(repository, to = %to.join(", "), subject = %notification.subject, "dry run, not sending");
                    continue;
                }
                match notifier.send(from, &to, notification).await {
                    Ok(()) => sent += 1,
                    Err(err) => {
                        tracing::error!(repository, subject = %notification.subject, error = %err, "notification failed");
                        failed.get_or_insert(err);
                    },
                }
            }
        }
        match failed {
            Some(err) => Err(err.raise(ErrorKind::Notify(format!("{sent} sent before the first failure")))),
            None => Ok(sent),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recording {
        sent: Mutex<Vec<(Vec<String>, String)>>,
        fail_on: Option<&'static str>,
    }

    #[async_trait]
    impl Notifier for Recording {
        async fn send(&self, _from: &str, to: &[String], notification: &Notification) -> Result<()> {
            if self.fail_on == Some(notification.subject.as_str()) {
                exn::bail!(ErrorKind::Notify("mail server unavailable".to_string()));
            }
            self.sent.lock().unwrap().push((to.to_vec(), notification.subject.clone()));
            Ok(())
        }
    }

    fn fenix() -> Repository {
        let mut repository = Repository::new("fenix", "https://github.com/mozilla-mobile/fenix");
        repository.notification_emails = vec!["fenix@mozilla.com".to_string()];
        repository
    }

    #[tokio::test]
    async fn delivers_to_owners_and_default() {
        let mut queue = NotificationQueue::new();
        queue.push(&fenix(), Notification::new(IMPROPER_FILE, "bad yaml"));
        queue.push(&fenix(), Notification::new(EXPIRED_METRICS, "app.launch"));
        assert_eq!(queue.len(), 2);

        let notifier = Recording::default();
        let sent = queue.deliver(&notifier, "telemetry-alerts@mozilla.com", "glean-team@mozilla.com", false).await.unwrap();
        assert_eq!(sent, 2);
        let sent = notifier.sent.lock().unwrap();
        assert_eq!(sent[0].0, vec!["fenix@mozilla.com".to_string(), "glean-team@mozilla.com".to_string()]);
        assert_eq!(sent[1].1, EXPIRED_METRICS);
    }

    #[tokio::test]
    async fn dry_run_sends_nothing() {
        let mut queue = NotificationQueue::new();
        queue.push(&fenix(), Notification::new(PARSE_ERRORS, "missing type"));
        let notifier = Recording::default();
        assert_eq!(queue.deliver(&notifier, "from", "to", true).await.unwrap(), 0);
        assert!(notifier.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn failure_does_not_stop_delivery() {
        let mut queue = NotificationQueue::new();
        queue.push(&fenix(), Notification::new(DUPLICATE_METRICS, "app.launch"));
        queue.push(&fenix(), Notification::new(EXPIRED_METRICS, "app.stop"));
        let notifier = Recording { fail_on: Some(DUPLICATE_METRICS), ..Default::default() };
        let err = queue.deliver(&notifier, "from", "to", false).await.unwrap_err();
        assert!(matches!(*err, ErrorKind::Notify(_)));
        assert_eq!(notifier.sent.lock().unwrap().len(), 1);
    }
}
