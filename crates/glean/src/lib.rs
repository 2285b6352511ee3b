//! The Glean path: per-repository metric, ping and tag definitions merged
//! incrementally into previously published state.

pub mod checks;
pub mod error;
pub mod notify;
pub mod parser;
mod reconcile;
mod repository;
mod state;

pub use crate::checks::{Finding, FindingKind, check_duplicates, check_expired};
pub use crate::notify::{LogNotifier, Notification, NotificationQueue, Notifier};
pub use crate::parser::{DefinitionParser, DefinitionParsers, FileKind};
pub use crate::reconcile::{Commit, ErrorMode, Phase, Reconciled, Reconciler, Reconciliation};
pub use crate::repository::{Dependency, Repositories, Repository, Selection};
pub use crate::state::{CommitMap, CommitRef, RepoState};
