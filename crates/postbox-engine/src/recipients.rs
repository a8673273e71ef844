//! Recipient Set Builder: recipient spec in, deduplicated set of user ids out.

use std::collections::{BTreeSet, HashSet};

use postbox_types::models::{RecipientSpec, UserId};

use crate::directory::IdentityResolver;
use crate::error::{Result, ValidationError};

/// What changes when a message's recipient spec is edited.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecipientDelta {
    pub added: BTreeSet<UserId>,
    pub removed: BTreeSet<UserId>,
}

/// `added = new - old`, `removed = old - new`.
///
/// Both sides are fully resolved sets, so a user dropped from the nickname
/// list but still reachable through a remaining group is not removed.
pub fn diff(old: &BTreeSet<UserId>, new: &BTreeSet<UserId>) -> RecipientDelta {
    RecipientDelta {
        added: new.difference(old).copied().collect(),
        removed: old.difference(new).copied().collect(),
    }
}

/// Trim every name, drop blanks and reject duplicates within each list.
/// Comparison is case-sensitive. Input order is preserved.
pub fn normalize(nicknames: &[String], groups: &[String]) -> std::result::Result<RecipientSpec, ValidationError> {
    Ok(RecipientSpec::new(
        normalize_list(nicknames)?,
        normalize_list(groups)?,
    ))
}

fn normalize_list(names: &[String]) -> std::result::Result<Vec<String>, ValidationError> {
    let mut seen = HashSet::new();
    let mut out = Vec::with_capacity(names.len());
    for name in names.iter().map(|n| n.trim()).filter(|n| !n.is_empty()) {
        if !seen.insert(name) {
            return Err(ValidationError::DuplicateRecipient(name.to_string()));
        }
        out.push(name.to_string());
    }
    Ok(out)
}

pub struct RecipientSetBuilder<'a> {
    resolver: &'a IdentityResolver,
}

impl<'a> RecipientSetBuilder<'a> {
    pub fn new(resolver: &'a IdentityResolver) -> Self {
        Self { resolver }
    }

    /// Resolve a normalized spec. Every nickname and group must exist.
    ///
    /// The result is a snapshot of group membership taken now; an empty set
    /// (for instance, only empty groups) is not an error here.
    pub fn build(&self, spec: &RecipientSpec) -> Result<BTreeSet<UserId>> {
        let mut recipients = BTreeSet::new();

        for nickname in &spec.nicknames {
            let id = self
                .resolver
                .resolve_user(nickname)?
                .ok_or_else(|| ValidationError::UnknownUser(nickname.clone()))?;
            recipients.insert(id);
        }

        for name in &spec.groups {
            let group = self
                .resolver
                .resolve_group(name)?
                .ok_or_else(|| ValidationError::UnknownGroup(name.clone()))?;
            recipients.extend(self.resolver.members_of(group)?);
        }

        Ok(recipients)
    }
}
