//! Access control attached to stored values

use crate::{NilError, ProgramId, Result, UserId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Who may retrieve, update, delete or compute over a stored value set
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValuesPermissions {
    /// Owner of the values
    pub owner: UserId,
    /// Users allowed to retrieve
    pub retrieve: BTreeSet<UserId>,
    /// Users allowed to update
    pub update: BTreeSet<UserId>,
    /// Users allowed to delete
    pub delete: BTreeSet<UserId>,
    /// Programs each user may run over the values
    pub compute: BTreeMap<UserId, BTreeSet<ProgramId>>,
}

impl ValuesPermissions {
    /// Owner-only permissions: the owner may retrieve, update and delete
    pub fn default_for(owner: UserId) -> Self {
        Self {
            owner,
            retrieve: BTreeSet::from([owner]),
            update: BTreeSet::from([owner]),
            delete: BTreeSet::from([owner]),
            compute: BTreeMap::new(),
        }
    }

    /// Allow `user` to retrieve
    pub fn grant_retrieve(mut self, user: UserId) -> Self {
        self.retrieve.insert(user);
        self
    }

    /// Allow `user` to update
    pub fn grant_update(mut self, user: UserId) -> Self {
        self.update.insert(user);
        self
    }

    /// Allow `user` to delete
    pub fn grant_delete(mut self, user: UserId) -> Self {
        self.delete.insert(user);
        self
    }

    /// Allow `user` to run `programs` over the values
    pub fn grant_compute(
        mut self,
        user: UserId,
        programs: impl IntoIterator<Item = ProgramId>,
    ) -> Self {
        self.compute.entry(user).or_default().extend(programs);
        self
    }
}

/// Grants and revocations for one permission kind
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionCommand {
    /// Users gaining the permission
    pub grant: BTreeSet<UserId>,
    /// Users losing the permission
    pub revoke: BTreeSet<UserId>,
}

impl PermissionCommand {
    /// Add a grant
    pub fn grant(mut self, user: UserId) -> Self {
        self.grant.insert(user);
        self
    }

    /// Add a revocation
    pub fn revoke(mut self, user: UserId) -> Self {
        self.revoke.insert(user);
        self
    }

    /// Whether the command changes nothing
    pub fn is_empty(&self) -> bool {
        self.grant.is_empty() && self.revoke.is_empty()
    }

    /// Reject commands that both grant and revoke the same user
    pub fn validate(&self) -> Result<()> {
        match self.grant.intersection(&self.revoke).next() {
            Some(user) => Err(NilError::invalid(format!(
                "Cannot grant and revoke the same user id: {user}"
            ))),
            None => Ok(()),
        }
    }
}

/// Grants and revocations of compute permissions
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComputePermissionCommand {
    /// Programs each user gains
    pub grant: BTreeMap<UserId, BTreeSet<ProgramId>>,
    /// Programs each user loses
    pub revoke: BTreeMap<UserId, BTreeSet<ProgramId>>,
}

impl ComputePermissionCommand {
    /// Add a grant
    pub fn grant(mut self, user: UserId, programs: impl IntoIterator<Item = ProgramId>) -> Self {
        self.grant.entry(user).or_default().extend(programs);
        self
    }

    /// Add a revocation
    pub fn revoke(mut self, user: UserId, programs: impl IntoIterator<Item = ProgramId>) -> Self {
        self.revoke.entry(user).or_default().extend(programs);
        self
    }

    /// Whether the command changes nothing
    pub fn is_empty(&self) -> bool {
        self.grant.is_empty() && self.revoke.is_empty()
    }

    /// Reject commands that both grant and revoke for the same user
    pub fn validate(&self) -> Result<()> {
        match self.grant.keys().find(|user| self.revoke.contains_key(user)) {
            Some(user) => Err(NilError::invalid(format!(
                "Cannot grant and revoke the same user id: {user}"
            ))),
            None => Ok(()),
        }
    }
}
