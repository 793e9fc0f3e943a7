use std::collections::BTreeSet;

use async_trait::async_trait;

use docvault_core::UserId;

use crate::error::LibraryError;

/// Answers whether two users belong to the same family.
///
/// Shares may only be granted to family members of the document owner.
#[async_trait]
pub trait MembershipDirectory: Send + Sync {
    async fn is_family_member(&self, owner: &UserId, member: &UserId)
    -> Result<bool, LibraryError>;
}

/// Accepts any user other than the owner.
///
/// Used when no family groups are configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenDirectory;

#[async_trait]
impl MembershipDirectory for OpenDirectory {
    async fn is_family_member(
        &self,
        owner: &UserId,
        member: &UserId,
    ) -> Result<bool, LibraryError> {
        Ok(owner != member)
    }
}

/// Fixed family groups, typically loaded from configuration.
#[derive(Debug, Clone, Default)]
pub struct StaticFamilies {
    families: Vec<BTreeSet<UserId>>,
}

impl StaticFamilies {
    /// Build a directory from groups of member ids.
    pub fn new<F, M>(families: F) -> Self
    where
        F: IntoIterator<Item = M>,
        M: IntoIterator<Item = UserId>,
    {
        Self {
            families: families
                .into_iter()
                .map(|members| members.into_iter().collect())
                .filter(|family: &BTreeSet<UserId>| !family.is_empty())
                .collect(),
        }
    }

    /// Number of configured families.
    pub fn len(&self) -> usize {
        self.families.len()
    }

    pub fn is_empty(&self) -> bool {
        self.families.is_empty()
    }
}

#[async_trait]
impl MembershipDirectory for StaticFamilies {
    async fn is_family_member(
        &self,
        owner: &UserId,
        member: &UserId,
    ) -> Result<bool, LibraryError> {
        Ok(owner != member
            && self
                .families
                .iter()
                .any(|family| family.contains(owner) && family.contains(member)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(names: &[&str]) -> Vec<UserId> {
        names.iter().map(|n| UserId::new(*n)).collect()
    }

    #[tokio::test]
    async fn open_directory_rejects_only_self() {
        let dir = OpenDirectory;
        let alice = UserId::new("alice");
        assert!(dir.is_family_member(&alice, &UserId::new("bob")).await.unwrap());
        assert!(!dir.is_family_member(&alice, &alice).await.unwrap());
    }

    #[tokio::test]
    async fn static_families_require_shared_group() {
        let dir = StaticFamilies::new([ids(&["alice", "bob"]), ids(&["carol", "dave"]), vec![]]);
        assert_eq!(dir.len(), 2);

        let alice = UserId::new("alice");
        assert!(dir.is_family_member(&alice, &UserId::new("bob")).await.unwrap());
        assert!(!dir.is_family_member(&alice, &UserId::new("carol")).await.unwrap());
        assert!(!dir.is_family_member(&alice, &UserId::new("mallory")).await.unwrap());
    }
}
