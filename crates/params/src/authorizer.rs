use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use strata_peg_primitives::SidechainAddress;

use crate::{ParamsError, serde_helpers::serde_address_list};

/// How many members of an authorizer set must agree.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthorizerPolicy {
    /// Any single member.
    One,

    /// More than half of the members.
    Majority,

    /// Every member.
    All,
}

/// Who may change a governed parameter and how many of them have to agree.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct AuthorizerConfig {
    #[serde(with = "serde_address_list")]
    members: Vec<SidechainAddress>,
    policy: AuthorizerPolicy,
}

impl AuthorizerConfig {
    /// Creates a new config.
    ///
    /// # Errors
    ///
    /// Fails with [`ParamsError::EmptyAuthorizer`] if `members` is empty and
    /// [`ParamsError::DuplicateAuthorizerMember`] if an address repeats.
    pub fn try_new(
        name: &'static str,
        members: Vec<SidechainAddress>,
        policy: AuthorizerPolicy,
    ) -> Result<Self, ParamsError> {
        let cfg = Self { members, policy };
        cfg.validate(name)?;
        Ok(cfg)
    }

    pub(crate) fn new_unchecked(members: Vec<SidechainAddress>, policy: AuthorizerPolicy) -> Self {
        Self { members, policy }
    }

    pub fn validate(&self, name: &'static str) -> Result<(), ParamsError> {
        if self.members.is_empty() {
            return Err(ParamsError::EmptyAuthorizer(name));
        }
        let unique: BTreeSet<_> = self.members.iter().collect();
        if unique.len() != self.members.len() {
            return Err(ParamsError::DuplicateAuthorizerMember(name));
        }
        Ok(())
    }

    pub fn members(&self) -> &[SidechainAddress] {
        &self.members
    }

    pub fn policy(&self) -> AuthorizerPolicy {
        self.policy
    }

    /// Number of agreeing members needed to apply a change.
    pub fn required_votes(&self) -> usize {
        let n = self.members.len();
        match self.policy {
            AuthorizerPolicy::One => 1,
            AuthorizerPolicy::Majority => n / 2 + 1,
            AuthorizerPolicy::All => n,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addrs(n: u8) -> Vec<SidechainAddress> {
        (1..=n).map(|i| SidechainAddress::new([i; 20])).collect()
    }

    #[test]
    fn test_required_votes() {
        let one = AuthorizerConfig::try_new("t", addrs(5), AuthorizerPolicy::One).unwrap();
        assert_eq!(one.required_votes(), 1);
        let maj = AuthorizerConfig::try_new("t", addrs(5), AuthorizerPolicy::Majority).unwrap();
        assert_eq!(maj.required_votes(), 3);
        let maj4 = AuthorizerConfig::try_new("t", addrs(4), AuthorizerPolicy::Majority).unwrap();
        assert_eq!(maj4.required_votes(), 3);
        let all = AuthorizerConfig::try_new("t", addrs(5), AuthorizerPolicy::All).unwrap();
        assert_eq!(all.required_votes(), 5);
    }

    #[test]
    fn test_invalid_members() {
        assert!(matches!(
            AuthorizerConfig::try_new("fee", vec![], AuthorizerPolicy::One),
            Err(ParamsError::EmptyAuthorizer("fee"))
        ));
        let mut dup = addrs(2);
        dup.push(dup[0]);
        assert!(matches!(
            AuthorizerConfig::try_new("fee", dup, AuthorizerPolicy::All),
            Err(ParamsError::DuplicateAuthorizerMember("fee"))
        ));
    }
}
