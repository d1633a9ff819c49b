//! Threshold voting on governed parameters.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use strata_peg_params::AuthorizerConfig;
use strata_peg_primitives::{SidechainAddress, SidechainTx};
use tracing::*;

use crate::{ElectionError, InvalidProposal};

/// Decides who may vote on a parameter and how many votes carry it.
pub trait Authorizer {
    fn is_authorized(&self, tx: &SidechainTx) -> bool;

    /// Votes for a single value needed to apply it.
    fn required_votes(&self) -> usize;
}

/// Authorizes callers whose sender address is in a fixed set.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct AddressBasedAuthorizer {
    members: BTreeSet<SidechainAddress>,
    required_votes: usize,
}

impl AddressBasedAuthorizer {
    pub fn new(members: impl IntoIterator<Item = SidechainAddress>, required_votes: usize) -> Self {
        Self {
            members: members.into_iter().collect(),
            required_votes,
        }
    }

    pub fn members(&self) -> &BTreeSet<SidechainAddress> {
        &self.members
    }
}

impl From<&AuthorizerConfig> for AddressBasedAuthorizer {
    fn from(config: &AuthorizerConfig) -> Self {
        Self::new(config.members().iter().copied(), config.required_votes())
    }
}

impl Authorizer for AddressBasedAuthorizer {
    fn is_authorized(&self, tx: &SidechainTx) -> bool {
        self.members.contains(&tx.sender())
    }

    fn required_votes(&self) -> usize {
        self.required_votes
    }
}

/// Open votes: each proposed value with the voters supporting it.
///
/// A voter supports at most one value at a time.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Election<V: Ord> {
    votes: BTreeMap<V, BTreeSet<SidechainAddress>>,
}

impl<V: Ord> Default for Election<V> {
    fn default() -> Self {
        Self {
            votes: BTreeMap::new(),
        }
    }
}

impl<V: Ord + Clone> Election<V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.votes.is_empty()
    }

    /// Voters currently supporting `value`.
    pub fn supporters(&self, value: &V) -> usize {
        self.votes.get(value).map_or(0, BTreeSet::len)
    }

    /// Records `voter`'s support for `value`, dropping any vote they had cast
    /// for a different value. Returns the support `value` now has.
    pub fn vote(&mut self, voter: SidechainAddress, value: V) -> usize {
        self.votes.retain(|v, voters| {
            if *v != value {
                voters.remove(&voter);
            }
            !voters.is_empty() || *v == value
        });
        let voters = self.votes.entry(value).or_default();
        voters.insert(voter);
        voters.len()
    }

    /// The first value, in value order, with at least `required` supporters.
    pub fn winner(&self, required: usize) -> Option<&V> {
        self.votes
            .iter()
            .find(|(_, voters)| voters.len() >= required)
            .map(|(v, _)| v)
    }

    pub fn clear(&mut self) {
        self.votes.clear();
    }
}

/// Result of an accepted vote.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum VoteOutcome<V> {
    /// Counted, threshold not reached yet.
    Recorded { supporters: usize },

    /// Threshold reached, the value takes effect and the election is reset.
    Applied(V),
}

impl<V> VoteOutcome<V> {
    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied(_))
    }

    /// Legacy callers only distinguish success from failure.
    pub fn legacy_code(&self) -> i32 {
        1
    }
}

/// Casts `tx`'s vote for `proposal` in `election`.
///
/// # Errors
///
/// * [`ElectionError::NullProposal`] when nothing was proposed.
/// * [`ElectionError::Unauthorized`] when the sender may not vote.
/// * [`ElectionError::InvalidValue`] when `validate` refuses the value.
///
/// None of these touch the election.
pub fn cast_vote<V, A, F>(
    election: &mut Election<V>,
    authorizer: &A,
    tx: &SidechainTx,
    proposal: Option<V>,
    validate: F,
) -> Result<VoteOutcome<V>, ElectionError>
where
    V: Ord + Clone,
    A: Authorizer + ?Sized,
    F: FnOnce(&V) -> Result<(), InvalidProposal>,
{
    let value = proposal.ok_or(ElectionError::NullProposal)?;

    if !authorizer.is_authorized(tx) {
        warn!(sender = %tx.sender(), "unauthorized vote");
        return Err(ElectionError::Unauthorized(tx.sender()));
    }

    validate(&value)?;

    let supporters = election.vote(tx.sender(), value);
    if let Some(winner) = election.winner(authorizer.required_votes()).cloned() {
        election.clear();
        return Ok(VoteOutcome::Applied(winner));
    }

    debug!(sender = %tx.sender(), %supporters, "vote recorded");
    Ok(VoteOutcome::Recorded { supporters })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(n: u8) -> SidechainAddress {
        SidechainAddress::new([n; 20])
    }

    fn tx(n: u8) -> SidechainTx {
        SidechainTx::new(addr(n), [n; 32])
    }

    fn any_value(_: &u64) -> Result<(), InvalidProposal> {
        Ok(())
    }

    #[test]
    fn test_two_of_three_applies() {
        let auth = AddressBasedAuthorizer::new([addr(1), addr(2), addr(3)], 2);
        let mut election = Election::new();

        let first = cast_vote(&mut election, &auth, &tx(1), Some(7u64), any_value).unwrap();
        assert_eq!(first, VoteOutcome::Recorded { supporters: 1 });

        let second = cast_vote(&mut election, &auth, &tx(2), Some(7u64), any_value).unwrap();
        assert_eq!(second, VoteOutcome::Applied(7));
        assert!(election.is_empty());
    }

    #[test]
    fn test_revote_is_idempotent() {
        let auth = AddressBasedAuthorizer::new([addr(1), addr(2)], 2);
        let mut election = Election::new();
        cast_vote(&mut election, &auth, &tx(1), Some(7u64), any_value).unwrap();
        let again = cast_vote(&mut election, &auth, &tx(1), Some(7u64), any_value).unwrap();
        assert_eq!(again, VoteOutcome::Recorded { supporters: 1 });
        assert_eq!(election.supporters(&7), 1);
    }

    #[test]
    fn test_new_value_replaces_prior_vote() {
        let auth = AddressBasedAuthorizer::new([addr(1), addr(2), addr(3)], 2);
        let mut election = Election::new();
        cast_vote(&mut election, &auth, &tx(1), Some(7u64), any_value).unwrap();
        cast_vote(&mut election, &auth, &tx(1), Some(8u64), any_value).unwrap();
        assert_eq!(election.supporters(&7), 0);
        assert_eq!(election.supporters(&8), 1);

        // Signer 2 backing the abandoned value does not carry it.
        let out = cast_vote(&mut election, &auth, &tx(2), Some(7u64), any_value).unwrap();
        assert_eq!(out, VoteOutcome::Recorded { supporters: 1 });
        assert_eq!(election.winner(2), None);
    }

    #[test]
    fn test_split_vote_applies_value_reaching_threshold() {
        let auth = AddressBasedAuthorizer::new([addr(1), addr(2), addr(3)], 2);
        let mut election = Election::new();
        cast_vote(&mut election, &auth, &tx(1), Some(5u64), any_value).unwrap();
        cast_vote(&mut election, &auth, &tx(2), Some(9u64), any_value).unwrap();
        assert_eq!(election.winner(2), None);
        assert_eq!(election.winner(1), Some(&5));

        let out = cast_vote(&mut election, &auth, &tx(3), Some(9u64), any_value).unwrap();
        assert_eq!(out, VoteOutcome::Applied(9));
        assert!(election.is_empty());
    }

    #[test]
    fn test_rejections_leave_election_untouched() {
        let auth = AddressBasedAuthorizer::new([addr(1)], 1);
        let mut election: Election<u64> = Election::new();

        assert_eq!(
            cast_vote(&mut election, &auth, &tx(1), None, any_value),
            Err(ElectionError::NullProposal)
        );
        assert_eq!(
            cast_vote(&mut election, &auth, &tx(9), Some(1), any_value),
            Err(ElectionError::Unauthorized(addr(9)))
        );
        assert_eq!(
            cast_vote(&mut election, &auth, &tx(1), Some(0), |v| {
                if *v == 0 { Err(InvalidProposal::NotPositive) } else { Ok(()) }
            }),
            Err(ElectionError::InvalidValue(InvalidProposal::NotPositive))
        );
        assert!(election.is_empty());
    }

    #[test]
    fn test_authorizer_from_config() {
        use strata_peg_params::AuthorizerPolicy;

        let cfg = AuthorizerConfig::try_new(
            "t",
            vec![addr(1), addr(2), addr(3)],
            AuthorizerPolicy::Majority,
        )
        .unwrap();
        let auth = AddressBasedAuthorizer::from(&cfg);
        assert_eq!(auth.required_votes(), 2);
        assert!(auth.is_authorized(&tx(3)));
        assert!(!auth.is_authorized(&tx(4)));
    }
}
