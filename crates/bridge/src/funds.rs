//! UTXO sets held by the active and, during a rotation, the retiring federation.

use std::{iter, mem};

use bitcoin::{OutPoint, Script};
use strata_peg_primitives::BitcoinAmount;
use tracing::*;

use crate::{Federation, FederationUtxo, FundsError};

/// Which of the two federation slots an output belongs to.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum FederationRole {
    Active,
    Retiring,
}

/// A federation together with the outputs it custodies.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FederationSlot {
    federation: Federation,
    utxos: Vec<FederationUtxo>,
}

impl FederationSlot {
    pub fn new(federation: Federation) -> Self {
        Self {
            federation,
            utxos: Vec::new(),
        }
    }

    pub fn federation(&self) -> &Federation {
        &self.federation
    }

    pub fn utxos(&self) -> &[FederationUtxo] {
        &self.utxos
    }

    pub fn total(&self) -> Result<BitcoinAmount, FundsError> {
        Ok(BitcoinAmount::try_sum(self.utxos.iter().map(|u| u.value()))?)
    }

    fn contains(&self, outpoint: &OutPoint) -> bool {
        self.utxos.iter().any(|u| u.outpoint() == *outpoint)
    }
}

/// Custody state of the bridge.
///
/// Invariant: an outpoint is tracked at most once across both slots.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FederationFunds {
    active: FederationSlot,
    retiring: Option<FederationSlot>,
}

impl FederationFunds {
    pub fn new(active: Federation) -> Self {
        Self {
            active: FederationSlot::new(active),
            retiring: None,
        }
    }

    pub fn active(&self) -> &FederationSlot {
        &self.active
    }

    pub fn retiring(&self) -> Option<&FederationSlot> {
        self.retiring.as_ref()
    }

    pub fn slot(&self, role: FederationRole) -> Option<&FederationSlot> {
        match role {
            FederationRole::Active => Some(&self.active),
            FederationRole::Retiring => self.retiring.as_ref(),
        }
    }

    fn slot_mut(&mut self, role: FederationRole) -> Result<&mut FederationSlot, FundsError> {
        match role {
            FederationRole::Active => Ok(&mut self.active),
            FederationRole::Retiring => self
                .retiring
                .as_mut()
                .ok_or(FundsError::NoRetiringFederation),
        }
    }

    fn slots(&self) -> impl Iterator<Item = (FederationRole, &FederationSlot)> {
        // Retiring first so spends drain it before touching the active set.
        self.retiring
            .iter()
            .map(|s| (FederationRole::Retiring, s))
            .chain(iter::once((FederationRole::Active, &self.active)))
    }

    /// Role of the federation paid by `script_pubkey`, if any.
    pub fn role_paid_by(&self, script_pubkey: &Script) -> Option<FederationRole> {
        self.slots()
            .find(|(_, s)| s.federation.is_paid_by(script_pubkey))
            .map(|(role, _)| role)
    }

    pub fn is_tracked(&self, outpoint: &OutPoint) -> bool {
        self.slots().any(|(_, s)| s.contains(outpoint))
    }

    /// Adds an output to the named federation's set.
    ///
    /// # Errors
    ///
    /// [`FundsError::DuplicateUtxo`] if the outpoint is already tracked by
    /// either federation, [`FundsError::NoRetiringFederation`] if `role` is
    /// retiring and no rotation is in progress.
    pub fn add_utxo(
        &mut self,
        role: FederationRole,
        utxo: FederationUtxo,
    ) -> Result<(), FundsError> {
        if self.is_tracked(&utxo.outpoint()) {
            return Err(FundsError::DuplicateUtxo(utxo.outpoint()));
        }
        trace!(?role, outpoint = %utxo.outpoint(), value = %utxo.value(), "adding federation utxo");
        self.slot_mut(role)?.utxos.push(utxo);
        Ok(())
    }

    /// Removes a tracked output, returning it with the role that held it.
    pub fn remove_utxo(
        &mut self,
        outpoint: &OutPoint,
    ) -> Result<(FederationRole, FederationUtxo), FundsError> {
        for role in [FederationRole::Retiring, FederationRole::Active] {
            let Ok(slot) = self.slot_mut(role) else {
                continue;
            };
            if let Some(pos) = slot.utxos.iter().position(|u| u.outpoint() == *outpoint) {
                return Ok((role, slot.utxos.remove(pos)));
            }
        }
        Err(FundsError::UtxoNotFound(*outpoint))
    }

    pub fn total(&self, role: FederationRole) -> Result<BitcoinAmount, FundsError> {
        match self.slot(role) {
            Some(slot) => slot.total(),
            None => Ok(BitcoinAmount::ZERO),
        }
    }

    /// Everything custodied by both federations.
    pub fn custody_total(&self) -> Result<BitcoinAmount, FundsError> {
        let active = self.total(FederationRole::Active)?;
        let retiring = self.total(FederationRole::Retiring)?;
        Ok(active.try_add(retiring)?)
    }

    /// Selects and removes outputs covering at least `target`.
    ///
    /// The retiring federation is drained first. Within a federation the
    /// oldest outputs go first, ties broken by the smaller value, then by
    /// outpoint so the choice is deterministic.
    pub fn select_utxos(
        &mut self,
        target: BitcoinAmount,
    ) -> Result<Vec<(FederationRole, FederationUtxo)>, FundsError> {
        let available = self.custody_total()?;
        if available < target {
            return Err(FundsError::InsufficientFunds {
                requested: target,
                available,
            });
        }

        let mut candidates: Vec<(FederationRole, &FederationUtxo)> = self
            .slots()
            .flat_map(|(role, slot)| slot.utxos.iter().map(move |u| (role, u)))
            .collect();
        candidates.sort_by_key(|(role, u)| {
            (
                *role != FederationRole::Retiring,
                u.height(),
                u.value(),
                u.outpoint(),
            )
        });

        let mut picked = Vec::new();
        let mut acc = BitcoinAmount::ZERO;
        for (_, utxo) in candidates {
            if acc >= target {
                break;
            }
            acc = acc.try_add(utxo.value())?;
            picked.push(utxo.outpoint());
        }

        picked.iter().map(|op| self.remove_utxo(op)).collect()
    }

    /// Starts a rotation: the active federation retires and `new` takes over.
    pub fn commit_federation(&mut self, new: Federation) -> Result<(), FundsError> {
        if self.retiring.is_some() {
            return Err(FundsError::RotationInProgress);
        }
        let old = mem::replace(&mut self.active, FederationSlot::new(new));
        info!(
            old = %old.federation.address(),
            new = %self.active.federation.address(),
            "federation rotation started"
        );
        self.retiring = Some(old);
        Ok(())
    }

    /// Ends a rotation once the retiring federation holds nothing.
    pub fn finish_rotation(&mut self) -> Result<Federation, FundsError> {
        let remaining = self.total(FederationRole::Retiring)?;
        let Some(retiring) = self.retiring.take_if(|_| remaining == BitcoinAmount::ZERO) else {
            return Err(match self.retiring {
                Some(_) => FundsError::RetiringNotEmpty(remaining),
                None => FundsError::NoRetiringFederation,
            });
        };
        info!(retired = %retiring.federation.address(), "federation rotation finished");
        Ok(retiring.federation)
    }
}
