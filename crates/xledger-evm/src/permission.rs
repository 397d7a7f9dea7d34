//! Capability checks consulted before creating contracts and accounts

use crate::error::{EvmError, EvmResult};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use xledger_primitives::Address;

/// Capabilities the engine asks the permission layer about
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Capability {
    /// Perform any CALL family opcode
    Call,
    /// Deploy a contract with CREATE or CREATE2
    CreateContract,
    /// Bring a new plain account into existence
    CreateAccount,
}

impl Capability {
    /// Snake-case name of the capability
    pub fn name(&self) -> &'static str {
        match self {
            Capability::Call => "call",
            Capability::CreateContract => "create_contract",
            Capability::CreateAccount => "create_account",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Permission collaborator
pub trait Permissions {
    /// Whether `address` holds `capability`
    fn has_capability(&self, address: &Address, capability: Capability) -> EvmResult<bool>;
}

/// Fail with `PermissionDenied` unless `address` holds `capability`.
pub fn ensure_permission(
    permissions: &dyn Permissions,
    address: &Address,
    capability: Capability,
) -> EvmResult<()> {
    if permissions.has_capability(address, capability)? {
        Ok(())
    } else {
        Err(EvmError::PermissionDenied {
            address: *address,
            capability,
        })
    }
}

/// Grants every capability to every account
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl Permissions for AllowAll {
    fn has_capability(&self, _address: &Address, _capability: Capability) -> EvmResult<bool> {
        Ok(true)
    }
}

/// Explicit grants per account, with a fallback set for everyone else
#[derive(Debug, Clone, Default)]
pub struct CapabilityTable {
    grants: BTreeMap<Address, BTreeSet<Capability>>,
    default: BTreeSet<Capability>,
}

impl CapabilityTable {
    /// Empty table; nobody holds anything
    pub fn new() -> Self {
        Self::default()
    }

    /// Grant a capability to one account
    pub fn grant(&mut self, address: Address, capability: Capability) {
        self.grants.entry(address).or_default().insert(capability);
    }

    /// Revoke a capability from one account
    pub fn revoke(&mut self, address: &Address, capability: Capability) {
        if let Some(set) = self.grants.get_mut(address) {
            set.remove(&capability);
        }
    }

    /// Grant a capability to accounts with no explicit entry
    pub fn grant_default(&mut self, capability: Capability) {
        self.default.insert(capability);
    }
}

impl Permissions for CapabilityTable {
    fn has_capability(&self, address: &Address, capability: Capability) -> EvmResult<bool> {
        Ok(match self.grants.get(address) {
            Some(set) => set.contains(&capability),
            None => self.default.contains(&capability),
        })
    }
}
