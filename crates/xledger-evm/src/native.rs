//! Native contracts and the dispatcher that routes calls to them

use crate::context::{CallParams, Context};
use crate::error::{EvmError, EvmResult};
use crate::gas::words;
use crate::state::{Account, StateWriter};
use num_bigint::BigUint;
use std::collections::BTreeMap;
use xledger_crypto::{ripemd160, sha256};
use xledger_primitives::{Address, Gas, Word};

/// Precompile gas prices
pub mod cost {
    /// sha256 flat cost
    pub const SHA256_BASE: u64 = 1;
    /// sha256 cost per input word
    pub const SHA256_WORD: u64 = 1;
    /// identity flat cost
    pub const IDENTITY_BASE: u64 = 1;
    /// identity cost per input word
    pub const IDENTITY_WORD: u64 = 1;
    /// ripemd160 flat cost
    pub const RIPEMD160_BASE: u64 = 1;
    /// ripemd160 cost per input word
    pub const RIPEMD160_WORD: u64 = 1;
    /// expmod flat cost
    pub const EXPMOD_BASE: u64 = 1;
    /// expmod cost per unit of base words * exponent words * modulus words
    pub const EXPMOD_WORD: u64 = 1;
}

/// Contract implemented in Rust rather than EVM bytecode
pub trait Native {
    /// Registry name; accounts carrying this name in `Account::native`
    /// dispatch here.
    fn name(&self) -> &str;

    /// Address the contract is installed at
    fn address(&self) -> Address;

    /// Run the contract, deducting gas from `params.gas`
    fn call(&self, ctx: &mut Context<'_, '_>, params: &mut CallParams) -> EvmResult<Vec<u8>>;
}

/// Decides whether a callee is served natively
pub trait Dispatcher {
    /// The native handler for `account`, or `None` to run its bytecode
    fn dispatch(&self, account: &Account) -> Option<&dyn Native>;
}

/// Never dispatches; every account runs as bytecode
#[derive(Debug, Clone, Copy, Default)]
pub struct NoNatives;

impl Dispatcher for NoNatives {
    fn dispatch(&self, _account: &Account) -> Option<&dyn Native> {
        None
    }
}

/// Stateless precompile priced per input word
pub struct Precompile {
    name: &'static str,
    address: Address,
    base_gas: Gas,
    word_gas: Gas,
    function: fn(&[u8]) -> Vec<u8>,
}

impl Precompile {
    /// Define a precompile
    pub fn new(
        name: &'static str,
        address: Address,
        base_gas: Gas,
        word_gas: Gas,
        function: fn(&[u8]) -> Vec<u8>,
    ) -> Self {
        Self {
            name,
            address,
            base_gas,
            word_gas,
            function,
        }
    }
}

impl Native for Precompile {
    fn name(&self) -> &str {
        self.name
    }

    fn address(&self) -> Address {
        self.address
    }

    fn call(&self, _ctx: &mut Context<'_, '_>, params: &mut CallParams) -> EvmResult<Vec<u8>> {
        let required = words(params.input.len() as u64)
            .saturating_mul(self.word_gas)
            .saturating_add(self.base_gas);
        if params.gas < required {
            return Err(EvmError::InsufficientGas);
        }
        params.gas -= required;
        Ok((self.function)(&params.input))
    }
}

/// `base ** exp % mod` over big-endian unsigned integers of any width.
///
/// Input is three 32-byte lengths followed by the base, exponent and
/// modulus themselves. The result is left-padded to the modulus length; a
/// zero modulus yields all zeros.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExpMod;

impl ExpMod {
    fn run(input: &[u8], gas: &mut Gas) -> EvmResult<Vec<u8>> {
        let (header, body) = split_at(input, 96)?;
        let base_len = length_at(header, 0)?;
        let exp_len = length_at(header, 1)?;
        let mod_len = length_at(header, 2)?;

        let required = words(base_len)
            .saturating_mul(words(exp_len))
            .saturating_mul(words(mod_len))
            .saturating_mul(cost::EXPMOD_WORD)
            .saturating_add(cost::EXPMOD_BASE);
        if *gas < required {
            return Err(EvmError::InsufficientGas);
        }
        *gas -= required;

        let (base, body) = split_at(body, base_len)?;
        let (exp, body) = split_at(body, exp_len)?;
        let (modulus, _) = split_at(body, mod_len)?;

        let mut output = vec![0u8; mod_len as usize];
        let modulus = BigUint::from_bytes_be(modulus);
        if modulus.bits() == 0 {
            return Ok(output);
        }
        let result = BigUint::from_bytes_be(base)
            .modpow(&BigUint::from_bytes_be(exp), &modulus)
            .to_bytes_be();
        let start = output.len() - result.len();
        output[start..].copy_from_slice(&result);
        Ok(output)
    }
}

impl Native for ExpMod {
    fn name(&self) -> &str {
        "expmod"
    }

    fn address(&self) -> Address {
        precompile_address(5)
    }

    fn call(&self, _ctx: &mut Context<'_, '_>, params: &mut CallParams) -> EvmResult<Vec<u8>> {
        let mut gas = params.gas;
        let output = Self::run(&params.input, &mut gas)?;
        params.gas = gas;
        Ok(output)
    }
}

fn split_at(input: &[u8], length: u64) -> EvmResult<(&[u8], &[u8])> {
    if (input.len() as u64) < length {
        return Err(EvmError::Native(format!(
            "expmod: input of {} bytes is shorter than {}",
            input.len(),
            length
        )));
    }
    Ok(input.split_at(length as usize))
}

fn length_at(header: &[u8], index: usize) -> EvmResult<u64> {
    let word = Word::from_slice(&header[index * 32..(index + 1) * 32])
        .map_err(|err| EvmError::Native(err.to_string()))?;
    word.to_u64()
        .ok_or_else(|| EvmError::Native("expmod: length does not fit in 64 bits".to_string()))
}

/// Registry of native contracts keyed by name
#[derive(Default)]
pub struct Natives {
    natives: BTreeMap<String, Box<dyn Native>>,
}

impl Natives {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the sha256 (0x02), ripemd160 (0x03), identity
    /// (0x04) and expmod (0x05) precompiles
    pub fn precompiles() -> Self {
        let mut natives = Self::new();
        natives.register(Box::new(Precompile::new(
            "sha256",
            precompile_address(2),
            cost::SHA256_BASE,
            cost::SHA256_WORD,
            |input| sha256(input).as_bytes().to_vec(),
        )));
        natives.register(Box::new(Precompile::new(
            "ripemd160",
            precompile_address(3),
            cost::RIPEMD160_BASE,
            cost::RIPEMD160_WORD,
            |input| Word::left_pad(&ripemd160(input)).as_bytes().to_vec(),
        )));
        natives.register(Box::new(Precompile::new(
            "identity",
            precompile_address(4),
            cost::IDENTITY_BASE,
            cost::IDENTITY_WORD,
            |input| input.to_vec(),
        )));
        natives.register(Box::new(ExpMod));
        natives
    }

    /// Add or replace a native contract
    pub fn register(&mut self, native: Box<dyn Native>) {
        self.natives.insert(native.name().to_string(), native);
    }

    /// Look up by name
    pub fn get(&self, name: &str) -> Option<&dyn Native> {
        self.natives.get(name).map(|native| &**native)
    }

    /// Create an account for every registered contract so that callers
    /// find them in state.
    pub fn install(&self, state: &mut dyn StateWriter) -> EvmResult<()> {
        for native in self.natives.values() {
            let mut account = Account::new(native.address());
            account.native = Some(native.name().to_string());
            state.update_account(account)?;
        }
        Ok(())
    }
}

impl Dispatcher for Natives {
    fn dispatch(&self, account: &Account) -> Option<&dyn Native> {
        account.native.as_deref().and_then(|name| self.get(name))
    }
}

/// Address with `index` in its last byte
pub fn precompile_address(index: u8) -> Address {
    let mut bytes = [0u8; 20];
    bytes[19] = index;
    Address::from_bytes(bytes)
}
