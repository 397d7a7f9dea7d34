//! Bytecode with its opcode / push-data classification

use crate::opcode::{push_size, Opcode};

/// Immutable bytecode plus one bit per byte telling whether that offset
/// starts an instruction or is immediate data of a preceding PUSHn.
#[derive(Clone, Debug)]
pub struct Code {
    bytes: Vec<u8>,
    opcodes: Vec<u64>,
}

impl Code {
    /// Analyse `bytes`
    pub fn new(bytes: Vec<u8>) -> Self {
        let opcodes = analyse(&bytes);
        Self { bytes, opcodes }
    }

    /// Raw bytecode
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Code length
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Whether there is no code
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Byte at `pc`; reading past the end yields STOP.
    pub fn get_op(&self, pc: u64) -> u8 {
        usize::try_from(pc)
            .ok()
            .and_then(|pc| self.bytes.get(pc).copied())
            .unwrap_or(Opcode::STOP as u8)
    }

    /// Whether `pc` is immediate data. Offsets past the end are not.
    pub fn is_push_data(&self, pc: u64) -> bool {
        match usize::try_from(pc) {
            Ok(pc) if pc < self.bytes.len() => self.opcodes[pc / 64] & (1 << (pc % 64)) == 0,
            _ => false,
        }
    }

    /// Whether `pc` is a JUMPDEST instruction (not a 0x5b inside push data)
    pub fn is_jump_dest(&self, pc: u64) -> bool {
        self.get_op(pc) == Opcode::JUMPDEST as u8 && !self.is_push_data(pc)
    }
}

fn analyse(code: &[u8]) -> Vec<u64> {
    let mut opcodes = vec![0u64; code.len().div_ceil(64)];
    let mut pc = 0;
    while pc < code.len() {
        opcodes[pc / 64] |= 1 << (pc % 64);
        pc += 1 + push_size(code[pc]);
    }
    opcodes
}
