//! CIL method bodies: header parsing, instruction walking and the hook splice.

use anyhow::{Context as _, Result, bail, ensure};
use byteorder::{BigEndian, ByteOrder as _, LittleEndian};

const TINY_FORMAT: u8 = 0x2;
const FAT_FORMAT: u16 = 0x3;
const MORE_SECTS: u16 = 0x8;
const INIT_LOCALS: u16 = 0x10;

const SECT_EH_TABLE: u8 = 0x1;
const SECT_FAT_FORMAT: u8 = 0x40;
const SECT_MORE_SECTS: u8 = 0x80;

const CLAUSE_FILTER: u32 = 0x1;

pub const LDARG_0: u8 = 0x02;
pub const LDARG_1: u8 = 0x03;
pub const CALL: u8 = 0x28;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExceptionClause {
    pub flags: u32,
    pub try_offset: u32,
    pub try_length: u32,
    pub handler_offset: u32,
    pub handler_length: u32,
    /// Class token, or the filter offset for filter clauses.
    pub class_or_filter: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodBody {
    pub max_stack: u16,
    pub init_locals: bool,
    pub local_var_sig: u32,
    pub code: Vec<u8>,
    pub clauses: Vec<ExceptionClause>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operand {
    None,
    Fixed(usize),
    ShortBranch,
    Branch,
    Switch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instruction {
    pub offset: usize,
    pub opcode: u16,
    pub len: usize,
    operand: Operand,
}

fn operand(opcode: u16) -> Option<Operand> {
    Some(match opcode {
        0x00..=0x0D | 0x14..=0x1E | 0x25 | 0x26 | 0x2A => Operand::None,
        0x0E..=0x13 | 0x1F => Operand::Fixed(1),
        0x20 | 0x22 | 0x27..=0x29 => Operand::Fixed(4),
        0x21 | 0x23 => Operand::Fixed(8),
        0x2B..=0x37 | 0xDE => Operand::ShortBranch,
        0x38..=0x44 | 0xDD => Operand::Branch,
        0x45 => Operand::Switch,
        0x46..=0x6E | 0x76 | 0x7A | 0x82..=0x8B | 0x8E | 0x90..=0xA2 => Operand::None,
        0xB3..=0xBA | 0xC3 | 0xD1..=0xDC | 0xDF | 0xE0 => Operand::None,
        0x6F..=0x75 | 0x79 | 0x7B..=0x81 | 0x8C | 0x8D | 0x8F => Operand::Fixed(4),
        0xA3..=0xA5 | 0xC2 | 0xC6 | 0xD0 => Operand::Fixed(4),
        // two byte opcodes
        0xFE00..=0xFE05 | 0xFE0F | 0xFE11 | 0xFE13 | 0xFE14 => Operand::None,
        0xFE17 | 0xFE18 | 0xFE1A | 0xFE1D | 0xFE1E => Operand::None,
        0xFE06 | 0xFE07 | 0xFE15 | 0xFE16 | 0xFE1C => Operand::Fixed(4),
        0xFE09..=0xFE0E => Operand::Fixed(2),
        0xFE12 | 0xFE19 => Operand::Fixed(1),
        _ => return None,
    })
}

/// Splits `code` into instructions.
pub fn instructions(code: &[u8]) -> Result<Vec<Instruction>> {
    let mut instructions = Vec::new();
    let mut offset = 0;
    while offset < code.len() {
        let (opcode, opcode_len) = match code[offset] {
            0xFE => {
                let second = *code.get(offset + 1).context("truncated two byte opcode")?;
                (0xFE00 | u16::from(second), 2)
            }
            byte => (u16::from(byte), 1),
        };
        let operand = operand(opcode)
            .with_context(|| format!("unknown opcode {opcode:#x} at IL_{offset:04x}"))?;
        let operand_len = match operand {
            Operand::None => 0,
            Operand::Fixed(len) => len,
            Operand::ShortBranch => 1,
            Operand::Branch => 4,
            Operand::Switch => {
                let count_at = offset + opcode_len;
                let count = code
                    .get(count_at..count_at + 4)
                    .map(LittleEndian::read_u32)
                    .context("truncated switch")?;
                4 + 4 * count as usize
            }
        };
        let len = opcode_len + operand_len;
        ensure!(
            offset + len <= code.len(),
            "instruction at IL_{offset:04x} runs past the end of the method"
        );
        instructions.push(Instruction {
            offset,
            opcode,
            len,
            operand,
        });
        offset += len;
    }
    Ok(instructions)
}

impl MethodBody {
    /// Parses a method body starting at the first byte of `data`.
    /// Trailing bytes after the body are ignored.
    pub fn parse(data: &[u8]) -> Result<MethodBody> {
        let header = *data.first().context("empty method body")?;
        if header & 0x3 == TINY_FORMAT {
            let size = usize::from(header >> 2);
            let code = data.get(1..1 + size).context("truncated tiny method body")?;
            return Ok(MethodBody {
                max_stack: 8,
                init_locals: false,
                local_var_sig: 0,
                code: code.to_vec(),
                clauses: Vec::new(),
            });
        }

        ensure!(data.len() >= 12, "truncated fat method header");
        let flags = LittleEndian::read_u16(&data[0..2]);
        ensure!(flags & 0x3 == FAT_FORMAT, "invalid method header {flags:#x}");
        let header_size = usize::from(flags >> 12) * 4;
        ensure!(header_size >= 12, "invalid fat header size {header_size}");
        let max_stack = LittleEndian::read_u16(&data[2..4]);
        let code_size = LittleEndian::read_u32(&data[4..8]) as usize;
        let local_var_sig = LittleEndian::read_u32(&data[8..12]);
        let code = data
            .get(header_size..header_size + code_size)
            .context("truncated method code")?;

        let mut clauses = Vec::new();
        let mut more = flags & MORE_SECTS != 0;
        let mut at = (header_size + code_size).next_multiple_of(4);
        while more {
            let kind = *data.get(at).context("truncated method data section")?;
            let fat = kind & SECT_FAT_FORMAT != 0;
            let size = match fat {
                true => data
                    .get(at + 1..at + 4)
                    .map(|size| LittleEndian::read_u24(size) as usize),
                false => data.get(at + 1).map(|&size| usize::from(size)),
            }
            .context("truncated method data section")?;
            ensure!(size >= 4, "invalid method data section size {size}");
            let section = data.get(at + 4..at + size).context("truncated method data section")?;

            if kind & SECT_EH_TABLE != 0 {
                clauses.extend(parse_clauses(section, fat));
            }
            more = kind & SECT_MORE_SECTS != 0;
            at = (at + size).next_multiple_of(4);
        }

        Ok(MethodBody {
            max_stack,
            init_locals: flags & INIT_LOCALS != 0,
            local_var_sig,
            code: code.to_vec(),
            clauses,
        })
    }

    fn is_tiny(&self) -> bool {
        self.code.len() < 64
            && self.max_stack <= 8
            && self.local_var_sig == 0
            && !self.init_locals
            && self.clauses.is_empty()
    }

    /// Encodes the body, tiny when possible. Exception clauses are always written fat.
    pub fn encode(&self) -> Vec<u8> {
        if self.is_tiny() {
            let mut out = Vec::with_capacity(1 + self.code.len());
            out.push(((self.code.len() as u8) << 2) | TINY_FORMAT);
            out.extend_from_slice(&self.code);
            return out;
        }

        let mut flags = FAT_FORMAT | (3 << 12);
        if self.init_locals {
            flags |= INIT_LOCALS;
        }
        if !self.clauses.is_empty() {
            flags |= MORE_SECTS;
        }

        let mut out = vec![0; 12];
        LittleEndian::write_u16(&mut out[0..2], flags);
        LittleEndian::write_u16(&mut out[2..4], self.max_stack);
        LittleEndian::write_u32(&mut out[4..8], self.code.len() as u32);
        LittleEndian::write_u32(&mut out[8..12], self.local_var_sig);
        out.extend_from_slice(&self.code);

        if !self.clauses.is_empty() {
            out.resize(out.len().next_multiple_of(4), 0);
            let size = 4 + 24 * self.clauses.len() as u32;
            let mut header = [0; 4];
            LittleEndian::write_u32(&mut header, (size << 8) | u32::from(SECT_EH_TABLE | SECT_FAT_FORMAT));
            out.extend_from_slice(&header);
            for clause in &self.clauses {
                for value in [
                    clause.flags,
                    clause.try_offset,
                    clause.try_length,
                    clause.handler_offset,
                    clause.handler_length,
                    clause.class_or_filter,
                ] {
                    let mut buf = [0; 4];
                    LittleEndian::write_u32(&mut buf, value);
                    out.extend_from_slice(&buf);
                }
            }
        }
        out
    }

    /// Whether the code already calls `token`.
    pub fn calls(&self, token: u32) -> Result<bool> {
        let code = &self.code;
        Ok(instructions(code)?.iter().any(|instruction| {
            instruction.opcode == u16::from(CALL)
                && LittleEndian::read_u32(&code[instruction.offset + 1..]) == token
        }))
    }

    /// Replaces the first `ldarg.1` with `ldarg.0; ldarg.1; call hook`.
    ///
    /// Branches and exception clauses are moved along. Jumps to the replaced
    /// instruction land on the inserted `ldarg.0`.
    pub fn splice_hook(&mut self, hook: u32) -> Result<()> {
        let instructions = instructions(&self.code)?;
        let Some(at) = instructions
            .iter()
            .find(|instruction| instruction.opcode == u16::from(LDARG_1))
            .map(|instruction| instruction.offset)
        else {
            bail!("no ldarg.1 to patch");
        };

        let mut inserted = vec![LDARG_0, LDARG_1, CALL, 0, 0, 0, 0];
        LittleEndian::write_u32(&mut inserted[3..], hook);
        let shift = inserted.len() - 1;
        let moved = |offset: usize| if offset > at { offset + shift } else { offset };

        let mut code = Vec::with_capacity(self.code.len() + shift);
        for instruction in &instructions {
            let old = &self.code[instruction.offset..instruction.offset + instruction.len];
            if instruction.offset == at {
                code.extend_from_slice(&inserted);
                continue;
            }

            let start = code.len();
            code.extend_from_slice(old);
            let next = instruction.offset + instruction.len;
            let new_next = moved(next);
            let opcode_len = if instruction.opcode > 0xFF { 2 } else { 1 };
            let operand = &mut code[start + opcode_len..];

            match instruction.operand {
                Operand::ShortBranch => {
                    let target = next as i64 + i64::from(old[1] as i8);
                    let relative = moved(target as usize) as i64 - new_next as i64;
                    let relative = i8::try_from(relative).with_context(|| {
                        format!("short branch at IL_{:04x} is out of range after patching", instruction.offset)
                    })?;
                    operand[0] = relative as u8;
                }
                Operand::Branch => {
                    let target = next as i64 + i64::from(LittleEndian::read_i32(&old[1..]));
                    let relative = moved(target as usize) as i64 - new_next as i64;
                    LittleEndian::write_i32(operand, relative as i32);
                }
                Operand::Switch => {
                    for slot in operand[4..].chunks_exact_mut(4) {
                        let target = next as i64 + i64::from(LittleEndian::read_i32(slot));
                        let relative = moved(target as usize) as i64 - new_next as i64;
                        LittleEndian::write_i32(slot, relative as i32);
                    }
                }
                Operand::None | Operand::Fixed(_) => {}
            }
        }

        for clause in &mut self.clauses {
            let try_end = moved((clause.try_offset + clause.try_length) as usize) as u32;
            let handler_end = moved((clause.handler_offset + clause.handler_length) as usize) as u32;
            clause.try_offset = moved(clause.try_offset as usize) as u32;
            clause.try_length = try_end - clause.try_offset;
            clause.handler_offset = moved(clause.handler_offset as usize) as u32;
            clause.handler_length = handler_end - clause.handler_offset;
            if clause.flags & CLAUSE_FILTER != 0 {
                clause.class_or_filter = moved(clause.class_or_filter as usize) as u32;
            }
        }

        self.code = code;
        // ldarg.0 and ldarg.1 are both on the stack before the call
        self.max_stack = self.max_stack.saturating_add(1);
        Ok(())
    }
}

fn parse_clauses(section: &[u8], fat: bool) -> Vec<ExceptionClause> {
    match fat {
        true => section
            .chunks_exact(24)
            .map(|clause| ExceptionClause {
                flags: LittleEndian::read_u32(&clause[0..4]),
                try_offset: LittleEndian::read_u32(&clause[4..8]),
                try_length: LittleEndian::read_u32(&clause[8..12]),
                handler_offset: LittleEndian::read_u32(&clause[12..16]),
                handler_length: LittleEndian::read_u32(&clause[16..20]),
                class_or_filter: LittleEndian::read_u32(&clause[20..24]),
            })
            .collect(),
        false => section
            .chunks_exact(12)
            .map(|clause| ExceptionClause {
                flags: u32::from(LittleEndian::read_u16(&clause[0..2])),
                try_offset: u32::from(LittleEndian::read_u16(&clause[2..4])),
                try_length: u32::from(clause[4]),
                handler_offset: u32::from(LittleEndian::read_u16(&clause[5..7])),
                handler_length: u32::from(clause[7]),
                class_or_filter: LittleEndian::read_u32(&clause[8..12]),
            })
            .collect(),
    }
}

/// Parameter count of a method signature blob.
pub fn param_count(signature: &[u8]) -> Option<u32> {
    let (&calling_convention, mut rest) = signature.split_first()?;
    if calling_convention & 0x10 != 0 {
        let (_, len) = compressed_u32(rest)?;
        rest = &rest[len..];
    }
    compressed_u32(rest).map(|(count, _)| count)
}

/// ECMA-335 compressed unsigned integer, returns the value and its length.
fn compressed_u32(data: &[u8]) -> Option<(u32, usize)> {
    let first = *data.first()?;
    match first {
        _ if first & 0x80 == 0 => Some((u32::from(first), 1)),
        _ if first & 0xC0 == 0x80 => {
            let second = *data.get(1)?;
            Some(((u32::from(first & 0x3F) << 8) | u32::from(second), 2))
        }
        _ if first & 0xE0 == 0xC0 => {
            let rest = data.get(1..4)?;
            Some(((u32::from(first & 0x1F) << 24) | BigEndian::read_u24(rest), 4))
        }
        _ => None,
    }
}
