//! On-disk encoding for a compiled program: the format a `build`-produced
//! executable appends to itself and a relaunched stub reads back out.
//!
//! Every integer is little-endian, independent of the bytecode's own
//! big-endian operand encoding — the two are unrelated wire formats that
//! happen to share a process.

use std::rc::Rc;

use crate::compiler::Bytecode;
use crate::value::{CompiledFunction, MonkeyHash, Value};

#[derive(Debug, Clone, PartialEq)]
pub enum SerializeError {
    UnsupportedConstant(&'static str),
}

impl std::fmt::Display for SerializeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SerializeError::UnsupportedConstant(t) => write!(f, "cannot serialize a {} constant", t),
        }
    }
}

impl std::error::Error for SerializeError {}

#[derive(Debug, Clone, PartialEq)]
pub enum DeserializeError {
    UnexpectedEof,
    BadTag(u8),
}

impl std::fmt::Display for DeserializeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeserializeError::UnexpectedEof => write!(f, "truncated bytecode stream"),
            DeserializeError::BadTag(t) => write!(f, "unrecognized constant tag {}", t),
        }
    }
}

impl std::error::Error for DeserializeError {}

const TAG_INTEGER: u8 = 1;
const TAG_STRING: u8 = 2;
const TAG_COMPILED_FUNCTION: u8 = 3;
const TAG_BOOLEAN: u8 = 4;
const TAG_NULL: u8 = 5;
const TAG_ARRAY: u8 = 6;
const TAG_HASH: u8 = 7;

pub fn serialize_bytecode(bytecode: &Bytecode) -> Result<Vec<u8>, SerializeError> {
    let mut out = Vec::new();
    out.extend_from_slice(&(bytecode.instructions.len() as u32).to_le_bytes());
    out.extend_from_slice(&bytecode.instructions);
    out.extend_from_slice(&(bytecode.constants.len() as u32).to_le_bytes());
    for c in &bytecode.constants {
        write_value(&mut out, c)?;
    }
    Ok(out)
}

pub fn deserialize_bytecode(bytes: &[u8]) -> Result<Bytecode, DeserializeError> {
    let mut cursor = 0usize;
    let instr_len = read_u32(bytes, &mut cursor)? as usize;
    let instructions = read_bytes(bytes, &mut cursor, instr_len)?.to_vec();
    let const_count = read_u32(bytes, &mut cursor)? as usize;
    let mut constants = Vec::with_capacity(const_count);
    for _ in 0..const_count {
        constants.push(read_value(bytes, &mut cursor)?);
    }
    Ok(Bytecode { instructions, constants })
}

fn write_value(out: &mut Vec<u8>, v: &Value) -> Result<(), SerializeError> {
    match v {
        Value::Integer(n) => {
            out.push(TAG_INTEGER);
            out.extend_from_slice(&n.to_le_bytes());
        }
        Value::String(s) => {
            out.push(TAG_STRING);
            write_bytes(out, s.as_bytes());
        }
        Value::CompiledFunction(f) => {
            out.push(TAG_COMPILED_FUNCTION);
            write_bytes(out, &f.instructions);
            out.extend_from_slice(&(f.num_locals as u32).to_le_bytes());
            out.extend_from_slice(&(f.num_parameters as u32).to_le_bytes());
        }
        Value::Boolean(b) => {
            out.push(TAG_BOOLEAN);
            out.push(if *b { 1 } else { 0 });
        }
        Value::Null => out.push(TAG_NULL),
        Value::Array(items) => {
            out.push(TAG_ARRAY);
            out.extend_from_slice(&(items.len() as u32).to_le_bytes());
            for item in items.iter() {
                write_value(out, item)?;
            }
        }
        Value::Hash(hash) => {
            out.push(TAG_HASH);
            out.extend_from_slice(&(hash.len() as u32).to_le_bytes());
            for (k, val) in hash.iter() {
                write_value(out, k)?;
                write_value(out, val)?;
            }
        }
        Value::Closure(_) => return Err(SerializeError::UnsupportedConstant("CLOSURE")),
        Value::Builtin(_, _) => return Err(SerializeError::UnsupportedConstant("BUILTIN")),
        Value::Error(_) => return Err(SerializeError::UnsupportedConstant("ERROR")),
    }
    Ok(())
}

fn read_value(bytes: &[u8], cursor: &mut usize) -> Result<Value, DeserializeError> {
    let tag = read_u8(bytes, cursor)?;
    match tag {
        TAG_INTEGER => {
            let n = read_i64(bytes, cursor)?;
            Ok(Value::Integer(n))
        }
        TAG_STRING => {
            let len = read_u32(bytes, cursor)? as usize;
            let s = read_bytes(bytes, cursor, len)?;
            Ok(Value::string(String::from_utf8_lossy(s).into_owned()))
        }
        TAG_COMPILED_FUNCTION => {
            let ilen = read_u32(bytes, cursor)? as usize;
            let instructions = read_bytes(bytes, cursor, ilen)?.to_vec();
            let num_locals = read_u32(bytes, cursor)? as usize;
            let num_parameters = read_u32(bytes, cursor)? as usize;
            Ok(Value::CompiledFunction(Rc::new(CompiledFunction { instructions, num_locals, num_parameters })))
        }
        TAG_BOOLEAN => Ok(Value::Boolean(read_u8(bytes, cursor)? != 0)),
        TAG_NULL => Ok(Value::Null),
        TAG_ARRAY => {
            let count = read_u32(bytes, cursor)? as usize;
            let mut items = Vec::with_capacity(count);
            for _ in 0..count {
                items.push(read_value(bytes, cursor)?);
            }
            Ok(Value::array(items))
        }
        TAG_HASH => {
            let count = read_u32(bytes, cursor)? as usize;
            let mut hash = MonkeyHash::new();
            for _ in 0..count {
                let k = read_value(bytes, cursor)?;
                let v = read_value(bytes, cursor)?;
                hash.insert(k, v).map_err(|_| DeserializeError::BadTag(tag))?;
            }
            Ok(Value::Hash(Rc::new(hash)))
        }
        other => Err(DeserializeError::BadTag(other)),
    }
}

fn write_bytes(out: &mut Vec<u8>, bytes: &[u8]) {
    out.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
    out.extend_from_slice(bytes);
}

fn read_u8(bytes: &[u8], cursor: &mut usize) -> Result<u8, DeserializeError> {
    let b = *bytes.get(*cursor).ok_or(DeserializeError::UnexpectedEof)?;
    *cursor += 1;
    Ok(b)
}

fn read_u32(bytes: &[u8], cursor: &mut usize) -> Result<u32, DeserializeError> {
    let slice = read_bytes(bytes, cursor, 4)?;
    Ok(u32::from_le_bytes(slice.try_into().unwrap()))
}

fn read_i64(bytes: &[u8], cursor: &mut usize) -> Result<i64, DeserializeError> {
    let slice = read_bytes(bytes, cursor, 8)?;
    Ok(i64::from_le_bytes(slice.try_into().unwrap()))
}

fn read_bytes<'a>(bytes: &'a [u8], cursor: &mut usize, len: usize) -> Result<&'a [u8], DeserializeError> {
    let end = cursor.checked_add(len).ok_or(DeserializeError::UnexpectedEof)?;
    let slice = bytes.get(*cursor..end).ok_or(DeserializeError::UnexpectedEof)?;
    *cursor = end;
    Ok(slice)
}

/// The literal marker a `build`-produced executable embeds before its
/// trailing length-prefixed bytecode record.
pub const MAGIC: &[u8] = b"MONKEY_BYTECODE";

/// Appends `MAGIC || u32 LE length || bytecode` to `exe_bytes`, producing a
/// self-contained executable body. The caller is responsible for writing
/// the result with the executable bit set.
pub fn embed_bytecode(exe_bytes: &[u8], bytecode: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(exe_bytes.len() + MAGIC.len() + 4 + bytecode.len());
    out.extend_from_slice(exe_bytes);
    out.extend_from_slice(MAGIC);
    out.extend_from_slice(&(bytecode.len() as u32).to_le_bytes());
    out.extend_from_slice(bytecode);
    out
}

/// Scans `image` backward for the last occurrence of `MAGIC`, reads the
/// trailing length-prefixed record, and returns the raw serialized
/// bytecode bytes. Backward search (not forward) matters: the executable
/// stub's own code may legitimately contain byte sequences that collide
/// with `MAGIC` by chance, and the record we want is always the last one
/// appended.
pub fn extract_embedded(image: &[u8]) -> Option<&[u8]> {
    let marker_pos = find_last(image, MAGIC)?;
    let len_start = marker_pos + MAGIC.len();
    let len_bytes = image.get(len_start..len_start + 4)?;
    let len = u32::from_le_bytes(len_bytes.try_into().ok()?) as usize;
    let data_start = len_start + 4;
    image.get(data_start..data_start + len)
}

fn find_last(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    (0..=haystack.len() - needle.len()).rev().find(|&i| &haystack[i..i + needle.len()] == needle)
}
