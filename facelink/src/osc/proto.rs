//! Message model and datagram codec
//!
//! Devices speak OSC 1.0: every datagram carries a single message made of a
//! NUL terminated address pattern, a type tag string and the big-endian
//! argument data, each part padded to a multiple of four bytes.

use num_enum::{FromPrimitive, IntoPrimitive};
use std::fmt::{self, Display};
use thiserror::Error;

/// Largest datagram accepted from a device.
pub const MAX_DATAGRAM_SIZE: usize = 1536;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("datagram too small ({0} bytes)")]
    TooSmall(usize),
    #[error("datagram length {0} is not a multiple of 4")]
    Unaligned(usize),
    #[error("missing or malformed address pattern")]
    InvalidAddress,
    #[error("missing type tag string")]
    MissingTypeTags,
    #[error("unsupported type tag {0:#04x}")]
    UnknownTypeTag(u8),
    #[error("argument data truncated")]
    Truncated,
    #[error("string argument is not valid")]
    InvalidString,
    #[error("bundles are not supported")]
    UnsupportedBundle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
#[derive(FromPrimitive, IntoPrimitive)]
pub enum TypeTag {
    /// 'i'
    Int32 = 0x69,
    /// 'f'
    Float32 = 0x66,
    /// 's'
    String = 0x73,
    /// 'T'
    True = 0x54,
    /// 'F'
    False = 0x46,
    #[num_enum(catch_all)]
    Unknown(u8),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Arg {
    Int(i32),
    Float(f32),
    Str(String),
    Bool(bool),
}

impl Arg {
    pub fn tag(&self) -> TypeTag {
        match self {
            Arg::Int(_) => TypeTag::Int32,
            Arg::Float(_) => TypeTag::Float32,
            Arg::Str(_) => TypeTag::String,
            Arg::Bool(true) => TypeTag::True,
            Arg::Bool(false) => TypeTag::False,
        }
    }

    /// Numeric value of the argument, if it has one.
    pub fn as_f32(&self) -> Option<f32> {
        match self {
            Arg::Int(i) => Some(*i as f32),
            Arg::Float(f) => Some(*f),
            _ => None,
        }
    }
}

impl From<i32> for Arg {
    fn from(v: i32) -> Arg {
        Arg::Int(v)
    }
}

impl From<f32> for Arg {
    fn from(v: f32) -> Arg {
        Arg::Float(v)
    }
}

impl From<bool> for Arg {
    fn from(v: bool) -> Arg {
        Arg::Bool(v)
    }
}

impl From<&str> for Arg {
    fn from(v: &str) -> Arg {
        Arg::Str(v.to_string())
    }
}

impl From<String> for Arg {
    fn from(v: String) -> Arg {
        Arg::Str(v)
    }
}

impl Display for Arg {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Arg::Int(i) => write!(f, "{}", i),
            Arg::Float(v) => write!(f, "{}", v),
            Arg::Str(s) => write!(f, "{:?}", s),
            Arg::Bool(b) => write!(f, "{}", b),
        }
    }
}

/// A single addressed command with its arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub address: String,
    pub args: Vec<Arg>,
    /// Whether sending this message is worth a log line. High frequency
    /// messages such as the battery query clear it.
    pub log: bool,
}

impl Message {
    pub fn new(address: &str, args: Vec<Arg>) -> Message {
        Message {
            address: address.to_string(),
            args,
            log: true,
        }
    }

    /// Same message, but not logged when sent.
    pub fn quiet(mut self) -> Message {
        self.log = false;
        self
    }

    pub fn serialize(&self) -> Result<Vec<u8>, Error> {
        if !self.address.starts_with('/') {
            return Err(Error::InvalidAddress);
        }
        let mut raw = Vec::with_capacity(64);
        append_padded(&mut raw, &self.address).map_err(|_| Error::InvalidAddress)?;

        let mut tags = String::with_capacity(self.args.len() + 1);
        tags.push(',');
        for arg in &self.args {
            tags.push(u8::from(arg.tag()) as char);
        }
        append_padded(&mut raw, &tags)?;

        for arg in &self.args {
            match arg {
                Arg::Int(i) => raw.extend(i.to_be_bytes()),
                Arg::Float(v) => raw.extend(v.to_be_bytes()),
                Arg::Str(s) => append_padded(&mut raw, s)?,
                Arg::Bool(_) => {}
            }
        }
        if raw.len() > MAX_DATAGRAM_SIZE {
            return Err(Error::Truncated);
        }
        Ok(raw)
    }

    pub fn deserialize(raw: &[u8]) -> Result<Message, Error> {
        if raw.len() < 4 {
            return Err(Error::TooSmall(raw.len()));
        }
        if raw.len() % 4 != 0 {
            return Err(Error::Unaligned(raw.len()));
        }
        if raw.starts_with(b"#bundle") {
            return Err(Error::UnsupportedBundle);
        }

        let mut offset = 0;
        let address = read_padded(raw, &mut offset).map_err(|_| Error::InvalidAddress)?;
        if !address.starts_with('/') {
            return Err(Error::InvalidAddress);
        }

        // Very old senders omit the tag string entirely for argument-less messages.
        if offset == raw.len() {
            return Ok(Message::new(&address, vec![]));
        }

        let tags = read_padded(raw, &mut offset).map_err(|_| Error::MissingTypeTags)?;
        let mut tag_bytes = tags.bytes();
        if tag_bytes.next() != Some(b',') {
            return Err(Error::MissingTypeTags);
        }

        let mut args = Vec::new();
        for tag in tag_bytes {
            let arg = match TypeTag::from(tag) {
                TypeTag::Int32 => Arg::Int(i32::from_be_bytes(read_word(raw, &mut offset)?)),
                TypeTag::Float32 => Arg::Float(f32::from_be_bytes(read_word(raw, &mut offset)?)),
                TypeTag::String => Arg::Str(read_padded(raw, &mut offset)?),
                TypeTag::True => Arg::Bool(true),
                TypeTag::False => Arg::Bool(false),
                TypeTag::Unknown(t) => return Err(Error::UnknownTypeTag(t)),
            };
            args.push(arg);
        }

        Ok(Message::new(&address, args))
    }

    /// Numeric value of the first argument.
    pub fn first_f32(&self) -> Option<f32> {
        self.args.first().and_then(Arg::as_f32)
    }
}

impl Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.address)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// Append a NUL terminated string, padded with NULs to a 4 byte boundary.
fn append_padded(raw: &mut Vec<u8>, value: &str) -> Result<(), Error> {
    if value.as_bytes().contains(&0) {
        return Err(Error::InvalidString);
    }
    raw.extend(value.as_bytes());
    let pad = 4 - (value.len() % 4);
    raw.extend(std::iter::repeat(0u8).take(pad));
    Ok(())
}

fn read_padded(raw: &[u8], offset: &mut usize) -> Result<String, Error> {
    let rest = &raw[*offset..];
    let len = match rest.iter().position(|b| *b == 0) {
        Some(len) => len,
        None => return Err(Error::Truncated),
    };
    let value = std::str::from_utf8(&rest[..len])
        .map_err(|_| Error::InvalidString)?
        .to_string();
    let padded = (len / 4 + 1) * 4;
    if padded > rest.len() {
        return Err(Error::Truncated);
    }
    *offset += padded;
    Ok(value)
}

fn read_word(raw: &[u8], offset: &mut usize) -> Result<[u8; 4], Error> {
    let end = *offset + 4;
    if end > raw.len() {
        return Err(Error::Truncated);
    }
    let mut word = [0u8; 4];
    word.copy_from_slice(&raw[*offset..end]);
    *offset = end;
    Ok(word)
}
