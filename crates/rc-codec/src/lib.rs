// SPDX-License-Identifier: AGPL-3.0-only
#![forbid(unsafe_code)]
#![deny(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]

use core::fmt;
use std::io::{Read, Write};

/// Obergrenze für Listenlängen beim Dekodieren (Schutz gegen Allokations-Angriffe)
pub const MAX_DECODE_ITEMS: usize = 1 << 16;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    Truncated,
    InvalidTag(u8),
    InvalidLength(usize),
    TrailingBytes(usize),
    Io(std::io::ErrorKind),
}

impl fmt::Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Truncated => write!(f, "truncated input"),
            Self::InvalidTag(t) => write!(f, "invalid tag: {t}"),
            Self::InvalidLength(n) => write!(f, "invalid length: {n}"),
            Self::TrailingBytes(n) => write!(f, "{n} trailing bytes after value"),
            Self::Io(kind) => write!(f, "io error: {kind}"),
        }
    }
}

impl std::error::Error for CodecError {}
impl From<std::io::Error> for CodecError {
    fn from(e: std::io::Error) -> Self {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            Self::Truncated
        } else {
            Self::Io(e.kind())
        }
    }
}

pub trait Encodable {
    fn encode<W: Write>(&self, w: &mut W) -> Result<(), CodecError>;
    fn encoded_len(&self) -> usize;
}

pub trait Decodable: Sized {
    fn decode<R: Read>(r: &mut R) -> Result<Self, CodecError>;
}

/// Kodiert einen Wert in einen frischen Puffer.
pub fn encode_to_vec<T: Encodable>(v: &T) -> Result<Vec<u8>, CodecError> {
    let mut buf = Vec::with_capacity(v.encoded_len());
    v.encode(&mut buf)?;
    Ok(buf)
}

/// Dekodiert genau einen Wert; übrig gebliebene Bytes sind ein Fehler.
pub fn decode_exact<T: Decodable>(bytes: &[u8]) -> Result<T, CodecError> {
    let mut s = bytes;
    let v = T::decode(&mut s)?;
    if !s.is_empty() {
        return Err(CodecError::TrailingBytes(s.len()));
    }
    Ok(v)
}

// Varint (u64) - little endian base-128, nur für Längen/Zähler
pub fn write_varu64<W: Write>(w: &mut W, mut v: u64) -> Result<(), CodecError> {
    let mut buf = [0u8; 10];
    let mut i = 0usize;
    while v >= 0x80 {
        if let Some(slot) = buf.get_mut(i) {
            *slot = (v as u8) | 0x80;
        } else {
            return Err(CodecError::InvalidLength(i));
        }
        v >>= 7;
        i += 1;
    }
    if let Some(slot) = buf.get_mut(i) {
        *slot = v as u8;
    } else {
        return Err(CodecError::InvalidLength(i));
    }
    i += 1;
    let to_write = buf.get(..i).ok_or(CodecError::InvalidLength(i))?;
    w.write_all(to_write).map_err(CodecError::from)
}

pub fn read_varu64<R: Read>(r: &mut R) -> Result<u64, CodecError> {
    let mut x: u64 = 0;
    let mut s = 0u32;
    for _ in 0..10 {
        let mut b = [0u8; 1];
        r.read_exact(&mut b)?;
        let [byte] = b;
        if (byte & 0x80) != 0 {
            x |= ((byte & 0x7f) as u64) << s;
            s += 7;
        } else {
            x |= (byte as u64) << s;
            return Ok(x);
        }
    }
    Err(CodecError::InvalidLength(0))
}

pub fn varu64_len(mut v: u64) -> usize {
    let mut i = 1;
    while v >= 0x80 {
        v >>= 7;
        i += 1
    }
    i
}

/// Liest eine Länge (varint) und prüft sie gegen `max`.
pub fn read_len<R: Read>(r: &mut R, max: usize) -> Result<usize, CodecError> {
    let len = read_varu64(r)?;
    let len = usize::try_from(len).map_err(|_| CodecError::InvalidLength(usize::MAX))?;
    if len > max {
        return Err(CodecError::InvalidLength(len));
    }
    Ok(len)
}

/// Variable Byte-Folge: varint-Länge + Rohbytes, Länge durch `max` begrenzt.
pub fn write_bytes<W: Write>(w: &mut W, bytes: &[u8]) -> Result<(), CodecError> {
    write_varu64(w, bytes.len() as u64)?;
    w.write_all(bytes).map_err(CodecError::from)
}

pub fn read_bytes<R: Read>(r: &mut R, max: usize) -> Result<Vec<u8>, CodecError> {
    let len = read_len(r, max)?;
    let mut out = vec![0u8; len];
    r.read_exact(&mut out)?;
    Ok(out)
}

pub fn bytes_len(bytes: &[u8]) -> usize {
    varu64_len(bytes.len() as u64) + bytes.len()
}

// Implementations for primitives
impl Encodable for u8 {
    fn encode<W: Write>(&self, w: &mut W) -> Result<(), CodecError> {
        w.write_all(&[*self]).map_err(CodecError::from)
    }
    fn encoded_len(&self) -> usize {
        1
    }
}
impl Decodable for u8 {
    fn decode<R: Read>(r: &mut R) -> Result<Self, CodecError> {
        let mut b = [0u8; 1];
        r.read_exact(&mut b)?;
        let [byte] = b;
        Ok(byte)
    }
}

impl Encodable for bool {
    fn encode<W: Write>(&self, w: &mut W) -> Result<(), CodecError> {
        (*self as u8).encode(w)
    }
    fn encoded_len(&self) -> usize {
        1
    }
}
impl Decodable for bool {
    fn decode<R: Read>(r: &mut R) -> Result<Self, CodecError> {
        match u8::decode(r)? {
            0 => Ok(false),
            1 => Ok(true),
            t => Err(CodecError::InvalidTag(t)),
        }
    }
}

impl Encodable for u16 {
    fn encode<W: Write>(&self, w: &mut W) -> Result<(), CodecError> {
        w.write_all(&self.to_le_bytes()).map_err(CodecError::from)
    }
    fn encoded_len(&self) -> usize {
        2
    }
}
impl Decodable for u16 {
    fn decode<R: Read>(r: &mut R) -> Result<Self, CodecError> {
        let mut b = [0u8; 2];
        r.read_exact(&mut b)?;
        Ok(u16::from_le_bytes(b))
    }
}

impl Encodable for u32 {
    fn encode<W: Write>(&self, w: &mut W) -> Result<(), CodecError> {
        w.write_all(&self.to_le_bytes()).map_err(CodecError::from)
    }
    fn encoded_len(&self) -> usize {
        4
    }
}
impl Decodable for u32 {
    fn decode<R: Read>(r: &mut R) -> Result<Self, CodecError> {
        let mut b = [0u8; 4];
        r.read_exact(&mut b)?;
        Ok(u32::from_le_bytes(b))
    }
}

// Höhen und Difficulty sind feste 64-Bit-Felder im Header-Layout
impl Encodable for u64 {
    fn encode<W: Write>(&self, w: &mut W) -> Result<(), CodecError> {
        w.write_all(&self.to_le_bytes()).map_err(CodecError::from)
    }
    fn encoded_len(&self) -> usize {
        8
    }
}
impl Decodable for u64 {
    fn decode<R: Read>(r: &mut R) -> Result<Self, CodecError> {
        let mut b = [0u8; 8];
        r.read_exact(&mut b)?;
        Ok(u64::from_le_bytes(b))
    }
}

impl Encodable for [u8; 32] {
    fn encode<W: Write>(&self, w: &mut W) -> Result<(), CodecError> {
        w.write_all(self).map_err(CodecError::from)
    }
    fn encoded_len(&self) -> usize {
        32
    }
}
impl Decodable for [u8; 32] {
    fn decode<R: Read>(r: &mut R) -> Result<Self, CodecError> {
        let mut b = [0u8; 32];
        r.read_exact(&mut b)?;
        Ok(b)
    }
}

impl<T: Encodable> Encodable for Vec<T> {
    fn encode<W: Write>(&self, w: &mut W) -> Result<(), CodecError> {
        write_varu64(w, self.len() as u64)?;
        for item in self {
            item.encode(w)?;
        }
        Ok(())
    }
    fn encoded_len(&self) -> usize {
        let i = varu64_len(self.len() as u64);
        self.iter().fold(i, |acc, it| acc + it.encoded_len())
    }
}
impl<T: Decodable> Decodable for Vec<T> {
    fn decode<R: Read>(r: &mut R) -> Result<Self, CodecError> {
        let len = read_len(r, MAX_DECODE_ITEMS)?;
        // Kapazität nicht blind aus der Eingabe übernehmen
        let mut v = Vec::with_capacity(len.min(1024));
        for _ in 0..len {
            v.push(T::decode(r)?);
        }
        Ok(v)
    }
}
