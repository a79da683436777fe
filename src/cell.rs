//! Cell Decoder
//!
//! Deserializes a bag-of-cells payload down to its root cell and exposes a
//! forward-only bit cursor over the root cell's data. Child references are
//! skipped, never followed: a referral message body always fits in one cell.
//!
//! A small builder/serializer is included for the write side of a single
//! reference-free cell, which is what fixtures and benchmarks need.

use base64::engine::general_purpose::{STANDARD, URL_SAFE};
use base64::Engine;
use crc::{Crc, CRC_32_ISCSI};
use thiserror::Error;

/// Generic bag-of-cells magic (`serialized_boc#b5ee9c72`)
pub const BOC_GENERIC_MAGIC: [u8; 4] = [0xb5, 0xee, 0x9c, 0x72];

/// Legacy indexed bag-of-cells magic
pub const BOC_INDEXED_MAGIC: [u8; 4] = [0x68, 0xff, 0x65, 0xf3];

/// Legacy indexed bag-of-cells magic with a trailing CRC32C
pub const BOC_INDEXED_CRC32_MAGIC: [u8; 4] = [0xac, 0xc3, 0xa7, 0x28];

/// Maximum number of data bits in one cell
pub const MAX_CELL_BITS: usize = 1023;

/// Maximum number of references in one cell
pub const MAX_CELL_REFS: usize = 4;

/// Widest integer `read_uint` can return
pub const MAX_UINT_BITS: usize = 128;

/// Largest byte length a coins amount may declare in its 4-bit prefix
pub const MAX_COINS_BYTES: usize = 15;

const FLAG_HAS_INDEX: u8 = 0x80;
const FLAG_HAS_CRC32: u8 = 0x40;
const SIZE_MASK: u8 = 0x07;

static CRC32C: Crc<u32> = Crc::<u32>::new(&CRC_32_ISCSI);

/// Errors that can occur while decoding a cell payload
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("Invalid base64 payload: {0}")]
    Base64(String),

    #[error("Unknown bag-of-cells magic: 0x{0}")]
    UnknownMagic(String),

    #[error("Bag-of-cells truncated: needed {needed} bytes at offset {offset}")]
    Truncated { offset: usize, needed: usize },

    #[error("Invalid bag-of-cells header: {0}")]
    InvalidHeader(String),

    #[error("Bag-of-cells has no root cell")]
    NoRoot,

    #[error("Root index {index} out of range for {cells} cells")]
    RootOutOfRange { index: usize, cells: usize },

    #[error("Invalid cell descriptor: {0}")]
    InvalidDescriptor(String),

    #[error("Exotic cells are not supported")]
    ExoticCell,

    #[error("CRC32C mismatch: stored {stored:#010x}, computed {computed:#010x}")]
    ChecksumMismatch { stored: u32, computed: u32 },

    #[error("Not enough bits: requested {requested}, remaining {remaining}")]
    NotEnoughBits { requested: usize, remaining: usize },

    #[error("Cannot read {0} bits into an integer (max 128)")]
    IntegerTooWide(usize),

    #[error("String tail is not byte-aligned: {0} bits remaining")]
    Misaligned(usize),

    #[error("String tail is not valid UTF-8: {0}")]
    InvalidUtf8(String),

    #[error("Value {value} does not fit in {bits} bits")]
    ValueTooWide { value: u128, bits: usize },

    #[error("Cell overflow: {0} bits exceeds the 1023-bit limit")]
    CellOverflow(usize),
}

/// A single decoded cell: its data bits and how many references it declared
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cell {
    data: Vec<u8>,
    bit_len: usize,
    ref_count: usize,
}

impl Cell {
    /// Number of data bits
    pub fn bit_len(&self) -> usize {
        self.bit_len
    }

    /// Number of child references the cell declared (not loaded)
    pub fn ref_count(&self) -> usize {
        self.ref_count
    }

    /// Raw data bytes; bits past `bit_len` are zero
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Start reading the cell's bits from the beginning
    pub fn begin_parse(&self) -> CellSlice<'_> {
        CellSlice {
            data: &self.data,
            bit_len: self.bit_len,
            cursor: 0,
        }
    }
}

/// Forward-only bit cursor over a cell's data
#[derive(Debug, Clone)]
pub struct CellSlice<'a> {
    data: &'a [u8],
    bit_len: usize,
    cursor: usize,
}

impl<'a> CellSlice<'a> {
    /// Bits not yet consumed
    pub fn remaining_bits(&self) -> usize {
        self.bit_len - self.cursor
    }

    fn ensure(&self, bits: usize) -> Result<(), DecodeError> {
        if bits > self.remaining_bits() {
            return Err(DecodeError::NotEnoughBits {
                requested: bits,
                remaining: self.remaining_bits(),
            });
        }
        Ok(())
    }

    fn next_bit(&mut self) -> bool {
        let byte = self.data[self.cursor / 8];
        let bit = (byte >> (7 - self.cursor % 8)) & 1 == 1;
        self.cursor += 1;
        bit
    }

    /// Read `bits` bits as a big-endian unsigned integer
    pub fn read_uint(&mut self, bits: usize) -> Result<u128, DecodeError> {
        if bits > MAX_UINT_BITS {
            return Err(DecodeError::IntegerTooWide(bits));
        }
        self.ensure(bits)?;
        let mut value = 0u128;
        for _ in 0..bits {
            value = (value << 1) | u128::from(self.next_bit());
        }
        Ok(value)
    }

    pub fn read_u32(&mut self) -> Result<u32, DecodeError> {
        Ok(self.read_uint(32)? as u32)
    }

    pub fn read_u64(&mut self) -> Result<u64, DecodeError> {
        Ok(self.read_uint(64)? as u64)
    }

    /// Read a coins amount: 4-bit byte length `L`, then `L` big-endian bytes
    ///
    /// `L = 0` yields zero without consuming anything past the prefix.
    pub fn read_coins(&mut self) -> Result<u128, DecodeError> {
        let len = self.read_uint(4)? as usize;
        if len == 0 {
            return Ok(0);
        }
        self.read_uint(len * 8)
    }

    /// Read `count` whole bytes; the cursor need not be byte-aligned
    pub fn read_bytes(&mut self, count: usize) -> Result<Vec<u8>, DecodeError> {
        self.ensure(count * 8)?;
        let mut bytes = Vec::with_capacity(count);
        for _ in 0..count {
            bytes.push(self.read_uint(8)? as u8);
        }
        Ok(bytes)
    }

    /// Consume every remaining bit as a UTF-8 string
    ///
    /// Fails if the remaining bit count is not a multiple of 8 or the bytes are
    /// not valid UTF-8. No lossy replacement is attempted.
    pub fn read_string(&mut self) -> Result<String, DecodeError> {
        let remaining = self.remaining_bits();
        if remaining % 8 != 0 {
            return Err(DecodeError::Misaligned(remaining));
        }
        let bytes = self.read_bytes(remaining / 8)?;
        String::from_utf8(bytes).map_err(|e| DecodeError::InvalidUtf8(e.to_string()))
    }
}

/// Decode base64 in either the standard or URL-safe alphabet
pub fn decode_base64(payload: &str) -> Result<Vec<u8>, DecodeError> {
    let payload = payload.trim();
    STANDARD
        .decode(payload)
        .or_else(|_| URL_SAFE.decode(payload))
        .map_err(|e| DecodeError::Base64(e.to_string()))
}

/// Decode a base64 bag-of-cells payload to its root cell
pub fn cell_from_base64(payload: &str) -> Result<Cell, DecodeError> {
    let bytes = decode_base64(payload)?;
    parse_boc(&bytes)
}

struct ByteReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn take(&mut self, count: usize) -> Result<&'a [u8], DecodeError> {
        let end = self
            .pos
            .checked_add(count)
            .filter(|end| *end <= self.bytes.len())
            .ok_or(DecodeError::Truncated {
                offset: self.pos,
                needed: count,
            })?;
        let slice = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn u8(&mut self) -> Result<u8, DecodeError> {
        Ok(self.take(1)?[0])
    }

    fn uint(&mut self, width: usize) -> Result<usize, DecodeError> {
        let value = self
            .take(width)?
            .iter()
            .fold(0u64, |acc, b| (acc << 8) | u64::from(*b));
        usize::try_from(value)
            .map_err(|_| DecodeError::InvalidHeader(format!("value {} overflows usize", value)))
    }
}

/// Parse a serialized bag-of-cells and return its first root cell
pub fn parse_boc(bytes: &[u8]) -> Result<Cell, DecodeError> {
    let mut reader = ByteReader::new(bytes);
    let magic = reader.take(4)?;

    let (generic, has_index, has_crc, size) = if magic == BOC_GENERIC_MAGIC {
        let flags = reader.u8()?;
        (
            true,
            flags & FLAG_HAS_INDEX != 0,
            flags & FLAG_HAS_CRC32 != 0,
            usize::from(flags & SIZE_MASK),
        )
    } else if magic == BOC_INDEXED_MAGIC {
        (false, true, false, usize::from(reader.u8()?))
    } else if magic == BOC_INDEXED_CRC32_MAGIC {
        (false, true, true, usize::from(reader.u8()?))
    } else {
        return Err(DecodeError::UnknownMagic(hex::encode(magic)));
    };

    if size == 0 || size > 4 {
        return Err(DecodeError::InvalidHeader(format!("reference size {} not in 1..=4", size)));
    }
    let offset_size = usize::from(reader.u8()?);
    if offset_size == 0 || offset_size > 8 {
        return Err(DecodeError::InvalidHeader(format!(
            "offset size {} not in 1..=8",
            offset_size
        )));
    }

    let cell_count = reader.uint(size)?;
    let root_count = reader.uint(size)?;
    let _absent = reader.uint(size)?;
    let total_cells_size = reader.uint(offset_size)?;

    if root_count == 0 {
        return Err(DecodeError::NoRoot);
    }

    // Legacy layouts carry no root list; their single root is cell 0.
    let root_index = if generic {
        let first = reader.uint(size)?;
        reader.take((root_count - 1) * size)?;
        first
    } else {
        0
    };
    if root_index >= cell_count {
        return Err(DecodeError::RootOutOfRange {
            index: root_index,
            cells: cell_count,
        });
    }

    if has_index {
        let index_len = cell_count
            .checked_mul(offset_size)
            .ok_or_else(|| DecodeError::InvalidHeader("index size overflows".to_string()))?;
        reader.take(index_len)?;
    }

    let cell_data = reader.take(total_cells_size)?;

    if has_crc {
        let checked_len = reader.pos;
        let stored = reader.take(4)?;
        let stored = u32::from_le_bytes([stored[0], stored[1], stored[2], stored[3]]);
        let computed = CRC32C.checksum(&bytes[..checked_len]);
        if stored != computed {
            return Err(DecodeError::ChecksumMismatch { stored, computed });
        }
    }

    let mut cells = ByteReader::new(cell_data);
    for index in 0..=root_index {
        let cell = read_cell(&mut cells, size)?;
        if index == root_index {
            return Ok(cell);
        }
    }
    Err(DecodeError::NoRoot)
}

fn read_cell(reader: &mut ByteReader<'_>, ref_size: usize) -> Result<Cell, DecodeError> {
    let d1 = reader.u8()?;
    let d2 = reader.u8()?;

    let ref_count = usize::from(d1 & 0x07);
    if ref_count > MAX_CELL_REFS {
        return Err(DecodeError::InvalidDescriptor(format!("{} references", ref_count)));
    }
    if d1 & 0x08 != 0 {
        return Err(DecodeError::ExoticCell);
    }
    if d1 & 0x10 != 0 {
        let level_mask = d1 >> 5;
        let hash_count = level_mask.count_ones() as usize + 1;
        // representation hash (32 bytes) + depth (2 bytes) per level
        reader.take(hash_count * 34)?;
    }

    let data_len = (usize::from(d2) + 1) / 2;
    let mut data = reader.take(data_len)?.to_vec();
    let bit_len = if d2 % 2 == 0 {
        data_len * 8
    } else {
        let last = data
            .last_mut()
            .ok_or_else(|| DecodeError::InvalidDescriptor("empty data with odd d2".to_string()))?;
        if *last == 0 {
            return Err(DecodeError::InvalidDescriptor("missing completion tag".to_string()));
        }
        let padding = last.trailing_zeros() as usize + 1;
        *last &= !(((1u16 << padding) - 1) as u8);
        data_len * 8 - padding
    };
    if bit_len > MAX_CELL_BITS {
        return Err(DecodeError::InvalidDescriptor(format!("{} data bits", bit_len)));
    }

    reader.take(ref_count * ref_size)?;

    Ok(Cell {
        data,
        bit_len,
        ref_count,
    })
}

/// Builder for a single reference-free cell
#[derive(Debug, Clone, Default)]
pub struct CellBuilder {
    data: Vec<u8>,
    bit_len: usize,
}

impl CellBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bit_len(&self) -> usize {
        self.bit_len
    }

    pub fn store_bit(&mut self, bit: bool) -> Result<&mut Self, DecodeError> {
        if self.bit_len == MAX_CELL_BITS {
            return Err(DecodeError::CellOverflow(self.bit_len + 1));
        }
        if self.bit_len % 8 == 0 {
            self.data.push(0);
        }
        if bit {
            let last = self.data.len() - 1;
            self.data[last] |= 1 << (7 - self.bit_len % 8);
        }
        self.bit_len += 1;
        Ok(self)
    }

    /// Store `value` as a big-endian integer of exactly `bits` bits
    pub fn store_uint(&mut self, value: u128, bits: usize) -> Result<&mut Self, DecodeError> {
        if bits > MAX_UINT_BITS {
            return Err(DecodeError::IntegerTooWide(bits));
        }
        if bits < MAX_UINT_BITS && value >> bits != 0 {
            return Err(DecodeError::ValueTooWide { value, bits });
        }
        if self.bit_len + bits > MAX_CELL_BITS {
            return Err(DecodeError::CellOverflow(self.bit_len + bits));
        }
        for i in (0..bits).rev() {
            self.store_bit((value >> i) & 1 == 1)?;
        }
        Ok(self)
    }

    /// Store a coins amount using the shortest byte length that holds it
    pub fn store_coins(&mut self, amount: u128) -> Result<&mut Self, DecodeError> {
        let len = (128 - amount.leading_zeros() as usize + 7) / 8;
        if len > MAX_COINS_BYTES {
            return Err(DecodeError::ValueTooWide {
                value: amount,
                bits: MAX_COINS_BYTES * 8,
            });
        }
        self.store_uint(len as u128, 4)?;
        self.store_uint(amount, len * 8)
    }

    pub fn store_bytes(&mut self, bytes: &[u8]) -> Result<&mut Self, DecodeError> {
        if self.bit_len + bytes.len() * 8 > MAX_CELL_BITS {
            return Err(DecodeError::CellOverflow(self.bit_len + bytes.len() * 8));
        }
        for byte in bytes {
            self.store_uint(u128::from(*byte), 8)?;
        }
        Ok(self)
    }

    pub fn build(&self) -> Cell {
        Cell {
            data: self.data.clone(),
            bit_len: self.bit_len,
            ref_count: 0,
        }
    }
}

/// Serialize one cell as a generic bag-of-cells with a CRC32C trailer
///
/// References are not serialized; the output always holds exactly one cell.
pub fn serialize_boc(cell: &Cell) -> Vec<u8> {
    let data_len = (cell.bit_len + 7) / 8;
    let mut data = cell.data[..data_len].to_vec();
    if cell.bit_len % 8 != 0 {
        data[cell.bit_len / 8] |= 1 << (7 - cell.bit_len % 8);
    }
    let d2 = (cell.bit_len / 8 + data_len) as u8;
    let cell_size = 2 + data.len();

    let mut out = Vec::with_capacity(11 + cell_size + 4);
    out.extend_from_slice(&BOC_GENERIC_MAGIC);
    out.push(FLAG_HAS_CRC32 | 1); // no index, crc32c, 1-byte references
    out.push(1); // 1-byte offsets
    out.push(1); // cells
    out.push(1); // roots
    out.push(0); // absent
    out.push(cell_size as u8);
    out.push(0); // root index
    out.push(0); // d1: ordinary cell, no references
    out.push(d2);
    out.extend_from_slice(&data);
    let crc = CRC32C.checksum(&out);
    out.extend_from_slice(&crc.to_le_bytes());
    out
}

/// Serialize one cell as base64 (standard alphabet)
pub fn serialize_boc_base64(cell: &Cell) -> String {
    STANDARD.encode(serialize_boc(cell))
}
