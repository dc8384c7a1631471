pub mod reader;
pub mod writer;

use std::io::{self, Write};

use crate::error::{GtabError, Result};

// The gtab binary table format.
//
// A v2 file is a 72-byte header followed by three sections whose byte
// offsets are recorded in the header, so readers never recompute the layout:
//
//   header      magic, version, flags, display name, selection keys,
//               space style, key_count, max_press, keybits, item_count,
//               and the three section offsets
//   keymap      key_count ASCII bytes; byte i is the symbol whose
//               packed-key index is i + 1 (index 0 means "no key")
//   keynames    key_count fixed 4-byte slots of zero-padded UTF-8 labels
//   items       item_count fixed-size records, sorted ascending by key:
//               4 or 8 key bytes (big-endian, so byte order is numeric
//               order) plus a 4-byte output slot
//
// When the table defines phrases, the items section is followed by a phrase
// index (an i32 slot count, then that many i32 offsets) and a flat UTF-8
// text buffer. The region has no header offset; readers find it by the file
// length past the items section. The same tail layout closes the legacy
// format, which reader.rs also understands.
//
// All integers are little-endian except the item key bytes.

pub const GTAB_MAGIC: u32 = 0x4847_5432;
pub const GTAB_VERSION: u16 = 2;
pub const HEADER_SIZE: usize = 72;

/// Header flag bit 0: items carry 8 key bytes instead of 4. Redundant with
/// `max_press * keybits > 32`, which is the rule both sides actually apply.
pub const FLAG_KEY64: u16 = 0x1;

/// Size of one output slot (and one keyname label slot).
pub const CH_SZ: usize = 4;

/// Highest phrase index the output slot can tag. The slot's first byte must
/// be zero to mark a phrase, which caps the index at 16 bits in practice;
/// the decoder still reads the original three-byte form.
pub const PHRASE_LIMIT: usize = 0x1_0000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub flags: u16,
    pub cname: [u8; 32],
    pub selkey: [u8; 12],
    pub space_style: u8,
    pub key_count: u8,
    pub max_press: u8,
    pub keybits: u8,
    pub item_count: u32,
    pub keymap_offset: u32,
    pub keyname_offset: u32,
    pub items_offset: u32,
}

impl Header {
    /// Serialize to [`HEADER_SIZE`] bytes, little-endian.
    ///
    /// ```text
    /// magic           u32   [0..4]
    /// version         u16   [4..6]
    /// flags           u16   [6..8]    bit 0 = 64-bit keys
    /// cname           [32]  [8..40]
    /// selkey          [12]  [40..52]
    /// space_style     u8    [52]
    /// key_count       u8    [53]
    /// max_press       u8    [54]
    /// keybits         u8    [55]
    /// item_count      u32   [56..60]
    /// keymap_offset   u32   [60..64]
    /// keyname_offset  u32   [64..68]
    /// items_offset    u32   [68..72]
    /// ```
    pub fn write_le(&self, buf: &mut [u8; HEADER_SIZE]) {
        buf[0..4].copy_from_slice(&GTAB_MAGIC.to_le_bytes());
        buf[4..6].copy_from_slice(&GTAB_VERSION.to_le_bytes());
        buf[6..8].copy_from_slice(&self.flags.to_le_bytes());
        buf[8..40].copy_from_slice(&self.cname);
        buf[40..52].copy_from_slice(&self.selkey);
        buf[52] = self.space_style;
        buf[53] = self.key_count;
        buf[54] = self.max_press;
        buf[55] = self.keybits;
        buf[56..60].copy_from_slice(&self.item_count.to_le_bytes());
        buf[60..64].copy_from_slice(&self.keymap_offset.to_le_bytes());
        buf[64..68].copy_from_slice(&self.keyname_offset.to_le_bytes());
        buf[68..72].copy_from_slice(&self.items_offset.to_le_bytes());
    }

    pub fn read_le(buf: &[u8]) -> Result<Header> {
        if buf.len() < HEADER_SIZE {
            return Err(GtabError::format(format!(
                "file too short for header: {} bytes",
                buf.len()
            )));
        }
        let magic = u32::from_le_bytes(buf[0..4].try_into().unwrap());
        if magic != GTAB_MAGIC {
            return Err(GtabError::format(format!("bad magic {:#010x}", magic)));
        }
        let version = u16::from_le_bytes(buf[4..6].try_into().unwrap());
        if version != GTAB_VERSION {
            return Err(GtabError::format(format!("unknown version {}", version)));
        }
        Ok(Header {
            flags: u16::from_le_bytes(buf[6..8].try_into().unwrap()),
            cname: buf[8..40].try_into().unwrap(),
            selkey: buf[40..52].try_into().unwrap(),
            space_style: buf[52],
            key_count: buf[53],
            max_press: buf[54],
            keybits: buf[55],
            item_count: u32::from_le_bytes(buf[56..60].try_into().unwrap()),
            keymap_offset: u32::from_le_bytes(buf[60..64].try_into().unwrap()),
            keyname_offset: u32::from_le_bytes(buf[64..68].try_into().unwrap()),
            items_offset: u32::from_le_bytes(buf[68..72].try_into().unwrap()),
        })
    }
}

/// One entry's output slot: either up to [`CH_SZ`] bytes of UTF-8, or a
/// reference into the phrase dictionary. On disk the two are told apart by
/// the first byte being zero, which no UTF-8 text can start with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Output {
    Glyph([u8; CH_SZ]),
    Phrase(u32),
}

impl Output {
    /// Pack text of at most [`CH_SZ`] bytes into a zero-padded glyph slot.
    pub fn glyph(text: &str) -> Output {
        debug_assert!(!text.is_empty() && text.len() <= CH_SZ);
        let mut slot = [0u8; CH_SZ];
        slot[..text.len()].copy_from_slice(text.as_bytes());
        Output::Glyph(slot)
    }

    pub fn encode(&self) -> [u8; CH_SZ] {
        match self {
            Output::Glyph(slot) => *slot,
            Output::Phrase(idx) => [(idx >> 16) as u8, (idx >> 8) as u8, *idx as u8, 0],
        }
    }

    pub fn decode(slot: [u8; CH_SZ]) -> Output {
        if slot[0] == 0 {
            // The high term is always zero here (slot[0] was just checked),
            // matching the original arithmetic exactly; see PHRASE_LIMIT.
            let idx =
                ((slot[0] as u32) << 16) | ((slot[1] as u32) << 8) | slot[2] as u32;
            Output::Phrase(idx)
        } else {
            Output::Glyph(slot)
        }
    }

    /// Glyph bytes up to the zero padding; `None` for phrase refs.
    pub fn glyph_bytes(&self) -> Option<&[u8]> {
        match self {
            Output::Glyph(slot) => Some(trim_slot(slot)),
            Output::Phrase(_) => None,
        }
    }
}

/// Contents of a fixed-size slot up to its zero padding.
pub(crate) fn trim_slot(slot: &[u8]) -> &[u8] {
    let n = slot.iter().position(|&b| b == 0).unwrap_or(slot.len());
    &slot[..n]
}

/// Phrase dictionary: a flat UTF-8 buffer plus an offset table with one
/// trailing fencepost. Phrase p spans `buf[offsets[p]..offsets[p + 1]]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhraseDict {
    offsets: Vec<u32>,
    buf: Vec<u8>,
}

impl Default for PhraseDict {
    fn default() -> Self {
        PhraseDict {
            offsets: vec![0],
            buf: Vec::new(),
        }
    }
}

impl PhraseDict {
    pub fn len(&self) -> usize {
        self.offsets.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn push(&mut self, text: &str) -> u32 {
        let idx = self.len() as u32;
        self.buf.extend_from_slice(text.as_bytes());
        self.offsets.push(self.buf.len() as u32);
        idx
    }

    pub fn get(&self, idx: u32) -> Option<&[u8]> {
        let start = *self.offsets.get(idx as usize)? as usize;
        let end = *self.offsets.get(idx as usize + 1)? as usize;
        self.buf.get(start..end)
    }

    // Wire form: i32 slot count n (= phrase count + 1), n i32 offsets, then
    // the text buffer. Identical in the v2 tail and the legacy tail.
    pub(crate) fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_all(&(self.offsets.len() as u32).to_le_bytes())?;
        for off in &self.offsets {
            w.write_all(&off.to_le_bytes())?;
        }
        w.write_all(&self.buf)
    }

    pub(crate) fn decode(c: &mut Cursor) -> Result<PhraseDict> {
        if c.remaining() == 0 {
            return Ok(PhraseDict::default());
        }
        let n = c.read_u32()? as usize;
        if n == 0 {
            return Ok(PhraseDict::default());
        }
        if n > c.remaining() / 4 {
            return Err(GtabError::format(format!(
                "phrase index claims {} offsets but only {} bytes remain",
                n,
                c.remaining()
            )));
        }
        let mut offsets = Vec::with_capacity(n);
        for _ in 0..n {
            offsets.push(c.read_u32()?);
        }
        let buf = c.take(c.remaining())?.to_vec();
        Ok(PhraseDict { offsets, buf })
    }
}

// Bounds-checked cursor over an in-memory file image. Running off the end
// is an unsupported-format error, not a panic: short files are data we
// reject, not bugs.
pub(crate) struct Cursor<'a> {
    data: &'a [u8],
    idx: usize,
}

impl<'a> Cursor<'a> {
    pub(crate) fn new(data: &'a [u8]) -> Self {
        Cursor { data, idx: 0 }
    }

    pub(crate) fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.remaining() < n {
            return Err(GtabError::format(format!(
                "file truncated: wanted {} bytes at offset {}, have {}",
                n,
                self.idx,
                self.remaining()
            )));
        }
        self.idx += n;
        Ok(&self.data[self.idx - n..self.idx])
    }

    pub(crate) fn read_u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    pub(crate) fn read_u32(&mut self) -> Result<u32> {
        Ok(u32::from_le_bytes(self.take(4)?.try_into().unwrap()))
    }

    pub(crate) fn remaining(&self) -> usize {
        self.data.len() - self.idx
    }
}
