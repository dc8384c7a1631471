use std::{fs, io::Write, path::Path};

use tracing::debug;

use super::{trim_slot, Cursor, Header, Output, PhraseDict, CH_SZ, GTAB_MAGIC};
use crate::{
    error::{GtabError, Result},
    pack::{self, PackedEntry},
};

// Reads a table file back into memory and reconstructs its .cin source.
//
// Two layouts are accepted. Files starting with the v2 magic use the header
// in format/mod.rs. Everything else is parsed as the legacy layout produced
// by the old full-featured generator:
//
//   version      u32        flag         u32
//   cname        [u8; 32]   selkey       [u8; 12]
//   space_style  u32        key_s        u32   (symbol slots incl. slot 0)
//   max_press    u32        m_dup_sel    u32
//   def_c        u32
//   qkeys        [u8; 86480]   quick1[46][10][4] + quick2[46][46][10][4]
//   endkey       [u8; 99]   keybits      u8    (0 = derive from max_press)
//   selkey2      [u8; 10]   pad          [u8; 18]
//
// then the keymap (key_s bytes, slot 0 reserved), the keynames
// (key_s * 4), a first-key index table ((key_s + 1) * u32, unused here),
// the item array, and the phrase index + text buffer. Legacy key bytes are
// little-endian, unlike v2.
//
// Quick-key presence has no flag; the legacy generator left the region
// all-zero when the source had no %quick block. That comparison happens
// once here and is kept as an Option, never re-derived.

const LEGACY_FIXED_SIZE: usize = 72 + QKEYS_SIZE + 128;

const QUICK_MAX: usize = 46;
const QUICK_N: usize = 10;
const QUICK1_SIZE: usize = QUICK_MAX * QUICK_N * CH_SZ;
const QKEYS_SIZE: usize = QUICK1_SIZE + QUICK_MAX * QUICK_MAX * QUICK_N * CH_SZ;

// Legacy per-table behavior flags.
pub const FLAG_AUTO_SELECT_BY_PHRASE: u32 = 0x1;
pub const FLAG_DISP_PARTIAL_MATCH: u32 = 0x2;
pub const FLAG_DISP_FULL_MATCH: u32 = 0x4;
pub const FLAG_VERTICAL_SELECTION: u32 = 0x8;
pub const FLAG_PRESS_FULL_AUTO_SEND: u32 = 0x10;
pub const FLAG_UNIQUE_AUTO_SEND: u32 = 0x20;
pub const FLAG_KEEP_KEY_CASE: u32 = 0x40;
pub const FLAG_SYM_KBM: u32 = 0x80;
pub const FLAG_PHRASE_AUTO_SKIP_ENDKEY: u32 = 0x100;

// Directive spellings the legacy ecosystem expects, quirks included
// ("phase" is how the original spells it).
const FLAG_DIRECTIVES: &[(u32, &str)] = &[
    (FLAG_KEEP_KEY_CASE, "keep_key_case"),
    (FLAG_SYM_KBM, "symbol_kbm"),
    (FLAG_PHRASE_AUTO_SKIP_ENDKEY, "phase_auto_skip_endkey"),
    (FLAG_AUTO_SELECT_BY_PHRASE, "flag_auto_select_by_phrase"),
    (FLAG_DISP_PARTIAL_MATCH, "flag_disp_partial_match"),
    (FLAG_DISP_FULL_MATCH, "flag_disp_full_match"),
    (FLAG_VERTICAL_SELECTION, "flag_vertical_selection"),
    (FLAG_PRESS_FULL_AUTO_SEND, "flag_press_full_auto_send"),
    (FLAG_UNIQUE_AUTO_SEND, "flag_unique_auto_send"),
];

/// The quick-key region of a legacy table: ten single-keystroke candidates
/// per key and ten two-keystroke candidates per key pair.
#[derive(Debug, Clone)]
pub struct QuickKeys {
    data: Vec<u8>,
}

impl QuickKeys {
    /// Candidate `slot` for the single key with packed index `idx`.
    pub fn quick1(&self, idx: usize, slot: usize) -> &[u8] {
        if idx == 0 || idx > QUICK_MAX || slot >= QUICK_N {
            return &[];
        }
        let off = ((idx - 1) * QUICK_N + slot) * CH_SZ;
        trim_slot(&self.data[off..off + CH_SZ])
    }

    /// Candidate `slot` for the key pair with packed indices `i`, `j`.
    pub fn quick2(&self, i: usize, j: usize, slot: usize) -> &[u8] {
        if i == 0 || i > QUICK_MAX || j == 0 || j > QUICK_MAX || slot >= QUICK_N {
            return &[];
        }
        let off = QUICK1_SIZE + (((i - 1) * QUICK_MAX + (j - 1)) * QUICK_N + slot) * CH_SZ;
        trim_slot(&self.data[off..off + CH_SZ])
    }
}

/// Metadata only the legacy layout stores.
#[derive(Debug, Clone)]
pub struct LegacyExtras {
    pub dup_sel: u32,
    /// Keys that end a key sequence; the space key always counts.
    pub endkey: Vec<u8>,
    /// Present iff the quick-key region was not all-zero.
    pub quick: Option<QuickKeys>,
}

impl LegacyExtras {
    fn is_endkey(&self, key: u8) -> bool {
        key == b' ' || self.endkey.contains(&key)
    }
}

#[derive(Debug)]
pub struct LoadedTable {
    pub version: u32,
    pub flags: u32,
    pub cname: String,
    pub selkey: String,
    pub space_style: u8,
    pub max_press: u8,
    pub keybits: u8,
    pub key64: bool,
    /// Entry count as recorded in the header, even when the key width is
    /// unsupported and `items` stays empty.
    pub item_count: u32,
    pub keymap: Vec<u8>,
    pub keynames: Vec<String>,
    pub items: Vec<PackedEntry>,
    pub phrases: PhraseDict,
    pub legacy: Option<LegacyExtras>,
    width_supported: bool,
}

pub fn read<P: AsRef<Path>>(path: P) -> Result<LoadedTable> {
    let path = path.as_ref();
    let data = fs::read(path).map_err(|e| GtabError::io(path, e))?;
    let table = if data.len() >= 4
        && u32::from_le_bytes(data[0..4].try_into().unwrap()) == GTAB_MAGIC
    {
        parse_v2(&data)?
    } else {
        parse_legacy(&data)?
    };
    debug!(
        version = table.version,
        keybits = table.keybits,
        max_press = table.max_press,
        items = table.items.len(),
        phrases = table.phrases.len(),
        "loaded table"
    );
    Ok(table)
}

fn section(data: &[u8], off: u32, len: usize) -> Result<&[u8]> {
    data.get(off as usize..off as usize + len)
        .ok_or_else(|| {
            GtabError::format(format!(
                "section at offset {} ({} bytes) is out of bounds",
                off, len
            ))
        })
}

fn slot_string(slot: &[u8]) -> String {
    String::from_utf8_lossy(trim_slot(slot)).into_owned()
}

fn parse_v2(data: &[u8]) -> Result<LoadedTable> {
    let hdr = Header::read_le(data)?;
    let key_count = hdr.key_count as usize;

    let keymap = section(data, hdr.keymap_offset, key_count)?.to_vec();
    let keynames = section(data, hdr.keyname_offset, key_count * CH_SZ)?
        .chunks_exact(CH_SZ)
        .map(slot_string)
        .collect();

    let width = u32::from(hdr.max_press) * u32::from(hdr.keybits);
    let key64 = width > 32;
    let width_supported = width <= 64;

    let mut items = Vec::new();
    let mut phrases = PhraseDict::default();
    if width_supported {
        let key_sz = if key64 { 8 } else { 4 };
        let len = hdr.item_count as usize * (key_sz + CH_SZ);
        let raw = section(data, hdr.items_offset, len)?;
        items.reserve(hdr.item_count as usize);
        for rec in raw.chunks_exact(key_sz + CH_SZ) {
            let key = if key64 {
                u64::from_be_bytes(rec[0..8].try_into().unwrap())
            } else {
                u64::from(u32::from_be_bytes(rec[0..4].try_into().unwrap()))
            };
            let output = Output::decode(rec[key_sz..].try_into().unwrap());
            items.push(PackedEntry { key, output });
        }
        let tail = hdr.items_offset as usize + len;
        phrases = PhraseDict::decode(&mut Cursor::new(&data[tail..]))?;
    }

    Ok(LoadedTable {
        version: u32::from(super::GTAB_VERSION),
        flags: u32::from(hdr.flags),
        cname: slot_string(&hdr.cname),
        selkey: slot_string(&hdr.selkey),
        space_style: hdr.space_style,
        max_press: hdr.max_press,
        keybits: hdr.keybits,
        key64,
        item_count: hdr.item_count,
        keymap,
        keynames,
        items,
        phrases,
        legacy: None,
        width_supported,
    })
}

fn parse_legacy(data: &[u8]) -> Result<LoadedTable> {
    if data.len() < LEGACY_FIXED_SIZE {
        return Err(GtabError::format(format!(
            "file too short for a legacy table: {} bytes",
            data.len()
        )));
    }
    let mut c = Cursor::new(data);
    let version = c.read_u32()?;
    let flags = c.read_u32()?;
    let cname = slot_string(c.take(32)?);
    let selkey_raw = c.take(12)?;
    let space_style = c.read_u32()?;
    let key_s = c.read_u32()? as usize;
    let max_press = c.read_u32()?;
    let dup_sel = c.read_u32()?;
    let item_count = c.read_u32()?;
    let qkeys = c.take(QKEYS_SIZE)?;
    let endkey_raw = c.take(99)?;
    let mut keybits = c.read_u8()?;
    let selkey2_raw = c.take(10)?;
    c.take(18)?; // rest of the header tail union

    if key_s == 0 || key_s > 128 || max_press > 255 {
        return Err(GtabError::format(format!(
            "implausible legacy header: key_s={} max_press={}",
            key_s, max_press
        )));
    }
    let max_press = max_press as u8;

    // Old tables stored no keybits; the generator's defaults applied.
    if keybits == 0 {
        keybits = if max_press <= 5 { 6 } else { 7 };
    }

    // The last selkey byte doubles as a continuation marker: when set, the
    // selection keys run on into selkey2.
    let selkey = if selkey_raw[11] != 0 {
        let mut s = String::from_utf8_lossy(selkey_raw).into_owned();
        s.push_str(&slot_string(selkey2_raw));
        s
    } else {
        slot_string(selkey_raw)
    };

    let quick = if qkeys.iter().any(|&b| b != 0) {
        Some(QuickKeys {
            data: qkeys.to_vec(),
        })
    } else {
        None
    };
    let endkey: Vec<u8> = endkey_raw.iter().copied().take_while(|&b| b != 0).collect();

    // Slot 0 of the keymap and keyname tables is the reserved "no key".
    let keymap = c.take(key_s)?[1..].to_vec();
    let keynames = c.take(key_s * CH_SZ)?[CH_SZ..]
        .chunks_exact(CH_SZ)
        .map(slot_string)
        .collect();
    c.take((key_s + 1) * 4)?; // first-key index table, recomputable

    let width = u32::from(max_press) * u32::from(keybits);
    let key64 = width > 32;
    let width_supported = width <= 64;

    let mut items = Vec::new();
    let mut phrases = PhraseDict::default();
    if width_supported {
        let rec_sz = if key64 { 8 + CH_SZ } else { 4 + CH_SZ };
        if item_count as usize * rec_sz > c.remaining() {
            return Err(GtabError::format(format!(
                "item array claims {} records but only {} bytes remain",
                item_count,
                c.remaining()
            )));
        }
        items.reserve(item_count as usize);
        for _ in 0..item_count {
            let key = if key64 {
                u64::from_le_bytes(c.take(8)?.try_into().unwrap())
            } else {
                u64::from(u32::from_le_bytes(c.take(4)?.try_into().unwrap()))
            };
            let output = Output::decode(c.take(CH_SZ)?.try_into().unwrap());
            items.push(PackedEntry { key, output });
        }
        phrases = PhraseDict::decode(&mut c)?;
    }

    Ok(LoadedTable {
        version,
        flags,
        cname,
        selkey,
        space_style: space_style as u8,
        max_press,
        keybits,
        key64,
        item_count,
        keymap,
        keynames,
        items,
        phrases,
        legacy: Some(LegacyExtras {
            dup_sel,
            endkey,
            quick,
        }),
        width_supported,
    })
}

impl LoadedTable {
    /// The contiguous run of entries whose packed key equals `key`.
    pub fn exact_run(&self, key: u64) -> &[PackedEntry] {
        pack::exact_run(&self.items, key)
    }

    /// The contiguous run of entries whose first `len` keystrokes pack to
    /// `prefix`.
    pub fn prefix_run(&self, prefix: u64, len: u8) -> &[PackedEntry] {
        pack::prefix_run(&self.items, prefix, len, self.max_press, self.keybits)
    }

    /// Decode a packed key back into its ASCII key sequence. Index 0 is the
    /// left-align padding, so it terminates the sequence.
    pub fn decode_keys(&self, key: u64) -> String {
        let kb = u32::from(self.keybits).clamp(1, 64);
        let mask = u64::MAX >> (64 - kb);
        let mut out = String::new();
        for pos in 0..self.max_press {
            let shift = u32::from(self.max_press - 1 - pos) * kb;
            let idx = ((key >> shift) & mask) as usize;
            if idx == 0 {
                break;
            }
            let Some(&ch) = self.keymap.get(idx - 1) else {
                break;
            };
            out.push(ch as char);
        }
        out
    }

    /// Rebuild the table definition the file was generated from.
    pub fn to_definition(&self) -> crate::cin::TableDefinition {
        crate::cin::TableDefinition {
            cname: self.cname.clone(),
            selkey: self.selkey.clone(),
            space_style: self.space_style,
            keynames: self
                .keymap
                .iter()
                .zip(&self.keynames)
                .map(|(&key, name)| crate::cin::KeyName {
                    key,
                    name: name.clone(),
                })
                .collect(),
            entries: self
                .items
                .iter()
                .map(|it| crate::cin::Entry {
                    keys: self.decode_keys(it.key),
                    text: String::from_utf8_lossy(self.output_bytes(&it.output)).into_owned(),
                })
                .collect(),
        }
    }

    fn output_bytes<'a>(&'a self, output: &'a Output) -> &'a [u8] {
        match output {
            Output::Glyph(_) => output.glyph_bytes().unwrap_or(&[]),
            Output::Phrase(idx) => self.phrases.get(*idx).unwrap_or(&[]),
        }
    }

    /// Emit the .cin source definition for this table. `ename` is the short
    /// table name, conventionally the input file's base name.
    pub fn reconstruct<W: Write>(&self, w: &mut W, ename: &str) -> std::io::Result<()> {
        writeln!(w, "#\n# cin file created via gtab2cin\n#")?;
        writeln!(w, "%gen_inp")?;
        writeln!(w, "%ename {}", ename)?;
        writeln!(w, "%cname {}", self.cname)?;
        writeln!(w, "%selkey {}", self.selkey)?;
        if let Some(extras) = &self.legacy {
            writeln!(w, "%dupsel {}", extras.dup_sel)?;
            if !extras.endkey.is_empty() {
                write!(w, "%endkey ")?;
                w.write_all(&extras.endkey)?;
                writeln!(w)?;
            }
        }
        writeln!(w, "%space_style {}", self.space_style)?;
        if self.legacy.is_some() {
            for &(bit, name) in FLAG_DIRECTIVES {
                if self.flags & bit != 0 {
                    writeln!(w, "%{}", name)?;
                }
            }
        }

        writeln!(w, "%keyname begin")?;
        for (i, &key) in self.keymap.iter().enumerate() {
            // A leading # would turn the line into a comment when re-read.
            if key == b'#' {
                write!(w, " ")?;
            }
            write!(w, "{} ", key as char)?;
            writeln!(w, "{}", self.keynames.get(i).map(String::as_str).unwrap_or(""))?;
        }
        writeln!(w, "%keyname end")?;

        if let Some(extras) = &self.legacy {
            if let Some(quick) = &extras.quick {
                self.write_quick(w, extras, quick)?;
            }
        }

        writeln!(w, "%chardef begin")?;
        if !self.width_supported {
            writeln!(w, "# Unknown chardef")?;
        }
        for it in &self.items {
            let keys = self.decode_keys(it.key);
            if keys.starts_with('#') {
                write!(w, " ")?;
            }
            write!(w, "{} ", keys)?;
            w.write_all(self.output_bytes(&it.output))?;
            writeln!(w)?;
        }
        writeln!(w, "%chardef end")?;

        writeln!(w, "#")?;
        writeln!(w, "# Gtab version: {}", self.version)?;
        writeln!(w, "# flags: {:#x}", self.flags)?;
        writeln!(w, "# keybits: {}", self.keybits)?;
        writeln!(w, "# MaxPress: {}", self.max_press)?;
        writeln!(w, "# Defined Characters : {}", self.item_count)?;
        writeln!(w, "#")?;
        Ok(())
    }

    fn write_quick<W: Write>(
        &self,
        w: &mut W,
        extras: &LegacyExtras,
        quick: &QuickKeys,
    ) -> std::io::Result<()> {
        let n = self.keymap.len().min(QUICK_MAX);
        writeln!(w, "%quick begin")?;
        for i in 1..=n {
            let key = self.keymap[i - 1];
            if extras.is_endkey(key) {
                continue;
            }
            write!(w, "{} ", key as char)?;
            for slot in 0..QUICK_N {
                w.write_all(quick.quick1(i, slot))?;
            }
            writeln!(w)?;
        }
        for i in 1..=n {
            for j in 1..=n {
                let (ki, kj) = (self.keymap[i - 1], self.keymap[j - 1]);
                if extras.is_endkey(ki) || extras.is_endkey(kj) {
                    continue;
                }
                write!(w, "{}{} ", ki as char, kj as char)?;
                for slot in 0..QUICK_N {
                    let g = quick.quick2(i, j, slot);
                    if g.is_empty() {
                        // Empty slots still take a visible placeholder so
                        // the line keeps ten candidates.
                        write!(w, "□")?;
                    } else {
                        w.write_all(g)?;
                    }
                }
                writeln!(w)?;
            }
        }
        writeln!(w, "%quick end")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{cin, pack};

    #[test]
    fn test_v2_file_round_trip() {
        let src = "\
%cname 測試
%selkey 123456789
%space_style 1
%keyname begin
a 日
b 月
c 金
%keyname end
%chardef begin
a 日
ab 明
abc 一二三四五六七八
b 月
%chardef end
";
        let def = cin::parse(src.as_bytes()).unwrap();
        let built = pack::build(&def).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.gtab");
        super::super::writer::write(&built, &path).unwrap();

        let t = read(&path).unwrap();
        assert_eq!(t.version, 2);
        assert_eq!(t.item_count, 4);
        assert_eq!((t.keybits, t.max_press, t.key64), (2, 3, false));
        assert!(t.items.windows(2).all(|w| w[0].key <= w[1].key));

        // Prefix "ab" packs to (1 << 2) | 2; its run is "ab" and "abc".
        assert_eq!(t.prefix_run(0b0110, 2).len(), 2);
        assert_eq!(t.exact_run(0b0110 << 2).len(), 1);

        // The 8-character phrase must come back byte for byte.
        assert_eq!(t.phrases.get(0), Some("一二三四五六七八".as_bytes()));

        let mut out = Vec::new();
        t.reconstruct(&mut out, "test.gtab").unwrap();
        let def2 = cin::parse(&out[..]).unwrap();
        assert_eq!(def, def2);

        // And once more through to_definition, which skips the text step.
        assert_eq!(def, t.to_definition());
    }

    fn le32(v: &mut Vec<u8>, x: u32) {
        v.extend_from_slice(&x.to_le_bytes());
    }

    fn padded(s: &str, n: usize) -> Vec<u8> {
        let mut v = s.as_bytes().to_vec();
        v.resize(n, 0);
        v
    }

    // A legacy image with symbols a/b, entries "a"→中, "ab"→好 and a
    // phrase entry "b", one quick1 candidate, endkey ";" and two flags.
    fn legacy_image() -> Vec<u8> {
        let mut v = Vec::new();
        le32(&mut v, 1); // version
        le32(&mut v, FLAG_KEEP_KEY_CASE | FLAG_DISP_PARTIAL_MATCH);
        v.extend_from_slice(&padded("舊表", 32));
        v.extend_from_slice(&padded("1234567890", 12));
        le32(&mut v, 1); // space_style
        le32(&mut v, 3); // key_s: reserved slot + a + b
        le32(&mut v, 2); // max_press
        le32(&mut v, 10); // dup_sel
        le32(&mut v, 3); // def_c

        let mut qkeys = vec![0u8; QKEYS_SIZE];
        qkeys[..3].copy_from_slice("速".as_bytes()); // quick1['a'][0]
        v.extend_from_slice(&qkeys);

        v.extend_from_slice(&padded(";", 99)); // endkey
        v.push(0); // keybits: 0 derives the default of 6
        v.extend_from_slice(&[0u8; 10]); // selkey2
        v.extend_from_slice(&[0u8; 18]); // pad

        v.extend_from_slice(&[0, b'a', b'b']); // keymap, slot 0 reserved
        v.extend_from_slice(&padded("", 4));
        v.extend_from_slice(&padded("日", 4));
        v.extend_from_slice(&padded("月", 4));
        v.extend_from_slice(&vec![0u8; 4 * 4]); // first-key index table

        // Items, little-endian 32-bit keys at keybits 6, max_press 2.
        le32(&mut v, 1 << 6); // "a"
        v.extend_from_slice(&padded("中", 4));
        le32(&mut v, (1 << 6) | 2); // "ab"
        v.extend_from_slice(&padded("好", 4));
        le32(&mut v, 2 << 6); // "b", phrase 0
        v.extend_from_slice(&[0, 0, 0, 0]);

        // Phrase tail: slot count, offsets 0 and 24, then the text.
        le32(&mut v, 2);
        le32(&mut v, 0);
        le32(&mut v, 24);
        v.extend_from_slice("一二三四五六七八".as_bytes());
        v
    }

    #[test]
    fn test_legacy_reconstruct() {
        let t = parse_legacy(&legacy_image()).unwrap();
        assert_eq!(t.cname, "舊表");
        assert_eq!((t.keybits, t.max_press, t.key64), (6, 2, false));
        assert_eq!(t.keymap, b"ab");
        assert_eq!(t.keynames, vec!["日", "月"]);
        let extras = t.legacy.as_ref().unwrap();
        assert_eq!(extras.dup_sel, 10);
        assert_eq!(extras.endkey, b";");
        let quick = extras.quick.as_ref().unwrap();
        assert_eq!(quick.quick1(1, 0), "速".as_bytes());
        assert!(quick.quick1(2, 0).is_empty());

        let mut out = Vec::new();
        t.reconstruct(&mut out, "old.gtab").unwrap();
        let text = String::from_utf8(out).unwrap();
        for needle in [
            "%dupsel 10",
            "%endkey ;",
            "%keep_key_case",
            "%flag_disp_partial_match",
            "%quick begin",
            "a 速",
            "ab □□□□□□□□□□",
            "b 一二三四五六七八",
        ] {
            assert!(text.contains(needle), "missing {:?} in:\n{}", needle, text);
        }
        assert!(!text.contains("%symbol_kbm"));

        let def = cin::parse(text.as_bytes()).unwrap();
        assert_eq!(def.cname, "舊表");
        assert_eq!(def.space_style, 1);
        assert_eq!(def.keynames.len(), 2);
        let entries: Vec<_> = def
            .entries
            .iter()
            .map(|e| (e.keys.as_str(), e.text.as_str()))
            .collect();
        assert_eq!(
            entries,
            vec![("a", "中"), ("ab", "好"), ("b", "一二三四五六七八")]
        );
    }

    #[test]
    fn test_legacy_without_quick_or_flags() {
        let mut img = legacy_image();
        // Zero the flag word and the whole quick region.
        img[4..8].copy_from_slice(&[0; 4]);
        let qstart = 72;
        img[qstart..qstart + QKEYS_SIZE].fill(0);

        let t = parse_legacy(&img).unwrap();
        assert!(t.legacy.as_ref().unwrap().quick.is_none());
        let mut out = Vec::new();
        t.reconstruct(&mut out, "old.gtab").unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(!text.contains("%quick begin"));
        assert!(!text.contains("%keep_key_case"));
    }

    #[test]
    fn test_legacy_unsupported_width() {
        let mut img = legacy_image();
        // max_press 8 at keybits 9 is 72 bits: outside both envelopes.
        img[60..64].copy_from_slice(&8u32.to_le_bytes());
        let keybits_at = 72 + QKEYS_SIZE + 99;
        img[keybits_at] = 9;
        // Truncate after the first-key index table; items are undecodable.
        let items_at = LEGACY_FIXED_SIZE + 3 + 3 * 4 + 4 * 4;
        img.truncate(items_at);

        let t = parse_legacy(&img).unwrap();
        assert!(t.items.is_empty());
        assert_eq!(t.item_count, 3);
        let mut out = Vec::new();
        t.reconstruct(&mut out, "old.gtab").unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("# Unknown chardef"));
        assert!(text.contains("# Defined Characters : 3"));
    }

    #[test]
    fn test_read_errors() {
        let dir = tempfile::tempdir().unwrap();
        match read(dir.path().join("missing.gtab")) {
            Err(crate::GtabError::Io { .. }) => {}
            other => panic!("wanted Io error, got {:?}", other.map(|t| t.cname)),
        }

        let path = dir.path().join("short.bin");
        std::fs::write(&path, b"not a table").unwrap();
        match read(&path) {
            Err(crate::GtabError::UnsupportedFormat(_)) => {}
            other => panic!("wanted format error, got {:?}", other.map(|t| t.cname)),
        }

        // Right magic, truncated body.
        std::fs::write(&path, GTAB_MAGIC.to_le_bytes()).unwrap();
        assert!(matches!(
            read(&path),
            Err(crate::GtabError::UnsupportedFormat(_))
        ));
    }
}
