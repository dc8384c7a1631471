use std::{
    fs,
    path::{Path, PathBuf},
    sync::OnceLock,
};

use tracing::debug;

use crate::{
    conf,
    error::{GtabError, Result},
};

// Bulk character translation (script-variant conversion) over a flat,
// pre-sorted table of codepoint pairs.
//
// The table file is an array of 8-byte records: 4 bytes of source UTF-8 and
// 4 bytes of target UTF-8, each zero-padded and compared as a little-endian
// integer. The file is sorted ascending by source key; that is a trusted
// precondition, not something the loader verifies.
//
// Each direction's table is loaded whole on first use and kept for the
// process lifetime. There is no reload: pick up a new table by restarting.

const PAIR_SIZE: usize = 8;

/// Starting output capacity; the buffer doubles from there as needed.
pub const INITIAL_BUF_SIZE: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    TradToSim,
    SimToTrad,
}

impl Direction {
    pub fn table_name(self) -> &'static str {
        match self {
            Direction::TradToSim => "t2s.dat",
            Direction::SimToTrad => "s2t.dat",
        }
    }
}

#[derive(Debug)]
pub struct TransTable {
    pairs: Vec<(u32, u32)>,
}

impl TransTable {
    pub fn load(path: &Path) -> Result<TransTable> {
        let data = fs::read(path).map_err(|e| GtabError::io(path, e))?;
        if data.len() % PAIR_SIZE != 0 {
            return Err(GtabError::format(format!(
                "translation table {} is {} bytes, not a multiple of {}",
                path.display(),
                data.len(),
                PAIR_SIZE
            )));
        }
        let pairs = data
            .chunks_exact(PAIR_SIZE)
            .map(|rec| {
                (
                    u32::from_le_bytes(rec[0..4].try_into().unwrap()),
                    u32::from_le_bytes(rec[4..8].try_into().unwrap()),
                )
            })
            .collect::<Vec<_>>();
        debug!(path = %path.display(), pairs = pairs.len(), "loaded translation table");
        Ok(TransTable { pairs })
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    fn lookup(&self, key: u32) -> Option<u32> {
        self.pairs
            .binary_search_by_key(&key, |&(a, _)| a)
            .ok()
            .map(|i| self.pairs[i].1)
    }
}

// A character's UTF-8 bytes packed into the 4-byte slot, as an integer.
fn char_key(c: char) -> u32 {
    let mut slot = [0u8; 4];
    c.encode_utf8(&mut slot);
    u32::from_le_bytes(slot)
}

fn key_char(key: u32) -> Option<char> {
    let slot = key.to_le_bytes();
    let n = slot.iter().position(|&b| b == 0).unwrap_or(4);
    std::str::from_utf8(&slot[..n]).ok()?.chars().next()
}

/// Owns the per-direction cached tables. Each cell is populated at most
/// once; after that the table is read-only and shared for the process
/// lifetime.
#[derive(Debug)]
pub struct Translator {
    data_dir: PathBuf,
    t2s: OnceLock<TransTable>,
    s2t: OnceLock<TransTable>,
}

impl Translator {
    pub fn new(data_dir: impl Into<PathBuf>) -> Translator {
        Translator {
            data_dir: data_dir.into(),
            t2s: OnceLock::new(),
            s2t: OnceLock::new(),
        }
    }

    /// Translator over the system data directory, honoring the settings
    /// file and the environment override.
    pub fn with_default_dir() -> Translator {
        let settings = conf::Settings::load(&conf::user_dir()).ok();
        Translator::new(conf::resolve_data_dir(None, settings.as_ref()))
    }

    fn table(&self, direction: Direction) -> Result<&TransTable> {
        let cell = match direction {
            Direction::TradToSim => &self.t2s,
            Direction::SimToTrad => &self.s2t,
        };
        if let Some(t) = cell.get() {
            return Ok(t);
        }
        let path = conf::table_path(&self.data_dir, direction.table_name())?;
        let table = TransTable::load(&path)?;
        // A racing load may have won; either table is the same file.
        Ok(cell.get_or_init(|| table))
    }

    /// Translate every character of `input` through the direction's table.
    /// Characters without a mapping pass through unchanged.
    pub fn translate(&self, direction: Direction, input: &str) -> Result<String> {
        let table = self.table(direction)?;
        let mut out = String::with_capacity(std::cmp::max(INITIAL_BUF_SIZE, input.len() * 2));
        for c in input.chars() {
            match table.lookup(char_key(c)).and_then(key_char) {
                Some(mapped) => out.push(mapped),
                None => out.push(c),
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair_bytes(pairs: &[(char, char)]) -> Vec<u8> {
        let mut v = Vec::new();
        for &(a, b) in pairs {
            v.extend_from_slice(&char_key(a).to_le_bytes());
            v.extend_from_slice(&char_key(b).to_le_bytes());
        }
        v
    }

    fn translator_with(pairs: &[(char, char)]) -> (tempfile::TempDir, Translator) {
        let mut sorted = pairs.to_vec();
        sorted.sort_by_key(|&(a, _)| char_key(a));
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("t2s.dat"), pair_bytes(&sorted)).unwrap();
        let tr = Translator::new(dir.path());
        (dir, tr)
    }

    #[test]
    fn test_identity_fallback() {
        let (_dir, tr) = translator_with(&[('\u{5c9e}', '\u{5c9b}')]);
        // Only the first character has a mapping; the second passes through.
        let out = tr.translate(Direction::TradToSim, "\u{5c9e}\u{5ca1}").unwrap();
        assert_eq!(out, "\u{5c9b}\u{5ca1}");
    }

    #[test]
    fn test_empty_input() {
        let (_dir, tr) = translator_with(&[('a', 'b')]);
        let out = tr.translate(Direction::TradToSim, "").unwrap();
        assert_eq!(out, "");
        assert!(out.capacity() >= INITIAL_BUF_SIZE);
    }

    #[test]
    fn test_ascii_and_multibyte_mix() {
        let (_dir, tr) = translator_with(&[('發', '发'), ('龍', '龙'), ('x', 'y')]);
        let out = tr.translate(Direction::TradToSim, "x發a龍").unwrap();
        assert_eq!(out, "y发a龙");
    }

    #[test]
    fn test_load_once_per_direction() {
        let (dir, tr) = translator_with(&[('發', '发')]);
        assert_eq!(tr.translate(Direction::TradToSim, "發").unwrap(), "发");
        // Deleting the file does not disturb the resident table.
        std::fs::remove_file(dir.path().join("t2s.dat")).unwrap();
        assert_eq!(tr.translate(Direction::TradToSim, "發").unwrap(), "发");
        // The other direction was never loaded, so it fails now.
        assert!(tr.translate(Direction::SimToTrad, "发").is_err());
    }

    #[test]
    fn test_table_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t2s.dat");
        std::fs::write(&path, pair_bytes(&[('x', 'y'), ('發', '发')])).unwrap();
        let table = TransTable::load(&path).unwrap();
        assert_eq!(table.len(), 2);
        assert!(!table.is_empty());
    }

    #[test]
    fn test_bad_table_length() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("t2s.dat"), [1, 2, 3]).unwrap();
        let tr = Translator::new(dir.path());
        assert!(matches!(
            tr.translate(Direction::TradToSim, "x"),
            Err(crate::GtabError::UnsupportedFormat(_))
        ));
    }
}
