use std::{
    fs::File,
    io::{self, BufRead, BufReader},
    path::Path,
};

use tracing::warn;

use crate::error::{GtabError, Result};

// This module holds the text side of the codec: the .cin source definition
// format and its parser.
//
// A .cin file is line-oriented UTF-8. `#` at the start of a line is a
// comment, `%` introduces a directive. Two directives open block regions:
//
//   %keyname begin          one "<key> <label>" line per key symbol; the
//   %keyname end            order of appearance is the packed-key index
//
//   %chardef begin          one "<key-sequence> <output>" line per entry
//   %chardef end
//
// Everything else that starts with `%` is reserved and skipped, including
// whole `%quick` blocks (quick keys are a legacy-format feature the current
// binary format cannot store). The parser is deliberately permissive: stray
// block terminators, unknown directives and malformed lines are dropped, not
// errors, because table files in the wild rely on that.

pub const DEFAULT_SELKEY: &str = "1234567890";

// 127 usable symbols; packed-key index 0 is reserved for "no key".
pub const MAX_KEYS: usize = 127;

// Longest key sequence a chardef line may carry.
pub const MAX_PRESS: usize = 15;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyName {
    /// ASCII key character, printable ('!'..='~').
    pub key: u8,
    /// Label shown for the key (a radical name, usually one CJK char).
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    /// ASCII keystroke sequence, e.g. "hqmol".
    pub keys: String,
    /// Output text: a short glyph or a multi-character phrase.
    pub text: String,
}

/// In-memory form of a .cin source definition. Built by [`parse`], consumed
/// by [`crate::pack::build`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableDefinition {
    pub cname: String,
    pub selkey: String,
    pub space_style: u8,
    /// Position i holds the symbol whose packed-key index is i + 1.
    pub keynames: Vec<KeyName>,
    pub entries: Vec<Entry>,
}

impl Default for TableDefinition {
    fn default() -> Self {
        TableDefinition {
            cname: String::new(),
            selkey: DEFAULT_SELKEY.to_owned(),
            space_style: 0,
            keynames: Vec::new(),
            entries: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Block {
    None,
    KeyName,
    CharDef,
    Quick,
}

pub fn parse_file<P: AsRef<Path>>(path: P) -> Result<TableDefinition> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| GtabError::io(path, e))?;
    parse(BufReader::new(file)).map_err(|e| GtabError::io(path, e))
}

pub fn parse<R: BufRead>(r: R) -> io::Result<TableDefinition> {
    let mut def = TableDefinition::default();
    let mut block = Block::None;

    for line in r.lines() {
        let line = line?;
        let line = line.trim_end_matches('\r');

        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        if let Some(rest) = line.strip_prefix('%') {
            if let Some(v) = rest.strip_prefix("cname ") {
                def.cname = v.trim().to_owned();
            } else if let Some(v) = rest.strip_prefix("selkey ") {
                def.selkey = v.trim().to_owned();
            } else if let Some(v) = rest.strip_prefix("space_style ") {
                match v.trim().parse() {
                    Ok(n) => def.space_style = n,
                    Err(_) => warn!(value = v.trim(), "bad %space_style value, keeping default"),
                }
            } else {
                match rest.trim_end() {
                    "keyname begin" => block = Block::KeyName,
                    "chardef begin" => block = Block::CharDef,
                    "quick begin" => block = Block::Quick,
                    // A stray end (without a matching begin) just resets the
                    // block state; the permissive legacy format tolerates it.
                    "keyname end" | "chardef end" | "quick end" => block = Block::None,
                    // Reserved directives: %gen_inp, %ename, %dupsel,
                    // %endkey, the legacy flag directives, and anything
                    // newer than this parser.
                    _ => {}
                }
            }
            continue;
        }

        match block {
            Block::KeyName => {
                let b = line.as_bytes();
                if !(b'!'..=b'~').contains(&b[0]) {
                    continue;
                }
                if def.keynames.len() >= MAX_KEYS {
                    warn!(line, "keyname table full, dropping symbol");
                    continue;
                }
                def.keynames.push(KeyName {
                    key: b[0],
                    name: line[1..].trim_start().to_owned(),
                });
            }
            Block::CharDef => {
                let mut it = line.split_whitespace();
                let (Some(keys), Some(text)) = (it.next(), it.next()) else {
                    continue;
                };
                if keys.len() > MAX_PRESS {
                    warn!(keys, "key sequence too long, dropping entry");
                    continue;
                }
                def.entries.push(Entry {
                    keys: keys.to_owned(),
                    text: text.to_owned(),
                });
            }
            // Quick-key data and lines outside any block are ignored.
            Block::Quick | Block::None => {}
        }
    }

    Ok(def)
}

// Truncate to at most `max` bytes without splitting a UTF-8 sequence.
pub(crate) fn truncate_utf8(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

#[test]
fn test_parse_datadriven() {
    datadriven::walk("src/testdata/cin", |f| {
        f.run(|test_case| match test_case.directive.as_str() {
            "parse" => {
                let def = parse(test_case.input.as_bytes()).unwrap();
                let mut out = String::new();
                out.push_str(&format!("cname: {}\n", def.cname));
                out.push_str(&format!("selkey: {}\n", def.selkey));
                out.push_str(&format!("space_style: {}\n", def.space_style));
                for kn in &def.keynames {
                    out.push_str(&format!("key {} {}\n", kn.key as char, kn.name));
                }
                for e in &def.entries {
                    out.push_str(&format!("entry {} {}\n", e.keys, e.text));
                }
                out
            }
            _ => panic!("unhandled directive: {}", test_case.directive),
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let def = parse("".as_bytes()).unwrap();
        assert_eq!(def.selkey, DEFAULT_SELKEY);
        assert_eq!(def.space_style, 0);
        assert!(def.keynames.is_empty());
        assert!(def.entries.is_empty());
    }

    #[test]
    fn test_stray_end_is_ignored() {
        let src = "%keyname end\na 日\n%chardef begin\na 中\n%chardef end\n";
        let def = parse(src.as_bytes()).unwrap();
        // "a 日" sits outside any block once the stray end reset the state.
        assert!(def.keynames.is_empty());
        assert_eq!(def.entries.len(), 1);
    }

    #[test]
    fn test_quick_block_is_skipped() {
        let src = "%quick begin\na 速速速速速速速速速速\n%quick end\n%chardef begin\na 中\n%chardef end\n";
        let def = parse(src.as_bytes()).unwrap();
        assert_eq!(def.entries.len(), 1);
        assert_eq!(def.entries[0].text, "中");
    }

    #[test]
    fn test_truncate_utf8() {
        assert_eq!(truncate_utf8("abcdef", 4), "abcd");
        // 3-byte chars: cutting at 4 bytes must back off to the boundary.
        assert_eq!(truncate_utf8("中文", 4), "中");
        assert_eq!(truncate_utf8("中", 4), "中");
    }
}
