use tracing::warn;

use crate::{
    cin::{truncate_utf8, TableDefinition},
    error::{GtabError, Result},
    format::{Output, PhraseDict, CH_SZ, PHRASE_LIMIT},
};

// Key packing and table building.
//
// Every keystroke is a small index into the keyname table (1-based; 0 is
// reserved for "no key"). An entry's whole key sequence is packed into one
// integer, keybits bits per keystroke, first keystroke in the most
// significant position, then left-aligned within max_press * keybits bits by
// zero-filling the unused trailing positions. Left alignment is what makes
// prefix search work: the packed form of any N-keystroke prefix is the full
// key shifted right by (max_press - N) * keybits.
//
// The packed column is sorted ascending so lookups are a binary search and
// all entries sharing a prefix form one contiguous run. The sort is stable:
// entries with equal keys keep their source order, which is the candidate
// ranking order.

/// Minimum bit width for key_count symbol indices plus the reserved zero.
pub fn key_bits(key_count: usize) -> u8 {
    let n = key_count + 1;
    let mut bits = 1u8;
    while (1usize << bits) < n {
        bits += 1;
    }
    bits
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PackedEntry {
    pub key: u64,
    pub output: Output,
}

/// A table ready to be written: packed, sorted, with the auxiliary symbol
/// tables laid out in packed-key-index order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuiltTable {
    pub cname: String,
    pub selkey: String,
    pub space_style: u8,
    pub max_press: u8,
    pub keybits: u8,
    pub key64: bool,
    /// key_count ASCII bytes, index i ↔ packed-key index i + 1.
    pub keymap: Vec<u8>,
    /// key_count zero-padded CH_SZ-byte label slots.
    pub keynames: Vec<u8>,
    pub items: Vec<PackedEntry>,
    pub phrases: PhraseDict,
}

pub fn build(def: &TableDefinition) -> Result<BuiltTable> {
    let mut char_to_idx = [0u8; 256];
    let mut keymap = Vec::with_capacity(def.keynames.len());
    let mut keynames = Vec::with_capacity(def.keynames.len() * CH_SZ);
    for (i, kn) in def.keynames.iter().enumerate() {
        keymap.push(kn.key);
        char_to_idx[kn.key as usize] = (i + 1) as u8;
        let mut slot = [0u8; CH_SZ];
        let name = truncate_utf8(&kn.name, CH_SZ);
        slot[..name.len()].copy_from_slice(name.as_bytes());
        keynames.extend_from_slice(&slot);
    }

    let max_press = def.entries.iter().map(|e| e.keys.len()).max().unwrap_or(0);
    let keybits = key_bits(keymap.len());
    let total_bits = max_press as u64 * u64::from(keybits);
    if total_bits > 64 {
        return Err(GtabError::format(format!(
            "{} keystrokes at {} bits each does not fit a 64-bit key",
            max_press, keybits
        )));
    }
    // total_bits <= 64 bounds max_press well under u8::MAX.
    let max_press = max_press as u8;
    let key64 = total_bits > 32;

    let mut phrases = PhraseDict::default();
    let mut items = Vec::with_capacity(def.entries.len());
    for e in &def.entries {
        let mut val = 0u64;
        for &b in e.keys.as_bytes() {
            let idx = char_to_idx[b as usize];
            if idx == 0 {
                // Not a hard error: unknown symbols pack as the reserved
                // index, matching the permissive table ecosystem.
                warn!(keys = %e.keys, key = %(b as char), "key not in keyname table");
            }
            val = (val << keybits) | u64::from(idx);
        }
        val <<= (u32::from(max_press) - e.keys.len() as u32) * u32::from(keybits);

        let output = if e.text.len() <= CH_SZ {
            Output::glyph(&e.text)
        } else {
            if phrases.len() >= PHRASE_LIMIT {
                return Err(GtabError::format(format!(
                    "too many phrases ({} max)",
                    PHRASE_LIMIT
                )));
            }
            Output::Phrase(phrases.push(&e.text))
        };
        items.push(PackedEntry { key: val, output });
    }

    // Stable: ties keep source order.
    items.sort_by_key(|it| it.key);

    Ok(BuiltTable {
        cname: def.cname.clone(),
        selkey: def.selkey.clone(),
        space_style: def.space_style,
        max_press,
        keybits,
        key64,
        keymap,
        keynames,
        items,
        phrases,
    })
}

/// The contiguous run of entries whose packed key equals `key` exactly.
pub fn exact_run(items: &[PackedEntry], key: u64) -> &[PackedEntry] {
    let lo = items.partition_point(|it| it.key < key);
    let hi = items.partition_point(|it| it.key <= key);
    &items[lo..hi]
}

/// The contiguous run of entries whose first `len` keystrokes pack to
/// `prefix` (a right-aligned, len * keybits wide value).
pub fn prefix_run<'a>(
    items: &'a [PackedEntry],
    prefix: u64,
    len: u8,
    max_press: u8,
    keybits: u8,
) -> &'a [PackedEntry] {
    debug_assert!(len >= 1 && len <= max_press);
    let shift = u32::from(max_press - len) * u32::from(keybits);
    let lo = items.partition_point(|it| (it.key >> shift) < prefix);
    let hi = items.partition_point(|it| (it.key >> shift) <= prefix);
    &items[lo..hi]
}

#[test]
fn test_pack_datadriven() {
    datadriven::walk("src/testdata/pack", |f| {
        f.run(|test_case| match test_case.directive.as_str() {
            "pack" => {
                let mut def = TableDefinition::default();
                let mut lines = test_case.input.lines();
                let symbols = lines
                    .next()
                    .and_then(|l| l.strip_prefix("symbols "))
                    .expect("first input line must be `symbols <chars>`");
                for b in symbols.bytes() {
                    def.keynames.push(crate::cin::KeyName {
                        key: b,
                        name: String::new(),
                    });
                }
                for keys in lines {
                    def.entries.push(crate::cin::Entry {
                        keys: keys.to_owned(),
                        text: "字".to_owned(),
                    });
                }
                let t = build(&def).unwrap();
                let mut out = format!(
                    "keybits: {} max_press: {} key64: {}\n",
                    t.keybits, t.max_press, t.key64
                );
                for it in &t.items {
                    if t.key64 {
                        out.push_str(&format!("{:#018x}\n", it.key));
                    } else {
                        out.push_str(&format!("{:#010x}\n", it.key));
                    }
                }
                out
            }
            _ => panic!("unhandled directive: {}", test_case.directive),
        })
    })
}

#[cfg(test)]
mod tests {
    use rand::Rng;

    use super::*;
    use crate::cin::{Entry, KeyName};

    fn def_with(symbols: &str, entries: &[(&str, &str)]) -> TableDefinition {
        TableDefinition {
            keynames: symbols
                .bytes()
                .map(|b| KeyName {
                    key: b,
                    name: String::new(),
                })
                .collect(),
            entries: entries
                .iter()
                .map(|&(keys, text)| Entry {
                    keys: keys.to_owned(),
                    text: text.to_owned(),
                })
                .collect(),
            ..TableDefinition::default()
        }
    }

    #[test]
    fn test_key_bits_law() {
        for key_count in 1usize..=127 {
            let b = u32::from(key_bits(key_count));
            let n = key_count + 1;
            assert!(
                (1usize << (b - 1)) < n && n <= (1usize << b),
                "key_count={} keybits={}",
                key_count,
                b
            );
        }
        assert_eq!(key_bits(1), 1);
        assert_eq!(key_bits(26), 5);
        assert_eq!(key_bits(41), 6);
        assert_eq!(key_bits(127), 7);
    }

    #[test]
    fn test_key64_decision() {
        // 5 presses at 7 bits = 35 bits: must go 64-bit.
        let symbols: String = ('a'..='z').chain('A'..='P').collect();
        assert_eq!(symbols.len(), 42);
        assert_eq!(key_bits(42), 6);
        let wide: String = ('a'..='z')
            .chain('A'..='Z')
            .chain('0'..='9')
            .chain("!@#$%^&*()_+-=".chars())
            .collect();
        assert_eq!(key_bits(wide.len()), 7);

        let t = build(&def_with(&wide, &[("abcde", "中")])).unwrap();
        assert_eq!((t.keybits, t.max_press), (7, 5));
        assert!(t.key64);

        // 5 presses at 6 bits = 30 bits: stays 32-bit.
        let t = build(&def_with(&symbols, &[("abcde", "中")])).unwrap();
        assert_eq!((t.keybits, t.max_press), (6, 5));
        assert!(!t.key64);
    }

    #[test]
    fn test_packing_left_aligns() {
        // 26 symbols, keybits 5. "ab" under max_press 4 occupies the two
        // most significant slots; the trailing slots are zero.
        let symbols: String = ('a'..='z').collect();
        let t = build(&def_with(&symbols, &[("abcd", "甲"), ("ab", "乙")])).unwrap();
        assert_eq!(t.keybits, 5);
        assert_eq!(t.max_press, 4);
        let idx_a = 1u64;
        let idx_b = 2u64;
        let want = ((idx_a << 5) | idx_b) << (2 * 5);
        assert_eq!(t.items[0].key, want);
    }

    #[test]
    fn test_unknown_key_packs_as_zero() {
        let t = build(&def_with("ab", &[("a?", "中")])).unwrap();
        // '?' is absent: its slot packs as the reserved index 0.
        assert_eq!(t.items[0].key, 1u64 << t.keybits);
    }

    #[test]
    fn test_width_over_64_bits_is_an_error() {
        let wide: String = ('a'..='z')
            .chain('A'..='Z')
            .chain('0'..='9')
            .chain("!@#$%^&*()-=[]".chars())
            .collect();
        assert_eq!(key_bits(wide.len()), 7);
        // 10 presses at 7 bits = 70 bits.
        assert!(build(&def_with(&wide, &[("abcdefghij", "中")])).is_err());
    }

    #[test]
    fn test_equal_keys_keep_source_order() {
        let symbols: String = ('a'..='z').collect();
        let t = build(&def_with(
            &symbols,
            &[("zz", "後"), ("ab", "甲"), ("ab", "乙"), ("ab", "丙")],
        ))
        .unwrap();
        let run = exact_run(&t.items, t.items[0].key);
        let texts: Vec<_> = run.iter().map(|it| it.output.glyph_bytes().unwrap()).collect();
        assert_eq!(texts, vec!["甲".as_bytes(), "乙".as_bytes(), "丙".as_bytes()]);
    }

    #[test]
    fn test_sorted_and_prefix_scan_random() {
        let mut rng = rand::thread_rng();
        let symbols: String = ('a'..='z').collect();
        for _ in 0..20 {
            let mut entries = Vec::new();
            let mut keyseqs = Vec::new();
            for _ in 0..200 {
                let len = rng.gen_range(1..=4usize);
                let keys: String = (0..len)
                    .map(|_| (b'a' + rng.gen_range(0..26u8)) as char)
                    .collect();
                keyseqs.push(keys.clone());
                entries.push((keys, "字".to_owned()));
            }
            let def = def_with(
                &symbols,
                &entries
                    .iter()
                    .map(|(k, t)| (k.as_str(), t.as_str()))
                    .collect::<Vec<_>>(),
            );
            let t = build(&def).unwrap();

            // Sortedness invariant.
            assert!(t.items.windows(2).all(|w| w[0].key <= w[1].key));

            // Prefix scan returns exactly the entries whose first L
            // keystrokes match, for every L.
            for plen in 1..=2u8 {
                let pkeys: String = (0..plen)
                    .map(|_| (b'a' + rng.gen_range(0..26u8)) as char)
                    .collect();
                let mut prefix = 0u64;
                for b in pkeys.bytes() {
                    prefix = (prefix << t.keybits) | u64::from(b - b'a' + 1);
                }
                let got = prefix_run(&t.items, prefix, plen, t.max_press, t.keybits).len();
                let want = keyseqs
                    .iter()
                    .filter(|k| k.len() >= plen as usize && k.starts_with(&pkeys))
                    .count();
                assert_eq!(got, want, "prefix {:?}", pkeys);
            }
        }
    }
}
