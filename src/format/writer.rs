use std::{
    fs::File,
    io::{BufWriter, Write},
    path::Path,
};

use tracing::debug;

use super::{Header, CH_SZ, FLAG_KEY64, HEADER_SIZE};
use crate::{
    cin::truncate_utf8,
    error::{GtabError, Result},
    pack::BuiltTable,
};

// Serializes a BuiltTable: header first (with the section offsets already
// final), then each section verbatim. Offsets fall out of a fixed order —
// header, keymap, keynames, items, optional phrase tail — with no padding
// between sections. A failed write aborts mid-file; removing the partial
// output is the caller's job.

pub fn write<P: AsRef<Path>>(t: &BuiltTable, path: P) -> Result<()> {
    let path = path.as_ref();
    let file = File::create(path).map_err(|e| GtabError::io(path, e))?;
    let mut w = BufWriter::new(file);
    write_to(t, &mut w).map_err(|e| GtabError::io(path, e))?;
    w.flush().map_err(|e| GtabError::io(path, e))
}

pub(crate) fn write_to<W: Write>(t: &BuiltTable, w: &mut W) -> std::io::Result<()> {
    let key_count = t.keymap.len() as u32;
    let keymap_offset = HEADER_SIZE as u32;
    let keyname_offset = keymap_offset + key_count;
    let items_offset = keyname_offset + key_count * CH_SZ as u32;
    debug!(keymap_offset, keyname_offset, items_offset, "section layout");

    let mut cname = [0u8; 32];
    let c = truncate_utf8(&t.cname, cname.len() - 1);
    cname[..c.len()].copy_from_slice(c.as_bytes());
    let mut selkey = [0u8; 12];
    let s = truncate_utf8(&t.selkey, selkey.len() - 1);
    selkey[..s.len()].copy_from_slice(s.as_bytes());

    let hdr = Header {
        flags: if t.key64 { FLAG_KEY64 } else { 0 },
        cname,
        selkey,
        space_style: t.space_style,
        key_count: t.keymap.len() as u8,
        max_press: t.max_press,
        keybits: t.keybits,
        item_count: t.items.len() as u32,
        keymap_offset,
        keyname_offset,
        items_offset,
    };
    let mut buf = [0u8; HEADER_SIZE];
    hdr.write_le(&mut buf);
    w.write_all(&buf)?;

    w.write_all(&t.keymap)?;
    w.write_all(&t.keynames)?;

    // Key bytes go out big-endian so that byte order equals numeric order.
    for it in &t.items {
        if t.key64 {
            w.write_all(&it.key.to_be_bytes())?;
        } else {
            w.write_all(&(it.key as u32).to_be_bytes())?;
        }
        w.write_all(&it.output.encode())?;
    }

    if !t.phrases.is_empty() {
        t.phrases.write_to(w)?;
    }

    Ok(())
}
