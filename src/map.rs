//! The block-map text format (V1): a header of `Key: Value` lines followed by
//! a list of extents, each either a whole-block run (`start+length`) or a
//! fractional block (`start+.num/denom`).

use std::io::{BufRead, Write};

use crate::error::{Error, Result};

pub const SIGNATURE: &str = "BLKCLONE BLOCK LIST V1";
pub const BEGIN_MARKER: &str = "BEGIN BLOCK LIST";
pub const END_MARKER: &str = "END BLOCK LIST";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Extent {
    Whole { start: u64, length: u64 },
    Fractional { start: u64, num: u32, denom: u32 },
}

/// An ordered list of `Key: Value` pairs, as they appear between the
/// signature line and `BEGIN BLOCK LIST`.
#[derive(Debug, Clone, Default)]
pub struct Header {
    entries: Vec<(String, String)>,
}

impl Header {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.push((key.into(), value.into()));
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn require(&self, key: &str) -> Result<&str> {
        self.get(key)
            .ok_or_else(|| Error::Format(format!("missing required header key {key}")))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Parses the signature line and all `Key: Value` lines up to (and
    /// consuming) `BEGIN BLOCK LIST`.
    pub fn read<R: BufRead>(r: &mut R) -> Result<Self> {
        let mut line = String::new();
        r.read_line(&mut line)?;
        if line.trim_end_matches(['\r', '\n']) != SIGNATURE {
            return Err(Error::Format("bad block map signature".into()));
        }

        let mut header = Header::new();
        header.push("MapVersion", "1");

        loop {
            line.clear();
            let n = r.read_line(&mut line)?;
            if n == 0 {
                return Err(Error::Format("unexpected end of block map header".into()));
            }
            let text = line.trim_end_matches(['\r', '\n']);
            if text == BEGIN_MARKER {
                break;
            }
            if text.is_empty() || text.starts_with('#') {
                continue;
            }
            let (key, value) = text
                .split_once(':')
                .ok_or_else(|| Error::Format(format!("malformed header line: {text}")))?;
            header.push(key.trim(), value.trim());
        }

        Ok(header)
    }

    pub fn write<W: Write + ?Sized>(&self, w: &mut W) -> Result<()> {
        writeln!(w, "{SIGNATURE}")?;
        for (k, v) in self.iter().filter(|(k, _)| *k != "MapVersion") {
            writeln!(w, "{k}: {v}")?;
        }
        writeln!(w, "{BEGIN_MARKER}")?;
        Ok(())
    }
}

/// Reads one extent at a time, mirroring the line-oriented cell reader the
/// sparse copier streams from so an index never has to be fully materialized.
pub struct ExtentReader<'r, R: BufRead> {
    r: &'r mut R,
}

impl<'r, R: BufRead> ExtentReader<'r, R> {
    pub fn new(r: &'r mut R) -> Self {
        Self { r }
    }

    /// Returns `Ok(None)` once `END BLOCK LIST` is reached.
    pub fn next_extent(&mut self) -> Result<Option<Extent>> {
        let mut line = String::new();
        loop {
            line.clear();
            let n = self.r.read_line(&mut line)?;
            if n == 0 {
                return Err(Error::Format("unexpected end of block map body".into()));
            }
            let text = line.trim_end_matches(['\r', '\n']);
            if text.is_empty() || text.starts_with('#') {
                continue;
            }
            if text == END_MARKER {
                return Ok(None);
            }
            return Ok(Some(parse_extent(text)?));
        }
    }
}

fn parse_extent(text: &str) -> Result<Extent> {
    let (start, rest) = text
        .split_once('+')
        .ok_or_else(|| Error::Format(format!("malformed extent line: {text}")))?;
    let start: u64 = start
        .parse()
        .map_err(|_| Error::Format(format!("malformed extent start: {text}")))?;

    if let Some(frac) = rest.strip_prefix('.') {
        let (num, denom) = frac
            .split_once('/')
            .ok_or_else(|| Error::Format(format!("malformed fractional extent: {text}")))?;
        let num: u32 = num
            .parse()
            .map_err(|_| Error::Format(format!("malformed fraction numerator: {text}")))?;
        let denom: u32 = denom
            .parse()
            .map_err(|_| Error::Format(format!("malformed fraction denominator: {text}")))?;
        if num == 0 || denom == 0 {
            return Err(Error::Format(format!("zero numerator/denominator: {text}")));
        }
        Ok(Extent::Fractional { start, num, denom })
    } else {
        let length: u64 = rest
            .parse()
            .map_err(|_| Error::Format(format!("malformed extent length: {text}")))?;
        if length == 0 {
            return Err(Error::Format(format!("zero-length extent: {text}")));
        }
        Ok(Extent::Whole { start, length })
    }
}

/// A fully-materialized block map; convenient for tests and for `analyze`,
/// which always holds the whole thing in memory to print it.
#[derive(Debug, Clone, Default)]
pub struct BlockMap {
    pub header: Header,
    pub extents: Vec<Extent>,
}

impl BlockMap {
    pub fn read<R: BufRead>(r: &mut R) -> Result<Self> {
        let header = Header::read(r)?;
        let mut extents = Vec::new();
        let mut reader = ExtentReader::new(r);
        while let Some(extent) = reader.next_extent()? {
            extents.push(extent);
        }
        Ok(Self { header, extents })
    }

    pub fn write<W: Write + ?Sized>(&self, w: &mut W) -> Result<()> {
        self.header.write(w)?;
        for extent in &self.extents {
            match extent {
                Extent::Whole { start, length } => writeln!(w, "{start}+{length}")?,
                Extent::Fractional { start, num, denom } => {
                    writeln!(w, "{start}+.{num}/{denom}")?
                }
            }
        }
        writeln!(w, "{END_MARKER}")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_eq as eq;
    use std::io::Cursor;

    #[test]
    fn round_trip() {
        let mut map = BlockMap::default();
        map.header.push("UUID", "0102030405060708090a0b0c0d0e0f10");
        map.header.push("Type", "FAT");
        map.header.push("BlockSize", "512");
        map.header.push("BlockCount", "34");
        map.header.push("BlockRange", "2880");
        map.extents.push(Extent::Whole { start: 0, length: 33 });
        map.extents.push(Extent::Fractional { start: 100, num: 1, denom: 8 });

        let mut buf = Vec::new();
        map.write(&mut buf).unwrap();

        let mut cursor = Cursor::new(buf);
        let parsed = BlockMap::read(&mut cursor).unwrap();

        eq!(parsed.header.require("UUID").unwrap(), "0102030405060708090a0b0c0d0e0f10");
        eq!(parsed.header.require("MapVersion").unwrap(), "1");
        eq!(parsed.extents.len(), 2);
        eq!(parsed.extents[0], Extent::Whole { start: 0, length: 33 });
        eq!(parsed.extents[1], Extent::Fractional { start: 100, num: 1, denom: 8 });
    }

    #[test]
    fn bad_signature() {
        let mut cursor = Cursor::new(b"NOT A MAP\n".to_vec());
        assert!(BlockMap::read(&mut cursor).is_err());
    }

    #[test]
    fn missing_required_key() {
        let mut map = BlockMap::default();
        map.header.push("Type", "FAT");
        assert!(map.header.require("UUID").is_err());
    }
}
