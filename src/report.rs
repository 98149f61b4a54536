//! # Report reader/writer (C5, spec §4.5 / §6)
//!
//! Head line grammar: `# <version> <timestamp> <hashalgo> <mode> <nodename> <basepath>`.
//! Tail line grammar: `<hexdigest> <nodetype> <size> <path>`.
//! Both the base path and every tail-line path go through the reversible
//! byte-encoding scheme in §6.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Seek, SeekFrom, Write};

use camino::{Utf8Path, Utf8PathBuf};

use crate::error::CoreError;
use crate::node::NodeType;

const MAX_LINE_LEN: usize = 512;

// ---------------------------------------------------------------------------
// Byte encoding (spec §6)
// ---------------------------------------------------------------------------

/// Line-terminator code points that must be escaped inside an otherwise
/// literal UTF-8 path (spec §6).
const LINE_TERMINATORS: [char; 7] = [
    '\u{000A}', '\u{000B}', '\u{000C}', '\u{000D}', '\u{0085}', '\u{2028}', '\u{2029}',
];

fn hex_escape_byte(out: &mut String, b: u8) {
    out.push_str(&format!("\\x{b:02X}"));
}

/// Encode a path/basename per §6. Empty input encodes as the root marker `.`.
pub fn encode_path(s: &[u8]) -> String {
    if s.is_empty() {
        return ".".to_string();
    }

    match std::str::from_utf8(s) {
        Ok(text) => {
            let mut out = String::with_capacity(text.len());
            let mut chars = text.chars().peekable();
            while let Some(c) = chars.next() {
                if c == '\\' {
                    let mut run = 1;
                    while chars.peek() == Some(&'\\') {
                        chars.next();
                        run += 1;
                    }
                    for _ in 0..run {
                        out.push('\\');
                    }
                    out.push('\\');
                } else if LINE_TERMINATORS.contains(&c) {
                    let mut buf = [0u8; 4];
                    let bytes = c.encode_utf8(&mut buf).as_bytes();
                    for b in bytes {
                        hex_escape_byte(&mut out, *b);
                    }
                } else {
                    out.push(c);
                }
            }
            out
        }
        Err(_) => {
            let mut out = String::with_capacity(s.len() * 4);
            for b in s {
                hex_escape_byte(&mut out, *b);
            }
            out
        }
    }
}

/// Inverse of [`encode_path`]: recovers the original byte string.
pub fn decode_path(s: &str) -> Vec<u8> {
    if s == "." {
        return Vec::new();
    }

    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\' {
            // Count the run of backslashes; an escaped run of N literal
            // backslashes was written as N+1 backslashes, unless this is a
            // `\xHH` escape.
            if i + 1 < bytes.len() && bytes[i + 1] == b'x' && i + 3 < bytes.len() {
                let hex = &s[i + 2..i + 4];
                if let Ok(byte) = u8::from_str_radix(hex, 16) {
                    out.push(byte);
                    i += 4;
                    continue;
                }
            }
            let mut run = 0;
            let mut j = i;
            while j < bytes.len() && bytes[j] == b'\\' {
                run += 1;
                j += 1;
            }
            for _ in 0..run - 1 {
                out.push(b'\\');
            }
            i = j;
        } else {
            let ch_len = utf8_char_len(bytes[i]);
            out.extend_from_slice(&bytes[i..i + ch_len]);
            i += ch_len;
        }
    }
    out
}

fn utf8_char_len(first_byte: u8) -> usize {
    if first_byte & 0x80 == 0 {
        1
    } else if first_byte & 0xE0 == 0xC0 {
        2
    } else if first_byte & 0xF0 == 0xE0 {
        3
    } else if first_byte & 0xF8 == 0xF0 {
        4
    } else {
        1
    }
}

// ---------------------------------------------------------------------------
// Head / tail records
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportHead {
    pub version: (u16, u16, u16),
    pub timestamp: String,
    pub hash_algo: String,
    pub mode: char, // 'B' or 'E'
    pub node_name: String,
    pub base_path: Utf8PathBuf,
}

#[derive(Debug, Clone)]
pub struct TailLine {
    pub digest_hex: String,
    pub node_type: NodeType,
    pub size: u64,
    pub path: Utf8PathBuf,
}

fn parse_version(s: &str) -> Result<(u16, u16, u16), String> {
    let parts: Vec<&str> = s.split('.').collect();
    if parts.is_empty() || parts.len() > 3 {
        return Err(format!("bad version '{s}'"));
    }
    let mut nums = [0u16; 3];
    for (i, p) in parts.iter().enumerate() {
        nums[i] = p.parse::<u16>().map_err(|_| format!("bad version component '{p}'"))?;
    }
    Ok((nums[0], nums[1], nums[2]))
}

impl ReportHead {
    pub fn format_line(&self) -> String {
        format!(
            "# {}.{}.{} {} {} {} {} {}",
            self.version.0,
            self.version.1,
            self.version.2,
            self.timestamp,
            self.hash_algo,
            self.mode,
            self.node_name,
            encode_path(self.base_path.as_str().as_bytes()),
        )
    }

    pub fn parse_line(line: &str) -> Result<Self, String> {
        let rest = line.strip_prefix('#').ok_or("head line must start with '#'")?.trim_start();
        let mut parts = rest.splitn(6, ' ');
        let version = parts.next().ok_or("missing version")?;
        let timestamp = parts.next().ok_or("missing timestamp")?;
        let hash_algo = parts.next().ok_or("missing hash algorithm")?;
        let mode = parts.next().ok_or("missing mode")?;
        let node_name = parts.next().ok_or("missing node name")?;
        let base_path = parts.next().ok_or("missing base path")?;

        let version = parse_version(version)?;
        let mode = mode.chars().next().ok_or("empty mode")?;
        if mode != 'B' && mode != 'E' {
            return Err(format!("unknown mode flag '{mode}'"));
        }

        let base_path_bytes = decode_path(base_path);
        let base_path = Utf8PathBuf::from(
            String::from_utf8(base_path_bytes).map_err(|_| "non-UTF-8 base path".to_string())?,
        );

        Ok(ReportHead {
            version,
            timestamp: timestamp.to_string(),
            hash_algo: hash_algo.to_lowercase(),
            mode,
            node_name: node_name.to_string(),
            base_path,
        })
    }
}

impl TailLine {
    pub fn format_line(&self) -> String {
        format!(
            "{} {} {} {}",
            self.digest_hex,
            self.node_type.as_byte() as char,
            self.size,
            encode_path(self.path.as_str().as_bytes()),
        )
    }

    pub fn parse_line(line: &str) -> Result<Self, String> {
        let mut parts = line.splitn(4, ' ');
        let digest_hex = parts.next().ok_or("missing digest")?.to_string();
        let node_type = parts.next().ok_or("missing node type")?;
        let size = parts.next().ok_or("missing size")?;
        let path = parts.next().ok_or("missing path")?;

        let node_type_byte = node_type.as_bytes().first().copied().ok_or("empty node type")?;
        let node_type = NodeType::from_byte(node_type_byte)
            .ok_or_else(|| format!("unknown node type byte {node_type_byte:?}"))?;
        let size: u64 = size.parse().map_err(|_| format!("bad size '{size}'"))?;

        let path_bytes = decode_path(path);
        let path = Utf8PathBuf::from(
            String::from_utf8(path_bytes).map_err(|_| "non-UTF-8 path".to_string())?,
        );

        Ok(TailLine {
            digest_hex,
            node_type,
            size,
            path,
        })
    }
}

// ---------------------------------------------------------------------------
// Writer
// ---------------------------------------------------------------------------

pub struct ReportWriter {
    file: BufWriter<File>,
}

impl ReportWriter {
    pub fn create(path: &Utf8Path, head: &ReportHead) -> Result<Self, CoreError> {
        let file = File::create(path.as_std_path()).map_err(|e| CoreError::io(path.to_string(), e))?;
        let mut writer = Self {
            file: BufWriter::new(file),
        };
        writer.write_raw(&head.format_line())?;
        Ok(writer)
    }

    pub fn write_tail(&mut self, tail: &TailLine) -> Result<(), CoreError> {
        self.write_raw(&tail.format_line())
    }

    fn write_raw(&mut self, line: &str) -> Result<(), CoreError> {
        writeln!(self.file, "{line}").map_err(|e| CoreError::io("<report>".to_string(), e))
    }

    pub fn flush(&mut self) -> Result<(), CoreError> {
        self.file.flush().map_err(|e| CoreError::io("<report>".to_string(), e))
    }
}

// ---------------------------------------------------------------------------
// Reader
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct ReportReader {
    path: Utf8PathBuf,
    reader: BufReader<File>,
    pub head: ReportHead,
    line_no: u64,
}

impl ReportReader {
    pub fn open(path: &Utf8Path) -> Result<Self, CoreError> {
        let file = File::open(path.as_std_path()).map_err(|e| CoreError::io(path.to_string(), e))?;
        let mut reader = BufReader::new(file);
        let mut raw = Vec::new();
        read_raw_line(&mut reader, &mut raw).map_err(|e| CoreError::io(path.to_string(), e))?;

        let line = decode_line_bytes(&raw, path, 1)?;
        let head = ReportHead::parse_line(&line).map_err(|detail| CoreError::InvalidReportLine {
            file: path.to_string(),
            line: 1,
            detail,
        })?;

        Ok(Self {
            path: path.to_owned(),
            reader,
            head,
            line_no: 1,
        })
    }

    /// Produce the next tail line, skipping blank lines and `#` comments.
    /// Returns `None` at end-of-stream. Also returns the byte offset at
    /// which the line began, for later seeking.
    pub fn next_tail(&mut self) -> Result<Option<(u64, TailLine)>, CoreError> {
        loop {
            let offset = self
                .reader
                .stream_position()
                .map_err(|e| CoreError::io(self.path.to_string(), e))?;

            let mut raw = Vec::new();
            let n = read_raw_line(&mut self.reader, &mut raw)
                .map_err(|e| CoreError::io(self.path.to_string(), e))?;
            if n == 0 {
                return Ok(None);
            }
            self.line_no += 1;

            if raw.is_empty() || raw[0] == b'#' {
                continue;
            }

            let line = decode_line_bytes(&raw, &self.path, self.line_no)?;
            let tail = TailLine::parse_line(&line).map_err(|detail| CoreError::InvalidReportLine {
                file: self.path.to_string(),
                line: self.line_no,
                detail,
            })?;
            return Ok(Some((offset, tail)));
        }
    }

    /// Seek back to a byte offset previously returned by [`next_tail`].
    pub fn seek_to_offset(&mut self, offset: u64) -> Result<(), CoreError> {
        self.reader
            .seek(SeekFrom::Start(offset))
            .map_err(|e| CoreError::io(self.path.to_string(), e))?;
        Ok(())
    }
}

fn read_raw_line(reader: &mut impl BufRead, buf: &mut Vec<u8>) -> std::io::Result<usize> {
    let n = reader.read_until(b'\n', buf)?;
    if buf.last() == Some(&b'\n') {
        buf.pop();
        if buf.last() == Some(&b'\r') {
            buf.pop();
        }
    }
    Ok(n)
}

fn decode_line_bytes(raw: &[u8], path: &Utf8Path, line_no: u64) -> Result<String, CoreError> {
    if raw.len() > MAX_LINE_LEN {
        return Err(CoreError::LineTooLong {
            file: path.to_string(),
            line: line_no,
            len: raw.len(),
        });
    }
    std::str::from_utf8(raw)
        .map(|s| s.to_string())
        .map_err(|_| CoreError::NonUtf8Report {
            file: path.to_string(),
            line: line_no,
        })
}
