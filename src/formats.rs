//! The tab-separated alignment exchange format.
//!
//! Each data line describes one pairwise alignment:
//!
//! ```text
//! query  qstrand  subject  sstrand  exons  [NAME:TYPE:VALUE ...]
//! ```
//!
//! Strands are `+` or `-`. The exons field is a `;`-separated list of
//! `qstart-qend/sstart-send` interval pairs, each optionally followed by an
//! operation list describing the gap structure: `:N` for a match, `*N` for a
//! mismatch, `+N` for a query insertion, and `-N` for a subject insertion.
//! Named scores follow as `NAME:i:INT` or `NAME:f:REAL` fields.
//! Lines starting with `#` and blank lines are skipped.
//!
//! Parsing is based on bytes rather than characters to avoid unnecessary UTF-8
//! validation. [`FileSource`] reads a possibly gzip-compressed file in this
//! format as an [`AlignmentSource`].

use crate::compare::AlignmentSource;
use crate::record::{AlignPart, AlignmentRecord, Exon, NamedScore, ScoreValue, SeqRange, Strand};
use crate::utils;

use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};


//-----------------------------------------------------------------------------

// Numbers are parsed from byte slices the same way throughout the format.

fn parse_usize(bytes: &[u8]) -> Result<usize, String> {
    let value = String::from_utf8_lossy(bytes);
    value.parse::<usize>().map_err(|err| format!("Invalid number {}: {}", value, err))
}

fn parse_i64(bytes: &[u8]) -> Result<i64, String> {
    let value = String::from_utf8_lossy(bytes);
    value.parse::<i64>().map_err(|err| format!("Invalid integer {}: {}", value, err))
}

fn parse_f64(bytes: &[u8]) -> Result<f64, String> {
    let value = String::from_utf8_lossy(bytes);
    value.parse::<f64>().map_err(|err| format!("Invalid number {}: {}", value, err))
}

fn parse_strand(bytes: &[u8]) -> Result<Strand, String> {
    match bytes {
        b"+" => Ok(Strand::Forward),
        b"-" => Ok(Strand::Reverse),
        _ => Err(format!("Invalid strand: {}", String::from_utf8_lossy(bytes))),
    }
}

// An interval as `start-end`.
fn parse_range(bytes: &[u8]) -> Result<SeqRange, String> {
    let sep = bytes
        .iter()
        .position(|&b| b == b'-')
        .ok_or_else(|| format!("Invalid interval: {}", String::from_utf8_lossy(bytes)))?;
    let start = parse_usize(&bytes[..sep])?;
    let end = parse_usize(&bytes[sep + 1..])?;
    if start > end {
        return Err(format!("Invalid interval: {}", String::from_utf8_lossy(bytes)));
    }
    Ok(SeqRange { start, end })
}

// An operation list such as `:120*10+5:70`.
fn parse_parts(bytes: &[u8]) -> Result<Vec<AlignPart>, String> {
    let mut result = Vec::new();
    let mut offset = 0;
    while offset < bytes.len() {
        let op = bytes[offset];
        offset += 1;
        let start = offset;
        while offset < bytes.len() && bytes[offset].is_ascii_digit() {
            offset += 1;
        }
        if start == offset {
            return Err(format!(
                "Invalid operation list: {}",
                String::from_utf8_lossy(bytes)
            ));
        }
        let len = parse_usize(&bytes[start..offset])?;
        if len == 0 {
            return Err(String::from("Alignment operations must have a nonzero length"));
        }
        let part = match op {
            b':' => AlignPart::Match(len),
            b'*' => AlignPart::Mismatch(len),
            b'+' => AlignPart::QueryIns(len),
            b'-' => AlignPart::SubjectIns(len),
            _ => {
                return Err(format!("Unsupported alignment operation: {}", op as char));
            }
        };
        result.push(part);
    }
    Ok(result)
}

// One exon as `qstart-qend/sstart-send[:OPS]`, where the first `:` separates the
// intervals from the operation list.
fn parse_exon(bytes: &[u8]) -> Result<Exon, String> {
    let (ranges, ops) = match bytes.iter().position(|&b| b == b':') {
        Some(sep) => (&bytes[..sep], &bytes[sep + 1..]),
        None => (bytes, &bytes[bytes.len()..]),
    };
    let sep = ranges
        .iter()
        .position(|&b| b == b'/')
        .ok_or_else(|| format!("Invalid exon: {}", String::from_utf8_lossy(bytes)))?;
    let query_range = parse_range(&ranges[..sep])?;
    let subject_range = parse_range(&ranges[sep + 1..])?;
    let parts = if ops.is_empty() { Vec::new() } else { parse_parts(ops)? };
    Ok(Exon { query_range, subject_range, parts })
}

/// Parses a named score from a `NAME:TYPE:VALUE` field.
///
/// Supported types are `i` (integer) and `f` (real).
///
/// # Examples
///
/// ```
/// use align_compare::formats;
/// use align_compare::NamedScore;
///
/// let field = formats::parse_score_field(b"bit_score:f:181.5");
/// assert_eq!(field, Ok(NamedScore::real("bit_score", 181.5)));
/// ```
pub fn parse_score_field(field: &[u8]) -> Result<NamedScore, String> {
    let sep = field
        .iter()
        .position(|&b| b == b':')
        .ok_or_else(|| format!("Invalid score field: {}", String::from_utf8_lossy(field)))?;
    if sep == 0 || field.len() < sep + 4 || field[sep + 2] != b':' {
        return Err(format!("Invalid score field: {}", String::from_utf8_lossy(field)));
    }
    let name = String::from_utf8_lossy(&field[..sep]).into_owned();
    let value = &field[sep + 3..];
    match field[sep + 1] {
        b'i' => Ok(NamedScore { name, value: ScoreValue::Int(parse_i64(value)?) }),
        b'f' => Ok(NamedScore { name, value: ScoreValue::Real(parse_f64(value)?) }),
        _ => Err(format!("Unsupported score type: {}", field[sep + 1] as char)),
    }
}

/// Parses one data line into an alignment record.
pub fn parse_record(line: &[u8]) -> Result<AlignmentRecord, String> {
    let fields: Vec<&[u8]> = line.split(|&b| b == b'\t').collect();
    if fields.len() < 5 {
        return Err(format!("Expected at least 5 fields, got {}", fields.len()));
    }
    if fields[0].is_empty() || fields[2].is_empty() {
        return Err(String::from("Empty sequence name"));
    }

    let mut exons = Vec::new();
    for token in fields[4].split(|&b| b == b';') {
        exons.push(parse_exon(token)?);
    }
    if exons.is_empty() {
        return Err(String::from("An alignment must have at least one exon"));
    }

    let mut scores = Vec::new();
    for field in fields[5..].iter() {
        scores.push(parse_score_field(field)?);
    }

    Ok(AlignmentRecord {
        query: String::from_utf8_lossy(fields[0]).into_owned(),
        query_strand: parse_strand(fields[1])?,
        subject: String::from_utf8_lossy(fields[2]).into_owned(),
        subject_strand: parse_strand(fields[3])?,
        exons,
        scores,
    })
}

//-----------------------------------------------------------------------------

// Writing support.

fn append_parts(buffer: &mut Vec<u8>, parts: &[AlignPart]) {
    for part in parts.iter() {
        let (op, len) = match part {
            AlignPart::Match(len) => (b':', len),
            AlignPart::Mismatch(len) => (b'*', len),
            AlignPart::QueryIns(len) => (b'+', len),
            AlignPart::SubjectIns(len) => (b'-', len),
        };
        buffer.push(op);
        buffer.extend_from_slice(len.to_string().as_bytes());
    }
}

/// Returns the data line for an alignment record, without a trailing newline.
pub fn record_to_line(record: &AlignmentRecord) -> Vec<u8> {
    let mut buffer: Vec<u8> = Vec::new();
    buffer.extend_from_slice(record.query.as_bytes());
    buffer.extend_from_slice(format!("\t{}\t", record.query_strand).as_bytes());
    buffer.extend_from_slice(record.subject.as_bytes());
    buffer.extend_from_slice(format!("\t{}\t", record.subject_strand).as_bytes());
    for (index, exon) in record.exons.iter().enumerate() {
        if index > 0 {
            buffer.push(b';');
        }
        buffer.extend_from_slice(
            format!("{}/{}", exon.query_range, exon.subject_range).as_bytes(),
        );
        if !exon.parts.is_empty() {
            buffer.push(b':');
            append_parts(&mut buffer, &exon.parts);
        }
    }
    for score in record.scores.iter() {
        buffer.push(b'\t');
        buffer.extend_from_slice(score.name.as_bytes());
        match score.value {
            ScoreValue::Int(value) => {
                buffer.extend_from_slice(format!(":i:{}", value).as_bytes());
            }
            ScoreValue::Real(value) => {
                buffer.extend_from_slice(format!(":f:{}", value).as_bytes());
            }
        }
    }
    buffer
}

/// Writes an alignment record as one data line.
pub fn write_record<T: Write>(record: &AlignmentRecord, output: &mut T) -> io::Result<()> {
    output.write_all(&record_to_line(record))?;
    output.write_all(b"\n")
}

//-----------------------------------------------------------------------------

/// An [`AlignmentSource`] over a file in the exchange format.
///
/// The file may be gzip-compressed. One data line is buffered ahead so that
/// [`AlignmentSource::end_of_data`] is known without consuming a record.
/// Parse errors name the file and the line.
pub struct FileSource {
    path: PathBuf,
    reader: Box<dyn BufRead>,
    // The next data line and its line number.
    buffer: Option<Vec<u8>>,
    line_num: usize,
    lines_read: usize,
}

impl FileSource {
    /// Opens the file and buffers the first data line.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, String> {
        let reader = utils::open_file(&path)?;
        let mut result = FileSource {
            path: path.as_ref().to_path_buf(),
            reader,
            buffer: None,
            line_num: 0,
            lines_read: 0,
        };
        result.fill_buffer()?;
        Ok(result)
    }

    // Advances to the next data line, skipping headers and blank lines.
    fn fill_buffer(&mut self) -> Result<(), String> {
        self.buffer = None;
        let mut buf: Vec<u8> = Vec::new();
        loop {
            buf.clear();
            let len = self.reader.read_until(b'\n', &mut buf).map_err(|x| x.to_string())?;
            if len == 0 {
                return Ok(());
            }
            self.lines_read += 1;
            while buf.last() == Some(&b'\n') || buf.last() == Some(&b'\r') {
                buf.pop();
            }
            if buf.is_empty() || buf[0] == b'#' {
                continue;
            }
            self.line_num = self.lines_read;
            self.buffer = Some(std::mem::take(&mut buf));
            return Ok(());
        }
    }
}

impl AlignmentSource for FileSource {
    fn end_of_data(&self) -> bool {
        self.buffer.is_none()
    }

    fn next(&mut self) -> Result<AlignmentRecord, String> {
        let line = self
            .buffer
            .take()
            .ok_or_else(|| format!("{}: read past the end of the file", self.path.display()))?;
        let record = parse_record(&line)
            .map_err(|err| format!("{} line {}: {}", self.path.display(), self.line_num, err))?;
        self.fill_buffer()?;
        Ok(record)
    }

    fn reset(&mut self) -> Result<(), String> {
        self.reader = utils::open_file(&self.path)?;
        self.line_num = 0;
        self.lines_read = 0;
        self.fill_buffer()
    }
}

//-----------------------------------------------------------------------------
