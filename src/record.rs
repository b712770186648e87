//! The pairwise alignment data model.
//!
//! An [`AlignmentRecord`] represents one alignment between a query sequence and a
//! subject sequence, structured as a list of exons.
//! Each exon aligns a query interval to a subject interval and may carry an explicit
//! part list describing its gap structure.
//! This is the raw form produced by an alignment source, before the comparator wraps
//! it for a specific comparison mode.
//!
//! Coordinates are half-open intervals ([`SeqRange`]) on the respective sequences.
//! Strands determine the direction in which coordinates advance when walking the
//! alignment from its start to its end.

use std::cmp::Ordering;
use std::fmt::Display;

#[cfg(test)]
mod tests;

//-----------------------------------------------------------------------------

/// A half-open interval on a sequence.
///
/// The interval covers positions `start..end`.
/// Ranges are ordered lexicographically by `(start, end)`, which makes them usable
/// as ordered map keys.
///
/// # Examples
///
/// ```
/// use align_compare::SeqRange;
///
/// let a = SeqRange::new(100, 200);
/// let b = SeqRange::new(150, 250);
/// assert!(a.intersects(&b));
/// assert_eq!(a.intersection(&b), SeqRange::new(150, 200));
/// assert_eq!(a.len(), 100);
/// ```
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SeqRange {
    /// First position in the interval.
    pub start: usize,
    /// First position past the interval.
    pub end: usize,
}

impl SeqRange {
    /// Creates a new range. The endpoints are swapped if given in the wrong order.
    pub fn new(start: usize, end: usize) -> Self {
        if start <= end {
            SeqRange { start, end }
        } else {
            SeqRange { start: end, end: start }
        }
    }

    /// Returns an empty range at the given position.
    pub fn empty_at(pos: usize) -> Self {
        SeqRange { start: pos, end: pos }
    }

    /// Returns the length of the range.
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    /// Returns `true` if the range is empty.
    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }

    /// Returns `true` if the ranges share at least one position.
    pub fn intersects(&self, other: &Self) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// Returns the intersection of the ranges, or an empty range if they are disjoint.
    pub fn intersection(&self, other: &Self) -> Self {
        let start = self.start.max(other.start);
        let end = self.end.min(other.end);
        if start < end {
            SeqRange { start, end }
        } else {
            SeqRange::default()
        }
    }

    /// Returns `true` if `other` is fully contained in this range.
    pub fn contains_range(&self, other: &Self) -> bool {
        other.is_empty() || (self.start <= other.start && other.end <= self.end)
    }
}

impl Display for SeqRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

//-----------------------------------------------------------------------------

/// A sorted collection of disjoint, coalesced ranges.
///
/// Used for tracking mismatched positions on a sequence.
/// Inserted ranges are merged with existing overlapping or adjacent ranges, so two
/// sets built from the same positions in different orders compare equal.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RangeSet {
    ranges: Vec<SeqRange>,
}

impl RangeSet {
    /// Creates an empty range set.
    pub fn new() -> Self {
        RangeSet::default()
    }

    /// Inserts a range, merging it with overlapping and adjacent ranges.
    pub fn insert(&mut self, range: SeqRange) {
        if range.is_empty() {
            return;
        }
        let mut start = range.start;
        let mut end = range.end;

        // Find the first existing range that could touch the new one and merge
        // everything that overlaps or abuts it.
        let first = self.ranges.partition_point(|r| r.end < start);
        let mut last = first;
        while last < self.ranges.len() && self.ranges[last].start <= end {
            start = start.min(self.ranges[last].start);
            end = end.max(self.ranges[last].end);
            last += 1;
        }
        self.ranges.splice(first..last, std::iter::once(SeqRange { start, end }));
    }

    /// Restricts the set to the given range, dropping everything outside it.
    pub fn restrict_to(&mut self, range: SeqRange) {
        let mut result = Vec::new();
        for r in self.ranges.iter() {
            let inter = r.intersection(&range);
            if !inter.is_empty() {
                result.push(inter);
            }
        }
        self.ranges = result;
    }

    /// Returns `true` if the set contains no positions.
    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// Returns the total number of positions in the set.
    pub fn total_len(&self) -> usize {
        self.ranges.iter().map(|r| r.len()).sum()
    }

    /// Returns an iterator over the ranges in the set.
    pub fn iter(&self) -> impl Iterator<Item = &SeqRange> {
        self.ranges.iter()
    }
}

//-----------------------------------------------------------------------------

/// Orientation of a sequence in an alignment.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Strand {
    /// Coordinates advance from lower to higher positions.
    #[default]
    Forward,
    /// Coordinates advance from higher to lower positions.
    Reverse,
}

impl Strand {
    /// Returns `true` for the forward strand.
    pub fn is_forward(&self) -> bool {
        matches!(self, Strand::Forward)
    }
}

impl Display for Strand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Strand::Forward => write!(f, "+"),
            Strand::Reverse => write!(f, "-"),
        }
    }
}

//-----------------------------------------------------------------------------

/// The value of a named alignment score.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ScoreValue {
    /// An integer score, such as an alignment score or a match count.
    Int(i64),
    /// A real-valued score, such as a bit score or an e-value.
    Real(f64),
}

/// A named score attached to an alignment.
#[derive(Clone, Debug, PartialEq)]
pub struct NamedScore {
    /// Name of the score.
    pub name: String,
    /// Value of the score.
    pub value: ScoreValue,
}

impl NamedScore {
    /// Creates a named integer score.
    pub fn int(name: &str, value: i64) -> Self {
        NamedScore { name: String::from(name), value: ScoreValue::Int(value) }
    }

    /// Creates a named real-valued score.
    pub fn real(name: &str, value: f64) -> Self {
        NamedScore { name: String::from(name), value: ScoreValue::Real(value) }
    }
}

//-----------------------------------------------------------------------------

/// One operation in the gap structure of an exon.
///
/// Lengths are in residues. A part never has length 0.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AlignPart {
    /// Both sequences advance; the residues match.
    Match(usize),
    /// Both sequences advance; the residues differ.
    Mismatch(usize),
    /// Only the query advances (insertion in the query).
    QueryIns(usize),
    /// Only the subject advances (insertion in the subject).
    SubjectIns(usize),
}

impl AlignPart {
    /// Returns the length of the part in the query sequence.
    pub fn query_len(&self) -> usize {
        match self {
            AlignPart::Match(len) | AlignPart::Mismatch(len) | AlignPart::QueryIns(len) => *len,
            AlignPart::SubjectIns(_) => 0,
        }
    }

    /// Returns the length of the part in the subject sequence.
    pub fn subject_len(&self) -> usize {
        match self {
            AlignPart::Match(len) | AlignPart::Mismatch(len) | AlignPart::SubjectIns(len) => *len,
            AlignPart::QueryIns(_) => 0,
        }
    }

    /// Returns `true` if the part aligns residues on both sequences.
    pub fn is_aligned(&self) -> bool {
        matches!(self, AlignPart::Match(_) | AlignPart::Mismatch(_))
    }

    fn with_len(&self, len: usize) -> Self {
        match self {
            AlignPart::Match(_) => AlignPart::Match(len),
            AlignPart::Mismatch(_) => AlignPart::Mismatch(len),
            AlignPart::QueryIns(_) => AlignPart::QueryIns(len),
            AlignPart::SubjectIns(_) => AlignPart::SubjectIns(len),
        }
    }
}

//-----------------------------------------------------------------------------

/// One exon of an alignment: a query interval aligned to a subject interval.
///
/// If `parts` is empty, the exon is a single gap-free block and the two intervals
/// must have the same length.
#[derive(Clone, Debug, PartialEq)]
pub struct Exon {
    /// Aligned interval of the query sequence.
    pub query_range: SeqRange,
    /// Aligned interval of the subject sequence.
    pub subject_range: SeqRange,
    /// Gap structure of the exon, in alignment order.
    pub parts: Vec<AlignPart>,
}

impl Exon {
    /// Creates a gap-free exon covering the given intervals.
    pub fn new(query_range: SeqRange, subject_range: SeqRange) -> Self {
        Exon { query_range, subject_range, parts: Vec::new() }
    }

    /// Creates an exon with an explicit gap structure.
    pub fn with_parts(query_range: SeqRange, subject_range: SeqRange, parts: Vec<AlignPart>) -> Self {
        Exon { query_range, subject_range, parts }
    }
}

//-----------------------------------------------------------------------------

/// A pairwise alignment between a query sequence and a subject sequence.
///
/// This is the raw record produced by an [`crate::AlignmentSource`].
/// The comparator wraps it into a [`crate::AlignmentInfo`] according to the active
/// comparison mode.
#[derive(Clone, Debug, PartialEq)]
pub struct AlignmentRecord {
    /// Name of the query sequence.
    pub query: String,
    /// Name of the subject sequence.
    pub subject: String,
    /// Orientation of the query sequence.
    pub query_strand: Strand,
    /// Orientation of the subject sequence.
    pub subject_strand: Strand,
    /// Exons of the alignment, in alignment order.
    pub exons: Vec<Exon>,
    /// Named scores attached to the alignment.
    pub scores: Vec<NamedScore>,
}

impl AlignmentRecord {
    /// Creates a record with forward strands and no scores.
    pub fn new(query: &str, subject: &str, exons: Vec<Exon>) -> Self {
        AlignmentRecord {
            query: String::from(query),
            subject: String::from(subject),
            query_strand: Strand::Forward,
            subject_strand: Strand::Forward,
            exons,
            scores: Vec::new(),
        }
    }

    /// Returns the envelope of the exon query intervals.
    pub fn query_range(&self) -> SeqRange {
        Self::envelope(self.exons.iter().map(|exon| exon.query_range))
    }

    /// Returns the envelope of the exon subject intervals.
    pub fn subject_range(&self) -> SeqRange {
        Self::envelope(self.exons.iter().map(|exon| exon.subject_range))
    }

    fn envelope(ranges: impl Iterator<Item = SeqRange>) -> SeqRange {
        let mut result: Option<SeqRange> = None;
        for range in ranges {
            if range.is_empty() {
                continue;
            }
            result = Some(match result {
                None => range,
                Some(acc) => SeqRange {
                    start: acc.start.min(range.start),
                    end: acc.end.max(range.end),
                },
            });
        }
        result.unwrap_or_default()
    }

    /// Returns the value of the named score, or [`None`] if the score is not present.
    pub fn score(&self, name: &str) -> Option<&ScoreValue> {
        self.scores.iter().find(|s| s.name == name).map(|s| &s.value)
    }

    /// Compares two records by `(query, subject)` using the given name ordering.
    pub fn compare_ids(&self, other: &Self, id_ordering: fn(&str, &str) -> Ordering) -> Ordering {
        id_ordering(&self.query, &other.query)
            .then_with(|| id_ordering(&self.subject, &other.subject))
    }
}

//-----------------------------------------------------------------------------

/// A row of a pairwise alignment.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Row {
    /// The query sequence.
    Query,
    /// The subject sequence.
    Subject,
}

/// One part of an exon with its absolute coordinates on both rows.
///
/// A part that does not advance on a row has an empty range positioned at the
/// walk cursor on that row.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Chunk {
    pub(crate) part: AlignPart,
    pub(crate) query_range: SeqRange,
    pub(crate) subject_range: SeqRange,
}

impl Chunk {
    pub(crate) fn row_range(&self, row: Row) -> SeqRange {
        match row {
            Row::Query => self.query_range,
            Row::Subject => self.subject_range,
        }
    }
}

// Walking an alignment record part by part, with absolute coordinates.
impl AlignmentRecord {
    /// Returns the chunks of one exon, in alignment order.
    ///
    /// Verifies that the part lengths are consistent with the exon intervals.
    pub(crate) fn exon_chunks(&self, exon: &Exon) -> Result<Vec<Chunk>, String> {
        let mut result = Vec::new();

        let q_fwd = self.query_strand.is_forward();
        let s_fwd = self.subject_strand.is_forward();
        let mut q_pos = if q_fwd { exon.query_range.start } else { exon.query_range.end };
        let mut s_pos = if s_fwd { exon.subject_range.start } else { exon.subject_range.end };

        let gap_free = [AlignPart::Match(exon.query_range.len())];
        let parts: &[AlignPart] = if exon.parts.is_empty() {
            if exon.query_range.len() != exon.subject_range.len() {
                return Err(format!(
                    "Exon without parts must align intervals of equal length: {} vs {}",
                    exon.query_range, exon.subject_range
                ));
            }
            &gap_free
        } else {
            &exon.parts
        };

        for part in parts {
            let query_range = Self::advance(&mut q_pos, part.query_len(), q_fwd);
            let subject_range = Self::advance(&mut s_pos, part.subject_len(), s_fwd);
            result.push(Chunk { part: *part, query_range, subject_range });
        }

        let q_end = if q_fwd { exon.query_range.end } else { exon.query_range.start };
        let s_end = if s_fwd { exon.subject_range.end } else { exon.subject_range.start };
        if q_pos != q_end || s_pos != s_end {
            return Err(format!(
                "Exon parts are inconsistent with the intervals {} / {}",
                exon.query_range, exon.subject_range
            ));
        }

        Ok(result)
    }

    // Advances the cursor by `len` in the walk direction and returns the covered range.
    fn advance(pos: &mut usize, len: usize, forward: bool) -> SeqRange {
        if len == 0 {
            return SeqRange::empty_at(*pos);
        }
        if forward {
            let range = SeqRange { start: *pos, end: *pos + len };
            *pos += len;
            range
        } else {
            if *pos < len {
                // Clamp rather than underflow; the consistency check will catch this.
                *pos = len;
            }
            let range = SeqRange { start: *pos - len, end: *pos };
            *pos -= len;
            range
        }
    }
}

//-----------------------------------------------------------------------------

// Slicing an alignment record to a coordinate interval on one row.
impl AlignmentRecord {
    /// Extracts the part of the alignment that falls within `range` on the given row.
    ///
    /// Parts are clipped at the interval boundaries.
    /// Insertions that do not advance on the slicing row are kept only when they are
    /// strictly inside the interval.
    /// Returns [`None`] if the slice contains no aligned residues.
    /// The sliced record carries no scores; the caller decides which scores are
    /// distributed to slices.
    ///
    /// Returns an error if the record structure is inconsistent.
    pub fn extract_slice(&self, row: Row, range: SeqRange) -> Result<Option<Self>, String> {
        let mut exons = Vec::new();
        let mut any_aligned = false;

        for exon in self.exons.iter() {
            let chunks = self.exon_chunks(exon)?;
            let mut parts = Vec::new();
            let mut query_range: Option<SeqRange> = None;
            let mut subject_range: Option<SeqRange> = None;

            for chunk in chunks.iter() {
                let clipped = match self.clip_chunk(chunk, row, range) {
                    Some(c) => c,
                    None => continue,
                };
                any_aligned |= clipped.part.is_aligned();
                Self::extend_envelope(&mut query_range, clipped.query_range);
                Self::extend_envelope(&mut subject_range, clipped.subject_range);
                parts.push(clipped.part);
            }

            if parts.is_empty() {
                continue;
            }
            exons.push(Exon {
                query_range: query_range.unwrap_or_default(),
                subject_range: subject_range.unwrap_or_default(),
                parts,
            });
        }

        if !any_aligned {
            return Ok(None);
        }
        Ok(Some(AlignmentRecord {
            query: self.query.clone(),
            subject: self.subject.clone(),
            query_strand: self.query_strand,
            subject_strand: self.subject_strand,
            exons,
            scores: Vec::new(),
        }))
    }

    fn extend_envelope(envelope: &mut Option<SeqRange>, range: SeqRange) {
        if range.is_empty() {
            return;
        }
        *envelope = Some(match *envelope {
            None => range,
            Some(acc) => SeqRange {
                start: acc.start.min(range.start),
                end: acc.end.max(range.end),
            },
        });
    }

    // Clips one chunk to `range` on the slicing row, or drops it.
    fn clip_chunk(&self, chunk: &Chunk, row: Row, range: SeqRange) -> Option<Chunk> {
        let row_range = chunk.row_range(row);
        if row_range.is_empty() {
            // No extent on the slicing row: keep the insertion only when it sits
            // strictly inside the slice.
            let pos = row_range.start;
            if pos > range.start && pos < range.end {
                return Some(*chunk);
            }
            return None;
        }

        if !row_range.intersects(&range) {
            return None;
        }
        let inter = row_range.intersection(&range);
        if inter == row_range {
            return Some(*chunk);
        }

        let part = chunk.part.with_len(inter.len());
        match chunk.part {
            AlignPart::Match(_) | AlignPart::Mismatch(_) => {
                let (other_row, other_range) = match row {
                    Row::Query => (Row::Subject, chunk.subject_range),
                    Row::Subject => (Row::Query, chunk.query_range),
                };
                let row_fwd = self.row_forward(row);
                let other_fwd = self.row_forward(other_row);
                let clipped_other = Self::clip_other(row_range, other_range, inter, row_fwd, other_fwd);
                let (query_range, subject_range) = match row {
                    Row::Query => (inter, clipped_other),
                    Row::Subject => (clipped_other, inter),
                };
                Some(Chunk { part, query_range, subject_range })
            }
            AlignPart::QueryIns(_) => Some(Chunk {
                part,
                query_range: inter,
                subject_range: chunk.subject_range,
            }),
            AlignPart::SubjectIns(_) => Some(Chunk {
                part,
                query_range: chunk.query_range,
                subject_range: inter,
            }),
        }
    }

    fn row_forward(&self, row: Row) -> bool {
        match row {
            Row::Query => self.query_strand.is_forward(),
            Row::Subject => self.subject_strand.is_forward(),
        }
    }

    // Maps the clipped interval on the slicing row to the corresponding interval on
    // the other row of a one-to-one part.
    fn clip_other(
        row_range: SeqRange,
        other_range: SeqRange,
        inter: SeqRange,
        row_fwd: bool,
        other_fwd: bool,
    ) -> SeqRange {
        // Offsets of the intersection within the part, measured along the walk.
        let (off_start, off_end) = if row_fwd {
            (inter.start - row_range.start, inter.end - row_range.start)
        } else {
            (row_range.end - inter.end, row_range.end - inter.start)
        };
        if other_fwd {
            SeqRange { start: other_range.start + off_start, end: other_range.start + off_end }
        } else {
            SeqRange { start: other_range.end - off_end, end: other_range.end - off_start }
        }
    }
}

//-----------------------------------------------------------------------------
