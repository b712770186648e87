//! Streaming comparison of two sorted sets of pairwise alignments.
//!
//! An [`AlignCompare`] session consumes two [`AlignmentSource`]s that yield
//! alignments in ascending (query, subject) order.
//! Each call to [`AlignCompare::next_group`] performs one step of a merge-join over
//! the two streams: it collects all alignments sharing the next (query, subject,
//! required scores) key from whichever set leads in sort order (or from both), and
//! classifies every alignment in the group as equivalent, overlapping, or unique
//! relative to the other set.
//!
//! Classification works on mode-specific span decompositions of the alignments
//! (see [`Mode`]), optionally after splitting the alignments at span boundaries
//! collected in a [`AlignCompare::populate_boundaries_map`] pre-pass.
//! Running statistics are accumulated in [`CompareStats`].
//!
//! The comparator trusts its inputs to be pre-sorted but verifies the ordering
//! defensively; a violation is a fatal error that names the offending record.

use crate::record::{AlignmentRecord, RangeSet, Row, ScoreValue, SeqRange, Strand};

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt::Display;


//-----------------------------------------------------------------------------

/// Granularity at which alignments are decomposed for comparison.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
    /// One span per gap-free block of the alignment.
    Interval,
    /// One span per exon.
    Exon,
    /// A single span covering the whole alignment.
    Span,
    /// One span per gap between consecutive exons.
    Intron,
    /// Interval spans plus mismatched-position tracking.
    Full,
}

/// Which rows of the alignments must match for equivalence.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RowComparison {
    /// Only the query row is compared.
    Query,
    /// Only the subject row is compared.
    Subject,
    /// Both rows are compared.
    Both,
}

/// Classification of an alignment relative to the other set.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum MatchLevel {
    /// An equivalent alignment exists in the other set.
    Equiv,
    /// An overlapping alignment exists in the other set.
    Overlap,
    /// Overlapping, and this side scores better.
    OverlapBetter,
    /// Overlapping, and this side scores worse.
    OverlapWorse,
    /// No comparable counterpart was found.
    #[default]
    NoMatch,
}

impl Display for MatchLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MatchLevel::Equiv => write!(f, "equivalent"),
            MatchLevel::Overlap => write!(f, "overlap"),
            MatchLevel::OverlapBetter => write!(f, "overlap_better"),
            MatchLevel::OverlapWorse => write!(f, "overlap_worse"),
            MatchLevel::NoMatch => write!(f, "no_match"),
        }
    }
}

//-----------------------------------------------------------------------------

/// The default (query, subject) name ordering: lexicographic byte order.
pub fn default_id_ordering(a: &str, b: &str) -> Ordering {
    a.cmp(b)
}

/// Parameters for an alignment comparison session.
///
/// The parameters are fixed when the [`AlignCompare`] session is created.
#[derive(Clone, Debug)]
pub struct CompareParams {
    /// Granularity of the comparison.
    pub mode: Mode,
    /// Rows that must match for equivalence.
    pub row: RowComparison,
    /// If set, only exact equivalence counts as a match; overlapping alignments
    /// are left unmatched.
    pub strict: bool,
    /// If set, alignments on (query, subject) pairs entirely absent from the other
    /// set are excluded from the only-in-set statistics.
    pub ignore_not_present: bool,
    /// Names of integer scores that must be present and equal for two alignments
    /// to be comparable. These scores are part of the grouping key.
    pub required_scores: Vec<String>,
    /// Names of integer scores that block comparison only when both sides have a
    /// nonzero value and the values differ. A missing score is read as 0.
    pub optional_scores: Vec<String>,
    /// Names of integer scores used to pick the better side of an overlap group.
    pub quality_scores: Vec<String>,
    /// Named scores that participate in equivalence tie-breaking.
    pub score_set: BTreeSet<String>,
    /// If set, `score_set` is a blacklist: every score not in the set participates.
    /// Otherwise it is a whitelist and the listed scores must be present.
    pub score_set_as_blacklist: bool,
    /// Relative tolerance for comparing real-valued tie-breaking scores.
    pub real_score_tolerance: f64,
    /// Named scores copied to slices when an alignment is split.
    pub distributive_scores: BTreeSet<String>,
    /// Ordering of sequence names, used for grouping and for the sortedness check.
    pub id_ordering: fn(&str, &str) -> Ordering,
}

impl Default for CompareParams {
    fn default() -> Self {
        CompareParams {
            mode: Mode::Interval,
            row: RowComparison::Both,
            strict: false,
            ignore_not_present: false,
            required_scores: Vec::new(),
            optional_scores: Vec::new(),
            quality_scores: Vec::new(),
            score_set: BTreeSet::new(),
            score_set_as_blacklist: false,
            real_score_tolerance: 0.0,
            distributive_scores: BTreeSet::new(),
            id_ordering: default_id_ordering,
        }
    }
}

impl CompareParams {
    /// Checks the parameters for contradictions.
    ///
    /// Called by [`AlignCompare::new`], so that configuration errors surface before
    /// the first alignment is read.
    pub fn validate(&self) -> Result<(), String> {
        for name in self.required_scores.iter() {
            if self.optional_scores.contains(name) {
                return Err(format!("Score {} cannot be both required and optional", name));
            }
        }
        if !self.real_score_tolerance.is_finite() || self.real_score_tolerance < 0.0 {
            return Err(format!("Invalid real score tolerance: {}", self.real_score_tolerance));
        }
        Ok(())
    }
}

//-----------------------------------------------------------------------------

/// A source of alignment records in ascending (query, subject) order.
///
/// The ordering is a precondition supplied by the caller, typically by sorting the
/// input file beforehand. The comparator reads each source once from the front;
/// [`AlignmentSource::reset`] is only needed for the boundary pre-pass.
pub trait AlignmentSource {
    /// Returns `true` if there are no more alignments.
    fn end_of_data(&self) -> bool;

    /// Returns the next alignment.
    ///
    /// Returns an error if the source is exhausted or the record is malformed.
    fn next(&mut self) -> Result<AlignmentRecord, String>;

    /// Rewinds the source to the beginning.
    fn reset(&mut self) -> Result<(), String>;
}

/// An alignment source over an in-memory list of records.
#[derive(Clone, Debug)]
pub struct VecSource {
    records: Vec<AlignmentRecord>,
    cursor: usize,
}

impl VecSource {
    /// Creates a source over the given records. The records must already be sorted.
    pub fn new(records: Vec<AlignmentRecord>) -> Self {
        VecSource { records, cursor: 0 }
    }
}

impl AlignmentSource for VecSource {
    fn end_of_data(&self) -> bool {
        self.cursor >= self.records.len()
    }

    fn next(&mut self) -> Result<AlignmentRecord, String> {
        if self.end_of_data() {
            return Err(String::from("Read past the end of an alignment source"));
        }
        let record = self.records[self.cursor].clone();
        self.cursor += 1;
        Ok(record)
    }

    fn reset(&mut self) -> Result<(), String> {
        self.cursor = 0;
        Ok(())
    }
}

//-----------------------------------------------------------------------------

/// One alignment wrapped for comparison.
///
/// Wraps an [`AlignmentRecord`] with the mode-specific span decomposition, the
/// score values the configuration selects, and the classification result.
/// Identity fields are only populated for the rows selected by
/// [`CompareParams::row`]; the others are left empty.
#[derive(Clone, Debug)]
pub struct AlignmentInfo {
    /// Which input set the alignment came from (1 or 2).
    pub source_set: usize,
    /// Name of the query sequence, or empty in subject-only comparisons.
    pub query: String,
    /// Name of the subject sequence, or empty in query-only comparisons.
    pub subject: String,
    /// Orientation of the query sequence.
    pub query_strand: Strand,
    /// Orientation of the subject sequence.
    pub subject_strand: Strand,
    /// Aligned interval of the query sequence.
    pub query_range: SeqRange,
    /// Aligned interval of the subject sequence.
    pub subject_range: SeqRange,
    /// Total length of the spans, in the coordinates of the span keys.
    pub length: usize,
    /// Required and optional disambiguating score values.
    pub scores: (Vec<i64>, Vec<i64>),
    /// Quality score values used for better/worse tie-breaking.
    pub quality_scores: Vec<i64>,
    /// Integer tie-breaking scores selected by the score set filter.
    pub integer_scores: BTreeMap<String, i64>,
    /// Real-valued tie-breaking scores selected by the score set filter.
    pub real_scores: BTreeMap<String, f64>,
    /// Mode-specific span decomposition.
    pub spans: BTreeMap<SeqRange, SeqRange>,
    /// Mismatched query positions (full mode only).
    pub query_mismatches: RangeSet,
    /// Mismatched subject positions (full mode only).
    pub subject_mismatches: RangeSet,
    /// The underlying alignment record.
    pub record: AlignmentRecord,
    /// Classification result, assigned by the comparator.
    pub match_level: MatchLevel,
    /// Indices of matched alignments from the other set within the returned group.
    pub matched_alignments: Vec<usize>,
}

impl AlignmentInfo {
    /// Wraps a record for comparison.
    ///
    /// If `parent` is given, the record is a slice of the parent alignment: the
    /// disambiguating, quality, and tie-breaking scores are inherited from the
    /// parent instead of being looked up, and mismatch tracking is left to the
    /// caller.
    pub fn new(
        source_set: usize,
        record: AlignmentRecord,
        params: &CompareParams,
        parent: Option<&AlignmentInfo>,
    ) -> Result<Self, String> {
        let mut info = AlignmentInfo {
            source_set,
            query: String::new(),
            subject: String::new(),
            query_strand: Strand::Forward,
            subject_strand: Strand::Forward,
            query_range: SeqRange::default(),
            subject_range: SeqRange::default(),
            length: 0,
            scores: (Vec::new(), Vec::new()),
            quality_scores: Vec::new(),
            integer_scores: BTreeMap::new(),
            real_scores: BTreeMap::new(),
            spans: BTreeMap::new(),
            query_mismatches: RangeSet::new(),
            subject_mismatches: RangeSet::new(),
            record,
            match_level: MatchLevel::NoMatch,
            matched_alignments: Vec::new(),
        };

        if params.row != RowComparison::Subject {
            info.query = info.record.query.clone();
            info.query_strand = info.record.query_strand;
            info.query_range = info.record.query_range();
        }
        if params.row != RowComparison::Query {
            info.subject = info.record.subject.clone();
            info.subject_strand = info.record.subject_strand;
            info.subject_range = info.record.subject_range();
        }

        match parent {
            Some(parent) => {
                info.scores = parent.scores.clone();
                info.quality_scores = parent.quality_scores.clone();
                info.integer_scores = parent.integer_scores.clone();
                info.real_scores = parent.real_scores.clone();
            }
            None => {
                info.scores.0 = populate_scores(&info.record, &params.required_scores, true)?;
                info.scores.1 = populate_scores(&info.record, &params.optional_scores, false)?;
                info.quality_scores = populate_scores(&info.record, &params.quality_scores, true)?;
                populate_score_set(&info.record, params, &mut info.integer_scores, &mut info.real_scores)?;
            }
        }

        match params.mode {
            Mode::Full => {
                // A slice has no traceback of its own; the caller intersects the
                // parent's mismatches with the slice ranges.
                if parent.is_none() {
                    populate_mismatches(
                        &info.record,
                        params.row,
                        &mut info.query_mismatches,
                        &mut info.subject_mismatches,
                    )?;
                }
                populate_spans_interval(&info.record, params.row, &mut info.spans)?;
            }
            Mode::Interval => {
                populate_spans_interval(&info.record, params.row, &mut info.spans)?;
            }
            Mode::Exon => {
                populate_spans_exon(&info.record, params.row, &mut info.spans);
            }
            Mode::Span => {
                populate_spans_span(&info.record, params.row, &mut info.spans);
            }
            Mode::Intron => {
                populate_spans_intron(&info.record, params.row, &mut info.spans);
            }
        }
        info.length = info.spans.keys().map(|key| key.len()).sum();

        Ok(info)
    }

    /// Compares the grouping keys of two alignments.
    ///
    /// The key is (query, subject, required scores). Unless `strict_only` is set,
    /// optional scores also participate wherever both sides have a nonzero value.
    pub fn compare_group(&self, other: &Self, strict_only: bool, params: &CompareParams) -> Ordering {
        let ordering = (params.id_ordering)(&self.query, &other.query)
            .then_with(|| (params.id_ordering)(&self.subject, &other.subject))
            .then_with(|| self.scores.0.cmp(&other.scores.0));
        if ordering != Ordering::Equal || strict_only {
            return ordering;
        }
        let common = self.scores.1.len().min(other.scores.1.len());
        for index in 0..common {
            if self.scores.1[index] != 0 && other.scores.1[index] != 0 {
                let ordering = self.scores.1[index].cmp(&other.scores.1[index]);
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
        }
        Ordering::Equal
    }

    /// Extracts the part of the alignment within `range` on the given row.
    ///
    /// The slice inherits the parent's disambiguating, quality, and tie-breaking
    /// scores; of the named scores, only those listed in
    /// [`CompareParams::distributive_scores`] are carried over into the sliced
    /// record itself.
    /// Returns [`None`] if the slice contains no aligned residues.
    pub fn slice(
        &self,
        row: Row,
        range: SeqRange,
        params: &CompareParams,
    ) -> Result<Option<AlignmentInfo>, String> {
        let mut sliced = match self.record.extract_slice(row, range)? {
            Some(record) => record,
            None => return Ok(None),
        };
        for score in self.record.scores.iter() {
            if params.distributive_scores.contains(&score.name) {
                sliced.scores.push(score.clone());
            }
        }

        let mut info = AlignmentInfo::new(self.source_set, sliced, params, Some(self))?;
        if params.mode == Mode::Full {
            info.query_mismatches = self.query_mismatches.clone();
            info.query_mismatches.restrict_to(info.record.query_range());
            info.subject_mismatches = self.subject_mismatches.clone();
            info.subject_mismatches.restrict_to(info.record.subject_range());
        }
        Ok(Some(info))
    }
}

//-----------------------------------------------------------------------------

// Score selection.

// Reads the named integer scores in order. A missing score is an error when the
// scores are required, and 0 otherwise.
fn populate_scores(
    record: &AlignmentRecord,
    names: &[String],
    required: bool,
) -> Result<Vec<i64>, String> {
    let mut result = Vec::with_capacity(names.len());
    for name in names.iter() {
        match record.score(name) {
            Some(ScoreValue::Int(value)) => result.push(*value),
            Some(ScoreValue::Real(_)) => {
                return Err(format!("Score {} is not an integer score", name));
            }
            None if required => {
                return Err(format!(
                    "Alignment {} / {} is missing required score {}",
                    record.query, record.subject, name
                ));
            }
            None => result.push(0),
        }
    }
    Ok(result)
}

// Selects the named tie-breaking scores according to the score set filter.
fn populate_score_set(
    record: &AlignmentRecord,
    params: &CompareParams,
    integer_scores: &mut BTreeMap<String, i64>,
    real_scores: &mut BTreeMap<String, f64>,
) -> Result<(), String> {
    if params.score_set_as_blacklist {
        for score in record.scores.iter() {
            if params.score_set.contains(&score.name) {
                continue;
            }
            match score.value {
                ScoreValue::Int(value) => {
                    integer_scores.insert(score.name.clone(), value);
                }
                ScoreValue::Real(value) => {
                    real_scores.insert(score.name.clone(), value);
                }
            }
        }
    } else {
        for name in params.score_set.iter() {
            match record.score(name) {
                Some(ScoreValue::Int(value)) => {
                    integer_scores.insert(name.clone(), *value);
                }
                Some(ScoreValue::Real(value)) => {
                    real_scores.insert(name.clone(), *value);
                }
                None => {
                    return Err(format!(
                        "Alignment {} / {} is missing score {}",
                        record.query, record.subject, name
                    ));
                }
            }
        }
    }
    Ok(())
}

//-----------------------------------------------------------------------------

// Mode-specific span decomposition.

// Stores a span, keyed according to the row comparison policy.
fn update_spans(
    spans: &mut BTreeMap<SeqRange, SeqRange>,
    query_range: SeqRange,
    subject_range: SeqRange,
    row: RowComparison,
) {
    let key = if row == RowComparison::Query { query_range } else { subject_range };
    let value = if row == RowComparison::Subject { subject_range } else { query_range };
    spans.insert(key, value);
}

// One span per gap-free run of aligned parts.
fn populate_spans_interval(
    record: &AlignmentRecord,
    row: RowComparison,
    spans: &mut BTreeMap<SeqRange, SeqRange>,
) -> Result<(), String> {
    for exon in record.exons.iter() {
        let chunks = record.exon_chunks(exon)?;
        let mut run: Option<(SeqRange, SeqRange)> = None;
        for chunk in chunks.iter() {
            if chunk.part.is_aligned() {
                run = Some(match run {
                    None => (chunk.query_range, chunk.subject_range),
                    Some((query, subject)) => (
                        envelope(query, chunk.query_range),
                        envelope(subject, chunk.subject_range),
                    ),
                });
            } else if let Some((query, subject)) = run.take() {
                update_spans(spans, query, subject, row);
            }
        }
        if let Some((query, subject)) = run {
            update_spans(spans, query, subject, row);
        }
    }
    Ok(())
}

// One span per exon.
fn populate_spans_exon(
    record: &AlignmentRecord,
    row: RowComparison,
    spans: &mut BTreeMap<SeqRange, SeqRange>,
) {
    for exon in record.exons.iter() {
        update_spans(spans, exon.query_range, exon.subject_range, row);
    }
}

// A single span over the whole alignment.
fn populate_spans_span(
    record: &AlignmentRecord,
    row: RowComparison,
    spans: &mut BTreeMap<SeqRange, SeqRange>,
) {
    update_spans(spans, record.query_range(), record.subject_range(), row);
}

// One span per gap between consecutive exons.
fn populate_spans_intron(
    record: &AlignmentRecord,
    row: RowComparison,
    spans: &mut BTreeMap<SeqRange, SeqRange>,
) {
    for pair in record.exons.windows(2) {
        let query_gap = gap_between(pair[0].query_range, pair[1].query_range);
        let subject_gap = gap_between(pair[0].subject_range, pair[1].subject_range);
        update_spans(spans, query_gap, subject_gap, row);
    }
}

// The interval between two exon intervals, in either orientation.
fn gap_between(a: SeqRange, b: SeqRange) -> SeqRange {
    if a.end <= b.start {
        SeqRange { start: a.end, end: b.start }
    } else {
        SeqRange::new(b.end.min(a.start), a.start)
    }
}

fn envelope(a: SeqRange, b: SeqRange) -> SeqRange {
    SeqRange { start: a.start.min(b.start), end: a.end.max(b.end) }
}

// Mismatched positions on the rows selected by the row comparison policy.
fn populate_mismatches(
    record: &AlignmentRecord,
    row: RowComparison,
    query_mismatches: &mut RangeSet,
    subject_mismatches: &mut RangeSet,
) -> Result<(), String> {
    for exon in record.exons.iter() {
        let chunks = record.exon_chunks(exon)?;
        for chunk in chunks.iter() {
            if !matches!(chunk.part, crate::record::AlignPart::Mismatch(_)) {
                continue;
            }
            if row != RowComparison::Subject {
                query_mismatches.insert(chunk.query_range);
            }
            if row != RowComparison::Query {
                subject_mismatches.insert(chunk.subject_range);
            }
        }
    }
    Ok(())
}

//-----------------------------------------------------------------------------

/// The outcome of comparing the span decompositions of two alignments.
///
/// The constructor walks both sorted span maps in lock-step and accounts for
/// common, overlapping, and unique span lengths.
#[derive(Clone, Debug, Default)]
pub(crate) struct Comparison {
    /// Length of the spans that are identical in both alignments.
    pub(crate) spans_in_common: usize,
    /// Length of the partial span overlaps.
    pub(crate) spans_overlap: usize,
    /// Signed length unique to the first alignment.
    pub(crate) spans_unique_first: i64,
    /// Signed length unique to the second alignment.
    pub(crate) spans_unique_second: i64,
    /// The alignments occupy exactly the same spans with the same mismatches and
    /// tie-breaking scores.
    pub(crate) is_equivalent: bool,
    /// Normalized span overlap ratio in [0, 1].
    pub(crate) overlap: f64,
}

impl Comparison {
    pub(crate) fn new(first: &AlignmentInfo, second: &AlignmentInfo, params: &CompareParams) -> Self {
        let mut result = Comparison::default();
        if first.compare_group(second, false, params) != Ordering::Equal {
            // Different disambiguating score values; the alignments are not comparable.
            return result;
        }

        let mut dot = 0.0;
        let mut sum_a = 0.0;
        let mut sum_b = 0.0;

        let spans_a: Vec<(&SeqRange, &SeqRange)> = first.spans.iter().collect();
        let spans_b: Vec<(&SeqRange, &SeqRange)> = second.spans.iter().collect();
        let mut i = 0;
        let mut j = 0;
        while i < spans_a.len() && j < spans_b.len() {
            if spans_a[i] == spans_b[j] {
                let len = spans_a[i].0.len();
                dot += (len as f64) * (len as f64);
                sum_a += (len as f64) * (len as f64);
                sum_b += (spans_b[j].0.len() as f64) * (spans_b[j].0.len() as f64);
                result.spans_in_common += len;
                i += 1;
                j += 1;
            } else {
                let overlapping = spans_a[i].0.intersects(spans_b[j].0)
                    && spans_a[i].1.intersects(spans_b[j].1);
                if overlapping {
                    let len = spans_a[i].0.intersection(spans_b[j].0).len();
                    dot += (len as f64) * (len as f64);
                    result.spans_overlap += len;
                    result.spans_unique_first -= len as i64;
                    result.spans_unique_second -= len as i64;
                }
                if spans_a[i] < spans_b[j] {
                    let len = spans_a[i].0.len();
                    sum_a += (len as f64) * (len as f64);
                    result.spans_unique_first += len as i64;
                    i += 1;
                } else {
                    let len = spans_b[j].0.len();
                    sum_b += (len as f64) * (len as f64);
                    result.spans_unique_second += len as i64;
                    j += 1;
                }
            }
        }

        result.is_equivalent = result.spans_in_common == first.length
            && result.spans_in_common == second.length
            && first.query_mismatches == second.query_mismatches
            && first.subject_mismatches == second.subject_mismatches
            && first.integer_scores == second.integer_scores
            && equivalent_real_scores(
                &first.real_scores,
                &second.real_scores,
                params.real_score_tolerance,
            );

        while i < spans_a.len() {
            let len = spans_a[i].0.len();
            sum_a += (len as f64) * (len as f64);
            result.spans_unique_first += len as i64;
            i += 1;
        }
        while j < spans_b.len() {
            let len = spans_b[j].0.len();
            sum_b += (len as f64) * (len as f64);
            result.spans_unique_second += len as i64;
            j += 1;
        }

        result.overlap = if dot == 0.0 { 0.0 } else { dot / (sum_a * sum_b).sqrt() };
        result
    }
}

// Real-valued tie-breaking scores are equivalent when both alignments have the same
// score names and every value pair is within the relative tolerance.
fn equivalent_real_scores(
    first: &BTreeMap<String, f64>,
    second: &BTreeMap<String, f64>,
    tolerance: f64,
) -> bool {
    if first.len() != second.len() {
        return false;
    }
    for ((name_a, value_a), (name_b, value_b)) in first.iter().zip(second.iter()) {
        if name_a != name_b {
            return false;
        }
        let allowed = value_a.abs().max(value_b.abs()) * tolerance;
        if (value_a - value_b).abs() > allowed {
            return false;
        }
    }
    true
}

// Two alignments overlap when their ranges intersect on a compared row.
fn is_overlapping(first: &AlignmentInfo, second: &AlignmentInfo, row: RowComparison) -> bool {
    match row {
        RowComparison::Query => first.query_range.intersects(&second.query_range),
        RowComparison::Subject => first.subject_range.intersects(&second.subject_range),
        RowComparison::Both => {
            first.subject_range.intersects(&second.subject_range)
                || first.query_range.intersects(&second.query_range)
        }
    }
}

//-----------------------------------------------------------------------------

/// Running statistics of a comparison session.
///
/// Alignment and group counts are unsigned.
/// Base counts are signed, because the unique-length accounting of partial
/// overlaps can apply negative corrections to the only-in-set base counts.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CompareStats {
    /// Alignments read from set 1.
    pub count_set1: u64,
    /// Alignments read from set 2.
    pub count_set2: u64,
    /// Alignment pieces in set 1 after splitting.
    pub count_split_set1: u64,
    /// Alignment pieces in set 2 after splitting.
    pub count_split_set2: u64,
    /// Set 1 alignments without a counterpart in set 2.
    pub count_only_set1: u64,
    /// Set 2 alignments without a counterpart in set 1.
    pub count_only_set2: u64,
    /// Set 1 alignments with an equivalent alignment in set 2.
    pub count_equiv_set1: u64,
    /// Set 2 alignments with an equivalent alignment in set 1.
    pub count_equiv_set2: u64,
    /// Set 1 alignments with an overlapping alignment in set 2.
    pub count_overlap_set1: u64,
    /// Set 2 alignments with an overlapping alignment in set 1.
    pub count_overlap_set2: u64,
    /// Groups classified as equivalent.
    pub count_equiv_groups: u64,
    /// Groups classified as overlapping.
    pub count_overlap_groups: u64,
    /// Bases read from set 1.
    pub count_bases_set1: i64,
    /// Bases read from set 2.
    pub count_bases_set2: i64,
    /// Bases only in set 1.
    pub count_bases_only_set1: i64,
    /// Bases only in set 2.
    pub count_bases_only_set2: i64,
    /// Bases of set 1 in equivalent alignments.
    pub count_bases_equiv_set1: i64,
    /// Bases of set 2 in equivalent alignments.
    pub count_bases_equiv_set2: i64,
    /// Bases of set 1 in overlapping alignments.
    pub count_bases_overlap_set1: i64,
    /// Bases of set 2 in overlapping alignments.
    pub count_bases_overlap_set2: i64,
}

impl CompareStats {
    fn add_pulled(&mut self, set: usize, bases: i64) {
        if set == 1 {
            self.count_set1 += 1;
            self.count_bases_set1 += bases;
        } else {
            self.count_set2 += 1;
            self.count_bases_set2 += bases;
        }
    }

    fn add_equiv(&mut self, set: usize, bases: i64) {
        if set == 1 {
            self.count_equiv_set1 += 1;
            self.count_bases_equiv_set1 += bases;
        } else {
            self.count_equiv_set2 += 1;
            self.count_bases_equiv_set2 += bases;
        }
    }

    fn add_overlap(&mut self, set: usize, bases: i64, unique: i64) {
        if set == 1 {
            self.count_overlap_set1 += 1;
            self.count_bases_overlap_set1 += bases;
            self.count_bases_only_set1 += unique;
        } else {
            self.count_overlap_set2 += 1;
            self.count_bases_overlap_set2 += bases;
            self.count_bases_only_set2 += unique;
        }
    }

    fn add_only_bases(&mut self, set: usize, bases: i64) {
        if set == 1 {
            self.count_bases_only_set1 += bases;
        } else {
            self.count_bases_only_set2 += bases;
        }
    }
}

//-----------------------------------------------------------------------------

// A union group of mutually matched alignments within one comparison step.
// A merged-away group is left with an empty member set.
struct AlignGroup {
    members: BTreeSet<usize>,
    level: MatchLevel,
}

/// A comparison session over two sorted alignment sets.
///
/// The session owns both sources and is driven by repeated calls to
/// [`AlignCompare::next_group`] until [`AlignCompare::end_of_data`] returns `true`.
/// The returned groups own their alignments; nothing outlives the returned vector.
///
/// # Examples
///
/// ```
/// use align_compare::{AlignCompare, AlignmentRecord, CompareParams, Exon, MatchLevel, SeqRange, VecSource};
///
/// let exon = Exon::new(SeqRange::new(100, 200), SeqRange::new(100, 200));
/// let set1 = VecSource::new(vec![AlignmentRecord::new("chr1", "chrX", vec![exon.clone()])]);
/// let set2 = VecSource::new(vec![AlignmentRecord::new("chr1", "chrX", vec![exon])]);
///
/// let mut compare = AlignCompare::new(Box::new(set1), Box::new(set2), CompareParams::default()).unwrap();
/// let group = compare.next_group().unwrap();
/// assert_eq!(group.len(), 2);
/// assert!(group.iter().all(|info| info.match_level == MatchLevel::Equiv));
/// assert!(compare.end_of_data());
/// assert_eq!(compare.stats().count_equiv_groups, 1);
/// ```
pub struct AlignCompare {
    params: CompareParams,
    set1: Box<dyn AlignmentSource>,
    set2: Box<dyn AlignmentSource>,
    next_group1: Vec<AlignmentInfo>,
    next_group2: Vec<AlignmentInfo>,
    current1: Vec<AlignmentInfo>,
    current2: Vec<AlignmentInfo>,
    boundaries: HashMap<String, BTreeSet<usize>>,
    last_id1: Option<(String, String)>,
    last_id2: Option<(String, String)>,
    stats: CompareStats,
}

impl AlignCompare {
    /// Creates a comparison session over the given sources.
    ///
    /// Returns an error if the parameters are contradictory.
    pub fn new(
        set1: Box<dyn AlignmentSource>,
        set2: Box<dyn AlignmentSource>,
        params: CompareParams,
    ) -> Result<Self, String> {
        params.validate()?;
        Ok(AlignCompare {
            params,
            set1,
            set2,
            next_group1: Vec::new(),
            next_group2: Vec::new(),
            current1: Vec::new(),
            current2: Vec::new(),
            boundaries: HashMap::new(),
            last_id1: None,
            last_id2: None,
            stats: CompareStats::default(),
        })
    }

    /// Returns `true` when both sources are exhausted and no buffered group remains.
    pub fn end_of_data(&self) -> bool {
        self.set1.end_of_data()
            && self.set2.end_of_data()
            && self.next_group1.is_empty()
            && self.next_group2.is_empty()
    }

    /// Returns the running statistics.
    pub fn stats(&self) -> &CompareStats {
        &self.stats
    }

    /// Collects span boundary positions from every alignment in both sets, then
    /// rewinds the sources.
    ///
    /// When the boundaries map is populated, [`AlignCompare::next_group`] splits
    /// group members at positions where any alignment from either set has a span
    /// boundary, so that partial overlaps are compared at matching granularity.
    /// Call before the first [`AlignCompare::next_group`].
    pub fn populate_boundaries_map(&mut self) -> Result<(), String> {
        while !self.set1.end_of_data() {
            let record = self.set1.next()?;
            let info = AlignmentInfo::new(1, record, &self.params, None)?;
            self.add_boundaries(&info);
        }
        self.set1.reset()?;
        while !self.set2.end_of_data() {
            let record = self.set2.next()?;
            let info = AlignmentInfo::new(2, record, &self.params, None)?;
            self.add_boundaries(&info);
        }
        self.set2.reset()?;
        self.last_id1 = None;
        self.last_id2 = None;
        Ok(())
    }

    fn add_boundaries(&mut self, info: &AlignmentInfo) {
        for (key, value) in info.spans.iter() {
            if !info.query.is_empty() {
                let entry = self.boundaries.entry(info.query.clone()).or_default();
                entry.insert(value.start);
                entry.insert(value.end);
            }
            if !info.subject.is_empty() {
                let entry = self.boundaries.entry(info.subject.clone()).or_default();
                entry.insert(key.start);
                entry.insert(key.end);
            }
        }
    }

    /// Returns the next group of comparably-keyed alignments from both sets,
    /// classified against each other.
    ///
    /// The group contains all alignments sharing the next (query, subject,
    /// required scores) key in sort order, from one or both sets.
    /// Returns an empty group at the end of data, or when
    /// [`CompareParams::ignore_not_present`] filters out a one-sided group; use
    /// [`AlignCompare::end_of_data`] to detect termination.
    pub fn next_group(&mut self) -> Result<Vec<AlignmentInfo>, String> {
        let next_group_set = self.determine_next_group_set()?;
        if next_group_set & 1 != 0 {
            self.get_current_group(1)?;
        }
        if next_group_set & 2 != 0 {
            self.get_current_group(2)?;
        }

        match next_group_set {
            1 => Ok(self.take_unmatched_group(1)),
            2 => Ok(self.take_unmatched_group(2)),
            _ => self.classify_current_groups(),
        }
    }

    // Decides which set(s) the next group is read from: 1, 2, or 3 for both.
    fn determine_next_group_set(&mut self) -> Result<u8, String> {
        if self.next_group1.is_empty() {
            if self.set1.end_of_data() {
                return Ok(2);
            }
            let info = Self::pull(
                &mut self.set1,
                1,
                &self.params,
                &mut self.stats,
                &mut self.last_id1,
            )?;
            self.next_group1.push(info);
        }
        if self.next_group2.is_empty() {
            if self.set2.end_of_data() {
                return Ok(1);
            }
            let info = Self::pull(
                &mut self.set2,
                2,
                &self.params,
                &mut self.stats,
                &mut self.last_id2,
            )?;
            self.next_group2.push(info);
        }
        match self.next_group1[0].compare_group(&self.next_group2[0], true, &self.params) {
            Ordering::Less => Ok(1),
            Ordering::Greater => Ok(2),
            Ordering::Equal => Ok(3),
        }
    }

    // Reads and wraps the next alignment from a source, verifying the input order
    // and updating the per-set counters.
    fn pull(
        source: &mut Box<dyn AlignmentSource>,
        set: usize,
        params: &CompareParams,
        stats: &mut CompareStats,
        last_id: &mut Option<(String, String)>,
    ) -> Result<AlignmentInfo, String> {
        let record = source.next()?;
        if let Some((query, subject)) = last_id.as_ref() {
            let ordering = (params.id_ordering)(query, &record.query)
                .then_with(|| (params.id_ordering)(subject, &record.subject));
            if ordering == Ordering::Greater {
                return Err(format!(
                    "Set {} is not sorted by (query, subject): {} / {} follows {} / {}",
                    set, record.query, record.subject, query, subject
                ));
            }
        }
        *last_id = Some((record.query.clone(), record.subject.clone()));
        let info = AlignmentInfo::new(set, record, params, None)?;
        stats.add_pulled(set, info.length as i64);
        Ok(info)
    }

    // Collects the current group of one set: the buffered seed plus every following
    // alignment with the same grouping key. Reads at most one alignment past the
    // group boundary and buffers it as the seed of the next group.
    fn get_current_group(&mut self, set: usize) -> Result<(), String> {
        let (source, current, next, last_id) = if set == 1 {
            (&mut self.set1, &mut self.current1, &mut self.next_group1, &mut self.last_id1)
        } else {
            (&mut self.set2, &mut self.current2, &mut self.next_group2, &mut self.last_id2)
        };
        current.clear();
        current.append(next);
        while !source.end_of_data() && next.is_empty() {
            let align = Self::pull(source, set, &self.params, &mut self.stats, last_id)?;
            if current.is_empty()
                || align.compare_group(&current[0], true, &self.params) == Ordering::Equal
            {
                current.push(align);
            } else {
                next.push(align);
            }
        }
        Ok(())
    }

    // A group present in only one set: everything is unmatched.
    fn take_unmatched_group(&mut self, set: usize) -> Vec<AlignmentInfo> {
        let group = if set == 1 {
            std::mem::take(&mut self.current1)
        } else {
            std::mem::take(&mut self.current2)
        };
        if self.params.ignore_not_present {
            return Vec::new();
        }
        if set == 1 {
            self.stats.count_only_set1 += group.len() as u64;
            self.stats.count_split_set1 += group.len() as u64;
        } else {
            self.stats.count_only_set2 += group.len() as u64;
            self.stats.count_split_set2 += group.len() as u64;
        }
        for info in group.iter() {
            self.stats.add_only_bases(set, info.length as i64);
        }
        group
    }

    // Splits the alignments in the current group of one set at the boundary
    // positions on one row.
    fn split_on_overlaps(&mut self, set: usize, row: Row) -> Result<(), String> {
        let group = if set == 1 {
            std::mem::take(&mut self.current1)
        } else {
            std::mem::take(&mut self.current2)
        };
        let id_missing = match group.first() {
            None => true,
            Some(front) => match row {
                Row::Query => front.query.is_empty(),
                Row::Subject => front.subject.is_empty(),
            },
        };
        if id_missing {
            if set == 1 {
                self.current1 = group;
            } else {
                self.current2 = group;
            }
            return Ok(());
        }

        let mut transformed = Vec::new();
        for info in group {
            let parts = self.break_on_boundaries(&info, row)?;
            if parts.is_empty() {
                transformed.push(info);
            } else {
                transformed.extend(parts);
            }
        }
        if set == 1 {
            self.current1 = transformed;
        } else {
            self.current2 = transformed;
        }
        Ok(())
    }

    // Breaks one alignment into slices at the collected boundary positions that
    // fall strictly inside its range on the given row. Returns an empty list when
    // no boundary splits the alignment.
    fn break_on_boundaries(
        &self,
        info: &AlignmentInfo,
        row: Row,
    ) -> Result<Vec<AlignmentInfo>, String> {
        use std::ops::Bound::{Excluded, Included};

        let id = match row {
            Row::Query => &info.query,
            Row::Subject => &info.subject,
        };
        let mut parts = Vec::new();
        let boundaries = match self.boundaries.get(id) {
            Some(b) => b,
            None => return Ok(parts),
        };
        let range = match row {
            Row::Query => info.query_range,
            Row::Subject => info.subject_range,
        };

        let mut last = range.start;
        for &boundary in boundaries.range((Excluded(range.start), Included(range.end))) {
            // Extract the slice, as long as it is not the entire alignment.
            if last > range.start || boundary < range.end {
                if let Some(part) = info.slice(row, SeqRange::new(last, boundary), &self.params)? {
                    parts.push(part);
                }
            }
            last = boundary;
        }
        if !parts.is_empty() && last < range.end {
            if let Some(part) = info.slice(row, SeqRange::new(last, range.end), &self.params)? {
                parts.push(part);
            }
        }
        Ok(parts)
    }

    // Deterministic processing order of alignments within one comparison step.
    fn align_order(first: &AlignmentInfo, second: &AlignmentInfo, params: &CompareParams) -> Ordering {
        (params.id_ordering)(&first.query, &second.query)
            .then_with(|| (params.id_ordering)(&first.subject, &second.subject))
            .then_with(|| first.scores.cmp(&second.scores))
            .then_with(|| first.query_strand.cmp(&second.query_strand))
            .then_with(|| first.subject_strand.cmp(&second.subject_strand))
            .then_with(|| first.subject_range.cmp(&second.subject_range))
            .then_with(|| first.query_range.cmp(&second.query_range))
    }

    // Processing order of the pair comparisons. In strict mode equivalent pairs
    // come first; otherwise they come last, so that weaker overlaps are combined
    // into the groups formed around equivalent alignments.
    fn comparison_order(
        c1: &(usize, usize, Comparison),
        c2: &(usize, usize, Comparison),
        arena: &[AlignmentInfo],
        strict: bool,
    ) -> Ordering {
        if c1.2.is_equivalent != c2.2.is_equivalent {
            let c1_first = if strict { c1.2.is_equivalent } else { !c1.2.is_equivalent };
            return if c1_first { Ordering::Less } else { Ordering::Greater };
        }
        arena[c2.0]
            .subject_range
            .cmp(&arena[c1.0].subject_range)
            .then_with(|| arena[c1.1].query_range.cmp(&arena[c2.1].query_range))
    }

    // Both sets lead: split if boundaries are known, compare all overlapping
    // cross-set pairs, group the matches, and account for the rest.
    fn classify_current_groups(&mut self) -> Result<Vec<AlignmentInfo>, String> {
        if !self.boundaries.is_empty() {
            self.split_on_overlaps(1, Row::Query)?;
            self.split_on_overlaps(1, Row::Subject)?;
            self.split_on_overlaps(2, Row::Query)?;
            self.split_on_overlaps(2, Row::Subject)?;
            self.stats.count_split_set1 += self.current1.len() as u64;
            self.stats.count_split_set2 += self.current2.len() as u64;
        }

        let set1_len = self.current1.len();
        let mut arena: Vec<AlignmentInfo> = Vec::with_capacity(set1_len + self.current2.len());
        arena.append(&mut self.current1);
        arena.append(&mut self.current2);

        let mut set1_order: Vec<usize> = (0..set1_len).collect();
        let mut set2_order: Vec<usize> = (set1_len..arena.len()).collect();
        set1_order.sort_by(|&a, &b| {
            Self::align_order(&arena[a], &arena[b], &self.params).then(a.cmp(&b))
        });
        set2_order.sort_by(|&a, &b| {
            Self::align_order(&arena[a], &arena[b], &self.params).then(a.cmp(&b))
        });

        // Compare every overlapping cross-set pair. In strict mode an alignment
        // from set 2 stops participating once an equivalent mate is found.
        let strict = self.params.strict;
        let mut comparisons: Vec<(usize, usize, Comparison)> = Vec::new();
        let mut equiv_seen: Vec<bool> = vec![false; arena.len()];
        for &first in set1_order.iter() {
            for &second in set2_order.iter() {
                if strict && equiv_seen[second] {
                    continue;
                }
                if !is_overlapping(&arena[first], &arena[second], self.params.row) {
                    continue;
                }
                let comparison = Comparison::new(&arena[first], &arena[second], &self.params);
                let is_equivalent = comparison.is_equivalent;
                comparisons.push((first, second, comparison));
                if is_equivalent {
                    equiv_seen[second] = true;
                    if strict {
                        break;
                    }
                }
            }
        }
        comparisons.sort_by(|c1, c2| Self::comparison_order(c1, c2, &arena, strict));

        let mut groups: Vec<AlignGroup> = Vec::new();
        let mut group_of: HashMap<usize, usize> = HashMap::new();
        let mut unmatched: Vec<bool> = vec![true; arena.len()];
        let mut out: Vec<usize> = Vec::new();

        for (first, second, comparison) in comparisons.iter() {
            let (first, second) = (*first, *second);
            // In strict mode only equivalence counts; an overlapping pair can also
            // count as long as neither side already has an equivalent mate.
            let counted = comparison.is_equivalent
                || (!strict
                    && comparison.overlap > 0.0
                    && arena[first].match_level != MatchLevel::Equiv
                    && arena[second].match_level != MatchLevel::Equiv);
            if !counted {
                continue;
            }
            let level = if comparison.is_equivalent { MatchLevel::Equiv } else { MatchLevel::Overlap };

            let group1 = if unmatched[first] {
                unmatched[first] = false;
                arena[first].match_level = level;
                out.push(first);
                if comparison.is_equivalent {
                    self.stats.add_equiv(1, comparison.spans_in_common as i64);
                } else {
                    self.stats.add_overlap(
                        1,
                        (comparison.spans_in_common + comparison.spans_overlap) as i64,
                        comparison.spans_unique_first,
                    );
                }
                None
            } else {
                group_of.get(&first).copied()
            };
            let group2 = if unmatched[second] {
                unmatched[second] = false;
                arena[second].match_level = level;
                out.push(second);
                if comparison.is_equivalent {
                    self.stats.add_equiv(2, comparison.spans_in_common as i64);
                } else {
                    self.stats.add_overlap(
                        2,
                        (comparison.spans_in_common + comparison.spans_overlap) as i64,
                        comparison.spans_unique_second,
                    );
                }
                None
            } else {
                group_of.get(&second).copied()
            };

            match (group1, group2) {
                (None, None) => {
                    let slot = groups.len();
                    let mut members = BTreeSet::new();
                    members.insert(first);
                    members.insert(second);
                    groups.push(AlignGroup { members, level });
                    group_of.insert(first, slot);
                    group_of.insert(second, slot);
                    if comparison.is_equivalent {
                        self.stats.count_equiv_groups += 1;
                    } else {
                        self.stats.count_overlap_groups += 1;
                    }
                }
                (None, Some(slot)) => {
                    groups[slot].members.insert(first);
                    group_of.insert(first, slot);
                }
                (Some(slot), None) => {
                    groups[slot].members.insert(second);
                    group_of.insert(second, slot);
                }
                (Some(slot1), Some(slot2)) if slot1 != slot2 => {
                    // Merge the second group into the first.
                    let members2 = std::mem::take(&mut groups[slot2].members);
                    let level2 = groups[slot2].level;
                    for &member in members2.iter() {
                        group_of.insert(member, slot1);
                    }
                    groups[slot1].members.extend(members2);
                    if level2 == MatchLevel::Overlap {
                        self.stats.count_overlap_groups -= 1;
                        if groups[slot1].level == MatchLevel::Equiv {
                            // The merged group is demoted from equivalence to overlap.
                            groups[slot1].level = MatchLevel::Overlap;
                            self.stats.count_overlap_groups += 1;
                            self.stats.count_equiv_groups -= 1;
                        }
                    } else {
                        self.stats.count_equiv_groups -= 1;
                    }
                }
                _ => {}
            }
        }

        // Per-group postprocessing: better/worse tie-breaking for overlap groups
        // and matched-alignment back references.
        for slot in 0..groups.len() {
            if groups[slot].members.is_empty() || groups[slot].level == MatchLevel::NoMatch {
                continue;
            }
            let members: Vec<usize> = groups[slot].members.iter().copied().collect();
            if groups[slot].level == MatchLevel::Overlap {
                if let Some(side) = self.better_side(&arena, &members) {
                    for &member in members.iter() {
                        arena[member].match_level = if arena[member].source_set == side {
                            MatchLevel::OverlapBetter
                        } else {
                            MatchLevel::OverlapWorse
                        };
                    }
                }
            }
            let (side1, side2): (Vec<usize>, Vec<usize>) =
                members.iter().copied().partition(|&m| arena[m].source_set == 1);
            for &m1 in side1.iter() {
                for &m2 in side2.iter() {
                    arena[m1].matched_alignments.push(m2);
                    arena[m2].matched_alignments.push(m1);
                }
            }
        }

        // The rest found no match, in order of their appearance in the comparisons.
        self.stats.count_only_set1 += set1_order.iter().filter(|&&i| unmatched[i]).count() as u64;
        self.stats.count_only_set2 += set2_order.iter().filter(|&&i| unmatched[i]).count() as u64;
        for (first, second, comparison) in comparisons.iter() {
            if comparison.overlap == 0.0 {
                if unmatched[*first] {
                    unmatched[*first] = false;
                    out.push(*first);
                    let bases = arena[*first].length as i64;
                    self.stats.add_only_bases(1, bases);
                }
                if unmatched[*second] {
                    unmatched[*second] = false;
                    out.push(*second);
                    let bases = arena[*second].length as i64;
                    self.stats.add_only_bases(2, bases);
                }
            }
        }
        for &index in set1_order.iter().chain(set2_order.iter()) {
            if unmatched[index] {
                unmatched[index] = false;
                out.push(index);
                let set = if index < set1_len { 1 } else { 2 };
                let bases = arena[index].length as i64;
                self.stats.add_only_bases(set, bases);
            }
        }

        // Hand out the group, remapping the matched-alignment references to
        // positions within the returned vector.
        let mut pos_of: Vec<usize> = vec![usize::MAX; arena.len()];
        for (pos, &index) in out.iter().enumerate() {
            pos_of[index] = pos;
        }
        let mut slots: Vec<Option<AlignmentInfo>> = arena.into_iter().map(Some).collect();
        let mut result = Vec::with_capacity(out.len());
        for &index in out.iter() {
            let mut info = slots[index]
                .take()
                .ok_or_else(|| String::from("Internal error: alignment emitted twice"))?;
            info.matched_alignments = info.matched_alignments.iter().map(|&i| pos_of[i]).collect();
            result.push(info);
        }
        Ok(result)
    }

    // Picks the better side of an overlap group: by quality scores when configured,
    // by the best per-side coverage length otherwise. Ties have no better side.
    fn better_side(&self, arena: &[AlignmentInfo], members: &[usize]) -> Option<usize> {
        if !self.params.quality_scores.is_empty() {
            let mut best: [Option<usize>; 3] = [None, None, None];
            for &member in members.iter() {
                let side = &mut best[arena[member].source_set];
                if side.map_or(true, |i| arena[member].quality_scores > arena[i].quality_scores) {
                    *side = Some(member);
                }
            }
            let best1 = best[1]?;
            let best2 = best[2]?;
            match arena[best1].quality_scores.cmp(&arena[best2].quality_scores) {
                Ordering::Greater => Some(1),
                Ordering::Less => Some(2),
                Ordering::Equal => None,
            }
        } else {
            let side_len = |set: usize| {
                members
                    .iter()
                    .filter(|&&m| arena[m].source_set == set)
                    .map(|&m| arena[m].length)
                    .max()
                    .unwrap_or(0)
            };
            match side_len(1).cmp(&side_len(2)) {
                Ordering::Greater => Some(1),
                Ordering::Less => Some(2),
                Ordering::Equal => None,
            }
        }
    }
}

//-----------------------------------------------------------------------------
