//! # align-compare: streaming comparison of two sorted sets of pairwise alignments.
//!
//! This library consumes two sequences of pairwise alignments, each sorted by
//! (query, subject) sequence names, and classifies every alignment as equivalent,
//! overlapping (better or worse), or unique relative to the other set.
//! Typical inputs are the outputs of two alignment pipelines over the same
//! sequences, compared to measure how much the pipelines agree.
//!
//! The comparison is a merge-join over the two sorted streams: alignments sharing
//! the same (query, subject) identity are pulled from both sides in lock-step and
//! compared pairwise, so that neither input set has to be materialized in full.
//! Inputs are read once from the front; only an optional boundary-collection
//! pre-pass rewinds them.
//!
//! ### Basic concepts
//!
//! An [`AlignmentRecord`] describes one alignment as a list of exons, each aligning
//! a query interval to a subject interval with an optional gap structure.
//! Records come from an [`AlignmentSource`], typically a [`formats::FileSource`]
//! over a tab-separated (possibly gzipped) file, or a [`VecSource`] in tests.
//!
//! An [`AlignCompare`] session owns two sources and a [`CompareParams`]
//! configuration. Each call to [`AlignCompare::next_group`] returns the next group
//! of comparably-keyed alignments, classified against each other; running totals
//! are available through [`CompareStats`].
//!
//! The granularity of the comparison is controlled by [`Mode`]: gap-free blocks,
//! exons, whole alignments, introns, or blocks plus mismatched positions.
//! [`AlignCompare::populate_boundaries_map`] enables an optional pre-pass that
//! splits alignments at the span boundaries of either set, so that partial
//! overlaps are compared at matching granularity.
//!
//! The `aligncmp` binary drives a comparison of two files and prints a summary
//! report.

pub mod compare;
pub mod formats;
pub mod record;
pub mod utils;

pub use compare::{
    AlignCompare, AlignmentInfo, AlignmentSource, CompareParams, CompareStats, MatchLevel, Mode,
    RowComparison, VecSource,
};
pub use record::{AlignPart, AlignmentRecord, Exon, NamedScore, RangeSet, Row, ScoreValue, SeqRange, Strand};
