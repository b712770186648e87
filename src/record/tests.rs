use super::*;

//-----------------------------------------------------------------------------
// Helpers
//-----------------------------------------------------------------------------

/// A single gap-free exon aligning equal-length intervals.
fn gap_free_exon(q_start: usize, q_end: usize, s_start: usize) -> Exon {
    Exon::new(SeqRange::new(q_start, q_end), SeqRange::new(s_start, s_start + (q_end - q_start)))
}

/// An exon with an explicit gap structure used by several tests:
/// query 100-150, subject 200-260, parts M20 S10 X5 M25.
fn gapped_exon() -> Exon {
    Exon::with_parts(
        SeqRange::new(100, 150),
        SeqRange::new(200, 260),
        vec![
            AlignPart::Match(20),
            AlignPart::SubjectIns(10),
            AlignPart::Mismatch(5),
            AlignPart::Match(25),
        ],
    )
}

fn chunk_ranges(record: &AlignmentRecord, exon: &Exon) -> Vec<(AlignPart, SeqRange, SeqRange)> {
    let chunks = record.exon_chunks(exon).expect("exon_chunks failed");
    chunks.iter().map(|c| (c.part, c.query_range, c.subject_range)).collect()
}

//-----------------------------------------------------------------------------
// Ranges
//-----------------------------------------------------------------------------

#[test]
fn seq_range_basics() {
    let range = SeqRange::new(100, 200);
    assert_eq!(range.len(), 100, "wrong length");
    assert!(!range.is_empty(), "range should not be empty");
    assert_eq!(range.to_string(), "100-200", "wrong display format");

    let swapped = SeqRange::new(200, 100);
    assert_eq!(swapped, range, "endpoints should be swapped into order");

    let empty = SeqRange::empty_at(150);
    assert!(empty.is_empty(), "empty range should be empty");
    assert_eq!(empty.len(), 0, "empty range should have length 0");
}

#[test]
fn seq_range_intersection() {
    let a = SeqRange::new(100, 200);
    let b = SeqRange::new(150, 250);
    let c = SeqRange::new(200, 300);

    assert!(a.intersects(&b), "overlapping ranges should intersect");
    assert_eq!(a.intersection(&b), SeqRange::new(150, 200), "wrong intersection");

    assert!(!a.intersects(&c), "half-open ranges touching at a point should not intersect");
    assert!(a.intersection(&c).is_empty(), "disjoint intersection should be empty");

    assert!(a.contains_range(&SeqRange::new(120, 180)), "contained range not detected");
    assert!(!a.contains_range(&b), "partially overlapping range should not be contained");
    assert!(a.contains_range(&SeqRange::empty_at(500)), "empty ranges are always contained");
}

#[test]
fn seq_range_ordering() {
    let mut ranges =
        vec![SeqRange::new(200, 300), SeqRange::new(100, 250), SeqRange::new(100, 200)];
    ranges.sort();
    assert_eq!(
        ranges,
        vec![SeqRange::new(100, 200), SeqRange::new(100, 250), SeqRange::new(200, 300)],
        "ranges should sort by (start, end)"
    );
}

#[test]
fn range_set_coalesces() {
    let mut set = RangeSet::new();
    set.insert(SeqRange::new(100, 200));
    set.insert(SeqRange::new(150, 250));
    assert_eq!(
        set.iter().copied().collect::<Vec<_>>(),
        vec![SeqRange::new(100, 250)],
        "overlapping inserts should merge"
    );

    set.insert(SeqRange::new(250, 300));
    assert_eq!(
        set.iter().copied().collect::<Vec<_>>(),
        vec![SeqRange::new(100, 300)],
        "adjacent inserts should merge"
    );

    set.insert(SeqRange::new(400, 500));
    assert_eq!(set.total_len(), 300, "wrong total length");
    assert_eq!(set.iter().count(), 2, "disjoint insert should stay separate");

    set.insert(SeqRange::empty_at(350));
    assert_eq!(set.iter().count(), 2, "empty insert should be ignored");
}

#[test]
fn range_set_order_independent() {
    let ranges = [
        SeqRange::new(100, 110),
        SeqRange::new(105, 130),
        SeqRange::new(200, 210),
        SeqRange::new(130, 150),
    ];
    let mut forward = RangeSet::new();
    for range in ranges.iter() {
        forward.insert(*range);
    }
    let mut backward = RangeSet::new();
    for range in ranges.iter().rev() {
        backward.insert(*range);
    }
    assert_eq!(forward, backward, "insertion order should not matter");
}

#[test]
fn range_set_restrict() {
    let mut set = RangeSet::new();
    set.insert(SeqRange::new(100, 200));
    set.insert(SeqRange::new(300, 400));
    set.restrict_to(SeqRange::new(150, 350));
    assert_eq!(
        set.iter().copied().collect::<Vec<_>>(),
        vec![SeqRange::new(150, 200), SeqRange::new(300, 350)],
        "wrong ranges after restriction"
    );

    set.restrict_to(SeqRange::new(0, 50));
    assert!(set.is_empty(), "restriction to a disjoint range should empty the set");
}

//-----------------------------------------------------------------------------
// Records and envelopes
//-----------------------------------------------------------------------------

#[test]
fn record_envelopes() {
    let record = AlignmentRecord::new(
        "query1",
        "subject1",
        vec![gap_free_exon(100, 200, 300), gap_free_exon(500, 600, 700)],
    );
    assert_eq!(record.query_range(), SeqRange::new(100, 600), "wrong query envelope");
    assert_eq!(record.subject_range(), SeqRange::new(300, 800), "wrong subject envelope");

    let empty = AlignmentRecord::new("query1", "subject1", Vec::new());
    assert!(empty.query_range().is_empty(), "empty record should have an empty envelope");
}

#[test]
fn record_scores() {
    let mut record = AlignmentRecord::new("query1", "subject1", vec![gap_free_exon(0, 10, 0)]);
    record.scores.push(NamedScore::int("score", 42));
    record.scores.push(NamedScore::real("bit_score", 61.5));

    assert_eq!(record.score("score"), Some(&ScoreValue::Int(42)), "wrong integer score");
    assert_eq!(record.score("bit_score"), Some(&ScoreValue::Real(61.5)), "wrong real score");
    assert_eq!(record.score("missing"), None, "missing score should be None");
}

#[test]
fn record_id_comparison() {
    let a = AlignmentRecord::new("chr1", "chrX", Vec::new());
    let b = AlignmentRecord::new("chr1", "chrY", Vec::new());
    let c = AlignmentRecord::new("chr2", "chrA", Vec::new());
    let ordering: fn(&str, &str) -> Ordering = |x, y| x.cmp(y);

    assert_eq!(a.compare_ids(&b, ordering), Ordering::Less, "subject should break the tie");
    assert_eq!(c.compare_ids(&b, ordering), Ordering::Greater, "query should dominate");
    assert_eq!(a.compare_ids(&a, ordering), Ordering::Equal, "record should equal itself");
}

//-----------------------------------------------------------------------------
// Walking exons
//-----------------------------------------------------------------------------

#[test]
fn chunks_gap_free() {
    let record = AlignmentRecord::new("query1", "subject1", vec![gap_free_exon(100, 200, 300)]);
    let chunks = chunk_ranges(&record, &record.exons[0]);
    assert_eq!(
        chunks,
        vec![(AlignPart::Match(100), SeqRange::new(100, 200), SeqRange::new(300, 400))],
        "gap-free exon should yield a single match chunk"
    );
}

#[test]
fn chunks_with_parts() {
    let record = AlignmentRecord::new("query1", "subject1", vec![gapped_exon()]);
    let chunks = chunk_ranges(&record, &record.exons[0]);
    assert_eq!(
        chunks,
        vec![
            (AlignPart::Match(20), SeqRange::new(100, 120), SeqRange::new(200, 220)),
            (AlignPart::SubjectIns(10), SeqRange::empty_at(120), SeqRange::new(220, 230)),
            (AlignPart::Mismatch(5), SeqRange::new(120, 125), SeqRange::new(230, 235)),
            (AlignPart::Match(25), SeqRange::new(125, 150), SeqRange::new(235, 260)),
        ],
        "wrong chunk coordinates"
    );
}

#[test]
fn chunks_reverse_subject() {
    let mut record = AlignmentRecord::new("query1", "subject1", vec![gapped_exon()]);
    record.subject_strand = Strand::Reverse;
    let chunks = chunk_ranges(&record, &record.exons[0]);
    assert_eq!(
        chunks,
        vec![
            (AlignPart::Match(20), SeqRange::new(100, 120), SeqRange::new(240, 260)),
            (AlignPart::SubjectIns(10), SeqRange::empty_at(120), SeqRange::new(230, 240)),
            (AlignPart::Mismatch(5), SeqRange::new(120, 125), SeqRange::new(225, 230)),
            (AlignPart::Match(25), SeqRange::new(125, 150), SeqRange::new(200, 225)),
        ],
        "reverse subject walk should descend from the high end"
    );
}

#[test]
fn chunks_reject_inconsistent_exons() {
    let unequal = Exon::new(SeqRange::new(100, 150), SeqRange::new(200, 260));
    let record = AlignmentRecord::new("query1", "subject1", vec![unequal]);
    assert!(
        record.exon_chunks(&record.exons[0]).is_err(),
        "gap-free exon with unequal intervals should be rejected"
    );

    let short = Exon::with_parts(
        SeqRange::new(100, 150),
        SeqRange::new(200, 250),
        vec![AlignPart::Match(10)],
    );
    let record = AlignmentRecord::new("query1", "subject1", vec![short]);
    assert!(
        record.exon_chunks(&record.exons[0]).is_err(),
        "parts shorter than the intervals should be rejected"
    );
}

//-----------------------------------------------------------------------------
// Slicing
//-----------------------------------------------------------------------------

#[test]
fn slice_gap_free() {
    let record = AlignmentRecord::new("query1", "subject1", vec![gap_free_exon(100, 200, 300)]);
    let slice = record
        .extract_slice(Row::Query, SeqRange::new(130, 170))
        .expect("extract_slice failed")
        .expect("slice should not be empty");

    assert_eq!(slice.exons.len(), 1, "wrong exon count");
    assert_eq!(slice.exons[0].query_range, SeqRange::new(130, 170), "wrong query interval");
    assert_eq!(slice.exons[0].subject_range, SeqRange::new(330, 370), "wrong subject interval");
    assert_eq!(slice.exons[0].parts, vec![AlignPart::Match(40)], "wrong parts");
    assert!(slice.scores.is_empty(), "slices should carry no scores");
}

#[test]
fn slice_with_parts() {
    let record = AlignmentRecord::new("query1", "subject1", vec![gapped_exon()]);
    let slice = record
        .extract_slice(Row::Query, SeqRange::new(110, 130))
        .expect("extract_slice failed")
        .expect("slice should not be empty");

    assert_eq!(slice.exons.len(), 1, "wrong exon count");
    let exon = &slice.exons[0];
    assert_eq!(exon.query_range, SeqRange::new(110, 130), "wrong query interval");
    assert_eq!(exon.subject_range, SeqRange::new(210, 240), "wrong subject interval");
    assert_eq!(
        exon.parts,
        vec![
            AlignPart::Match(10),
            AlignPart::SubjectIns(10),
            AlignPart::Mismatch(5),
            AlignPart::Match(5),
        ],
        "insertion strictly inside the slice should be kept"
    );
}

#[test]
fn slice_drops_boundary_insertion() {
    let record = AlignmentRecord::new("query1", "subject1", vec![gapped_exon()]);
    let slice = record
        .extract_slice(Row::Query, SeqRange::new(100, 120))
        .expect("extract_slice failed")
        .expect("slice should not be empty");

    // The subject insertion sits exactly at the slice end and does not survive.
    assert_eq!(slice.exons[0].parts, vec![AlignPart::Match(20)], "wrong parts");
    assert_eq!(slice.exons[0].subject_range, SeqRange::new(200, 220), "wrong subject interval");
}

#[test]
fn slice_on_subject_row() {
    let record = AlignmentRecord::new("query1", "subject1", vec![gapped_exon()]);
    let slice = record
        .extract_slice(Row::Subject, SeqRange::new(230, 250))
        .expect("extract_slice failed")
        .expect("slice should not be empty");

    let exon = &slice.exons[0];
    assert_eq!(exon.subject_range, SeqRange::new(230, 250), "wrong subject interval");
    assert_eq!(exon.query_range, SeqRange::new(120, 140), "wrong query interval");
    assert_eq!(
        exon.parts,
        vec![AlignPart::Mismatch(5), AlignPart::Match(15)],
        "wrong parts for a subject-row slice"
    );
}

#[test]
fn slice_reverse_subject() {
    let mut record = AlignmentRecord::new("query1", "subject1", vec![gap_free_exon(100, 150, 210)]);
    record.subject_strand = Strand::Reverse;
    let slice = record
        .extract_slice(Row::Query, SeqRange::new(110, 130))
        .expect("extract_slice failed")
        .expect("slice should not be empty");

    // Query 110-130 pairs with subject 230-250 when the subject is reversed.
    assert_eq!(slice.exons[0].query_range, SeqRange::new(110, 130), "wrong query interval");
    assert_eq!(slice.exons[0].subject_range, SeqRange::new(230, 250), "wrong subject interval");
    assert_eq!(slice.subject_strand, Strand::Reverse, "strand should be preserved");
}

#[test]
fn slice_without_aligned_residues() {
    let exon = Exon::with_parts(
        SeqRange::new(100, 150),
        SeqRange::new(200, 240),
        vec![AlignPart::Match(20), AlignPart::QueryIns(10), AlignPart::Match(20)],
    );
    let record = AlignmentRecord::new("query1", "subject1", vec![exon]);

    let slice = record
        .extract_slice(Row::Query, SeqRange::new(120, 130))
        .expect("extract_slice failed");
    assert!(slice.is_none(), "a slice covering only an insertion should be empty");

    let slice = record
        .extract_slice(Row::Query, SeqRange::new(500, 600))
        .expect("extract_slice failed");
    assert!(slice.is_none(), "a slice outside the alignment should be empty");
}

#[test]
fn slice_spanning_exons() {
    let record = AlignmentRecord::new(
        "query1",
        "subject1",
        vec![gap_free_exon(100, 200, 300), gap_free_exon(500, 600, 700)],
    );
    let slice = record
        .extract_slice(Row::Query, SeqRange::new(150, 550))
        .expect("extract_slice failed")
        .expect("slice should not be empty");

    assert_eq!(slice.exons.len(), 2, "both exons should contribute");
    assert_eq!(slice.exons[0].query_range, SeqRange::new(150, 200), "wrong first exon");
    assert_eq!(slice.exons[0].subject_range, SeqRange::new(350, 400), "wrong first exon subject");
    assert_eq!(slice.exons[1].query_range, SeqRange::new(500, 550), "wrong second exon");
    assert_eq!(slice.exons[1].subject_range, SeqRange::new(700, 750), "wrong second exon subject");
}
