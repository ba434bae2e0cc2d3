use tracing::{info, warn};

/// Only this many missing segments are logged individually, the rest is summarized
pub const MAX_LOGGED_SEGMENTS: usize = 20;

/// A run of consecutive seqids that never arrived
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct MissingSegment {
    pub count: i32,
    pub first: i32,
    pub last: i32,
}

/// Collects the seqids that advanced the receive position during a burst. It is used only to
///  report gaps after the fact, loss counting is based on the status counters.
#[derive(Debug, Clone, Default)]
pub struct PacketRange {
    ids: Vec<i32>,
}

impl PacketRange {
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn reset(&mut self) {
        self.ids.clear();
    }

    pub fn push(&mut self, seqid: i32) {
        self.ids.push(seqid);
    }

    /// Walks the pushed ids in order and returns every gap beyond the highest id seen so far. An
    ///  id that does not advance past that maximum, e.g. after reordering, produces no segment.
    pub fn missing_segments(&self) -> Vec<MissingSegment> {
        let mut result = Vec::new();
        let mut ids = self.ids.iter();
        let Some(&first) = ids.next() else {
            return result;
        };

        let mut highest = first;
        for &id in ids {
            if id <= highest {
                continue;
            }
            if let Some(expected) = highest.checked_add(1) {
                if id > expected {
                    result.push(MissingSegment {
                        count: id - expected,
                        first: expected,
                        last: id - 1,
                    });
                }
            }
            highest = id;
        }
        result
    }
}

/// The segments that are logged individually, i.e. the first [MAX_LOGGED_SEGMENTS]
pub fn segments_to_log(segments: &[MissingSegment]) -> &[MissingSegment] {
    &segments[..segments.len().min(MAX_LOGGED_SEGMENTS)]
}

pub fn log_missing_segments(segments: &[MissingSegment]) {
    if segments.is_empty() {
        return;
    }

    let total: i64 = segments.iter().map(|s| s.count as i64).sum();
    warn!("missing total:{} segments:{}", total, segments.len());
    if segments.len() > MAX_LOGGED_SEGMENTS {
        info!("too many missing segments to list, printing first {}", MAX_LOGGED_SEGMENTS);
    }
    for s in segments_to_log(segments) {
        if s.count == 1 {
            warn!("missing 1 seqid {}", s.first);
        }
        else {
            warn!("missing {} seqid {} .. {}", s.count, s.first, s.last);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn range_of(ids: &[i32]) -> PacketRange {
        let mut range = PacketRange::default();
        for &id in ids {
            range.push(id);
        }
        range
    }

    fn seg(count: i32, first: i32, last: i32) -> MissingSegment {
        MissingSegment { count, first, last }
    }

    #[rstest]
    #[case::empty(vec![], vec![])]
    #[case::single(vec![5], vec![])]
    #[case::contiguous(vec![0, 1, 2, 3], vec![])]
    #[case::one_missing(vec![0, 1, 3], vec![seg(1, 2, 2)])]
    #[case::several_missing(vec![0, 4, 5], vec![seg(3, 1, 3)])]
    #[case::two_gaps(vec![1, 3, 4, 10], vec![seg(1, 2, 2), seg(5, 5, 9)])]
    #[case::not_starting_at_zero(vec![100, 101, 103], vec![seg(1, 102, 102)])]
    #[case::non_advancing_neighbour(vec![3, 3, 2, 4], vec![])]
    #[case::reordered_then_advancing(vec![1, 3, 4, 3, 4, 5], vec![seg(1, 2, 2)])]
    #[case::late_id_before_gap(vec![1, 5, 3, 8], vec![seg(3, 2, 4), seg(2, 6, 7)])]
    #[case::max_id(vec![i32::MAX - 2, i32::MAX], vec![seg(1, i32::MAX - 1, i32::MAX - 1)])]
    fn test_missing_segments(#[case] ids: Vec<i32>, #[case] expected: Vec<MissingSegment>) {
        assert_eq!(range_of(&ids).missing_segments(), expected);
    }

    #[rstest]
    #[case(vec![0, 2, 4, 6, 8])]
    #[case(vec![7, 8, 20, 21, 22, 40])]
    #[case(vec![1, 1000])]
    #[case(vec![0, 1, 2])]
    fn test_missing_sum_equals_span_minus_count(#[case] ids: Vec<i32>) {
        let range = range_of(&ids);
        let total: i32 = range.missing_segments().iter().map(|s| s.count).sum();
        let span = ids.last().unwrap() - ids.first().unwrap() + 1;
        assert_eq!(total, span - ids.len() as i32);
    }

    #[test]
    fn test_reset() {
        let mut range = range_of(&[0, 5, 9]);
        assert_eq!(range.len(), 3);
        range.reset();
        assert!(range.is_empty());
        assert!(range.missing_segments().is_empty());
    }

    #[test]
    fn test_many_segments_are_all_returned() {
        let ids = (0..50).map(|i| i * 2).collect::<Vec<_>>();
        let range = range_of(&ids);
        let segments = range.missing_segments();
        assert_eq!(segments.len(), 49);

        let logged = segments_to_log(&segments);
        assert_eq!(logged.len(), MAX_LOGGED_SEGMENTS);
        assert_eq!(logged[0], MissingSegment { count: 1, first: 1, last: 1 });
        assert_eq!(logged[MAX_LOGGED_SEGMENTS - 1], MissingSegment { count: 1, first: 39, last: 39 });
        log_missing_segments(&segments);
    }

    #[rstest]
    #[case::none(0)]
    #[case::few(3)]
    #[case::exactly_the_cap(MAX_LOGGED_SEGMENTS)]
    fn test_short_lists_are_logged_completely(#[case] n: usize) {
        let segments = (0..n as i32)
            .map(|i| MissingSegment { count: 1, first: 2 * i + 1, last: 2 * i + 1 })
            .collect::<Vec<_>>();
        assert_eq!(segments_to_log(&segments), &segments[..]);
    }
}
