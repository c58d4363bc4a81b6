#[cfg(test)]
mod tests {
    use crate::entry::Entry;
    use crate::merge::{CursorSource, MergeIterator, PeekableCursor};
    use crate::segment::SegmentError;

    fn failing(generation: u64, before: Vec<Entry>) -> PeekableCursor {
        let items: Vec<Result<Entry, SegmentError>> = before
            .into_iter()
            .map(Ok)
            .chain(std::iter::once(Err(SegmentError::Corrupted("boom".into()))))
            .chain(std::iter::once(Ok(Entry::new(b"zzz".to_vec(), b"late".to_vec()))))
            .collect();
        PeekableCursor::new(CursorSource::Segment { generation }, items.into_iter())
    }

    #[test]
    fn peek_reports_error_once() {
        let mut cursor = failing(0, vec![]);
        assert!(matches!(cursor.peek(), Err(SegmentError::Corrupted(_))));
        assert!(cursor.peek().unwrap().is_none());
        assert!(cursor.advance().is_none());
    }

    #[test]
    fn peek_is_idempotent() {
        let mut cursor = PeekableCursor::new(
            CursorSource::MemTable,
            vec![Ok(Entry::new(b"a".to_vec(), b"1".to_vec()))].into_iter(),
        );
        assert_eq!(cursor.peek().unwrap().unwrap().key, b"a".to_vec());
        assert_eq!(cursor.peek().unwrap().unwrap().key, b"a".to_vec());
        assert_eq!(cursor.advance().unwrap().key, b"a".to_vec());
        assert!(cursor.peek().unwrap().is_none());
    }

    #[test]
    fn merge_surfaces_error_and_fuses() {
        let healthy = PeekableCursor::new(
            CursorSource::Segment { generation: 1 },
            (0..5u8).map(|i| Ok(Entry::new(vec![b'a' + i], vec![i]))),
        );
        let mut merge: MergeIterator = MergeIterator::new(vec![
            healthy,
            failing(0, vec![Entry::new(b"b".to_vec(), b"x".to_vec())]),
        ]);

        let mut saw_error = false;
        for item in merge.by_ref() {
            match item {
                Ok(_) => assert!(!saw_error, "entry after error"),
                Err(SegmentError::Corrupted(_)) => saw_error = true,
                Err(e) => panic!("unexpected error: {e}"),
            }
        }
        assert!(saw_error);
        assert!(merge.next().is_none());
    }

    #[test]
    fn error_on_first_peek() {
        let mut merge: MergeIterator = MergeIterator::new(vec![failing(0, vec![])]);
        assert!(matches!(merge.next(), Some(Err(SegmentError::Corrupted(_)))));
        assert!(merge.next().is_none());
    }
}
