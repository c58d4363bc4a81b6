//! End-to-end lifecycle scenarios over a real directory.

#[cfg(test)]
#[allow(non_snake_case)]
mod tests {
    use crate::engine::tests::helpers::*;
    use crate::entry::Value;
    use tempfile::TempDir;

    /// # Scenario
    /// Write two keys, close, reopen.
    ///
    /// # Expected behavior
    /// Both keys are served from generation 0; an unwritten key is absent.
    #[test]
    fn segment__values_survive_reopen() {
        let tmp = TempDir::new().unwrap();
        let engine = open_at(tmp.path());
        engine.upsert(put("a", "1")).unwrap();
        engine.upsert(put("b", "2")).unwrap();

        let engine = reopen(engine, tmp.path());
        assert_eq!(engine.generation_count(), 1);
        assert_eq!(engine.memtable_len(), 0);
        assert_eq!(get_str(&engine, "a").as_deref(), Some("1"));
        assert_eq!(get_str(&engine, "b").as_deref(), Some("2"));
        assert_eq!(get_str(&engine, "c"), None);
    }

    /// # Scenario
    /// Persist a key, reopen, delete it in the memtable.
    ///
    /// # Expected behavior
    /// `get` reports it absent while an unbounded scan still yields the
    /// tombstone for it.
    #[test]
    fn memtable_segment__tombstone_visible_in_scan() {
        let tmp = TempDir::new().unwrap();
        let engine = open_at(tmp.path());
        engine.upsert(put("x", "1")).unwrap();

        let engine = reopen(engine, tmp.path());
        engine.upsert(del("x")).unwrap();

        assert_eq!(engine.get(b"x").unwrap(), None);
        let entries = scan(&engine, None, None);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].key, b"x");
        assert_eq!(entries[0].value, Value::Tombstone);
    }

    /// # Scenario
    /// Open over a directory that does not exist and close without writes.
    ///
    /// # Expected behavior
    /// Zero generations, every read absent, and the close publishes an
    /// empty generation that reopens cleanly.
    #[test]
    fn segment__empty_generation_from_empty_start() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("fresh");
        let engine = open_at(&path);
        assert_eq!(engine.generation_count(), 0);
        assert_eq!(get_str(&engine, "anything"), None);
        assert!(scan(&engine, None, None).is_empty());

        let engine = reopen(engine, &path);
        assert_eq!(engine.generation_count(), 1);
        assert_eq!(get_str(&engine, "anything"), None);
        assert!(scan(&engine, None, None).is_empty());
        assert_eq!(segment_file_count(&path), 2);
    }

    /// # Scenario
    /// Persist a tombstone to disk, then reopen.
    ///
    /// # Expected behavior
    /// The on-disk tombstone masks the older generation's value for `get`
    /// and still shows up in scans.
    #[test]
    fn segment__persisted_tombstone_masks_older_generation() {
        let tmp = TempDir::new().unwrap();
        let engine = open_at(tmp.path());
        engine.upsert(put("k", "old")).unwrap();
        let engine = reopen(engine, tmp.path());
        engine.upsert(del("k")).unwrap();
        let engine = reopen(engine, tmp.path());

        assert_eq!(engine.generation_count(), 2);
        assert_eq!(engine.get(b"k").unwrap(), None);
        let entries = scan(&engine, None, None);
        assert_eq!(entries.len(), 1);
        assert!(entries[0].is_tombstone());
    }
}
