//! Isolation and lifecycle behavior observable through the public API.

mod isolation {
    use memtx::{Error, Region};

    fn read_u64(region: &Region, addr: usize) -> u64 {
        region
            .read(|tx| {
                let mut buf = [0u8; 8];
                tx.read(addr, &mut buf)?;
                Ok(u64::from_ne_bytes(buf))
            })
            .unwrap()
    }

    #[test]
    fn committed_write_is_visible_to_later_readers() {
        let region = Region::new(16, 8).unwrap();
        let start = region.start();

        let mut tx = region.begin(false);
        tx.write(&1u64.to_ne_bytes(), start).unwrap();
        assert!(tx.commit());

        let mut buf = [0u8; 8];
        let mut tx = region.begin(true);
        tx.read(start, &mut buf).unwrap();
        assert!(tx.commit());
        assert_eq!(u64::from_ne_bytes(buf), 1);
    }

    #[test]
    fn same_batch_loser_aborts_and_winner_publishes() {
        let region = Region::new(16, 8).unwrap();
        let start = region.start();

        // T1 joins the batch first but writes last.
        let mut t1 = region.begin(false);

        let mut t2 = region.begin(false);
        t2.write(&[0xBB; 8], start).unwrap();
        assert!(t2.commit());

        // Same batch: the word is still owned by T2 until the epoch turns.
        assert_eq!(t1.write(&[0xAA; 8], start), Err(Error::Conflict));
        assert!(!t1.commit());

        assert_eq!(read_u64(&region, start), u64::from_ne_bytes([0xBB; 8]));
    }

    #[test]
    fn writes_to_two_words_lose_on_the_contended_one() {
        let region = Region::new(16, 8).unwrap();
        let start = region.start();

        let mut t1 = region.begin(false);
        let mut t2 = region.begin(false);
        t1.write(&0x10u64.to_ne_bytes(), start).unwrap();
        t1.write(&0x20u64.to_ne_bytes(), start + 8).unwrap();
        assert!(t1.commit());

        // word 1 belongs to T1 for the rest of the batch
        assert_eq!(
            t2.write(&0x30u64.to_ne_bytes(), start + 8),
            Err(Error::Conflict)
        );
        assert!(!t2.commit());

        assert_eq!(read_u64(&region, start), 0x10);
        assert_eq!(read_u64(&region, start + 8), 0x20);
    }

    #[test]
    fn read_only_transactions_see_the_pre_batch_snapshot() {
        let region = Region::new(8, 8).unwrap();
        let start = region.start();
        region.rw(|tx| tx.write(&7u64.to_ne_bytes(), start)).unwrap();

        // The read-only transaction joins the batch before the writer
        // commits, and keeps its snapshot afterwards.
        let mut ro = region.begin(true);

        let mut rw = region.begin(false);
        rw.write(&8u64.to_ne_bytes(), start).unwrap();
        assert!(rw.commit());

        let mut buf = [0u8; 8];
        ro.read(start, &mut buf).unwrap();
        assert_eq!(u64::from_ne_bytes(buf), 7, "intra-batch writes must stay invisible");
        assert!(ro.commit());

        assert_eq!(read_u64(&region, start), 8);
    }

    #[test]
    fn allocated_segments_publish_only_on_commit() {
        let region = Region::new(16, 8).unwrap();

        // T1 allocates, writes, commits.
        let base = region
            .rw(|tx| {
                let base = tx.alloc(8)?;
                tx.write(&0x77u64.to_ne_bytes(), base)?;
                Ok(base)
            })
            .unwrap();
        assert_eq!(read_u64(&region, base), 0x77);

        // T2 frees it.
        region.rw(|tx| tx.free(base)).unwrap();

        // T3 can no longer resolve it.
        let mut t3 = region.begin(true);
        let mut buf = [0u8; 8];
        assert_eq!(t3.read(base, &mut buf), Err(Error::Conflict));
        assert!(!t3.commit());
    }

    #[test]
    fn aborted_allocations_leave_no_trace() {
        let region = Region::new(8, 8).unwrap();
        let start = region.start();

        let mut winner = region.begin(false);
        winner.write(&[1; 8], start).unwrap();

        let mut loser = region.begin(false);
        let base = loser.alloc(16).unwrap();
        loser.write(&[2; 8], base).unwrap();
        // conflict on the shared word tears the transaction down
        assert_eq!(loser.write(&[2; 8], start), Err(Error::Conflict));
        assert!(winner.commit());

        // the private segment was discarded with its transaction
        let mut probe = region.begin(true);
        let mut buf = [0u8; 8];
        assert_eq!(probe.read(base, &mut buf), Err(Error::Conflict));
    }

    #[test]
    fn alloc_then_free_in_one_transaction_has_no_net_effect() {
        let region = Region::new(8, 8).unwrap();
        let base = region
            .rw(|tx| {
                let base = tx.alloc(24)?;
                tx.write(&[5; 24], base)?;
                tx.free(base)?;
                Ok(base)
            })
            .unwrap();

        let mut probe = region.begin(true);
        let mut buf = [0u8; 8];
        assert_eq!(probe.read(base, &mut buf), Err(Error::Conflict));

        // the region is still fully usable
        let start = region.start();
        region.rw(|tx| tx.write(&[6; 8], start)).unwrap();
        assert_eq!(read_u64(&region, start), u64::from_ne_bytes([6; 8]));
    }

    #[test]
    fn freeing_a_segment_twice_across_batches_aborts() {
        let region = Region::new(8, 8).unwrap();
        let base = region.rw(|tx| tx.alloc(8)).unwrap();
        region.rw(|tx| tx.free(base)).unwrap();

        let mut tx = region.begin(false);
        assert_eq!(tx.free(base), Err(Error::Conflict));
        assert!(!tx.commit());
    }

    #[test]
    fn empty_transactions_commit() {
        let region = Region::new(16, 8).unwrap();
        let ro = region.begin(true);
        assert!(ro.commit());
        let rw = region.begin(false);
        assert!(rw.commit());
    }

    #[test]
    fn write_then_read_round_trips_within_a_transaction() {
        let region = Region::new(16, 8).unwrap();
        let start = region.start();
        let mut tx = region.begin(false);
        tx.write(&0xDEAD_BEEFu64.to_ne_bytes(), start).unwrap();
        let mut buf = [0u8; 8];
        tx.read(start, &mut buf).unwrap();
        assert_eq!(u64::from_ne_bytes(buf), 0xDEAD_BEEF);
        // repeated identical writes are idempotent
        tx.write(&0xDEAD_BEEFu64.to_ne_bytes(), start).unwrap();
        tx.write(&0xDEAD_BEEFu64.to_ne_bytes(), start).unwrap();
        tx.read(start, &mut buf).unwrap();
        assert_eq!(u64::from_ne_bytes(buf), 0xDEAD_BEEF);
        assert!(tx.commit());
        let mut check = region.begin(true);
        check.read(start, &mut buf).unwrap();
        assert!(check.commit());
        assert_eq!(u64::from_ne_bytes(buf), 0xDEAD_BEEF);
    }

    #[test]
    fn multi_word_accesses_move_whole_runs() {
        let region = Region::new(32, 8).unwrap();
        let start = region.start();
        let payload: Vec<u8> = (0..32).collect();
        region.rw(|tx| tx.write(&payload, start)).unwrap();

        let mut buf = [0u8; 32];
        let mut tx = region.begin(true);
        tx.read(start, &mut buf).unwrap();
        assert!(tx.commit());
        assert_eq!(&buf[..], &payload[..]);
    }

    #[test]
    fn oversized_allocations_report_out_of_memory_and_survive() {
        let region = Region::new(8, 8).unwrap();
        let start = region.start();
        let mut tx = region.begin(false);
        // the doubled backing buffer cannot be laid out
        assert_eq!(tx.alloc(usize::MAX & !7), Err(Error::OutOfMemory));
        // the transaction is still live
        tx.write(&[3; 8], start).unwrap();
        assert!(tx.commit());
        assert_eq!(read_u64(&region, start), u64::from_ne_bytes([3; 8]));
    }

    #[test]
    fn reading_an_unmapped_address_aborts() {
        let region = Region::new(8, 8).unwrap();
        let beyond = region.start() + region.size();
        let mut tx = region.begin(false);
        let mut buf = [0u8; 8];
        assert_eq!(tx.read(beyond, &mut buf), Err(Error::Conflict));
        assert!(!tx.commit());
    }

    #[test]
    #[should_panic(expected = "read-only")]
    fn writes_in_read_only_transactions_are_a_caller_bug() {
        let region = Region::new(8, 8).unwrap();
        let start = region.start();
        let mut tx = region.begin(true);
        let _ = tx.write(&[0; 8], start);
    }

    #[test]
    #[should_panic(expected = "initial segment")]
    fn freeing_the_initial_segment_is_a_caller_bug() {
        let region = Region::new(8, 8).unwrap();
        let start = region.start();
        let mut tx = region.begin(false);
        let _ = tx.free(start);
    }
}
