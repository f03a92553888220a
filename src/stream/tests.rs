//! Reader-side behavior of input streams

use super::*;
use crate::buffer::SharedBuffer;
use crate::test_utils::{FIXTURE_XDELTA, fixture_sri, init_tracing, packet_time, push_ramp, ramp, started_port};
use crate::types::{PrecisionTime, SriChangeFlags, StreamSri};
use crate::{InPort, PortConfig};

use futures::StreamExt;
use proptest::prelude::*;
use std::time::Duration;

fn stream(port: &InPort<f32>, stream_id: &str) -> InputStream<f32> {
    port.stream(stream_id).expect("stream should be active")
}

mod sized_reads {
    use super::*;

    #[test]
    fn read_spans_packets_with_real_timestamps() {
        let port = started_port();
        push_ramp(&port, "s", 3, 4, false);
        let s = stream(&port, "s");

        let block = s.read_count(10).unwrap();
        assert_eq!(block.data(), ramp(0..10).as_slice());

        let timestamps = block.timestamps();
        let offsets: Vec<usize> = timestamps.iter().map(|t| t.offset).collect();
        assert_eq!(offsets, vec![0, 4, 8]);
        assert!(timestamps.iter().all(|t| !t.synthetic));
        assert_eq!(timestamps[1].time, packet_time(1, 4));
        assert_eq!(block.start_time().unwrap(), packet_time(0, 4));
        assert_eq!(block.net_time_drift().unwrap(), 0.0);
    }

    #[test]
    fn mid_packet_start_gets_synthetic_timestamp() {
        let port = started_port();
        push_ramp(&port, "s", 2, 4, false);
        let s = stream(&port, "s");

        assert_eq!(s.read_count(3).unwrap().size(), 3);
        let block = s.read_count(3).unwrap();
        assert_eq!(block.data(), ramp(3..6).as_slice());

        let timestamps = block.timestamps();
        assert_eq!(timestamps.len(), 2);
        assert!(timestamps[0].synthetic);
        assert_eq!(timestamps[0].time, packet_time(0, 4) + 3.0 * FIXTURE_XDELTA);
        assert_eq!(timestamps[1].offset, 1);
        assert!(!timestamps[1].synthetic);
    }

    #[test]
    fn consecutive_reads_concatenate_to_pushed_data() {
        let port = started_port();
        push_ramp(&port, "s", 5, 7, true);
        let s = stream(&port, "s");

        let mut collected = Vec::new();
        while let Some(block) = s.read_count(3) {
            collected.extend_from_slice(block.data());
        }
        assert_eq!(collected, ramp(0..35));
        assert!(s.eos());
    }

    #[test]
    fn zero_count_returns_empty_block() {
        let port = started_port();
        push_ramp(&port, "s", 1, 4, false);
        let s = stream(&port, "s");

        let block = s.read_count(0).unwrap();
        assert_eq!(block.size(), 0);
        assert_eq!(s.read_count(4).unwrap().data(), ramp(0..4).as_slice());
    }

    #[test]
    fn skip_discards_without_reading() {
        let port = started_port();
        push_ramp(&port, "s", 2, 4, false);
        let s = stream(&port, "s");

        assert_eq!(s.skip(5), 5);
        let block = s.read_count(3).unwrap();
        assert_eq!(block.data(), ramp(5..8).as_slice());
        assert!(block.timestamps()[0].synthetic);
    }

    #[test]
    fn skip_stops_at_sri_change() {
        let port = started_port();
        push_ramp(&port, "s", 1, 4, false);
        port.push_sri(fixture_sri("s").with_xdelta(2.0));
        port.push_packet(vec![9.0], PrecisionTime::now(), false, "s");
        let s = stream(&port, "s");

        assert_eq!(s.skip(10), 4);
        let block = s.read().unwrap();
        assert!(block.sri_change_flags().contains(SriChangeFlags::XDELTA));
    }

    #[test]
    fn blocking_read_waits_for_data() {
        let port = std::sync::Arc::new(started_port::<f32>());
        port.push_sri(fixture_sri("s"));
        let s = stream(&port, "s");

        let producer = {
            let port = std::sync::Arc::clone(&port);
            std::thread::spawn(move || {
                std::thread::sleep(Duration::from_millis(20));
                port.push_packet(vec![1.0, 2.0], packet_time(0, 2), false, "s");
                std::thread::sleep(Duration::from_millis(20));
                port.push_packet(vec![3.0, 4.0], packet_time(1, 2), false, "s");
            })
        };

        let block = s.read_count(4).unwrap();
        producer.join().unwrap();
        assert_eq!(block.data(), &[1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn queries_answer_while_read_blocks() {
        let port = std::sync::Arc::new(started_port::<f32>());
        port.push_sri(fixture_sri("s"));
        let s = stream(&port, "s");

        let reader = {
            let s = s.clone();
            std::thread::spawn(move || s.read_count(4))
        };
        std::thread::sleep(Duration::from_millis(20));

        let started = std::time::Instant::now();
        assert_eq!(s.state(), StreamState::Active);
        assert_eq!(s.samples_available(), 0);
        assert!(!s.ready());
        assert!(!s.eos());
        assert!(port.current_stream(Some(Duration::from_millis(20))).is_none());
        assert!(started.elapsed() < Duration::from_millis(500));

        port.push_packet(vec![1.0, 2.0, 3.0, 4.0], packet_time(0, 4), false, "s");
        assert_eq!(reader.join().unwrap().unwrap().data(), &[1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn disable_ends_blocked_read() {
        let port = std::sync::Arc::new(started_port::<f32>());
        port.push_sri(fixture_sri("s"));
        let s = stream(&port, "s");

        let reader = {
            let s = s.clone();
            std::thread::spawn(move || s.read_count(4))
        };
        std::thread::sleep(Duration::from_millis(20));
        s.disable();
        assert!(reader.join().unwrap().is_none());
    }
}

mod overlap {
    use super::*;

    #[test]
    fn unconsumed_samples_are_read_again() {
        let port = started_port();
        push_ramp(&port, "s", 3, 4, false);
        let s = stream(&port, "s");

        let first = s.read_overlap(6, 4).unwrap().unwrap();
        assert_eq!(first.data(), ramp(0..6).as_slice());

        let second = s.read_overlap(6, 4).unwrap().unwrap();
        assert_eq!(second.data(), ramp(4..10).as_slice());
        assert!(!second.timestamps()[0].synthetic);
        assert_eq!(second.start_time().unwrap(), packet_time(1, 4));
    }

    #[test]
    fn consume_greater_than_count_is_rejected() {
        let port = started_port();
        push_ramp(&port, "s", 1, 4, false);
        let s = stream(&port, "s");

        let error = s.read_overlap(2, 3).unwrap_err();
        assert!(matches!(error, StreamError::PreconditionViolation { .. }));
        assert!(s.try_read_overlap(2, 3).is_err());
        // Nothing was consumed by the failed calls
        assert_eq!(s.read_count(4).unwrap().data(), ramp(0..4).as_slice());
    }

    #[test]
    fn truncated_overlap_consumes_everything() {
        let port = started_port();
        push_ramp(&port, "s", 1, 4, true);
        let s = stream(&port, "s");

        let block = s.read_overlap(6, 2).unwrap().unwrap();
        assert_eq!(block.size(), 4);
        assert!(s.read_overlap(6, 2).unwrap().is_none());
        assert!(s.eos());
    }
}

mod boundaries {
    use super::*;

    #[test]
    fn sri_change_truncates_read() {
        let port = started_port();
        push_ramp(&port, "s", 1, 4, false);
        port.push_sri(fixture_sri("s").with_xdelta(0.125));
        port.push_packet(vec![10.0, 11.0, 12.0], PrecisionTime::new(200.0, 0.0), false, "s");
        let s = stream(&port, "s");

        let before = s.read_count(6).unwrap();
        assert_eq!(before.data(), ramp(0..4).as_slice());
        assert_eq!(before.xdelta(), FIXTURE_XDELTA);

        let after = s.read_count(6).unwrap();
        assert_eq!(after.data(), &[10.0, 11.0, 12.0]);
        assert!(after.sri_changed());
        assert!(after.sri_change_flags().contains(SriChangeFlags::XDELTA));
        assert_eq!(after.xdelta(), 0.125);
        assert_eq!(s.sri().xdelta, 0.125);
        assert_eq!(after.start_time().unwrap(), PrecisionTime::new(200.0, 0.0));
    }

    #[test]
    fn change_flags_are_reported_once() {
        let port = started_port();
        push_ramp(&port, "s", 2, 4, false);
        let s = stream(&port, "s");

        let first = s.read_count(2).unwrap();
        assert_eq!(first.sri_change_flags(), SriChangeFlags::ALL);
        let second = s.read_count(2).unwrap();
        assert!(!second.sri_changed());
    }

    #[test]
    fn queue_flush_is_reported_and_truncates() {
        let port = InPort::<f32>::with_config(PortConfig::new("small").with_max_queue_depth(2));
        port.start();
        port.push_sri(fixture_sri("s"));
        port.push_packet(vec![0.0, 1.0], packet_time(0, 2), false, "s");

        let s = stream(&port, "s");
        assert_eq!(s.read_count(1).unwrap().data(), &[0.0]);

        port.push_packet(vec![2.0, 3.0], packet_time(1, 2), false, "s");
        port.push_packet(vec![4.0, 5.0], packet_time(2, 2), false, "s");
        port.push_packet(vec![6.0, 7.0], packet_time(3, 2), false, "s");

        let held = s.read_count(8).unwrap();
        assert_eq!(held.data(), &[1.0]);
        assert!(!held.input_queue_flushed());

        let after = s.read_count(8).unwrap();
        assert_eq!(after.data(), &[6.0, 7.0]);
        assert!(after.input_queue_flushed());
    }

    #[test]
    fn empty_packets_pass_their_flags_on() {
        let port = started_port();
        port.push_sri(fixture_sri("s"));
        port.push_packet(Vec::<f32>::new(), PrecisionTime::now(), false, "s");
        port.push_packet(vec![1.0], PrecisionTime::now(), false, "s");
        let s = stream(&port, "s");

        let block = s.read().unwrap();
        assert_eq!(block.data(), &[1.0]);
        assert_eq!(block.sri_change_flags(), SriChangeFlags::ALL);
    }
}

mod non_blocking {
    use super::*;

    #[test]
    fn try_read_count_on_empty_stream() {
        let port = started_port::<f32>();
        port.push_sri(fixture_sri("s"));
        let s = stream(&port, "s");

        assert!(s.try_read_count(4).is_none());
        assert!(s.try_read().is_none());
        assert_eq!(s.state(), StreamState::Active);
    }

    #[test]
    fn try_read_count_waits_for_full_request() {
        let port = started_port();
        push_ramp(&port, "s", 1, 4, false);
        let s = stream(&port, "s");

        assert!(s.try_read_count(6).is_none());
        port.push_packet(vec![4.0, 5.0], packet_time(1, 4), false, "s");
        assert_eq!(s.try_read_count(6).unwrap().data(), ramp(0..6).as_slice());
    }

    #[test]
    fn try_read_count_returns_partial_block_at_end() {
        let port = started_port();
        push_ramp(&port, "s", 1, 4, true);
        let s = stream(&port, "s");

        assert_eq!(s.try_read_count(6).unwrap().size(), 4);
        assert!(s.try_read_count(6).is_none());
        assert_eq!(s.state(), StreamState::Closed);
    }

    #[test]
    fn samples_available_stops_at_boundary() {
        let port = started_port();
        push_ramp(&port, "s", 2, 4, false);
        port.push_sri(fixture_sri("s").with_xdelta(1.0));
        port.push_packet(vec![0.0; 3], PrecisionTime::now(), false, "s");
        let s = stream(&port, "s");

        assert_eq!(s.samples_available(), 8);
        assert!(s.ready());
        s.read_count(5).unwrap();
        assert_eq!(s.samples_available(), 3);
        assert_eq!(s.read_count(5).unwrap().size(), 3);
        assert_eq!(s.samples_available(), 3);
        s.read_count(3).unwrap();
        assert_eq!(s.samples_available(), 0);
        assert!(!s.ready());
    }
}

mod end_of_stream {
    use super::*;

    #[test]
    fn eos_retires_stream() {
        init_tracing();
        let port = started_port();
        push_ramp(&port, "s", 1, 4, true);
        let s = stream(&port, "s");

        assert!(!s.eos());
        assert_eq!(s.read().unwrap().size(), 4);
        assert_eq!(s.state(), StreamState::EndOfStream);
        assert!(port.stream("s").is_some());

        assert!(s.eos());
        assert_eq!(s.state(), StreamState::Closed);
        assert!(port.stream("s").is_none());
        assert!(s.read().is_none());
        assert!(s.eos());
    }

    #[test]
    fn empty_eos_packet_is_seen_without_read() {
        let port = started_port();
        push_ramp(&port, "s", 1, 4, false);
        port.push_packet(Vec::<f32>::new(), PrecisionTime::now(), true, "s");
        let s = stream(&port, "s");

        s.read().unwrap();
        assert!(s.eos());
        assert!(port.stream("s").is_none());
    }

    #[test]
    fn read_returning_none_at_end_retires_stream() {
        let port = started_port();
        push_ramp(&port, "s", 1, 2, false);
        port.push_packet(Vec::<f32>::new(), PrecisionTime::now(), true, "s");
        let s = stream(&port, "s");

        s.read().unwrap();
        assert!(s.read().is_none());
        assert_eq!(s.state(), StreamState::Closed);
        assert!(port.stream("s").is_none());
    }

    #[test]
    fn pending_successor_is_promoted() {
        let port = started_port();
        push_ramp(&port, "s", 1, 2, true);
        port.push_sri(fixture_sri("s").with_complex(true));
        port.push_packet(vec![1.0, 2.0, 3.0, 4.0], PrecisionTime::now(), false, "s");

        let first = stream(&port, "s");
        assert!(!first.sri().is_complex());
        assert_eq!(first.read_count(10).unwrap().size(), 2);
        assert!(first.read_count(10).is_none());

        let second = stream(&port, "s");
        assert_ne!(first, second);
        let block = second.read().unwrap();
        assert!(block.is_complex());
        assert_eq!(block.sri_change_flags(), SriChangeFlags::ALL);
        assert_eq!(block.cxsize(), 2);
    }

    #[test]
    fn stopped_port_ends_blocking_read() {
        let port = std::sync::Arc::new(started_port::<f32>());
        port.push_sri(fixture_sri("s"));
        let s = stream(&port, "s");

        let reader = std::thread::spawn(move || s.read_count(4));
        std::thread::sleep(Duration::from_millis(20));
        port.stop();
        assert!(reader.join().unwrap().is_none());
    }
}

mod enable_disable {
    use super::*;

    #[test]
    fn disable_discards_queued_and_buffered_data() {
        let port = started_port();
        push_ramp(&port, "s", 3, 4, false);
        let s = stream(&port, "s");

        s.read_overlap(2, 0).unwrap();
        s.disable();
        assert!(!s.enabled());
        assert_eq!(s.state(), StreamState::Disabled);
        assert_eq!(port.queue_depth(), 0);
        assert!(s.read().is_none());

        port.push_packet(vec![1.0], PrecisionTime::now(), false, "s");
        assert_eq!(port.queue_depth(), 0);

        s.enable();
        port.push_packet(vec![2.0], PrecisionTime::now(), false, "s");
        assert_eq!(s.read().unwrap().data(), &[2.0]);
    }

    #[test]
    fn sri_change_while_disabled_is_reported_after_enable() {
        let port = started_port();
        port.push_sri(fixture_sri("s"));
        port.push_packet(vec![1.0], packet_time(0, 1), false, "s");
        let s = stream(&port, "s");
        s.read().unwrap();

        s.disable();
        port.push_sri(fixture_sri("s").with_xdelta(0.125));
        port.push_packet(vec![2.0], packet_time(1, 1), false, "s");
        s.enable();
        port.push_packet(vec![3.0], packet_time(2, 1), false, "s");

        let block = s.read().unwrap();
        assert_eq!(block.data(), &[3.0]);
        assert_eq!(block.xdelta(), 0.125);
        assert!(block.sri_changed());
        assert!(block.sri_change_flags().contains(SriChangeFlags::XDELTA));
    }

    #[test]
    fn disabled_stream_still_ends() {
        let port = started_port();
        push_ramp(&port, "s", 2, 4, true);
        let s = stream(&port, "s");

        s.disable();
        s.enable();
        assert!(s.read().is_none());
        assert!(s.eos());
        assert!(port.stream("s").is_none());
    }

    #[test]
    fn other_streams_are_unaffected() {
        let port = started_port();
        push_ramp(&port, "a", 2, 4, false);
        push_ramp(&port, "b", 2, 4, false);

        stream(&port, "a").disable();
        assert_eq!(port.queue_depth(), 2);
        assert_eq!(stream(&port, "b").read_count(8).unwrap().data(), ramp(0..8).as_slice());
    }
}

mod complex {
    use super::*;

    fn complex_port() -> InPort<f32> {
        let port = started_port();
        port.push_sri(fixture_sri("cx").with_complex(true));
        port.push_packet(ramp(0..8), packet_time(0, 4), false, "cx");
        port.push_packet(ramp(8..16), packet_time(1, 4), false, "cx");
        port
    }

    #[test]
    fn counts_are_in_complex_samples() {
        let port = complex_port();
        let s = stream(&port, "cx");

        assert_eq!(s.samples_available(), 8);
        let block = s.read_count(3).unwrap();
        assert_eq!(block.size(), 6);
        assert_eq!(block.cxsize(), 3);
        let cx = block.cxdata().unwrap();
        assert_eq!(cx[2].re, 4.0);
        assert_eq!(cx[2].im, 5.0);
    }

    #[test]
    fn unbounded_count_reads_to_end_of_stream() {
        let port = complex_port();
        port.push_packet(Vec::new(), packet_time(2, 4), true, "cx");
        let s = stream(&port, "cx");

        let block = s.read_count(usize::MAX).unwrap();
        assert_eq!(block.cxsize(), 8);
        assert!(s.read_count(usize::MAX).is_none());
        assert!(s.eos());

        let port = complex_port();
        port.push_packet(Vec::new(), packet_time(2, 4), true, "cx");
        assert_eq!(stream(&port, "cx").skip(usize::MAX), 8);
    }

    #[test]
    fn timestamp_offsets_are_in_complex_samples() {
        let port = complex_port();
        let s = stream(&port, "cx");

        s.skip(1);
        let block = s.read_count(4).unwrap();
        let timestamps = block.timestamps();
        assert_eq!(timestamps[0].time, packet_time(0, 4) + FIXTURE_XDELTA);
        assert!(timestamps[0].synthetic);
        assert_eq!(timestamps[1].offset, 3);
        assert_eq!(timestamps[1].time, packet_time(1, 4));
    }

    #[test]
    fn record_streams_ignore_complex_mode() {
        let port = started_port::<String>();
        port.push_sri(StreamSri::new("rec").with_complex(true));
        port.push_packet(
            vec!["a".to_string(), "b".to_string(), "c".to_string()],
            PrecisionTime::now(),
            false,
            "rec",
        );
        let s = port.stream("rec").unwrap();

        assert_eq!(s.samples_available(), 3);
        assert_eq!(s.read_count(1).unwrap().data(), &["a".to_string()]);
    }
}

mod zero_copy {
    use super::*;

    #[test]
    fn whole_packet_read_shares_buffer() {
        let port = started_port();
        port.push_sri(fixture_sri("s"));
        let pushed = SharedBuffer::from_vec(ramp(0..16));
        port.push_packet(pushed.clone(), PrecisionTime::now(), false, "s");

        let block = stream(&port, "s").read().unwrap();
        assert!(block.buffer().ptr_eq(&pushed));
    }

    #[test]
    fn writing_a_block_leaves_producer_data_intact() {
        let port = started_port();
        port.push_sri(fixture_sri("s"));
        let pushed = SharedBuffer::from_vec(ramp(0..4));
        port.push_packet(pushed.clone(), PrecisionTime::now(), false, "s");

        let mut block = stream(&port, "s").read().unwrap();
        block.data_mut()[0] = -1.0;
        assert_eq!(pushed.as_slice(), ramp(0..4).as_slice());
        assert_eq!(block.data()[0], -1.0);
    }
}

mod handles {
    use super::*;

    #[test]
    fn clones_alias_the_same_stream() {
        let port = started_port();
        push_ramp(&port, "s", 1, 4, false);
        let a = stream(&port, "s");
        let b = a.clone();

        assert_eq!(a, b);
        a.read_count(2).unwrap();
        assert_eq!(b.read_count(2).unwrap().data(), &[2.0, 3.0]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn blocks_yields_until_end_of_stream() {
        let port = started_port();
        push_ramp(&port, "s", 3, 4, true);
        let s = stream(&port, "s");

        let sizes: Vec<usize> = s.blocks(5).map(|block| block.size()).collect().await;
        assert_eq!(sizes, vec![5, 5, 2]);
        assert!(port.stream("s").is_none());
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_sized_reads_reassemble_packets(
        packet_lens in prop::collection::vec(1usize..20, 1..10),
        read_len in 1usize..25,
    ) {
        let port = started_port::<f32>();
        port.push_sri(fixture_sri("s"));
        let mut next = 0usize;
        for (index, len) in packet_lens.iter().enumerate() {
            let last = index + 1 == packet_lens.len();
            let time = PrecisionTime::new(100.0, 0.0) + next as f64 * FIXTURE_XDELTA;
            port.push_packet(ramp(next..next + len), time, last, "s");
            next += len;
        }

        let s = stream(&port, "s");
        let mut collected = Vec::new();
        while let Some(block) = s.read_count(read_len) {
            prop_assert!(block.size() <= read_len);
            let timestamps = block.timestamps();
            prop_assert_eq!(timestamps[0].offset, 0);
            prop_assert!(timestamps.windows(2).all(|w| w[0].offset <= w[1].offset));
            prop_assert!(timestamps.iter().skip(1).all(|t| !t.synthetic));
            // Evenly spaced packets never drift
            prop_assert!(block.net_time_drift().unwrap().abs() < 1e-9);

            let expected_start = PrecisionTime::new(100.0, 0.0) + collected.len() as f64 * FIXTURE_XDELTA;
            prop_assert!((block.start_time().unwrap() - expected_start).abs() < 1e-9);
            collected.extend_from_slice(block.data());
        }
        prop_assert_eq!(collected, ramp(0..next));
        prop_assert!(s.eos());
    }

    #[test]
    fn prop_overlap_rereads_tail(
        count in 1usize..12,
        overlap in 0usize..12,
    ) {
        let consume = count - overlap.min(count);
        let port = started_port::<f32>();
        push_ramp(&port, "s", 4, 8, false);
        let s = stream(&port, "s");

        let first = s.read_overlap(count, consume).unwrap().unwrap();
        let second = s.read_count(count).unwrap();
        let head = ramp(0..count);
        let reread = ramp(consume..consume + count);
        prop_assert_eq!(first.data(), head.as_slice());
        prop_assert_eq!(second.data(), reread.as_slice());
    }
}
