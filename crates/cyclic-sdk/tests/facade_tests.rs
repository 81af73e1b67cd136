//! SDK 端到端测试：发送器把每一帧交给日志器记录

use cyclic_sdk::prelude::*;
use serial_test::serial;
use std::fs;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

fn file_logger(dir: &std::path::Path) -> Arc<AsyncLogger> {
    let logger = Arc::new(AsyncLogger::new());
    logger
        .configure(
            LoggerConfig::default()
                .with_log_dir(dir)
                .with_base_file_name("bench")
                .with_name_pattern(NamePattern::BaseExt)
                .with_log_tag("TX"),
        )
        .unwrap();
    logger.start().unwrap();
    logger
}

#[test]
#[serial]
fn test_period_sender_records_frames() {
    let dir = tempfile::tempdir().unwrap();
    let logger = file_logger(dir.path());

    let sender = PeriodSender::new();
    let sent = Arc::new(AtomicUsize::new(0));
    {
        let logger = Arc::clone(&logger);
        let sent = Arc::clone(&sent);
        sender.set_sink(move |data: &[u8], ctx: &SendContext| {
            logger.log_hex(&format!("{} ", ctx.key), data);
            sent.fetch_add(1, Ordering::Relaxed);
            data.len() as i32
        });
    }
    sender
        .add_frame(SendFrame::new(FrameKey::new(1, 0, 0x7E0), vec![0x02, 0x3E, 0x00]).with_period(10))
        .unwrap();

    thread::sleep(Duration::from_millis(200));
    sender.stop();
    logger.stop();

    let content = fs::read_to_string(dir.path().join("bench.log")).unwrap();
    let lines: Vec<&str> = content.lines().collect();
    assert_eq!(lines.len(), sent.load(Ordering::Relaxed));
    assert!(lines.len() >= 10, "only {} frames", lines.len());
    assert!(lines.iter().all(|line| *line == "[TX] 0001:0000:000007E0 02 3E 00"));
}

#[test]
#[serial]
fn test_sequence_sender_completes() {
    let sequence = SequenceSender::new();
    let (done_tx, done_rx) = crossbeam_channel::bounded(1);
    sequence.set_sink(|data: &[u8], _ctx: &SendContext| data.len() as i32);
    sequence.set_completion(move |code| {
        let _ = done_tx.try_send(code);
    });
    sequence.set_config(SequenceConfig {
        is_forever: false,
        repeat_count: 2,
        round_end_delay_ms: 5,
    });

    let frames = (0..3)
        .map(|i| SendFrame::new(FrameKey::new(2, 0, i), bytes::Bytes::from_static(b"\x10\x01")).with_delay(2))
        .collect();
    sequence.start(frames).unwrap();

    let code = done_rx.recv_timeout(Duration::from_secs(2)).unwrap();
    assert_eq!(code, EXIT_COMPLETED);
    assert_eq!(sequence.metrics().frames_sent, 6);
}
