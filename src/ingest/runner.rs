use crate::collector::client::CollectorClient;
use crate::collector::influx::InfluxSink;
use crate::ingest::batch::SharedBatch;
use crate::ingest::parser::LineParser;
use crate::ingest::tailer::{LogTailer, TailerError};
use std::time::Duration;
use tracing::{info, warn};

/// Heavy traffic shortens the next poll (bounded below by the floor) so a
/// backlog drains faster without ever busy-looping; idle periods fall back
/// to the base interval.
pub fn adaptive_delay(base: Duration, floor: Duration, records_handled: usize) -> Duration {
    base.saturating_sub(Duration::from_millis(records_handled as u64))
        .max(floor)
}

/// Tail the access log on a fixed, self-adjusting interval, feeding parsed
/// records into the shared batch.
///
/// Returns immediately if the source file is absent at startup: the loop
/// never transitions into tailing, and delivery keeps running as a no-op.
/// Once tailing, a missing or unreadable file is only a per-tick error.
pub async fn run_ingestion(
    mut tailer: LogTailer,
    parser: LineParser,
    batch: SharedBatch,
    base_interval: Duration,
    floor_interval: Duration,
) {
    if !tailer.source_exists() {
        info!(path = %tailer.path().display(), "Access log not present, ingestion idle");
        return;
    }

    info!(path = %tailer.path().display(), "Tailing access log");

    loop {
        let delay = match ingest_tick(&mut tailer, &parser, &batch) {
            Ok(parsed) => adaptive_delay(base_interval, floor_interval, parsed),
            Err(err) => {
                // Fatal to this tick only; retried on the base interval.
                warn!(error = %err, "Access log read failed");
                base_interval
            }
        };

        tokio::time::sleep(delay).await;
    }
}

/// One ingestion tick: read whatever the writer appended, parse it, append
/// to the batch. An empty read hands the file to the rotation check.
/// Returns the number of records parsed.
fn ingest_tick(
    tailer: &mut LogTailer,
    parser: &LineParser,
    batch: &SharedBatch,
) -> Result<usize, TailerError> {
    let text = tailer.read_available()?;

    if text.is_empty() {
        tailer.reclaim_if_idle()?;
        return Ok(0);
    }

    let mut parsed = 0usize;
    let mut hits = 0usize;

    {
        let mut pending = batch.lock().unwrap();
        for line in text.trim().split('\n') {
            if let Some(record) = parser.parse_line(line) {
                if record.cache_hit {
                    hits += 1;
                }
                pending.append(record);
                parsed += 1;
            }
        }
    }

    if parsed > 0 {
        info!(
            parsed = parsed,
            hit_rate = %format!("{:.0}%", hits as f64 / parsed as f64 * 100.0),
            "Parsed valid retrievals"
        );
    }

    Ok(parsed)
}

/// Drain the shared batch on a fixed, self-adjusting interval and submit it
/// to the collector. A failed submission restores the entire in-flight
/// batch ahead of anything appended during the network wait, so every
/// parsed record is delivered at least once.
pub async fn run_delivery(
    batch: SharedBatch,
    client: CollectorClient,
    influx: Option<InfluxSink>,
    base_interval: Duration,
    floor_interval: Duration,
) {
    loop {
        let in_flight = batch.lock().unwrap().take_all();
        let handled = in_flight.len();

        if !in_flight.is_empty() {
            // Secondary sink first, independent of the primary outcome.
            if let Some(sink) = &influx {
                sink.write_points(&in_flight).await;
            }

            match client.submit(&in_flight).await {
                Ok(()) => {
                    info!(
                        count = handled,
                        wallet = client.wallet_address(),
                        "Submitted pending retrievals"
                    );
                }
                Err(err) => {
                    warn!(
                        count = handled,
                        error = %err,
                        "Failed to submit retrievals, retaining for retry"
                    );
                    batch.lock().unwrap().requeue(in_flight);
                }
            }
        }

        tokio::time::sleep(adaptive_delay(base_interval, floor_interval, handled)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::batch::PendingBatch;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_adaptive_delay_bounds() {
        let base = Duration::from_secs(10);
        let floor = Duration::from_secs(1);

        assert_eq!(adaptive_delay(base, floor, 0), base);
        assert_eq!(adaptive_delay(base, floor, 500), Duration::from_millis(9500));
        // Large backlogs hit the floor, never zero.
        assert_eq!(adaptive_delay(base, floor, 1_000_000), floor);
    }

    #[test]
    fn test_ingest_tick_appends_parsed_records() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            "addr=1.2.3.4&&b=100&&r=/ipfs/bafyABC/foo.txt&&s=200&&ucs=HIT"
        )
        .unwrap();
        writeln!(file, "addr=1.2.3.4&&b=50&&r=/health&&s=200&&ucs=MISS").unwrap();
        file.flush().unwrap();

        let mut tailer = LogTailer::new(file.path().to_path_buf(), u64::MAX);
        let parser = LineParser::new(None);
        let batch = PendingBatch::shared();

        let parsed = ingest_tick(&mut tailer, &parser, &batch).unwrap();
        assert_eq!(parsed, 1);
        assert_eq!(batch.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_empty_read_does_not_touch_batch() {
        let file = NamedTempFile::new().unwrap();
        let mut tailer = LogTailer::new(file.path().to_path_buf(), u64::MAX);
        let parser = LineParser::new(None);
        let batch = PendingBatch::shared();

        let parsed = ingest_tick(&mut tailer, &parser, &batch).unwrap();
        assert_eq!(parsed, 0);
        assert!(batch.lock().unwrap().is_empty());
    }

    #[test]
    fn test_sentinel_records_never_reach_batch() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            "addr=1.2.3.4&&b=100&&r=/ipfs/bafyTEST/foo.txt&&s=200&&ucs=HIT"
        )
        .unwrap();
        file.flush().unwrap();

        let mut tailer = LogTailer::new(file.path().to_path_buf(), u64::MAX);
        let parser = LineParser::new(Some("bafyTEST".to_string()));
        let batch = PendingBatch::shared();

        let parsed = ingest_tick(&mut tailer, &parser, &batch).unwrap();
        assert_eq!(parsed, 0);
        assert!(batch.lock().unwrap().is_empty());
    }

    #[test]
    fn test_tick_after_consumed_read_truncates() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            "addr=1.2.3.4&&b=100&&r=/ipfs/bafyABC/foo.txt&&s=200&&ucs=HIT"
        )
        .unwrap();
        file.flush().unwrap();

        let mut tailer = LogTailer::new(file.path().to_path_buf(), u64::MAX);
        let parser = LineParser::new(None);
        let batch = PendingBatch::shared();

        ingest_tick(&mut tailer, &parser, &batch).unwrap();
        // Writer idle: this tick reads nothing and reclaims the file.
        ingest_tick(&mut tailer, &parser, &batch).unwrap();

        assert_eq!(file.as_file().metadata().unwrap().len(), 0);
        assert_eq!(batch.lock().unwrap().len(), 1);
    }
}
