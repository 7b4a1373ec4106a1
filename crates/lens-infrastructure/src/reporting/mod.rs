use chrono::{DateTime, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use lens_domain::repositories::dataset::DatasetSink;
use lens_domain::services::audit::AuditEvent;
use lens_domain::value_objects::announcement::AnnouncementEvent;
use lens_domain::value_objects::reaction::{Horizon, PricePoint, ReactionRecord};
use serde::Deserialize;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

#[derive(Debug, Deserialize)]
struct AnnouncementRow {
    source_exchange: String,
    ticker: String,
    announcement_datetime_utc: String,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    url: Option<String>,
}

pub fn read_announcements_csv(path: &Path) -> Result<Vec<AnnouncementEvent>, String> {
    let file = File::open(path)
        .map_err(|err| format!("failed to open announcements CSV {}: {}", path.display(), err))?;
    let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(file);

    let mut events = Vec::new();
    for (idx, result) in reader.deserialize::<AnnouncementRow>().enumerate() {
        let line = idx + 2;
        let row = result.map_err(|err| format!("failed to parse announcements row {line}: {err}"))?;
        if row.ticker.is_empty() {
            return Err(format!("announcements row {line}: empty ticker"));
        }
        let announced_at = parse_timestamp(&row.announcement_datetime_utc)
            .map_err(|err| format!("announcements row {line}: {err}"))?;
        let mut event = AnnouncementEvent::new(row.source_exchange, row.ticker, announced_at);
        event.title = row.title.filter(|t| !t.is_empty());
        event.url = row.url.filter(|u| !u.is_empty());
        events.push(event);
    }
    Ok(events)
}

/// RFC 3339, `YYYY-MM-DD HH:MM:SS[+zz]` or naive UTC.
pub fn parse_timestamp(value: &str) -> Result<i64, String> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Ok(dt.timestamp());
    }
    if let Ok(dt) = DateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S%z") {
        return Ok(dt.timestamp());
    }
    for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
            return Ok(Utc.from_utc_datetime(&naive).timestamp());
        }
    }
    Err(format!("unsupported timestamp format: {}", value))
}

pub fn format_timestamp(timestamp: i64) -> String {
    DateTime::<Utc>::from_timestamp(timestamp, 0)
        .map(|dt| dt.to_rfc3339_opts(SecondsFormat::Secs, true))
        .unwrap_or_default()
}

pub fn reaction_csv_header(horizons: &[Horizon]) -> Vec<String> {
    let mut header: Vec<String> = [
        "source_exchange",
        "ticker",
        "symbol",
        "announcement_datetime_utc",
        "baseline_price",
        "baseline_time_utc",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();
    header.extend(horizons.iter().map(|h| format!("return_{}", h.label())));
    header.extend(
        [
            "data_sufficiency",
            "pre_ma5",
            "max_price_1_close",
            "max_price_1_time_utc",
            "lowest_after_1_close",
            "lowest_after_1_time_utc",
            "max_price_2_close",
            "max_price_2_time_utc",
            "lowest_after_2_close",
            "lowest_after_2_time_utc",
            "notes",
        ]
        .iter()
        .map(|s| s.to_string()),
    );
    header
}

fn optional(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

fn point_cells(point: Option<PricePoint>) -> [String; 2] {
    match point {
        Some(p) => [p.close.to_string(), format_timestamp(p.time)],
        None => [String::new(), String::new()],
    }
}

/// Cells in [`reaction_csv_header`] order. Missing values are empty.
pub fn reaction_csv_row(
    announcement: &AnnouncementEvent,
    record: &ReactionRecord,
    horizons: &[Horizon],
) -> Vec<String> {
    let mut row = vec![
        announcement.source_exchange.clone(),
        announcement.ticker.clone(),
        record.symbol.clone(),
        format_timestamp(announcement.announced_at),
        record.baseline.close.to_string(),
        format_timestamp(record.baseline.time),
    ];
    row.extend(horizons.iter().map(|h| optional(record.horizon_return(*h))));
    row.push(record.sufficiency.as_str().to_string());
    row.push(optional(record.pre_ma5));
    let highs = &record.micro_highs;
    for point in [
        highs.micro_high,
        highs.low_after_micro_high,
        highs.window_high,
        highs.low_after_window_high,
    ] {
        row.extend(point_cells(point));
    }
    let notes: Vec<&str> = highs.notes.iter().map(|note| note.as_str()).collect();
    row.push(notes.join("; "));
    row
}

fn write_audit_line(out: &mut impl Write, event: &AuditEvent) -> Result<(), String> {
    let line = serde_json::to_string(event)
        .map_err(|err| format!("failed to serialize audit event: {}", err))?;
    out.write_all(line.as_bytes())
        .and_then(|_| out.write_all(b"\n"))
        .map_err(|err| format!("failed to write audit event: {}", err))
}

fn ensure_parent(path: &Path) -> Result<(), String> {
    match path.parent().filter(|p| !p.as_os_str().is_empty()) {
        Some(parent) => fs::create_dir_all(parent)
            .map_err(|err| format!("failed to create dir {}: {}", parent.display(), err)),
        None => Ok(()),
    }
}

/// Streams reaction rows to CSV and audit events to JSONL, flushing after
/// every write.
pub struct FilesystemDatasetSink {
    reactions: csv::Writer<File>,
    audit: BufWriter<File>,
    horizons: Vec<Horizon>,
    rows: usize,
}

impl FilesystemDatasetSink {
    pub fn create(out_csv: &Path, audit_jsonl: &Path, horizons: &[Horizon]) -> Result<Self, String> {
        ensure_parent(out_csv)?;
        ensure_parent(audit_jsonl)?;
        let mut reactions = csv::Writer::from_path(out_csv)
            .map_err(|err| format!("failed to create reactions csv {}: {}", out_csv.display(), err))?;
        reactions
            .write_record(reaction_csv_header(horizons))
            .and_then(|_| reactions.flush().map_err(csv::Error::from))
            .map_err(|err| format!("failed to write reactions csv header: {}", err))?;
        let audit = File::create(audit_jsonl)
            .map(BufWriter::new)
            .map_err(|err| format!("failed to create audit log {}: {}", audit_jsonl.display(), err))?;
        Ok(Self {
            reactions,
            audit,
            horizons: horizons.to_vec(),
            rows: 0,
        })
    }

    pub fn rows_written(&self) -> usize {
        self.rows
    }
}

impl DatasetSink for FilesystemDatasetSink {
    fn write_record(&mut self, announcement: &AnnouncementEvent, record: &ReactionRecord) -> Result<(), String> {
        self.reactions
            .write_record(reaction_csv_row(announcement, record, &self.horizons))
            .map_err(|err| format!("failed to write reactions row: {}", err))?;
        self.reactions
            .flush()
            .map_err(|err| format!("failed to flush reactions csv: {}", err))?;
        self.rows += 1;
        Ok(())
    }

    fn write_audit(&mut self, event: &AuditEvent) -> Result<(), String> {
        write_audit_line(&mut self.audit, event)?;
        self.audit
            .flush()
            .map_err(|err| format!("failed to flush audit log: {}", err))
    }

    fn finish(&mut self) -> Result<(), String> {
        self.reactions
            .flush()
            .map_err(|err| format!("failed to flush reactions csv: {}", err))?;
        self.audit
            .flush()
            .map_err(|err| format!("failed to flush audit log: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::{
        format_timestamp, parse_timestamp, reaction_csv_header, reaction_csv_row,
        read_announcements_csv, FilesystemDatasetSink,
    };
    use lens_domain::repositories::dataset::DatasetSink;
    use lens_domain::services::audit::{AuditAction, AuditEvent};
    use lens_domain::value_objects::announcement::AnnouncementEvent;
    use lens_domain::value_objects::reaction::{
        DataSufficiency, Horizon, HorizonReturn, MicroHighNote, MicroHighs, PricePoint,
        ReactionRecord,
    };
    use std::fs;

    const T: i64 = 1_700_000_040;

    fn horizons() -> Vec<Horizon> {
        vec![Horizon::parse("5m").unwrap(), Horizon::parse("4h").unwrap()]
    }

    fn record() -> ReactionRecord {
        let hs = horizons();
        ReactionRecord {
            symbol: "PEPE_USDT".to_string(),
            announced_at: T,
            baseline: PricePoint { time: T, close: 100.0 },
            horizons: vec![
                HorizonReturn {
                    horizon: hs[0],
                    value: Some(0.1),
                    observed: Some(PricePoint {
                        time: T + 300,
                        close: 110.0,
                    }),
                },
                HorizonReturn {
                    horizon: hs[1],
                    value: None,
                    observed: None,
                },
            ],
            sufficiency: DataSufficiency::Partial,
            pre_ma5: None,
            micro_highs: MicroHighs {
                window_high: Some(PricePoint {
                    time: T + 300,
                    close: 110.0,
                }),
                notes: vec![MicroHighNote::WindowHighAtEnd, MicroHighNote::NoConfirmedMicroHighs],
                ..MicroHighs::default()
            },
        }
    }

    #[test]
    fn timestamps_parse_in_supported_formats() {
        assert_eq!(parse_timestamp("2023-11-14T22:14:00Z").unwrap(), T);
        assert_eq!(parse_timestamp("2023-11-14 22:14:00").unwrap(), T);
        assert_eq!(parse_timestamp("2023-11-15 00:14:00+0200").unwrap(), T);
        assert!(parse_timestamp("yesterday").is_err());
        assert_eq!(format_timestamp(T), "2023-11-14T22:14:00Z");
    }

    #[test]
    fn row_matches_header_and_leaves_missing_cells_empty() {
        let header = reaction_csv_header(&horizons());
        let event = AnnouncementEvent::new("binance", "pepe", T);
        let row = reaction_csv_row(&event, &record(), &horizons());
        assert_eq!(header.len(), row.len());

        let cell = |name: &str| {
            let idx = header.iter().position(|h| h == name).unwrap();
            row[idx].clone()
        };
        assert_eq!(cell("ticker"), "PEPE");
        assert_eq!(cell("return_5m"), "0.1");
        assert_eq!(cell("return_240m"), "");
        assert_eq!(cell("data_sufficiency"), "partial");
        assert_eq!(cell("pre_ma5"), "");
        assert_eq!(cell("max_price_2_close"), "110");
        assert_eq!(cell("max_price_2_time_utc"), "2023-11-14T22:19:00Z");
        assert_eq!(cell("max_price_1_close"), "");
        assert_eq!(cell("lowest_after_1_time_utc"), "");
        assert_eq!(
            cell("notes"),
            "window high at end of window; no confirmed micro highs"
        );
    }

    #[test]
    fn reads_announcements_with_optional_columns() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("announcements.csv");
        fs::write(
            &path,
            "source_exchange,ticker,announcement_datetime_utc,title,url\n\
             binance, pepe ,2023-11-14T22:14:30Z,PEPE perp listing,\n\
             bybit,WIF,2023-11-14 22:20:00,,https://example.test/a\n",
        )
        .unwrap();
        let events = read_announcements_csv(&path).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].ticker, "PEPE");
        assert_eq!(events[0].announced_at, T + 30);
        assert_eq!(events[0].title.as_deref(), Some("PEPE perp listing"));
        assert!(events[0].url.is_none());
        assert_eq!(events[1].url.as_deref(), Some("https://example.test/a"));
    }

    #[test]
    fn bad_timestamp_reports_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("announcements.csv");
        fs::write(
            &path,
            "source_exchange,ticker,announcement_datetime_utc\nbinance,PEPE,soon\n",
        )
        .unwrap();
        let err = read_announcements_csv(&path).unwrap_err();
        assert!(err.contains("row 2"), "{err}");
    }

    #[test]
    fn sink_streams_rows_and_audit() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out").join("reactions.csv");
        let audit = dir.path().join("out").join("audit.jsonl");
        let mut sink = FilesystemDatasetSink::create(&out, &audit, &horizons()).unwrap();

        let event = AnnouncementEvent::new("binance", "PEPE", T);
        sink.write_record(&event, &record()).unwrap();
        sink.write_audit(&AuditEvent {
            run_id: "run".to_string(),
            timestamp: 0,
            stage: "reaction".to_string(),
            source_exchange: "binance".to_string(),
            ticker: "PEPE".to_string(),
            symbol: Some("PEPE_USDT".to_string()),
            announced_at: T,
            action: AuditAction::Recorded,
            error: None,
            details: serde_json::json!({"sufficiency": "partial"}),
        })
        .unwrap();
        sink.finish().unwrap();
        assert_eq!(sink.rows_written(), 1);

        let csv_text = fs::read_to_string(&out).unwrap();
        assert_eq!(csv_text.lines().count(), 2);
        assert!(csv_text.starts_with("source_exchange,ticker,symbol"));
        let audit_text = fs::read_to_string(&audit).unwrap();
        assert!(audit_text.contains("\"action\":\"recorded\""));
    }
}
