use std::fs;
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use std::sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Arc,
};
use std::thread;
use std::time::Duration;

/// 2023-11-14T22:14:00Z
const T: i64 = 1_700_000_040;

struct MockMexcServer {
    base_url: String,
    requests: Arc<AtomicUsize>,
    stop: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<()>>,
}

impl MockMexcServer {
    fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind mock server");
        let addr = listener.local_addr().expect("local addr");
        let base_url = format!("http://{}", addr);
        let stop = Arc::new(AtomicBool::new(false));
        let requests = Arc::new(AtomicUsize::new(0));
        let stop_clone = stop.clone();
        let requests_clone = requests.clone();

        let handle = thread::spawn(move || {
            listener.set_nonblocking(true).expect("nonblocking");
            while !stop_clone.load(Ordering::Relaxed) {
                match listener.accept() {
                    Ok((mut stream, _)) => {
                        requests_clone.fetch_add(1, Ordering::SeqCst);
                        let _ = handle_connection(&mut stream);
                    }
                    Err(_) => thread::sleep(Duration::from_millis(10)),
                }
            }
        });

        Self {
            base_url,
            requests,
            stop,
            handle: Some(handle),
        }
    }

    fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

impl Drop for MockMexcServer {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn handle_connection(stream: &mut TcpStream) -> Result<(), String> {
    stream.set_nonblocking(false).map_err(|e| e.to_string())?;
    stream
        .set_read_timeout(Some(Duration::from_secs(2)))
        .map_err(|e| e.to_string())?;

    let mut buf = Vec::new();
    let mut tmp = [0u8; 1024];
    loop {
        let n = stream.read(&mut tmp).map_err(|e| e.to_string())?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&tmp[..n]);
        if buf.windows(4).any(|w| w == b"\r\n\r\n") || buf.len() > 8192 {
            break;
        }
    }

    let request = String::from_utf8_lossy(&buf);
    let request_line = request.lines().next().unwrap_or_default();
    let body = if request_line.contains("/api/v1/contract/kline/PEPE_USDT") {
        kline_payload()
    } else if request_line.contains("/api/v1/contract/detail") {
        r#"{"success":true,"code":0,"data":[{"symbol":"PEPE_USDT","baseCoin":"PEPE","quoteCoin":"USDT","futureType":1}]}"#
            .to_string()
    } else {
        r#"{"success":false,"code":1001,"message":"contract does not exist"}"#.to_string()
    };

    let header = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        body.len()
    );
    stream.write_all(header.as_bytes()).map_err(|e| e.to_string())?;
    stream.write_all(body.as_bytes()).map_err(|e| e.to_string())?;
    Ok(())
}

/// Columnar one-minute klines from t-3h to t+5h: flat at 1.0, then +1% per 10 minutes.
fn kline_payload() -> String {
    let times: Vec<i64> = (-180..=300).map(|m| T + m * 60).collect();
    let closes: Vec<f64> = (-180..=300_i64)
        .map(|m| if m <= 0 { 1.0 } else { 1.0 + m as f64 / 1000.0 })
        .collect();
    serde_json::json!({
        "success": true,
        "code": 0,
        "data": { "time": times, "close": closes }
    })
    .to_string()
}

fn write_fixture(dir: &Path, base_url: &str, exchange: &str) -> PathBuf {
    fs::write(
        dir.join("announcements.csv"),
        "source_exchange,ticker,announcement_datetime_utc,title\n\
binance,PEPE,2023-11-14T22:14:20Z,Binance Futures will launch PEPEUSDT\n\
bybit,GHOST,2023-11-14 22:14:00,\n",
    )
    .expect("write announcements");

    let toml = format!(
        r#"[run]
run_id = "e2e"
exchange = "{exchange}"

[paths]
announcements_csv = "announcements.csv"
out_csv = "out/reactions.csv"
audit_jsonl = "out/audit.jsonl"
cache_db = "cache/http.sqlite"

[http]
base_url = "{base_url}"
timeout_ms = 2000
min_interval_ms = 0

[retry]
initial_backoff_ms = 10
max_backoff_ms = 20
"#
    );
    let config_path = dir.join("lens.toml");
    fs::write(&config_path, toml).expect("write config");
    config_path
}

fn run_cli(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_listing-lens"))
        .args(args)
        .env("LENS_LOG", "warn")
        .output()
        .expect("run cli")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).to_string()
}

#[test]
fn run_writes_dataset_and_reuses_the_cache() {
    let server = MockMexcServer::start();
    let dir = tempfile::tempdir().unwrap();
    let config = write_fixture(dir.path(), &server.base_url, "mexc");
    let config = config.to_str().unwrap();

    let output = run_cli(&["run", "--config", config]);
    assert!(output.status.success(), "run failed: {}", String::from_utf8_lossy(&output.stderr));
    assert!(stdout(&output).contains("\"recorded\": 1"));
    // Contract listing, the PEPE page, then GHOST_USDT.
    assert_eq!(server.requests(), 3);

    let csv = fs::read_to_string(dir.path().join("out/reactions.csv")).unwrap();
    let lines: Vec<&str> = csv.lines().collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[1].starts_with("binance,PEPE,PEPE_USDT,2023-11-14T22:14:20Z,1"));

    let audit = fs::read_to_string(dir.path().join("out/audit.jsonl")).unwrap();
    let events: Vec<serde_json::Value> = audit
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0]["action"], "recorded");
    assert_eq!(events[1]["action"], "failed");
    assert!(events[1]["error"].as_str().unwrap().starts_with("symbol_unknown"));

    let again = run_cli(&["run", "--config", config]);
    assert!(again.status.success());
    assert_eq!(server.requests(), 3, "second run must be served from the cache");

    let stats = run_cli(&["cache", "stats", "--config", config]);
    assert!(stats.status.success());
    assert!(stdout(&stats).contains("entries=3 successes=3 errors=0"));

    let cleared = run_cli(&["cache", "clear", "--config", config]);
    assert!(stdout(&cleared).contains("cleared 3 entries"));
}

#[test]
fn check_listing_reports_status() {
    let server = MockMexcServer::start();
    let dir = tempfile::tempdir().unwrap();
    let config = write_fixture(dir.path(), &server.base_url, "mexc");

    let output = run_cli(&[
        "check-listing",
        "--config",
        config.to_str().unwrap(),
        "--ticker",
        "pepe",
        "--at",
        "2023-11-14T22:14:00Z",
    ]);
    assert!(output.status.success());
    assert!(stdout(&output).contains("symbol=PEPE_USDT at=2023-11-14T22:14:00Z status=tradable"));
}

#[test]
fn validate_config_rejects_unsupported_exchange() {
    let dir = tempfile::tempdir().unwrap();
    let ok = write_fixture(dir.path(), "http://127.0.0.1:9", "kucoin");
    let output = run_cli(&["validate-config", "--config", ok.to_str().unwrap()]);
    assert!(output.status.success());
    assert!(stdout(&output).contains("announcements: 2 row(s) parsed"));

    let bad = write_fixture(dir.path(), "http://127.0.0.1:9", "binance");
    let output = run_cli(&["validate-config", "--config", bad.to_str().unwrap()]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("error: unsupported exchange"));
}

#[test]
fn cache_invalidate_rejects_malformed_fingerprint() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_fixture(dir.path(), "http://127.0.0.1:9", "mexc");
    let output = run_cli(&[
        "cache",
        "invalidate",
        "--config",
        config.to_str().unwrap(),
        "--fingerprint",
        "abc",
    ]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("invalid fingerprint"));
}
