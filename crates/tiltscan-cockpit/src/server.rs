//! [`CockpitServer`] – HTTP front-end for the scan service.
//!
//! Listens on `0.0.0.0:5000` (configurable via [`CockpitServer::with_port`]).
//! Requests are parsed by hand: only the request line matters, headers and
//! bodies are ignored, and every response closes the connection.
//!
//! | Path | Response |
//! |---|---|
//! | `/` | Embedded status page |
//! | `/scan` | `{"status":"started","session":…}` or `{"status":"busy"}` |
//! | `/status` | `{"scanning","progress","completed","total","skipped","state"}` |
//! | `/cancel` | `{"cancelled": bool}` |
//! | `/download_stl` | Mesh of the latest session (ASCII STL) |
//! | `/download_csv` | Raw point cloud of the latest session |
//! | `/heightmap` | Height-grid raster (JSON) |
//!
//! Artifact paths return a JSON 404 until a session has produced them.

use std::net::SocketAddr;

use serde_json::json;
use thiserror::Error;
use tiltscan_runtime::ScanService;
use tiltscan_types::{ScanError, StartOutcome, SweepConfig};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

/// Default TCP port for the cockpit.
pub const DEFAULT_PORT: u16 = 5000;

/// The compiled-in status page.
const COCKPIT_HTML: &str = include_str!("cockpit.html");

/// Upper bound on the request head we are willing to buffer.
const MAX_REQUEST_HEAD: usize = 8 * 1024;

#[derive(Error, Debug)]
pub enum CockpitError {
    #[error("cannot bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Response
// ---------------------------------------------------------------------------

/// A complete HTTP response.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub status: u16,
    pub content_type: &'static str,
    /// File name offered to the browser for downloads.
    pub attachment: Option<&'static str>,
    pub body: Vec<u8>,
}

impl Response {
    fn json(status: u16, value: serde_json::Value) -> Self {
        Self {
            status,
            content_type: "application/json",
            attachment: None,
            body: value.to_string().into_bytes(),
        }
    }

    fn download(content_type: &'static str, name: &'static str, body: String) -> Self {
        Self {
            status: 200,
            content_type,
            attachment: Some(name),
            body: body.into_bytes(),
        }
    }

    fn unavailable(err: &ScanError) -> Self {
        Self::json(404, json!({ "error": err.to_string() }))
    }

    fn reason(&self) -> &'static str {
        match self.status {
            200 => "OK",
            400 => "Bad Request",
            404 => "Not Found",
            405 => "Method Not Allowed",
            _ => "Internal Server Error",
        }
    }

    /// Serialise status line, headers and body.
    pub fn to_bytes(&self, include_body: bool) -> Vec<u8> {
        let mut head = format!(
            "HTTP/1.1 {} {}\r\n\
             Content-Type: {}\r\n\
             Content-Length: {}\r\n\
             Access-Control-Allow-Origin: *\r\n\
             Connection: close\r\n",
            self.status,
            self.reason(),
            self.content_type,
            self.body.len(),
        );
        if let Some(name) = self.attachment {
            head.push_str(&format!(
                "Content-Disposition: attachment; filename=\"{name}\"\r\n"
            ));
        }
        head.push_str("\r\n");
        let mut out = head.into_bytes();
        if include_body {
            out.extend_from_slice(&self.body);
        }
        out
    }
}

// ---------------------------------------------------------------------------
// Routing
// ---------------------------------------------------------------------------

/// Dispatch one request.  `sweep` is the configuration used by `/scan`.
pub fn route(method: &str, target: &str, service: &ScanService, sweep: &SweepConfig) -> Response {
    if method != "GET" && method != "HEAD" && method != "POST" {
        return Response::json(405, json!({ "error": format!("method {method} not allowed") }));
    }
    let path = target.split(['?', '#']).next().unwrap_or(target);

    match path {
        "/" | "/index.html" => Response {
            status: 200,
            content_type: "text/html; charset=utf-8",
            attachment: None,
            body: COCKPIT_HTML.as_bytes().to_vec(),
        },
        "/scan" => match service.start_sweep(sweep.clone()) {
            Ok(StartOutcome::Accepted(id)) => {
                Response::json(200, json!({ "status": "started", "session": id.to_string() }))
            }
            Ok(StartOutcome::Busy) => Response::json(200, json!({ "status": "busy" })),
            Err(e) => Response::json(400, json!({ "status": "error", "error": e.to_string() })),
        },
        "/status" => {
            let snap = service.progress();
            Response::json(
                200,
                json!({
                    "scanning": snap.running,
                    "progress": snap.percent(),
                    "completed": snap.completed,
                    "total": snap.total,
                    "skipped": snap.skipped,
                    "state": snap.state,
                }),
            )
        }
        "/cancel" => Response::json(200, json!({ "cancelled": service.cancel() })),
        "/download_stl" => match service.latest().ok_or(ScanError::NoResult).and_then(|s| s.stl_text()) {
            Ok(stl) => Response::download("model/stl", "scan_mesh.stl", stl),
            Err(e) => Response::unavailable(&e),
        },
        "/download_csv" => match service.latest() {
            Some(session) => Response::download("text/csv", "scan_points.csv", session.csv_text()),
            None => Response::unavailable(&ScanError::NoResult),
        },
        "/heightmap" => match service
            .latest()
            .ok_or(ScanError::NoResult)
            .and_then(|s| s.heightmap_json())
        {
            Ok(body) => Response {
                status: 200,
                content_type: "application/json",
                attachment: None,
                body: body.into_bytes(),
            },
            Err(e) => Response::unavailable(&e),
        },
        _ => Response::json(404, json!({ "error": format!("no route for {path}") })),
    }
}

// ---------------------------------------------------------------------------
// CockpitServer
// ---------------------------------------------------------------------------

/// HTTP server exposing a [`ScanService`].
///
/// # Example
///
/// ```rust,no_run
/// use tiltscan_cockpit::CockpitServer;
/// use tiltscan_hal::sim::{SimRig, SimScene};
/// use tiltscan_runtime::{ScanHardware, ScanService};
/// use tiltscan_types::SweepConfig;
///
/// #[tokio::main]
/// async fn main() {
///     let (rig, lidar) = SimRig::new(SimScene::flat(70.0)).build();
///     let service = ScanService::new(ScanHardware::new(rig, lidar), Default::default());
///     CockpitServer::new(service, SweepConfig::default())
///         .run()
///         .await
///         .expect("cockpit server failed");
/// }
/// ```
pub struct CockpitServer {
    service: ScanService,
    sweep: SweepConfig,
    port: u16,
}

impl CockpitServer {
    /// Serve `service` on the [`DEFAULT_PORT`]; `/scan` starts `sweep`.
    pub fn new(service: ScanService, sweep: SweepConfig) -> Self {
        Self {
            service,
            sweep,
            port: DEFAULT_PORT,
        }
    }

    /// Override the listening port (builder-style).
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Bind `0.0.0.0:<port>` and serve forever.
    ///
    /// # Errors
    ///
    /// [`CockpitError::Bind`] if the listener cannot bind.
    pub async fn run(self) -> Result<(), CockpitError> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| CockpitError::Bind { addr, source })?;
        self.serve(listener).await
    }

    /// Serve connections from an already bound listener.
    ///
    /// # Errors
    ///
    /// Only when the listener's local address cannot be read; per-connection
    /// failures are logged and do not stop the server.
    pub async fn serve(self, listener: TcpListener) -> Result<(), CockpitError> {
        info!(addr = %listener.local_addr()?, "cockpit listening");

        loop {
            match listener.accept().await {
                Ok((stream, peer)) => {
                    let service = self.service.clone();
                    let sweep = self.sweep.clone();
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, &service, &sweep).await {
                            warn!(%peer, error = %e, "cockpit client error");
                        }
                    });
                }
                Err(e) => warn!(error = %e, "cockpit accept error"),
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Per-connection handler
// ---------------------------------------------------------------------------

async fn handle_connection(
    mut stream: TcpStream,
    service: &ScanService,
    sweep: &SweepConfig,
) -> Result<(), CockpitError> {
    let head = read_request_head(&mut stream).await?;
    let response = match parse_request_line(&head) {
        Some((method, target)) => {
            debug!(method, target, "cockpit request");
            let resp = route(method, target, service, sweep);
            resp.to_bytes(method != "HEAD")
        }
        None => Response::json(400, json!({ "error": "malformed request line" })).to_bytes(true),
    };
    stream.write_all(&response).await?;
    stream.shutdown().await?;
    Ok(())
}

async fn read_request_head(stream: &mut TcpStream) -> Result<String, CockpitError> {
    let mut buf = Vec::with_capacity(1024);
    let mut chunk = [0u8; 1024];
    while buf.len() < MAX_REQUEST_HEAD {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
        if buf.windows(4).any(|w| w == b"\r\n\r\n") || buf.windows(2).any(|w| w == b"\n\n") {
            break;
        }
    }
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

/// `(method, target)` from the first line of an HTTP request.
pub fn parse_request_line(head: &str) -> Option<(&str, &str)> {
    let line = head.lines().next()?;
    let mut parts = line.split_whitespace();
    let method = parts.next()?;
    let target = parts.next()?;
    target.starts_with('/').then_some((method, target))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tiltscan_hal::sim::{SimRig, SimScene};
    use tiltscan_runtime::{ScanHardware, ServiceConfig};

    fn sim_service() -> ScanService {
        let (rig, lidar) = SimRig::new(SimScene::flat(70.0)).build();
        ScanService::new(ScanHardware::new(rig, lidar), ServiceConfig::default())
    }

    fn small_sweep() -> SweepConfig {
        SweepConfig {
            pan_min: -6.0,
            pan_max: 6.0,
            pan_step: 2.0,
            tilt_min: -6.0,
            tilt_max: 6.0,
            tilt_step: 2.0,
            sensor_height_cm: 70.0,
        }
    }

    fn body_json(resp: &Response) -> serde_json::Value {
        serde_json::from_slice(&resp.body).unwrap()
    }

    // ── Server constructor ────────────────────────────────────────────────────

    #[test]
    fn default_port_is_5000() {
        let server = CockpitServer::new(sim_service(), small_sweep());
        assert_eq!(server.port(), DEFAULT_PORT);
        assert_eq!(server.with_port(9999).port(), 9999);
    }

    // ── Request line ──────────────────────────────────────────────────────────

    #[test]
    fn parses_request_line() {
        assert_eq!(
            parse_request_line("GET /status HTTP/1.1\r\nHost: x\r\n\r\n"),
            Some(("GET", "/status"))
        );
        assert_eq!(parse_request_line(""), None);
        assert_eq!(parse_request_line("GET"), None);
        assert_eq!(parse_request_line("GET status HTTP/1.1"), None);
    }

    // ── Routes ────────────────────────────────────────────────────────────────

    #[test]
    fn index_serves_status_page() {
        let resp = route("GET", "/", &sim_service(), &small_sweep());
        assert_eq!(resp.status, 200);
        assert!(resp.content_type.starts_with("text/html"));
        assert!(String::from_utf8_lossy(&resp.body).contains("/status"));
    }

    #[test]
    fn status_before_any_scan_is_idle() {
        let resp = route("GET", "/status", &sim_service(), &small_sweep());
        let json = body_json(&resp);
        assert_eq!(json["scanning"], false);
        assert_eq!(json["progress"], 0);
        assert_eq!(json["state"], "idle");
    }

    #[test]
    fn downloads_are_404_before_first_scan() {
        let service = sim_service();
        for path in ["/download_stl", "/download_csv", "/heightmap"] {
            let resp = route("GET", path, &service, &small_sweep());
            assert_eq!(resp.status, 404, "{path}");
            assert!(body_json(&resp)["error"].is_string());
        }
    }

    #[test]
    fn scan_then_download_artifacts() {
        let service = sim_service();
        let resp = route("GET", "/scan?x=1", &service, &small_sweep());
        assert_eq!(body_json(&resp)["status"], "started");
        service.wait().unwrap();

        let status = body_json(&route("GET", "/status", &service, &small_sweep()));
        assert_eq!(status["progress"], 100);
        assert_eq!(status["total"], 49);
        assert_eq!(status["state"], "completed");

        let stl = route("GET", "/download_stl", &service, &small_sweep());
        assert_eq!(stl.status, 200);
        assert_eq!(stl.attachment, Some("scan_mesh.stl"));
        assert!(stl.body.starts_with(b"solid scan\n"));

        let csv = route("GET", "/download_csv", &service, &small_sweep());
        assert!(csv.body.starts_with(b"x,y,z\n"));

        let grid = body_json(&route("GET", "/heightmap", &service, &small_sweep()));
        assert!(grid["cells"].is_array());
    }

    #[test]
    fn invalid_sweep_reports_error() {
        let mut sweep = small_sweep();
        sweep.pan_step = 0.0;
        let resp = route("GET", "/scan", &sim_service(), &sweep);
        assert_eq!(resp.status, 400);
        assert_eq!(body_json(&resp)["status"], "error");
    }

    #[test]
    fn unknown_path_and_method() {
        let service = sim_service();
        assert_eq!(route("GET", "/nope", &service, &small_sweep()).status, 404);
        assert_eq!(route("DELETE", "/scan", &service, &small_sweep()).status, 405);
        assert_eq!(
            body_json(&route("GET", "/cancel", &service, &small_sweep()))["cancelled"],
            false
        );
    }

    #[test]
    fn response_headers() {
        let resp = Response::download("text/csv", "a.csv", "x,y,z\n".to_string());
        let text = String::from_utf8(resp.to_bytes(true)).unwrap();
        assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(text.contains("Content-Length: 6\r\n"));
        assert!(text.contains("Content-Disposition: attachment; filename=\"a.csv\"\r\n"));
        assert!(text.ends_with("\r\n\r\nx,y,z\n"));

        let head_only = String::from_utf8(resp.to_bytes(false)).unwrap();
        assert!(head_only.ends_with("\r\n\r\n"));
    }

    // ── Over TCP ──────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn serves_status_over_tcp() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = CockpitServer::new(sim_service(), small_sweep());
        let task = tokio::spawn(server.serve(listener));

        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream
            .write_all(b"GET /status HTTP/1.1\r\nHost: localhost\r\n\r\n")
            .await
            .unwrap();
        let mut raw = String::new();
        stream.read_to_string(&mut raw).await.unwrap();

        assert!(raw.starts_with("HTTP/1.1 200 OK"), "{raw}");
        assert!(raw.contains("\"state\":\"idle\""), "{raw}");
        task.abort();
    }
}
