use std::fs::File;
use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, TcpListener};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use log::{debug, error, info, warn};
use thiserror::Error;
use tiny_http::{Header, Method, Request, Response, ResponseBox, Server, StatusCode};

/// Headers attached to every response so pages and their assets load under
/// the engine's cross-origin isolation rules.
pub const ISOLATION_HEADERS: [(&str, &str); 3] = [
    ("Access-Control-Allow-Origin", "*"),
    ("Cross-Origin-Embedder-Policy", "require-corp"),
    ("Cross-Origin-Opener-Policy", "same-origin"),
];

/// Where and how the local content server listens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub host: IpAddr,
    pub port: u16,
    /// Document served for `/`.
    pub index: String,
    /// Top-level names under the root that may be served. Empty serves
    /// everything.
    pub exposed: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: 8000,
            index: "home_page.html".to_string(),
            exposed: ["home_page.html", "search.html", "assets"]
                .map(String::from)
                .to_vec(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("refusing to bind non-loopback address {0}")]
    NotLoopback(IpAddr),
    #[error("could not bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
    #[error("server root {path} is unusable: {source}")]
    Root {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("could not start HTTP server: {0}")]
    Start(String),
    #[error("could not spawn server thread: {0}")]
    Spawn(#[source] io::Error),
}

/// Running server. Stops when [`ServerHandle::shutdown`] is called or the
/// handle is dropped.
pub struct ServerHandle {
    addr: SocketAddr,
    server: Arc<Server>,
    worker: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for ServerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerHandle")
            .field("addr", &self.addr)
            .finish_non_exhaustive()
    }
}

impl ServerHandle {
    /// Address actually bound; differs from the config when port 0 was asked.
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Base URL pages are reachable under, e.g. `http://localhost:8000`.
    pub fn base_url(&self) -> String {
        format!("http://localhost:{}", self.addr.port())
    }

    /// Signals the serve loop to stop and waits for the thread to exit.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        let Some(worker) = self.worker.take() else {
            return;
        };
        self.server.unblock();
        if worker.join().is_err() {
            error!("Local server thread panicked");
        }
        info!("Local server on {} stopped", self.addr);
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Binds the loopback listener and starts serving `root` on a background
/// thread.
///
/// Binding happens before this returns, so a port already in use is reported
/// here instead of killing the worker later.
pub fn start(config: &ServerConfig, root: &Path) -> Result<ServerHandle, ServerError> {
    if !config.host.is_loopback() {
        return Err(ServerError::NotLoopback(config.host));
    }

    let root = root.canonicalize().map_err(|source| ServerError::Root {
        path: root.to_path_buf(),
        source,
    })?;

    let requested = SocketAddr::new(config.host, config.port);
    let listener =
        TcpListener::bind(requested).map_err(|source| ServerError::Bind { addr: requested, source })?;
    let addr = listener
        .local_addr()
        .map_err(|source| ServerError::Bind { addr: requested, source })?;

    let server = Server::from_listener(listener, None)
        .map(Arc::new)
        .map_err(|e| ServerError::Start(e.to_string()))?;

    let worker_server = Arc::clone(&server);
    let worker_config = config.clone();
    let worker = thread::Builder::new()
        .name("local-content-server".into())
        .spawn(move || serve(&worker_server, &root, &worker_config))
        .map_err(ServerError::Spawn)?;

    info!("Starting local server at http://localhost:{}", addr.port());
    Ok(ServerHandle {
        addr,
        server,
        worker: Some(worker),
    })
}

fn serve(server: &Server, root: &Path, config: &ServerConfig) {
    for request in server.incoming_requests() {
        let response = respond(root, config, &request);
        debug!(
            "{} {} -> {}",
            request.method(),
            request.url(),
            response.status_code().0
        );
        if let Err(e) = request.respond(response) {
            warn!("Failed to send response: {e}");
        }
    }
}

fn respond(root: &Path, config: &ServerConfig, request: &Request) -> ResponseBox {
    if !matches!(request.method(), Method::Get | Method::Head) {
        return text_response(405, "Method Not Allowed");
    }

    let Some(path) = resolve_request_path(root, request.url(), config) else {
        return text_response(404, "Not found");
    };

    match File::open(&path) {
        Ok(file) => {
            let mime = mime_guess::from_path(&path).first_or_octet_stream();
            let mut response = Response::from_file(file).boxed();
            if let Some(header) = header("Content-Type", mime.essence_str()) {
                response.add_header(header);
            }
            with_isolation_headers(response)
        }
        Err(e) => {
            warn!("Failed to open {}: {e}", path.display());
            text_response(404, "Not found")
        }
    }
}

fn text_response(status: u16, body: &str) -> ResponseBox {
    let response = Response::from_string(body)
        .with_status_code(StatusCode(status))
        .boxed();
    with_isolation_headers(response)
}

fn with_isolation_headers(mut response: ResponseBox) -> ResponseBox {
    for (name, value) in ISOLATION_HEADERS {
        if let Some(header) = header(name, value) {
            response.add_header(header);
        }
    }
    response
}

fn header(name: &str, value: &str) -> Option<Header> {
    Header::from_bytes(name.as_bytes(), value.as_bytes()).ok()
}

/// Maps a request target onto a file under `root` (which must already be
/// canonical).
///
/// Returns `None` for anything that is not a regular, exposed file inside
/// the root: `..` segments, backslashes, NUL bytes, and symlinks pointing
/// outside.
pub fn resolve_request_path(root: &Path, target: &str, config: &ServerConfig) -> Option<PathBuf> {
    let raw_path = target.split(|c| c == '?' || c == '#').next().unwrap_or("");
    let decoded = urlencoding::decode(raw_path).ok()?;

    let mut segments = Vec::new();
    for segment in decoded.split('/') {
        match segment {
            "" | "." => {}
            ".." => return None,
            s if s.contains('\\') || s.contains('\0') => return None,
            s => segments.push(s),
        }
    }
    if segments.is_empty() {
        segments.push(config.index.as_str());
    }
    if !config.exposed.is_empty() && !config.exposed.iter().any(|name| name == segments[0]) {
        return None;
    }

    let resolved: PathBuf = std::iter::once(root).chain(segments.iter().map(Path::new)).collect();

    let canonical = resolved.canonicalize().ok()?;
    if !canonical.starts_with(root) || !canonical.is_file() {
        return None;
    }
    Some(canonical)
}
