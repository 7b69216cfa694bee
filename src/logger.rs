//! Append-only request log, distinct from the ambient `tracing`
//! diagnostics emitted elsewhere: this is the line-per-event audit trail
//! spec'd in terms of exact message shapes, not a debugging aid.

use std::path::Path;

use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::cache::CacheEntry;
use crate::error::{ProxyError, Result};
use crate::http;

pub struct RequestLogger {
    file: Mutex<File>,
}

impl RequestLogger {
    /// Opens `path` in append mode, creating its parent directory first.
    /// Failure here is fatal to the process per the propagation policy:
    /// there is no fallback sink, so the caller should bail out of `main`.
    pub async fn open(path: &str) -> Result<Self> {
        if let Some(dir) = Path::new(path).parent() {
            if !dir.as_os_str().is_empty() {
                tokio::fs::create_dir_all(dir)
                    .await
                    .map_err(|source| ProxyError::LogOpen {
                        path: path.to_string(),
                        source,
                    })?;
            }
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await
            .map_err(|source| ProxyError::LogOpen {
                path: path.to_string(),
                source,
            })?;

        Ok(Self {
            file: Mutex::new(file),
        })
    }

    async fn log(&self, message: &str) {
        let mut guard = self.file.lock().await;
        if let Err(e) = guard.write_all(message.as_bytes()).await {
            eprintln!("request logger write failed: {e}");
            return;
        }
        if let Err(e) = guard.write_all(b"\n").await {
            eprintln!("request logger write failed: {e}");
        }
    }

    pub async fn request(&self, id: &str, client_ip: &str, request: &[u8]) {
        let request_line = http::get_request_line(request);
        let time = httpdate::fmt_http_date(std::time::SystemTime::now());
        self.log(&format!(
            "{id}: \"{request_line}\" from {client_ip} @ {time}"
        ))
        .await;
    }

    pub async fn not_in_cache(&self, id: &str) {
        self.log(&format!("{id}: not in cache")).await;
    }

    /// Labels the branch the engine is actually about to take, in the
    /// engine's own tie-break order (must-revalidate/no-cache, then
    /// fresh, then expired) — not derived independently from
    /// `is_fresh()`/`is_expired()`, which would mislabel any entry whose
    /// `must_revalidate`/`no_cache` flag is set alongside an unexpired
    /// `max_age`.
    pub async fn cache_status(&self, id: &str, entry: &CacheEntry) {
        let status = if entry.must_revalidate || entry.no_cache {
            "requires validation".to_string()
        } else if entry.is_fresh() {
            "valid".to_string()
        } else {
            let expires = entry.created_at + entry.max_age;
            let wall = approximate_wall_clock(expires);
            format!("but expired at {wall}")
        };
        self.log(&format!("{id}: in cache, {status}")).await;
    }

    pub async fn forward_request(&self, id: &str, request: &[u8], host: &str) {
        let request_line = http::get_request_line(request);
        self.log(&format!("{id}: Requesting \"{request_line}\" from {host}"))
            .await;
    }

    pub async fn no_store(&self, id: &str) {
        self.log(&format!("{id}: not cacheable, \"no-store\" founded."))
            .await;
    }

    pub async fn received_response(&self, id: &str, host: &str, response: &[u8]) {
        let response_line = http::get_request_line(response);
        self.log(&format!(
            "{id}: Received \"{response_line}\" from {host}"
        ))
        .await;
    }

    pub async fn cache_result(&self, id: &str, entry: &CacheEntry) {
        let status = if entry.never_expires {
            "never expires".to_string()
        } else if entry.no_cache || entry.must_revalidate {
            "but requires re-validation".to_string()
        } else {
            let expires = entry.created_at + entry.max_age;
            format!("expires at {}", approximate_wall_clock(expires))
        };
        self.log(&format!("{id}: cached, {status}")).await;
    }

    pub async fn responding(&self, id: &str, response: &[u8]) {
        let response_line = http::get_request_line(response);
        self.log(&format!("{id}: Responding \"{response_line}\""))
            .await;
    }

    pub async fn tunnel_closed(&self, id: &str) {
        self.log(&format!("{id}: Tunnel closed")).await;
    }

    pub async fn note(&self, message: &str) {
        self.log(&format!("[INFO] {message}")).await;
    }

    pub async fn note_with_id(&self, id: &str, message: &str) {
        self.log(&format!("{id}: [INFO] {message}")).await;
    }

    pub async fn warning(&self, message: &str) {
        self.log(&format!("[WARN] {message}")).await;
    }

    pub async fn error(&self, message: &str) {
        self.log(&format!("[ERROR] {message}")).await;
    }
}

/// `Instant` has no wall-clock correspondence, so an expiry computed from
/// `Instant::now()` is rendered relative to the current wall-clock time
/// rather than reconstructed exactly; good enough for a human reading the
/// log, which is all this line is for.
fn approximate_wall_clock(expire: std::time::Instant) -> String {
    let now_instant = std::time::Instant::now();
    let now_wall = std::time::SystemTime::now();
    let wall = if expire >= now_instant {
        now_wall + (expire - now_instant)
    } else {
        now_wall - (now_instant - expire)
    };
    httpdate::fmt_http_date(wall)
}
