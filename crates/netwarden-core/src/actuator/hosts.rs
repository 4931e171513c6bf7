// Hosts-file domain blocklist.
//
// Blocking is global: a domain is sinkholed for every client that
// resolves through this host. Each blocked domain owns two lines,
// `0.0.0.0 <domain>` and `0.0.0.0 www.<domain>`.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::CoreError;

const SINKHOLE: &str = "0.0.0.0";

/// Lower-case, drop a trailing dot and a leading `www.`, and check the
/// result is a plausible DNS name.
pub fn normalize_domain(raw: &str) -> Result<String, CoreError> {
    let name = raw.trim().trim_end_matches('.').to_ascii_lowercase();
    let name = name.strip_prefix("www.").unwrap_or(&name).to_owned();

    if name.is_empty() || name.len() > 253 {
        return Err(CoreError::validation(format!("invalid domain name: {raw:?}")));
    }
    if !name.contains('.') {
        return Err(CoreError::validation(format!(
            "domain must be fully qualified: {raw:?}"
        )));
    }
    let labels_ok = name.split('.').all(|label| {
        !label.is_empty()
            && label.len() <= 63
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-')
    });
    if !labels_ok {
        return Err(CoreError::validation(format!("invalid domain name: {raw:?}")));
    }
    Ok(name)
}

pub struct DomainBlocklist {
    path: PathBuf,
    /// Serializes read-modify-write cycles within this process.
    lock: Mutex<()>,
}

impl DomainBlocklist {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Add sinkhole entries for an already-normalized `domain`.
    /// Returns `false` when they were all present.
    pub async fn block(&self, domain: &str) -> Result<bool, CoreError> {
        let _guard = self.lock.lock().await;
        let mut lines = self.read_lines().await?;
        let mut changed = false;
        for host in hosts_for(domain) {
            if !lines.iter().any(|l| is_entry_for(l, &host)) {
                lines.push(format!("{SINKHOLE} {host}"));
                changed = true;
            }
        }
        if changed {
            self.write_lines(&lines).await?;
            info!(domain, file = %self.path.display(), "domain blocked");
        } else {
            debug!(domain, "domain already blocked");
        }
        Ok(changed)
    }

    /// Remove the sinkhole entries for `domain`. Other lines are kept
    /// byte-for-byte. Returns `false` when nothing was present.
    pub async fn unblock(&self, domain: &str) -> Result<bool, CoreError> {
        let _guard = self.lock.lock().await;
        let lines = self.read_lines().await?;
        let hosts = hosts_for(domain);
        let kept: Vec<String> = lines
            .iter()
            .filter(|l| !hosts.iter().any(|h| is_entry_for(l, h)))
            .cloned()
            .collect();
        let changed = kept.len() != lines.len();
        if changed {
            self.write_lines(&kept).await?;
            info!(domain, file = %self.path.display(), "domain unblocked");
        }
        Ok(changed)
    }

    /// Whether both entries for `domain` are present.
    pub async fn is_blocked(&self, domain: &str) -> Result<bool, CoreError> {
        let lines = self.read_lines().await?;
        Ok(hosts_for(domain)
            .iter()
            .all(|h| lines.iter().any(|l| is_entry_for(l, h))))
    }

    async fn read_lines(&self) -> Result<Vec<String>, CoreError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(text) => Ok(text.lines().map(str::to_owned).collect()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(self.io_error(&e)),
        }
    }

    /// Sibling scratch file the new contents are staged in.
    fn staging_path(&self) -> PathBuf {
        let name = self
            .path
            .file_name()
            .map_or_else(|| "hosts".into(), |n| n.to_string_lossy().into_owned());
        self.path.with_file_name(format!(".{name}.netwarden-tmp"))
    }

    /// Replace the file atomically: stage next to it, then rename over.
    async fn write_lines(&self, lines: &[String]) -> Result<(), CoreError> {
        let mut text = lines.join("\n");
        text.push('\n');

        let staging = self.staging_path();
        if let Err(e) = tokio::fs::write(&staging, &text).await {
            let _ = tokio::fs::remove_file(&staging).await;
            return Err(self.io_error(&e));
        }
        if let Ok(meta) = tokio::fs::metadata(&self.path).await {
            let copied = tokio::fs::set_permissions(&staging, meta.permissions()).await;
            if let Err(e) = copied {
                debug!(error = %e, "could not copy hosts file permissions");
            }
        }

        match tokio::fs::rename(&staging, &self.path).await {
            Ok(()) => Ok(()),
            // A bind-mounted hosts file (containers) cannot be replaced.
            Err(e) if e.kind() == ErrorKind::ResourceBusy => {
                warn!(
                    path = %self.path.display(),
                    "hosts file is a mount point; rewriting in place"
                );
                let _ = tokio::fs::remove_file(&staging).await;
                tokio::fs::write(&self.path, text)
                    .await
                    .map_err(|e| self.io_error(&e))
            }
            Err(e) => {
                let _ = tokio::fs::remove_file(&staging).await;
                Err(self.io_error(&e))
            }
        }
    }

    fn io_error(&self, e: &std::io::Error) -> CoreError {
        CoreError::tool("hosts file", format!("{}: {e}", self.path.display()))
    }
}

fn hosts_for(domain: &str) -> [String; 2] {
    [domain.to_owned(), format!("www.{domain}")]
}

/// `0.0.0.0 host` with any amount of whitespace, ignoring comments.
fn is_entry_for(line: &str, host: &str) -> bool {
    let line = line.split('#').next().unwrap_or_default();
    let mut words = line.split_whitespace();
    words.next() == Some(SINKHOLE) && words.next() == Some(host) && words.next().is_none()
}
