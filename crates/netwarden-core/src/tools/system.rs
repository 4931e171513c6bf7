// Direct OS-tool implementation of `NetworkTools`.
//
// Shells out to arp, nslookup, ping, ip, arpspoof, nping, iptables and
// tcpdump. Every invocation carries its own timeout; long-running
// poisoning processes are tracked so they can be torn down per target.

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::TcpStream;
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tokio::time::{Instant, timeout, timeout_at};
use tracing::{debug, trace, warn};

use super::{ArpEntry, NetworkTools, parse};
use crate::error::CoreError;
use crate::model::MacAddress;

/// Generous ceiling for short-lived commands that take no explicit timeout.
const COMMAND_TIMEOUT: Duration = Duration::from_secs(10);

/// How long a freshly spawned `arpspoof` must survive to count as started.
const SPAWN_GRACE: Duration = Duration::from_millis(300);

/// Time a stopped `arpspoof` gets to re-ARP the real addresses and exit.
const CLEANUP_GRACE: Duration = Duration::from_secs(6);

/// Corrective replies sent per restored binding.
const RESTORE_REPLIES: &str = "3";

/// `NetworkTools` backed by the host's command-line utilities.
pub struct SystemTools {
    interface: String,
    /// Running poisoning sessions keyed by `(target, spoof_as)`.
    sessions: Mutex<HashMap<(IpAddr, IpAddr), Child>>,
}

impl SystemTools {
    pub fn new(interface: impl Into<String>) -> Self {
        Self {
            interface: interface.into(),
            sessions: Mutex::new(HashMap::new()),
        }
    }
}

/// Captured result of a finished command.
struct Finished {
    success: bool,
    code: Option<i32>,
    stdout: String,
    stderr: String,
}

/// Run `program args...` to completion within `limit`.
async fn run(program: &str, args: &[&str], limit: Duration) -> Result<Finished, CoreError> {
    trace!(program, ?args, "running");
    let mut cmd = Command::new(program);
    cmd.args(args).stdin(Stdio::null()).kill_on_drop(true);

    let output = timeout(limit, cmd.output())
        .await
        .map_err(|_| CoreError::tool(program, format!("timed out after {}s", limit.as_secs())))?
        .map_err(|e| CoreError::tool(program, e.to_string()))?;

    Ok(Finished {
        success: output.status.success(),
        code: output.status.code(),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    })
}

/// Like [`run`], but a non-zero exit is an error.
async fn run_checked(program: &str, args: &[&str], limit: Duration) -> Result<String, CoreError> {
    let out = run(program, args, limit).await?;
    if out.success {
        Ok(out.stdout)
    } else {
        Err(CoreError::tool(
            program,
            format!(
                "exited with {}: {}",
                out.code.map_or_else(|| "signal".to_owned(), |c| c.to_string()),
                out.stderr.trim()
            ),
        ))
    }
}

/// Stop a child with SIGTERM and reap it. `arpspoof` uses the signal to
/// send the real bindings before exiting; SIGKILL only if it lingers.
async fn terminate(mut child: Child) {
    if let Some(pid) = child.id() {
        let pid = pid.to_string();
        match run("kill", &["-TERM", &pid], COMMAND_TIMEOUT).await {
            Ok(out) if out.success => {
                if timeout(CLEANUP_GRACE, child.wait()).await.is_ok() {
                    return;
                }
                warn!(%pid, "child ignored SIGTERM; killing");
            }
            Ok(out) => debug!(%pid, stderr = out.stderr.trim(), "SIGTERM not delivered"),
            Err(e) => debug!(%pid, error = %e, "SIGTERM not delivered"),
        }
    }
    if let Err(e) = child.kill().await {
        debug!(error = %e, "child already gone");
    }
}

#[async_trait]
impl NetworkTools for SystemTools {
    async fn read_address_table(&self) -> Result<Vec<ArpEntry>, CoreError> {
        let out = run_checked("arp", &["-a"], COMMAND_TIMEOUT).await?;
        Ok(parse::arp_table(&out))
    }

    async fn reverse_lookup(
        &self,
        ip: IpAddr,
        limit: Duration,
    ) -> Result<Option<String>, CoreError> {
        let addr = ip.to_string();
        // nslookup exits non-zero on NXDOMAIN; that is an answer, not a failure.
        let out = run("nslookup", &[&addr], limit).await?;
        Ok(parse::nslookup_name(&out.stdout))
    }

    async fn ping(&self, ip: IpAddr, limit: Duration) -> Result<bool, CoreError> {
        let addr = ip.to_string();
        let wait = limit.as_secs().max(1).to_string();
        // Allow the process a little longer than its own -W deadline.
        let out = run("ping", &["-c", "1", "-W", &wait, &addr], limit + Duration::from_secs(1))
            .await?;
        Ok(out.success)
    }

    async fn probe_port(&self, ip: IpAddr, port: u16, limit: Duration) -> bool {
        let addr = SocketAddr::new(ip, port);
        match timeout(limit, TcpStream::connect(addr)).await {
            Ok(Ok(_stream)) => true,
            Ok(Err(e)) => {
                trace!(%addr, error = %e, "port closed");
                false
            }
            Err(_) => {
                trace!(%addr, "port probe timed out");
                false
            }
        }
    }

    async fn default_gateway(&self) -> Result<Option<IpAddr>, CoreError> {
        let out = run_checked("ip", &["route"], COMMAND_TIMEOUT).await?;
        Ok(parse::default_route(&out))
    }

    async fn spoof(&self, target: IpAddr, spoof_as: IpAddr) -> Result<(), CoreError> {
        let target_s = target.to_string();
        let spoof_s = spoof_as.to_string();
        let mut child = Command::new("arpspoof")
            .args([
                "-i",
                self.interface.as_str(),
                "-t",
                target_s.as_str(),
                spoof_s.as_str(),
            ])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| CoreError::tool("arpspoof", e.to_string()))?;

        // A bad interface or missing privilege makes arpspoof exit at once.
        if let Ok(status) = timeout(SPAWN_GRACE, child.wait()).await {
            let status = status.map_err(|e| CoreError::tool("arpspoof", e.to_string()))?;
            return Err(CoreError::tool(
                "arpspoof",
                format!("exited immediately with {status}"),
            ));
        }

        debug!(%target, %spoof_as, pid = ?child.id(), "poisoning started");
        let previous = self.sessions.lock().await.insert((target, spoof_as), child);
        if let Some(old) = previous {
            terminate(old).await;
        }
        Ok(())
    }

    async fn stop_spoofing(&self, address: IpAddr) -> Result<(), CoreError> {
        let stopped: Vec<Child> = {
            let mut sessions = self.sessions.lock().await;
            let keys: Vec<(IpAddr, IpAddr)> = sessions
                .keys()
                .filter(|(t, s)| *t == address || *s == address)
                .copied()
                .collect();
            keys.iter().filter_map(|k| sessions.remove(k)).collect()
        };

        if stopped.is_empty() {
            // Nothing tracked (e.g. started by a previous run); sweep by pattern.
            let pattern = format!("arpspoof.*{address}");
            let out = run("pkill", &["-f", &pattern], COMMAND_TIMEOUT).await?;
            // pkill: 0 = killed something, 1 = nothing matched.
            if !matches!(out.code, Some(0 | 1)) {
                return Err(CoreError::tool("pkill", out.stderr.trim().to_owned()));
            }
        } else {
            for child in stopped {
                terminate(child).await;
            }
        }
        Ok(())
    }

    async fn restore_binding(
        &self,
        target: IpAddr,
        address: IpAddr,
        mac: &MacAddress,
    ) -> Result<(), CoreError> {
        let target_s = target.to_string();
        let address_s = address.to_string();
        run_checked(
            "nping",
            &[
                "--arp",
                "--arp-type",
                "ARP-reply",
                "--arp-sender-mac",
                mac.as_str(),
                "--arp-sender-ip",
                &address_s,
                "--arp-target-ip",
                &target_s,
                "-e",
                &self.interface,
                "-c",
                RESTORE_REPLIES,
                "-q",
                &target_s,
            ],
            COMMAND_TIMEOUT,
        )
        .await?;
        debug!(%target, %address, %mac, "binding restored");
        Ok(())
    }

    async fn apply_firewall_rule(&self, args: &[String]) -> Result<(), CoreError> {
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        run_checked("iptables", &args, COMMAND_TIMEOUT).await?;
        Ok(())
    }

    async fn capture_packets(
        &self,
        ip: IpAddr,
        max_packets: usize,
        limit: Duration,
    ) -> Result<Vec<String>, CoreError> {
        let addr = ip.to_string();
        let count = max_packets.to_string();
        let mut child = Command::new("tcpdump")
            .args(["-i", "any", "-c", count.as_str(), "-n", "-l", "host", addr.as_str()])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| CoreError::tool("tcpdump", e.to_string()))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| CoreError::tool("tcpdump", "no stdout handle"))?;
        let mut lines = BufReader::new(stdout).lines();
        let deadline = Instant::now() + limit;
        let mut captured = Vec::new();

        while captured.len() < max_packets {
            match timeout_at(deadline, lines.next_line()).await {
                Ok(Ok(Some(line))) => captured.push(line),
                Ok(Ok(None)) => break,
                Ok(Err(e)) => {
                    warn!(error = %e, "tcpdump read failed");
                    break;
                }
                Err(_) => {
                    debug!(packets = captured.len(), "capture window elapsed");
                    break;
                }
            }
        }
        terminate(child).await;
        Ok(captured)
    }
}
