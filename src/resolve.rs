use std::collections::{BTreeMap, BTreeSet};
use std::net::{IpAddr, ToSocketAddrs};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Instant;

use crate::log::{self, Loggable};
use crate::timing::Duration;

pub type Resolution = Result<Vec<IpAddr>, String>;

#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct ResolutionReport {
    pub resolved: BTreeMap<String, Vec<IpAddr>>,
    pub failed: BTreeMap<String, String>,
    /// Hosts that had not answered when the deadline passed.
    pub unfinished: Vec<String>,
}

impl ResolutionReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty() && self.unfinished.is_empty()
    }
}

/// Looks a host up with the system resolver.
pub fn system_resolver(host: &str) -> Resolution {
    let addresses = (host, 0)
        .to_socket_addrs()
        .map_err(|error| error.log().to_string())?
        .map(|address| address.ip())
        .collect::<BTreeSet<IpAddr>>();
    Ok(addresses.into_iter().collect())
}

/// Resolves every host in parallel, and reports whatever has come back by the
/// deadline.
///
/// Lookups still running at the deadline are abandoned: their threads finish
/// in the background and their answers are dropped.
pub fn resolve_all<R>(
    hosts: &[String],
    deadline: Duration,
    resolver: R,
    logger: &log::Logger,
) -> ResolutionReport
where
    R: Fn(&str) -> Resolution + Send + Sync + 'static,
{
    let hosts = hosts.iter().cloned().collect::<BTreeSet<String>>();
    log::info!(logger, event = "RESOLVE", hosts, deadline);

    let resolver = Arc::new(resolver);
    let (sender, receiver) = mpsc::channel();
    for host in &hosts {
        let host = host.clone();
        let resolver = Arc::clone(&resolver);
        let sender = sender.clone();
        thread::spawn(move || {
            let resolution = resolver(&host);
            // the receiver is gone once the deadline has passed
            let _ = sender.send((host, resolution));
        });
    }
    drop(sender);

    let give_up_at = Instant::now() + std::time::Duration::from(deadline);
    let mut report = ResolutionReport::default();
    let mut answered = BTreeSet::new();
    while answered.len() < hosts.len() {
        let remaining = give_up_at.saturating_duration_since(Instant::now());
        match receiver.recv_timeout(remaining) {
            Ok((host, Ok(addresses))) => {
                log::debug!(logger, event = "RESOLVED", host, addresses);
                answered.insert(host.clone());
                report.resolved.insert(host, addresses);
            }
            Ok((host, Err(error))) => {
                log::warning!(logger, event = "RESOLVE_FAILED", host, error);
                answered.insert(host.clone());
                report.failed.insert(host, error);
            }
            Err(mpsc::RecvTimeoutError::Timeout) | Err(mpsc::RecvTimeoutError::Disconnected) => {
                break;
            }
        }
    }

    report.unfinished = hosts.difference(&answered).cloned().collect();
    if !report.unfinished.is_empty() {
        let unfinished = &report.unfinished;
        log::warning!(logger, event = "RESOLVE_DEADLINE", deadline, unfinished);
    }
    report
}
