//! The control-API request handlers and the NTP poll scheduler.
//!
//! §5 scopes the actual event loop (timer dispatch, socket readiness) out
//! as non-goal transport plumbing; what's specified — and implemented here
//! — is the pure logic an event loop would drive: which delay to schedule
//! next, and how each control message is answered. [`Server::tick`] is the
//! one method a real event loop calls on every readable/timeout event; it
//! contains no loop of its own.

use crate::api::{
    Reply, Request, TimeCounter, TimeKeeper, TimeKeeperInfo, TimeKeeperRttStats, TimeKeeperStats,
    TimeSource, TimeSourceConfigNtp, TimeSourceStats,
};
use crate::bintime::Bintime;
use crate::clock::Clock;
use crate::counter::{self, Hz};
use crate::keeper;
use crate::ntp::socket::Socket;
use std::collections::HashMap;
use std::time::Duration;
use ts_common::error::{Error, Result};
use ts_common::id::SourceId;

const NTP_STARTUP_PACKETS: u32 = 8;
const NTP_POLL_PERIOD_S: f64 = 64.0;

/// §4.7: exponential poll back-off, `exp(ln(64)/8 * i)` for `i < 8`, then a
/// flat 64s.
pub fn ntp_poll_delay(i: u32) -> Duration {
    let period_s = if i < NTP_STARTUP_PACKETS {
        (NTP_POLL_PERIOD_S.ln() / NTP_STARTUP_PACKETS as f64 * i as f64).exp()
    } else {
        NTP_POLL_PERIOD_S
    };
    Duration::from_secs_f64(period_s)
}

/// One live NTP source: its socket, config, and request/reply counters.
struct NtpSourceState {
    socket: Socket,
    config: TimeSourceConfigNtp,
    rx: u64,
    tx: u64,
    last_tx_ticks: Option<crate::counter::Ticks>,
}

/// Owns the clock, the timecounter registry's selection, and at most one
/// NTP source — matching §4.7's "the server owns one clock, one selected
/// timecounter, and at most one NTP source".
pub struct Server {
    clock: Clock,
    sources: HashMap<String, NtpSourceState>,
}

impl Server {
    /// Construct a server. The timecounter registry must already be
    /// initialized (`counter::init`) before this is called; §7 treats a
    /// missing timecounter as fatal, aborting during init, not here.
    pub fn new(f_nominal: Hz) -> Self {
        let clock = Clock::new(f_nominal);
        keeper::setup(clock.offset(), 0, f_nominal);
        Server {
            clock,
            sources: HashMap::new(),
        }
    }

    pub fn clock(&self) -> &Clock {
        &self.clock
    }

    /// Drive one NTP poll-timer firing for `id`: send a request, record its
    /// transmit tick, and return the delay until the next poll.
    pub fn poll_source(&mut self, id: &str) -> Result<Duration> {
        let source = self
            .sources
            .get_mut(id)
            .ok_or_else(|| Error::NotFound(id.to_string()))?;
        let ta = source.socket.send_request()?;
        source.last_tx_ticks = Some(ta);
        source.tx += 1;
        Ok(ntp_poll_delay(source.tx as u32))
    }

    /// Drain one socket-readable event for `id`: decode whatever replies are
    /// waiting and feed each to the clock, publishing the new keeper
    /// parameters on every accepted offset.
    pub fn drain_replies(&mut self, id: &str) -> Result<usize> {
        let mut applied = 0;
        loop {
            let (packet, tf, rx_count_slot) = {
                let source = self
                    .sources
                    .get_mut(id)
                    .ok_or_else(|| Error::NotFound(id.to_string()))?;
                let Some(ta) = source.last_tx_ticks else {
                    break;
                };
                match source.socket.recv_reply()? {
                    Some((packet, tf)) => {
                        source.rx += 1;
                        (packet, tf, ta)
                    }
                    None => break,
                }
            };
            self.clock.update(rx_count_slot, packet.receive, packet.transmit, tf)?;
            keeper::sync(
                self.clock.offset(),
                tf,
                self.clock
                    .frequency()
                    .map(|f| f.round().max(1.0) as Hz)
                    .unwrap_or(counter::frequency()),
            );
            applied += 1;
        }
        Ok(applied)
    }

    fn to_time_counter(&self) -> Vec<TimeCounter> {
        counter::active_info()
            .map(|info| vec![TimeCounter::from(info)])
            .unwrap_or_default()
    }

    pub fn handle_list_counters(&self, id: Option<&str>) -> Reply {
        let counters = self.to_time_counter();
        match id {
            Some(wanted) => {
                let filtered: Vec<_> = counters.into_iter().filter(|c| c.id == wanted).collect();
                if filtered.is_empty() {
                    Reply::from(&Error::NotFound(wanted.to_string()))
                } else {
                    Reply::Counters { counters: filtered }
                }
            }
            None => Reply::Counters { counters },
        }
    }

    pub fn handle_get_keeper(&self, now: Bintime) -> Reply {
        let stats = self.clock.stats();
        let keeper = TimeKeeper {
            timestamp: now,
            counter_id: counter::active_info().map(|i| i.id.to_string()),
            source_id: self.sources.keys().next().cloned(),
            info: TimeKeeperInfo {
                frequency: self.clock.frequency(),
                frequency_error_ppm: self.clock.frequency_error_ppm(),
                local_frequency: self.clock.local_frequency(),
                local_frequency_error_ppm: self.clock.local_frequency_error_ppm(),
                offset: self.clock.offset(),
                synced: self.clock.synced(now),
                theta: self.clock.theta(),
            },
            stats: TimeKeeperStats {
                frequency_updates: stats.n_accept_f_hat,
                local_frequency_updates: stats.n_accept_f_local,
                theta_updates: stats.n_accept_theta,
                timestamps: self.clock.history_len() as u64,
                updates: stats.n_accept_f_hat + stats.n_accept_f_local + stats.n_accept_theta,
                rtts: TimeKeeperRttStats {
                    maximum: self.clock.rtt_maximum(),
                    median: self.clock.rtt_median(),
                    minimum: self.clock.rtt_minimum(),
                },
            },
        };
        Reply::Keeper {
            keeper: Box::new(keeper),
        }
    }

    fn to_time_source(&self, id: &str, state: &NtpSourceState) -> TimeSource {
        TimeSource {
            id: id.to_string(),
            config: state.config.clone(),
            stats: TimeSourceStats {
                rx: state.rx,
                tx: state.tx,
            },
        }
    }

    pub fn handle_list_sources(&self, id: Option<&str>) -> Reply {
        match id {
            Some(wanted) => match self.sources.get(wanted) {
                Some(state) => Reply::Sources {
                    sources: vec![self.to_time_source(wanted, state)],
                },
                None => Reply::from(&Error::NotFound(wanted.to_string())),
            },
            None => Reply::Sources {
                sources: self
                    .sources
                    .iter()
                    .map(|(id, state)| self.to_time_source(id, state))
                    .collect(),
            },
        }
    }

    /// §4.7: adding a source atomically tears down any existing one, resets
    /// the clock, resolves the new endpoint, and schedules the first poll.
    pub fn handle_add_source(&mut self, id: Option<String>, config: TimeSourceConfigNtp) -> Result<Reply> {
        if config.node.is_empty() || config.node.len() > 255 {
            return Err(Error::InvalidConfig("node must be 1-255 bytes".into()));
        }
        if config.service.is_empty() || config.service.len() > 31 {
            return Err(Error::InvalidConfig("service must be 1-31 bytes".into()));
        }
        let id = match id {
            Some(raw) => SourceId::parse(&raw)
                .ok_or_else(|| Error::InvalidConfig(format!("invalid source id: {raw}")))?,
            None => SourceId::generate(),
        };

        let socket = Socket::connect(&config.node, &config.service)?;

        self.sources.clear();
        self.clock.reset();

        self.sources.insert(
            id.0.clone(),
            NtpSourceState {
                socket,
                config,
                rx: 0,
                tx: 0,
                last_tx_ticks: None,
            },
        );

        Ok(self.handle_list_sources(Some(&id.0)))
    }

    pub fn handle_del_source(&mut self, id: &str) -> Reply {
        self.sources.remove(id);
        Reply::Ok
    }

    /// Dispatch a decoded control-protocol request to the matching handler.
    pub fn handle_request(&mut self, request: Request, now: Bintime) -> Reply {
        match request {
            Request::ListCounters { id } => self.handle_list_counters(id.as_deref()),
            Request::GetKeeper => self.handle_get_keeper(now),
            Request::ListSources { id } => self.handle_list_sources(id.as_deref()),
            Request::AddSource { source } => {
                match source.validate() {
                    Ok(id) => match self.handle_add_source(Some(id.0), source.config) {
                        Ok(reply) => reply,
                        Err(e) => Reply::from(&e),
                    },
                    Err(e) => Reply::from(&e),
                }
            }
            Request::DelSource { id } => self.handle_del_source(&id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::counter::SourceSystem;
    use std::sync::{Arc, Once};

    static INIT: Once = Once::new();

    fn ensure_counter() {
        INIT.call_once(|| {
            counter::init(&[Arc::new(SourceSystem::new())]);
        });
    }

    #[test]
    fn poll_delay_backs_off_then_holds_at_64s() {
        assert!(ntp_poll_delay(0) < ntp_poll_delay(7));
        assert_eq!(ntp_poll_delay(8), Duration::from_secs_f64(64.0));
        assert_eq!(ntp_poll_delay(100), ntp_poll_delay(8));
    }

    #[test]
    fn list_counters_reports_the_active_counter() {
        ensure_counter();
        let server = Server::new(1_000_000_000);
        let reply = server.handle_list_counters(None);
        match reply {
            Reply::Counters { counters } => assert_eq!(counters.len(), 1),
            _ => panic!("expected Counters reply"),
        }
    }

    #[test]
    fn list_counters_unknown_id_is_not_found() {
        ensure_counter();
        let server = Server::new(1_000_000_000);
        let reply = server.handle_list_counters(Some("nonexistent"));
        assert!(matches!(reply, Reply::Error { .. }));
    }

    #[test]
    fn get_keeper_reports_unsynced_on_a_fresh_server() {
        ensure_counter();
        let server = Server::new(1_000_000_000);
        let reply = server.handle_get_keeper(Bintime::new(1_700_000_000, 0));
        match reply {
            Reply::Keeper { keeper } => assert!(!keeper.info.synced),
            _ => panic!("expected Keeper reply"),
        }
    }

    #[test]
    fn add_source_connects_and_replaces_existing() {
        ensure_counter();
        let mut server = Server::new(1_000_000_000);
        let cfg = TimeSourceConfigNtp {
            node: "127.0.0.1".into(),
            service: "123".into(),
        };
        let reply = server
            .handle_add_source(Some("a".into()), cfg.clone())
            .unwrap();
        assert!(matches!(reply, Reply::Sources { .. }));
        assert_eq!(server.sources.len(), 1);

        server.handle_add_source(Some("b".into()), cfg).unwrap();
        assert_eq!(server.sources.len(), 1);
        assert!(server.sources.contains_key("b"));
    }

    #[test]
    fn del_source_removes_it() {
        ensure_counter();
        let mut server = Server::new(1_000_000_000);
        let cfg = TimeSourceConfigNtp {
            node: "127.0.0.1".into(),
            service: "123".into(),
        };
        server.handle_add_source(Some("a".into()), cfg).unwrap();
        let reply = server.handle_del_source("a");
        assert!(matches!(reply, Reply::Ok));
        assert!(server.sources.is_empty());
    }

    #[test]
    fn add_source_rejects_oversized_node() {
        ensure_counter();
        let mut server = Server::new(1_000_000_000);
        let cfg = TimeSourceConfigNtp {
            node: "x".repeat(300),
            service: "123".into(),
        };
        assert!(server.handle_add_source(None, cfg).is_err());
    }
}
