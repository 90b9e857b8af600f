//! Shared application state handed to every handler.

use std::fmt;
use std::net::IpAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use dashmap::DashMap;
use thiserror::Error;

use crate::config::ServerConfig;
use crate::core::live::LiveConfig;
use crate::core::session::SessionRegistry;

/// Why a WebSocket connection was refused admission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ConnectionLimitError {
    #[error("global WebSocket connection limit reached")]
    GlobalLimitReached,
    #[error("per-IP WebSocket connection limit reached")]
    PerIpLimitReached,
}

/// A reserved WebSocket admission slot.
///
/// Clones share the reservation. It is returned to [`AppState`] when the last
/// clone is dropped, whether or not the socket was ever upgraded.
#[derive(Clone)]
pub struct ConnectionSlot(Arc<SlotInner>);

struct SlotInner {
    state: Arc<AppState>,
    ip: IpAddr,
}

impl ConnectionSlot {
    pub fn ip(&self) -> IpAddr {
        self.0.ip
    }
}

impl fmt::Debug for ConnectionSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionSlot").field("ip", &self.0.ip).finish()
    }
}

impl Drop for SlotInner {
    fn drop(&mut self) {
        self.state.release_connection(self.ip);
    }
}

/// Application state
pub struct AppState {
    pub config: ServerConfig,
    /// Upstream settings shared by every session
    live_config: Arc<LiveConfig>,
    /// Active relay sessions
    sessions: Arc<SessionRegistry>,
    /// Open WebSocket connections, across all clients
    ws_connections: AtomicUsize,
    /// Open WebSocket connections per client IP
    ip_connections: DashMap<IpAddr, u32>,
}

impl AppState {
    pub fn new(config: ServerConfig) -> Arc<Self> {
        let live_config = Arc::new(config.live_config());
        Arc::new(Self {
            config,
            live_config,
            sessions: Arc::new(SessionRegistry::new()),
            ws_connections: AtomicUsize::new(0),
            ip_connections: DashMap::new(),
        })
    }

    pub fn live_config(&self) -> Arc<LiveConfig> {
        Arc::clone(&self.live_config)
    }

    pub fn sessions(&self) -> &Arc<SessionRegistry> {
        &self.sessions
    }

    /// Number of sessions currently registered.
    pub fn active_sessions(&self) -> usize {
        self.sessions.count()
    }

    /// Reserve a WebSocket slot for `ip`.
    ///
    /// The per-IP limit is checked first. On success the caller must pair this
    /// with [`release_connection`](Self::release_connection).
    pub fn try_acquire_connection(&self, ip: IpAddr) -> Result<(), ConnectionLimitError> {
        let result = {
            let mut per_ip = self.ip_connections.entry(ip).or_insert(0);
            if *per_ip >= self.config.max_connections_per_ip {
                Err(ConnectionLimitError::PerIpLimitReached)
            } else if !self.reserve_global_slot() {
                Err(ConnectionLimitError::GlobalLimitReached)
            } else {
                *per_ip += 1;
                Ok(())
            }
        };

        if result.is_err() {
            self.ip_connections.remove_if(&ip, |_, count| *count == 0);
        }
        result
    }

    /// Reserve a slot for `ip` that releases itself on drop.
    pub fn try_acquire_slot(
        self: &Arc<Self>,
        ip: IpAddr,
    ) -> Result<ConnectionSlot, ConnectionLimitError> {
        self.try_acquire_connection(ip)?;
        Ok(ConnectionSlot(Arc::new(SlotInner {
            state: Arc::clone(self),
            ip,
        })))
    }

    /// Return a slot taken by [`try_acquire_connection`](Self::try_acquire_connection).
    pub fn release_connection(&self, ip: IpAddr) {
        let _ = self
            .ws_connections
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));

        if let Some(mut per_ip) = self.ip_connections.get_mut(&ip) {
            *per_ip = per_ip.saturating_sub(1);
        }
        self.ip_connections.remove_if(&ip, |_, count| *count == 0);
    }

    pub fn ws_connection_count(&self) -> usize {
        self.ws_connections.load(Ordering::SeqCst)
    }

    pub fn ip_connection_count(&self, ip: &IpAddr) -> u32 {
        self.ip_connections.get(ip).map(|count| *count).unwrap_or(0)
    }

    fn reserve_global_slot(&self) -> bool {
        match self.config.max_websocket_connections {
            Some(max) => self
                .ws_connections
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                    (n < max).then_some(n + 1)
                })
                .is_ok(),
            None => {
                self.ws_connections.fetch_add(1, Ordering::SeqCst);
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn limited_state(global: Option<usize>, per_ip: u32) -> Arc<AppState> {
        let mut config = ServerConfig::new("test-key");
        config.max_websocket_connections = global;
        config.max_connections_per_ip = per_ip;
        AppState::new(config)
    }

    #[test]
    fn test_connection_tracking_basic() {
        let state = limited_state(Some(10), 3);
        let ip: IpAddr = Ipv4Addr::new(192, 168, 1, 100).into();

        assert_eq!(state.ws_connection_count(), 0);
        assert_eq!(state.ip_connection_count(&ip), 0);

        for expected in 1..=3 {
            assert!(state.try_acquire_connection(ip).is_ok());
            assert_eq!(state.ws_connection_count(), expected);
            assert_eq!(state.ip_connection_count(&ip), expected as u32);
        }

        assert_eq!(
            state.try_acquire_connection(ip),
            Err(ConnectionLimitError::PerIpLimitReached)
        );
        assert_eq!(state.ws_connection_count(), 3);

        state.release_connection(ip);
        assert_eq!(state.ws_connection_count(), 2);
        assert!(state.try_acquire_connection(ip).is_ok());
    }

    #[test]
    fn test_global_connection_limit() {
        let state = limited_state(Some(5), 10);
        let ips: Vec<IpAddr> = (1..=6)
            .map(|i| Ipv4Addr::new(10, 0, 0, i).into())
            .collect();

        for ip in &ips[0..5] {
            assert!(state.try_acquire_connection(*ip).is_ok());
        }

        assert_eq!(
            state.try_acquire_connection(ips[5]),
            Err(ConnectionLimitError::GlobalLimitReached)
        );
        // A refused IP leaves no bookkeeping behind
        assert_eq!(state.ip_connection_count(&ips[5]), 0);

        state.release_connection(ips[0]);
        assert!(state.try_acquire_connection(ips[5]).is_ok());
    }

    #[test]
    fn test_release_without_acquire_saturates() {
        let state = limited_state(None, 2);
        let ip: IpAddr = Ipv4Addr::LOCALHOST.into();

        state.release_connection(ip);
        assert_eq!(state.ws_connection_count(), 0);
        assert_eq!(state.ip_connection_count(&ip), 0);
    }

    #[test]
    fn test_slot_released_when_last_clone_drops() {
        let state = limited_state(Some(2), 1);
        let ip: IpAddr = Ipv4Addr::new(172, 16, 0, 9).into();

        let slot = state.try_acquire_slot(ip).unwrap();
        let moved_into_callback = slot.clone();
        assert_eq!(slot.ip(), ip);
        assert_eq!(state.ws_connection_count(), 1);
        assert_eq!(
            state.try_acquire_slot(ip).unwrap_err(),
            ConnectionLimitError::PerIpLimitReached
        );

        // The upgrade callback is dropped without ever running
        drop(moved_into_callback);
        assert_eq!(state.ws_connection_count(), 1);

        drop(slot);
        assert_eq!(state.ws_connection_count(), 0);
        assert_eq!(state.ip_connection_count(&ip), 0);
        assert!(state.try_acquire_slot(ip).is_ok());
    }

    #[test]
    fn test_live_config_shared() {
        let state = limited_state(None, 1);
        let a = state.live_config();
        let b = state.live_config();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(state.active_sessions(), 0);
    }
}
