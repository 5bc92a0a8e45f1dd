//! Netlink Interface Events
//!
//! Implements InterfaceEvents on Linux by joining the rtnetlink multicast
//! groups for link, address and route changes.

use crate::domain::errors::WatcherError;
use crate::domain::ports::InterfaceEvents;
use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::{FutureExt, StreamExt};
use rtnetlink::constants::{
    RTMGRP_IPV4_IFADDR, RTMGRP_IPV4_ROUTE, RTMGRP_IPV6_IFADDR, RTMGRP_IPV6_ROUTE, RTMGRP_LINK,
};
use netlink_sys::{AsyncSocket, SocketAddr};
use tokio::task::JoinHandle;

/// Route-netlink subscription.
///
/// The socket lives inside a spawned connection task; dropping this value
/// aborts the task and closes the socket.
pub struct NetlinkInterfaceEvents {
    messages: BoxStream<'static, ()>,
    connection: JoinHandle<()>,
    // The connection shuts down once every handle is gone.
    _handle: rtnetlink::Handle,
}

impl NetlinkInterfaceEvents {
    /// Open the subscription. Must be called inside a Tokio runtime.
    pub fn open() -> Result<Self, WatcherError> {
        let (mut connection, handle, messages) =
            rtnetlink::new_connection().map_err(|e| WatcherError::Native(e.to_string()))?;

        let groups = RTMGRP_LINK
            | RTMGRP_IPV4_IFADDR
            | RTMGRP_IPV6_IFADDR
            | RTMGRP_IPV4_ROUTE
            | RTMGRP_IPV6_ROUTE;
        connection
            .socket_mut()
            .socket_mut()
            .bind(&SocketAddr::new(0, groups))
            .map_err(|e| WatcherError::Native(format!("bind netlink groups: {}", e)))?;

        let connection = tokio::spawn(connection);

        Ok(Self {
            messages: messages.map(|_| ()).boxed(),
            connection,
            _handle: handle,
        })
    }
}

impl Drop for NetlinkInterfaceEvents {
    fn drop(&mut self) {
        self.connection.abort();
    }
}

#[async_trait]
impl InterfaceEvents for NetlinkInterfaceEvents {
    async fn next_change(&mut self) -> Result<(), WatcherError> {
        match self.messages.next().await {
            Some(()) => {
                // One change usually arrives as several messages.
                while let Some(Some(())) = self.messages.next().now_or_never() {}
                Ok(())
            }
            None => Err(WatcherError::Closed),
        }
    }
}
