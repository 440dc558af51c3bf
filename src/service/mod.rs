//! Client seam for the network service running inside the container.
//!
//! The pool only needs to open a connection and check it is alive, so a
//! service is described by a [`ServiceDialer`] producing
//! [`ServiceConnection`]s. The Redis implementation lives in [`redis`].

pub mod redis;

use std::future::Future;
use std::pin::Pin;

use crate::endpoint::Endpoint;
use crate::error::ServiceError;

pub use self::redis::{RedisConnection, RedisDialer};

/// Boxed future type returned by service client implementors.
pub type ServiceFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, ServiceError>> + Send + 'a>>;

/// Opens connections to a service endpoint.
pub trait ServiceDialer: Send + Sync + 'static {
    /// The connection type produced by this dialer.
    type Connection: ServiceConnection;

    /// Open a new connection to `endpoint`.
    ///
    /// Implementations do not apply a timeout; the pool bounds each dial with
    /// its configured connect timeout.
    fn dial(&self, endpoint: &Endpoint) -> ServiceFuture<'_, Self::Connection>;
}

/// A single live connection to a service.
pub trait ServiceConnection: Send + 'static {
    /// Perform a cheap round trip proving the connection is usable.
    fn probe(&mut self) -> ServiceFuture<'_, ()>;

    /// Close the connection.
    ///
    /// The default implementation drops it.
    fn close(self) -> ServiceFuture<'static, ()>
    where
        Self: Sized,
    {
        Box::pin(async move {
            drop(self);
            Ok(())
        })
    }
}
