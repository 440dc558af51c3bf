//! Redis client built on `redis`' multiplexed async connection.

use redis::aio::MultiplexedConnection;

use super::{ServiceConnection, ServiceDialer, ServiceFuture};
use crate::endpoint::Endpoint;
use crate::error::ServiceError;

const PONG: &str = "PONG";

/// Dials Redis servers over plain TCP.
#[derive(Debug, Clone, Copy, Default)]
pub struct RedisDialer {
    database: u16,
}

impl RedisDialer {
    /// Create a dialer selecting database `0`.
    #[must_use]
    pub const fn new() -> Self {
        Self { database: 0 }
    }

    /// Select a logical database on every new connection.
    #[must_use]
    pub const fn with_database(mut self, database: u16) -> Self {
        self.database = database;
        self
    }

    fn url_for(&self, endpoint: &Endpoint) -> String {
        format!("redis://{endpoint}/{}", self.database)
    }
}

impl ServiceDialer for RedisDialer {
    type Connection = RedisConnection;

    fn dial(&self, endpoint: &Endpoint) -> ServiceFuture<'_, Self::Connection> {
        let address = endpoint.to_string();
        let url = self.url_for(endpoint);

        Box::pin(async move {
            let dial_failed = |error: redis::RedisError| ServiceError::DialFailed {
                address: address.clone(),
                message: error.to_string(),
            };

            let client = redis::Client::open(url.as_str()).map_err(dial_failed)?;
            let connection = client
                .get_multiplexed_async_connection()
                .await
                .map_err(dial_failed)?;

            tracing::debug!(address = %address, "dialed redis");
            Ok(RedisConnection { inner: connection })
        })
    }
}

/// A live Redis connection.
#[derive(Clone)]
pub struct RedisConnection {
    inner: MultiplexedConnection,
}

impl RedisConnection {
    /// Borrow the underlying connection for issuing commands.
    pub const fn connection_mut(&mut self) -> &mut MultiplexedConnection {
        &mut self.inner
    }
}

impl std::fmt::Debug for RedisConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisConnection").finish_non_exhaustive()
    }
}

impl ServiceConnection for RedisConnection {
    fn probe(&mut self) -> ServiceFuture<'_, ()> {
        Box::pin(async move {
            let reply: String = redis::cmd("PING")
                .query_async(&mut self.inner)
                .await
                .map_err(|error| ServiceError::ProbeFailed {
                    message: error.to_string(),
                })?;

            if reply == PONG {
                Ok(())
            } else {
                Err(ServiceError::ProbeFailed {
                    message: format!("unexpected PING reply '{reply}'"),
                })
            }
        })
    }
}
