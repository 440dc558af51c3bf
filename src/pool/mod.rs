//! A resilient connection pool for a containerised service.
//!
//! The service inside a freshly started container may accept TCP
//! connections before it can answer requests, and connections may go stale
//! while a test is idle. The pool therefore probes every connection it hands
//! out, evicts idle connections past their timeout, and replaces broken
//! connections transparently.
//!
//! Pooling is delegated to `deadpool`'s managed pool. A manager type
//! supplies the dial and probe logic. `max_active` bounds the connections
//! alive at once and `max_idle` bounds the ones kept between borrows.

use std::borrow::Cow;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::time::Duration;

use deadpool::managed::{self, Metrics, Object, RecycleError, RecycleResult};
use tokio::time::timeout;

use crate::endpoint::Endpoint;
use crate::error::{ConfigError, PoolError, ServiceError, TestpodError};
use crate::service::{ServiceConnection, ServiceDialer};

/// Default ceiling on connections kept idle between borrows.
pub const DEFAULT_MAX_IDLE: usize = 3;

/// Default ceiling on connections alive at once, borrowed or idle.
pub const DEFAULT_MAX_ACTIVE: usize = 64;

/// Default idle time after which a pooled connection is evicted.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(60);

/// Default bound on a single dial.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Default bound on waiting for a free pool slot.
pub const DEFAULT_WAIT_TIMEOUT: Duration = Duration::from_secs(5);

/// Tuning for a [`ServicePool`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolSettings {
    /// Maximum number of connections kept idle between borrows. Must be
    /// non-zero.
    pub max_idle: usize,

    /// Maximum number of connections alive at once. Must be at least
    /// `max_idle`.
    pub max_active: usize,

    /// Connections not borrowed for this long are evicted.
    ///
    /// Measured from the start of the last borrow, so a connection held
    /// longer than this is evicted as soon as it is returned.
    pub idle_timeout: Duration,

    /// Upper bound on opening and probing a new connection.
    pub connect_timeout: Duration,

    /// Upper bound on waiting for a connection when the pool is at capacity.
    pub wait_timeout: Duration,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max_idle: DEFAULT_MAX_IDLE,
            max_active: DEFAULT_MAX_ACTIVE,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            wait_timeout: DEFAULT_WAIT_TIMEOUT,
        }
    }
}

impl PoolSettings {
    /// Validate the settings.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` when `max_idle` is zero or
    /// `max_active` is below `max_idle`.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_idle == 0 {
            return Err(ConfigError::InvalidValue {
                field: String::from("pool.max_idle"),
                reason: String::from("must be at least 1"),
            });
        }
        if self.max_active < self.max_idle {
            return Err(ConfigError::InvalidValue {
                field: String::from("pool.max_active"),
                reason: format!("must be at least max_idle ({})", self.max_idle),
            });
        }
        Ok(())
    }
}

/// `deadpool` manager that dials and probes service connections.
struct ServiceManager<D: ServiceDialer> {
    dialer: Arc<D>,
    endpoint: Endpoint,
    idle_timeout: Duration,
    connect_timeout: Duration,
}

impl<D: ServiceDialer> ServiceManager<D> {
    async fn dial_with_timeout(&self) -> Result<D::Connection, ServiceError> {
        timeout(self.connect_timeout, self.dialer.dial(&self.endpoint))
            .await
            .map_err(|_| ServiceError::DialTimeout {
                address: self.endpoint.to_string(),
                timeout_ms: self.connect_timeout.as_millis(),
            })?
    }
}

impl<D: ServiceDialer> managed::Manager for ServiceManager<D> {
    type Type = D::Connection;
    type Error = ServiceError;

    async fn create(&self) -> Result<D::Connection, ServiceError> {
        let mut connection = self.dial_with_timeout().await?;
        connection.probe().await?;
        tracing::debug!(endpoint = %self.endpoint, "opened pooled connection");
        Ok(connection)
    }

    async fn recycle(
        &self,
        connection: &mut D::Connection,
        metrics: &Metrics,
    ) -> RecycleResult<ServiceError> {
        // `last_used` counts from the previous recycle, i.e. the last borrow.
        if metrics.last_used() >= self.idle_timeout {
            return Err(RecycleError::Message(Cow::Borrowed("idle timeout exceeded")));
        }

        connection.probe().await.map_err(|error| {
            tracing::debug!(endpoint = %self.endpoint, error = %error, "discarding stale connection");
            RecycleError::Backend(error)
        })
    }
}

/// A pool of probed connections to one service endpoint.
///
/// Cloning is cheap and clones share the same connections.
pub struct ServicePool<D: ServiceDialer> {
    pool: managed::Pool<ServiceManager<D>>,
    endpoint: Endpoint,
    settings: PoolSettings,
}

impl<D: ServiceDialer> Clone for ServicePool<D> {
    fn clone(&self) -> Self {
        Self {
            pool: self.pool.clone(),
            endpoint: self.endpoint.clone(),
            settings: self.settings,
        }
    }
}

impl<D: ServiceDialer> std::fmt::Debug for ServicePool<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServicePool")
            .field("endpoint", &self.endpoint)
            .field("settings", &self.settings)
            .field("status", &self.pool.status())
            .finish()
    }
}

impl<D: ServiceDialer> ServicePool<D> {
    /// Build a pool for `endpoint`.
    ///
    /// One connection is dialed and closed immediately so an unreachable
    /// endpoint is reported here rather than at the first borrow.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` for invalid settings and
    /// `PoolError::EndpointUnreachable` when the eager dial fails.
    pub async fn build(
        dialer: Arc<D>,
        endpoint: Endpoint,
        settings: PoolSettings,
    ) -> Result<Self, TestpodError> {
        settings.validate()?;

        let manager = ServiceManager {
            dialer,
            endpoint: endpoint.clone(),
            idle_timeout: settings.idle_timeout,
            connect_timeout: settings.connect_timeout,
        };

        let eager = manager.dial_with_timeout().await.map_err(|error| {
            TestpodError::from(PoolError::EndpointUnreachable {
                endpoint: endpoint.to_string(),
                message: error.to_string(),
            })
        })?;
        if let Err(error) = eager.close().await {
            tracing::debug!(endpoint = %endpoint, error = %error, "closing eager connection failed");
        }

        let pool = managed::Pool::builder(manager)
            .max_size(settings.max_active)
            .wait_timeout(Some(settings.wait_timeout))
            .runtime(deadpool::Runtime::Tokio1)
            .build()
            .map_err(|error| {
                TestpodError::from(ConfigError::InvalidValue {
                    field: String::from("pool"),
                    reason: error.to_string(),
                })
            })?;

        tracing::info!(
            endpoint = %endpoint,
            max_idle = settings.max_idle,
            max_active = settings.max_active,
            "connection pool ready"
        );
        Ok(Self {
            pool,
            endpoint,
            settings,
        })
    }

    /// Borrow a live connection.
    ///
    /// Idle connections past the idle timeout are evicted first. A cached
    /// connection whose probe fails is discarded and a new one is dialed.
    ///
    /// # Errors
    ///
    /// Returns `PoolError::ExhaustedOrDialFailed` when `max_active`
    /// connections are borrowed and none is returned within the wait
    /// timeout, or when a new connection cannot be dialed and probed.
    pub async fn get(&self) -> Result<PooledConnection<D>, TestpodError> {
        let trim = self.idle_trim();
        trim.trim();

        let object = self.pool.get().await.map_err(|error| {
            TestpodError::from(PoolError::ExhaustedOrDialFailed {
                message: error.to_string(),
            })
        })?;

        Ok(PooledConnection { object, trim })
    }

    /// Return the endpoint this pool dials.
    #[must_use]
    pub const fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Return the settings the pool was built with.
    #[must_use]
    pub const fn settings(&self) -> &PoolSettings {
        &self.settings
    }

    /// Number of connections currently held idle by the pool.
    #[must_use]
    pub fn idle_count(&self) -> usize {
        self.pool.status().available
    }

    /// Drop every idle connection and refuse further borrows.
    pub fn close(&self) {
        self.pool.close();
    }

    fn idle_trim(&self) -> IdleTrim<D> {
        IdleTrim {
            pool: self.pool.clone(),
            max_idle: self.settings.max_idle,
            idle_timeout: self.settings.idle_timeout,
        }
    }
}

/// Enforces `max_idle` and `idle_timeout` over the idle connections.
///
/// Held by every [`PooledConnection`] and dropped after its object, so the
/// trim runs once the connection is back in the pool.
struct IdleTrim<D: ServiceDialer> {
    pool: managed::Pool<ServiceManager<D>>,
    max_idle: usize,
    idle_timeout: Duration,
}

impl<D: ServiceDialer> IdleTrim<D> {
    fn trim(&self) {
        let mut kept = 0_usize;
        let evicted = self
            .pool
            .retain(|_, metrics| {
                let keep = kept < self.max_idle && metrics.last_used() < self.idle_timeout;
                if keep {
                    kept += 1;
                }
                keep
            })
            .removed
            .len();

        if evicted > 0 {
            tracing::debug!(evicted, "evicted idle connections");
        }
    }
}

impl<D: ServiceDialer> Drop for IdleTrim<D> {
    fn drop(&mut self) {
        self.trim();
    }
}

/// A connection borrowed from a [`ServicePool`].
///
/// Dropping it returns the connection to the pool without probing; the
/// probe then happens at the next borrow.
pub struct PooledConnection<D: ServiceDialer> {
    // Field order matters: the object returns to the pool before the trim.
    object: Object<ServiceManager<D>>,
    trim: IdleTrim<D>,
}

impl<D: ServiceDialer> PooledConnection<D> {
    /// Probe the connection and return it to the pool.
    ///
    /// # Errors
    ///
    /// Returns the probe failure, in which case the connection was
    /// discarded instead of being returned.
    pub async fn release(mut self) -> Result<(), ServiceError> {
        match self.object.probe().await {
            Ok(()) => Ok(()),
            Err(error) => {
                tracing::debug!(error = %error, "discarding connection that failed release probe");
                self.discard().await;
                Err(error)
            }
        }
    }

    /// Close the connection without returning it to the pool.
    pub async fn discard(self) {
        let Self { object, trim } = self;
        let connection = Object::take(object);
        drop(trim);
        if let Err(error) = connection.close().await {
            tracing::debug!(error = %error, "closing discarded connection failed");
        }
    }
}

impl<D: ServiceDialer> Deref for PooledConnection<D> {
    type Target = D::Connection;

    fn deref(&self) -> &Self::Target {
        &self.object
    }
}

impl<D: ServiceDialer> DerefMut for PooledConnection<D> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.object
    }
}
