//! Per-client-IP request limit, token bucket via `governor`.

use std::{
    net::{IpAddr, SocketAddr},
    num::NonZeroU32,
    sync::Arc,
    time::Duration,
};

use axum::{
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use governor::{DefaultKeyedRateLimiter, Quota, RateLimiter};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::{config::RateLimitConfig, error::AppError};

/// `max_requests` per `window_secs`, refilled evenly; a fresh client may
/// spend the whole allowance at once.
#[derive(Clone)]
pub struct IpRateLimiter {
    limiter: Arc<DefaultKeyedRateLimiter<IpAddr>>,
}

impl IpRateLimiter {
    pub fn new(cfg: &RateLimitConfig) -> anyhow::Result<Self> {
        let burst = NonZeroU32::new(cfg.max_requests)
            .ok_or_else(|| anyhow::anyhow!("RATE_LIMIT_MAX_REQUESTS must be positive"))?;
        let window = Duration::from_secs(cfg.window_secs.max(1));
        let quota = Quota::with_period(window / burst.get())
            .ok_or_else(|| anyhow::anyhow!("rate limit period must be non-zero"))?
            .allow_burst(burst);
        Ok(Self {
            limiter: Arc::new(RateLimiter::keyed(quota)),
        })
    }

    pub fn check(&self, ip: IpAddr) -> bool {
        self.limiter.check_key(&ip).is_ok()
    }

    /// Forgets clients whose bucket has fully refilled, so the key map only
    /// holds addresses seen within the last window.
    pub fn prune(&self) {
        self.limiter.retain_recent();
        self.limiter.shrink_to_fit();
    }

    pub fn tracked_clients(&self) -> usize {
        self.limiter.len()
    }

    /// Runs [`prune`](Self::prune) every `every` on the current runtime.
    pub fn spawn_pruner(&self, every: Duration) -> JoinHandle<()> {
        let limiter = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            loop {
                ticker.tick().await;
                limiter.prune();
                debug!(tracked = limiter.tracked_clients(), "rate limiter pruned");
            }
        })
    }
}

pub async fn limit_by_ip(
    State(limiter): State<IpRateLimiter>,
    req: Request,
    next: Next,
) -> Response {
    let peer = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip());
    if let Some(ip) = peer {
        if !limiter.check(ip) {
            warn!(ip = %ip, "rate limit exceeded");
            return AppError::TooManyRequests.into_response();
        }
    }
    next.run(req).await
}
