//! Per-IP rate limiting (§5: "Rate-limiter map (IP → limiter) — external
//! collaborator, write-once per IP with double-checked lookup").

use std::{
    collections::HashMap,
    net::IpAddr,
    num::NonZeroU32,
    sync::Arc,
};

use governor::{
    clock::DefaultClock,
    state::{
        InMemoryState,
        NotKeyed,
    },
    Quota,
    RateLimiter,
};
use tokio::sync::RwLock;

type PerIpLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

pub struct RateLimiterMap {
    quota: Quota,
    limiters: RwLock<HashMap<IpAddr, Arc<PerIpLimiter>>>,
}

impl RateLimiterMap {
    pub fn new(rps: u32, burst: u32) -> Self {
        let per_second = NonZeroU32::new(rps.max(1)).expect("rps.max(1) is nonzero");
        let burst = NonZeroU32::new(burst.max(1)).expect("burst.max(1) is nonzero");
        Self {
            quota: Quota::per_second(per_second).allow_burst(burst),
            limiters: RwLock::new(HashMap::new()),
        }
    }

    /// `true` if the request for `ip` may proceed. Looks up the limiter
    /// under a read lock first; only takes the write lock to insert one for
    /// an IP seen for the first time (double-checked to avoid a race
    /// clobbering a concurrently-inserted limiter).
    pub async fn check(&self, ip: IpAddr) -> bool {
        if let Some(limiter) = self.limiters.read().await.get(&ip) {
            return limiter.check().is_ok();
        }

        let limiter = {
            let mut limiters = self.limiters.write().await;
            limiters
                .entry(ip)
                .or_insert_with(|| Arc::new(RateLimiter::direct(self.quota)))
                .clone()
        };
        limiter.check().is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn allows_burst_then_throttles() {
        let limiter = RateLimiterMap::new(1, 2);
        let ip: IpAddr = "127.0.0.1".parse().unwrap();
        assert!(limiter.check(ip).await);
        assert!(limiter.check(ip).await);
        assert!(!limiter.check(ip).await);
    }

    #[tokio::test]
    async fn tracks_ips_independently() {
        let limiter = RateLimiterMap::new(1, 1);
        let a: IpAddr = "127.0.0.1".parse().unwrap();
        let b: IpAddr = "127.0.0.2".parse().unwrap();
        assert!(limiter.check(a).await);
        assert!(!limiter.check(a).await);
        assert!(limiter.check(b).await);
    }
}
