use crate::{chain::ChainId, error::TrackerError, settings::ChainRpcSettings};
use governor::{
    Quota, RateLimiter,
    clock::Clock,
    middleware::StateInformationMiddleware,
    state::{InMemoryState, NotKeyed},
};
use parking_lot::Mutex;
use std::{collections::HashMap, num::NonZeroU32, sync::Arc, time::Instant};
use tokio_util::sync::CancellationToken;

pub const PRIMARY_PRIORITY: u32 = 1;
pub const FALLBACK_PRIORITY: u32 = 2;

/// Clock driven by tokio time, so rate limits follow a paused runtime clock in tests.
#[derive(Clone, Copy, Debug, Default)]
pub struct TokioClock;

impl Clock for TokioClock {
    type Instant = Instant;

    fn now(&self) -> Self::Instant {
        tokio::time::Instant::now().into_std()
    }
}

type Limiter = RateLimiter<NotKeyed, InMemoryState, TokioClock, StateInformationMiddleware>;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EndpointConfig {
    pub url: String,
    pub priority: u32,
    pub requests_per_minute: u32,
}

/// A single RPC/API base url of a chain with its own request budget.
pub struct Endpoint {
    cfg: EndpointConfig,
    limiter: Limiter,
    quota: Quota,
    clock: TokioClock,
    /// Remaining burst capacity observed on the last limiter check, and when.
    last_seen: Mutex<(u32, Instant)>,
}

impl std::fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Endpoint")
            .field("url", &self.cfg.url)
            .field("priority", &self.cfg.priority)
            .field("requests_per_minute", &self.cfg.requests_per_minute)
            .finish()
    }
}

impl Endpoint {
    pub fn new(cfg: EndpointConfig) -> Result<Self, TrackerError> {
        let rpm = NonZeroU32::new(cfg.requests_per_minute).ok_or_else(|| {
            TrackerError::Configuration(format!(
                "requests per minute must be positive for {}",
                cfg.url
            ))
        })?;
        let quota = Quota::per_minute(rpm);
        let clock = TokioClock;
        let limiter = RateLimiter::direct_with_clock(quota, clock)
            .with_middleware::<StateInformationMiddleware>();
        Ok(Self {
            last_seen: Mutex::new((quota.burst_size().get(), clock.now())),
            cfg,
            limiter,
            quota,
            clock,
        })
    }

    pub fn url(&self) -> &str {
        &self.cfg.url
    }

    pub fn priority(&self) -> u32 {
        self.cfg.priority
    }

    pub fn config(&self) -> &EndpointConfig {
        &self.cfg
    }

    /// Estimated number of requests that could be dispatched right now.
    pub fn available_tokens(&self) -> u32 {
        let (remaining, observed_at) = *self.last_seen.lock();
        let burst = self.quota.burst_size().get();
        let elapsed = self.clock.now().saturating_duration_since(observed_at);
        let replenish = self.quota.replenish_interval().as_nanos().max(1);
        let replenished = (elapsed.as_nanos() / replenish).min(u128::from(burst)) as u32;
        remaining.saturating_add(replenished).min(burst)
    }

    /// Waits until the limiter admits one request. Cancel by dropping the future.
    pub async fn until_ready(&self) {
        loop {
            match self.limiter.check() {
                Ok(snapshot) => {
                    *self.last_seen.lock() = (snapshot.remaining_burst_capacity(), self.clock.now());
                    return;
                }
                Err(not_until) => {
                    let now = self.clock.now();
                    *self.last_seen.lock() = (0, now);
                    tokio::time::sleep(not_until.wait_time_from(now)).await;
                }
            }
        }
    }

    /// Waits for a rate-limit token, returning `Cancelled` as soon as `cancel` fires.
    pub async fn wait(&self, cancel: &CancellationToken) -> Result<(), TrackerError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(TrackerError::Cancelled),
            _ = self.until_ready() => Ok(()),
        }
    }
}

/// Ranked set of endpoints for one chain.
#[derive(Debug)]
pub struct ProviderPool {
    chain_id: ChainId,
    endpoints: Vec<Arc<Endpoint>>,
}

impl ProviderPool {
    pub fn new(chain_id: ChainId, configs: Vec<EndpointConfig>) -> Result<Self, TrackerError> {
        if !configs.iter().any(|c| c.priority == PRIMARY_PRIORITY) {
            return Err(TrackerError::Configuration(format!(
                "chain {chain_id} has no primary endpoint"
            )));
        }
        let endpoints = configs
            .into_iter()
            .map(|cfg| Endpoint::new(cfg).map(Arc::new))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            chain_id,
            endpoints,
        })
    }

    pub fn from_settings(chain_id: ChainId, settings: &ChainRpcSettings) -> Result<Self, TrackerError> {
        Self::new(chain_id, endpoint_configs(chain_id, settings)?)
    }

    pub fn chain_id(&self) -> ChainId {
        self.chain_id
    }

    pub fn endpoints(&self) -> &[Arc<Endpoint>] {
        &self.endpoints
    }

    /// All endpoints, most available first. Ties go to the lower priority value.
    pub fn list_by_score(&self) -> Vec<Arc<Endpoint>> {
        let mut scored: Vec<_> = self
            .endpoints
            .iter()
            .map(|e| (e.available_tokens(), e.priority(), e.clone()))
            .collect();
        // stable sort keeps configured order among equal fallbacks
        scored.sort_by(|(tokens_a, prio_a, _), (tokens_b, prio_b, _)| {
            tokens_b.cmp(tokens_a).then(prio_a.cmp(prio_b))
        });
        scored.into_iter().map(|(_, _, e)| e).collect()
    }

    pub fn select_best(&self) -> Arc<Endpoint> {
        self.list_by_score()
            .into_iter()
            .next()
            .unwrap_or_else(|| self.endpoints[0].clone())
    }
}

/// Expands primary and comma-separated fallback settings into endpoint configs.
pub fn endpoint_configs(
    chain_id: ChainId,
    settings: &ChainRpcSettings,
) -> Result<Vec<EndpointConfig>, TrackerError> {
    let mut configs = vec![EndpointConfig {
        url: settings.base_url.clone(),
        priority: PRIMARY_PRIORITY,
        requests_per_minute: settings.requests_per_minute,
    }];

    let urls = split_list(settings.fallback_urls.as_deref());
    let limits = split_list(settings.fallback_requests_per_minute.as_deref());
    if urls.len() != limits.len() {
        return Err(TrackerError::Configuration(format!(
            "chain {chain_id}: {} fallback urls but {} fallback rate limits",
            urls.len(),
            limits.len()
        )));
    }

    for (url, limit) in urls.into_iter().zip(limits) {
        let requests_per_minute = limit.parse::<u32>().map_err(|e| {
            TrackerError::Configuration(format!(
                "chain {chain_id}: invalid fallback rate limit '{limit}': {e}"
            ))
        })?;
        configs.push(EndpointConfig {
            url: url.to_string(),
            priority: FALLBACK_PRIORITY,
            requests_per_minute,
        });
    }
    Ok(configs)
}

fn split_list(value: Option<&str>) -> Vec<&str> {
    value
        .map(|v| {
            v.split(',')
                .map(str::trim)
                .filter(|item| !item.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

/// Provider pools of every configured chain, built once by the composition root.
#[derive(Debug, Default, Clone)]
pub struct ProviderPools {
    pools: HashMap<ChainId, Arc<ProviderPool>>,
}

impl ProviderPools {
    pub fn from_settings<'a>(
        chains: impl IntoIterator<Item = (ChainId, &'a ChainRpcSettings)>,
    ) -> Result<Self, TrackerError> {
        let pools = chains
            .into_iter()
            .map(|(chain_id, settings)| {
                ProviderPool::from_settings(chain_id, settings).map(|p| (chain_id, Arc::new(p)))
            })
            .collect::<Result<HashMap<_, _>, _>>()?;
        Ok(Self { pools })
    }

    pub fn insert(&mut self, pool: ProviderPool) {
        self.pools.insert(pool.chain_id(), Arc::new(pool));
    }

    pub fn get(&self, chain_id: ChainId) -> Option<Arc<ProviderPool>> {
        self.pools.get(&chain_id).cloned()
    }

    pub fn chains(&self) -> impl Iterator<Item = ChainId> + '_ {
        self.pools.keys().copied()
    }
}
