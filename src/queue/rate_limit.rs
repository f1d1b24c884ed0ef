//! Per-kind dispatch rate limits

use crate::config::RateLimitConfig;
use crate::queue::TaskKind;
use crate::ConfigError;
use governor::clock::{Clock, DefaultClock};
use governor::{Quota, RateLimiter};
use std::collections::HashMap;
use std::num::NonZeroU32;
use std::time::Duration;

type DirectLimiter = RateLimiter<
    governor::state::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// A dispatch rate such as `20/m`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateSpec {
    pub count: NonZeroU32,
    pub per: Duration,
}

impl RateSpec {
    /// Parses `N/s`, `N/m` or `N/h`
    ///
    /// # Arguments
    ///
    /// * `spec` - Rate string from the config file
    ///
    /// # Returns
    ///
    /// * `Ok(RateSpec)` - Parsed rate
    /// * `Err(ConfigError::InvalidRateLimit)` - Malformed string or zero count
    pub fn parse(spec: &str) -> Result<Self, ConfigError> {
        let invalid = || ConfigError::InvalidRateLimit(spec.to_string());

        let (count, unit) = spec.trim().split_once('/').ok_or_else(invalid)?;
        let count: u32 = count.trim().parse().map_err(|_| invalid())?;
        let count = NonZeroU32::new(count).ok_or_else(invalid)?;

        let per = match unit.trim() {
            "s" => Duration::from_secs(1),
            "m" => Duration::from_secs(60),
            "h" => Duration::from_secs(3600),
            _ => return Err(invalid()),
        };

        Ok(Self { count, per })
    }

    /// Interval between two dispatches at this rate
    pub fn interval(&self) -> Duration {
        self.per / self.count.get()
    }

    /// Quota admitting one dispatch per interval, no bursts
    pub fn quota(&self) -> Option<Quota> {
        Quota::with_period(self.interval())
    }
}

/// One limiter per task kind
///
/// Kinds without a limiter are dispatched as fast as workers free up.
pub struct KindLimiters {
    limiters: HashMap<TaskKind, DirectLimiter>,
    clock: DefaultClock,
}

impl KindLimiters {
    /// Limiters that never hold anything back
    pub fn unlimited() -> Self {
        Self {
            limiters: HashMap::new(),
            clock: DefaultClock::default(),
        }
    }

    /// Builds limiters for all three kinds from the config
    pub fn from_config(config: &RateLimitConfig) -> Result<Self, ConfigError> {
        let mut limiters = Self::unlimited();
        limiters.set(TaskKind::ScrapeRegion, RateSpec::parse(&config.scrape_region)?)?;
        limiters.set(TaskKind::ScrapePage, RateSpec::parse(&config.scrape_page)?)?;
        limiters.set(TaskKind::ScrapeItem, RateSpec::parse(&config.scrape_item)?)?;
        Ok(limiters)
    }

    /// Replaces the limiter for `kind`
    pub fn set(&mut self, kind: TaskKind, rate: RateSpec) -> Result<(), ConfigError> {
        let quota = rate.quota().ok_or_else(|| {
            ConfigError::InvalidRateLimit(format!("{}/{:?}", rate.count, rate.per))
        })?;
        self.limiters.insert(kind, RateLimiter::direct(quota));
        Ok(())
    }

    /// Takes a dispatch permit for `kind` if one is available
    ///
    /// # Returns
    ///
    /// * `Ok(())` - Permit taken, dispatch now
    /// * `Err(wait)` - No permit; the next one frees up after `wait`
    pub fn check(&self, kind: TaskKind) -> Result<(), Duration> {
        match self.limiters.get(&kind) {
            None => Ok(()),
            Some(limiter) => limiter
                .check()
                .map_err(|not_until| not_until.wait_time_from(self.clock.now())),
        }
    }
}
