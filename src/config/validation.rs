use crate::config::types::{
    CatalogConfig, Config, QueueConfig, SiteConfig, StalenessConfig, StorageConfig,
    UserAgentConfig, MAX_STALENESS_DAYS,
};
use crate::queue::RateSpec;
use crate::ConfigError;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_site_config(&config.site)?;
    validate_user_agent_config(&config.user_agent)?;
    validate_storage_config(&config.storage)?;
    validate_queue_config(&config.queue)?;
    validate_staleness_config(&config.staleness)?;
    validate_catalog_config(&config.catalog)?;
    Ok(())
}

/// Validates origin site addresses
fn validate_site_config(config: &SiteConfig) -> Result<(), ConfigError> {
    validate_http_url("base_url", &config.base_url)?;
    validate_http_url("page_count_endpoint", &config.page_count_endpoint())?;
    Ok(())
}

fn validate_http_url(name: &str, value: &str) -> Result<(), ConfigError> {
    let url = Url::parse(value)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid {} '{}': {}", name, value, e)))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ConfigError::Validation(format!(
            "{} '{}' must use HTTP or HTTPS",
            name, value
        )));
    }

    Ok(())
}

/// Validates user agent configuration
fn validate_user_agent_config(config: &UserAgentConfig) -> Result<(), ConfigError> {
    // Validate crawler name: non-empty, alphanumeric + hyphens only
    if config.crawler_name.is_empty() {
        return Err(ConfigError::Validation(
            "crawler_name cannot be empty".to_string(),
        ));
    }

    if !config
        .crawler_name
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-')
    {
        return Err(ConfigError::Validation(format!(
            "crawler_name must contain only alphanumeric characters and hyphens, got '{}'",
            config.crawler_name
        )));
    }

    Url::parse(&config.contact_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid contact_url: {}", e)))?;

    validate_email(&config.contact_email)?;

    Ok(())
}

fn validate_storage_config(config: &StorageConfig) -> Result<(), ConfigError> {
    if config.database_path.is_empty() {
        return Err(ConfigError::Validation(
            "storage database_path cannot be empty".to_string(),
        ));
    }
    Ok(())
}

/// Validates queue and worker settings
fn validate_queue_config(config: &QueueConfig) -> Result<(), ConfigError> {
    if config.database_path.is_empty() {
        return Err(ConfigError::Validation(
            "queue database_path cannot be empty".to_string(),
        ));
    }

    if config.workers < 1 || config.workers > 64 {
        return Err(ConfigError::Validation(format!(
            "workers must be between 1 and 64, got {}",
            config.workers
        )));
    }

    if config.poll_interval_ms < 10 {
        return Err(ConfigError::Validation(format!(
            "poll_interval_ms must be >= 10ms, got {}ms",
            config.poll_interval_ms
        )));
    }

    if config.visibility_timeout_secs < 1 {
        return Err(ConfigError::Validation(
            "visibility_timeout_secs must be >= 1".to_string(),
        ));
    }

    if config.max_attempts < 1 {
        return Err(ConfigError::Validation(
            "max_attempts must be >= 1".to_string(),
        ));
    }

    if config.default_limit < 1 {
        return Err(ConfigError::Validation(
            "default_limit must be >= 1".to_string(),
        ));
    }

    RateSpec::parse(&config.rate_limits.scrape_region)?;
    RateSpec::parse(&config.rate_limits.scrape_page)?;
    RateSpec::parse(&config.rate_limits.scrape_item)?;

    Ok(())
}

fn validate_staleness_config(config: &StalenessConfig) -> Result<(), ConfigError> {
    if !(1..=MAX_STALENESS_DAYS).contains(&config.refresh_after_days) {
        return Err(ConfigError::Validation(format!(
            "refresh_after_days must be between 1 and {}, got {}",
            MAX_STALENESS_DAYS, config.refresh_after_days
        )));
    }

    if !(0..=MAX_STALENESS_DAYS).contains(&config.hint_grace_days) {
        return Err(ConfigError::Validation(format!(
            "hint_grace_days must be between 0 and {}, got {}",
            MAX_STALENESS_DAYS, config.hint_grace_days
        )));
    }

    Ok(())
}

/// Validates the region and category tables
fn validate_catalog_config(config: &CatalogConfig) -> Result<(), ConfigError> {
    if config.regions.is_empty() {
        return Err(ConfigError::Validation(
            "catalog must list at least one region".to_string(),
        ));
    }

    if config.categories.is_empty() {
        return Err(ConfigError::Validation(
            "catalog must list at least one category".to_string(),
        ));
    }

    for slug in config.regions.iter().chain(config.categories.iter()) {
        validate_slug(slug)?;
    }

    Ok(())
}

/// Slugs end up as URL path segments
fn validate_slug(slug: &str) -> Result<(), ConfigError> {
    if slug.is_empty()
        || !slug
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-')
    {
        return Err(ConfigError::Validation(format!(
            "catalog entry '{}' must be a lowercase slug",
            slug
        )));
    }
    Ok(())
}

/// Basic email validation
fn validate_email(email: &str) -> Result<(), ConfigError> {
    if email.is_empty() {
        return Err(ConfigError::Validation(
            "contact_email cannot be empty".to_string(),
        ));
    }

    let parts: Vec<&str> = email.split('@').collect();
    if parts.len() != 2 {
        return Err(ConfigError::Validation(format!(
            "Invalid email format: '{}'",
            email
        )));
    }

    let local = parts[0];
    let domain = parts[1];

    if local.is_empty() || domain.is_empty() {
        return Err(ConfigError::Validation(format!(
            "Invalid email format: '{}'",
            email
        )));
    }

    if !domain.contains('.') {
        return Err(ConfigError::Validation(format!(
            "Invalid email domain: '{}'",
            email
        )));
    }

    Ok(())
}
