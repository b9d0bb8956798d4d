//! Checks that cannot be expressed in the schema types.
//!
//! Only the section used by the selected [`IngestMode`] is checked, so a
//! half-filled `[webhook]` table does not break a polling bot.

use std::str::FromStr;

use tgbee_core::UpdateType;

use super::error::{ConfigError, ConfigResult};
use super::schema::{
    BotConfig, DispatchSettings, IngestMode, LogFormat, LogOutput, LoggingConfig, PollingSettings,
    RetryConfig, TgbeeConfig, WebhookSettings,
};

/// Validates the entire configuration.
pub fn validate_config(config: &TgbeeConfig) -> ConfigResult<()> {
    check_bot(&config.bot)?;
    match config.mode {
        IngestMode::Polling => check_polling(&config.polling)?,
        IngestMode::Webhook => check_webhook(&config.webhook)?,
    }
    check_dispatch(&config.dispatch)?;
    check_logging(&config.logging)
}

/// Parses configured update type names.
pub(crate) fn parse_update_types(key: &str, names: &[String]) -> ConfigResult<Vec<UpdateType>> {
    names
        .iter()
        .map(|name| UpdateType::from_str(name).map_err(|e| ConfigError::invalid(key, e.to_string())))
        .collect()
}

fn positive(key: &str, value: u64) -> ConfigResult<()> {
    if value == 0 {
        return Err(ConfigError::invalid(key, "must be greater than 0"));
    }
    Ok(())
}

fn check_bot(bot: &BotConfig) -> ConfigResult<()> {
    if bot.token.as_deref().is_some_and(|t| t.trim().is_empty()) {
        return Err(ConfigError::invalid("bot.token", "must not be blank"));
    }
    check_url("bot.api_url", &bot.api_url, &["http://", "https://"])?;
    positive("bot.request_timeout_secs", bot.request_timeout_secs)
}

fn check_polling(polling: &PollingSettings) -> ConfigResult<()> {
    positive("polling.timeout_secs", polling.timeout_secs)?;
    if !(1..=100).contains(&polling.limit) {
        return Err(ConfigError::invalid(
            "polling.limit",
            format!("must be within 1..=100, got {}", polling.limit),
        ));
    }
    parse_update_types("polling.allowed_updates", &polling.allowed_updates)?;
    positive("polling.failure_threshold", u64::from(polling.failure_threshold))?;
    check_retry(&polling.retry)
}

fn check_retry(retry: &RetryConfig) -> ConfigResult<()> {
    positive("polling.retry.initial_delay_ms", retry.initial_delay_ms)?;
    if retry.max_delay_ms < retry.initial_delay_ms {
        return Err(ConfigError::invalid(
            "polling.retry.max_delay_ms",
            "must not be below initial_delay_ms",
        ));
    }
    if !retry.backoff_multiplier.is_finite() || retry.backoff_multiplier < 1.0 {
        return Err(ConfigError::invalid(
            "polling.retry.backoff_multiplier",
            "must be a finite number of at least 1.0",
        ));
    }
    Ok(())
}

fn check_webhook(webhook: &WebhookSettings) -> ConfigResult<()> {
    match webhook.port {
        None => return Err(ConfigError::missing_field("webhook.port")),
        Some(0) => return Err(ConfigError::invalid("webhook.port", "port 0 cannot be registered")),
        Some(_) => {}
    }
    if !webhook.path.starts_with('/') {
        return Err(ConfigError::invalid("webhook.path", "must start with '/'"));
    }
    if let Some(url) = &webhook.public_url {
        check_url("webhook.public_url", url, &["https://"])?;
    }
    if let Some(secret) = &webhook.secret_token {
        // 1-256 characters of A-Z, a-z, 0-9, `_` and `-`.
        let valid = (1..=256).contains(&secret.len())
            && secret
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !valid {
            return Err(ConfigError::invalid(
                "webhook.secret_token",
                "must be 1-256 characters of A-Z, a-z, 0-9, '_' or '-'",
            ));
        }
    }
    Ok(())
}

fn check_dispatch(dispatch: &DispatchSettings) -> ConfigResult<()> {
    positive("dispatch.max_in_flight", dispatch.max_in_flight as u64)?;
    positive("dispatch.queue_capacity", dispatch.queue_capacity as u64)
}

fn check_logging(logging: &LoggingConfig) -> ConfigResult<()> {
    if logging.output == LogOutput::File && logging.file_path.is_none() {
        return Err(ConfigError::missing_field("logging.file_path"));
    }
    if logging.format == LogFormat::Json && !cfg!(feature = "json-log") {
        return Err(ConfigError::invalid(
            "logging.format",
            "json needs the `json-log` feature",
        ));
    }
    if let Some(target) = logging
        .filters
        .keys()
        .find(|t| t.is_empty() || t.contains(char::is_whitespace))
    {
        return Err(ConfigError::invalid(
            "logging.filters",
            format!("{target:?} is not a module path"),
        ));
    }
    Ok(())
}

fn check_url(key: &str, url: &str, schemes: &[&str]) -> ConfigResult<()> {
    if url.is_empty() {
        return Err(ConfigError::missing_field(key));
    }
    if !schemes.iter().any(|s| url.starts_with(s)) {
        return Err(ConfigError::invalid_url(
            key,
            url,
            format!("expected a {} URL", schemes.join(" or ")),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rejected_key(config: &TgbeeConfig) -> Option<String> {
        validate_config(config)
            .err()
            .and_then(|e| e.key().map(str::to_string))
    }

    #[test]
    fn test_validate_default_config() {
        assert!(validate_config(&TgbeeConfig::default()).is_ok());
    }

    #[test]
    fn test_polling_errors_name_their_key() {
        let mut config = TgbeeConfig::default();
        config.polling.limit = 0;
        assert_eq!(rejected_key(&config).as_deref(), Some("polling.limit"));

        let mut config = TgbeeConfig::default();
        config.polling.allowed_updates = vec!["message".into(), "carrier_pigeon".into()];
        assert_eq!(
            rejected_key(&config).as_deref(),
            Some("polling.allowed_updates")
        );

        let mut config = TgbeeConfig::default();
        config.polling.retry.backoff_multiplier = 0.5;
        assert_eq!(
            rejected_key(&config).as_deref(),
            Some("polling.retry.backoff_multiplier")
        );
    }

    #[test]
    fn test_validate_webhook_requires_port() {
        let mut config = TgbeeConfig::default();
        config.mode = IngestMode::Webhook;
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::MissingField { .. })
        ));

        config.webhook.port = Some(8443);
        assert!(validate_config(&config).is_ok());

        config.webhook.public_url = Some("http://insecure.example".into());
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::InvalidUrl { .. })
        ));
    }

    #[test]
    fn test_unused_section_is_not_checked() {
        let mut config = TgbeeConfig::default();
        config.webhook.path = "no-slash".into();
        assert!(validate_config(&config).is_ok());

        config.mode = IngestMode::Webhook;
        config.webhook.port = Some(8443);
        assert_eq!(rejected_key(&config).as_deref(), Some("webhook.path"));
    }

    #[test]
    fn test_validate_file_logging_needs_path() {
        let mut config = TgbeeConfig::default();
        config.logging.output = LogOutput::File;
        assert_eq!(rejected_key(&config).as_deref(), Some("logging.file_path"));
    }
}
