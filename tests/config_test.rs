use std::time::Duration;

use assignment_notify::config::Config;
use assignment_notify::config::secrets::ExposeSecret;
use assignment_notify::error::Error;

const VARS: [&str; 7] = [
    "TELEGRAM_BOT_TOKEN",
    "TELEGRAM_API_BASE",
    "DATABASE_PATH",
    "ORGANIZATION_NAME",
    "SEND_TIMEOUT_SECS",
    "OTEL_ENDPOINT",
    "LOG_LEVEL",
];

fn clear() {
    for name in VARS {
        unsafe { std::env::remove_var(name) };
    }
}

// Environment is process-global, so every case runs in this one test.
#[test]
fn config_from_env() {
    clear();
    let result = Config::from_env();
    assert!(matches!(result, Err(Error::Config(_))));

    // defaults
    unsafe { std::env::set_var("DATABASE_PATH", "/tmp/assignments.db") };
    let config = Config::from_env().unwrap();
    assert_eq!(config.database_path, "/tmp/assignments.db");
    assert!(config.telegram_bot_token.is_none());
    assert_eq!(config.telegram_api_base, "https://api.telegram.org");
    assert_eq!(config.organization, "ОАО «Доломит»");
    assert_eq!(config.send_timeout, Duration::from_secs(5));
    assert_eq!(config.otel_endpoint, None);
    assert_eq!(config.log_level, "info");

    // overrides; an empty token counts as unset
    unsafe {
        std::env::set_var("TELEGRAM_BOT_TOKEN", "");
        std::env::set_var("ORGANIZATION_NAME", "ООО «Карьер»");
        std::env::set_var("SEND_TIMEOUT_SECS", "12");
        std::env::set_var("LOG_LEVEL", "debug");
    }
    let config = Config::from_env().unwrap();
    assert!(config.telegram_bot_token.is_none());
    assert_eq!(config.organization, "ООО «Карьер»");
    assert_eq!(config.send_timeout, Duration::from_secs(12));
    assert_eq!(config.log_level, "debug");

    unsafe { std::env::set_var("TELEGRAM_BOT_TOKEN", "123:abc") };
    let config = Config::from_env().unwrap();
    assert_eq!(
        config.telegram_bot_token.as_ref().map(|t| t.expose_secret()),
        Some("123:abc")
    );
    assert!(!format!("{config:?}").contains("123:abc"));

    unsafe { std::env::set_var("SEND_TIMEOUT_SECS", "soon") };
    let err = Config::from_env().unwrap_err();
    assert!(err.to_string().contains("SEND_TIMEOUT_SECS"));

    clear();
}
