//! Unit tests for API credential loading.
//!
//! These tests mutate the process environment and must run serially.
//! The keychain service `checkup-sync` is assumed absent in test
//! environments, so loading falls through to the env var.

use checkup_sync::config::GlobalConfig;

const TOKEN_VAR: &str = "CHECKUP_SYNC_TOKEN";

fn config() -> GlobalConfig {
    GlobalConfig::from_toml_str(
        r#"
[backend]
base_url = "http://localhost:5000/api"
"#,
    )
    .expect("config parses")
}

#[tokio::test]
#[serial_test::serial]
async fn env_var_supplies_token() {
    std::env::set_var(TOKEN_VAR, "env-token-123");
    let mut config = config();

    config.load_credentials().await.expect("token from env");
    assert_eq!(config.api_token, "env-token-123");

    std::env::remove_var(TOKEN_VAR);
}

#[tokio::test]
#[serial_test::serial]
async fn missing_token_names_both_sources() {
    std::env::remove_var(TOKEN_VAR);
    let mut config = config();

    let err = config.load_credentials().await.unwrap_err().to_string();
    assert!(err.contains("checkup-sync"), "got: {err}");
    assert!(err.contains(TOKEN_VAR), "got: {err}");
    assert!(config.api_token.is_empty());
}

#[tokio::test]
#[serial_test::serial]
async fn empty_env_var_counts_as_missing() {
    std::env::set_var(TOKEN_VAR, "");
    let mut config = config();

    assert!(config.load_credentials().await.is_err());

    std::env::remove_var(TOKEN_VAR);
}
