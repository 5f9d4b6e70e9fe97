use checkup_sync::AppError;

#[test]
fn display_prefixes_each_variant() {
    let cases = [
        (AppError::Config("bad".into()), "config: bad"),
        (AppError::Db("locked".into()), "db: locked"),
        (AppError::Validation("missing data".into()), "validation: missing data"),
        (AppError::Network("503".into()), "network: 503"),
        (AppError::AuthRequired("no token".into()), "auth required: no token"),
        (AppError::Storage("quota".into()), "storage: quota"),
        (
            AppError::InvalidTransition("complete from waiting".into()),
            "invalid transition: complete from waiting",
        ),
        (AppError::NotFound("checkup 9".into()), "not found: checkup 9"),
        (AppError::Io("disk".into()), "io: disk"),
    ];

    for (err, expected) in cases {
        assert_eq!(err.to_string(), expected);
    }
}

#[test]
fn json_errors_become_validation() {
    let err: AppError = serde_json::from_str::<serde_json::Value>("{oops")
        .unwrap_err()
        .into();
    assert!(matches!(err, AppError::Validation(ref msg) if msg.starts_with("malformed json")));
}

#[test]
fn toml_errors_become_config() {
    let err: AppError = toml::from_str::<toml::Value>("= nope").unwrap_err().into();
    assert!(matches!(err, AppError::Config(_)));
}

#[test]
fn implements_std_error() {
    fn assert_error<E: std::error::Error>(_: &E) {}
    assert_error(&AppError::Network("x".into()));
}
