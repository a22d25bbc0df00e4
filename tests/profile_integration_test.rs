//! Profile loading through a parsed configuration and real file stores.

mod common;

use common::{scenario, TestContext};
use secenv::config::Config;
use secenv::injector::EnvList;
use secenv::secret::Secret;
use secenv::store::{Registry, StoreLoader};
use std::fs;

fn load(ctx: &TestContext) -> Config {
    Config::from_file(ctx.path("config.toml"), &Registry::builtin()).unwrap()
}

#[tokio::test]
async fn test_profile_environment_from_two_stores() {
    let ctx = scenario().unwrap();
    let config = load(&ctx);

    let profile = config.profile("").unwrap();
    let env = profile.environment(&config, &[]).await.unwrap();

    assert_eq!(env.len(), 2);
    assert_eq!(env.get("db_pass"), Some("s3cr3t"));
    assert_eq!(env.get("API_KEY"), Some("abc123"));
}

#[tokio::test]
async fn test_extra_secrets_override_profile() {
    let ctx = scenario().unwrap();
    let config = load(&ctx);
    ctx.write_store("default", &[("api_key", "abc123"), ("db_pass", "local")])
        .unwrap();

    let extra: Secret = "db_pass".parse().unwrap();
    let env: EnvList = config
        .profile("default")
        .unwrap()
        .environment(&config, &[extra])
        .await
        .unwrap();

    assert_eq!(env.get("db_pass"), Some("local"));
}

#[tokio::test]
async fn test_store_writes_are_visible_to_new_handles() {
    let ctx = scenario().unwrap();
    let config = load(&ctx);

    let store = config.resolve_store("vault").await.unwrap();
    store.set("db_user", "admin").await.unwrap();
    drop(store);

    let store = config.resolve_store("vault").await.unwrap();
    assert_eq!(store.get("db_user").await.unwrap(), "admin");
    assert_eq!(store.get("db_pass").await.unwrap(), "s3cr3t");
}

#[tokio::test]
async fn test_empty_store_file_has_no_keys() {
    let ctx = TestContext::new().unwrap();
    ctx.create_file("default.store", b"").unwrap();
    ctx.write_config(&["default"], None, "").unwrap();
    let config = load(&ctx);

    let store = config.resolve_store("default").await.unwrap();
    let err = store.get("anything").await.unwrap_err();
    assert!(err.is_key_not_found());
}

#[tokio::test]
async fn test_corrupt_store_file_is_reported() {
    let ctx = TestContext::new().unwrap();
    // Length prefix promises 5 key bytes, only 2 follow
    ctx.create_file("default.store", &[5, 0, b'a', b'b']).unwrap();
    ctx.write_config(&["default"], None, "").unwrap();
    let config = load(&ctx);

    let store = config.resolve_store("").await.unwrap();
    let err = store.get("ab").await.unwrap_err();
    assert!(!err.is_key_not_found());
}

#[tokio::test]
async fn test_missing_profile_secret_names_the_key() {
    let ctx = scenario().unwrap();
    fs::remove_file(ctx.store_path("vault")).unwrap();
    let config = load(&ctx);

    let err = config
        .profile("")
        .unwrap()
        .environment(&config, &[])
        .await
        .unwrap_err();

    assert!(err.key_not_found());
    assert_eq!(err.to_string(), "load db_pass");
}

#[cfg(unix)]
#[tokio::test]
async fn test_profile_exec_mirrors_exit_code() {
    let ctx = scenario().unwrap();
    let config = load(&ctx);

    let args: Vec<String> = [
        "sh",
        "-c",
        r#"test "$db_pass" = s3cr3t && test "$API_KEY" = abc123 && exit 7"#,
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();

    let status = config
        .profile("")
        .unwrap()
        .exec(&args, &config, &[])
        .await
        .unwrap();

    assert_eq!(secenv::process::exit_code(status), 7);
}
