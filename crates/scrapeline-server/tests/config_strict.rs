#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use scrapeline_server::config;

#[test]
fn deny_unknown_fields_nested() {
    let bad = r#"
version: 1
server:
  listen: "0.0.0.0:8080"
process:
  proc_rot: "/proc" # typo should fail
"#;

    let err = config::load_from_str(bad).expect_err("must fail");
    assert_eq!(err.kind().as_str(), "BadConfig");
}

#[test]
fn ok_minimal_config() {
    let cfg = config::load_from_str("version: 1\n").expect("must parse");
    assert_eq!(cfg.version, 1);
    assert_eq!(cfg.server.listen, "0.0.0.0:8080");
    assert_eq!(cfg.server.metrics_prefix, "scrapeline_server");
    assert!(cfg.process.enabled);
    assert_eq!(cfg.process.proc_root, "/proc");
    assert_eq!(cfg.process.clock_ticks_per_second, 100);
    assert_eq!(cfg.process.page_size_bytes, 4096);
}

#[test]
fn rejects_unsupported_version() {
    let err = config::load_from_str("version: 2\n").expect_err("must fail");
    assert_eq!(err.kind().as_str(), "BadConfig");
}

#[test]
fn validates_values() {
    let bad_listen = r#"
version: 1
server:
  listen: "not-an-address"
"#;
    assert!(config::load_from_str(bad_listen).is_err());

    let bad_prefix = r#"
version: 1
server:
  metrics_prefix: "my-server"
"#;
    assert!(config::load_from_str(bad_prefix).is_err());

    let bad_page = r#"
version: 1
process:
  page_size_bytes: 1000
"#;
    assert!(config::load_from_str(bad_page).is_err());
}

#[test]
fn missing_file_is_an_io_error() {
    let err = config::load_from_file("/definitely/not/here/scrapeline.yaml").expect_err("must fail");
    assert_eq!(err.kind().as_str(), "Io");
}

#[test]
fn shipped_config_parses() {
    let path = concat!(env!("CARGO_MANIFEST_DIR"), "/../../scrapeline.yaml");
    let cfg = config::load_from_file(path).expect("must parse");
    assert_eq!(cfg.server.metrics_prefix, "scrapeline_server");
}
