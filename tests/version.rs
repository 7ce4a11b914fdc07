use assert_cmd::Command;
use predicates::prelude::*;

#[test]
fn version_flag_prints_package_version() {
    let ver = env!("CARGO_PKG_VERSION");
    assert!(ver.split('.').count() >= 2);
    let mut cmd = Command::cargo_bin("drive2schema").unwrap();
    cmd.arg("--version").assert().success().stdout(predicate::str::contains(ver));
}
