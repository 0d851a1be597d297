//! The staged upgrade loop driven against a fake package index

use gitlab_charm::config::CharmConfig;
use gitlab_charm::controller::Error;
use gitlab_charm::store::MemoryStore;

use crate::common::*;

fn pinned(version: &str) -> CharmConfig {
    CharmConfig {
        version: version.to_string(),
        ..Default::default()
    }
}

#[test]
fn test_steps_through_each_major() {
    let harness = Harness::new()
        .installed("0.0.0-ce.0")
        .available(&["0.0.0-ce.0", "0.1.0-ce.0", "1.0.0-ce.0", "1.1.1-ce.0"]);
    let mut reconciler = harness.reconciler(pinned("1.1.1-ce.0"), ready_store());

    assert!(reconciler.upgrade_gitlab().unwrap());
    assert_eq!(
        harness.packages.installs(),
        vec!["gitlab-ce=0.*".to_string(), "gitlab-ce=1.1.1-ce.0".to_string()]
    );
    assert_eq!(harness.commands.reconfigure_count(), 2);
    assert_eq!(harness.packages.installed().as_deref(), Some("1.1.1-ce.0"));

    // Already there
    assert!(!reconciler.upgrade_gitlab().unwrap());
    assert_eq!(harness.packages.installs().len(), 2);
    assert_eq!(harness.commands.reconfigure_count(), 2);
}

#[test]
fn test_converged_is_a_noop() {
    let harness = converged_harness();
    let mut reconciler = harness.reconciler(CharmConfig::default(), ready_store());

    assert!(!reconciler.upgrade_gitlab().unwrap());
    assert!(harness.packages.installs().is_empty());
    assert_eq!(harness.commands.reconfigure_count(), 0);
}

#[test]
fn test_latest_crosses_several_majors() {
    let harness = Harness::new().installed("11.0.0-ce.0").available(&[
        "11.0.0-ce.0",
        "11.11.8-ce.0",
        "12.0.0-ce.0",
        "12.10.14-ce.0",
        "13.0.0-ce.0",
        "13.2.0-ce.0",
    ]);
    let mut reconciler = harness.reconciler(CharmConfig::default(), ready_store());

    assert!(reconciler.upgrade_gitlab().unwrap());
    assert_eq!(
        harness.packages.installs(),
        vec![
            "gitlab-ce=11.*".to_string(),
            "gitlab-ce=12.*".to_string(),
            "gitlab-ce=12.*".to_string(),
            "gitlab-ce=13.*".to_string(),
        ]
    );
    assert_eq!(harness.commands.reconfigure_count(), 4);
    assert_eq!(harness.packages.installed().as_deref(), Some("13.2.0-ce.0"));
}

#[test]
fn test_major_pin_stops_at_that_major() {
    let harness = Harness::new()
        .installed("12.0.0-ce.0")
        .available(&["12.0.0-ce.0", "12.10.14-ce.0", "13.0.0-ce.0", "13.2.0-ce.0"]);
    let mut reconciler = harness.reconciler(pinned("12.*"), ready_store());

    assert!(reconciler.upgrade_gitlab().unwrap());
    assert_eq!(harness.packages.installs(), vec!["gitlab-ce=12.*".to_string()]);
    assert_eq!(harness.packages.installed().as_deref(), Some("12.10.14-ce.0"));
    assert_eq!(harness.commands.reconfigure_count(), 1);
}

#[test]
fn test_minor_upgrade() {
    let harness = Harness::new()
        .installed("13.0.0-ce.0")
        .available(&["13.0.0-ce.0", "13.1.0-ce.0"]);
    let mut reconciler = harness.reconciler(CharmConfig::default(), ready_store());

    assert!(reconciler.upgrade_gitlab().unwrap());
    assert_eq!(harness.packages.installs(), vec!["gitlab-ce=13.*".to_string()]);
    assert_eq!(harness.commands.reconfigure_count(), 1);
    assert_eq!(
        harness.status.messages().last().map(String::as_str),
        Some(gitlab_charm::controller::messages::UPGRADING)
    );
}

#[test]
fn test_enterprise_package() {
    let harness = Harness::new()
        .installed("13.0.0-ee.0")
        .available(&["13.0.0-ee.0", "13.1.0-ee.0"]);
    let config = CharmConfig {
        package_name: "gitlab-ee".to_string(),
        ..Default::default()
    };
    let mut reconciler = harness.reconciler(config, ready_store());

    assert!(reconciler.upgrade_gitlab().unwrap());
    assert_eq!(harness.packages.installs(), vec!["gitlab-ee=13.*".to_string()]);
}

#[test]
fn test_downgrade_is_rejected() {
    let harness = Harness::new()
        .installed("13.0.0-ce.0")
        .available(&["12.10.14-ce.0", "13.0.0-ce.0"]);
    let mut reconciler = harness.reconciler(pinned("12.*"), ready_store());

    let err = reconciler.upgrade_gitlab().unwrap_err();
    assert!(matches!(err, Error::ValidationError(_)));
    assert!(harness.packages.installs().is_empty());
}

#[test]
fn test_exact_pin_below_installed_is_rejected() {
    let harness = Harness::new()
        .installed("13.2.0-ce.0")
        .available(&["13.1.0-ce.0", "13.2.0-ce.0"]);
    let mut reconciler = harness.reconciler(pinned("13.1.0-ce.0"), ready_store());

    assert!(matches!(
        reconciler.upgrade_gitlab().unwrap_err(),
        Error::ValidationError(_)
    ));
}

#[test]
fn test_broken_index_is_skipped() {
    let harness = converged_harness();
    harness.packages.state.borrow_mut().broken_index = true;
    let mut reconciler = harness.reconciler(pinned("14.*"), ready_store());

    assert!(!reconciler.upgrade_gitlab().unwrap());
    assert!(harness.packages.installs().is_empty());
}

#[test]
fn test_missing_major_is_skipped() {
    let harness = converged_harness();
    let mut reconciler = harness.reconciler(pinned("14.*"), ready_store());

    assert!(!reconciler.upgrade_gitlab().unwrap());
    assert!(harness.packages.installs().is_empty());
}

#[test]
fn test_stuck_package_stops_after_one_major_step() {
    let harness = Harness::new()
        .installed("0.0.0-ce.0")
        .available(&["0.0.0-ce.0", "1.0.0-ce.0"]);
    harness.packages.state.borrow_mut().frozen = true;
    let mut reconciler = harness.reconciler(CharmConfig::default(), ready_store());

    let err = reconciler.upgrade_gitlab().unwrap_err();
    assert!(matches!(err, Error::UpgradeDidNotConverge(1)));
    assert_eq!(
        harness.packages.installs(),
        vec!["gitlab-ce=0.*".to_string(), "gitlab-ce=1.*".to_string()]
    );
    assert_eq!(harness.commands.reconfigure_count(), 2);
}

#[test]
fn test_installs_when_missing() {
    let harness = Harness::new().available(&["13.0.0-ce.0"]);
    let mut reconciler = harness.reconciler(CharmConfig::default(), MemoryStore::new());

    assert!(reconciler.upgrade_gitlab().unwrap());
    assert_eq!(harness.packages.installs(), vec!["gitlab-ce".to_string()]);
    assert_eq!(harness.packages.installed().as_deref(), Some("13.0.0-ce.0"));
    assert_eq!(harness.commands.reconfigure_count(), 0);
}
