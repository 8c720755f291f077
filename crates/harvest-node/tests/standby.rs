//! A recovery mismatch on the first account must park the whole process:
//! standby latched, queued accounts never started.

use std::sync::Arc;

use harvest_browser::scripted::{PageStateBuilder, ScriptedDriver};
use harvest_config::Config;
use harvest_node::notify::Notifier;
use harvest_node::orchestrator::{AccountStatus, Orchestrator};

#[tokio::test]
async fn recovery_mismatch_engages_standby_and_blocks_queued_accounts() {
    // Every context serves a login page revealing a foreign masked
    // recovery address.
    let driver = ScriptedDriver::single_page(
        PageStateBuilder::new("https://login.live.com/recovery")
            .title("Help us protect your account")
            .text("We'll send a code to z******@elsewhere.tld to confirm it's you.")
            .build(),
    );

    let dir = tempfile::tempdir().unwrap();
    let accounts_path = dir.path().join("accounts.json");
    std::fs::write(
        &accounts_path,
        r#"[
            {"email": "first@main.tld", "password": "pw", "recoveryEmail": "bob@domain.tld"},
            {"email": "second@main.tld", "password": "pw"}
        ]"#,
    )
    .unwrap();

    let mut config = Config::default();
    config.clusters = 1;
    config.workers.do_mobile_search = false;
    config.workers.do_daily_check_in = false;
    config.workers.do_read_to_earn = false;

    let orchestrator = Orchestrator::new(
        Arc::new(config),
        accounts_path,
        dir.path().join("data"),
        driver.clone(),
        Arc::new(Notifier::new(Default::default())),
    )
    .unwrap();

    let summary = orchestrator.run_all().await.unwrap();

    assert!(orchestrator.is_standby(), "standby must latch");
    // Only the first account produced a result; the second never started.
    assert_eq!(summary.accounts_total, 2);
    assert_eq!(summary.entries.len(), 1);
    assert_eq!(summary.incidents, 1);

    let statuses = orchestrator.statuses().await;
    assert!(matches!(statuses.get("se***@main.tld"), Some(AccountStatus::Idle)));

    // A new run is refused while standby holds.
    assert!(orchestrator.run_all().await.is_err());
}
