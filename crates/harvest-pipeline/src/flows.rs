use chrono::NaiveDate;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use harvest_activities::{handlers, ActivityCtx, CheckInOutcome};
use harvest_browser::SessionGuard;
use harvest_guard::SessionMonitor;
use harvest_login::{LoginError, LoginMachine, LoginReport};
use harvest_rand::SecureRng;
use harvest_search::SearchRunner;
use harvest_types::{
    Account, AccountHistoryEntry, Activity, BanSeverity, FlowError, Persona, RunContext,
    WorkUnitId,
};

use crate::dashboard::{self, DashboardProbe};
use crate::oauth;
use crate::PipelineDeps;

/// Hard ceiling per work unit; a wedged unit is abandoned and logged.
const UNIT_TIMEOUT: Duration = Duration::from_secs(600);

#[derive(Debug, Clone, Default)]
pub struct AccountRunResult {
    /// Masked email.
    pub account: String,
    pub desktop_points: i64,
    pub mobile_points: i64,
    pub completed: u32,
    pub failed: u32,
    pub errors: Vec<String>,
    pub success: bool,
    pub duration_ms: u64,
    /// Account was hard-banned and disabled during this run.
    pub disabled: bool,
    /// A critical incident was raised; the orchestrator must stand by.
    pub halted: bool,
    /// Soft ban or escalated warnings: skip the rest of this run.
    pub throttled: bool,
}

impl AccountRunResult {
    pub fn total_points(&self) -> i64 {
        self.desktop_points + self.mobile_points
    }

    fn record_error(&mut self, err: &FlowError) {
        self.failed += 1;
        self.errors.push(format!("[{}] {}", err.error_id(), err));
    }
}

/// Run both flows for one account and append the history entry. Desktop
/// precedes mobile unless the personas are configured to run in parallel.
pub async fn run_account(deps: &PipelineDeps, account: &Account) -> AccountRunResult {
    let started = Instant::now();
    let started_utc = chrono::Utc::now();
    let mut result =
        AccountRunResult { account: account.masked_email(), ..Default::default() };

    let desktop_ctx = RunContext::new(account.clone(), Persona::Desktop, deps.run_id.clone());
    let date = desktop_ctx.date;
    info!(account = %result.account, run_id = %desktop_ctx.run_id, "account run starting");

    if deps.config.parallel.mobile {
        let mobile_ctx = RunContext::new(account.clone(), Persona::Mobile, deps.run_id.clone());
        let mut mobile_result =
            AccountRunResult { account: account.masked_email(), ..Default::default() };
        let (desktop, mobile) = tokio::join!(
            desktop_flow(deps, &desktop_ctx, &mut result),
            mobile_flow(deps, &mobile_ctx, &mut mobile_result),
        );
        if let Err(err) = desktop {
            classify_failure(deps, &err, &mut result);
        }
        if let Err(err) = mobile {
            classify_failure(deps, &err, &mut mobile_result);
        }
        merge_flow(&mut result, mobile_result);
    } else {
        if let Err(err) = desktop_flow(deps, &desktop_ctx, &mut result).await {
            classify_failure(deps, &err, &mut result);
        }

        let proceed = !result.halted
            && !result.disabled
            && !result.throttled
            && !deps.cancel.is_cancelled();
        if proceed {
            let mobile_ctx =
                RunContext::new(account.clone(), Persona::Mobile, deps.run_id.clone());
            if let Err(err) = mobile_flow(deps, &mobile_ctx, &mut result).await {
                classify_failure(deps, &err, &mut result);
            }
        }
    }

    result.duration_ms = started.elapsed().as_millis() as u64;
    result.success = result.failed == 0 && !result.halted && !result.disabled;

    let entry = AccountHistoryEntry {
        timestamp: started_utc,
        date,
        desktop_points: result.desktop_points,
        mobile_points: result.mobile_points,
        total_points: result.total_points(),
        completed: result.completed,
        failed: result.failed,
        errors: result.errors.clone(),
        duration_ms: result.duration_ms,
        success: result.success,
    };
    if let Err(err) = deps.history.append(&account.email, entry).await {
        warn!(%err, "history append failed");
    }

    info!(
        account = %result.account,
        points = result.total_points(),
        completed = result.completed,
        failed = result.failed,
        success = result.success,
        "account run finished"
    );
    result
}

fn classify_failure(deps: &PipelineDeps, err: &FlowError, result: &mut AccountRunResult) {
    match err {
        FlowError::Security(incident) => {
            if incident.kind.engages_standby() {
                // Stop the whole run at the next unit boundary; the
                // orchestrator latches the durable standby flag.
                result.halted = true;
                deps.cancel.cancel();
            }
            deps.emit(incident.clone());
            result.record_error(err);
        }
        FlowError::Ban(verdict) => {
            match verdict.severity {
                BanSeverity::HardBan => result.disabled = true,
                BanSeverity::SoftBan => result.throttled = true,
                _ => {}
            }
            result.record_error(err);
        }
        FlowError::Cancelled => {
            debug!("run cancelled at unit boundary");
        }
        _ => result.record_error(err),
    }
}

fn merge_flow(into: &mut AccountRunResult, other: AccountRunResult) {
    into.desktop_points += other.desktop_points;
    into.mobile_points += other.mobile_points;
    into.completed += other.completed;
    into.failed += other.failed;
    into.errors.extend(other.errors);
    into.disabled |= other.disabled;
    into.halted |= other.halted;
    into.throttled |= other.throttled;
}

// ---------------------------------------------------------------------------
// Desktop
// ---------------------------------------------------------------------------

async fn desktop_flow(
    deps: &PipelineDeps,
    ctx: &RunContext,
    result: &mut AccountRunResult,
) -> Result<(), FlowError> {
    let workers = &deps.config.workers;
    let wants_desktop = workers.do_daily_set
        || workers.do_more_promotions
        || workers.do_punch_cards
        || workers.do_desktop_search
        || workers.do_free_rewards;
    if !wants_desktop {
        debug!("no desktop workers enabled");
        return Ok(());
    }
    if deps.cancel.is_cancelled() {
        return Err(FlowError::Cancelled);
    }

    let (session, _report) = login_flow(deps, &ctx.account, Persona::Desktop).await?;
    let outcome = desktop_work(deps, &ctx.account, ctx.date, &session, result).await;
    if let Err(close_err) = session.close().await {
        warn!(%close_err, "desktop session close failed");
    }
    outcome
}

async fn desktop_work(
    deps: &PipelineDeps,
    account: &Account,
    date: NaiveDate,
    session: &SessionGuard,
    result: &mut AccountRunResult,
) -> Result<(), FlowError> {
    let page = session.page().as_ref();
    let monitor = SessionMonitor::new(deps.detector.clone(), &account.email);

    let data = dashboard::fetch(page, &deps.home_url).await?;
    check_verdict(deps, account, &monitor.comprehensive_check(page).await, result).await?;

    let earnable = data.browser_earnable(false) + data.browser_earnable(true);
    if earnable == 0 && !deps.config.run_on_zero_points {
        info!(account = %result.account, "nothing earnable today, stopping early");
        return Ok(());
    }

    // Promotions, oldest surface first: daily set, then the rest.
    let workers = &deps.config.workers;
    let mut activities: Vec<Activity> = Vec::new();
    if workers.do_daily_set {
        let today = date.to_string();
        if let Some(set) = data.daily_set.get(&today) {
            activities.extend(set.iter().cloned());
        }
    }
    if workers.do_more_promotions {
        activities.extend(data.more_promotions.iter().cloned());
    }
    if workers.do_punch_cards {
        for card in &data.punch_cards {
            activities.extend(card.children.iter().cloned());
        }
    }

    let rng = SecureRng::new();
    let delay = &deps.config.search_settings.search_delay;
    let ctx = ActivityCtx { session, rng: &rng, delay };
    let mut pending: Vec<(WorkUnitId, Activity)> = Vec::new();

    for activity in activities {
        if deps.cancel.is_cancelled() {
            return Err(FlowError::Cancelled);
        }
        if activity.complete || activity.offer_id.is_empty() {
            continue;
        }
        let unit = WorkUnitId::activity(&activity.offer_id);
        if deps.job_state.is_complete(&account.email, date, &unit).await? {
            debug!(%unit, "already done today, skipping");
            continue;
        }

        match tokio::time::timeout(
            UNIT_TIMEOUT,
            harvest_activities::run_activity(&ctx, &activity),
        )
        .await
        {
            Err(_) => {
                let err = FlowError::UnitTimeout(UNIT_TIMEOUT.as_secs());
                deps.job_state.attempt(&account.email, date, &unit).await?;
                result.record_error(&err);
            }
            Ok(Err(activity_err)) => {
                if let Some(status) = activity_err.api_status() {
                    check_verdict(deps, account, &monitor.on_api_status(status).await, result)
                        .await?;
                }
                deps.job_state.attempt(&account.email, date, &unit).await?;
                result.record_error(&FlowError::from(activity_err));
            }
            Ok(Ok(outcome)) if outcome.completed => pending.push((unit, activity)),
            Ok(Ok(outcome)) => {
                debug!(%unit, note = ?outcome.note, "activity incomplete");
                deps.job_state.attempt(&account.email, date, &unit).await?;
            }
        }
    }

    // Confirm from the dashboard before marking anything done.
    if !pending.is_empty() {
        let refreshed = dashboard::fetch(page, &deps.home_url).await?;
        for (unit, original) in pending {
            let confirmed = refreshed
                .daily_set
                .values()
                .flatten()
                .chain(refreshed.more_promotions.iter())
                .chain(refreshed.punch_cards.iter().flat_map(|c| c.children.iter()))
                .find(|a| a.offer_id == original.offer_id)
                .map(|a| a.complete || a.point_progress >= a.point_progress_max)
                // Completed items sometimes drop off the list entirely.
                .unwrap_or(true);
            if confirmed {
                let points = original.remaining_points();
                deps.job_state.mark(&account.email, date, &unit, points).await?;
                result.desktop_points += points;
                result.completed += 1;
            } else {
                deps.job_state.attempt(&account.email, date, &unit).await?;
                warn!(%unit, "handler finished but dashboard shows no progress");
            }
        }
    }

    if deps.config.workers.do_desktop_search {
        let points = search_unit(deps, account, date, session, Persona::Desktop, result).await?;
        result.desktop_points += points;
    }

    if deps.config.workers.do_free_rewards {
        match handlers::free_rewards::run(&ctx, session, account).await {
            Ok(outcomes) => {
                let redeemed = outcomes.iter().filter(|o| o.redeemed).count();
                if redeemed > 0 {
                    info!(redeemed, "free rewards redeemed");
                    result.completed += redeemed as u32;
                }
            }
            Err(err) => result.record_error(&FlowError::from(err)),
        }
    }

    check_verdict(deps, account, &monitor.comprehensive_check(page).await, result).await?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Mobile
// ---------------------------------------------------------------------------

async fn mobile_flow(
    deps: &PipelineDeps,
    ctx: &RunContext,
    result: &mut AccountRunResult,
) -> Result<(), FlowError> {
    let workers = &deps.config.workers;
    let wants_mobile =
        workers.do_mobile_search || workers.do_daily_check_in || workers.do_read_to_earn;
    if !wants_mobile {
        debug!("no mobile workers enabled");
        return Ok(());
    }
    if deps.cancel.is_cancelled() {
        return Err(FlowError::Cancelled);
    }
    let account = &ctx.account;
    let date = ctx.date;

    let (mut session, _report) = login_flow(deps, account, Persona::Mobile).await?;
    let monitor = SessionMonitor::new(deps.detector.clone(), &account.email);

    let outcome = async {
        // Mobile API token, with one rebuild on a dying context.
        let token = match oauth::acquire_access_token(session.page().as_ref()).await {
            Ok(token) => token,
            Err(FlowError::TransientBrowser(_)) => {
                let _ = session.close().await;
                let (fresh, _) = login_flow(deps, account, Persona::Mobile).await?;
                session = fresh;
                oauth::acquire_access_token(session.page().as_ref()).await?
            }
            Err(err) => return Err(err),
        };

        if deps.config.workers.do_daily_check_in {
            check_in_unit(deps, account, date, &token, &monitor, result).await?;
        }
        if deps.config.workers.do_read_to_earn {
            read_to_earn_unit(deps, account, date, &token, &monitor, result).await?;
        }
        if deps.config.workers.do_mobile_search {
            mobile_search_with_retry(deps, account, date, &mut session, result).await?;
        }
        Ok(())
    }
    .await;

    if let Err(close_err) = session.close().await {
        warn!(%close_err, "mobile session close failed");
    }
    outcome
}

async fn check_in_unit(
    deps: &PipelineDeps,
    account: &Account,
    date: NaiveDate,
    token: &str,
    monitor: &SessionMonitor,
    result: &mut AccountRunResult,
) -> Result<(), FlowError> {
    if deps.cancel.is_cancelled() {
        return Err(FlowError::Cancelled);
    }
    let unit = WorkUnitId::daily_checkin();
    if deps.job_state.is_complete(&account.email, date, &unit).await? {
        return Ok(());
    }

    match deps.api.daily_check_in(token, &deps.geo).await {
        Ok(CheckInOutcome::Claimed { points }) => {
            deps.job_state.mark(&account.email, date, &unit, points).await?;
            result.mobile_points += points;
            result.completed += 1;
        }
        Ok(CheckInOutcome::AlreadyDone) => {
            deps.job_state.mark(&account.email, date, &unit, 0).await?;
        }
        Err(err) => {
            if let Some(status) = err.api_status() {
                check_verdict(deps, account, &monitor.on_api_status(status).await, result).await?;
            }
            deps.job_state.attempt(&account.email, date, &unit).await?;
            result.record_error(&FlowError::from(err));
        }
    }
    Ok(())
}

async fn read_to_earn_unit(
    deps: &PipelineDeps,
    account: &Account,
    date: NaiveDate,
    token: &str,
    monitor: &SessionMonitor,
    result: &mut AccountRunResult,
) -> Result<(), FlowError> {
    if deps.cancel.is_cancelled() {
        return Err(FlowError::Cancelled);
    }
    // Articles already claimed today shift the index base.
    let done_units = deps.job_state.get(&account.email, date).await?;
    let already = done_units.iter().filter(|u| u.as_str().starts_with("r2e:")).count();
    if already >= 10 {
        return Ok(());
    }

    let delay = &deps.config.search_settings.search_delay;
    match deps.api.read_to_earn(token, &deps.geo, delay).await {
        Ok(outcome) => {
            for i in 0..outcome.articles_claimed as usize {
                let unit = WorkUnitId::read_to_earn(already + i);
                let per_article = outcome.points / outcome.articles_claimed.max(1) as i64;
                deps.job_state.mark(&account.email, date, &unit, per_article).await?;
            }
            result.mobile_points += outcome.points;
            result.completed += outcome.articles_claimed;
        }
        Err(err) => {
            if let Some(status) = err.api_status() {
                check_verdict(deps, account, &monitor.on_api_status(status).await, result).await?;
            }
            result.record_error(&FlowError::from(err));
        }
    }
    Ok(())
}

async fn mobile_search_with_retry(
    deps: &PipelineDeps,
    account: &Account,
    date: NaiveDate,
    session: &mut SessionGuard,
    result: &mut AccountRunResult,
) -> Result<(), FlowError> {
    let unit = WorkUnitId::search(Persona::Mobile);
    if deps.job_state.is_complete(&account.email, date, &unit).await? {
        debug!(%unit, "already done today, skipping");
        return Ok(());
    }

    // What a completed run earns: everything missing before the first try.
    let before = dashboard::fetch(session.page().as_ref(), &deps.home_url)
        .await?
        .search_counter(true)
        .map(|c| c.remaining())
        .unwrap_or(0);

    let retries = deps.config.search_settings.retry_mobile_search_amount;
    let mut completed = search_session(deps, session, Persona::Mobile).await?;

    let mut attempt = 0;
    while !completed {
        if attempt >= retries {
            if retries == 0 {
                warn!("mobile search incomplete and retries are disabled");
            } else {
                warn!(retries, "mobile search still incomplete after all retries");
            }
            deps.job_state.attempt(&account.email, date, &unit).await?;
            return Ok(());
        }
        attempt += 1;
        info!(attempt, retries, "rebuilding mobile session for search retry");
        let _ = session.close().await;
        let (fresh, _) = login_flow(deps, account, Persona::Mobile).await?;
        *session = fresh;
        completed = search_session(deps, session, Persona::Mobile).await?;
    }

    deps.job_state.mark(&account.email, date, &unit, before).await?;
    result.mobile_points += before;
    result.completed += 1;
    Ok(())
}

/// One search session; true when the bucket drained, false when it ended
/// incomplete (stall, budget, query exhaustion).
async fn search_session(
    deps: &PipelineDeps,
    session: &SessionGuard,
    persona: Persona,
) -> Result<bool, FlowError> {
    if deps.cancel.is_cancelled() {
        return Err(FlowError::Cancelled);
    }
    let mobile = persona == Persona::Mobile;
    let page = session.page().as_ref();
    let probe = DashboardProbe { page, home_url: &deps.home_url, mobile };

    let wanted = deps.config.search_settings.per_session_max.max(10);
    let queries = deps.queries.generate(wanted, &session.fingerprint().locale).await;

    let runner = SearchRunner::new(&deps.config.search_settings);
    let outcome = tokio::time::timeout(UNIT_TIMEOUT, runner.run(page, &queries, &probe))
        .await
        .map_err(|_| FlowError::UnitTimeout(UNIT_TIMEOUT.as_secs()))??;
    Ok(outcome.completed)
}

async fn search_unit(
    deps: &PipelineDeps,
    account: &Account,
    date: NaiveDate,
    session: &SessionGuard,
    persona: Persona,
    result: &mut AccountRunResult,
) -> Result<i64, FlowError> {
    let unit = WorkUnitId::search(persona);
    if deps.job_state.is_complete(&account.email, date, &unit).await? {
        debug!(%unit, "already done today, skipping");
        return Ok(0);
    }

    // Remaining before the session starts is what a completed session earns.
    let page = session.page().as_ref();
    let before = dashboard::fetch(page, &deps.home_url)
        .await?
        .search_counter(persona == Persona::Mobile)
        .map(|c| c.remaining())
        .unwrap_or(0);

    if search_session(deps, session, persona).await? {
        deps.job_state.mark(&account.email, date, &unit, before).await?;
        result.completed += 1;
        Ok(before)
    } else {
        deps.job_state.attempt(&account.email, date, &unit).await?;
        warn!(%unit, "search session ended incomplete");
        Ok(0)
    }
}

// ---------------------------------------------------------------------------
// Shared
// ---------------------------------------------------------------------------

async fn login_flow(
    deps: &PipelineDeps,
    account: &Account,
    persona: Persona,
) -> Result<(SessionGuard, LoginReport), FlowError> {
    let mut rebuilt = false;
    loop {
        let fingerprint = deps.factory.fingerprint(persona).await;
        let bundle = harvest_stealth::bundle_for(&fingerprint);
        let session = deps.factory.build(account, fingerprint, &bundle).await?;

        let machine = LoginMachine::new(account)
            .with_waits(deps.login_waits.0, deps.login_waits.1);
        match machine.run(session.page().as_ref()).await {
            Ok(report) => {
                for incident in &report.incidents {
                    deps.emit(incident.clone());
                }
                return Ok((session, report));
            }
            Err(err) if err.is_target_closed() && !rebuilt => {
                warn!(%persona, "target closed mid-login, rebuilding context once");
                let _ = session.close().await;
                rebuilt = true;
            }
            Err(LoginError::Security(incident)) => {
                // A blocked login may be an outright suspension; give the
                // detector a look at the page before it goes away.
                let monitor = SessionMonitor::new(deps.detector.clone(), &account.email);
                let verdict = monitor.comprehensive_check(session.page().as_ref()).await;
                let _ = session.close().await;
                if verdict.severity == BanSeverity::HardBan {
                    if let Some(ban_incident) =
                        deps.detector.enforce_hard_ban(&account.email, &verdict).await
                    {
                        deps.emit(ban_incident);
                    }
                    return Err(FlowError::Ban(verdict));
                }
                return Err(FlowError::Security(*incident));
            }
            Err(err) => {
                let _ = session.close().await;
                return Err(err.into());
            }
        }
    }
}

/// Route a detector verdict: hard bans disable the account and abort the
/// flow, soft bans throttle it, warnings pass through.
async fn check_verdict(
    deps: &PipelineDeps,
    account: &Account,
    verdict: &harvest_types::BanDetectionResult,
    result: &mut AccountRunResult,
) -> Result<(), FlowError> {
    match verdict.severity {
        BanSeverity::HardBan => {
            if let Some(incident) = deps.detector.enforce_hard_ban(&account.email, verdict).await {
                deps.emit(incident);
            }
            result.disabled = true;
            Err(FlowError::Ban(verdict.clone()))
        }
        BanSeverity::SoftBan => {
            warn!(reason = %verdict.reason, "soft ban, throttling account for this run");
            result.throttled = true;
            Err(FlowError::Ban(verdict.clone()))
        }
        _ => Ok(()),
    }
}
