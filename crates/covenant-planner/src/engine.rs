//! The continuous planner: once per workday, at a configured time, scans
//! the contract landscape for work worth starting or nudging, scores it,
//! asks the heavy model for up to three concrete actions, and executes
//! whichever survive the day's rate limits.

use std::sync::Arc;

use chrono::{DateTime, Datelike, Duration, Timelike, Utc};
use covenant_chat::ChatClient;
use covenant_core::Config;
use covenant_llm::{ChatRequest, LlmProvider, Message, Role};
use covenant_store::Store;
use tokio::sync::{watch, Mutex};
use tracing::{info, warn};

use crate::actions::{parse_plan_response, ActionDispatcher, PlannedAction};
use crate::gather::{self, Gathered};
use crate::scoring::{self, CandidateType, ScoreInputs, ScoredCandidate};
use crate::state::{self, DailyStats, Initiative, InitiativeStatus, PlannerState};

const PLAN_PROMPT_PATH: &str = "prompts/planner_prompt.md";
const SYSTEM_PROMPT_PATH: &str = "prompts/system_short.md";

/// Shared between the scheduled cycle and the listener's activity hook, so
/// an initiative that just got a human reply isn't re-nudged mid-cycle.
pub struct ContinuousPlanner {
    store: Arc<dyn Store>,
    chat: Arc<dyn ChatClient>,
    llm_heavy: Arc<dyn LlmProvider>,
    config: Arc<Config>,
    lock: Mutex<()>,
    next_cycle: Mutex<DateTime<Utc>>,
}

impl ContinuousPlanner {
    pub fn new(store: Arc<dyn Store>, chat: Arc<dyn ChatClient>, llm_heavy: Arc<dyn LlmProvider>, config: Arc<Config>) -> Self {
        let next = next_run_time(&config, Utc::now());
        Self { store, chat, llm_heavy, config, lock: Mutex::new(()), next_cycle: Mutex::new(next) }
    }

    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        info!(run_time = %self.config.planner_run_time, "continuous planner started");
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(60));
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.maybe_run_cycle().await;
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("continuous planner shutting down");
                        break;
                    }
                }
            }
        }
    }

    async fn maybe_run_cycle(&self) {
        let now = Utc::now();
        let due = {
            let next = self.next_cycle.lock().await;
            now >= *next
        };
        if !due {
            return;
        }

        let _guard = self.lock.lock().await;
        if let Err(e) = self.run_cycle(now).await {
            warn!(error = %e, "planner cycle failed");
        }
        *self.next_cycle.lock().await = next_run_time(&self.config, now);
    }

    /// Called by the listener when a human posts in a thread the planner
    /// owns, so the next cycle's housekeeping sees fresh activity instead
    /// of treating the initiative as stalled.
    pub async fn notify_thread_activity(&self, root_id: &str, _username: &str) {
        let _guard = self.lock.lock().await;
        let mut planner_state = match state::load(self.store.as_ref()) {
            Ok(s) => s,
            Err(e) => {
                warn!(error = %e, "failed to load planner state for activity hook");
                return;
            }
        };
        let now = Utc::now().to_rfc3339();
        let mut touched = false;
        for initiative in planner_state.initiatives.iter_mut() {
            if initiative.thread_id.as_deref() == Some(root_id) {
                initiative.last_external_activity_at = Some(now.clone());
                initiative.waiting_for.clear();
                if initiative.status == InitiativeStatus::WaitingResponse {
                    initiative.status = InitiativeStatus::Active;
                }
                initiative.updated_at = now.clone();
                touched = true;
            }
        }
        if touched {
            if let Err(e) = state::save(self.store.as_ref(), &planner_state) {
                warn!(error = %e, "failed to persist planner state after activity hook");
            }
        }
    }

    async fn run_cycle(&self, now: DateTime<Utc>) -> crate::error::Result<()> {
        let gathered = gather::gather(self.store.as_ref(), self.config.planner_stale_initiative_days)?;
        let mut planner_state = state::load(self.store.as_ref())?;

        housekeeping(&mut planner_state, &gathered, now, &self.config);

        let candidates = score_candidates(&gathered, &planner_state);
        let today = day_key(now);

        let mut log_entry = serde_json::json!({
            "at": now.to_rfc3339(),
            "candidates": candidates.len(),
            "actions": 0,
        });

        if candidates.is_empty() {
            state::append_log(self.store.as_ref(), log_entry);
            state::save(self.store.as_ref(), &planner_state)?;
            return Ok(());
        }

        let planned = self.plan(&candidates, &planner_state).await?;
        let executed = self.execute_actions(planned, &mut planner_state, &today, now).await;

        log_entry["actions"] = serde_json::json!(executed);
        state::append_log(self.store.as_ref(), log_entry);

        planner_state.last_plan_at = Some(now.to_rfc3339());
        state::save(self.store.as_ref(), &planner_state)?;
        Ok(())
    }

    async fn plan(&self, candidates: &[ScoredCandidate], planner_state: &PlannerState) -> crate::error::Result<Vec<PlannedAction>> {
        let template = self.store.read_file(PLAN_PROMPT_PATH)?.unwrap_or_default();
        let system = self.store.read_file(SYSTEM_PROMPT_PATH)?.unwrap_or_default();

        let user_msg = template
            .replace("{candidates}", &serde_json::to_string_pretty(candidates).unwrap_or_default())
            .replace("{active_initiatives}", &serde_json::to_string_pretty(&planner_state.initiatives).unwrap_or_default());

        let req = ChatRequest {
            messages: vec![Message { role: Role::User, content: user_msg }],
            ..ChatRequest::new(&self.config.llm_heavy_model, system, 1500)
        };

        let response = self.llm_heavy.send(&req).await?;
        let (_, actions) = parse_plan_response(&response.content);
        Ok(actions)
    }

    async fn execute_actions(
        &self,
        planned: Vec<PlannedAction>,
        planner_state: &mut PlannerState,
        today: &str,
        now: DateTime<Utc>,
    ) -> u32 {
        let dispatcher = ActionDispatcher::new(self.chat.as_ref(), &self.config);
        let mut executed = 0u32;

        for action in planned {
            let stats_snapshot = planner_state.daily_stats.entry(today.to_string()).or_default().clone();
            if !self.within_limits(planner_state, &stats_snapshot, &action, now) {
                continue;
            }

            let initiative_idx = find_or_create_initiative(planner_state, &action, now);
            let initiative = planner_state.initiatives[initiative_idx].clone();

            let Some(result) = dispatcher.execute(&action, &initiative).await else { continue };

            let initiative = &mut planner_state.initiatives[initiative_idx];
            initiative.updated_at = now.to_rfc3339();
            initiative.actions_today += 1;
            if action.kind == "start_thread" {
                initiative.thread_id = Some(result.post_id.clone());
                initiative.status = InitiativeStatus::WaitingResponse;
                planner_state.daily_stats.entry(today.to_string()).or_default().threads_started += 1;
            } else {
                initiative.status = InitiativeStatus::WaitingResponse;
            }
            if let Some(target) = &result.target {
                if !initiative.waiting_for.contains(target) {
                    initiative.waiting_for.push(target.clone());
                }
            }
            initiative.next_action_after = Some((now + Duration::hours(self.config.planner_wait_before_followup_hours)).to_rfc3339());
            initiative.actions_taken.push(serde_json::to_value(&result).unwrap_or_default());

            planner_state.daily_stats.entry(today.to_string()).or_default().messages_sent += 1;
            executed += 1;

            let cooldown_key = format!("{}:{}", initiative.contract_id, action.kind);
            planner_state
                .cooldowns
                .insert(cooldown_key, (now + Duration::hours(self.config.planner_cooldown_hours)).to_rfc3339());
        }

        executed
    }

    fn within_limits(&self, planner_state: &PlannerState, stats: &DailyStats, action: &PlannedAction, now: DateTime<Utc>) -> bool {
        if stats.messages_sent as usize >= self.config.planner_max_messages_per_day {
            return false;
        }
        if action.kind == "start_thread" && stats.threads_started as usize >= self.config.planner_max_new_threads_per_day {
            return false;
        }

        let live_count = planner_state.initiatives.iter().filter(|i| i.status.is_live()).count();
        let is_new = !planner_state.initiatives.iter().any(|i| i.contract_id == action.contract_id);
        if is_new && action.kind == "start_thread" && live_count >= self.config.planner_max_active_initiatives {
            return false;
        }

        if let Some(initiative) = planner_state.initiatives.iter().find(|i| i.contract_id == action.contract_id) {
            if initiative.actions_today as usize >= self.config.planner_max_actions_per_initiative_per_day {
                return false;
            }
            if let Some(after) = &initiative.next_action_after {
                if let Ok(after) = DateTime::parse_from_rfc3339(after) {
                    if now < after {
                        return false;
                    }
                }
            }
        }

        let cooldown_key = format!("{}:{}", action.contract_id, action.kind);
        if let Some(expiry) = planner_state.cooldowns.get(&cooldown_key) {
            if let Ok(expiry) = DateTime::parse_from_rfc3339(expiry) {
                if now < expiry {
                    return false;
                }
            }
        }

        true
    }
}

fn day_key(now: DateTime<Utc>) -> String {
    now.format("%Y-%m-%d").to_string()
}

fn next_run_time(config: &Config, from: DateTime<Utc>) -> DateTime<Utc> {
    let (hour, minute) = parse_hhmm(&config.planner_run_time);
    let mut candidate = from
        .date_naive()
        .and_hms_opt(hour, minute, 0)
        .and_then(|dt| dt.and_local_timezone(Utc).single())
        .unwrap_or(from);
    if candidate <= from {
        candidate += Duration::days(1);
    }
    while !is_workday(&config.planner_workdays, candidate) {
        candidate += Duration::days(1);
    }
    candidate
}

fn parse_hhmm(s: &str) -> (u32, u32) {
    let mut parts = s.split(':');
    let hour = parts.next().and_then(|h| h.parse().ok()).unwrap_or(9);
    let minute = parts.next().and_then(|m| m.parse().ok()).unwrap_or(0);
    (hour, minute)
}

fn is_workday(workdays: &[u8], day: DateTime<Utc>) -> bool {
    let dow = day.weekday().num_days_from_monday() as u8;
    workdays.contains(&dow)
}

fn housekeeping(planner_state: &mut PlannerState, gathered: &Gathered, now: DateTime<Utc>, config: &Config) {
    let today = day_key(now);
    planner_state.daily_stats.retain(|k, _| k == &today);
    planner_state.daily_stats.entry(today).or_default();

    for initiative in planner_state.initiatives.iter_mut() {
        initiative.actions_today = 0;
    }

    let stale_cutoff = now - Duration::days(config.planner_stale_initiative_days);
    for initiative in planner_state.initiatives.iter_mut() {
        if !initiative.status.is_live() {
            continue;
        }
        let updated = DateTime::parse_from_rfc3339(&initiative.updated_at).map(|d| d.with_timezone(&Utc)).unwrap_or(now);
        if updated < stale_cutoff {
            initiative.status = InitiativeStatus::Abandoned;
            continue;
        }
        let still_open = gathered.contracts.iter().any(|c| c.id == initiative.contract_id && c.status.as_deref() != Some("agreed"));
        if !still_open {
            initiative.status = InitiativeStatus::Completed;
        }
    }
}

fn score_candidates(gathered: &Gathered, planner_state: &PlannerState) -> Vec<ScoredCandidate> {
    let max_priority = gathered.queue.iter().filter_map(|q| q.priority).max().unwrap_or(1).max(1) as f64;
    let mut candidates = Vec::new();

    for conflict in &gathered.conflicts {
        for contract_id in &conflict.contracts {
            let depth = gathered.depth_of(contract_id);
            let priority = gathered.queue.iter().find(|q| &q.contract_id == contract_id).and_then(|q| q.priority);
            let already_active = planner_state.initiatives.iter().any(|i| &i.contract_id == contract_id && i.status.is_live());
            let (score, breakdown) = scoring::compute_priority_score(ScoreInputs {
                depth,
                priority,
                days_blocked: 0.0,
                stakeholder_available: true,
                has_conflicts: true,
                is_in_progress: already_active,
            });
            candidates.push(ScoredCandidate {
                contract_id: contract_id.clone(),
                metric_name: conflict.title.clone(),
                score,
                breakdown,
                candidate_type: CandidateType::ConflictResolution,
                tree_depth: depth,
                conflict_types: vec![conflict.conflict_type.clone()],
                stakeholders: Vec::new(),
            });
        }
    }

    for review in &gathered.stale_reviews {
        let depth = gathered.depth_of(&review.contract_id);
        let priority = gathered.queue.iter().find(|q| q.contract_id == review.contract_id).and_then(|q| q.priority);
        let already_active = planner_state.initiatives.iter().any(|i| i.contract_id == review.contract_id && i.status.is_live());
        let (score, breakdown) = scoring::compute_priority_score(ScoreInputs {
            depth,
            priority,
            days_blocked: review.days as f64,
            stakeholder_available: true,
            has_conflicts: false,
            is_in_progress: already_active,
        });
        candidates.push(ScoredCandidate {
            contract_id: review.contract_id.clone(),
            metric_name: review.name.clone(),
            score,
            breakdown,
            candidate_type: CandidateType::StaleReview,
            tree_depth: depth,
            conflict_types: Vec::new(),
            stakeholders: Vec::new(),
        });
    }

    for suggestion in &gathered.uncovered {
        let depth = gathered.depth_of(&suggestion.contract_id);
        let priority = suggestion.priority;
        let already_active = planner_state.initiatives.iter().any(|i| i.contract_id == suggestion.contract_id && i.status.is_live());
        let (score, breakdown) = scoring::compute_priority_score(ScoreInputs {
            depth,
            priority,
            days_blocked: 0.0,
            stakeholder_available: !suggestion.stakeholders.is_empty(),
            has_conflicts: false,
            is_in_progress: already_active,
        });
        candidates.push(ScoredCandidate {
            contract_id: suggestion.contract_id.clone(),
            metric_name: suggestion.metric_name.clone(),
            score,
            breakdown,
            candidate_type: CandidateType::NewContract,
            tree_depth: depth,
            conflict_types: Vec::new(),
            stakeholders: suggestion.stakeholders.clone(),
        });
    }

    let _ = max_priority;
    scoring::rank_candidates(candidates)
}

fn find_or_create_initiative(planner_state: &mut PlannerState, action: &PlannedAction, now: DateTime<Utc>) -> usize {
    if let Some(idx) = planner_state.initiatives.iter().position(|i| i.contract_id == action.contract_id) {
        return idx;
    }
    let initiative = Initiative {
        id: format!("init-{}-{}", action.contract_id, now.timestamp()),
        kind: "new_contract".to_string(),
        contract_id: action.contract_id.clone(),
        priority_score: 0.0,
        status: InitiativeStatus::Active,
        created_at: now.to_rfc3339(),
        updated_at: now.to_rfc3339(),
        thread_id: None,
        stakeholders: Vec::new(),
        waiting_for: Vec::new(),
        actions_taken: Vec::new(),
        last_external_activity_at: None,
        next_action_after: None,
        actions_today: 0,
    };
    planner_state.initiatives.push(initiative);
    planner_state.initiatives.len() - 1
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn next_run_time_skips_weekends() {
        let config = Config { planner_run_time: "09:00".into(), planner_workdays: vec![0, 1, 2, 3, 4], ..Config::default() };
        let saturday = Utc.with_ymd_and_hms(2026, 8, 1, 10, 0, 0).unwrap();
        let next = next_run_time(&config, saturday);
        assert_eq!(next.weekday().num_days_from_monday(), 0);
    }

    #[test]
    fn parse_hhmm_parses_valid_input() {
        assert_eq!(parse_hhmm("09:30"), (9, 30));
        assert_eq!(parse_hhmm("bad"), (9, 0));
    }
}
