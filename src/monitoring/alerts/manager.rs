//! Alert manager implementation

use super::dispatcher::NotificationDispatcher;
use super::types::{
    Alert, AlertRule, AlertStats, AlertStatus, EvaluationOutcome, NotificationKind,
};
use crate::config::AlertingConfig;
use crate::monitoring::bounded::BoundedPush;
use crate::monitoring::bus::{EventBus, MonitoringEvent};
use crate::monitoring::events::StructuredEventLog;
use crate::monitoring::metrics::MetricsStore;
use crate::utils::error::{ObservabilityError, Result};
use crate::utils::generate_id;
use crate::utils::time::Clock;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::AbortHandle;
use tracing::{debug, info};

#[derive(Debug)]
pub(super) struct AlertEntry {
    pub(super) alert: Alert,
    /// The rule as it was when the alert opened
    pub(super) rule: AlertRule,
    /// Armed while the alert is firing and not yet escalated
    pub(super) escalation_timer: Option<AbortHandle>,
}

impl AlertEntry {
    pub(super) fn cancel_escalation(&mut self) {
        if let Some(timer) = self.escalation_timer.take() {
            timer.abort();
        }
    }
}

/// Everything the state machine mutates, behind one lock
#[derive(Debug, Default)]
pub(super) struct AlertState {
    pub(super) rules: BTreeMap<String, AlertRule>,
    /// Alerts that have not resolved yet
    pub(super) alerts: HashMap<String, AlertEntry>,
    /// Rule id to its single unresolved alert
    pub(super) active_by_rule: HashMap<String, String>,
    /// Resolved alerts, oldest first
    pub(super) history: VecDeque<Alert>,
    pub(super) last_evaluated: HashMap<String, DateTime<Utc>>,
    pub(super) stats: AlertStats,
}

/// A notification waiting for the next dispatch cycle
#[derive(Debug, Clone)]
pub(super) struct PendingNotification {
    pub(super) alert: Alert,
    pub(super) channels: Vec<String>,
    pub(super) kind: NotificationKind,
}

/// Drives the alert lifecycle for every rule
///
/// Clones share state; background tasks and escalation timers hold clones.
#[derive(Debug, Clone)]
pub struct AlertManager {
    history_size: usize,
    pub(super) clock: Arc<dyn Clock>,
    pub(super) events: Arc<StructuredEventLog>,
    pub(super) metrics: Arc<MetricsStore>,
    pub(super) dispatcher: Arc<NotificationDispatcher>,
    pub(super) bus: EventBus,
    pub(super) state: Arc<Mutex<AlertState>>,
    /// Lock order: `state` before `pending`
    pub(super) pending: Arc<Mutex<VecDeque<PendingNotification>>>,
}

impl AlertManager {
    /// Create a manager with the rules from `config`
    pub fn new(
        config: &AlertingConfig,
        clock: Arc<dyn Clock>,
        events: Arc<StructuredEventLog>,
        metrics: Arc<MetricsStore>,
        dispatcher: Arc<NotificationDispatcher>,
        bus: EventBus,
    ) -> Result<Self> {
        let manager = Self {
            history_size: config.history_size,
            clock,
            events,
            metrics,
            dispatcher,
            bus,
            state: Arc::new(Mutex::new(AlertState::default())),
            pending: Arc::new(Mutex::new(VecDeque::new())),
        };
        for rule in &config.rules {
            manager.add_rule(rule.clone())?;
        }
        Ok(manager)
    }

    pub fn dispatcher(&self) -> &Arc<NotificationDispatcher> {
        &self.dispatcher
    }

    /// Add or replace an alert rule
    pub fn add_rule(&self, rule: AlertRule) -> Result<()> {
        rule.validate().map_err(ObservabilityError::Validation)?;
        info!("Adding alert rule: {}", rule.name);
        self.state.lock().rules.insert(rule.id.clone(), rule);
        Ok(())
    }

    /// Remove a rule, resolving its open alert
    pub fn remove_rule(&self, rule_id: &str) -> Option<AlertRule> {
        let now = self.clock.now();
        let (rule, resolved) = {
            let mut state = self.state.lock();
            let rule = state.rules.remove(rule_id)?;
            state.last_evaluated.remove(rule_id);
            let resolved = state
                .active_by_rule
                .get(rule_id)
                .cloned()
                .and_then(|id| self.resolve_locked(&mut state, &id, now));
            (rule, resolved)
        };

        info!("Removed alert rule: {}", rule_id);
        if let Some((alert, opened_with)) = resolved {
            self.queue_notification(&alert, opened_with.channels, NotificationKind::Resolved);
            self.bus.publish(MonitoringEvent::AlertResolved(alert));
        }
        Some(rule)
    }

    pub fn rules(&self) -> Vec<AlertRule> {
        self.state.lock().rules.values().cloned().collect()
    }

    pub fn rule(&self, rule_id: &str) -> Option<AlertRule> {
        self.state.lock().rules.get(rule_id).cloned()
    }

    /// Apply `rule` to `value`
    ///
    /// A triggering value opens an alert, or refreshes the rule's open alert in
    /// place. A non-triggering value resolves a firing or acknowledged alert;
    /// suppressed alerts are left to the suppression sweep.
    pub fn evaluate(&self, rule: &AlertRule, value: f64) -> Result<EvaluationOutcome> {
        rule.validate().map_err(ObservabilityError::Validation)?;
        if !value.is_finite() {
            return Err(ObservabilityError::validation(format!(
                "rule {} evaluated with non-finite value {}",
                rule.id, value
            )));
        }
        if !rule.enabled {
            return Ok(EvaluationOutcome::NoChange);
        }

        let now = self.clock.now();
        let triggered = rule.condition.operator.apply(value, rule.condition.threshold);

        let outcome = {
            let mut state = self.state.lock();
            let existing = state.active_by_rule.get(&rule.id).cloned();

            match (triggered, existing) {
                (true, Some(id)) => match state.alerts.get_mut(&id) {
                    Some(entry) => {
                        entry.alert.value = value;
                        entry.alert.updated_at = now;
                        EvaluationOutcome::Updated(entry.alert.clone())
                    }
                    None => EvaluationOutcome::NoChange,
                },
                (true, None) => {
                    EvaluationOutcome::Created(self.open_alert(&mut state, rule, value, now))
                }
                (false, Some(id)) => {
                    let resolvable = state.alerts.get(&id).is_some_and(|e| {
                        matches!(
                            e.alert.status,
                            AlertStatus::Firing | AlertStatus::Acknowledged | AlertStatus::Pending
                        )
                    });
                    if resolvable {
                        self.resolve_locked(&mut state, &id, now)
                            .map_or(EvaluationOutcome::NoChange, |(alert, _)| {
                                EvaluationOutcome::Resolved(alert)
                            })
                    } else {
                        EvaluationOutcome::NoChange
                    }
                }
                (false, None) => EvaluationOutcome::NoChange,
            }
        };

        match &outcome {
            EvaluationOutcome::Created(alert) => {
                info!(
                    alert_id = %alert.id,
                    rule = %rule.id,
                    value,
                    "Alert firing: {}",
                    alert.summary()
                );
                self.queue_notification(alert, rule.channels.clone(), NotificationKind::Fired);
                self.bus.publish(MonitoringEvent::AlertCreated(alert.clone()));
            }
            EvaluationOutcome::Updated(alert) => {
                debug!(alert_id = %alert.id, value, "Alert value updated");
                self.bus.publish(MonitoringEvent::AlertUpdated(alert.clone()));
            }
            EvaluationOutcome::Resolved(alert) => {
                info!(alert_id = %alert.id, rule = %rule.id, value, "Alert resolved");
                self.queue_notification(alert, rule.channels.clone(), NotificationKind::Resolved);
                self.bus.publish(MonitoringEvent::AlertResolved(alert.clone()));
            }
            EvaluationOutcome::NoChange => {}
        }

        Ok(outcome)
    }

    /// Create a firing alert for `rule` and arm its escalation timer
    fn open_alert(
        &self,
        state: &mut AlertState,
        rule: &AlertRule,
        value: f64,
        now: DateTime<Utc>,
    ) -> Alert {
        let alert = Alert {
            id: generate_id(),
            rule_id: rule.id.clone(),
            rule_name: rule.name.clone(),
            metric: rule.condition.metric.clone(),
            status: AlertStatus::Firing,
            severity: rule.severity,
            value,
            threshold: rule.condition.threshold,
            tags: rule.tags.clone(),
            created_at: now,
            updated_at: now,
            acknowledged_at: None,
            acknowledged_by: None,
            resolved_at: None,
            suppression_expiry: None,
            suppression_reason: None,
            escalation_level: 0,
        };

        let escalation_timer = rule
            .escalation
            .as_ref()
            .and_then(|e| self.arm_escalation(&alert.id, Duration::from_secs(e.delay_secs)));

        state.stats.total_alerts += 1;
        *state
            .stats
            .alerts_by_severity
            .entry(alert.severity.to_string().to_lowercase())
            .or_insert(0) += 1;
        *state
            .stats
            .alerts_by_rule
            .entry(rule.id.clone())
            .or_insert(0) += 1;
        state.stats.last_alert = Some(now);

        state
            .active_by_rule
            .insert(rule.id.clone(), alert.id.clone());
        state.alerts.insert(
            alert.id.clone(),
            AlertEntry {
                alert: alert.clone(),
                rule: rule.clone(),
                escalation_timer,
            },
        );
        alert
    }

    /// Move an open alert into history
    ///
    /// Cancels its escalation timer under the caller's lock.
    pub(super) fn resolve_locked(
        &self,
        state: &mut AlertState,
        alert_id: &str,
        now: DateTime<Utc>,
    ) -> Option<(Alert, AlertRule)> {
        let mut entry = state.alerts.remove(alert_id)?;
        entry.cancel_escalation();

        let mut alert = entry.alert;
        alert.status = AlertStatus::Resolved;
        alert.resolved_at = Some(now);
        alert.updated_at = now;
        alert.suppression_expiry = None;

        if state.active_by_rule.get(&alert.rule_id) == Some(&alert.id) {
            state.active_by_rule.remove(&alert.rule_id);
        }
        state.stats.resolved += 1;
        state.history.push_bounded(alert.clone(), self.history_size);
        Some((alert, entry.rule))
    }

    /// Report a rejected transition as a warning event and return it as an error
    fn reject(&self, alert_id: &str, from: AlertStatus, to: AlertStatus) -> ObservabilityError {
        self.events.warn(
            "alert_manager",
            "transition",
            format!("alert {} cannot move from {} to {}", alert_id, from, to),
            None,
        );
        ObservabilityError::InvalidTransition {
            alert_id: alert_id.to_string(),
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    /// Current status of an alert, open or resolved
    fn status_of(state: &AlertState, alert_id: &str) -> Option<AlertStatus> {
        state
            .alerts
            .get(alert_id)
            .map(|e| e.alert.status)
            .or_else(|| {
                state
                    .history
                    .iter()
                    .any(|a| a.id == alert_id)
                    .then_some(AlertStatus::Resolved)
            })
    }

    /// Acknowledge a firing alert
    pub fn acknowledge(&self, alert_id: &str, by: &str) -> Result<Alert> {
        let now = self.clock.now();
        let alert = {
            let mut state = self.state.lock();
            let entry = self.firing_entry(&mut state, alert_id, AlertStatus::Acknowledged)?;
            entry.cancel_escalation();
            entry.alert.status = AlertStatus::Acknowledged;
            entry.alert.acknowledged_at = Some(now);
            entry.alert.acknowledged_by = Some(by.to_string());
            entry.alert.updated_at = now;
            entry.alert.clone()
        };

        info!(alert_id = %alert_id, by = %by, "Alert acknowledged");
        self.bus
            .publish(MonitoringEvent::AlertAcknowledged(alert.clone()));
        Ok(alert)
    }

    /// Silence a firing alert until `duration` has passed
    ///
    /// Without a duration the rule's default suppression applies.
    pub fn suppress(
        &self,
        alert_id: &str,
        duration: Option<Duration>,
        reason: &str,
    ) -> Result<Alert> {
        let now = self.clock.now();
        let alert = {
            let mut state = self.state.lock();
            let entry = self.firing_entry(&mut state, alert_id, AlertStatus::Suppressed)?;
            let rule_default = entry
                .rule
                .suppression
                .as_ref()
                .map(|s| Duration::from_secs(s.default_duration_secs));
            let duration = duration.or(rule_default).ok_or_else(|| {
                ObservabilityError::validation(format!(
                    "alert {} has no suppression duration and its rule sets no default",
                    alert_id
                ))
            })?;
            if duration.is_zero() {
                return Err(ObservabilityError::validation(
                    "suppression duration must be positive",
                ));
            }
            let expiry = chrono::Duration::from_std(duration)
                .ok()
                .and_then(|d| now.checked_add_signed(d))
                .ok_or_else(|| {
                    ObservabilityError::validation(format!(
                        "suppression duration {:?} is out of range",
                        duration
                    ))
                })?;

            entry.cancel_escalation();
            entry.alert.status = AlertStatus::Suppressed;
            entry.alert.suppression_expiry = Some(expiry);
            entry.alert.suppression_reason = Some(reason.to_string());
            entry.alert.updated_at = now;
            entry.alert.clone()
        };

        info!(alert_id = %alert_id, reason = %reason, "Alert suppressed");
        self.bus
            .publish(MonitoringEvent::AlertSuppressed(alert.clone()));
        Ok(alert)
    }

    /// The entry for `alert_id` if it is firing
    ///
    /// Any other state is rejected as a transition to `to`.
    fn firing_entry<'a>(
        &self,
        state: &'a mut AlertState,
        alert_id: &str,
        to: AlertStatus,
    ) -> Result<&'a mut AlertEntry> {
        match Self::status_of(state, alert_id) {
            Some(AlertStatus::Firing) => state
                .alerts
                .get_mut(alert_id)
                .ok_or_else(|| ObservabilityError::not_found(format!("alert {}", alert_id))),
            Some(from) => Err(self.reject(alert_id, from, to)),
            None => Err(ObservabilityError::not_found(format!("alert {}", alert_id))),
        }
    }

    /// Resolve an open alert by hand
    pub fn resolve(&self, alert_id: &str) -> Result<Alert> {
        let now = self.clock.now();
        let result = {
            let mut state = self.state.lock();
            match self.resolve_locked(&mut state, alert_id, now) {
                Some(resolved) => Ok(resolved),
                None => Err(Self::status_of(&state, alert_id)),
            }
        };

        match result {
            Ok((alert, rule)) => {
                info!(alert_id = %alert_id, "Alert resolved manually");
                self.queue_notification(&alert, rule.channels, NotificationKind::Resolved);
                self.bus.publish(MonitoringEvent::AlertResolved(alert.clone()));
                Ok(alert)
            }
            Err(Some(from)) => Err(self.reject(alert_id, from, AlertStatus::Resolved)),
            Err(None) => Err(ObservabilityError::not_found(format!("alert {}", alert_id))),
        }
    }

    pub(super) fn queue_notification(
        &self,
        alert: &Alert,
        channels: Vec<String>,
        kind: NotificationKind,
    ) {
        if channels.is_empty() {
            return;
        }
        self.pending.lock().push_back(PendingNotification {
            alert: alert.clone(),
            channels,
            kind,
        });
    }

    /// Notifications waiting for dispatch
    pub fn pending_notifications(&self) -> usize {
        self.pending.lock().len()
    }

    /// Unresolved alerts, oldest first
    pub fn active_alerts(&self) -> Vec<Alert> {
        let mut alerts: Vec<Alert> = self
            .state
            .lock()
            .alerts
            .values()
            .map(|e| e.alert.clone())
            .collect();
        alerts.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        alerts
    }

    /// The unresolved alert for a rule, if any
    pub fn active_for_rule(&self, rule_id: &str) -> Option<Alert> {
        let state = self.state.lock();
        state
            .active_by_rule
            .get(rule_id)
            .and_then(|id| state.alerts.get(id))
            .map(|e| e.alert.clone())
    }

    /// Look up an alert, open or resolved
    pub fn get(&self, alert_id: &str) -> Option<Alert> {
        let state = self.state.lock();
        state
            .alerts
            .get(alert_id)
            .map(|e| e.alert.clone())
            .or_else(|| state.history.iter().find(|a| a.id == alert_id).cloned())
    }

    /// Resolved alerts, most recent first
    pub fn history(&self, limit: Option<usize>) -> Vec<Alert> {
        let state = self.state.lock();
        let limit = limit.unwrap_or(100);
        state.history.iter().rev().take(limit).cloned().collect()
    }

    /// Get alert statistics
    pub fn stats(&self) -> AlertStats {
        self.state.lock().stats.clone()
    }

    /// Drop every alert and queued notification, keeping the rules
    pub fn clear(&self) {
        let mut state = self.state.lock();
        for entry in state.alerts.values_mut() {
            entry.cancel_escalation();
        }
        state.alerts.clear();
        state.active_by_rule.clear();
        state.history.clear();
        state.last_evaluated.clear();
        state.stats = AlertStats::default();
        self.pending.lock().clear();
    }
}
