//! Alert processing logic

use super::manager::{AlertManager, AlertState, PendingNotification};
use super::types::{
    Alert, AlertRule, AlertStatus, EvaluationOutcome, NotificationKind, NotificationResult,
};
use crate::monitoring::bus::MonitoringEvent;
use crate::monitoring::metrics::calculate_average;
use crate::utils::time::{elapsed_ms, has_elapsed};
use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::time::Duration;
use tokio::task::AbortHandle;
use tracing::{debug, info, warn};

impl AlertManager {
    /// Spawn a one-shot timer that escalates `alert_id` after `delay`
    ///
    /// Returns `None` outside a tokio runtime; the periodic check covers that case.
    pub(super) fn arm_escalation(&self, alert_id: &str, delay: Duration) -> Option<AbortHandle> {
        let runtime = tokio::runtime::Handle::try_current().ok()?;
        let manager = self.clone();
        let alert_id = alert_id.to_string();
        let task = runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            manager.escalate_on_timer(&alert_id);
        });
        Some(task.abort_handle())
    }

    fn escalate_on_timer(&self, alert_id: &str) {
        let now = self.clock.now();
        let escalated = {
            let mut state = self.state.lock();
            // this task is the timer; forget the handle instead of aborting ourselves
            let Some(entry) = state.alerts.get_mut(alert_id) else {
                return;
            };
            entry.escalation_timer = None;
            let due = entry.rule.escalation.as_ref().is_some_and(|policy| {
                has_elapsed(
                    entry.alert.created_at,
                    now,
                    Duration::from_secs(policy.delay_secs),
                )
            });
            if !due {
                // the shared clock lags wall time; the periodic check picks it up later
                debug!(alert_id = %alert_id, "Escalation timer fired before delay elapsed");
                return;
            }
            self.escalate_locked(&mut state, alert_id, now)
        };
        if let Some(alert) = escalated {
            self.bus.publish(MonitoringEvent::AlertEscalated(alert));
        }
    }

    /// Raise a firing, not yet escalated alert to its rule's escalation policy
    ///
    /// The `escalation_level == 0` guard makes this a no-op on every call after
    /// the first, whichever of the timer or the periodic check gets there first.
    fn escalate_locked(
        &self,
        state: &mut AlertState,
        alert_id: &str,
        now: DateTime<Utc>,
    ) -> Option<Alert> {
        let entry = state.alerts.get_mut(alert_id)?;
        if entry.alert.status != AlertStatus::Firing || entry.alert.escalation_level != 0 {
            return None;
        }
        let policy = entry.rule.escalation.clone()?;

        entry.cancel_escalation();
        entry.alert.escalation_level = 1;
        entry.alert.severity = entry.alert.severity.max(policy.severity);
        entry.alert.updated_at = now;
        let alert = entry.alert.clone();
        let channels = if policy.channels.is_empty() {
            entry.rule.channels.clone()
        } else {
            policy.channels
        };

        state.stats.escalations += 1;
        warn!(
            alert_id = %alert.id,
            severity = %alert.severity,
            "Alert escalated: {}",
            alert.summary()
        );
        self.queue_notification(&alert, channels, NotificationKind::Escalated);
        Some(alert)
    }

    /// Escalate every firing alert that has outlived its escalation delay
    ///
    /// Returns the alerts escalated by this call.
    pub fn check_escalation(&self) -> Vec<Alert> {
        let now = self.clock.now();
        let escalated: Vec<Alert> = {
            let mut state = self.state.lock();
            let due: Vec<String> = state
                .alerts
                .values()
                .filter(|e| {
                    e.alert.status == AlertStatus::Firing && e.alert.escalation_level == 0
                })
                .filter(|e| {
                    e.rule.escalation.as_ref().is_some_and(|p| {
                        has_elapsed(e.alert.created_at, now, Duration::from_secs(p.delay_secs))
                    })
                })
                .map(|e| e.alert.id.clone())
                .collect();

            due.iter()
                .filter_map(|id| self.escalate_locked(&mut state, id, now))
                .collect()
        };

        for alert in &escalated {
            self.bus.publish(MonitoringEvent::AlertEscalated(alert.clone()));
        }
        escalated
    }

    /// Re-arm escalation timers for firing alerts that have none
    ///
    /// Used when the service starts again after a stop.
    pub fn rearm_escalations(&self) -> usize {
        let now = self.clock.now();
        let mut state = self.state.lock();
        let mut armed = 0;
        for entry in state.alerts.values_mut() {
            if entry.alert.status != AlertStatus::Firing
                || entry.alert.escalation_level != 0
                || entry.escalation_timer.is_some()
            {
                continue;
            }
            if let Some(policy) = &entry.rule.escalation {
                let delay = remaining(entry.alert.created_at, now, policy.delay_secs);
                entry.escalation_timer = self.arm_escalation(&entry.alert.id, delay);
                armed += usize::from(entry.escalation_timer.is_some());
            }
        }
        armed
    }

    /// Abort every escalation timer, leaving alerts in place
    pub fn cancel_timers(&self) {
        let mut state = self.state.lock();
        for entry in state.alerts.values_mut() {
            entry.cancel_escalation();
        }
    }

    /// End expired suppressions
    ///
    /// The rule's condition is re-checked against the live metric window: a
    /// still-triggering (or unmeasured) alert fires again, otherwise it resolves.
    pub fn sweep_suppressions(&self) -> Vec<Alert> {
        let now = self.clock.now();
        let expired: Vec<(String, AlertRule)> = {
            let state = self.state.lock();
            state
                .alerts
                .values()
                .filter(|e| e.alert.status == AlertStatus::Suppressed)
                .filter(|e| e.alert.suppression_expiry.is_some_and(|t| t <= now))
                .map(|e| (e.alert.id.clone(), e.rule.clone()))
                .collect()
        };
        if expired.is_empty() {
            return Vec::new();
        }

        // read metrics without holding the alert lock
        let live: Vec<(String, AlertRule, Option<f64>)> = expired
            .into_iter()
            .map(|(id, rule)| {
                let value = self.window_average(&rule);
                (id, rule, value)
            })
            .collect();

        let mut changed = Vec::new();
        {
            let mut state = self.state.lock();
            for (id, rule, value) in live {
                let still_expired = state.alerts.get(&id).is_some_and(|e| {
                    e.alert.status == AlertStatus::Suppressed
                        && e.alert.suppression_expiry.is_some_and(|t| t <= now)
                });
                if !still_expired {
                    continue;
                }

                let still_triggered = value
                    .map(|v| rule.condition.operator.apply(v, rule.condition.threshold))
                    .unwrap_or(true);

                if still_triggered {
                    let timer = rule.escalation.as_ref().and_then(|p| {
                        state
                            .alerts
                            .get(&id)
                            .filter(|e| e.alert.escalation_level == 0)
                            .map(|e| remaining(e.alert.created_at, now, p.delay_secs))
                            .and_then(|delay| self.arm_escalation(&id, delay))
                    });
                    if let Some(entry) = state.alerts.get_mut(&id) {
                        entry.alert.status = AlertStatus::Firing;
                        entry.alert.suppression_expiry = None;
                        entry.alert.updated_at = now;
                        if let Some(v) = value {
                            entry.alert.value = v;
                        }
                        entry.escalation_timer = timer;
                        let alert = entry.alert.clone();
                        info!(alert_id = %id, "Suppression expired, alert firing again");
                        self.queue_notification(
                            &alert,
                            rule.channels.clone(),
                            NotificationKind::Fired,
                        );
                        changed.push(MonitoringEvent::AlertUpdated(alert));
                    }
                } else if let Some((alert, _)) = self.resolve_locked(&mut state, &id, now) {
                    info!(alert_id = %id, "Suppression expired, condition cleared");
                    self.queue_notification(
                        &alert,
                        rule.channels.clone(),
                        NotificationKind::Resolved,
                    );
                    changed.push(MonitoringEvent::AlertResolved(alert));
                }
            }
        }

        changed
            .into_iter()
            .filter_map(|event| {
                let alert = match &event {
                    MonitoringEvent::AlertUpdated(a) | MonitoringEvent::AlertResolved(a) => {
                        Some(a.clone())
                    }
                    _ => None,
                };
                self.bus.publish(event);
                alert
            })
            .collect()
    }

    fn window_average(&self, rule: &AlertRule) -> Option<f64> {
        let values = self.metrics.window_values(
            &rule.condition.metric,
            Duration::from_secs(rule.condition.time_window_secs),
        );
        (!values.is_empty()).then(|| calculate_average(&values))
    }

    /// Evaluate every enabled rule whose evaluation interval has passed
    ///
    /// Each rule sees the average of its metric over its time window. Rules
    /// whose metric has no samples in the window are skipped.
    pub fn evaluate_rules(&self) -> Vec<EvaluationOutcome> {
        let now = self.clock.now();
        let due: Vec<AlertRule> = {
            let state = self.state.lock();
            state
                .rules
                .values()
                .filter(|r| r.enabled)
                .filter(|r| {
                    state.last_evaluated.get(&r.id).is_none_or(|last| {
                        has_elapsed(
                            *last,
                            now,
                            Duration::from_secs(r.condition.evaluation_interval_secs),
                        )
                    })
                })
                .cloned()
                .collect()
        };

        let mut outcomes = Vec::new();
        for rule in due {
            let Some(value) = self.window_average(&rule) else {
                debug!(rule = %rule.id, metric = %rule.condition.metric, "No samples in window");
                continue;
            };
            self.state.lock().last_evaluated.insert(rule.id.clone(), now);

            match self.evaluate(&rule, value) {
                Ok(EvaluationOutcome::NoChange) => {}
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => warn!("Failed to evaluate rule {}: {}", rule.name, e),
            }
        }
        outcomes
    }

    /// Dispatch every queued notification
    ///
    /// Failed channels are reported as warning events; the rest of the queue
    /// is still delivered.
    ///
    /// If the call is dropped part way, notifications not yet fully dispatched
    /// go back to the front of the queue.
    pub async fn process_pending(&self) -> Vec<NotificationResult> {
        let mut undelivered = Undelivered {
            manager: self,
            queue: std::mem::take(&mut *self.pending.lock()),
        };
        if undelivered.queue.is_empty() {
            return Vec::new();
        }
        debug!(
            count = undelivered.queue.len(),
            "Processing pending notifications"
        );

        let mut results = Vec::new();
        while let Some(notification) = undelivered.queue.front().cloned() {
            let sent = self
                .dispatcher
                .dispatch(&notification.alert, &notification.channels)
                .await;
            undelivered.queue.pop_front();

            let failed = sent.iter().filter(|r| !r.success).count() as u64;
            {
                let mut state = self.state.lock();
                state.stats.notifications_sent += sent.len() as u64 - failed;
                state.stats.failed_notifications += failed;
            }

            for result in sent.iter().filter(|r| !r.success) {
                self.events.warn(
                    "alert_manager",
                    "notify",
                    format!(
                        "{:?} notification for alert {} failed on channel {}: {}",
                        notification.kind,
                        notification.alert.id,
                        result.channel,
                        result.error.as_deref().unwrap_or("unknown error")
                    ),
                    None,
                );
            }
            results.extend(sent);
        }
        results
    }
}

/// Notifications drained from the queue and not yet dispatched
struct Undelivered<'a> {
    manager: &'a AlertManager,
    queue: VecDeque<PendingNotification>,
}

impl Drop for Undelivered<'_> {
    fn drop(&mut self) {
        if self.queue.is_empty() {
            return;
        }
        let mut pending = self.manager.pending.lock();
        while let Some(notification) = self.queue.pop_back() {
            pending.push_front(notification);
        }
    }
}

/// Time left until an escalation delay measured from `created_at` runs out
fn remaining(created_at: DateTime<Utc>, now: DateTime<Utc>, delay_secs: u64) -> Duration {
    Duration::from_secs(delay_secs)
        .saturating_sub(Duration::from_millis(elapsed_ms(created_at, now)))
}
