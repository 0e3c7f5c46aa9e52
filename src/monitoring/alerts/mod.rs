//! Alert management system
//!
//! Rules are evaluated against metric values. Each rule has at most one
//! unresolved [`Alert`], which moves through
//! `firing -> {acknowledged, suppressed, resolved}`, may escalate once, and is
//! announced through the [`NotificationDispatcher`].

mod channels;
mod dispatcher;
mod manager;
mod processing;
mod types;

pub use channels::{
    ConsoleChannel, EmailChannel, LogFileChannel, NotificationChannel, SlackChannel,
    WebhookChannel, build_channel, http_client,
};
pub use dispatcher::NotificationDispatcher;
pub use manager::AlertManager;
pub use types::{
    Alert, AlertCondition, AlertRule, AlertStats, AlertStatus, ChannelSettings,
    ComparisonOperator, EscalationPolicy, EvaluationOutcome, NotificationKind,
    NotificationResult, SuppressionPolicy,
};
