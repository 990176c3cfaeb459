use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::domain::request::RequestId;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationEvent {
    RequestSubmitted,
    StepApproved,
    RequestApproved,
    RequestRejected,
    RequestCompleted,
    RequestCancelled,
}

impl NotificationEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RequestSubmitted => "REQUEST_SUBMITTED",
            Self::StepApproved => "STEP_APPROVED",
            Self::RequestApproved => "REQUEST_APPROVED",
            Self::RequestRejected => "REQUEST_REJECTED",
            Self::RequestCompleted => "REQUEST_COMPLETED",
            Self::RequestCancelled => "REQUEST_CANCELLED",
        }
    }
}

impl fmt::Display for NotificationEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub event_id: String,
    pub request_id: RequestId,
    pub event: NotificationEvent,
    pub actor: String,
    pub occurred_at: DateTime<Utc>,
    pub metadata: BTreeMap<String, String>,
}

impl Notification {
    pub fn new(
        request_id: RequestId,
        event: NotificationEvent,
        actor: impl Into<String>,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4().to_string(),
            request_id,
            event,
            actor: actor.into(),
            occurred_at,
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum NotificationError {
    #[error("notification channel closed")]
    ChannelClosed,
    #[error("notification delivery failed: {0}")]
    Delivery(String),
}

/// Receives a signal after every committed transition.
pub trait NotificationHook: Send + Sync {
    fn notify(&self, notification: Notification) -> Result<(), NotificationError>;
}

/// Hands the notification to the hook and swallows failures. A transition
/// that already committed stays committed.
pub fn dispatch(hook: &dyn NotificationHook, notification: Notification) {
    let event_id = notification.event_id.clone();
    let request_id = notification.request_id.clone();
    let event = notification.event;

    if let Err(error) = hook.notify(notification) {
        tracing::warn!(
            event_name = "notify.dispatch_failed",
            event_id = %event_id,
            request_id = %request_id,
            notification = %event,
            error = %error,
            "notification hook failed; transition kept"
        );
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct NoopNotificationHook;

impl NotificationHook for NoopNotificationHook {
    fn notify(&self, _notification: Notification) -> Result<(), NotificationError> {
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct TracingNotificationHook;

impl NotificationHook for TracingNotificationHook {
    fn notify(&self, notification: Notification) -> Result<(), NotificationError> {
        tracing::info!(
            event_name = "notify.request_event",
            event_id = %notification.event_id,
            request_id = %notification.request_id,
            notification = %notification.event,
            actor = %notification.actor,
            occurred_at = %notification.occurred_at.to_rfc3339(),
            "request notification"
        );
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct InMemoryNotificationHook {
    notifications: Arc<Mutex<Vec<Notification>>>,
}

impl InMemoryNotificationHook {
    pub fn notifications(&self) -> Vec<Notification> {
        match self.notifications.lock() {
            Ok(notifications) => notifications.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn events(&self) -> Vec<NotificationEvent> {
        self.notifications().into_iter().map(|notification| notification.event).collect()
    }
}

impl NotificationHook for InMemoryNotificationHook {
    fn notify(&self, notification: Notification) -> Result<(), NotificationError> {
        match self.notifications.lock() {
            Ok(mut notifications) => notifications.push(notification),
            Err(poisoned) => poisoned.into_inner().push(notification),
        }
        Ok(())
    }
}

/// Forwards notifications to a consumer task without blocking the caller.
#[derive(Clone, Debug)]
pub struct ChannelNotificationHook {
    sender: mpsc::UnboundedSender<Notification>,
}

impl ChannelNotificationHook {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Notification>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl NotificationHook for ChannelNotificationHook {
    fn notify(&self, notification: Notification) -> Result<(), NotificationError> {
        self.sender.send(notification).map_err(|_| NotificationError::ChannelClosed)
    }
}

/// Delivers to every hook; reports the first failure after trying all of them.
#[derive(Clone, Default)]
pub struct FanoutNotificationHook {
    hooks: Vec<Arc<dyn NotificationHook>>,
}

impl FanoutNotificationHook {
    pub fn new(hooks: Vec<Arc<dyn NotificationHook>>) -> Self {
        Self { hooks }
    }

    pub fn with_hook(mut self, hook: Arc<dyn NotificationHook>) -> Self {
        self.hooks.push(hook);
        self
    }
}

impl NotificationHook for FanoutNotificationHook {
    fn notify(&self, notification: Notification) -> Result<(), NotificationError> {
        let mut first_error = None;
        for hook in &self.hooks {
            if let Err(error) = hook.notify(notification.clone()) {
                first_error.get_or_insert(error);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Utc;

    use super::{
        dispatch, ChannelNotificationHook, FanoutNotificationHook, InMemoryNotificationHook,
        Notification, NotificationError, NotificationEvent, NotificationHook,
    };
    use crate::domain::request::RequestId;

    struct FailingHook;

    impl NotificationHook for FailingHook {
        fn notify(&self, _notification: Notification) -> Result<(), NotificationError> {
            Err(NotificationError::Delivery("smtp down".to_string()))
        }
    }

    fn submitted() -> Notification {
        Notification::new(
            RequestId("req-1".to_string()),
            NotificationEvent::RequestSubmitted,
            "student-7",
            Utc::now(),
        )
        .with_metadata("request_number", "SP-2026-00001")
    }

    #[test]
    fn in_memory_hook_records_notifications() {
        let hook = InMemoryNotificationHook::default();
        dispatch(&hook, submitted());

        let recorded = hook.notifications();
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].event, NotificationEvent::RequestSubmitted);
        assert_eq!(
            recorded[0].metadata.get("request_number").map(String::as_str),
            Some("SP-2026-00001")
        );
    }

    #[test]
    fn failing_hook_is_swallowed_by_dispatch() {
        dispatch(&FailingHook, submitted());
    }

    #[test]
    fn fanout_reaches_every_hook_even_after_failure() {
        let recorder = InMemoryNotificationHook::default();
        let fanout = FanoutNotificationHook::default()
            .with_hook(Arc::new(FailingHook))
            .with_hook(Arc::new(recorder.clone()));

        let result = fanout.notify(submitted());

        assert_eq!(result, Err(NotificationError::Delivery("smtp down".to_string())));
        assert_eq!(recorder.events(), vec![NotificationEvent::RequestSubmitted]);
    }

    #[tokio::test]
    async fn channel_hook_delivers_to_receiver() {
        let (hook, mut receiver) = ChannelNotificationHook::new();
        hook.notify(submitted()).expect("receiver alive");

        let received = receiver.recv().await.expect("one notification");
        assert_eq!(received.request_id, RequestId("req-1".to_string()));

        drop(receiver);
        assert_eq!(hook.notify(submitted()), Err(NotificationError::ChannelClosed));
    }
}
