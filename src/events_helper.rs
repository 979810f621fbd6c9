use kube::runtime::events::{Event, EventType, Recorder};
use kube::{Resource, ResourceExt};
use tracing::*;

use crate::crd::User;
use crate::user_controller::Outcome;

/// Publish a simple Normal event with given reason and note, ignoring errors.
pub async fn emit_info<R: Resource<DynamicType = ()> + ResourceExt>(
    recorder: &Recorder,
    obj: &R,
    reason: &str,
    action: &str,
    note: impl Into<Option<String>>,
) {
    if let Err(e) = recorder
        .publish(
            &Event {
                type_: EventType::Normal,
                reason: reason.into(),
                note: note.into(),
                action: action.into(),
                secondary: None,
            },
            &obj.object_ref(&()),
        )
        .await
    {
        debug!(reason, error = %e, "Failed to publish event");
    }
}

/// Reason and action recorded for an outcome, `None` when nothing was written
pub fn projection_event(outcome: Outcome) -> Option<(&'static str, &'static str)> {
    match outcome {
        Outcome::SecretCreated => Some(("SecretCreated", "CreateSecret")),
        Outcome::SecretUpdated => Some(("SecretUpdated", "UpdateSecret")),
        Outcome::UserAbsent => None,
    }
}

/// Record a successful projection against the `User` it came from
pub async fn emit_projection(recorder: &Recorder, user: &User, outcome: Outcome) {
    if let Some((reason, action)) = projection_event(outcome) {
        let note = format!("Projected User {} into Secret {}", user.name_any(), user.name_any());
        emit_info(recorder, user, reason, action, note).await;
    }
}
