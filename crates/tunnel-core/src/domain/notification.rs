//! Notification messages pushed to the relay.

/// A one-way notification.
///
/// `target_user_id` is only meaningful for per-user notifications; log-only
/// and broadcast notifications ignore it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationMessage {
    pub target_user_id: Option<String>,
    pub text: String,
    pub icon: String,
    pub severity: String,
}

impl NotificationMessage {
    pub fn new(text: impl Into<String>, icon: impl Into<String>, severity: impl Into<String>) -> Self {
        Self {
            target_user_id: None,
            text: text.into(),
            icon: icon.into(),
            severity: severity.into(),
        }
    }

    /// Addresses the notification to one user.
    pub fn for_user(mut self, user_id: impl Into<String>) -> Self {
        self.target_user_id = Some(user_id.into());
        self
    }
}
