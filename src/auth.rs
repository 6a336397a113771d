//! Authentication collaborator.

use async_trait::async_trait;
use tokio::sync::watch;
use tracing::info;

use crate::types::User;

/// Live view of the signed-in user. Dropping it unsubscribes.
pub struct AuthSubscription {
    receiver: watch::Receiver<Option<User>>,
}

impl AuthSubscription {
    pub fn new(receiver: watch::Receiver<Option<User>>) -> Self {
        Self { receiver }
    }

    pub fn current(&self) -> Option<User> {
        self.receiver.borrow().clone()
    }

    /// Wait for the next change. `None` once the provider has gone away.
    pub async fn changed(&mut self) -> Option<Option<User>> {
        self.receiver.changed().await.ok()?;
        Some(self.receiver.borrow_and_update().clone())
    }
}

#[async_trait]
pub trait AuthProvider: Send + Sync {
    fn subscribe(&self) -> AuthSubscription;

    fn current_user(&self) -> Option<User>;

    async fn logout(&self);
}

/// Single-profile auth for local use: signed in as a fixed user until
/// logged out.
pub struct LocalAuth {
    state: watch::Sender<Option<User>>,
}

impl LocalAuth {
    pub fn signed_in(user: User) -> Self {
        let (state, _) = watch::channel(Some(user));
        Self { state }
    }

    pub fn signed_out() -> Self {
        let (state, _) = watch::channel(None);
        Self { state }
    }

    pub fn login(&self, user: User) {
        info!(user_id = %user.id, "Signed in");
        self.state.send_replace(Some(user));
    }
}

#[async_trait]
impl AuthProvider for LocalAuth {
    fn subscribe(&self) -> AuthSubscription {
        AuthSubscription::new(self.state.subscribe())
    }

    fn current_user(&self) -> Option<User> {
        self.state.borrow().clone()
    }

    async fn logout(&self) {
        info!("Signed out");
        self.state.send_replace(None);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscription_sees_logout() {
        let auth = LocalAuth::signed_in(User::new("u1"));
        let mut subscription = auth.subscribe();
        assert_eq!(subscription.current().map(|u| u.id), Some("u1".to_string()));

        auth.logout().await;

        assert_eq!(subscription.changed().await, Some(None));
        assert!(auth.current_user().is_none());
    }

    #[tokio::test]
    async fn subscription_ends_when_provider_drops() {
        let auth = LocalAuth::signed_out();
        let mut subscription = auth.subscribe();
        drop(auth);

        assert_eq!(subscription.changed().await, None);
    }
}
