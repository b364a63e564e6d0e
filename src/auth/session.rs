/// Session manager with silent, self-scheduling renewal
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Duration;

use chrono::Utc;

use super::renewal::RenewalSchedule;
use super::store::CredentialStore;
use super::submit::SubmitControl;
use crate::api::AuthApi;
use crate::config::SessionConfig;
use crate::error::ClientError;
use crate::navigation::Navigator;
use crate::types::{StoredCredentials, TokenPair};

/// Lifecycle of the session as seen by the manager
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Anonymous,
    Authenticating,
    Authenticated,
    Renewing,
}

pub struct SessionManager {
    api: Arc<dyn AuthApi>,
    store: Arc<dyn CredentialStore>,
    navigator: Arc<dyn Navigator>,
    renewal: RenewalSchedule,
    login_control: SubmitControl,
    state: Mutex<SessionState>,
    /// Bumped whenever the stored pair is replaced or cleared; a renewal that
    /// started under an older epoch must not touch the session.
    epoch: Mutex<u64>,
    renew_after: Duration,
    login_path: String,
    this: Weak<SessionManager>,
}

impl SessionManager {
    pub fn new(
        api: Arc<dyn AuthApi>,
        store: Arc<dyn CredentialStore>,
        navigator: Arc<dyn Navigator>,
        config: &SessionConfig,
    ) -> Arc<Self> {
        let initial = match store.load() {
            Ok(Some(_)) => SessionState::Authenticated,
            _ => SessionState::Anonymous,
        };

        Arc::new_cyclic(|this| Self {
            api,
            store,
            navigator,
            renewal: RenewalSchedule::new(),
            login_control: SubmitControl::new(),
            state: Mutex::new(initial),
            epoch: Mutex::new(0),
            renew_after: config.renew_after(),
            login_path: config.login_path.clone(),
            this: this.clone(),
        })
    }

    pub fn state(&self) -> SessionState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, next: SessionState) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if *state != next {
            tracing::debug!(from = ?*state, to = ?next, "session state");
            *state = next;
        }
    }

    /// True while the login form should accept a submission.
    pub fn login_enabled(&self) -> bool {
        self.login_control.is_enabled()
    }

    pub fn is_renewal_armed(&self) -> bool {
        self.renewal.is_armed()
    }

    /// Stored record, without any navigation side effect.
    pub fn credentials(&self) -> Option<StoredCredentials> {
        match self.store.load() {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!(err = %e, "failed to read credential store");
                None
            }
        }
    }

    /// Current access token; with no stored session this redirects to login and returns `None`.
    pub fn access_token(&self) -> Option<String> {
        self.tokens().map(|pair| pair.access_token)
    }

    /// Current refresh token; same redirect contract as [`access_token`](Self::access_token).
    pub fn refresh_token(&self) -> Option<String> {
        self.tokens().map(|pair| pair.refresh_token)
    }

    fn tokens(&self) -> Option<TokenPair> {
        match self.credentials() {
            Some(record) => Some(record.tokens),
            None => {
                self.set_state(SessionState::Anonymous);
                self.navigator.navigate(&self.login_path);
                None
            }
        }
    }

    fn current_epoch(&self) -> u64 {
        *self.epoch.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Store a fresh pair as one record and re-arm the single renewal timer.
    pub fn set_tokens(&self, tokens: TokenPair) -> Result<(), ClientError> {
        self.commit(tokens, None).map(|_| ())
    }

    /// Returns false, leaving everything untouched, when `expected` is no longer
    /// the current epoch.
    fn commit(&self, tokens: TokenPair, expected: Option<u64>) -> Result<bool, ClientError> {
        if !tokens.is_complete() {
            return Err(ClientError::malformed(
                "token response",
                "access and refresh token must both be present",
            ));
        }

        let mut epoch = self.epoch.lock().unwrap_or_else(PoisonError::into_inner);
        if expected.is_some_and(|expected| expected != *epoch) {
            return Ok(false);
        }

        self.store.save(&StoredCredentials {
            tokens,
            issued_at: Utc::now().timestamp(),
        })?;
        *epoch += 1;
        self.set_state(SessionState::Authenticated);
        self.arm_renewal();
        Ok(true)
    }

    fn arm_renewal(&self) {
        let session = self.this.clone();
        self.renewal.reschedule(self.renew_after, move |generation| async move {
            let Some(session) = session.upgrade() else {
                return;
            };
            if !session.renewal.fire(generation) {
                return;
            }
            if let Err(e) = session.renew().await {
                tracing::warn!(err = %e, "scheduled renewal failed");
            }
        });
    }

    /// Exchange the refresh token for a new pair. Any failure ends the session.
    ///
    /// If the session is ended or replaced while the exchange is in flight,
    /// its outcome is dropped: nothing is stored, armed or cleared.
    pub async fn renew(&self) -> Result<(), ClientError> {
        let started = self.current_epoch();
        let refresh_token = self.refresh_token().ok_or(ClientError::SessionAbsent)?;
        self.set_state(SessionState::Renewing);

        let result = match self.api.refresh(&refresh_token).await {
            Ok(tokens) => self.commit(tokens, Some(started)),
            Err(e) => Err(e),
        };

        match result {
            Ok(true) => {
                tracing::info!("session renewed");
                Ok(())
            }
            Ok(false) => self.superseded_renewal(),
            Err(e) => {
                let mut epoch = self.epoch.lock().unwrap_or_else(PoisonError::into_inner);
                if *epoch != started {
                    drop(epoch);
                    tracing::debug!(err = %e, "stale renewal failed");
                    return self.superseded_renewal();
                }
                tracing::warn!(err = %e, "renewal rejected, ending session");
                self.close(&mut epoch);
                drop(epoch);
                self.navigator.navigate(&self.login_path);
                Err(e)
            }
        }
    }

    fn superseded_renewal(&self) -> Result<(), ClientError> {
        tracing::debug!("session changed during renewal, discarding outcome");
        match self.state() {
            SessionState::Anonymous => Err(ClientError::SessionAbsent),
            _ => Ok(()),
        }
    }

    /// Submit credentials; on success store the pair and navigate to the dashboard.
    ///
    /// Returns the landing path. Failures leave the store untouched and the
    /// login control enabled again.
    pub async fn login(&self, email: &str, password: &str) -> Result<String, ClientError> {
        let _submitting = self
            .login_control
            .try_begin()
            .ok_or(ClientError::SubmitInProgress)?;

        if email.trim().is_empty() || password.is_empty() {
            return Err(ClientError::EmptyCredential);
        }

        let previous = self.state();
        self.set_state(SessionState::Authenticating);

        let tokens = match self.api.login(email.trim(), password).await {
            Ok(tokens) => tokens,
            Err(e) => {
                tracing::info!(err = %e, "login failed");
                self.set_state(previous);
                return Err(e);
            }
        };

        if let Err(e) = self.set_tokens(tokens) {
            self.set_state(previous);
            return Err(e);
        }
        tracing::info!("logged in");

        self.enter_dashboard().await
    }

    /// Resolve the user's landing path and navigate there.
    pub async fn enter_dashboard(&self) -> Result<String, ClientError> {
        let api = Arc::clone(&self.api);
        let destination = self
            .authorized(|token| async move { api.dashboard(&token).await })
            .await?;
        self.navigator.navigate(&destination);
        Ok(destination)
    }

    /// Pick up a session left in the store by a previous run.
    ///
    /// Renews once so the timer is armed again; returns false, without
    /// navigating, when there is nothing stored.
    pub async fn resume(&self) -> Result<bool, ClientError> {
        if self.credentials().is_none() {
            return Ok(false);
        }
        self.renew().await?;
        Ok(true)
    }

    /// Run an authenticated request with the current access token.
    ///
    /// No token redirects to login; a 401 from the request ends the session.
    pub async fn authorized<T, F, Fut>(&self, request: F) -> Result<T, ClientError>
    where
        F: FnOnce(String) -> Fut,
        Fut: Future<Output = Result<T, ClientError>>,
    {
        let token = self.access_token().ok_or(ClientError::SessionAbsent)?;
        match request(token).await {
            Err(ClientError::AuthorizationExpired) => {
                tracing::warn!("authorization expired, ending session");
                self.end_session();
                Err(ClientError::AuthorizationExpired)
            }
            other => other,
        }
    }

    /// Revoke the tokens server side (best effort) and end the session.
    pub async fn logout(&self) {
        if let Some(record) = self.credentials() {
            let TokenPair {
                access_token,
                refresh_token,
            } = record.tokens;
            if let Err(e) = self.api.logout(&access_token, &refresh_token).await {
                tracing::warn!(err = %e, "server logout failed");
            }
        }
        self.end_session();
    }

    /// Cancel the timer, clear both tokens and send the user to login.
    pub fn end_session(&self) {
        let mut epoch = self.epoch.lock().unwrap_or_else(PoisonError::into_inner);
        self.close(&mut epoch);
        drop(epoch);
        self.navigator.navigate(&self.login_path);
    }

    fn close(&self, epoch: &mut u64) {
        self.renewal.cancel();
        if let Err(e) = self.store.clear() {
            tracing::warn!(err = %e, "failed to clear credential store");
        }
        *epoch += 1;
        self.set_state(SessionState::Anonymous);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::MockAuthApi;
    use crate::auth::store::MemoryStore;
    use crate::navigation::RecordingNavigator;

    const RENEW_AFTER: Duration = Duration::from_secs(13 * 60);

    struct Harness {
        session: Arc<SessionManager>,
        store: Arc<MemoryStore>,
        nav: Arc<RecordingNavigator>,
    }

    fn harness(api: MockAuthApi, store: MemoryStore) -> Harness {
        let store = Arc::new(store);
        let nav = Arc::new(RecordingNavigator::new());
        let session = SessionManager::new(
            Arc::new(api),
            store.clone(),
            nav.clone(),
            &SessionConfig::default(),
        );
        Harness {
            session,
            store,
            nav,
        }
    }

    fn stored(access: &str, refresh: &str) -> StoredCredentials {
        StoredCredentials {
            tokens: TokenPair::new(access, refresh),
            issued_at: 0,
        }
    }

    fn current_tokens(store: &MemoryStore) -> Option<TokenPair> {
        store.load().unwrap().map(|record| record.tokens)
    }

    #[tokio::test]
    async fn test_missing_token_navigates_once_without_network() {
        // No expectations: any API call panics
        let h = harness(MockAuthApi::new(), MemoryStore::new());

        assert_eq!(h.session.access_token(), None);
        assert_eq!(h.nav.visits(), vec!["/login"]);

        assert_eq!(h.session.refresh_token(), None);
        assert_eq!(h.nav.visits(), vec!["/login", "/login"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_repeated_set_tokens_arms_one_renewal() {
        let mut api = MockAuthApi::new();
        api.expect_refresh().times(1).returning(|refresh| {
            assert_eq!(refresh, "r5");
            Ok(TokenPair::new("a6", "r6"))
        });
        let h = harness(api, MemoryStore::new());

        for i in 1..=5 {
            h.session
                .set_tokens(TokenPair::new(format!("a{i}"), format!("r{i}")))
                .unwrap();
            assert!(h.session.is_renewal_armed());
        }

        tokio::time::sleep(RENEW_AFTER + Duration::from_secs(1)).await;

        assert_eq!(current_tokens(&h.store), Some(TokenPair::new("a6", "r6")));
        assert!(h.session.is_renewal_armed());
        assert_eq!(h.session.state(), SessionState::Authenticated);
        assert!(h.nav.visits().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_renewal_cycle_repeats() {
        let mut api = MockAuthApi::new();
        let mut seq = mockall::Sequence::new();
        api.expect_refresh()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(TokenPair::new("a2", "r2")));
        api.expect_refresh()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|refresh| {
                assert_eq!(refresh, "r2");
                Ok(TokenPair::new("a3", "r3"))
            });
        let h = harness(api, MemoryStore::new());

        h.session.set_tokens(TokenPair::new("a1", "r1")).unwrap();
        tokio::time::sleep(RENEW_AFTER * 2 + Duration::from_secs(1)).await;

        assert_eq!(current_tokens(&h.store), Some(TokenPair::new("a3", "r3")));
        assert!(h.session.is_renewal_armed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_renewal_ends_session() {
        let mut api = MockAuthApi::new();
        api.expect_refresh().times(1).returning(|_| {
            Err(ClientError::Transient {
                status: 400,
                message: "Refresh token revoked".into(),
            })
        });
        let h = harness(api, MemoryStore::new());

        h.session.set_tokens(TokenPair::new("a1", "r1")).unwrap();
        tokio::time::sleep(RENEW_AFTER + Duration::from_secs(1)).await;

        assert_eq!(current_tokens(&h.store), None);
        assert!(!h.session.is_renewal_armed());
        assert_eq!(h.session.state(), SessionState::Anonymous);
        assert_eq!(h.nav.visits(), vec!["/login"]);

        // No retry afterwards
        tokio::time::sleep(RENEW_AFTER * 3).await;
        assert_eq!(h.nav.visits(), vec!["/login"]);
    }

    /// Refresh answers only after a network delay
    struct SlowRefresh {
        outcome: Result<TokenPair, u16>,
    }

    #[async_trait::async_trait]
    impl AuthApi for SlowRefresh {
        async fn login(&self, _: &str, _: &str) -> Result<TokenPair, ClientError> {
            unimplemented!("login is not exercised")
        }

        async fn refresh(&self, _: &str) -> Result<TokenPair, ClientError> {
            tokio::time::sleep(Duration::from_secs(1)).await;
            self.outcome.clone().map_err(|status| ClientError::Transient {
                status,
                message: "Refresh token revoked".into(),
            })
        }

        async fn logout(&self, _: &str, _: &str) -> Result<(), ClientError> {
            Ok(())
        }

        async fn dashboard(&self, _: &str) -> Result<String, ClientError> {
            unimplemented!("dashboard is not exercised")
        }
    }

    fn slow_harness(outcome: Result<TokenPair, u16>) -> Harness {
        let store = Arc::new(MemoryStore::with(stored("a1", "r1")));
        let nav = Arc::new(RecordingNavigator::new());
        let session = SessionManager::new(
            Arc::new(SlowRefresh { outcome }),
            store.clone(),
            nav.clone(),
            &SessionConfig::default(),
        );
        Harness {
            session,
            store,
            nav,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_logout_during_renewal_stays_logged_out() {
        let h = slow_harness(Ok(TokenPair::new("a2", "r2")));

        let session = h.session.clone();
        let renewal = tokio::spawn(async move { session.renew().await });
        tokio::time::sleep(Duration::from_millis(100)).await;
        h.session.logout().await;

        let result = renewal.await.unwrap();

        assert!(matches!(result, Err(ClientError::SessionAbsent)));
        assert_eq!(current_tokens(&h.store), None);
        assert!(!h.session.is_renewal_armed());
        assert_eq!(h.session.state(), SessionState::Anonymous);
        assert_eq!(h.nav.visits(), vec!["/login"]);

        tokio::time::sleep(RENEW_AFTER * 2).await;
        assert_eq!(current_tokens(&h.store), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_renewal_keeps_newer_pair() {
        let h = slow_harness(Ok(TokenPair::new("a2", "r2")));

        let session = h.session.clone();
        let renewal = tokio::spawn(async move { session.renew().await });
        tokio::time::sleep(Duration::from_millis(100)).await;
        h.session.set_tokens(TokenPair::new("a9", "r9")).unwrap();

        renewal.await.unwrap().unwrap();

        assert_eq!(current_tokens(&h.store), Some(TokenPair::new("a9", "r9")));
        assert!(h.session.is_renewal_armed());
        assert_eq!(h.session.state(), SessionState::Authenticated);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_renewal_failure_keeps_newer_pair() {
        let h = slow_harness(Err(400));

        let session = h.session.clone();
        let renewal = tokio::spawn(async move { session.renew().await });
        tokio::time::sleep(Duration::from_millis(100)).await;
        h.session.set_tokens(TokenPair::new("a9", "r9")).unwrap();

        renewal.await.unwrap().unwrap();

        assert_eq!(current_tokens(&h.store), Some(TokenPair::new("a9", "r9")));
        assert!(h.session.is_renewal_armed());
        assert!(h.nav.visits().is_empty());
    }

    #[tokio::test]
    async fn test_incomplete_pair_is_never_stored() {
        let h = harness(MockAuthApi::new(), MemoryStore::with(stored("a1", "r1")));

        let result = h.session.set_tokens(TokenPair::new("a2", ""));
        assert!(matches!(result, Err(ClientError::MalformedResponse { .. })));
        assert_eq!(current_tokens(&h.store), Some(TokenPair::new("a1", "r1")));
        assert!(!h.session.is_renewal_armed());
    }

    #[tokio::test]
    async fn test_login_success_stores_pair_and_enters_dashboard() {
        let mut api = MockAuthApi::new();
        api.expect_login().times(1).returning(|email, password| {
            assert_eq!(email, "traveler@example.com");
            assert_eq!(password, "hunter2");
            Ok(TokenPair::new("a1", "r1"))
        });
        api.expect_dashboard().times(1).returning(|token| {
            assert_eq!(token, "a1");
            Ok("/traveler/dashboard".to_string())
        });
        let h = harness(api, MemoryStore::new());

        let landing = h
            .session
            .login(" traveler@example.com ", "hunter2")
            .await
            .unwrap();

        assert_eq!(landing, "/traveler/dashboard");
        assert_eq!(current_tokens(&h.store), Some(TokenPair::new("a1", "r1")));
        assert!(h.session.is_renewal_armed());
        assert!(h.session.login_enabled());
        assert_eq!(h.nav.visits(), vec!["/traveler/dashboard"]);
    }

    #[tokio::test]
    async fn test_login_rejected_keeps_form_usable() {
        let mut api = MockAuthApi::new();
        api.expect_login()
            .times(1)
            .returning(|_, _| Err(ClientError::CredentialsInvalid));
        let h = harness(api, MemoryStore::new());

        let err = h.session.login("traveler@example.com", "wrong").await.unwrap_err();

        assert!(matches!(err, ClientError::CredentialsInvalid));
        assert_eq!(current_tokens(&h.store), None);
        assert!(h.session.login_enabled());
        assert!(!h.session.is_renewal_armed());
        assert_eq!(h.session.state(), SessionState::Anonymous);
        assert!(h.nav.visits().is_empty());
    }

    #[tokio::test]
    async fn test_blank_credentials_skip_network() {
        let h = harness(MockAuthApi::new(), MemoryStore::new());
        let err = h.session.login("", "secret").await.unwrap_err();
        assert!(matches!(err, ClientError::EmptyCredential));
        assert!(h.session.login_enabled());
    }

    #[tokio::test]
    async fn test_unauthorized_call_ends_session() {
        let h = harness(MockAuthApi::new(), MemoryStore::with(stored("a1", "r1")));

        let result: Result<(), _> = h
            .session
            .authorized(|token| async move {
                assert_eq!(token, "a1");
                Err(ClientError::AuthorizationExpired)
            })
            .await;

        assert!(matches!(result, Err(ClientError::AuthorizationExpired)));
        assert_eq!(current_tokens(&h.store), None);
        assert_eq!(h.nav.visits(), vec!["/login"]);
    }

    #[tokio::test]
    async fn test_transient_error_keeps_session() {
        let h = harness(MockAuthApi::new(), MemoryStore::with(stored("a1", "r1")));

        let result: Result<(), _> = h
            .session
            .authorized(|_| async {
                Err(ClientError::Transient {
                    status: 500,
                    message: "There was an internal error".into(),
                })
            })
            .await;

        assert!(matches!(result, Err(ClientError::Transient { status: 500, .. })));
        assert_eq!(current_tokens(&h.store), Some(TokenPair::new("a1", "r1")));
        assert!(h.nav.visits().is_empty());
    }

    #[tokio::test]
    async fn test_resume_without_session_does_not_navigate() {
        let h = harness(MockAuthApi::new(), MemoryStore::new());
        assert!(!h.session.resume().await.unwrap());
        assert!(h.nav.visits().is_empty());
    }

    #[tokio::test]
    async fn test_resume_renews_and_arms_timer() {
        let mut api = MockAuthApi::new();
        api.expect_refresh()
            .times(1)
            .returning(|_| Ok(TokenPair::new("a2", "r2")));
        let h = harness(api, MemoryStore::with(stored("a1", "r1")));
        assert_eq!(h.session.state(), SessionState::Authenticated);

        assert!(h.session.resume().await.unwrap());
        assert_eq!(current_tokens(&h.store), Some(TokenPair::new("a2", "r2")));
        assert!(h.session.is_renewal_armed());
    }

    #[tokio::test]
    async fn test_logout_clears_even_when_server_fails() {
        let mut api = MockAuthApi::new();
        api.expect_logout().times(1).returning(|access, refresh| {
            assert_eq!((access, refresh), ("a1", "r1"));
            Err(ClientError::Transient {
                status: 500,
                message: String::new(),
            })
        });
        let h = harness(api, MemoryStore::new());
        h.session.set_tokens(TokenPair::new("a1", "r1")).unwrap();

        h.session.logout().await;

        assert_eq!(current_tokens(&h.store), None);
        assert!(!h.session.is_renewal_armed());
        assert_eq!(h.nav.visits(), vec!["/login"]);
        assert_eq!(h.session.access_token(), None);
    }
}
