use super::landmarks::StorefrontLandmarks;
use crate::config::StorefrontConfig;
use crate::domain::order::PurchaseLine;
use crate::domain::ports::{BrowserDriverRef, BrowserSession, SessionCacheRef, Storefront};
use crate::domain::session::Cookie;
use crate::error::{FulfillmentError, PlacementError, Result};
use crate::poll::{Clock, Poller, RetryPolicy, StopReason};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Phases of one `place_order` call. The purchase phases repeat per unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    SessionEstablishing,
    Authenticated,
    ItemSelecting,
    BuyerValidating,
    ConfirmPending,
    Settled,
    Closed,
}

impl SessionState {
    pub fn can_advance_to(self, next: SessionState) -> bool {
        use SessionState::*;
        match (self, next) {
            (_, Closed) => self != Closed,
            (Disconnected, SessionEstablishing) => true,
            (SessionEstablishing, Authenticated) => true,
            (Authenticated | Settled, ItemSelecting) => true,
            (ItemSelecting, BuyerValidating) => true,
            (BuyerValidating, ConfirmPending) => true,
            (ConfirmPending, Settled) => true,
            _ => false,
        }
    }
}

/// Which login form the entry page shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginLayout {
    /// Password field visible on arrival.
    Direct,
    /// Id/password form hidden behind a toggle.
    Toggled,
}

struct RunState {
    state: SessionState,
    deadline: Instant,
}

impl RunState {
    fn new(deadline: Instant) -> Self {
        Self {
            state: SessionState::Disconnected,
            deadline,
        }
    }

    fn advance(&mut self, next: SessionState) {
        if !self.state.can_advance_to(next) {
            warn!(from = ?self.state, to = ?next, "unexpected storefront state change");
        }
        debug!(from = ?self.state, to = ?next, "storefront state");
        self.state = next;
    }
}

/// Owns an open browser session and closes it on every exit path.
///
/// `release` closes it in-line; if the guard is dropped instead (panic, or the
/// enclosing future being cancelled) the close is spawned onto the runtime.
struct SessionGuard {
    session: Option<Box<dyn BrowserSession>>,
}

impl SessionGuard {
    fn new(session: Box<dyn BrowserSession>) -> Self {
        Self {
            session: Some(session),
        }
    }

    fn session_mut(&mut self) -> Result<&mut dyn BrowserSession> {
        match self.session.as_mut() {
            Some(session) => Ok(session.as_mut()),
            None => Err(FulfillmentError::Browser(
                "browser session already released".to_string(),
            )),
        }
    }

    async fn release(mut self) {
        if let Some(mut session) = self.session.take()
            && let Err(e) = session.close().await
        {
            warn!(error = %e, "failed to close browser session");
        }
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        if let Some(mut session) = self.session.take()
            && let Ok(handle) = tokio::runtime::Handle::try_current()
        {
            handle.spawn(async move {
                if let Err(e) = session.close().await {
                    warn!(error = %e, "failed to close abandoned browser session");
                }
            });
        }
    }
}

/// Drives the upstream storefront through a [`BrowserDriver`](crate::domain::ports::BrowserDriver)
/// to buy fulfillment lines unit by unit.
pub struct StorefrontClient {
    driver: BrowserDriverRef,
    cache: SessionCacheRef,
    clock: Arc<dyn Clock>,
    config: StorefrontConfig,
}

impl StorefrontClient {
    pub fn new(
        driver: BrowserDriverRef,
        cache: SessionCacheRef,
        clock: Arc<dyn Clock>,
        config: StorefrontConfig,
    ) -> Self {
        Self {
            driver,
            cache,
            clock,
            config,
        }
    }

    fn landmarks(&self) -> &StorefrontLandmarks {
        &self.config.landmarks
    }

    fn exhausted(poller: &Poller<'_>, otherwise: FulfillmentError) -> FulfillmentError {
        match poller.stop_reason() {
            Some(StopReason::DeadlineReached) => FulfillmentError::DeadlineExceeded,
            _ => otherwise,
        }
    }

    async fn dismiss_overlay(&self, session: &mut dyn BrowserSession) {
        if let Err(e) = session
            .evaluate(&self.landmarks().dismiss_overlay_script)
            .await
        {
            debug!(error = %e, "overlay dismiss script failed");
        }
    }

    async fn execute(
        &self,
        session: &mut dyn BrowserSession,
        run: &mut RunState,
        destination: &str,
        lines: &[PurchaseLine],
    ) -> std::result::Result<Vec<String>, PlacementError> {
        if let Err(e) = self.establish(session, run).await {
            return Err(PlacementError::new(Vec::new(), 1, e));
        }

        let total: u32 = lines.iter().map(|l| l.quantity).sum();
        info!(destination, units = total, "starting purchase loop");

        let mut completed = Vec::new();
        let mut unit = 0usize;
        for line in lines {
            for _ in 0..line.quantity {
                unit += 1;
                if self.clock.now() >= run.deadline {
                    return Err(PlacementError::new(
                        completed,
                        unit,
                        FulfillmentError::DeadlineExceeded,
                    ));
                }
                if unit == 1 || unit % 5 == 0 {
                    info!(unit, total, item = %line.external_ref, "purchasing unit");
                }
                match self
                    .purchase_unit(session, run, &line.external_ref, destination, unit)
                    .await
                {
                    Ok(trx) => completed.push(trx),
                    Err(e) => {
                        warn!(unit, item = %line.external_ref, error = %e, "unit failed");
                        return Err(PlacementError::new(completed, unit, e));
                    }
                }
            }
        }

        info!(units = completed.len(), "purchase loop finished");
        Ok(completed)
    }

    async fn establish(&self, session: &mut dyn BrowserSession, run: &mut RunState) -> Result<()> {
        run.advance(SessionState::SessionEstablishing);
        if self.restore_session(session).await? {
            info!("storefront session restored from cache");
        } else {
            self.login(session, run.deadline).await?;
            self.store_session(session).await;
        }
        run.advance(SessionState::Authenticated);
        Ok(())
    }

    async fn restore_session(&self, session: &mut dyn BrowserSession) -> Result<bool> {
        let blob = match self.cache.get(&self.config.cookie_cache_key).await {
            Ok(Some(blob)) => blob,
            Ok(None) => return Ok(false),
            Err(e) => {
                warn!(error = %e, "session cache unavailable");
                return Ok(false);
            }
        };
        let cookies: Vec<Cookie> = match serde_json::from_str(&blob) {
            Ok(cookies) => cookies,
            Err(e) => {
                warn!(error = %e, "discarding unreadable cached session");
                return Ok(false);
            }
        };

        session.navigate(&self.config.entry_url).await?;
        session.set_cookies(&cookies).await?;
        session.navigate(&self.config.entry_url).await?;
        let url = session.current_url().await?;
        Ok(url.contains(&self.landmarks().authenticated_url_fragment))
    }

    async fn detect_layout(&self, session: &mut dyn BrowserSession) -> Result<LoginLayout> {
        if session.is_visible(&self.landmarks().password_input).await? {
            Ok(LoginLayout::Direct)
        } else {
            Ok(LoginLayout::Toggled)
        }
    }

    async fn login(&self, session: &mut dyn BrowserSession, deadline: Instant) -> Result<()> {
        let landmarks = self.landmarks();
        let timings = &self.config.timings;

        session.navigate(&self.config.entry_url).await?;

        let layout = self.detect_layout(session).await?;
        debug!(?layout, "login layout");
        if layout == LoginLayout::Toggled {
            for toggle in &landmarks.login_layout_toggles {
                if session.count(toggle).await? == 0 {
                    continue;
                }
                session.click(toggle, true).await?;
                if session.is_visible(&landmarks.password_input).await? {
                    break;
                }
            }
        }

        session
            .fill(&landmarks.username_input, &self.config.username)
            .await?;
        session
            .fill(&landmarks.password_input, &self.config.password)
            .await?;

        let mut submitted = false;
        for submit in &landmarks.login_submits {
            if session.count(submit).await? > 0 {
                session.click(submit, true).await?;
                submitted = true;
                break;
            }
        }
        if !submitted {
            return Err(FulfillmentError::Browser(
                "no login submit control on page".to_string(),
            ));
        }

        let policy = RetryPolicy::fixed(timings.login_poll_interval, timings.login_attempts())
            .with_deadline(Some(deadline));
        let mut poller = Poller::new(self.clock.as_ref(), policy);
        let mut authenticated = false;
        while poller.next().await.is_some() {
            let url = session.current_url().await?;
            if url.contains(&landmarks.authenticated_url_fragment) {
                authenticated = true;
                break;
            }
            if session.is_visible(&landmarks.login_error).await? {
                let message = session
                    .text(&landmarks.login_error)
                    .await?
                    .unwrap_or_default();
                return Err(FulfillmentError::LoginRejected(message.trim().to_string()));
            }
        }
        if !authenticated {
            return Err(Self::exhausted(&poller, FulfillmentError::LoginTimeout));
        }

        info!("storefront login succeeded");
        self.dismiss_overlay(session).await;
        Ok(())
    }

    /// Best-effort: a cache failure never fails the login.
    async fn store_session(&self, session: &mut dyn BrowserSession) {
        let cookies = match session.cookies().await {
            Ok(cookies) => cookies,
            Err(e) => {
                warn!(error = %e, "could not read session cookies");
                return;
            }
        };
        let blob = match serde_json::to_string(&cookies) {
            Ok(blob) => blob,
            Err(e) => {
                warn!(error = %e, "could not serialize session cookies");
                return;
            }
        };
        if let Err(e) = self
            .cache
            .set(&self.config.cookie_cache_key, blob, self.config.cookie_ttl)
            .await
        {
            warn!(error = %e, "failed to cache session cookies");
        }
    }

    async fn purchase_unit(
        &self,
        session: &mut dyn BrowserSession,
        run: &mut RunState,
        external_ref: &str,
        destination: &str,
        unit: usize,
    ) -> Result<String> {
        let landmarks = self.landmarks();
        let timings = &self.config.timings;

        run.advance(SessionState::ItemSelecting);
        self.dismiss_overlay(session).await;
        self.clock.sleep(timings.settle_delay).await;

        let item = landmarks.item(external_ref);
        if session.count(&item).await? == 0 {
            return Err(FulfillmentError::ItemNotFound(external_ref.to_string()));
        }
        if let Some(stock) = session.text(&landmarks.stock(external_ref)).await?
            && stock.trim() == "0"
        {
            return Err(FulfillmentError::StockExhausted(external_ref.to_string()));
        }
        session.click(&item, true).await?;
        self.clock.sleep(timings.settle_delay).await;

        let current = session.input_value(&landmarks.destination_input).await?;
        if current != destination {
            session.click(&landmarks.destination_input, true).await?;
            session
                .fill(&landmarks.destination_input, destination)
                .await?;
        }

        run.advance(SessionState::BuyerValidating);
        session.evaluate(&landmarks.validate_buyer_script).await?;
        self.await_buyer_confirmation(session, run.deadline).await?;

        run.advance(SessionState::ConfirmPending);
        let banner = self.confirm(session, run.deadline).await?;

        run.advance(SessionState::Settled);
        // The storefront shows no receipt number; the identifier is synthesized.
        let trx = format!("TRX-{}-{}", self.clock.wall_time().timestamp(), unit);
        debug!(unit, trx = %trx, banner = %banner, "unit settled");
        self.clock.sleep(timings.unit_cooldown).await;
        Ok(trx)
    }

    async fn await_buyer_confirmation(
        &self,
        session: &mut dyn BrowserSession,
        deadline: Instant,
    ) -> Result<()> {
        let landmarks = self.landmarks();
        let timings = &self.config.timings;
        let policy = RetryPolicy::fixed(timings.validation_interval, timings.validation_attempts)
            .with_deadline(Some(deadline));
        let mut poller = Poller::new(self.clock.as_ref(), policy);

        while poller.next().await.is_some() {
            if session.is_visible(&landmarks.buyer_confirmation).await?
                && let Some(name) = session.text(&landmarks.buyer_confirmation).await?
                && !name.trim().is_empty()
            {
                debug!(buyer = name.trim(), "buyer confirmed");
                return Ok(());
            }
            if session.is_visible(&landmarks.result_banner).await? {
                let text = session
                    .text(&landmarks.result_banner_text)
                    .await?
                    .unwrap_or_default();
                if !landmarks.is_benign_banner(&text) {
                    self.dismiss_overlay(session).await;
                    return Err(FulfillmentError::BuyerValidationFailed(
                        text.trim().to_string(),
                    ));
                }
            }
        }
        Err(Self::exhausted(
            &poller,
            FulfillmentError::BuyerValidationTimeout,
        ))
    }

    /// Clicks confirm (up to `confirm_attempts` times) and returns the result banner text.
    async fn confirm(&self, session: &mut dyn BrowserSession, deadline: Instant) -> Result<String> {
        let landmarks = self.landmarks();
        let timings = &self.config.timings;
        let attempts_policy =
            RetryPolicy::fixed(Duration::ZERO, timings.confirm_attempts).with_deadline(Some(deadline));
        let mut attempts = Poller::new(self.clock.as_ref(), attempts_policy);

        while let Some(attempt) = attempts.next().await {
            if session.is_visible(&landmarks.confirm_control).await? {
                session.click(&landmarks.confirm_control, true).await?;
            } else {
                debug!(attempt, "confirm control not visible");
            }

            let poll_policy =
                RetryPolicy::fixed(timings.confirm_poll_interval, timings.confirm_polls)
                    .with_deadline(Some(deadline));
            let mut polls = Poller::new(self.clock.as_ref(), poll_policy);
            while polls.next().await.is_some() {
                if !session.is_visible(&landmarks.result_banner).await? {
                    continue;
                }
                let text = session
                    .text(&landmarks.result_banner_text)
                    .await?
                    .unwrap_or_default()
                    .trim()
                    .to_string();
                if landmarks.is_rejection(&text) {
                    self.dismiss_overlay(session).await;
                    return Err(FulfillmentError::TransactionRejected(text));
                }
                return Ok(text);
            }
            if polls.stop_reason() == Some(StopReason::DeadlineReached) {
                return Err(FulfillmentError::DeadlineExceeded);
            }
            warn!(attempt, "no result banner after confirm");
        }
        Err(Self::exhausted(&attempts, FulfillmentError::NoServerResponse))
    }
}

#[async_trait]
impl Storefront for StorefrontClient {
    async fn place_order(
        &self,
        destination: &str,
        lines: &[PurchaseLine],
    ) -> std::result::Result<Vec<String>, PlacementError> {
        if lines.iter().all(|l| l.quantity == 0) {
            return Ok(Vec::new());
        }

        let deadline = self.clock.now() + self.config.timings.order_budget;
        let mut run = RunState::new(deadline);

        let session = self
            .driver
            .open()
            .await
            .map_err(|e| PlacementError::new(Vec::new(), 1, e))?;
        let mut guard = SessionGuard::new(session);

        let outcome = match guard.session_mut() {
            Ok(session) => self.execute(session, &mut run, destination, lines).await,
            Err(e) => Err(PlacementError::new(Vec::new(), 1, e)),
        };

        guard.release().await;
        run.advance(SessionState::Closed);
        outcome
    }
}
