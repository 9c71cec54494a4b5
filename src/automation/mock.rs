//! Scripted in-process storefront.
//!
//! Implements [`BrowserDriver`] over a tiny model of the storefront page keyed
//! by the default [`StorefrontLandmarks`], so the client, the worker and the
//! integration tests can run the full purchase state machine without a browser.

use super::landmarks::StorefrontLandmarks;
use crate::domain::ports::{BrowserDriver, BrowserSession};
use crate::domain::session::Cookie;
use crate::error::Result;
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

const SESSION_COOKIE: &str = "storefront_session";
const SESSION_TOKEN: &str = "mock-session-token";

/// How the page reacts to buyer validation.
#[derive(Debug, Clone, PartialEq)]
pub enum BuyerCheck {
    /// The confirmation dialog shows this buyer name.
    Confirm(String),
    /// An error banner with this text.
    Banner(String),
    /// A banner first, then the confirmation dialog on the next poll.
    BannerThenConfirm(String, String),
    /// Nothing ever appears.
    Silent,
}

/// How the page reacts to the confirm click of one unit.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfirmOutcome {
    /// Settles and shows this banner text.
    Settle(String),
    /// Shows this banner text without settling.
    Banner(String),
    /// Never responds.
    Silent,
    /// Ignores the first `n` clicks of the unit, then settles.
    SilentFor(u32),
}

#[derive(Debug)]
struct MockState {
    landmarks: StorefrontLandmarks,
    entry_url: String,
    toggled_layout: bool,
    login_error: Option<String>,
    login_hang: bool,
    buyer_check: BuyerCheck,
    confirm_outcomes: HashMap<usize, ConfirmOutcome>,
    stock: BTreeMap<String, u32>,

    // per session
    url: String,
    authenticated: bool,
    cookie_accepted: bool,
    toggled: bool,
    error_shown: bool,
    banner: Option<String>,
    confirmation: Option<String>,
    confirmation_delay: u32,
    selected: Option<String>,
    destination: String,
    unit_clicks: u32,

    // counters
    sessions_opened: usize,
    sessions_closed: usize,
    logins: usize,
    destination_fills: usize,
    confirm_clicks: usize,
    settled: usize,
    purchases: HashMap<String, usize>,
}

impl MockState {
    fn new() -> Self {
        Self {
            landmarks: StorefrontLandmarks::default(),
            entry_url: "https://storefront.test/".to_string(),
            toggled_layout: false,
            login_error: None,
            login_hang: false,
            buyer_check: BuyerCheck::Confirm("Budi".to_string()),
            confirm_outcomes: HashMap::new(),
            stock: BTreeMap::new(),
            url: String::new(),
            authenticated: false,
            cookie_accepted: false,
            toggled: false,
            error_shown: false,
            banner: None,
            confirmation: None,
            confirmation_delay: 0,
            selected: None,
            destination: String::new(),
            unit_clicks: 0,
            sessions_opened: 0,
            sessions_closed: 0,
            logins: 0,
            destination_fills: 0,
            confirm_clicks: 0,
            settled: 0,
            purchases: HashMap::new(),
        }
    }

    fn reset_session(&mut self) {
        self.url = "about:blank".to_string();
        self.authenticated = false;
        self.cookie_accepted = false;
        self.toggled = false;
        self.error_shown = false;
        self.banner = None;
        self.confirmation = None;
        self.confirmation_delay = 0;
        self.selected = None;
        self.destination.clear();
        self.unit_clicks = 0;
    }

    fn authenticated_url(&self) -> String {
        format!(
            "{}{}",
            self.entry_url.trim_end_matches('/'),
            self.landmarks.authenticated_url_fragment
        )
    }

    fn item_for(&self, selector: &str) -> Option<String> {
        self.stock
            .keys()
            .find(|r| self.landmarks.item(r) == selector)
            .cloned()
    }

    fn stock_for(&self, selector: &str) -> Option<u32> {
        self.stock
            .iter()
            .find(|(r, _)| self.landmarks.stock(r) == selector)
            .map(|(_, stock)| *stock)
    }

    fn password_visible(&self) -> bool {
        !self.toggled_layout || self.toggled
    }

    fn submit_login(&mut self) {
        if self.login_hang {
            return;
        }
        if self.login_error.is_some() {
            self.error_shown = true;
            return;
        }
        self.authenticated = true;
        self.logins += 1;
        self.url = self.authenticated_url();
    }

    fn validate_buyer(&mut self) {
        if self.selected.is_none() || self.destination.is_empty() {
            self.banner = Some("Pilih item dan isi ID".to_string());
            return;
        }
        match self.buyer_check.clone() {
            BuyerCheck::Confirm(name) => self.confirmation = Some(name),
            BuyerCheck::Banner(text) => self.banner = Some(text),
            BuyerCheck::BannerThenConfirm(text, name) => {
                self.banner = Some(text);
                self.confirmation = Some(name);
                self.confirmation_delay = 1;
            }
            BuyerCheck::Silent => {}
        }
    }

    fn confirm(&mut self) {
        self.confirm_clicks += 1;
        self.unit_clicks += 1;
        let unit = self.settled + 1;
        let outcome = self
            .confirm_outcomes
            .get(&unit)
            .cloned()
            .unwrap_or_else(|| ConfirmOutcome::Settle("Transaksi berhasil".to_string()));
        match outcome {
            ConfirmOutcome::Settle(text) => self.settle(text),
            ConfirmOutcome::Banner(text) => self.banner = Some(text),
            ConfirmOutcome::Silent => {}
            ConfirmOutcome::SilentFor(n) => {
                if self.unit_clicks > n {
                    self.settle("Transaksi berhasil".to_string());
                }
            }
        }
    }

    fn settle(&mut self, text: String) {
        if let Some(item) = self.selected.clone() {
            if let Some(stock) = self.stock.get_mut(&item) {
                *stock = stock.saturating_sub(1);
            }
            *self.purchases.entry(item).or_default() += 1;
        }
        self.settled += 1;
        self.banner = Some(text);
        self.confirmation = None;
    }
}

/// Handle to a scripted storefront; clones share the same page state.
#[derive(Debug, Clone)]
pub struct MockStorefront {
    state: Arc<Mutex<MockState>>,
}

impl Default for MockStorefront {
    fn default() -> Self {
        Self::new()
    }
}

impl MockStorefront {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState::new())),
        }
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn with_item(self, external_ref: &str, stock: u32) -> Self {
        self.state().stock.insert(external_ref.to_string(), stock);
        self
    }

    pub fn with_buyer_check(self, check: BuyerCheck) -> Self {
        self.state().buyer_check = check;
        self
    }

    /// Scripts the confirm reaction of the 1-based `unit`.
    pub fn with_confirm_outcome(self, unit: usize, outcome: ConfirmOutcome) -> Self {
        self.state().confirm_outcomes.insert(unit, outcome);
        self
    }

    pub fn with_login_error(self, message: &str) -> Self {
        self.state().login_error = Some(message.to_string());
        self
    }

    pub fn with_login_hang(self) -> Self {
        self.state().login_hang = true;
        self
    }

    pub fn with_toggled_login(self) -> Self {
        self.state().toggled_layout = true;
        self
    }

    pub fn entry_url(&self) -> String {
        self.state().entry_url.clone()
    }

    pub fn sessions_opened(&self) -> usize {
        self.state().sessions_opened
    }

    pub fn sessions_closed(&self) -> usize {
        self.state().sessions_closed
    }

    pub fn logins(&self) -> usize {
        self.state().logins
    }

    pub fn destination_fills(&self) -> usize {
        self.state().destination_fills
    }

    pub fn confirm_clicks(&self) -> usize {
        self.state().confirm_clicks
    }

    pub fn settled_units(&self) -> usize {
        self.state().settled
    }

    pub fn purchases_of(&self, external_ref: &str) -> usize {
        self.state()
            .purchases
            .get(external_ref)
            .copied()
            .unwrap_or_default()
    }
}

#[async_trait]
impl BrowserDriver for MockStorefront {
    async fn open(&self) -> Result<Box<dyn BrowserSession>> {
        {
            let mut state = self.state();
            state.sessions_opened += 1;
            state.reset_session();
        }
        Ok(Box::new(MockSession {
            page: self.clone(),
        }))
    }
}

struct MockSession {
    page: MockStorefront,
}

#[async_trait]
impl BrowserSession for MockSession {
    async fn navigate(&mut self, url: &str) -> Result<()> {
        let mut state = self.page.state();
        state.url = url.to_string();
        if url == state.entry_url && (state.authenticated || state.cookie_accepted) {
            state.authenticated = true;
            state.url = state.authenticated_url();
        }
        Ok(())
    }

    async fn current_url(&mut self) -> Result<String> {
        Ok(self.page.state().url.clone())
    }

    async fn count(&mut self, selector: &str) -> Result<usize> {
        let state = self.page.state();
        let lm = &state.landmarks;
        let present = if state.item_for(selector).is_some() {
            true
        } else if lm.login_layout_toggles.iter().any(|t| t == selector) {
            state.toggled_layout
        } else if lm.login_submits.first().is_some_and(|s| s == selector) {
            true
        } else if selector == lm.login_error {
            state.error_shown
        } else {
            selector == lm.password_input
                || selector == lm.username_input
                || selector == lm.destination_input
        };
        Ok(usize::from(present))
    }

    async fn is_visible(&mut self, selector: &str) -> Result<bool> {
        let mut state = self.page.state();
        let lm = state.landmarks.clone();
        let visible = if selector == lm.password_input {
            state.password_visible()
        } else if selector == lm.login_error {
            state.error_shown
        } else if selector == lm.result_banner {
            state.banner.is_some()
        } else if selector == lm.buyer_confirmation {
            if state.confirmation_delay > 0 {
                state.confirmation_delay -= 1;
                false
            } else {
                state.confirmation.is_some()
            }
        } else if selector == lm.confirm_control {
            state.confirmation.is_some()
        } else if selector == lm.destination_input {
            state.authenticated
        } else {
            state.item_for(selector).is_some()
        };
        Ok(visible)
    }

    async fn fill(&mut self, selector: &str, value: &str) -> Result<()> {
        let mut state = self.page.state();
        if selector == state.landmarks.destination_input {
            state.destination = value.to_string();
            state.destination_fills += 1;
        }
        Ok(())
    }

    async fn input_value(&mut self, selector: &str) -> Result<String> {
        let state = self.page.state();
        if selector == state.landmarks.destination_input {
            Ok(state.destination.clone())
        } else {
            Ok(String::new())
        }
    }

    async fn click(&mut self, selector: &str, _force: bool) -> Result<()> {
        let mut state = self.page.state();
        let lm = state.landmarks.clone();
        if lm.login_layout_toggles.iter().any(|t| t == selector) {
            state.toggled = true;
        } else if lm.login_submits.iter().any(|s| s == selector) {
            state.submit_login();
        } else if selector == lm.confirm_control {
            state.confirm();
        } else if let Some(item) = state.item_for(selector) {
            state.selected = Some(item);
            state.unit_clicks = 0;
        }
        Ok(())
    }

    async fn text(&mut self, selector: &str) -> Result<Option<String>> {
        let state = self.page.state();
        let lm = &state.landmarks;
        let text = if selector == lm.login_error {
            state.error_shown.then(|| state.login_error.clone()).flatten()
        } else if selector == lm.result_banner_text {
            state.banner.clone()
        } else if selector == lm.buyer_confirmation {
            state.confirmation.clone()
        } else {
            state.stock_for(selector).map(|s| s.to_string())
        };
        Ok(text)
    }

    async fn evaluate(&mut self, script: &str) -> Result<serde_json::Value> {
        let mut state = self.page.state();
        if script == state.landmarks.dismiss_overlay_script {
            state.banner = None;
            state.confirmation = None;
        } else if script == state.landmarks.validate_buyer_script {
            state.validate_buyer();
        }
        Ok(serde_json::Value::Null)
    }

    async fn cookies(&mut self) -> Result<Vec<Cookie>> {
        let state = self.page.state();
        if state.authenticated {
            Ok(vec![Cookie::new(SESSION_COOKIE, SESSION_TOKEN)])
        } else {
            Ok(Vec::new())
        }
    }

    async fn set_cookies(&mut self, cookies: &[Cookie]) -> Result<()> {
        let mut state = self.page.state();
        state.cookie_accepted = cookies
            .iter()
            .any(|c| c.name == SESSION_COOKIE && c.value == SESSION_TOKEN);
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.page.state().sessions_closed += 1;
        Ok(())
    }
}
