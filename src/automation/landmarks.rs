//! Page landmarks and timings of the upstream storefront.
//!
//! Everything that couples the client to the storefront's markup lives here,
//! so a layout change on the upstream site is a configuration change.

use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub struct StorefrontLandmarks {
    pub password_input: String,
    pub username_input: String,
    /// Controls that switch to the id/password layout, tried in order.
    pub login_layout_toggles: Vec<String>,
    /// Submit controls, the first present one is used.
    pub login_submits: Vec<String>,
    pub login_error: String,
    /// URL fragment present once authenticated.
    pub authenticated_url_fragment: String,
    pub dismiss_overlay_script: String,
    /// Item element selector; `{ref}` is replaced by the external ref.
    pub item_template: String,
    /// Stock label selector inside an item; `{ref}` is replaced likewise.
    pub stock_template: String,
    pub destination_input: String,
    pub validate_buyer_script: String,
    pub buyer_confirmation: String,
    pub confirm_control: String,
    pub result_banner: String,
    pub result_banner_text: String,
    /// Banner substrings that mean "ok" during buyer validation.
    pub success_markers: Vec<String>,
    /// Banner substrings that reject a confirmed transaction.
    pub rejection_phrases: Vec<String>,
}

impl Default for StorefrontLandmarks {
    fn default() -> Self {
        Self {
            password_input: "input[type='password']".to_string(),
            username_input: "input[type='text']".to_string(),
            login_layout_toggles: vec![
                "span[name='index-html-id-login']".to_string(),
                ".login-text".to_string(),
            ],
            login_submits: vec!["#pwdLoginButton".to_string(), ".btnLogin".to_string()],
            login_error: ".alert-danger".to_string(),
            authenticated_url_fragment: "/trade/index".to_string(),
            dismiss_overlay_script: "try { hideInvitation(); } catch(e) {} \
                 try { Common.close(); } catch(e) {}"
                .to_string(),
            item_template: "#itemId_{ref}".to_string(),
            stock_template: "#itemId_{ref} .itemPriceLabel".to_string(),
            destination_input: "#buyerId".to_string(),
            validate_buyer_script: "try { Index.queryBuyer(); } catch(e) {}".to_string(),
            buyer_confirmation: "#queryBuyerName".to_string(),
            confirm_control: "a[onclick*='Index.sellItem']".to_string(),
            result_banner: "#publicTip".to_string(),
            result_banner_text: "#publicTxt".to_string(),
            success_markers: vec!["berhasil".to_string(), "success".to_string()],
            rejection_phrases: vec![
                "saldo tidak cukup".to_string(),
                "insufficient balance".to_string(),
                "gagal".to_string(),
                "failed".to_string(),
                "error".to_string(),
            ],
        }
    }
}

impl StorefrontLandmarks {
    pub fn item(&self, external_ref: &str) -> String {
        self.item_template.replace("{ref}", external_ref)
    }

    pub fn stock(&self, external_ref: &str) -> String {
        self.stock_template.replace("{ref}", external_ref)
    }

    /// Whether a validation banner is benign: empty, the literal `null`, or a success marker.
    pub fn is_benign_banner(&self, text: &str) -> bool {
        let text = text.trim();
        if text.is_empty() || text.eq_ignore_ascii_case("null") {
            return true;
        }
        let lowered = text.to_lowercase();
        self.success_markers
            .iter()
            .any(|marker| lowered.contains(&marker.to_lowercase()))
    }

    pub fn is_rejection(&self, text: &str) -> bool {
        let lowered = text.trim().to_lowercase();
        self.rejection_phrases
            .iter()
            .any(|phrase| lowered.contains(&phrase.to_lowercase()))
    }
}

/// Step timings of the purchase state machine.
#[derive(Debug, Clone, PartialEq)]
pub struct AutomationTimings {
    pub login_timeout: Duration,
    pub login_poll_interval: Duration,
    /// Pause after dismissing overlays and after selecting an item.
    pub settle_delay: Duration,
    pub validation_interval: Duration,
    pub validation_attempts: u32,
    pub confirm_attempts: u32,
    pub confirm_poll_interval: Duration,
    pub confirm_polls: u32,
    /// Pause after a settled unit before the next one.
    pub unit_cooldown: Duration,
    /// Wall-clock budget for one whole `place_order` call.
    pub order_budget: Duration,
}

impl Default for AutomationTimings {
    fn default() -> Self {
        Self {
            login_timeout: Duration::from_secs(15),
            login_poll_interval: Duration::from_millis(250),
            settle_delay: Duration::from_millis(300),
            validation_interval: Duration::from_millis(200),
            validation_attempts: 15,
            confirm_attempts: 3,
            confirm_poll_interval: Duration::from_millis(300),
            confirm_polls: 10,
            unit_cooldown: Duration::from_millis(800),
            order_budget: Duration::from_secs(600),
        }
    }
}

impl AutomationTimings {
    pub fn with_order_budget(mut self, budget: Duration) -> Self {
        self.order_budget = budget;
        self
    }

    pub fn login_attempts(&self) -> u32 {
        let interval = self.login_poll_interval.as_millis().max(1);
        (self.login_timeout.as_millis() / interval).max(1) as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_item_selectors() {
        let landmarks = StorefrontLandmarks::default();
        assert_eq!(landmarks.item("BASE-60"), "#itemId_BASE-60");
        assert_eq!(landmarks.stock("BASE-60"), "#itemId_BASE-60 .itemPriceLabel");
    }

    #[test]
    fn test_benign_banner_classification() {
        let landmarks = StorefrontLandmarks::default();
        assert!(landmarks.is_benign_banner(""));
        assert!(landmarks.is_benign_banner("null"));
        assert!(landmarks.is_benign_banner("Berhasil cek user"));
        assert!(!landmarks.is_benign_banner("ID tidak ditemukan"));
    }

    #[test]
    fn test_rejection_classification() {
        let landmarks = StorefrontLandmarks::default();
        assert!(landmarks.is_rejection("insufficient balance"));
        assert!(landmarks.is_rejection("Saldo tidak cukup"));
        assert!(landmarks.is_rejection("Error"));
        assert!(!landmarks.is_rejection("Transaksi diproses"));
    }

    #[test]
    fn test_login_attempts_from_timeout() {
        let timings = AutomationTimings::default();
        assert_eq!(timings.login_attempts(), 60);
    }
}
