//! Demo user identity.
//!
//! There is no password check: an identifier is valid when it falls in one
//! of two hard-coded ranges. `E001`–`E025` are company accounts and `1`–`25`
//! are personal accounts.

use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

static COMPANY_ID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^E0(0[1-9]|1[0-9]|2[0-5])$").expect("company id pattern is valid")
});

const PERSONAL_RANGE: std::ops::RangeInclusive<u32> = 1..=25;

/// Kind of account a user logs in with.
///
/// On the wire this is the browser's vocabulary (`"empresa"` / `"personal"`);
/// the financial backend calls the same thing `"company"` / `"personal"`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AccountType {
    #[serde(rename = "empresa", alias = "company")]
    Company,
    #[default]
    #[serde(rename = "personal")]
    Personal,
}

impl AccountType {
    /// Entity type as understood by backend tools.
    pub fn entity_type(self) -> &'static str {
        match self {
            Self::Company => "company",
            Self::Personal => "personal",
        }
    }

    /// Browser-facing label.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Company => "empresa",
            Self::Personal => "personal",
        }
    }
}

/// Errors from identity validation.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Usuario inválido. Use E001-E025 para empresas o 1-25 para cuentas personales.")]
    InvalidUser,
}

/// Validate a login identifier and return its account type.
pub fn validate_user(username: &str) -> Result<AccountType, AuthError> {
    let normalized = username.trim().to_uppercase();

    if COMPANY_ID.is_match(&normalized) {
        return Ok(AccountType::Company);
    }

    match normalized.parse::<u32>() {
        Ok(n) if PERSONAL_RANGE.contains(&n) => Ok(AccountType::Personal),
        _ => Err(AuthError::InvalidUser),
    }
}

/// Display name for a user.
pub fn format_username(username: &str, account_type: AccountType) -> String {
    match account_type {
        AccountType::Company => format!("Empresa {username}"),
        AccountType::Personal => format!("Usuario {username}"),
    }
}

/// The record handed back on login.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserInfo {
    pub username: String,
    #[serde(rename = "type")]
    pub account_type: AccountType,
    pub user_id: String,
    pub login_time: DateTime<Utc>,
}

impl UserInfo {
    /// Validate `username` and build the session record.
    pub fn login(username: &str) -> Result<Self, AuthError> {
        let account_type = validate_user(username)?;
        let trimmed = username.trim();
        let upper = trimmed.to_uppercase();

        let user_id = match account_type {
            AccountType::Company => upper.clone(),
            AccountType::Personal => trimmed.to_string(),
        };

        Ok(Self {
            username: upper,
            account_type,
            user_id,
            login_time: Utc::now(),
        })
    }

    pub fn display_name(&self) -> String {
        format_username(&self.username, self.account_type)
    }
}

/// The lenient `userInfo` object attached to chat and plan requests.
///
/// Every field is optional; a missing type means a personal account.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(rename = "type", default)]
    pub account_type: AccountType,
    #[serde(default)]
    pub user_id: Option<String>,
}

impl UserProfile {
    pub fn new(account_type: AccountType, user_id: Option<&str>) -> Self {
        Self {
            username: user_id.map(ToString::to_string),
            account_type,
            user_id: user_id.map(ToString::to_string),
        }
    }

    /// Trimmed, non-empty user id.
    pub fn id(&self) -> Option<&str> {
        self.user_id
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

impl From<&UserInfo> for UserProfile {
    fn from(info: &UserInfo) -> Self {
        Self {
            username: Some(info.username.clone()),
            account_type: info.account_type,
            user_id: Some(info.user_id.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_company_range() {
        assert_eq!(validate_user("E001").unwrap(), AccountType::Company);
        assert_eq!(validate_user(" e025 ").unwrap(), AccountType::Company);
        assert!(validate_user("E026").is_err());
        assert!(validate_user("E000").is_err());
    }

    #[test]
    fn test_personal_range() {
        assert_eq!(validate_user("1").unwrap(), AccountType::Personal);
        assert_eq!(validate_user("25").unwrap(), AccountType::Personal);
        assert!(validate_user("0").is_err());
        assert!(validate_user("26").is_err());
        assert!(validate_user("abc").is_err());
    }

    #[test]
    fn test_login_normalizes_ids() {
        let company = UserInfo::login(" e007").unwrap();
        assert_eq!(company.username, "E007");
        assert_eq!(company.user_id, "E007");
        assert_eq!(company.display_name(), "Empresa E007");

        let personal = UserInfo::login("12 ").unwrap();
        assert_eq!(personal.user_id, "12");
        assert_eq!(personal.account_type, AccountType::Personal);
        assert_eq!(personal.display_name(), "Usuario 12");
    }

    #[test]
    fn test_profile_wire_format() {
        let profile: UserProfile =
            serde_json::from_str(r#"{"username":"E003","type":"empresa","userId":"E003"}"#)
                .unwrap();
        assert_eq!(profile.account_type, AccountType::Company);
        assert_eq!(profile.id(), Some("E003"));

        let bare: UserProfile = serde_json::from_str("{}").unwrap();
        assert_eq!(bare.account_type, AccountType::Personal);
        assert_eq!(bare.id(), None);
    }
}
