use std::{collections::BTreeMap, fs::File, path::Path};

use anyhow::Result;
use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use regex::Regex;
use serde::Deserialize;

use crate::{model::AccountId, Error};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Configuration {
    pub session: Session,
    #[serde(default = "default_currency")]
    pub default_currency: String,
    #[serde(default = "default_timezone")]
    pub timezone: String,
    #[serde(with = "serde_regex", default = "default_scannable")]
    pub scannable_receipts: Regex,
    #[serde(default = "default_sms_domain")]
    pub sms_domain: String,
    #[serde(default)]
    pub violations_enabled: bool,
    #[serde(default)]
    pub messages: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    #[serde(rename = "accountID")]
    pub account_id: AccountId,
    pub email: String,
}

impl Configuration {
    pub fn load(path: &Path) -> Result<Configuration> {
        let file = File::open(path)?;
        let config: Configuration = serde_json::from_reader(file)?;
        config.tz()?;
        Ok(config)
    }

    pub fn for_session(account_id: AccountId, email: &str) -> Self {
        Self {
            session: Session {
                account_id,
                email: email.to_owned(),
            },
            default_currency: default_currency(),
            timezone: default_timezone(),
            scannable_receipts: default_scannable(),
            sms_domain: default_sms_domain(),
            violations_enabled: false,
            messages: BTreeMap::new(),
        }
    }

    pub fn tz(&self) -> crate::Result<Tz> {
        self.timezone
            .parse::<Tz>()
            .map_err(|_| Error::InvalidTimezone(self.timezone.clone()))
    }

    /// Calendar date of `at` in the user's timezone.
    pub fn local_date(&self, at: DateTime<Utc>) -> crate::Result<NaiveDate> {
        Ok(at.with_timezone(&self.tz()?).date_naive())
    }

    pub fn is_scannable(&self, filename: &str) -> bool {
        self.scannable_receipts.is_match(filename)
    }

    /// Phone-number logins are addressed through the SMS domain.
    pub fn login_with_sms_domain(&self, login: &str) -> String {
        use lazy_static::lazy_static;
        lazy_static! {
            static ref PHONE: Regex = Regex::new(r"^\+?[0-9]{7,15}$").unwrap();
        }

        let trimmed = login.trim();
        let digits = trimmed.replace([' ', '-', '(', ')'], "");
        if PHONE.is_match(&digits) {
            let digits = if digits.starts_with('+') {
                digits
            } else {
                format!("+{}", digits)
            };
            format!("{}@{}", digits, self.sms_domain)
        } else {
            trimmed.to_lowercase()
        }
    }
}

impl Default for Configuration {
    fn default() -> Self {
        Self::for_session(0, "")
    }
}

fn default_currency() -> String {
    "USD".into()
}

fn default_timezone() -> String {
    "America/Los_Angeles".into()
}

fn default_scannable() -> Regex {
    Regex::new(r"(?i)\.(jpe?g|png|gif|pdf|heic|tiff?)$").unwrap()
}

fn default_sms_domain() -> String {
    "expensify.sms".into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phone_logins_get_sms_domain() {
        let config = Configuration::for_session(1, "me@example.com");
        assert_eq!(
            config.login_with_sms_domain("+1 (555) 123-4567"),
            "+15551234567@expensify.sms"
        );
        assert_eq!(
            config.login_with_sms_domain(" Friend@Example.com "),
            "friend@example.com"
        );
    }

    #[test]
    fn test_scannable_receipts() {
        let config = Configuration::for_session(1, "me@example.com");
        assert!(config.is_scannable("receipt.JPG"));
        assert!(config.is_scannable("scan.pdf"));
        assert!(!config.is_scannable("notes.txt"));
    }

    #[test]
    fn test_local_date_uses_timezone() -> anyhow::Result<()> {
        let config = Configuration::for_session(1, "me@example.com");
        let at = DateTime::parse_from_rfc3339("2024-03-02T05:00:00Z")?.with_timezone(&Utc);
        assert_eq!(
            config.local_date(at)?,
            NaiveDate::from_ymd_opt(2024, 3, 1).unwrap()
        );

        Ok(())
    }
}
