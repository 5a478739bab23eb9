//! Crash policy (the Policy Store)
//!
//! A `PolicyConfiguration` is built by the host, validated once, then copied
//! into the installed reporter and never mutated again. Validation enforces
//! the length bounds that make every fault-time composition fit its scratch
//! buffer, so nothing is discovered to be too long mid-crash.
//!
//! # Configuration Priority (highest wins)
//!
//! 1. Builder calls made by the host
//! 2. Environment variables (`from_env()`)
//! 3. Library defaults
//!
//! # Example
//!
//! ```rust,ignore
//! use crashguard_core::{ActionMask, PolicyConfiguration};
//!
//! let policy = PolicyConfiguration::from_env()
//!     .app_name("MyApp")
//!     .app_version("1.0")
//!     .actions(ActionMask::RUN_SILENTLY | ActionMask::PERSIST_TO_DISK)
//!     .dump_dir("/var/crash/myapp");
//! policy.validate()?;
//! ```

use crate::actions::ActionMask;
use crate::env::{env_get, env_get_checked, env_get_opt};
use crate::error::ConfigError;
use crate::kwarn;
use core::fmt;
use core::str::FromStr;
use std::path::{Path, PathBuf};

/// Prefix of the variables `from_env` reads
pub const ENV_PREFIX: &str = "CRASHGUARD_";

/// Library defaults and length limits
pub mod defaults {
    use crate::actions::ActionMask;

    pub const ACTIONS: ActionMask = ActionMask::PROMPT_USER.union(ActionMask::PERSIST_TO_DISK);
    pub const APP_NAME: &str = "Application";
    pub const APP_VERSION: &str = "0.0.0";
    pub const SMTP_PORT: u16 = 25;
    pub const SUBJECT_PREFIX: &str = "Crash report: ";

    /// Build time of this library, `Mon D YYYY HH:MM:SS`
    pub const BUILD_TIMESTAMP: &str = env!("CRASHGUARD_BUILD_TIMESTAMP");

    pub const APP_NAME_MAX: usize = 128;
    pub const APP_VERSION_MAX: usize = 64;
    pub const TIMESTAMP_MAX: usize = 32;
    pub const DUMP_DIR_MAX: usize = 512;
    pub const FIELD_MAX: usize = 256;
    pub const SUBJECT_PREFIX_MAX: usize = 256;
    pub const BODY_TEMPLATE_MAX: usize = 512;
}

/// How complete the snapshot is
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum DumpVerbosity {
    /// Fault record only
    Minimal,
    /// Fault record plus the faulting thread's machine context
    #[default]
    Normal,
    /// Everything `Normal` has plus the process memory map
    Full,
}

impl FromStr for DumpVerbosity {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "minimal" | "0" => Ok(DumpVerbosity::Minimal),
            "normal" | "1" => Ok(DumpVerbosity::Normal),
            "full" | "2" => Ok(DumpVerbosity::Full),
            _ => Err(ConfigError::InvalidValue(
                "dump verbosity must be minimal, normal or full",
            )),
        }
    }
}

impl fmt::Display for DumpVerbosity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DumpVerbosity::Minimal => "minimal",
            DumpVerbosity::Normal => "normal",
            DumpVerbosity::Full => "full",
        })
    }
}

/// Notification endpoint, passed through to the transport untouched
#[derive(Clone, Default, PartialEq, Eq)]
pub struct NotificationSettings {
    pub server: String,
    pub port: u16,
    pub account: String,
    pub sender: String,
    pub recipient: String,
    pub password: String,
    pub subject_prefix: String,
    pub body_template: String,
}

impl fmt::Debug for NotificationSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NotificationSettings")
            .field("server", &self.server)
            .field("port", &self.port)
            .field("account", &self.account)
            .field("sender", &self.sender)
            .field("recipient", &self.recipient)
            .field("password", &if self.password.is_empty() { "" } else { "<redacted>" })
            .field("subject_prefix", &self.subject_prefix)
            .field("body_template", &self.body_template)
            .finish()
    }
}

/// What to do when the process crashes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyConfiguration {
    pub actions: ActionMask,
    pub app_name: String,
    pub app_version: String,
    /// Build stamp used in dump names and message bodies
    pub build_timestamp: String,
    /// `None` or empty: the system temp directory
    pub dump_dir: Option<PathBuf>,
    pub verbosity: DumpVerbosity,
    pub notification: NotificationSettings,
}

impl Default for PolicyConfiguration {
    fn default() -> Self {
        Self::new()
    }
}

impl PolicyConfiguration {
    /// Library defaults, no environment lookups
    pub fn new() -> Self {
        Self {
            actions: defaults::ACTIONS,
            app_name: defaults::APP_NAME.to_string(),
            app_version: defaults::APP_VERSION.to_string(),
            build_timestamp: defaults::BUILD_TIMESTAMP.to_string(),
            dump_dir: None,
            verbosity: DumpVerbosity::default(),
            notification: NotificationSettings {
                port: defaults::SMTP_PORT,
                subject_prefix: defaults::SUBJECT_PREFIX.to_string(),
                ..NotificationSettings::default()
            },
        }
    }

    /// Library defaults with environment overrides.
    ///
    /// Environment variables (all optional):
    /// - `CRASHGUARD_ACTIONS` - e.g. `silent|persist|notify-attach`
    /// - `CRASHGUARD_APP_NAME`, `CRASHGUARD_APP_VERSION`
    /// - `CRASHGUARD_DUMP_DIR` - dump directory
    /// - `CRASHGUARD_DUMP_VERBOSITY` - minimal, normal or full
    /// - `CRASHGUARD_SMTP_SERVER`, `CRASHGUARD_SMTP_PORT`, `CRASHGUARD_SMTP_ACCOUNT`
    /// - `CRASHGUARD_SMTP_PASSWORD`
    /// - `CRASHGUARD_MAIL_SENDER`, `CRASHGUARD_MAIL_RECIPIENT`
    /// - `CRASHGUARD_SUBJECT_PREFIX`, `CRASHGUARD_BODY_TEMPLATE`
    ///
    /// Unparsable values are reported with `kwarn!` and ignored.
    pub fn from_env() -> Self {
        Self::from_env_prefixed(ENV_PREFIX)
    }

    /// `from_env` with the variables looked up under `prefix` instead of
    /// `CRASHGUARD_`
    pub fn from_env_prefixed(prefix: &str) -> Self {
        let key = |name: &str| format!("{}{}", prefix, name);
        let mut policy = Self::new();

        let actions_key = key("ACTIONS");
        match env_get_checked::<ActionMask>(&actions_key) {
            Ok(Some(actions)) => policy.actions = actions,
            Ok(None) => {}
            Err(e) => kwarn!("ignoring {}: {}", actions_key, e),
        }
        let verbosity_key = key("DUMP_VERBOSITY");
        match env_get_checked::<DumpVerbosity>(&verbosity_key) {
            Ok(Some(v)) => policy.verbosity = v,
            Ok(None) => {}
            Err(e) => kwarn!("ignoring {}: {}", verbosity_key, e),
        }

        let set = |slot: &mut String, name: &str| {
            if let Some(v) = env_get_opt::<String>(&key(name)) {
                *slot = v;
            }
        };
        set(&mut policy.app_name, "APP_NAME");
        set(&mut policy.app_version, "APP_VERSION");

        if let Some(dir) = env_get_opt::<PathBuf>(&key("DUMP_DIR")) {
            policy.dump_dir = Some(dir);
        }

        let n = &mut policy.notification;
        set(&mut n.server, "SMTP_SERVER");
        set(&mut n.account, "SMTP_ACCOUNT");
        set(&mut n.password, "SMTP_PASSWORD");
        set(&mut n.sender, "MAIL_SENDER");
        set(&mut n.recipient, "MAIL_RECIPIENT");
        set(&mut n.subject_prefix, "SUBJECT_PREFIX");
        set(&mut n.body_template, "BODY_TEMPLATE");
        n.port = env_get(&key("SMTP_PORT"), n.port);

        policy
    }

    // Builder methods

    pub fn actions(mut self, actions: ActionMask) -> Self {
        self.actions = actions;
        self
    }

    pub fn app_name(mut self, name: impl Into<String>) -> Self {
        self.app_name = name.into();
        self
    }

    pub fn app_version(mut self, version: impl Into<String>) -> Self {
        self.app_version = version.into();
        self
    }

    pub fn build_timestamp(mut self, stamp: impl Into<String>) -> Self {
        self.build_timestamp = stamp.into();
        self
    }

    pub fn dump_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.dump_dir = Some(dir.into());
        self
    }

    pub fn verbosity(mut self, verbosity: DumpVerbosity) -> Self {
        self.verbosity = verbosity;
        self
    }

    pub fn smtp_server(mut self, server: impl Into<String>, port: u16) -> Self {
        self.notification.server = server.into();
        self.notification.port = port;
        self
    }

    pub fn smtp_account(mut self, account: impl Into<String>, password: impl Into<String>) -> Self {
        self.notification.account = account.into();
        self.notification.password = password.into();
        self
    }

    pub fn mail_sender(mut self, sender: impl Into<String>) -> Self {
        self.notification.sender = sender.into();
        self
    }

    pub fn mail_recipient(mut self, recipient: impl Into<String>) -> Self {
        self.notification.recipient = recipient.into();
        self
    }

    pub fn subject_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.notification.subject_prefix = prefix.into();
        self
    }

    pub fn body_template(mut self, template: impl Into<String>) -> Self {
        self.notification.body_template = template.into();
        self
    }

    /// Configured dump directory, `None` when empty or unset
    pub fn effective_dump_dir(&self) -> Option<&Path> {
        self.dump_dir
            .as_deref()
            .filter(|dir| !dir.as_os_str().is_empty())
    }

    /// Validate limits and return the first violation.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check("app_name", &self.app_name, defaults::APP_NAME_MAX)?;
        check("app_version", &self.app_version, defaults::APP_VERSION_MAX)?;
        check("build_timestamp", &self.build_timestamp, defaults::TIMESTAMP_MAX)?;

        if let Some(dir) = self.effective_dump_dir() {
            let dir = dir
                .to_str()
                .ok_or(ConfigError::InvalidValue("dump_dir must be valid UTF-8"))?;
            check("dump_dir", dir, defaults::DUMP_DIR_MAX)?;
        }

        let n = &self.notification;
        check("smtp_server", &n.server, defaults::FIELD_MAX)?;
        check("smtp_account", &n.account, defaults::FIELD_MAX)?;
        check("mail_sender", &n.sender, defaults::FIELD_MAX)?;
        check("mail_recipient", &n.recipient, defaults::FIELD_MAX)?;
        check("smtp_password", &n.password, defaults::FIELD_MAX)?;
        check("subject_prefix", &n.subject_prefix, defaults::SUBJECT_PREFIX_MAX)?;
        check("body_template", &n.body_template, defaults::BODY_TEMPLATE_MAX)?;

        if self.actions.notify_mode().is_some() && self.actions.is_silent() && n.port == 0 {
            return Err(ConfigError::InvalidValue("smtp port must be > 0 for silent notification"));
        }
        Ok(())
    }
}

fn check(field: &'static str, value: &str, max: usize) -> Result<(), ConfigError> {
    if value.len() > max {
        return Err(ConfigError::TooLong {
            field,
            len: value.len(),
            max,
        });
    }
    if value.contains('\0') {
        return Err(ConfigError::InteriorNul(field));
    }
    Ok(())
}
