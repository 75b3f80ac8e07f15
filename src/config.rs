//! Process configuration.
//!
//! Every option is settable as a flag or an environment variable; the
//! environment names carry a `RELAY_` prefix.

use std::net::SocketAddr;

use clap::Parser;

use crate::classifier::ClassifierSettings;

/// Default TTL for persisted action records: 30 days.
const DEFAULT_RECORD_TTL_SECS: u64 = 30 * 24 * 3600;

#[derive(Debug, Clone, Parser)]
#[command(
    name = "tracker-relay",
    about = "Relays issue-tracker webhooks into durable chat-side work",
    version
)]
pub struct Config {
    #[arg(
        long,
        env = "RELAY_LISTEN_ADDR",
        default_value = "0.0.0.0:3000",
        help = "Socket address the webhook server binds"
    )]
    pub listen_addr: SocketAddr,

    #[arg(
        long,
        env = "RELAY_REDIS_URL",
        default_value = "redis://127.0.0.1:6379",
        help = "Redis connection URL for the durable work queue"
    )]
    pub redis_url: String,

    #[arg(
        long,
        env = "RELAY_KEY_PREFIX",
        default_value = "relay",
        help = "Namespace prefix applied to every durable key"
    )]
    pub key_prefix: String,

    #[arg(
        long,
        env = "RELAY_BOT_USER",
        default_value = "relay-bot",
        help = "The bot's own tracker login; its comments are never relayed"
    )]
    pub bot_user: String,

    #[arg(
        long,
        env = "RELAY_TEST_MODE",
        default_value_t = false,
        help = "Shadow-instance mode: accept only events created by --test-user logins"
    )]
    pub test_mode: bool,

    #[arg(
        long = "test-user",
        env = "RELAY_TEST_USERS",
        value_delimiter = ',',
        help = "Creator logins accepted in test mode (repeatable)"
    )]
    pub test_users: Vec<String>,

    #[arg(
        long = "ignored-creator",
        env = "RELAY_IGNORED_CREATORS",
        value_delimiter = ',',
        help = "Creator logins whose events are dropped in normal mode (repeatable)"
    )]
    pub ignored_creators: Vec<String>,

    #[arg(
        long,
        env = "RELAY_WEBHOOK_SECRET",
        help = "Shared secret for webhook signature verification; unset disables verification"
    )]
    pub webhook_secret: Option<String>,

    #[arg(
        long,
        env = "RELAY_RECORD_TTL_SECS",
        default_value_t = DEFAULT_RECORD_TTL_SECS,
        help = "Expiry for persisted action records in seconds; 0 keeps them forever"
    )]
    pub record_ttl_secs: u64,
}

impl Config {
    pub fn classifier_settings(&self) -> ClassifierSettings {
        ClassifierSettings {
            bot_user: self.bot_user.clone(),
            test_mode: self.test_mode,
            test_users: self.test_users.clone(),
            ignored_creators: self.ignored_creators.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_parse() {
        let config = Config::try_parse_from(["tracker-relay"]).unwrap();
        assert_eq!(config.listen_addr.port(), 3000);
        assert_eq!(config.key_prefix, "relay");
        assert_eq!(config.record_ttl_secs, DEFAULT_RECORD_TTL_SECS);
        assert!(!config.test_mode);
        assert_eq!(config.webhook_secret, None);
    }

    #[test]
    fn lists_accept_repeated_flags_and_delimiters() {
        let config = Config::try_parse_from([
            "tracker-relay",
            "--test-mode",
            "--test-user",
            "alice",
            "--test-user",
            "bob",
            "--ignored-creator",
            "ci-bot,importer",
        ])
        .unwrap();
        assert!(config.test_mode);
        assert_eq!(config.test_users, ["alice", "bob"]);
        assert_eq!(config.ignored_creators, ["ci-bot", "importer"]);
    }

    #[test]
    fn settings_carry_over() {
        let config = Config::try_parse_from([
            "tracker-relay",
            "--bot-user",
            "shadow-bot",
            "--test-mode",
        ])
        .unwrap();
        let settings = config.classifier_settings();
        assert_eq!(settings.bot_user, "shadow-bot");
        assert!(settings.test_mode);
    }
}
