//! CLI argument parsing and the `check` subcommand.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use logpush_rules::loader::ConfigLoader;
use logpush_rules::RuleRegistry;

/// Log ingestion alerting service: chat pushes and aggregated mail.
#[derive(Parser, Debug)]
#[command(name = "logpush", version, about)]
pub struct Cli {
    /// Path to the YAML configuration file.
    #[arg(long, short, env = "LOGPUSH_CONFIG", default_value = "cfg.yml", global = true)]
    pub config: PathBuf,

    /// Reload the configuration when the file changes.
    #[arg(long, global = true)]
    pub watch: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Start the HTTP server (default).
    Serve,
    /// Validate the configuration, print the rule table and exit.
    Check,
}

impl Cli {
    pub fn command(&self) -> Command {
        self.command.unwrap_or(Command::Serve)
    }
}

/// Load and validate the configuration behind `loader`.
pub fn check(loader: &ConfigLoader) -> anyhow::Result<()> {
    let (config, registry) = loader.load_validated()?;
    println!("{}: ok", loader.path().display());
    println!("address: {}", config.address);
    print!("{}", rule_table(&registry));
    Ok(())
}

/// One line per rule: name, channels and mail flush interval.
pub fn rule_table(registry: &RuleRegistry) -> String {
    let mut out = format!("{} rules\n", registry.len());
    for rule in registry.rules() {
        let chat = if rule.chat.enabled {
            format!("chat({})", rule.chat.senders.len())
        } else {
            "-".to_string()
        };
        let mail = if rule.mail.enabled {
            format!(
                "mail({} senders, every {}s)",
                rule.mail.senders.len(),
                rule.mail.flush_interval.as_secs()
            )
        } else {
            "-".to_string()
        };
        out.push_str(&format!("  {:<32} {:<10} {}\n", rule.name, chat, mail));
    }
    out
}

#[cfg(test)]
mod tests {
    use logpush_core::Config;

    use super::*;

    #[test]
    fn defaults_to_serve() {
        let cli = Cli::try_parse_from(["logpush"]).unwrap();
        assert_eq!(cli.command(), Command::Serve);
        assert!(!cli.watch);
    }

    #[test]
    fn check_with_config_after_subcommand() {
        let cli = Cli::try_parse_from(["logpush", "check", "--config", "other.yml"]).unwrap();
        assert_eq!(cli.command(), Command::Check);
        assert_eq!(cli.config, PathBuf::from("other.yml"));
    }

    #[test]
    fn serve_with_watch() {
        let cli = Cli::try_parse_from(["logpush", "--watch", "serve"]).unwrap();
        assert_eq!(cli.command(), Command::Serve);
        assert!(cli.watch);
    }

    #[test]
    fn rule_table_lists_channels() {
        let config = Config::from_yaml_str(
            r#"
rules:
  - tags: [db]
    levels: [error]
    ding: {enable: true, senders: [{token: a}, {token: b}]}
  - tags: [web]
    mail:
      enable: true
      duration: 30
      toPersons: [ops@example.com]
      senders: [{smtp: smtp.example.com, port: 465, sender: a@example.com, password: pw}]
"#,
        )
        .unwrap();
        let registry = RuleRegistry::build(&config).unwrap();
        let table = rule_table(&registry);

        assert!(table.starts_with("2 rules\n"));
        assert!(table.contains("DB@ERROR"));
        assert!(table.contains("chat(2)"));
        assert!(table.contains("WEB@*"));
        assert!(table.contains("mail(1 senders, every 30s)"));
    }

    #[test]
    fn check_rejects_invalid_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("cfg.yml");
        std::fs::write(&path, "maxBatchSize: 0\n").unwrap();
        assert!(check(&ConfigLoader::new(path)).is_err());
    }
}
