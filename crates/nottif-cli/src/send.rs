use std::io::{IsTerminal, Read};
use std::path::Path;

use anyhow::{Context, Result, bail};

use nottif_notifier::Notifier;
use nottif_types::Identity;

/// Environment variable consulted when `--webhook` is not given.
pub const WEBHOOK_ENV: &str = "NOTTIF_WEBHOOK";

/// Send one message straight to the webhook, without a running server.
pub async fn run_send(
    message: Option<String>,
    webhook: Option<String>,
    config_path: &Path,
) -> Result<()> {
    let message = match message.filter(|m| !m.is_empty()) {
        Some(message) => message,
        None => read_piped_stdin()?.unwrap_or_default(),
    };
    if message.is_empty() {
        bail!("No message provided. Either pipe input or provide a message argument");
    }

    let env_webhook = std::env::var(WEBHOOK_ENV).ok();
    let webhook = resolve_webhook(webhook, env_webhook, config_path)?;

    Notifier::with_reqwest(webhook)
        .send(&message, &Identity::default())
        .await
        .context("Failed to send notification")?;
    Ok(())
}

/// Pick the webhook from the flag, the environment or the config file, in
/// that order.
fn resolve_webhook(
    flag: Option<String>,
    env: Option<String>,
    config_path: &Path,
) -> Result<String> {
    if let Some(url) = flag.into_iter().chain(env).find(|u| !u.is_empty()) {
        return Ok(url);
    }

    let config = nottif_config::load_config_from(config_path)?;
    if config.webhook_url.is_empty() {
        bail!(
            "No webhook URL configured. Pass --webhook, set {WEBHOOK_ENV} or add one to {}",
            config_path.display()
        );
    }
    Ok(config.webhook_url)
}

/// Read all of stdin when it is a pipe. Returns `None` on a terminal.
fn read_piped_stdin() -> Result<Option<String>> {
    let mut stdin = std::io::stdin();
    if stdin.is_terminal() {
        return Ok(None);
    }
    let mut input = String::new();
    stdin
        .read_to_string(&mut input)
        .context("Failed to read input")?;
    Ok(Some(input.trim().to_string()))
}
