//! Interactive CLI setup wizard
//!
//! Collects the API token (validated against the API before it is
//! accepted), the update interval and the publishing options, then saves
//! the configuration file and stores the token in the OS keyring.

use crate::config::{
    validate_interval, AgentConfig, MqttConfig, DEFAULT_UPDATE_INTERVAL_MINUTES,
    MAX_UPDATE_INTERVAL_MINUTES, MIN_UPDATE_INTERVAL_MINUTES,
};
use crate::lifecycle::{validate_credentials, SetupError};
use anyhow::{bail, Context, Result};
use std::io::{self, BufRead, Write};
use std::path::Path;

/// Line-oriented prompts over any reader/writer pair
pub struct Prompter<R, W> {
    input: R,
    output: W,
}

impl<R: BufRead, W: Write> Prompter<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    pub fn say(&mut self, line: &str) -> Result<()> {
        writeln!(self.output, "{}", line)?;
        Ok(())
    }

    fn read_line(&mut self) -> Result<String> {
        self.output.flush()?;
        let mut input = String::new();
        if self.input.read_line(&mut input)? == 0 {
            bail!("Input closed before setup finished");
        }
        Ok(input.trim().to_string())
    }

    pub fn prompt_with_default(&mut self, prompt: &str, default: &str) -> Result<String> {
        write!(self.output, "❓ {} [{}]: ", prompt, default)?;
        let input = self.read_line()?;
        if input.is_empty() {
            Ok(default.to_string())
        } else {
            Ok(input)
        }
    }

    pub fn prompt_with_default_parse<T: std::str::FromStr>(
        &mut self,
        prompt: &str,
        default: &str,
    ) -> Result<T>
    where
        T::Err: std::fmt::Display,
    {
        loop {
            let input = self.prompt_with_default(prompt, default)?;
            match input.parse::<T>() {
                Ok(value) => return Ok(value),
                Err(e) => self.say(&format!("❌ Invalid input: {}. Please try again.", e))?,
            }
        }
    }

    pub fn prompt_optional(&mut self, prompt: &str) -> Result<Option<String>> {
        write!(self.output, "❓ {}: ", prompt)?;
        let input = self.read_line()?;
        Ok(if input.is_empty() { None } else { Some(input) })
    }

    /// Prompt until a non-empty answer is given
    pub fn prompt_required(&mut self, prompt: &str) -> Result<String> {
        loop {
            if let Some(value) = self.prompt_optional(prompt)? {
                return Ok(value);
            }
            self.say("❌ A value is required.")?;
        }
    }

    pub fn prompt_yes_no(&mut self, prompt: &str, default: bool) -> Result<bool> {
        let default_str = if default { "Y/n" } else { "y/N" };

        loop {
            write!(self.output, "❓ {} [{}]: ", prompt, default_str)?;
            let input = self.read_line()?.to_lowercase();

            if input.is_empty() {
                return Ok(default);
            }

            match input.as_str() {
                "y" | "yes" => return Ok(true),
                "n" | "no" => return Ok(false),
                _ => self.say("❌ Please enter 'y' or 'n'.")?,
            }
        }
    }
}

pub struct SetupWizard<R, W> {
    prompter: Prompter<R, W>,
}

impl SetupWizard<io::StdinLock<'static>, io::Stdout> {
    /// Run against the terminal and save the result to `config_path`.
    ///
    /// Returns the saved config, or `None` if the user declined to save.
    pub async fn run_interactive(
        base: AgentConfig,
        config_path: &Path,
    ) -> Result<Option<AgentConfig>> {
        let mut wizard = SetupWizard::new(io::stdin().lock(), io::stdout());
        let Some(config) = wizard.run(base).await? else {
            return Ok(None);
        };

        config
            .save_at(config_path)
            .await
            .context("Failed to save configuration")?;

        wizard.prompter.say("")?;
        wizard.prompter.say("✅ Configuration saved successfully!")?;
        wizard
            .prompter
            .say(&format!("   File: {}", config_path.display()))?;
        wizard.prompter.say("🚀 The Ultrahuman agent is now ready to start.")?;
        Ok(Some(config))
    }
}

impl<R: BufRead, W: Write> SetupWizard<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self {
            prompter: Prompter::new(input, output),
        }
    }

    /// Collect a configuration starting from `base`; nothing is written
    pub async fn run(&mut self, base: AgentConfig) -> Result<Option<AgentConfig>> {
        let p = &mut self.prompter;
        p.say("")?;
        p.say("💍 ======================================")?;
        p.say("   ULTRAHUMAN AGENT CONFIGURATION WIZARD")?;
        p.say("💍 ======================================")?;
        p.say("")?;

        let mut config = base;

        // Step 1: API token
        config.api.token = Some(self.configure_token(&config).await?);

        // Step 2: Polling
        config.polling.update_interval_minutes = self.configure_interval(&config)?;

        // Step 3: Publishing
        self.configure_publishing(&mut config)?;

        self.display_summary(&config)?;

        if self.prompter.prompt_yes_no("💾 Save this configuration?", true)? {
            Ok(Some(config))
        } else {
            self.prompter.say("❌ Configuration cancelled.")?;
            Ok(None)
        }
    }

    async fn configure_token(&mut self, config: &AgentConfig) -> Result<String> {
        let p = &mut self.prompter;
        p.say("🔑 API ACCESS")?;
        p.say("────────────────────────────────────────")?;
        p.say("Paste the partner API token issued for your ring.")?;
        p.say("")?;

        loop {
            let token = self.prompter.prompt_required("API token")?;

            self.prompter.say("🔍 Validating token...")?;
            match validate_credentials(&config.api, &token).await {
                Ok(()) => {
                    self.prompter.say("✅ Token accepted!")?;
                    self.prompter.say("")?;
                    return Ok(token);
                }
                Err(SetupError::InvalidAuth) => {
                    self.prompter
                        .say("❌ invalid_auth: the API rejected this token. Please try again.")?;
                }
                Err(e) => return Err(e).context("Token validation failed"),
            }
        }
    }

    fn configure_interval(&mut self, config: &AgentConfig) -> Result<u32> {
        let p = &mut self.prompter;
        p.say("⏱️  POLLING")?;
        p.say("────────────────────────────────────────")?;

        let current = if validate_interval(config.polling.update_interval_minutes).is_ok() {
            config.polling.update_interval_minutes
        } else {
            DEFAULT_UPDATE_INTERVAL_MINUTES
        };
        let prompt = format!(
            "Update interval in minutes ({}-{})",
            MIN_UPDATE_INTERVAL_MINUTES, MAX_UPDATE_INTERVAL_MINUTES
        );

        loop {
            let minutes: u32 = p.prompt_with_default_parse(&prompt, &current.to_string())?;
            match validate_interval(minutes) {
                Ok(()) => {
                    p.say("")?;
                    return Ok(minutes);
                }
                Err(e) => p.say(&format!("❌ {}. Please try again.", e))?,
            }
        }
    }

    fn configure_publishing(&mut self, config: &mut AgentConfig) -> Result<()> {
        let p = &mut self.prompter;
        p.say("📡 PUBLISHING")?;
        p.say("────────────────────────────────────────")?;

        config.publish.log_states = p.prompt_yes_no("Log entity states?", config.publish.log_states)?;

        if p.prompt_yes_no("Publish entities to an MQTT broker?", config.publish.mqtt.is_some())? {
            let current = config.publish.mqtt.clone().unwrap_or_default();
            let broker_host = p.prompt_with_default("MQTT Broker Host", &current.broker_host)?;
            let broker_port: u16 =
                p.prompt_with_default_parse("MQTT Broker Port", &current.broker_port.to_string())?;
            let topic_prefix = p.prompt_with_default("Topic prefix", &current.topic_prefix)?;
            let discovery_prefix =
                p.prompt_with_default("Discovery prefix", &current.discovery_prefix)?;

            config.publish.mqtt = Some(MqttConfig {
                broker_host,
                broker_port,
                topic_prefix,
                discovery_prefix,
                ..current
            });
        } else {
            config.publish.mqtt = None;
        }

        config.publish.http_bind =
            p.prompt_optional("HTTP read API address (e.g. 127.0.0.1:8089, empty to disable)")?;
        p.say("")?;
        Ok(())
    }

    fn display_summary(&mut self, config: &AgentConfig) -> Result<()> {
        let p = &mut self.prompter;
        p.say("📋 CONFIGURATION SUMMARY")?;
        p.say("────────────────────────────────────────")?;
        p.say(&format!("🔑 API: {}", config.api.base_url))?;
        p.say("   Token: stored in OS keyring")?;
        p.say(&format!(
            "⏱️  Update interval: {} min",
            config.polling.update_interval_minutes
        ))?;
        p.say(&format!(
            "📝 Log states: {}",
            if config.publish.log_states { "✅ Yes" } else { "❌ No" }
        ))?;
        match &config.publish.mqtt {
            Some(mqtt) => p.say(&format!(
                "📡 MQTT: {}:{} (topics under '{}')",
                mqtt.broker_host, mqtt.broker_port, mqtt.topic_prefix
            ))?,
            None => p.say("📡 MQTT: ❌ Disabled")?,
        }
        p.say(&format!(
            "🌐 HTTP API: {}",
            config.publish.http_bind.as_deref().unwrap_or("❌ Disabled")
        ))?;
        p.say("")?;
        Ok(())
    }
}
