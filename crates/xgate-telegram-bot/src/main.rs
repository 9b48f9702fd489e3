use dotenvy::dotenv;
use lazy_regex::lazy_regex;
use std::io::{self, Write};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{prelude::*, EnvFilter};
use xgate_core::config::{build_config, CoreSettings};
use xgate_transport_telegram::config::{BotSettings, TelegramSettings};
use xgate_transport_telegram::runner::run_bot;

/// Telegram bot token, bare or embedded in a Bot API URL.
static RE_BOT_TOKEN: lazy_regex::Lazy<regex::Regex> =
    lazy_regex!(r"[0-9]{8,10}:[A-Za-z0-9_-]{30,}");

fn redact(input: &str) -> std::borrow::Cow<'_, str> {
    RE_BOT_TOKEN.replace_all(input, "[TELEGRAM_TOKEN]")
}

struct RedactingWriter<W: Write> {
    inner: W,
}

impl<W: Write> Write for RedactingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let s = String::from_utf8_lossy(buf);
        self.inner.write_all(redact(&s).as_bytes())?;
        // Report the original length; the redacted text may differ.
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

struct RedactingMakeWriter<F>(F);

impl<'a, F, W> tracing_subscriber::fmt::MakeWriter<'a> for RedactingMakeWriter<F>
where
    F: Fn() -> W + 'static,
    W: Write,
{
    type Writer = RedactingWriter<W>;

    fn make_writer(&'a self) -> Self::Writer {
        RedactingWriter { inner: (self.0)() }
    }
}

#[tokio::main]
async fn main() {
    // Load .env file
    dotenv().ok();

    init_logging();

    info!("Starting X-Gate TG Bot...");

    let settings = init_settings();

    run_bot(settings).await;

    info!("X-Gate stopped.");
}

fn init_logging() {
    let make_writer = RedactingMakeWriter(io::stderr);

    let debug_mode = std::env::var("DEBUG_MODE")
        .map(|v| v == "true" || v == "1")
        .unwrap_or(false);

    let filter = if debug_mode {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(
                "xgate_core=info,xgate_runtime=info,xgate_transport_telegram=info,xgate_telegram_bot=info,teloxide=warn,sqlx=warn,hyper=warn,reqwest=warn,tokio=warn",
            )
        })
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(make_writer))
        .init();
}

fn init_settings() -> Arc<BotSettings> {
    let config = match build_config() {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to read configuration: {}", e);
            std::process::exit(1);
        }
    };
    let core_settings = match CoreSettings::from_config(config.clone()) {
        Ok(settings) => settings,
        Err(e) => {
            error!("Failed to load moderation configuration: {}", e);
            std::process::exit(1);
        }
    };
    let telegram_settings = match TelegramSettings::from_config(config) {
        Ok(settings) => settings,
        Err(e) => {
            error!("Failed to load telegram configuration: {}", e);
            std::process::exit(1);
        }
    };

    info!("Configuration loaded successfully.");
    Arc::new(BotSettings::new(core_settings, telegram_settings))
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOKEN: &str = "123456789:AAHdqTcvCH1vGWJxfSeofSAs0K5PALDsaw1";

    #[test]
    fn test_redacts_api_urls() {
        let line = format!("POST https://api.telegram.org/bot{TOKEN}/sendMessage failed");
        let redacted = redact(&line);
        assert!(!redacted.contains(TOKEN));
        assert!(redacted.contains("https://api.telegram.org/bot[TELEGRAM_TOKEN]/sendMessage"));
    }

    #[test]
    fn test_redacts_bare_tokens() {
        assert_eq!(redact(&format!("token={TOKEN} loaded")), "token=[TELEGRAM_TOKEN] loaded");
        assert_eq!(redact("chat -100123 ok"), "chat -100123 ok");
        assert_eq!(redact("at 12:30:00"), "at 12:30:00");
    }

    #[test]
    fn test_writer_redacts_and_reports_full_length() -> Result<(), Box<dyn std::error::Error>> {
        let mut writer = RedactingWriter { inner: Vec::new() };
        let line = format!("bot{TOKEN}\n");

        let written = writer.write(line.as_bytes())?;
        assert_eq!(written, line.len());
        let out = String::from_utf8(writer.inner)?;
        assert_eq!(out, "bot[TELEGRAM_TOKEN]\n");
        Ok(())
    }
}
