//! HTML texts for commands and service messages.

use std::fmt::Write;
use xgate_core::config::ModerationConfig;
use xgate_core::limiter::QuotaStatus;
use xgate_runtime::{DiagnosticReport, PermissionState, StorageState};

/// Reply to group-only commands sent elsewhere.
pub const GROUP_ONLY: &str = "❌ This command only works in group chats.";

/// Reply to operator commands from anyone else.
pub const NOT_AN_OPERATOR: &str = "⛔️ Only bot operators can do that.";

/// Example line for testing link detection.
const TEST_LINK: &str = "This is interesting: https://x.com/test/status/123";

fn yes_no(value: bool) -> &'static str {
    if value {
        "Yes"
    } else {
        "No"
    }
}

fn rules_lines(config: &ModerationConfig) -> String {
    let mut text = format!(
        "• Max {} X links per week per user\n",
        config.max_links_per_week
    );
    if config.require_context {
        let _ = writeln!(
            text,
            "• Links must have {}+ characters of context",
            config.min_context_length
        );
    }
    text
}

/// `/start` reply.
#[must_use]
pub fn start_text(config: &ModerationConfig) -> String {
    format!(
        "👋 <b>X Link Moderator Bot</b>\n\n<b>Rules:</b>\n{}\n\
         Make me an admin with 'Delete Messages' permission to activate moderation.",
        rules_lines(config)
    )
}

/// Greeting posted when the bot joins a group.
#[must_use]
pub fn welcome_text(config: &ModerationConfig) -> String {
    format!(
        "👋 <b>Thanks for adding X-Gate!</b>\n\n\
         <b>Quick Setup (30 seconds):</b>\n\
         1. Make me an admin\n\
         2. Enable 'Delete Messages' permission\n\
         3. Done! I'll start moderating X links\n\n\
         <b>Commands:</b>\n\
         • /start - View rules\n\
         • /stats - Check your usage\n\
         • /diagnose - Test configuration\n\n\
         <b>Rules:</b>\n{}\n\
         Type /diagnose to verify I'm set up correctly!",
        rules_lines(config)
    )
}

/// `/stats` reply.
#[must_use]
pub fn stats_text(status: &QuotaStatus) -> String {
    let mut text = format!(
        "📊 <b>Your Stats:</b>\n• Links posted this week: {}/{}\n• Remaining: {}",
        status.count, status.max, status.remaining
    );
    if let Some(next) = status.next_slot_at {
        let _ = write!(
            text,
            "\n• Next slot frees up: {}",
            next.format("%Y-%m-%d %H:%M UTC")
        );
    }
    text
}

/// `/diagnose` reply.
#[must_use]
pub fn diagnostic_text(report: &DiagnosticReport) -> String {
    let mut text = String::from("🔍 <b>Diagnostic Report</b>\n\n");

    text.push_str(match &report.permission {
        PermissionState::CanDelete => "✅ Bot is admin with delete permissions\n",
        PermissionState::AdminWithoutDelete => {
            "❌ Bot is admin but <b>CANNOT delete messages</b>\n\
             \u{20}  <b>Fix:</b> Give bot 'Delete Messages' permission\n\
             \u{20}  1. Tap group name → Edit → Administrators\n\
             \u{20}  2. Tap the bot → Enable 'Delete Messages'\n"
        }
        PermissionState::NotAdmin => {
            "❌ Bot is <b>NOT an administrator</b>\n\
             \u{20}  <b>Fix:</b> Make the bot an admin\n\
             \u{20}  1. Tap group name → Edit → Administrators\n\
             \u{20}  2. Tap 'Add Administrator' → Select the bot\n\
             \u{20}  3. Enable 'Delete Messages' permission\n"
        }
        PermissionState::Unknown { .. } => "❌ Could not check permissions",
    });
    if let PermissionState::Unknown { reason } = &report.permission {
        let _ = writeln!(text, " (<code>{reason}</code>)");
    }

    match &report.storage {
        StorageState::Healthy => text.push_str("✅ Database is working\n"),
        StorageState::Unavailable { reason } => {
            let _ = writeln!(text, "❌ Database error (<code>{reason}</code>)");
        }
    }

    let config = &report.config;
    text.push_str("\n⚙️ <b>Current Settings:</b>\n");
    let _ = writeln!(text, "• Max links per week: {}", config.max_links_per_week);
    let _ = writeln!(text, "• Context required: {}", yes_no(config.require_context));
    if config.require_context {
        let _ = writeln!(
            text,
            "• Min context length: {} chars",
            config.min_context_length
        );
    }
    let _ = writeln!(
        text,
        "• Count each link: {}",
        if config.count_per_link {
            "Yes"
        } else {
            "No (one per message)"
        }
    );

    text.push_str("\n🧪 <b>Test Link Detection:</b>\nTry posting this test link with context:\n");
    let _ = write!(text, "<code>{TEST_LINK}</code>");
    text
}
