//! Session level and inactivity commands

use colored::Colorize;
use serde_json::json;

use factrack::error::Result;
use factrack::session::SecurityLevel;

use crate::cli::{CommandContext, GlobalOptions, OutputFormat};
use crate::output::formatters::{format_duration, format_timestamp};
use crate::output::json::format_json;

/// Show the current level, or set a new one for this and future sessions
pub async fn level(opts: &GlobalOptions, level: Option<SecurityLevel>) -> Result<()> {
    let ctx = CommandContext::new(opts).await?;
    let session = ctx.auth.session();

    match level {
        Some(level) => {
            session.set_level(level)?;
            ctx.store
                .update(|config| config.preferences.security_level = level)?;
            println!(
                "{} Security level set to {} (signs out after {} idle)",
                "✓".green(),
                level.to_string().bold(),
                format_duration(level.inactivity_threshold())
            );
        }
        None => {
            let level = session.snapshot().security_level;
            if ctx.format == OutputFormat::Json {
                println!(
                    "{}",
                    format_json(&json!({
                        "securityLevel": level,
                        "thresholdSecs": level.inactivity_threshold().as_secs(),
                    }))?
                );
            } else {
                println!(
                    "{} (signs out after {} idle)",
                    level.to_string().bold(),
                    format_duration(level.inactivity_threshold())
                );
            }
        }
    }

    ctx.finish().await
}

/// Record activity now
pub async fn touch(opts: &GlobalOptions) -> Result<()> {
    let ctx = CommandContext::new(opts).await?;
    ctx.require_user()?;

    let session = ctx.auth.session();
    session.touch(session.clock().now())?;
    println!(
        "{} Activity recorded at {}",
        "✓".green(),
        format_timestamp(session.snapshot().last_activity_at)
    );

    ctx.finish().await
}

/// Show idle time against the threshold
pub async fn check(opts: &GlobalOptions) -> Result<()> {
    let ctx = CommandContext::new(opts).await?;
    let session = ctx.auth.session();
    let snapshot = session.snapshot();
    let now = session.clock().now();

    let threshold = snapshot.security_level.inactivity_threshold();
    let idle = snapshot.idle_for(now);
    let remaining = threshold.saturating_sub(idle);

    if ctx.format == OutputFormat::Json {
        println!(
            "{}",
            format_json(&json!({
                "session": snapshot,
                "idleSecs": idle.as_secs(),
                "thresholdSecs": threshold.as_secs(),
                "remainingSecs": remaining.as_secs(),
            }))?
        );
    } else if !snapshot.is_authenticated {
        println!("{} Not signed in", "○".dimmed());
        println!("  Security level {}", snapshot.security_level.to_string().cyan());
    } else {
        println!(
            "{} Active at level {}",
            "✓".green(),
            snapshot.security_level.to_string().cyan()
        );
        println!("  Idle for {}", format_duration(idle));
        println!("  Signs out in {}", format_duration(remaining));
    }

    ctx.finish().await
}
