//! Status command implementation

use chrono::Utc;
use colored::Colorize;

use factrack::client::factrack::DEFAULT_API_HOST;
use factrack::config::Config;
use factrack::error::Result;

use crate::cli::GlobalOptions;
use crate::output::formatters::{format_duration, format_timestamp};

/// Show configuration, sign-in and session state without contacting the backend
pub fn run(opts: &GlobalOptions) -> Result<()> {
    println!("{}\n", "factrack status".bold());

    let path = Config::resolve_path(opts.config_ref())?;
    let config = Config::load_or_default(&path)?;
    let now = Utc::now();

    if path.exists() {
        println!("Config file: {}", path.display().to_string().cyan());
    } else {
        println!(
            "Config file: {} {}",
            path.display().to_string().cyan(),
            "(not created yet)".dimmed()
        );
    }

    let host = opts
        .api_host_ref()
        .or(config.api_host.as_deref())
        .unwrap_or(DEFAULT_API_HOST);
    println!("API host: {}", host);
    println!();

    match config.user_snapshot() {
        Ok(Some(snapshot)) => {
            println!("{} Signed in as {}", "✓".green(), snapshot.user.username.bold());
            let granted = snapshot.permissions.granted().count();
            println!("  {} permissions granted", granted);
        }
        Ok(None) => {
            println!("{} Not signed in", "○".dimmed());
            println!("  → Run 'factrack login' to sign in");
        }
        Err(err) => {
            println!("{} Stored user is unreadable: {}", "✗".red(), err);
        }
    }

    if let Some(ref jwt) = config.jwt {
        match jwt.expires_at {
            _ if jwt.is_expired(now) => {
                println!("{} Token expired (sign in again)", "⚠".yellow());
            }
            Some(expires_at) => {
                let remaining = (expires_at - now).to_std().unwrap_or_default();
                println!(
                    "{} Token valid (expires in {})",
                    "✓".green(),
                    format_duration(remaining)
                );
            }
            None => println!("{} Token present (no expiry)", "✓".green()),
        }
    }

    println!();
    let level = config
        .session
        .as_ref()
        .map(|s| s.security_level)
        .unwrap_or(config.preferences.security_level);
    println!(
        "Security level: {} (signs out after {} idle)",
        level.to_string().cyan(),
        format_duration(level.inactivity_threshold())
    );

    if let Some(ref session) = config.session
        && session.is_authenticated
    {
        let idle = session.idle_for(now);
        if session.is_timed_out(now) {
            println!(
                "{} Session timed out ({} idle); next command signs out",
                "⚠".yellow(),
                format_duration(idle)
            );
        } else {
            println!(
                "{} Last activity {} ({} ago)",
                "✓".green(),
                format_timestamp(session.last_activity_at),
                format_duration(idle)
            );
        }
    }

    Ok(())
}
