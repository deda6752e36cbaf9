//! Sign-in, sign-out and whoami

use colored::Colorize;
use dialoguer::{Input, Password, theme::ColorfulTheme};
use serde_json::json;

use factrack::client::models::UserProfile;
use factrack::error::Result;
use factrack::session::LogoutReason;

use crate::cli::{CommandContext, GlobalOptions, OutputFormat};
use crate::output::json::format_json;
use crate::output::{self, Record};

/// Run the login command
pub async fn login(
    opts: &GlobalOptions,
    username: Option<String>,
    password: Option<String>,
) -> Result<()> {
    let ctx = CommandContext::new(opts).await?;

    let username = match username {
        Some(username) => username,
        None => Input::<String>::with_theme(&ColorfulTheme::default())
            .with_prompt("Username")
            .interact_text()?,
    };
    let password = match password {
        Some(password) => password,
        None => Password::with_theme(&ColorfulTheme::default())
            .with_prompt("Password")
            .interact()?,
    };

    let user = ctx.auth.login(username.trim(), &password).await?;

    if let Some(host) = opts.api_host_ref() {
        let host = host.to_string();
        ctx.store.update(|config| config.api_host = Some(host))?;
    }

    println!("{} Signed in as {}", "✓".green(), display_name(&user).bold());
    let level = ctx.auth.session().snapshot().security_level;
    println!(
        "  Session level {} (signs out after {} idle)",
        level.to_string().cyan(),
        crate::output::formatters::format_duration(level.inactivity_threshold())
    );

    ctx.finish().await
}

/// Run the logout command
pub async fn logout(opts: &GlobalOptions, all: bool) -> Result<()> {
    let ctx = CommandContext::new(opts).await?;

    if ctx.auth.current_user().is_none() {
        println!("{} Not signed in", "○".dimmed());
        return ctx.finish().await;
    }

    let notice = if all {
        ctx.auth.logout_all(LogoutReason::AllDevices).await
    } else {
        ctx.auth.logout(LogoutReason::UserRequested).await
    };
    println!("{} {}", "✓".green(), notice.message);

    ctx.finish().await
}

/// Run the whoami command
pub async fn whoami(opts: &GlobalOptions) -> Result<()> {
    let ctx = CommandContext::new(opts).await?;
    ctx.require_user()?;

    let (Some(user), Some(permissions)) = (ctx.auth.current_user(), ctx.auth.permissions().current())
    else {
        return ctx.finish().await;
    };

    if ctx.format == OutputFormat::Json {
        let granted: Vec<&str> = permissions.granted().collect();
        let pages: Vec<&str> = permissions.pages().collect();
        let features: Vec<&str> = permissions.features().collect();
        println!(
            "{}",
            format_json(&json!({
                "user": user,
                "permissions": granted,
                "pages": pages,
                "features": features,
            }))?
        );
    } else {
        output::print(&Record(&user), ctx.format)?;
        let granted: Vec<&str> = permissions.granted().collect();
        println!();
        if granted.is_empty() {
            println!("{}", "No permissions granted".dimmed());
        } else {
            println!("{} {}", "Permissions:".bold(), granted.join(", "));
        }
    }

    ctx.finish().await
}

fn display_name(user: &UserProfile) -> String {
    match user.full_name.as_deref() {
        Some(name) if !name.is_empty() => format!("{} ({})", name, user.username),
        _ => user.username.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_name() {
        let mut user = UserProfile {
            id: "u-1".to_string(),
            username: "NV001".to_string(),
            full_name: None,
            role: None,
            department_id: None,
            factory_id: None,
        };
        assert_eq!(display_name(&user), "NV001");

        user.full_name = Some("Nguyen Van A".to_string());
        assert_eq!(display_name(&user), "Nguyen Van A (NV001)");
    }
}
