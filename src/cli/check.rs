//! Permission check command

use colored::Colorize;
use serde_json::json;

use factrack::error::Result;
use factrack::permission::{Criterion, PermissionCheck};

use crate::cli::{CommandContext, GlobalOptions, OutputFormat};
use crate::output::json::format_json;

/// Evaluate `check` for the signed-in user. Returns whether access was
/// granted; works offline from the stored permissions.
pub async fn run(opts: &GlobalOptions, check: PermissionCheck) -> Result<bool> {
    let ctx = CommandContext::new(opts).await?;
    let criterion = check.deciding_criterion();
    let granted = ctx.require(check.clone()).await?;

    if ctx.format == OutputFormat::Json {
        println!(
            "{}",
            format_json(&json!({
                "check": check,
                "criterion": criterion_name(criterion),
                "granted": granted,
            }))?
        );
    } else if granted {
        println!("{} Granted ({})", "✓".green(), describe(&check, criterion));
    } else {
        println!("  decided by {}", describe(&check, criterion).dimmed());
    }

    ctx.finish().await?;
    Ok(granted)
}

fn criterion_name(criterion: Criterion) -> &'static str {
    match criterion {
        Criterion::Permission => "permission",
        Criterion::Page => "page",
        Criterion::Feature => "feature",
        Criterion::AllOf => "all_of",
        Criterion::AnyOf => "any_of",
        Criterion::None => "none",
    }
}

fn describe(check: &PermissionCheck, criterion: Criterion) -> String {
    match criterion {
        Criterion::Permission => format!("permission {}", check.permission.as_deref().unwrap_or("")),
        Criterion::Page => format!("page {}", check.page.as_deref().unwrap_or("")),
        Criterion::Feature => format!("feature {}", check.feature.as_deref().unwrap_or("")),
        Criterion::AllOf => format!("all of {}", check.all_of.join(", ")),
        Criterion::AnyOf => format!("any of {}", check.any_of.join(", ")),
        Criterion::None => "no criteria".to_string(),
    }
}
