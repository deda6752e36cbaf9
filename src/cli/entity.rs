//! list/get/create/update/delete for every record type

use colored::Colorize;
use dialoguer::Confirm;
use serde_json::json;

use factrack::context::EntityContext;
use factrack::entity::{
    Department, DepartmentDraft, Entity, EntityKind, Factory, FactoryDraft, Line, LineDraft, Role,
    RoleDraft, Team, TeamDraft,
};
use factrack::error::Result;
use factrack::permission::PermissionCheck;

use crate::cli::{CommandContext, CreateArgs, EntityCommands, GlobalOptions, OutputFormat};
use crate::output::json::format_json;
use crate::output::records::Describe;
use crate::output::{self, Record};

/// Record types managed from the command line
pub trait CliEntity: Entity + Describe {
    /// Create payload from the shared create flags
    fn draft(args: &CreateArgs) -> Self::Draft;
}

impl CliEntity for Department {
    fn draft(args: &CreateArgs) -> DepartmentDraft {
        DepartmentDraft {
            code: args.code.clone(),
            name: args.name.clone(),
            description: args.description.clone(),
            phone: args.phone.clone(),
            factory_id: args.factory.clone(),
            parent_id: args.parent.clone(),
        }
    }
}

impl CliEntity for Factory {
    fn draft(args: &CreateArgs) -> FactoryDraft {
        FactoryDraft {
            code: args.code.clone(),
            name: args.name.clone(),
            address: args.address.clone(),
            phone: args.phone.clone(),
        }
    }
}

impl CliEntity for Line {
    fn draft(args: &CreateArgs) -> LineDraft {
        LineDraft {
            code: args.code.clone(),
            name: args.name.clone(),
            factory_id: args.factory.clone().unwrap_or_default(),
            capacity: args.capacity,
        }
    }
}

impl CliEntity for Team {
    fn draft(args: &CreateArgs) -> TeamDraft {
        TeamDraft {
            code: args.code.clone(),
            name: args.name.clone(),
            line_id: args.line.clone().unwrap_or_default(),
            leader_id: args.leader.clone(),
        }
    }
}

impl CliEntity for Role {
    fn draft(args: &CreateArgs) -> RoleDraft {
        RoleDraft {
            code: args.code.clone(),
            name: args.name.clone(),
            description: args.description.clone(),
            level: args.level,
            permissions: args.permissions.clone(),
        }
    }
}

/// Permission code guarding `action` on `kind`, e.g. `line.update`
pub fn required_permission(kind: EntityKind, command: &EntityCommands) -> PermissionCheck {
    let action = match command {
        EntityCommands::List(_) | EntityCommands::Get { .. } => "view",
        EntityCommands::Create(_) => "create",
        EntityCommands::Update { .. } => "update",
        EntityCommands::Delete { .. } => "delete",
    };
    PermissionCheck::permission(format!("{}.{}", kind, action))
}

/// Run an entity subcommand for record type `E`
pub async fn run<E: CliEntity>(opts: &GlobalOptions, command: EntityCommands) -> Result<()> {
    let ctx = CommandContext::new(opts).await?;

    if !ctx.require(required_permission(E::KIND, &command)).await? {
        return ctx.finish().await;
    }

    let records = ctx.registry.context::<E>();
    let result = execute(&ctx, &records, command).await;
    let result = ctx.signed_out_on_reject(result).await;
    ctx.finish().await?;
    result
}

async fn execute<E: CliEntity>(
    ctx: &CommandContext,
    records: &EntityContext<E>,
    command: EntityCommands,
) -> Result<()> {
    let kind = E::KIND;

    match command {
        EntityCommands::List(args) => {
            let filter = args.to_filter(ctx.config.preferences.page_size);
            let items = records.list(&filter, ctx.refresh).await?;
            output::print(&items, ctx.format)
        }
        EntityCommands::Get { id } => {
            let item = records.get(&id, ctx.refresh).await?;
            output::print(&Record(&item), ctx.format)
        }
        EntityCommands::Create(args) => {
            let created = records.create(&E::draft(&args)).await?;
            if ctx.format != OutputFormat::Json {
                eprintln!("{} Created {} {}", "✓".green(), kind, created.code().bold());
            }
            output::print(&Record(&created), ctx.format)
        }
        EntityCommands::Update { id, changes } => {
            let updated = records.update(&id, &changes.to_patch()?).await?;
            if ctx.format != OutputFormat::Json {
                eprintln!("{} Updated {} {}", "✓".green(), kind, updated.code().bold());
            }
            output::print(&Record(&updated), ctx.format)
        }
        EntityCommands::Delete { id, yes } => {
            let record = records.get(&id, ctx.refresh).await?;

            if !yes {
                eprintln!(
                    "{} Delete {} \"{}\" ({})? This cannot be undone.",
                    "⚠".yellow(),
                    kind,
                    record.name(),
                    record.code()
                );
                eprintln!();

                let confirm = Confirm::new()
                    .with_prompt("Confirm deletion?")
                    .default(false)
                    .interact()?;

                if !confirm {
                    eprintln!("Cancelled.");
                    return Ok(());
                }
            }

            records.delete(&id).await?;

            match ctx.format {
                OutputFormat::Json => println!(
                    "{}",
                    format_json(&json!({"deleted": true, "kind": kind, "id": id}))?
                ),
                _ => println!(
                    "{} Deleted {} {}",
                    "✓".green(),
                    kind,
                    record.code().bold()
                ),
            }
            Ok(())
        }
    }
}
