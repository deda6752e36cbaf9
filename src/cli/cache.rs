//! Cache commands
//!
//! The response cache lives in process memory, so a fresh invocation always
//! starts empty. `--warm` fills it with the first page of every record type
//! the user may view before reporting occupancy.

use tabled::Tabled;

use factrack::cache::TtlCacheStats;
use factrack::entity::{Department, Entity, EntityKind, Factory, Line, ListFilter, Role, Team};
use factrack::error::Result;
use factrack::permission::PermissionCheck;

use crate::cli::{CommandContext, GlobalOptions, OutputFormat};
use crate::output::formatters::format_duration;
use crate::output::json::format_json;
use crate::output::table::format_table;

#[derive(Debug, Tabled)]
struct CacheRow {
    #[tabled(rename = "TYPE")]
    kind: String,
    #[tabled(rename = "TTL")]
    ttl: String,
    #[tabled(rename = "ENTRIES")]
    entries: usize,
    #[tabled(rename = "FRESH")]
    fresh: usize,
    #[tabled(rename = "EXPIRED")]
    expired: usize,
}

fn rows(
    stats: &[(EntityKind, TtlCacheStats)],
    ttl: impl Fn(EntityKind) -> String,
) -> Vec<CacheRow> {
    stats
        .iter()
        .map(|(kind, stats)| CacheRow {
            kind: kind.to_string(),
            ttl: ttl(*kind),
            entries: stats.total_entries,
            fresh: stats.fresh_entries,
            expired: stats.expired_entries,
        })
        .collect()
}

/// Run the cache stats command
pub async fn stats(opts: &GlobalOptions, warm: bool) -> Result<()> {
    let ctx = CommandContext::new(opts).await?;

    if warm {
        ctx.require_user()?;
        let filter = ListFilter::new().page_size(ctx.config.preferences.page_size);
        warm_kind::<Department>(&ctx, &filter).await;
        warm_kind::<Factory>(&ctx, &filter).await;
        warm_kind::<Line>(&ctx, &filter).await;
        warm_kind::<Team>(&ctx, &filter).await;
        warm_kind::<Role>(&ctx, &filter).await;
    }

    let stats = ctx.registry.stats();
    let registry = &ctx.registry;

    if ctx.format == OutputFormat::Json {
        let data: Vec<_> = stats
            .iter()
            .map(|(kind, stats)| {
                serde_json::json!({
                    "kind": kind,
                    "ttlSecs": registry.ttl_for(*kind).as_secs(),
                    "entries": stats.total_entries,
                    "fresh": stats.fresh_entries,
                    "expired": stats.expired_entries,
                    "inFlight": stats.in_flight,
                })
            })
            .collect();
        println!("{}", format_json(&data)?);
    } else {
        let rows = rows(&stats, |kind| format_duration(registry.ttl_for(kind)));
        println!("{}", format_table(&rows));
    }

    ctx.finish().await
}

/// Fetch the first page of `E` if the user may view it. Failures only warn.
async fn warm_kind<E: Entity>(ctx: &CommandContext, filter: &ListFilter) {
    let check = PermissionCheck::permission(format!("{}.view", E::KIND));
    if ctx.auth.permissions().evaluate(&check) != Some(true) {
        log::debug!("Skipping {} cache warm-up: not permitted", E::KIND);
        return;
    }
    if let Err(err) = ctx.registry.context::<E>().list(filter, false).await {
        log::warn!("Failed to warm {} cache: {}", E::KIND, err);
    }
}
