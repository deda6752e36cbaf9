//! Organisation structure commands

use factrack::error::Result;
use factrack::permission::PermissionCheck;

use crate::cli::{CommandContext, GlobalOptions};
use crate::output::{self, Tree};

/// Print the factory → department/line → team hierarchy
pub async fn tree(opts: &GlobalOptions) -> Result<()> {
    let ctx = CommandContext::new(opts).await?;
    if !ctx
        .require(PermissionCheck::permission("organization.view"))
        .await?
    {
        return ctx.finish().await;
    }

    let result = ctx
        .registry
        .organization()
        .tree(ctx.refresh)
        .await
        .and_then(|nodes| output::print(&Tree(&nodes), ctx.format));
    let result = ctx.signed_out_on_reject(result).await;
    ctx.finish().await?;
    result
}

/// List the managers assigned to a department
pub async fn managers(opts: &GlobalOptions, department_id: &str) -> Result<()> {
    let ctx = CommandContext::new(opts).await?;
    if !ctx
        .require(PermissionCheck::permission("department.view"))
        .await?
    {
        return ctx.finish().await;
    }

    let result = ctx
        .registry
        .organization()
        .department_managers(department_id)
        .await
        .and_then(|managers| output::print(&managers, ctx.format));
    let result = ctx.signed_out_on_reject(result).await;
    ctx.finish().await?;
    result
}
