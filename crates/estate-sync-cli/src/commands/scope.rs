use estate_sync_core::models::OrgTarget;
use estate_sync_core::{RequestContext, SyncService};

use crate::commands::common::format_scope_lines;
use crate::error::CliError;

pub async fn run_scope(
    service: &SyncService,
    ctx: &RequestContext,
    target: Option<&OrgTarget>,
    as_json: bool,
) -> Result<(), CliError> {
    let scope = service.resolve_scope(ctx, target).await?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&scope)?);
    } else {
        println!("{} ({})", ctx.actor_id, ctx.role.as_str());
        for line in format_scope_lines(&scope) {
            println!("  {line}");
        }
    }

    Ok(())
}
