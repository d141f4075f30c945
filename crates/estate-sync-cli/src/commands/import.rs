use std::path::Path;

use estate_sync_core::provision::OrgFixture;
use estate_sync_core::SyncService;

use crate::error::CliError;

pub async fn run_import(service: &SyncService, path: &Path, as_json: bool) -> Result<(), CliError> {
    let fixture = OrgFixture::load_from_path(path)?;
    let summary = service.import_fixture(&fixture).await?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!(
            "Imported {} org nodes, {} actors, {} assignments",
            summary.org_nodes, summary.actors, summary.assignments
        );
    }

    Ok(())
}
