//! Stale-item archival
//!
//! After a push, items the sync token did not touch are archived. Small
//! datasources take the bulk server-side cleanup; past roughly 19,000
//! estimated items the bulk path's commit batching becomes unreliable, so a
//! manual tree walk archives stale children one by one.

use super::types::ArchiveScope;
use crate::error::Result;
use crate::session::Session;
use tracing::{debug, info};

/// Above this estimated item count the bulk cleanup is avoided
pub const DATASOURCE_CLEANUP_ITEM_COUNT_THRESHOLD: u64 = 19_000;

/// Children requested per tree-walk page
const TREE_PAGE_SIZE: usize = 40;

/// Which archival path ran
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveOutcome {
    /// Bulk datasource cleanup; the server does not report a count
    Bulk,
    /// Manual tree walk
    Walked { archived: u64 },
}

/// Archive every item under the scope whose sync token differs from
/// `sync_token`.
pub async fn archive_stale_items(
    session: &Session,
    scope: &ArchiveScope,
    sync_token: &str,
) -> Result<ArchiveOutcome> {
    let datasource = session.client().get_datasource(&scope.datasource_id).await?;
    let known_count = datasource.item_count.unwrap_or(0);
    // The datasource count lags behind what this push just created
    let potential_count = known_count + known_count / 2;

    if potential_count < DATASOURCE_CLEANUP_ITEM_COUNT_THRESHOLD {
        debug!(
            datasource = %scope.datasource_id,
            known_count,
            "archiving via bulk datasource cleanup"
        );
        session
            .client()
            .cleanup_datasource(&scope.datasource_id, sync_token)
            .await?;
        return Ok(ArchiveOutcome::Bulk);
    }

    let archived = archive_tree(session, &scope.root_asset_id, sync_token).await?;
    info!(
        root = %scope.root_asset_id,
        archived,
        "archived stale items via tree walk"
    );
    Ok(ArchiveOutcome::Walked { archived })
}

/// Walk the tree under `root` in pages, archiving every item whose sync
/// token differs. Children of archived branches are still visited.
async fn archive_tree(session: &Session, root: &str, sync_token: &str) -> Result<u64> {
    let mut pending: Vec<String> = vec![root.to_string()];
    let mut archived = 0_u64;

    while let Some(parent) = pending.pop() {
        let mut offset = 0_usize;
        loop {
            let page = session
                .client()
                .get_tree_children(&parent, offset, TREE_PAGE_SIZE, None)
                .await?;

            for child in &page.children {
                if child.has_children {
                    pending.push(child.id.clone());
                }
                if child.sync_token.as_deref() != Some(sync_token) {
                    session.client().archive_item(&child.id).await?;
                    archived += 1;
                }
            }

            if page.children.len() < TREE_PAGE_SIZE {
                break;
            }
            offset += TREE_PAGE_SIZE;
        }
    }

    Ok(archived)
}
