//! Push engine
//!
//! Pipeline: metadata pass 1 -> data push (samples/capsules, one job per
//! row) -> metadata pass 2 for deferred rows -> optional stale-item
//! archival. Per-row accounting lands in the status ledger as writes flush.

mod archive;
mod condition;
mod metadata;
mod plan;
mod signal;
mod types;

pub use archive::{
    archive_stale_items, ArchiveOutcome, DATASOURCE_CLEANUP_ITEM_COUNT_THRESHOLD,
};
pub use condition::{push_condition_capsules, CapsuleWrite};
pub use metadata::{push_metadata, scoped_data_id};
pub use plan::{PlannedRow, PushPlan};
pub use signal::{push_signal_samples, SampleWrite};
pub use types::{
    ArchiveScope, CapsuleRecord, PushData, PushItem, PushKind, PushPhase, PushRequest,
    PushResult, PushRow, PushRowResult, ReplaceInterval, WriteSummary,
};

use crate::error::{Error, Result};
use crate::session::Session;
use crate::status::{Jobs, Status};
use std::collections::BTreeMap;
use std::time::Instant;
use tracing::debug;

/// Push metadata and data for the given rows
pub async fn push(
    session: &Session,
    request: &PushRequest,
    status: &Status,
) -> Result<PushResult> {
    let plan = PushPlan::build(&request.rows)?;
    if request.archive.is_some() && request.sync_token.is_none() {
        return Err(Error::config(
            "archive requires a sync_token to tell surviving items from stale ones",
        ));
    }

    let mut ids: BTreeMap<usize, String> = BTreeMap::new();
    let mut ids_by_name: BTreeMap<String, String> = BTreeMap::new();

    push_metadata(
        session,
        request,
        &plan,
        PushPhase::Structure,
        status,
        &mut ids,
        &mut ids_by_name,
    )
    .await?;

    // ------------------------------------------------------------------
    // Data push: one job per row with data. Rows whose metadata push
    // failed have no ID and are already catalogued.
    // ------------------------------------------------------------------
    let mut total = WriteSummary::default();
    {
        let mut jobs: Jobs<'_, WriteSummary> = Jobs::new();

        for (index, row) in request.rows.iter().enumerate() {
            let Some(data) = &row.data else { continue };
            let Some(id) = ids.get(&index) else { continue };

            match data {
                PushData::Samples(series) => {
                    let write = SampleWrite {
                        signal_id: id,
                        column: &row.item.name,
                        series,
                        replace: request.replace,
                        declared_string: row
                            .item
                            .value_unit_of_measure
                            .as_deref()
                            .map(|uom| uom.eq_ignore_ascii_case("string")),
                        policy: request.type_mismatches,
                    };
                    jobs.add(index, async move {
                        let started = Instant::now();
                        let result = push_signal_samples(session, status, index, &write).await;
                        status.update_row(index, |l| l.time += started.elapsed());
                        result
                    });
                }
                PushData::Capsules(capsules) => {
                    let write = CapsuleWrite {
                        condition_id: id,
                        condition_name: &row.item.name,
                        capsules,
                        replace: request.replace,
                        property_units: &row.item.capsule_property_units,
                    };
                    jobs.add(index, async move {
                        let started = Instant::now();
                        let result =
                            push_condition_capsules(session, status, index, &write).await;
                        status.update_row(index, |l| l.time += started.elapsed());
                        result
                    });
                }
            }
        }

        let results = jobs.execute(session.options().max_concurrent_requests).await;
        status.check_interrupt()?;

        for (index, result) in results {
            match result {
                Ok(summary) => {
                    total.absorb(summary);
                    status.set_result(index, "Success");
                }
                Err(e) => status.raise_or_catalog(index, e)?,
            }
        }
    }

    push_metadata(
        session,
        request,
        &plan,
        PushPhase::Deferred,
        status,
        &mut ids,
        &mut ids_by_name,
    )
    .await?;

    // Metadata-only rows that made it this far succeeded
    for index in ids.keys() {
        if status.row(*index).map_or(true, |row| row.result == "Queued") {
            status.set_result(*index, "Success");
        }
    }

    let archived = match (&request.archive, &request.sync_token) {
        (Some(scope), Some(token)) => {
            match archive_stale_items(session, scope, token).await? {
                ArchiveOutcome::Walked { archived } => Some(archived),
                ArchiveOutcome::Bulk => None,
            }
        }
        _ => None,
    };

    let ledger = status.rows();
    let rows = request
        .rows
        .iter()
        .enumerate()
        .map(|(index, _)| {
            let entry = ledger.get(&index).cloned().unwrap_or_default();
            PushRowResult {
                index,
                id: ids.get(&index).cloned(),
                push_count: entry.count,
                push_time: entry.time,
                push_result: entry.result,
            }
        })
        .collect();

    debug!(
        rows = request.rows.len(),
        written = total.count,
        "push complete"
    );

    Ok(PushResult {
        rows,
        earliest: total.earliest,
        latest: total.latest,
        archived,
    })
}

#[cfg(test)]
mod tests;
