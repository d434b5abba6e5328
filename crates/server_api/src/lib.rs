use shared::{
    domain::{next_stamp, NewPurifier, PurifierId, PurifierRecord},
    error::{ApiError, ErrorCode},
};
use storage::Storage;
use tracing::{debug, info};

#[derive(Clone)]
pub struct ApiContext {
    pub storage: Storage,
}

pub async fn list_purifiers(ctx: &ApiContext) -> Result<Vec<PurifierRecord>, ApiError> {
    let purifiers = ctx.storage.list_purifiers().await.map_err(internal)?;
    debug!(count = purifiers.len(), "listed purifiers");
    Ok(purifiers)
}

/// Create-or-update keyed by id. The service owns `lastUpdated`.
pub async fn upsert_purifier(
    ctx: &ApiContext,
    input: NewPurifier,
) -> Result<PurifierRecord, ApiError> {
    let fields = input.validate()?;
    let previous = ctx
        .storage
        .get_purifier(&fields.id)
        .await
        .map_err(internal)?;
    let record = fields.stamped(next_stamp(previous.as_ref().map(|p| p.last_updated)));
    ctx.storage
        .upsert_purifier(&record)
        .await
        .map_err(internal)?;
    info!(
        purifier_id = %record.id,
        created = previous.is_none(),
        "purifier stored"
    );
    Ok(record)
}

pub async fn set_purifier_status(
    ctx: &ApiContext,
    raw_id: &str,
    status: bool,
) -> Result<PurifierRecord, ApiError> {
    let id = PurifierId::parse(raw_id)?;
    let previous = ctx
        .storage
        .get_purifier(&id)
        .await
        .map_err(internal)?
        .ok_or_else(|| ApiError::not_found(&id))?;
    let record = ctx
        .storage
        .set_purifier_status(&id, status, next_stamp(Some(previous.last_updated)))
        .await
        .map_err(internal)?
        .ok_or_else(|| ApiError::not_found(&id))?;
    info!(purifier_id = %id, status, "purifier status set");
    Ok(record)
}

pub async fn replace_purifier(
    ctx: &ApiContext,
    raw_id: &str,
    input: NewPurifier,
) -> Result<PurifierRecord, ApiError> {
    let id = PurifierId::parse(raw_id)?;
    let fields = input.validate()?;
    if fields.id != id {
        return Err(ApiError::new(
            ErrorCode::Validation,
            format!("body id {} does not match path id {id}", fields.id),
        ));
    }
    let previous = ctx
        .storage
        .get_purifier(&id)
        .await
        .map_err(internal)?
        .ok_or_else(|| ApiError::not_found(&id))?;
    let record = fields.stamped(next_stamp(Some(previous.last_updated)));
    if !ctx
        .storage
        .replace_purifier(&record)
        .await
        .map_err(internal)?
    {
        return Err(ApiError::not_found(&id));
    }
    info!(purifier_id = %id, "purifier replaced");
    Ok(record)
}

/// Deleting an unknown id succeeds.
pub async fn delete_purifier(ctx: &ApiContext, raw_id: &str) -> Result<(), ApiError> {
    let id = PurifierId::parse(raw_id)?;
    let existed = ctx.storage.delete_purifier(&id).await.map_err(internal)?;
    info!(purifier_id = %id, existed, "purifier deleted");
    Ok(())
}

fn internal(err: anyhow::Error) -> ApiError {
    ApiError::new(ErrorCode::Internal, format!("{err:#}"))
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
