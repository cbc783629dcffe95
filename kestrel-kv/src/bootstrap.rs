//! Bootstrap and maintenance of routing metadata and default configs.

use kestrel_core::{
    make_key, RangeLocations, RangeMetadata, Replica, Result, KEY_CONFIG_ACCOUNTING_PREFIX,
    KEY_CONFIG_PERMISSION_PREFIX, KEY_CONFIG_ZONE_PREFIX, KEY_MAX, KEY_META1_PREFIX,
    KEY_META2_PREFIX, KEY_MIN,
};
use tracing::info;

use crate::configs::{AcctConfig, PermConfig, ZoneConfig};
use crate::db::Db;
use crate::typed::put_value;

/// Writes the level-1 and level-2 entries describing a single range that
/// spans the whole key space and lives on `replica`.
///
/// # Errors
///
/// Returns the first failed write's error.
pub async fn bootstrap_range_locations<D: Db + ?Sized>(db: &D, replica: Replica) -> Result<()> {
    let locations = RangeLocations {
        start_key: KEY_MIN,
        end_key: None,
        replicas: vec![replica],
    };
    put_value(db, make_key(&KEY_META1_PREFIX, &KEY_MAX), &locations).await?;
    put_value(db, make_key(&KEY_META2_PREFIX, &KEY_MAX), &locations).await?;
    info!(node_id = %replica.node_id, "bootstrapped range locations");
    Ok(())
}

/// Writes the default accounting, permission and zone configs for the
/// whole key space.
///
/// # Errors
///
/// Returns the first failed write's error.
pub async fn bootstrap_configs<D: Db + ?Sized>(db: &D) -> Result<()> {
    put_value(db, make_key(&KEY_CONFIG_ACCOUNTING_PREFIX, &KEY_MIN), &AcctConfig::default())
        .await?;
    put_value(db, make_key(&KEY_CONFIG_PERMISSION_PREFIX, &KEY_MIN), &PermConfig::allow_all())
        .await?;
    put_value(
        db,
        make_key(&KEY_CONFIG_ZONE_PREFIX, &KEY_MIN),
        &ZoneConfig::three_hdd_replicas(),
    )
    .await?;
    info!("bootstrapped default configs");
    Ok(())
}

/// Records `locations` as the owners of the range described by `meta`.
///
/// Always rewrites the level-2 entry keyed by the range's end key. When the
/// range itself holds level-2 entries (its end key is a level-2 key), the
/// level-1 entry pointing at it is rewritten too.
///
/// # Errors
///
/// Returns the first failed write's error.
pub async fn update_range_locations<D: Db + ?Sized>(
    db: &D,
    meta: &RangeMetadata,
    locations: &RangeLocations,
) -> Result<()> {
    put_value(db, make_key(&KEY_META2_PREFIX, &meta.end_key), locations).await?;
    if let Some(meta2_end) = meta.end_key.strip_prefix(&KEY_META2_PREFIX) {
        put_value(db, make_key(&KEY_META1_PREFIX, &meta2_end), locations).await?;
    }
    Ok(())
}
