//! Sync Orchestrator
//!
//! Drives one caller-triggered sync of a connection: load and decrypt the
//! secret, validate the host, fetch profile and courses from Canvas, map
//! them, and upsert the results through the storage port. An expired
//! external token auto-disconnects the connection and is reported as a
//! distinguished non-error outcome, never as a generic failure.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use metrics::counter;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::allowlist::AllowlistError;
use crate::canvas::{CanvasClient, CanvasError, mapper};
use crate::crypto::{TokenCipher, secret_aad};
use crate::models::connection;
use crate::storage::{AccountUpsert, ConnectionPatch, Store, StoreError, UnitUpsert, UpsertOutcome};

/// Counts reported back to the caller after a completed sync.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct SyncSummary {
    pub added: usize,
    pub updated: usize,
    pub skipped: usize,
    pub profile_saved: bool,
}

/// Result of a sync that did not fail outright.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Sync ran to completion.
    Completed(SyncSummary),
    /// Canvas rejected the token; the connection and its secret were
    /// removed. The user just needs to reconnect.
    Disconnected,
}

/// Terminal failures, each with a machine-readable reason code.
#[derive(Debug, Error)]
pub enum SyncFailure {
    #[error("connection not found")]
    NotFound,
    #[error("host '{base_url}' is not allowlisted")]
    HostNotAllowed { base_url: String },
    #[error("stored secret failed to decrypt")]
    Decryption,
    #[error("canvas unreachable: {details}")]
    Network { details: String },
    #[error("a sync for this connection is already running")]
    AlreadyRunning,
    #[error(transparent)]
    Storage(StoreError),
}

impl SyncFailure {
    /// Stable reason code exposed in error responses.
    pub fn reason_code(&self) -> &'static str {
        match self {
            SyncFailure::NotFound => "not_found",
            SyncFailure::HostNotAllowed { .. } => "host_not_allowed",
            SyncFailure::Decryption => "decryption",
            SyncFailure::Network { .. } => "network",
            SyncFailure::AlreadyRunning => "conflict",
            SyncFailure::Storage(_) => "internal",
        }
    }
}

impl From<StoreError> for SyncFailure {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::NotFound => SyncFailure::NotFound,
            other => SyncFailure::Storage(other),
        }
    }
}

/// Releases the per-connection advisory lock on drop.
struct SyncGuard {
    locks: Arc<Mutex<HashSet<Uuid>>>,
    connection_id: Uuid,
}

impl Drop for SyncGuard {
    fn drop(&mut self) {
        if let Ok(mut held) = self.locks.lock() {
            held.remove(&self.connection_id);
        }
    }
}

/// The top-level sync pipeline.
pub struct SyncService {
    store: Arc<dyn Store>,
    client: CanvasClient,
    cipher: TokenCipher,
    /// Connections with a sync in flight; two concurrent syncs for the
    /// same connection must not interleave upserts.
    locks: Arc<Mutex<HashSet<Uuid>>>,
}

impl SyncService {
    pub fn new(store: Arc<dyn Store>, client: CanvasClient, cipher: TokenCipher) -> Self {
        Self {
            store,
            client,
            cipher,
            locks: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    fn try_lock(&self, connection_id: Uuid) -> Result<SyncGuard, SyncFailure> {
        let mut held = self
            .locks
            .lock()
            .map_err(|_| SyncFailure::Storage(StoreError::Backend("lock poisoned".into())))?;

        if !held.insert(connection_id) {
            return Err(SyncFailure::AlreadyRunning);
        }

        Ok(SyncGuard {
            locks: Arc::clone(&self.locks),
            connection_id,
        })
    }

    /// Run one sync for the owner's connection.
    #[instrument(skip(self), fields(owner = %owner, connection = %connection_id))]
    pub async fn sync_connection(
        &self,
        owner: Uuid,
        connection_id: Uuid,
    ) -> Result<SyncOutcome, SyncFailure> {
        let _guard = self.try_lock(connection_id)?;

        let conn = self.store.get_connection(owner, connection_id).await?;

        // Decrypt the stored token. A failure here means key rotation went
        // wrong or the row was corrupted; it is alarm-worthy, not retryable.
        let secret = self.store.get_secret(owner, connection_id).await?;
        let aad = secret_aad(&conn.owner_id, &conn.provider, &conn.base_url);
        let token = self.cipher.decrypt(&aad, &secret).map_err(|_| {
            warn!(connection = %connection_id, "secret decryption failed");
            counter!("unitrack_sync_failed_total", "reason" => "decryption").increment(1);
            SyncFailure::Decryption
        })?;

        // The client re-checks the allowlist on every request, but host
        // validation is its own pipeline stage with its own reason code.
        let base_url = conn.base_url.clone();
        if let Err(error) = self.client_allowlist_check(&base_url) {
            counter!("unitrack_sync_failed_total", "reason" => "host_not_allowed").increment(1);
            return Err(error);
        }

        // Fetch everything before touching storage: a cancelled or failed
        // fetch must leave no partial writes behind.
        let profile = match self.client.fetch_profile(&base_url, &token).await {
            Ok(profile) => Some(profile),
            Err(CanvasError::TokenInvalid) => {
                return self.disconnect(owner, &conn).await;
            }
            Err(error) => return Err(self.translate_fetch_error(error)),
        };

        let raw_courses = match self.client.fetch_courses(&base_url, &token).await {
            Ok(courses) => courses,
            Err(CanvasError::TokenInvalid) => {
                return self.disconnect(owner, &conn).await;
            }
            Err(error) => return Err(self.translate_fetch_error(error)),
        };

        // Mapping: per-record failures are skips, never aborts.
        let mut mapped = Vec::new();
        let mut skipped = 0usize;
        for raw in &raw_courses {
            match mapper::map_course(&base_url, raw) {
                Ok(unit) => mapped.push(unit),
                Err(reason) => {
                    skipped += 1;
                    let course_id = raw.get("id").and_then(|v| v.as_u64());
                    warn!(course_id, %reason, "skipping course during sync");
                }
            }
        }

        // Profile mirroring is best-effort; course data is the primary goal.
        let mut profile_saved = false;
        let mut account_id = None;
        let mapped_profile = profile.as_ref().map(mapper::map_profile);
        if let Some(mapped_profile) = &mapped_profile {
            let upsert = AccountUpsert {
                provider: conn.provider.clone(),
                base_url: base_url.clone(),
                external_id: mapped_profile.external_id.clone(),
                name: mapped_profile.name.clone(),
                short_name: mapped_profile.short_name.clone(),
                sortable_name: mapped_profile.sortable_name.clone(),
                avatar_url: mapped_profile.avatar_url.clone(),
                primary_email: mapped_profile.primary_email.clone(),
                locale: mapped_profile.locale.clone(),
                calendar_url: mapped_profile.calendar_url.clone(),
            };
            match self.store.upsert_account(owner, upsert).await {
                Ok((account, _)) => {
                    profile_saved = true;
                    account_id = Some(account.id);
                }
                Err(error) => {
                    warn!(%error, "profile upsert failed, continuing with course sync");
                }
            }
        }

        let mut added = 0usize;
        let mut updated = 0usize;
        for unit in mapped {
            let upsert = UnitUpsert {
                account_id,
                external_id: unit.external_id,
                code: unit.code,
                title: unit.title,
                canvas_url: Some(unit.canvas_url),
                year: unit.year,
                semester: unit.semester,
                role: Some(unit.role),
                syllabus: unit.syllabus,
            };
            match self.store.upsert_unit(owner, upsert).await? {
                (_, UpsertOutcome::Created) => added += 1,
                (_, UpsertOutcome::Updated) => updated += 1,
            }
        }

        // Record the sync and refresh the cached profile snippet.
        let metadata = mapped_profile.as_ref().map(|p| {
            serde_json::json!({
                "profile": {
                    "external_id": p.external_id,
                    "name": p.name,
                }
            })
        });
        let patch = ConnectionPatch {
            metadata: metadata.map(Some),
            last_synced_at: Some(Some(Utc::now())),
        };
        self.store
            .update_connection(owner, connection_id, patch)
            .await?;

        let summary = SyncSummary {
            added,
            updated,
            skipped,
            profile_saved,
        };
        info!(
            added = summary.added,
            updated = summary.updated,
            skipped = summary.skipped,
            profile_saved = summary.profile_saved,
            "sync completed"
        );
        counter!("unitrack_syncs_completed_total").increment(1);
        counter!("unitrack_units_added_total").increment(summary.added as u64);
        counter!("unitrack_units_updated_total").increment(summary.updated as u64);
        counter!("unitrack_units_skipped_total").increment(summary.skipped as u64);

        Ok(SyncOutcome::Completed(summary))
    }

    fn client_allowlist_check(&self, base_url: &str) -> Result<(), SyncFailure> {
        // Delegate to the client's allowlist by issuing the same check it
        // performs; a connection row with an unlisted base URL predates an
        // allowlist change and must not be synced.
        self.client
            .allowlist()
            .require(base_url)
            .map_err(|_| SyncFailure::HostNotAllowed {
                base_url: base_url.to_string(),
            })
    }

    fn translate_fetch_error(&self, error: CanvasError) -> SyncFailure {
        match error {
            CanvasError::HostNotAllowed(AllowlistError::HostNotAllowed(base_url)) => {
                counter!("unitrack_sync_failed_total", "reason" => "host_not_allowed").increment(1);
                SyncFailure::HostNotAllowed { base_url }
            }
            other => {
                counter!("unitrack_sync_failed_total", "reason" => "network").increment(1);
                SyncFailure::Network {
                    details: other.to_string(),
                }
            }
        }
    }

    /// Token invalid: remove the connection and its secret, best-effort,
    /// and report the distinguished outcome. Individual delete failures
    /// are logged and do not abort the disconnect.
    async fn disconnect(
        &self,
        owner: Uuid,
        conn: &connection::Model,
    ) -> Result<SyncOutcome, SyncFailure> {
        warn!(connection = %conn.id, "canvas token invalid, disconnecting");

        if let Err(error) = self.store.delete_secret(owner, conn.id).await {
            warn!(%error, "failed to delete secret during disconnect");
        }
        if let Err(error) = self.store.delete_connection(owner, conn.id).await {
            warn!(%error, "failed to delete connection during disconnect");
        }

        counter!("unitrack_syncs_disconnected_total").increment(1);
        Ok(SyncOutcome::Disconnected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reason_codes_are_stable() {
        assert_eq!(SyncFailure::NotFound.reason_code(), "not_found");
        assert_eq!(
            SyncFailure::HostNotAllowed {
                base_url: "https://x".into()
            }
            .reason_code(),
            "host_not_allowed"
        );
        assert_eq!(SyncFailure::Decryption.reason_code(), "decryption");
        assert_eq!(
            SyncFailure::Network {
                details: "timeout".into()
            }
            .reason_code(),
            "network"
        );
        assert_eq!(SyncFailure::AlreadyRunning.reason_code(), "conflict");
    }

    #[test]
    fn store_not_found_maps_to_not_found() {
        let failure: SyncFailure = StoreError::NotFound.into();
        assert!(matches!(failure, SyncFailure::NotFound));
    }

    #[test]
    fn summary_serializes_all_counts() {
        let summary = SyncSummary {
            added: 3,
            updated: 2,
            skipped: 1,
            profile_saved: true,
        };
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["added"], 3);
        assert_eq!(json["updated"], 2);
        assert_eq!(json["skipped"], 1);
        assert_eq!(json["profile_saved"], true);
    }
}
