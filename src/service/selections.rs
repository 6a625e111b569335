//! Selection storage and the overlap (agreement) engine.
//!
//! Each participant's picks are write-once per round and private until
//! the round completes: before completion only counts are ever exposed.
//! The overlap is the set intersection of every member's picks; a lone
//! participant trivially agrees with themself.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use crate::domain::{CandidateOption, OptionId, Participant, ParticipantId, SessionCode};
use crate::error::CoordinatorError;
use crate::store::{SessionStore, keys};

/// Outcome of the agreement computation.
#[derive(Debug, Clone)]
pub struct OverlapResult {
    /// Options every member picked, resolved to display records.
    pub overlapping: Vec<CandidateOption>,
    /// Every member's full selection, keyed by display name.
    pub all_selections: HashMap<String, Vec<CandidateOption>>,
    /// Whether the intersection is non-empty.
    pub has_overlap: bool,
}

/// Records picks exactly once per round and computes the agreement set.
#[derive(Debug, Clone)]
pub struct SelectionStore {
    store: Arc<dyn SessionStore>,
    catalog_ttl: Duration,
}

impl SelectionStore {
    /// Creates a selection store; `catalog_ttl` governs `option:{id}`
    /// display records, which expire independently of any session.
    #[must_use]
    pub fn new(store: Arc<dyn SessionStore>, catalog_ttl: Duration) -> Self {
        Self { store, catalog_ttl }
    }

    /// Stores the candidate set for a session and caches each option's
    /// display record in the catalog.
    ///
    /// The candidate id set rides the session's expiry clock; the
    /// catalog records get their own deadline.
    ///
    /// # Errors
    ///
    /// Returns a store error if any write fails.
    pub async fn set_candidates(
        &self,
        code: &SessionCode,
        options: &[CandidateOption],
    ) -> Result<(), CoordinatorError> {
        let ids: Vec<String> = options.iter().map(|o| o.id.to_string()).collect();
        self.store.set_add(&keys::candidates(code), &ids).await?;

        let catalog_deadline = Utc::now().timestamp_millis()
            + i64::try_from(self.catalog_ttl.as_millis()).unwrap_or(i64::MAX);
        for option in options {
            let key = keys::option(&option.id);
            self.store.hash_set(&key, &option.to_fields()).await?;
            self.store.expire_all_at(&[key], catalog_deadline).await?;
        }
        Ok(())
    }

    /// Records a participant's picks.
    ///
    /// Callers must hold the session's critical section. The picks set,
    /// the submitted set, and the member's `has_submitted` flag are
    /// written as one logical commit.
    ///
    /// # Errors
    ///
    /// - [`CoordinatorError::InvalidOptions`] if any id is not a
    ///   candidate for this session.
    /// - [`CoordinatorError::AlreadySubmitted`] if this participant's
    ///   selection set is already non-empty. Submission is write-once; a
    ///   second call is an error even with an identical payload.
    pub async fn submit(
        &self,
        code: &SessionCode,
        pid: ParticipantId,
        option_ids: &[OptionId],
    ) -> Result<(), CoordinatorError> {
        for id in option_ids {
            if !self
                .store
                .set_contains(&keys::candidates(code), id.as_str())
                .await?
            {
                return Err(CoordinatorError::InvalidOptions(id.to_string()));
            }
        }

        if self.store.set_len(&keys::picks(code, pid)).await? > 0 {
            return Err(CoordinatorError::AlreadySubmitted);
        }

        let members: Vec<String> = option_ids.iter().map(ToString::to_string).collect();
        self.store.set_add(&keys::picks(code, pid), &members).await?;
        self.store
            .set_add(&keys::submitted(code), &[pid.to_string()])
            .await?;
        self.store
            .hash_set_field(&keys::member(code, pid), "has_submitted", "1")
            .await?;

        tracing::info!(%code, %pid, picks = option_ids.len(), "selections submitted");
        Ok(())
    }

    /// Whether a participant has submitted this round.
    ///
    /// # Errors
    ///
    /// Returns a store error if the lookup fails.
    pub async fn has_submitted(
        &self,
        code: &SessionCode,
        pid: ParticipantId,
    ) -> Result<bool, CoordinatorError> {
        Ok(self
            .store
            .set_contains(&keys::submitted(code), &pid.to_string())
            .await?)
    }

    /// Number of members who have submitted this round.
    ///
    /// # Errors
    ///
    /// Returns a store error if the lookup fails.
    pub async fn submitted_count(&self, code: &SessionCode) -> Result<u64, CoordinatorError> {
        Ok(self.store.set_len(&keys::submitted(code)).await?)
    }

    /// A participant's raw picks (empty before submission).
    ///
    /// # Errors
    ///
    /// Returns a store error if the lookup fails.
    pub async fn selections(
        &self,
        code: &SessionCode,
        pid: ParticipantId,
    ) -> Result<Vec<OptionId>, CoordinatorError> {
        Ok(self
            .store
            .set_members(&keys::picks(code, pid))
            .await?
            .into_iter()
            .map(OptionId::new)
            .collect())
    }

    /// Raw picks of every given participant.
    ///
    /// # Errors
    ///
    /// Returns a store error if any lookup fails.
    pub async fn all_selections(
        &self,
        code: &SessionCode,
        pids: &[ParticipantId],
    ) -> Result<HashMap<ParticipantId, Vec<OptionId>>, CoordinatorError> {
        let mut map = HashMap::new();
        for pid in pids {
            map.insert(*pid, self.selections(code, *pid).await?);
        }
        Ok(map)
    }

    /// Computes the agreement set over the given members and persists it
    /// to the results set (callers broadcast only after this returns).
    ///
    /// With one member the overlap is their full selection; with more it
    /// is the intersection of every member's picks. Ids whose catalog
    /// record has expired are silently dropped from display mapping.
    ///
    /// # Errors
    ///
    /// Returns a store error if any lookup or the results write fails.
    pub async fn calculate_overlap(
        &self,
        code: &SessionCode,
        participants: &[Participant],
    ) -> Result<OverlapResult, CoordinatorError> {
        let pick_keys: Vec<String> = participants
            .iter()
            .map(|p| keys::picks(code, p.id))
            .collect();

        let overlapping_ids: Vec<String> = match pick_keys.as_slice() {
            [] => Vec::new(),
            [only] => self.store.set_members(only).await?,
            many => self.store.set_intersection(many).await?,
        };

        let has_overlap = !overlapping_ids.is_empty();
        if has_overlap {
            self.store
                .set_add(&keys::results(code), &overlapping_ids)
                .await?;
        }

        let overlap_ids: Vec<OptionId> = overlapping_ids
            .iter()
            .map(|s| OptionId::new(s.clone()))
            .collect();
        let overlapping = self.resolve_options(&overlap_ids).await?;

        let mut all_selections = HashMap::new();
        for participant in participants {
            let ids = self.selections(code, participant.id).await?;
            let resolved = self.resolve_options(&ids).await?;
            all_selections.insert(participant.display_name.clone(), resolved);
        }

        Ok(OverlapResult {
            overlapping,
            all_selections,
            has_overlap,
        })
    }

    /// Clears every member's picks, the submitted set, and any stored
    /// results, and resets `has_submitted` flags. Used by restart so no
    /// stale agreement data can leak into the new round.
    ///
    /// # Errors
    ///
    /// Returns a store error if any write fails.
    pub async fn clear_all(
        &self,
        code: &SessionCode,
        pids: &[ParticipantId],
    ) -> Result<(), CoordinatorError> {
        let mut doomed: Vec<String> = pids.iter().map(|pid| keys::picks(code, *pid)).collect();
        doomed.push(keys::submitted(code));
        doomed.push(keys::results(code));
        self.store.delete(&doomed).await?;
        for pid in pids {
            self.store
                .hash_set_field(&keys::member(code, *pid), "has_submitted", "0")
                .await?;
        }
        Ok(())
    }

    /// Resolves option ids to display records, dropping ids whose
    /// catalog entry is missing or expired.
    async fn resolve_options(
        &self,
        ids: &[OptionId],
    ) -> Result<Vec<CandidateOption>, CoordinatorError> {
        let mut resolved = Vec::with_capacity(ids.len());
        for id in ids {
            let Some(fields) = self.store.hash_get_all(&keys::option(id)).await? else {
                tracing::debug!(option = %id, "dropping tombstoned catalog entry");
                continue;
            };
            if let Some(option) = CandidateOption::from_fields(id.clone(), &fields) {
                resolved.push(option);
            }
        }
        Ok(resolved)
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryStore;

    fn selection_store() -> SelectionStore {
        SelectionStore::new(Arc::new(MemoryStore::new()), Duration::from_secs(3600))
    }

    fn option(id: &str, name: &str) -> CandidateOption {
        CandidateOption {
            id: OptionId::new(id),
            name: name.to_string(),
            address: None,
            rating: None,
        }
    }

    fn menu() -> Vec<CandidateOption> {
        vec![
            option("pizza", "Da Mario"),
            option("sushi", "Umi"),
            option("thai", "Baan Soi"),
        ]
    }

    async fn seeded(code: &SessionCode) -> SelectionStore {
        let store = selection_store();
        store.set_candidates(code, &menu()).await.ok();
        store
    }

    fn member(name: &str) -> Participant {
        Participant::new(ParticipantId::new(), name.to_string(), false)
    }

    fn ids(raw: &[&str]) -> Vec<OptionId> {
        raw.iter().map(|s| OptionId::new(*s)).collect()
    }

    #[tokio::test]
    async fn submit_records_picks_and_flag() {
        let code = SessionCode::generate();
        let store = seeded(&code).await;
        let pid = ParticipantId::new();

        assert!(store.submit(&code, pid, &ids(&["pizza"])).await.is_ok());
        assert_eq!(store.has_submitted(&code, pid).await.ok(), Some(true));
        assert_eq!(store.submitted_count(&code).await.ok(), Some(1));
    }

    #[tokio::test]
    async fn submit_rejects_unknown_option() {
        let code = SessionCode::generate();
        let store = seeded(&code).await;
        let result = store
            .submit(&code, ParticipantId::new(), &ids(&["pizza", "bogus"]))
            .await;
        assert!(matches!(result, Err(CoordinatorError::InvalidOptions(_))));
    }

    #[tokio::test]
    async fn second_submit_is_conflict_even_with_new_payload() {
        let code = SessionCode::generate();
        let store = seeded(&code).await;
        let pid = ParticipantId::new();

        store.submit(&code, pid, &ids(&["pizza"])).await.ok();
        let again = store.submit(&code, pid, &ids(&["sushi"])).await;
        assert!(matches!(again, Err(CoordinatorError::AlreadySubmitted)));

        // The original picks are untouched.
        let Ok(picks) = store.selections(&code, pid).await else {
            panic!("selections failed");
        };
        assert_eq!(picks, ids(&["pizza"]));
    }

    #[tokio::test]
    async fn overlap_of_two_members_is_intersection() {
        let code = SessionCode::generate();
        let store = seeded(&code).await;
        let a = member("ana");
        let b = member("ben");

        store.submit(&code, a.id, &ids(&["pizza", "sushi"])).await.ok();
        store.submit(&code, b.id, &ids(&["sushi", "thai"])).await.ok();

        let Ok(result) = store
            .calculate_overlap(&code, &[a.clone(), b.clone()])
            .await
        else {
            panic!("overlap failed");
        };
        assert!(result.has_overlap);
        assert_eq!(result.overlapping.len(), 1);
        assert_eq!(
            result.overlapping.first().map(|o| o.id.as_str()),
            Some("sushi")
        );
        assert_eq!(result.all_selections.len(), 2);
        assert_eq!(
            result.all_selections.get("ana").map(Vec::len),
            Some(2)
        );
    }

    #[tokio::test]
    async fn disjoint_picks_have_no_overlap() {
        let code = SessionCode::generate();
        let store = seeded(&code).await;
        let a = member("ana");
        let b = member("ben");

        store.submit(&code, a.id, &ids(&["pizza"])).await.ok();
        store.submit(&code, b.id, &ids(&["thai"])).await.ok();

        let Ok(result) = store.calculate_overlap(&code, &[a, b]).await else {
            panic!("overlap failed");
        };
        assert!(!result.has_overlap);
        assert!(result.overlapping.is_empty());
    }

    #[tokio::test]
    async fn lone_participant_agrees_with_themself() {
        let code = SessionCode::generate();
        let store = seeded(&code).await;
        let solo = member("solo");

        store
            .submit(&code, solo.id, &ids(&["pizza", "sushi"]))
            .await
            .ok();

        let Ok(result) = store.calculate_overlap(&code, &[solo]).await else {
            panic!("overlap failed");
        };
        assert!(result.has_overlap);
        assert_eq!(result.overlapping.len(), 2);
    }

    #[tokio::test]
    async fn tombstoned_catalog_entries_are_dropped_from_display() {
        let code = SessionCode::generate();
        let store = selection_store();
        // Candidate set contains "ghost" but the catalog record was never
        // cached (equivalent to an independently expired entry).
        store
            .set_candidates(&code, &[option("pizza", "Da Mario")])
            .await
            .ok();
        store
            .store
            .set_add(&keys::candidates(&code), &["ghost".to_string()])
            .await
            .ok();

        let solo = member("solo");
        store
            .submit(&code, solo.id, &ids(&["pizza", "ghost"]))
            .await
            .ok();

        let Ok(result) = store.calculate_overlap(&code, &[solo]).await else {
            panic!("overlap failed");
        };
        // Both ids overlap, but only the resolvable one is displayed.
        assert!(result.has_overlap);
        assert_eq!(result.overlapping.len(), 1);
    }

    #[tokio::test]
    async fn clear_all_resets_round_state() {
        let code = SessionCode::generate();
        let store = seeded(&code).await;
        let a = member("ana");
        let b = member("ben");

        store.submit(&code, a.id, &ids(&["sushi"])).await.ok();
        store.submit(&code, b.id, &ids(&["sushi"])).await.ok();
        let _ = store.calculate_overlap(&code, &[a.clone(), b.clone()]).await;

        store.clear_all(&code, &[a.id, b.id]).await.ok();
        assert_eq!(store.submitted_count(&code).await.ok(), Some(0));
        assert_eq!(store.has_submitted(&code, a.id).await.ok(), Some(false));
        let Ok(picks) = store.selections(&code, a.id).await else {
            panic!("selections failed");
        };
        assert!(picks.is_empty());

        // A fresh round can submit again.
        assert!(store.submit(&code, a.id, &ids(&["thai"])).await.is_ok());
    }
}
