// ============================================================================
// Quota Reservations
// ============================================================================
//
// Tentative storage-capacity holds, created at validation time and
// confirmed or released exactly once on the command's terminal outcome.
// The check is best-effort against the authoritative capacity figure read
// at reservation time; racing reservations on one quota id are serialized
// by the ledger lock, so two commands can never both fit into the last
// remaining bytes.

use crate::core::{CommandId, EngineError, QuotaId, ReservationId, Result};
use crate::gates::QuotaAuthority;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReservationState {
    /// Tentative hold; counts against the quota
    Held,

    /// Confirmed on END_SUCCESS; still counts against the quota
    Consumed,

    /// Released on END_FAILURE or validation failure
    Released,
}

impl ReservationState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ReservationState::Consumed | ReservationState::Released)
    }
}

/// One tentative hold: quota id + owning command + fixed byte amount.
/// The amount is set at validation time and never renegotiated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuotaReservation {
    pub id: ReservationId,
    pub quota: QuotaId,
    pub command: CommandId,
    pub bytes: u64,
    pub state: ReservationState,
}

pub struct QuotaLedger {
    reservations: RwLock<HashMap<ReservationId, QuotaReservation>>,
    authority: Arc<dyn QuotaAuthority>,
}

impl QuotaLedger {
    pub fn new(authority: Arc<dyn QuotaAuthority>) -> Self {
        Self {
            reservations: RwLock::new(HashMap::new()),
            authority,
        }
    }

    /// Place a hold of `bytes` on `quota` for `command`.
    ///
    /// Fails with `QuotaExceeded` when the amount does not fit into the
    /// remaining budget at reservation time. The authority lookup happens
    /// under the ledger write lock so concurrent reservations on the same
    /// quota observe each other.
    pub async fn reserve(
        &self,
        quota: QuotaId,
        command: CommandId,
        bytes: u64,
    ) -> Result<QuotaReservation> {
        let mut reservations = self.reservations.write().await;

        let capacity = self
            .authority
            .capacity(&quota)
            .await
            .map_err(|e| EngineError::Validation(format!("quota capacity lookup failed: {e}")))?;

        let held: u64 = reservations
            .values()
            .filter(|r| r.quota == quota && !matches!(r.state, ReservationState::Released))
            .map(|r| r.bytes)
            .sum();
        let available = capacity.saturating_sub(held);

        if bytes > available {
            return Err(EngineError::QuotaExceeded {
                quota: quota.to_string(),
                requested: bytes,
                available,
            });
        }

        let reservation = QuotaReservation {
            id: ReservationId::new(),
            quota,
            command,
            bytes,
            state: ReservationState::Held,
        };
        reservations.insert(reservation.id, reservation.clone());
        Ok(reservation)
    }

    /// Confirm a hold on END_SUCCESS. Idempotent; confirming a released
    /// reservation is a logged no-op, never a corruption.
    pub async fn confirm(&self, id: ReservationId) -> Result<()> {
        self.close(id, ReservationState::Consumed).await
    }

    /// Release a hold on END_FAILURE. Idempotent, same discipline as
    /// `confirm`.
    pub async fn release(&self, id: ReservationId) -> Result<()> {
        self.close(id, ReservationState::Released).await
    }

    async fn close(&self, id: ReservationId, target: ReservationState) -> Result<()> {
        let mut reservations = self.reservations.write().await;
        let reservation = reservations
            .get_mut(&id)
            .ok_or(EngineError::ReservationNotFound(id))?;
        match reservation.state {
            ReservationState::Held => {
                reservation.state = target;
                Ok(())
            }
            state if state == target => Ok(()),
            state => {
                warn!(
                    reservation = %id,
                    current = ?state,
                    requested = ?target,
                    "conflicting terminal disposition for reservation ignored"
                );
                Ok(())
            }
        }
    }

    pub async fn get(&self, id: ReservationId) -> Option<QuotaReservation> {
        self.reservations.read().await.get(&id).cloned()
    }

    /// Bytes currently counting against a quota (held + consumed)
    pub async fn charged(&self, quota: &QuotaId) -> u64 {
        self.reservations
            .read()
            .await
            .values()
            .filter(|r| r.quota == *quota && !matches!(r.state, ReservationState::Released))
            .map(|r| r.bytes)
            .sum()
    }

    /// Full dump for checkpointing
    pub async fn dump(&self) -> HashMap<ReservationId, QuotaReservation> {
        self.reservations.read().await.clone()
    }

    /// Load recovered reservations, replacing any current content
    pub async fn hydrate(&self, items: impl IntoIterator<Item = QuotaReservation>) {
        let mut reservations = self.reservations.write().await;
        reservations.clear();
        for reservation in items {
            reservations.insert(reservation.id, reservation);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gates::memory::FixedQuotaAuthority;

    fn ledger(capacity: u64) -> QuotaLedger {
        let authority = FixedQuotaAuthority::new([("gold", capacity)]);
        QuotaLedger::new(Arc::new(authority))
    }

    #[tokio::test]
    async fn test_reserve_within_budget() {
        let ledger = ledger(100);
        let reservation = ledger
            .reserve(QuotaId::from("gold"), CommandId::new(), 60)
            .await
            .unwrap();
        assert_eq!(reservation.state, ReservationState::Held);
        assert_eq!(ledger.charged(&QuotaId::from("gold")).await, 60);
    }

    #[tokio::test]
    async fn test_reserve_over_budget_fails() {
        let ledger = ledger(100);
        ledger
            .reserve(QuotaId::from("gold"), CommandId::new(), 60)
            .await
            .unwrap();
        let err = ledger
            .reserve(QuotaId::from("gold"), CommandId::new(), 60)
            .await
            .unwrap_err();
        match err {
            EngineError::QuotaExceeded {
                requested,
                available,
                ..
            } => {
                assert_eq!(requested, 60);
                assert_eq!(available, 40);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_release_frees_budget() {
        let ledger = ledger(100);
        let reservation = ledger
            .reserve(QuotaId::from("gold"), CommandId::new(), 60)
            .await
            .unwrap();
        ledger.release(reservation.id).await.unwrap();
        assert_eq!(ledger.charged(&QuotaId::from("gold")).await, 0);
        // Freed budget is reservable again
        ledger
            .reserve(QuotaId::from("gold"), CommandId::new(), 100)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_confirm_keeps_budget_charged() {
        let ledger = ledger(100);
        let reservation = ledger
            .reserve(QuotaId::from("gold"), CommandId::new(), 60)
            .await
            .unwrap();
        ledger.confirm(reservation.id).await.unwrap();
        assert_eq!(ledger.charged(&QuotaId::from("gold")).await, 60);
        assert_eq!(
            ledger.get(reservation.id).await.unwrap().state,
            ReservationState::Consumed
        );
    }

    #[tokio::test]
    async fn test_terminal_disposition_is_idempotent() {
        let ledger = ledger(100);
        let reservation = ledger
            .reserve(QuotaId::from("gold"), CommandId::new(), 60)
            .await
            .unwrap();

        ledger.confirm(reservation.id).await.unwrap();
        ledger.confirm(reservation.id).await.unwrap();
        // Conflicting disposition after a terminal one must not corrupt
        ledger.release(reservation.id).await.unwrap();
        assert_eq!(
            ledger.get(reservation.id).await.unwrap().state,
            ReservationState::Consumed
        );
    }
}
