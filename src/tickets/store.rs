use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::shared::fs::write_atomic;

use super::lifecycle::{apply_update, new_ticket};
use super::types::{NewTicket, Ticket, TicketUpdate};

const ID_PREFIX: &str = "TKT-";

/// Storage seam for tickets. Lifecycle logic only talks to this trait so a
/// durable backend can replace the bundled one.
#[async_trait]
pub trait TicketRepository: Send + Sync {
    async fn create(&self, new: NewTicket) -> Result<Ticket>;
    async fn get(&self, id: &str) -> Result<Option<Ticket>>;
    /// Newest first.
    async fn list(&self) -> Result<Vec<Ticket>>;
    /// `Ok(None)` when the id is unknown.
    async fn update(&self, id: &str, update: TicketUpdate) -> Result<Option<Ticket>>;

    async fn list_for_student(&self, student_id: &str) -> Result<Vec<Ticket>> {
        let tickets = self.list().await?;
        Ok(tickets
            .into_iter()
            .filter(|t| t.student_id == student_id)
            .collect())
    }
}

#[derive(Debug, Default)]
struct StoreInner {
    tickets: Vec<Ticket>,
    next_seq: u64,
}

impl StoreInner {
    fn from_tickets(tickets: Vec<Ticket>) -> Self {
        let highest = tickets
            .iter()
            .filter_map(|t| parse_seq(&t.id))
            .max()
            .unwrap_or(0);
        Self {
            tickets,
            next_seq: highest + 1,
        }
    }

    /// Next id without reserving it; the counter only moves once a create
    /// has been persisted.
    fn peek_id(&self) -> (u64, String) {
        let seq = self.next_seq.max(1);
        (seq, format!("{ID_PREFIX}{seq:03}"))
    }
}

fn parse_seq(id: &str) -> Option<u64> {
    id.strip_prefix(ID_PREFIX)?.parse().ok()
}

/// Tickets held in memory, optionally mirrored to a JSON snapshot file that
/// is rewritten after every change.
#[derive(Debug)]
pub struct TicketStore {
    inner: RwLock<StoreInner>,
    snapshot: Option<PathBuf>,
}

impl TicketStore {
    pub fn in_memory() -> Self {
        Self {
            inner: RwLock::new(StoreInner {
                tickets: Vec::new(),
                next_seq: 1,
            }),
            snapshot: None,
        }
    }

    pub fn with_tickets(tickets: Vec<Ticket>) -> Self {
        Self {
            inner: RwLock::new(StoreInner::from_tickets(tickets)),
            snapshot: None,
        }
    }

    /// Opens (or starts) a snapshot file. A missing file is an empty store.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let tickets: Vec<Ticket> = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .with_context(|| format!("Failed to parse ticket snapshot {}", path.display()))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("Failed to read ticket snapshot {}", path.display()))
            }
        };
        info!("Loaded {} tickets from {}", tickets.len(), path.display());
        Ok(Self {
            inner: RwLock::new(StoreInner::from_tickets(tickets)),
            snapshot: Some(path),
        })
    }

    async fn persist(&self, tickets: &[Ticket]) -> Result<()> {
        let Some(path) = &self.snapshot else {
            return Ok(());
        };
        let json = serde_json::to_vec_pretty(tickets)?;
        write_atomic(path, &json).await?;
        debug!("Persisted {} tickets to {}", tickets.len(), path.display());
        Ok(())
    }
}

#[async_trait]
impl TicketRepository for TicketStore {
    async fn create(&self, new: NewTicket) -> Result<Ticket> {
        let mut inner = self.inner.write().await;
        let (seq, id) = inner.peek_id();
        let ticket = new_ticket(id, new, Utc::now());

        let mut candidate = inner.tickets.clone();
        candidate.push(ticket.clone());
        self.persist(&candidate).await?;

        inner.tickets = candidate;
        inner.next_seq = seq + 1;
        Ok(ticket)
    }

    async fn get(&self, id: &str) -> Result<Option<Ticket>> {
        let inner = self.inner.read().await;
        Ok(inner.tickets.iter().find(|t| t.id == id).cloned())
    }

    async fn list(&self) -> Result<Vec<Ticket>> {
        let mut tickets = self.inner.read().await.tickets.clone();
        // Stable sort keeps insertion order among equal timestamps; reverse
        // afterwards so later inserts win ties.
        tickets.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        tickets.reverse();
        Ok(tickets)
    }

    async fn update(&self, id: &str, update: TicketUpdate) -> Result<Option<Ticket>> {
        let mut inner = self.inner.write().await;
        let Some(pos) = inner.tickets.iter().position(|t| t.id == id) else {
            return Ok(None);
        };

        let mut candidate = inner.tickets.clone();
        apply_update(&mut candidate[pos], update, Utc::now());
        let updated = candidate[pos].clone();
        self.persist(&candidate).await?;

        inner.tickets = candidate;
        Ok(Some(updated))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tickets::types::{IssueCategory, TicketStatus};

    fn submission(student_id: &str) -> NewTicket {
        NewTicket {
            student_id: student_id.into(),
            student_name: "Marcus Lee".into(),
            student_email: "marcus.lee@school.edu".into(),
            device_type: "HP Silver".into(),
            issue_description: "Keyboard keys not responding".into(),
            issue_category: Some(IssueCategory::Hardware),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_create_assigns_sequential_ids_and_open_status() {
        let store = TicketStore::in_memory();
        let first = store.create(submission("STU-1")).await.unwrap();
        let second = store.create(submission("STU-2")).await.unwrap();

        assert_eq!(first.id, "TKT-001");
        assert_eq!(second.id, "TKT-002");
        assert_eq!(first.status, TicketStatus::Open);
        assert_eq!(first.created_at, first.updated_at);
    }

    #[tokio::test]
    async fn test_list_is_newest_first() {
        let store = TicketStore::in_memory();
        for n in 0..3 {
            store.create(submission(&format!("STU-{n}"))).await.unwrap();
        }
        let ids: Vec<String> = store.list().await.unwrap().into_iter().map(|t| t.id).collect();
        assert_eq!(ids, vec!["TKT-003", "TKT-002", "TKT-001"]);
    }

    #[tokio::test]
    async fn test_update_unknown_id_is_none() {
        let store = TicketStore::in_memory();
        let result = store
            .update(
                "TKT-404",
                TicketUpdate {
                    status: Some(TicketStatus::Closed),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_update_keeps_id_and_ordering_invariant() {
        let store = TicketStore::in_memory();
        let created = store.create(submission("STU-1")).await.unwrap();
        let updated = store
            .update(
                &created.id,
                TicketUpdate {
                    status: Some(TicketStatus::Assigned),
                    assigned_engineer: Some("eng-essam".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap()
            .unwrap();

        assert_eq!(updated.id, created.id);
        assert_eq!(updated.status, TicketStatus::Assigned);
        assert!(updated.updated_at >= updated.created_at);
        assert_eq!(store.get(&created.id).await.unwrap(), Some(updated));
    }

    #[tokio::test]
    async fn test_concurrent_creates_never_share_an_id() {
        let store = std::sync::Arc::new(TicketStore::in_memory());
        let mut handles = Vec::new();
        for n in 0..20 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.create(submission(&format!("STU-{n}"))).await.unwrap().id
            }));
        }
        let mut ids = Vec::new();
        for handle in handles {
            ids.push(handle.await.unwrap());
        }
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 20);
    }

    #[tokio::test]
    async fn test_snapshot_survives_reopen_and_continues_sequence() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tickets.json");

        let store = TicketStore::open(&path).await.unwrap();
        store.create(submission("STU-1")).await.unwrap();
        store.create(submission("STU-2")).await.unwrap();
        drop(store);

        let reopened = TicketStore::open(&path).await.unwrap();
        assert_eq!(reopened.list().await.unwrap().len(), 2);
        let third = reopened.create(submission("STU-3")).await.unwrap();
        assert_eq!(third.id, "TKT-003");

        let mine = reopened.list_for_student("STU-2").await.unwrap();
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].id, "TKT-002");
    }

    #[tokio::test]
    async fn test_failed_snapshot_write_leaves_store_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("tickets.json");
        let store = TicketStore::open(&path).await.unwrap();

        assert!(store.create(submission("STU-1")).await.is_err());
        assert!(store.create(submission("STU-2")).await.is_err());
        assert!(store.list().await.unwrap().is_empty());

        tokio::fs::create_dir(dir.path().join("missing")).await.unwrap();
        let created = store.create(submission("STU-3")).await.unwrap();
        assert_eq!(created.id, "TKT-001");

        tokio::fs::remove_dir_all(dir.path().join("missing")).await.unwrap();
        let closing = TicketUpdate {
            status: Some(TicketStatus::Closed),
            ..Default::default()
        };
        assert!(store.update(&created.id, closing).await.is_err());
        assert_eq!(store.get(&created.id).await.unwrap(), Some(created));
    }
}
