use crate::error::Result;
use crate::storage::{StorageKey, StoragePort};
use crate::types::DrawNumber;

const NAMESPACE: &str = "lottery";
const TICKET_NUMBER: &str = "ticket_number";
const DISPLAY_NAME: &str = "display_name";
const EVENT_SESSION_ID: &str = "event_session_id";
const SESSION_TOKEN: &str = "session_token";

/// Audience-side view of the `lottery` namespace.
pub struct TicketStore<'a> {
    storage: &'a dyn StoragePort,
}

impl<'a> TicketStore<'a> {
    pub fn new(storage: &'a dyn StoragePort) -> Self {
        Self { storage }
    }

    fn key(name: &str) -> StorageKey {
        StorageKey::new(NAMESPACE, name)
    }

    /// Stored ticket, if any. A corrupt value is treated as absent.
    pub fn ticket(&self) -> Result<Option<DrawNumber>> {
        let raw = self.storage.get(&Self::key(TICKET_NUMBER))?;
        Ok(raw
            .and_then(|s| s.trim().parse::<u16>().ok())
            .and_then(|n| DrawNumber::new(n).ok()))
    }

    pub fn save_ticket(&self, number: DrawNumber) -> Result<()> {
        self.storage
            .set(&Self::key(TICKET_NUMBER), &number.value().to_string())
    }

    pub fn display_name(&self) -> Result<Option<String>> {
        self.storage.get(&Self::key(DISPLAY_NAME))
    }

    pub fn save_display_name(&self, name: &str) -> Result<()> {
        self.storage.set(&Self::key(DISPLAY_NAME), name)
    }

    pub fn event_session_id(&self) -> Result<Option<String>> {
        self.storage.get(&Self::key(EVENT_SESSION_ID))
    }

    pub fn save_event_session_id(&self, id: &str) -> Result<()> {
        self.storage.set(&Self::key(EVENT_SESSION_ID), id)
    }

    /// Token the registry issued with the ticket; presenting it again
    /// returns the same number.
    pub fn session_token(&self) -> Result<Option<String>> {
        self.storage.get(&Self::key(SESSION_TOKEN))
    }

    pub fn save_session_token(&self, token: &str) -> Result<()> {
        self.storage.set(&Self::key(SESSION_TOKEN), token)
    }

    pub fn clear(&self) -> Result<()> {
        for name in [TICKET_NUMBER, DISPLAY_NAME, EVENT_SESSION_ID, SESSION_TOKEN] {
            self.storage.remove(&Self::key(name))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    #[test]
    fn test_ticket_roundtrip_and_clear() {
        let memory = MemoryStore::new();
        let tickets = TicketStore::new(&memory);

        assert_eq!(tickets.ticket().unwrap(), None);
        tickets.save_ticket(DrawNumber::new(42).unwrap()).unwrap();
        tickets.save_event_session_id("s-1").unwrap();
        tickets.save_session_token("tok-1").unwrap();
        assert_eq!(tickets.ticket().unwrap(), Some(DrawNumber::new(42).unwrap()));

        tickets.clear().unwrap();
        assert_eq!(tickets.ticket().unwrap(), None);
        assert_eq!(tickets.event_session_id().unwrap(), None);
        assert_eq!(tickets.session_token().unwrap(), None);
    }

    #[test]
    fn test_corrupt_ticket_reads_as_absent() {
        let memory = MemoryStore::new();
        memory
            .set(&StorageKey::new("lottery", "ticket_number"), "abc")
            .unwrap();
        assert_eq!(TicketStore::new(&memory).ticket().unwrap(), None);
    }
}
