//! Zustand einer TCP-Commander-Verbindung

use std::net::SocketAddr;

use uuid::Uuid;

use crate::auth::Bediener;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionZustand {
    /// Verbunden, aber noch nicht angemeldet
    Unauthentifiziert,
    Authentifiziert,
    /// Verbindung wird nach der aktuellen Antwort geschlossen
    Beendend,
}

#[derive(Debug)]
pub struct TcpSession {
    pub id: Uuid,
    pub zustand: SessionZustand,
    pub bediener: Option<Bediener>,
    pub client_addr: SocketAddr,
}

impl TcpSession {
    pub fn neu(client_addr: SocketAddr) -> Self {
        Self {
            id: Uuid::new_v4(),
            zustand: SessionZustand::Unauthentifiziert,
            bediener: None,
            client_addr,
        }
    }

    pub fn ist_authentifiziert(&self) -> bool {
        self.zustand == SessionZustand::Authentifiziert
    }

    pub fn anmelden(&mut self, bediener: Bediener) {
        self.bediener = Some(bediener);
        self.zustand = SessionZustand::Authentifiziert;
    }

    pub fn beenden(&mut self) {
        self.zustand = SessionZustand::Beendend;
    }

    pub fn ist_beendend(&self) -> bool {
        self.zustand == SessionZustand::Beendend
    }

    /// Operator-Kennung fuer Befehle, die ihn ausnehmen
    pub fn operator(&self) -> Option<vcsync_core::UserId> {
        self.bediener.as_ref().and_then(|b| b.operator)
    }
}
