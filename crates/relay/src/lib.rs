//! vcsync-relay – Kern des Sprach-Relais
//!
//! Leitet Sprache aus einem Quellkanal gemischt in einen Zielkanal:
//! - [`controller`] – Zustandsautomat, genau eine Sitzung pro Prozess
//! - [`session`] – besitzt Verbindungen, Mischpult, Ausgang und Verfolger
//! - [`tracker`] – Sprech-Ereignisse -> Teilnehmer-Pipelines
//! - [`pipeline`] – Rohstrom eines Sprechers -> Dekoder -> Mischpult-Eingang
//! - [`publisher`] – Mischpult -> Zielverbindung

pub mod controller;
pub mod error;
pub mod konfig;
pub mod pipeline;
pub mod publisher;
pub mod session;
pub mod tracker;

pub use controller::{
    RelaisStatus, RelaisSteuerung, RelaisZustand, StartErgebnis, StoppAnlass, StoppErgebnis,
};
pub use error::{FehlerKlasse, RelaisError, RelaisResult};
pub use konfig::RelaisKonfig;
pub use pipeline::{EndeGrund, PipelineAbschluss, TeilnehmerPipeline};
pub use publisher::Herausgeber;
pub use session::Sitzung;
pub use tracker::{AbbauBericht, TeilnehmerVerfolger, VerfolgerHandle};
