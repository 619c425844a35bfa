//! `registrar-core`: domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns):
//! identifiers, the shared error taxonomy, aggregate traits and money.

pub mod aggregate;
pub mod error;
pub mod event;
pub mod id;
pub mod money;
pub mod value_object;

pub use aggregate::{Aggregate, AggregateRoot, ExpectedVersion};
pub use error::DomainError;
pub use event::Event;
pub use id::{DocumentId, FeeId, UserId};
pub use money::Money;
pub use value_object::ValueObject;
