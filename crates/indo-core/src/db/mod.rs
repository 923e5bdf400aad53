//! Local durable storage for the mutation queue

mod connection;
mod migrations;
mod queue_repository;

pub use connection::Database;
pub use queue_repository::{LibSqlMutationQueueRepository, MutationQueueRepository};
