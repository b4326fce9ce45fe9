//! Tollgate core library.
//!
//! This library provides the types and collaborator contracts shared by the Tollgate
//! access-control engine: wallet identities, access decisions, the [`PaymentAgent`](agent::PaymentAgent)
//! interface, the read-only [`TierOracle`](ledger::TierOracle), sealed browse session tokens
//! and the gate configuration.

pub mod agent;
pub mod config;
pub mod errors;
pub mod ledger;
pub mod token;
pub mod types;

#[cfg(feature = "agent-client")]
pub mod agent_client;
