//! Subcommand implementations.

pub mod compare;
pub mod embed;
pub mod extract;
pub mod fingerprint;
pub mod ledger;
