//! Chain module - RPC-backed capabilities consumed by the executor
//!
//! This module provides:
//! - Fee data snapshots and receipt polling over an ethers middleware
//! - The Safe contract binding and its capability trait

pub mod provider;
pub mod safe;

pub use provider::{fee_data_from, ChainProvider, FeeDataSource};
pub use safe::{Operation, SafeClient, SafeContract, SafeTransaction};
