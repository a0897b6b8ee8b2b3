//! Error types for the delegation agent

use alloy::primitives::{Address, U256};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("{0} not found")]
    NotFound(String),

    #[error("delegate {0} already exists")]
    AlreadyExists(Address),

    #[error("spending limit must be greater than 0")]
    InvalidLimit,

    #[error("new limit {new_limit} is below spent amount {spent}")]
    LimitBelowSpent { new_limit: U256, spent: U256 },

    #[error("delegate {0} is not active")]
    NotActive(Address),

    #[error("operation '{tag}' not allowed for delegate {delegate}")]
    OperationNotAllowed { delegate: Address, tag: String },

    #[error(
        "spending quota exceeded for delegate {delegate}: \
         spent {spent} + value {value} > limit {limit}"
    )]
    QuotaExceeded {
        delegate: Address,
        spent: U256,
        value: U256,
        limit: U256,
    },

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("forwarding failed: {0}")]
    ForwardingFailed(String),

    #[error("forwarding timed out after {0} ms")]
    ForwardingTimeout(u64),

    #[error("caller {caller} is not the owner of delegate {delegate}")]
    Unauthorized { caller: Address, delegate: Address },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
