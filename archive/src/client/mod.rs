//! Node client capability used by the export and replay engines
//!
//! The engines only ever issue one client call at a time, so implementations
//! do not need to support overlapping requests.

pub mod http;

use async_trait::async_trait;

use crate::{
    error::ClientError,
    types::{Block, Tx},
};

pub use http::HttpClient;

/// Access to a remote chain node
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Client: Send + Sync {
    /// Get the latest block height known to the node
    async fn get_latest_block_number(&self) -> Result<u64, ClientError>;

    /// Get all transactions of the given block, in block order
    async fn get_block_transactions(&self, height: u64) -> Result<Block, ClientError>;

    /// Submit a transaction for inclusion
    async fn submit_transaction(&self, tx: &Tx) -> Result<(), ClientError>;
}

#[async_trait]
impl<C: Client + ?Sized> Client for std::sync::Arc<C> {
    async fn get_latest_block_number(&self) -> Result<u64, ClientError> {
        (**self).get_latest_block_number().await
    }

    async fn get_block_transactions(&self, height: u64) -> Result<Block, ClientError> {
        (**self).get_block_transactions(height).await
    }

    async fn submit_transaction(&self, tx: &Tx) -> Result<(), ClientError> {
        (**self).submit_transaction(tx).await
    }
}
