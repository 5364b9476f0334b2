//! Test utilities and helpers
//!
//! An in-memory chain standing in for a node, plus archive fixtures.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::io;
use std::path::Path;
use std::pin::Pin;
use std::sync::Mutex;
use std::task::{Context, Poll};

use async_trait::async_trait;
use serde_json::json;
use tokio::io::AsyncWrite;
use tokio_util::sync::CancellationToken;

use tx_archive::{Block, Client, ClientError, Tx, TxData};

/// Block time reported for every block, in unix milliseconds
pub const BLOCK_TIME_MS: i64 = 1_700_000_000_000;

/// In-memory chain implementing [`Client`]
#[derive(Default)]
pub struct TestChain {
    blocks: Mutex<HashMap<u64, Vec<Tx>>>,
    heights: Mutex<VecDeque<u64>>,
    latest_calls: Mutex<usize>,
    fetched: Mutex<Vec<u64>>,
    submitted: Mutex<Vec<Tx>>,
    fail_latest_at: Option<usize>,
    fail_fetch_at: Option<u64>,
    fail_submit_at: Option<usize>,
    cancel_on_fetch: Option<(u64, CancellationToken)>,
    cancel_when_drained: Option<CancellationToken>,
}

impl TestChain {
    /// Chain at a fixed latest height
    pub fn new(latest: u64) -> Self {
        Self::with_heights([latest])
    }

    /// Chain reporting the given latest heights in turn, repeating the last one
    pub fn with_heights(heights: impl IntoIterator<Item = u64>) -> Self {
        Self {
            heights: Mutex::new(heights.into_iter().collect()),
            ..Default::default()
        }
    }

    /// Put transactions into a block
    pub fn with_block(self, height: u64, txs: Vec<Tx>) -> Self {
        self.blocks.lock().unwrap().insert(height, txs);
        self
    }

    /// Fail the n-th latest height query, counting from zero
    pub fn fail_latest_at(mut self, call: usize) -> Self {
        self.fail_latest_at = Some(call);
        self
    }

    /// Fail fetching the given block
    pub fn fail_fetch_at(mut self, height: u64) -> Self {
        self.fail_fetch_at = Some(height);
        self
    }

    /// Reject the n-th submitted transaction, counting from zero
    pub fn fail_submit_at(mut self, index: usize) -> Self {
        self.fail_submit_at = Some(index);
        self
    }

    /// Cancel the token once the given block has been fetched
    pub fn cancel_on_fetch(mut self, height: u64, cancel: CancellationToken) -> Self {
        self.cancel_on_fetch = Some((height, cancel));
        self
    }

    /// Cancel the token once the last scripted height has been reported
    pub fn cancel_when_drained(mut self, cancel: CancellationToken) -> Self {
        self.cancel_when_drained = Some(cancel);
        self
    }

    /// Blocks fetched so far, in fetch order
    pub fn fetched(&self) -> Vec<u64> {
        self.fetched.lock().unwrap().clone()
    }

    /// Transactions submitted so far, in submission order
    pub fn submitted(&self) -> Vec<Tx> {
        self.submitted.lock().unwrap().clone()
    }
}

#[async_trait]
impl Client for TestChain {
    async fn get_latest_block_number(&self) -> Result<u64, ClientError> {
        let call = {
            let mut calls = self.latest_calls.lock().unwrap();
            *calls += 1;
            *calls - 1
        };
        if self.fail_latest_at == Some(call) {
            return Err(ClientError::invalid_response("status unavailable"));
        }

        let mut heights = self.heights.lock().unwrap();

        if heights.len() > 1 {
            return Ok(heights.pop_front().unwrap());
        }

        if let Some(cancel) = &self.cancel_when_drained {
            cancel.cancel();
        }
        heights
            .front()
            .copied()
            .ok_or_else(|| ClientError::invalid_response("no height scripted"))
    }

    async fn get_block_transactions(&self, height: u64) -> Result<Block, ClientError> {
        if self.fail_fetch_at == Some(height) {
            return Err(ClientError::invalid_response(format!("block {height} unavailable")));
        }

        self.fetched.lock().unwrap().push(height);
        if let Some((at, cancel)) = &self.cancel_on_fetch {
            if *at == height {
                cancel.cancel();
            }
        }

        Ok(Block {
            height,
            timestamp: Some(BLOCK_TIME_MS + height as i64 * 1000),
            txs: self.blocks.lock().unwrap().get(&height).cloned().unwrap_or_default(),
        })
    }

    async fn submit_transaction(&self, tx: &Tx) -> Result<(), ClientError> {
        let mut submitted = self.submitted.lock().unwrap();

        if self.fail_submit_at == Some(submitted.len()) {
            return Err(ClientError::Rejected {
                code: 4,
                log: "signature verification failed".into(),
            });
        }

        submitted.push(tx.clone());
        Ok(())
    }
}

/// Writer that fails every write, like a full disk
pub struct BrokenWriter;

impl AsyncWrite for BrokenWriter {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        _buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Poll::Ready(Err(io::Error::new(io::ErrorKind::Other, "no space left on device")))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

/// Transaction payload identified by its memo
pub fn tx(memo: &str) -> Tx {
    Tx::from_value(json!({
        "msg": [{"@type": "/bank.MsgSend", "amount": "1ugnot"}],
        "memo": memo,
    }))
    .unwrap()
}

/// Memo of a transaction built with [`tx`]
pub fn memo(tx: &Tx) -> String {
    tx.fields()["memo"].as_str().unwrap().to_string()
}

/// Parse every line of a standard archive
pub fn read_archive(path: &Path) -> Vec<TxData> {
    std::fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect()
}

/// Write a standard archive with the given records
pub fn write_archive(path: &Path, records: &[TxData]) {
    let mut contents = String::new();
    for record in records {
        contents.push_str(&serde_json::to_string(record).unwrap());
        contents.push('\n');
    }
    std::fs::write(path, contents).unwrap();
}
