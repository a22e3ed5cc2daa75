use std::sync::Arc;
use std::time::Duration;

use log::{error, info};
use tokio_util::sync::CancellationToken;

use crate::config::IndexSettings;
use crate::db::models::ChainCursor;
use crate::db::Store;
use crate::rpc::ChainSource;
use crate::worker::walker::{BlockWalker, RangeOutcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorState {
    Idle,
    Polling,
    Indexing,
    Committed,
    Failed,
    ShuttingDown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Nothing above the indexed height.
    UpToDate { indexed: u64, tip: u64 },
    /// `start..=end` indexed and committed.
    Indexed { start: u64, end: u64 },
    Cancelled,
}

/// First height to index given the configured start and the committed cursor.
///
/// With no cursor committed yet the computed start of 1 is moved back to 0,
/// so the genesis block is not skipped.
pub fn effective_start(starting_block_height: u64, cursor: &ChainCursor) -> u64 {
    let start = starting_block_height.max(cursor.last_height + 1);
    if start == 1 && cursor.is_empty() {
        0
    } else {
        start
    }
}

/// Polls the node for new blocks and indexes them until cancelled.
pub struct Monitor<C, S> {
    chain: Arc<C>,
    walker: BlockWalker<C, S>,
    starting_block_height: u64,
    idle_time: Duration,
    state: MonitorState,
}

impl<C: ChainSource, S: Store> Monitor<C, S> {
    pub fn new(chain: Arc<C>, store: Arc<S>, settings: &IndexSettings) -> Self {
        Self {
            walker: BlockWalker::new(chain.clone(), store, settings),
            chain,
            starting_block_height: settings.starting_block_height,
            idle_time: Duration::from_millis(settings.monitor_idle_time_ms),
            state: MonitorState::Idle,
        }
    }

    pub fn state(&self) -> MonitorState {
        self.state
    }

    /// Run cycles until `cancellation_token` fires. Cycle failures are
    /// logged and followed by the regular idle wait.
    pub async fn run(&mut self, cancellation_token: CancellationToken) {
        loop {
            if cancellation_token.is_cancelled() {
                break;
            }

            let result = self.cycle(&cancellation_token).await;
            if self.settle(result) {
                break;
            }

            tokio::select! {
                _ = cancellation_token.cancelled() => break,
                _ = tokio::time::sleep(self.idle_time) => {},
            }
        }

        self.state = MonitorState::ShuttingDown;
        info!("Monitor received cancellation signal, stopped");
    }

    /// Record how a cycle ended. `Failed` stays visible through the idle
    /// wait, until the next cycle starts polling. Returns true on shutdown.
    fn settle(&mut self, result: anyhow::Result<CycleOutcome>) -> bool {
        match result {
            Ok(CycleOutcome::Cancelled) => {
                self.state = MonitorState::ShuttingDown;
                return true;
            },
            Ok(_) => {
                self.state = MonitorState::Idle;
                info!("Going idle...");
            },
            Err(e) => {
                self.state = MonitorState::Failed;
                error!("Indexing failed: {:#}", e);
                info!("Going idle due to error...");
            },
        }
        false
    }

    /// One poll: compare indexed height with the tip and index the gap.
    pub async fn cycle(
        &mut self,
        cancellation_token: &CancellationToken,
    ) -> anyhow::Result<CycleOutcome> {
        self.state = MonitorState::Polling;
        info!("Checking for new blocks");

        let (cursor, tip) =
            tokio::try_join!(self.walker.indexed_cursor(), self.chain.tip_height())?;

        info!("Last indexed block height: {}", cursor.last_height);
        info!("Last chain block height: {}", tip);

        let start = effective_start(self.starting_block_height, &cursor);
        if start > tip {
            info!("No new blocks are generated.");
            return Ok(CycleOutcome::UpToDate {
                indexed: cursor.last_height,
                tip,
            });
        }

        self.state = MonitorState::Indexing;
        match self.walker.index_range(start, tip, cancellation_token).await? {
            RangeOutcome::Completed => {
                self.state = MonitorState::Committed;
                Ok(CycleOutcome::Indexed { start, end: tip })
            },
            RangeOutcome::Cancelled => {
                self.state = MonitorState::ShuttingDown;
                Ok(CycleOutcome::Cancelled)
            },
        }
    }
}
