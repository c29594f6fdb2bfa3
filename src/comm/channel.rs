//! In-process channel transport.
//!
//! Runs a whole rank group inside one process: one OS thread per rank, each
//! with exclusively owned memory, connected by a full mesh of mpsc channels.
//! Sends are buffered and never block, so a paired exchange is free of the
//! circular-wait deadlock; receives block until the peer's message arrives.

use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;

use anyhow::{anyhow, bail, Context, Result};

use super::Communicator;

/// One message between two ranks.
enum Message {
    /// A single grid row (halo exchange).
    Row(Vec<f64>),
    /// A contiguous multi-row block (scatter/gather).
    Block(Vec<f64>),
    /// A reduction operand or result.
    Flag(bool),
    Scalar(f64),
}

impl Message {
    fn kind(&self) -> &'static str {
        match self {
            Message::Row(_) => "row",
            Message::Block(_) => "block",
            Message::Flag(_) => "flag",
            Message::Scalar(_) => "scalar",
        }
    }
}

/// One rank's endpoint of the channel mesh.
///
/// `txs[p]` sends to rank `p`, `rxs[p]` receives from rank `p`. Channels are
/// FIFO per peer pair, so as long as every rank follows the same per-iteration
/// operation order, message kinds always match up.
pub struct ChannelComm {
    rank: usize,
    size: usize,
    txs: Vec<Sender<Message>>,
    rxs: Vec<Receiver<Message>>,
}

impl ChannelComm {
    /// Builds endpoints for a `size`-rank group, in rank order.
    pub fn group(size: usize) -> Vec<ChannelComm> {
        let mut senders: Vec<Vec<Sender<Message>>> =
            (0..size).map(|_| Vec::with_capacity(size)).collect();
        let mut receivers: Vec<Vec<Option<Receiver<Message>>>> =
            (0..size).map(|_| (0..size).map(|_| None).collect()).collect();

        for from in 0..size {
            for to in 0..size {
                let (tx, rx) = mpsc::channel();
                senders[from].push(tx);
                receivers[to][from] = Some(rx);
            }
        }

        senders
            .into_iter()
            .zip(receivers)
            .enumerate()
            .map(|(rank, (txs, rxs))| ChannelComm {
                rank,
                size,
                txs,
                rxs: rxs.into_iter().flatten().collect(),
            })
            .collect()
    }

    fn send(&self, to: usize, message: Message) -> Result<()> {
        if to >= self.size {
            bail!("rank {to} is outside the group of {}", self.size);
        }
        self.txs[to]
            .send(message)
            .map_err(|_| anyhow!("rank {to} disconnected"))
    }

    fn recv(&self, from: usize) -> Result<Message> {
        if from >= self.size {
            bail!("rank {from} is outside the group of {}", self.size);
        }
        self.rxs[from]
            .recv()
            .map_err(|_| anyhow!("rank {from} disconnected"))
    }
}

impl Communicator for ChannelComm {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }

    fn send_block(&self, to: usize, data: Vec<f64>) -> Result<()> {
        self.send(to, Message::Block(data))
    }

    fn recv_block(&self, from: usize) -> Result<Vec<f64>> {
        match self.recv(from)? {
            Message::Block(data) => Ok(data),
            other => bail!(
                "protocol error: expected block from rank {from}, got {}",
                other.kind()
            ),
        }
    }

    fn send_recv_row(&self, peer: usize, row: &[f64]) -> Result<Vec<f64>> {
        self.send(peer, Message::Row(row.to_vec()))?;
        match self.recv(peer)? {
            Message::Row(data) => Ok(data),
            other => bail!(
                "protocol error: expected row from rank {peer}, got {}",
                other.kind()
            ),
        }
    }

    fn all_reduce_and(&self, value: bool) -> Result<bool> {
        if self.size == 1 {
            return Ok(value);
        }
        if self.rank == 0 {
            let mut combined = value;
            for from in 1..self.size {
                match self.recv(from)? {
                    Message::Flag(flag) => combined &= flag,
                    other => bail!(
                        "protocol error: expected flag from rank {from}, got {}",
                        other.kind()
                    ),
                }
            }
            for to in 1..self.size {
                self.send(to, Message::Flag(combined))?;
            }
            Ok(combined)
        } else {
            self.send(0, Message::Flag(value))?;
            match self.recv(0)? {
                Message::Flag(combined) => Ok(combined),
                other => bail!(
                    "protocol error: expected flag from rank 0, got {}",
                    other.kind()
                ),
            }
        }
    }

    fn all_reduce_sum(&self, value: f64) -> Result<f64> {
        if self.size == 1 {
            return Ok(value);
        }
        if self.rank == 0 {
            let mut sum = value;
            for from in 1..self.size {
                match self.recv(from)? {
                    Message::Scalar(x) => sum += x,
                    other => bail!(
                        "protocol error: expected scalar from rank {from}, got {}",
                        other.kind()
                    ),
                }
            }
            for to in 1..self.size {
                self.send(to, Message::Scalar(sum))?;
            }
            Ok(sum)
        } else {
            self.send(0, Message::Scalar(value))?;
            match self.recv(0)? {
                Message::Scalar(sum) => Ok(sum),
                other => bail!(
                    "protocol error: expected scalar from rank 0, got {}",
                    other.kind()
                ),
            }
        }
    }

    fn gather_blocks(&self, block: Vec<f64>) -> Result<Option<Vec<Vec<f64>>>> {
        if self.rank == 0 {
            let mut blocks = Vec::with_capacity(self.size);
            blocks.push(block);
            for from in 1..self.size {
                blocks.push(self.recv_block(from)?);
            }
            Ok(Some(blocks))
        } else {
            self.send_block(0, block)?;
            Ok(None)
        }
    }
}

/// Runs `task` once per rank, each on its own thread, over a fresh channel
/// group. Returns the per-rank results in rank order.
///
/// A rank that fails tears down its endpoints, which unblocks any peer
/// waiting on it with a disconnection error.
pub fn run_ranks<T, F>(size: usize, task: F) -> Result<Vec<T>>
where
    T: Send,
    F: Fn(ChannelComm) -> Result<T> + Send + Sync,
{
    if size == 0 {
        bail!("cannot run a group of zero ranks");
    }
    let endpoints = ChannelComm::group(size);

    let results: Vec<Result<T>> = thread::scope(|scope| {
        let task = &task;
        let handles: Vec<_> = endpoints
            .into_iter()
            .map(|comm| scope.spawn(move || task(comm)))
            .collect();
        handles
            .into_iter()
            .map(|handle| match handle.join() {
                Ok(result) => result,
                Err(_) => Err(anyhow!("rank thread panicked")),
            })
            .collect()
    });

    results
        .into_iter()
        .enumerate()
        .map(|(rank, result)| result.with_context(|| format!("rank {rank} failed")))
        .collect()
}
