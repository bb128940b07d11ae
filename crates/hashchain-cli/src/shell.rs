//! Interactive menu over stdin/stdout.

use std::io::Write;
use std::time::Duration;

use anyhow::Result;
use hashchain_core::constants::DEFAULT_EXPORT_FILE;
use hashchain_core::{Chain, ChainError, SharedChain};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, Lines};
use tokio::sync::mpsc;

use crate::render;

const MENU: &str = "\
Actions:
  1) Add Block
  2) View Blockchain
  3) Search Blockchain
  4) Check Chain Integrity
  5) Tamper with Block
  6) Save to File
  7) Load from File
  q) Quit (Ctrl-C also quits at a prompt and cancels a running search)";

enum Interrupt {
    CtrlC,
    Deadline(Duration),
}

pub struct Shell<R, W> {
    chain: SharedChain,
    input: Lines<R>,
    out: W,
    mining_timeout: Option<Duration>,
    colored: bool,
    /// Ctrl-C presses, forwarded from a single signal listener.
    interrupts: Option<mpsc::Receiver<()>>,
    interrupted: bool,
}

impl<R, W> Shell<R, W>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    pub fn new(chain: SharedChain, input: R, out: W) -> Self {
        Self {
            chain,
            input: input.lines(),
            out,
            mining_timeout: None,
            colored: false,
            interrupts: None,
            interrupted: false,
        }
    }

    pub fn with_mining_timeout(mut self, limit: Option<Duration>) -> Self {
        self.mining_timeout = limit;
        self
    }

    pub fn with_color(mut self, colored: bool) -> Self {
        self.colored = colored;
        self
    }

    pub fn with_interrupts(mut self, interrupts: mpsc::Receiver<()>) -> Self {
        self.interrupts = Some(interrupts);
        self
    }

    /// Runs until `q`, end of input, or an interrupt at a prompt.
    pub async fn run(&mut self) -> Result<()> {
        loop {
            if self.interrupted {
                writeln!(self.out, "Interrupted.")?;
                break;
            }
            writeln!(self.out, "{MENU}")?;
            let Some(choice) = self.prompt("Choose an action:").await? else {
                if self.interrupted {
                    writeln!(self.out, "Interrupted.")?;
                }
                break;
            };
            match choice.trim() {
                "1" => self.add_block().await?,
                "2" => self.view().await?,
                "3" => self.search().await?,
                "4" => self.check().await?,
                "5" => self.tamper().await?,
                "6" => self.save().await?,
                "7" => self.load().await?,
                "q" | "quit" | "exit" => break,
                other => writeln!(self.out, "Unknown action '{other}'.")?,
            }
        }
        Ok(())
    }

    /// `None` at end of input or when interrupted.
    async fn prompt(&mut self, label: &str) -> Result<Option<String>> {
        writeln!(self.out, "{label}")?;
        self.out.flush()?;
        let line = tokio::select! {
            line = self.input.next_line() => Some(line?),
            _ = next_interrupt(&mut self.interrupts) => None,
        };
        match line {
            Some(line) => Ok(line),
            None => {
                self.interrupted = true;
                Ok(None)
            }
        }
    }

    async fn add_block(&mut self) -> Result<()> {
        let Some(data) = self.prompt("Enter data for the new block:").await? else {
            return Ok(());
        };
        if data.trim().is_empty() {
            writeln!(self.out, "Please enter data before mining.")?;
            return Ok(());
        }
        writeln!(self.out, "Mining... (Ctrl-C to cancel)")?;
        self.out.flush()?;

        let mut pending = self.chain.append(data);
        let token = pending.cancel_token();
        let limit = self.mining_timeout;
        let interrupted = tokio::select! {
            res = &mut pending => Ok(res),
            _ = next_interrupt(&mut self.interrupts) => Err(Interrupt::CtrlC),
            _ = deadline(limit) => Err(Interrupt::Deadline(limit.unwrap_or_default())),
        };
        let outcome = match interrupted {
            Ok(res) => res,
            Err(why) => {
                token.cancel();
                match (pending.await, why) {
                    (Err(ChainError::Cancelled), Interrupt::Deadline(d)) => {
                        Err(ChainError::MiningTimeout(d))
                    }
                    (res, _) => res,
                }
            }
        };

        match outcome {
            Ok(block) => {
                writeln!(self.out, "New block successfully mined and added.")?;
                render::write_block(&mut self.out, &block)?;
            }
            Err(ChainError::Cancelled) => {
                writeln!(self.out, "Mining cancelled; chain unchanged.")?;
            }
            Err(ChainError::MiningTimeout(d)) => {
                writeln!(self.out, "Mining gave up after {d:?}; chain unchanged.")?;
            }
            Err(other) => return Err(other.into()),
        }
        Ok(())
    }

    async fn view(&mut self) -> Result<()> {
        let blocks = self.chain.blocks().await;
        render::write_chain(&mut self.out, &blocks)?;
        Ok(())
    }

    async fn search(&mut self) -> Result<()> {
        let Some(keyword) = self.prompt("Enter keyword to search:").await? else {
            return Ok(());
        };
        let hits = self.chain.search(keyword.trim()).await;
        render::write_hits(&mut self.out, &hits, self.colored)?;
        Ok(())
    }

    async fn check(&mut self) -> Result<()> {
        let report = self.chain.validate().await;
        render::write_report(&mut self.out, &report, self.colored)?;
        Ok(())
    }

    async fn tamper(&mut self) -> Result<()> {
        let len = self.chain.len().await;
        let label = format!("Select block index to tamper (1..{}):", len.saturating_sub(1));
        let Some(raw) = self.prompt(&label).await? else {
            return Ok(());
        };
        let Ok(index) = raw.trim().parse::<usize>() else {
            writeln!(self.out, "'{}' is not a block index.", raw.trim())?;
            return Ok(());
        };
        match self.chain.tamper(index).await {
            Ok(()) => writeln!(
                self.out,
                "Block {index} has been modified for testing purposes."
            )?,
            Err(ChainError::InvalidTamperTarget { .. }) => {
                writeln!(self.out, "Cannot tamper Genesis block or out-of-range index.")?
            }
            Err(other) => return Err(other.into()),
        }
        Ok(())
    }

    async fn save(&mut self) -> Result<()> {
        let label = format!("Enter filename (default: {DEFAULT_EXPORT_FILE}):");
        let Some(name) = self.prompt(&label).await? else {
            return Ok(());
        };
        let name = match name.trim() {
            "" => DEFAULT_EXPORT_FILE.to_string(),
            other => other.to_string(),
        };
        match self.chain.export_to_path(&name).await {
            Ok(()) => writeln!(self.out, "Blockchain saved as '{name}'.")?,
            Err(err) => writeln!(self.out, "Could not save '{name}': {err}")?,
        }
        Ok(())
    }

    async fn load(&mut self) -> Result<()> {
        let label = format!("Enter filename to load (default: {DEFAULT_EXPORT_FILE}):");
        let Some(name) = self.prompt(&label).await? else {
            return Ok(());
        };
        let name = match name.trim() {
            "" => DEFAULT_EXPORT_FILE.to_string(),
            other => other.to_string(),
        };
        match Chain::import_from_path(&name) {
            Ok(chain) => {
                let len = chain.len();
                self.chain.replace(chain).await;
                writeln!(self.out, "Loaded {len} blocks from '{name}'.")?;
            }
            Err(err) => writeln!(self.out, "Could not load '{name}': {err}")?,
        }
        Ok(())
    }
}

/// Resolves on the next forwarded Ctrl-C; never, without a listener.
async fn next_interrupt(interrupts: &mut Option<mpsc::Receiver<()>>) {
    match interrupts {
        Some(rx) => {
            if rx.recv().await.is_none() {
                std::future::pending::<()>().await;
            }
        }
        None => std::future::pending::<()>().await,
    }
}

/// Forwards every Ctrl-C to the returned receiver. The signal handler is
/// installed once, for the life of the process.
pub fn forward_ctrl_c() -> mpsc::Receiver<()> {
    let (tx, rx) = mpsc::channel(4);
    tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            if tx.send(()).await.is_err() {
                break;
            }
        }
    });
    rx
}

async fn deadline(limit: Option<Duration>) {
    match limit {
        Some(d) => tokio::time::sleep(d).await,
        None => std::future::pending().await,
    }
}
