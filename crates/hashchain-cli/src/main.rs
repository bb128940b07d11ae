use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use crossterm::tty::IsTty;
use hashchain_core::constants::{DEFAULT_DIFFICULTY, SHELL_DIFFICULTY};
use hashchain_core::{BlockData, Chain, ChainConfig, SharedChain};
use tracing_subscriber::{fmt, EnvFilter};

mod render;
mod shell;

#[derive(Parser, Debug)]
#[command(name = "hashchain-cli")]
#[command(about = "Build, inspect and tamper with a proof-of-work hash chain")]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Args, Debug, Clone)]
struct MiningArgs {
    /// Leading zero hex characters required of each block hash
    #[arg(long, short, default_value_t = DEFAULT_DIFFICULTY)]
    difficulty: u32,
    /// Search nonces on all cores
    #[arg(long)]
    parallel: bool,
}

impl MiningArgs {
    fn config(&self) -> ChainConfig {
        ChainConfig::with_difficulty(self.difficulty).parallel(self.parallel)
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Mine a fresh chain with one block per DATA argument
    Mine {
        #[command(flatten)]
        mining: MiningArgs,
        /// Treat each DATA argument as a JSON value instead of text
        #[arg(long)]
        json: bool,
        /// Write the chain to this file
        #[arg(long, short)]
        out: Option<PathBuf>,
        /// Block payloads
        data: Vec<String>,
    },
    /// Load a saved chain and print it
    View {
        file: PathBuf,
    },
    /// Load a saved chain and check its integrity; fails if it is broken
    Verify {
        file: PathBuf,
    },
    /// Case-insensitive keyword search over a saved chain
    Search {
        file: PathBuf,
        keyword: String,
    },
    /// Overwrite one block's data in a saved chain without re-mining it
    Tamper {
        file: PathBuf,
        index: usize,
        /// Where to write the tampered chain (defaults to FILE)
        #[arg(long, short)]
        out: Option<PathBuf>,
    },
    /// Interactive menu
    Shell {
        /// Difficulty for new blocks [default: 3, or the loaded chain's]
        #[arg(long, short)]
        difficulty: Option<u32>,
        #[arg(long)]
        parallel: bool,
        /// Start from a saved chain instead of a fresh genesis block
        #[arg(long)]
        load: Option<PathBuf>,
        /// Give up on a block after this many seconds
        #[arg(long)]
        timeout_secs: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .pretty()
        .init();

    let cli = Cli::parse();
    let mut stdout = std::io::stdout();
    let colored = stdout.is_tty();
    match cli.cmd {
        Command::Mine {
            mining,
            json,
            out,
            data,
        } => {
            let mut chain = Chain::with_config(mining.config())?;
            for raw in data {
                let payload = if json {
                    let value: serde_json::Value = serde_json::from_str(&raw)
                        .with_context(|| format!("'{raw}' is not valid JSON"))?;
                    BlockData::from(value)
                } else {
                    BlockData::from(raw)
                };
                chain.append(payload);
            }
            render::write_chain(&mut stdout, chain.blocks())?;
            if let Some(path) = out {
                chain.export_to_path(&path)?;
                println!("Blockchain saved to '{}'", path.display());
            }
        }
        Command::View { file } => {
            let chain = load(&file)?;
            render::write_chain(&mut stdout, chain.blocks())?;
        }
        Command::Verify { file } => {
            let chain = load(&file)?;
            let report = chain.validate();
            render::write_report(&mut stdout, &report, colored)?;
            if !report.is_valid() {
                bail!("{} failed integrity checks", file.display());
            }
        }
        Command::Search { file, keyword } => {
            let chain = load(&file)?;
            render::write_hits(&mut stdout, &chain.search(&keyword), colored)?;
        }
        Command::Tamper { file, index, out } => {
            let mut chain = load(&file)?;
            chain.tamper(index)?;
            let target = out.unwrap_or(file);
            chain.export_to_path(&target)?;
            println!(
                "Block {index} has been tampered; saved to '{}'",
                target.display()
            );
        }
        Command::Shell {
            difficulty,
            parallel,
            load: from,
            timeout_secs,
        } => {
            let config = ChainConfig::with_difficulty(difficulty.unwrap_or(SHELL_DIFFICULTY))
                .parallel(parallel);
            let chain = match from {
                Some(path) => {
                    let mut chain = load(&path)?;
                    if let Some(difficulty) = difficulty {
                        chain.set_difficulty(difficulty)?;
                    }
                    chain.set_strategy(config.strategy);
                    chain
                }
                None => Chain::with_config(config)?,
            };
            tracing::debug!(
                blocks = chain.len(),
                difficulty = chain.difficulty(),
                "starting shell"
            );
            let stdin = tokio::io::BufReader::new(tokio::io::stdin());
            shell::Shell::new(SharedChain::new(chain), stdin, stdout)
                .with_mining_timeout(timeout_secs.map(Duration::from_secs))
                .with_color(colored)
                .with_interrupts(shell::forward_ctrl_c())
                .run()
                .await?;
        }
    }
    Ok(())
}

fn load(path: &Path) -> Result<Chain> {
    Chain::import_from_path(path).with_context(|| format!("loading {}", path.display()))
}
