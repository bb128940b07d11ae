use std::fmt::Display;
use std::io::{self, Write};

use crossterm::style::{style, Color, Stylize};
use hashchain_core::{Block, SearchHit, ValidationReport};

const RULE: &str = "--------------------------------------------------";

pub fn write_block<W: Write>(out: &mut W, block: &Block) -> io::Result<()> {
    let h = &block.header;
    writeln!(out, "{RULE}")?;
    writeln!(out, "Block Header:")?;
    writeln!(out, "  Index         : {}", h.index)?;
    writeln!(out, "  Timestamp     : {}", h.timestamp)?;
    writeln!(out, "  Nonce         : {}", h.nonce)?;
    writeln!(out, "  Previous Hash : {}", h.previous_hash)?;
    writeln!(out, "  Hash          : {}", block.hash_hex())?;
    writeln!(out, "  Difficulty    : {}", h.difficulty)?;
    writeln!(out, "Block Data:")?;
    writeln!(out, "  Data          : {}", block.data)?;
    match block.mining_time {
        Some(secs) => writeln!(out, "  Mining Time   : {secs} seconds"),
        None => writeln!(out, "  Mining Time   : N/A seconds"),
    }
}

pub fn write_chain<W: Write>(out: &mut W, blocks: &[Block]) -> io::Result<()> {
    for block in blocks {
        write_block(out, block)?;
    }
    Ok(())
}

/// Writes one line, in `color` when `colored` is set.
fn paint<W: Write, D: Display>(
    out: &mut W,
    line: D,
    color: Color,
    colored: bool,
) -> io::Result<()> {
    if colored {
        writeln!(out, "{}", style(line).with(color))
    } else {
        writeln!(out, "{line}")
    }
}

fn verdict_color(ok: bool) -> Color {
    if ok {
        Color::Green
    } else {
        Color::Red
    }
}

pub fn write_report<W: Write>(
    out: &mut W,
    report: &ValidationReport,
    colored: bool,
) -> io::Result<()> {
    for verdict in &report.verdicts {
        paint(out, verdict, verdict_color(verdict.is_valid()), colored)?;
    }
    if report.is_valid() {
        paint(out, "Blockchain is valid.", Color::Green, colored)
    } else {
        paint(out, "Blockchain integrity is broken.", Color::Red, colored)
    }
}

pub fn write_hits<W: Write>(out: &mut W, hits: &[SearchHit], colored: bool) -> io::Result<()> {
    if hits.is_empty() {
        return paint(out, "Keyword not found in any block.", Color::Red, colored);
    }
    for hit in hits {
        let line = format!("Found in Block {}: {}", hit.index, hit.data);
        paint(out, line, Color::Green, colored)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use hashchain_core::Chain;

    #[test]
    fn block_layout_lists_every_field() {
        let chain = Chain::new(0);
        let mut out = Vec::new();
        write_chain(&mut out, chain.blocks()).unwrap();
        let text = String::from_utf8(out).unwrap();
        for label in ["Index", "Timestamp", "Nonce", "Previous Hash", "Hash", "Difficulty", "Data", "Mining Time"] {
            assert!(text.contains(label), "missing {label}: {text}");
        }
        assert!(text.contains("Data          : Genesis Block"));
    }

    #[test]
    fn empty_search_says_not_found() {
        let mut out = Vec::new();
        write_hits(&mut out, &[], false).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "Keyword not found in any block.\n");
    }

    #[test]
    fn report_is_colored_only_on_request() {
        let mut chain = Chain::new(0);
        chain.append("first");
        chain.tamper(1).unwrap();
        let report = chain.validate();

        let mut plain = Vec::new();
        write_report(&mut plain, &report, false).unwrap();
        let plain = String::from_utf8(plain).unwrap();
        assert!(!plain.contains('\x1b'));
        assert!(plain.ends_with("Blockchain integrity is broken.\n"));

        let mut colored = Vec::new();
        write_report(&mut colored, &report, true).unwrap();
        let colored = String::from_utf8(colored).unwrap();
        assert!(colored.contains('\x1b'));
        assert!(colored.contains("Blockchain integrity is broken."));
        assert!(colored.contains("[Block 1] Invalid hash!"));
    }
}
