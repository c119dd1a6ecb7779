//! Trace-file loader: one request per line, `<addr> <type> [<cycle>]` with
//! `type` 0 = read, 1 = write, >= 2 = uop variant. Addresses may be decimal
//! or `0x`-prefixed hex.

use std::path::Path;

use anyhow::{bail, Context};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TraceOp {
    Read,
    Write,
    Uop(u32),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TraceEntry {
    pub addr: u64,
    pub op: TraceOp,
    /// Earliest cycle this request may be offered to the interconnect.
    pub cycle: Option<u64>,
}

pub fn load_trace(path: &Path) -> anyhow::Result<Vec<TraceEntry>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read trace file {}", path.display()))?;
    let mut entries = Vec::new();
    for (lineno, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        entries.push(
            parse_line(line).with_context(|| format!("{}:{}", path.display(), lineno + 1))?,
        );
    }
    Ok(entries)
}

fn parse_line(line: &str) -> anyhow::Result<TraceEntry> {
    let mut fields = line.split_whitespace();
    let addr = fields.next().context("missing address")?;
    let addr = parse_u64(addr).context("bad address")?;
    let ty: u32 = fields
        .next()
        .context("missing request type")?
        .parse()
        .context("bad request type")?;
    let cycle = match fields.next() {
        Some(field) => Some(parse_u64(field).context("bad cycle")?),
        None => None,
    };
    if fields.next().is_some() {
        bail!("trailing fields");
    }

    let op = match ty {
        0 => TraceOp::Read,
        1 => TraceOp::Write,
        variant => TraceOp::Uop(variant),
    };
    Ok(TraceEntry { addr, op, cycle })
}

fn parse_u64(field: &str) -> anyhow::Result<u64> {
    let value = match field.strip_prefix("0x").or_else(|| field.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16)?,
        None => field.parse()?,
    };
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn parses_reads_writes_and_uops() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "# comment").unwrap();
        writeln!(file, "0x1000 0").unwrap();
        writeln!(file, "4096 1 10").unwrap();
        writeln!(file, "0x2000 2").unwrap();
        file.flush().unwrap();

        let entries = load_trace(file.path()).unwrap();
        assert_eq!(
            entries,
            vec![
                TraceEntry {
                    addr: 0x1000,
                    op: TraceOp::Read,
                    cycle: None
                },
                TraceEntry {
                    addr: 4096,
                    op: TraceOp::Write,
                    cycle: Some(10)
                },
                TraceEntry {
                    addr: 0x2000,
                    op: TraceOp::Uop(2),
                    cycle: None
                },
            ]
        );
    }

    #[test]
    fn rejects_garbage_lines() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "0x1000 zero").unwrap();
        file.flush().unwrap();
        assert!(load_trace(file.path()).is_err());
    }
}
