use std::{
    fs::File,
    io::{BufRead, BufReader},
    path::Path,
};

use crate::{error::Result, quark::Quark};

/// A labeled observation sequence. Items and labels are ids into the string
/// tables of the owning [`Dataset`].
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Sequence {
    pub items: Vec<usize>,
    pub labels: Vec<usize>,
    /// Group number, used to select a holdout set.
    pub group: usize,
}

impl Sequence {
    pub fn new(group: usize) -> Self {
        Self { group, ..Default::default() }
    }

    pub fn push(&mut self, item: usize, label: usize) {
        self.items.push(item);
        self.labels.push(label);
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn clear(&mut self) {
        self.items.clear();
        self.labels.clear();
    }
}

#[derive(Debug, Default)]
pub struct Dataset {
    pub seqs: Vec<Sequence>,
    /// Label names, in order of first appearance.
    pub labels: Quark,
    /// Observation symbols, in order of first appearance.
    pub attrs: Quark,
}

impl Dataset {
    /// Reads sequences in the `LABEL<TAB>SYMBOL` line format; a blank line
    /// ends a sequence and fields after the symbol are ignored. Returns the
    /// number of sequences read.
    pub fn read<R: BufRead>(&mut self, reader: R, group: usize) -> Result<usize> {
        let before = self.seqs.len();
        let mut seq = Sequence::new(group);
        for line in reader.lines() {
            let line = line?;
            let line = line.trim_end_matches('\r');
            if line.trim().is_empty() {
                if !seq.is_empty() {
                    self.seqs.push(std::mem::replace(&mut seq, Sequence::new(group)));
                }
                continue;
            }
            match line.split_once('\t') {
                Some((label, rest)) => {
                    let symbol = rest.split_once('\t').map_or(rest, |(s, _)| s);
                    if symbol.is_empty() {
                        log::warn!("missing symbol: {line}");
                        continue;
                    }
                    let item = self.attrs.find_or_insert(symbol);
                    seq.push(item, self.labels.find_or_insert(label));
                }
                None => log::warn!("invalid line: {line}"),
            }
        }
        if !seq.is_empty() {
            self.seqs.push(seq);
        }
        let n = self.seqs.len() - before;
        log::debug!("read {n} sequences into group {group}");
        Ok(n)
    }

    pub fn read_file<P: AsRef<Path>>(&mut self, path: P, group: usize) -> Result<usize> {
        let f = File::open(path)?;
        self.read(BufReader::new(f), group)
    }

    pub fn from_text(s: &str) -> Result<Self> {
        let mut ds = Self::default();
        ds.read(s.as_bytes(), 0)?;
        Ok(ds)
    }

    pub fn len(&self) -> usize {
        self.seqs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seqs.is_empty()
    }

    pub fn num_labels(&self) -> usize {
        self.labels.len()
    }

    pub fn num_attrs(&self) -> usize {
        self.attrs.len()
    }

    pub fn max_seq_length(&self) -> usize {
        self.seqs.iter().map(Sequence::len).max().unwrap_or_default()
    }

    pub fn total_items(&self) -> usize {
        self.seqs.iter().map(Sequence::len).sum()
    }

    pub fn label(&self, id: usize) -> &str {
        &self.labels.as_slice()[id]
    }

    pub fn symbol(&self, id: usize) -> &str {
        &self.attrs.as_slice()[id]
    }
}
