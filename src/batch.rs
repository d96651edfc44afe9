//! Deterministic batch generation
//!
//! A batch is an ordered, read-only sequence of request intents produced
//! from `(count, mix, seed)`. Identical inputs always yield identical
//! batches, down to the request ids, which makes experiments reproducible.

use crate::error::{Error, Result};
use crate::request::{Operation, RequestId, RequestIntent};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::io::{BufRead, Write};
use std::path::Path;
use std::str::FromStr;

/// Proportions assigned to each operation kind, e.g. `50:50:0` for
/// RENEW:RETURN:LOAN
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OperationMix {
    /// RENEW share
    pub renew: u32,
    /// RETURN share
    pub return_: u32,
    /// LOAN share
    pub loan: u32,
}

impl Default for OperationMix {
    fn default() -> Self {
        Self {
            renew: 50,
            return_: 50,
            loan: 0,
        }
    }
}

impl OperationMix {
    /// Create a mix from explicit shares; the sum must be positive
    pub fn new(renew: u32, return_: u32, loan: u32) -> Result<Self> {
        let mix = Self {
            renew,
            return_,
            loan,
        };
        mix.validate()?;
        Ok(mix)
    }

    /// Validate the mix
    pub fn validate(&self) -> Result<()> {
        if self.renew as u64 + self.return_ as u64 + self.loan as u64 == 0 {
            return Err(Error::Config("operation mix must have a positive sum".into()));
        }
        Ok(())
    }

    /// Integer request counts per kind for a batch of `total`
    ///
    /// Each kind gets `total * share / sum` rounded down; the remainder goes
    /// to the first kind in ratio order (RENEW).
    pub fn counts(&self, total: usize) -> [usize; 3] {
        let sum = self.renew as usize + self.return_ as usize + self.loan as usize;
        let mut counts = [
            total * self.renew as usize / sum,
            total * self.return_ as usize / sum,
            total * self.loan as usize / sum,
        ];
        counts[0] += total - (counts[0] + counts[1] + counts[2]);
        counts
    }
}

impl FromStr for OperationMix {
    type Err = Error;

    /// Parse `"a:b:c"` (or `"a:b"` with an implicit zero LOAN share)
    fn from_str(s: &str) -> Result<Self> {
        let parts: Vec<&str> = s.split(':').map(str::trim).collect();
        if parts.len() != 2 && parts.len() != 3 {
            return Err(Error::Config(format!("mix must be A:B or A:B:C, got {s:?}")));
        }
        let mut shares = [0u32; 3];
        for (i, part) in parts.iter().enumerate() {
            shares[i] = part
                .parse()
                .map_err(|_| Error::Config(format!("mix share is not a number: {part:?}")))?;
        }
        Self::new(shares[0], shares[1], shares[2])
    }
}

impl std::fmt::Display for OperationMix {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}:{}", self.renew, self.return_, self.loan)
    }
}

/// An ordered, read-only sequence of request intents
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch(Vec<RequestIntent>);

impl Batch {
    /// Generate a batch of `count` requests with the given mix and seed
    ///
    /// The operation sequence is the exact per-kind counts shuffled by the
    /// seeded stream; book codes, user ids, and request ids are drawn from
    /// the same stream, so wall-clock entropy never enters the batch.
    pub fn generate(count: usize, mix: &OperationMix, seed: u64) -> Result<Self> {
        mix.validate()?;

        let [n_renew, n_return, n_loan] = mix.counts(count);
        let mut operations = Vec::with_capacity(count);
        operations.extend(std::iter::repeat(Operation::Renew).take(n_renew));
        operations.extend(std::iter::repeat(Operation::Return).take(n_return));
        operations.extend(std::iter::repeat(Operation::Loan).take(n_loan));

        let mut rng = StdRng::seed_from_u64(seed);
        operations.shuffle(&mut rng);

        let intents = operations
            .into_iter()
            .map(|operation| {
                let book: u32 = rng.gen_range(1..=1000);
                let user: u32 = rng.gen_range(1..=100);
                let id_bytes: [u8; 16] = rng.gen();
                RequestIntent {
                    request_id: RequestId::new(hex::encode(id_bytes)),
                    operation,
                    book_code: format!("BOOK-{book}"),
                    user_id: user,
                }
            })
            .collect();

        Ok(Self(intents))
    }

    /// Wrap an existing intent sequence
    pub fn from_intents(intents: Vec<RequestIntent>) -> Self {
        Self(intents)
    }

    /// The requests, in submission order
    pub fn requests(&self) -> &[RequestIntent] {
        &self.0
    }

    /// Number of requests
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True when the batch holds no requests
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Write the batch as JSON Lines, one intent per line
    pub fn write_jsonl(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut file = std::io::BufWriter::new(std::fs::File::create(path)?);
        for intent in &self.0 {
            serde_json::to_writer(&mut file, intent)?;
            file.write_all(b"\n")?;
        }
        file.flush()?;
        Ok(())
    }

    /// Read a batch back from JSON Lines
    pub fn read_jsonl(path: impl AsRef<Path>) -> Result<Self> {
        let file = std::io::BufReader::new(std::fs::File::open(path)?);
        let mut intents = Vec::new();
        for line in file.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            intents.push(serde_json::from_str(&line)?);
        }
        Ok(Self(intents))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mix_parse() {
        let mix: OperationMix = "70:30".parse().unwrap();
        assert_eq!(mix, OperationMix::new(70, 30, 0).unwrap());

        let mix: OperationMix = "2:2:1".parse().unwrap();
        assert_eq!(mix.loan, 1);
    }

    #[test]
    fn test_mix_parse_rejects_invalid() {
        assert!("".parse::<OperationMix>().is_err());
        assert!("50".parse::<OperationMix>().is_err());
        assert!("a:b".parse::<OperationMix>().is_err());
        assert!("0:0:0".parse::<OperationMix>().is_err());
        assert!("1:2:3:4".parse::<OperationMix>().is_err());
    }

    #[test]
    fn test_mix_counts_remainder_to_first_kind() {
        let mix = OperationMix::new(50, 50, 0).unwrap();
        // 5 does not divide evenly: 2 + 2 with the leftover going to RENEW
        assert_eq!(mix.counts(5), [3, 2, 0]);
        assert_eq!(mix.counts(4), [2, 2, 0]);

        let mix = OperationMix::new(1, 1, 1).unwrap();
        assert_eq!(mix.counts(10), [4, 3, 3]);
    }

    #[test]
    fn test_generate_is_deterministic() {
        let mix = OperationMix::default();
        let a = Batch::generate(50, &mix, 42).unwrap();
        let b = Batch::generate(50, &mix, 42).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_generate_differs_across_seeds() {
        let mix = OperationMix::default();
        let a = Batch::generate(50, &mix, 42).unwrap();
        let b = Batch::generate(50, &mix, 43).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_generate_honors_mix_counts() {
        let mix: OperationMix = "2:2:0".parse().unwrap();
        let batch = Batch::generate(4, &mix, 7).unwrap();
        let renews = batch
            .requests()
            .iter()
            .filter(|r| r.operation == Operation::Renew)
            .count();
        let returns = batch
            .requests()
            .iter()
            .filter(|r| r.operation == Operation::Return)
            .count();
        assert_eq!((renews, returns), (2, 2));
    }

    #[test]
    fn test_generate_field_ranges() {
        let batch = Batch::generate(100, &OperationMix::default(), 1).unwrap();
        for intent in batch.requests() {
            assert!(intent.book_code.starts_with("BOOK-"));
            let n: u32 = intent.book_code["BOOK-".len()..].parse().unwrap();
            assert!((1..=1000).contains(&n));
            assert!((1..=100).contains(&intent.user_id));
            assert_eq!(intent.request_id.as_str().len(), 32);
        }
    }

    #[test]
    fn test_request_ids_unique() {
        let batch = Batch::generate(200, &OperationMix::default(), 5).unwrap();
        let mut ids: Vec<&str> = batch
            .requests()
            .iter()
            .map(|r| r.request_id.as_str())
            .collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), 200);
    }

    #[test]
    fn test_jsonl_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("batch.jsonl");
        let batch = Batch::generate(10, &OperationMix::default(), 9).unwrap();
        batch.write_jsonl(&path).unwrap();
        let back = Batch::read_jsonl(&path).unwrap();
        assert_eq!(batch, back);
    }

    #[test]
    fn test_empty_batch() {
        let batch = Batch::generate(0, &OperationMix::default(), 0).unwrap();
        assert!(batch.is_empty());
    }
}
