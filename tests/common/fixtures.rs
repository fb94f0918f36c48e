//! Remote trees and validators shared by integration tests

use sftp_ingest::{MemoryRemote, ValidationFailure, Verdict};

/// Well-formed CSV content
pub const GOOD_CSV: &str = "id,name,amount\n1,alpha,10\n2,beta,20\n";

/// CSV with a ragged second row
pub const RAGGED_CSV: &str = "id,name,amount\n1,alpha,10\n2,beta\n";

/// Tree with two qualifying reports and one non-matching file under `/data`
pub fn report_tree() -> MemoryRemote {
    let remote = MemoryRemote::new();
    remote
        .add_file("/data/a/rpt1.csv", GOOD_CSV)
        .add_file("/data/a/other.txt", "not a report")
        .add_file("/data/b/rpt2.csv", GOOD_CSV);
    remote
}

/// Tree with `count` qualifying reports spread across two directories
pub fn wide_tree(count: usize) -> MemoryRemote {
    let remote = MemoryRemote::new();
    for i in 0..count {
        let dir = if i % 2 == 0 { "even" } else { "odd" };
        remote.add_file(&format!("/data/{dir}/rpt_{i:03}.csv"), GOOD_CSV);
    }
    remote
}

/// `valid` for non-empty content, `invalid` with "empty file" otherwise
pub fn non_empty_validator(content: &[u8]) -> Result<Verdict, ValidationFailure> {
    let mut verdict = Verdict::default();
    if content.is_empty() {
        verdict.errors.push("empty file".to_string());
    }
    Ok(verdict)
}
