// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Builders shared by other crates' tests (feature `test-support`).

use crate::backend::BackendEntry;
use crate::backend_table::BackendTable;

/// A table of `n` backends, all `CONNECT_WAIT`/standby, host `hostN`.
pub fn fixture_table(n: usize) -> BackendTable {
    BackendTable::new(
        (0..n)
            .map(|i| BackendEntry::new(format!("host{i}"), 5432, format!("/data/{i}")))
            .collect(),
    )
}
