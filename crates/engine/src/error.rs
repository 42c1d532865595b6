// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("backend id {0} is out of range")]
    OutOfRange(usize),
    #[error(transparent)]
    Storage(#[from] poolguard_storage::StorageError),
}
