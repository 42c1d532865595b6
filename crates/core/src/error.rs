// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("backend id {0} is out of range")]
    BackendOutOfRange(usize),
}
