//
// Copyright 2021 The Sigstore Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Per-refresh state machine (§4.3): `Idle -> RootRotating ->
//! TimestampVerifying -> SnapshotVerifying -> TargetsVerifying -> Ready`,
//! with failure transitions to `Failed(reason)`. A subsequent `update()`
//! call always starts again from `Idle`, anchored on the last `Ready`
//! store contents.

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshState {
    Idle,
    RootRotating,
    TimestampVerifying,
    SnapshotVerifying,
    TargetsVerifying,
    Ready,
    Failed(String),
}

impl fmt::Display for RefreshState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RefreshState::Idle => write!(f, "idle"),
            RefreshState::RootRotating => write!(f, "root-rotating"),
            RefreshState::TimestampVerifying => write!(f, "timestamp-verifying"),
            RefreshState::SnapshotVerifying => write!(f, "snapshot-verifying"),
            RefreshState::TargetsVerifying => write!(f, "targets-verifying"),
            RefreshState::Ready => write!(f, "ready"),
            RefreshState::Failed(reason) => write!(f, "failed({reason})"),
        }
    }
}
