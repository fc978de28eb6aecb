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

//! A self-contained TUF 1.0 client (§4.3): root rotation, then timestamp,
//! snapshot, and targets, each checked for signature threshold, monotonic
//! version, and expiry before it is trusted or persisted.
//!
//! Delegated (non-top-level) target roles are out of scope, the same
//! simplification `tough`'s own client documents; Sigstore's own
//! `trusted_root.json` target has never required delegation.

pub mod client;
pub mod schema;
pub mod state;
pub mod store;

pub use client::{Limits, TufClient};
pub use state::RefreshState;
pub use store::{LocalStore, StoreLock};
