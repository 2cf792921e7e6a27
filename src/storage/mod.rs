// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 ReVibe

//! Local persistence: the embedded mirror of on-chain marketplace state.

pub mod mirror;

pub use mirror::{MirrorError, MirrorResult, MirrorStore};
