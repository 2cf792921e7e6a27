// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 ReVibe

use std::sync::Arc;

use crate::auth::AuthService;
use crate::storage::MirrorStore;

/// Shared handles for HTTP handlers.
#[derive(Clone)]
pub struct AppState {
    pub auth: Arc<AuthService>,
    pub store: Arc<MirrorStore>,
}

impl AppState {
    pub fn new(auth: Arc<AuthService>, store: Arc<MirrorStore>) -> Self {
        Self { auth, store }
    }
}
