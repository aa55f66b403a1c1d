// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use tabgrid_app::SwitchToken;

/// Holds the single interaction token that is allowed to commit visible
/// output.
#[derive(Debug, Default)]
pub struct TokenAuthority {
    current: Option<SwitchToken>,
}

impl TokenAuthority {
    pub fn new() -> Self {
        Self::default()
    }

    /// Issues a fresh token and makes it current.
    pub fn mint(&mut self) -> SwitchToken {
        let token = SwitchToken::random();
        self.current = Some(token);
        token
    }

    pub fn current(&self) -> Option<SwitchToken> {
        self.current
    }

    pub fn is_current(&self, token: &SwitchToken) -> bool {
        self.current.as_ref() == Some(token)
    }

    pub fn adopt(&mut self, token: SwitchToken) {
        self.current = Some(token);
    }
}
