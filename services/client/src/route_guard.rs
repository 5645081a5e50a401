//! Access gate for pages that need a signed-in user.
//!
//! The guard renders its children untouched until it is mounted so the first
//! render matches the server-rendered markup. After mount it waits for the
//! auth state to resolve, then either shows the page or replaces the current
//! route with [`LOGIN_PATH`].

use tracing::debug;

/// Where unauthenticated users are sent
pub const LOGIN_PATH: &str = "/login";

/// Snapshot of the auth provider
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthStatus {
    pub loading: bool,
    pub authenticated: bool,
}

impl AuthStatus {
    pub const LOADING: AuthStatus = AuthStatus {
        loading: true,
        authenticated: false,
    };

    pub fn resolved(authenticated: bool) -> Self {
        Self {
            loading: false,
            authenticated,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardPhase {
    Unmounted,
    Loading,
    Authenticated,
    Unauthenticated,
}

/// What the guard renders in place of the protected page
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardView {
    Children,
    LoadingIndicator,
    Nothing,
}

/// Router operations the guard needs
pub trait Navigator {
    /// Replace the current history entry
    fn replace(&mut self, path: &str);
}

#[derive(Debug, Default)]
pub struct RouteGuard {
    mounted: bool,
    redirected: bool,
}

impl RouteGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mount(&mut self) {
        self.mounted = true;
    }

    pub fn phase(&self, auth: AuthStatus) -> GuardPhase {
        if !self.mounted {
            GuardPhase::Unmounted
        } else if auth.loading {
            GuardPhase::Loading
        } else if auth.authenticated {
            GuardPhase::Authenticated
        } else {
            GuardPhase::Unauthenticated
        }
    }

    pub fn render(&self, auth: AuthStatus) -> GuardView {
        match self.phase(auth) {
            GuardPhase::Unmounted | GuardPhase::Authenticated => GuardView::Children,
            GuardPhase::Loading => GuardView::LoadingIndicator,
            GuardPhase::Unauthenticated => GuardView::Nothing,
        }
    }

    /// React to a new auth snapshot. Redirects once per unauthenticated
    /// stretch and returns whether it did so now.
    pub fn sync<N>(&mut self, auth: AuthStatus, navigator: &mut N) -> bool
    where
        N: Navigator + ?Sized,
    {
        if self.phase(auth) != GuardPhase::Unauthenticated {
            self.redirected = false;
            return false;
        }

        if self.redirected {
            return false;
        }

        debug!(to = LOGIN_PATH, "Redirecting unauthenticated user");
        navigator.replace(LOGIN_PATH);
        self.redirected = true;
        true
    }
}
