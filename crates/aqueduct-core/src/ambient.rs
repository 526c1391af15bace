//! Request-scoped ambient state.
//!
//! Some collaborators resolve the current locale and principal from
//! thread-local storage rather than taking them as parameters. The
//! coordinator installs the request's values before driving the sequencer and
//! restores the prior values at teardown, whichever path reached teardown.
//!
//! Ownership of a request may migrate between threads at suspension points,
//! so the installed state follows the driving thread: the coordinator
//! re-installs it whenever it (or a resuming callback) takes ownership.

use crate::context::Principal;
use std::cell::RefCell;

thread_local! {
    static AMBIENT: RefCell<AmbientState> = RefCell::new(AmbientState::default());
}

/// The locale and principal ambiently visible to code running on the current
/// thread.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AmbientState {
    /// BCP 47 locale tag, if one is installed.
    pub locale: Option<String>,
    /// The installed principal.
    pub principal: Principal,
}

/// Installs ambient state for the current thread, returning the prior state.
///
/// The caller must pass the returned value to [`restore`] during teardown.
#[must_use]
pub fn install(state: AmbientState) -> AmbientState {
    AMBIENT.with(|cell| cell.replace(state))
}

/// Restores previously saved ambient state on the current thread.
pub fn restore(prior: AmbientState) {
    AMBIENT.with(|cell| {
        *cell.borrow_mut() = prior;
    });
}

/// Returns a copy of the current thread's ambient state.
#[must_use]
pub fn current() -> AmbientState {
    AMBIENT.with(|cell| cell.borrow().clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_install_and_restore_round_trip() {
        let prior = install(AmbientState {
            locale: Some("fr-FR".to_string()),
            principal: Principal::User {
                name: "alice".to_string(),
                roles: vec!["admin".to_string()],
            },
        });

        let installed = current();
        assert_eq!(installed.locale.as_deref(), Some("fr-FR"));

        restore(prior.clone());
        assert_eq!(current(), prior);
    }

    #[test]
    fn test_default_is_anonymous() {
        // Fresh threads see the default ambient state.
        std::thread::spawn(|| {
            let state = current();
            assert_eq!(state.principal, Principal::Anonymous);
            assert!(state.locale.is_none());
        })
        .join()
        .unwrap();
    }
}
