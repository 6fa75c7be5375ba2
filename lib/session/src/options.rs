//! Cookie attributes and lifetime for a saved session.

use axum_extra::extract::cookie::{Cookie, SameSite};
use time::Duration;

/// Options applied when a session is saved.
///
/// `max_age` is both the cookie lifetime and the lifetime of the
/// server-side record. A non-positive `max_age` means "invalidate now".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOptions {
    path: String,
    max_age: Duration,
    secure: bool,
    http_only: bool,
    same_site: SameSite,
}

impl SessionOptions {
    /// Creates options for a secure, http-only, strict same-site cookie.
    #[must_use]
    pub fn new(path: impl Into<String>, max_age: Duration) -> Self {
        Self {
            path: path.into(),
            max_age,
            secure: true,
            http_only: true,
            same_site: SameSite::Strict,
        }
    }

    /// Options that expire the session immediately at `path`.
    #[must_use]
    pub fn expired(path: impl Into<String>) -> Self {
        Self::new(path, Duration::ZERO)
    }

    /// Sets whether the cookie carries the `Secure` attribute.
    #[must_use]
    pub fn with_secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    /// Returns the cookie path.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Returns the session lifetime.
    #[must_use]
    pub fn max_age(&self) -> Duration {
        self.max_age
    }

    /// Returns whether the `Secure` attribute is set.
    #[must_use]
    pub fn secure(&self) -> bool {
        self.secure
    }

    /// Returns whether the `HttpOnly` attribute is set.
    #[must_use]
    pub fn http_only(&self) -> bool {
        self.http_only
    }

    /// Returns the `SameSite` attribute.
    #[must_use]
    pub fn same_site(&self) -> SameSite {
        self.same_site
    }

    /// Returns true if saving with these options invalidates the session.
    #[must_use]
    pub fn is_expiring(&self) -> bool {
        self.max_age <= Duration::ZERO
    }

    /// Builds the cookie carrying `value` under `name`.
    #[must_use]
    pub fn cookie(&self, name: &str, value: String) -> Cookie<'static> {
        Cookie::build((name.to_string(), value))
            .path(self.path.clone())
            .secure(self.secure)
            .http_only(self.http_only)
            .same_site(self.same_site)
            .max_age(self.max_age)
            .build()
    }

    /// Builds the removal cookie for `name`.
    #[must_use]
    pub fn removal_cookie(&self, name: &str) -> Cookie<'static> {
        Cookie::build((name.to_string(), ""))
            .path(self.path.clone())
            .max_age(Duration::ZERO)
            .build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_strict() {
        let options = SessionOptions::new("/auths", Duration::seconds(300));
        assert!(options.secure());
        assert!(options.http_only());
        assert_eq!(options.same_site(), SameSite::Strict);
        assert!(!options.is_expiring());
    }

    #[test]
    fn non_positive_max_age_is_expiring() {
        assert!(SessionOptions::expired("/").is_expiring());
        assert!(SessionOptions::new("/", Duration::seconds(-1)).is_expiring());
    }

    #[test]
    fn cookie_carries_attributes() {
        let options = SessionOptions::new("/auths", Duration::seconds(300));
        let cookie = options.cookie("state", "rec_1".to_string());
        assert_eq!(cookie.name(), "state");
        assert_eq!(cookie.path(), Some("/auths"));
        assert_eq!(cookie.secure(), Some(true));
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.same_site(), Some(SameSite::Strict));
        assert_eq!(cookie.max_age(), Some(Duration::seconds(300)));
    }

    #[test]
    fn insecure_cookies_for_local_development() {
        let options = SessionOptions::new("/", Duration::days(30)).with_secure(false);
        assert_eq!(options.cookie("token", String::new()).secure(), Some(false));
    }
}
