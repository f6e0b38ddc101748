//! Form checks that run before anything is sent.

use crate::error::AuthFailure;

/// The auth service's default minimum.
pub const MIN_PASSWORD_LEN: usize = 6;

pub fn validate_email(email: &str) -> Result<(), AuthFailure> {
    let email = email.trim();
    let Some((local, domain)) = email.split_once('@') else {
        return Err(AuthFailure::InvalidEmail);
    };
    let domain_ok = domain
        .split_once('.')
        .is_some_and(|(host, tld)| !host.is_empty() && !tld.is_empty());

    if local.is_empty() || !domain_ok || email.contains(char::is_whitespace) {
        return Err(AuthFailure::InvalidEmail);
    }
    Ok(())
}

pub fn validate_password(password: &str) -> Result<(), AuthFailure> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AuthFailure::WeakPassword { min: MIN_PASSWORD_LEN });
    }
    Ok(())
}

pub fn validate_new_password(password: &str, confirm: &str) -> Result<(), AuthFailure> {
    validate_password(password)?;
    if password != confirm {
        return Err(AuthFailure::PasswordMismatch);
    }
    Ok(())
}

pub fn validate_sign_up(email: &str, password: &str, confirm: &str) -> Result<(), AuthFailure> {
    validate_email(email)?;
    validate_new_password(password, confirm)
}
