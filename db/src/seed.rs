use super::{models::Role, Database, DbError, NewUser};

/// Makes sure an administrator account exists for `email`. An existing account with
/// that email is left untouched.
pub fn seed_administrator<D: Database>(
    db: &mut D,
    email: &str,
    name: &str,
    password_hash: String,
) -> Result<(), DbError> {
    if db.user_get_by_email(email).is_some() {
        return Ok(());
    }

    db.user_add(NewUser {
        email: email.to_string(),
        name: name.to_string(),
        password_hash: Some(password_hash),
        role: Role::Administrator,
    })?;

    log::info!("Created administrator account {}", email);
    Ok(())
}
