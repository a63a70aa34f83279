//! Prints the SQL that seeds a staff account.
//!
//! Usage: hashpass <username> <password> [admin|manager|agent]

use argon2::password_hash::{SaltString, rand_core::OsRng};
use argon2::{Argon2, PasswordHasher};

fn role_code(role: &str) -> Option<i16> {
    match role {
        "admin" => Some(1),
        "manager" => Some(2),
        "agent" => Some(3),
        _ => None,
    }
}

fn main() -> anyhow::Result<()> {
    let mut args = std::env::args().skip(1);
    let (Some(username), Some(password)) = (args.next(), args.next()) else {
        anyhow::bail!("Usage: hashpass <username> <password> [admin|manager|agent]");
    };
    let role = args.next().unwrap_or_else(|| "agent".to_string());
    let Some(code) = role_code(&role) else {
        anyhow::bail!("unknown role: {role}");
    };

    let salt = SaltString::generate(&mut OsRng);
    let phc = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("argon2 hash error: {e}"))?
        .to_string();

    let username = username.replace('\'', "''");
    println!(
        "INSERT INTO app_user (username, display_name, password_hash, roles) VALUES ('{username}', '{username}', '{phc}', {code});"
    );
    Ok(())
}
